use std::fmt;

/// WhatsApp chat id of a message author (e.g. `1234@c.us`, `123-456@g.us`).
///
/// Opaque: the gateway never parses it, it only echoes it back as the reply target.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SenderId(pub String);

impl SenderId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SenderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SenderId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// One received chat event. Lives only for the duration of its handling task.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundMessage {
    pub sender: SenderId,
    pub body: String,
    /// Originated from a multi-party conversation.
    pub is_group: bool,
}

/// Fresh pairing material issued by the chat network (QR equivalent).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PairingChallenge {
    /// Raw QR payload.
    pub code: String,
    /// Terminal rendering of the QR, when the network client provides one.
    pub ascii: Option<String>,
    /// 1-based count of challenges issued for this session.
    pub attempt: u32,
}
