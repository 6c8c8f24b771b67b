use std::sync::Arc;

use tokio::sync::mpsc;

use crate::{
    domain::{InboundMessage, PairingChallenge},
    messaging::port::ChatSender,
};

/// Options handed to the chat-network client when opening the session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionOptions {
    /// Session label; also the process-wide session identifier.
    pub session_name: String,
    pub headless: bool,
    pub devtools: bool,
    pub use_chrome: bool,
    pub debug: bool,
    /// Let the client print its own QR rendering as well.
    pub log_qr: bool,
}

impl SessionOptions {
    pub fn new(session_name: impl Into<String>) -> Self {
        Self {
            session_name: session_name.into(),
            headless: true,
            devtools: false,
            use_chrome: true,
            debug: false,
            log_qr: true,
        }
    }
}

/// Lifecycle events emitted by the chat-network client while the handshake runs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NetworkEvent {
    /// Raw connectivity status reported by the client (e.g. `qrReadSuccess`).
    Status(String),
    Pairing(PairingChallenge),
}

/// A ready, authenticated channel: send handle plus inbound stream.
pub struct ChatChannel {
    pub sender: Arc<dyn ChatSender>,
    pub inbound: mpsc::UnboundedReceiver<InboundMessage>,
}
