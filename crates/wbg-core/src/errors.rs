/// Core error type for the gateway.
///
/// Adapter crates map their specific errors into this type so the relay can tell
/// fatal failures (`Connection`, `Config`) from per-message ones (`Forward`, `Send`).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    /// The chat-network session could not be established.
    #[error("connection error: {0}")]
    Connection(String),

    /// The response service failed or returned an unusable payload.
    #[error("forward error: {0}")]
    Forward(String),

    /// Outbound delivery to the chat network failed.
    #[error("send error: {0}")]
    Send(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Fatal errors halt the process; everything else is scoped to one message.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Config(_) | Error::Connection(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
