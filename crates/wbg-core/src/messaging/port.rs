use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::{
    domain::SenderId,
    messaging::types::{ChatChannel, NetworkEvent, SessionOptions},
    Result,
};

/// Send side of an established chat-network session.
///
/// Shared read-only by every relay task once the session is connected.
#[async_trait]
pub trait ChatSender: Send + Sync {
    /// Deliver `text` to `to`. Failures are `Error::Send`.
    async fn send_text(&self, to: &SenderId, text: &str) -> Result<()>;
}

/// Chat-network client port.
///
/// `open` drives the handshake to readiness, reporting pairing challenges and raw
/// status strings on `events` as they happen. It resolves once the network is
/// authenticated, or fails with `Error::Connection`.
#[async_trait]
pub trait ChatNetwork: Send + Sync {
    async fn open(
        &self,
        opts: &SessionOptions,
        events: mpsc::UnboundedSender<NetworkEvent>,
    ) -> Result<ChatChannel>;
}
