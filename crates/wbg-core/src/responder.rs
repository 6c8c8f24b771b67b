//! Response-service port.
//!
//! The service turns one `(sender, message)` pair into one reply text.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{domain::InboundMessage, Result};

/// Body of `POST /api/get_response`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ResponseRequest {
    pub sender: String,
    pub message: String,
    /// Selects a specific bot on the service; omitted when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bot_id: Option<i64>,
}

impl ResponseRequest {
    pub fn from_inbound(msg: &InboundMessage, bot_id: Option<i64>) -> Self {
        Self {
            sender: msg.sender.0.clone(),
            message: msg.body.clone(),
            bot_id,
        }
    }
}

/// Success body of `POST /api/get_response`.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ResponseReply {
    pub response: String,
}

#[async_trait]
pub trait ResponseService: Send + Sync {
    /// One forward-call. Every failure mode is `Error::Forward`.
    async fn get_response(&self, req: &ResponseRequest) -> Result<ResponseReply>;
}
