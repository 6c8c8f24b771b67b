//! Message Relay: one inbound direct message in, at most one outbound text out.
//!
//! Every failure is scoped to the message that caused it. `handle_inbound` never
//! returns an error; `run` keeps relaying while individual tasks fail.

use std::sync::Arc;

use tokio::{sync::mpsc, task::JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    domain::InboundMessage,
    messaging::port::ChatSender,
    responder::{ResponseRequest, ResponseService},
    utils::truncate_text,
    Result,
};

/// Sent to the author when the response service cannot produce a reply.
pub const APOLOGY_TEXT: &str =
    "Sorry, there was an error processing your message. Please try again later.";

const LOG_PREVIEW_CHARS: usize = 200;

/// What `handle_inbound` did with one message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Group message; nothing was called or sent.
    IgnoredGroup,
    /// The generated reply was delivered.
    Replied,
    /// The forward-call failed and the apology was delivered.
    Apologized,
    /// A send failed (reply or apology); logged and dropped.
    Dropped,
}

/// Why [`MessageRelay::run`] returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RelayStop {
    /// The shutdown token fired.
    Shutdown,
    /// The chat network stopped delivering messages.
    InboundClosed,
}

pub struct MessageRelay {
    responder: Arc<dyn ResponseService>,
    sender: Arc<dyn ChatSender>,
    bot_id: Option<i64>,
}

impl MessageRelay {
    pub fn new(responder: Arc<dyn ResponseService>, sender: Arc<dyn ChatSender>) -> Self {
        Self {
            responder,
            sender,
            bot_id: None,
        }
    }

    /// Forward `bot_id` with every request so the service answers as that bot.
    pub fn with_bot_id(mut self, bot_id: Option<i64>) -> Self {
        self.bot_id = bot_id;
        self
    }

    pub async fn handle_inbound(&self, msg: InboundMessage) -> RelayOutcome {
        if msg.is_group {
            debug!(sender = %msg.sender, "ignoring group message");
            return RelayOutcome::IgnoredGroup;
        }

        info!(
            sender = %msg.sender,
            body = %truncate_text(&msg.body, LOG_PREVIEW_CHARS),
            "received message"
        );

        let req = ResponseRequest::from_inbound(&msg, self.bot_id);
        match self.forward(&req).await {
            Ok(reply) => {
                info!(
                    sender = %msg.sender,
                    reply = %truncate_text(&reply, LOG_PREVIEW_CHARS),
                    "sending response"
                );
                match self.sender.send_text(&msg.sender, &reply).await {
                    Ok(()) => {
                        info!(sender = %msg.sender, "response sent");
                        RelayOutcome::Replied
                    }
                    Err(e) => {
                        error!(sender = %msg.sender, error = %e, "failed to send response");
                        RelayOutcome::Dropped
                    }
                }
            }
            Err(e) => {
                error!(sender = %msg.sender, error = %e, "error processing message");
                match self.sender.send_text(&msg.sender, APOLOGY_TEXT).await {
                    Ok(()) => {
                        info!(sender = %msg.sender, "apology sent");
                        RelayOutcome::Apologized
                    }
                    Err(send_err) => {
                        error!(sender = %msg.sender, error = %send_err, "failed to send apology");
                        RelayOutcome::Dropped
                    }
                }
            }
        }
    }

    async fn forward(&self, req: &ResponseRequest) -> Result<String> {
        Ok(self.responder.get_response(req).await?.response)
    }

    /// Relay every message from `inbound`, one task per message.
    ///
    /// Returns once `inbound` closes or `shutdown` fires, after in-flight tasks finish.
    /// `shutdown` wins when both are ready.
    pub async fn run(
        self: Arc<Self>,
        mut inbound: mpsc::UnboundedReceiver<InboundMessage>,
        shutdown: CancellationToken,
    ) -> RelayStop {
        let mut tasks: JoinSet<RelayOutcome> = JoinSet::new();

        let stop = loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    debug!("relay shutdown requested");
                    break RelayStop::Shutdown;
                }
                msg = inbound.recv() => {
                    let Some(msg) = msg else {
                        warn!("inbound message stream closed");
                        break RelayStop::InboundClosed;
                    };
                    let relay = self.clone();
                    tasks.spawn(async move { relay.handle_inbound(msg).await });
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    log_task_result(joined);
                }
            }
        };

        if !tasks.is_empty() {
            info!(in_flight = tasks.len(), "waiting for in-flight messages");
        }
        while let Some(joined) = tasks.join_next().await {
            log_task_result(joined);
        }
        stop
    }
}

fn log_task_result(joined: std::result::Result<RelayOutcome, tokio::task::JoinError>) {
    match joined {
        Ok(outcome) => debug!(?outcome, "message handled"),
        Err(e) if e.is_panic() => error!(error = %e, "message task panicked"),
        Err(e) => warn!(error = %e, "message task cancelled"),
    }
}
