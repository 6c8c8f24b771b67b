//! Session Manager: drives the chat-network connection from cold start to a
//! ready, authenticated channel and reports every status change on the way.

use std::{fmt, sync::Arc};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::{
    domain::{InboundMessage, PairingChallenge},
    errors::Error,
    messaging::{
        port::{ChatNetwork, ChatSender},
        types::{NetworkEvent, SessionOptions},
    },
    Result,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SessionState {
    Initializing,
    AwaitingPairing,
    Connected,
    Failed,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Initializing => "initializing",
            SessionState::AwaitingPairing => "awaiting_pairing",
            SessionState::Connected => "connected",
            SessionState::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Connected | SessionState::Failed)
    }

    /// A fresh challenge re-enters `AwaitingPairing`; nothing leaves a terminal state.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Initializing, AwaitingPairing)
                | (AwaitingPairing, AwaitingPairing)
                | (Initializing | AwaitingPairing, Connected)
                | (Initializing | AwaitingPairing, Failed)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One status update surfaced to observers.
///
/// Emitted on every state transition, and for every raw status string the
/// network client reports (`from_client == true`, state unchanged).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusChange {
    pub previous: SessionState,
    pub current: SessionState,
    pub detail: Option<String>,
    pub from_client: bool,
    pub at: DateTime<Utc>,
}

type StatusHandler = Box<dyn Fn(&StatusChange) + Send + Sync>;
type PairingHandler = Box<dyn Fn(&PairingChallenge) + Send + Sync>;

/// State machine + observers for a single initialization run.
struct Lifecycle {
    state: SessionState,
    pairing_attempts: u32,
    status_handlers: Vec<StatusHandler>,
    pairing_handlers: Vec<PairingHandler>,
}

impl Lifecycle {
    fn new(status_handlers: Vec<StatusHandler>, pairing_handlers: Vec<PairingHandler>) -> Self {
        Self {
            state: SessionState::Initializing,
            pairing_attempts: 0,
            status_handlers,
            pairing_handlers,
        }
    }

    fn transition(&mut self, next: SessionState, detail: Option<String>) -> bool {
        if !self.state.can_transition_to(next) {
            warn!(from = %self.state, to = %next, "ignoring invalid session transition");
            return false;
        }

        let change = StatusChange {
            previous: self.state,
            current: next,
            detail,
            from_client: false,
            at: Utc::now(),
        };
        self.state = next;
        self.notify(&change);
        true
    }

    fn apply(&mut self, ev: NetworkEvent) {
        match ev {
            NetworkEvent::Status(raw) => {
                debug!(status = %raw, "network client status");
                let change = StatusChange {
                    previous: self.state,
                    current: self.state,
                    detail: Some(raw),
                    from_client: true,
                    at: Utc::now(),
                };
                self.notify(&change);
            }
            NetworkEvent::Pairing(mut challenge) => {
                self.pairing_attempts += 1;
                if challenge.attempt == 0 {
                    challenge.attempt = self.pairing_attempts;
                }
                let detail = format!("pairing challenge #{}", challenge.attempt);
                if !self.transition(SessionState::AwaitingPairing, Some(detail)) {
                    return;
                }
                for handler in &self.pairing_handlers {
                    handler(&challenge);
                }
            }
        }
    }

    fn notify(&self, change: &StatusChange) {
        for handler in &self.status_handlers {
            handler(change);
        }
    }
}

/// Owns the single chat-network session of the process.
///
/// Register observers first, then call [`SessionManager::initialize`], which
/// consumes the manager: one manager yields at most one `Session`.
pub struct SessionManager {
    options: SessionOptions,
    network: Arc<dyn ChatNetwork>,
    status_handlers: Vec<StatusHandler>,
    pairing_handlers: Vec<PairingHandler>,
}

impl SessionManager {
    pub fn new(options: SessionOptions, network: Arc<dyn ChatNetwork>) -> Self {
        Self {
            options,
            network,
            status_handlers: Vec::new(),
            pairing_handlers: Vec::new(),
        }
    }

    pub fn on_status_change(
        &mut self,
        handler: impl Fn(&StatusChange) + Send + Sync + 'static,
    ) -> &mut Self {
        self.status_handlers.push(Box::new(handler));
        self
    }

    /// Handlers render the challenge for a human; initialization does not wait on them.
    pub fn on_pairing_challenge(
        &mut self,
        handler: impl Fn(&PairingChallenge) + Send + Sync + 'static,
    ) -> &mut Self {
        self.pairing_handlers.push(Box::new(handler));
        self
    }

    /// Bring the session to `Connected`, or fail with `Error::Connection`.
    pub async fn initialize(self) -> Result<Session> {
        let SessionManager {
            options,
            network,
            status_handlers,
            pairing_handlers,
        } = self;

        info!(session = %options.session_name, headless = options.headless, "initializing chat session");

        let mut lifecycle = Lifecycle::new(status_handlers, pairing_handlers);
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();

        let result = {
            let open = network.open(&options, events_tx);
            tokio::pin!(open);
            loop {
                tokio::select! {
                    biased;
                    Some(ev) = events_rx.recv() => lifecycle.apply(ev),
                    res = &mut open => break res,
                }
            }
        };

        // Events emitted right before `open` resolved.
        while let Ok(ev) = events_rx.try_recv() {
            lifecycle.apply(ev);
        }

        match result {
            Ok(channel) => {
                lifecycle.transition(SessionState::Connected, Some("authenticated".to_string()));
                info!(session = %options.session_name, "chat session connected");
                Ok(Session {
                    id: options.session_name,
                    state: lifecycle.state,
                    pairing_attempts: lifecycle.pairing_attempts,
                    sender: channel.sender,
                    inbound: Some(channel.inbound),
                })
            }
            Err(e) => {
                let err = match e {
                    Error::Connection(_) => e,
                    other => Error::Connection(other.to_string()),
                };
                lifecycle.transition(SessionState::Failed, Some(err.to_string()));
                Err(err)
            }
        }
    }
}

/// The single authenticated chat-network session.
pub struct Session {
    id: String,
    state: SessionState,
    pairing_attempts: u32,
    sender: Arc<dyn ChatSender>,
    inbound: Option<mpsc::UnboundedReceiver<InboundMessage>>,
}

impl Session {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Number of pairing challenges issued before the session connected.
    pub fn pairing_attempts(&self) -> u32 {
        self.pairing_attempts
    }

    /// Shared send handle; never mutated after `Connected`.
    pub fn sender(&self) -> Arc<dyn ChatSender> {
        self.sender.clone()
    }

    /// Inbound stream. Can be taken once; the relay owns it afterwards.
    pub fn take_inbound(&mut self) -> Option<mpsc::UnboundedReceiver<InboundMessage>> {
        self.inbound.take()
    }
}

/// Console banner for a pairing challenge (ASCII QR when available, raw code otherwise).
pub fn render_pairing_challenge(challenge: &PairingChallenge) -> String {
    let rule = "=".repeat(33);
    let body = challenge
        .ascii
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(&challenge.code);
    format!(
        "\n{rule}\nScan the QR code below with WhatsApp (attempt {}):\n{body}\n{rule}\n",
        challenge.attempt
    )
}
