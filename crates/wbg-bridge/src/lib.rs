//! WhatsApp Web bridge adapter.
//!
//! Spawns the bridge process (a small Node script hosting the WhatsApp Web client)
//! and talks NDJSON over its stdio: commands go to stdin, lifecycle events, inbound
//! messages and send confirmations come back on stdout. See [`protocol`].

use std::{
    collections::{HashMap, VecDeque},
    path::PathBuf,
    process::Stdio,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader},
    process::{Child, ChildStdin, ChildStdout, Command},
    sync::{mpsc, oneshot, Mutex},
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};

use wbg_core::{
    domain::{InboundMessage, PairingChallenge, SenderId},
    errors::Error,
    messaging::{
        port::{ChatNetwork, ChatSender},
        types::{ChatChannel, NetworkEvent, SessionOptions},
    },
    utils::truncate_text,
    Result,
};

pub mod protocol;

use protocol::{parse_frame, Frame};

const STDERR_TAIL_MAX_BYTES: usize = 16 * 1024;
const STDERR_TAIL_MAX_LINES: usize = 200;
const STDERR_FLUSH_WAIT: Duration = Duration::from_secs(1);

/// How to launch the bridge process.
#[derive(Clone, Debug)]
pub struct BridgeConfig {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub workdir: Option<PathBuf>,
}

#[derive(Clone, Debug, Default)]
struct StderrTail {
    lines: VecDeque<String>,
    bytes: usize,
}

impl StderrTail {
    fn push_line(&mut self, line: String) {
        // +1 for the '\n' we join with later.
        self.bytes = self.bytes.saturating_add(line.len() + 1);
        self.lines.push_back(line);

        while self.lines.len() > STDERR_TAIL_MAX_LINES || self.bytes > STDERR_TAIL_MAX_BYTES {
            if let Some(front) = self.lines.pop_front() {
                self.bytes = self.bytes.saturating_sub(front.len() + 1);
            } else {
                break;
            }
        }
    }

    fn snapshot(&self) -> String {
        self.lines.iter().cloned().collect::<Vec<_>>().join("\n")
    }
}

type PendingSends = HashMap<u64, oneshot::Sender<Result<()>>>;

/// State shared between the send handle and the stdout reader.
struct Shared {
    stdin: Mutex<ChildStdin>,
    pending: Mutex<PendingSends>,
    next_id: AtomicU64,
    closed: AtomicBool,
}

/// [`ChatNetwork`] over a bridge child process.
#[derive(Clone, Debug)]
pub struct BridgeNetwork {
    cfg: BridgeConfig,
}

impl BridgeNetwork {
    pub fn new(cfg: BridgeConfig) -> Self {
        Self { cfg }
    }
}

#[async_trait]
impl ChatNetwork for BridgeNetwork {
    async fn open(
        &self,
        opts: &SessionOptions,
        events: mpsc::UnboundedSender<NetworkEvent>,
    ) -> Result<ChatChannel> {
        let mut cmd = Command::new(&self.cfg.program);
        cmd.args(&self.cfg.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.cfg.workdir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|e| {
            Error::Connection(format!(
                "failed to start bridge `{}`: {e}",
                self.cfg.program.display()
            ))
        })?;
        info!(program = %self.cfg.program.display(), pid = ?child.id(), "bridge process started");

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Connection("bridge stdin was not captured".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Connection("bridge stdout was not captured".to_string()))?;

        // Drain stderr in background to avoid blocking on a full pipe.
        let stderr_tail: Arc<Mutex<StderrTail>> = Arc::new(Mutex::new(StderrTail::default()));
        let stderr_task = child.stderr.take().map(|stderr| {
            let tail = stderr_tail.clone();
            tokio::spawn(async move {
                let mut r = BufReader::new(stderr);
                let mut buf = Vec::new();
                while let Ok(Some(line)) = next_line_lossy(&mut r, &mut buf).await {
                    warn!(target: "wbg_bridge_child", "{line}");
                    tail.lock().await.push_line(line);
                }
            })
        });

        let shared = Arc::new(Shared {
            stdin: Mutex::new(stdin),
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        });

        let start = protocol::Command::start(opts)
            .to_line()
            .map_err(|e| Error::Connection(format!("bridge start command: {e}")))?;
        write_line(&shared, &start)
            .await
            .map_err(|e| Error::Connection(format!("failed to send start command to bridge: {e}")))?;

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = oneshot::channel();

        tokio::spawn(read_frames(
            stdout,
            FrameSinks {
                events,
                inbound: inbound_tx,
                ready: Some(ready_tx),
            },
            shared.clone(),
            stderr_tail,
            stderr_task,
        ));

        match ready_rx.await {
            Ok(Ok(())) => Ok(ChatChannel {
                sender: Arc::new(BridgeSender {
                    shared,
                    _child: Mutex::new(child),
                }),
                inbound: inbound_rx,
            }),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(Error::Connection(
                "bridge reader stopped before the session was ready".to_string(),
            )),
        }
    }
}

/// Send handle for a running bridge. Dropping the last clone kills the process.
pub struct BridgeSender {
    shared: Arc<Shared>,
    _child: Mutex<Child>,
}

#[async_trait]
impl ChatSender for BridgeSender {
    async fn send_text(&self, to: &SenderId, text: &str) -> Result<()> {
        let id = self.shared.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.shared.pending.lock().await;
            if self.shared.closed.load(Ordering::SeqCst) {
                return Err(Error::Send("bridge is not running".to_string()));
            }
            pending.insert(id, tx);
        }

        let line = protocol::Command::SendText {
            id,
            to: to.as_str(),
            text,
        }
        .to_line()
        .map_err(|e| Error::Send(format!("send_text encode: {e}")))?;

        if let Err(e) = write_line(&self.shared, &line).await {
            self.shared.pending.lock().await.remove(&id);
            return Err(Error::Send(format!("failed to write to bridge: {e}")));
        }

        match rx.await {
            Ok(res) => res,
            Err(_) => Err(Error::Send(
                "bridge closed before confirming the send".to_string(),
            )),
        }
    }
}

async fn write_line(shared: &Shared, line: &str) -> std::io::Result<()> {
    let mut stdin = shared.stdin.lock().await;
    stdin.write_all(line.as_bytes()).await?;
    stdin.flush().await
}

/// Next line without its terminator; invalid UTF-8 is replaced, not fatal.
async fn next_line_lossy<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    buf: &mut Vec<u8>,
) -> std::io::Result<Option<String>> {
    buf.clear();
    if reader.read_until(b'\n', buf).await? == 0 {
        return Ok(None);
    }
    while matches!(buf.last(), Some(b'\n' | b'\r')) {
        buf.pop();
    }
    Ok(Some(String::from_utf8_lossy(buf).into_owned()))
}

struct FrameSinks {
    events: mpsc::UnboundedSender<NetworkEvent>,
    inbound: mpsc::UnboundedSender<InboundMessage>,
    ready: Option<oneshot::Sender<Result<()>>>,
}

async fn read_frames(
    stdout: ChildStdout,
    mut sinks: FrameSinks,
    shared: Arc<Shared>,
    stderr_tail: Arc<Mutex<StderrTail>>,
    mut stderr_task: Option<JoinHandle<()>>,
) {
    let mut reader = BufReader::new(stdout);
    let mut buf = Vec::new();
    loop {
        let line = match next_line_lossy(&mut reader, &mut buf).await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                error!(error = %e, "bridge stdout read failed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let frame = match parse_frame(&line) {
            Ok(f) => f,
            Err(e) => {
                debug!(line = %truncate_text(&line, 200), error = %e, "skipping non-protocol bridge output");
                continue;
            }
        };

        match frame {
            Frame::Qr {
                code,
                ascii,
                attempt,
            } => {
                let _ = sinks.events.send(NetworkEvent::Pairing(PairingChallenge {
                    code,
                    ascii,
                    attempt: attempt.unwrap_or(0),
                }));
            }
            Frame::Status { status } => {
                debug!(%status, "bridge status");
                let _ = sinks.events.send(NetworkEvent::Status(status));
            }
            Frame::Ready => match sinks.ready.take() {
                Some(tx) => {
                    let _ = tx.send(Ok(()));
                }
                None => debug!("duplicate ready frame from bridge"),
            },
            Frame::Fatal { error } => {
                match sinks.ready.take() {
                    Some(tx) => {
                        let _ = tx.send(Err(Error::Connection(error)));
                    }
                    None => error!(%error, "bridge reported a fatal error"),
                }
                break;
            }
            Frame::Message {
                from,
                body,
                is_group,
            } => {
                let _ = sinks.inbound.send(InboundMessage {
                    sender: SenderId(from),
                    body,
                    is_group,
                });
            }
            Frame::SendResult { id, ok, error } => {
                let waiter = shared.pending.lock().await.remove(&id);
                match waiter {
                    Some(tx) => {
                        let res = if ok {
                            Ok(())
                        } else {
                            Err(Error::Send(
                                error.unwrap_or_else(|| "bridge reported a failed send".to_string()),
                            ))
                        };
                        let _ = tx.send(res);
                    }
                    None => debug!(id, "send result for unknown request"),
                }
            }
            Frame::Unknown => debug!(line = %truncate_text(&line, 200), "ignoring unknown bridge frame"),
        }
    }

    // Fail everything still waiting on the bridge.
    {
        let mut pending = shared.pending.lock().await;
        shared.closed.store(true, Ordering::SeqCst);
        for (_, tx) in pending.drain() {
            let _ = tx.send(Err(Error::Send("bridge closed".to_string())));
        }
    }

    match sinks.ready.take() {
        Some(tx) => {
            if let Some(task) = stderr_task.take() {
                let _ = tokio::time::timeout(STDERR_FLUSH_WAIT, task).await;
            }
            let stderr = stderr_tail.lock().await.snapshot();
            let mut msg = "bridge exited before the session was ready".to_string();
            if !stderr.trim().is_empty() {
                msg.push_str("\nstderr (tail):\n");
                msg.push_str(&stderr);
            }
            let _ = tx.send(Err(Error::Connection(msg)));
        }
        None => warn!("bridge closed; no further messages will be received"),
    }

    drop(sinks);
}
