//! NDJSON frames exchanged with the bridge process (one JSON object per line).

use serde::{Deserialize, Serialize};

use wbg_core::messaging::types::SessionOptions;

/// Gateway → bridge (stdin).
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command<'a> {
    Start {
        session: &'a str,
        headless: bool,
        devtools: bool,
        use_chrome: bool,
        debug: bool,
        log_qr: bool,
    },
    SendText {
        id: u64,
        to: &'a str,
        text: &'a str,
    },
}

impl<'a> Command<'a> {
    pub fn start(opts: &'a SessionOptions) -> Self {
        Command::Start {
            session: &opts.session_name,
            headless: opts.headless,
            devtools: opts.devtools,
            use_chrome: opts.use_chrome,
            debug: opts.debug,
            log_qr: opts.log_qr,
        }
    }

    /// Serialized line including the trailing newline.
    pub fn to_line(&self) -> serde_json::Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

/// Bridge → gateway (stdout).
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    Qr {
        code: String,
        #[serde(default)]
        ascii: Option<String>,
        #[serde(default)]
        attempt: Option<u32>,
    },
    Status {
        status: String,
    },
    Ready,
    Fatal {
        error: String,
    },
    Message {
        from: String,
        #[serde(default)]
        body: String,
        #[serde(default)]
        is_group: bool,
    },
    SendResult {
        id: u64,
        ok: bool,
        #[serde(default)]
        error: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

pub fn parse_frame(line: &str) -> serde_json::Result<Frame> {
    serde_json::from_str(line)
}
