use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{errors::Error, messaging::types::SessionOptions, Result};

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Typed configuration for the gateway, read from the environment.
#[derive(Clone, Debug)]
pub struct Config {
    // Response service
    pub response_service_url: String,
    pub response_timeout: Option<Duration>,
    pub bot_id: Option<i64>,

    // Session
    pub session_name: String,
    pub headless: bool,
    pub devtools: bool,
    pub use_chrome: bool,
    pub bridge_debug: bool,
    pub log_qr: bool,

    // Bridge process
    pub bridge_program: PathBuf,
    pub bridge_args: Vec<String>,
    pub bridge_workdir: Option<PathBuf>,

    // Logging
    pub log_level: String,
}

impl Config {
    /// Load `.env` (without overriding existing variables), then read the environment.
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the config from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).and_then(non_empty);

        let response_service_url = get("RESPONSE_SERVICE_URL")
            .unwrap_or_else(|| "http://127.0.0.1:5000".to_string())
            .trim()
            .trim_end_matches('/')
            .to_string();
        if !(response_service_url.starts_with("http://")
            || response_service_url.starts_with("https://"))
        {
            return Err(Error::Config(format!(
                "RESPONSE_SERVICE_URL must be an http(s) URL, got {response_service_url:?}"
            )));
        }

        let response_timeout = parse_u64(&get, "RESPONSE_TIMEOUT_MS")?
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis);
        let bot_id = match get("BOT_ID") {
            Some(s) => Some(s.trim().parse::<i64>().map_err(|e| {
                Error::Config(format!("BOT_ID must be an integer, got {s:?}: {e}"))
            })?),
            None => None,
        };

        let session_name = get("SESSION_NAME")
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|| "wa-bot-session".to_string());

        let headless = parse_bool(&get, "HEADLESS")?.unwrap_or(true);
        let devtools = parse_bool(&get, "DEVTOOLS")?.unwrap_or(false);
        let use_chrome = parse_bool(&get, "USE_CHROME")?.unwrap_or(true);
        let bridge_debug = parse_bool(&get, "BRIDGE_DEBUG")?.unwrap_or(false);
        let log_qr = parse_bool(&get, "LOG_QR")?.unwrap_or(true);

        let bridge_program = PathBuf::from(get("BRIDGE_PROGRAM").unwrap_or_else(|| "node".to_string()));
        let bridge_args = get("BRIDGE_ARGS")
            .unwrap_or_else(|| "bridge/index.js".to_string())
            .split_whitespace()
            .map(|s| s.to_string())
            .collect();
        let bridge_workdir = get("BRIDGE_WORKDIR").map(PathBuf::from);

        let log_level = get("LOG_LEVEL")
            .unwrap_or_else(|| "info".to_string())
            .trim()
            .to_lowercase();
        if !LOG_LEVELS.contains(&log_level.as_str()) {
            return Err(Error::Config(format!(
                "LOG_LEVEL must be one of {}, got {log_level:?}",
                LOG_LEVELS.join("/")
            )));
        }

        Ok(Self {
            response_service_url,
            response_timeout,
            bot_id,
            session_name,
            headless,
            devtools,
            use_chrome,
            bridge_debug,
            log_qr,
            bridge_program,
            bridge_args,
            bridge_workdir,
            log_level,
        })
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            session_name: self.session_name.clone(),
            headless: self.headless,
            devtools: self.devtools,
            use_chrome: self.use_chrome,
            debug: self.bridge_debug,
            log_qr: self.log_qr,
        }
    }
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for (key, val) in parse_dotenv(&contents) {
        if env::var_os(&key).is_some() {
            continue; // do not override existing env
        }
        env::set_var(key, val);
    }
}

fn parse_dotenv(contents: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim().trim_start_matches("export ").trim();
        if key.is_empty() {
            continue;
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        out.push((key.to_string(), val));
    }
    out
}

fn parse_bool(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<bool>> {
    let Some(s) = get(key) else {
        return Ok(None);
    };
    match s.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(Some(true)),
        "0" | "false" | "no" | "off" => Ok(Some(false)),
        other => Err(Error::Config(format!("{key} must be a boolean, got {other:?}"))),
    }
}

fn parse_u64(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<u64>> {
    let Some(s) = get(key) else {
        return Ok(None);
    };
    s.trim()
        .parse::<u64>()
        .map(Some)
        .map_err(|e| Error::Config(format!("{key} must be a number, got {s:?}: {e}")))
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
