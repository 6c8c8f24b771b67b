use tracing_subscriber::{fmt, EnvFilter};

use crate::{errors::Error, Result};

/// Crates whose logs follow the configured verbosity; everything else stays at `warn`.
const OWN_TARGETS: [&str; 5] = ["wbg", "wbg_core", "wbg_bridge", "wbg_responder", "wbg_bridge_child"];

/// Initialize logging/tracing for the gateway.
///
/// `RUST_LOG` wins when set. Otherwise `level` applies to the gateway crates and
/// `warn` to dependencies.
pub fn init(service_name: &str, level: &str) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => EnvFilter::try_new(default_directives(service_name, level))
            .map_err(|e| Error::Config(format!("invalid log level {level:?}: {e}")))?,
    };

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(true)
        .try_init()
        .map_err(|e| Error::Config(format!("logging already initialized: {e}")))?;

    Ok(())
}

fn default_directives(service_name: &str, level: &str) -> String {
    let mut out = String::from("warn");
    for target in OWN_TARGETS.iter().copied().chain([service_name]) {
        out.push_str(&format!(",{target}={level}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_directives_scope_level_to_own_crates() {
        let d = default_directives("wbg", "debug");
        assert!(d.starts_with("warn,"));
        assert!(d.contains("wbg_core=debug"));
        assert!(d.contains("wbg_bridge=debug"));
        assert!(EnvFilter::try_new(d).is_ok());
    }
}
