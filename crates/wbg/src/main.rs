use std::{process::ExitCode, sync::Arc};

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use wbg_bridge::{BridgeConfig, BridgeNetwork};
use wbg_core::{
    config::Config,
    errors::Error,
    relay::{MessageRelay, RelayStop},
    session::{render_pairing_challenge, SessionManager},
};
use wbg_responder::HttpResponder;

#[tokio::main]
async fn main() -> ExitCode {
    let cfg = match Config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            let _ = wbg_core::logging::init("wbg", "info");
            error!("invalid configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = wbg_core::logging::init("wbg", &cfg.log_level) {
        eprintln!("wbg: {e}");
        return ExitCode::FAILURE;
    }

    match run(cfg).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cfg: Config) -> anyhow::Result<()> {
    info!("Starting WhatsApp Bot Gateway...");

    let network = Arc::new(BridgeNetwork::new(BridgeConfig {
        program: cfg.bridge_program.clone(),
        args: cfg.bridge_args.clone(),
        workdir: cfg.bridge_workdir.clone(),
    }));

    let mut manager = SessionManager::new(cfg.session_options(), network);
    manager
        .on_pairing_challenge(|challenge| {
            info!("\n{}", render_pairing_challenge(challenge));
        })
        .on_status_change(|change| match &change.detail {
            Some(detail) if change.from_client => info!("Status: {detail}"),
            _ => info!("Status: {} -> {}", change.previous, change.current),
        });

    let mut session = manager
        .initialize()
        .await
        .context("Failed to start WhatsApp bot")?;

    let responder = HttpResponder::new(&cfg.response_service_url, cfg.response_timeout)?;
    info!(endpoint = %responder.endpoint(), "response service configured");

    let relay = Arc::new(
        MessageRelay::new(Arc::new(responder), session.sender()).with_bot_id(cfg.bot_id),
    );
    let inbound = session
        .take_inbound()
        .context("session inbound stream already taken")?;

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            shutdown_signal().await;
            info!("shutdown signal received");
            shutdown.cancel();
        }
    });

    info!(session = session.id(), "Bot is running and listening for messages...");
    match relay.run(inbound, shutdown).await {
        RelayStop::Shutdown => {
            info!("gateway stopped");
            Ok(())
        }
        RelayStop::InboundClosed => Err(Error::Connection(
            "chat network connection lost; inbound stream closed".to_string(),
        )
        .into()),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("failed to listen for ctrl-c: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
