// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Top-level engine runner — shared by `main` and integration tests.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::adapter::DomAdapter;
use crate::browser::cdp::CdpHost;
use crate::browser::BrowserHost;
use crate::config::Config;
use crate::executor::Executor;
use crate::state::{EngineChannels, EngineState};
use crate::store::StateStore;
use crate::{bridge, queue, stream};

/// Initialize tracing/logging from config.
///
/// Uses `try_init` so it's safe to call multiple times (e.g. from tests).
pub fn init_tracing(config: &Config) {
    use tracing_subscriber::fmt;

    // Priority: --log-level / DROVER_LOG_LEVEL > RUST_LOG > default ("info").
    let filter = if std::env::var("DROVER_LOG_LEVEL").is_err() && config.log_level == "info" {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level))
    } else {
        EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let result = match config.log_format.as_str() {
        "json" => fmt::fmt().with_env_filter(filter).json().try_init(),
        _ => fmt::fmt().with_env_filter(filter).try_init(),
    };
    drop(result);
}

/// Run the engine until a shutdown signal arrives.
pub async fn run(config: Config) -> anyhow::Result<()> {
    init_tracing(&config);

    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone());

    let store = StateStore::open(config.state_dir.clone());
    let mut settings = store.load_settings().unwrap_or_default();
    settings.clamp();

    let (frame_tx, frame_rx) = mpsc::unbounded_channel();
    let (record_tx, record_rx) = mpsc::unbounded_channel();
    let state = Arc::new(EngineState::new(
        settings,
        store,
        EngineChannels { frame_tx, record_tx },
        shutdown.clone(),
    ));

    let host: Arc<dyn BrowserHost> = Arc::new(CdpHost::new(&config.browser_url));
    let adapter = Arc::new(DomAdapter::new(Arc::clone(&host)));
    let executor = Arc::new(Executor::new(Arc::clone(&state), Arc::clone(&host), adapter));

    let drain = queue::spawn_drain(Arc::clone(&state), Arc::clone(&executor));
    let bridge_task = bridge::spawn(
        Arc::clone(&state),
        Arc::clone(&executor),
        config.agent_url.clone(),
        frame_rx,
    );
    let sink_task = stream::spawn(Arc::clone(&state), config.data_url.clone(), record_rx);

    info!(agent = %config.agent_url, sink = %config.data_url, browser = %config.browser_url, "engine started");
    shutdown.cancelled().await;

    // Suspend path: detach all probes and close tabs best-effort. The
    // in-flight command, if any, is abandoned with its queue slot.
    state.sessions.cleanup_all(&host).await;
    let _ = tokio::join!(drain, bridge_task, sink_task);
    info!("shutdown complete");
    Ok(())
}

/// First signal triggers graceful shutdown; a second one force-exits.
fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).ok();
        let mut sigint =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt()).ok();

        tokio::select! {
            _ = wait_signal(sigterm.as_mut()) => {}
            _ = wait_signal(sigint.as_mut()) => {}
        }
        info!("signal received, shutting down");
        shutdown.cancel();

        tokio::select! {
            _ = wait_signal(sigterm.as_mut()) => {}
            _ = wait_signal(sigint.as_mut()) => {}
        }
        info!("second signal, forcing exit");
        std::process::exit(130);
    });
}

async fn wait_signal(sig: Option<&mut tokio::signal::unix::Signal>) {
    match sig {
        Some(sig) => {
            sig.recv().await;
        }
        None => std::future::pending().await,
    }
}
