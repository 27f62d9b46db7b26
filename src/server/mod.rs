//! HTTP server for crowdmap
//!
//! Provides REST API endpoints for ingesting observations and querying
//! estimates. State is restored from the snapshot file on start, saved every
//! `storage.snapshot_interval_secs` while running, and written back on
//! Ctrl-C or SIGTERM.

pub mod routes;
pub mod state;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::store::snapshot::Snapshot;
use routes::create_router;
use state::AppState;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

/// Start the HTTP server
///
/// # Arguments
/// * `config` - Server configuration
///
/// # Returns
/// After a shutdown signal, once the final snapshot has been written
pub async fn run(config: Config) -> Result<()> {
    let addr = config.server_addr();
    run_on(&addr, config).await
}

/// Start the HTTP server with a specific address
///
/// Useful for tests or when you want to override config
pub async fn run_on(addr: &str, config: Config) -> Result<()> {
    let addr: SocketAddr = addr
        .parse()
        .map_err(|e| Error::Server(format!("Invalid server address: {}", e)))?;

    let snapshot_path = config.snapshot_path()?;
    let snapshot = Snapshot::load_from(&snapshot_path)?;
    info!(
        path = %snapshot_path.display(),
        anchors = snapshot.anchors.len(),
        observations = snapshot.observations.len(),
        "restored snapshot"
    );

    let state = Arc::new(AppState::from_snapshot(config, snapshot)?);
    let app = create_router(state.clone());

    let interval = state.config.storage.snapshot_interval_secs;
    let saver = (interval > 0).then(|| {
        tokio::spawn(save_periodically(
            state.clone(),
            snapshot_path.clone(),
            Duration::from_secs(interval),
        ))
    });

    info!("Starting server on {}", addr);

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Server(format!("Failed to bind to {}: {}", addr, e)))?;

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| Error::Server(format!("Server error: {}", e)));

    if let Some(saver) = saver {
        saver.abort();
        let _ = saver.await;
    }

    save_snapshot(&state, &snapshot_path)?;
    served
}

/// Save a snapshot every `period` until the task is aborted
///
/// A failed save is logged and retried on the next tick.
pub async fn save_periodically(state: Arc<AppState>, path: PathBuf, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    // The first tick completes immediately
    ticker.tick().await;

    loop {
        ticker.tick().await;
        if let Err(e) = save_snapshot(&state, &path) {
            warn!(error = %e, "periodic snapshot failed");
        }
    }
}

fn save_snapshot(state: &AppState, path: &Path) -> Result<()> {
    state.snapshot()?.save_to(path)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Could not listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Could not listen for SIGTERM: {}", e);
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
    info!("Shutting down");
}
