//! Serve command handler
//!
//! Starts the HTTP server in foreground mode. State is loaded from the
//! snapshot and saved back on Ctrl-C.

use crate::config::Config;
use crate::error::Result;
use crate::server;
use clap::Args;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Serve command arguments
#[derive(Args)]
pub struct ServeArgs {
    /// Host address to bind to
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(long, short = 'p')]
    pub port: Option<u16>,

    /// Snapshot file to restore from and save to
    #[arg(long)]
    pub snapshot: Option<PathBuf>,
}

/// Run the serve command
pub async fn run(args: ServeArgs) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = apply_overrides(Config::load()?, args);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %config.server_addr(),
        precision = config.grid.precision,
        "starting crowdmap server"
    );

    server::run(config).await
}

fn apply_overrides(mut config: Config, args: ServeArgs) -> Config {
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(path) = args.snapshot {
        config.storage.snapshot_path = Some(path.to_string_lossy().into_owned());
    }
    config
}
