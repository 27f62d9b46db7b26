//! Status command handler
//!
//! Summarises the saved snapshot and optionally checks a running server.

use crate::config::Config;
use crate::error::Result;
use crate::store::snapshot::Snapshot;
use clap::Args;

/// Status command arguments
#[derive(Args)]
pub struct StatusArgs {
    /// Check if server is running (tries to connect)
    #[arg(long)]
    pub server: bool,
}

/// Run the status command
pub async fn run(args: StatusArgs) -> Result<()> {
    let config = Config::load()?;

    if args.server {
        check_server_status(&config).await;
    }

    println!("crowdmap v{}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("Grid precision: {} cells/degree", config.grid.precision);
    println!();

    let path = config.snapshot_path()?;
    let snapshot = Snapshot::load_from(&path)?;

    println!("Snapshot: {}", path.display());
    match snapshot.saved_at {
        Some(saved_at) => println!("  Saved:        {}", saved_at.to_rfc3339()),
        None => println!("  Saved:        never"),
    }
    println!("  Anchors:      {}", snapshot.anchors.len());
    println!("  Observations: {}", snapshot.observations.len());

    Ok(())
}

/// Check if the server is running
async fn check_server_status(config: &Config) {
    let url = format!("http://{}/api/status", config.server_addr());

    match reqwest::get(&url).await {
        Ok(response) => {
            if response.status().is_success() {
                println!("Server: RUNNING on {}", config.server_addr());
                if let Ok(status) = response.json::<serde_json::Value>().await {
                    if let Some(version) = status.get("version").and_then(|v| v.as_str()) {
                        println!("  Version:      {}", version);
                    }
                    if let Some(anchors) = status.get("anchors").and_then(|v| v.as_u64()) {
                        println!("  Anchors:      {}", anchors);
                    }
                    if let Some(count) = status.get("observations").and_then(|v| v.as_u64()) {
                        println!("  Observations: {}", count);
                    }
                }
            } else {
                println!("Server: ERROR (status {})", response.status());
            }
        }
        Err(_) => {
            println!("Server: NOT RUNNING on {}", config.server_addr());
        }
    }
    println!();
}
