//! CLI command handlers
//!
//! Each subcommand has its own module with handler functions.

pub mod config;
pub mod query;
pub mod reset;
pub mod serve;
pub mod status;

use clap::{Parser, Subcommand};

/// Crowd-sensed people, vehicle, and noise map
#[derive(Parser)]
#[command(name = "crowdmap")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start web server (foreground)
    Serve(serve::ServeArgs),

    /// Manage configuration
    Config(config::ConfigArgs),

    /// Estimate levels at a location from the saved snapshot
    Query(query::QueryArgs),

    /// Show snapshot and server status
    Status(status::StatusArgs),

    /// Discard all anchors and logged observations
    Reset(reset::ResetArgs),
}

/// Run the CLI
pub async fn run() -> crate::error::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(args) => serve::run(args).await,
        Commands::Config(args) => config::run(args),
        Commands::Query(args) => query::run(args),
        Commands::Status(args) => status::run(args).await,
        Commands::Reset(args) => reset::run(args),
    }
}
