//! crowdmap CLI entry point
//!
//! Crowd-sensed people, vehicle, and noise map - CLI + HTTP server

use crowdmap::cli;

#[tokio::main]
async fn main() {
    if let Err(e) = cli::run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
