//! Reset command handler
//!
//! Clears both stores and writes the empty state back to the snapshot.

use crate::config::Config;
use crate::error::Result;
use crate::store::snapshot::Snapshot;
use crate::store::{AnchorStore, ObservationLog};
use clap::Args;
use std::path::Path;

/// Reset command arguments
#[derive(Args)]
pub struct ResetArgs {
    /// Confirm the reset; nothing is deleted without it
    #[arg(long)]
    pub yes: bool,
}

/// Run the reset command
pub fn run(args: ResetArgs) -> Result<()> {
    let config = Config::load()?;
    let path = config.snapshot_path()?;

    if !args.yes {
        println!("This discards every anchor and logged observation in:");
        println!("  {}", path.display());
        println!("Re-run with --yes to confirm.");
        return Ok(());
    }

    let (anchors, observations) = reset_snapshot(&path)?;
    println!(
        "Cleared {} anchors and {} observations",
        anchors, observations
    );
    Ok(())
}

/// Empty the stores held in the snapshot at `path`
///
/// Returns how many anchors and observations were discarded.
pub fn reset_snapshot(path: &Path) -> Result<(usize, usize)> {
    let (anchors, log) = Snapshot::load_from(path)?.restore();
    let discarded = (anchors.len()?, log.len()?);

    anchors.clear()?;
    log.clear()?;
    Snapshot::capture(&anchors, &log)?.save_to(path)?;

    Ok(discarded)
}
