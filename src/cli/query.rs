//! Query command handler
//!
//! Estimates levels at a location from the saved snapshot, without a
//! running server.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::format::{require_formatter, QueryReport};
use crate::grid::{Coordinates, Precision};
use crate::query::{NeighborhoodQuery, StatisticsQuery};
use crate::store::snapshot::Snapshot;
use clap::Args;
use std::sync::Arc;

/// Query command arguments
#[derive(Args)]
pub struct QueryArgs {
    /// Location as LAT,LON
    #[arg(long, allow_hyphen_values = true)]
    pub at: Coordinates,

    /// Grid resolution in cells per degree; anchors only exist at the
    /// precision observations were ingested with
    #[arg(long)]
    pub precision: Option<f64>,

    /// Output format (json, text)
    #[arg(long, short = 'f')]
    pub format: Option<String>,

    /// Also compute the kernel estimate from raw observations
    #[arg(long, short = 'n')]
    pub neighborhood: bool,
}

/// Run the query command
pub fn run(args: QueryArgs) -> Result<()> {
    let config = Config::load()?;

    let format_name = args.format.as_deref().unwrap_or(&config.output.format);
    let formatter = require_formatter(format_name)?;

    let precision = match args.precision {
        Some(value) => Precision::new(value)?,
        None => config.precision()?,
    };

    let snapshot = Snapshot::load_from(&config.snapshot_path()?)?;
    let report = build_report(&config, snapshot, args.at, precision, args.neighborhood)?;

    println!("{}", formatter.format(&report)?);
    Ok(())
}

/// Run both estimators against a snapshot
///
/// A neighborhood with no usable observations is reported as absent rather
/// than as an error.
pub fn build_report(
    config: &Config,
    snapshot: Snapshot,
    coords: Coordinates,
    precision: Precision,
    neighborhood: bool,
) -> Result<QueryReport> {
    let (anchors, log) = snapshot.restore();

    let grid = StatisticsQuery::new(Arc::new(anchors)).query(coords, precision)?;

    let neighborhood = if neighborhood {
        let query = NeighborhoodQuery::new(Arc::new(log));
        match query.query(coords, config.neighborhood.half_width, config.neighborhood.sigma) {
            Ok(estimate) => Some(estimate),
            Err(Error::NoDataAvailable(_)) => None,
            Err(e) => return Err(e),
        }
    } else {
        None
    };

    Ok(QueryReport {
        coords,
        precision: precision.value(),
        grid,
        neighborhood,
    })
}
