//! Error types for crowdmap

use thiserror::Error;
use uuid::Uuid;

/// Main error type for crowdmap operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid coordinate: {0}")]
    InvalidCoordinate(String),

    #[error("Invalid contribution: {0}")]
    InvalidContribution(String),

    #[error("No data available: {0}")]
    NoDataAvailable(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// One half of an ingest (anchor merge or raw log append) succeeded and the
    /// other failed. The caller may retry the failed half with the same id.
    #[error(
        "Partial ingest of observation {id} (aggregated: {aggregated}, logged: {logged}): {reason}"
    )]
    PartialIngestFailure {
        id: Uuid,
        aggregated: bool,
        logged: bool,
        reason: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Server error: {0}")]
    Server(String),
}

/// Result type alias for crowdmap operations
pub type Result<T> = std::result::Result<T, Error>;
