//! Output formatters
//!
//! Provides trait-based output formatting for query results.

pub mod json;
pub mod text;

use crate::error::{Error, Result};
use crate::grid::Coordinates;
use crate::query::{GridEstimate, NeighborhoodEstimate};
use serde::{Deserialize, Serialize};

/// Information about an output format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormatInfo {
    /// Format name
    pub name: String,
    /// Format description
    pub description: String,
}

/// Everything known about one query point
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryReport {
    /// Where the query was made
    pub coords: Coordinates,

    /// Grid resolution used for the interpolated estimate
    pub precision: f64,

    /// Interpolated estimate; `None` when no surrounding anchor holds data
    pub grid: Option<GridEstimate>,

    /// Kernel estimate, when requested and available
    #[serde(skip_serializing_if = "Option::is_none")]
    pub neighborhood: Option<NeighborhoodEstimate>,
}

/// Trait for output formatters
pub trait OutputFormatter: Send + Sync {
    /// Get the format name
    fn name(&self) -> &str;

    /// Get the format description
    fn description(&self) -> &str;

    /// Format a query report
    fn format(&self, report: &QueryReport) -> Result<String>;
}

/// Get a formatter by name
pub fn get_formatter(name: &str) -> Option<Box<dyn OutputFormatter>> {
    match name.to_lowercase().as_str() {
        "json" => Some(Box::new(json::JsonFormatter)),
        "text" => Some(Box::new(text::TextFormatter)),
        _ => None,
    }
}

/// Get a formatter by name, naming the available ones if it is unknown
pub fn require_formatter(name: &str) -> Result<Box<dyn OutputFormatter>> {
    get_formatter(name).ok_or_else(|| {
        let names: Vec<String> = available_formats().into_iter().map(|f| f.name).collect();
        Error::Config(format!(
            "Unknown format: {} (available: {})",
            name,
            names.join(", ")
        ))
    })
}

/// List all available formatters
pub fn available_formats() -> Vec<FormatInfo> {
    vec![
        FormatInfo {
            name: "json".to_string(),
            description: "Full JSON report".to_string(),
        },
        FormatInfo {
            name: "text".to_string(),
            description: "Human-readable text".to_string(),
        },
    ]
}
