//! Human-readable text output formatter

use crate::error::Result;
use crate::format::{OutputFormatter, QueryReport};
use crate::query::Stats;

/// Text formatter - outputs human-readable summary
pub struct TextFormatter;

fn push_stats(output: &mut String, stats: &Stats) {
    output.push_str(&format!("  People:   {:.2}\n", stats.people));
    output.push_str(&format!("  Vehicles: {:.2}\n", stats.vehicles));
    output.push_str(&format!("  Noise:    {:.2}\n", stats.noise));
}

impl OutputFormatter for TextFormatter {
    fn name(&self) -> &str {
        "text"
    }

    fn description(&self) -> &str {
        "Human-readable text"
    }

    fn format(&self, report: &QueryReport) -> Result<String> {
        let mut output = String::new();

        output.push_str(&format!(
            "Location: ({:.6}, {:.6})\n",
            report.coords.lat, report.coords.lon
        ));
        output.push_str(&format!("Precision: {} cells/degree\n\n", report.precision));

        match &report.grid {
            Some(estimate) => {
                output.push_str(&format!(
                    "Grid estimate ({} anchors, {:.0}% coverage):\n",
                    estimate.anchors_used,
                    estimate.coverage * 100.0
                ));
                push_stats(&mut output, &estimate.stats);
            }
            None => output.push_str("Grid estimate: no data\n"),
        }

        if let Some(estimate) = &report.neighborhood {
            output.push_str(&format!(
                "\nNeighborhood estimate ({} observations):\n",
                estimate.observations
            ));
            push_stats(&mut output, &estimate.stats);
        }

        Ok(output)
    }
}
