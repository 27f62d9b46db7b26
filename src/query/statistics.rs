//! Grid-interpolated estimate
//!
//! Gathers the anchors surrounding a query point and blends their current
//! means with the point's own interpolation weights.

use crate::error::Result;
use crate::grid::{spread, Coordinates, Precision};
use crate::query::Stats;
use crate::store::AnchorStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Estimate reconstructed from anchor aggregates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridEstimate {
    #[serde(flatten)]
    pub stats: Stats,

    /// Share of the interpolation weight backed by anchors with data (0-1]
    pub coverage: f64,

    /// Number of anchors that contributed
    pub anchors_used: usize,
}

/// Reads anchor aggregates to answer point queries
pub struct StatisticsQuery {
    anchors: Arc<dyn AnchorStore>,
}

impl StatisticsQuery {
    pub fn new(anchors: Arc<dyn AnchorStore>) -> Self {
        Self { anchors }
    }

    /// Estimate the levels at `coords`
    ///
    /// Each present anchor contributes its mean scaled by the query point's
    /// interpolation weight. Absent anchors are skipped and the result is
    /// renormalized over the weight that was present, reported as
    /// `coverage`.
    ///
    /// # Returns
    /// `None` if no surrounding anchor holds data
    pub fn query(&self, coords: Coordinates, precision: Precision) -> Result<Option<GridEstimate>> {
        coords.validate()?;

        let mut weighted = Stats::default();
        let mut coverage = 0.0;
        let mut anchors_used = 0;

        for (anchor, weight) in spread(coords, precision) {
            if let Some(record) = self.anchors.get(&anchor)? {
                weighted.accumulate(&record.mean(), weight);
                coverage += weight;
                anchors_used += 1;
            }
        }

        if anchors_used == 0 {
            return Ok(None);
        }

        Ok(Some(GridEstimate {
            stats: weighted.scaled_down(coverage),
            coverage: coverage.min(1.0),
            anchors_used,
        }))
    }
}
