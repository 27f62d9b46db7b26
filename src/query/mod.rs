//! Estimates at arbitrary points
//!
//! - `StatisticsQuery`: bilinear reconstruction from anchor aggregates
//! - `NeighborhoodQuery`: Gaussian-kernel average over raw observations
//! - `latest_per_device`: most recent reading per device and location

pub mod latest;
pub mod neighborhood;
pub mod statistics;

pub use latest::latest_per_device;
pub use neighborhood::{NeighborhoodEstimate, NeighborhoodQuery};
pub use statistics::{GridEstimate, StatisticsQuery};

use serde::{Deserialize, Serialize};

/// Expected crowd, traffic and noise levels
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    pub people: f64,
    pub vehicles: f64,
    pub noise: f64,
}

impl Stats {
    pub fn new(people: f64, vehicles: f64, noise: f64) -> Self {
        Self {
            people,
            vehicles,
            noise,
        }
    }

    /// Add `other * weight` to these values
    pub fn accumulate(&mut self, other: &Stats, weight: f64) {
        self.people += other.people * weight;
        self.vehicles += other.vehicles * weight;
        self.noise += other.noise * weight;
    }

    /// Divide every value by `divisor`
    pub fn scaled_down(&self, divisor: f64) -> Stats {
        Stats {
            people: self.people / divisor,
            vehicles: self.vehicles / divisor,
            noise: self.noise / divisor,
        }
    }
}
