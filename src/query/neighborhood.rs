//! Gaussian-kernel estimate over raw observations
//!
//! An independent estimator that bypasses the anchor grid: every logged
//! observation inside a square box around the query point is weighted by
//! `exp(-d^2 / (2 * sigma^2))`, where `d` is the planar distance in degrees.
//! Planar distance is only a fair approximation for small boxes away from
//! the poles.

use crate::error::{Error, Result};
use crate::grid::Coordinates;
use crate::query::Stats;
use crate::store::{BoundingBox, ObservationLog};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Kernel-weighted estimate from raw observations
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NeighborhoodEstimate {
    #[serde(flatten)]
    pub stats: Stats,

    /// Observations found inside the box
    pub observations: usize,

    /// Sum of kernel weights
    pub total_weight: f64,
}

/// Reads the observation log to answer point queries
pub struct NeighborhoodQuery {
    log: Arc<dyn ObservationLog>,
}

impl NeighborhoodQuery {
    pub fn new(log: Arc<dyn ObservationLog>) -> Self {
        Self { log }
    }

    /// Estimate the levels at `center`
    ///
    /// # Arguments
    /// * `center` - Query point
    /// * `half_width` - Half the side of the search box, in degrees
    /// * `sigma` - Kernel bandwidth, in degrees
    ///
    /// # Errors
    /// `NoDataAvailable` if the box holds no observations, or if every
    /// kernel weight underflows to zero
    pub fn query(
        &self,
        center: Coordinates,
        half_width: f64,
        sigma: f64,
    ) -> Result<NeighborhoodEstimate> {
        center.validate()?;
        if !half_width.is_finite() || half_width < 0.0 {
            return Err(Error::InvalidCoordinate(format!(
                "Box half-width must be non-negative, got {}",
                half_width
            )));
        }
        if !sigma.is_finite() || sigma <= 0.0 {
            return Err(Error::InvalidCoordinate(format!(
                "Sigma must be positive, got {}",
                sigma
            )));
        }

        let observations = self.log.in_box(&BoundingBox::around(center, half_width))?;
        if observations.is_empty() {
            return Err(Error::NoDataAvailable(format!(
                "No observations within {} degrees of {}",
                half_width, center
            )));
        }

        let two_sigma_sq = 2.0 * sigma * sigma;
        let mut weighted = Stats::default();
        let mut total_weight = 0.0;

        for obs in &observations {
            let d_lat = obs.lat - center.lat;
            let d_lon = obs.lon - center.lon;
            let weight = (-(d_lat * d_lat + d_lon * d_lon) / two_sigma_sq).exp();

            let values = Stats::new(obs.people as f64, obs.vehicles as f64, obs.noise);
            weighted.accumulate(&values, weight);
            total_weight += weight;
        }

        if total_weight <= 0.0 {
            return Err(Error::NoDataAvailable(format!(
                "All {} observations near {} are beyond the kernel's reach",
                observations.len(),
                center
            )));
        }

        debug!(%center, observations = observations.len(), total_weight, "neighborhood query");

        Ok(NeighborhoodEstimate {
            stats: weighted.scaled_down(total_weight),
            observations: observations.len(),
            total_weight,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observation::{ObjectCounts, Observation};
    use crate::store::memory::MemoryObservationLog;
    use approx::assert_relative_eq;
    use chrono::Utc;

    fn observe(log: &MemoryObservationLog, lat: f64, lon: f64, people: u32, noise: f64) {
        let obs = Observation::new(
            ObjectCounts::new(people, people / 4),
            noise,
            Coordinates::new(lat, lon),
            Utc::now(),
            "cam",
        );
        log.append(&obs).unwrap();
    }

    fn query_with(log: MemoryObservationLog) -> NeighborhoodQuery {
        NeighborhoodQuery::new(Arc::new(log))
    }

    #[test]
    fn test_empty_box_is_no_data() {
        let log = MemoryObservationLog::new();
        observe(&log, 47.0, 9.0, 10, 50.0);

        let result = query_with(log).query(Coordinates::new(46.0, 9.0), 0.01, 0.1);
        assert!(matches!(result, Err(Error::NoDataAvailable(_))));
    }

    #[test]
    fn test_single_observation_at_center() {
        let log = MemoryObservationLog::new();
        observe(&log, 46.0, 9.0, 40, 62.0);
        observe(&log, 47.0, 10.0, 400, 90.0);

        let estimate = query_with(log)
            .query(Coordinates::new(46.0, 9.0), 2.0, 0.1)
            .unwrap();

        assert_eq!(estimate.observations, 2);
        assert_relative_eq!(estimate.stats.people, 40.0, max_relative = 1e-12);
        assert_relative_eq!(estimate.stats.vehicles, 10.0, max_relative = 1e-12);
        assert_relative_eq!(estimate.stats.noise, 62.0, max_relative = 1e-12);
    }

    #[test]
    fn test_symmetric_neighbors_average() {
        let log = MemoryObservationLog::new();
        observe(&log, 46.001, 9.0, 10, 40.0);
        observe(&log, 45.999, 9.0, 30, 60.0);

        let estimate = query_with(log)
            .query(Coordinates::new(46.0, 9.0), 0.01, 0.001)
            .unwrap();

        assert_relative_eq!(estimate.stats.people, 20.0, epsilon = 1e-9);
        assert_relative_eq!(estimate.stats.noise, 50.0, epsilon = 1e-9);
    }

    #[test]
    fn test_closer_observation_dominates() {
        let log = MemoryObservationLog::new();
        observe(&log, 46.0005, 9.0, 100, 50.0);
        observe(&log, 46.004, 9.0, 0, 50.0);

        let estimate = query_with(log)
            .query(Coordinates::new(46.0, 9.0), 0.01, 0.002)
            .unwrap();

        assert!(estimate.stats.people > 50.0);
        assert!(estimate.stats.people < 100.0);
    }

    #[test]
    fn test_underflowing_weights_are_no_data() {
        let log = MemoryObservationLog::new();
        observe(&log, 46.5, 9.0, 10, 50.0);

        let result = query_with(log).query(Coordinates::new(46.0, 9.0), 1.0, 1e-6);
        assert!(matches!(result, Err(Error::NoDataAvailable(_))));
    }

    #[test]
    fn test_invalid_parameters() {
        let query = query_with(MemoryObservationLog::new());
        let center = Coordinates::new(46.0, 9.0);

        assert!(matches!(
            query.query(center, 0.01, 0.0),
            Err(Error::InvalidCoordinate(_))
        ));
        assert!(matches!(
            query.query(center, -1.0, 0.1),
            Err(Error::InvalidCoordinate(_))
        ));
    }
}
