//! Storage for anchor aggregates and raw observations
//!
//! This module defines the `AnchorStore` and `ObservationLog` traits the
//! engine talks to, the records they hold, and an in-memory backend with
//! JSON snapshots.
//!
//! ## Flex Point
//! A new backend implements both traits. Its correctness obligations are:
//! - `AnchorStore::merge` is atomic per anchor (no partially applied merge is
//!   ever visible) and merges to different anchors do not block each other
//! - `AnchorStore::merge_batch` is all-or-nothing and idempotent per id
//! - `ObservationLog::append` is idempotent per observation id

pub mod memory;
pub mod snapshot;

use crate::error::{Error, Result};
use crate::grid::{AnchorKey, Coordinates};
use crate::observation::Observation;
use crate::query::Stats;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One observation's weighted share for a single anchor
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Contribution {
    pub people: f64,
    pub vehicles: f64,
    pub noise: f64,
    pub weight: f64,
}

impl Contribution {
    /// Share of `obs` carried to an anchor with interpolation weight `weight`
    pub fn from_observation(obs: &Observation, weight: f64) -> Self {
        Self {
            people: obs.people as f64,
            vehicles: obs.vehicles as f64,
            noise: obs.noise,
            weight,
        }
    }

    /// Weight must be positive and every value finite
    pub fn validate(&self) -> Result<()> {
        if !self.weight.is_finite() || self.weight <= 0.0 {
            return Err(Error::InvalidContribution(format!(
                "Weight must be positive, got {}",
                self.weight
            )));
        }
        if !(self.people.is_finite() && self.vehicles.is_finite() && self.noise.is_finite()) {
            return Err(Error::InvalidContribution(
                "Values must be finite".to_string(),
            ));
        }
        Ok(())
    }

    /// A single contribution equivalent to merging `self` and `other`
    pub fn combine(&self, other: &Contribution) -> Contribution {
        let weight = self.weight + other.weight;
        Contribution {
            people: (self.people * self.weight + other.people * other.weight) / weight,
            vehicles: (self.vehicles * self.weight + other.vehicles * other.weight) / weight,
            noise: (self.noise * self.weight + other.noise * other.weight) / weight,
            weight,
        }
    }
}

/// Running weighted sums for one anchor
///
/// `weight_acc > 0` for every stored record. The anchor's estimate is
/// `*_acc / weight_acc`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnchorRecord {
    pub anchor: AnchorKey,
    pub people_acc: f64,
    pub vehicles_acc: f64,
    pub noise_acc: f64,
    pub weight_acc: f64,
}

impl AnchorRecord {
    /// First contribution to an anchor
    pub fn new(anchor: AnchorKey, contribution: &Contribution) -> Self {
        Self {
            anchor,
            people_acc: contribution.people * contribution.weight,
            vehicles_acc: contribution.vehicles * contribution.weight,
            noise_acc: contribution.noise * contribution.weight,
            weight_acc: contribution.weight,
        }
    }

    /// Add a contribution to the running sums
    pub fn absorb(&mut self, contribution: &Contribution) {
        self.people_acc += contribution.people * contribution.weight;
        self.vehicles_acc += contribution.vehicles * contribution.weight;
        self.noise_acc += contribution.noise * contribution.weight;
        self.weight_acc += contribution.weight;
    }

    /// Current weighted mean at this anchor
    pub fn mean(&self) -> Stats {
        Stats {
            people: self.people_acc / self.weight_acc,
            vehicles: self.vehicles_acc / self.weight_acc,
            noise: self.noise_acc / self.weight_acc,
        }
    }
}

/// Result of a batch merge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeOutcome {
    /// The batch was folded into the aggregates
    Applied,
    /// A batch with this ingest id was already applied; nothing changed
    AlreadyApplied,
}

/// Result of a log append
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppendOutcome {
    Appended,
    /// An observation with this id is already in the log; nothing changed
    AlreadyPresent,
}

/// Point lookup and merge-upsert of anchor aggregates
///
/// Implementations must be thread-safe (Send + Sync): many ingest handlers
/// merge concurrently.
pub trait AnchorStore: Send + Sync {
    /// Returns the backend name
    fn name(&self) -> &'static str;

    /// Current record for an anchor, if any observation has touched it
    fn get(&self, anchor: &AnchorKey) -> Result<Option<AnchorRecord>>;

    /// Add a weighted contribution to an anchor, creating it if absent
    fn merge(&self, anchor: AnchorKey, contribution: Contribution) -> Result<()>;

    /// Merge several anchors as one all-or-nothing unit
    ///
    /// Repeating an `ingest_id` returns `MergeOutcome::AlreadyApplied`
    /// without touching any anchor. That outcome is only reported once the
    /// first batch is visible; a retry racing an in-flight batch waits for
    /// it, and takes over if it fails.
    fn merge_batch(
        &self,
        ingest_id: Uuid,
        contributions: &[(AnchorKey, Contribution)],
    ) -> Result<MergeOutcome>;

    /// Number of anchors holding data
    fn len(&self) -> Result<usize>;

    /// Check if no anchor holds data
    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// All stored records
    fn records(&self) -> Result<Vec<AnchorRecord>>;

    /// Drop every record (explicit reset)
    fn clear(&self) -> Result<()>;
}

/// Append-only store of raw observations
pub trait ObservationLog: Send + Sync {
    /// Returns the backend name
    fn name(&self) -> &'static str;

    /// Append an observation (idempotent by id)
    fn append(&self, obs: &Observation) -> Result<AppendOutcome>;

    /// Observations whose position lies inside `bbox`
    fn in_box(&self, bbox: &BoundingBox) -> Result<Vec<Observation>>;

    /// Observations dated within `[from, to]`
    fn between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<Observation>>;

    /// Number of logged observations
    fn len(&self) -> Result<usize>;

    /// Check if the log is empty
    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Every logged observation in append order
    fn all(&self) -> Result<Vec<Observation>>;

    /// Drop every observation (explicit reset)
    fn clear(&self) -> Result<()>;
}

/// An axis-aligned box in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Southern latitude boundary
    pub south: f64,
    /// Western longitude boundary
    pub west: f64,
    /// Northern latitude boundary
    pub north: f64,
    /// Eastern longitude boundary
    pub east: f64,
}

impl BoundingBox {
    pub fn new(south: f64, west: f64, north: f64, east: f64) -> Self {
        Self {
            south,
            west,
            north,
            east,
        }
    }

    /// Box extending `half_width` degrees from `center` on each axis
    pub fn around(center: Coordinates, half_width: f64) -> Self {
        Self::new(
            center.lat - half_width,
            center.lon - half_width,
            center.lat + half_width,
            center.lon + half_width,
        )
    }

    /// Check if a point lies inside the box (edges included)
    pub fn contains(&self, coords: Coordinates) -> bool {
        coords.lat >= self.south
            && coords.lat <= self.north
            && coords.lon >= self.west
            && coords.lon <= self.east
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Precision;
    use approx::assert_relative_eq;

    fn anchor() -> AnchorKey {
        AnchorKey::new(46007, 8952, Precision::new(1000.0).unwrap())
    }

    fn contribution(people: f64, weight: f64) -> Contribution {
        Contribution {
            people,
            vehicles: people / 10.0,
            noise: 40.0 + people / 100.0,
            weight,
        }
    }

    #[test]
    fn test_new_record_is_weighted() {
        let record = AnchorRecord::new(anchor(), &contribution(90.0, 0.5));
        assert_relative_eq!(record.people_acc, 45.0);
        assert_relative_eq!(record.weight_acc, 0.5);
        assert_relative_eq!(record.mean().people, 90.0);
    }

    #[test]
    fn test_absorb_is_weighted_mean() {
        let mut record = AnchorRecord::new(anchor(), &contribution(100.0, 0.25));
        record.absorb(&contribution(200.0, 0.75));

        assert_relative_eq!(record.weight_acc, 1.0);
        assert_relative_eq!(record.mean().people, 175.0);
    }

    #[test]
    fn test_absorb_matches_combined_contribution() {
        let a = contribution(100.0, 0.3);
        let b = contribution(200.0, 0.6);

        let mut sequential = AnchorRecord::new(anchor(), &a);
        sequential.absorb(&b);
        let combined = AnchorRecord::new(anchor(), &a.combine(&b));

        assert_relative_eq!(sequential.people_acc, combined.people_acc, epsilon = 1e-9);
        assert_relative_eq!(sequential.vehicles_acc, combined.vehicles_acc, epsilon = 1e-9);
        assert_relative_eq!(sequential.noise_acc, combined.noise_acc, epsilon = 1e-9);
        assert_relative_eq!(sequential.weight_acc, combined.weight_acc, epsilon = 1e-12);
    }

    #[test]
    fn test_contribution_validate() {
        assert!(contribution(1.0, 0.5).validate().is_ok());
        assert!(contribution(1.0, 0.0).validate().is_err());
        assert!(contribution(1.0, -0.1).validate().is_err());
        assert!(contribution(f64::INFINITY, 0.5).validate().is_err());
    }

    #[test]
    fn test_bounding_box() {
        let bbox = BoundingBox::around(Coordinates::new(46.0, 9.0), 0.01);
        assert!(bbox.contains(Coordinates::new(46.0, 9.0)));
        assert!(bbox.contains(Coordinates::new(46.005, 8.995)));
        assert!(!bbox.contains(Coordinates::new(46.02, 9.0)));
        assert!(!bbox.contains(Coordinates::new(46.0, 8.98)));
    }
}
