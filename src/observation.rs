//! Raw sensor observations
//!
//! An observation is one upload from a device: object counts derived from an
//! image, the ambient noise level, where and when it was taken, and who sent
//! it. Observations are immutable once recorded.

use crate::error::{Error, Result};
use crate::grid::Coordinates;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single geolocated sensor observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Identity of this observation, used to make retried ingests idempotent
    pub id: Uuid,
    pub people: u32,
    pub vehicles: u32,
    pub noise: f64,
    pub lat: f64,
    pub lon: f64,
    pub date: DateTime<Utc>,
    pub device_id: String,
}

impl Observation {
    /// Create a new observation with a fresh id
    pub fn new(
        counts: ObjectCounts,
        noise: f64,
        coords: Coordinates,
        date: DateTime<Utc>,
        device_id: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            people: counts.people,
            vehicles: counts.vehicles,
            noise,
            lat: coords.lat,
            lon: coords.lon,
            date,
            device_id: device_id.into(),
        }
    }

    /// Replace the generated id with one supplied by the uploader
    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }

    /// Where the observation was taken
    pub fn coords(&self) -> Coordinates {
        Coordinates::new(self.lat, self.lon)
    }

    /// Check the observation can be folded into the aggregates
    pub fn validate(&self) -> Result<()> {
        self.coords().validate()?;
        if !self.noise.is_finite() {
            return Err(Error::InvalidCoordinate(format!(
                "Noise level {} is not a finite number",
                self.noise
            )));
        }
        Ok(())
    }
}

/// People and vehicle counts produced by an object detector
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectCounts {
    pub people: u32,
    pub vehicles: u32,
}

impl ObjectCounts {
    /// What a detector reports when it finds nothing
    pub const EMPTY: ObjectCounts = ObjectCounts {
        people: 0,
        vehicles: 0,
    };

    pub fn new(people: u32, vehicles: u32) -> Self {
        Self { people, vehicles }
    }
}

/// Turns an image into object counts
///
/// Implementations live outside this crate. A detector that finds no
/// objects returns [`ObjectCounts::EMPTY`] rather than an error.
pub trait ObjectCounter: Send + Sync {
    /// Returns the detector name
    fn name(&self) -> &'static str;

    /// Count people and vehicles in a decoded grayscale image
    fn count(&self, pixels: &[u8], width: usize, height: usize) -> ObjectCounts;
}
