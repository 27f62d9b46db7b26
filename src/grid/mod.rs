//! Fixed-resolution grid
//!
//! This module handles:
//! - Geographic coordinates and their validation
//! - Grid resolution (`Precision`, cells per degree)
//! - Anchor keys (grid-line intersections where statistics are stored)
//! - Bilinear spread of a coordinate onto its surrounding anchors

pub mod spread;

pub use spread::spread;

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

/// Finest accepted resolution (cells per degree, roughly 0.1 mm)
pub const MAX_PRECISION: f64 = 1e9;

/// A geographic coordinate (latitude, longitude)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinates {
    /// Create new coordinates
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Validate that coordinates are within valid ranges
    ///
    /// Latitude: -90 to 90
    /// Longitude: -180 to 180
    pub fn validate(&self) -> Result<()> {
        if !self.lat.is_finite() || self.lat < -90.0 || self.lat > 90.0 {
            return Err(Error::InvalidCoordinate(format!(
                "Latitude {} is out of range [-90, 90]",
                self.lat
            )));
        }
        if !self.lon.is_finite() || self.lon < -180.0 || self.lon > 180.0 {
            return Err(Error::InvalidCoordinate(format!(
                "Longitude {} is out of range [-180, 180]",
                self.lon
            )));
        }
        Ok(())
    }
}

impl std::fmt::Display for Coordinates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{}", self.lat, self.lon)
    }
}

/// Parses the `"lat,lon"` form devices use to report GPS
impl std::str::FromStr for Coordinates {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (lat, lon) = s.split_once(',').ok_or_else(|| {
            Error::InvalidCoordinate(format!("Expected \"lat,lon\", got \"{}\"", s))
        })?;

        let parse = |part: &str| {
            part.trim()
                .parse::<f64>()
                .map_err(|_| Error::InvalidCoordinate(format!("Not a number: \"{}\"", part)))
        };

        let coords = Coordinates::new(parse(lat)?, parse(lon)?);
        coords.validate()?;
        Ok(coords)
    }
}

/// Grid resolution in cells per degree
///
/// The effective cell size is `1 / precision` degrees. Only positive, finite
/// values can be constructed, so equality and hashing on the bit pattern are
/// well defined.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Precision(f64);

impl Precision {
    /// Create a new precision, rejecting zero, negative and non-finite values
    pub fn new(value: f64) -> Result<Self> {
        if !value.is_finite() || value <= 0.0 {
            return Err(Error::InvalidCoordinate(format!(
                "Precision must be positive, got {}",
                value
            )));
        }
        if value > MAX_PRECISION {
            return Err(Error::InvalidCoordinate(format!(
                "Precision {} exceeds maximum {}",
                value, MAX_PRECISION
            )));
        }
        Ok(Self(value))
    }

    /// Cells per degree
    pub fn value(self) -> f64 {
        self.0
    }
}

impl Default for Precision {
    fn default() -> Self {
        Self(crate::config::defaults::DEFAULT_PRECISION)
    }
}

impl TryFrom<f64> for Precision {
    type Error = Error;

    fn try_from(value: f64) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Precision> for f64 {
    fn from(precision: Precision) -> f64 {
        precision.0
    }
}

impl PartialEq for Precision {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}

impl Eq for Precision {}

impl Hash for Precision {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

impl PartialOrd for Precision {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Precision {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl std::fmt::Display for Precision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A grid-line intersection at which aggregate statistics are stored
///
/// Stored as integer grid indices rather than rounded floats, so two keys
/// for the same intersection always compare equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AnchorKey {
    pub lat_index: i64,
    pub lon_index: i64,
    pub precision: Precision,
}

impl AnchorKey {
    /// Create an anchor key from grid indices
    pub fn new(lat_index: i64, lon_index: i64, precision: Precision) -> Self {
        Self {
            lat_index,
            lon_index,
            precision,
        }
    }

    /// The anchor closest to `coords`
    pub fn nearest(coords: Coordinates, precision: Precision) -> Self {
        let p = precision.value();
        Self::new(
            (coords.lat * p).round() as i64,
            (coords.lon * p).round() as i64,
            precision,
        )
    }

    /// Anchor latitude in degrees
    pub fn lat(&self) -> f64 {
        self.lat_index as f64 / self.precision.value()
    }

    /// Anchor longitude in degrees
    pub fn lon(&self) -> f64 {
        self.lon_index as f64 / self.precision.value()
    }

    /// Anchor position as coordinates
    pub fn coords(&self) -> Coordinates {
        Coordinates::new(self.lat(), self.lon())
    }
}

impl std::fmt::Display for AnchorKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{}@{}", self.lat(), self.lon(), self.precision)
    }
}
