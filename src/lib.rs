//! crowdmap: crowd-sensed people, vehicle, and noise map
//!
//! A library and CLI tool that folds geolocated sensor observations into a
//! regular grid of anchors and answers point queries by interpolating
//! between them.
//!
//! ## Features
//!
//! - Bilinear spreading of each observation onto up to four grid anchors
//! - Concurrent, idempotent merges into per-anchor aggregates
//! - Grid estimates with coverage, and Gaussian kernel estimates from raw
//!   observations
//! - JSON snapshot persistence
//! - HTTP API + CLI interface
//!
//! ## Quick Start
//!
//! ```rust
//! use crowdmap::engine::AggregationEngine;
//! use crowdmap::grid::{Coordinates, Precision};
//! use crowdmap::observation::{ObjectCounts, Observation};
//! use crowdmap::query::StatisticsQuery;
//! use crowdmap::store::memory::{MemoryAnchorStore, MemoryObservationLog};
//! use std::sync::Arc;
//!
//! let anchors = Arc::new(MemoryAnchorStore::new());
//! let log = Arc::new(MemoryObservationLog::new());
//! let engine = AggregationEngine::new(anchors.clone(), log);
//! let precision = Precision::new(1000.0).unwrap();
//!
//! let here = Coordinates::new(46.00742, 8.95218);
//! let obs = Observation::new(ObjectCounts::new(12, 3), 64.0, here, chrono::Utc::now(), "cam-1");
//! engine.record(&obs, precision).unwrap();
//!
//! let estimate = StatisticsQuery::new(anchors).query(here, precision).unwrap();
//! println!("Estimate: {:?}", estimate);
//! ```

pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod format;
pub mod grid;
pub mod observation;
pub mod query;
pub mod server;
pub mod store;

// Re-export commonly used types
pub use config::Config;
pub use engine::AggregationEngine;
pub use error::{Error, Result};
pub use grid::{AnchorKey, Coordinates, Precision};
pub use observation::Observation;
