//! Server shared state
//!
//! Holds configuration, the stores, and the engine and query handles built
//! on top of them.

use crate::config::Config;
use crate::engine::AggregationEngine;
use crate::error::Result;
use crate::grid::Precision;
use crate::query::{NeighborhoodQuery, StatisticsQuery};
use crate::store::memory::{MemoryAnchorStore, MemoryObservationLog};
use crate::store::snapshot::Snapshot;
use std::sync::Arc;
use std::time::Instant;

/// Shared state for the HTTP server
pub struct AppState {
    /// Configuration
    pub config: Config,

    /// Grid resolution used when a request does not name one
    pub precision: Precision,

    pub engine: AggregationEngine,
    pub statistics: StatisticsQuery,
    pub neighborhood: NeighborhoodQuery,

    anchors: Arc<MemoryAnchorStore>,
    log: Arc<MemoryObservationLog>,
    started: Instant,
}

impl AppState {
    /// Create state with empty stores
    pub fn new(config: Config) -> Result<Self> {
        Self::with_stores(config, MemoryAnchorStore::new(), MemoryObservationLog::new())
    }

    /// Create state with stores restored from a snapshot
    pub fn from_snapshot(config: Config, snapshot: Snapshot) -> Result<Self> {
        let (anchors, log) = snapshot.restore();
        Self::with_stores(config, anchors, log)
    }

    fn with_stores(
        config: Config,
        anchors: MemoryAnchorStore,
        log: MemoryObservationLog,
    ) -> Result<Self> {
        let precision = config.precision()?;
        let anchors = Arc::new(anchors);
        let log = Arc::new(log);

        Ok(Self {
            config,
            precision,
            engine: AggregationEngine::new(anchors.clone(), log.clone()),
            statistics: StatisticsQuery::new(anchors.clone()),
            neighborhood: NeighborhoodQuery::new(log.clone()),
            anchors,
            log,
            started: Instant::now(),
        })
    }

    /// Capture both stores for persistence
    pub fn snapshot(&self) -> Result<Snapshot> {
        Snapshot::capture(&self.anchors, &self.log)
    }

    /// Seconds since the state was created
    pub fn uptime_secs(&self) -> u64 {
        self.started.elapsed().as_secs()
    }
}
