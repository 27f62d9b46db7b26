//! Observation ingestion
//!
//! The engine spreads each observation onto its grid anchors and folds the
//! weighted contributions into the anchor store. Independently, it appends
//! the raw observation to the log. The two writes share no transaction, so
//! a failure of either one is reported on its own and can be retried
//! without double counting the half that succeeded.

use crate::error::{Error, Result};
use crate::grid::{spread, AnchorKey, Precision};
use crate::observation::Observation;
use crate::store::{AnchorStore, AppendOutcome, Contribution, MergeOutcome, ObservationLog};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// What happened to an ingested observation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IngestReceipt {
    pub id: Uuid,
    pub merge: MergeOutcome,
    pub append: AppendOutcome,
    /// Number of anchors the observation was spread over
    pub anchors: usize,
}

/// Folds observations into anchor aggregates and the raw log
#[derive(Clone)]
pub struct AggregationEngine {
    anchors: Arc<dyn AnchorStore>,
    log: Arc<dyn ObservationLog>,
}

impl AggregationEngine {
    /// Create an engine over the given stores
    pub fn new(anchors: Arc<dyn AnchorStore>, log: Arc<dyn ObservationLog>) -> Self {
        Self { anchors, log }
    }

    /// The anchor store this engine writes to
    pub fn anchors(&self) -> Arc<dyn AnchorStore> {
        Arc::clone(&self.anchors)
    }

    /// The observation log this engine writes to
    pub fn log(&self) -> Arc<dyn ObservationLog> {
        Arc::clone(&self.log)
    }

    /// Ingest an observation
    ///
    /// Validates first; an invalid observation changes nothing. Then merges
    /// into the anchors and appends to the log.
    ///
    /// # Errors
    /// * `InvalidCoordinate` - rejected before any write
    /// * `PartialIngestFailure` - exactly one of the two writes failed
    /// * `StoreUnavailable` - both writes failed
    pub fn record(&self, obs: &Observation, precision: Precision) -> Result<IngestReceipt> {
        obs.validate()?;

        let anchors = spread(obs.coords(), precision);
        let merged = self.merge_spread(obs, &anchors);
        let appended = self.log.append(obs);

        match (merged, appended) {
            (Ok(merge), Ok(append)) => {
                debug!(id = %obs.id, anchors = anchors.len(), "recorded observation");
                Ok(IngestReceipt {
                    id: obs.id,
                    merge,
                    append,
                    anchors: anchors.len(),
                })
            }
            (Ok(_), Err(e)) => {
                warn!(id = %obs.id, error = %e, "aggregated but not logged");
                Err(Error::PartialIngestFailure {
                    id: obs.id,
                    aggregated: true,
                    logged: false,
                    reason: e.to_string(),
                })
            }
            (Err(e), Ok(_)) => {
                warn!(id = %obs.id, error = %e, "logged but not aggregated");
                Err(Error::PartialIngestFailure {
                    id: obs.id,
                    aggregated: false,
                    logged: true,
                    reason: e.to_string(),
                })
            }
            (Err(merge_err), Err(append_err)) => Err(Error::StoreUnavailable(format!(
                "merge failed: {}; append failed: {}",
                merge_err, append_err
            ))),
        }
    }

    /// Fold an observation into the anchor aggregates only
    ///
    /// Safe to retry: a second call with the same observation id is a no-op.
    pub fn aggregate(&self, obs: &Observation, precision: Precision) -> Result<MergeOutcome> {
        obs.validate()?;
        let anchors = spread(obs.coords(), precision);
        self.merge_spread(obs, &anchors)
    }

    /// Append an observation to the raw log only
    ///
    /// Safe to retry: a second call with the same observation id is a no-op.
    pub fn append(&self, obs: &Observation) -> Result<AppendOutcome> {
        obs.validate()?;
        self.log.append(obs)
    }

    fn merge_spread(&self, obs: &Observation, anchors: &[(AnchorKey, f64)]) -> Result<MergeOutcome> {
        let contributions: Vec<_> = anchors
            .iter()
            .map(|&(anchor, weight)| (anchor, Contribution::from_observation(obs, weight)))
            .collect();

        self.anchors.merge_batch(obs.id, &contributions)
    }
}
