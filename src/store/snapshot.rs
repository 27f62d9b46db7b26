//! Snapshot persistence for the in-memory backend
//!
//! Saves anchor aggregates and the raw observation log to a JSON file.
//! The default location is the XDG data directory
//! (~/.local/share/crowdmap/state.json).

use crate::config::defaults::APP_DIR_NAME;
use crate::error::{Error, Result};
use crate::observation::Observation;
use crate::store::memory::{MemoryAnchorStore, MemoryObservationLog};
use crate::store::{AnchorRecord, AnchorStore, ObservationLog};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
use uuid::Uuid;

const SNAPSHOT_FILE_NAME: &str = "state.json";

/// Serialized state of both stores
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    /// When this snapshot was taken
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<DateTime<Utc>>,

    /// Anchor aggregates
    #[serde(default)]
    pub anchors: Vec<AnchorRecord>,

    /// Ingest ids already folded into the anchors
    #[serde(default)]
    pub applied: Vec<Uuid>,

    /// Raw observation log
    #[serde(default)]
    pub observations: Vec<Observation>,
}

impl Snapshot {
    /// Get the data directory path
    pub fn data_dir() -> Result<PathBuf> {
        dirs::data_dir()
            .map(|p| p.join(APP_DIR_NAME))
            .ok_or_else(|| Error::Config("Could not determine data directory".to_string()))
    }

    /// Get the default snapshot file path
    pub fn default_path() -> Result<PathBuf> {
        Ok(Self::data_dir()?.join(SNAPSHOT_FILE_NAME))
    }

    /// Load a snapshot; a missing file is an empty snapshot
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| {
            Error::StoreUnavailable(format!("Failed to read snapshot {}: {}", path.display(), e))
        })?;

        serde_json::from_str(&content).map_err(|e| {
            Error::StoreUnavailable(format!("Failed to parse snapshot {}: {}", path.display(), e))
        })
    }

    /// Write the snapshot, creating parent directories as needed
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                Error::StoreUnavailable(format!("Failed to create snapshot directory: {}", e))
            })?;
        }

        let content = serde_json::to_string_pretty(self)?;

        // The snapshot at `path` is always complete
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, content).map_err(|e| {
            Error::StoreUnavailable(format!("Failed to write snapshot: {}", e))
        })?;
        fs::rename(&tmp, path).map_err(|e| {
            Error::StoreUnavailable(format!("Failed to replace snapshot: {}", e))
        })?;

        info!(
            path = %path.display(),
            anchors = self.anchors.len(),
            observations = self.observations.len(),
            "saved snapshot"
        );
        Ok(())
    }

    /// Capture the current contents of both stores
    pub fn capture(anchors: &MemoryAnchorStore, log: &MemoryObservationLog) -> Result<Self> {
        Ok(Self {
            saved_at: Some(Utc::now()),
            anchors: anchors.records()?,
            applied: anchors.applied_ids()?,
            observations: log.all()?,
        })
    }

    /// Rebuild both stores from this snapshot
    pub fn restore(self) -> (MemoryAnchorStore, MemoryObservationLog) {
        (
            MemoryAnchorStore::from_parts(self.anchors, self.applied),
            MemoryObservationLog::from_observations(self.observations),
        )
    }
}
