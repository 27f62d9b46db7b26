//! Most recent reading per device and location
//!
//! Reporting wants one row per `(device, place)`: the newest observation a
//! device made near each grid anchor within a date range. Locations are
//! rounded to the nearest anchor at the grid resolution.

use crate::error::Result;
use crate::grid::{AnchorKey, Precision};
use crate::observation::Observation;
use crate::store::ObservationLog;
use chrono::{DateTime, Utc};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

/// Latest observation for each `(device_id, rounded location)` in `[from, to]`
///
/// Output is sorted by device id, then latitude, then longitude. Ties on
/// `date` keep the observation logged first.
pub fn latest_per_device(
    log: &dyn ObservationLog,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    precision: Precision,
) -> Result<Vec<Observation>> {
    let mut latest: BTreeMap<(String, i64, i64), Observation> = BTreeMap::new();

    for obs in log.between(from, to)? {
        let anchor = AnchorKey::nearest(obs.coords(), precision);
        let group = (obs.device_id.clone(), anchor.lat_index, anchor.lon_index);

        match latest.entry(group) {
            Entry::Vacant(slot) => {
                slot.insert(obs);
            }
            Entry::Occupied(mut slot) => {
                if obs.date > slot.get().date {
                    slot.insert(obs);
                }
            }
        }
    }

    Ok(latest.into_values().collect())
}
