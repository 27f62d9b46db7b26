//! In-memory backend
//!
//! `MemoryAnchorStore` keeps one mutex per anchor. The anchor map itself is
//! only locked long enough to find or insert a slot, so merges into
//! different grid cells proceed in parallel.

use crate::error::{Error, Result};
use crate::grid::AnchorKey;
use crate::observation::Observation;
use crate::store::{
    AnchorRecord, AnchorStore, AppendOutcome, BoundingBox, Contribution, MergeOutcome,
    ObservationLog,
};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Condvar, Mutex, PoisonError, RwLock};
use tracing::debug;
use uuid::Uuid;

/// `None` until the first contribution lands
type Slot = Arc<Mutex<Option<AnchorRecord>>>;

fn poisoned<T>(_: PoisonError<T>) -> Error {
    Error::StoreUnavailable("lock poisoned by a panicked writer".to_string())
}

/// Ingest ids seen by batch merges
#[derive(Debug, Default)]
struct IngestIds {
    /// Batches fully applied. Grows with every ingest and is kept in
    /// snapshots; it is not derived from the log because a batch can be
    /// aggregated without being logged.
    applied: HashSet<Uuid>,
    /// Batches currently being applied
    in_flight: HashSet<Uuid>,
}

/// Anchor aggregates held in process memory
#[derive(Debug, Default)]
pub struct MemoryAnchorStore {
    slots: RwLock<HashMap<AnchorKey, Slot>>,
    ingests: Mutex<IngestIds>,
    /// Signalled whenever an in-flight batch settles
    settled: Condvar,
}

impl MemoryAnchorStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a store from saved records and applied ingest ids
    pub fn from_parts(records: Vec<AnchorRecord>, applied: Vec<Uuid>) -> Self {
        let slots = records
            .into_iter()
            .filter(|r| r.weight_acc > 0.0)
            .map(|r| (r.anchor, Arc::new(Mutex::new(Some(r)))))
            .collect();

        Self {
            slots: RwLock::new(slots),
            ingests: Mutex::new(IngestIds {
                applied: applied.into_iter().collect(),
                in_flight: HashSet::new(),
            }),
            settled: Condvar::new(),
        }
    }

    /// Ingest ids already folded in, for snapshots
    pub fn applied_ids(&self) -> Result<Vec<Uuid>> {
        let ingests = self.ingests.lock().map_err(poisoned)?;
        let mut ids: Vec<Uuid> = ingests.applied.iter().copied().collect();
        ids.sort();
        Ok(ids)
    }

    /// Reserve `ingest_id` for this caller
    ///
    /// Waits while another call applies the same id. Returns `false` once the
    /// id is applied, so `AlreadyApplied` is only reported for batches that
    /// are visible to readers.
    fn claim(&self, ingest_id: Uuid) -> Result<bool> {
        let mut ingests = self.ingests.lock().map_err(poisoned)?;
        loop {
            if ingests.applied.contains(&ingest_id) {
                return Ok(false);
            }
            if !ingests.in_flight.contains(&ingest_id) {
                ingests.in_flight.insert(ingest_id);
                return Ok(true);
            }
            ingests = self.settled.wait(ingests).map_err(poisoned)?;
        }
    }

    /// Release a claimed id, recording it as applied on success
    fn settle(&self, ingest_id: Uuid, applied: bool) -> Result<()> {
        let result = self.ingests.lock().map_err(poisoned).map(|mut ingests| {
            ingests.in_flight.remove(&ingest_id);
            if applied {
                ingests.applied.insert(ingest_id);
            }
        });
        self.settled.notify_all();
        result
    }

    /// Find the slot for `anchor`, inserting an empty one if needed
    fn slot(&self, anchor: AnchorKey) -> Result<Slot> {
        {
            let slots = self.slots.read().map_err(poisoned)?;
            if let Some(slot) = slots.get(&anchor) {
                return Ok(Arc::clone(slot));
            }
        }

        let mut slots = self.slots.write().map_err(poisoned)?;
        Ok(Arc::clone(slots.entry(anchor).or_default()))
    }

    /// Snapshot of every slot handle
    fn all_slots(&self) -> Result<Vec<Slot>> {
        let slots = self.slots.read().map_err(poisoned)?;
        Ok(slots.values().cloned().collect())
    }

    /// Lock every slot in key order, then apply; nothing changes if any lock fails
    fn apply_batch(&self, batch: &BTreeMap<AnchorKey, Contribution>) -> Result<()> {
        let slots = batch
            .keys()
            .map(|&anchor| self.slot(anchor))
            .collect::<Result<Vec<_>>>()?;

        let mut guards = Vec::with_capacity(slots.len());
        for slot in &slots {
            guards.push(slot.lock().map_err(poisoned)?);
        }

        for (guard, (&anchor, contribution)) in guards.iter_mut().zip(batch) {
            match guard.as_mut() {
                Some(record) => record.absorb(contribution),
                None => **guard = Some(AnchorRecord::new(anchor, contribution)),
            }
        }

        Ok(())
    }
}

impl AnchorStore for MemoryAnchorStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn get(&self, anchor: &AnchorKey) -> Result<Option<AnchorRecord>> {
        let slot = {
            let slots = self.slots.read().map_err(poisoned)?;
            match slots.get(anchor) {
                Some(slot) => Arc::clone(slot),
                None => return Ok(None),
            }
        };

        let record = slot.lock().map_err(poisoned)?;
        Ok(record.clone())
    }

    fn merge(&self, anchor: AnchorKey, contribution: Contribution) -> Result<()> {
        contribution.validate()?;

        let slot = self.slot(anchor)?;
        let mut record = slot.lock().map_err(poisoned)?;

        match record.as_mut() {
            Some(existing) => existing.absorb(&contribution),
            None => *record = Some(AnchorRecord::new(anchor, &contribution)),
        }

        debug!(%anchor, weight = contribution.weight, "merged contribution");
        Ok(())
    }

    fn merge_batch(
        &self,
        ingest_id: Uuid,
        contributions: &[(AnchorKey, Contribution)],
    ) -> Result<MergeOutcome> {
        let mut batch: BTreeMap<AnchorKey, Contribution> = BTreeMap::new();
        for (anchor, contribution) in contributions {
            contribution.validate()?;
            batch
                .entry(*anchor)
                .and_modify(|existing| *existing = existing.combine(contribution))
                .or_insert(*contribution);
        }

        if !self.claim(ingest_id)? {
            debug!(%ingest_id, "batch already applied");
            return Ok(MergeOutcome::AlreadyApplied);
        }

        let applied = self.apply_batch(&batch);
        self.settle(ingest_id, applied.is_ok())?;
        applied?;

        debug!(%ingest_id, anchors = batch.len(), "applied batch");
        Ok(MergeOutcome::Applied)
    }

    fn len(&self) -> Result<usize> {
        let mut count = 0;
        for slot in self.all_slots()? {
            if slot.lock().map_err(poisoned)?.is_some() {
                count += 1;
            }
        }
        Ok(count)
    }

    fn records(&self) -> Result<Vec<AnchorRecord>> {
        let mut records = Vec::new();
        for slot in self.all_slots()? {
            if let Some(record) = slot.lock().map_err(poisoned)?.clone() {
                records.push(record);
            }
        }
        records.sort_by_key(|r| r.anchor);
        Ok(records)
    }

    fn clear(&self) -> Result<()> {
        self.slots.write().map_err(poisoned)?.clear();
        self.ingests.lock().map_err(poisoned)?.applied.clear();
        Ok(())
    }
}

#[derive(Debug, Default)]
struct LogInner {
    observations: Vec<Observation>,
    ids: HashSet<Uuid>,
}

/// Raw observation log held in process memory
#[derive(Debug, Default)]
pub struct MemoryObservationLog {
    inner: RwLock<LogInner>,
}

impl MemoryObservationLog {
    /// Create an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a log from saved observations, dropping repeated ids
    pub fn from_observations(observations: Vec<Observation>) -> Self {
        let mut inner = LogInner::default();
        for obs in observations {
            if inner.ids.insert(obs.id) {
                inner.observations.push(obs);
            }
        }
        Self {
            inner: RwLock::new(inner),
        }
    }

    fn filtered(&self, keep: impl Fn(&Observation) -> bool) -> Result<Vec<Observation>> {
        let inner = self.inner.read().map_err(poisoned)?;
        Ok(inner
            .observations
            .iter()
            .filter(|&obs| keep(obs))
            .cloned()
            .collect())
    }
}

impl ObservationLog for MemoryObservationLog {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn append(&self, obs: &Observation) -> Result<AppendOutcome> {
        let mut inner = self.inner.write().map_err(poisoned)?;
        if !inner.ids.insert(obs.id) {
            return Ok(AppendOutcome::AlreadyPresent);
        }
        inner.observations.push(obs.clone());
        Ok(AppendOutcome::Appended)
    }

    fn in_box(&self, bbox: &BoundingBox) -> Result<Vec<Observation>> {
        self.filtered(|obs| bbox.contains(obs.coords()))
    }

    fn between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<Observation>> {
        self.filtered(|obs| obs.date >= from && obs.date <= to)
    }

    fn len(&self) -> Result<usize> {
        Ok(self.inner.read().map_err(poisoned)?.observations.len())
    }

    fn all(&self) -> Result<Vec<Observation>> {
        self.filtered(|_| true)
    }

    fn clear(&self) -> Result<()> {
        let mut inner = self.inner.write().map_err(poisoned)?;
        inner.observations.clear();
        inner.ids.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{Coordinates, Precision};
    use crate::observation::ObjectCounts;
    use approx::assert_relative_eq;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    fn key(lat_index: i64, lon_index: i64) -> AnchorKey {
        AnchorKey::new(lat_index, lon_index, Precision::new(1000.0).unwrap())
    }

    fn people(people: f64, weight: f64) -> Contribution {
        Contribution {
            people,
            vehicles: 0.0,
            noise: 50.0,
            weight,
        }
    }

    fn observation(lat: f64, lon: f64, hour: u32, device: &str) -> Observation {
        Observation::new(
            ObjectCounts::new(5, 1),
            45.0,
            Coordinates::new(lat, lon),
            Utc.with_ymd_and_hms(2024, 5, 17, hour, 0, 0).unwrap(),
            device,
        )
    }

    #[test]
    fn test_get_absent() {
        let store = MemoryAnchorStore::new();
        assert!(store.get(&key(1, 1)).unwrap().is_none());
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn test_merge_creates_then_accumulates() {
        let store = MemoryAnchorStore::new();
        store.merge(key(1, 1), people(100.0, 0.4)).unwrap();

        let record = store.get(&key(1, 1)).unwrap().unwrap();
        assert_relative_eq!(record.people_acc, 40.0);
        assert_relative_eq!(record.weight_acc, 0.4);

        store.merge(key(1, 1), people(200.0, 0.6)).unwrap();
        let record = store.get(&key(1, 1)).unwrap().unwrap();
        assert_relative_eq!(record.people_acc, 160.0);
        assert_relative_eq!(record.weight_acc, 1.0);
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn test_rejected_merge_changes_nothing() {
        let store = MemoryAnchorStore::new();
        assert!(store.merge(key(1, 1), people(100.0, 0.0)).is_err());
        assert!(store.get(&key(1, 1)).unwrap().is_none());
        assert_eq!(store.len().unwrap(), 0);
    }

    #[test]
    fn test_disjoint_merges_commute() {
        let forward = MemoryAnchorStore::new();
        forward.merge(key(1, 1), people(10.0, 0.3)).unwrap();
        forward.merge(key(2, 2), people(20.0, 0.7)).unwrap();

        let backward = MemoryAnchorStore::new();
        backward.merge(key(2, 2), people(20.0, 0.7)).unwrap();
        backward.merge(key(1, 1), people(10.0, 0.3)).unwrap();

        assert_eq!(forward.records().unwrap(), backward.records().unwrap());
    }

    #[test]
    fn test_merge_batch_is_idempotent() {
        let store = MemoryAnchorStore::new();
        let id = Uuid::new_v4();
        let batch = [(key(1, 1), people(10.0, 0.5)), (key(1, 2), people(10.0, 0.5))];

        assert_eq!(store.merge_batch(id, &batch).unwrap(), MergeOutcome::Applied);
        assert_eq!(store.merge_batch(id, &batch).unwrap(), MergeOutcome::AlreadyApplied);

        let record = store.get(&key(1, 1)).unwrap().unwrap();
        assert_relative_eq!(record.weight_acc, 0.5);
        assert_eq!(store.applied_ids().unwrap(), vec![id]);
    }

    #[test]
    fn test_merge_batch_combines_duplicate_anchors() {
        let store = MemoryAnchorStore::new();
        let batch = [(key(1, 1), people(10.0, 0.25)), (key(1, 1), people(30.0, 0.75))];

        store.merge_batch(Uuid::new_v4(), &batch).unwrap();

        let record = store.get(&key(1, 1)).unwrap().unwrap();
        assert_relative_eq!(record.weight_acc, 1.0);
        assert_relative_eq!(record.mean().people, 25.0);
    }

    #[test]
    fn test_invalid_batch_applies_nothing() {
        let store = MemoryAnchorStore::new();
        let id = Uuid::new_v4();
        let batch = [(key(1, 1), people(10.0, 0.5)), (key(1, 2), people(10.0, -0.5))];

        assert!(store.merge_batch(id, &batch).is_err());
        assert!(store.is_empty().unwrap());
        assert!(store.applied_ids().unwrap().is_empty());
    }

    #[test]
    fn test_concurrent_merges_same_anchor() {
        let store = MemoryAnchorStore::new();

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    for _ in 0..500 {
                        store.merge(key(7, 7), people(2.0, 0.5)).unwrap();
                    }
                });
            }
        });

        let record = store.get(&key(7, 7)).unwrap().unwrap();
        assert_relative_eq!(record.weight_acc, 8.0 * 500.0 * 0.5);
        assert_relative_eq!(record.people_acc, 8.0 * 500.0 * 1.0);
    }

    #[test]
    fn test_concurrent_batches_overlapping_anchors() {
        let store = MemoryAnchorStore::new();

        std::thread::scope(|scope| {
            for t in 0..4 {
                let store = &store;
                scope.spawn(move || {
                    for i in 0..200 {
                        // Alternate order so lock ordering is exercised
                        let batch = if (t + i) % 2 == 0 {
                            [(key(1, 1), people(1.0, 0.5)), (key(1, 2), people(1.0, 0.5))]
                        } else {
                            [(key(1, 2), people(1.0, 0.5)), (key(1, 1), people(1.0, 0.5))]
                        };
                        store.merge_batch(Uuid::new_v4(), &batch).unwrap();
                    }
                });
            }
        });

        for anchor in [key(1, 1), key(1, 2)] {
            let record = store.get(&anchor).unwrap().unwrap();
            assert_relative_eq!(record.weight_acc, 4.0 * 200.0 * 0.5);
        }
    }

    #[test]
    fn test_readers_never_see_half_merged_record() {
        let store = MemoryAnchorStore::new();
        let done = AtomicBool::new(false);

        std::thread::scope(|scope| {
            let writers: Vec<_> = (0..4)
                .map(|t| {
                    let store = &store;
                    scope.spawn(move || {
                        for i in 0..500 {
                            let weight = [0.25, 0.5, 1.0][(t + i) % 3];
                            store.merge(key(5, 5), people(3.0, weight)).unwrap();
                        }
                    })
                })
                .collect();

            for _ in 0..4 {
                scope.spawn(|| {
                    let mut reads = 0;
                    while !done.load(Ordering::Acquire) || reads == 0 {
                        if let Some(record) = store.get(&key(5, 5)).unwrap() {
                            assert_relative_eq!(
                                record.people_acc / record.weight_acc,
                                3.0,
                                epsilon = 1e-12
                            );
                            reads += 1;
                        }
                    }
                });
            }

            for writer in writers {
                writer.join().unwrap();
            }
            done.store(true, Ordering::Release);
        });
    }

    #[test]
    fn test_concurrent_retries_only_report_visible_batches() {
        let store = MemoryAnchorStore::new();

        for round in 0..100 {
            let id = Uuid::new_v4();
            let anchor = key(round, round);
            let applied = AtomicUsize::new(0);

            std::thread::scope(|scope| {
                for _ in 0..6 {
                    scope.spawn(|| {
                        match store.merge_batch(id, &[(anchor, people(4.0, 1.0))]).unwrap() {
                            MergeOutcome::Applied => {
                                applied.fetch_add(1, Ordering::SeqCst);
                            }
                            MergeOutcome::AlreadyApplied => {
                                assert!(store.get(&anchor).unwrap().is_some());
                            }
                        }
                    });
                }
            });

            assert_eq!(applied.load(Ordering::SeqCst), 1);
            assert_relative_eq!(store.get(&anchor).unwrap().unwrap().weight_acc, 1.0);
        }
    }

    #[test]
    fn test_failed_batch_releases_id() {
        let store = MemoryAnchorStore::new();
        let slot = store.slot(key(9, 9)).unwrap();
        let _ = std::thread::spawn(move || {
            let _guard = slot.lock().unwrap();
            panic!("writer died holding the slot");
        })
        .join();

        let id = Uuid::new_v4();
        assert!(matches!(
            store.merge_batch(id, &[(key(9, 9), people(1.0, 1.0))]),
            Err(Error::StoreUnavailable(_))
        ));
        assert!(store.applied_ids().unwrap().is_empty());

        let outcome = store.merge_batch(id, &[(key(1, 1), people(1.0, 1.0))]).unwrap();
        assert_eq!(outcome, MergeOutcome::Applied);
    }

    #[test]
    fn test_from_parts_round_trip() {
        let store = MemoryAnchorStore::new();
        store.merge(key(1, 1), people(10.0, 0.5)).unwrap();
        store.merge(key(3, 4), people(20.0, 0.25)).unwrap();

        let restored = MemoryAnchorStore::from_parts(store.records().unwrap(), vec![]);
        assert_eq!(restored.records().unwrap(), store.records().unwrap());
    }

    #[test]
    fn test_clear() {
        let store = MemoryAnchorStore::new();
        store.merge(key(1, 1), people(10.0, 0.5)).unwrap();
        store.clear().unwrap();
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn test_log_append_is_idempotent() {
        let log = MemoryObservationLog::new();
        let obs = observation(46.0, 9.0, 10, "cam-01");

        assert_eq!(log.append(&obs).unwrap(), AppendOutcome::Appended);
        assert_eq!(log.append(&obs).unwrap(), AppendOutcome::AlreadyPresent);
        assert_eq!(log.len().unwrap(), 1);
    }

    #[test]
    fn test_log_in_box() {
        let log = MemoryObservationLog::new();
        log.append(&observation(46.0, 9.0, 10, "a")).unwrap();
        log.append(&observation(46.004, 9.003, 10, "b")).unwrap();
        log.append(&observation(47.0, 9.0, 10, "c")).unwrap();

        let bbox = BoundingBox::around(Coordinates::new(46.0, 9.0), 0.005);
        let found = log.in_box(&bbox).unwrap();
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|o| o.device_id != "c"));
    }

    #[test]
    fn test_log_between() {
        let log = MemoryObservationLog::new();
        for hour in [8, 10, 12, 14] {
            log.append(&observation(46.0, 9.0, hour, "a")).unwrap();
        }

        let from = Utc.with_ymd_and_hms(2024, 5, 17, 10, 0, 0).unwrap();
        let to = Utc.with_ymd_and_hms(2024, 5, 17, 12, 0, 0).unwrap();
        assert_eq!(log.between(from, to).unwrap().len(), 2);
    }

    #[test]
    fn test_log_from_observations_dedups() {
        let obs = observation(46.0, 9.0, 10, "a");
        let log = MemoryObservationLog::from_observations(vec![obs.clone(), obs]);
        assert_eq!(log.len().unwrap(), 1);
    }
}
