//! In-memory backend for simulation, replay, and tests.
//!
//! Mirrors the SQLite schema's observable behavior: records keyed uniquely by
//! `(sec, subsec)`, one heartbeat row per sensor, a key/value config table and
//! a high-water mark that never goes below `(0, 0)`. Contention is scripted.

#![allow(missing_docs)]

use std::collections::{BTreeMap, VecDeque};

use crate::core::clock::Timestamp;
use crate::store::{FaultResult, RecordBackend, StoreFault, StoredValue};

#[derive(Debug, Default)]
pub struct MemoryBackend {
    records: BTreeMap<(i64, i64), Vec<Option<i64>>>,
    insert_order: Vec<(i64, i64)>,
    heartbeats: BTreeMap<String, i64>,
    heartbeat_writes: usize,
    config: BTreeMap<String, StoredValue>,
    external_high_water: Option<Timestamp>,
    busy_script: VecDeque<bool>,
    calls: usize,
    initialized: usize,
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Report busy on the next `n` operations, in addition to anything queued.
    pub fn script_busy(&mut self, n: usize) {
        self.busy_script.extend(std::iter::repeat_n(true, n));
    }

    /// Pretend another sensor table holds a record at `ts`.
    pub fn set_external_high_water(&mut self, ts: Timestamp) {
        self.external_high_water = Some(ts);
    }

    pub fn set_config(&mut self, key: impl Into<String>, value: StoredValue) {
        self.config.insert(key.into(), value);
    }

    /// Insert a record directly, bypassing collision checks.
    pub fn seed_record(&mut self, ts: Timestamp, values: Vec<Option<i64>>) {
        self.records.insert(ts.key(), values);
    }

    #[must_use]
    pub fn records(&self) -> &BTreeMap<(i64, i64), Vec<Option<i64>>> {
        &self.records
    }

    /// Keys of records written through the backend, in insertion order.
    #[must_use]
    pub fn insert_order(&self) -> &[(i64, i64)] {
        &self.insert_order
    }

    #[must_use]
    pub fn heartbeat(&self, sensor: &str) -> Option<i64> {
        self.heartbeats.get(sensor).copied()
    }

    #[must_use]
    pub fn heartbeat_rows(&self) -> usize {
        self.heartbeats.len()
    }

    /// Number of successful heartbeat upserts.
    #[must_use]
    pub const fn heartbeat_writes(&self) -> usize {
        self.heartbeat_writes
    }

    /// Number of backend operations attempted, busy ones included.
    #[must_use]
    pub const fn calls(&self) -> usize {
        self.calls
    }

    #[must_use]
    pub const fn initialized(&self) -> usize {
        self.initialized
    }

    fn enter(&mut self) -> FaultResult<()> {
        self.calls += 1;
        if self.busy_script.pop_front().unwrap_or(false) {
            return Err(StoreFault::Busy);
        }
        Ok(())
    }
}

impl RecordBackend for MemoryBackend {
    fn initialize(&mut self) -> FaultResult<()> {
        self.enter()?;
        self.initialized += 1;
        Ok(())
    }

    fn insert_record(&mut self, ts: Timestamp, values: &[Option<i64>]) -> FaultResult<()> {
        self.enter()?;
        let key = ts.key();
        if self.records.contains_key(&key) {
            return Err(StoreFault::KeyCollision);
        }
        self.records.insert(key, values.to_vec());
        self.insert_order.push(key);
        Ok(())
    }

    fn upsert_heartbeat(&mut self, sensor: &str, elapsed_secs: i64) -> FaultResult<()> {
        self.enter()?;
        self.heartbeats.insert(sensor.to_string(), elapsed_secs);
        self.heartbeat_writes += 1;
        Ok(())
    }

    fn high_water_mark(&mut self) -> FaultResult<Timestamp> {
        self.enter()?;
        let own = self
            .records
            .keys()
            .next_back()
            .map(|&(sec, subsec)| Timestamp::from_key(sec, subsec));
        let floor = Timestamp::from_key(0, 0);
        Ok([own, self.external_high_water]
            .into_iter()
            .flatten()
            .fold(floor, Ord::max))
    }

    fn config_value(&mut self, key: &str) -> FaultResult<Option<StoredValue>> {
        self.enter()?;
        Ok(self.config.get(key).cloned())
    }
}
