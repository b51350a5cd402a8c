//! Idle heartbeat: proves a sensor daemon is alive while its readings are flat.

#![allow(missing_docs)]

use std::time::{Duration, Instant};

use crate::core::errors::Result;
use crate::logger::diag;
use crate::logger::jsonl::{ActivitySink, JournalEntry, JournalEvent};
use crate::store::{RecordBackend, Store};

pub const DEFAULT_HEARTBEAT_PERIOD: Duration = Duration::from_secs(5);

/// Upserts one liveness row per sensor after each idle stretch of `period`.
///
/// `last_activity` is monotonic time; successful record writes push it
/// forward so heartbeats only appear when nothing else is being logged.
#[derive(Debug, Clone)]
pub struct HeartbeatTracker {
    sensor: String,
    period: Duration,
    last_activity: Instant,
}

impl HeartbeatTracker {
    #[must_use]
    pub fn new(sensor: impl Into<String>, period: Duration, now: Instant) -> Self {
        Self {
            sensor: sensor.into(),
            period,
            last_activity: now,
        }
    }

    /// A record was written at `now`.
    pub fn mark_activity(&mut self, now: Instant) {
        self.last_activity = now;
    }

    #[must_use]
    pub const fn last_activity(&self) -> Instant {
        self.last_activity
    }

    #[must_use]
    pub const fn period(&self) -> Duration {
        self.period
    }

    /// Called on every idle poll. Returns the idle seconds written, if a
    /// heartbeat fired. Store failures (busy exhaustion included) are fatal.
    pub fn tick<B: RecordBackend>(
        &mut self,
        now: Instant,
        store: &mut Store<B>,
        journal: &mut dyn ActivitySink,
    ) -> Result<Option<i64>> {
        let elapsed = now.saturating_duration_since(self.last_activity);
        if elapsed < self.period {
            return Ok(None);
        }
        let elapsed_secs = i64::try_from(elapsed.as_secs()).unwrap_or(i64::MAX);
        if let Err(err) = store.upsert_heartbeat(&self.sensor, elapsed_secs) {
            diag::warn(
                "GHPI-HEARTBEAT",
                format_args!("failed to upsert {} heartbeat: {err}", self.sensor),
            );
            return Err(err);
        }
        self.last_activity = now;
        journal.record(
            JournalEntry::new(JournalEvent::IdleHeartbeat, &self.sensor).with_elapsed(elapsed_secs),
        );
        Ok(Some(elapsed_secs))
    }
}
