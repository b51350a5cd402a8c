//! Storage writer: persists one multi-channel record under a unique timestamp key.
//!
//! The key comes from the wall clock. When it collides with an existing row the
//! sub-second counter is bumped and the insert retried, up to a fixed number of
//! attempts; past that, or if the store stays busy, the record is dropped and
//! logged so the poll loop keeps running.

#![allow(missing_docs)]

use crate::core::clock::{Timestamp, WallClock};
use crate::core::errors::Result;
use crate::logger::diag;
use crate::logger::jsonl::{ActivitySink, JournalEntry, JournalEvent};
use crate::store::{RecordBackend, Store, StoreFault};

pub const DEFAULT_TIMESTAMP_RETRY_MAX: u32 = 20;

/// Why a record was not persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Every attempted key was already taken.
    Collisions,
    /// The busy policy gave up on one of the attempts.
    StoreBusy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Persisted(Timestamp),
    Dropped { reason: DropReason, attempts: u32 },
}

impl WriteOutcome {
    #[must_use]
    pub const fn is_persisted(&self) -> bool {
        matches!(self, Self::Persisted(_))
    }
}

#[derive(Debug, Clone)]
pub struct StorageWriter {
    sensor: String,
    retry_max: u32,
}

impl StorageWriter {
    #[must_use]
    pub fn new(sensor: impl Into<String>, retry_max: u32) -> Self {
        Self {
            sensor: sensor.into(),
            retry_max,
        }
    }

    #[must_use]
    pub const fn retry_max(&self) -> u32 {
        self.retry_max
    }

    /// Insert `values` keyed by the current wall-clock time.
    ///
    /// Returns `Err` only for store failures that are neither contention nor
    /// key collisions.
    pub fn write<B: RecordBackend, W: WallClock + ?Sized>(
        &self,
        store: &mut Store<B>,
        wall: &W,
        values: &[Option<i64>],
        journal: &mut dyn ActivitySink,
    ) -> Result<WriteOutcome> {
        let mut ts = wall.now();
        for attempt in 0..self.retry_max {
            match store.insert_record(ts, values) {
                Ok(()) => {
                    journal.record(
                        JournalEntry::new(JournalEvent::RecordWritten, &self.sensor)
                            .at(ts)
                            .with_values(values)
                            .with_attempt(attempt),
                    );
                    return Ok(WriteOutcome::Persisted(ts));
                }
                Err(StoreFault::KeyCollision) => {
                    ts = ts.bump();
                    diag::warn_at(
                        ts,
                        "GHPI-WRITER",
                        format_args!(
                            "timestamp collision during attempt {attempt} to insert {} record; retrying",
                            self.sensor
                        ),
                    );
                    journal.record(
                        JournalEntry::new(JournalEvent::TimestampCollision, &self.sensor)
                            .at(ts)
                            .with_attempt(attempt),
                    );
                }
                Err(StoreFault::Busy | StoreFault::BusyExhausted { .. }) => {
                    diag::warn_at(
                        ts,
                        "GHPI-WRITER",
                        format_args!("store stayed busy; dropping {} record", self.sensor),
                    );
                    journal.record(
                        JournalEntry::new(JournalEvent::RecordDropped, &self.sensor)
                            .at(ts)
                            .with_values(values)
                            .with_attempt(attempt)
                            .with_details("store busy"),
                    );
                    return Ok(WriteOutcome::Dropped {
                        reason: DropReason::StoreBusy,
                        attempts: attempt + 1,
                    });
                }
                Err(StoreFault::Failed(err)) => return Err(err),
            }
        }

        diag::warn_at(
            ts,
            "GHPI-WRITER",
            format_args!(
                "failed to insert {} record due to timestamp collisions in excess of {}; dropping it",
                self.sensor, self.retry_max
            ),
        );
        journal.record(
            JournalEntry::new(JournalEvent::RecordDropped, &self.sensor)
                .at(ts)
                .with_values(values)
                .with_attempt(self.retry_max)
                .with_details("timestamp collisions"),
        );
        Ok(WriteOutcome::Dropped {
            reason: DropReason::Collisions,
            attempts: self.retry_max,
        })
    }
}
