//! Ingestion session: everything one sensor daemon's poll loop owns.
//!
//! The store handle, channel filters, heartbeat marker, clocks and journal live
//! here as fields of one value; nothing is process-global.

#![allow(missing_docs)]

use crate::core::clock::{MonotonicClock, Timestamp, WallClock};
use crate::core::config::{ChannelConfig, Config};
use crate::core::errors::{GhError, Result};
use crate::ingest::guard;
use crate::ingest::heartbeat::HeartbeatTracker;
use crate::ingest::writer::{StorageWriter, WriteOutcome};
use crate::logger::diag;
use crate::logger::jsonl::{ActivitySink, JournalEntry, JournalEvent};
use crate::monitor::pipeline::{ChannelCalibration, ChannelPipeline, PollDecision};
use crate::store::{RecordBackend, Store};

/// Result of one poll cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Written(Timestamp),
    Dropped,
    /// Nothing reportable; `heartbeat` holds the idle seconds if one fired.
    Idle { heartbeat: Option<i64> },
}

pub struct Session<B, C, J> {
    sensor: String,
    store: Store<B>,
    pipeline: ChannelPipeline,
    writer: StorageWriter,
    heartbeat: HeartbeatTracker,
    clock: C,
    journal: J,
}

impl<B, C, J> Session<B, C, J>
where
    B: RecordBackend,
    C: WallClock + MonotonicClock,
    J: ActivitySink,
{
    /// Prepare the store, run the clock guard and resolve calibrations.
    ///
    /// Fails before anything is written if the wall clock is behind the
    /// store's newest record.
    pub fn start(mut store: Store<B>, config: &Config, clock: C, mut journal: J) -> Result<Self> {
        let sensor = config.sensor.name.clone();
        store.initialize()?;

        if let Err(err) = guard::check(&mut store, &clock) {
            if matches!(err, GhError::ClockRegression { .. }) {
                diag::warn("GHPI-GUARD", format_args!("{err}; aborting"));
                journal.record(
                    JournalEntry::new(JournalEvent::ClockRegression, &sensor).with_error(&err),
                );
            }
            return Err(err);
        }

        let calibrations = resolve_channels(&mut store, &sensor, &config.sensor.channels)?;
        let pipeline = ChannelPipeline::new(
            calibrations,
            config.engine.hysteresis_scale,
            config.sensor.warm_up_cycles,
        );
        let writer = StorageWriter::new(&sensor, config.engine.timestamp_retry_max);
        let heartbeat = HeartbeatTracker::new(
            &sensor,
            config.engine.heartbeat_period(),
            MonotonicClock::now(&clock),
        );

        let mut start = JournalEntry::new(JournalEvent::DaemonStart, &sensor)
            .with_details(format!("table={}", config.sensor.table_name()));
        if let Ok(hash) = config.stable_hash() {
            start = start.with_config_hash(hash);
        }
        journal.record(start);

        Ok(Self {
            sensor,
            store,
            pipeline,
            writer,
            heartbeat,
            clock,
            journal,
        })
    }

    /// Feed one poll of raw readings (`None` = channel unreadable).
    pub fn poll(&mut self, raw: &[Option<f64>]) -> Result<PollOutcome> {
        match self.pipeline.process(raw)? {
            PollDecision::Record(values) => Ok(match self.persist(&values)? {
                WriteOutcome::Persisted(ts) => PollOutcome::Written(ts),
                WriteOutcome::Dropped { .. } => PollOutcome::Dropped,
            }),
            PollDecision::Idle => Ok(PollOutcome::Idle {
                heartbeat: self.idle()?,
            }),
        }
    }

    /// Persist already-filtered values. `nullability[i] == true` stores NULL
    /// for channel `i`; an empty `nullability` means no nulls.
    pub fn write(&mut self, values: &[i64], nullability: &[bool]) -> Result<WriteOutcome> {
        let expected = self.pipeline.channel_count();
        if values.len() != expected {
            return Err(GhError::ChannelCount {
                expected,
                got: values.len(),
            });
        }
        if !nullability.is_empty() && nullability.len() != values.len() {
            return Err(GhError::ChannelCount {
                expected,
                got: nullability.len(),
            });
        }
        let bound: Vec<Option<i64>> = values
            .iter()
            .enumerate()
            .map(|(i, v)| (!nullability.get(i).copied().unwrap_or(false)).then_some(*v))
            .collect();
        self.persist(&bound)
    }

    /// Nothing to record this cycle; maybe emit a heartbeat.
    pub fn idle(&mut self) -> Result<Option<i64>> {
        let now = MonotonicClock::now(&self.clock);
        self.heartbeat.tick(now, &mut self.store, &mut self.journal)
    }

    fn persist(&mut self, values: &[Option<i64>]) -> Result<WriteOutcome> {
        let outcome = self
            .writer
            .write(&mut self.store, &self.clock, values, &mut self.journal)?;
        if outcome.is_persisted() {
            self.heartbeat.mark_activity(MonotonicClock::now(&self.clock));
        }
        Ok(outcome)
    }

    pub fn sensor(&self) -> &str {
        &self.sensor
    }

    pub fn pipeline(&self) -> &ChannelPipeline {
        &self.pipeline
    }

    pub fn store(&self) -> &Store<B> {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut Store<B> {
        &mut self.store
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn journal(&self) -> &J {
        &self.journal
    }
}

/// Turn channel configs into concrete calibrations, reading keyed constants
/// from the store. A missing or non-FLOAT key is fatal.
pub fn resolve_channels<B: RecordBackend>(
    store: &mut Store<B>,
    sensor: &str,
    channels: &[ChannelConfig],
) -> Result<Vec<ChannelCalibration>> {
    channels
        .iter()
        .map(|channel| {
            let scale = match (&channel.scale_key, channel.scale) {
                (Some(key), _) => store.calibration_f64(key)?,
                (None, Some(scale)) => scale,
                (None, None) => 1.0,
            };
            let offset = match (&channel.offset_key, channel.offset) {
                (Some(key), _) => store.calibration_f64(key)?,
                (None, Some(offset)) => offset,
                (None, None) => 0.0,
            };
            if !(scale.is_finite() && offset.is_finite()) {
                return Err(GhError::InvalidConfig {
                    details: format!("{sensor} channel {:?} calibration is not finite", channel.name),
                });
            }
            Ok(
                ChannelCalibration::new(&channel.name, scale, offset, channel.mode)
                    .with_store_multiplier(channel.store_multiplier.unwrap_or(1)),
            )
        })
        .collect()
}
