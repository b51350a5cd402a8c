//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use ghpi_telemetry::prelude::*;
//! ```

// Core
pub use crate::core::clock::{ManualClock, MonotonicClock, SystemClock, Timestamp, WallClock};
pub use crate::core::config::{ChannelConfig, Config};
pub use crate::core::errors::{GhError, Result};

// Monitor
pub use crate::monitor::hysteresis::{HysteresisFilter, HysteresisState};
pub use crate::monitor::pipeline::{ChannelCalibration, ChannelPipeline, FilterMode, PollDecision};

// Store
pub use crate::store::backoff::{BusyDecision, BusyPolicy};
pub use crate::store::memory::MemoryBackend;
#[cfg(feature = "sqlite")]
pub use crate::store::sqlite::SqliteBackend;
pub use crate::store::{RecordBackend, Store, StoreFault, StoredValue};

// Ingest
pub use crate::ingest::session::{PollOutcome, Session};
pub use crate::ingest::writer::{StorageWriter, WriteOutcome};

// Logging
pub use crate::logger::jsonl::{ActivitySink, JournalEntry, JournalEvent, NullSink};
