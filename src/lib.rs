#![forbid(unsafe_code)]

//! Greenhouse telemetry ingestion engine: turns polled sensor readings into
//! timestamped rows in a shared SQLite store.
//!
//! Each sensor daemon owns one [`ingest::session::Session`]:
//! 1. **Hysteresis filter** drops jitter so only reportable changes are written
//! 2. **Storage writer** keys every record by wall time and resolves key collisions
//! 3. **Idle heartbeat** proves liveness while readings stay flat
//!
//! Contention on the shared database is paced by [`store::backoff::BusyPolicy`].
//!
//! # Library usage
//!
//! ```rust,no_run
//! use ghpi_telemetry::prelude::*;
//! ```
//!
//! Individual modules can also be imported directly:
//!
//! ```rust,no_run
//! use ghpi_telemetry::core::config::Config;
//! use ghpi_telemetry::monitor::hysteresis::HysteresisFilter;
//! ```

pub mod prelude;

#[cfg(feature = "cli")]
pub mod cli;
pub mod core;
pub mod daemon;
pub mod ingest;
pub mod logger;
pub mod monitor;
pub mod store;
