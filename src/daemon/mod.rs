//! Daemon subsystem: reading sources, the poll loop, and the latest-readings stream.

pub mod loop_main;
pub mod source;
#[cfg(feature = "sqlite")]
pub mod stream;
