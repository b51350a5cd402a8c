//! Latest-readings stream: periodically print the `Last_logs` view as one line.
//!
//! Feeds dashboards that tail the process output. Each frame is
//! `col1,col2!v1,v2`; frames where the view has no row are skipped.

#![allow(missing_docs)]

use std::io::Write;
use std::thread;
use std::time::Duration;

use crate::core::errors::{GhError, Result};
use crate::store::Store;
use crate::store::sqlite::SqliteBackend;

pub const STREAM_PERIOD: Duration = Duration::from_millis(250);

/// Emit frames until `max_frames` have been written (forever when `None`).
/// Returns the number of frames written.
pub fn stream(
    store: &mut Store<SqliteBackend>,
    out: &mut impl Write,
    period: Duration,
    max_frames: Option<u64>,
) -> Result<u64> {
    let mut frames = 0_u64;
    loop {
        if max_frames.is_some_and(|max| frames >= max) {
            return Ok(frames);
        }
        let latest = store
            .with_retry("latest_logs", SqliteBackend::latest_logs)
            .map_err(|fault| fault.into_error("latest_logs"))?;
        if let Some(snapshot) = latest {
            writeln!(out, "{}", snapshot.render())
                .and_then(|()| out.flush())
                .map_err(|source| GhError::io("<stdout>", source))?;
            frames += 1;
        }
        if !period.is_zero() {
            thread::sleep(period);
        }
    }
}
