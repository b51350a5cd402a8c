//! Timestamped human diagnostics on stderr.
//!
//! Every line reads `YYYY-MM-DD HH:MM:SS [GHPI-COMPONENT] message` in local
//! time, so interleaved output from several sensor daemons in one journal can
//! still be ordered and attributed.

#![allow(missing_docs)]

use std::fmt::Display;
use std::io::{self, Write};

use crate::core::clock::Timestamp;

const STAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Local wall-clock time formatted for diagnostics.
#[must_use]
pub fn stamp() -> String {
    chrono::Local::now().format(STAMP_FORMAT).to_string()
}

/// Render one diagnostic line without emitting it.
#[must_use]
pub fn line(component: &str, message: impl Display) -> String {
    format!("{} [{component}] {message}", stamp())
}

/// Emit a diagnostic line. Write failures are ignored.
pub fn warn(component: &str, message: impl Display) {
    let _ = writeln!(io::stderr(), "{}", line(component, message));
}

/// Emit a diagnostic stamped with a record timestamp instead of "now".
pub fn warn_at(ts: Timestamp, component: &str, message: impl Display) {
    let _ = writeln!(
        io::stderr(),
        "{} [{component}] {message}",
        ts.local_label()
    );
}

/// Startup banner: `<stamp> Starting <program>`.
#[must_use]
pub fn banner(program: &str) -> String {
    format!("{} Starting {program}", stamp())
}
