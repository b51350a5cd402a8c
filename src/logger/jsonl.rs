//! Activity journal: append-only JSONL record of what the ingestion engine did.
//!
//! One self-contained JSON object per line, assembled in memory and written
//! with a single `write_all` so a tailing reader never sees a torn line.
//!
//! Journal failures never stop ingestion. The writer degrades step by step:
//! 1. Primary file path
//! 2. Fallback path (e.g. a tmpfs under `/dev/shm`)
//! 3. stderr with a `[GHPI-JOURNAL]` prefix
//! 4. Silent discard

#![allow(missing_docs)]

use std::fs::{self, File, OpenOptions, rename};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::clock::Timestamp;
use crate::core::errors::{GhError, Result};

/// Journal event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JournalEvent {
    DaemonStart,
    RecordWritten,
    TimestampCollision,
    RecordDropped,
    IdleHeartbeat,
    ClockRegression,
}

/// A single journal line. `ts`, `event` and `sensor` are always present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    /// RFC 3339 UTC time the entry was produced.
    pub ts: String,
    pub event: JournalEvent,
    pub sensor: String,
    /// Record key seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sec: Option<i64>,
    /// Record key sub-second counter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subsec: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<Option<i64>>>,
    /// Zero-based attempt number within a write.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempt: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_secs: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub behind_secs: Option<i64>,
    /// Fingerprint of the effective configuration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl JournalEntry {
    /// New entry stamped with the current UTC time.
    pub fn new(event: JournalEvent, sensor: impl Into<String>) -> Self {
        Self {
            ts: format_utc_now(),
            event,
            sensor: sensor.into(),
            sec: None,
            subsec: None,
            values: None,
            attempt: None,
            elapsed_secs: None,
            behind_secs: None,
            config_hash: None,
            error_code: None,
            details: None,
        }
    }

    #[must_use]
    pub fn at(mut self, ts: Timestamp) -> Self {
        let (sec, subsec) = ts.key();
        self.sec = Some(sec);
        self.subsec = Some(subsec);
        self
    }

    #[must_use]
    pub fn with_values(mut self, values: &[Option<i64>]) -> Self {
        self.values = Some(values.to_vec());
        self
    }

    #[must_use]
    pub const fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = Some(attempt);
        self
    }

    #[must_use]
    pub const fn with_elapsed(mut self, elapsed_secs: i64) -> Self {
        self.elapsed_secs = Some(elapsed_secs);
        self
    }

    #[must_use]
    pub fn with_error(mut self, err: &GhError) -> Self {
        self.error_code = Some(err.code().to_string());
        self.details = Some(err.to_string());
        if let GhError::ClockRegression { behind_secs } = err {
            self.behind_secs = Some(*behind_secs);
        }
        self
    }

    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    #[must_use]
    pub fn with_config_hash(mut self, hash: impl Into<String>) -> Self {
        self.config_hash = Some(hash.into());
        self
    }
}

/// Destination for journal entries.
pub trait ActivitySink {
    fn record(&mut self, entry: JournalEntry);
}

/// Sink used when the journal is disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ActivitySink for NullSink {
    fn record(&mut self, _entry: JournalEntry) {}
}

/// Keeps entries in memory; for replay harnesses and tests.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    pub entries: Vec<JournalEntry>,
}

impl MemorySink {
    #[must_use]
    pub fn count(&self, event: JournalEvent) -> usize {
        self.entries.iter().filter(|e| e.event == event).count()
    }
}

impl ActivitySink for MemorySink {
    fn record(&mut self, entry: JournalEntry) {
        self.entries.push(entry);
    }
}

impl<S: ActivitySink + ?Sized> ActivitySink for &mut S {
    fn record(&mut self, entry: JournalEntry) {
        (**self).record(entry);
    }
}

impl<S: ActivitySink + ?Sized> ActivitySink for Box<S> {
    fn record(&mut self, entry: JournalEntry) {
        (**self).record(entry);
    }
}

// ──────────────────────── file writer ────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterState {
    Normal,
    Fallback,
    Stderr,
    Discard,
}

/// File locations and rotation limits for the journal.
#[derive(Debug, Clone)]
pub struct JournalFiles {
    pub path: PathBuf,
    pub fallback_path: Option<PathBuf>,
    /// Rotate once the current file would exceed this size.
    pub max_size_bytes: u64,
    pub max_rotated_files: u32,
}

/// Append-only JSONL writer with size rotation and a degradation chain.
pub struct JournalWriter {
    files: JournalFiles,
    writer: Option<BufWriter<File>>,
    state: WriterState,
    bytes_written: u64,
}

impl JournalWriter {
    /// Open the journal, falling through the degradation chain on failure.
    pub fn open(files: JournalFiles) -> Self {
        let mut w = Self {
            files,
            writer: None,
            state: WriterState::Discard,
            bytes_written: 0,
        };
        match open_append(&w.files.path) {
            Ok((file, size)) => w.attach(file, size, WriterState::Normal),
            Err(_) => w.open_fallback(),
        }
        w
    }

    /// Current degradation state.
    pub fn state(&self) -> &'static str {
        match self.state {
            WriterState::Normal => "normal",
            WriterState::Fallback => "fallback",
            WriterState::Stderr => "stderr",
            WriterState::Discard => "discard",
        }
    }

    pub fn flush(&mut self) {
        if let Some(w) = self.writer.as_mut() {
            let _ = w.flush();
        }
    }

    fn attach(&mut self, file: File, size: u64, state: WriterState) {
        self.writer = Some(BufWriter::with_capacity(8 * 1024, file));
        self.state = state;
        self.bytes_written = size;
    }

    fn write_line(&mut self, line: &str) {
        let len = line.len() as u64;
        if self.bytes_written + len > self.files.max_size_bytes
            && matches!(self.state, WriterState::Normal | WriterState::Fallback)
        {
            self.rotate();
        }

        match self.state {
            WriterState::Normal | WriterState::Fallback => {
                let written = self
                    .writer
                    .as_mut()
                    .is_some_and(|w| w.write_all(line.as_bytes()).and_then(|()| w.flush()).is_ok());
                if written {
                    self.bytes_written += len;
                } else {
                    self.degrade();
                    self.write_line(line);
                }
            }
            WriterState::Stderr => {
                let _ = write!(io::stderr(), "[GHPI-JOURNAL] {line}");
            }
            WriterState::Discard => {}
        }
    }

    fn open_fallback(&mut self) {
        let opened = self
            .files
            .fallback_path
            .as_deref()
            .map(|fb| (fb.to_path_buf(), open_append(fb)));
        match opened {
            Some((fb, Ok((file, size)))) => {
                let _ = writeln!(
                    io::stderr(),
                    "[GHPI-JOURNAL] primary path failed, using fallback: {}",
                    fb.display()
                );
                self.attach(file, size, WriterState::Fallback);
            }
            Some((_, Err(_))) => {
                self.state = WriterState::Stderr;
                let _ = writeln!(
                    io::stderr(),
                    "[GHPI-JOURNAL] primary and fallback paths failed, using stderr"
                );
            }
            None => {
                self.state = WriterState::Stderr;
                let _ = writeln!(
                    io::stderr(),
                    "[GHPI-JOURNAL] primary path failed and no fallback configured, using stderr"
                );
            }
        }
    }

    fn degrade(&mut self) {
        self.writer = None;
        match self.state {
            WriterState::Normal => self.open_fallback(),
            WriterState::Fallback => {
                self.state = WriterState::Stderr;
                let _ = writeln!(io::stderr(), "[GHPI-JOURNAL] fallback write failed, using stderr");
            }
            WriterState::Stderr | WriterState::Discard => self.state = WriterState::Discard,
        }
    }

    fn rotate(&mut self) {
        self.flush();
        self.writer = None;

        let base = match self.state {
            WriterState::Normal => self.files.path.clone(),
            WriterState::Fallback => match &self.files.fallback_path {
                Some(p) => p.clone(),
                None => return,
            },
            WriterState::Stderr | WriterState::Discard => return,
        };

        // journal.jsonl.N-1 → .N, …, journal.jsonl → .1; the oldest falls off.
        let keep = self.files.max_rotated_files;
        let _ = fs::remove_file(rotated_name(&base, keep));
        for i in (1..keep).rev() {
            let _ = rename(rotated_name(&base, i), rotated_name(&base, i + 1));
        }
        if keep > 0 {
            let _ = rename(&base, rotated_name(&base, 1));
        } else {
            let _ = fs::remove_file(&base);
        }

        let state = self.state;
        match open_append(&base) {
            Ok((file, _)) => self.attach(file, 0, state),
            Err(_) => self.degrade(),
        }
    }
}

impl ActivitySink for JournalWriter {
    fn record(&mut self, entry: JournalEntry) {
        match serde_json::to_string(&entry) {
            Ok(json) => self.write_line(&format!("{json}\n")),
            Err(e) => {
                let _ = writeln!(io::stderr(), "[GHPI-JOURNAL] serialize error: {e}");
            }
        }
    }
}

impl Drop for JournalWriter {
    fn drop(&mut self) {
        self.flush();
    }
}

// ──────────────────────── helpers ────────────────────────

/// Open or create a file for appending. Returns `(File, current_size)`.
fn open_append(path: &Path) -> Result<(File, u64)> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| GhError::io(parent, source))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| GhError::io(path, source))?;
    let size = file.metadata().map(|m| m.len()).unwrap_or(0);
    Ok((file, size))
}

/// `journal.jsonl` → `journal.jsonl.3`.
fn rotated_name(base: &Path, index: u32) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(format!(".{index}"));
    PathBuf::from(name)
}

fn format_utc_now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

// ──────────────────────── tests ────────────────────────
