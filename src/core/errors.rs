//! GHPI-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, GhError>;

/// SQLite primary result code for "database is locked by another connection".
pub const SQLITE_BUSY_CODE: i32 = 5;

/// Top-level error type for the ingestion engine.
#[derive(Debug, Error)]
pub enum GhError {
    #[error("[GH-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[GH-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[GH-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[GH-1101] calibration value {key:?} missing from Config table")]
    CalibrationMissing { key: String },

    #[error("[GH-1102] calibration value {key:?} has type {found}, expected {expected}")]
    CalibrationType {
        key: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error(
        "[GH-2001] current time is {behind_secs} seconds (rounded down) behind last logged time"
    )]
    ClockRegression { behind_secs: i64 },

    #[error("[GH-2002] last logged timestamp unavailable: {details}")]
    HighWaterMarkUnavailable { details: String },

    #[error("[GH-2101] poll delivered {got} channels, pipeline expects {expected}")]
    ChannelCount { expected: usize, got: usize },

    #[error("[GH-2102] unreadable poll line {line:?}: {details}")]
    ReadingParse { line: String, details: String },

    #[error("[GH-3001] store failure in {context}: {details} ({code})")]
    Store {
        context: &'static str,
        code: i32,
        details: String,
    },

    #[error("[GH-3002] store busy for {attempts} retries in {context}; giving up")]
    StoreBusy {
        context: &'static str,
        attempts: u32,
    },

    #[error("[GH-3101] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[GH-3201] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[GH-3900] runtime failure: {details}")]
    Runtime { details: String },
}

impl GhError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "GH-1001",
            Self::MissingConfig { .. } => "GH-1002",
            Self::ConfigParse { .. } => "GH-1003",
            Self::CalibrationMissing { .. } => "GH-1101",
            Self::CalibrationType { .. } => "GH-1102",
            Self::ClockRegression { .. } => "GH-2001",
            Self::HighWaterMarkUnavailable { .. } => "GH-2002",
            Self::ChannelCount { .. } => "GH-2101",
            Self::ReadingParse { .. } => "GH-2102",
            Self::Store { .. } => "GH-3001",
            Self::StoreBusy { .. } => "GH-3002",
            Self::Serialization { .. } => "GH-3101",
            Self::Io { .. } => "GH-3201",
            Self::Runtime { .. } => "GH-3900",
        }
    }

    /// Whether retrying might resolve the failure.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::StoreBusy { .. } | Self::Io { .. } | Self::Runtime { .. }
        )
    }

    /// Process exit status used when this error terminates a daemon.
    ///
    /// Store failures exit with the SQLite primary result code so operators
    /// can tell a locked database from a corrupt one.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::ClockRegression { .. } | Self::HighWaterMarkUnavailable { .. } => -1,
            Self::Store { code, .. } if *code != 0 => *code,
            Self::StoreBusy { .. } => SQLITE_BUSY_CODE,
            _ => 1,
        }
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for GhError {
    fn from(value: rusqlite::Error) -> Self {
        let code = match &value {
            rusqlite::Error::SqliteFailure(err, _) => err.extended_code & 0xff,
            _ => 0,
        };
        Self::Store {
            context: "rusqlite",
            code,
            details: value.to_string(),
        }
    }
}

impl From<serde_json::Error> for GhError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for GhError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}
