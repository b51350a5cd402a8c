//! SQLite backend: the shared WAL-mode database every sensor daemon writes to.
//!
//! The database and its schema are provisioned out of band, so the file is
//! opened read-write without create. SQLite's own busy handler is disabled:
//! contention surfaces as [`StoreFault::Busy`] and is paced by the store's
//! busy policy instead.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::types::{ToSql, ValueRef};
use rusqlite::{Connection, ErrorCode, OpenFlags, OptionalExtension, params};

use crate::core::clock::Timestamp;
use crate::core::errors::{GhError, Result};
use crate::store::{FaultResult, RecordBackend, StoreFault, StoredValue, is_identifier};

const HEARTBEAT_SQL: &str = "INSERT INTO Idle_heartbeats VALUES (?1, ?2) \
     ON CONFLICT(sensor_name) DO UPDATE SET sec = excluded.sec";
const HIGH_WATER_SQL: &str = "SELECT sec, cs FROM Last_log_time";
const CONFIG_SQL: &str = "SELECT value FROM Config WHERE key = ?1";
const LATEST_LOGS_SQL: &str = "SELECT * FROM Last_logs";

/// Connection to an existing telemetry database.
pub struct SqliteBackend {
    conn: Connection,
    path: PathBuf,
    table: Option<String>,
}

impl SqliteBackend {
    /// Open an existing database. A missing file is an error, never created.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|err| with_context(err, "open"))?;
        conn.busy_timeout(Duration::ZERO)
            .map_err(|err| with_context(err, "busy_timeout"))?;
        Ok(Self {
            conn,
            path: path.to_path_buf(),
            table: None,
        })
    }

    /// Direct record inserts at `table` (one row per reportable change).
    pub fn with_record_table(mut self, table: &str) -> Result<Self> {
        if !is_identifier(table) {
            return Err(GhError::InvalidConfig {
                details: format!("record table {table:?} is not a plain SQL identifier"),
            });
        }
        self.table = Some(table.to_string());
        Ok(self)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check that WAL mode is active (for diagnostics).
    pub fn is_wal_mode(&self) -> bool {
        self.conn
            .query_row("PRAGMA journal_mode", [], |row| row.get::<_, String>(0))
            .map(|mode| mode.eq_ignore_ascii_case("wal"))
            .unwrap_or(false)
    }

    /// The single-row `Last_logs` view, if it has a row.
    pub fn latest_logs(&mut self) -> FaultResult<Option<LogSnapshot>> {
        let mut stmt = self.conn.prepare_cached(LATEST_LOGS_SQL).map_err(classify)?;
        let columns: Vec<String> = stmt
            .column_names()
            .into_iter()
            .map(str::to_string)
            .collect();
        let width = columns.len();
        let values = stmt
            .query_row([], |row| {
                (0..width)
                    .map(|i| row.get_ref(i).map(integer_cell))
                    .collect::<rusqlite::Result<Vec<_>>>()
            })
            .optional()
            .map_err(classify)?;
        Ok(values.map(|values| LogSnapshot { columns, values }))
    }
}

impl RecordBackend for SqliteBackend {
    fn initialize(&mut self) -> FaultResult<()> {
        self.conn
            .execute_batch(
                "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA foreign_keys = ON;
                 PRAGMA recursive_triggers = TRUE;
                 PRAGMA cache_size = -256;
                 PRAGMA secure_delete = FALSE;",
            )
            .map_err(classify)?;
        if !self.is_wal_mode() {
            crate::logger::diag::warn(
                "GHPI-STORE",
                format_args!("requested WAL mode on {} but it is not active", self.path.display()),
            );
        }
        Ok(())
    }

    fn insert_record(&mut self, ts: Timestamp, values: &[Option<i64>]) -> FaultResult<()> {
        let Some(table) = self.table.as_deref() else {
            return Err(StoreFault::Failed(GhError::InvalidConfig {
                details: "no record table configured for inserts".to_string(),
            }));
        };
        let placeholders: Vec<String> = (1..=values.len() + 2).map(|i| format!("?{i}")).collect();
        let sql = format!("INSERT INTO {table} VALUES ({})", placeholders.join(", "));

        let (sec, subsec) = ts.key();
        let mut bound: Vec<&dyn ToSql> = Vec::with_capacity(values.len() + 2);
        bound.push(&sec);
        bound.push(&subsec);
        bound.extend(values.iter().map(|v| v as &dyn ToSql));

        self.conn
            .prepare_cached(&sql)
            .and_then(|mut stmt| stmt.execute(bound.as_slice()))
            .map_err(classify)?;
        Ok(())
    }

    fn upsert_heartbeat(&mut self, sensor: &str, elapsed_secs: i64) -> FaultResult<()> {
        self.conn
            .prepare_cached(HEARTBEAT_SQL)
            .and_then(|mut stmt| stmt.execute(params![sensor, elapsed_secs]))
            .map_err(classify)?;
        Ok(())
    }

    fn high_water_mark(&mut self) -> FaultResult<Timestamp> {
        let row: Option<(i64, i64)> = self
            .conn
            .query_row(HIGH_WATER_SQL, [], |row| Ok((row.get(0)?, row.get(1)?)))
            .optional()
            .map_err(classify)?;
        let (sec, subsec) = row.ok_or_else(|| {
            StoreFault::Failed(GhError::HighWaterMarkUnavailable {
                details: "Last_log_time returned no row".to_string(),
            })
        })?;
        Ok(Timestamp::from_key(sec, subsec))
    }

    fn config_value(&mut self, key: &str) -> FaultResult<Option<StoredValue>> {
        self.conn
            .query_row(CONFIG_SQL, params![key], |row| {
                Ok(match row.get_ref(0)? {
                    ValueRef::Null => StoredValue::Null,
                    ValueRef::Integer(v) => StoredValue::Int(v),
                    ValueRef::Real(v) => StoredValue::Real(v),
                    ValueRef::Text(v) => StoredValue::Text(String::from_utf8_lossy(v).into_owned()),
                    ValueRef::Blob(v) => StoredValue::Blob(v.to_vec()),
                })
            })
            .optional()
            .map_err(classify)
    }
}

// ──────────────────── snapshot ────────────────────

/// One row of the `Last_logs` view with its column names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSnapshot {
    pub columns: Vec<String>,
    pub values: Vec<Option<i64>>,
}

impl LogSnapshot {
    /// `col1,col2!v1,null`: header and values on one line, split by `!`.
    #[must_use]
    pub fn render(&self) -> String {
        let values: Vec<String> = self
            .values
            .iter()
            .map(|v| v.map_or_else(|| "null".to_string(), |v| v.to_string()))
            .collect();
        format!("{}!{}", self.columns.join(","), values.join(","))
    }
}

// Integer affinity, as the dashboard expects.
#[allow(clippy::cast_possible_truncation)]
fn integer_cell(value: ValueRef<'_>) -> Option<i64> {
    match value {
        ValueRef::Null => None,
        ValueRef::Integer(v) => Some(v),
        ValueRef::Real(v) => Some(v as i64),
        ValueRef::Text(v) => Some(
            std::str::from_utf8(v)
                .ok()
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(0),
        ),
        ValueRef::Blob(_) => Some(0),
    }
}

// ──────────────────── error classification ────────────────────

fn classify(err: rusqlite::Error) -> StoreFault {
    if let rusqlite::Error::SqliteFailure(failure, _) = &err {
        if failure.code == ErrorCode::DatabaseBusy {
            return StoreFault::Busy;
        }
        if matches!(
            failure.extended_code,
            rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE | rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
        ) {
            return StoreFault::KeyCollision;
        }
    }
    StoreFault::Failed(err.into())
}

fn with_context(err: rusqlite::Error, context: &'static str) -> GhError {
    match GhError::from(err) {
        GhError::Store { code, details, .. } => GhError::Store {
            context,
            code,
            details,
        },
        other => other,
    }
}

// ──────────────────── tests ────────────────────
