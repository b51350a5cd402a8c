//! Durable store access: a narrow backend trait plus the busy-retry wrapper
//! every operation goes through.
//!
//! Backends report raw outcomes ([`StoreFault`]); [`Store`] owns the
//! [`BusyPolicy`] and turns a stream of "busy" reports into either success or
//! [`StoreFault::BusyExhausted`]. Callers decide what exhaustion means for them.

#![allow(missing_docs)]

pub mod backoff;
pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;

use std::fmt;

use crate::core::clock::Timestamp;
use crate::core::errors::{GhError, Result};
use crate::logger::diag;
use crate::store::backoff::{BusyDecision, BusyPolicy};

/// SQLite extended code for a UNIQUE / PRIMARY KEY constraint violation
/// (primary code `SQLITE_CONSTRAINT`).
pub const CONSTRAINT_CODE: i32 = 19;

/// Whether `name` can be spliced into SQL as a bare table identifier.
#[must_use]
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

// ──────────────────── outcomes ────────────────────

/// Classified failure of a single store operation.
#[derive(Debug)]
pub enum StoreFault {
    /// Another connection holds the write lock; try again later.
    Busy,
    /// The record key `(sec, subsec)` already exists.
    KeyCollision,
    /// The busy policy gave up after this many contended attempts.
    BusyExhausted { attempts: u32 },
    /// Anything else: bad SQL, IO error, corrupt file.
    Failed(GhError),
}

impl StoreFault {
    /// Escalate into a fatal error for call sites with no local recovery.
    #[must_use]
    pub fn into_error(self, context: &'static str) -> GhError {
        match self {
            Self::Busy => GhError::StoreBusy {
                context,
                attempts: 0,
            },
            Self::BusyExhausted { attempts } => GhError::StoreBusy { context, attempts },
            Self::KeyCollision => GhError::Store {
                context,
                code: CONSTRAINT_CODE,
                details: "record key already exists".to_string(),
            },
            Self::Failed(err) => err,
        }
    }
}

impl From<GhError> for StoreFault {
    fn from(value: GhError) -> Self {
        Self::Failed(value)
    }
}

pub type FaultResult<T> = std::result::Result<T, StoreFault>;

/// A scalar read back from the key/value `Config` table.
#[derive(Debug, Clone, PartialEq)]
pub enum StoredValue {
    Int(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
    Null,
}

impl StoredValue {
    /// SQLite storage-class name, as printed in type-mismatch diagnostics.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Int(_) => "INT",
            Self::Real(_) => "FLOAT",
            Self::Text(_) => "TEXT",
            Self::Blob(_) => "BLOB",
            Self::Null => "NULL",
        }
    }
}

impl fmt::Display for StoredValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Real(v) => write!(f, "{v}"),
            Self::Text(v) => f.write_str(v),
            Self::Blob(v) => write!(f, "<{} bytes>", v.len()),
            Self::Null => f.write_str("null"),
        }
    }
}

// ──────────────────── backend seam ────────────────────

/// Operations the ingestion engine needs from a persistent store.
///
/// Implementations must not retry on their own: contention is reported as
/// [`StoreFault::Busy`] and handled by [`Store`].
pub trait RecordBackend {
    /// Per-connection setup (PRAGMAs and the like). Safe to repeat.
    fn initialize(&mut self) -> FaultResult<()>;

    /// Append one record keyed by `ts`. `values` has one entry per channel.
    fn insert_record(&mut self, ts: Timestamp, values: &[Option<i64>]) -> FaultResult<()>;

    /// Insert-or-overwrite the liveness row for `sensor`.
    fn upsert_heartbeat(&mut self, sensor: &str, elapsed_secs: i64) -> FaultResult<()>;

    /// Most recent persisted record key across all sensor tables.
    fn high_water_mark(&mut self) -> FaultResult<Timestamp>;

    /// Look up a calibration constant.
    fn config_value(&mut self, key: &str) -> FaultResult<Option<StoredValue>>;
}

// ──────────────────── retrying wrapper ────────────────────

/// A backend plus the contention policy applied to each of its operations.
pub struct Store<B> {
    backend: B,
    policy: BusyPolicy,
}

impl<B: RecordBackend> Store<B> {
    pub fn new(backend: B, policy: BusyPolicy) -> Self {
        Self { backend, policy }
    }

    pub fn policy(&self) -> &BusyPolicy {
        &self.policy
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn into_backend(self) -> B {
        self.backend
    }

    /// Run `op` until it stops reporting busy or the policy gives up.
    ///
    /// The attempt counter is local to this call.
    pub fn with_retry<T>(
        &mut self,
        label: &str,
        mut op: impl FnMut(&mut B) -> FaultResult<T>,
    ) -> FaultResult<T> {
        let mut attempt_count = 0_u32;
        loop {
            match op(&mut self.backend) {
                Err(StoreFault::Busy) => match self.policy.on_contention(attempt_count) {
                    BusyDecision::Retry { wait, notify } => {
                        if notify {
                            diag::warn(
                                "GHPI-BUSY",
                                format_args!(
                                    "store busy during {label}; sleeping {}ms after try #{attempt_count}",
                                    wait.as_millis()
                                ),
                            );
                        }
                        if !wait.is_zero() {
                            std::thread::sleep(wait);
                        }
                        attempt_count += 1;
                    }
                    BusyDecision::GiveUp => {
                        diag::warn(
                            "GHPI-BUSY",
                            format_args!(
                                "store busy for max {} retries during {label}; giving up",
                                self.policy.retry_max
                            ),
                        );
                        return Err(StoreFault::BusyExhausted {
                            attempts: attempt_count,
                        });
                    }
                },
                other => return other,
            }
        }
    }

    /// Apply connection setup; busy exhaustion here is fatal.
    pub fn initialize(&mut self) -> Result<()> {
        self.with_retry("initialize", RecordBackend::initialize)
            .map_err(|fault| fault.into_error("initialize"))
    }

    /// One insert attempt (busy retries included). Collisions are returned to
    /// the caller, which owns the timestamp.
    pub fn insert_record(&mut self, ts: Timestamp, values: &[Option<i64>]) -> FaultResult<()> {
        self.with_retry("insert_record", |backend| backend.insert_record(ts, values))
    }

    pub fn upsert_heartbeat(&mut self, sensor: &str, elapsed_secs: i64) -> Result<()> {
        self.with_retry("upsert_heartbeat", |backend| {
            backend.upsert_heartbeat(sensor, elapsed_secs)
        })
        .map_err(|fault| fault.into_error("upsert_heartbeat"))
    }

    pub fn high_water_mark(&mut self) -> Result<Timestamp> {
        self.with_retry("high_water_mark", RecordBackend::high_water_mark)
            .map_err(|fault| fault.into_error("high_water_mark"))
    }

    pub fn config_value(&mut self, key: &str) -> Result<Option<StoredValue>> {
        self.with_retry("config_value", |backend| backend.config_value(key))
            .map_err(|fault| fault.into_error("config_value"))
    }

    /// Read a FLOAT calibration constant. Missing or mistyped values are fatal.
    pub fn calibration_f64(&mut self, key: &str) -> Result<f64> {
        match self.config_value(key)? {
            Some(StoredValue::Real(v)) => Ok(v),
            Some(other) => Err(GhError::CalibrationType {
                key: key.to_string(),
                expected: "FLOAT",
                found: other.type_name(),
            }),
            None => Err(GhError::CalibrationMissing {
                key: key.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::store::memory::MemoryBackend;

    fn quick_policy() -> BusyPolicy {
        BusyPolicy::new(Duration::ZERO, 1, 50)
    }

    #[test]
    fn busy_then_success_eventually_succeeds() {
        let mut backend = MemoryBackend::new();
        backend.script_busy(49);
        let mut store = Store::new(backend, quick_policy());
        store
            .insert_record(Timestamp::new(1000, 0), &[Some(1)])
            .unwrap();
        assert_eq!(store.backend().records().len(), 1);
        assert_eq!(store.backend().calls(), 50);
    }

    #[test]
    fn busy_on_every_attempt_gives_up_at_retry_max() {
        let mut backend = MemoryBackend::new();
        backend.script_busy(51);
        let mut store = Store::new(backend, quick_policy());
        let fault = store
            .insert_record(Timestamp::new(1000, 0), &[Some(1)])
            .unwrap_err();
        assert!(matches!(fault, StoreFault::BusyExhausted { attempts: 50 }));
        assert_eq!(store.backend().calls(), 51);
        assert!(store.backend().records().is_empty());
    }

    #[test]
    fn retry_budget_is_per_operation() {
        let mut backend = MemoryBackend::new();
        backend.script_busy(30);
        let mut store = Store::new(backend, quick_policy());
        store.upsert_heartbeat("SHT31", 5).unwrap();
        store.backend_mut().script_busy(30);
        store.upsert_heartbeat("SHT31", 10).unwrap();
        assert_eq!(store.backend().heartbeat("SHT31"), Some(10));
    }

    #[test]
    fn heartbeat_exhaustion_is_fatal_store_busy() {
        let mut backend = MemoryBackend::new();
        backend.script_busy(100);
        let mut store = Store::new(backend, quick_policy());
        let err = store.upsert_heartbeat("SHT31", 5).unwrap_err();
        assert!(matches!(
            err,
            GhError::StoreBusy {
                context: "upsert_heartbeat",
                attempts: 50
            }
        ));
    }

    #[test]
    fn collision_is_not_retried_by_the_wrapper() {
        let mut backend = MemoryBackend::new();
        backend.seed_record(Timestamp::from_key(1000, 0), vec![Some(1)]);
        let mut store = Store::new(backend, quick_policy());
        let fault = store
            .insert_record(Timestamp::from_key(1000, 0), &[Some(2)])
            .unwrap_err();
        assert!(matches!(fault, StoreFault::KeyCollision));
        assert_eq!(store.backend().calls(), 1);
    }

    #[test]
    fn calibration_requires_float() {
        let mut backend = MemoryBackend::new();
        backend.set_config("SHT31_temp_scale", StoredValue::Real(0.267));
        backend.set_config("SHT31_temp_offset", StoredValue::Text("x".into()));
        let mut store = Store::new(backend, quick_policy());
        assert!((store.calibration_f64("SHT31_temp_scale").unwrap() - 0.267).abs() < 1e-12);

        let err = store.calibration_f64("SHT31_temp_offset").unwrap_err();
        assert!(matches!(
            err,
            GhError::CalibrationType {
                expected: "FLOAT",
                found: "TEXT",
                ..
            }
        ));

        let err = store.calibration_f64("absent").unwrap_err();
        assert_eq!(err.code(), "GH-1101");
    }

    #[test]
    fn identifiers_are_plain_words() {
        assert!(is_identifier("SHT31_logs"));
        assert!(is_identifier("_x1"));
        assert!(!is_identifier(""));
        assert!(!is_identifier("9lives"));
        assert!(!is_identifier("a b"));
        assert!(!is_identifier("t;--"));
    }

    #[test]
    fn fault_escalation_keeps_codes() {
        let err = StoreFault::KeyCollision.into_error("insert_record");
        assert_eq!(err.exit_code(), CONSTRAINT_CODE);
        let err = StoreFault::BusyExhausted { attempts: 50 }.into_error("initialize");
        assert_eq!(err.exit_code(), crate::core::errors::SQLITE_BUSY_CODE);
    }
}
