//! Configuration system: TOML file + env var overrides + fleet defaults.
//!
//! Every knob has a default matching the long-standing fleet constants, so a
//! daemon started with no config file behaves like an SHT31 logger.

#![allow(missing_docs)]

use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::errors::{GhError, Result};
use crate::logger::jsonl::JournalFiles;
use crate::monitor::hysteresis::DEFAULT_HYST_SCALE;
use crate::monitor::pipeline::FilterMode;
use crate::store::backoff::{
    BusyPolicy, DEFAULT_BUSY_RETRY_MAX, DEFAULT_BUSY_WAIT, DEFAULT_NOTICE_THRESHOLD,
};
use crate::store::is_identifier;

/// Full ingestion daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub sensor: SensorConfig,
    pub engine: EngineConfig,
    pub busy: BusyConfig,
    pub journal: JournalConfig,
}

/// Which sensor this daemon ingests and how its channels are scaled.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SensorConfig {
    /// Heartbeat key and default table prefix.
    pub name: String,
    /// Record table; `<name>_logs` when unset.
    pub table: Option<String>,
    /// Polls to process before the first write is allowed.
    pub warm_up_cycles: u32,
    /// Delay between polls of the reading source; 0 means "as fast as lines arrive".
    pub poll_interval_ms: u64,
    pub channels: Vec<ChannelConfig>,
}

/// One channel: raw reading → stored units.
///
/// `scale`/`offset` are literal; `scale_key`/`offset_key` name FLOAT rows in
/// the store's `Config` table, read once at startup. Setting both forms for
/// the same factor is rejected.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct ChannelConfig {
    pub name: String,
    pub scale: Option<f64>,
    pub offset: Option<f64>,
    pub scale_key: Option<String>,
    pub offset_key: Option<String>,
    pub mode: FilterMode,
    /// Stored-unit multiplier over the hysteresis bucket; 1 when unset.
    pub store_multiplier: Option<i64>,
}

/// Engine constants.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    /// Hysteresis bucket width, in raw units per stored unit.
    pub hysteresis_scale: i64,
    pub heartbeat_period_secs: u64,
    /// Insert attempts per record before a colliding record is dropped.
    pub timestamp_retry_max: u32,
}

/// Store contention handling.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BusyConfig {
    pub wait_ms: u64,
    pub retry_max: u32,
    pub notice_threshold: u32,
}

/// Optional JSONL activity journal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct JournalConfig {
    pub enabled: bool,
    pub path: PathBuf,
    pub fallback_path: Option<PathBuf>,
    pub max_size_bytes: u64,
    pub max_rotated_files: u32,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            name: "SHT31".to_string(),
            table: None,
            warm_up_cycles: 0,
            poll_interval_ms: 0,
            channels: vec![
                // Raw 16-bit counts → centidegrees C.
                ChannelConfig {
                    name: "temp".to_string(),
                    scale: Some(175.0 * 100.0 / 65535.0),
                    offset: Some(-4500.0),
                    ..ChannelConfig::default()
                },
                // Raw 16-bit counts → tenths of a percent RH.
                ChannelConfig {
                    name: "hum".to_string(),
                    scale: Some(1000.0 / 65535.0),
                    ..ChannelConfig::default()
                },
            ],
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            hysteresis_scale: DEFAULT_HYST_SCALE,
            heartbeat_period_secs: 5,
            timestamp_retry_max: 20,
        }
    }
}

impl Default for BusyConfig {
    fn default() -> Self {
        let wait_ms = u64::try_from(DEFAULT_BUSY_WAIT.as_millis()).unwrap_or(100);
        Self {
            wait_ms,
            retry_max: DEFAULT_BUSY_RETRY_MAX,
            notice_threshold: DEFAULT_NOTICE_THRESHOLD,
        }
    }
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: PathBuf::from("/var/lib/ghpi/journal.jsonl"),
            fallback_path: Some(PathBuf::from("/dev/shm/ghpi-journal.jsonl")),
            max_size_bytes: 16 * 1024 * 1024,
            max_rotated_files: 5,
        }
    }
}

impl SensorConfig {
    /// Effective record table name.
    #[must_use]
    pub fn table_name(&self) -> String {
        self.table
            .clone()
            .unwrap_or_else(|| format!("{}_logs", self.name))
    }
}

impl EngineConfig {
    #[must_use]
    pub const fn heartbeat_period(&self) -> Duration {
        Duration::from_secs(self.heartbeat_period_secs)
    }
}

impl BusyConfig {
    #[must_use]
    pub const fn policy(&self) -> BusyPolicy {
        BusyPolicy::new(
            Duration::from_millis(self.wait_ms),
            self.notice_threshold,
            self.retry_max,
        )
    }
}

impl JournalConfig {
    #[must_use]
    pub fn files(&self) -> JournalFiles {
        JournalFiles {
            path: self.path.clone(),
            fallback_path: self.fallback_path.clone(),
            max_size_bytes: self.max_size_bytes,
            max_rotated_files: self.max_rotated_files,
        }
    }
}

impl Config {
    /// Config file consulted when no `--config` is given.
    #[must_use]
    pub fn default_path() -> PathBuf {
        PathBuf::from("/etc/ghpi/telemetry.toml")
    }

    /// Load configuration from TOML (if present), then apply env overrides.
    ///
    /// An explicitly named file must exist; the default path may be absent.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with(path, env_var)
    }

    /// [`Config::load`] with an injectable environment lookup.
    pub fn load_with<F>(path: Option<&Path>, lookup: F) -> Result<Self>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let path_buf = path.map_or_else(Self::default_path, Path::to_path_buf);

        let mut cfg = if path_buf.exists() {
            let raw = fs::read_to_string(&path_buf).map_err(|source| GhError::io(&path_buf, source))?;
            toml::from_str::<Self>(&raw)?
        } else if path.is_some() {
            return Err(GhError::MissingConfig { path: path_buf });
        } else {
            Self::default()
        };

        cfg.apply_env_overrides_from(lookup)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Deterministic fingerprint of the effective configuration (FNV-1a over
    /// its canonical JSON), journaled at startup.
    pub fn stable_hash(&self) -> Result<String> {
        let canonical = serde_json::to_string(self)?;
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in canonical.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        Ok(format!("{hash:016x}"))
    }

    fn apply_env_overrides_from<F>(&mut self, mut lookup: F) -> Result<()>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let mut get = |name: &str| lookup(name).filter(|raw| !raw.trim().is_empty());

        // sensor
        if let Some(raw) = get("GHPI_SENSOR_NAME") {
            self.sensor.name = raw;
        }
        if let Some(raw) = get("GHPI_SENSOR_TABLE") {
            self.sensor.table = Some(raw);
        }
        set_parsed(&mut get, "GHPI_SENSOR_WARM_UP_CYCLES", &mut self.sensor.warm_up_cycles)?;
        set_parsed(&mut get, "GHPI_SENSOR_POLL_INTERVAL_MS", &mut self.sensor.poll_interval_ms)?;

        // engine
        set_parsed(&mut get, "GHPI_ENGINE_HYSTERESIS_SCALE", &mut self.engine.hysteresis_scale)?;
        set_parsed(
            &mut get,
            "GHPI_ENGINE_HEARTBEAT_PERIOD_SECS",
            &mut self.engine.heartbeat_period_secs,
        )?;
        set_parsed(
            &mut get,
            "GHPI_ENGINE_TIMESTAMP_RETRY_MAX",
            &mut self.engine.timestamp_retry_max,
        )?;

        // busy
        set_parsed(&mut get, "GHPI_BUSY_WAIT_MS", &mut self.busy.wait_ms)?;
        set_parsed(&mut get, "GHPI_BUSY_RETRY_MAX", &mut self.busy.retry_max)?;
        set_parsed(&mut get, "GHPI_BUSY_NOTICE_THRESHOLD", &mut self.busy.notice_threshold)?;

        // journal
        set_parsed(&mut get, "GHPI_JOURNAL_ENABLED", &mut self.journal.enabled)?;
        if let Some(raw) = get("GHPI_JOURNAL_PATH") {
            self.journal.path = PathBuf::from(raw);
        }
        if let Some(raw) = get("GHPI_JOURNAL_FALLBACK_PATH") {
            self.journal.fallback_path = Some(PathBuf::from(raw));
        }

        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if !is_identifier(&self.sensor.name) {
            return invalid(format!(
                "sensor.name {:?} must be a plain identifier",
                self.sensor.name
            ));
        }
        let table = self.sensor.table_name();
        if !is_identifier(&table) {
            return invalid(format!("sensor.table {table:?} must be a plain identifier"));
        }
        if self.sensor.channels.is_empty() {
            return invalid("sensor.channels must list at least one channel".to_string());
        }
        let defaults = SensorConfig::default();
        if self.sensor.name != defaults.name && self.sensor.channels == defaults.channels {
            return invalid(format!(
                "sensor {:?} must list its own [[sensor.channels]]; the defaults describe {}",
                self.sensor.name, defaults.name
            ));
        }

        let mut seen = HashSet::new();
        for channel in &self.sensor.channels {
            if channel.name.trim().is_empty() {
                return invalid("every channel needs a name".to_string());
            }
            if !seen.insert(channel.name.as_str()) {
                return invalid(format!("duplicate channel name {:?}", channel.name));
            }
            if channel.scale.is_some() && channel.scale_key.is_some() {
                return invalid(format!(
                    "channel {:?} sets both scale and scale_key",
                    channel.name
                ));
            }
            if channel.offset.is_some() && channel.offset_key.is_some() {
                return invalid(format!(
                    "channel {:?} sets both offset and offset_key",
                    channel.name
                ));
            }
            if channel.store_multiplier.is_some_and(|k| k < 1) {
                return invalid(format!(
                    "channel {:?} store_multiplier must be >= 1",
                    channel.name
                ));
            }
            for (label, value) in [("scale", channel.scale), ("offset", channel.offset)] {
                if value.is_some_and(|v| !v.is_finite()) {
                    return invalid(format!("channel {:?} {label} must be finite", channel.name));
                }
            }
        }

        if self.engine.hysteresis_scale < 1 {
            return invalid(format!(
                "engine.hysteresis_scale must be >= 1, got {}",
                self.engine.hysteresis_scale
            ));
        }
        if self.engine.heartbeat_period_secs == 0 {
            return invalid("engine.heartbeat_period_secs must be > 0".to_string());
        }
        if self.engine.timestamp_retry_max == 0 {
            return invalid("engine.timestamp_retry_max must be > 0".to_string());
        }
        if self.busy.retry_max == 0 {
            return invalid("busy.retry_max must be > 0".to_string());
        }
        if self.journal.enabled && self.journal.max_size_bytes == 0 {
            return invalid("journal.max_size_bytes must be > 0".to_string());
        }
        Ok(())
    }
}

fn invalid(details: String) -> Result<()> {
    Err(GhError::InvalidConfig { details })
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok()
}

fn set_parsed<T, F>(lookup: &mut F, name: &str, slot: &mut T) -> Result<()>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: FnMut(&str) -> Option<String>,
{
    if let Some(raw) = lookup(name) {
        *slot = raw.trim().parse::<T>().map_err(|error| GhError::ConfigParse {
            context: "env",
            details: format!("{name}={raw:?}: {error}"),
        })?;
    }
    Ok(())
}
