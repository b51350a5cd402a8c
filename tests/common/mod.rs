#![allow(dead_code)]

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::Connection;

pub struct CmdResult {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub log_path: PathBuf,
}

/// One sensor table plus the shared tables and views every fleet database has.
pub const FIXTURE_SCHEMA: &str = "
    PRAGMA journal_mode = WAL;
    CREATE TABLE SHT31_logs(
        sec INT NOT NULL,
        cs INT NOT NULL,
        temp INT,
        hum INT,
        PRIMARY KEY(sec, cs)
    );
    CREATE TABLE Idle_heartbeats(sensor_name TEXT PRIMARY KEY, sec INT);
    CREATE TABLE Config(key TEXT PRIMARY KEY, value);
    CREATE VIEW Last_log_time AS
        SELECT sec, cs FROM SHT31_logs
        UNION ALL SELECT 0, 0
        ORDER BY sec DESC, cs DESC LIMIT 1;
    CREATE VIEW Last_logs AS
        SELECT
            (SELECT temp FROM SHT31_logs ORDER BY sec DESC, cs DESC LIMIT 1) AS temp,
            (SELECT hum FROM SHT31_logs ORDER BY sec DESC, cs DESC LIMIT 1) AS hum;
";

/// Centidegrees and tenths of %RH straight from already-converted readings.
pub const TEST_CONFIG: &str = r#"
[sensor]
name = "SHT31"

[[sensor.channels]]
name = "temp"
scale = 100.0

[[sensor.channels]]
name = "hum"
scale = 10.0

[busy]
wait_ms = 1
"#;

pub struct Fixture {
    pub dir: tempfile::TempDir,
    pub db_path: PathBuf,
    pub config_path: PathBuf,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_config(TEST_CONFIG)
    }

    pub fn with_config(config: &str) -> Self {
        let dir = tempfile::tempdir().expect("create fixture dir");
        let db_path = dir.path().join("gh.db");
        let conn = Connection::open(&db_path).expect("create fixture db");
        conn.execute_batch(FIXTURE_SCHEMA).expect("apply fixture schema");
        let config_path = dir.path().join("telemetry.toml");
        fs::write(&config_path, config).expect("write fixture config");
        Self {
            dir,
            db_path,
            config_path,
        }
    }

    pub fn conn(&self) -> Connection {
        Connection::open(&self.db_path).expect("open fixture db")
    }

    pub fn db_arg(&self) -> &str {
        self.db_path.to_str().expect("utf-8 temp path")
    }

    pub fn config_arg(&self) -> &str {
        self.config_path.to_str().expect("utf-8 temp path")
    }

    /// Logged rows in key order.
    pub fn rows(&self) -> Vec<(i64, i64, Option<i64>, Option<i64>)> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare("SELECT sec, cs, temp, hum FROM SHT31_logs ORDER BY sec, cs")
            .expect("prepare rows query");
        stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)))
            .expect("query rows")
            .collect::<rusqlite::Result<Vec<_>>>()
            .expect("read rows")
    }

    pub fn heartbeat(&self, sensor: &str) -> Option<i64> {
        self.conn()
            .query_row(
                "SELECT sec FROM Idle_heartbeats WHERE sensor_name = ?1",
                [sensor],
                |row| row.get(0),
            )
            .ok()
    }
}

pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
}

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis())
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

fn resolve_bin_path(bin: &str) -> PathBuf {
    if let Ok(path) = std::env::var(format!("CARGO_BIN_EXE_{bin}")) {
        return PathBuf::from(path);
    }

    let exe_name = if cfg!(windows) {
        format!("{bin}.exe")
    } else {
        bin.to_string()
    };
    let fallback = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(PathBuf::from))
        .and_then(|deps| deps.parent().map(PathBuf::from))
        .map(|debug_dir| debug_dir.join(exe_name));

    match fallback {
        Some(path) if path.exists() => path,
        _ => panic!("unable to resolve {bin} binary path for integration test"),
    }
}

/// Run `bin` with `args`, feeding `stdin` (or an empty stream), and keep a log.
pub fn run_cli_case(bin: &str, case_name: &str, args: &[&str], stdin: &str) -> CmdResult {
    let root = std::env::temp_dir().join("ghpi-test-logs");
    fs::create_dir_all(&root).expect("create temp test log dir");

    let log_path = root.join(format!("{}-{}.log", sanitize(case_name), now_millis()));
    let bin_path = resolve_bin_path(bin);

    let mut child = Command::new(&bin_path)
        .args(args)
        .env("RUST_BACKTRACE", "1")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap_or_else(|e| panic!("execute {bin}: {e}"));
    if let Some(mut pipe) = child.stdin.take() {
        // The child may exit before reading (usage errors); ignore EPIPE.
        let _ = pipe.write_all(stdin.as_bytes());
    }
    let output = child.wait_with_output().expect("wait for child");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();

    write_log(&log_path, case_name, &bin_path, args, &output.status, &stdout, &stderr);

    CmdResult {
        status: output.status,
        stdout,
        stderr,
        log_path,
    }
}

fn write_log(
    log_path: &Path,
    case_name: &str,
    bin_path: &Path,
    args: &[&str],
    status: &ExitStatus,
    stdout: &str,
    stderr: &str,
) {
    let mut log_content = String::new();
    log_content.push_str(&format!("case={case_name}\n"));
    log_content.push_str(&format!("bin={}\n", bin_path.display()));
    log_content.push_str(&format!("args={args:?}\n"));
    log_content.push_str(&format!("status={status}\n"));
    log_content.push_str("----- stdout -----\n");
    log_content.push_str(stdout);
    log_content.push('\n');
    log_content.push_str("----- stderr -----\n");
    log_content.push_str(stderr);
    log_content.push('\n');
    fs::write(log_path, log_content).expect("write test log");
}
