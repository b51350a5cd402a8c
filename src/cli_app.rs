//! Ingest daemon CLI definition and dispatch.

use std::io;
use std::path::PathBuf;

use clap::Parser;

use ghpi_telemetry::core::config::Config;
use ghpi_telemetry::core::errors::Result;
use ghpi_telemetry::daemon::loop_main::{self, RunStats};

/// Greenhouse telemetry ingest daemon: reads raw polls from stdin, one line
/// per cycle, and logs reportable changes into the database.
#[derive(Debug, Parser)]
#[command(
    name = "ghpi-ingest",
    author,
    version,
    about = "Greenhouse telemetry ingest daemon",
    long_about = None
)]
pub struct Cli {
    /// SQLite database the sensor logs into. Must already exist.
    #[arg(value_name = "DB_FILE")]
    pub db_file: PathBuf,
    /// Override config file path.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

/// Load configuration and ingest stdin until it closes.
pub fn run(cli: &Cli) -> Result<RunStats> {
    let config = Config::load(cli.config.as_deref())?;
    let stdin = io::stdin();
    loop_main::run_sqlite(&config, &cli.db_file, stdin.lock())
}
