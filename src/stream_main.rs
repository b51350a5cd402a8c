#![forbid(unsafe_code)]

//! ghpi-stream: prints the latest logged readings four times a second.

use std::io;
use std::path::PathBuf;

use clap::Parser;

use ghpi_telemetry::cli;
use ghpi_telemetry::core::clock::SystemClock;
use ghpi_telemetry::core::config::Config;
use ghpi_telemetry::core::errors::Result;
use ghpi_telemetry::daemon::stream::{self, STREAM_PERIOD};
use ghpi_telemetry::ingest::guard;
use ghpi_telemetry::store::Store;
use ghpi_telemetry::store::sqlite::SqliteBackend;

/// Latest-readings stream for dashboards.
#[derive(Debug, Parser)]
#[command(
    name = "ghpi-stream",
    author,
    version,
    about = "Stream the latest logged readings as `columns!values` lines",
    long_about = None
)]
struct Cli {
    /// SQLite database to read. Must already exist.
    #[arg(value_name = "DB_FILE")]
    db_file: PathBuf,
    /// Override config file path.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Stop after this many frames.
    #[arg(long, value_name = "N")]
    frames: Option<u64>,
}

fn run(cli: &Cli) -> Result<u64> {
    let config = Config::load(cli.config.as_deref())?;
    let mut store = Store::new(SqliteBackend::open(&cli.db_file)?, config.busy.policy());
    store.initialize()?;
    guard::check(&mut store, &SystemClock)?;
    let stdout = io::stdout();
    stream::stream(&mut store, &mut stdout.lock(), STREAM_PERIOD, cli.frames)
}

fn main() {
    let args: Cli = cli::parse_or_exit("ghpi-stream");
    if let Err(e) = run(&args) {
        cli::fail("GHPI-STREAM", &e);
    }
}
