#![forbid(unsafe_code)]

//! ghpi-ingest: sensor telemetry ingest daemon entry point.

use ghpi_telemetry::cli;
use ghpi_telemetry::logger::diag;

mod cli_app;

fn main() {
    let args: cli_app::Cli = cli::parse_or_exit("ghpi-ingest");
    eprintln!("{}", diag::banner("ghpi-ingest"));
    if let Err(e) = cli_app::run(&args) {
        cli::fail("GHPI-DAEMON", &e);
    }
}
