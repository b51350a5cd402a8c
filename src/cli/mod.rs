//! CLI contracts shared by the daemon binaries.
//!
//! Every binary takes exactly one positional database path. A wrong argument
//! count prints a one-line usage string and exits with status -1 (255 as seen
//! by the shell); `--help`/`--version` behave as usual.
#![allow(missing_docs)]

use std::ffi::OsString;

use clap::Parser;
use clap::error::ErrorKind;

use crate::core::errors::GhError;
use crate::logger::diag;

/// Exit status for bad invocations.
pub const USAGE_EXIT_CODE: i32 = -1;

/// What the command line asked for, short of a parsed argument set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgsOutcome {
    /// `--help` or `--version`: print to stdout, exit 0.
    Info(String),
    /// Anything else clap rejected.
    Usage(String),
}

/// Parse `args`, mapping every clap rejection to the usage contract.
pub fn parse_from<P, I, T>(program: &str, args: I) -> Result<P, ArgsOutcome>
where
    P: Parser,
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    P::try_parse_from(args).map_err(|err| match err.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ArgsOutcome::Info(err.to_string()),
        _ => ArgsOutcome::Usage(usage_line(program)),
    })
}

/// Parse the process arguments or exit per the usage contract.
pub fn parse_or_exit<P: Parser>(program: &str) -> P {
    match parse_from(program, std::env::args_os()) {
        Ok(cli) => cli,
        Err(ArgsOutcome::Info(text)) => {
            print!("{text}");
            std::process::exit(0);
        }
        Err(ArgsOutcome::Usage(line)) => {
            eprintln!("{line}");
            std::process::exit(USAGE_EXIT_CODE);
        }
    }
}

#[must_use]
pub fn usage_line(program: &str) -> String {
    format!("Usage: {program} db-file")
}

/// Log a fatal error and exit with its mapped status.
pub fn fail(component: &str, err: &GhError) -> ! {
    eprintln!("{}", diag::line(component, err));
    std::process::exit(err.exit_code());
}
