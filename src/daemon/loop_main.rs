//! Poll loop: pull raw readings from a source and drive one ingestion session.
//!
//! Single-threaded. Each poll is processed to completion (filter, write or
//! heartbeat) before the next is read; the loop ends when the source does.

#![allow(missing_docs)]

use std::thread;
use std::time::Duration;

use crate::core::clock::{MonotonicClock, WallClock};
use crate::core::errors::Result;
use crate::daemon::source::ReadingSource;
use crate::ingest::session::{PollOutcome, Session};
use crate::logger::diag;
use crate::logger::jsonl::ActivitySink;
use crate::store::RecordBackend;

/// Counters for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub polls: u64,
    pub written: u64,
    pub dropped: u64,
    pub heartbeats: u64,
}

impl RunStats {
    fn tally(&mut self, outcome: PollOutcome) {
        self.polls += 1;
        match outcome {
            PollOutcome::Written(_) => self.written += 1,
            PollOutcome::Dropped => self.dropped += 1,
            PollOutcome::Idle { heartbeat: Some(_) } => self.heartbeats += 1,
            PollOutcome::Idle { heartbeat: None } => {}
        }
    }
}

/// Drive `session` until `source` is exhausted. Any error is fatal.
pub fn run<B, C, J, S>(
    session: &mut Session<B, C, J>,
    source: &mut S,
    poll_interval: Duration,
) -> Result<RunStats>
where
    B: RecordBackend,
    C: WallClock + MonotonicClock,
    J: ActivitySink,
    S: ReadingSource + ?Sized,
{
    let mut stats = RunStats::default();
    while let Some(raw) = source.next_poll()? {
        let outcome = session.poll(&raw)?;
        stats.tally(outcome);
        if !poll_interval.is_zero() {
            thread::sleep(poll_interval);
        }
    }
    diag::warn(
        "GHPI-DAEMON",
        format_args!(
            "{} source closed after {} polls ({} written, {} dropped, {} heartbeats)",
            session.sensor(),
            stats.polls,
            stats.written,
            stats.dropped,
            stats.heartbeats
        ),
    );
    Ok(stats)
}

/// Open the database at `db_path` and ingest comma-separated polls from `input`.
#[cfg(feature = "sqlite")]
pub fn run_sqlite(
    config: &crate::core::config::Config,
    db_path: &std::path::Path,
    input: impl std::io::BufRead,
) -> Result<RunStats> {
    use crate::core::clock::SystemClock;
    use crate::daemon::source::LineSource;
    use crate::logger::jsonl::{JournalWriter, NullSink};
    use crate::store::Store;
    use crate::store::sqlite::SqliteBackend;

    let backend = SqliteBackend::open(db_path)?.with_record_table(&config.sensor.table_name())?;
    let store = Store::new(backend, config.busy.policy());
    let journal: Box<dyn ActivitySink> = if config.journal.enabled {
        Box::new(JournalWriter::open(config.journal.files()))
    } else {
        Box::new(NullSink)
    };

    let mut session = Session::start(store, config, SystemClock, journal)?;
    let mut source = LineSource::new(input);
    run(
        &mut session,
        &mut source,
        Duration::from_millis(config.sensor.poll_interval_ms),
    )
}
