//! Reading sources: where a daemon's raw polls come from.
//!
//! Hardware drivers run as separate producer processes and pipe one line per
//! poll cycle into the daemon: comma-separated raw readings in channel order,
//! with `null` (or an empty field) for a channel the driver could not read.

#![allow(missing_docs)]

use std::io::BufRead;

use crate::core::errors::{GhError, Result};

/// One raw poll: a reading per channel, `None` where unreadable.
pub type RawPoll = Vec<Option<f64>>;

pub trait ReadingSource {
    /// Block until the next poll is available. `Ok(None)` ends the run.
    fn next_poll(&mut self) -> Result<Option<RawPoll>>;
}

/// Comma-separated polls, one per line. Blank lines and `#` comments are skipped.
pub struct LineSource<R> {
    reader: R,
    line_no: u64,
    buf: String,
}

impl<R: BufRead> LineSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line_no: 0,
            buf: String::new(),
        }
    }

    /// Number of lines consumed so far.
    pub const fn line_no(&self) -> u64 {
        self.line_no
    }
}

impl<R: BufRead> ReadingSource for LineSource<R> {
    fn next_poll(&mut self) -> Result<Option<RawPoll>> {
        loop {
            self.buf.clear();
            let read = self
                .reader
                .read_line(&mut self.buf)
                .map_err(|source| GhError::io("<stdin>", source))?;
            if read == 0 {
                return Ok(None);
            }
            self.line_no += 1;
            let line = self.buf.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            return parse_poll(line)
                .map(Some)
                .map_err(|details| GhError::ReadingParse {
                    line: format!("{}: {line}", self.line_no),
                    details,
                });
        }
    }
}

/// Parse `"21.5, null, 3"` into readings.
pub fn parse_poll(line: &str) -> std::result::Result<RawPoll, String> {
    line.split(',')
        .map(str::trim)
        .enumerate()
        .map(|(i, field)| {
            if field.is_empty() || field.eq_ignore_ascii_case("null") {
                return Ok(None);
            }
            match field.parse::<f64>() {
                Ok(v) if v.is_finite() => Ok(Some(v)),
                Ok(_) => Err(format!("field {} is not finite: {field:?}", i + 1)),
                Err(e) => Err(format!("field {} {field:?}: {e}", i + 1)),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn parses_values_and_nulls() {
        assert_eq!(
            parse_poll("21.5, null,3").unwrap(),
            vec![Some(21.5), None, Some(3.0)]
        );
        assert_eq!(parse_poll("1,,2").unwrap(), vec![Some(1.0), None, Some(2.0)]);
        assert_eq!(parse_poll("NULL").unwrap(), vec![None]);
    }

    #[test]
    fn rejects_garbage_and_infinities() {
        assert!(parse_poll("1,abc").is_err());
        assert!(parse_poll("inf").is_err());
        assert!(parse_poll("NaN").is_err());
    }

    #[test]
    fn line_source_skips_blanks_and_comments_then_ends() {
        let input = Cursor::new("# SHT31 raw counts\n26214,30000\n\n26300,null\n");
        let mut source = LineSource::new(input);
        assert_eq!(
            source.next_poll().unwrap(),
            Some(vec![Some(26214.0), Some(30000.0)])
        );
        assert_eq!(source.next_poll().unwrap(), Some(vec![Some(26300.0), None]));
        assert_eq!(source.next_poll().unwrap(), None);
        assert_eq!(source.line_no(), 4);
    }

    #[test]
    fn malformed_line_reports_line_number() {
        let mut source = LineSource::new(Cursor::new("1,2\n1,x\n"));
        source.next_poll().unwrap();
        let err = source.next_poll().unwrap_err();
        assert_eq!(err.code(), "GH-2102");
        assert!(err.to_string().contains("\"2: 1,x\""));
    }
}
