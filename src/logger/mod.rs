//! Logging: timestamped stderr diagnostics plus the optional JSONL activity journal.

pub mod diag;
pub mod jsonl;
