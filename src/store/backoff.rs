//! Busy/backoff policy for a store shared by several writer processes.
//!
//! The store signals contention instead of blocking; this policy turns each
//! signal into either "sleep and try again" or "give up". It is a pure function
//! of the attempt count, so every logical operation gets its own budget.

#![allow(missing_docs)]

use std::time::Duration;

/// Default wait per contended attempt.
pub const DEFAULT_BUSY_WAIT: Duration = Duration::from_millis(100);
/// Attempts at or above this count are announced on stderr.
pub const DEFAULT_NOTICE_THRESHOLD: u32 = 1;
/// Attempt count at which the policy stops retrying.
pub const DEFAULT_BUSY_RETRY_MAX: u32 = 50;

/// What the caller should do after the store reported "busy".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusyDecision {
    Retry { wait: Duration, notify: bool },
    GiveUp,
}

/// Retry policy invoked with the number of earlier busy reports for the
/// same operation (the first contention is attempt 0).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusyPolicy {
    pub wait: Duration,
    pub notice_threshold: u32,
    pub retry_max: u32,
}

impl Default for BusyPolicy {
    fn default() -> Self {
        Self {
            wait: DEFAULT_BUSY_WAIT,
            notice_threshold: DEFAULT_NOTICE_THRESHOLD,
            retry_max: DEFAULT_BUSY_RETRY_MAX,
        }
    }
}

impl BusyPolicy {
    #[must_use]
    pub const fn new(wait: Duration, notice_threshold: u32, retry_max: u32) -> Self {
        Self {
            wait,
            notice_threshold,
            retry_max,
        }
    }

    #[must_use]
    pub const fn on_contention(&self, attempt_count: u32) -> BusyDecision {
        if attempt_count >= self.retry_max {
            return BusyDecision::GiveUp;
        }
        BusyDecision::Retry {
            wait: self.wait,
            notify: attempt_count >= self.notice_threshold,
        }
    }
}
