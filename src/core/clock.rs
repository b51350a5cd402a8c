//! Wall-clock record timestamps and the monotonic clock used for idle tracking.
//!
//! Record keys are `(sec, subsec)` where `subsec` is the nanosecond field shifted
//! right by [`SUBSEC_SHIFT`]: a coarse counter of roughly 8.4 ms units (0..=119),
//! close enough to centiseconds for a poll cadence measured in hundreds of
//! milliseconds. Wall time orders records; monotonic time measures idleness.
//! The two sources must never be substituted for each other.

#![allow(missing_docs)]

use std::cell::Cell;
use std::cmp::Ordering;
use std::fmt;
use std::time::{Duration, Instant};

/// Right shift converting nanoseconds into the stored sub-second counter.
pub const SUBSEC_SHIFT: u32 = 23;

const NANOS_PER_SEC: u32 = 1_000_000_000;
const SUBSEC_UNIT_NANOS: u32 = 1 << SUBSEC_SHIFT;

/// A wall-clock instant with full nanosecond precision whose persisted key is coarse.
///
/// Equality and ordering compare the persisted key only, so two timestamps that
/// land in the same sub-second bucket collide exactly as they would in the store.
#[derive(Debug, Clone, Copy)]
pub struct Timestamp {
    sec: i64,
    nanos: u32,
}

impl Timestamp {
    /// Build from seconds and nanoseconds; nanos beyond one second (leap-second
    /// smear) are clamped into the last bucket of the second.
    #[must_use]
    pub fn new(sec: i64, nanos: u32) -> Self {
        Self {
            sec,
            nanos: nanos.min(NANOS_PER_SEC - 1),
        }
    }

    /// Rebuild a timestamp from a persisted `(sec, subsec)` key.
    #[must_use]
    pub fn from_key(sec: i64, subsec: i64) -> Self {
        let subsec = subsec.clamp(0, i64::from((NANOS_PER_SEC - 1) >> SUBSEC_SHIFT));
        // Clamped above, so the cast cannot truncate.
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let nanos = (subsec as u32) << SUBSEC_SHIFT;
        Self { sec, nanos }
    }

    #[must_use]
    pub const fn sec(&self) -> i64 {
        self.sec
    }

    #[must_use]
    pub const fn subsec(&self) -> i64 {
        (self.nanos >> SUBSEC_SHIFT) as i64
    }

    #[must_use]
    pub const fn nanos(&self) -> u32 {
        self.nanos
    }

    /// The persisted `(sec, subsec)` pair.
    #[must_use]
    pub const fn key(&self) -> (i64, i64) {
        (self.sec, self.subsec())
    }

    /// Advance by one sub-second unit, carrying into seconds.
    ///
    /// The result always has a strictly greater key than `self`.
    #[must_use]
    pub fn bump(self) -> Self {
        let mut sec = self.sec;
        let mut nanos = self.nanos + SUBSEC_UNIT_NANOS;
        if nanos >= NANOS_PER_SEC {
            nanos -= NANOS_PER_SEC;
            sec += 1;
        }
        Self { sec, nanos }
    }

    /// Local-time rendering used in diagnostics.
    #[must_use]
    pub fn local_label(&self) -> String {
        chrono::DateTime::<chrono::Utc>::from_timestamp(self.sec, self.nanos).map_or_else(
            || format!("@{}", self.sec),
            |utc| {
                utc.with_timezone(&chrono::Local)
                    .format("%Y-%m-%d %H:%M:%S")
                    .to_string()
            },
        )
    }
}

impl PartialEq for Timestamp {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Timestamp {}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:03}", self.sec, self.subsec())
    }
}

/// Source of record timestamps.
pub trait WallClock {
    fn now(&self) -> Timestamp;
}

/// Source of idle-interval measurements. Must never jump backwards.
pub trait MonotonicClock {
    fn now(&self) -> Instant;
}

/// The real system clocks.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl WallClock for SystemClock {
    fn now(&self) -> Timestamp {
        let now = chrono::Utc::now();
        Timestamp::new(now.timestamp(), now.timestamp_subsec_nanos())
    }
}

impl MonotonicClock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Hand-driven clocks for simulation and replay.
///
/// Wall and monotonic time are advanced independently so tests can model a
/// wall clock being stepped while monotonic time keeps flowing.
#[derive(Debug)]
pub struct ManualClock {
    wall: Cell<Timestamp>,
    origin: Instant,
    elapsed: Cell<Duration>,
}

impl ManualClock {
    #[must_use]
    pub fn new(wall: Timestamp) -> Self {
        Self {
            wall: Cell::new(wall),
            origin: Instant::now(),
            elapsed: Cell::new(Duration::ZERO),
        }
    }

    /// Advance both clocks by `by`.
    pub fn advance(&self, by: Duration) {
        self.advance_monotonic(by);
        let wall = self.wall.get();
        let total = u64::from(wall.nanos()) + u64::from(by.subsec_nanos());
        let carry = i64::try_from(total / u64::from(NANOS_PER_SEC)).unwrap_or(0);
        let secs = i64::try_from(by.as_secs()).unwrap_or(i64::MAX);
        // `total % 1e9` always fits in u32.
        #[allow(clippy::cast_possible_truncation)]
        let nanos = (total % u64::from(NANOS_PER_SEC)) as u32;
        self.wall
            .set(Timestamp::new(wall.sec().saturating_add(secs) + carry, nanos));
    }

    /// Advance only the monotonic clock.
    pub fn advance_monotonic(&self, by: Duration) {
        self.elapsed.set(self.elapsed.get() + by);
    }

    /// Step the wall clock to an arbitrary time (e.g. an NTP correction).
    pub fn set_wall(&self, wall: Timestamp) {
        self.wall.set(wall);
    }
}

impl WallClock for ManualClock {
    fn now(&self) -> Timestamp {
        self.wall.get()
    }
}

impl MonotonicClock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed.get()
    }
}

impl<C: WallClock + ?Sized> WallClock for &C {
    fn now(&self) -> Timestamp {
        (**self).now()
    }
}

impl<C: MonotonicClock + ?Sized> MonotonicClock for &C {
    fn now(&self) -> Instant {
        (**self).now()
    }
}
