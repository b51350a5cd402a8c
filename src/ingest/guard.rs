//! Startup consistency guard: refuse to log if wall time is behind the store.
//!
//! Record keys must never go backwards, so a daemon whose clock reads earlier
//! than the newest persisted record (a board that booted without a network
//! time fix, say) must not start. Only checked once; a clock stepped backwards
//! mid-run is not detected.

#![allow(missing_docs)]

use crate::core::clock::{Timestamp, WallClock};
use crate::core::errors::{GhError, Result};
use crate::store::{RecordBackend, Store};

/// Compare the store's high-water mark against `wall`. Returns the mark.
pub fn check<B: RecordBackend, W: WallClock + ?Sized>(
    store: &mut Store<B>,
    wall: &W,
) -> Result<Timestamp> {
    let high_water = store.high_water_mark()?;
    let now = wall.now();
    if now < high_water {
        return Err(GhError::ClockRegression {
            behind_secs: high_water.sec() - now.sec(),
        });
    }
    Ok(high_water)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::core::clock::ManualClock;
    use crate::store::backoff::BusyPolicy;
    use crate::store::memory::MemoryBackend;

    fn store_at(sec: i64, subsec: i64) -> Store<MemoryBackend> {
        let mut backend = MemoryBackend::new();
        backend.set_external_high_water(Timestamp::from_key(sec, subsec));
        Store::new(backend, BusyPolicy::new(Duration::ZERO, 1, 50))
    }

    #[test]
    fn clock_behind_high_water_is_fatal() {
        let mut store = store_at(1000, 0);
        let clock = ManualClock::new(Timestamp::new(995, 0));
        let err = check(&mut store, &clock).unwrap_err();
        assert!(matches!(err, GhError::ClockRegression { behind_secs: 5 }));
        assert_eq!(err.exit_code(), -1);
    }

    #[test]
    fn clock_equal_or_ahead_proceeds() {
        let mut store = store_at(1000, 0);
        let clock = ManualClock::new(Timestamp::new(1000, 0));
        assert_eq!(check(&mut store, &clock).unwrap().key(), (1000, 0));
        clock.set_wall(Timestamp::new(1001, 0));
        assert!(check(&mut store, &clock).is_ok());
    }

    #[test]
    fn subsecond_regression_within_same_second_is_fatal() {
        let mut store = store_at(1000, 50);
        let clock = ManualClock::new(Timestamp::from_key(1000, 49));
        let err = check(&mut store, &clock).unwrap_err();
        assert!(matches!(err, GhError::ClockRegression { behind_secs: 0 }));
    }

    #[test]
    fn empty_store_always_proceeds() {
        let mut store = Store::new(MemoryBackend::new(), BusyPolicy::default());
        let clock = ManualClock::new(Timestamp::new(1, 0));
        assert!(check(&mut store, &clock).is_ok());
    }
}
