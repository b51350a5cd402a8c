//! Hysteresis filter: per-channel debounce deciding whether a reading is reportable.
//!
//! Readings arrive pre-scaled into hysteresis units; a change is reportable when
//! the value crosses into a different bucket of width `scale`. Reversing direction
//! requires overshooting the remembered value by more than one raw unit, which
//! suppresses jitter around a local extremum. The dead zone is deliberately
//! asymmetric: from `mem` going up, `mem - 1` is absorbed and `mem - 2` flips.

#![allow(missing_docs)]

/// Default bucket width, in raw units per stored unit.
pub const DEFAULT_HYST_SCALE: i64 = 4;

/// Per-channel filter memory. Starts out "decreasing from zero" at process start,
/// so the first movement away from zero is always treated as new.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HysteresisState {
    pub increasing: bool,
    pub mem: i64,
}

impl HysteresisState {
    #[must_use]
    pub const fn new(increasing: bool, mem: i64) -> Self {
        Self { increasing, mem }
    }

    /// Stored-unit value of the remembered reading.
    #[must_use]
    pub const fn bucket(&self, scale: i64) -> i64 {
        self.mem.div_euclid(scale)
    }
}

/// Pure transition function. Returns `(changed, next_state)`.
#[must_use]
pub fn observe(state: HysteresisState, x: i64, scale: i64) -> (bool, HysteresisState) {
    let HysteresisState { increasing, mem } = state;
    let crossed = mem.div_euclid(scale) != x.div_euclid(scale);

    if (increasing && x > mem) || (!increasing && x < mem) {
        (crossed, HysteresisState::new(increasing, x))
    } else if increasing && x < mem - 1 {
        (crossed, HysteresisState::new(false, x))
    } else if !increasing && x > mem + 1 {
        (crossed, HysteresisState::new(true, x))
    } else {
        (false, state)
    }
}

/// A single channel's filter: bucket width plus its evolving state.
#[derive(Debug, Clone)]
pub struct HysteresisFilter {
    scale: i64,
    state: HysteresisState,
}

impl HysteresisFilter {
    /// `scale` must be positive; configuration validation guarantees it.
    #[must_use]
    pub fn new(scale: i64) -> Self {
        Self {
            scale: scale.max(1),
            state: HysteresisState::default(),
        }
    }

    #[must_use]
    pub fn with_state(scale: i64, state: HysteresisState) -> Self {
        Self {
            scale: scale.max(1),
            state,
        }
    }

    /// Feed one reading; returns whether it is a reportable change.
    pub fn observe(&mut self, x: i64) -> bool {
        let (changed, next) = observe(self.state, x, self.scale);
        self.state = next;
        changed
    }

    #[must_use]
    pub const fn state(&self) -> HysteresisState {
        self.state
    }

    #[must_use]
    pub const fn scale(&self) -> i64 {
        self.scale
    }

    /// The value to persist: the remembered reading in stored units.
    #[must_use]
    pub const fn stored_value(&self) -> i64 {
        self.state.bucket(self.scale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const S: i64 = 4;

    #[test]
    fn reversal_by_one_unit_is_absorbed() {
        let state = HysteresisState::new(true, 10);
        let (changed, next) = observe(state, 9, S);
        assert!(!changed);
        assert_eq!(next, state, "x == mem-1 must not flip direction");
    }

    #[test]
    fn reversal_by_two_units_flips_and_reports_bucket_change() {
        let state = HysteresisState::new(true, 10);
        let (changed, next) = observe(state, 8, S);
        // floor(10/4) = 2, floor(8/4) = 2: no bucket change.
        assert!(!changed);
        assert_eq!(next, HysteresisState::new(false, 8));

        let state = HysteresisState::new(true, 12);
        let (changed, next) = observe(state, 10, S);
        // floor(12/4) = 3, floor(10/4) = 2.
        assert!(changed);
        assert_eq!(next, HysteresisState::new(false, 10));
    }

    #[test]
    fn decreasing_reversal_mirrors_increasing() {
        let state = HysteresisState::new(false, 10);
        assert_eq!(observe(state, 11, S), (false, state));
        let (changed, next) = observe(state, 12, S);
        assert!(changed, "floor(10/4)=2 vs floor(12/4)=3");
        assert_eq!(next, HysteresisState::new(true, 12));
    }

    #[test]
    fn equal_reading_changes_nothing() {
        let state = HysteresisState::new(true, 10);
        assert_eq!(observe(state, 10, S), (false, state));
        let state = HysteresisState::new(false, 10);
        assert_eq!(observe(state, 10, S), (false, state));
    }

    #[test]
    fn same_direction_move_updates_memory_even_without_report() {
        let mut filter = HysteresisFilter::with_state(S, HysteresisState::new(true, 8));
        assert!(!filter.observe(9));
        assert!(!filter.observe(11));
        assert_eq!(filter.state().mem, 11);
        assert!(filter.observe(12));
        assert_eq!(filter.stored_value(), 3);
    }

    #[test]
    fn fresh_filter_treats_first_rise_as_new() {
        let mut filter = HysteresisFilter::new(S);
        // From {decreasing, 0}, 1 is inside the dead zone.
        assert!(!filter.observe(1));
        assert!(filter.observe(93));
        assert!(filter.state().increasing);
        assert_eq!(filter.stored_value(), 23);
    }

    #[test]
    fn negative_readings_use_floor_buckets() {
        let mut filter = HysteresisFilter::with_state(S, HysteresisState::new(false, 0));
        // floor(-1/4) = -1, so crossing below zero is a bucket change.
        assert!(filter.observe(-1));
        assert_eq!(filter.stored_value(), -1);
        assert!(!filter.observe(-4));
        assert!(filter.observe(-5));
        assert_eq!(filter.stored_value(), -2);
    }

    #[test]
    fn jitter_at_extremum_is_suppressed() {
        let mut filter = HysteresisFilter::with_state(S, HysteresisState::new(true, 15));
        let flags: Vec<bool> = [16, 15, 16, 15, 16, 15]
            .into_iter()
            .map(|x| filter.observe(x))
            .collect();
        // 16 crosses 15->16 (bucket 3 -> 4) once; the wobble afterwards is absorbed.
        assert_eq!(flags, vec![true, false, false, false, false, false]);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        #[test]
        fn monotone_moves_within_one_bucket_never_report(
            bucket in -1000_i64..1000,
            offsets in proptest::collection::vec(0_i64..S, 1..16),
            rising in any::<bool>(),
        ) {
            let mut sorted = offsets.clone();
            sorted.sort_unstable();
            if !rising {
                sorted.reverse();
            }
            let base = bucket * S;
            let start = if rising { base } else { base + S - 1 };
            let mut filter = HysteresisFilter::with_state(S, HysteresisState::new(rising, start));
            for off in sorted {
                prop_assert!(!filter.observe(base + off));
                prop_assert_eq!(filter.state().increasing, rising);
            }
        }

        #[test]
        fn replay_is_deterministic(readings in proptest::collection::vec(-500_i64..500, 0..64)) {
            let mut a = HysteresisFilter::new(S);
            let mut b = HysteresisFilter::new(S);
            let first: Vec<bool> = readings.iter().map(|&x| a.observe(x)).collect();
            let second: Vec<bool> = readings.iter().map(|&x| b.observe(x)).collect();
            prop_assert_eq!(first, second);
            prop_assert_eq!(a.state(), b.state());
        }

        #[test]
        fn report_implies_bucket_crossing(
            increasing in any::<bool>(),
            mem in -200_i64..200,
            x in -200_i64..200,
        ) {
            let state = HysteresisState::new(increasing, mem);
            let (changed, next) = observe(state, x, S);
            if changed {
                prop_assert_ne!(mem.div_euclid(S), x.div_euclid(S));
                prop_assert_eq!(next.mem, x);
            }
            if next == state {
                prop_assert!(!changed);
            }
        }
    }
}
