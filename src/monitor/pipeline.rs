//! Channel pipeline: turns one poll of raw sensor values into a write-or-idle decision.
//!
//! Every sensor program is the same shape: N channels, each scaled from a raw
//! floating reading into integer hysteresis units, filtered, and written together
//! when any one of them moves. The pipeline is that shape, parameterized by the
//! channel list instead of duplicated per sensor.

#![allow(missing_docs)]
#![allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]

use serde::{Deserialize, Serialize};

use crate::core::errors::{GhError, Result};
use crate::monitor::hysteresis::HysteresisFilter;

/// How a channel decides a reading is reportable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    /// Bucketed hysteresis; stored value is the bucket index.
    #[default]
    Hysteresis,
    /// Any change of the integer value is reportable (two-state inputs).
    Exact,
}

/// Resolved per-channel conversion, after calibration lookups.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelCalibration {
    pub name: String,
    /// Raw reading → stored units multiplier.
    pub scale: f64,
    /// Added after scaling, in stored units.
    pub offset: f64,
    pub mode: FilterMode,
    /// Persisted value is `mem * store_multiplier / S`: a stored unit finer
    /// than the hysteresis bucket (BME680 logs centidegrees off whole-degree
    /// buckets with 10). Ignored in exact mode.
    pub store_multiplier: i64,
}

impl ChannelCalibration {
    #[must_use]
    pub fn new(name: impl Into<String>, scale: f64, offset: f64, mode: FilterMode) -> Self {
        Self {
            name: name.into(),
            scale,
            offset,
            mode,
            store_multiplier: 1,
        }
    }

    #[must_use]
    pub fn with_store_multiplier(mut self, multiplier: i64) -> Self {
        self.store_multiplier = multiplier.max(1);
        self
    }
}

/// Relative tolerance for snapping a scaled reading onto an integer.
const SNAP_EPSILON: f64 = 1e-9;

/// `floor(v)`, except values within rounding error of an integer land on it:
/// `1.15 * 100.0 * 4.0` is `459.99999999999994` and must count as 460.
fn floor_units(v: f64) -> i64 {
    let nearest = v.round();
    if (v - nearest).abs() <= SNAP_EPSILON * nearest.abs().max(1.0) {
        nearest as i64
    } else {
        v.floor() as i64
    }
}

#[derive(Debug, Clone)]
enum ChannelFilter {
    Hysteresis(HysteresisFilter),
    /// Starts at 0, so an all-zero first poll is not a change.
    Exact { last: i64 },
}

#[derive(Debug, Clone)]
struct Channel {
    calibration: ChannelCalibration,
    filter: ChannelFilter,
}

/// What the poll loop should do with one poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollDecision {
    /// At least one channel moved: persist these stored-unit values.
    Record(Vec<Option<i64>>),
    /// Nothing reportable (or still warming up): tick the idle tracker.
    Idle,
}

/// Multi-channel filter bank for one sensor.
#[derive(Debug, Clone)]
pub struct ChannelPipeline {
    channels: Vec<Channel>,
    hyst_scale: i64,
    warm_up_remaining: u32,
}

impl ChannelPipeline {
    #[must_use]
    pub fn new(calibrations: Vec<ChannelCalibration>, hyst_scale: i64, warm_up_cycles: u32) -> Self {
        let channels = calibrations
            .into_iter()
            .map(|calibration| {
                let filter = match calibration.mode {
                    FilterMode::Hysteresis => {
                        ChannelFilter::Hysteresis(HysteresisFilter::new(hyst_scale))
                    }
                    FilterMode::Exact => ChannelFilter::Exact { last: 0 },
                };
                Channel {
                    calibration,
                    filter,
                }
            })
            .collect();
        Self {
            channels,
            hyst_scale: hyst_scale.max(1),
            warm_up_remaining: warm_up_cycles,
        }
    }

    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    #[must_use]
    pub fn channel_names(&self) -> Vec<&str> {
        self.channels
            .iter()
            .map(|c| c.calibration.name.as_str())
            .collect()
    }

    #[must_use]
    pub fn is_warming_up(&self) -> bool {
        self.warm_up_remaining > 0
    }

    /// Feed one poll. `None` marks a channel the collaborator could not read;
    /// it leaves that channel's filter untouched and is persisted as NULL.
    pub fn process(&mut self, raw: &[Option<f64>]) -> Result<PollDecision> {
        if raw.len() != self.channels.len() {
            return Err(GhError::ChannelCount {
                expected: self.channels.len(),
                got: raw.len(),
            });
        }

        let mut any_changed = false;
        let mut values = Vec::with_capacity(raw.len());
        for (channel, reading) in self.channels.iter_mut().zip(raw) {
            let Some(reading) = *reading else {
                values.push(None);
                continue;
            };
            let cal = &channel.calibration;
            let stored_units = reading.mul_add(cal.scale, cal.offset);
            if !stored_units.is_finite() {
                return Err(GhError::ReadingParse {
                    line: format!("{}={reading}", cal.name),
                    details: "reading is not a finite number after scaling".to_string(),
                });
            }
            match &mut channel.filter {
                ChannelFilter::Hysteresis(filter) => {
                    let x = floor_units(stored_units * self.hyst_scale as f64);
                    any_changed |= filter.observe(x);
                    let mem = filter.state().mem;
                    values.push(Some(
                        mem.saturating_mul(cal.store_multiplier)
                            .div_euclid(self.hyst_scale),
                    ));
                }
                ChannelFilter::Exact { last } => {
                    let x = floor_units(stored_units);
                    any_changed |= *last != x;
                    *last = x;
                    values.push(Some(x));
                }
            }
        }

        if self.warm_up_remaining > 0 {
            self.warm_up_remaining -= 1;
            return Ok(PollDecision::Idle);
        }
        Ok(if any_changed {
            PollDecision::Record(values)
        } else {
            PollDecision::Idle
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sht31_like() -> ChannelPipeline {
        ChannelPipeline::new(
            vec![
                ChannelCalibration::new("temp", 100.0, 0.0, FilterMode::Hysteresis),
                ChannelCalibration::new("hum", 10.0, 0.0, FilterMode::Hysteresis),
            ],
            4,
            0,
        )
    }

    #[test]
    fn first_real_reading_is_recorded_in_stored_units() {
        let mut p = sht31_like();
        let decision = p.process(&[Some(21.37), Some(45.2)]).unwrap();
        // temp: floor(2137 * 4) / 4 = 2137; hum: floor(452 * 4) / 4 = 452.
        assert_eq!(decision, PollDecision::Record(vec![Some(2137), Some(452)]));
    }

    #[test]
    fn unchanged_poll_is_idle() {
        let mut p = sht31_like();
        p.process(&[Some(21.37), Some(45.2)]).unwrap();
        assert_eq!(
            p.process(&[Some(21.37), Some(45.2)]).unwrap(),
            PollDecision::Idle
        );
    }

    #[test]
    fn one_moving_channel_writes_all_channels() {
        let mut p = sht31_like();
        p.process(&[Some(21.37), Some(45.2)]).unwrap();
        let decision = p.process(&[Some(21.37), Some(45.5)]).unwrap();
        assert_eq!(decision, PollDecision::Record(vec![Some(2137), Some(455)]));
    }

    #[test]
    fn missing_channel_is_null_and_does_not_trigger() {
        let mut p = sht31_like();
        p.process(&[Some(21.37), Some(45.2)]).unwrap();
        assert_eq!(p.process(&[Some(21.37), None]).unwrap(), PollDecision::Idle);
        let decision = p.process(&[Some(22.0), None]).unwrap();
        assert_eq!(decision, PollDecision::Record(vec![Some(2200), None]));
    }

    #[test]
    fn offset_is_applied_in_stored_units() {
        let mut p = ChannelPipeline::new(
            vec![ChannelCalibration::new(
                "temp",
                175.0 * 100.0 / 65535.0,
                -4500.0,
                FilterMode::Hysteresis,
            )],
            4,
            0,
        );
        let PollDecision::Record(values) = p.process(&[Some(26000.0)]).unwrap() else {
            panic!("first reading must record");
        };
        // -45 + 175 * 26000/65535 = 24.4285..°C → 2442 centidegrees.
        assert_eq!(values, vec![Some(2442)]);
    }

    #[test]
    fn exact_mode_reports_any_flip() {
        let mut p = ChannelPipeline::new(
            vec![
                ChannelCalibration::new("q1", 1.0, 0.0, FilterMode::Exact),
                ChannelCalibration::new("q2", 1.0, 0.0, FilterMode::Exact),
            ],
            4,
            0,
        );
        assert_eq!(
            p.process(&[Some(1.0), Some(1.0)]).unwrap(),
            PollDecision::Record(vec![Some(1), Some(1)])
        );
        assert_eq!(
            p.process(&[Some(1.0), Some(1.0)]).unwrap(),
            PollDecision::Idle
        );
        assert_eq!(
            p.process(&[Some(0.0), Some(1.0)]).unwrap(),
            PollDecision::Record(vec![Some(0), Some(1)])
        );
    }

    #[test]
    fn exact_mode_starts_from_zero() {
        let mut p = ChannelPipeline::new(
            vec![
                ChannelCalibration::new("q1", 1.0, 0.0, FilterMode::Exact),
                ChannelCalibration::new("q2", 1.0, 0.0, FilterMode::Exact),
            ],
            4,
            0,
        );
        assert_eq!(p.process(&[Some(0.0), Some(0.0)]).unwrap(), PollDecision::Idle);
        assert_eq!(
            p.process(&[Some(0.0), Some(1.0)]).unwrap(),
            PollDecision::Record(vec![Some(0), Some(1)])
        );
    }

    fn centi_channel() -> ChannelPipeline {
        ChannelPipeline::new(
            vec![ChannelCalibration::new("temp", 100.0, 0.0, FilterMode::Hysteresis)],
            4,
            0,
        )
    }

    #[test]
    fn decimal_readings_below_integer_boundary_keep_their_unit() {
        for (reading, stored) in [(1.15, 115), (0.29, 29), (0.57, 57), (4.35, 435)] {
            let mut p = centi_channel();
            assert_eq!(
                p.process(&[Some(reading)]).unwrap(),
                PollDecision::Record(vec![Some(stored)]),
                "reading {reading}"
            );
        }
    }

    #[test]
    fn genuine_fractions_still_floor() {
        assert_eq!(floor_units(459.75), 459);
        assert_eq!(floor_units(-0.5), -1);
        assert_eq!(floor_units(459.999_999_999_999_94), 460);
        assert_eq!(floor_units(-2.000_000_000_000_000_4), -2);
    }

    #[test]
    fn store_multiplier_gives_finer_stored_unit() {
        // BME680-style temperature: whole-degree buckets, tenth-degree column.
        let mut p = ChannelPipeline::new(
            vec![
                ChannelCalibration::new("temp", 1.0, 0.0, FilterMode::Hysteresis)
                    .with_store_multiplier(10),
            ],
            4,
            0,
        );
        // x = floor(21.5 * 4) = 86; stored = 86 * 10 / 4 = 215.
        assert_eq!(
            p.process(&[Some(21.5)]).unwrap(),
            PollDecision::Record(vec![Some(215)])
        );
        // 21.75 → x = 87 stays inside bucket 21: idle, no write.
        assert_eq!(p.process(&[Some(21.75)]).unwrap(), PollDecision::Idle);
        // 22.0 → x = 88 crosses into bucket 22; the stored value keeps its finer unit.
        assert_eq!(
            p.process(&[Some(22.0)]).unwrap(),
            PollDecision::Record(vec![Some(220)])
        );
    }

    proptest! {
        #[test]
        fn two_decimal_readings_store_exact_hundredths(k in 0_i64..100_000) {
            let mut p = centi_channel();
            prop_assert_eq!(
                p.process(&[Some(k as f64 / 100.0)]).unwrap(),
                if k == 0 { PollDecision::Idle } else { PollDecision::Record(vec![Some(k)]) }
            );
        }
    }

    #[test]
    fn warm_up_primes_filters_without_recording() {
        let mut p = ChannelPipeline::new(
            vec![ChannelCalibration::new("gas", 1.0, 0.0, FilterMode::Hysteresis)],
            4,
            2,
        );
        assert!(p.is_warming_up());
        assert_eq!(p.process(&[Some(10.0)]).unwrap(), PollDecision::Idle);
        assert_eq!(p.process(&[Some(20.0)]).unwrap(), PollDecision::Idle);
        assert!(!p.is_warming_up());
        assert_eq!(
            p.process(&[Some(30.0)]).unwrap(),
            PollDecision::Record(vec![Some(30)])
        );
    }

    #[test]
    fn channel_count_mismatch_is_an_error() {
        let mut p = sht31_like();
        let err = p.process(&[Some(1.0)]).unwrap_err();
        assert!(matches!(
            err,
            GhError::ChannelCount {
                expected: 2,
                got: 1
            }
        ));
    }

    #[test]
    fn non_finite_reading_is_rejected() {
        let mut p = sht31_like();
        let err = p.process(&[Some(f64::NAN), Some(1.0)]).unwrap_err();
        assert_eq!(err.code(), "GH-2102");
    }
}
