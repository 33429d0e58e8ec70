//! Weight recalibration from realized outcomes.
//!
//! Records are split at the median realized return. For each calibratable
//! factor the cohort means of its raw value are compared and the weight is
//! nudged by a bucketed, capped step, then clipped into the factor's bounds.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::domain::error::DiprankerError;
use crate::domain::factor::Factor;
use crate::domain::validation::{ValidationRecord, mean};
use crate::domain::weights::WeightVector;

pub const DEFAULT_MIN_SAMPLE: usize = 20;
pub const DEFAULT_MAX_ADJUSTMENT: f64 = 3.0;

/// Calibratable factors and whether a low raw value is the bullish signal.
pub const CALIBRATED_FACTORS: [(Factor, bool); 5] = [
    (Factor::Dividend, false),
    (Factor::DivGrowth, false),
    (Factor::DipZscore, true),
    (Factor::Ret5, true),
    (Factor::Ret5VsSector, true),
];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationConfig {
    pub min_sample: usize,
    pub max_adjustment: f64,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        CalibrationConfig {
            min_sample: DEFAULT_MIN_SAMPLE,
            max_adjustment: DEFAULT_MAX_ADJUSTMENT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightChange {
    pub factor: Factor,
    pub old: f64,
    pub new: f64,
    /// Cohort difference after sign inversion.
    pub diff: f64,
}

#[derive(Debug)]
pub struct CalibrationOutcome {
    pub weights: WeightVector,
    pub changes: Vec<WeightChange>,
    /// Set when the input was returned unchanged for lack of data.
    pub skipped: Option<DiprankerError>,
}

/// Map a cohort difference to a signed step of at most `max_adjustment`.
pub fn adjustment_for(diff: f64, max_adjustment: f64) -> f64 {
    let magnitude = diff.abs();
    let step = if magnitude > 2.0 {
        max_adjustment
    } else if magnitude > 1.0 {
        2.0
    } else if magnitude > 0.5 {
        1.0
    } else {
        0.0
    };
    step.min(max_adjustment) * diff.signum()
}

/// Recalibrate `weights` from `records`.
pub fn calibrate(
    records: &[ValidationRecord],
    weights: &WeightVector,
    config: &CalibrationConfig,
) -> CalibrationOutcome {
    if records.is_empty() || records.len() < config.min_sample {
        let err = DiprankerError::InsufficientSample {
            have: records.len(),
            need: config.min_sample,
        };
        warn!(error = %err, "calibration skipped");
        return CalibrationOutcome {
            weights: weights.clone(),
            changes: Vec::new(),
            skipped: Some(err),
        };
    }

    let mut returns: Vec<f64> = records.iter().map(|r| r.realized_return).collect();
    returns.sort_by(f64::total_cmp);
    let median = returns[returns.len() / 2];

    let mut updated = weights.clone();
    let mut changes = Vec::new();

    let (above, below): (Vec<&ValidationRecord>, Vec<&ValidationRecord>) =
        records.iter().partition(|r| r.realized_return > median);

    for (factor, inverted) in CALIBRATED_FACTORS {
        let cohort_mean = |cohort: &[&ValidationRecord]| {
            let values: Vec<f64> = cohort
                .iter()
                .filter_map(|r| r.factors.value_for(factor))
                .collect();
            mean(&values)
        };

        let (Some(above_mean), Some(below_mean)) = (cohort_mean(&above), cohort_mean(&below))
        else {
            continue;
        };

        let mut diff = above_mean - below_mean;
        if inverted {
            diff = -diff;
        }

        let step = adjustment_for(diff, config.max_adjustment);
        if step == 0.0 {
            continue;
        }

        let old = updated.get(factor);
        let new = updated.set_clipped(factor, old + step);
        if new != old {
            info!(%factor, old, new, diff, "weight recalibrated");
            changes.push(WeightChange {
                factor,
                old,
                new,
                diff,
            });
        }
    }

    CalibrationOutcome {
        weights: updated,
        changes,
        skipped: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::validation::FactorValues;
    use chrono::NaiveDate;
    use proptest::prelude::*;

    fn record(ret: f64, factors: FactorValues) -> ValidationRecord {
        ValidationRecord {
            recommendation_date: NaiveDate::from_ymd_opt(2025, 4, 7).unwrap(),
            code: "8001".into(),
            score: 70.0,
            price_then: 100.0,
            price_at_horizon: 100.0 + ret,
            realized_return: ret,
            benchmark_return: 0.0,
            factors,
        }
    }

    /// 10 winners with `above` dividend, 10 losers with `below` dividend.
    fn split_on_dividend(above: f64, below: f64) -> Vec<ValidationRecord> {
        let mut records = Vec::new();
        for i in 0..10 {
            records.push(record(
                1.0 + i as f64,
                FactorValues {
                    dividend: above,
                    ..FactorValues::default()
                },
            ));
            records.push(record(
                -1.0 - i as f64,
                FactorValues {
                    dividend: below,
                    ..FactorValues::default()
                },
            ));
        }
        records
    }

    #[test]
    fn adjustment_buckets() {
        assert_eq!(adjustment_for(2.5, 3.0), 3.0);
        assert_eq!(adjustment_for(-2.5, 3.0), -3.0);
        assert_eq!(adjustment_for(1.7, 3.0), 2.0);
        assert_eq!(adjustment_for(0.6, 3.0), 1.0);
        assert_eq!(adjustment_for(0.5, 3.0), 0.0);
        assert_eq!(adjustment_for(1.7, 1.0), 1.0);
    }

    #[test]
    fn below_min_sample_returns_input() {
        let records = split_on_dividend(4.8, 3.1);
        let w = WeightVector::default();
        let out = calibrate(&records[..19], &w, &CalibrationConfig::default());
        assert_eq!(out.weights, w);
        assert!(out.changes.is_empty());
        assert!(matches!(
            out.skipped,
            Some(DiprankerError::InsufficientSample { have: 19, need: 20 })
        ));
    }

    #[test]
    fn empty_records_with_zero_min_sample_return_input() {
        let w = WeightVector::default();
        let config = CalibrationConfig {
            min_sample: 0,
            max_adjustment: 3.0,
        };
        let out = calibrate(&[], &w, &config);
        assert_eq!(out.weights, w);
        assert!(out.changes.is_empty());
        assert!(matches!(
            out.skipped,
            Some(DiprankerError::InsufficientSample { have: 0, need: 0 })
        ));
    }

    #[test]
    fn clean_cohorts_diff_1_7_gives_plus_two() {
        let mut records = Vec::new();
        for i in 0..10 {
            records.push(record(
                10.0 + i as f64,
                FactorValues {
                    dividend: 4.8,
                    ..FactorValues::default()
                },
            ));
        }
        for i in 0..11 {
            records.push(record(
                -(i as f64),
                FactorValues {
                    dividend: 3.1,
                    ..FactorValues::default()
                },
            ));
        }
        // sorted: -10..=0 (11 rows), 10..=19; n = 21, n/2 = 10 -> median 0.0
        let out = calibrate(&records, &WeightVector::default(), &CalibrationConfig::default());
        assert_eq!(out.weights.get(Factor::Dividend), 22.0);
        let change = out
            .changes
            .iter()
            .find(|c| c.factor == Factor::Dividend)
            .unwrap();
        assert!((change.diff - 1.7).abs() < 1e-9);
        assert_eq!(change.old, 20.0);
    }

    #[test]
    fn increase_is_clipped_to_upper_bound() {
        let mut records = Vec::new();
        for i in 0..10 {
            records.push(record(
                10.0 + i as f64,
                FactorValues {
                    dividend: 6.0,
                    ..FactorValues::default()
                },
            ));
        }
        for i in 0..11 {
            records.push(record(
                -(i as f64),
                FactorValues {
                    dividend: 2.0,
                    ..FactorValues::default()
                },
            ));
        }
        let mut w = WeightVector::default();
        w.set_clipped(Factor::Dividend, 24.0);
        let out = calibrate(&records, &w, &CalibrationConfig::default());
        assert_eq!(out.weights.get(Factor::Dividend), 25.0);
    }

    #[test]
    fn inverted_factor_rewards_lower_values() {
        let mut records = Vec::new();
        for i in 0..10 {
            records.push(record(
                10.0 + i as f64,
                FactorValues {
                    dip_zscore: -3.0,
                    ..FactorValues::default()
                },
            ));
        }
        for i in 0..11 {
            records.push(record(
                -(i as f64),
                FactorValues {
                    dip_zscore: 0.0,
                    ..FactorValues::default()
                },
            ));
        }
        let out = calibrate(&records, &WeightVector::default(), &CalibrationConfig::default());
        assert_eq!(out.weights.get(Factor::DipZscore), 18.0);
        // Uncalibrated factors never move.
        assert_eq!(out.weights.get(Factor::Pbr), 5.0);
        assert_eq!(out.weights.get(Factor::SectorPenalty), -5.0);
    }

    #[test]
    fn identical_inputs_are_idempotent() {
        let records = split_on_dividend(4.8, 3.1);
        let w = WeightVector::default();
        let a = calibrate(&records, &w, &CalibrationConfig::default());
        let b = calibrate(&records, &w, &CalibrationConfig::default());
        assert_eq!(a.weights, b.weights);
        assert_eq!(a.changes, b.changes);
        assert_eq!(a.weights.get(Factor::Dividend), 22.0);
    }

    proptest! {
        #[test]
        fn changes_are_capped_and_bounded(
            rows in proptest::collection::vec(
                (-20.0f64..20.0, 0.0f64..8.0, -5.0f64..5.0, -10.0f64..10.0, -10.0f64..10.0, 0u32..30),
                20..60,
            ),
            max_adjustment in 1.0f64..5.0,
        ) {
            let records: Vec<ValidationRecord> = rows
                .into_iter()
                .map(|(ret, dividend, dip, ret5, vs, growth)| {
                    record(ret, FactorValues {
                        dividend,
                        dip_zscore: dip,
                        ret5,
                        ret5_vs_sector: vs,
                        div_growth_years: f64::from(growth),
                    })
                })
                .collect();
            let config = CalibrationConfig { min_sample: 20, max_adjustment };
            let before = WeightVector::default();
            let out = calibrate(&records, &before, &config);

            for factor in Factor::ALL {
                let delta = (out.weights.get(factor) - before.get(factor)).abs();
                prop_assert!(delta <= max_adjustment + 1e-9);
                prop_assert!(factor.in_bounds(out.weights.get(factor)));
            }
        }
    }
}
