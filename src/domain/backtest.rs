//! Walk-forward backtest.
//!
//! At every evaluation date the universe is compiled from bars dated on or
//! before that date, scored with the running weights and the top-K measured
//! against the close `horizon` sessions later. Every `calibrate_every`
//! evaluation dates the accumulated records recalibrate the weights used from
//! then on.

use std::collections::HashMap;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::domain::calibration::{CalibrationConfig, WeightChange, calibrate};
use crate::domain::code_data::{CodeData, build_unified_timeline};
use crate::domain::error::DiprankerError;
use crate::domain::indicator::round_dp;
use crate::domain::instrument::Instrument;
use crate::domain::ranking::{DEFAULT_TOP_K, rank_universe};
use crate::domain::validation::{FactorValues, ValidationRecord, mean, pct_return};
use crate::domain::weights::WeightVector;

pub const DEFAULT_HORIZON: usize = 5;
pub const DEFAULT_CALIBRATE_EVERY: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cadence {
    Weekly,
    Daily,
}

impl FromStr for Cadence {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "weekly" => Ok(Cadence::Weekly),
            "daily" => Ok(Cadence::Daily),
            other => Err(format!("unknown cadence '{other}' (expected weekly or daily)")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BacktestConfig {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub cadence: Cadence,
    pub top_k: usize,
    /// Forward horizon in trading sessions.
    pub horizon: usize,
    pub calibrate_every: usize,
    pub calibration: CalibrationConfig,
}

impl BacktestConfig {
    pub fn new(start_date: NaiveDate, end_date: NaiveDate) -> Self {
        BacktestConfig {
            start_date,
            end_date,
            cadence: Cadence::Weekly,
            top_k: DEFAULT_TOP_K,
            horizon: DEFAULT_HORIZON,
            calibrate_every: DEFAULT_CALIBRATE_EVERY,
            calibration: CalibrationConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodResult {
    /// 1-based position among all evaluation dates.
    pub evaluation: usize,
    pub date: NaiveDate,
    pub horizon_date: NaiveDate,
    pub top_avg: f64,
    pub benchmark: f64,
    pub alpha: f64,
    pub hit_rate: f64,
    pub weights_snapshot: WeightVector,
    pub records: Vec<ValidationRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationEvent {
    pub evaluation: usize,
    pub date: NaiveDate,
    pub sample_size: usize,
    pub changes: Vec<WeightChange>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestReport {
    pub period: String,
    pub evaluation_count: usize,
    pub skipped_count: usize,
    pub total_alpha: f64,
    pub avg_alpha_per_period: f64,
    /// Fraction of periods with positive alpha.
    pub win_rate: f64,
    pub avg_hit_rate: f64,
    pub final_weights: WeightVector,
    pub initial_weights: WeightVector,
    pub per_period_results: Vec<PeriodResult>,
    #[serde(default)]
    pub calibrations: Vec<CalibrationEvent>,
}

/// Evaluation dates within `[start, end]` drawn from `timeline`.
///
/// Weekly cadence takes the first trading date of each ISO week.
pub fn evaluation_dates(
    timeline: &[NaiveDate],
    start: NaiveDate,
    end: NaiveDate,
    cadence: Cadence,
) -> Vec<NaiveDate> {
    let in_range = timeline.iter().copied().filter(|d| *d >= start && *d <= end);
    match cadence {
        Cadence::Daily => in_range.collect(),
        Cadence::Weekly => {
            let mut dates: Vec<NaiveDate> = Vec::new();
            for date in in_range {
                let same_week = dates.last().is_some_and(|prev| prev.iso_week() == date.iso_week());
                if !same_week {
                    dates.push(date);
                }
            }
            dates
        }
    }
}

fn validate_config(config: &BacktestConfig) -> Result<(), DiprankerError> {
    let invalid = |key: &str, reason: String| DiprankerError::ConfigInvalid {
        section: "backtest".into(),
        key: key.into(),
        reason,
    };
    if config.start_date > config.end_date {
        return Err(invalid(
            "start_date",
            format!("{} is after end_date {}", config.start_date, config.end_date),
        ));
    }
    if config.top_k == 0 {
        return Err(invalid("top_k", "must be at least 1".into()));
    }
    if config.horizon == 0 {
        return Err(invalid("horizon", "must be at least 1".into()));
    }
    if config.calibrate_every == 0 {
        return Err(invalid("calibrate_every", "must be at least 1".into()));
    }
    Ok(())
}

/// Run the walk-forward backtest over `code_data`.
pub fn run_backtest(
    code_data: &HashMap<String, CodeData>,
    instruments: &[Instrument],
    config: &BacktestConfig,
    initial_weights: &WeightVector,
) -> Result<BacktestReport, DiprankerError> {
    validate_config(config)?;
    initial_weights.validate()?;

    let timeline = build_unified_timeline(code_data.values());
    let dates = evaluation_dates(&timeline, config.start_date, config.end_date, config.cadence);
    info!(
        evaluation_dates = dates.len(),
        instruments = instruments.len(),
        "starting backtest"
    );

    let mut weights = initial_weights.clone();
    let mut accumulated: Vec<ValidationRecord> = Vec::new();
    let mut results: Vec<PeriodResult> = Vec::new();
    let mut calibrations: Vec<CalibrationEvent> = Vec::new();
    let mut skipped = 0usize;

    for (idx, &date) in dates.iter().enumerate() {
        let evaluation = idx + 1;

        let Some(mut result) =
            evaluate_period(code_data, instruments, &timeline, date, config, &weights)
        else {
            skipped += 1;
            continue;
        };

        result.evaluation = evaluation;
        info!(
            evaluation,
            %date,
            top_avg = result.top_avg,
            benchmark = result.benchmark,
            alpha = result.alpha,
            "period evaluated"
        );
        accumulated.extend(result.records.iter().cloned());
        results.push(result);

        // Skipped dates still advance the cadence but never trigger a recalibration.
        if evaluation % config.calibrate_every == 0
            && accumulated.len() >= config.calibration.min_sample
        {
            let outcome = calibrate(&accumulated, &weights, &config.calibration);
            info!(
                evaluation,
                sample = accumulated.len(),
                changes = outcome.changes.len(),
                "weights recalibrated"
            );
            calibrations.push(CalibrationEvent {
                evaluation,
                date,
                sample_size: accumulated.len(),
                changes: outcome.changes,
            });
            weights = outcome.weights;
        }
    }

    Ok(summarize(config, initial_weights, weights, results, calibrations, skipped))
}

fn evaluate_period(
    code_data: &HashMap<String, CodeData>,
    instruments: &[Instrument],
    timeline: &[NaiveDate],
    date: NaiveDate,
    config: &BacktestConfig,
    weights: &WeightVector,
) -> Option<PeriodResult> {
    let ranking = rank_universe(instruments, code_data, date, weights);
    if ranking.is_empty() {
        debug!(%date, "no scoreable instruments, skipping period");
        return None;
    }

    let t_idx = timeline.binary_search(&date).ok()?;
    let horizon_idx = (t_idx + config.horizon).min(timeline.len() - 1);
    if horizon_idx <= t_idx {
        debug!(%date, "horizon beyond history, skipping period");
        return None;
    }
    let horizon_date = timeline[horizon_idx];

    let forward_return = |code: &str, price: f64| -> Option<(f64, f64)> {
        let forward = code_data.get(code)?.latest_close_between(date, horizon_date)?;
        pct_return(price, forward).map(|ret| (forward, ret))
    };

    let universe_returns: Vec<f64> = ranking
        .candidates
        .iter()
        .filter_map(|c| forward_return(c.code(), c.snapshot.price).map(|(_, r)| r))
        .collect();
    let Some(benchmark) = mean(&universe_returns).map(|m| round_dp(m, 2)) else {
        debug!(%date, "no resolvable forward prices, skipping period");
        return None;
    };

    let records: Vec<ValidationRecord> = ranking
        .top_k(config.top_k)
        .iter()
        .filter_map(|c| {
            let (forward, ret) = forward_return(c.code(), c.snapshot.price)?;
            Some(ValidationRecord {
                recommendation_date: date,
                code: c.snapshot.code.clone(),
                score: c.score,
                price_then: c.snapshot.price,
                price_at_horizon: forward,
                realized_return: ret,
                benchmark_return: benchmark,
                factors: FactorValues::from_snapshot(&c.snapshot),
            })
        })
        .collect();

    let returns: Vec<f64> = records.iter().map(|r| r.realized_return).collect();
    let Some(top_avg) = mean(&returns).map(|m| round_dp(m, 2)) else {
        debug!(%date, "no selected instrument resolved, skipping period");
        return None;
    };
    let hits = returns.iter().filter(|r| **r > benchmark).count();

    Some(PeriodResult {
        evaluation: 0,
        date,
        horizon_date,
        top_avg,
        benchmark,
        alpha: round_dp(top_avg - benchmark, 2),
        hit_rate: hits as f64 / returns.len() as f64,
        weights_snapshot: weights.clone(),
        records,
    })
}

fn summarize(
    config: &BacktestConfig,
    initial_weights: &WeightVector,
    final_weights: WeightVector,
    results: Vec<PeriodResult>,
    calibrations: Vec<CalibrationEvent>,
    skipped: usize,
) -> BacktestReport {
    let n = results.len();
    let total_alpha: f64 = results.iter().map(|r| r.alpha).sum();
    let (avg_alpha, win_rate, avg_hit_rate) = if n > 0 {
        let wins = results.iter().filter(|r| r.alpha > 0.0).count();
        let hit_sum: f64 = results.iter().map(|r| r.hit_rate).sum();
        (total_alpha / n as f64, wins as f64 / n as f64, hit_sum / n as f64)
    } else {
        (0.0, 0.0, 0.0)
    };

    BacktestReport {
        period: format!("{}..{}", config.start_date, config.end_date),
        evaluation_count: n,
        skipped_count: skipped,
        total_alpha: round_dp(total_alpha, 2),
        avg_alpha_per_period: round_dp(avg_alpha, 2),
        win_rate: round_dp(win_rate, 4),
        avg_hit_rate: round_dp(avg_hit_rate, 4),
        final_weights,
        initial_weights: initial_weights.clone(),
        per_period_results: results,
        calibrations,
    }
}
