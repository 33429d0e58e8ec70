//! Live recommendation tracking.
//!
//! A [`RecommendationBatch`] is recorded when a top-K list is published and
//! resolved once, after the horizon has elapsed, against prices observed then.
//! Resolved batches flatten into [`ValidationRecord`]s for the calibrator.

use std::collections::{BTreeMap, HashMap};

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::domain::factor::Factor;
use crate::domain::indicator::{IndicatorSnapshot, round_dp};
use crate::domain::ranking::{Ranking, ScoredCandidate};

/// Raw factor values the calibrator compares across cohorts.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FactorValues {
    pub dividend: f64,
    pub dip_zscore: f64,
    pub ret5: f64,
    pub ret5_vs_sector: f64,
    pub div_growth_years: f64,
}

impl FactorValues {
    pub fn from_snapshot(snapshot: &IndicatorSnapshot) -> Self {
        FactorValues {
            dividend: snapshot.dividend_yield.unwrap_or(0.0),
            dip_zscore: snapshot.dip_zscore,
            ret5: snapshot.ret5,
            ret5_vs_sector: snapshot.ret5_vs_sector,
            div_growth_years: f64::from(snapshot.div_growth_years),
        }
    }

    /// Raw value feeding `factor`, for the calibratable factors only.
    pub fn value_for(&self, factor: Factor) -> Option<f64> {
        match factor {
            Factor::Dividend => Some(self.dividend),
            Factor::DivGrowth => Some(self.div_growth_years),
            Factor::DipZscore => Some(self.dip_zscore),
            Factor::Ret5 => Some(self.ret5),
            Factor::Ret5VsSector => Some(self.ret5_vs_sector),
            _ => None,
        }
    }
}

/// One resolved recommendation outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationRecord {
    pub recommendation_date: NaiveDate,
    pub code: String,
    pub score: f64,
    pub price_then: f64,
    pub price_at_horizon: f64,
    /// Percent, two decimals.
    pub realized_return: f64,
    pub benchmark_return: f64,
    pub factors: FactorValues,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendedInstrument {
    pub code: String,
    pub score: f64,
    pub price_then: f64,
    pub factors: FactorValues,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentResult {
    pub code: String,
    pub price_now: f64,
    #[serde(rename = "return")]
    pub return_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationBatch {
    pub recommendation_date: NaiveDate,
    pub instruments: Vec<RecommendedInstrument>,
    #[serde(default)]
    pub universe_prices: BTreeMap<String, f64>,
    #[serde(default)]
    pub results: Vec<InstrumentResult>,
    #[serde(default)]
    pub benchmark_return: Option<f64>,
    #[serde(default)]
    pub alpha: Option<f64>,
    #[serde(default)]
    pub hit_rate: Option<f64>,
    #[serde(default)]
    pub validated: bool,
    #[serde(default)]
    pub validated_at: Option<NaiveDate>,
}

/// Percentage return, two decimals. `None` unless both prices are positive.
pub fn pct_return(price_then: f64, price_now: f64) -> Option<f64> {
    if price_then > 0.0 && price_now > 0.0 && price_now.is_finite() {
        Some(round_dp((price_now / price_then - 1.0) * 100.0, 2))
    } else {
        None
    }
}

/// Create a pending batch for the published `top` list.
pub fn record_recommendation(
    date: NaiveDate,
    top: &[ScoredCandidate],
    universe: &Ranking,
) -> RecommendationBatch {
    let instruments = top
        .iter()
        .map(|c| RecommendedInstrument {
            code: c.snapshot.code.clone(),
            score: c.score,
            price_then: c.snapshot.price,
            factors: FactorValues::from_snapshot(&c.snapshot),
        })
        .collect();

    let universe_prices = universe
        .candidates
        .iter()
        .map(|c| (c.snapshot.code.clone(), c.snapshot.price))
        .collect();

    RecommendationBatch {
        recommendation_date: date,
        instruments,
        universe_prices,
        results: Vec::new(),
        benchmark_return: None,
        alpha: None,
        hit_rate: None,
        validated: false,
        validated_at: None,
    }
}

/// Weekdays in `(from, to]`.
pub fn weekdays_between(from: NaiveDate, to: NaiveDate) -> u32 {
    let mut count = 0;
    let mut day = from;
    while day < to {
        day += Duration::days(1);
        if !matches!(day.weekday(), Weekday::Sat | Weekday::Sun) {
            count += 1;
        }
    }
    count
}

/// Resolve every pending batch at least `horizon` weekdays old.
///
/// Returns the number of batches resolved. Batches where no selected
/// instrument has a usable price stay pending.
pub fn resolve_due(
    batches: &mut [RecommendationBatch],
    today: NaiveDate,
    prices_now: &HashMap<String, f64>,
    horizon: u32,
) -> usize {
    let mut resolved = 0;
    for batch in batches.iter_mut().filter(|b| !b.validated) {
        if weekdays_between(batch.recommendation_date, today) < horizon {
            continue;
        }

        let results: Vec<InstrumentResult> = batch
            .instruments
            .iter()
            .filter_map(|inst| {
                let price_now = *prices_now.get(&inst.code)?;
                pct_return(inst.price_then, price_now).map(|return_pct| InstrumentResult {
                    code: inst.code.clone(),
                    price_now,
                    return_pct,
                })
            })
            .collect();

        if results.is_empty() {
            debug!(date = %batch.recommendation_date, "no resolvable prices, batch stays pending");
            continue;
        }

        let universe_returns: Vec<f64> = batch
            .universe_prices
            .iter()
            .filter_map(|(code, then)| pct_return(*then, *prices_now.get(code)?))
            .collect();
        let benchmark = mean(&universe_returns).map_or(0.0, |m| round_dp(m, 2));
        let selected_avg = mean(&results.iter().map(|r| r.return_pct).collect::<Vec<_>>())
            .unwrap_or(0.0);
        let hits = results.iter().filter(|r| r.return_pct > benchmark).count();

        batch.alpha = Some(round_dp(selected_avg - benchmark, 2));
        batch.hit_rate = Some(hits as f64 / results.len() as f64);
        batch.benchmark_return = Some(benchmark);
        batch.results = results;
        batch.validated = true;
        batch.validated_at = Some(today);
        resolved += 1;

        info!(
            date = %batch.recommendation_date,
            alpha = batch.alpha,
            hit_rate = batch.hit_rate,
            "recommendation batch resolved"
        );
    }
    resolved
}

/// Flatten resolved batches into calibrator input.
pub fn collect_records(batches: &[RecommendationBatch]) -> Vec<ValidationRecord> {
    batches
        .iter()
        .filter(|b| b.validated)
        .flat_map(|batch| {
            let benchmark = batch.benchmark_return.unwrap_or(0.0);
            batch.results.iter().filter_map(move |result| {
                let inst = batch.instruments.iter().find(|i| i.code == result.code)?;
                Some(ValidationRecord {
                    recommendation_date: batch.recommendation_date,
                    code: result.code.clone(),
                    score: inst.score,
                    price_then: inst.price_then,
                    price_at_horizon: result.price_now,
                    realized_return: result.return_pct,
                    benchmark_return: benchmark,
                    factors: inst.factors,
                })
            })
        })
        .collect()
}

pub(crate) fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn batch(date_str: &str) -> RecommendationBatch {
        let mut universe_prices = BTreeMap::new();
        universe_prices.insert("1111".to_string(), 100.0);
        universe_prices.insert("2222".to_string(), 200.0);
        universe_prices.insert("3333".to_string(), 50.0);
        RecommendationBatch {
            recommendation_date: date(date_str),
            instruments: vec![
                RecommendedInstrument {
                    code: "1111".into(),
                    score: 72.5,
                    price_then: 100.0,
                    factors: FactorValues {
                        dividend: 4.1,
                        ..FactorValues::default()
                    },
                },
                RecommendedInstrument {
                    code: "2222".into(),
                    score: 70.0,
                    price_then: 200.0,
                    factors: FactorValues::default(),
                },
            ],
            universe_prices,
            results: Vec::new(),
            benchmark_return: None,
            alpha: None,
            hit_rate: None,
            validated: false,
            validated_at: None,
        }
    }

    fn prices(pairs: &[(&str, f64)]) -> HashMap<String, f64> {
        pairs.iter().map(|(c, p)| (c.to_string(), *p)).collect()
    }

    #[test]
    fn weekdays_skip_weekends() {
        // Friday -> next Friday
        assert_eq!(weekdays_between(date("2025-03-07"), date("2025-03-14")), 5);
        // Friday -> Monday
        assert_eq!(weekdays_between(date("2025-03-07"), date("2025-03-10")), 1);
        assert_eq!(weekdays_between(date("2025-03-10"), date("2025-03-10")), 0);
    }

    #[test]
    fn not_due_before_horizon() {
        let mut batches = vec![batch("2025-03-07")];
        let n = resolve_due(
            &mut batches,
            date("2025-03-13"),
            &prices(&[("1111", 110.0), ("2222", 190.0)]),
            5,
        );
        assert_eq!(n, 0);
        assert!(!batches[0].validated);
    }

    #[test]
    fn resolves_returns_benchmark_and_hit_rate() {
        let mut batches = vec![batch("2025-03-07")];
        let now = prices(&[("1111", 110.0), ("2222", 190.0), ("3333", 51.0)]);
        let n = resolve_due(&mut batches, date("2025-03-14"), &now, 5);
        assert_eq!(n, 1);

        let b = &batches[0];
        assert!(b.validated);
        assert_eq!(b.results.len(), 2);
        assert_eq!(b.results[0].return_pct, 10.0);
        assert_eq!(b.results[1].return_pct, -5.0);
        // universe: (10 - 5 + 2) / 3
        assert_eq!(b.benchmark_return, Some(2.33));
        assert_eq!(b.hit_rate, Some(0.5));
        assert_eq!(b.alpha, Some(0.17));
    }

    #[test]
    fn resolved_batches_are_never_touched_again() {
        let mut batches = vec![batch("2025-03-07")];
        let first = prices(&[("1111", 110.0), ("2222", 190.0)]);
        resolve_due(&mut batches, date("2025-03-14"), &first, 5);
        let snapshot = batches.clone();

        let second = prices(&[("1111", 50.0), ("2222", 500.0)]);
        assert_eq!(resolve_due(&mut batches, date("2025-03-21"), &second, 5), 0);
        assert_eq!(batches, snapshot);
    }

    #[test]
    fn batch_without_prices_stays_pending() {
        let mut batches = vec![batch("2025-03-07")];
        let n = resolve_due(&mut batches, date("2025-03-20"), &prices(&[("9999", 1.0)]), 5);
        assert_eq!(n, 0);
        assert!(!batches[0].validated);
    }

    #[test]
    fn collect_records_flattens_resolved_only() {
        let mut batches = vec![batch("2025-03-07"), batch("2025-03-12")];
        let now = prices(&[("1111", 110.0), ("2222", 190.0)]);
        resolve_due(&mut batches, date("2025-03-14"), &now, 5);

        let records = collect_records(&batches);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].code, "1111");
        assert_eq!(records[0].factors.dividend, 4.1);
        assert_eq!(records[0].price_at_horizon, 110.0);
        assert_eq!(records[1].realized_return, -5.0);
    }

    #[test]
    fn batch_json_uses_return_key() {
        let mut batches = vec![batch("2025-03-07")];
        resolve_due(
            &mut batches,
            date("2025-03-14"),
            &prices(&[("1111", 110.0)]),
            5,
        );
        let json = serde_json::to_value(&batches[0]).unwrap();
        assert_eq!(json["results"][0]["return"], 10.0);
        assert_eq!(json["validated"], true);
    }
}
