//! Orchestration: wires ports to the domain and persists the results.
//!
//! Every entry point loads what it needs through a port, runs pure domain
//! code on explicit values, and only writes state back once the domain has
//! accepted the result.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;
use std::thread;

use chrono::{Duration, NaiveDate};
use tracing::{debug, info, warn};

use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::backtest::{BacktestReport, run_backtest};
use crate::domain::calibration::{CalibrationOutcome, calibrate};
use crate::domain::config::{EngineConfig, FeedConfig};
use crate::domain::error::DiprankerError;
use crate::domain::execution::{CycleInputs, CycleOutcome, run_cycle};
use crate::domain::metrics::PortfolioMetrics;
use crate::domain::portfolio::PortfolioState;
use crate::domain::quote::PriceBatch;
use crate::domain::ranking::{Ranking, rank_universe};
use crate::domain::universe::{Universe, load_universe as load_universe_from};
use crate::domain::validation::{
    RecommendationBatch, collect_records, record_recommendation, resolve_due,
};
use crate::domain::weights::WeightVector;
use crate::ports::data_port::DataPort;
use crate::ports::price_port::{PriceFeed, fetch_batch};
use crate::ports::state_port::StatePort;

/// Calendar days of history loaded before the first evaluation date, enough
/// for the 26-bar minimum across holidays.
pub const LOOKBACK_CALENDAR_DAYS: i64 = 60;

pub fn load_config(path: &Path) -> Result<EngineConfig, DiprankerError> {
    info!(path = %path.display(), "loading config");
    let adapter = FileConfigAdapter::from_file(path)?;
    EngineConfig::from_port(&adapter)
}

/// Load the configured universe with enough history to score `[start, end]`.
pub fn load_universe(
    config: &EngineConfig,
    data: &dyn DataPort,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Universe, DiprankerError> {
    let history_start = start - Duration::days(LOOKBACK_CALENDAR_DAYS);
    let result = load_universe_from(data, config.codes.clone(), history_start, end)?;
    for skipped in &result.skipped {
        debug!(code = %skipped.code, reason = ?skipped.reason, "excluded from universe");
    }
    Ok(result.universe)
}

/// Stored weights when present, otherwise the configured initial weights.
pub fn current_weights(
    config: &EngineConfig,
    state: &dyn StatePort,
) -> Result<WeightVector, DiprankerError> {
    match state.load_weights()? {
        Some(weights) => Ok(weights),
        None => {
            debug!("no stored weights, using configured weights");
            Ok(config.weights.clone())
        }
    }
}

/// Run the configured walk-forward backtest and persist the report and the
/// calibrated weights.
pub fn run_backtest_pipeline(
    config: &EngineConfig,
    data: &dyn DataPort,
    state: &dyn StatePort,
) -> Result<BacktestReport, DiprankerError> {
    let bt = config
        .backtest
        .as_ref()
        .ok_or_else(|| DiprankerError::ConfigMissing {
            section: "backtest".to_string(),
            key: "start_date".to_string(),
        })?;

    let universe = load_universe(config, data, bt.start_date, bt.end_date)?;
    info!(
        instruments = universe.count(),
        start = %bt.start_date,
        end = %bt.end_date,
        "running backtest"
    );

    let report = run_backtest(&universe.code_data, &universe.instruments, bt, &config.weights)?;

    info!(
        evaluations = report.evaluation_count,
        skipped = report.skipped_count,
        total_alpha = report.total_alpha,
        win_rate = report.win_rate,
        "backtest complete"
    );

    state.save_backtest_report(&report)?;
    state.save_weights(&report.final_weights)?;
    Ok(report)
}

/// Fetch prices, then retry the failed codes up to `feed.retries` times with
/// a fixed backoff. Codes still failing are left failed in the batch.
pub fn refresh_prices_with_retry(
    feed: Arc<dyn PriceFeed + Send + Sync>,
    codes: &[String],
    as_of: NaiveDate,
    config: &FeedConfig,
) -> PriceBatch {
    let mut batch = fetch_batch(Arc::clone(&feed), codes, as_of, config.timeout);

    for attempt in 1..=config.retries {
        let failed = batch.failed_codes();
        if failed.is_empty() {
            break;
        }
        debug!(attempt, failed = failed.len(), "retrying price refresh");
        thread::sleep(config.backoff);
        let retry = fetch_batch(Arc::clone(&feed), &failed, as_of, config.timeout);
        batch.merge(retry);
    }

    let failed = batch.failed_codes();
    if !failed.is_empty() {
        warn!(codes = ?failed, "price refresh degraded, keeping last known prices");
    }
    batch
}

#[derive(Debug, Clone)]
pub struct DailyRun {
    pub ranking: Ranking,
    pub outcome: CycleOutcome,
    pub metrics: PortfolioMetrics,
}

/// Run one portfolio cycle for `date` and commit the resulting state.
///
/// The stored state is only replaced once the cycle has validated; any error
/// leaves the previous state file untouched.
pub fn run_daily_cycle(
    config: &EngineConfig,
    universe: &Universe,
    feed: Arc<dyn PriceFeed + Send + Sync>,
    state: &dyn StatePort,
    date: NaiveDate,
    benchmark: Option<f64>,
) -> Result<DailyRun, DiprankerError> {
    let weights = current_weights(config, state)?;
    let ranking = rank_universe(&universe.instruments, &universe.code_data, date, &weights);

    let portfolio = match state.load_portfolio()? {
        Some(portfolio) => portfolio,
        None => {
            info!(capital = config.initial_capital, "starting new portfolio");
            PortfolioState::new(config.initial_capital)
        }
    };

    let held: Vec<String> = portfolio.positions.iter().map(|p| p.code.clone()).collect();
    let prices = refresh_prices_with_retry(feed, &held, date, &config.feed);

    let inputs = CycleInputs {
        date,
        prices: &prices,
        ranking: &ranking,
        benchmark,
    };
    let outcome = run_cycle(&portfolio, &inputs, &config.rules)?;

    for action in &outcome.actions {
        info!(
            %date,
            kind = ?action.kind,
            code = %action.code,
            shares = action.shares,
            price = action.price,
            reason = %action.reason,
            "portfolio action"
        );
    }

    state.save_portfolio(&outcome.state)?;

    let metrics = PortfolioMetrics::compute(&outcome.state);
    info!(
        %date,
        nav = outcome.state.nav(),
        cash = outcome.state.cash,
        positions = outcome.state.position_count(),
        pnl = metrics.pnl,
        replayed = outcome.replayed,
        "cycle committed"
    );

    Ok(DailyRun {
        ranking,
        outcome,
        metrics,
    })
}

/// Record today's top-K as a pending validation batch. Recording the same
/// date twice keeps the first batch.
pub fn record_recommendations(
    config: &EngineConfig,
    universe: &Universe,
    state: &dyn StatePort,
    date: NaiveDate,
) -> Result<RecommendationBatch, DiprankerError> {
    let mut history = state.load_validation_history()?;
    if let Some(existing) = history.iter().find(|b| b.recommendation_date == date) {
        debug!(%date, "recommendations already recorded");
        return Ok(existing.clone());
    }

    let weights = current_weights(config, state)?;
    let ranking = rank_universe(&universe.instruments, &universe.code_data, date, &weights);
    let batch = record_recommendation(date, ranking.top_k(config.top_k), &ranking);

    info!(
        %date,
        selected = batch.instruments.len(),
        universe = batch.universe_prices.len(),
        "recorded recommendations"
    );

    history.push(batch.clone());
    history.sort_by_key(|b| b.recommendation_date);
    state.save_validation_history(&history)?;
    Ok(batch)
}

/// Resolve pending batches that have reached the horizon, using prices
/// fetched for every code they reference.
pub fn resolve_validations(
    config: &EngineConfig,
    feed: Arc<dyn PriceFeed + Send + Sync>,
    state: &dyn StatePort,
    today: NaiveDate,
) -> Result<usize, DiprankerError> {
    let mut history = state.load_validation_history()?;

    let codes: Vec<String> = history
        .iter()
        .filter(|b| !b.validated)
        .flat_map(|b| {
            b.instruments
                .iter()
                .map(|i| i.code.clone())
                .chain(b.universe_prices.keys().cloned())
        })
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    if codes.is_empty() {
        debug!(%today, "no pending recommendations");
        return Ok(0);
    }

    let prices: HashMap<String, f64> =
        refresh_prices_with_retry(feed, &codes, today, &config.feed).prices();
    let resolved = resolve_due(&mut history, today, &prices, config.horizon as u32);

    if resolved > 0 {
        state.save_validation_history(&history)?;
    }
    Ok(resolved)
}

/// Recalibrate the stored weights from every resolved recommendation.
/// Weights are only written when at least one changed.
pub fn recalibrate(
    config: &EngineConfig,
    state: &dyn StatePort,
) -> Result<CalibrationOutcome, DiprankerError> {
    let history = state.load_validation_history()?;
    let records = collect_records(&history);
    let weights = current_weights(config, state)?;

    let outcome = calibrate(&records, &weights, &config.calibration);
    if !outcome.changes.is_empty() {
        state.save_weights(&outcome.weights)?;
    }
    Ok(outcome)
}
