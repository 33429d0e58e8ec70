//! Typed engine configuration built from a [`ConfigPort`].

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::domain::backtest::{BacktestConfig, Cadence, DEFAULT_CALIBRATE_EVERY};
use crate::domain::calibration::{
    CalibrationConfig, DEFAULT_MAX_ADJUSTMENT, DEFAULT_MIN_SAMPLE,
};
use crate::domain::config_validation::{
    read_count, read_date, read_fraction, read_negative_pct, read_non_negative_f64,
    read_positive_f64, read_value, read_weight, validate_known_keys,
};
use crate::domain::error::DiprankerError;
use crate::domain::execution::PortfolioRules;
use crate::domain::factor::Factor;
use crate::domain::ranking::DEFAULT_TOP_K;
use crate::domain::universe::parse_codes;
use crate::domain::weights::WeightVector;
use crate::ports::config_port::ConfigPort;

pub const DEFAULT_HORIZON_DAYS: u64 = 5;
pub const DEFAULT_INITIAL_CAPITAL: f64 = 10_000_000.0;
pub const DEFAULT_FEED_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_FEED_RETRIES: u64 = 2;
pub const DEFAULT_FEED_BACKOFF_MS: u64 = 500;
pub const DEFAULT_STATE_DIR: &str = "state";
pub const DEFAULT_DATA_DIR: &str = "data";

#[derive(Debug, Clone, PartialEq)]
pub struct FeedConfig {
    pub timeout: Duration,
    /// Extra rounds over failed codes after the first fetch.
    pub retries: u32,
    pub backoff: Duration,
}

impl Default for FeedConfig {
    fn default() -> Self {
        FeedConfig {
            timeout: Duration::from_millis(DEFAULT_FEED_TIMEOUT_MS),
            retries: DEFAULT_FEED_RETRIES as u32,
            backoff: Duration::from_millis(DEFAULT_FEED_BACKOFF_MS),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub top_k: usize,
    /// Forward horizon in trading sessions, shared by live validation and the backtest.
    pub horizon: usize,
    /// Explicit universe; `None` means every symbol the data port lists.
    pub codes: Option<Vec<String>>,
    pub data_dir: PathBuf,
    pub state_dir: PathBuf,
    /// Present only when the file has a `[backtest]` section.
    pub backtest: Option<BacktestConfig>,
    pub calibration: CalibrationConfig,
    pub initial_capital: f64,
    pub rules: PortfolioRules,
    pub feed: FeedConfig,
    /// Initial weights: defaults overlaid with `[weights]`.
    pub weights: WeightVector,
}

impl EngineConfig {
    pub fn from_port(config: &dyn ConfigPort) -> Result<Self, DiprankerError> {
        validate_known_keys(config)?;

        let top_k = read_count(config, "ranking", "top_k", DEFAULT_TOP_K as u64)? as usize;
        let horizon = read_count(config, "ranking", "horizon", DEFAULT_HORIZON_DAYS)? as usize;
        let codes = match read_value::<String>(config, "ranking", "codes")? {
            Some(raw) => Some(parse_codes(&raw).map_err(|e| DiprankerError::ConfigInvalid {
                section: "ranking".to_string(),
                key: "codes".to_string(),
                reason: e.to_string(),
            })?),
            None => None,
        };

        let calibration = CalibrationConfig {
            min_sample: read_count(config, "calibration", "min_sample", DEFAULT_MIN_SAMPLE as u64)?
                as usize,
            max_adjustment: read_positive_f64(
                config,
                "calibration",
                "max_adjustment",
                DEFAULT_MAX_ADJUSTMENT,
            )?,
        };

        let backtest = if config.sections().iter().any(|s| s == "backtest") {
            Some(backtest_config(config, top_k, horizon, calibration)?)
        } else {
            None
        };

        let weights = initial_weights(config)?;

        Ok(EngineConfig {
            top_k,
            horizon,
            codes,
            data_dir: read_value::<String>(config, "data", "dir")?
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR)),
            state_dir: read_value::<String>(config, "state", "dir")?
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_DIR)),
            backtest,
            calibration,
            initial_capital: read_positive_f64(
                config,
                "portfolio",
                "initial_capital",
                DEFAULT_INITIAL_CAPITAL,
            )?,
            rules: portfolio_rules(config)?,
            feed: feed_config(config)?,
            weights,
        })
    }
}

fn backtest_config(
    config: &dyn ConfigPort,
    top_k: usize,
    horizon: usize,
    calibration: CalibrationConfig,
) -> Result<BacktestConfig, DiprankerError> {
    let start_date = read_date(config, "backtest", "start_date")?;
    let end_date = read_date(config, "backtest", "end_date")?;
    if start_date >= end_date {
        return Err(DiprankerError::ConfigInvalid {
            section: "backtest".to_string(),
            key: "start_date".to_string(),
            reason: "start_date must be before end_date".to_string(),
        });
    }

    let cadence = match read_value::<String>(config, "backtest", "cadence")? {
        Some(raw) => raw
            .parse::<Cadence>()
            .map_err(|reason| DiprankerError::ConfigInvalid {
                section: "backtest".to_string(),
                key: "cadence".to_string(),
                reason,
            })?,
        None => Cadence::Weekly,
    };

    let mut bt = BacktestConfig::new(start_date, end_date);
    bt.cadence = cadence;
    bt.top_k = top_k;
    bt.horizon = read_count(config, "backtest", "horizon", horizon as u64)? as usize;
    bt.calibrate_every = read_count(
        config,
        "backtest",
        "calibrate_every",
        DEFAULT_CALIBRATE_EVERY as u64,
    )? as usize;
    bt.calibration = calibration;
    Ok(bt)
}

fn portfolio_rules(config: &dyn ConfigPort) -> Result<PortfolioRules, DiprankerError> {
    let d = PortfolioRules::default();
    let s = "portfolio";

    let rules = PortfolioRules {
        stop_loss_pct: read_negative_pct(config, s, "stop_loss_pct", d.stop_loss_pct)?,
        take_profit_pct: read_positive_f64(config, s, "take_profit_pct", d.take_profit_pct)?,
        trend_breach_pct: read_negative_pct(config, s, "trend_breach_pct", d.trend_breach_pct)?,
        trend_breach_days: read_count(config, s, "trend_breach_days", u64::from(d.trend_breach_days))?
            as u32,
        averaging_trigger_pct: read_negative_pct(
            config,
            s,
            "averaging_trigger_pct",
            d.averaging_trigger_pct,
        )?,
        averaging_lots: read_count(config, s, "averaging_lots", d.averaging_lots)?,
        lot_size: read_count(config, s, "lot_size", d.lot_size)?,
        max_positions: read_count(config, s, "max_positions", d.max_positions as u64)? as usize,
        min_cash_ratio: read_fraction(config, s, "min_cash_ratio", d.min_cash_ratio)?,
        min_score: read_non_negative_f64(config, s, "min_score", d.min_score)?,
        min_dividend: read_non_negative_f64(config, s, "min_dividend", d.min_dividend)?,
        min_market_cap: read_non_negative_f64(config, s, "min_market_cap", d.min_market_cap)?,
        max_buys_per_cycle: read_count(config, s, "max_buys_per_cycle", d.max_buys_per_cycle as u64)?
            as usize,
        per_position_max: read_positive_f64(config, s, "per_position_max", d.per_position_max)?,
        entry_cash_fraction: read_fraction(config, s, "entry_cash_fraction", d.entry_cash_fraction)?,
    };

    if rules.min_score > 100.0 {
        return Err(DiprankerError::ConfigInvalid {
            section: s.to_string(),
            key: "min_score".to_string(),
            reason: "min_score must be at most 100".to_string(),
        });
    }

    Ok(rules)
}

fn feed_config(config: &dyn ConfigPort) -> Result<FeedConfig, DiprankerError> {
    let timeout_ms = read_count(config, "feed", "timeout_ms", DEFAULT_FEED_TIMEOUT_MS)?;
    let retries = read_value::<u32>(config, "feed", "retries")?.unwrap_or(DEFAULT_FEED_RETRIES as u32);
    let backoff_ms = read_value::<u64>(config, "feed", "backoff_ms")?.unwrap_or(DEFAULT_FEED_BACKOFF_MS);

    Ok(FeedConfig {
        timeout: Duration::from_millis(timeout_ms),
        retries,
        backoff: Duration::from_millis(backoff_ms),
    })
}

fn initial_weights(config: &dyn ConfigPort) -> Result<WeightVector, DiprankerError> {
    let mut overrides = BTreeMap::new();
    for factor in Factor::ALL {
        if let Some(weight) = read_weight(config, factor)? {
            overrides.insert(factor, weight);
        }
    }
    WeightVector::from_partial(overrides)
}
