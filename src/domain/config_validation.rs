//! Configuration validation.
//!
//! Rejects sections and keys the engine does not know, and reads individual
//! values with a typed check so a malformed value is an error instead of a
//! silent default.

use crate::domain::error::DiprankerError;
use crate::domain::factor::Factor;
use crate::ports::config_port::ConfigPort;
use chrono::NaiveDate;
use std::str::FromStr;

pub const RANKING_KEYS: &[&str] = &["top_k", "horizon", "codes"];
pub const BACKTEST_KEYS: &[&str] = &[
    "start_date",
    "end_date",
    "cadence",
    "horizon",
    "calibrate_every",
];
pub const CALIBRATION_KEYS: &[&str] = &["min_sample", "max_adjustment"];
pub const PORTFOLIO_KEYS: &[&str] = &[
    "initial_capital",
    "stop_loss_pct",
    "take_profit_pct",
    "trend_breach_pct",
    "trend_breach_days",
    "averaging_trigger_pct",
    "averaging_lots",
    "lot_size",
    "max_positions",
    "min_cash_ratio",
    "min_score",
    "min_dividend",
    "min_market_cap",
    "max_buys_per_cycle",
    "per_position_max",
    "entry_cash_fraction",
];
pub const FEED_KEYS: &[&str] = &["timeout_ms", "retries", "backoff_ms"];
pub const DATA_KEYS: &[&str] = &["dir"];
pub const STATE_KEYS: &[&str] = &["dir"];

fn allowed_keys(section: &str) -> Option<Vec<&'static str>> {
    let keys = match section {
        "ranking" => RANKING_KEYS.to_vec(),
        "backtest" => BACKTEST_KEYS.to_vec(),
        "calibration" => CALIBRATION_KEYS.to_vec(),
        "portfolio" => PORTFOLIO_KEYS.to_vec(),
        "feed" => FEED_KEYS.to_vec(),
        "data" => DATA_KEYS.to_vec(),
        "state" => STATE_KEYS.to_vec(),
        "weights" => Factor::ALL.iter().map(|f| f.name()).collect(),
        _ => return None,
    };
    Some(keys)
}

/// Fail on the first section or key outside the known schema.
pub fn validate_known_keys(config: &dyn ConfigPort) -> Result<(), DiprankerError> {
    let mut sections = config.sections();
    sections.sort();

    for section in sections {
        let Some(allowed) = allowed_keys(&section) else {
            // configparser files keys before any header under "default"
            let mut keys = config.keys(&section);
            if section == "default" && keys.is_empty() {
                continue;
            }
            keys.sort();
            return Err(DiprankerError::ConfigUnknownKey {
                section,
                key: keys.into_iter().next().unwrap_or_default(),
            });
        };

        let mut keys = config.keys(&section);
        keys.sort();
        if let Some(key) = keys.into_iter().find(|k| !allowed.contains(&k.as_str())) {
            return Err(DiprankerError::ConfigUnknownKey { section, key });
        }
    }

    Ok(())
}

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> DiprankerError {
    DiprankerError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

/// Parse an optional value, rejecting anything that does not parse as `T`.
pub fn read_value<T: FromStr>(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Option<T>, DiprankerError> {
    match config.get_string(section, key) {
        None => Ok(None),
        Some(raw) => {
            let trimmed = raw.trim();
            trimmed
                .parse::<T>()
                .map(Some)
                .map_err(|_| invalid(section, key, format!("cannot parse '{trimmed}'")))
        }
    }
}

pub fn read_required<T: FromStr>(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<T, DiprankerError> {
    read_value(config, section, key)?.ok_or_else(|| DiprankerError::ConfigMissing {
        section: section.to_string(),
        key: key.to_string(),
    })
}

pub fn read_date(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<NaiveDate, DiprankerError> {
    let raw: String = read_required(config, section, key)?;
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| invalid(section, key, format!("invalid {key} format, expected YYYY-MM-DD")))
}

pub fn read_positive_f64(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: f64,
) -> Result<f64, DiprankerError> {
    let value = read_value::<f64>(config, section, key)?.unwrap_or(default);
    if !value.is_finite() || value <= 0.0 {
        return Err(invalid(section, key, format!("{key} must be positive")));
    }
    Ok(value)
}

pub fn read_negative_pct(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: f64,
) -> Result<f64, DiprankerError> {
    let value = read_value::<f64>(config, section, key)?.unwrap_or(default);
    if !value.is_finite() || value >= 0.0 {
        return Err(invalid(section, key, format!("{key} must be negative")));
    }
    Ok(value)
}

pub fn read_fraction(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: f64,
) -> Result<f64, DiprankerError> {
    let value = read_value::<f64>(config, section, key)?.unwrap_or(default);
    if !(0.0..=1.0).contains(&value) {
        return Err(invalid(section, key, format!("{key} must be between 0 and 1")));
    }
    Ok(value)
}

pub fn read_non_negative_f64(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: f64,
) -> Result<f64, DiprankerError> {
    let value = read_value::<f64>(config, section, key)?.unwrap_or(default);
    if !value.is_finite() || value < 0.0 {
        return Err(invalid(section, key, format!("{key} must be non-negative")));
    }
    Ok(value)
}

/// Integer that must be at least 1.
pub fn read_count(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: u64,
) -> Result<u64, DiprankerError> {
    let value = read_value::<u64>(config, section, key)?.unwrap_or(default);
    if value == 0 {
        return Err(invalid(section, key, format!("{key} must be at least 1")));
    }
    Ok(value)
}

pub fn read_weight(
    config: &dyn ConfigPort,
    factor: Factor,
) -> Result<Option<f64>, DiprankerError> {
    let Some(weight) = read_value::<f64>(config, "weights", factor.name())? else {
        return Ok(None);
    };
    if !factor.in_bounds(weight) {
        let (lo, hi) = factor.bounds();
        return Err(invalid(
            "weights",
            factor.name(),
            format!("{weight} outside [{lo}, {hi}]"),
        ));
    }
    Ok(Some(weight))
}
