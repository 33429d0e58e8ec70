//! Indicator compilation.
//!
//! Turns an instrument's bar history into a dated [`IndicatorSnapshot`]:
//! - only bars dated on or before the as-of date are visible
//! - at least [`MIN_HISTORY_BARS`] visible bars are required
//! - the last visible bar must be dated exactly on the as-of date
//!
//! Sector-relative fields are left at zero here and filled in by the ranker,
//! which is the only place that sees the whole universe.

pub mod moving_average;
pub mod stddev;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::error::DiprankerError;
use crate::domain::instrument::Instrument;
use crate::domain::ohlcv::{bars_as_of, OhlcvBar};

use moving_average::{sma_close, trailing_return_pct, volume_ratio};
use stddev::return_volatility;

pub const MIN_HISTORY_BARS: usize = 26;
pub const MA_PERIOD: usize = 25;
pub const VOLATILITY_PERIOD: usize = 20;

/// Round `value` to `dp` decimal places.
pub fn round_dp(value: f64, dp: i32) -> f64 {
    let factor = 10f64.powi(dp);
    (value * factor).round() / factor
}

/// Derived per-instrument indicator values as of one date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub code: String,
    pub sector: String,
    pub as_of: NaiveDate,
    pub price: f64,
    pub ma25: f64,
    /// Daily return volatility as a fraction.
    pub volatility: f64,
    pub dip_zscore: f64,
    pub ret5: f64,
    pub ret10: f64,
    #[serde(default)]
    pub sector_ret5: f64,
    #[serde(default)]
    pub ret5_vs_sector: f64,
    pub dividend_yield: Option<f64>,
    pub pbr: Option<f64>,
    pub per: Option<f64>,
    pub market_cap_b: Option<f64>,
    #[serde(default)]
    pub div_growth_years: u32,
    #[serde(default = "default_volume_ratio")]
    pub volume_ratio: f64,
}

fn default_volume_ratio() -> f64 {
    1.0
}

impl IndicatorSnapshot {
    /// Percentage deviation of `price` from the 25-day average.
    pub fn trend_deviation_pct(&self, price: f64) -> Option<f64> {
        if self.ma25 > 0.0 {
            Some((price - self.ma25) / self.ma25 * 100.0)
        } else {
            None
        }
    }
}

/// Compile one instrument's snapshot as of `as_of`.
///
/// `bars` must be sorted by date. Bars after `as_of` are never read.
pub fn compile_snapshot(
    instrument: &Instrument,
    bars: &[OhlcvBar],
    as_of: NaiveDate,
) -> Result<IndicatorSnapshot, DiprankerError> {
    let visible = bars_as_of(bars, as_of);

    if visible.len() < MIN_HISTORY_BARS {
        return Err(DiprankerError::InsufficientHistory {
            code: instrument.code.clone(),
            bars: visible.len(),
            minimum: MIN_HISTORY_BARS,
        });
    }

    let last = &visible[visible.len() - 1];
    if last.date != as_of {
        return Err(DiprankerError::DataUnavailable {
            code: instrument.code.clone(),
            reason: format!("no bar on {as_of}, last bar {}", last.date),
        });
    }

    let price = last.close;
    if !(price > 0.0 && price.is_finite()) {
        return Err(DiprankerError::DataUnavailable {
            code: instrument.code.clone(),
            reason: format!("invalid close {price} on {as_of}"),
        });
    }

    let ma25 = sma_close(visible, MA_PERIOD).unwrap_or(price);
    let volatility = return_volatility(visible, VOLATILITY_PERIOD);

    let deviation = (price - ma25) / ma25;
    let dip_zscore = finite_or_zero(round_dp(deviation / volatility, 2));
    let ret5 = finite_or_zero(trailing_return_pct(visible, 5).map_or(0.0, |r| round_dp(r, 2)));
    let ret10 = finite_or_zero(trailing_return_pct(visible, 10).map_or(0.0, |r| round_dp(r, 2)));
    let volume_ratio = volume_ratio(visible, 5, 20).map_or(1.0, |r| round_dp(r, 2));

    Ok(IndicatorSnapshot {
        code: instrument.code.clone(),
        sector: instrument.sector_or_default().to_string(),
        as_of,
        price,
        ma25,
        volatility,
        dip_zscore,
        ret5,
        ret10,
        sector_ret5: 0.0,
        ret5_vs_sector: 0.0,
        dividend_yield: instrument.dividend_yield,
        pbr: instrument.pbr,
        per: instrument.per,
        market_cap_b: instrument.market_cap_b,
        div_growth_years: instrument.div_growth_years,
        volume_ratio,
    })
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() { value } else { 0.0 }
}
