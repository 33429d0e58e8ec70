//! Close-to-close return volatility.
//!
//! Sample standard deviation (n - 1 denominator) of the last `period` daily
//! close returns. Non-finite returns are dropped before the estimate.

use crate::domain::ohlcv::OhlcvBar;

/// Volatility used when the estimate is unavailable or degenerate.
pub const FALLBACK_VOLATILITY: f64 = 0.01;

/// Minimum number of returns required before the estimate is trusted.
pub const MIN_RETURNS: usize = 10;

/// Daily close returns (as fractions) for consecutive bars.
pub fn close_returns(bars: &[OhlcvBar]) -> Vec<f64> {
    bars.windows(2)
        .filter_map(|w| w[1].close_return(w[0].close))
        .filter(|r| r.is_finite())
        .collect()
}

/// Sample standard deviation of the last `period` close returns.
///
/// Falls back to [`FALLBACK_VOLATILITY`] when fewer than [`MIN_RETURNS`]
/// returns are available or the estimate is zero/NaN.
pub fn return_volatility(bars: &[OhlcvBar], period: usize) -> f64 {
    let start = bars.len().saturating_sub(period + 1);
    let returns = close_returns(&bars[start..]);

    if returns.len() < MIN_RETURNS {
        return FALLBACK_VOLATILITY;
    }

    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
    let stddev = variance.sqrt();

    if stddev > 0.0 && stddev.is_finite() {
        stddev
    } else {
        FALLBACK_VOLATILITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn make_bars(prices: &[f64]) -> Vec<OhlcvBar> {
        prices
            .iter()
            .enumerate()
            .map(|(i, &close)| OhlcvBar {
                code: "TEST".into(),
                date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
                    + chrono::Duration::days(i as i64),
                open: close,
                high: close,
                low: close,
                close,
                volume: 1000,
            })
            .collect()
    }

    #[test]
    fn constant_prices_fall_back() {
        let bars = make_bars(&[100.0; 30]);
        assert!((return_volatility(&bars, 20) - FALLBACK_VOLATILITY).abs() < f64::EPSILON);
    }

    #[test]
    fn too_few_returns_fall_back() {
        let bars = make_bars(&[100.0, 101.0, 99.0, 102.0]);
        assert!((return_volatility(&bars, 20) - FALLBACK_VOLATILITY).abs() < f64::EPSILON);
    }

    #[test]
    fn alternating_returns_known_value() {
        // Returns alternate +2% / -2%.
        let mut prices = vec![100.0];
        for i in 0..20 {
            let last = *prices.last().unwrap();
            prices.push(if i % 2 == 0 { last * 1.02 } else { last * 0.98 });
        }
        let bars = make_bars(&prices);
        let returns = close_returns(&bars);
        assert_eq!(returns.len(), 20);

        let n = returns.len() as f64;
        let mean = returns.iter().sum::<f64>() / n;
        let expected =
            (returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt();
        assert!((return_volatility(&bars, 20) - expected).abs() < 1e-12);
    }

    #[test]
    fn only_last_period_returns_are_used() {
        // A violent early move must not leak into a 20-return window.
        let mut prices = vec![100.0, 300.0, 100.0];
        prices.extend(std::iter::repeat(100.0).take(10));
        for i in 0..21 {
            prices.push(if i % 2 == 0 { 101.0 } else { 100.0 });
        }
        let bars = make_bars(&prices);
        let vol = return_volatility(&bars, 20);
        assert!(vol < 0.02, "unexpected volatility {vol}");
    }
}
