//! Trailing means over closes and volumes.

use crate::domain::ohlcv::OhlcvBar;

/// Simple moving average of the last `period` closes, or `None` when fewer
/// bars are available.
pub fn sma_close(bars: &[OhlcvBar], period: usize) -> Option<f64> {
    if period == 0 || bars.len() < period {
        return None;
    }
    let window = &bars[bars.len() - period..];
    Some(window.iter().map(|b| b.close).sum::<f64>() / period as f64)
}

fn mean_volume(bars: &[OhlcvBar], period: usize) -> Option<f64> {
    if period == 0 || bars.len() < period {
        return None;
    }
    let window = &bars[bars.len() - period..];
    Some(window.iter().map(|b| b.volume as f64).sum::<f64>() / period as f64)
}

/// Recent-vs-baseline volume: mean(last `short`) / mean(last `long`).
pub fn volume_ratio(bars: &[OhlcvBar], short: usize, long: usize) -> Option<f64> {
    let recent = mean_volume(bars, short)?;
    let baseline = mean_volume(bars, long)?;
    if baseline > 0.0 {
        Some(recent / baseline)
    } else {
        None
    }
}

/// Percentage return of the last close over the close `lookback` bars earlier.
pub fn trailing_return_pct(bars: &[OhlcvBar], lookback: usize) -> Option<f64> {
    if bars.len() <= lookback {
        return None;
    }
    let last = bars[bars.len() - 1].close;
    let base = bars[bars.len() - 1 - lookback].close;
    if base > 0.0 {
        Some((last / base - 1.0) * 100.0)
    } else {
        None
    }
}
