//! Daily OHLCV bar representation.

use chrono::NaiveDate;

#[derive(Debug, Clone, PartialEq)]
pub struct OhlcvBar {
    pub code: String,
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

impl OhlcvBar {
    /// Percentage change of this close against `prev_close`, as a fraction.
    pub fn close_return(&self, prev_close: f64) -> Option<f64> {
        if prev_close > 0.0 && self.close.is_finite() {
            Some(self.close / prev_close - 1.0)
        } else {
            None
        }
    }
}

/// Bars dated on or before `as_of`, assuming `bars` is sorted by date.
pub fn bars_as_of(bars: &[OhlcvBar], as_of: NaiveDate) -> &[OhlcvBar] {
    let end = bars.partition_point(|b| b.date <= as_of);
    &bars[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(day: u32, close: f64) -> OhlcvBar {
        OhlcvBar {
            code: "9432".into(),
            date: NaiveDate::from_ymd_opt(2025, 1, day).unwrap(),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 10_000,
        }
    }

    #[test]
    fn close_return_fraction() {
        let b = bar(2, 110.0);
        let r = b.close_return(100.0).unwrap();
        assert!((r - 0.1).abs() < 1e-12);
    }

    #[test]
    fn close_return_rejects_non_positive_base() {
        assert!(bar(2, 110.0).close_return(0.0).is_none());
        assert!(bar(2, 110.0).close_return(-5.0).is_none());
    }

    #[test]
    fn bars_as_of_excludes_later_dates() {
        let bars = vec![bar(1, 100.0), bar(2, 101.0), bar(3, 102.0), bar(6, 103.0)];
        let visible = bars_as_of(&bars, NaiveDate::from_ymd_opt(2025, 1, 4).unwrap());
        assert_eq!(visible.len(), 3);
        assert_eq!(visible.last().unwrap().date.to_string(), "2025-01-03");
    }

    #[test]
    fn bars_as_of_before_first_bar_is_empty() {
        let bars = vec![bar(5, 100.0)];
        assert!(bars_as_of(&bars, NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()).is_empty());
    }
}
