//! Portfolio summary over the NAV history.

use serde::{Deserialize, Serialize};

use crate::domain::portfolio::PortfolioState;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioMetrics {
    pub nav: f64,
    /// NAV minus initial capital.
    pub pnl: f64,
    pub total_return: f64,
    /// Benchmark change over the same window, when both ends carry a level.
    pub benchmark_return: Option<f64>,
}

impl PortfolioMetrics {
    pub fn compute(state: &PortfolioState) -> Self {
        let curve = &state.daily_nav;
        let initial_capital = state.initial_capital;

        let nav = curve.last().map(|p| p.nav).unwrap_or(initial_capital);
        let pnl = nav - initial_capital;
        let total_return = if initial_capital > 0.0 {
            pnl / initial_capital
        } else {
            0.0
        };

        let benchmark_return = match (
            curve.first().and_then(|p| p.benchmark),
            curve.last().and_then(|p| p.benchmark),
        ) {
            (Some(first), Some(last)) if first > 0.0 => Some((last - first) / first),
            _ => None,
        };

        PortfolioMetrics {
            nav,
            pnl,
            total_return,
            benchmark_return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::portfolio::NavPoint;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn state_with_curve(values: &[f64], benchmarks: &[Option<f64>]) -> PortfolioState {
        let mut pf = PortfolioState::new(values.first().copied().unwrap_or(1_000_000.0));
        pf.daily_nav = values
            .iter()
            .zip(benchmarks)
            .enumerate()
            .map(|(i, (&v, &benchmark))| NavPoint {
                date: NaiveDate::from_ymd_opt(2025, 1, 6).unwrap() + chrono::Duration::days(i as i64),
                nav: v,
                cash: v,
                positions_value: 0.0,
                benchmark,
            })
            .collect();
        pf
    }

    #[test]
    fn empty_history_is_flat() {
        let m = PortfolioMetrics::compute(&PortfolioState::new(1_000_000.0));
        assert_eq!(m.nav, 1_000_000.0);
        assert_eq!(m.pnl, 0.0);
        assert_eq!(m.total_return, 0.0);
        assert_eq!(m.benchmark_return, None);
    }

    #[test]
    fn pnl_against_initial_capital_and_benchmark_window() {
        let pf = state_with_curve(
            &[1_000.0, 1_050.0, 1_100.0],
            &[Some(100.0), None, Some(102.0)],
        );
        let m = PortfolioMetrics::compute(&pf);
        assert_relative_eq!(m.pnl, 100.0, epsilon = 1e-9);
        assert_relative_eq!(m.total_return, 0.1, epsilon = 1e-12);
        assert_relative_eq!(m.benchmark_return.unwrap(), 0.02, epsilon = 1e-12);
    }

    #[test]
    fn missing_benchmark_end_gives_none() {
        let pf = state_with_curve(&[1_000.0, 900.0], &[Some(100.0), None]);
        let m = PortfolioMetrics::compute(&pf);
        assert_relative_eq!(m.total_return, -0.1, epsilon = 1e-12);
        assert_eq!(m.benchmark_return, None);
    }
}
