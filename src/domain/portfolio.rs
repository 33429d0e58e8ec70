//! Portfolio aggregate: cash, ordered positions, action log and NAV history.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::domain::error::DiprankerError;
use crate::domain::position::{Position, PositionState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Buy,
    StopLoss,
    TrendBreach,
    TakeProfit,
    AverageDown,
}

impl ActionKind {
    pub fn is_sell(self) -> bool {
        matches!(
            self,
            ActionKind::StopLoss | ActionKind::TrendBreach | ActionKind::TakeProfit
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub date: NaiveDate,
    pub kind: ActionKind,
    pub code: String,
    pub price: f64,
    pub shares: u64,
    pub amount: f64,
    #[serde(default)]
    pub realized_pnl: Option<f64>,
    pub resulting_state: PositionState,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavPoint {
    pub date: NaiveDate,
    pub nav: f64,
    pub cash: f64,
    pub positions_value: f64,
    #[serde(default)]
    pub benchmark: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioState {
    pub initial_capital: f64,
    pub cash: f64,
    #[serde(default)]
    pub positions: Vec<Position>,
    #[serde(default)]
    pub history: Vec<Action>,
    #[serde(default)]
    pub daily_nav: Vec<NavPoint>,
}

impl PortfolioState {
    pub fn new(initial_capital: f64) -> Self {
        PortfolioState {
            initial_capital,
            cash: initial_capital,
            positions: Vec::new(),
            history: Vec::new(),
            daily_nav: Vec::new(),
        }
    }

    pub fn get_position(&self, code: &str) -> Option<&Position> {
        self.positions.iter().find(|p| p.code == code)
    }

    pub fn get_position_mut(&mut self, code: &str) -> Option<&mut Position> {
        self.positions.iter_mut().find(|p| p.code == code)
    }

    pub fn has_position(&self, code: &str) -> bool {
        self.get_position(code).is_some()
    }

    pub fn add_position(&mut self, position: Position) {
        self.positions.push(position);
    }

    pub fn remove_position(&mut self, code: &str) -> Option<Position> {
        let idx = self.positions.iter().position(|p| p.code == code)?;
        Some(self.positions.remove(idx))
    }

    pub fn position_count(&self) -> usize {
        self.positions.len()
    }

    pub fn positions_value(&self) -> f64 {
        self.positions.iter().map(Position::market_value).sum()
    }

    pub fn nav(&self) -> f64 {
        self.cash + self.positions_value()
    }

    pub fn last_cycle_date(&self) -> Option<NaiveDate> {
        self.daily_nav.last().map(|p| p.date)
    }

    pub fn record_nav(&mut self, date: NaiveDate, benchmark: Option<f64>) {
        let positions_value = self.positions_value();
        self.daily_nav.push(NavPoint {
            date,
            nav: self.cash + positions_value,
            cash: self.cash,
            positions_value,
            benchmark,
        });
    }

    /// Check the invariants every committed state must satisfy.
    pub fn validate(&self) -> Result<(), DiprankerError> {
        let violation = |reason: String| Err(DiprankerError::InvariantViolation { reason });

        if !self.cash.is_finite() || self.cash < 0.0 {
            return violation(format!("cash is {}", self.cash));
        }

        let mut seen = HashSet::new();
        for pos in &self.positions {
            if !seen.insert(pos.code.as_str()) {
                return violation(format!("duplicate position {}", pos.code));
            }
            if pos.shares == 0 {
                return violation(format!("position {} has no shares", pos.code));
            }
            if !(pos.cost_basis > 0.0 && pos.cost_basis.is_finite()) {
                return violation(format!("position {} cost basis {}", pos.code, pos.cost_basis));
            }
            if !(pos.last_price > 0.0 && pos.last_price.is_finite()) {
                return violation(format!("position {} price {}", pos.code, pos.last_price));
            }
        }

        if let Some(last) = self.daily_nav.last() {
            let positions_value = self.positions_value();
            let expected = self.cash + positions_value;
            if last.nav != expected || last.cash != self.cash || last.positions_value != positions_value {
                return violation(format!(
                    "NAV {} on {} does not equal cash {} + positions {}",
                    last.nav, last.date, self.cash, positions_value
                ));
            }
        }

        let mut prev: Option<NaiveDate> = None;
        for point in &self.daily_nav {
            if prev.is_some_and(|p| p >= point.date) {
                return violation(format!("NAV history out of order at {}", point.date));
            }
            prev = Some(point.date);
        }

        Ok(())
    }
}
