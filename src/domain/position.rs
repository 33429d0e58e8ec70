//! Open positions in the simulated portfolio.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionState {
    Open,
    PartiallyClosed,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub code: String,
    pub entry_date: NaiveDate,
    /// Share-weighted average cost per share.
    pub cost_basis: f64,
    pub shares: u64,
    pub last_price: f64,
    /// Consecutive cycles with trend deviation below the breach floor.
    #[serde(default)]
    pub breach_days: u32,
    #[serde(default)]
    pub half_sold: bool,
    #[serde(default)]
    pub averaged_down: bool,
}

impl Position {
    pub fn new(code: impl Into<String>, entry_date: NaiveDate, price: f64, shares: u64) -> Self {
        Position {
            code: code.into(),
            entry_date,
            cost_basis: price,
            shares,
            last_price: price,
            breach_days: 0,
            half_sold: false,
            averaged_down: false,
        }
    }

    pub fn state(&self) -> PositionState {
        if self.shares == 0 {
            PositionState::Closed
        } else if self.half_sold {
            PositionState::PartiallyClosed
        } else {
            PositionState::Open
        }
    }

    pub fn market_value(&self) -> f64 {
        self.shares as f64 * self.last_price
    }

    pub fn cost_value(&self) -> f64 {
        self.shares as f64 * self.cost_basis
    }

    /// Unrealized return against cost basis, in percent.
    pub fn pnl_pct(&self) -> f64 {
        if self.cost_basis > 0.0 {
            (self.last_price - self.cost_basis) / self.cost_basis * 100.0
        } else {
            0.0
        }
    }

    /// Realized P&L of selling `shares` at `price`.
    pub fn realized_pnl(&self, shares: u64, price: f64) -> f64 {
        shares as f64 * (price - self.cost_basis)
    }

    /// Add `shares` bought at `price`, re-weighting the cost basis.
    pub fn add_shares(&mut self, shares: u64, price: f64) {
        let total = self.shares + shares;
        if total > 0 {
            self.cost_basis =
                (self.cost_basis * self.shares as f64 + price * shares as f64) / total as f64;
        }
        self.shares = total;
    }
}
