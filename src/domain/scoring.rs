//! Table-driven scoring engine.
//!
//! Every piecewise factor is a declarative [`Breakpoints`] table mapping a raw
//! indicator value to a fraction of that factor's weight. The tables are fixed;
//! only the weight magnitudes change between calibrations.

use crate::domain::factor::Factor;
use crate::domain::indicator::{IndicatorSnapshot, round_dp};
use crate::domain::weights::WeightVector;

/// Instruments yielding less than this (percent) are not investable.
pub const MIN_DIVIDEND_YIELD: f64 = 2.0;
/// Instruments below this market-cap bucket are not investable.
pub const MIN_MARKET_CAP: f64 = 500.0;
/// Sector-average 5-day return (percent) at or below which the penalty applies.
pub const SECTOR_PENALTY_THRESHOLD: f64 = -3.0;

const STABLE_FULL_MARKET_CAP: f64 = 5_000.0;
const STABLE_PARTIAL_MARKET_CAP: f64 = 1_000.0;
const STABLE_PARTIAL_FRACTION: f64 = 0.6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Fires when the value is at or above the threshold.
    AtLeast,
    /// Fires when the value is at or below the threshold.
    AtMost,
}

/// Ordered `(threshold, fraction)` pairs; the first matching row wins.
#[derive(Debug, Clone, Copy)]
pub struct Breakpoints {
    pub direction: Direction,
    pub rows: &'static [(f64, f64)],
}

impl Breakpoints {
    pub fn fraction(&self, value: f64) -> f64 {
        if !value.is_finite() {
            return 0.0;
        }
        self.rows
            .iter()
            .find(|(threshold, _)| match self.direction {
                Direction::AtLeast => value >= *threshold,
                Direction::AtMost => value <= *threshold,
            })
            .map_or(0.0, |(_, fraction)| *fraction)
    }
}

pub const DIVIDEND: Breakpoints = Breakpoints {
    direction: Direction::AtLeast,
    rows: &[
        (5.0, 1.0),
        (4.5, 0.85),
        (4.0, 0.7),
        (3.5, 0.55),
        (3.0, 0.4),
        (2.5, 0.25),
        (2.0, 0.1),
    ],
};

pub const MARKET_CAP: Breakpoints = Breakpoints {
    direction: Direction::AtLeast,
    rows: &[
        (50_000.0, 1.0),
        (10_000.0, 0.9),
        (5_000.0, 0.8),
        (1_000.0, 0.6),
        (500.0, 0.3),
    ],
};

pub const DIV_GROWTH: Breakpoints = Breakpoints {
    direction: Direction::AtLeast,
    rows: &[(15.0, 1.0), (10.0, 0.7), (7.0, 0.5), (5.0, 0.3)],
};

pub const DIP_ZSCORE: Breakpoints = Breakpoints {
    direction: Direction::AtMost,
    rows: &[(-3.0, 1.0), (-2.0, 0.8), (-1.5, 0.6), (-1.0, 0.4), (-0.5, 0.2)],
};

pub const PBR: Breakpoints = Breakpoints {
    direction: Direction::AtMost,
    rows: &[(0.7, 1.0), (0.9, 0.8), (1.2, 0.6), (1.5, 0.2)],
};

pub const RET5_VS_SECTOR: Breakpoints = Breakpoints {
    direction: Direction::AtMost,
    rows: &[(-5.0, 1.0), (-3.0, 0.75), (-1.5, 0.5), (-0.5, 0.25)],
};

pub const RET5: Breakpoints = Breakpoints {
    direction: Direction::AtMost,
    rows: &[(-5.0, 1.0), (-3.0, 0.7), (-1.5, 0.4), (-0.5, 0.1)],
};

pub const RET10: Breakpoints = Breakpoints {
    direction: Direction::AtMost,
    rows: &[(-8.0, 1.0), (-5.0, 0.6), (-2.0, 0.4), (-1.0, 0.2)],
};

/// True when the instrument passes the hard dividend / market-cap gate.
pub fn is_investable(snapshot: &IndicatorSnapshot) -> bool {
    let dividend = snapshot.dividend_yield.unwrap_or(0.0);
    let market_cap = snapshot.market_cap_b.unwrap_or(0.0);
    dividend >= MIN_DIVIDEND_YIELD && market_cap >= MIN_MARKET_CAP
}

/// Score one snapshot under `weights`. Result is in `[0, 100]`, one decimal.
pub fn score(snapshot: &IndicatorSnapshot, weights: &WeightVector) -> f64 {
    if !is_investable(snapshot) {
        return 0.0;
    }

    let dividend = snapshot.dividend_yield.unwrap_or(0.0);
    let market_cap = snapshot.market_cap_b.unwrap_or(0.0);

    let pbr_fraction = match snapshot.pbr {
        Some(pbr) if pbr > 0.0 => PBR.fraction(pbr),
        _ => 0.0,
    };

    let tabled = [
        (Factor::Dividend, DIVIDEND.fraction(dividend)),
        (Factor::MarketCap, MARKET_CAP.fraction(market_cap)),
        (
            Factor::DivGrowth,
            DIV_GROWTH.fraction(f64::from(snapshot.div_growth_years)),
        ),
        (Factor::DipZscore, DIP_ZSCORE.fraction(snapshot.dip_zscore)),
        (Factor::Pbr, pbr_fraction),
        (
            Factor::Ret5VsSector,
            RET5_VS_SECTOR.fraction(snapshot.ret5_vs_sector),
        ),
        (Factor::Ret5, RET5.fraction(snapshot.ret5)),
        (Factor::Ret10, RET10.fraction(snapshot.ret10)),
    ];

    let mut total: f64 = tabled
        .iter()
        .map(|(factor, fraction)| weights.get(*factor) * fraction)
        .sum();

    if snapshot.sector_ret5 <= SECTOR_PENALTY_THRESHOLD {
        total += weights.get(Factor::SectorPenalty);
    }

    total += weights.get(Factor::StableBonus) * stability_fraction(snapshot, dividend, market_cap);

    let rounded = round_dp(total, 1);
    if rounded.is_finite() { rounded.clamp(0.0, 100.0) } else { 0.0 }
}

fn stability_fraction(snapshot: &IndicatorSnapshot, dividend: f64, market_cap: f64) -> f64 {
    let per_ok = snapshot.per.is_some_and(|per| per > 0.0);
    if !per_ok || dividend < MIN_DIVIDEND_YIELD {
        return 0.0;
    }
    if market_cap >= STABLE_FULL_MARKET_CAP {
        1.0
    } else if market_cap >= STABLE_PARTIAL_MARKET_CAP {
        STABLE_PARTIAL_FRACTION
    } else {
        0.0
    }
}
