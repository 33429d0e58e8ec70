//! The closed set of scoring factors.
//!
//! Each factor carries its persisted name, default weight and the bound range
//! every weight must stay within.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Factor {
    #[serde(rename = "w_dividend")]
    Dividend,
    #[serde(rename = "w_market_cap")]
    MarketCap,
    #[serde(rename = "w_div_growth")]
    DivGrowth,
    #[serde(rename = "w_dip_zscore")]
    DipZscore,
    #[serde(rename = "w_pbr")]
    Pbr,
    #[serde(rename = "w_ret5_vs_sector")]
    Ret5VsSector,
    #[serde(rename = "w_ret5")]
    Ret5,
    #[serde(rename = "w_ret10")]
    Ret10,
    #[serde(rename = "w_stable_bonus")]
    StableBonus,
    #[serde(rename = "w_sector_penalty")]
    SectorPenalty,
}

impl Factor {
    pub const ALL: [Factor; 10] = [
        Factor::Dividend,
        Factor::MarketCap,
        Factor::DivGrowth,
        Factor::DipZscore,
        Factor::Pbr,
        Factor::Ret5VsSector,
        Factor::Ret5,
        Factor::Ret10,
        Factor::StableBonus,
        Factor::SectorPenalty,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Factor::Dividend => "w_dividend",
            Factor::MarketCap => "w_market_cap",
            Factor::DivGrowth => "w_div_growth",
            Factor::DipZscore => "w_dip_zscore",
            Factor::Pbr => "w_pbr",
            Factor::Ret5VsSector => "w_ret5_vs_sector",
            Factor::Ret5 => "w_ret5",
            Factor::Ret10 => "w_ret10",
            Factor::StableBonus => "w_stable_bonus",
            Factor::SectorPenalty => "w_sector_penalty",
        }
    }

    pub fn from_name(name: &str) -> Option<Factor> {
        Factor::ALL.into_iter().find(|f| f.name() == name)
    }

    pub fn default_weight(self) -> f64 {
        match self {
            Factor::Dividend => 20.0,
            Factor::MarketCap => 10.0,
            Factor::DivGrowth => 10.0,
            Factor::DipZscore => 15.0,
            Factor::Pbr => 5.0,
            Factor::Ret5VsSector => 20.0,
            Factor::Ret5 => 10.0,
            Factor::Ret10 => 5.0,
            Factor::StableBonus => 5.0,
            Factor::SectorPenalty => -5.0,
        }
    }

    /// Inclusive `(min, max)` range for this factor's weight.
    pub fn bounds(self) -> (f64, f64) {
        match self {
            Factor::SectorPenalty => (-25.0, 0.0),
            _ => (0.0, 25.0),
        }
    }

    pub fn clip(self, weight: f64) -> f64 {
        let (lo, hi) = self.bounds();
        weight.clamp(lo, hi)
    }

    pub fn in_bounds(self, weight: f64) -> bool {
        let (lo, hi) = self.bounds();
        weight.is_finite() && weight >= lo && weight <= hi
    }
}

impl std::fmt::Display for Factor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip_through_lookup() {
        for factor in Factor::ALL {
            assert_eq!(Factor::from_name(factor.name()), Some(factor));
        }
        assert_eq!(Factor::from_name("w_volume"), None);
    }

    #[test]
    fn defaults_lie_within_bounds() {
        for factor in Factor::ALL {
            assert!(factor.in_bounds(factor.default_weight()), "{factor}");
        }
    }

    #[test]
    fn sector_penalty_is_non_positive() {
        assert_eq!(Factor::SectorPenalty.bounds(), (-25.0, 0.0));
        assert_eq!(Factor::SectorPenalty.clip(3.0), 0.0);
        assert_eq!(Factor::Dividend.clip(30.0), 25.0);
        assert_eq!(Factor::Dividend.clip(-1.0), 0.0);
    }

    #[test]
    fn serde_uses_persisted_names() {
        let json = serde_json::to_string(&Factor::Ret5VsSector).unwrap();
        assert_eq!(json, "\"w_ret5_vs_sector\"");
    }
}
