//! Instrument metadata supplied by the data collaborator.

use serde::{Deserialize, Serialize};

pub const DEFAULT_SECTOR: &str = "Other";

/// Static per-period metadata for one listed instrument.
///
/// Fundamental fields are optional: a missing value scores as zero contribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    pub code: String,
    #[serde(default)]
    pub sector: Option<String>,
    /// Market capitalisation in units of 100 million.
    #[serde(default)]
    pub market_cap_b: Option<f64>,
    #[serde(default)]
    pub div_growth_years: u32,
    /// Trailing dividend yield in percent.
    #[serde(default)]
    pub dividend_yield: Option<f64>,
    #[serde(default)]
    pub pbr: Option<f64>,
    #[serde(default)]
    pub per: Option<f64>,
}

impl Instrument {
    pub fn new(code: impl Into<String>) -> Self {
        Instrument {
            code: code.into(),
            sector: None,
            market_cap_b: None,
            div_growth_years: 0,
            dividend_yield: None,
            pbr: None,
            per: None,
        }
    }

    pub fn sector_or_default(&self) -> &str {
        match self.sector.as_deref() {
            Some(s) if !s.trim().is_empty() => s,
            _ => DEFAULT_SECTOR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_sector_falls_back() {
        let mut inst = Instrument::new("8306");
        assert_eq!(inst.sector_or_default(), "Other");
        inst.sector = Some("   ".into());
        assert_eq!(inst.sector_or_default(), "Other");
        inst.sector = Some("Banks".into());
        assert_eq!(inst.sector_or_default(), "Banks");
    }

    #[test]
    fn deserializes_with_missing_fundamentals() {
        let inst: Instrument = serde_json::from_str(r#"{"code":"2914","dividend_yield":4.8}"#).unwrap();
        assert_eq!(inst.code, "2914");
        assert_eq!(inst.dividend_yield, Some(4.8));
        assert!(inst.pbr.is_none());
        assert_eq!(inst.div_growth_years, 0);
    }
}
