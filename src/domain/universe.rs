//! Universe loading.
//!
//! Parses code lists from configuration, loads bar history and metadata for
//! each code through the [`DataPort`], and drops codes that can never produce
//! a snapshot.

use crate::domain::code_data::CodeData;
use crate::domain::error::DiprankerError;
use crate::domain::indicator::MIN_HISTORY_BARS;
use crate::domain::instrument::Instrument;
use crate::ports::data_port::DataPort;
use chrono::NaiveDate;
use std::collections::{HashMap, HashSet};
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct Universe {
    /// Instruments in universe order; this order breaks score ties.
    pub instruments: Vec<Instrument>,
    pub code_data: HashMap<String, CodeData>,
}

impl Universe {
    pub fn count(&self) -> usize {
        self.instruments.len()
    }

    pub fn codes(&self) -> Vec<String> {
        self.instruments.iter().map(|i| i.code.clone()).collect()
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum UniverseError {
    #[error("empty token in code list")]
    EmptyToken,

    #[error("duplicate code: {0}")]
    DuplicateCode(String),
}

pub fn parse_codes(input: &str) -> Result<Vec<String>, UniverseError> {
    let mut codes = Vec::new();
    let mut seen = HashSet::new();

    for token in input.split(',') {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return Err(UniverseError::EmptyToken);
        }
        let code = trimmed.to_uppercase();
        if !seen.insert(code.clone()) {
            return Err(UniverseError::DuplicateCode(code));
        }
        codes.push(code);
    }

    Ok(codes)
}

pub struct UniverseLoadResult {
    pub universe: Universe,
    pub skipped: Vec<SkippedCode>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedCode {
    pub code: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    NoData,
    InsufficientBars { bars: usize },
}

/// Load bars and metadata for `codes` (or every listed symbol when `None`).
///
/// Codes without instrument metadata are kept with empty fundamentals, which
/// the scoring gate then rejects.
pub fn load_universe(
    data_port: &dyn DataPort,
    codes: Option<Vec<String>>,
    start_date: NaiveDate,
    end_date: NaiveDate,
) -> Result<UniverseLoadResult, DiprankerError> {
    let codes = match codes {
        Some(codes) => codes,
        None => data_port.list_symbols()?,
    };

    let mut metadata: HashMap<String, Instrument> = data_port
        .fetch_instruments()?
        .into_iter()
        .map(|inst| (inst.code.clone(), inst))
        .collect();

    let mut instruments = Vec::new();
    let mut code_data = HashMap::new();
    let mut skipped = Vec::new();

    for code in codes {
        let bars = match data_port.fetch_bars(&code, start_date, end_date) {
            Ok(bars) if !bars.is_empty() => bars,
            Ok(_) => {
                warn!(%code, "skipping: no data found");
                skipped.push(SkippedCode {
                    code,
                    reason: SkipReason::NoData,
                });
                continue;
            }
            Err(e) => {
                warn!(%code, error = %e, "skipping: data unavailable");
                skipped.push(SkippedCode {
                    code,
                    reason: SkipReason::NoData,
                });
                continue;
            }
        };

        if bars.len() < MIN_HISTORY_BARS {
            warn!(%code, bars = bars.len(), minimum = MIN_HISTORY_BARS, "skipping: insufficient bars");
            skipped.push(SkippedCode {
                code,
                reason: SkipReason::InsufficientBars { bars: bars.len() },
            });
            continue;
        }

        let instrument = metadata
            .remove(&code)
            .unwrap_or_else(|| Instrument::new(code.clone()));
        instruments.push(instrument);
        code_data.insert(code.clone(), CodeData::new(code, bars));
    }

    if instruments.is_empty() {
        return Err(DiprankerError::DataUnavailable {
            code: "all".to_string(),
            reason: format!("no code has at least {MIN_HISTORY_BARS} bars"),
        });
    }

    info!(
        loaded = instruments.len(),
        skipped = skipped.len(),
        "universe loaded"
    );

    Ok(UniverseLoadResult {
        universe: Universe {
            instruments,
            code_data,
        },
        skipped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_codes_basic() {
        let result = parse_codes("7203,8306,9432").unwrap();
        assert_eq!(result, vec!["7203", "8306", "9432"]);
    }

    #[test]
    fn test_parse_codes_with_whitespace_and_case() {
        let result = parse_codes("  7203 , 8306 ,abc ").unwrap();
        assert_eq!(result, vec!["7203", "8306", "ABC"]);
    }

    #[test]
    fn test_parse_codes_empty_token() {
        let result = parse_codes("7203,,8306");
        assert!(matches!(result, Err(UniverseError::EmptyToken)));
    }

    #[test]
    fn test_parse_codes_duplicate() {
        let result = parse_codes("7203,8306,7203");
        assert!(matches!(result, Err(UniverseError::DuplicateCode(s)) if s == "7203"));
    }
}
