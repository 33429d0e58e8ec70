//! CSV file data adapter.
//!
//! Layout under the base path:
//! - `bars/{CODE}.csv` with `date,open,high,low,close,volume`
//! - `instruments.csv` with `code,sector,market_cap_b,div_growth_years,dividend_yield,pbr,per`

use crate::domain::error::DiprankerError;
use crate::domain::instrument::Instrument;
use crate::domain::ohlcv::OhlcvBar;
use crate::ports::data_port::DataPort;
use chrono::NaiveDate;
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

const BARS_DIR: &str = "bars";
const INSTRUMENTS_FILE: &str = "instruments.csv";

#[derive(Debug, Deserialize)]
struct BarRow {
    date: NaiveDate,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: i64,
}

#[derive(Debug, Deserialize)]
struct InstrumentRow {
    code: String,
    sector: Option<String>,
    market_cap_b: Option<f64>,
    div_growth_years: Option<u32>,
    dividend_yield: Option<f64>,
    pbr: Option<f64>,
    per: Option<f64>,
}

impl From<InstrumentRow> for Instrument {
    fn from(row: InstrumentRow) -> Self {
        Instrument {
            code: row.code.trim().to_uppercase(),
            sector: row.sector.filter(|s| !s.trim().is_empty()),
            market_cap_b: row.market_cap_b,
            div_growth_years: row.div_growth_years.unwrap_or(0),
            dividend_yield: row.dividend_yield,
            pbr: row.pbr,
            per: row.per,
        }
    }
}

pub struct CsvAdapter {
    base_path: PathBuf,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, code: &str) -> PathBuf {
        self.base_path.join(BARS_DIR).join(format!("{}.csv", code))
    }
}

impl DataPort for CsvAdapter {
    fn fetch_bars(
        &self,
        code: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<OhlcvBar>, DiprankerError> {
        let path = self.csv_path(code);
        let unavailable = |reason: String| DiprankerError::DataUnavailable {
            code: code.to_string(),
            reason,
        };

        let content = fs::read_to_string(&path)
            .map_err(|e| unavailable(format!("failed to read {}: {}", path.display(), e)))?;

        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(content.as_bytes());
        let mut bars = Vec::new();

        for result in rdr.deserialize::<BarRow>() {
            let row = result.map_err(|e| unavailable(format!("CSV parse error: {}", e)))?;
            if row.date < start_date || row.date > end_date {
                continue;
            }
            bars.push(OhlcvBar {
                code: code.to_string(),
                date: row.date,
                open: row.open,
                high: row.high,
                low: row.low,
                close: row.close,
                volume: row.volume,
            });
        }

        bars.sort_by_key(|b| b.date);
        Ok(bars)
    }

    fn list_symbols(&self) -> Result<Vec<String>, DiprankerError> {
        let dir = self.base_path.join(BARS_DIR);
        let entries = fs::read_dir(&dir).map_err(|e| DiprankerError::DataUnavailable {
            code: "all".to_string(),
            reason: format!("failed to read directory {}: {}", dir.display(), e),
        })?;

        let mut symbols = Vec::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let name_str = name.to_string_lossy();
            if let Some(code) = name_str.strip_suffix(".csv") {
                symbols.push(code.to_string());
            }
        }

        symbols.sort();
        Ok(symbols)
    }

    fn fetch_instruments(&self) -> Result<Vec<Instrument>, DiprankerError> {
        let path = self.base_path.join(INSTRUMENTS_FILE);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(&path)
            .map_err(|e| DiprankerError::DataUnavailable {
                code: "all".to_string(),
                reason: format!("failed to open {}: {}", path.display(), e),
            })?;

        rdr.deserialize::<InstrumentRow>()
            .map(|row| {
                row.map(Instrument::from)
                    .map_err(|e| DiprankerError::DataUnavailable {
                        code: "all".to_string(),
                        reason: format!("instrument CSV parse error: {}", e),
                    })
            })
            .collect()
    }
}
