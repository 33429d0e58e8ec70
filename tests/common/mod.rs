#![allow(dead_code)]

use chrono::{Datelike, NaiveDate, Weekday};
use dipranker::domain::config::EngineConfig;
use dipranker::domain::error::DiprankerError;
use dipranker::domain::instrument::Instrument;
pub use dipranker::domain::ohlcv::OhlcvBar;
use dipranker::domain::quote::PriceError;
use dipranker::adapters::file_config_adapter::FileConfigAdapter;
use dipranker::ports::data_port::DataPort;
use dipranker::ports::price_port::PriceFeed;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

pub struct MockDataPort {
    pub data: HashMap<String, Vec<OhlcvBar>>,
    pub instruments: Vec<Instrument>,
    pub errors: HashMap<String, String>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            instruments: Vec::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_bars(mut self, code: &str, bars: Vec<OhlcvBar>) -> Self {
        self.data.insert(code.to_string(), bars);
        self
    }

    pub fn with_instrument(mut self, instrument: Instrument) -> Self {
        self.instruments.push(instrument);
        self
    }

    pub fn with_error(mut self, code: &str, reason: &str) -> Self {
        self.errors.insert(code.to_string(), reason.to_string());
        self
    }
}

impl DataPort for MockDataPort {
    fn fetch_bars(
        &self,
        code: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<OhlcvBar>, DiprankerError> {
        if let Some(reason) = self.errors.get(code) {
            return Err(DiprankerError::DataUnavailable {
                code: code.to_string(),
                reason: reason.clone(),
            });
        }
        Ok(self
            .data
            .get(code)
            .map(|bars| {
                bars.iter()
                    .filter(|b| b.date >= start_date && b.date <= end_date)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn list_symbols(&self) -> Result<Vec<String>, DiprankerError> {
        let mut codes: Vec<String> = self.data.keys().cloned().collect();
        codes.sort();
        Ok(codes)
    }

    fn fetch_instruments(&self) -> Result<Vec<Instrument>, DiprankerError> {
        Ok(self.instruments.clone())
    }
}

/// Price feed with fixed answers. Codes in `flaky` fail on their first request.
pub struct MockPriceFeed {
    pub prices: HashMap<String, f64>,
    pub flaky: HashSet<String>,
    pub calls: Mutex<HashMap<String, usize>>,
}

impl MockPriceFeed {
    pub fn new(prices: &[(&str, f64)]) -> Self {
        Self {
            prices: prices.iter().map(|(c, p)| (c.to_string(), *p)).collect(),
            flaky: HashSet::new(),
            calls: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_flaky(mut self, code: &str) -> Self {
        self.flaky.insert(code.to_string());
        self
    }

    pub fn call_count(&self, code: &str) -> usize {
        self.calls.lock().unwrap().get(code).copied().unwrap_or(0)
    }
}

impl PriceFeed for MockPriceFeed {
    fn fetch_price(&self, code: &str, _as_of: NaiveDate) -> Result<f64, PriceError> {
        let attempt = {
            let mut calls = self.calls.lock().unwrap();
            let n = calls.entry(code.to_string()).or_insert(0);
            *n += 1;
            *n
        };
        if attempt == 1 && self.flaky.contains(code) {
            return Err(PriceError::Unavailable("connection reset".into()));
        }
        self.prices
            .get(code)
            .copied()
            .ok_or_else(|| PriceError::Unavailable(format!("no quote for {code}")))
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// `count` consecutive weekdays starting at `start` (or the next weekday).
pub fn weekdays_from(start: NaiveDate, count: usize) -> Vec<NaiveDate> {
    let mut days = Vec::with_capacity(count);
    let mut day = start;
    while days.len() < count {
        if !matches!(day.weekday(), Weekday::Sat | Weekday::Sun) {
            days.push(day);
        }
        day = day.succ_opt().unwrap();
    }
    days
}

/// Oscillating closes around a slow drift, distinct per `phase`.
pub fn wave_bars(code: &str, dates: &[NaiveDate], base: f64, phase: f64) -> Vec<OhlcvBar> {
    dates
        .iter()
        .enumerate()
        .map(|(i, &date)| {
            let t = i as f64;
            let close = base * (1.0 + 0.06 * (t * 0.37 + phase).sin() - 0.0005 * t);
            OhlcvBar {
                code: code.to_string(),
                date,
                open: close * 1.002,
                high: close * 1.01,
                low: close * 0.99,
                close,
                volume: 10_000 + (i as i64 % 7) * 500,
            }
        })
        .collect()
}

/// Instrument that clears the scoring gate with strong fundamentals.
pub fn investable(code: &str, sector: &str) -> Instrument {
    Instrument {
        code: code.to_string(),
        sector: Some(sector.to_string()),
        market_cap_b: Some(60_000.0),
        div_growth_years: 15,
        dividend_yield: Some(5.0),
        pbr: Some(0.7),
        per: Some(11.0),
    }
}

pub const CODES: [&str; 6] = ["1301", "2914", "4502", "7203", "8306", "9432"];

pub fn sample_port(dates: &[NaiveDate]) -> MockDataPort {
    let sectors = ["Food", "Food", "Pharma", "Autos", "Banks", "Telecom"];
    let mut port = MockDataPort::new();
    for (i, code) in CODES.iter().enumerate() {
        let base = 1_000.0 + 250.0 * i as f64;
        port = port
            .with_bars(code, wave_bars(code, dates, base, i as f64 * 0.9))
            .with_instrument(investable(code, sectors[i]));
    }
    port
}

pub fn engine_config(ini: &str) -> EngineConfig {
    let adapter = FileConfigAdapter::from_string(ini).unwrap();
    EngineConfig::from_port(&adapter).unwrap()
}
