//! Results of a batch price refresh.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PriceError {
    #[error("price unavailable: {0}")]
    Unavailable(String),
    #[error("price request timed out")]
    TimedOut,
}

/// Per-code outcome of one refresh round. Codes are kept sorted.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PriceBatch {
    pub as_of: Option<NaiveDate>,
    pub quotes: BTreeMap<String, Result<f64, PriceError>>,
}

impl PriceBatch {
    pub fn new(as_of: NaiveDate) -> Self {
        PriceBatch {
            as_of: Some(as_of),
            quotes: BTreeMap::new(),
        }
    }

    /// Build a batch where every listed price succeeded.
    pub fn from_prices<'a>(
        as_of: NaiveDate,
        prices: impl IntoIterator<Item = (&'a str, f64)>,
    ) -> Self {
        let mut batch = PriceBatch::new(as_of);
        for (code, price) in prices {
            batch.insert(code, Ok(price));
        }
        batch
    }

    pub fn insert(&mut self, code: impl Into<String>, quote: Result<f64, PriceError>) {
        self.quotes.insert(code.into(), quote);
    }

    /// The refreshed price for `code`, if it succeeded and is usable.
    pub fn price(&self, code: &str) -> Option<f64> {
        match self.quotes.get(code) {
            Some(Ok(p)) if *p > 0.0 && p.is_finite() => Some(*p),
            _ => None,
        }
    }

    pub fn failed_codes(&self) -> Vec<String> {
        self.quotes
            .iter()
            .filter(|(code, _)| self.price(code).is_none())
            .map(|(code, _)| code.clone())
            .collect()
    }

    /// Overlay successful quotes from a retry round.
    pub fn merge(&mut self, retry: PriceBatch) {
        for (code, quote) in retry.quotes {
            let replace = quote.is_ok() || !self.quotes.contains_key(&code);
            if replace {
                self.quotes.insert(code, quote);
            }
        }
    }

    pub fn prices(&self) -> HashMap<String, f64> {
        self.quotes
            .keys()
            .filter_map(|code| self.price(code).map(|p| (code.clone(), p)))
            .collect()
    }
}
