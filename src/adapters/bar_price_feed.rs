//! Price feed backed by loaded bar history.
//!
//! Answers with the latest close dated on or before the requested day, which
//! is what a daily cycle driven from end-of-day files needs.

use crate::domain::code_data::CodeData;
use crate::domain::quote::PriceError;
use crate::ports::price_port::PriceFeed;
use chrono::NaiveDate;
use std::collections::HashMap;

pub struct BarPriceFeed {
    code_data: HashMap<String, CodeData>,
}

impl BarPriceFeed {
    pub fn new(code_data: HashMap<String, CodeData>) -> Self {
        Self { code_data }
    }
}

impl PriceFeed for BarPriceFeed {
    fn fetch_price(&self, code: &str, as_of: NaiveDate) -> Result<f64, PriceError> {
        let data = self
            .code_data
            .get(code)
            .ok_or_else(|| PriceError::Unavailable(format!("no bars loaded for {code}")))?;
        data.close_on_or_before(as_of)
            .ok_or_else(|| PriceError::Unavailable(format!("no bar for {code} on or before {as_of}")))
    }
}
