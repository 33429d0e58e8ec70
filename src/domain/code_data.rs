//! Per-instrument bar history and the unified trading timeline.

use crate::domain::ohlcv::{OhlcvBar, bars_as_of};
use chrono::NaiveDate;
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone)]
pub struct CodeData {
    pub code: String,
    pub ohlcv: Vec<OhlcvBar>,
    pub date_index: HashMap<NaiveDate, usize>,
}

impl CodeData {
    /// Bars are sorted by date on construction.
    pub fn new(code: String, mut ohlcv: Vec<OhlcvBar>) -> Self {
        ohlcv.sort_by_key(|bar| bar.date);
        let date_index = ohlcv
            .iter()
            .enumerate()
            .map(|(i, bar)| (bar.date, i))
            .collect();
        Self {
            code,
            ohlcv,
            date_index,
        }
    }

    pub fn bar_count(&self) -> usize {
        self.ohlcv.len()
    }

    pub fn get_bar(&self, date: NaiveDate) -> Option<&OhlcvBar> {
        self.date_index.get(&date).map(|&i| &self.ohlcv[i])
    }

    /// Bars dated on or before `as_of`.
    pub fn visible(&self, as_of: NaiveDate) -> &[OhlcvBar] {
        bars_as_of(&self.ohlcv, as_of)
    }

    /// Close of the latest bar dated on or before `as_of`.
    pub fn close_on_or_before(&self, as_of: NaiveDate) -> Option<f64> {
        self.visible(as_of).last().map(|bar| bar.close)
    }

    /// Close of the latest bar dated in `(after, until]`.
    pub fn latest_close_between(&self, after: NaiveDate, until: NaiveDate) -> Option<f64> {
        self.visible(until)
            .last()
            .filter(|bar| bar.date > after)
            .map(|bar| bar.close)
    }
}

pub fn build_unified_timeline<'a>(codes: impl IntoIterator<Item = &'a CodeData>) -> Vec<NaiveDate> {
    let unique_dates: BTreeSet<NaiveDate> = codes
        .into_iter()
        .flat_map(|cd| cd.ohlcv.iter().map(|bar| bar.date))
        .collect();
    unique_dates.into_iter().collect()
}
