//! Historical data access port trait.

use crate::domain::error::DiprankerError;
use crate::domain::instrument::Instrument;
use crate::domain::ohlcv::OhlcvBar;
use chrono::NaiveDate;

pub trait DataPort {
    /// Daily bars for `code` within `[start_date, end_date]`, sorted by date.
    fn fetch_bars(
        &self,
        code: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<OhlcvBar>, DiprankerError>;

    fn list_symbols(&self) -> Result<Vec<String>, DiprankerError>;

    /// Instrument metadata. Codes absent here score with empty fundamentals.
    fn fetch_instruments(&self) -> Result<Vec<Instrument>, DiprankerError>;
}
