//! Persistence port for everything carried between runs.
//!
//! Loads return `None` (or an empty history) when nothing has been saved yet.
//! Saves must be atomic: a failed save leaves the previous copy intact.

use crate::domain::backtest::BacktestReport;
use crate::domain::error::DiprankerError;
use crate::domain::portfolio::PortfolioState;
use crate::domain::validation::RecommendationBatch;
use crate::domain::weights::WeightVector;

pub trait StatePort {
    fn load_weights(&self) -> Result<Option<WeightVector>, DiprankerError>;
    fn save_weights(&self, weights: &WeightVector) -> Result<(), DiprankerError>;

    fn load_portfolio(&self) -> Result<Option<PortfolioState>, DiprankerError>;
    fn save_portfolio(&self, state: &PortfolioState) -> Result<(), DiprankerError>;

    fn load_validation_history(&self) -> Result<Vec<RecommendationBatch>, DiprankerError>;
    fn save_validation_history(
        &self,
        batches: &[RecommendationBatch],
    ) -> Result<(), DiprankerError>;

    fn save_backtest_report(&self, report: &BacktestReport) -> Result<(), DiprankerError>;
}
