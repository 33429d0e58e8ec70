//! JSON file state store.
//!
//! One file per persisted value under the state directory. Writes go to a
//! `.tmp` sibling first and are renamed into place, so a crash mid-write
//! leaves the previous file readable.

use crate::domain::backtest::BacktestReport;
use crate::domain::error::DiprankerError;
use crate::domain::portfolio::PortfolioState;
use crate::domain::validation::RecommendationBatch;
use crate::domain::weights::WeightVector;
use crate::ports::state_port::StatePort;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

const WEIGHTS_FILE: &str = "weights.json";
const PORTFOLIO_FILE: &str = "portfolio.json";
const VALIDATION_FILE: &str = "validation_history.json";
const BACKTEST_FILE: &str = "backtest_report.json";

pub struct JsonStateStore {
    dir: PathBuf,
}

impl JsonStateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }

    fn load<T: DeserializeOwned>(&self, file: &str) -> Result<Option<T>, DiprankerError> {
        let path = self.path(file);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(persistence(&path, e)),
        };
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| persistence(&path, e))
    }

    fn save<T: Serialize + ?Sized>(&self, file: &str, value: &T) -> Result<(), DiprankerError> {
        fs::create_dir_all(&self.dir).map_err(|e| persistence(&self.dir, e))?;

        let path = self.path(file);
        let tmp_path = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(value)?;

        fs::write(&tmp_path, json).map_err(|e| persistence(&tmp_path, e))?;
        fs::rename(&tmp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            persistence(&path, format!("atomic rename failed: {e}"))
        })?;

        debug!(path = %path.display(), "state saved");
        Ok(())
    }
}

fn persistence(path: &Path, reason: impl ToString) -> DiprankerError {
    DiprankerError::Persistence {
        path: path.display().to_string(),
        reason: reason.to_string(),
    }
}

impl StatePort for JsonStateStore {
    fn load_weights(&self) -> Result<Option<WeightVector>, DiprankerError> {
        self.load(WEIGHTS_FILE)
    }

    fn save_weights(&self, weights: &WeightVector) -> Result<(), DiprankerError> {
        weights.validate()?;
        self.save(WEIGHTS_FILE, weights)
    }

    fn load_portfolio(&self) -> Result<Option<PortfolioState>, DiprankerError> {
        let state: Option<PortfolioState> = self.load(PORTFOLIO_FILE)?;
        if let Some(state) = &state {
            state.validate()?;
        }
        Ok(state)
    }

    fn save_portfolio(&self, state: &PortfolioState) -> Result<(), DiprankerError> {
        state.validate()?;
        self.save(PORTFOLIO_FILE, state)
    }

    fn load_validation_history(&self) -> Result<Vec<RecommendationBatch>, DiprankerError> {
        Ok(self.load(VALIDATION_FILE)?.unwrap_or_default())
    }

    fn save_validation_history(
        &self,
        batches: &[RecommendationBatch],
    ) -> Result<(), DiprankerError> {
        self.save(VALIDATION_FILE, batches)
    }

    fn save_backtest_report(&self, report: &BacktestReport) -> Result<(), DiprankerError> {
        self.save(BACKTEST_FILE, report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::factor::Factor;
    use crate::domain::position::Position;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    #[test]
    fn missing_files_load_as_empty() {
        let dir = TempDir::new().unwrap();
        let store = JsonStateStore::new(dir.path());
        assert!(store.load_weights().unwrap().is_none());
        assert!(store.load_portfolio().unwrap().is_none());
        assert!(store.load_validation_history().unwrap().is_empty());
    }

    #[test]
    fn weights_round_trip_and_leave_no_tmp() {
        let dir = TempDir::new().unwrap();
        let store = JsonStateStore::new(dir.path().join("nested"));
        let mut weights = WeightVector::default();
        weights.set_clipped(Factor::Dividend, 23.0);

        store.save_weights(&weights).unwrap();
        assert_eq!(store.load_weights().unwrap(), Some(weights));
        assert!(!store.dir().join("weights.json.tmp").exists());
    }

    #[test]
    fn unknown_weight_key_fails_load() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(WEIGHTS_FILE), r#"{"w_dividend": 20, "w_magic": 1}"#).unwrap();
        let store = JsonStateStore::new(dir.path());
        assert!(matches!(
            store.load_weights(),
            Err(DiprankerError::Persistence { .. })
        ));
    }

    #[test]
    fn portfolio_round_trip_preserves_nav_identity() {
        let dir = TempDir::new().unwrap();
        let store = JsonStateStore::new(dir.path());
        let day = NaiveDate::from_ymd_opt(2025, 7, 1).unwrap();

        let mut state = PortfolioState::new(1_000_000.0);
        let mut pos = Position::new("7203", day, 2_513.5, 100);
        pos.last_price = 2_498.7;
        state.cash -= 251_350.0;
        state.add_position(pos);
        state.record_nav(day, Some(38_123.45));

        store.save_portfolio(&state).unwrap();
        let loaded = store.load_portfolio().unwrap().unwrap();
        assert_eq!(loaded, state);
    }

    #[test]
    fn invalid_portfolio_is_not_written() {
        let dir = TempDir::new().unwrap();
        let store = JsonStateStore::new(dir.path());
        let mut state = PortfolioState::new(100.0);
        state.cash = -5.0;

        assert!(store.save_portfolio(&state).is_err());
        assert!(!dir.path().join(PORTFOLIO_FILE).exists());
    }

    #[test]
    fn corrupt_file_is_a_persistence_error() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(PORTFOLIO_FILE), "{ not json").unwrap();
        let store = JsonStateStore::new(dir.path());
        assert!(matches!(
            store.load_portfolio(),
            Err(DiprankerError::Persistence { .. })
        ));
    }
}
