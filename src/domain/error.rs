//! Domain error types.

use chrono::NaiveDate;

/// Top-level error type for dipranker.
#[derive(Debug, thiserror::Error)]
pub enum DiprankerError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("unknown config key [{section}] {key}")]
    ConfigUnknownKey { section: String, key: String },

    #[error("data unavailable for {code}: {reason}")]
    DataUnavailable { code: String, reason: String },

    #[error("insufficient history for {code}: have {bars} bars, need {minimum}")]
    InsufficientHistory {
        code: String,
        bars: usize,
        minimum: usize,
    },

    #[error("insufficient calibration sample: have {have} records, need {need}")]
    InsufficientSample { have: usize, need: usize },

    #[error("invariant violation: {reason}")]
    InvariantViolation { reason: String },

    #[error("cycle for {date} is older than the last committed cycle {last}")]
    CycleOutOfOrder { date: NaiveDate, last: NaiveDate },

    #[error("persistence error at {path}: {reason}")]
    Persistence { path: String, reason: String },

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_context() {
        let err = DiprankerError::InsufficientHistory {
            code: "8306".into(),
            bars: 12,
            minimum: 26,
        };
        assert_eq!(
            err.to_string(),
            "insufficient history for 8306: have 12 bars, need 26"
        );
    }

    #[test]
    fn out_of_order_message_names_both_dates() {
        let err = DiprankerError::CycleOutOfOrder {
            date: NaiveDate::from_ymd_opt(2025, 3, 3).unwrap(),
            last: NaiveDate::from_ymd_opt(2025, 3, 4).unwrap(),
        };
        let msg = err.to_string();
        assert!(msg.contains("2025-03-03"));
        assert!(msg.contains("2025-03-04"));
    }
}
