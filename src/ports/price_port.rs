//! Latest-price port and the deadline-bounded batch fetch.

use crate::domain::quote::{PriceBatch, PriceError};
use chrono::NaiveDate;
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub trait PriceFeed {
    /// Latest price for `code` as seen on `as_of`.
    fn fetch_price(&self, code: &str, as_of: NaiveDate) -> Result<f64, PriceError>;
}

/// Fetch every code concurrently, one worker per code, and collect whatever
/// answers before `timeout` elapses. Late codes are marked `TimedOut`; their
/// workers are left to finish and their answers are discarded.
pub fn fetch_batch(
    feed: Arc<dyn PriceFeed + Send + Sync>,
    codes: &[String],
    as_of: NaiveDate,
    timeout: Duration,
) -> PriceBatch {
    let mut batch = PriceBatch::new(as_of);
    if codes.is_empty() {
        return batch;
    }

    let deadline = Instant::now() + timeout;
    let (tx, rx) = mpsc::channel::<(String, Result<f64, PriceError>)>();
    let mut pending = 0usize;

    for code in codes {
        let feed = Arc::clone(&feed);
        let tx = tx.clone();
        let worker_code = code.clone();
        let spawned = thread::Builder::new()
            .name(format!("price-{code}"))
            .spawn(move || {
                let quote = feed.fetch_price(&worker_code, as_of);
                let _ = tx.send((worker_code, quote));
            });
        match spawned {
            Ok(_) => pending += 1,
            Err(e) => {
                warn!(%code, error = %e, "failed to spawn price worker");
                batch.insert(code.clone(), Err(PriceError::Unavailable(e.to_string())));
            }
        }
    }
    drop(tx);

    while pending > 0 {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(remaining) {
            Ok((code, quote)) => {
                pending -= 1;
                if let Err(e) = &quote {
                    debug!(%code, error = %e, "price fetch failed");
                }
                batch.insert(code, quote);
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    for code in codes {
        if !batch.quotes.contains_key(code) {
            batch.insert(code.clone(), Err(PriceError::TimedOut));
        }
    }

    batch
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct StubFeed {
        prices: HashMap<String, f64>,
        slow: Vec<String>,
    }

    impl PriceFeed for StubFeed {
        fn fetch_price(&self, code: &str, _as_of: NaiveDate) -> Result<f64, PriceError> {
            if self.slow.iter().any(|c| c == code) {
                thread::sleep(Duration::from_millis(500));
            }
            self.prices
                .get(code)
                .copied()
                .ok_or_else(|| PriceError::Unavailable(format!("no quote for {code}")))
        }
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 7, 1).unwrap()
    }

    #[test]
    fn collects_successes_and_failures() {
        let feed = Arc::new(StubFeed {
            prices: HashMap::from([("A".to_string(), 100.0), ("B".to_string(), 200.0)]),
            slow: vec![],
        });
        let codes = vec!["A".to_string(), "B".to_string(), "C".to_string()];
        let batch = fetch_batch(feed, &codes, day(), Duration::from_secs(5));

        assert_eq!(batch.price("A"), Some(100.0));
        assert_eq!(batch.price("B"), Some(200.0));
        assert!(matches!(batch.quotes.get("C"), Some(Err(PriceError::Unavailable(_)))));
        assert_eq!(batch.as_of, Some(day()));
    }

    #[test]
    fn slow_codes_time_out() {
        let feed = Arc::new(StubFeed {
            prices: HashMap::from([("A".to_string(), 100.0), ("S".to_string(), 1.0)]),
            slow: vec!["S".to_string()],
        });
        let codes = vec!["A".to_string(), "S".to_string()];
        let batch = fetch_batch(feed, &codes, day(), Duration::from_millis(100));

        assert_eq!(batch.price("A"), Some(100.0));
        assert_eq!(batch.quotes.get("S"), Some(&Err(PriceError::TimedOut)));
        assert_eq!(batch.failed_codes(), vec!["S".to_string()]);
    }

    #[test]
    fn empty_code_list_returns_empty_batch() {
        let feed = Arc::new(StubFeed {
            prices: HashMap::new(),
            slow: vec![],
        });
        let batch = fetch_batch(feed, &[], day(), Duration::from_millis(10));
        assert!(batch.quotes.is_empty());
    }
}
