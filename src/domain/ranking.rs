//! Universe compilation, sector-relative adjustment and ranking.

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::code_data::CodeData;
use crate::domain::error::DiprankerError;
use crate::domain::indicator::{IndicatorSnapshot, compile_snapshot, round_dp};
use crate::domain::instrument::Instrument;
use crate::domain::scoring;
use crate::domain::weights::WeightVector;

pub const DEFAULT_TOP_K: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredCandidate {
    pub snapshot: IndicatorSnapshot,
    pub score: f64,
    pub as_of: NaiveDate,
}

impl ScoredCandidate {
    pub fn code(&self) -> &str {
        &self.snapshot.code
    }
}

/// Scored universe for one date, best first.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Ranking {
    pub as_of: Option<NaiveDate>,
    pub candidates: Vec<ScoredCandidate>,
}

impl Ranking {
    pub fn top_k(&self, k: usize) -> &[ScoredCandidate] {
        &self.candidates[..k.min(self.candidates.len())]
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn get(&self, code: &str) -> Option<&ScoredCandidate> {
        self.candidates.iter().find(|c| c.code() == code)
    }
}

/// Compile snapshots for every instrument with usable history on `as_of`.
///
/// Instruments are visited in the order of `instruments`. Ineligible ones
/// (short history, no bar on the date, no data) are skipped and logged.
pub fn compile_universe(
    instruments: &[Instrument],
    code_data: &HashMap<String, CodeData>,
    as_of: NaiveDate,
) -> Vec<IndicatorSnapshot> {
    let mut snapshots = Vec::with_capacity(instruments.len());
    for instrument in instruments {
        let Some(data) = code_data.get(&instrument.code) else {
            debug!(code = %instrument.code, %as_of, "no bar history, skipping");
            continue;
        };
        match compile_snapshot(instrument, &data.ohlcv, as_of) {
            Ok(snapshot) => snapshots.push(snapshot),
            Err(DiprankerError::InsufficientHistory { code, bars, minimum }) => {
                debug!(%code, bars, minimum, %as_of, "ineligible: insufficient history");
            }
            Err(err) => {
                debug!(code = %instrument.code, %as_of, error = %err, "skipping instrument");
            }
        }
    }
    snapshots
}

/// Fill `sector_ret5` and `ret5_vs_sector` from each sector's eligible members.
pub fn apply_sector_relative(snapshots: &mut [IndicatorSnapshot]) {
    let mut sums: HashMap<String, (f64, usize)> = HashMap::new();
    for snap in snapshots.iter() {
        let entry = sums.entry(snap.sector.clone()).or_insert((0.0, 0));
        entry.0 += snap.ret5;
        entry.1 += 1;
    }

    let averages: HashMap<String, f64> = sums
        .into_iter()
        .map(|(sector, (sum, n))| (sector, round_dp(sum / n as f64, 2)))
        .collect();

    for snap in snapshots.iter_mut() {
        let avg = averages.get(&snap.sector).copied().unwrap_or(0.0);
        snap.sector_ret5 = avg;
        snap.ret5_vs_sector = round_dp(snap.ret5 - avg, 2);
    }
}

/// Score and rank snapshots. Equal scores keep their input order.
pub fn rank(snapshots: Vec<IndicatorSnapshot>, weights: &WeightVector) -> Ranking {
    let as_of = snapshots.first().map(|s| s.as_of);
    let mut candidates: Vec<ScoredCandidate> = snapshots
        .into_iter()
        .map(|snapshot| ScoredCandidate {
            score: scoring::score(&snapshot, weights),
            as_of: snapshot.as_of,
            snapshot,
        })
        .collect();
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
    Ranking { as_of, candidates }
}

/// Compile, adjust and rank the whole universe as of `as_of`.
pub fn rank_universe(
    instruments: &[Instrument],
    code_data: &HashMap<String, CodeData>,
    as_of: NaiveDate,
    weights: &WeightVector,
) -> Ranking {
    let mut snapshots = compile_universe(instruments, code_data, as_of);
    apply_sector_relative(&mut snapshots);
    let mut ranking = rank(snapshots, weights);
    ranking.as_of = Some(as_of);
    ranking
}
