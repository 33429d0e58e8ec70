//! Factor weight vector.
//!
//! Serialized as a flat `{"w_dividend": 20.0, ...}` object. Loading rejects
//! unknown factor names and out-of-bound values; missing factors take their
//! default weight.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::error::DiprankerError;
use crate::domain::factor::Factor;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<Factor, f64>", into = "BTreeMap<Factor, f64>")]
pub struct WeightVector {
    weights: BTreeMap<Factor, f64>,
}

impl Default for WeightVector {
    fn default() -> Self {
        let weights = Factor::ALL
            .into_iter()
            .map(|f| (f, f.default_weight()))
            .collect();
        WeightVector { weights }
    }
}

impl WeightVector {
    /// Build from a partial mapping, filling gaps with defaults and checking bounds.
    pub fn from_partial(partial: BTreeMap<Factor, f64>) -> Result<Self, DiprankerError> {
        let mut vector = WeightVector::default();
        for (factor, weight) in partial {
            vector.weights.insert(factor, weight);
        }
        vector.validate()?;
        Ok(vector)
    }

    pub fn get(&self, factor: Factor) -> f64 {
        self.weights
            .get(&factor)
            .copied()
            .unwrap_or_else(|| factor.default_weight())
    }

    /// Set a weight, clipping it into the factor's bounds.
    pub fn set_clipped(&mut self, factor: Factor, weight: f64) -> f64 {
        let clipped = factor.clip(weight);
        self.weights.insert(factor, clipped);
        clipped
    }

    pub fn iter(&self) -> impl Iterator<Item = (Factor, f64)> + '_ {
        self.weights.iter().map(|(f, w)| (*f, *w))
    }

    pub fn validate(&self) -> Result<(), DiprankerError> {
        for (factor, weight) in self.iter() {
            if !factor.in_bounds(weight) {
                let (lo, hi) = factor.bounds();
                return Err(DiprankerError::InvariantViolation {
                    reason: format!("weight {factor} = {weight} outside [{lo}, {hi}]"),
                });
            }
        }
        Ok(())
    }
}

impl TryFrom<BTreeMap<Factor, f64>> for WeightVector {
    type Error = DiprankerError;

    fn try_from(map: BTreeMap<Factor, f64>) -> Result<Self, Self::Error> {
        WeightVector::from_partial(map)
    }
}

impl From<WeightVector> for BTreeMap<Factor, f64> {
    fn from(vector: WeightVector) -> Self {
        vector.weights
    }
}
