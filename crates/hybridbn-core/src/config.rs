//! Tunables shared by MPE selection, pruning, elimination and sampling.

use crate::errors::{HybridError, Result};

/// Configuration for inference queries on hybrid Bayes nets and factor graphs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InferenceConfig {
    /// Relative tolerance under which two posterior values count as tied.
    ///
    /// Ties are resolved in favor of the earliest assignment in canonical
    /// enumeration order.
    pub tie_tolerance: f64,
    /// Minimum absolute diagonal entry of an upper-triangular factor before the
    /// system is declared rank deficient.
    pub rank_tolerance: f64,
    /// Seed of the thread-local default sampling stream.
    pub default_seed: u64,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            tie_tolerance: 1e-9,
            rank_tolerance: 1e-10,
            default_seed: 42,
        }
    }
}

impl InferenceConfig {
    /// Checks that every tolerance is finite and non-negative.
    pub fn validate(self) -> Result<Self> {
        if !self.tie_tolerance.is_finite() || self.tie_tolerance < 0.0 {
            return Err(HybridError::Validation(
                "tie_tolerance must be finite and >= 0".into(),
            ));
        }
        if !self.rank_tolerance.is_finite() || self.rank_tolerance <= 0.0 {
            return Err(HybridError::Validation(
                "rank_tolerance must be finite and > 0".into(),
            ));
        }
        Ok(self)
    }

    /// Whether `candidate` is tied with `best` under the relative tie tolerance.
    pub(crate) fn is_tied(&self, candidate: f64, best: f64) -> bool {
        let scale = candidate.abs().max(best.abs()).max(f64::MIN_POSITIVE);
        (candidate - best).abs() <= self.tie_tolerance * scale
    }
}
