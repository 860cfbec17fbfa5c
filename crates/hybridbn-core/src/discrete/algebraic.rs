//! Real-valued decision trees.
//!
//! [`AlgebraicDecisionTree`] is the scalar instantiation of
//! [`DecisionTree`]: error trees, log-probability trees and probability tables
//! are all of this type.

use std::ops::Neg;

use crate::config::InferenceConfig;
use crate::discrete::decision_tree::DecisionTree;
use crate::discrete::key::{canonical_keys, Assignments, DiscreteKey, DiscreteValues};
use crate::errors::Result;

/// Decision tree with `f64` leaves.
pub type AlgebraicDecisionTree = DecisionTree<f64>;

impl DecisionTree<f64> {
    /// Adds a constant to every leaf.
    pub fn add_scalar(&self, c: f64) -> Self {
        self.map(|v| v + c)
    }

    /// Pointwise sum over the union of both trees' keys.
    pub fn add_tree(&self, other: &Self) -> Result<Self> {
        self.apply(other, |a, b| a + b)
    }

    /// Pointwise product over the union of both trees' keys.
    pub fn mul_tree(&self, other: &Self) -> Result<Self> {
        self.apply(other, |a, b| a * b)
    }

    /// Multiplies every leaf by a constant.
    pub fn scale(&self, c: f64) -> Self {
        self.map(|v| v * c)
    }

    /// Pointwise `exp`.
    pub fn exp(&self) -> Self {
        self.map(|v| v.exp())
    }

    /// Pointwise natural log; zero leaves become `-inf`.
    pub fn ln(&self) -> Self {
        self.map(|v| v.ln())
    }

    /// Sum over every joint assignment of `domain`.
    ///
    /// The tree's own labels are always part of the domain. A leaf reached
    /// without branching on some domain key stands for every value of that
    /// key and is counted once per value, so a constant tree over two binary
    /// keys sums to four times its leaf.
    pub fn sum(&self, domain: &[DiscreteKey]) -> Result<f64> {
        let keys = canonical_keys(domain.iter().chain(self.keys().iter()).copied())?;
        let mut total = 0.0;
        self.for_each_leaf(|path, v| {
            let unbranched: usize = keys
                .iter()
                .filter(|dk| !path.contains_key(&dk.key))
                .map(|dk| dk.cardinality)
                .product();
            total += v * unbranched as f64;
        });
        Ok(total)
    }

    /// Largest leaf value; `-inf` never occurs for a non-empty tree unless
    /// every leaf is `-inf`.
    pub fn max(&self) -> f64 {
        self.leaves()
            .into_iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max)
    }

    /// Smallest leaf value.
    pub fn min(&self) -> f64 {
        self.leaves().into_iter().copied().fold(f64::INFINITY, f64::min)
    }

    /// Scales leaves so that the sum over `domain` is one. A zero-mass tree is
    /// returned unchanged.
    pub fn normalize(&self, domain: &[DiscreteKey]) -> Result<Self> {
        let total = self.sum(domain)?;
        if total > 0.0 && total.is_finite() {
            Ok(self.scale(1.0 / total))
        } else {
            Ok(self.clone())
        }
    }

    /// Maps log-values to probabilities normalized over `domain`, subtracting
    /// the maximum first for stability.
    pub fn softmax_from_log(&self, domain: &[DiscreteKey]) -> Result<Self> {
        let max = self.max();
        if !max.is_finite() {
            return Ok(self.map(|_| 0.0));
        }
        self.map(|v| (v - max).exp()).normalize(domain)
    }

    /// Assignment maximizing the tree over `keys`, with ties broken by
    /// canonical enumeration order.
    ///
    /// `keys` must cover the tree's labels; extra keys are enumerated too.
    /// Returns `None` when every value is non-finite or the tree is `-inf`
    /// everywhere.
    pub fn argmax(
        &self,
        keys: &[DiscreteKey],
        config: &InferenceConfig,
    ) -> Result<Option<(DiscreteValues, f64)>> {
        let keys = canonical_keys(keys.iter().chain(self.keys().iter()).copied())?;
        let mut best: Option<(DiscreteValues, f64)> = None;
        for assignment in Assignments::new(&keys) {
            let value = *self.get(&assignment)?;
            if value.is_nan() || value == f64::NEG_INFINITY {
                continue;
            }
            let better = match &best {
                None => true,
                Some((_, current)) => value > *current && !config.is_tied(value, *current),
            };
            if better {
                best = Some((assignment, value));
            }
        }
        Ok(best)
    }

    /// Tolerant equality: same shape and labels, leaves within `tol`.
    pub fn equals(&self, other: &Self, tol: f64) -> bool {
        self.equals_with(other, |a, b| approx_eq(*a, *b, tol))
    }
}

pub(crate) fn approx_eq(a: f64, b: f64, tol: f64) -> bool {
    if a == b {
        return true;
    }
    (a - b).abs() <= tol
}

impl Neg for &DecisionTree<f64> {
    type Output = DecisionTree<f64>;

    fn neg(self) -> Self::Output {
        self.map(|v| -v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dk(key: u64, cardinality: usize) -> DiscreteKey {
        DiscreteKey { key, cardinality }
    }

    #[test]
    fn sum_counts_collapsed_leaves_per_value() {
        let a = dk(1, 2);
        let b = dk(2, 3);
        // Collapses onto b; a only counts when it is part of the domain.
        let t = DecisionTree::from_values(&[a, b], vec![1.0, 2.0, 3.0, 1.0, 2.0, 3.0]).unwrap();
        assert_eq!(t.keys(), vec![b]);
        assert_eq!(t.sum(&[]).unwrap(), 6.0);
        assert_eq!(t.sum(&[a, b]).unwrap(), 12.0);

        let t = DecisionTree::from_values(&[a, b], vec![1.0, 1.0, 1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(t.sum(&[a, b]).unwrap(), 12.0);

        let constant = DecisionTree::leaf(0.5);
        assert_eq!(constant.sum(&[a]).unwrap(), 1.0);
    }

    #[test]
    fn normalize_makes_mass_one() {
        let a = dk(1, 2);
        let t = DecisionTree::from_values(&[a], vec![1.0, 3.0])
            .unwrap()
            .normalize(&[a])
            .unwrap();
        assert!((t.get(&DiscreteValues::from([(1, 1)])).unwrap() - 0.75).abs() < 1e-12);
        assert!((t.sum(&[a]).unwrap() - 1.0).abs() < 1e-12);

        // A uniform table collapses to a leaf but still normalizes per value.
        let uniform = DecisionTree::leaf(2.0).normalize(&[a]).unwrap();
        assert_eq!(*uniform.get(&DiscreteValues::new()).unwrap(), 0.5);
    }

    #[test]
    fn softmax_from_log_matches_direct_normalization() {
        let a = dk(1, 2);
        let logs = DecisionTree::from_values(&[a], vec![(0.25f64).ln(), (0.75f64).ln()]).unwrap();
        let p = logs.softmax_from_log(&[a]).unwrap();
        assert!((p.get(&DiscreteValues::from([(1, 0)])).unwrap() - 0.25).abs() < 1e-12);
    }

    #[test]
    fn argmax_breaks_ties_by_canonical_order() {
        let a = dk(1, 2);
        let b = dk(2, 2);
        let config = InferenceConfig::default();
        let t = DecisionTree::from_values(&[a, b], vec![0.1, 0.4, 0.4, 0.1]).unwrap();
        let (best, value) = t.argmax(&[a, b], &config).unwrap().unwrap();
        assert_eq!(best, DiscreteValues::from([(1, 0), (2, 1)]));
        assert_eq!(value, 0.4);

        // Near-ties within tolerance keep the earlier assignment.
        let t = DecisionTree::from_values(&[a], vec![0.5, 0.5 + 1e-15]).unwrap();
        let (best, _) = t.argmax(&[a], &config).unwrap().unwrap();
        assert_eq!(best, DiscreteValues::from([(1, 0)]));
    }

    #[test]
    fn argmax_of_all_neg_infinity_is_none() {
        let a = dk(1, 2);
        let t = DecisionTree::from_values(&[a], vec![f64::NEG_INFINITY; 2]).unwrap();
        assert!(t.argmax(&[a], &InferenceConfig::default()).unwrap().is_none());
    }

    #[test]
    fn operators_apply_over_union() {
        let a = dk(1, 2);
        let b = dk(2, 2);
        let ta = DecisionTree::from_values(&[a], vec![1.0, 2.0]).unwrap();
        let tb = DecisionTree::from_values(&[b], vec![10.0, 20.0]).unwrap();
        let sum = ta.add_tree(&tb).unwrap();
        assert_eq!(*sum.get(&DiscreteValues::from([(1, 1), (2, 1)])).unwrap(), 22.0);
        let prod = ta.mul_tree(&tb).unwrap();
        assert_eq!(*prod.get(&DiscreteValues::from([(1, 1), (2, 0)])).unwrap(), 20.0);
        let neg = -&ta;
        assert_eq!(*neg.get(&DiscreteValues::from([(1, 0)])).unwrap(), -1.0);
    }

    #[test]
    fn tolerant_equality_compares_leaves_within_tol() {
        let a = dk(1, 2);
        let t1 = DecisionTree::from_values(&[a], vec![1.0, 2.0]).unwrap();
        let t2 = DecisionTree::from_values(&[a], vec![1.0 + 1e-12, 2.0]).unwrap();
        assert!(t1.equals(&t2, 1e-9));
        assert!(!t1.equals(&t2, 1e-15));
    }
}
