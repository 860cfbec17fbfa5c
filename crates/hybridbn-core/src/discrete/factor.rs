//! Discrete factors: non-negative tables over a set of discrete keys.

use std::fmt;

use rustc_hash::FxHashSet;
#[cfg(feature = "tracing")]
use tracing::debug;

use crate::config::InferenceConfig;
use crate::discrete::algebraic::AlgebraicDecisionTree;
use crate::discrete::decision_tree::DecisionTree;
use crate::discrete::key::{canonical_keys, format_key, Assignments, DiscreteKey, DiscreteValues};
use crate::errors::{HybridError, Result};

/// Non-negative table over discrete keys.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscreteFactor {
    keys: Vec<DiscreteKey>,
    table: AlgebraicDecisionTree,
}

impl DiscreteFactor {
    /// Wraps a table. `keys` must include every label of the table.
    pub fn new(keys: &[DiscreteKey], table: AlgebraicDecisionTree) -> Result<Self> {
        let keys = canonical_keys(keys.iter().copied())?;
        for label in table.keys() {
            if !keys.contains(&label) {
                return Err(HybridError::Validation(format!(
                    "table branches on {} which is not a factor key",
                    label
                )));
            }
        }
        Ok(Self { keys, table })
    }

    /// Row-major values over `keys` (first key most significant).
    pub fn from_values(keys: &[DiscreteKey], values: Vec<f64>) -> Result<Self> {
        if let Some(bad) = values.iter().find(|v| !(v.is_finite() && **v >= 0.0)) {
            return Err(HybridError::Validation(format!(
                "discrete factor values must be finite and non-negative, got {}",
                bad
            )));
        }
        let table = DecisionTree::from_values(keys, values)?;
        Self::new(keys, table)
    }

    /// A factor with no keys and a single value.
    pub fn constant(value: f64) -> Self {
        Self {
            keys: Vec::new(),
            table: DecisionTree::leaf(value),
        }
    }

    pub fn keys(&self) -> &[DiscreteKey] {
        &self.keys
    }

    pub fn table(&self) -> &AlgebraicDecisionTree {
        &self.table
    }

    /// Value at an assignment covering this factor's keys.
    pub fn value(&self, values: &DiscreteValues) -> Result<f64> {
        self.table.get(values).copied()
    }

    /// `-ln` of the table, pointwise.
    pub fn error_tree(&self) -> AlgebraicDecisionTree {
        self.table.map(|p| -p.ln())
    }

    /// Pointwise product over the union of keys.
    pub fn product(&self, other: &DiscreteFactor) -> Result<DiscreteFactor> {
        let keys = canonical_keys(self.keys.iter().chain(other.keys.iter()).copied())?;
        Ok(Self {
            keys,
            table: self.table.mul_tree(&other.table)?,
        })
    }

    /// Total mass over every assignment of the factor's keys.
    pub fn sum(&self) -> Result<f64> {
        self.table.sum(&self.keys)
    }

    /// Rescales to unit mass.
    pub fn normalize(&self) -> Result<DiscreteFactor> {
        Ok(Self {
            keys: self.keys.clone(),
            table: self.table.normalize(&self.keys)?,
        })
    }

    /// Number of assignments with strictly positive value.
    pub fn nr_nonzero(&self) -> usize {
        Assignments::new(&self.keys)
            .filter(|a| self.table.get(a).map(|v| *v > 0.0).unwrap_or(false))
            .count()
    }

    /// [`DiscreteFactor::prune_with_config`] with the default configuration.
    pub fn prune(&self, max_leaves: usize) -> Result<DiscreteFactor> {
        self.prune_with_config(max_leaves, &InferenceConfig::default())
    }

    /// Keeps the `max_leaves` largest assignments, zeroes the rest and
    /// renormalizes the kept mass.
    ///
    /// Entries clearly above the value at the cutoff are always kept. The
    /// remaining slots go to the entries tied with the cutoff value (within
    /// `tie_tolerance`) in canonical order, so exactly `max_leaves` positive
    /// entries survive whenever more than that are positive.
    pub fn prune_with_config(
        &self,
        max_leaves: usize,
        config: &InferenceConfig,
    ) -> Result<DiscreteFactor> {
        let config = config.validate()?;
        if max_leaves == 0 {
            return Err(HybridError::Validation(
                "prune: max_leaves must be > 0".into(),
            ));
        }
        let mut ranked: Vec<(usize, f64)> = Vec::new();
        for (index, assignment) in Assignments::new(&self.keys).enumerate() {
            let value = *self.table.get(&assignment)?;
            if value > 0.0 {
                ranked.push((index, value));
            }
        }
        if ranked.len() <= max_leaves {
            return self.normalize();
        }
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        let cutoff = ranked[max_leaves - 1].1;
        let mut kept: FxHashSet<usize> = ranked
            .iter()
            .filter(|(_, v)| *v > cutoff && !config.is_tied(*v, cutoff))
            .map(|(idx, _)| *idx)
            .collect();
        let mut tied: Vec<usize> = ranked
            .iter()
            .filter(|(_, v)| config.is_tied(*v, cutoff))
            .map(|(idx, _)| *idx)
            .collect();
        tied.sort_unstable();
        let open = max_leaves - kept.len();
        kept.extend(tied.into_iter().take(open));

        #[cfg(feature = "tracing")]
        debug!(
            positive = ranked.len(),
            kept = kept.len(),
            "pruning discrete factor"
        );

        let mut values = Vec::new();
        for (index, assignment) in Assignments::new(&self.keys).enumerate() {
            let value = if kept.contains(&index) {
                *self.table.get(&assignment)?
            } else {
                0.0
            };
            values.push(value);
        }
        Self::from_values(&self.keys, values)?.normalize()
    }

    pub fn equals(&self, other: &DiscreteFactor, tol: f64) -> bool {
        self.keys == other.keys && self.table.equals(&other.table, tol)
    }
}

impl fmt::Display for DiscreteFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.keys.iter().map(|k| format_key(k.key)).collect();
        writeln!(f, "DiscreteFactor [{}]", names.join(" "))?;
        write!(f, "{}", self.table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dk(key: u64, cardinality: usize) -> DiscreteKey {
        DiscreteKey { key, cardinality }
    }

    #[test]
    fn product_covers_key_union() {
        let a = dk(1, 2);
        let b = dk(2, 2);
        let fa = DiscreteFactor::from_values(&[a], vec![0.2, 0.8]).unwrap();
        let fb = DiscreteFactor::from_values(&[b], vec![0.5, 0.5]).unwrap();
        let prod = fa.product(&fb).unwrap();
        assert_eq!(prod.keys(), &[a, b]);
        let v = prod.value(&DiscreteValues::from([(1, 1), (2, 0)])).unwrap();
        assert!((v - 0.4).abs() < 1e-12);
        assert!((prod.sum().unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn prune_keeps_largest_and_renormalizes() {
        let a = dk(1, 2);
        let b = dk(2, 2);
        let f = DiscreteFactor::from_values(&[a, b], vec![0.1, 0.2, 0.3, 0.4]).unwrap();
        let pruned = f.prune(2).unwrap();
        assert_eq!(pruned.nr_nonzero(), 2);
        let at = |va, vb| pruned.value(&DiscreteValues::from([(1, va), (2, vb)])).unwrap();
        assert_eq!(at(0, 0), 0.0);
        assert_eq!(at(0, 1), 0.0);
        assert!((at(1, 0) - 3.0 / 7.0).abs() < 1e-12);
        assert!((at(1, 1) - 4.0 / 7.0).abs() < 1e-12);
    }

    #[test]
    fn prune_tie_at_cutoff_keeps_canonically_first() {
        let a = dk(1, 3);
        let f = DiscreteFactor::from_values(&[a], vec![0.25, 0.25, 0.5]).unwrap();
        let pruned = f.prune(2).unwrap();
        let at = |v| pruned.value(&DiscreteValues::from([(1, v)])).unwrap();
        assert!(at(0) > 0.0);
        assert_eq!(at(1), 0.0);
        assert!(at(2) > 0.0);
    }

    #[test]
    fn prune_near_tie_follows_tie_tolerance() {
        let f = DiscreteFactor::from_values(&[dk(1, 3)], vec![0.3, 0.3 + 1e-13, 0.4 - 1e-13]).unwrap();
        let at = |p: &DiscreteFactor, v| p.value(&DiscreteValues::from([(1, v)])).unwrap();

        let pruned = f.prune(2).unwrap();
        assert!(at(&pruned, 0) > 0.0);
        assert_eq!(at(&pruned, 1), 0.0);
        assert!(at(&pruned, 2) > 0.0);

        let exact = InferenceConfig {
            tie_tolerance: 0.0,
            ..InferenceConfig::default()
        };
        let pruned = f.prune_with_config(2, &exact).unwrap();
        assert_eq!(at(&pruned, 0), 0.0);
        assert!(at(&pruned, 1) > 0.0);
        assert!(at(&pruned, 2) > 0.0);
    }

    #[test]
    fn prune_rejects_invalid_config() {
        let f = DiscreteFactor::from_values(&[dk(1, 2)], vec![0.5, 0.5]).unwrap();
        let bad = InferenceConfig {
            tie_tolerance: f64::NAN,
            ..InferenceConfig::default()
        };
        assert!(matches!(f.prune_with_config(1, &bad), Err(HybridError::Validation(_))));
    }

    #[test]
    fn prune_rejects_zero_budget() {
        let f = DiscreteFactor::from_values(&[dk(1, 2)], vec![0.5, 0.5]).unwrap();
        assert!(matches!(f.prune(0), Err(HybridError::Validation(_))));
    }

    #[test]
    fn rejects_negative_values() {
        assert!(DiscreteFactor::from_values(&[dk(1, 2)], vec![-0.1, 1.1]).is_err());
    }
}
