//! Discrete conditionals `P(frontals | parents)` stored as decision trees.
//!
//! Rows can be written with signature strings: `"1/3"` for a prior over a
//! binary key, `"1/3 2/2"` for a binary key with one binary parent. Rows are
//! ordered row-major over the parents (first parent most significant) and each
//! row is normalized independently.

use std::fmt;

use rand::Rng;

use crate::discrete::algebraic::AlgebraicDecisionTree;
use crate::discrete::decision_tree::DecisionTree;
use crate::discrete::factor::DiscreteFactor;
use crate::discrete::key::{
    assignment_count, canonical_keys, format_key, restrict, Assignments, DiscreteKey,
    DiscreteValues,
};
use crate::errors::{HybridError, Result};

/// Conditional probability table over discrete keys.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscreteConditional {
    frontals: Vec<DiscreteKey>,
    parents: Vec<DiscreteKey>,
    table: AlgebraicDecisionTree,
}

impl DiscreteConditional {
    /// Builds `P(frontal | parents)` from a signature string.
    pub fn from_signature(
        frontal: DiscreteKey,
        parents: &[DiscreteKey],
        signature: &str,
    ) -> Result<Self> {
        let mut weights = Vec::new();
        for row in signature.split_whitespace() {
            let parsed = row
                .split('/')
                .map(|w| {
                    w.trim().parse::<f64>().map_err(|e| {
                        HybridError::Validation(format!("bad weight {:?} in {:?}: {}", w, row, e))
                    })
                })
                .collect::<Result<Vec<f64>>>()?;
            if parsed.len() != frontal.cardinality {
                return Err(HybridError::Validation(format!(
                    "row {:?} has {} weights, {} expects {}",
                    row,
                    parsed.len(),
                    format_key(frontal.key),
                    frontal.cardinality
                )));
            }
            weights.extend(parsed);
        }
        Self::from_weights(frontal, parents, &weights)
    }

    /// Builds `P(frontal | parents)` from row-major weights, one row of
    /// `frontal.cardinality` entries per parent assignment.
    pub fn from_weights(frontal: DiscreteKey, parents: &[DiscreteKey], weights: &[f64]) -> Result<Self> {
        let rows = assignment_count(parents);
        let expected = rows * frontal.cardinality;
        if weights.len() != expected {
            return Err(HybridError::Validation(format!(
                "conditional on {} needs {} weights, got {}",
                format_key(frontal.key),
                expected,
                weights.len()
            )));
        }
        let mut normalized = Vec::with_capacity(expected);
        for row in weights.chunks(frontal.cardinality) {
            if row.iter().any(|w| !(w.is_finite() && *w >= 0.0)) {
                return Err(HybridError::Validation(format!(
                    "weights must be finite and non-negative: {:?}",
                    row
                )));
            }
            let total: f64 = row.iter().sum();
            if total <= 0.0 {
                return Err(HybridError::Validation(format!(
                    "row {:?} has no mass",
                    row
                )));
            }
            normalized.extend(row.iter().map(|w| w / total));
        }
        let mut order = parents.to_vec();
        order.push(frontal);
        let table = DecisionTree::from_values(&order, normalized)?;
        Self::new(vec![frontal], parents.to_vec(), table)
    }

    /// Joint distribution with no parents from a (not necessarily normalized)
    /// factor.
    pub fn from_joint(factor: &DiscreteFactor) -> Result<Self> {
        let normalized = factor.normalize()?;
        Self::new(
            normalized.keys().to_vec(),
            Vec::new(),
            normalized.table().clone(),
        )
    }

    /// Wraps an already normalized table.
    pub fn new(
        frontals: Vec<DiscreteKey>,
        parents: Vec<DiscreteKey>,
        table: AlgebraicDecisionTree,
    ) -> Result<Self> {
        if frontals.is_empty() {
            return Err(HybridError::Validation(
                "discrete conditional needs at least one frontal key".into(),
            ));
        }
        let all = canonical_keys(frontals.iter().chain(parents.iter()).copied())?;
        if all.len() != frontals.len() + parents.len() {
            return Err(HybridError::Validation(
                "frontal and parent keys must be distinct".into(),
            ));
        }
        for label in table.keys() {
            if !all.contains(&label) {
                return Err(HybridError::Validation(format!(
                    "table branches on {} which is not a key of the conditional",
                    label
                )));
            }
        }
        Ok(Self {
            frontals,
            parents,
            table,
        })
    }

    pub fn frontals(&self) -> &[DiscreteKey] {
        &self.frontals
    }

    pub fn parents(&self) -> &[DiscreteKey] {
        &self.parents
    }

    /// Frontal keys followed by parent keys.
    pub fn keys(&self) -> Vec<DiscreteKey> {
        self.frontals
            .iter()
            .chain(self.parents.iter())
            .copied()
            .collect()
    }

    pub fn table(&self) -> &AlgebraicDecisionTree {
        &self.table
    }

    /// `P(frontals | parents)` at `values`.
    pub fn probability(&self, values: &DiscreteValues) -> Result<f64> {
        self.table.get(values).copied()
    }

    pub fn log_probability(&self, values: &DiscreteValues) -> Result<f64> {
        Ok(self.probability(values)?.ln())
    }

    /// `-ln P`, non-negative.
    pub fn error(&self, values: &DiscreteValues) -> Result<f64> {
        Ok(-self.log_probability(values)?)
    }

    /// `-ln P` as a tree over this conditional's keys.
    pub fn error_tree(&self) -> AlgebraicDecisionTree {
        self.table.map(|p| -p.ln())
    }

    /// The table as a discrete factor.
    pub fn to_factor(&self) -> Result<DiscreteFactor> {
        DiscreteFactor::new(&self.keys(), self.table.clone())
    }

    /// Draws the frontal values given the parents.
    ///
    /// Frontals already present in `values` are held fixed and only the
    /// remaining ones are drawn and returned.
    pub fn sample<R: Rng + ?Sized>(
        &self,
        values: &DiscreteValues,
        rng: &mut R,
    ) -> Result<DiscreteValues> {
        let mut fixed = restrict(values, &self.parents)?;
        let mut free = Vec::new();
        for dk in &self.frontals {
            if values.contains_key(&dk.key) {
                fixed.insert(dk.key, dk.value_in(values)?);
            } else {
                free.push(*dk);
            }
        }
        let row = self.table.restrict(&fixed)?;
        let frontals = canonical_keys(free)?;
        let outcomes: Vec<(DiscreteValues, f64)> = Assignments::new(&frontals)
            .map(|a| row.get(&a).map(|p| (a.clone(), *p)))
            .collect::<Result<_>>()?;
        let total: f64 = outcomes.iter().map(|(_, p)| p).sum();
        if !(total > 0.0) {
            return Err(HybridError::DegenerateAssignment(
                "cannot sample from a row with no mass".into(),
            ));
        }
        let mut u = rng.gen::<f64>() * total;
        for (assignment, p) in &outcomes {
            if u < *p {
                return Ok(assignment.clone());
            }
            u -= p;
        }
        // Rounding can leave u just above the last bucket.
        outcomes
            .iter()
            .rev()
            .find(|(_, p)| *p > 0.0)
            .map(|(a, _)| a.clone())
            .ok_or_else(|| HybridError::DegenerateAssignment("empty row".into()))
    }

    pub fn equals(&self, other: &DiscreteConditional, tol: f64) -> bool {
        self.frontals == other.frontals
            && self.parents == other.parents
            && self.table.equals(&other.table, tol)
    }
}

impl fmt::Display for DiscreteConditional {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let frontals: Vec<String> = self.frontals.iter().map(|k| format_key(k.key)).collect();
        let parents: Vec<String> = self.parents.iter().map(|k| format_key(k.key)).collect();
        if parents.is_empty() {
            writeln!(f, "P( {} ):", frontals.join(" "))?;
        } else {
            writeln!(f, "P( {} | {} ):", frontals.join(" "), parents.join(" "))?;
        }
        write!(f, "{}", self.table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn dk(key: u64, cardinality: usize) -> DiscreteKey {
        DiscreteKey { key, cardinality }
    }

    #[test]
    fn signature_rows_are_normalized() {
        let m = dk(1, 2);
        let c = DiscreteConditional::from_signature(m, &[], "1/3").unwrap();
        assert!((c.probability(&DiscreteValues::from([(1, 1)])).unwrap() - 0.75).abs() < 1e-12);
        assert!((c.error(&DiscreteValues::from([(1, 0)])).unwrap() - 4f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn signature_with_parent_is_row_major() {
        let a = dk(1, 2);
        let b = dk(2, 2);
        let c = DiscreteConditional::from_signature(a, &[b], "1/1 1/3").unwrap();
        let p = |va, vb| c.probability(&DiscreteValues::from([(1, va), (2, vb)])).unwrap();
        assert!((p(0, 0) - 0.5).abs() < 1e-12);
        assert!((p(1, 1) - 0.75).abs() < 1e-12);
    }

    #[test]
    fn malformed_signatures_are_rejected() {
        let a = dk(1, 2);
        assert!(DiscreteConditional::from_signature(a, &[], "1/2/3").is_err());
        assert!(DiscreteConditional::from_signature(a, &[], "x/2").is_err());
        assert!(DiscreteConditional::from_signature(a, &[dk(2, 2)], "1/2").is_err());
        assert!(DiscreteConditional::from_signature(a, &[], "0/0").is_err());
    }

    #[test]
    fn sampling_follows_row() {
        let a = dk(1, 2);
        let b = dk(2, 2);
        let c = DiscreteConditional::from_signature(a, &[b], "1/0 0/1").unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..20 {
            let s = c.sample(&DiscreteValues::from([(2, 1)]), &mut rng).unwrap();
            assert_eq!(s[&1], 1);
        }
        assert_eq!(
            c.sample(&DiscreteValues::new(), &mut rng),
            Err(HybridError::MissingAssignment { key: 2 })
        );
    }

    #[test]
    fn sampling_holds_given_frontals_fixed() {
        let a = dk(1, 2);
        let b = dk(2, 2);
        // Joint with all mass on a == b.
        let joint =
            DiscreteFactor::from_values(&[a, b], vec![0.5, 0.0, 0.0, 0.5]).unwrap();
        let c = DiscreteConditional::from_joint(&joint).unwrap();
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..10 {
            let s = c.sample(&DiscreteValues::from([(1, 1)]), &mut rng).unwrap();
            assert_eq!(s, DiscreteValues::from([(2, 1)]));
        }
    }

    #[test]
    fn display_names_frontals_and_parents() {
        let a = dk(1, 2);
        let b = dk(2, 2);
        let c = DiscreteConditional::from_signature(a, &[b], "1/1 1/3").unwrap();
        assert!(c.to_string().starts_with("P( 1 | 2 ):"));
    }
}
