//! Joint continuous and discrete assignments.

use std::fmt;

use nalgebra::DVector;

use crate::discrete::key::{format_assignment, Key};
use crate::discrete::DiscreteValues;
use crate::errors::{HybridError, Result};
use crate::linear::VectorValues;

/// A continuous assignment paired with a discrete assignment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HybridValues {
    continuous: VectorValues,
    discrete: DiscreteValues,
}

impl HybridValues {
    pub fn new(continuous: VectorValues, discrete: DiscreteValues) -> Self {
        Self {
            continuous,
            discrete,
        }
    }

    pub fn continuous(&self) -> &VectorValues {
        &self.continuous
    }

    pub fn discrete(&self) -> &DiscreteValues {
        &self.discrete
    }

    pub fn into_parts(self) -> (VectorValues, DiscreteValues) {
        (self.continuous, self.discrete)
    }

    pub fn at(&self, key: Key) -> Result<&DVector<f64>> {
        self.continuous.at(key)
    }

    pub fn at_discrete(&self, key: Key) -> Result<usize> {
        self.discrete
            .get(&key)
            .copied()
            .ok_or(HybridError::MissingAssignment { key })
    }

    pub fn insert(&mut self, key: Key, value: DVector<f64>) {
        self.continuous.insert(key, value);
    }

    pub fn insert_discrete(&mut self, key: Key, value: usize) {
        self.discrete.insert(key, value);
    }

    /// Overwrites entries with those of `other`.
    pub fn update(&mut self, other: &HybridValues) {
        self.continuous.update(&other.continuous);
        self.discrete
            .extend(other.discrete.iter().map(|(k, v)| (*k, *v)));
    }

    pub fn equals(&self, other: &HybridValues, tol: f64) -> bool {
        self.discrete == other.discrete && self.continuous.equals(&other.continuous, tol)
    }
}

impl fmt::Display for HybridValues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "HybridValues:")?;
        write!(f, "{}", self.continuous)?;
        writeln!(f, "DiscreteValues: {}", format_assignment(&self.discrete))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discrete::key::symbol;

    #[test]
    fn accessors_report_missing_keys() {
        let values = HybridValues::new(
            VectorValues::new().with_scalar(symbol('x', 0), 1.0),
            DiscreteValues::from([(symbol('m', 0), 1)]),
        );
        assert_eq!(values.at_discrete(symbol('m', 0)).unwrap(), 1);
        assert_eq!(
            values.at_discrete(symbol('m', 1)),
            Err(HybridError::MissingAssignment {
                key: symbol('m', 1)
            })
        );
        assert_eq!(
            values.at(symbol('x', 1)),
            Err(HybridError::MissingValue {
                key: symbol('x', 1)
            })
        );
    }

    #[test]
    fn update_merges_both_parts() {
        let mut a = HybridValues::new(
            VectorValues::new().with_scalar(symbol('x', 0), 1.0),
            DiscreteValues::from([(symbol('m', 0), 0)]),
        );
        let b = HybridValues::new(
            VectorValues::new().with_scalar(symbol('x', 1), 2.0),
            DiscreteValues::from([(symbol('m', 0), 1)]),
        );
        a.update(&b);
        assert_eq!(a.continuous().len(), 2);
        assert_eq!(a.at_discrete(symbol('m', 0)).unwrap(), 1);
    }
}
