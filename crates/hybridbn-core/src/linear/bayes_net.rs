//! Purely continuous Bayes nets.
//!
//! Conditionals are stored in elimination order: a conditional's parents are
//! frontal in conditionals that appear later. Solving walks the sequence from
//! the back so every parent is known before its children.

use std::fmt;
use std::sync::Arc;

use rand::Rng;

use crate::errors::{HybridError, Result};
use crate::linear::conditional::GaussianConditional;
use crate::linear::vector_values::VectorValues;

/// Ordered product of Gaussian conditionals.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GaussianBayesNet {
    conditionals: Vec<Arc<GaussianConditional>>,
}

impl GaussianBayesNet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, conditional: impl Into<Arc<GaussianConditional>>) {
        self.conditionals.push(conditional.into());
    }

    pub fn len(&self) -> usize {
        self.conditionals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conditionals.is_empty()
    }

    pub fn at(&self, index: usize) -> Option<&Arc<GaussianConditional>> {
        self.conditionals.get(index)
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Arc<GaussianConditional>> + '_ {
        self.conditionals.iter()
    }

    /// Mean of the joint density by back-substitution.
    pub fn optimize(&self) -> Result<VectorValues> {
        let mut solution = VectorValues::new();
        for conditional in self.conditionals.iter().rev() {
            let frontals = conditional
                .solve(&solution)
                .map_err(HybridError::into_unresolved_parent)?;
            solution.update(&frontals);
        }
        Ok(solution)
    }

    /// Ancestral sample of every frontal variable.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<VectorValues> {
        self.sample_given(&VectorValues::new(), rng)
    }

    /// Ancestral sample keeping any frontal already present in `given`.
    pub fn sample_given<R: Rng + ?Sized>(
        &self,
        given: &VectorValues,
        rng: &mut R,
    ) -> Result<VectorValues> {
        let mut result = given.clone();
        for conditional in self.conditionals.iter().rev() {
            if conditional.frontal_keys().iter().all(|k| result.contains(*k)) {
                continue;
            }
            let frontals = conditional
                .sample(&result, rng)
                .map_err(HybridError::into_unresolved_parent)?;
            result.update(&frontals);
        }
        Ok(result)
    }

    /// Sum of conditional errors.
    pub fn error(&self, values: &VectorValues) -> Result<f64> {
        self.conditionals.iter().map(|c| c.error(values)).sum()
    }

    pub fn log_probability(&self, values: &VectorValues) -> Result<f64> {
        self.conditionals
            .iter()
            .map(|c| c.log_probability(values))
            .sum()
    }

    pub fn evaluate(&self, values: &VectorValues) -> Result<f64> {
        Ok(self.log_probability(values)?.exp())
    }

    pub fn equals(&self, other: &GaussianBayesNet, tol: f64) -> bool {
        self.conditionals.len() == other.conditionals.len()
            && self
                .conditionals
                .iter()
                .zip(other.conditionals.iter())
                .all(|(a, b)| a.equals(b, tol))
    }
}

impl FromIterator<Arc<GaussianConditional>> for GaussianBayesNet {
    fn from_iter<I: IntoIterator<Item = Arc<GaussianConditional>>>(iter: I) -> Self {
        Self {
            conditionals: iter.into_iter().collect(),
        }
    }
}

impl fmt::Display for GaussianBayesNet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "GaussianBayesNet of size {}", self.conditionals.len())?;
        for (i, c) in self.conditionals.iter().enumerate() {
            write!(f, "[{}] {}", i, c)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discrete::key::symbol;
    use nalgebra::{DMatrix, DVector};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn chain() -> GaussianBayesNet {
        let x0 = symbol('x', 0);
        let x1 = symbol('x', 1);
        let mut net = GaussianBayesNet::new();
        net.push(
            GaussianConditional::from_linear_mean(
                x1,
                vec![(x0, DMatrix::identity(1, 1))],
                DVector::from_element(1, 2.0),
                1.0,
            )
            .unwrap(),
        );
        net.push(
            GaussianConditional::from_mean_and_sigma(x0, DVector::from_element(1, 1.0), 1.0)
                .unwrap(),
        );
        net
    }

    #[test]
    fn optimize_back_substitutes_from_the_root() {
        let solution = chain().optimize().unwrap();
        assert!((solution.at(symbol('x', 0)).unwrap()[0] - 1.0).abs() < 1e-12);
        assert!((solution.at(symbol('x', 1)).unwrap()[0] - 3.0).abs() < 1e-12);
        assert!(chain().error(&solution).unwrap().abs() < 1e-12);
    }

    #[test]
    fn wrong_order_reports_unresolved_parent() {
        let net: GaussianBayesNet = chain().iter().rev().cloned().collect();
        assert_eq!(
            net.optimize(),
            Err(HybridError::UnresolvedParent {
                key: symbol('x', 0)
            })
        );
    }

    #[test]
    fn density_is_product_of_conditionals() {
        let net = chain();
        let values = VectorValues::new()
            .with_scalar(symbol('x', 0), 0.0)
            .with_scalar(symbol('x', 1), 1.0);
        let product: f64 = net.iter().map(|c| c.evaluate(&values).unwrap()).product();
        assert!((net.evaluate(&values).unwrap() - product).abs() < 1e-15);
    }

    #[test]
    fn sample_given_keeps_given_values() {
        let net = chain();
        let given = VectorValues::new().with_scalar(symbol('x', 0), 10.0);
        let mut rng = StdRng::seed_from_u64(1);
        let sample = net.sample_given(&given, &mut rng).unwrap();
        assert_eq!(sample.at(symbol('x', 0)).unwrap()[0], 10.0);
        assert!(sample.contains(symbol('x', 1)));
    }
}
