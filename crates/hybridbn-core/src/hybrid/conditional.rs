//! The three kinds of conditional a hybrid Bayes net can hold.

use std::fmt;
use std::sync::Arc;

use crate::discrete::algebraic::AlgebraicDecisionTree;
use crate::discrete::decision_tree::DecisionTree;
use crate::discrete::key::{DiscreteKey, Key};
use crate::discrete::DiscreteConditional;
use crate::errors::{HybridError, Result};
use crate::hybrid::factor::{format_hybrid_keys, HybridCategory, HybridKeyed};
use crate::hybrid::mixture::GaussianMixture;
use crate::hybrid::values::HybridValues;
use crate::linear::{GaussianConditional, VectorValues};

/// A discrete table, a Gaussian, or a Gaussian mixture.
///
/// Payloads are shared so that nets derived from one another (pruned,
/// chosen) reuse the conditionals they did not change.
#[derive(Debug, Clone, PartialEq)]
pub enum HybridConditional {
    Discrete(Arc<DiscreteConditional>),
    Continuous(Arc<GaussianConditional>),
    Hybrid(Arc<GaussianMixture>),
}

impl HybridConditional {
    pub fn as_discrete(&self) -> Option<&Arc<DiscreteConditional>> {
        match self {
            HybridConditional::Discrete(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_gaussian(&self) -> Option<&Arc<GaussianConditional>> {
        match self {
            HybridConditional::Continuous(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_mixture(&self) -> Option<&Arc<GaussianMixture>> {
        match self {
            HybridConditional::Hybrid(c) => Some(c),
            _ => None,
        }
    }

    /// Continuous frontal keys; empty for discrete conditionals.
    pub fn continuous_frontals(&self) -> Vec<Key> {
        match self {
            HybridConditional::Discrete(_) => Vec::new(),
            HybridConditional::Continuous(c) => c.frontal_keys(),
            HybridConditional::Hybrid(m) => m.frontal_keys().to_vec(),
        }
    }

    /// Discrete frontal keys; empty unless the conditional is discrete.
    pub fn discrete_frontals(&self) -> Vec<DiscreteKey> {
        match self {
            HybridConditional::Discrete(c) => c.frontals().to_vec(),
            _ => Vec::new(),
        }
    }

    /// `−ln` density, with mixtures using the shifted convention of
    /// [`GaussianMixture`].
    pub fn error(&self, values: &HybridValues) -> Result<f64> {
        match self {
            HybridConditional::Discrete(c) => c.error(values.discrete()),
            HybridConditional::Continuous(c) => c.error(values.continuous()),
            HybridConditional::Hybrid(m) => m.error(values),
        }
    }

    /// Exact log density.
    pub fn log_probability(&self, values: &HybridValues) -> Result<f64> {
        match self {
            HybridConditional::Discrete(c) => c.log_probability(values.discrete()),
            HybridConditional::Continuous(c) => c.log_probability(values.continuous()),
            HybridConditional::Hybrid(m) => m.log_probability(values),
        }
    }

    pub fn evaluate(&self, values: &HybridValues) -> Result<f64> {
        Ok(self.log_probability(values)?.exp())
    }

    /// Error as a function of the discrete keys at fixed continuous values.
    pub fn error_tree(&self, values: &VectorValues) -> Result<AlgebraicDecisionTree> {
        match self {
            HybridConditional::Discrete(c) => Ok(c.error_tree()),
            HybridConditional::Continuous(c) => Ok(DecisionTree::leaf(c.error(values)?)),
            HybridConditional::Hybrid(m) => m.error_tree(values),
        }
    }

    /// Equality that reports why two conditionals cannot be compared.
    ///
    /// Returns [`HybridError::StructuralMismatch`] when categories or key
    /// lists differ, otherwise whether the payloads agree within `tol`.
    pub fn try_equals(&self, other: &HybridConditional, tol: f64) -> Result<bool> {
        if self.category() != other.category() {
            return Err(HybridError::StructuralMismatch(format!(
                "cannot compare a {} conditional with a {} conditional",
                self.category(),
                other.category()
            )));
        }
        if self.continuous_keys() != other.continuous_keys()
            || self.discrete_keys() != other.discrete_keys()
        {
            return Err(HybridError::StructuralMismatch(format!(
                "key lists differ: {} vs {}",
                format_hybrid_keys(&self.continuous_keys(), &self.discrete_keys()),
                format_hybrid_keys(&other.continuous_keys(), &other.discrete_keys())
            )));
        }
        Ok(match (self, other) {
            (HybridConditional::Discrete(a), HybridConditional::Discrete(b)) => a.equals(b, tol),
            (HybridConditional::Continuous(a), HybridConditional::Continuous(b)) => {
                a.equals(b, tol)
            }
            (HybridConditional::Hybrid(a), HybridConditional::Hybrid(b)) => a.equals(b, tol),
            _ => false,
        })
    }

    /// Tolerant equality; structurally different conditionals are unequal.
    pub fn equals(&self, other: &HybridConditional, tol: f64) -> bool {
        self.try_equals(other, tol).unwrap_or(false)
    }
}

impl HybridKeyed for HybridConditional {
    fn continuous_keys(&self) -> Vec<Key> {
        match self {
            HybridConditional::Discrete(_) => Vec::new(),
            HybridConditional::Continuous(c) => c.keys(),
            HybridConditional::Hybrid(m) => m.continuous_keys(),
        }
    }

    fn discrete_keys(&self) -> Vec<DiscreteKey> {
        match self {
            HybridConditional::Discrete(c) => c.keys(),
            HybridConditional::Continuous(_) => Vec::new(),
            HybridConditional::Hybrid(m) => m.discrete_parents().to_vec(),
        }
    }

    fn category(&self) -> HybridCategory {
        match self {
            HybridConditional::Discrete(_) => HybridCategory::Discrete,
            HybridConditional::Continuous(_) => HybridCategory::Continuous,
            HybridConditional::Hybrid(_) => HybridCategory::Hybrid,
        }
    }
}

impl From<DiscreteConditional> for HybridConditional {
    fn from(c: DiscreteConditional) -> Self {
        HybridConditional::Discrete(Arc::new(c))
    }
}

impl From<GaussianConditional> for HybridConditional {
    fn from(c: GaussianConditional) -> Self {
        HybridConditional::Continuous(Arc::new(c))
    }
}

impl From<GaussianMixture> for HybridConditional {
    fn from(m: GaussianMixture) -> Self {
        HybridConditional::Hybrid(Arc::new(m))
    }
}

impl From<Arc<DiscreteConditional>> for HybridConditional {
    fn from(c: Arc<DiscreteConditional>) -> Self {
        HybridConditional::Discrete(c)
    }
}

impl From<Arc<GaussianConditional>> for HybridConditional {
    fn from(c: Arc<GaussianConditional>) -> Self {
        HybridConditional::Continuous(c)
    }
}

impl From<Arc<GaussianMixture>> for HybridConditional {
    fn from(m: Arc<GaussianMixture>) -> Self {
        HybridConditional::Hybrid(m)
    }
}

impl fmt::Display for HybridConditional {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HybridConditional::Discrete(c) => write!(f, "Discrete {}", c),
            HybridConditional::Continuous(c) => write!(f, "Continuous {}", c),
            HybridConditional::Hybrid(m) => write!(f, "Hybrid {}", m),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discrete::key::symbol;
    use crate::discrete::DiscreteValues;
    use nalgebra::DVector;

    fn m0() -> DiscreteKey {
        DiscreteKey::new(symbol('m', 0), 2).unwrap()
    }

    fn gaussian(mean: f64) -> GaussianConditional {
        GaussianConditional::from_mean_and_sigma(symbol('x', 0), DVector::from_element(1, mean), 1.0)
            .unwrap()
    }

    #[test]
    fn categories_match_payloads() {
        let d: HybridConditional = DiscreteConditional::from_signature(m0(), &[], "1/1")
            .unwrap()
            .into();
        let c: HybridConditional = gaussian(0.0).into();
        let h: HybridConditional = GaussianMixture::new(
            vec![symbol('x', 0)],
            vec![],
            vec![m0()],
            vec![Arc::new(gaussian(0.0)), Arc::new(gaussian(1.0))],
        )
        .unwrap()
        .into();
        assert_eq!(d.category(), HybridCategory::Discrete);
        assert_eq!(c.category(), HybridCategory::Continuous);
        assert_eq!(h.category(), HybridCategory::Hybrid);
        assert_eq!(h.keys(), vec![symbol('x', 0), symbol('m', 0)]);
        assert!(h.as_mixture().is_some());
        assert!(h.as_discrete().is_none());
    }

    #[test]
    fn try_equals_reports_structural_mismatch() {
        let d: HybridConditional = DiscreteConditional::from_signature(m0(), &[], "1/1")
            .unwrap()
            .into();
        let c: HybridConditional = gaussian(0.0).into();
        assert!(matches!(
            d.try_equals(&c, 1e-9),
            Err(HybridError::StructuralMismatch(_))
        ));
        assert!(!d.equals(&c, 1e-9));

        let other: HybridConditional =
            GaussianConditional::from_mean_and_sigma(symbol('x', 1), DVector::zeros(1), 1.0)
                .unwrap()
                .into();
        assert!(matches!(
            c.try_equals(&other, 1e-9),
            Err(HybridError::StructuralMismatch(_))
        ));
    }

    #[test]
    fn tolerant_payload_equality() {
        let a: HybridConditional = gaussian(0.0).into();
        let b: HybridConditional = gaussian(1e-12).into();
        let c: HybridConditional = gaussian(0.5).into();
        assert!(a.try_equals(&b, 1e-9).unwrap());
        assert!(!a.try_equals(&c, 1e-9).unwrap());
    }

    #[test]
    fn continuous_error_tree_is_a_leaf() {
        let c: HybridConditional = gaussian(1.0).into();
        let values = VectorValues::new().with_scalar(symbol('x', 0), 3.0);
        let tree = c.error_tree(&values).unwrap();
        assert!(tree.is_leaf());
        assert!((tree.get(&DiscreteValues::new()).unwrap() - 2.0).abs() < 1e-12);
    }
}
