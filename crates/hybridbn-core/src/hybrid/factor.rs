//! Key bookkeeping shared by every hybrid factor and conditional.
//!
//! Any factor touches a list of continuous keys and a list of discrete keys.
//! Which of those lists is empty decides its [`HybridCategory`]:
//!
//! | continuous | discrete | category |
//! |---|---|---|
//! | non-empty | empty | `Continuous` |
//! | empty | non-empty | `Discrete` |
//! | non-empty | non-empty | `Hybrid` |
//!
//! Both lists empty is rejected at construction.

use std::fmt;

use crate::discrete::factor::DiscreteFactor;
use crate::discrete::key::{format_key, DiscreteKey, Key};
use crate::discrete::DiscreteConditional;
use crate::errors::{HybridError, Result};
use crate::linear::{GaussianConditional, JacobianFactor};

/// Kind of variables a factor touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HybridCategory {
    Discrete,
    Continuous,
    Hybrid,
}

impl HybridCategory {
    /// Classifies a pair of key lists.
    pub fn from_keys(continuous: &[Key], discrete: &[DiscreteKey]) -> Result<Self> {
        match (continuous.is_empty(), discrete.is_empty()) {
            (true, true) => Err(HybridError::Validation(
                "a hybrid factor needs at least one continuous or discrete key".into(),
            )),
            (false, true) => Ok(HybridCategory::Continuous),
            (true, false) => Ok(HybridCategory::Discrete),
            (false, false) => Ok(HybridCategory::Hybrid),
        }
    }
}

impl fmt::Display for HybridCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HybridCategory::Discrete => "Discrete",
            HybridCategory::Continuous => "Continuous",
            HybridCategory::Hybrid => "Hybrid",
        };
        f.write_str(name)
    }
}

/// Uniform key surface of factors and conditionals of every kind.
pub trait HybridKeyed {
    fn continuous_keys(&self) -> Vec<Key>;

    fn discrete_keys(&self) -> Vec<DiscreteKey>;

    /// Continuous keys followed by the discrete keys.
    fn keys(&self) -> Vec<Key> {
        let mut keys = self.continuous_keys();
        keys.extend(self.discrete_keys().iter().map(|dk| dk.key));
        keys
    }

    /// Category derived from the key lists. A factor with no keys at all
    /// (a constant) is reported as `Continuous`.
    fn category(&self) -> HybridCategory {
        HybridCategory::from_keys(&self.continuous_keys(), &self.discrete_keys())
            .unwrap_or(HybridCategory::Continuous)
    }
}

impl HybridKeyed for DiscreteConditional {
    fn continuous_keys(&self) -> Vec<Key> {
        Vec::new()
    }

    fn discrete_keys(&self) -> Vec<DiscreteKey> {
        DiscreteConditional::keys(self)
    }
}

impl HybridKeyed for DiscreteFactor {
    fn continuous_keys(&self) -> Vec<Key> {
        Vec::new()
    }

    fn discrete_keys(&self) -> Vec<DiscreteKey> {
        DiscreteFactor::keys(self).to_vec()
    }
}

impl HybridKeyed for GaussianConditional {
    fn continuous_keys(&self) -> Vec<Key> {
        GaussianConditional::keys(self)
    }

    fn discrete_keys(&self) -> Vec<DiscreteKey> {
        Vec::new()
    }
}

impl HybridKeyed for JacobianFactor {
    fn continuous_keys(&self) -> Vec<Key> {
        JacobianFactor::keys(self)
    }

    fn discrete_keys(&self) -> Vec<DiscreteKey> {
        Vec::new()
    }
}

/// Renders `[x1 x2; m0]`-style key lists.
pub(crate) fn format_hybrid_keys(continuous: &[Key], discrete: &[DiscreteKey]) -> String {
    let c: Vec<String> = continuous.iter().map(|k| format_key(*k)).collect();
    let d: Vec<String> = discrete.iter().map(|dk| format_key(dk.key)).collect();
    format!("[{}; {}]", c.join(" "), d.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discrete::key::symbol;
    use nalgebra::DVector;

    #[test]
    fn category_follows_key_lists() {
        let x = symbol('x', 1);
        let m = DiscreteKey::new(symbol('m', 1), 2).unwrap();
        assert_eq!(
            HybridCategory::from_keys(&[x], &[]).unwrap(),
            HybridCategory::Continuous
        );
        assert_eq!(
            HybridCategory::from_keys(&[], &[m]).unwrap(),
            HybridCategory::Discrete
        );
        assert_eq!(
            HybridCategory::from_keys(&[x], &[m]).unwrap(),
            HybridCategory::Hybrid
        );
        assert!(HybridCategory::from_keys(&[], &[]).is_err());
    }

    #[test]
    fn keys_concatenate_continuous_then_discrete() {
        let m = DiscreteKey::new(symbol('m', 0), 2).unwrap();
        let c = DiscreteConditional::from_signature(m, &[], "1/1").unwrap();
        assert_eq!(c.category(), HybridCategory::Discrete);
        assert_eq!(HybridKeyed::keys(&c), vec![symbol('m', 0)]);

        let g = GaussianConditional::from_mean_and_sigma(symbol('x', 0), DVector::zeros(1), 1.0)
            .unwrap();
        assert_eq!(g.category(), HybridCategory::Continuous);
    }

    #[test]
    fn key_lists_render_compactly() {
        let m = DiscreteKey::new(symbol('m', 1), 2).unwrap();
        assert_eq!(
            format_hybrid_keys(&[symbol('x', 1), symbol('x', 2)], &[m]),
            "[x1 x2; m1]"
        );
    }
}
