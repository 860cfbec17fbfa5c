//! # Mixture Factors
//!
//! A [`GaussianMixtureFactor`] holds one Gaussian factor per joint value of
//! its discrete keys. Each leaf also carries a scalar log-normalizer so that
//! errors of modes with different noise scales stay comparable as negative
//! log densities rather than as bare squared residuals.
//!
//! ## Combination
//!
//! Several mixtures over overlapping discrete keys are summed into a
//! [`GaussianFactorGraphTree`]: a decision tree over the union of their keys
//! whose leaf at an assignment is the [`GraphFragment`] of every factor
//! selected by that assignment. [`combine`] concatenates factor lists and adds
//! log-normalizers leaf by leaf, broadcasting along keys that only one operand
//! branches on.
//!
//! Leaves are `None` where a mode has been pruned; a pruned operand prunes the
//! combined leaf.

use std::fmt;
use std::sync::Arc;

use crate::discrete::algebraic::AlgebraicDecisionTree;
use crate::discrete::decision_tree::DecisionTree;
use crate::discrete::key::{canonical_keys, format_key, DiscreteKey, Key};
use crate::errors::{HybridError, Result};
use crate::hybrid::factor::{format_hybrid_keys, HybridCategory, HybridKeyed};
use crate::hybrid::values::HybridValues;
use crate::linear::{JacobianFactor, VectorValues};

/// One mode of a mixture factor.
#[derive(Debug, Clone, PartialEq)]
pub struct MixtureComponent {
    pub factor: Arc<JacobianFactor>,
    pub log_normalizer: f64,
}

/// The Gaussian factors active under one discrete assignment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphFragment {
    pub factors: Vec<Arc<JacobianFactor>>,
    pub log_normalizer: f64,
}

impl GraphFragment {
    /// Sum of factor errors plus the accumulated log-normalizer.
    pub fn error(&self, values: &VectorValues) -> Result<f64> {
        let mut total = self.log_normalizer;
        for factor in &self.factors {
            total += factor.error(values)?;
        }
        Ok(total)
    }

    fn concat(&self, other: &GraphFragment) -> GraphFragment {
        let mut factors = Vec::with_capacity(self.factors.len() + other.factors.len());
        factors.extend(self.factors.iter().cloned());
        factors.extend(other.factors.iter().cloned());
        GraphFragment {
            factors,
            log_normalizer: self.log_normalizer + other.log_normalizer,
        }
    }
}

/// Graph fragments indexed by discrete assignment; `None` marks a pruned mode.
pub type GaussianFactorGraphTree = DecisionTree<Option<GraphFragment>>;

/// The neutral element of [`combine`]: one empty fragment for every
/// assignment.
pub fn empty_graph_tree() -> GaussianFactorGraphTree {
    DecisionTree::leaf(Some(GraphFragment::default()))
}

/// Leafwise concatenation of two fragment trees over the union of their keys.
///
/// Fails with [`HybridError::Validation`] when the trees branch on a key with
/// different cardinalities.
pub fn combine(
    a: &GaussianFactorGraphTree,
    b: &GaussianFactorGraphTree,
) -> Result<GaussianFactorGraphTree> {
    a.apply(b, |x, y| match (x, y) {
        (Some(x), Some(y)) => Some(x.concat(y)),
        _ => None,
    })
}

/// Appends a mode-independent factor to every fragment of `tree`.
pub fn add_to_every_leaf(
    tree: &GaussianFactorGraphTree,
    factor: &Arc<JacobianFactor>,
) -> GaussianFactorGraphTree {
    tree.map(|leaf| {
        leaf.as_ref().map(|fragment| {
            let mut fragment = fragment.clone();
            fragment.factors.push(factor.clone());
            fragment
        })
    })
}

/// A Gaussian factor that switches with its discrete keys.
#[derive(Debug, Clone, PartialEq)]
pub struct GaussianMixtureFactor {
    continuous_keys: Vec<Key>,
    discrete_keys: Vec<DiscreteKey>,
    components: DecisionTree<Option<MixtureComponent>>,
}

impl GaussianMixtureFactor {
    /// One factor per joint assignment of `discrete_keys` (row-major, first key
    /// most significant), all with zero log-normalizer.
    pub fn new(
        continuous_keys: Vec<Key>,
        discrete_keys: Vec<DiscreteKey>,
        factors: Vec<Arc<JacobianFactor>>,
    ) -> Result<Self> {
        let zeros = vec![0.0; factors.len()];
        Self::with_log_normalizers(continuous_keys, discrete_keys, factors, zeros)
    }

    /// As [`GaussianMixtureFactor::new`] with one log-normalizer per factor.
    pub fn with_log_normalizers(
        continuous_keys: Vec<Key>,
        discrete_keys: Vec<DiscreteKey>,
        factors: Vec<Arc<JacobianFactor>>,
        log_normalizers: Vec<f64>,
    ) -> Result<Self> {
        if factors.len() != log_normalizers.len() {
            return Err(HybridError::Validation(format!(
                "{} factors but {} log-normalizers",
                factors.len(),
                log_normalizers.len()
            )));
        }
        let leaves: Vec<Option<MixtureComponent>> = factors
            .into_iter()
            .zip(log_normalizers)
            .map(|(factor, log_normalizer)| {
                Some(MixtureComponent {
                    factor,
                    log_normalizer,
                })
            })
            .collect();
        let components = DecisionTree::from_values(&discrete_keys, leaves)?;
        Self::from_tree(continuous_keys, discrete_keys, components)
    }

    /// Wraps an existing component tree.
    pub fn from_tree(
        continuous_keys: Vec<Key>,
        discrete_keys: Vec<DiscreteKey>,
        components: DecisionTree<Option<MixtureComponent>>,
    ) -> Result<Self> {
        let discrete_keys = canonical_keys(discrete_keys)?;
        if HybridCategory::from_keys(&continuous_keys, &discrete_keys)? != HybridCategory::Hybrid {
            return Err(HybridError::Validation(
                "a mixture factor needs both continuous and discrete keys".into(),
            ));
        }
        for label in components.keys() {
            if !discrete_keys.contains(&label) {
                return Err(HybridError::Validation(format!(
                    "mixture branches on {} which is not one of its discrete keys",
                    label
                )));
            }
        }
        for component in components.leaves().into_iter().flatten() {
            for key in component.factor.keys() {
                if !continuous_keys.contains(&key) {
                    return Err(HybridError::Validation(format!(
                        "component factor touches {} which is not one of the mixture's keys",
                        format_key(key)
                    )));
                }
            }
        }
        Ok(Self {
            continuous_keys,
            discrete_keys,
            components,
        })
    }

    pub fn components(&self) -> &DecisionTree<Option<MixtureComponent>> {
        &self.components
    }

    /// Component selected by `assignment`, `None` if that mode was pruned.
    pub fn component(
        &self,
        assignment: &crate::discrete::DiscreteValues,
    ) -> Result<Option<&MixtureComponent>> {
        Ok(self.components.get(assignment)?.as_ref())
    }

    /// This mixture as a fragment tree, ready to [`combine`].
    pub fn as_graph_tree(&self) -> GaussianFactorGraphTree {
        self.components.map(|leaf| {
            leaf.as_ref().map(|c| GraphFragment {
                factors: vec![c.factor.clone()],
                log_normalizer: c.log_normalizer,
            })
        })
    }

    /// Sum of two mixtures over the union of their discrete keys.
    pub fn combine(&self, other: &GaussianMixtureFactor) -> Result<GaussianFactorGraphTree> {
        canonical_keys(self.discrete_keys.iter().chain(other.discrete_keys.iter()).copied())?;
        combine(&self.as_graph_tree(), &other.as_graph_tree())
    }

    /// Per-mode error plus log-normalizer at `values`; pruned modes are `+∞`.
    pub fn error_tree(&self, values: &VectorValues) -> Result<AlgebraicDecisionTree> {
        self.components.try_map(|leaf| match leaf {
            Some(c) => Ok(c.factor.error(values)? + c.log_normalizer),
            None => Ok(f64::INFINITY),
        })
    }

    /// Error of the mode selected by the discrete part of `values`.
    pub fn error(&self, values: &HybridValues) -> Result<f64> {
        match self.component(values.discrete())? {
            Some(c) => Ok(c.factor.error(values.continuous())? + c.log_normalizer),
            None => Ok(f64::INFINITY),
        }
    }

    pub fn equals(&self, other: &GaussianMixtureFactor, tol: f64) -> bool {
        self.continuous_keys == other.continuous_keys
            && self.discrete_keys == other.discrete_keys
            && self.components.equals_with(&other.components, |a, b| match (a, b) {
                (Some(a), Some(b)) => {
                    a.factor.equals(&b.factor, tol)
                        && (a.log_normalizer - b.log_normalizer).abs() <= tol
                }
                (None, None) => true,
                _ => false,
            })
    }
}

impl HybridKeyed for GaussianMixtureFactor {
    fn continuous_keys(&self) -> Vec<Key> {
        self.continuous_keys.clone()
    }

    fn discrete_keys(&self) -> Vec<DiscreteKey> {
        self.discrete_keys.clone()
    }
}

impl fmt::Display for GaussianMixtureFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "GaussianMixtureFactor")?;
        writeln!(
            f,
            "Hybrid {}",
            format_hybrid_keys(&self.continuous_keys, &self.discrete_keys)
        )?;
        let rendered = self.components.map(|leaf| match leaf {
            Some(c) => format!("log normalizer {}: {}", c.log_normalizer, c.factor),
            None => "pruned\n".to_string(),
        });
        write!(f, "{}", rendered)
    }
}
