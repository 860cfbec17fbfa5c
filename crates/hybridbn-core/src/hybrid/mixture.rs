//! # Gaussian Mixtures
//!
//! A [`GaussianMixture`] is the conditional `p(x | y, m)`: one
//! [`GaussianConditional`] per joint value of the discrete parents `m`, all
//! over the same frontal keys `x` and drawing their continuous parents from
//! the same set `y`.
//!
//! ## Error convention
//!
//! Branches with different noise scales have different log normalization
//! constants `lnc(m)`. The mixture error at mode `m` is
//!
//! ```text
//! error(x, y, m) = ½‖R_m x + S_m y − d_m‖² + (max_k lnc(k) − lnc(m))
//! ```
//!
//! which is `−ln p(x | y, m)` shifted by the constant `max_k lnc(k)`. Errors
//! stay non-negative and their differences across modes are exact
//! log-density ratios. Exact densities ([`GaussianMixture::log_probability`],
//! [`GaussianMixture::evaluate`]) use the selected branch directly.
//!
//! Branches are `None` once pruned: their error is `+∞` and their density 0.

use std::fmt;
use std::sync::Arc;

use crate::discrete::algebraic::AlgebraicDecisionTree;
use crate::discrete::decision_tree::DecisionTree;
use crate::discrete::factor::DiscreteFactor;
use crate::discrete::key::{canonical_keys, format_assignment, format_key, DiscreteKey, DiscreteValues, Key};
use crate::errors::{HybridError, Result};
use crate::hybrid::factor::{format_hybrid_keys, HybridKeyed};
use crate::hybrid::factor_graph::HybridFactor;
use crate::hybrid::mixture_factor::{GaussianMixtureFactor, MixtureComponent};
use crate::hybrid::values::HybridValues;
use crate::linear::{GaussianConditional, VectorValues};

/// Branches of a mixture indexed by the discrete parents.
pub type ConditionalTree = DecisionTree<Option<Arc<GaussianConditional>>>;

/// Conditional Gaussian whose parametrization depends on discrete parents.
#[derive(Debug, Clone, PartialEq)]
pub struct GaussianMixture {
    frontals: Vec<Key>,
    continuous_parents: Vec<Key>,
    discrete_parents: Vec<DiscreteKey>,
    conditionals: ConditionalTree,
    log_constant: f64,
}

impl GaussianMixture {
    /// One branch per joint value of `discrete_parents`, row-major with the
    /// first key most significant.
    pub fn new(
        frontals: Vec<Key>,
        continuous_parents: Vec<Key>,
        discrete_parents: Vec<DiscreteKey>,
        conditionals: Vec<Arc<GaussianConditional>>,
    ) -> Result<Self> {
        let leaves: Vec<Option<Arc<GaussianConditional>>> =
            conditionals.into_iter().map(Some).collect();
        let tree = DecisionTree::from_values(&discrete_parents, leaves)?;
        Self::from_tree(frontals, continuous_parents, discrete_parents, tree)
    }

    /// Wraps an existing branch tree after checking every branch's keys.
    pub fn from_tree(
        frontals: Vec<Key>,
        continuous_parents: Vec<Key>,
        discrete_parents: Vec<DiscreteKey>,
        conditionals: ConditionalTree,
    ) -> Result<Self> {
        if frontals.is_empty() {
            return Err(HybridError::Validation(
                "a gaussian mixture needs at least one frontal key".into(),
            ));
        }
        if discrete_parents.is_empty() {
            return Err(HybridError::Validation(
                "a gaussian mixture needs at least one discrete parent".into(),
            ));
        }
        let discrete_parents = canonical_keys(discrete_parents)?;
        for label in conditionals.keys() {
            if !discrete_parents.contains(&label) {
                return Err(HybridError::Validation(format!(
                    "mixture branches on {} which is not a discrete parent",
                    label
                )));
            }
        }
        let mut log_constant = f64::NEG_INFINITY;
        for branch in conditionals.leaves().into_iter().flatten() {
            if branch.frontal_keys() != frontals {
                return Err(HybridError::Validation(format!(
                    "branch frontals {:?} differ from mixture frontals {:?}",
                    branch.frontal_keys().iter().map(|k| format_key(*k)).collect::<Vec<_>>(),
                    frontals.iter().map(|k| format_key(*k)).collect::<Vec<_>>()
                )));
            }
            if let Some(key) = branch
                .parent_keys()
                .into_iter()
                .find(|k| !continuous_parents.contains(k))
            {
                return Err(HybridError::Validation(format!(
                    "branch depends on {} which is not a continuous parent of the mixture",
                    format_key(key)
                )));
            }
            log_constant = log_constant.max(branch.log_normalization_constant());
        }
        Ok(Self {
            frontals,
            continuous_parents,
            discrete_parents,
            conditionals,
            log_constant,
        })
    }

    pub fn frontal_keys(&self) -> &[Key] {
        &self.frontals
    }

    pub fn continuous_parents(&self) -> &[Key] {
        &self.continuous_parents
    }

    pub fn discrete_parents(&self) -> &[DiscreteKey] {
        &self.discrete_parents
    }

    pub fn conditionals(&self) -> &ConditionalTree {
        &self.conditionals
    }

    /// Largest log normalization constant over the remaining branches.
    pub fn log_constant(&self) -> f64 {
        self.log_constant
    }

    /// Branch for `assignment`, `None` when that mode was pruned.
    pub fn branch(&self, assignment: &DiscreteValues) -> Result<Option<&Arc<GaussianConditional>>> {
        Ok(self.conditionals.get(assignment)?.as_ref())
    }

    /// The Gaussian conditional selected by `assignment`.
    pub fn choose(&self, assignment: &DiscreteValues) -> Result<Arc<GaussianConditional>> {
        self.branch(assignment)?.cloned().ok_or_else(|| {
            HybridError::DegenerateAssignment(format!(
                "mode {} of the mixture on {} has been pruned",
                format_assignment(assignment),
                format_key(self.frontals[0])
            ))
        })
    }

    /// `max lnc − lnc(m)` per mode, `+∞` for pruned modes.
    pub fn normalizer_offsets(&self) -> AlgebraicDecisionTree {
        self.conditionals.map(|leaf| match leaf {
            Some(c) => self.log_constant - c.log_normalization_constant(),
            None => f64::INFINITY,
        })
    }

    /// Per-mode error at `values` under the shifted convention.
    pub fn error_tree(&self, values: &VectorValues) -> Result<AlgebraicDecisionTree> {
        self.conditionals.try_map(|leaf| match leaf {
            Some(c) => Ok(c.error(values)? + self.log_constant - c.log_normalization_constant()),
            None => Ok(f64::INFINITY),
        })
    }

    /// Exact `ln p(x | y, m)` per mode, `−∞` for pruned modes.
    pub fn log_probability_tree(&self, values: &VectorValues) -> Result<AlgebraicDecisionTree> {
        self.conditionals.try_map(|leaf| match leaf {
            Some(c) => c.log_probability(values),
            None => Ok(f64::NEG_INFINITY),
        })
    }

    pub fn error(&self, values: &HybridValues) -> Result<f64> {
        match self.branch(values.discrete())? {
            Some(c) => Ok(c.error(values.continuous())? + self.log_constant
                - c.log_normalization_constant()),
            None => Ok(f64::INFINITY),
        }
    }

    pub fn log_probability(&self, values: &HybridValues) -> Result<f64> {
        match self.branch(values.discrete())? {
            Some(c) => c.log_probability(values.continuous()),
            None => Ok(f64::NEG_INFINITY),
        }
    }

    pub fn evaluate(&self, values: &HybridValues) -> Result<f64> {
        Ok(self.log_probability(values)?.exp())
    }

    /// Fixes the frontals at their measured values.
    ///
    /// With continuous parents the result is a mixture factor on the parents
    /// whose leaves keep each branch's `−lnc`. Without continuous parents
    /// nothing continuous remains and the result is the discrete factor
    /// `m ↦ p(x | m)`.
    pub fn likelihood(&self, measurements: &VectorValues) -> Result<HybridFactor> {
        if self.continuous_parents.is_empty() {
            let table = self.conditionals.try_map(|leaf| match leaf {
                Some(c) => c.evaluate(measurements),
                None => Ok(0.0),
            })?;
            let factor = DiscreteFactor::new(&self.discrete_parents, table)?;
            return Ok(HybridFactor::Discrete(Arc::new(factor)));
        }
        let components = self.conditionals.try_map(|leaf| match leaf {
            Some(c) => {
                let (factor, log_normalizer) = c.likelihood(measurements)?;
                Ok(Some(MixtureComponent {
                    factor: Arc::new(factor),
                    log_normalizer,
                }))
            }
            None => Ok(None),
        })?;
        let mixture = GaussianMixtureFactor::from_tree(
            self.continuous_parents.clone(),
            self.discrete_parents.clone(),
            components,
        )?;
        Ok(HybridFactor::Mixture(Arc::new(mixture)))
    }

    /// The mixture as a factor over all its keys; each leaf keeps `−lnc` so
    /// leaf errors are exact negative log densities.
    pub fn to_factor(&self) -> Result<GaussianMixtureFactor> {
        let components = self.conditionals.try_map(|leaf| match leaf {
            Some(c) => Ok(Some(MixtureComponent {
                factor: Arc::new(c.to_factor()?),
                log_normalizer: -c.log_normalization_constant(),
            })),
            None => Ok(None),
        })?;
        GaussianMixtureFactor::from_tree(
            self.continuous_keys(),
            self.discrete_parents.clone(),
            components,
        )
    }

    /// Drops every branch under which `probabilities` has no positive mass.
    ///
    /// `probabilities` may range over more keys than this mixture; a branch
    /// survives when any completion of its assignment is positive.
    pub fn prune(&self, probabilities: &AlgebraicDecisionTree) -> Result<GaussianMixture> {
        let pruned = DecisionTree::try_from_fn(&self.discrete_parents, |assignment| {
            let support = probabilities.restrict(assignment)?.max();
            if support > 0.0 {
                Ok(self.conditionals.get(assignment)?.clone())
            } else {
                Ok(None)
            }
        })?;
        Self::from_tree(
            self.frontals.clone(),
            self.continuous_parents.clone(),
            self.discrete_parents.clone(),
            pruned,
        )
    }

    /// Number of branches still available.
    pub fn nr_available(&self) -> Result<usize> {
        Ok(self
            .conditionals
            .enumerate(&self.discrete_parents)?
            .into_iter()
            .filter(|(_, leaf)| leaf.is_some())
            .count())
    }

    pub fn equals(&self, other: &GaussianMixture, tol: f64) -> bool {
        self.frontals == other.frontals
            && self.continuous_parents == other.continuous_parents
            && self.discrete_parents == other.discrete_parents
            && self
                .conditionals
                .equals_with(&other.conditionals, |a, b| match (a, b) {
                    (Some(a), Some(b)) => a.equals(b, tol),
                    (None, None) => true,
                    _ => false,
                })
    }
}

impl HybridKeyed for GaussianMixture {
    fn continuous_keys(&self) -> Vec<Key> {
        let mut keys = self.frontals.clone();
        keys.extend(self.continuous_parents.iter().copied());
        keys
    }

    fn discrete_keys(&self) -> Vec<DiscreteKey> {
        self.discrete_parents.clone()
    }
}

impl fmt::Display for GaussianMixture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "GaussianMixture {}",
            format_hybrid_keys(&self.continuous_keys(), &self.discrete_parents)
        )?;
        let rendered = self.conditionals.map(|leaf| match leaf {
            Some(c) => c.to_string(),
            None => "pruned\n".to_string(),
        });
        write!(f, "{}", rendered)
    }
}
