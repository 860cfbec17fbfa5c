//! # Hybrid Factor Graphs
//!
//! A [`HybridFactorGraph`] is an unordered product of Gaussian, discrete and
//! mixture factors, the form a [`HybridBayesNet`] takes once measurements are
//! substituted.
//!
//! ## Elimination
//!
//! [`HybridFactorGraph::eliminate_sequential`] eliminates every continuous
//! variable first, then the discrete ones, producing `[p(X | M), P(M)]`. For
//! each joint mode `m`:
//!
//! 1. [`HybridFactorGraph::sum`] selects the graph fragment of `m`: every
//!    Gaussian factor plus the branch of every mixture, with the summed
//!    log-normalizer `c(m)`.
//! 2. The fragment's blocks are stacked into `[A | b]` and QR-factored, giving
//!    the square-root information `R`, the rhs `d` and the residual
//!    `e_min = ½‖A x* − b‖²`.
//! 3. The log of the mode's marginal, integrating the continuous variables
//!    out, is
//!
//!    ```text
//!    ln q(m) = −c(m) − e_min + n/2 · ln 2π − Σ ln |R_ii| + Σ ln φ(m)
//!    ```
//!
//!    where `φ` ranges over the discrete factors.
//!
//! `q` normalized over modes is the discrete posterior. Modes are independent
//! and are solved in parallel with the `parallel` feature; results are always
//! assembled in canonical assignment order.
//!
//! [`HybridBayesNet`]: crate::hybrid::bayes_net::HybridBayesNet

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use nalgebra::{DMatrix, DVector};
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use rustc_hash::FxHashMap;
#[cfg(feature = "tracing")]
use tracing::debug;

use crate::config::InferenceConfig;
use crate::discrete::algebraic::AlgebraicDecisionTree;
use crate::discrete::decision_tree::DecisionTree;
use crate::discrete::factor::DiscreteFactor;
use crate::discrete::key::{canonical_keys, format_key, Assignments, DiscreteKey, DiscreteValues, Key};
use crate::discrete::DiscreteConditional;
use crate::errors::{HybridError, Result};
use crate::hybrid::bayes_net::HybridBayesNet;
use crate::hybrid::conditional::HybridConditional;
use crate::hybrid::factor::HybridKeyed;
use crate::hybrid::mixture::GaussianMixture;
use crate::hybrid::mixture_factor::{
    add_to_every_leaf, combine, empty_graph_tree, GaussianFactorGraphTree, GaussianMixtureFactor,
    GraphFragment,
};
use crate::hybrid::values::HybridValues;
use crate::linear::{GaussianConditional, JacobianFactor, VectorValues, LOG_2PI};

/// One factor of a hybrid factor graph.
#[derive(Debug, Clone, PartialEq)]
pub enum HybridFactor {
    Continuous(Arc<JacobianFactor>),
    Discrete(Arc<DiscreteFactor>),
    Mixture(Arc<GaussianMixtureFactor>),
}

impl HybridFactor {
    /// Error at a full assignment; discrete factors contribute `−ln φ`.
    pub fn error(&self, values: &HybridValues) -> Result<f64> {
        match self {
            HybridFactor::Continuous(f) => f.error(values.continuous()),
            HybridFactor::Discrete(f) => Ok(-f.value(values.discrete())?.ln()),
            HybridFactor::Mixture(f) => f.error(values),
        }
    }

    /// Error as a function of the discrete keys.
    pub fn error_tree(&self, values: &VectorValues) -> Result<AlgebraicDecisionTree> {
        match self {
            HybridFactor::Continuous(f) => Ok(DecisionTree::leaf(f.error(values)?)),
            HybridFactor::Discrete(f) => Ok(f.error_tree()),
            HybridFactor::Mixture(f) => f.error_tree(values),
        }
    }

    pub fn equals(&self, other: &HybridFactor, tol: f64) -> bool {
        match (self, other) {
            (HybridFactor::Continuous(a), HybridFactor::Continuous(b)) => a.equals(b, tol),
            (HybridFactor::Discrete(a), HybridFactor::Discrete(b)) => a.equals(b, tol),
            (HybridFactor::Mixture(a), HybridFactor::Mixture(b)) => a.equals(b, tol),
            _ => false,
        }
    }
}

impl HybridKeyed for HybridFactor {
    fn continuous_keys(&self) -> Vec<Key> {
        match self {
            HybridFactor::Continuous(f) => f.keys(),
            HybridFactor::Discrete(_) => Vec::new(),
            HybridFactor::Mixture(f) => f.continuous_keys(),
        }
    }

    fn discrete_keys(&self) -> Vec<DiscreteKey> {
        match self {
            HybridFactor::Continuous(_) => Vec::new(),
            HybridFactor::Discrete(f) => f.keys().to_vec(),
            HybridFactor::Mixture(f) => f.discrete_keys(),
        }
    }
}

impl From<JacobianFactor> for HybridFactor {
    fn from(f: JacobianFactor) -> Self {
        HybridFactor::Continuous(Arc::new(f))
    }
}

impl From<DiscreteFactor> for HybridFactor {
    fn from(f: DiscreteFactor) -> Self {
        HybridFactor::Discrete(Arc::new(f))
    }
}

impl From<GaussianMixtureFactor> for HybridFactor {
    fn from(f: GaussianMixtureFactor) -> Self {
        HybridFactor::Mixture(Arc::new(f))
    }
}

impl fmt::Display for HybridFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HybridFactor::Continuous(c) => write!(f, "Continuous {}", c),
            HybridFactor::Discrete(d) => write!(f, "Discrete {}", d),
            HybridFactor::Mixture(m) => write!(f, "{}", m),
        }
    }
}

/// Unordered collection of hybrid factors.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HybridFactorGraph {
    factors: Vec<HybridFactor>,
}

/// Dense solution of one mode.
struct ModeSolution {
    conditional: Arc<GaussianConditional>,
    log_marginal: f64,
}

/// Everything elimination computes before it is packaged as a net.
struct Elimination {
    discrete_keys: Vec<DiscreteKey>,
    frontals: Vec<(Key, usize)>,
    conditionals: Vec<Option<Arc<GaussianConditional>>>,
    probabilities: AlgebraicDecisionTree,
}

impl HybridFactorGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, factor: impl Into<HybridFactor>) {
        self.factors.push(factor.into());
    }

    pub fn len(&self) -> usize {
        self.factors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factors.is_empty()
    }

    pub fn at(&self, index: usize) -> Option<&HybridFactor> {
        self.factors.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &HybridFactor> + '_ {
        self.factors.iter()
    }

    /// Continuous keys, ascending.
    pub fn continuous_keys(&self) -> Vec<Key> {
        let mut keys: Vec<Key> = self.factors.iter().flat_map(|f| f.continuous_keys()).collect();
        keys.sort_unstable();
        keys.dedup();
        keys
    }

    /// Discrete keys in canonical order; cardinalities must agree.
    pub fn discrete_keys(&self) -> Result<Vec<DiscreteKey>> {
        canonical_keys(self.factors.iter().flat_map(|f| f.discrete_keys()))
    }

    /// Fragment tree of every continuous and mixture factor.
    ///
    /// Fails with [`HybridError::Validation`] when two factors disagree on the
    /// cardinality of a discrete key.
    pub fn sum(&self) -> Result<GaussianFactorGraphTree> {
        self.discrete_keys()?;
        let mut tree = empty_graph_tree();
        for factor in &self.factors {
            match factor {
                HybridFactor::Continuous(f) => tree = add_to_every_leaf(&tree, f),
                HybridFactor::Mixture(m) => tree = combine(&tree, &m.as_graph_tree())?,
                HybridFactor::Discrete(_) => {}
            }
        }
        Ok(tree)
    }

    /// Product of the discrete factors (the constant 1 if there are none).
    pub fn discrete_product(&self) -> Result<DiscreteFactor> {
        let mut product = DiscreteFactor::constant(1.0);
        for factor in &self.factors {
            if let HybridFactor::Discrete(f) = factor {
                product = product.product(f)?;
            }
        }
        Ok(product)
    }

    /// Total error as a function of the discrete keys.
    pub fn error_tree(&self, values: &VectorValues) -> Result<AlgebraicDecisionTree> {
        self.discrete_keys()?;
        let mut total = DecisionTree::leaf(0.0);
        for factor in &self.factors {
            total = match factor {
                HybridFactor::Continuous(f) => total.add_scalar(f.error(values)?),
                other => total.add_tree(&other.error_tree(values)?)?,
            };
        }
        Ok(total)
    }

    pub fn error(&self, values: &HybridValues) -> Result<f64> {
        self.factors.iter().map(|f| f.error(values)).sum()
    }

    /// Posterior over the discrete keys with every continuous variable
    /// integrated out.
    pub fn discrete_posterior(&self) -> Result<AlgebraicDecisionTree> {
        self.discrete_posterior_with_config(&InferenceConfig::default())
    }

    pub fn discrete_posterior_with_config(
        &self,
        config: &InferenceConfig,
    ) -> Result<AlgebraicDecisionTree> {
        Ok(self.eliminate_modes(config)?.probabilities)
    }

    /// Eliminates continuous then discrete variables into a hybrid Bayes net.
    pub fn eliminate_sequential(&self) -> Result<HybridBayesNet> {
        self.eliminate_sequential_with_config(&InferenceConfig::default())
    }

    pub fn eliminate_sequential_with_config(
        &self,
        config: &InferenceConfig,
    ) -> Result<HybridBayesNet> {
        let elimination = self.eliminate_modes(config)?;
        let mut net = HybridBayesNet::new();
        if !elimination.frontals.is_empty() {
            let frontal_keys: Vec<Key> = elimination.frontals.iter().map(|(k, _)| *k).collect();
            if elimination.discrete_keys.is_empty() {
                let conditional = elimination
                    .conditionals
                    .into_iter()
                    .flatten()
                    .next()
                    .ok_or_else(|| {
                        HybridError::DegenerateAssignment("no continuous solution".into())
                    })?;
                net.push(HybridConditional::Continuous(conditional));
            } else {
                let branches =
                    DecisionTree::from_values(&elimination.discrete_keys, elimination.conditionals)?;
                net.push(GaussianMixture::from_tree(
                    frontal_keys,
                    Vec::new(),
                    elimination.discrete_keys.clone(),
                    branches,
                )?);
            }
        }
        if !elimination.discrete_keys.is_empty() {
            let joint = DiscreteFactor::new(&elimination.discrete_keys, elimination.probabilities)?;
            net.push(DiscreteConditional::from_joint(&joint)?);
        }
        Ok(net)
    }

    fn eliminate_modes(&self, config: &InferenceConfig) -> Result<Elimination> {
        let config = config.validate()?;
        let frontals = self.continuous_dims()?;
        let discrete_keys = self.discrete_keys()?;
        let discrete = self.discrete_product()?;

        if frontals.is_empty() {
            let joint = DiscreteFactor::new(&discrete_keys, discrete.table().clone())?;
            if !(joint.sum()? > 0.0) {
                return Err(HybridError::DegenerateAssignment(
                    "discrete factors have no positive mass".into(),
                ));
            }
            return Ok(Elimination {
                probabilities: joint.normalize()?.table().clone(),
                discrete_keys,
                frontals,
                conditionals: Vec::new(),
            });
        }

        let tree = self.sum()?;
        let assignments: Vec<DiscreteValues> = Assignments::new(&discrete_keys).collect();
        let solve = |assignment: &DiscreteValues| -> Result<Option<ModeSolution>> {
            match tree.get(assignment)? {
                None => Ok(None),
                Some(fragment) => {
                    let mut solution = solve_mode(fragment, &frontals, &config)?;
                    solution.log_marginal += discrete.value(assignment)?.ln();
                    Ok(Some(solution))
                }
            }
        };

        #[cfg(feature = "parallel")]
        let solutions = assignments
            .par_iter()
            .map(solve)
            .collect::<Result<Vec<_>>>()?;
        #[cfg(not(feature = "parallel"))]
        let solutions = assignments
            .iter()
            .map(solve)
            .collect::<Result<Vec<_>>>()?;

        let logs: Vec<f64> = solutions
            .iter()
            .map(|s| s.as_ref().map_or(f64::NEG_INFINITY, |s| s.log_marginal))
            .collect();
        if logs.iter().all(|l| *l == f64::NEG_INFINITY) {
            return Err(HybridError::DegenerateAssignment(
                "no discrete assignment has positive probability".into(),
            ));
        }
        if let Some(bad) = logs.iter().find(|l| l.is_nan() || **l == f64::INFINITY) {
            return Err(HybridError::Numerical(format!(
                "mode log marginal is {}",
                bad
            )));
        }
        let probabilities =
            DecisionTree::from_values(&discrete_keys, logs)?.softmax_from_log(&discrete_keys)?;

        #[cfg(feature = "tracing")]
        debug!(
            modes = assignments.len(),
            dim = frontals.iter().map(|(_, d)| d).sum::<usize>(),
            "eliminated hybrid factor graph"
        );

        Ok(Elimination {
            discrete_keys,
            frontals,
            conditionals: solutions
                .into_iter()
                .map(|s| s.map(|s| s.conditional))
                .collect(),
            probabilities,
        })
    }

    /// Dimension of every continuous key, checked for consistency.
    fn continuous_dims(&self) -> Result<Vec<(Key, usize)>> {
        let mut dims: BTreeMap<Key, usize> = BTreeMap::new();
        let mut record = |factor: &JacobianFactor| -> Result<()> {
            for (key, a) in factor.terms() {
                match dims.get(key) {
                    Some(&d) if d != a.ncols() => {
                        return Err(HybridError::Validation(format!(
                            "key {} has dimensions {} and {}",
                            format_key(*key),
                            d,
                            a.ncols()
                        )));
                    }
                    Some(_) => {}
                    None => {
                        dims.insert(*key, a.ncols());
                    }
                }
            }
            Ok(())
        };
        for factor in &self.factors {
            match factor {
                HybridFactor::Continuous(f) => record(f)?,
                HybridFactor::Mixture(m) => {
                    for component in m.components().leaves().into_iter().flatten() {
                        record(&component.factor)?;
                    }
                }
                HybridFactor::Discrete(_) => {}
            }
        }
        Ok(dims.into_iter().collect())
    }

    pub fn equals(&self, other: &HybridFactorGraph, tol: f64) -> bool {
        self.factors.len() == other.factors.len()
            && self
                .factors
                .iter()
                .zip(other.factors.iter())
                .all(|(a, b)| a.equals(b, tol))
    }
}

/// Stacks, QR-factors and integrates out one fragment.
fn solve_mode(
    fragment: &GraphFragment,
    frontals: &[(Key, usize)],
    config: &InferenceConfig,
) -> Result<ModeSolution> {
    let mut offsets: FxHashMap<Key, usize> = FxHashMap::default();
    let mut n = 0;
    for (key, dim) in frontals {
        offsets.insert(*key, n);
        n += dim;
    }
    let rows: usize = fragment.factors.iter().map(|f| f.rows()).sum();
    if rows < n {
        return Err(HybridError::Numerical(format!(
            "{} rows cannot determine {} unknowns",
            rows, n
        )));
    }

    let mut ab = DMatrix::<f64>::zeros(rows, n + 1);
    let mut row = 0;
    for factor in &fragment.factors {
        let m = factor.rows();
        for (key, a) in factor.terms() {
            let col = offsets[key];
            ab.view_mut((row, col), (m, a.ncols())).copy_from(a);
        }
        ab.view_mut((row, n), (m, 1)).copy_from(factor.b());
        row += m;
    }

    let r_aug = ab.qr().r();
    let r = r_aug.view((0, 0), (n, n)).into_owned();
    let d = DVector::from_iterator(n, r_aug.view((0, n), (n, 1)).iter().copied());
    let residual = if r_aug.nrows() > n { r_aug[(n, n)] } else { 0.0 };

    let mut log_det_r = 0.0;
    for i in 0..n {
        let diag = r[(i, i)].abs();
        if diag <= config.rank_tolerance {
            return Err(HybridError::Numerical(format!(
                "system is rank deficient at column {}",
                i
            )));
        }
        log_det_r += diag.ln();
    }

    let log_marginal = -fragment.log_normalizer - 0.5 * residual * residual
        + 0.5 * n as f64 * LOG_2PI
        - log_det_r;
    let conditional = GaussianConditional::new(frontals.to_vec(), r, Vec::new(), d)?;
    Ok(ModeSolution {
        conditional: Arc::new(conditional),
        log_marginal,
    })
}

impl fmt::Display for HybridFactorGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "HybridFactorGraph of size {}", self.factors.len())?;
        for (i, factor) in self.factors.iter().enumerate() {
            write!(f, "[{}] {}", i, factor)?;
        }
        Ok(())
    }
}
