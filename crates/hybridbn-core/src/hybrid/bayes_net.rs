//! # Hybrid Bayes Nets
//!
//! A [`HybridBayesNet`] is an ordered product of [`HybridConditional`]s in
//! elimination order: every parent of a conditional is a frontal of a
//! conditional stored after it, so the discrete roots come last. Solving and
//! sampling walk the sequence from the back.
//!
//! ## Queries
//!
//! - [`HybridBayesNet::choose`] fixes the discrete assignment and returns the
//!   selected [`GaussianBayesNet`].
//! - [`HybridBayesNet::error_tree`] folds every conditional's error into one
//!   tree over all discrete keys; [`HybridBayesNet::log_probability_tree`] and
//!   [`HybridBayesNet::evaluate_tree`] are its negation and exponential.
//! - [`HybridBayesNet::optimize`] returns the joint MPE: the discrete
//!   assignment maximizing `max_x p(x, m)`, then the continuous mean under it.
//! - [`HybridBayesNet::prune`] keeps the most probable discrete assignments
//!   and masks every mixture accordingly, returning a new net.
//! - [`HybridBayesNet::to_factor_graph`] substitutes measurements.
//!
//! Transforms never touch the receiver; unchanged conditionals are shared
//! with the result.

use std::cell::RefCell;
use std::fmt;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
#[cfg(feature = "tracing")]
use tracing::debug;

use crate::config::InferenceConfig;
use crate::discrete::algebraic::AlgebraicDecisionTree;
use crate::discrete::decision_tree::DecisionTree;
use crate::discrete::factor::DiscreteFactor;
use crate::discrete::key::{canonical_keys, DiscreteKey, DiscreteValues, Key};
use crate::discrete::DiscreteConditional;
use crate::errors::{HybridError, Result};
use crate::hybrid::conditional::HybridConditional;
use crate::hybrid::factor::HybridKeyed;
use crate::hybrid::factor_graph::HybridFactorGraph;
use crate::hybrid::values::HybridValues;
use crate::linear::{GaussianBayesNet, VectorValues};

thread_local! {
    /// Process-default sampling stream, one per thread.
    static DEFAULT_RNG: RefCell<StdRng> =
        RefCell::new(StdRng::seed_from_u64(InferenceConfig::default().default_seed));
}

/// Restarts this thread's default sampling stream from `seed`.
pub fn reseed_default_rng(seed: u64) {
    DEFAULT_RNG.with(|rng| *rng.borrow_mut() = StdRng::seed_from_u64(seed));
}

/// Ordered product of hybrid conditionals, roots last.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HybridBayesNet {
    conditionals: Vec<HybridConditional>,
}

enum Coverage {
    All,
    None,
}

impl HybridBayesNet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, conditional: impl Into<HybridConditional>) {
        self.conditionals.push(conditional.into());
    }

    pub fn len(&self) -> usize {
        self.conditionals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conditionals.is_empty()
    }

    pub fn at(&self, index: usize) -> Option<&HybridConditional> {
        self.conditionals.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &HybridConditional> + '_ {
        self.conditionals.iter()
    }

    /// Every discrete key in the net, canonical order. Fails with
    /// [`HybridError::Validation`] when two conditionals disagree on a
    /// cardinality.
    pub fn discrete_keys(&self) -> Result<Vec<DiscreteKey>> {
        canonical_keys(self.conditionals.iter().flat_map(|c| c.discrete_keys()))
    }

    /// Every continuous key in the net, ascending.
    pub fn continuous_keys(&self) -> Vec<Key> {
        let mut keys: Vec<Key> = self
            .conditionals
            .iter()
            .flat_map(|c| c.continuous_keys())
            .collect();
        keys.sort_unstable();
        keys.dedup();
        keys
    }

    /// The Gaussian Bayes net selected by `assignment`.
    ///
    /// Discrete conditionals are dropped and every mixture contributes its
    /// selected branch. Keys the mixtures do not branch on are ignored.
    pub fn choose(&self, assignment: &DiscreteValues) -> Result<GaussianBayesNet> {
        let mut net = GaussianBayesNet::new();
        for conditional in &self.conditionals {
            match conditional {
                HybridConditional::Discrete(_) => {}
                HybridConditional::Continuous(c) => net.push(c.clone()),
                HybridConditional::Hybrid(m) => net.push(m.choose(assignment)?),
            }
        }
        Ok(net)
    }

    /// Exact joint density at `values`.
    pub fn evaluate(&self, values: &HybridValues) -> Result<f64> {
        Ok(self.log_probability(values)?.exp())
    }

    pub fn log_probability(&self, values: &HybridValues) -> Result<f64> {
        self.conditionals
            .iter()
            .map(|c| c.log_probability(values))
            .sum()
    }

    /// Sum of conditional errors, mixtures using their shifted convention.
    pub fn error(&self, values: &HybridValues) -> Result<f64> {
        self.conditionals.iter().map(|c| c.error(values)).sum()
    }

    /// Total error at `values` as a function of every discrete key.
    pub fn error_tree(&self, values: &VectorValues) -> Result<AlgebraicDecisionTree> {
        self.discrete_keys()?;
        let mut total = DecisionTree::leaf(0.0);
        for conditional in &self.conditionals {
            total = match conditional {
                HybridConditional::Continuous(c) => total.add_scalar(c.error(values)?),
                other => total.add_tree(&other.error_tree(values)?)?,
            };
        }
        Ok(total)
    }

    pub fn log_probability_tree(&self, values: &VectorValues) -> Result<AlgebraicDecisionTree> {
        Ok(-&self.error_tree(values)?)
    }

    /// Unnormalized density at `values` per discrete assignment.
    pub fn evaluate_tree(&self, values: &VectorValues) -> Result<AlgebraicDecisionTree> {
        Ok(self.log_probability_tree(values)?.exp())
    }

    /// Normalized `max_x p(x, m)` over every discrete key.
    ///
    /// Each Gaussian branch attains its own normalization constant at its
    /// mean, so the per-mode maximum is the product of the discrete
    /// conditionals times `exp(lnc)` of every selected branch.
    pub fn discrete_posterior(&self) -> Result<AlgebraicDecisionTree> {
        let keys = self.discrete_keys()?;
        let mut total = DecisionTree::leaf(0.0);
        for conditional in &self.conditionals {
            match conditional {
                HybridConditional::Discrete(c) => total = total.add_tree(&c.error_tree())?,
                HybridConditional::Hybrid(m) => total = total.add_tree(&m.normalizer_offsets())?,
                HybridConditional::Continuous(_) => {}
            }
        }
        (-&total).softmax_from_log(&keys)
    }

    /// Most probable explanation with the default configuration.
    pub fn optimize(&self) -> Result<HybridValues> {
        self.optimize_with_config(&InferenceConfig::default())
    }

    /// Most probable explanation.
    ///
    /// Assignments whose posterior lies within `tie_tolerance` of the best are
    /// tied, and the first of them in canonical order wins.
    pub fn optimize_with_config(&self, config: &InferenceConfig) -> Result<HybridValues> {
        let config = config.validate()?;
        let keys = self.discrete_keys()?;
        let posterior = self.discrete_posterior()?;
        let (assignment, best) = posterior.argmax(&keys, &config)?.ok_or_else(|| {
            HybridError::DegenerateAssignment("discrete posterior has no finite value".into())
        })?;
        if !(best > 0.0) {
            return Err(HybridError::DegenerateAssignment(
                "no discrete assignment has positive probability".into(),
            ));
        }

        #[cfg(feature = "tracing")]
        {
            let ties = posterior
                .enumerate(&keys)?
                .into_iter()
                .filter(|(_, p)| config.is_tied(**p, best))
                .count();
            debug!(
                assignment = %crate::discrete::key::format_assignment(&assignment),
                probability = best,
                ties,
                "selected MPE assignment"
            );
        }

        let continuous = self.optimize_assignment(&assignment)?;
        Ok(HybridValues::new(continuous, assignment))
    }

    /// Continuous mean of the Gaussian net selected by `assignment`.
    pub fn optimize_assignment(&self, assignment: &DiscreteValues) -> Result<VectorValues> {
        self.choose(assignment)?.optimize()
    }

    /// Ancestral sample drawn from `rng`, keeping every value in `given`.
    ///
    /// Conditionals whose frontals are all given are skipped. Any other
    /// conditional must find its parents in `given` or among earlier draws,
    /// otherwise the walk fails with [`HybridError::UnresolvedParent`].
    pub fn sample_given_with<R: Rng + ?Sized>(
        &self,
        given: &HybridValues,
        rng: &mut R,
    ) -> Result<HybridValues> {
        let mut result = given.clone();
        for conditional in self.conditionals.iter().rev() {
            let discrete_given = conditional
                .discrete_frontals()
                .iter()
                .all(|dk| result.discrete().contains_key(&dk.key));
            let continuous_given = conditional
                .continuous_frontals()
                .iter()
                .all(|k| result.continuous().contains(*k));
            if discrete_given && continuous_given {
                continue;
            }
            match conditional {
                HybridConditional::Discrete(c) => {
                    let drawn = c
                        .sample(result.discrete(), rng)
                        .map_err(HybridError::into_unresolved_parent)?;
                    for (key, value) in drawn {
                        result.insert_discrete(key, value);
                    }
                }
                HybridConditional::Continuous(c) => {
                    let drawn = c
                        .sample(result.continuous(), rng)
                        .map_err(HybridError::into_unresolved_parent)?;
                    insert_missing(&mut result, &drawn);
                }
                HybridConditional::Hybrid(m) => {
                    let branch = m
                        .choose(result.discrete())
                        .map_err(HybridError::into_unresolved_parent)?;
                    let drawn = branch
                        .sample(result.continuous(), rng)
                        .map_err(HybridError::into_unresolved_parent)?;
                    insert_missing(&mut result, &drawn);
                }
            }
        }
        Ok(result)
    }

    pub fn sample_with<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<HybridValues> {
        self.sample_given_with(&HybridValues::default(), rng)
    }

    /// As [`HybridBayesNet::sample_given_with`] on this thread's default
    /// stream.
    pub fn sample_given(&self, given: &HybridValues) -> Result<HybridValues> {
        DEFAULT_RNG.with(|rng| self.sample_given_with(given, &mut *rng.borrow_mut()))
    }

    pub fn sample(&self) -> Result<HybridValues> {
        self.sample_given(&HybridValues::default())
    }

    /// Keeps the `max_leaves` most probable discrete assignments.
    ///
    /// The product of the discrete conditionals, over every discrete key of
    /// the net, is pruned and renormalized and replaces them as one joint
    /// conditional at the position of the last of them. Every mixture loses
    /// the branches with no surviving support. Gaussian conditionals are
    /// shared unchanged.
    ///
    /// The budget bounds the number of assignments with positive
    /// probability, not the number of tree leaves: zeroed assignments and
    /// the `None` branches of pruned mixtures stay in the trees, so
    /// `nr_leaves()` of the result can exceed `max_leaves`.
    pub fn prune(&self, max_leaves: usize) -> Result<HybridBayesNet> {
        self.prune_with_config(max_leaves, &InferenceConfig::default())
    }

    /// [`HybridBayesNet::prune`] with ties at the cutoff resolved under
    /// `config.tie_tolerance`.
    pub fn prune_with_config(
        &self,
        max_leaves: usize,
        config: &InferenceConfig,
    ) -> Result<HybridBayesNet> {
        let config = config.validate()?;
        if max_leaves == 0 {
            return Err(HybridError::Validation(
                "prune: max_leaves must be > 0".into(),
            ));
        }
        let keys = self.discrete_keys()?;
        if keys.is_empty() {
            return Ok(self.clone());
        }

        let mut product = DiscreteFactor::constant(1.0);
        let mut last_discrete = None;
        for (index, conditional) in self.conditionals.iter().enumerate() {
            if let HybridConditional::Discrete(c) = conditional {
                product = product.product(&c.to_factor()?)?;
                last_discrete = Some(index);
            }
        }
        let joint = DiscreteFactor::new(&keys, product.table().clone())?;
        let pruned = joint.prune_with_config(max_leaves, &config)?;
        if !(pruned.sum()? > 0.0) {
            return Err(HybridError::DegenerateAssignment(
                "discrete conditionals have no positive mass".into(),
            ));
        }

        #[cfg(feature = "tracing")]
        debug!(
            before = joint.nr_nonzero(),
            after = pruned.nr_nonzero(),
            "pruned hybrid Bayes net"
        );

        let replacement = HybridConditional::from(DiscreteConditional::from_joint(&pruned)?);
        let mut net = HybridBayesNet::new();
        for (index, conditional) in self.conditionals.iter().enumerate() {
            match conditional {
                HybridConditional::Discrete(_) => {
                    if Some(index) == last_discrete {
                        net.push(replacement.clone());
                    }
                }
                HybridConditional::Continuous(_) => net.push(conditional.clone()),
                HybridConditional::Hybrid(m) => net.push(m.prune(pruned.table())?),
            }
        }
        if last_discrete.is_none() {
            net.push(replacement);
        }
        Ok(net)
    }

    /// Substitutes `measurements` and returns the factor graph of what remains.
    ///
    /// A conditional with every frontal measured becomes a likelihood on its
    /// parents (mixtures keep each mode's log-normalizer). One with no frontal
    /// measured is converted to a factor over all its keys. Partial coverage
    /// fails with [`HybridError::MissingMeasurement`] on the first unmeasured
    /// frontal.
    pub fn to_factor_graph(&self, measurements: &VectorValues) -> Result<HybridFactorGraph> {
        let mut graph = HybridFactorGraph::new();
        for conditional in &self.conditionals {
            match conditional {
                HybridConditional::Discrete(c) => graph.push(c.to_factor()?),
                HybridConditional::Continuous(c) => {
                    match coverage(&c.frontal_keys(), measurements)? {
                        Coverage::All => graph.push(c.likelihood(measurements)?.0),
                        Coverage::None => graph.push(c.to_factor()?),
                    }
                }
                HybridConditional::Hybrid(m) => match coverage(m.frontal_keys(), measurements)? {
                    Coverage::All => graph.push(m.likelihood(measurements)?),
                    Coverage::None => graph.push(m.to_factor()?),
                },
            }
        }
        Ok(graph)
    }

    /// Conditional-wise equality that reports structural differences.
    pub fn try_equals(&self, other: &HybridBayesNet, tol: f64) -> Result<bool> {
        if self.conditionals.len() != other.conditionals.len() {
            return Err(HybridError::StructuralMismatch(format!(
                "nets have {} and {} conditionals",
                self.conditionals.len(),
                other.conditionals.len()
            )));
        }
        for (a, b) in self.conditionals.iter().zip(other.conditionals.iter()) {
            if !a.try_equals(b, tol)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub fn equals(&self, other: &HybridBayesNet, tol: f64) -> bool {
        self.try_equals(other, tol).unwrap_or(false)
    }
}

fn insert_missing(result: &mut HybridValues, drawn: &VectorValues) {
    for (key, value) in drawn.iter() {
        if !result.continuous().contains(key) {
            result.insert(key, value.clone());
        }
    }
}

fn coverage(frontals: &[Key], measurements: &VectorValues) -> Result<Coverage> {
    let measured = frontals.iter().filter(|k| measurements.contains(**k)).count();
    if measured == frontals.len() {
        return Ok(Coverage::All);
    }
    if measured == 0 {
        return Ok(Coverage::None);
    }
    match frontals.iter().find(|k| !measurements.contains(**k)) {
        Some(&key) => Err(HybridError::MissingMeasurement { key }),
        None => Ok(Coverage::All),
    }
}

impl FromIterator<HybridConditional> for HybridBayesNet {
    fn from_iter<I: IntoIterator<Item = HybridConditional>>(iter: I) -> Self {
        Self {
            conditionals: iter.into_iter().collect(),
        }
    }
}

impl fmt::Display for HybridBayesNet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "HybridBayesNet of size {}", self.conditionals.len())?;
        for (i, c) in self.conditionals.iter().enumerate() {
            writeln!(f, "[{}] {}", i, c)?;
        }
        Ok(())
    }
}
