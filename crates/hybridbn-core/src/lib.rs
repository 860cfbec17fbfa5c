//! # Hybrid Bayes Nets
//!
//! Decision-tree algebra and hybrid Bayes nets mixing discrete modes with
//! linear-Gaussian continuous variables.
//!
//! The crate is organized bottom-up:
//!
//! - [`discrete`]: keys, assignments, the structurally shared
//!   [`DecisionTree`] and discrete factors/conditionals
//! - [`linear`]: whitened Gaussian factors, conditionals and Bayes nets
//! - [`hybrid`]: mixtures, [`HybridBayesNet`] queries and
//!   [`HybridFactorGraph`] elimination
//!
//! ## Example
//!
//! ```
//! use hybridbn_core::{
//!     symbol, DiscreteConditional, DiscreteKey, GaussianConditional, GaussianMixture,
//!     HybridBayesNet,
//! };
//! use nalgebra::DVector;
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), hybridbn_core::HybridError> {
//! let mode = DiscreteKey::new(symbol('m', 0), 2)?;
//! let x = symbol('x', 0);
//! let branch = |mean: f64| -> Result<_, hybridbn_core::HybridError> {
//!     Ok(Arc::new(GaussianConditional::from_mean_and_sigma(
//!         x,
//!         DVector::from_element(1, mean),
//!         1.0,
//!     )?))
//! };
//!
//! let mut net = HybridBayesNet::new();
//! net.push(GaussianMixture::new(vec![x], vec![], vec![mode], vec![branch(0.0)?, branch(2.0)?])?);
//! net.push(DiscreteConditional::from_signature(mode, &[], "1/3")?);
//!
//! let mpe = net.optimize()?;
//! assert_eq!(mpe.at_discrete(mode.key)?, 1);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

pub mod config;
pub mod discrete;
pub mod errors;
pub mod hybrid;
pub mod linear;

pub use config::InferenceConfig;
pub use discrete::{
    symbol, AlgebraicDecisionTree, DecisionTree, DiscreteConditional, DiscreteFactor, DiscreteKey,
    DiscreteValues, Key,
};
pub use errors::{HybridError, Result};
pub use hybrid::{
    reseed_default_rng, GaussianMixture, GaussianMixtureFactor, HybridBayesNet, HybridCategory,
    HybridConditional, HybridFactor, HybridFactorGraph, HybridKeyed, HybridValues,
};
pub use linear::{GaussianBayesNet, GaussianConditional, JacobianFactor, NoiseModel, VectorValues};
