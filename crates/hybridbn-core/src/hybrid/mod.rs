//! Hybrid discrete/continuous models.
//!
//! - **factor**: categories and the key surface shared by every hybrid type
//! - **values**: joint continuous and discrete assignments
//! - **mixture_factor**: decision trees of Gaussian factors and their
//!   combination into per-mode graph fragments
//! - **mixture**: Gaussian mixtures, the conditional `p(x | y, m)`
//! - **conditional**: the Discrete / Continuous / Hybrid conditional sum type
//! - **bayes_net**: ordered hybrid Bayes nets and their queries
//! - **factor_graph**: hybrid factor graphs and dense elimination

pub mod bayes_net;
pub mod conditional;
pub mod factor;
pub mod factor_graph;
pub mod mixture;
pub mod mixture_factor;
pub mod values;

pub use bayes_net::{reseed_default_rng, HybridBayesNet};
pub use conditional::HybridConditional;
pub use factor::{HybridCategory, HybridKeyed};
pub use factor_graph::{HybridFactor, HybridFactorGraph};
pub use mixture::GaussianMixture;
pub use mixture_factor::{GaussianFactorGraphTree, GaussianMixtureFactor, GraphFragment, MixtureComponent};
pub use values::HybridValues;
