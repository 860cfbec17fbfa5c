//! Discrete variables: keys, assignments, decision trees and tables.
//!
//! - **key**: keys, discrete keys, assignments and their canonical order
//! - **decision_tree**: the generic structurally shared [`DecisionTree`]
//! - **algebraic**: scalar trees (errors, log-probabilities, probabilities)
//! - **factor**: discrete factors with product and pruning
//! - **conditional**: discrete conditionals with sampling

pub mod algebraic;
pub mod conditional;
pub mod decision_tree;
pub mod factor;
pub mod key;

pub use algebraic::AlgebraicDecisionTree;
pub use conditional::DiscreteConditional;
pub use decision_tree::DecisionTree;
pub use factor::DiscreteFactor;
pub use key::{symbol, DiscreteKey, DiscreteValues, Key};
