//! Error types for hybrid inference.

use thiserror::Error;

use crate::discrete::key::{format_key, Key};

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, HybridError>;

/// Errors raised by tree algebra, conditionals, Bayes nets and factor graphs.
///
/// Every variant is a local precondition violation surfaced synchronously at the
/// point where it is detected. Nothing in this crate retries or recovers.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// without breaking changes.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HybridError {
    /// A discrete assignment lacks a key needed on the traversed path.
    #[error("missing assignment for discrete key {}", format_key(*.key))]
    MissingAssignment { key: Key },

    /// Ancestral walk reached a conditional whose parent is not yet resolved.
    #[error("parent {} is not resolved; conditionals are not in ancestral order", format_key(*.key))]
    UnresolvedParent { key: Key },

    /// Measurements only partially cover a conditional's frontal keys.
    #[error("no measurement for frontal key {}", format_key(*.key))]
    MissingMeasurement { key: Key },

    /// No assignment carries positive probability mass.
    #[error("degenerate assignment: {0}")]
    DegenerateAssignment(String),

    /// Equality was requested across incompatible categories or key sets.
    #[error("structural mismatch: {0}")]
    StructuralMismatch(String),

    /// A discrete value lies outside `[0, cardinality)`.
    #[error(
        "value {value} out of range for discrete key {} with cardinality {cardinality}",
        format_key(*.key)
    )]
    InvalidAssignment {
        key: Key,
        value: usize,
        cardinality: usize,
    },

    /// A continuous value needed by the computation is absent.
    #[error("missing continuous value for key {}", format_key(*.key))]
    MissingValue { key: Key },

    /// Construction-time violation (sizes, categories, cardinalities, config).
    #[error("validation error: {0}")]
    Validation(String),

    /// Singular systems, non-finite results.
    #[error("numerical error: {0}")]
    Numerical(String),
}

impl HybridError {
    /// During an ancestral walk an absent value means a parent has not been
    /// resolved yet.
    pub(crate) fn into_unresolved_parent(self) -> HybridError {
        match self {
            HybridError::MissingValue { key } | HybridError::MissingAssignment { key } => {
                HybridError::UnresolvedParent { key }
            }
            other => other,
        }
    }
}
