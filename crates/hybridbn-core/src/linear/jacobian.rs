//! Whitened linear factors `½‖Σ A_j x_j − b‖²`.

use std::fmt;

use nalgebra::{DMatrix, DVector};

use crate::discrete::key::{format_key, Key};
use crate::errors::{HybridError, Result};
use crate::linear::noise::NoiseModel;
use crate::linear::vector_values::VectorValues;
use crate::linear::{format_matrix, format_vector, matrices_close, vectors_close};

/// Linear least-squares factor with unit noise.
#[derive(Debug, Clone, PartialEq)]
pub struct JacobianFactor {
    terms: Vec<(Key, DMatrix<f64>)>,
    b: DVector<f64>,
}

impl JacobianFactor {
    /// Builds a factor from already whitened blocks.
    ///
    /// Every block must have `b.len()` rows and keys must be distinct.
    pub fn new(terms: Vec<(Key, DMatrix<f64>)>, b: DVector<f64>) -> Result<Self> {
        for (i, (key, a)) in terms.iter().enumerate() {
            if a.nrows() != b.len() {
                return Err(HybridError::Validation(format!(
                    "block for {} has {} rows, rhs has {}",
                    format_key(*key),
                    a.nrows(),
                    b.len()
                )));
            }
            if terms[..i].iter().any(|(k, _)| k == key) {
                return Err(HybridError::Validation(format!(
                    "key {} appears twice in a factor",
                    format_key(*key)
                )));
            }
        }
        Ok(Self { terms, b })
    }

    /// Builds a factor from raw blocks and whitens every row with `noise`.
    pub fn whitened(
        terms: Vec<(Key, DMatrix<f64>)>,
        b: DVector<f64>,
        noise: &NoiseModel,
    ) -> Result<Self> {
        let terms = terms
            .into_iter()
            .map(|(k, a)| noise.whiten_matrix(&a).map(|w| (k, w)))
            .collect::<Result<Vec<_>>>()?;
        Self::new(terms, noise.whiten_vector(&b)?)
    }

    /// A factor with no variables whose error is `½‖b‖²`.
    pub fn constant(b: DVector<f64>) -> Self {
        Self {
            terms: Vec::new(),
            b,
        }
    }

    pub fn keys(&self) -> Vec<Key> {
        self.terms.iter().map(|(k, _)| *k).collect()
    }

    pub fn terms(&self) -> &[(Key, DMatrix<f64>)] {
        &self.terms
    }

    pub fn b(&self) -> &DVector<f64> {
        &self.b
    }

    pub fn rows(&self) -> usize {
        self.b.len()
    }

    /// Column count of the block for `key`.
    pub fn dim(&self, key: Key) -> Option<usize> {
        self.terms
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, a)| a.ncols())
    }

    /// `Σ A_j x_j − b`.
    pub fn residual(&self, values: &VectorValues) -> Result<DVector<f64>> {
        let mut r = -self.b.clone();
        for (key, a) in &self.terms {
            let x = values.at(*key)?;
            if x.len() != a.ncols() {
                return Err(HybridError::Validation(format!(
                    "value for {} has dimension {}, factor expects {}",
                    format_key(*key),
                    x.len(),
                    a.ncols()
                )));
            }
            r += a * x;
        }
        Ok(r)
    }

    /// `½‖Σ A_j x_j − b‖²`.
    pub fn error(&self, values: &VectorValues) -> Result<f64> {
        Ok(0.5 * self.residual(values)?.norm_squared())
    }

    pub fn equals(&self, other: &JacobianFactor, tol: f64) -> bool {
        self.terms.len() == other.terms.len()
            && self
                .terms
                .iter()
                .zip(other.terms.iter())
                .all(|((ka, a), (kb, b))| ka == kb && matrices_close(a, b, tol))
            && vectors_close(&self.b, &other.b, tol)
    }
}

impl fmt::Display for JacobianFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JacobianFactor")?;
        for (key, a) in &self.terms {
            write!(f, " A[{}] = {}", format_key(*key), format_matrix(a))?;
        }
        writeln!(f, " b = {}", format_vector(&self.b))
    }
}
