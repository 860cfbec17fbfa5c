//! Gaussian noise models used to whiten factors and conditionals.
//!
//! A noise model with standard deviations `σ_i` whitens a residual `r` into
//! `r_i / σ_i`. Its log-normalizer is the negative log of the Gaussian
//! normalization constant:
//!
//! ```text
//! log_normalizer = n/2 · ln(2π) + Σ ln σ_i
//! ```
//!
//! so that `½‖whitened r‖² + log_normalizer` is the negative log of a
//! normalized density.

use nalgebra::{DMatrix, DVector};

use crate::errors::{HybridError, Result};

/// `ln(2π)`.
pub const LOG_2PI: f64 = 1.837_877_066_409_345_5;

/// Diagonal Gaussian noise.
#[derive(Debug, Clone, PartialEq)]
pub enum NoiseModel {
    /// Same sigma on every row.
    Isotropic { dim: usize, sigma: f64 },
    /// One sigma per row.
    Diagonal(DVector<f64>),
}

impl NoiseModel {
    pub fn isotropic(dim: usize, sigma: f64) -> Result<Self> {
        validate_sigma(sigma)?;
        Ok(NoiseModel::Isotropic { dim, sigma })
    }

    pub fn diagonal(sigmas: DVector<f64>) -> Result<Self> {
        for &s in sigmas.iter() {
            validate_sigma(s)?;
        }
        Ok(NoiseModel::Diagonal(sigmas))
    }

    /// Unit noise; whitening is the identity.
    pub fn unit(dim: usize) -> Self {
        NoiseModel::Isotropic { dim, sigma: 1.0 }
    }

    pub fn dim(&self) -> usize {
        match self {
            NoiseModel::Isotropic { dim, .. } => *dim,
            NoiseModel::Diagonal(sigmas) => sigmas.len(),
        }
    }

    pub fn sigma(&self, row: usize) -> f64 {
        match self {
            NoiseModel::Isotropic { sigma, .. } => *sigma,
            NoiseModel::Diagonal(sigmas) => sigmas[row],
        }
    }

    /// Divides row `i` of `v` by `σ_i`.
    pub fn whiten_vector(&self, v: &DVector<f64>) -> Result<DVector<f64>> {
        self.check_rows(v.len())?;
        Ok(DVector::from_iterator(
            v.len(),
            v.iter().enumerate().map(|(i, x)| x / self.sigma(i)),
        ))
    }

    /// Divides row `i` of `m` by `σ_i`.
    pub fn whiten_matrix(&self, m: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        self.check_rows(m.nrows())?;
        let mut out = m.clone();
        for i in 0..out.nrows() {
            let sigma = self.sigma(i);
            out.row_mut(i).iter_mut().for_each(|x| *x /= sigma);
        }
        Ok(out)
    }

    /// Negative log of the normalization constant of `N(0, diag(σ²))`.
    pub fn log_normalizer(&self) -> f64 {
        let n = self.dim();
        let log_det_sigma: f64 = (0..n).map(|i| self.sigma(i).ln()).sum();
        0.5 * n as f64 * LOG_2PI + log_det_sigma
    }

    fn check_rows(&self, rows: usize) -> Result<()> {
        if rows != self.dim() {
            return Err(HybridError::Validation(format!(
                "noise model of dimension {} applied to {} rows",
                self.dim(),
                rows
            )));
        }
        Ok(())
    }
}

fn validate_sigma(sigma: f64) -> Result<()> {
    if !(sigma.is_finite() && sigma > 0.0) {
        return Err(HybridError::Validation(format!(
            "sigma must be finite and > 0, got {}",
            sigma
        )));
    }
    Ok(())
}
