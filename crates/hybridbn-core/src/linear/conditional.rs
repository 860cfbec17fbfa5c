//! # Gaussian Conditionals
//!
//! A [`GaussianConditional`] is the density `p(x | y)` written in whitened
//! square-root information form
//!
//! ```text
//! R x + Σ_j S_j y_j = d + ε,   ε ~ N(0, I)
//! ```
//!
//! with `R` upper triangular. From that form:
//!
//! - the conditional mean is `R⁻¹ (d − Σ S_j y_j)` (back-substitution);
//! - the error is `½‖R x + Σ S_j y_j − d‖²`;
//! - the log normalization constant is `−n/2 · ln 2π + Σ ln |R_ii|`;
//! - the log density is `lnc − error`.
//!
//! Frontal variables may be several stacked vectors; `R` spans all of them in
//! the order they are listed.

use std::fmt;

use nalgebra::{DMatrix, DVector};
use rand::Rng;
use rand_distr::StandardNormal;

use crate::discrete::key::{format_key, Key};
use crate::errors::{HybridError, Result};
use crate::linear::jacobian::JacobianFactor;
use crate::linear::noise::{NoiseModel, LOG_2PI};
use crate::linear::vector_values::VectorValues;
use crate::linear::{format_matrix, format_vector, matrices_close, vectors_close};

const TRIANGULAR_TOL: f64 = 1e-12;

/// Gaussian density over frontal vectors given parent vectors.
#[derive(Debug, Clone, PartialEq)]
pub struct GaussianConditional {
    frontals: Vec<(Key, usize)>,
    r: DMatrix<f64>,
    parents: Vec<(Key, DMatrix<f64>)>,
    d: DVector<f64>,
}

impl GaussianConditional {
    /// Builds a conditional from whitened blocks.
    ///
    /// `frontals` lists each frontal key with its dimension; `r` must be
    /// square, upper triangular and non-singular over their total dimension.
    pub fn new(
        frontals: Vec<(Key, usize)>,
        r: DMatrix<f64>,
        parents: Vec<(Key, DMatrix<f64>)>,
        d: DVector<f64>,
    ) -> Result<Self> {
        if frontals.is_empty() {
            return Err(HybridError::Validation(
                "gaussian conditional needs at least one frontal key".into(),
            ));
        }
        let n: usize = frontals.iter().map(|(_, dim)| dim).sum();
        if r.nrows() != n || r.ncols() != n || d.len() != n {
            return Err(HybridError::Validation(format!(
                "R must be {n}x{n} and d of length {n}, got {}x{} and {}",
                r.nrows(),
                r.ncols(),
                d.len()
            )));
        }
        for i in 0..n {
            if r[(i, i)] == 0.0 || !r[(i, i)].is_finite() {
                return Err(HybridError::Validation(format!(
                    "R has a zero or non-finite diagonal entry at {}",
                    i
                )));
            }
            for j in 0..i {
                if r[(i, j)].abs() > TRIANGULAR_TOL {
                    return Err(HybridError::Validation(
                        "R must be upper triangular".into(),
                    ));
                }
            }
        }
        let mut seen: Vec<Key> = frontals.iter().map(|(k, _)| *k).collect();
        for (key, s) in &parents {
            if s.nrows() != n {
                return Err(HybridError::Validation(format!(
                    "parent block for {} has {} rows, expected {}",
                    format_key(*key),
                    s.nrows(),
                    n
                )));
            }
            if seen.contains(key) {
                return Err(HybridError::Validation(format!(
                    "key {} appears twice in a conditional",
                    format_key(*key)
                )));
            }
            seen.push(*key);
        }
        Ok(Self {
            frontals,
            r,
            parents,
            d,
        })
    }

    /// Builds `R x + Σ S_j y_j = d` for a single frontal key with measurement
    /// noise `noise`, whitening every block.
    pub fn with_noise(
        frontal: Key,
        d: DVector<f64>,
        r: DMatrix<f64>,
        parents: Vec<(Key, DMatrix<f64>)>,
        noise: &NoiseModel,
    ) -> Result<Self> {
        let dim = r.ncols();
        let r = noise.whiten_matrix(&r)?;
        let parents = parents
            .into_iter()
            .map(|(k, s)| noise.whiten_matrix(&s).map(|w| (k, w)))
            .collect::<Result<Vec<_>>>()?;
        Self::new(vec![(frontal, dim)], r, parents, noise.whiten_vector(&d)?)
    }

    /// Prior `x ~ N(mean, σ² I)`.
    pub fn from_mean_and_sigma(frontal: Key, mean: DVector<f64>, sigma: f64) -> Result<Self> {
        let n = mean.len();
        let noise = NoiseModel::isotropic(n, sigma)?;
        Self::with_noise(frontal, mean, DMatrix::identity(n, n), Vec::new(), &noise)
    }

    /// Linear-Gaussian `x = Σ A_j y_j + b + N(0, σ² I)`.
    pub fn from_linear_mean(
        frontal: Key,
        parents: Vec<(Key, DMatrix<f64>)>,
        b: DVector<f64>,
        sigma: f64,
    ) -> Result<Self> {
        let n = b.len();
        let noise = NoiseModel::isotropic(n, sigma)?;
        let parents = parents.into_iter().map(|(k, a)| (k, -a)).collect();
        Self::with_noise(frontal, b, DMatrix::identity(n, n), parents, &noise)
    }

    pub fn frontals(&self) -> &[(Key, usize)] {
        &self.frontals
    }

    pub fn frontal_keys(&self) -> Vec<Key> {
        self.frontals.iter().map(|(k, _)| *k).collect()
    }

    pub fn parent_keys(&self) -> Vec<Key> {
        self.parents.iter().map(|(k, _)| *k).collect()
    }

    /// Frontal keys followed by parent keys.
    pub fn keys(&self) -> Vec<Key> {
        let mut keys = self.frontal_keys();
        keys.extend(self.parent_keys());
        keys
    }

    /// Total frontal dimension.
    pub fn dim(&self) -> usize {
        self.r.nrows()
    }

    pub fn r(&self) -> &DMatrix<f64> {
        &self.r
    }

    pub fn parents(&self) -> &[(Key, DMatrix<f64>)] {
        &self.parents
    }

    pub fn d(&self) -> &DVector<f64> {
        &self.d
    }

    /// `d − Σ S_j y_j` at the parent values.
    pub fn rhs(&self, values: &VectorValues) -> Result<DVector<f64>> {
        let mut rhs = self.d.clone();
        for (key, s) in &self.parents {
            let y = values.at(*key)?;
            check_dim(*key, y, s.ncols())?;
            rhs -= s * y;
        }
        Ok(rhs)
    }

    /// Conditional mean of the frontals given the parents.
    pub fn solve(&self, parents: &VectorValues) -> Result<VectorValues> {
        let rhs = self.rhs(parents)?;
        let x = self.back_substitute(&rhs)?;
        Ok(self.split_frontals(&x))
    }

    /// `½‖R x + Σ S_j y_j − d‖²`; `values` must hold frontals and parents.
    pub fn error(&self, values: &VectorValues) -> Result<f64> {
        let x = self.stack_frontals(values)?;
        let residual = &self.r * x - self.rhs(values)?;
        Ok(0.5 * residual.norm_squared())
    }

    /// `−n/2 · ln 2π + Σ ln |R_ii|`.
    pub fn log_normalization_constant(&self) -> f64 {
        let n = self.dim();
        let log_det_r: f64 = (0..n).map(|i| self.r[(i, i)].abs().ln()).sum();
        -0.5 * n as f64 * LOG_2PI + log_det_r
    }

    pub fn log_probability(&self, values: &VectorValues) -> Result<f64> {
        Ok(self.log_normalization_constant() - self.error(values)?)
    }

    pub fn evaluate(&self, values: &VectorValues) -> Result<f64> {
        Ok(self.log_probability(values)?.exp())
    }

    /// Draws the frontals given the parents: `x = mean + R⁻¹ z`, `z ~ N(0, I)`.
    pub fn sample<R: Rng + ?Sized>(&self, parents: &VectorValues, rng: &mut R) -> Result<VectorValues> {
        let mut rhs = self.rhs(parents)?;
        for entry in rhs.iter_mut() {
            let z: f64 = rng.sample(StandardNormal);
            *entry += z;
        }
        let x = self.back_substitute(&rhs)?;
        Ok(self.split_frontals(&x))
    }

    /// Fixes the frontals at `values`, returning a factor on the parents and
    /// the negative log normalization constant of this density.
    ///
    /// The factor's error plus the returned constant is `−ln p(x | y)` as a
    /// function of the parents.
    pub fn likelihood(&self, values: &VectorValues) -> Result<(JacobianFactor, f64)> {
        let x = self.stack_frontals(values)?;
        let b = &self.d - &self.r * x;
        let factor = JacobianFactor::new(self.parents.clone(), b)?;
        Ok((factor, -self.log_normalization_constant()))
    }

    /// The conditional as a factor over all its keys (error only).
    pub fn to_factor(&self) -> Result<JacobianFactor> {
        let mut terms = Vec::with_capacity(self.frontals.len() + self.parents.len());
        let mut offset = 0;
        for (key, dim) in &self.frontals {
            terms.push((*key, self.r.columns(offset, *dim).into_owned()));
            offset += dim;
        }
        terms.extend(self.parents.iter().cloned());
        JacobianFactor::new(terms, self.d.clone())
    }

    pub fn equals(&self, other: &GaussianConditional, tol: f64) -> bool {
        self.frontals == other.frontals
            && matrices_close(&self.r, &other.r, tol)
            && self.parents.len() == other.parents.len()
            && self
                .parents
                .iter()
                .zip(other.parents.iter())
                .all(|((ka, a), (kb, b))| ka == kb && matrices_close(a, b, tol))
            && vectors_close(&self.d, &other.d, tol)
    }

    fn back_substitute(&self, rhs: &DVector<f64>) -> Result<DVector<f64>> {
        self.r
            .solve_upper_triangular(rhs)
            .ok_or_else(|| HybridError::Numerical("R is singular".into()))
    }

    fn stack_frontals(&self, values: &VectorValues) -> Result<DVector<f64>> {
        let mut x = DVector::zeros(self.dim());
        let mut offset = 0;
        for (key, dim) in &self.frontals {
            let v = values.at(*key)?;
            check_dim(*key, v, *dim)?;
            x.rows_mut(offset, *dim).copy_from(v);
            offset += dim;
        }
        Ok(x)
    }

    fn split_frontals(&self, x: &DVector<f64>) -> VectorValues {
        let mut out = VectorValues::new();
        let mut offset = 0;
        for (key, dim) in &self.frontals {
            out.insert(*key, x.rows(offset, *dim).into_owned());
            offset += dim;
        }
        out
    }
}

fn check_dim(key: Key, v: &DVector<f64>, expected: usize) -> Result<()> {
    if v.len() != expected {
        return Err(HybridError::Validation(format!(
            "value for {} has dimension {}, expected {}",
            format_key(key),
            v.len(),
            expected
        )));
    }
    Ok(())
}

impl fmt::Display for GaussianConditional {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let frontals: Vec<String> = self.frontals.iter().map(|(k, _)| format_key(*k)).collect();
        let parents: Vec<String> = self.parents.iter().map(|(k, _)| format_key(*k)).collect();
        if parents.is_empty() {
            writeln!(f, "p({})", frontals.join(" "))?;
        } else {
            writeln!(f, "p({} | {})", frontals.join(" "), parents.join(" "))?;
        }
        writeln!(f, "  R = {}", format_matrix(&self.r))?;
        for (key, s) in &self.parents {
            writeln!(f, "  S[{}] = {}", format_key(*key), format_matrix(s))?;
        }
        writeln!(f, "  d = {}", format_vector(&self.d))
    }
}
