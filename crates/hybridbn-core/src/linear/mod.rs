//! Linear-Gaussian building blocks.
//!
//! Everything in this module is expressed in whitened (square-root
//! information) form, so errors are plain halves of squared norms:
//!
//! - **vector_values**: continuous assignments
//! - **noise**: isotropic and diagonal noise models
//! - **jacobian**: factors `½‖Σ A_j x_j − b‖²`
//! - **conditional**: Gaussian conditionals `R x + Σ S_j y_j = d`
//! - **bayes_net**: chains of Gaussian conditionals solved by back-substitution

pub mod bayes_net;
pub mod conditional;
pub mod jacobian;
pub mod noise;
pub mod vector_values;

pub use bayes_net::GaussianBayesNet;
pub use conditional::GaussianConditional;
pub use jacobian::JacobianFactor;
pub use noise::{NoiseModel, LOG_2PI};
pub use vector_values::VectorValues;

use nalgebra::{DMatrix, DVector};

pub(crate) fn matrices_close(a: &DMatrix<f64>, b: &DMatrix<f64>, tol: f64) -> bool {
    a.shape() == b.shape() && a.iter().zip(b.iter()).all(|(x, y)| (x - y).abs() <= tol)
}

pub(crate) fn vectors_close(a: &DVector<f64>, b: &DVector<f64>, tol: f64) -> bool {
    a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| (x - y).abs() <= tol)
}

pub(crate) fn format_vector(v: &DVector<f64>) -> String {
    let entries: Vec<String> = v.iter().map(|x| format!("{}", x)).collect();
    format!("[{}]", entries.join(", "))
}

pub(crate) fn format_matrix(m: &DMatrix<f64>) -> String {
    let rows: Vec<String> = m
        .row_iter()
        .map(|row| {
            row.iter()
                .map(|x| format!("{}", x))
                .collect::<Vec<_>>()
                .join(", ")
        })
        .collect();
    format!("[{}]", rows.join("; "))
}
