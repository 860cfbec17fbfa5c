//! Shared fixtures for the hybridbn integration tests.
//!
//! Nets are built in elimination order (children first, discrete roots last).

use std::sync::Arc;

use hybridbn_core::{
    symbol, AlgebraicDecisionTree, DiscreteConditional, DiscreteKey, DiscreteValues,
    GaussianConditional, GaussianMixture, HybridBayesNet, HybridFactorGraph, JacobianFactor, Key,
    NoiseModel, VectorValues,
};
use nalgebra::{DMatrix, DVector};

pub fn x(i: u64) -> Key {
    symbol('x', i)
}

pub fn z(i: u64) -> Key {
    symbol('z', i)
}

pub fn mode(i: u64, cardinality: usize) -> DiscreteKey {
    DiscreteKey::new(symbol('m', i), cardinality).expect("cardinality is positive")
}

pub fn assignment(key: &DiscreteKey, value: usize) -> DiscreteValues {
    DiscreteValues::from([(key.key, value)])
}

pub fn scalars(entries: &[(Key, f64)]) -> VectorValues {
    entries
        .iter()
        .map(|(k, v)| (*k, DVector::from_element(1, *v)))
        .collect()
}

pub fn scalar_at(values: &VectorValues, key: Key) -> f64 {
    values.at(key).expect("value present")[0]
}

/// `x ~ N(mean, σ²)`.
pub fn scalar_prior(key: Key, mean: f64, sigma: f64) -> Arc<GaussianConditional> {
    Arc::new(
        GaussianConditional::from_mean_and_sigma(key, DVector::from_element(1, mean), sigma)
            .expect("valid prior"),
    )
}

/// `child = parent + offset + N(0, σ²)`.
pub fn scalar_chain(child: Key, parent: Key, offset: f64, sigma: f64) -> Arc<GaussianConditional> {
    Arc::new(
        GaussianConditional::from_linear_mean(
            child,
            vec![(parent, DMatrix::identity(1, 1))],
            DVector::from_element(1, offset),
            sigma,
        )
        .expect("valid linear conditional"),
    )
}

/// One-dimensional Gaussian mixture model `p(z0 | m0) P(m0)`.
pub fn gmm(means: &[f64], sigmas: &[f64], prior: &str) -> HybridBayesNet {
    let m0 = mode(0, means.len());
    let branches = means
        .iter()
        .zip(sigmas)
        .map(|(mu, sigma)| scalar_prior(z(0), *mu, *sigma))
        .collect();
    let mut net = HybridBayesNet::new();
    net.push(GaussianMixture::new(vec![z(0)], vec![], vec![m0], branches).expect("valid mixture"));
    net.push(DiscreteConditional::from_signature(m0, &[], prior).expect("valid signature"));
    net
}

/// Normalizes `evaluate_tree` over the net's discrete keys.
pub fn normalized_evaluate_tree(net: &HybridBayesNet, values: &VectorValues) -> AlgebraicDecisionTree {
    let keys = net.discrete_keys().expect("consistent keys");
    net.log_probability_tree(values)
        .expect("complete values")
        .softmax_from_log(&keys)
        .expect("finite tree")
}

/// `p(z1 | x1) p(x1 | m1) p(z0 | x0) p(x0) P(m1)` with `x1 | m1` centered at
/// 1 or 3 with the given sigmas, measurement noise 1 on `z0` and 3 on `z1`.
///
/// `p(z1 | x1)` is only included when `with_z1` is set.
pub fn two_state_model(sigmas: [f64; 2], with_z1: bool) -> HybridBayesNet {
    let m1 = mode(1, 2);
    let mut net = HybridBayesNet::new();
    if with_z1 {
        net.push(scalar_chain(z(1), x(1), 0.0, 3.0));
    }
    net.push(scalar_chain(z(0), x(0), 0.0, 1.0));
    net.push(scalar_prior(x(0), 0.0, 1.0));
    net.push(
        GaussianMixture::new(
            vec![x(1)],
            vec![],
            vec![m1],
            vec![scalar_prior(x(1), 1.0, sigmas[0]), scalar_prior(x(1), 3.0, sigmas[1])],
        )
        .expect("valid mixture"),
    );
    net.push(DiscreteConditional::from_signature(m1, &[], "1/1").expect("valid signature"));
    net
}

/// Factor graph of a switching between-measurement in delta coordinates.
///
/// `p(z1 | x0, x1, m1)` says `z1 + (x1 − x0) = μ_m − (x1* − x0*)` with noise
/// `σ_m`, linearized at `(x0*, x1*) = linearization`. Measuring `z1` leaves a
/// mixture likelihood on `(x0, x1)`, to which a tight prior keeping `x0` at
/// its linearization point is added.
pub fn switching_between_graph(
    linearization: [f64; 2],
    means: [f64; 2],
    sigmas: [f64; 2],
    z1: f64,
) -> HybridFactorGraph {
    let m1 = mode(1, 2);
    let branches = means
        .iter()
        .zip(sigmas.iter())
        .map(|(mu, sigma)| {
            let noise = NoiseModel::isotropic(1, *sigma).expect("positive sigma");
            let d = mu - (linearization[1] - linearization[0]);
            Arc::new(
                GaussianConditional::with_noise(
                    z(1),
                    DVector::from_element(1, d),
                    DMatrix::identity(1, 1),
                    vec![
                        (x(0), DMatrix::from_element(1, 1, -1.0)),
                        (x(1), DMatrix::identity(1, 1)),
                    ],
                    &noise,
                )
                .expect("valid branch"),
            )
        })
        .collect();
    let mixture = GaussianMixture::new(vec![z(1)], vec![x(0), x(1)], vec![m1], branches)
        .expect("valid mixture");
    let mut net = HybridBayesNet::new();
    net.push(mixture);

    let mut graph = net
        .to_factor_graph(&scalars(&[(z(1), z1)]))
        .expect("z1 measured");
    graph.push(tight_prior(x(0), 0.0));
    graph
}

/// Linearized prior `δx = value` with sigma `1e-3`.
pub fn tight_prior(key: Key, value: f64) -> JacobianFactor {
    JacobianFactor::whitened(
        vec![(key, DMatrix::identity(1, 1))],
        DVector::from_element(1, value),
        &NoiseModel::isotropic(1, 1e-3).expect("positive sigma"),
    )
    .expect("valid prior")
}

/// Density of `N(mean, variance)` at `value`.
pub fn normal_pdf(value: f64, mean: f64, variance: f64) -> f64 {
    let r = value - mean;
    (-0.5 * r * r / variance).exp() / (2.0 * std::f64::consts::PI * variance).sqrt()
}
