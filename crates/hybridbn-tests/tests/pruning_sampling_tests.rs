//! Pruning, sampling, tie-breaking and factor-graph conversion on multi-mode
//! nets.

use std::collections::HashMap;
use std::sync::Arc;

use approx::assert_abs_diff_eq;
use hybridbn_core::discrete::key::Assignments;
use hybridbn_core::{
    reseed_default_rng, DecisionTree, DiscreteConditional, GaussianConditional, GaussianMixture,
    HybridBayesNet, HybridError, HybridValues,
};
use hybridbn_tests::{assignment, gmm, mode, scalar_chain, scalar_prior, scalars, x, z};
use nalgebra::{DMatrix, DVector};
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

/// `p(x2 | x1, m2) p(x1 | m1) P(m2 | m1) P(m1)`: two chained mixtures.
fn chained_mixtures() -> HybridBayesNet {
    let m1 = mode(1, 2);
    let m2 = mode(2, 3);
    let mut net = HybridBayesNet::new();
    net.push(
        GaussianMixture::new(
            vec![x(2)],
            vec![x(1)],
            vec![m2],
            vec![
                scalar_chain(x(2), x(1), -1.0, 0.5),
                scalar_chain(x(2), x(1), 0.0, 1.0),
                scalar_chain(x(2), x(1), 1.0, 2.0),
            ],
        )
        .unwrap(),
    );
    net.push(
        GaussianMixture::new(
            vec![x(1)],
            vec![],
            vec![m1],
            vec![scalar_prior(x(1), 0.0, 1.0), scalar_prior(x(1), 5.0, 1.0)],
        )
        .unwrap(),
    );
    net.push(DiscreteConditional::from_signature(m2, &[m1], "1/2/7 5/3/2").unwrap());
    net.push(DiscreteConditional::from_signature(m1, &[], "3/1").unwrap());
    net
}

#[test]
fn prune_replaces_discrete_conditionals_with_one_joint() {
    let net = chained_mixtures();
    let pruned = net.prune(3).unwrap();
    assert_eq!(pruned.len(), 3);
    assert!(pruned.at(0).unwrap().as_mixture().is_some());
    assert!(pruned.at(1).unwrap().as_mixture().is_some());
    let joint = pruned.at(2).unwrap().as_discrete().unwrap();

    // Joint P(m1, m2): 0.075 0.15 0.525 0.125 0.075 0.05; the top three are
    // (0,2) (0,1) (1,0).
    let keys = pruned.discrete_keys().unwrap();
    let kept: Vec<_> = Assignments::new(&keys)
        .filter(|a| joint.probability(a).unwrap() > 0.0)
        .collect();
    assert_eq!(kept.len(), 3);
    let total = 0.525 + 0.15 + 0.125;
    let p = |m1: usize, m2: usize| {
        let mut a = assignment(&mode(1, 2), m1);
        a.insert(mode(2, 3).key, m2);
        joint.probability(&a).unwrap()
    };
    assert_abs_diff_eq!(p(0, 2), 0.525 / total, epsilon = 1e-12);
    assert_abs_diff_eq!(p(0, 1), 0.15 / total, epsilon = 1e-12);
    assert_abs_diff_eq!(p(1, 0), 0.125 / total, epsilon = 1e-12);
    assert_abs_diff_eq!(p(0, 0), 0.0, epsilon = 1e-12);

    // Every m1 and m2 value still has some completion, so no branch is lost.
    assert_eq!(pruned.at(0).unwrap().as_mixture().unwrap().nr_available().unwrap(), 3);
    assert_eq!(pruned.at(1).unwrap().as_mixture().unwrap().nr_available().unwrap(), 2);
}

#[test]
fn prune_masks_mixture_branches_without_support() {
    let net = gmm(&[0.0, 1.0, 2.0, 3.0], &[1.0; 4], "4/3/2/1");
    let pruned = net.prune(2).unwrap();
    let m0 = mode(0, 4);
    let mixture = pruned.at(0).unwrap().as_mixture().unwrap();
    assert_eq!(mixture.nr_available().unwrap(), 2);
    for v in 2..4 {
        assert!(matches!(
            pruned.choose(&assignment(&m0, v)),
            Err(HybridError::DegenerateAssignment(_))
        ));
        let values = HybridValues::new(scalars(&[(z(0), 0.0)]), assignment(&m0, v));
        assert_eq!(pruned.evaluate(&values).unwrap(), 0.0);
        let tree = pruned.error_tree(values.continuous()).unwrap();
        assert_eq!(*tree.get(&assignment(&m0, v)).unwrap(), f64::INFINITY);
    }
}

#[test]
fn prune_keeps_retained_queries_up_to_renormalization() {
    let net = gmm(&[0.0, 1.0, 2.0, 3.0], &[1.0, 0.5, 2.0, 1.5], "4/3/2/1");
    let pruned = net.prune(2).unwrap();
    let m0 = mode(0, 4);
    let x = scalars(&[(z(0), 0.7)]);
    let ratio = |net: &HybridBayesNet, v: usize| {
        net.evaluate(&HybridValues::new(x.clone(), assignment(&m0, v)))
            .unwrap()
    };
    let before = ratio(&net, 0) / ratio(&net, 1);
    let after = ratio(&pruned, 0) / ratio(&pruned, 1);
    assert_abs_diff_eq!(before, after, epsilon = 1e-9);

    for v in 0..2 {
        let a = assignment(&m0, v);
        assert!(net
            .optimize_assignment(&a)
            .unwrap()
            .equals(&pruned.optimize_assignment(&a).unwrap(), 1e-12));
    }
}

#[test]
fn prune_rejects_zero_and_passes_through_continuous_nets() {
    assert!(matches!(
        chained_mixtures().prune(0),
        Err(HybridError::Validation(_))
    ));

    let mut net = HybridBayesNet::new();
    net.push(scalar_chain(x(1), x(0), 1.0, 1.0));
    net.push(scalar_prior(x(0), 0.0, 1.0));
    assert!(net.prune(1).unwrap().equals(&net, 0.0));
}

#[test]
fn optimize_breaks_ties_on_the_first_canonical_assignment() {
    let a = mode(1, 2);
    let b = mode(2, 3);
    let mut net = HybridBayesNet::new();
    net.push(
        GaussianMixture::new(
            vec![x(0)],
            vec![],
            vec![a, b],
            (0..6).map(|i| scalar_prior(x(0), i as f64, 1.0)).collect(),
        )
        .unwrap(),
    );
    net.push(DiscreteConditional::from_signature(b, &[], "1/1/1").unwrap());
    net.push(DiscreteConditional::from_signature(a, &[], "1/1").unwrap());
    let mpe = net.optimize().unwrap();
    let mut expected = assignment(&a, 0);
    expected.insert(b.key, 0);
    assert_eq!(mpe.discrete(), &expected);
    assert_abs_diff_eq!(mpe.at(x(0)).unwrap()[0], 0.0, epsilon = 1e-12);

    // A strictly better later assignment wins over the canonical first.
    let mut net = HybridBayesNet::new();
    net.push(
        GaussianMixture::new(
            vec![x(0)],
            vec![],
            vec![a, b],
            (0..6).map(|i| scalar_prior(x(0), i as f64, 1.0)).collect(),
        )
        .unwrap(),
    );
    net.push(DiscreteConditional::from_signature(b, &[], "1/1/1.001").unwrap());
    net.push(DiscreteConditional::from_signature(a, &[], "1/1").unwrap());
    let mpe = net.optimize().unwrap();
    let mut expected = assignment(&a, 0);
    expected.insert(b.key, 2);
    assert_eq!(mpe.discrete(), &expected);
}

#[test]
fn optimize_without_any_available_branch_is_degenerate() {
    let m0 = mode(0, 2);
    let mixture = GaussianMixture::new(
        vec![x(0)],
        vec![],
        vec![m0],
        vec![scalar_prior(x(0), 0.0, 1.0), scalar_prior(x(0), 1.0, 1.0)],
    )
    .unwrap();
    let no_support = DecisionTree::from_values(&[m0], vec![0.0, 0.0]).unwrap();
    let mut net = HybridBayesNet::new();
    net.push(mixture.prune(&no_support).unwrap());
    assert!(matches!(
        net.optimize(),
        Err(HybridError::DegenerateAssignment(_))
    ));
}

#[test]
fn sampling_is_reproducible_and_follows_the_prior() {
    let net = gmm(&[0.0, 10.0], &[1.0, 1.0], "1/3");
    let m0 = mode(0, 2);

    let first: Vec<HybridValues> = {
        let mut rng = StdRng::seed_from_u64(2024);
        (0..5).map(|_| net.sample_with(&mut rng).unwrap()).collect()
    };
    let second: Vec<HybridValues> = {
        let mut rng = StdRng::seed_from_u64(2024);
        (0..5).map(|_| net.sample_with(&mut rng).unwrap()).collect()
    };
    for (a, b) in first.iter().zip(&second) {
        assert!(a.equals(b, 0.0));
    }

    let mut rng = StdRng::seed_from_u64(7);
    let n = 4000;
    let mut counts: HashMap<usize, usize> = HashMap::new();
    for _ in 0..n {
        let s = net.sample_with(&mut rng).unwrap();
        let v = s.at_discrete(m0.key).unwrap();
        *counts.entry(v).or_default() += 1;
        // Branch means are far apart, so each sample sits near its own mean.
        let mean = if v == 0 { 0.0 } else { 10.0 };
        assert!((s.at(z(0)).unwrap()[0] - mean).abs() < 6.0);
    }
    let fraction = counts.get(&1).copied().unwrap_or(0) as f64 / n as f64;
    assert!((fraction - 0.75).abs() < 0.03, "fraction {}", fraction);
}

#[test]
fn default_stream_evolves_and_can_be_reseeded() {
    let net = gmm(&[0.0, 10.0], &[1.0, 1.0], "1/1");
    reseed_default_rng(99);
    let a = net.sample().unwrap();
    let b = net.sample().unwrap();
    reseed_default_rng(99);
    let c = net.sample().unwrap();
    let d = net.sample().unwrap();
    assert!(a.equals(&c, 0.0));
    assert!(b.equals(&d, 0.0));
    assert!(!a.equals(&b, 0.0));
}

#[test]
fn sample_given_keeps_given_modes_and_values() {
    let net = chained_mixtures();
    let m1 = mode(1, 2);
    let given = HybridValues::new(scalars(&[(x(1), 5.0)]), assignment(&m1, 1));
    let mut rng = StdRng::seed_from_u64(5);
    for _ in 0..20 {
        let s = net.sample_given_with(&given, &mut rng).unwrap();
        assert_eq!(s.at_discrete(m1.key).unwrap(), 1);
        assert_eq!(s.at(x(1)).unwrap()[0], 5.0);
        assert!(s.at(x(2)).is_ok());
        assert!(s.at_discrete(mode(2, 3).key).is_ok());
    }
}

#[test]
fn to_factor_graph_requires_full_frontal_coverage() {
    let m0 = mode(0, 2);
    let mut net = HybridBayesNet::new();
    net.push(
        GaussianMixture::new(
            vec![z(0), z(1)],
            vec![],
            vec![m0],
            [1.0, 2.0]
                .iter()
                .map(|scale| {
                    Arc::new(
                        GaussianConditional::new(
                            vec![(z(0), 1), (z(1), 1)],
                            DMatrix::identity(2, 2) * *scale,
                            vec![],
                            DVector::zeros(2),
                        )
                        .unwrap(),
                    )
                })
                .collect(),
        )
        .unwrap(),
    );
    net.push(DiscreteConditional::from_signature(m0, &[], "1/1").unwrap());

    assert_eq!(
        net.to_factor_graph(&scalars(&[(z(0), 1.0)])).unwrap_err(),
        HybridError::MissingMeasurement { key: z(1) }
    );
    assert!(net.to_factor_graph(&scalars(&[(z(0), 1.0), (z(1), 0.0)])).is_ok());
}

proptest! {
    #[test]
    fn pruned_nets_never_select_removed_assignments(budget in 1usize..6, seed in any::<u64>()) {
        let net = chained_mixtures();
        let pruned = net.prune(budget).unwrap();
        let joint = pruned.at(2).unwrap().as_discrete().unwrap();
        let keys = pruned.discrete_keys().unwrap();
        let kept = Assignments::new(&keys)
            .filter(|a| joint.probability(a).unwrap() > 0.0)
            .count();
        prop_assert!(kept <= budget);

        let mpe = pruned.optimize().unwrap();
        prop_assert!(joint.probability(mpe.discrete()).unwrap() > 0.0);

        let mut rng = StdRng::seed_from_u64(seed);
        for _ in 0..10 {
            let s = pruned.sample_with(&mut rng).unwrap();
            prop_assert!(joint.probability(s.discrete()).unwrap() > 0.0);
        }
    }
}
