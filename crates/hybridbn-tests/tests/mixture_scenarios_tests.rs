//! End-to-end scenarios: Gaussian mixture models, the two-state model and
//! switching between-measurements, checked against closed-form posteriors.

use approx::assert_abs_diff_eq;
use hybridbn_core::{DiscreteConditional, DiscreteValues, HybridError, HybridValues, InferenceConfig};
use hybridbn_tests::{
    assignment, gmm, mode, normal_pdf, normalized_evaluate_tree, scalar_at, scalars,
    switching_between_graph, tight_prior, two_state_model, x, z,
};

#[test]
fn gmm_equidistant_measurement_with_equal_sigmas_is_uniform() {
    let net = gmm(&[1.0, 3.0], &[2.0, 2.0], "1/1");
    let m0 = mode(0, 2);
    let measurement = scalars(&[(z(0), 2.0)]);

    let from_net = normalized_evaluate_tree(&net, &measurement);
    let from_graph = net
        .to_factor_graph(&measurement)
        .unwrap()
        .discrete_posterior()
        .unwrap();

    for v in 0..2 {
        assert_abs_diff_eq!(*from_net.get(&assignment(&m0, v)).unwrap(), 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(*from_graph.get(&assignment(&m0, v)).unwrap(), 0.5, epsilon = 1e-12);
    }
}

#[test]
fn gmm_equidistant_measurement_favors_tighter_mode() {
    let net = gmm(&[1.0, 3.0], &[8.0, 4.0], "1/1");
    let m0 = mode(0, 2);
    let measurement = scalars(&[(z(0), 2.0)]);

    let p0 = normal_pdf(2.0, 1.0, 64.0);
    let p1 = normal_pdf(2.0, 3.0, 16.0);
    let expected = p0 / (p0 + p1);
    assert_abs_diff_eq!(expected, 0.3386, epsilon = 1e-4);

    let from_net = normalized_evaluate_tree(&net, &measurement);
    assert_abs_diff_eq!(*from_net.get(&assignment(&m0, 0)).unwrap(), expected, epsilon = 1e-9);

    let eliminated = net.to_factor_graph(&measurement).unwrap().eliminate_sequential().unwrap();
    let prior = eliminated.at(0).unwrap().as_discrete().unwrap();
    assert_abs_diff_eq!(prior.probability(&assignment(&m0, 0)).unwrap(), expected, epsilon = 1e-9);
    assert_abs_diff_eq!(prior.probability(&assignment(&m0, 1)).unwrap(), 1.0 - expected, epsilon = 1e-9);
}

#[test]
fn two_state_model_hedges_without_measurement_on_x1() {
    let net = two_state_model([2.0, 2.0], false);
    let m1 = mode(1, 2);
    let bn = net
        .to_factor_graph(&scalars(&[(z(0), 0.5)]))
        .unwrap()
        .eliminate_sequential()
        .unwrap();
    let prior = bn.at(bn.len() - 1).unwrap().as_discrete().unwrap();
    assert_abs_diff_eq!(prior.probability(&assignment(&m1, 0)).unwrap(), 0.5, epsilon = 1e-9);
}

#[test]
fn two_state_model_with_measurement_on_x1() {
    let net = two_state_model([2.0, 2.0], true);
    let m1 = mode(1, 2);
    let bn = net
        .to_factor_graph(&scalars(&[(z(0), 0.5), (z(1), 2.2)]))
        .unwrap()
        .eliminate_sequential()
        .unwrap();
    let prior = bn.at(bn.len() - 1).unwrap().as_discrete().unwrap();
    assert_abs_diff_eq!(prior.probability(&assignment(&m1, 0)).unwrap(), 0.4923083, epsilon = 1e-6);
    assert_abs_diff_eq!(prior.probability(&assignment(&m1, 1)).unwrap(), 0.5076917, epsilon = 1e-6);
}

#[test]
fn two_state_model_with_different_sigmas_matches_marginals() {
    let m1 = mode(1, 2);

    // Without z1 the mixture integrates to one under either mode.
    let bn = two_state_model([6.0, 4.0], false)
        .to_factor_graph(&scalars(&[(z(0), 0.5)]))
        .unwrap()
        .eliminate_sequential()
        .unwrap();
    let prior = bn.at(bn.len() - 1).unwrap().as_discrete().unwrap();
    assert_abs_diff_eq!(prior.probability(&assignment(&m1, 0)).unwrap(), 0.5, epsilon = 1e-9);

    // With z1 the posterior follows the marginal z1 | m1 ~ N(μ_m, σ_m² + 9).
    let bn = two_state_model([6.0, 4.0], true)
        .to_factor_graph(&scalars(&[(z(0), 0.5), (z(1), 2.2)]))
        .unwrap()
        .eliminate_sequential()
        .unwrap();
    let prior = bn.at(bn.len() - 1).unwrap().as_discrete().unwrap();
    let p0 = normal_pdf(2.2, 1.0, 36.0 + 9.0);
    let p1 = normal_pdf(2.2, 3.0, 16.0 + 9.0);
    assert_abs_diff_eq!(
        prior.probability(&assignment(&m1, 0)).unwrap(),
        p0 / (p0 + p1),
        epsilon = 1e-9
    );
}

#[test]
fn different_means_without_evidence_hedge_equally() {
    let m1 = mode(1, 2);
    let graph = switching_between_graph([0.0, 1.75], [0.0, 2.0], [1.0, 1.0], 0.0);
    let bn = graph.eliminate_sequential().unwrap();

    let mpe = bn.optimize().unwrap();
    assert_eq!(mpe.discrete(), &assignment(&m1, 0));
    assert_abs_diff_eq!(scalar_at(mpe.continuous(), x(0)), 0.0, epsilon = 1e-9);
    assert_abs_diff_eq!(scalar_at(mpe.continuous(), x(1)), -1.75, epsilon = 1e-9);

    for v in 0..2 {
        let dv = assignment(&m1, v);
        let continuous = bn.optimize_assignment(&dv).unwrap();
        let error = bn.error(&HybridValues::new(continuous, dv)).unwrap();
        assert_abs_diff_eq!(error, std::f64::consts::LN_2, epsilon = 1e-9);
    }
}

#[test]
fn different_means_with_evidence_pick_the_consistent_mode() {
    let m1 = mode(1, 2);
    let mut graph = switching_between_graph([0.0, 1.75], [0.0, 2.0], [1.0, 1.0], 0.0);
    graph.push(tight_prior(x(1), 0.25));
    let bn = graph.eliminate_sequential().unwrap();

    let mpe = bn.optimize().unwrap();
    assert_eq!(mpe.discrete(), &assignment(&m1, 1));
    assert_abs_diff_eq!(scalar_at(mpe.continuous(), x(0)), 0.0, epsilon = 1e-9);
    assert_abs_diff_eq!(scalar_at(mpe.continuous(), x(1)), 0.25, epsilon = 1e-9);

    let errors: Vec<f64> = (0..2)
        .map(|v| {
            let dv = assignment(&m1, v);
            let continuous = bn.optimize_assignment(&dv).unwrap();
            bn.error(&HybridValues::new(continuous, dv)).unwrap()
        })
        .collect();
    assert_abs_diff_eq!(errors[0], 2.12692448787, epsilon = 1e-7);
    assert_abs_diff_eq!(errors[1], 0.126928487854, epsilon = 1e-7);
}

#[test]
fn different_covariances_error_tree_reflects_normalizers() {
    let m1 = mode(1, 2);
    let graph = switching_between_graph([1.0, 1.0], [0.0, 0.0], [1e2, 1e-2], 0.0);
    let bn = graph.eliminate_sequential().unwrap();

    let at_mean = scalars(&[(x(0), 0.0), (x(1), 0.0)]);
    let errors = bn.error_tree(&at_mean).unwrap();
    assert_abs_diff_eq!(*errors.get(&assignment(&m1, 0)).unwrap(), 9.90348755254, epsilon = 1e-9);
    assert_abs_diff_eq!(
        *errors.get(&assignment(&m1, 1)).unwrap(),
        std::f64::consts::LN_2,
        epsilon = 1e-9
    );

    let prior = bn.at(bn.len() - 1).unwrap().as_discrete().unwrap();
    assert_abs_diff_eq!(prior.probability(&assignment(&m1, 0)).unwrap(), 0.5, epsilon = 1e-9);
}

#[test]
fn elimination_matches_net_posterior_with_every_frontal_measured() {
    let net = gmm(&[-1.0, 0.5, 4.0], &[1.0, 0.3, 2.5], "2/1/1");
    let measurement = scalars(&[(z(0), 0.8)]);
    let direct = normalized_evaluate_tree(&net, &measurement);
    let eliminated = net
        .to_factor_graph(&measurement)
        .unwrap()
        .discrete_posterior()
        .unwrap();
    assert!(direct.equals(&eliminated, 1e-9));
}

#[test]
fn optimize_rejects_an_invalid_config() {
    let net = gmm(&[1.0, 3.0], &[2.0, 2.0], "1/1");
    let config = InferenceConfig {
        rank_tolerance: 0.0,
        ..InferenceConfig::default()
    };
    assert!(matches!(
        net.optimize_with_config(&config),
        Err(HybridError::Validation(_))
    ));
}

#[test]
fn incomplete_discrete_assignments_are_reported_by_key() {
    let net = gmm(&[1.0, 3.0], &[2.0, 2.0], "1/1");
    let m0 = mode(0, 2);
    let values = HybridValues::new(scalars(&[(z(0), 2.0)]), DiscreteValues::new());
    assert_eq!(
        net.evaluate(&values),
        Err(HybridError::MissingAssignment { key: m0.key })
    );
    assert_eq!(
        net.optimize_assignment(&DiscreteValues::new()),
        Err(HybridError::MissingAssignment { key: m0.key })
    );
}

#[test]
fn conflicting_cardinalities_are_validation_errors() {
    let mut net = gmm(&[1.0, 3.0], &[2.0, 2.0], "1/1");
    net.push(DiscreteConditional::from_signature(mode(0, 3), &[], "1/2/3").unwrap());
    for measured in [0.2, 0.5, 2.0] {
        let values = scalars(&[(z(0), measured)]);
        assert!(matches!(net.error_tree(&values), Err(HybridError::Validation(_))));
    }
}
