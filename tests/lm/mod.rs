//! Tests for the Levenberg-Marquardt optimizer.

use std::sync::{Arc, Mutex};

use approx::assert_relative_eq;
use leastsq_rs::{
    model_fn, Evaluation, EvaluationRmsChecker, LeastSqError, LeastSquaresBuilder,
    LevenbergMarquardt, LmConfig, PointChecker, PointEvaluation, Termination,
};
use ndarray::{array, Array1, Array2};

use crate::test_helpers::{decay_builder, decay_data, linear_model};

#[test]
fn test_exact_quadratic_fit() {
    // y = 2x² − 3x + 1
    let x = array![-2.0, -1.0, 0.0, 1.0, 2.0, 3.0];
    let y = x.mapv(|x| (2.0 * x - 3.0) * x + 1.0);
    let xv = x.clone();
    let problem = LeastSquaresBuilder::new()
        .model(model_fn(
            move |p: &Array1<f64>| xv.mapv(|x| (p[0] * x + p[1]) * x + p[2]),
            move |_: &Array1<f64>| {
                Array2::from_shape_fn((x.len(), 3), |(i, j)| x[i].powi(2 - j as i32))
            },
        ))
        .target(y)
        .start(array![0.0, 0.0, 0.0])
        .max_evaluations(100)
        .max_iterations(100)
        .build()
        .unwrap();

    let optimum = LevenbergMarquardt::new().optimize(&problem).unwrap();
    assert_relative_eq!(optimum.point()[0], 2.0, epsilon = 1e-8);
    assert_relative_eq!(optimum.point()[1], -3.0, epsilon = 1e-8);
    assert_relative_eq!(optimum.point()[2], 1.0, epsilon = 1e-8);
    assert!(optimum.compute_rms() < 1e-8);
}

#[test]
fn test_exponential_decay() {
    let problem = decay_builder(3.0, 0.7, 30).build().unwrap();
    let optimum = LevenbergMarquardt::new().optimize(&problem).unwrap();

    assert_relative_eq!(optimum.point()[0], 3.0, epsilon = 1e-7);
    assert_relative_eq!(optimum.point()[1], 0.7, epsilon = 1e-7);
    assert!(optimum.compute_cost() < 1e-7);
    assert_ne!(optimum.termination(), Termination::Checker);
    assert!(optimum.evaluations() > optimum.iterations());
}

#[test]
fn test_non_invertible_linear_problem() {
    // Third column is 3·(first − second).
    let a = array![[1.0, 2.0, -3.0], [2.0, 1.0, 3.0], [-3.0, 0.0, -9.0]];
    let problem = LeastSquaresBuilder::new()
        .model(linear_model(a))
        .target(array![1.0, 1.0, 1.0])
        .start(array![0.0, 0.0, 0.0])
        .max_evaluations(100)
        .max_iterations(20)
        .build()
        .unwrap();

    let optimum = LevenbergMarquardt::new().optimize(&problem).unwrap();
    assert!(3.0_f64.sqrt() * optimum.compute_rms() > 0.6);
    assert!(matches!(
        optimum.compute_covariances(1e-10),
        Err(LeastSqError::SingularMatrix { .. })
    ));
}

#[test]
fn test_underdetermined_problem() {
    // One observation, two parameters: any point on the line p0 + p1 = 4 is optimal.
    let problem = LeastSquaresBuilder::new()
        .model(linear_model(array![[1.0, 1.0]]))
        .target(array![4.0])
        .start(array![0.0, 0.0])
        .max_evaluations(100)
        .max_iterations(100)
        .build()
        .unwrap();

    let optimum = LevenbergMarquardt::new().optimize(&problem).unwrap();
    assert_relative_eq!(optimum.point().sum(), 4.0, epsilon = 1e-8);
}

#[test]
fn test_evaluation_budget_exhausted() {
    let problem = decay_builder(3.0, 0.7, 30)
        .max_evaluations(3)
        .build()
        .unwrap();
    let err = LevenbergMarquardt::new().optimize(&problem).unwrap_err();
    assert!(matches!(err, LeastSqError::TooManyEvaluations { max: 3, .. }));
}

#[test]
fn test_iteration_budget_exhausted() {
    let problem = decay_builder(3.0, 0.7, 30)
        .max_iterations(1)
        .build()
        .unwrap();
    let err = LevenbergMarquardt::new().optimize(&problem).unwrap_err();
    assert!(matches!(err, LeastSqError::TooManyIterations { max: 1, .. }));
}

#[test]
fn test_weights_match_prescaled_problem() {
    let (t, y) = decay_data(3.0, 0.7, 20);
    // Deterministic perturbation so the weighted fit has non-zero residuals.
    let observed = &y + &Array1::from_shape_fn(20, |i| 0.01 * ((i * 7 % 5) as f64 - 2.0));
    let weights = Array1::from_shape_fn(20, |i| 1.0 + i as f64);
    let roots = weights.mapv(f64::sqrt);
    let scaled_target = &observed * &roots;

    let weighted = decay_builder(3.0, 0.7, 20)
        .target(observed.clone())
        .weight_diagonal(weights)
        .build()
        .unwrap();

    let (tv, rv) = (t.clone(), roots.clone());
    let prescaled = LeastSquaresBuilder::new()
        .model(model_fn(
            move |p: &Array1<f64>| &tv.mapv(|t| p[0] * (-p[1] * t).exp()) * &rv,
            move |p: &Array1<f64>| {
                Array2::from_shape_fn((t.len(), 2), |(i, j)| {
                    let e = (-p[1] * t[i]).exp();
                    let d = if j == 0 { e } else { -p[0] * t[i] * e };
                    d * roots[i]
                })
            },
        ))
        .target(scaled_target)
        .start(array![1.0, 0.1])
        .max_evaluations(1000)
        .max_iterations(1000)
        .build()
        .unwrap();

    let optimizer = LevenbergMarquardt::new();
    let a = optimizer.optimize(&weighted).unwrap();
    let b = optimizer.optimize(&prescaled).unwrap();
    assert_relative_eq!(a.point()[0], b.point()[0], epsilon = 1e-8);
    assert_relative_eq!(a.point()[1], b.point()[1], epsilon = 1e-8);
    assert_relative_eq!(a.compute_cost(), b.compute_cost(), max_relative = 1e-6);
}

#[test]
fn test_closure_checker_stops_after_first_accepted_step() {
    let problem = decay_builder(3.0, 0.7, 30)
        .checker(|iteration: usize, _: &PointEvaluation, _: &PointEvaluation| iteration >= 1)
        .build()
        .unwrap();

    let optimum = LevenbergMarquardt::new().optimize(&problem).unwrap();
    assert_eq!(optimum.termination(), Termination::Checker);
    assert_eq!(optimum.iterations(), 1);
}

#[test]
fn test_library_checkers_converge() {
    let optimizer = LevenbergMarquardt::new();

    let rms = decay_builder(3.0, 0.7, 30)
        .checker(EvaluationRmsChecker::new(1e-6))
        .build()
        .unwrap();
    let optimum = optimizer.optimize(&rms).unwrap();
    assert_relative_eq!(optimum.point()[1], 0.7, epsilon = 1e-3);

    let point = decay_builder(3.0, 0.7, 30)
        .checker(PointChecker::new(1e-10, 1e-12))
        .build()
        .unwrap();
    let optimum = optimizer.optimize(&point).unwrap();
    assert_relative_eq!(optimum.point()[1], 0.7, epsilon = 1e-6);
}

#[test]
fn test_parameter_validator_is_applied_to_every_point() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let (t, y) = decay_data(3.0, 0.7, 30);
    let (tv, recorder) = (t.clone(), Arc::clone(&seen));

    let problem = LeastSquaresBuilder::new()
        .model(model_fn(
            move |p: &Array1<f64>| {
                recorder.lock().unwrap().push(p[1]);
                tv.mapv(|t| p[0] * (-p[1] * t).exp())
            },
            move |p: &Array1<f64>| {
                Array2::from_shape_fn((t.len(), 2), |(i, j)| {
                    let e = (-p[1] * t[i]).exp();
                    if j == 0 {
                        e
                    } else {
                        -p[0] * t[i] * e
                    }
                })
            },
        ))
        .target(y)
        .start(array![1.0, -0.5])
        .parameter_validator(|p: Array1<f64>| array![p[0], p[1].abs()])
        .max_evaluations(1000)
        .max_iterations(1000)
        .build()
        .unwrap();

    let optimum = LevenbergMarquardt::new().optimize(&problem).unwrap();
    assert_relative_eq!(optimum.point()[1], 0.7, epsilon = 1e-6);

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), optimum.evaluations());
    assert!(seen.iter().all(|&b| b >= 0.0));
}

#[test]
fn test_config_from_json() {
    let json = r#"{ "initial_step_bound_factor": 10.0, "cost_relative_tolerance": 1e-12 }"#;
    let config: LmConfig = serde_json::from_str(json).unwrap();
    assert_eq!(config.initial_step_bound_factor, 10.0);
    assert_eq!(config.cost_relative_tolerance, 1e-12);
    assert_eq!(config.parameter_relative_tolerance, 1e-10);
    assert_eq!(config.ranking_threshold, f64::MIN_POSITIVE);

    let optimizer = LevenbergMarquardt::with_config(config);
    let optimum = optimizer
        .optimize(&decay_builder(3.0, 0.7, 30).build().unwrap())
        .unwrap();
    assert_relative_eq!(optimum.point()[0], 3.0, epsilon = 1e-7);

    let round_trip: LmConfig =
        serde_json::from_str(&serde_json::to_string(optimizer.config()).unwrap()).unwrap();
    assert_eq!(&round_trip, optimizer.config());
}

#[test]
fn test_optimizer_is_reusable() {
    let optimizer = LevenbergMarquardt::new().with_initial_step_bound_factor(1.0);
    let problem = decay_builder(3.0, 0.7, 30).build().unwrap();

    let first = optimizer.optimize(&problem).unwrap();
    let second = optimizer.optimize(&problem).unwrap();
    assert_eq!(first.point(), second.point());
    assert_eq!(first.evaluations(), second.evaluations());
    assert_eq!(LevenbergMarquardt::new().initial_step_bound_factor(), 100.0);
}

#[test]
fn test_batch_optimization() {
    let optimizer = LevenbergMarquardt::new();
    let problems: Vec<_> = [0.3, 0.7, 1.1]
        .iter()
        .map(|&rate| decay_builder(2.0, rate, 25).build().unwrap())
        .collect();

    let results = optimizer.optimize_all(&problems);
    for (result, rate) in results.into_iter().zip([0.3, 0.7, 1.1]) {
        assert_relative_eq!(result.unwrap().point()[1], rate, epsilon = 1e-6);
    }
}
