//! Fitting of a radioactive decay curve with two exponential components.
//!
//! Data and reference values are from Chapter 8 of Bevington, "Data Reduction
//! and Error Analysis for the Physical Sciences". The reference solution is only
//! given to a few digits, so the parameters are checked against the published
//! error bars and the covariance entries to within 10%.

use leastsq_rs::{
    model_fn, Evaluation, EvaluationRmsChecker, LeastSquaresBuilder, LeastSquaresProblem,
    LevenbergMarquardt,
};
use ndarray::{array, Array1, Array2};

const TIMES: [f64; 59] = [
    15.0, 30.0, 45.0, 60.0, 75.0, 90.0, 105.0, 120.0, 135.0, 150.0, 165.0, 180.0, 195.0, 210.0,
    225.0, 240.0, 255.0, 270.0, 285.0, 300.0, 315.0, 330.0, 345.0, 360.0, 375.0, 390.0, 405.0,
    420.0, 435.0, 450.0, 465.0, 480.0, 495.0, 510.0, 525.0, 540.0, 555.0, 570.0, 585.0, 600.0,
    615.0, 630.0, 645.0, 660.0, 675.0, 690.0, 705.0, 720.0, 735.0, 750.0, 765.0, 780.0, 795.0,
    810.0, 825.0, 840.0, 855.0, 870.0, 885.0,
];

const COUNTS: [f64; 59] = [
    775.0, 479.0, 380.0, 302.0, 185.0, 157.0, 137.0, 119.0, 110.0, 89.0, 74.0, 61.0, 66.0, 68.0,
    48.0, 54.0, 51.0, 46.0, 55.0, 29.0, 28.0, 37.0, 49.0, 26.0, 35.0, 29.0, 31.0, 24.0, 25.0,
    35.0, 24.0, 30.0, 26.0, 28.0, 21.0, 18.0, 20.0, 27.0, 17.0, 17.0, 14.0, 17.0, 24.0, 11.0,
    22.0, 17.0, 12.0, 10.0, 13.0, 16.0, 9.0, 9.0, 14.0, 21.0, 17.0, 13.0, 12.0, 18.0, 10.0,
];

/// y = p0 + p1·exp(−t/p3) + p2·exp(−t/p4), weighted by Poisson variances.
fn bevington_problem() -> LeastSquaresProblem {
    let times = Array1::from_vec(TIMES.to_vec());
    let counts = Array1::from_vec(COUNTS.to_vec());
    let tv = times.clone();

    LeastSquaresBuilder::new()
        .model(model_fn(
            move |p: &Array1<f64>| {
                tv.mapv(|t| p[0] + p[1] * (-t / p[3]).exp() + p[2] * (-t / p[4]).exp())
            },
            move |p: &Array1<f64>| {
                let mut jacobian = Array2::zeros((times.len(), 5));
                for (i, &t) in times.iter().enumerate() {
                    let e3 = (-t / p[3]).exp();
                    let e4 = (-t / p[4]).exp();
                    jacobian[[i, 0]] = 1.0;
                    jacobian[[i, 1]] = e3;
                    jacobian[[i, 2]] = e4;
                    jacobian[[i, 3]] = p[1] * e3 * t / (p[3] * p[3]);
                    jacobian[[i, 4]] = p[2] * e4 * t / (p[4] * p[4]);
                }
                jacobian
            },
        ))
        .weight_diagonal(counts.mapv(|c| 1.0 / c))
        .target(counts)
        .start(array![10.0, 900.0, 80.0, 27.0, 225.0])
        .checker(EvaluationRmsChecker::new(1e-6))
        .max_evaluations(200)
        .max_iterations(50)
        .build()
        .unwrap()
}

#[test]
fn test_bevington_decay() {
    let optimum = LevenbergMarquardt::new()
        .optimize(&bevington_problem())
        .unwrap();

    let expected_solution = [10.4, 958.3, 131.4, 33.9, 205.0];
    let expected_covariance: [[f64; 5]; 5] = [
        [3.38, -3.69, 27.98, -2.34, -49.24],
        [-3.69, 2492.26, 81.89, -69.21, -8.9],
        [27.98, 81.89, 468.99, -44.22, -615.44],
        [-2.34, -69.21, -44.22, 6.39, 53.80],
        [-49.24, -8.9, -615.44, 53.8, 929.45],
    ];

    let solution = optimum.point();
    for i in 0..5 {
        let error = expected_covariance[i][i].sqrt();
        assert!(
            (solution[i] - expected_solution[i]).abs() <= error,
            "parameter {i}: {} vs {}",
            solution[i],
            expected_solution[i]
        );
    }

    let covariance = optimum.compute_covariances(1e-14).unwrap();
    for i in 0..5 {
        for j in 0..5 {
            let expected = expected_covariance[i][j];
            assert!(
                (covariance[[i, j]] - expected).abs() <= (0.1 * expected).abs(),
                "covariance [{i}][{j}]: {} vs {expected}",
                covariance[[i, j]]
            );
        }
    }
}

#[test]
fn test_bevington_statistics_are_consistent() {
    let optimum = LevenbergMarquardt::new()
        .optimize(&bevington_problem())
        .unwrap();

    let sigma = optimum.compute_sigma(1e-14).unwrap();
    let covariance = optimum.compute_covariances(1e-14).unwrap();
    for i in 0..5 {
        assert!((sigma[i] * sigma[i] - covariance[[i, i]]).abs() <= 1e-9 * covariance[[i, i]]);
    }

    // Poisson weights make the reduced chi-square close to one for a good fit.
    let reduced = optimum.compute_reduced_chi_square();
    assert!(reduced > 0.5 && reduced < 2.0, "reduced chi-square {reduced}");
}
