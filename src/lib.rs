//! # leastsq-rs
//!
//! `leastsq-rs` fits parametric models to observations by nonlinear least
//! squares, using a MINPACK-style Levenberg-Marquardt optimizer, and reports the
//! usual fit statistics (cost, RMS, covariance, parameter standard deviations).
//!
//! The library provides:
//! - A problem builder taking a model function with its Jacobian, the observed
//!   target values, optional weights, a start point and evaluation/iteration budgets
//! - A Levenberg-Marquardt optimizer with rank-revealing QR steps and an adaptive
//!   trust region
//! - An [`Evaluation`] contract for residuals, Jacobians and derived statistics,
//!   shared by single evaluations and optimization results
//!
//! ## Basic Usage
//!
//! ```
//! use leastsq_rs::{model_fn, Evaluation, LeastSquaresBuilder, LevenbergMarquardt};
//! use ndarray::{array, Array1, Array2};
//!
//! // y = a·exp(−b·t)
//! let t: Array1<f64> = Array1::linspace(0.0, 3.0, 10);
//! let y = t.mapv(|t| 2.0 * (-1.3 * t).exp());
//! let (tv, tj) = (t.clone(), t.clone());
//!
//! let problem = LeastSquaresBuilder::new()
//!     .model(model_fn(
//!         move |p| tv.mapv(|t| p[0] * (-p[1] * t).exp()),
//!         move |p| {
//!             Array2::from_shape_fn((tj.len(), 2), |(i, j)| {
//!                 let e = (-p[1] * tj[i]).exp();
//!                 if j == 0 { e } else { -p[0] * tj[i] * e }
//!             })
//!         },
//!     ))
//!     .target(y)
//!     .start(array![1.0, 1.0])
//!     .max_evaluations(200)
//!     .max_iterations(200)
//!     .build()
//!     .unwrap();
//!
//! let optimum = LevenbergMarquardt::new().optimize(&problem).unwrap();
//! assert!((optimum.point()[1] - 1.3).abs() < 1e-6);
//! println!("{optimum}");
//! ```

// Public modules
pub mod error;
pub mod evaluation;
pub mod lm;
pub mod problem;

mod uncertainty;
mod utils;

// Re-exports for convenience
pub use error::{LeastSqError, Result};
pub use evaluation::{Evaluation, PointEvaluation};
pub use lm::{
    ConvergenceChecker, EvaluationRmsChecker, LevenbergMarquardt, LmConfig, Optimum,
    PointChecker, Termination,
};
pub use problem::{
    model_fn, FnModel, LeastSquaresBuilder, LeastSquaresProblem, ModelFunction,
    ParameterValidator,
};

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
