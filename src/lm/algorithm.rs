//! Implementation of the Levenberg-Marquardt algorithm.
//!
//! This is a port of the MINPACK `lmder` strategy: the weighted residual Jacobian
//! is factored by a pivoted QR decomposition once per iteration, the damping
//! parameter is chosen so that the step fits inside an adaptive trust region, and
//! the run ends on one of three tolerance tests (or the problem's own checker).

use ndarray::Array1;
use tracing::debug;

use crate::error::{LeastSqError, Result};
use crate::evaluation::{Evaluation, PointEvaluation};
use crate::problem::LeastSquaresProblem;

use super::config::LmConfig;
use super::convergence::Termination;
use super::optimum::Optimum;
use super::step::RankedQr;
use super::trust_region::{Reduction, TrustRegion, ACCEPT_RATIO};

/// Smallest relative change that can be resolved in double precision.
const TWO_EPS: f64 = f64::EPSILON;

/// Counts work against a budget.
#[derive(Debug, Clone, Copy)]
struct Counter {
    count: usize,
    max: usize,
}

impl Counter {
    fn new(max: usize) -> Self {
        Self { count: 0, max }
    }

    /// Count one more unit of work; false once the budget is exceeded.
    fn increment(&mut self) -> bool {
        self.count = self.count.saturating_add(1);
        self.count <= self.max
    }
}

/// The Levenberg-Marquardt optimizer.
///
/// The optimizer only holds its configuration. The `with_*` methods return a new
/// optimizer and leave the receiver untouched, so one instance can be shared
/// between threads and runs.
///
/// # Example
///
/// ```
/// use leastsq_rs::{model_fn, Evaluation, LeastSquaresBuilder, LevenbergMarquardt};
/// use ndarray::{array, Array2};
///
/// // Fit y = a·x² + b·x + c through (0, 0), (1, 1), (2, 4).
/// let x = array![0.0, 1.0, 2.0];
/// let xj = x.clone();
/// let problem = LeastSquaresBuilder::new()
///     .model(model_fn(
///         move |p| x.mapv(|x| (p[0] * x + p[1]) * x + p[2]),
///         move |_| Array2::from_shape_fn((3, 3), |(i, j)| xj[i].powi(2 - j as i32)),
///     ))
///     .target(array![0.0, 1.0, 4.0])
///     .start(array![0.0, 0.0, 0.0])
///     .max_evaluations(100)
///     .max_iterations(100)
///     .build()
///     .unwrap();
///
/// let optimum = LevenbergMarquardt::new().optimize(&problem).unwrap();
/// assert!((optimum.point()[0] - 1.0).abs() < 1e-8);
/// assert!(optimum.compute_cost() < 1e-8);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LevenbergMarquardt {
    /// Configuration options
    config: LmConfig,
}

impl LevenbergMarquardt {
    /// Create a new Levenberg-Marquardt optimizer with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new Levenberg-Marquardt optimizer with the given configuration.
    pub fn with_config(config: LmConfig) -> Self {
        Self { config }
    }

    /// The configuration in use.
    pub fn config(&self) -> &LmConfig {
        &self.config
    }

    /// Optimizer with a different initial step bound factor.
    pub fn with_initial_step_bound_factor(&self, initial_step_bound_factor: f64) -> Self {
        Self::with_config(LmConfig {
            initial_step_bound_factor,
            ..self.config
        })
    }

    /// Optimizer with a different cost relative tolerance.
    pub fn with_cost_relative_tolerance(&self, cost_relative_tolerance: f64) -> Self {
        Self::with_config(LmConfig {
            cost_relative_tolerance,
            ..self.config
        })
    }

    /// Optimizer with a different parameter relative tolerance.
    pub fn with_parameter_relative_tolerance(&self, parameter_relative_tolerance: f64) -> Self {
        Self::with_config(LmConfig {
            parameter_relative_tolerance,
            ..self.config
        })
    }

    /// Optimizer with a different orthogonality tolerance.
    pub fn with_ortho_tolerance(&self, ortho_tolerance: f64) -> Self {
        Self::with_config(LmConfig {
            ortho_tolerance,
            ..self.config
        })
    }

    /// Optimizer with a different QR ranking threshold.
    pub fn with_ranking_threshold(&self, ranking_threshold: f64) -> Self {
        Self::with_config(LmConfig {
            ranking_threshold,
            ..self.config
        })
    }

    pub fn initial_step_bound_factor(&self) -> f64 {
        self.config.initial_step_bound_factor
    }

    pub fn cost_relative_tolerance(&self) -> f64 {
        self.config.cost_relative_tolerance
    }

    pub fn parameter_relative_tolerance(&self) -> f64 {
        self.config.parameter_relative_tolerance
    }

    pub fn ortho_tolerance(&self) -> f64 {
        self.config.ortho_tolerance
    }

    pub fn ranking_threshold(&self) -> f64 {
        self.config.ranking_threshold
    }

    /// Minimize the weighted sum of squared residuals of `problem`.
    ///
    /// # Arguments
    ///
    /// * `problem` - The problem to solve, including its start point and budgets
    ///
    /// # Returns
    ///
    /// * The optimum, or the first error encountered
    ///
    /// # Errors
    ///
    /// * [`LeastSqError::TooManyEvaluations`] / [`LeastSqError::TooManyIterations`]
    ///   when a budget is exhausted
    /// * [`LeastSqError::DimensionMismatch`] when the model returns badly shaped output
    /// * [`LeastSqError::UnableToDecomposeJacobian`] for non-finite Jacobians
    /// * [`LeastSqError::SingularMatrix`] when no finite step can be computed
    /// * [`LeastSqError::ToleranceTooSmall`] when a tolerance cannot be met in
    ///   double precision
    pub fn optimize(&self, problem: &LeastSquaresProblem) -> Result<Optimum> {
        let config = &self.config;
        let n_r = problem.observation_size();
        let n_c = problem.parameter_size();
        let solved_cols = n_r.min(n_c);

        let mut evaluations = Counter::new(problem.max_evaluations());
        let mut iterations = Counter::new(problem.max_iterations());

        let mut lm_dir = Array1::<f64>::zeros(n_c);
        let mut diag = Array1::<f64>::zeros(n_c);
        let mut region = TrustRegion::new(config.initial_step_bound_factor, 0.0);
        let mut x_norm = 0.0;

        if !evaluations.increment() {
            return Err(too_many_evaluations(&evaluations, &iterations));
        }
        let mut current = problem.evaluate(&problem.validate(problem.start().clone()))?;
        let mut current_residuals = current.compute_residuals();
        let mut current_cost = norm(&current_residuals);
        let mut current_point = current.point().clone();
        debug!(
            observations = n_r,
            parameters = n_c,
            cost = current_cost,
            "starting Levenberg-Marquardt"
        );

        let mut first_iteration = true;
        loop {
            if !iterations.increment() {
                return Err(LeastSqError::TooManyIterations {
                    max: iterations.max,
                    evaluations: evaluations.count,
                });
            }
            let previous = current.clone();

            let mut qr = RankedQr::decompose(
                &current.compute_jacobian(),
                solved_cols,
                config.ranking_threshold,
            )?;
            let mut qtf = current_residuals.clone();
            qr.q_ty(&mut qtf);
            qr.store_r_diagonal(solved_cols);

            if first_iteration {
                // Scale by the column norms of the initial Jacobian.
                for k in 0..n_c {
                    let dk = qr.jac_norm()[k];
                    diag[k] = if dk == 0.0 { 1.0 } else { dk };
                }
                x_norm = norm(&(&diag * &current_point));
                region = TrustRegion::new(config.initial_step_bound_factor, x_norm);
            }

            let max_cosine = qr.max_cosine(&qtf, current_cost, solved_cols);
            if max_cosine <= config.ortho_tolerance {
                return Ok(finish(
                    current,
                    &iterations,
                    &evaluations,
                    Termination::Orthogonality,
                ));
            }

            for j in 0..n_c {
                diag[j] = diag[j].max(qr.jac_norm()[j]);
            }

            let mut ratio = 0.0;
            while ratio < ACCEPT_RATIO {
                let old_point = current_point.clone();
                let previous_cost = current_cost;

                region.lm_par = qr.determine_lm_parameter(
                    &qtf,
                    region.delta,
                    &diag,
                    solved_cols,
                    region.lm_par,
                    &mut lm_dir,
                );

                let mut lm_norm = 0.0;
                for &pj in &qr.permutation()[..solved_cols] {
                    lm_dir[pj] = -lm_dir[pj];
                    current_point[pj] = old_point[pj] + lm_dir[pj];
                    let s = diag[pj] * lm_dir[pj];
                    lm_norm += s * s;
                }
                let lm_norm: f64 = lm_norm.sqrt();
                if !lm_norm.is_finite() {
                    return Err(LeastSqError::SingularMatrix {
                        threshold: config.ranking_threshold,
                    });
                }
                if first_iteration {
                    region.delta = region.delta.min(lm_norm);
                }

                if !evaluations.increment() {
                    return Err(too_many_evaluations(&evaluations, &iterations));
                }
                current = problem.evaluate(&problem.validate(current_point.clone()))?;
                current_point = current.point().clone();
                let trial_residuals = current.compute_residuals();
                current_cost = norm(&trial_residuals);

                let reduction = Reduction::new(
                    previous_cost,
                    current_cost,
                    qr.predicted_norm_sqr(&lm_dir, solved_cols),
                    region.lm_par,
                    lm_norm,
                );
                ratio = reduction.ratio;
                region.update(&reduction, lm_norm, previous_cost, current_cost);

                debug!(
                    iteration = iterations.count,
                    evaluations = evaluations.count,
                    rank = qr.rank(),
                    cost = current_cost,
                    ratio,
                    lm_par = region.lm_par,
                    delta = region.delta,
                    accepted = reduction.is_accepted(),
                    "trial step"
                );

                if reduction.is_accepted() {
                    first_iteration = false;
                    current_residuals = trial_residuals;
                    x_norm = norm(&(&diag * &current_point));

                    if let Some(checker) = problem.checker() {
                        if checker.converged(iterations.count, &previous, &current) {
                            return Ok(finish(
                                current,
                                &iterations,
                                &evaluations,
                                Termination::Checker,
                            ));
                        }
                    }
                } else {
                    // Roll back to the start of this iteration.
                    current_cost = previous_cost;
                    current_point = old_point;
                    current = previous.clone();
                }

                if reduction.actual.abs() <= config.cost_relative_tolerance
                    && reduction.predicted <= config.cost_relative_tolerance
                    && ratio <= 2.0
                {
                    return Ok(finish(
                        current,
                        &iterations,
                        &evaluations,
                        Termination::CostRelative,
                    ));
                }
                if region.delta <= config.parameter_relative_tolerance * x_norm {
                    return Ok(finish(
                        current,
                        &iterations,
                        &evaluations,
                        Termination::ParameterRelative,
                    ));
                }

                if reduction.actual.abs() <= TWO_EPS
                    && reduction.predicted <= TWO_EPS
                    && ratio <= 2.0
                {
                    return Err(LeastSqError::ToleranceTooSmall {
                        tolerance: "cost relative",
                        value: config.cost_relative_tolerance,
                    });
                } else if region.delta <= TWO_EPS * x_norm {
                    return Err(LeastSqError::ToleranceTooSmall {
                        tolerance: "parameter relative",
                        value: config.parameter_relative_tolerance,
                    });
                } else if max_cosine <= TWO_EPS {
                    return Err(LeastSqError::ToleranceTooSmall {
                        tolerance: "orthogonality",
                        value: config.ortho_tolerance,
                    });
                }
            }
        }
    }
}

fn norm(v: &Array1<f64>) -> f64 {
    v.dot(v).sqrt()
}

fn too_many_evaluations(evaluations: &Counter, iterations: &Counter) -> LeastSqError {
    LeastSqError::TooManyEvaluations {
        max: evaluations.max,
        iterations: iterations.count,
    }
}

fn finish(
    evaluation: PointEvaluation,
    iterations: &Counter,
    evaluations: &Counter,
    termination: Termination,
) -> Optimum {
    debug!(
        iterations = iterations.count,
        evaluations = evaluations.count,
        cost = evaluation.compute_cost(),
        reason = termination.description(),
        "Levenberg-Marquardt converged"
    );
    Optimum::new(evaluation, iterations.count, evaluations.count, termination)
}
