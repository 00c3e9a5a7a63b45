//! Configuration options for the Levenberg-Marquardt algorithm.
//!
//! The settings mirror the MINPACK `lmder` controls: the initial step bound
//! factor, the three convergence tolerances and the rank threshold of the
//! pivoted QR factorization.

use serde::{Deserialize, Serialize};

/// Configuration options for the Levenberg-Marquardt algorithm.
///
/// Missing fields take their default when deserialized.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LmConfig {
    /// Factor for the initial step bound: the first bound is this factor times
    /// the norm of the scaled start point (or the factor itself when that norm
    /// is zero). Usually in `[0.1, 100]`. Default: 100
    pub initial_step_bound_factor: f64,

    /// Convergence is declared when both the actual and the predicted relative
    /// reductions of the squared cost are at most this. Default: 1e-10
    pub cost_relative_tolerance: f64,

    /// Convergence is declared when the relative distance between two
    /// consecutive iterates is at most this. Default: 1e-10
    pub parameter_relative_tolerance: f64,

    /// Convergence is declared when the cosine of the angle between the residual
    /// vector and every Jacobian column is at most this. Default: 1e-10
    pub ortho_tolerance: f64,

    /// Columns whose remaining squared norm falls to this value or below end the
    /// QR factorization and determine the numerical rank. Default: `f64::MIN_POSITIVE`
    pub ranking_threshold: f64,
}

impl Default for LmConfig {
    fn default() -> Self {
        Self {
            initial_step_bound_factor: 100.0,
            cost_relative_tolerance: 1e-10,
            parameter_relative_tolerance: 1e-10,
            ortho_tolerance: 1e-10,
            ranking_threshold: f64::MIN_POSITIVE,
        }
    }
}
