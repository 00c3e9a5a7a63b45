//! Convergence criteria for the Levenberg-Marquardt optimizer.
//!
//! The optimizer has three built-in tests driven by [`LmConfig`](super::LmConfig)
//! tolerances. A problem may add its own [`ConvergenceChecker`], which is
//! consulted after every accepted step.

use std::fmt;

use crate::evaluation::{Evaluation, PointEvaluation};

/// Reason an optimization run stopped successfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The residual vector is orthogonal to the Jacobian columns.
    Orthogonality,

    /// Actual and predicted relative cost reductions are both small.
    CostRelative,

    /// The step bound is small relative to the scaled parameter norm.
    ParameterRelative,

    /// The problem's own convergence checker accepted the step.
    Checker,
}

impl Termination {
    /// Returns a description of the termination reason.
    pub fn description(&self) -> &'static str {
        match self {
            Termination::Orthogonality => {
                "Converged: residuals orthogonal to the jacobian columns"
            }
            Termination::CostRelative => "Converged: small relative reduction in cost",
            Termination::ParameterRelative => "Converged: small relative change in parameters",
            Termination::Checker => "Converged: accepted by the convergence checker",
        }
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// User-supplied convergence test.
///
/// Closures taking `(iteration, previous, current)` implement this trait.
pub trait ConvergenceChecker: Send + Sync {
    /// Whether the step from `previous` to `current` ends the optimization.
    fn converged(
        &self,
        iteration: usize,
        previous: &PointEvaluation,
        current: &PointEvaluation,
    ) -> bool;
}

impl<F> ConvergenceChecker for F
where
    F: Fn(usize, &PointEvaluation, &PointEvaluation) -> bool + Send + Sync,
{
    fn converged(
        &self,
        iteration: usize,
        previous: &PointEvaluation,
        current: &PointEvaluation,
    ) -> bool {
        self(iteration, previous, current)
    }
}

/// Converged when the RMS of two consecutive evaluations agree.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvaluationRmsChecker {
    pub relative_tolerance: f64,
    pub absolute_tolerance: f64,
}

impl EvaluationRmsChecker {
    /// Checker using the same value for both tolerances.
    pub fn new(tolerance: f64) -> Self {
        Self::with_tolerances(tolerance, tolerance)
    }

    pub fn with_tolerances(relative_tolerance: f64, absolute_tolerance: f64) -> Self {
        Self {
            relative_tolerance,
            absolute_tolerance,
        }
    }
}

impl ConvergenceChecker for EvaluationRmsChecker {
    fn converged(
        &self,
        _iteration: usize,
        previous: &PointEvaluation,
        current: &PointEvaluation,
    ) -> bool {
        let p = previous.compute_rms();
        let c = current.compute_rms();
        within(p, c, self.relative_tolerance, self.absolute_tolerance)
    }
}

/// Converged when every parameter changed by a small amount.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointChecker {
    pub relative_tolerance: f64,
    pub absolute_tolerance: f64,
}

impl PointChecker {
    pub fn new(relative_tolerance: f64, absolute_tolerance: f64) -> Self {
        Self {
            relative_tolerance,
            absolute_tolerance,
        }
    }
}

impl ConvergenceChecker for PointChecker {
    fn converged(
        &self,
        _iteration: usize,
        previous: &PointEvaluation,
        current: &PointEvaluation,
    ) -> bool {
        previous
            .point()
            .iter()
            .zip(current.point().iter())
            .all(|(&p, &c)| within(p, c, self.relative_tolerance, self.absolute_tolerance))
    }
}

fn within(p: f64, c: f64, relative: f64, absolute: f64) -> bool {
    let difference = (p - c).abs();
    let size = p.abs().max(c.abs());
    difference <= size * relative || difference <= absolute
}
