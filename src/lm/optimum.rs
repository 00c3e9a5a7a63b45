//! Result of a Levenberg-Marquardt optimization.

use std::fmt;

use ndarray::{Array1, Array2};

use crate::evaluation::{Evaluation, PointEvaluation};

use super::convergence::Termination;

/// Final evaluation of a successful run, with the work it took to get there.
///
/// All statistics are delegated to the wrapped [`PointEvaluation`].
#[derive(Debug, Clone)]
pub struct Optimum {
    evaluation: PointEvaluation,
    iterations: usize,
    evaluations: usize,
    termination: Termination,
}

impl Optimum {
    pub(crate) fn new(
        evaluation: PointEvaluation,
        iterations: usize,
        evaluations: usize,
        termination: Termination,
    ) -> Self {
        Self {
            evaluation,
            iterations,
            evaluations,
            termination,
        }
    }

    /// Number of outer iterations performed.
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Number of model evaluations performed, including the start point.
    pub fn evaluations(&self) -> usize {
        self.evaluations
    }

    /// Which convergence test ended the run.
    pub fn termination(&self) -> Termination {
        self.termination
    }

    /// The evaluation at the optimum.
    pub fn evaluation(&self) -> &PointEvaluation {
        &self.evaluation
    }

    pub fn into_evaluation(self) -> PointEvaluation {
        self.evaluation
    }
}

impl Evaluation for Optimum {
    fn point(&self) -> &Array1<f64> {
        self.evaluation.point()
    }

    fn compute_residuals(&self) -> Array1<f64> {
        self.evaluation.compute_residuals()
    }

    fn compute_jacobian(&self) -> Array2<f64> {
        self.evaluation.compute_jacobian()
    }

    fn observation_size(&self) -> usize {
        self.evaluation.observation_size()
    }

    fn parameter_size(&self) -> usize {
        self.evaluation.parameter_size()
    }
}

impl fmt::Display for Optimum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Optimization Result:")?;
        writeln!(f, "  Termination: {}", self.termination)?;
        writeln!(f, "  Cost: {:.6e}", self.compute_cost())?;
        writeln!(f, "  RMS: {:.6e}", self.compute_rms())?;
        writeln!(f, "  Iterations: {}", self.iterations)?;
        writeln!(f, "  Function evaluations: {}", self.evaluations)?;
        writeln!(f, "  Parameters: {}", self.point())?;
        Ok(())
    }
}
