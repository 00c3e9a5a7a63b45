//! Least-squares evaluations and the statistics derived from them.
//!
//! An evaluation is the immutable snapshot of a problem at one parameter point:
//! the residuals `target − model(point)`, the model Jacobian, and the weights the
//! problem was built with. Every statistic is recomputed from that snapshot on
//! each call; nothing is cached.

use std::sync::Arc;

use ndarray::{Array1, Array2};

use crate::error::{LeastSqError, Result};
use crate::uncertainty::{
    calculate_correlation, calculate_covariance, standard_errors_from_covariance,
};
use crate::utils::WeightFactor;

/// Statistics contract shared by evaluations and optimization results.
///
/// Implementors supply the weighted residuals and the weighted Jacobian; the
/// cost, RMS, covariance and sigma computations are provided.
pub trait Evaluation {
    /// Parameter point this evaluation was computed at.
    fn point(&self) -> &Array1<f64>;

    /// Weighted residuals `L·(target − model(point))`.
    fn compute_residuals(&self) -> Array1<f64>;

    /// Weighted Jacobian `L·J` of the model values.
    ///
    /// This is the negated Jacobian of the residuals.
    fn compute_jacobian(&self) -> Array2<f64>;

    /// Number of observations (length of the residual vector).
    fn observation_size(&self) -> usize;

    /// Number of parameters.
    fn parameter_size(&self) -> usize {
        self.point().len()
    }

    /// Euclidean norm of the weighted residuals.
    fn compute_cost(&self) -> f64 {
        let r = self.compute_residuals();
        r.dot(&r).sqrt()
    }

    /// Root-mean-square of the weighted residuals, `sqrt(cost² / m)`.
    ///
    /// With no observations the result is NaN.
    fn compute_rms(&self) -> f64 {
        let cost = self.compute_cost();
        (cost * cost / self.observation_size() as f64).sqrt()
    }

    /// Parameter covariance matrix `(JᵀJ)⁻¹` using the weighted Jacobian.
    ///
    /// # Arguments
    ///
    /// * `threshold` - Singularity threshold for the QR decomposition of `JᵀJ`
    ///
    /// # Errors
    ///
    /// [`LeastSqError::SingularMatrix`] when `JᵀJ` is singular at `threshold`.
    fn compute_covariances(&self, threshold: f64) -> Result<Array2<f64>> {
        calculate_covariance(&self.compute_jacobian(), threshold)
    }

    /// Standard deviations of the parameters: square roots of the covariance diagonal.
    fn compute_sigma(&self, threshold: f64) -> Result<Array1<f64>> {
        let covariances = self.compute_covariances(threshold)?;
        Ok(standard_errors_from_covariance(&covariances))
    }

    /// Parameter correlation matrix, the covariance normalized to a unit diagonal.
    fn compute_correlation(&self, threshold: f64) -> Result<Array2<f64>> {
        let covariances = self.compute_covariances(threshold)?;
        Ok(calculate_correlation(&covariances))
    }

    /// Weighted sum of squared residuals, `cost²`.
    fn compute_chi_square(&self) -> f64 {
        let r = self.compute_residuals();
        r.dot(&r)
    }

    /// Chi-square per degree of freedom, `cost² / (m − n)`.
    ///
    /// Not finite when there are no more observations than parameters.
    fn compute_reduced_chi_square(&self) -> f64 {
        let dof = self.observation_size().saturating_sub(self.parameter_size());
        self.compute_chi_square() / dof as f64
    }
}

/// Evaluation of a problem at a single point.
#[derive(Debug, Clone)]
pub struct PointEvaluation {
    point: Array1<f64>,
    residuals: Array1<f64>,
    jacobian: Array2<f64>,
    weights: Arc<WeightFactor>,
}

impl PointEvaluation {
    /// Create an unweighted evaluation from raw residuals and the model Jacobian.
    ///
    /// # Arguments
    ///
    /// * `point` - Parameter values, length `n`
    /// * `residuals` - `target − model(point)`, length `m`
    /// * `jacobian` - Model Jacobian, `m × n`
    ///
    /// # Errors
    ///
    /// [`LeastSqError::DimensionMismatch`] when the shapes disagree.
    pub fn unweighted(
        point: Array1<f64>,
        residuals: Array1<f64>,
        jacobian: Array2<f64>,
    ) -> Result<Self> {
        Self::new(point, residuals, jacobian, Arc::new(WeightFactor::Unit))
    }

    pub(crate) fn new(
        point: Array1<f64>,
        residuals: Array1<f64>,
        jacobian: Array2<f64>,
        weights: Arc<WeightFactor>,
    ) -> Result<Self> {
        let (rows, cols) = jacobian.dim();
        if rows != residuals.len() {
            return Err(LeastSqError::DimensionMismatch {
                context: "jacobian rows",
                expected: residuals.len(),
                actual: rows,
            });
        }
        if cols != point.len() {
            return Err(LeastSqError::DimensionMismatch {
                context: "jacobian columns",
                expected: point.len(),
                actual: cols,
            });
        }
        if let Some(dimension) = weights.dimension() {
            if dimension != residuals.len() {
                return Err(LeastSqError::DimensionMismatch {
                    context: "weight dimension",
                    expected: residuals.len(),
                    actual: dimension,
                });
            }
        }

        Ok(Self {
            point,
            residuals,
            jacobian,
            weights,
        })
    }
}

impl Evaluation for PointEvaluation {
    fn point(&self) -> &Array1<f64> {
        &self.point
    }

    fn compute_residuals(&self) -> Array1<f64> {
        self.weights.apply_to_vector(&self.residuals)
    }

    fn compute_jacobian(&self) -> Array2<f64> {
        self.weights.apply_to_matrix(&self.jacobian)
    }

    fn observation_size(&self) -> usize {
        self.residuals.len()
    }
}
