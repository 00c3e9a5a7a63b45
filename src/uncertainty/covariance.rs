//! # Covariance Matrix Calculations
//!
//! Functions for turning the weighted Jacobian at a solution into parameter
//! covariances, standard errors and correlations.

use ndarray::{Array1, Array2};

use crate::error::Result;
use crate::utils::QrDecomposition;

/// Calculate the covariance matrix `(JᵀJ)⁻¹` from a weighted Jacobian.
///
/// The normal matrix is inverted through a QR decomposition; the call fails with
/// [`SingularMatrix`](crate::error::LeastSqError::SingularMatrix) when a diagonal
/// element of `R` is at or below `threshold` in absolute value.
pub fn calculate_covariance(jacobian: &Array2<f64>, threshold: f64) -> Result<Array2<f64>> {
    let jtj = jacobian.t().dot(jacobian);
    QrDecomposition::new(&jtj, threshold).solver().inverse()
}

/// Calculate correlation matrix from covariance matrix.
///
/// The correlation matrix is calculated as:
///   correl[i,j] = covar[i,j] / sqrt(covar[i,i] * covar[j,j])
///
/// Diagonal elements are exactly 1.0. Pairs involving a non-positive variance
/// get a correlation of 0.0.
pub fn calculate_correlation(covar: &Array2<f64>) -> Array2<f64> {
    let n = covar.nrows();
    Array2::from_shape_fn((n, n), |(i, j)| {
        if i == j {
            return 1.0;
        }
        let denom = (covar[[i, i]] * covar[[j, j]]).sqrt();
        if denom > 0.0 {
            covar[[i, j]] / denom
        } else {
            0.0
        }
    })
}

/// Extract standard errors from the covariance matrix.
///
/// These are the square roots of the diagonal. A negative variance, which only
/// arises from a numerically broken covariance, yields NaN.
pub fn standard_errors_from_covariance(covar: &Array2<f64>) -> Array1<f64> {
    covar.diag().mapv(f64::sqrt)
}
