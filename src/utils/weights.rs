//! Square-root factors of observation weights.
//!
//! A weight matrix `W` enters the objective as `rᵀ·W·r = ‖L·r‖²`. The factor `L`
//! is stored once per problem and applied to residuals and Jacobians on demand.

use ndarray::{Array1, Array2, Axis};

use crate::error::{LeastSqError, Result};

/// Relative size below which a negative eigenvalue is treated as rounding noise.
const EIGEN_TOLERANCE: f64 = 1e-10;

/// Maximum number of cyclic Jacobi sweeps.
const MAX_SWEEPS: usize = 64;

/// The left factor `L` applied to residuals and Jacobians.
#[derive(Debug, Clone, PartialEq)]
pub enum WeightFactor {
    /// No weighting.
    Unit,

    /// Elementwise `sqrt(wᵢ)` of a diagonal weight matrix.
    Diagonal(Array1<f64>),

    /// Symmetric square root of a dense weight matrix.
    Dense(Array2<f64>),
}

impl WeightFactor {
    /// Factor for a diagonal weight matrix given by its diagonal.
    pub fn from_diagonal(weights: &Array1<f64>) -> Result<Self> {
        if let Some(&min) = weights.iter().find(|w| **w < 0.0 || w.is_nan()) {
            return Err(LeastSqError::NotPositiveSemiDefinite {
                min_eigenvalue: min,
            });
        }
        Ok(WeightFactor::Diagonal(weights.mapv(f64::sqrt)))
    }

    /// Factor for a dense weight matrix.
    ///
    /// Only the upper triangle is read. A matrix without off-diagonal entries
    /// takes the diagonal fast path.
    pub fn from_matrix(weights: &Array2<f64>) -> Result<Self> {
        let (rows, cols) = weights.dim();
        if rows != cols {
            return Err(LeastSqError::DimensionMismatch {
                context: "weight matrix columns",
                expected: rows,
                actual: cols,
            });
        }

        let symmetric = Array2::from_shape_fn((rows, rows), |(i, j)| {
            if i <= j {
                weights[[i, j]]
            } else {
                weights[[j, i]]
            }
        });

        let is_diagonal = symmetric
            .indexed_iter()
            .all(|((i, j), value)| i == j || *value == 0.0);
        if is_diagonal {
            return Self::from_diagonal(&symmetric.diag().to_owned());
        }

        let (eigenvalues, eigenvectors) = symmetric_eigen(symmetric);
        let scale = eigenvalues.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
        let min = eigenvalues.iter().copied().fold(f64::INFINITY, f64::min);
        if min < -EIGEN_TOLERANCE * scale {
            return Err(LeastSqError::NotPositiveSemiDefinite {
                min_eigenvalue: min,
            });
        }

        let roots = eigenvalues.mapv(|v| v.max(0.0).sqrt());
        let scaled = &eigenvectors * &roots.insert_axis(Axis(0));
        Ok(WeightFactor::Dense(scaled.dot(&eigenvectors.t())))
    }

    /// Number of observations this factor applies to, `None` for unit weights.
    pub fn dimension(&self) -> Option<usize> {
        match self {
            WeightFactor::Unit => None,
            WeightFactor::Diagonal(d) => Some(d.len()),
            WeightFactor::Dense(m) => Some(m.nrows()),
        }
    }

    /// Computes `L·v`.
    pub fn apply_to_vector(&self, v: &Array1<f64>) -> Array1<f64> {
        match self {
            WeightFactor::Unit => v.clone(),
            WeightFactor::Diagonal(d) => d * v,
            WeightFactor::Dense(m) => m.dot(v),
        }
    }

    /// Computes `L·M`.
    pub fn apply_to_matrix(&self, matrix: &Array2<f64>) -> Array2<f64> {
        match self {
            WeightFactor::Unit => matrix.clone(),
            WeightFactor::Diagonal(d) => matrix * &d.view().insert_axis(Axis(1)),
            WeightFactor::Dense(m) => m.dot(matrix),
        }
    }
}

/// Eigen-decomposition of a symmetric matrix by cyclic Jacobi rotations.
///
/// Returns the eigenvalues and the matrix whose columns are the eigenvectors.
fn symmetric_eigen(mut a: Array2<f64>) -> (Array1<f64>, Array2<f64>) {
    let n = a.nrows();
    let mut v = Array2::<f64>::eye(n);
    let norm = a.iter().map(|x| x * x).sum::<f64>().sqrt();

    for _ in 0..MAX_SWEEPS {
        let mut off = 0.0;
        for p in 0..n {
            for q in (p + 1)..n {
                off += a[[p, q]] * a[[p, q]];
            }
        }
        if off.sqrt() <= f64::EPSILON * norm {
            break;
        }

        for p in 0..n {
            for q in (p + 1)..n {
                let apq = a[[p, q]];
                if apq == 0.0 {
                    continue;
                }
                let theta = (a[[q, q]] - a[[p, p]]) / (2.0 * apq);
                let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;

                for k in 0..n {
                    let akp = a[[k, p]];
                    let akq = a[[k, q]];
                    a[[k, p]] = c * akp - s * akq;
                    a[[k, q]] = s * akp + c * akq;
                }
                for k in 0..n {
                    let apk = a[[p, k]];
                    let aqk = a[[q, k]];
                    a[[p, k]] = c * apk - s * aqk;
                    a[[q, k]] = s * apk + c * aqk;
                }
                for k in 0..n {
                    let vkp = v[[k, p]];
                    let vkq = v[[k, q]];
                    v[[k, p]] = c * vkp - s * vkq;
                    v[[k, q]] = s * vkp + c * vkq;
                }
            }
        }
    }

    (a.diag().to_owned(), v)
}
