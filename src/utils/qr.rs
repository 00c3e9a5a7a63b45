//! Householder QR decomposition with a singularity threshold.
//!
//! This is the dense solver used for covariance estimation. It does not pivot:
//! a matrix is treated as singular as soon as one diagonal element of `R` has an
//! absolute value at or below the threshold supplied at construction.

use ndarray::{Array1, Array2};

use crate::error::{LeastSqError, Result};

/// QR decomposition `A = Q·R` of an `m × n` matrix.
///
/// The strict lower part of `qr` holds the Householder vectors, the strict upper
/// part holds `R` and the diagonal of `R` is kept separately in `r_diag`.
#[derive(Debug, Clone)]
pub struct QrDecomposition {
    qr: Array2<f64>,
    r_diag: Array1<f64>,
    threshold: f64,
}

impl QrDecomposition {
    /// Decompose `matrix`, treating `|Rᵢᵢ| <= threshold` as singular.
    pub fn new(matrix: &Array2<f64>, threshold: f64) -> Self {
        let (m, n) = matrix.dim();
        let mut qr = matrix.clone();
        let steps = m.min(n);
        let mut r_diag = Array1::zeros(steps);

        for minor in 0..steps {
            let norm_sqr: f64 = (minor..m).map(|row| qr[[row, minor]] * qr[[row, minor]]).sum();
            let a = if qr[[minor, minor]] > 0.0 {
                -norm_sqr.sqrt()
            } else {
                norm_sqr.sqrt()
            };
            r_diag[minor] = a;

            if a != 0.0 {
                // v = x - a·e, stored in place of x
                qr[[minor, minor]] -= a;
                let scale = a * qr[[minor, minor]];
                for col in (minor + 1)..n {
                    let mut alpha = 0.0;
                    for row in minor..m {
                        alpha -= qr[[row, col]] * qr[[row, minor]];
                    }
                    alpha /= scale;
                    for row in minor..m {
                        qr[[row, col]] -= alpha * qr[[row, minor]];
                    }
                }
            }
        }

        Self {
            qr,
            r_diag,
            threshold,
        }
    }

    /// Solver view of this decomposition.
    pub fn solver(&self) -> QrSolver<'_> {
        QrSolver { decomposition: self }
    }
}

/// Least-squares solver backed by a [`QrDecomposition`].
#[derive(Debug, Clone, Copy)]
pub struct QrSolver<'a> {
    decomposition: &'a QrDecomposition,
}

impl QrSolver<'_> {
    /// Whether every diagonal element of `R` is above the threshold.
    pub fn is_non_singular(&self) -> bool {
        let threshold = self.decomposition.threshold;
        self.decomposition
            .r_diag
            .iter()
            .all(|d| d.abs() > threshold)
    }

    /// Least-squares solution of `A·x = b`.
    pub fn solve(&self, b: &Array1<f64>) -> Result<Array1<f64>> {
        let n = self.decomposition.qr.ncols();
        self.check(b.len())?;

        let mut y = b.clone();
        self.apply_qt(&mut y);

        let qr = &self.decomposition.qr;
        let r_diag = &self.decomposition.r_diag;
        let mut x = Array1::zeros(n);
        for row in (0..n).rev() {
            let mut sum = y[row];
            for col in (row + 1)..n {
                sum -= qr[[row, col]] * x[col];
            }
            x[row] = sum / r_diag[row];
        }
        Ok(x)
    }

    /// Column-by-column least-squares solution of `A·X = B`.
    pub fn solve_matrix(&self, b: &Array2<f64>) -> Result<Array2<f64>> {
        let (_, n) = self.decomposition.qr.dim();
        self.check(b.nrows())?;

        let mut x = Array2::zeros((n, b.ncols()));
        for (k, column) in b.columns().into_iter().enumerate() {
            let solution = self.solve(&column.to_owned())?;
            x.column_mut(k).assign(&solution);
        }
        Ok(x)
    }

    /// Inverse (pseudo-inverse for rectangular input) of the decomposed matrix.
    pub fn inverse(&self) -> Result<Array2<f64>> {
        let (m, _) = self.decomposition.qr.dim();
        self.solve_matrix(&Array2::eye(m))
    }

    fn check(&self, rhs_rows: usize) -> Result<()> {
        let (m, n) = self.decomposition.qr.dim();
        if rhs_rows != m {
            return Err(LeastSqError::DimensionMismatch {
                context: "right-hand side rows",
                expected: m,
                actual: rhs_rows,
            });
        }
        if m < n {
            return Err(LeastSqError::DimensionMismatch {
                context: "decomposed matrix rows",
                expected: n,
                actual: m,
            });
        }
        if !self.is_non_singular() {
            return Err(LeastSqError::SingularMatrix {
                threshold: self.decomposition.threshold,
            });
        }
        Ok(())
    }

    /// Overwrite `y` with `Qᵀ·y`.
    fn apply_qt(&self, y: &mut Array1<f64>) {
        let qr = &self.decomposition.qr;
        let r_diag = &self.decomposition.r_diag;
        let m = qr.nrows();
        for minor in 0..r_diag.len() {
            let scale = r_diag[minor] * qr[[minor, minor]];
            if scale == 0.0 {
                continue;
            }
            let mut dot = 0.0;
            for row in minor..m {
                dot += y[row] * qr[[row, minor]];
            }
            dot /= scale;
            for row in minor..m {
                y[row] += dot * qr[[row, minor]];
            }
        }
    }
}
