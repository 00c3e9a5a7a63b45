//! Step calculation for the Levenberg-Marquardt algorithm.
//!
//! The step is computed the MINPACK way: a Householder QR factorization of the
//! weighted residual Jacobian with column pivoting, followed by a search for the
//! damping parameter `λ` whose step `p(λ)` has scaled length close to the step
//! bound. Each trial `p(λ)` comes from eliminating `sqrt(λ)·D` out of `[R; sqrt(λ)·D]`
//! with Givens rotations, so `JᵀJ` is never formed.

use ndarray::{s, Array1, Array2};
use tracing::trace;

use crate::error::{LeastSqError, Result};

/// Iterations of the damping parameter search beyond the first.
const LM_PARAMETER_ITERATIONS: usize = 10;

/// Rank-revealing QR factorization of the weighted residual Jacobian.
///
/// `r` holds the factorization in place: Householder vectors on and below the
/// diagonal, the strict upper part of `R` above it, all in permuted column order.
/// After [`RankedQr::store_r_diagonal`] the diagonal holds `R`'s diagonal instead.
#[derive(Debug, Clone)]
pub(crate) struct RankedQr {
    r: Array2<f64>,
    permutation: Vec<usize>,
    rank: usize,
    diag_r: Array1<f64>,
    jac_norm: Array1<f64>,
    beta: Array1<f64>,
}

impl RankedQr {
    /// Factor `−jacobian`, the Jacobian of the residuals.
    ///
    /// Columns are pivoted by largest remaining norm. The factorization stops as
    /// soon as that squared norm is at most `ranking_threshold`; the number of
    /// columns processed by then is the rank.
    pub(crate) fn decompose(
        jacobian: &Array2<f64>,
        solved_cols: usize,
        ranking_threshold: f64,
    ) -> Result<Self> {
        let (rows, cols) = jacobian.dim();
        let mut r = jacobian.mapv(|v| -v);
        let mut permutation: Vec<usize> = (0..cols).collect();
        let mut diag_r = Array1::zeros(cols);
        let mut beta = Array1::zeros(cols);
        let jac_norm = Array1::from_shape_fn(cols, |k| r.column(k).dot(&r.column(k)).sqrt());

        for k in 0..solved_cols {
            let mut next_column = k;
            let mut ak2 = f64::NEG_INFINITY;
            for i in k..cols {
                let column = permutation[i];
                let norm2: f64 = (k..rows).map(|j| r[[j, column]] * r[[j, column]]).sum();
                if !norm2.is_finite() {
                    return Err(LeastSqError::UnableToDecomposeJacobian { rows, cols });
                }
                if norm2 > ak2 {
                    next_column = i;
                    ak2 = norm2;
                }
            }
            if ak2 <= ranking_threshold {
                return Ok(Self {
                    r,
                    permutation,
                    rank: k,
                    diag_r,
                    jac_norm,
                    beta,
                });
            }
            permutation.swap(next_column, k);
            let pk = permutation[k];

            // Householder reflection mapping the active part of column pk onto alpha·e_k
            let akk = r[[k, pk]];
            let alpha = if akk > 0.0 { -ak2.sqrt() } else { ak2.sqrt() };
            let betak = 1.0 / (ak2 - akk * alpha);
            beta[pk] = betak;
            diag_r[pk] = alpha;
            r[[k, pk]] -= alpha;

            for &pc in &permutation[k + 1..] {
                let mut gamma = 0.0;
                for j in k..rows {
                    gamma += r[[j, pk]] * r[[j, pc]];
                }
                gamma *= betak;
                for j in k..rows {
                    r[[j, pc]] -= gamma * r[[j, pk]];
                }
            }
        }

        Ok(Self {
            r,
            permutation,
            rank: solved_cols,
            diag_r,
            jac_norm,
            beta,
        })
    }

    /// Norms of the original Jacobian columns, in unpermuted order.
    pub(crate) fn jac_norm(&self) -> &Array1<f64> {
        &self.jac_norm
    }

    pub(crate) fn permutation(&self) -> &[usize] {
        &self.permutation
    }

    pub(crate) fn rank(&self) -> usize {
        self.rank
    }

    /// Overwrite `y` with `Qᵀ·y`.
    pub(crate) fn q_ty(&self, y: &mut Array1<f64>) {
        let (rows, cols) = self.r.dim();
        for k in 0..rows.min(cols) {
            let pk = self.permutation[k];
            let mut gamma = 0.0;
            for i in k..rows {
                gamma += self.r[[i, pk]] * y[i];
            }
            gamma *= self.beta[pk];
            for i in k..rows {
                y[i] -= gamma * self.r[[i, pk]];
            }
        }
    }

    /// Replace the Householder diagonal by `R`'s diagonal once `Q` is no longer needed.
    pub(crate) fn store_r_diagonal(&mut self, solved_cols: usize) {
        for k in 0..solved_cols {
            let pk = self.permutation[k];
            self.r[[k, pk]] = self.diag_r[pk];
        }
    }

    /// Largest cosine of the angle between `qtf` and the columns of `R`.
    pub(crate) fn max_cosine(&self, qtf: &Array1<f64>, cost: f64, solved_cols: usize) -> f64 {
        if cost == 0.0 {
            return 0.0;
        }
        let mut max_cosine: f64 = 0.0;
        for j in 0..solved_cols {
            let pj = self.permutation[j];
            let s = self.jac_norm[pj];
            if s != 0.0 {
                let sum: f64 = (0..=j).map(|i| self.r[[i, pj]] * qtf[i]).sum();
                max_cosine = max_cosine.max(sum.abs() / (s * cost));
            }
        }
        max_cosine
    }

    /// Squared norm of `R·Pᵀ·dir`, the linear model's prediction for a step.
    pub(crate) fn predicted_norm_sqr(&self, dir: &Array1<f64>, solved_cols: usize) -> f64 {
        let mut work = Array1::<f64>::zeros(solved_cols);
        for j in 0..solved_cols {
            let pj = self.permutation[j];
            let dir_j = dir[pj];
            for i in 0..=j {
                work[i] += self.r[[i, pj]] * dir_j;
            }
        }
        work.dot(&work)
    }

    /// Search for the damping parameter.
    ///
    /// Finds `λ` such that the step `p(λ)` solving
    /// `min ‖[R; sqrt(λ)·D]·p − [qy; 0]‖` satisfies `‖D·p‖ ≈ delta` within 10%,
    /// or `λ = 0` when the Gauss-Newton step is already short enough. The step is
    /// written to `lm_dir` and the new `λ` is returned.
    ///
    /// # Arguments
    ///
    /// * `qy` - `Qᵀ` times the weighted residuals
    /// * `delta` - Step bound
    /// * `diag` - Diagonal scaling `D`
    /// * `solved_cols` - `min(rows, cols)` of the Jacobian
    /// * `lm_par` - Damping parameter from the previous search
    /// * `lm_dir` - Output step, in unpermuted order
    pub(crate) fn determine_lm_parameter(
        &mut self,
        qy: &Array1<f64>,
        delta: f64,
        diag: &Array1<f64>,
        solved_cols: usize,
        lm_par: f64,
        lm_dir: &mut Array1<f64>,
    ) -> f64 {
        let cols = self.r.ncols();
        let rank = self.rank;
        let mut work1 = Array1::<f64>::zeros(cols);
        let mut work2 = Array1::<f64>::zeros(cols);
        let mut work3 = Array1::<f64>::zeros(cols);

        // Gauss-Newton direction; a least-squares solution when rank deficient.
        for j in 0..rank {
            lm_dir[self.permutation[j]] = qy[j];
        }
        for j in rank..cols {
            lm_dir[self.permutation[j]] = 0.0;
        }
        for k in (0..rank).rev() {
            let pk = self.permutation[k];
            let ypk = lm_dir[pk] / self.diag_r[pk];
            for i in 0..k {
                lm_dir[self.permutation[i]] -= ypk * self.r[[i, pk]];
            }
            lm_dir[pk] = ypk;
        }

        let mut dx_norm = 0.0;
        for j in 0..solved_cols {
            let pj = self.permutation[j];
            let s = diag[pj] * lm_dir[pj];
            work1[pj] = s;
            dx_norm += s * s;
        }
        dx_norm = dx_norm.sqrt();
        let mut fp = dx_norm - delta;
        if fp <= 0.1 * delta {
            trace!(dx_norm, delta, "gauss-newton step accepted");
            return 0.0;
        }

        // Lower bound from the Newton step, only available at full rank.
        let mut parl = 0.0;
        if rank == solved_cols {
            for j in 0..solved_cols {
                let pj = self.permutation[j];
                work1[pj] *= diag[pj] / dx_norm;
            }
            let mut sum2 = 0.0;
            for j in 0..solved_cols {
                let pj = self.permutation[j];
                let mut sum = 0.0;
                for i in 0..j {
                    sum += self.r[[i, pj]] * work1[self.permutation[i]];
                }
                let s = (work1[pj] - sum) / self.diag_r[pj];
                work1[pj] = s;
                sum2 += s * s;
            }
            parl = fp / (delta * sum2);
        }

        // Upper bound from the scaled gradient.
        let mut sum2 = 0.0;
        for j in 0..solved_cols {
            let pj = self.permutation[j];
            let mut sum = 0.0;
            for i in 0..=j {
                sum += self.r[[i, pj]] * qy[i];
            }
            sum /= diag[pj];
            sum2 += sum * sum;
        }
        let g_norm = sum2.sqrt();
        let mut paru = g_norm / delta;
        if paru == 0.0 {
            paru = f64::MIN_POSITIVE / delta.min(0.1);
        }

        let mut lm_par = paru.min(lm_par.max(parl));
        if lm_par == 0.0 {
            lm_par = g_norm / dx_norm;
        }

        for _ in 0..=LM_PARAMETER_ITERATIONS {
            if lm_par == 0.0 {
                lm_par = f64::MIN_POSITIVE.max(0.001 * paru);
            }
            let s_par = lm_par.sqrt();
            for j in 0..solved_cols {
                let pj = self.permutation[j];
                work1[pj] = s_par * diag[pj];
            }
            self.determine_lm_direction(qy, &work1, &mut work2, solved_cols, &mut work3, lm_dir);

            dx_norm = 0.0;
            for j in 0..solved_cols {
                let pj = self.permutation[j];
                let s = diag[pj] * lm_dir[pj];
                work3[pj] = s;
                dx_norm += s * s;
            }
            dx_norm = dx_norm.sqrt();
            let previous_fp = fp;
            fp = dx_norm - delta;
            trace!(lm_par, parl, paru, fp, "damping parameter search");

            if fp.abs() <= 0.1 * delta || (parl == 0.0 && fp <= previous_fp && previous_fp < 0.0)
            {
                return lm_par;
            }

            // Newton correction
            for j in 0..solved_cols {
                let pj = self.permutation[j];
                work1[pj] = work3[pj] * diag[pj] / dx_norm;
            }
            for j in 0..solved_cols {
                let pj = self.permutation[j];
                work1[pj] /= work2[j];
                let tmp = work1[pj];
                for i in (j + 1)..solved_cols {
                    work1[self.permutation[i]] -= self.r[[i, pj]] * tmp;
                }
            }
            let mut sum2 = 0.0;
            for j in 0..solved_cols {
                let s = work1[self.permutation[j]];
                sum2 += s * s;
            }
            let correction = fp / (delta * sum2);

            if fp > 0.0 {
                parl = parl.max(lm_par);
            } else if fp < 0.0 {
                paru = paru.min(lm_par);
            }
            lm_par = parl.max(lm_par + correction);
        }

        lm_par
    }

    /// Solve `[R; D]·p ≈ [qy; 0]` in the least-squares sense.
    ///
    /// `D` is eliminated row by row with Givens rotations. The resulting upper
    /// triangle `S` is stored in the strict lower part of `r` and its diagonal in
    /// `lm_diag`; `R` itself is left intact. When `S` is singular the trailing
    /// components of the solution are set to zero.
    fn determine_lm_direction(
        &mut self,
        qy: &Array1<f64>,
        diag: &Array1<f64>,
        lm_diag: &mut Array1<f64>,
        solved_cols: usize,
        work: &mut Array1<f64>,
        lm_dir: &mut Array1<f64>,
    ) {
        // Copy R to the lower triangle and keep its diagonal in lm_dir.
        for j in 0..solved_cols {
            let pj = self.permutation[j];
            for i in (j + 1)..solved_cols {
                self.r[[i, pj]] = self.r[[j, self.permutation[i]]];
            }
            lm_dir[j] = self.diag_r[pj];
            work[j] = qy[j];
        }

        for j in 0..solved_cols {
            let pj = self.permutation[j];
            let dpj = diag[pj];
            if dpj != 0.0 {
                lm_diag.slice_mut(s![j + 1..]).fill(0.0);
                lm_diag[j] = dpj;

                // Only one element of the transformed qy beyond the first n is
                // touched; it starts at zero.
                let mut qtbpj = 0.0;
                for k in j..solved_cols {
                    let pk = self.permutation[k];
                    if lm_diag[k] == 0.0 {
                        continue;
                    }

                    let rkk = self.r[[k, pk]];
                    let (sin, cos) = if rkk.abs() < lm_diag[k].abs() {
                        let cotan = rkk / lm_diag[k];
                        let sin = 1.0 / (1.0 + cotan * cotan).sqrt();
                        (sin, sin * cotan)
                    } else {
                        let tan = lm_diag[k] / rkk;
                        let cos = 1.0 / (1.0 + tan * tan).sqrt();
                        (cos * tan, cos)
                    };

                    self.r[[k, pk]] = cos * rkk + sin * lm_diag[k];
                    let temp = cos * work[k] + sin * qtbpj;
                    qtbpj = -sin * work[k] + cos * qtbpj;
                    work[k] = temp;

                    for i in (k + 1)..solved_cols {
                        let rik = self.r[[i, pk]];
                        let temp2 = cos * rik + sin * lm_diag[i];
                        lm_diag[i] = -sin * rik + cos * lm_diag[i];
                        self.r[[i, pk]] = temp2;
                    }
                }
            }

            // Diagonal of S goes to lm_diag, R's diagonal is restored.
            lm_diag[j] = self.r[[j, pj]];
            self.r[[j, pj]] = lm_dir[j];
        }

        let mut n_sing = solved_cols;
        for j in 0..solved_cols {
            if lm_diag[j] == 0.0 && n_sing == solved_cols {
                n_sing = j;
            }
            if n_sing < solved_cols {
                work[j] = 0.0;
            }
        }
        for j in (0..n_sing).rev() {
            let pj = self.permutation[j];
            let mut sum = 0.0;
            for i in (j + 1)..n_sing {
                sum += self.r[[i, pj]] * work[i];
            }
            work[j] = (work[j] - sum) / lm_diag[j];
        }

        for j in 0..solved_cols {
            lm_dir[self.permutation[j]] = work[j];
        }
        for j in solved_cols..lm_dir.len() {
            lm_dir[self.permutation[j]] = 0.0;
        }
    }
}
