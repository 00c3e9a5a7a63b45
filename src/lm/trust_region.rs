//! Trust region implementation for the Levenberg-Marquardt algorithm.
//!
//! The step bound `delta` and the damping parameter adapt to the agreement
//! between the actual reduction of the cost and the reduction predicted by the
//! linearized model.

/// Steps with a smaller reduction ratio are rejected.
pub(crate) const ACCEPT_RATIO: f64 = 1.0e-4;

/// At or below this ratio the trust region shrinks.
const SHRINK_RATIO: f64 = 0.25;

/// At or above this ratio the trust region grows.
const GROW_RATIO: f64 = 0.75;

/// Actual and predicted relative reductions of the squared cost for one trial step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Reduction {
    pub actual: f64,
    pub predicted: f64,
    pub directional_derivative: f64,
    /// `actual / predicted`, or zero when nothing was predicted.
    pub ratio: f64,
}

impl Reduction {
    /// Compute the reductions of a trial step.
    ///
    /// # Arguments
    ///
    /// * `previous_cost` - Cost before the step
    /// * `current_cost` - Cost at the trial point
    /// * `predicted_norm_sqr` - `‖R·p‖²` for the trial step `p`
    /// * `lm_par` - Damping parameter the step was computed with
    /// * `lm_norm` - Scaled step length `‖D·p‖`
    pub(crate) fn new(
        previous_cost: f64,
        current_cost: f64,
        predicted_norm_sqr: f64,
        lm_par: f64,
        lm_norm: f64,
    ) -> Self {
        let actual = if 0.1 * current_cost < previous_cost {
            let r = current_cost / previous_cost;
            1.0 - r * r
        } else {
            -1.0
        };

        let pc2 = previous_cost * previous_cost;
        let coeff1 = predicted_norm_sqr / pc2;
        let coeff2 = lm_par * lm_norm * lm_norm / pc2;
        let predicted = coeff1 + 2.0 * coeff2;
        let directional_derivative = -(coeff1 + coeff2);
        let ratio = if predicted == 0.0 {
            0.0
        } else {
            actual / predicted
        };

        Self {
            actual,
            predicted,
            directional_derivative,
            ratio,
        }
    }

    /// Whether the trial step should be kept.
    pub(crate) fn is_accepted(&self) -> bool {
        self.ratio >= ACCEPT_RATIO
    }
}

/// Step bound and damping parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct TrustRegion {
    /// Bound on the scaled step length `‖D·p‖`.
    pub delta: f64,

    /// Levenberg-Marquardt damping parameter.
    pub lm_par: f64,
}

impl TrustRegion {
    /// Initial region: `factor · ‖D·x‖`, or `factor` alone for a zero scaled start point.
    pub(crate) fn new(initial_step_bound_factor: f64, x_norm: f64) -> Self {
        let delta = if x_norm == 0.0 {
            initial_step_bound_factor
        } else {
            initial_step_bound_factor * x_norm
        };
        Self { delta, lm_par: 0.0 }
    }

    /// Resize the region after a trial step.
    ///
    /// # Arguments
    ///
    /// * `reduction` - Reductions achieved by the step
    /// * `lm_norm` - Scaled step length `‖D·p‖`
    /// * `previous_cost` - Cost before the step
    /// * `current_cost` - Cost at the trial point
    pub(crate) fn update(
        &mut self,
        reduction: &Reduction,
        lm_norm: f64,
        previous_cost: f64,
        current_cost: f64,
    ) {
        if reduction.ratio <= SHRINK_RATIO {
            let mut factor = if reduction.actual < 0.0 {
                0.5 * reduction.directional_derivative
                    / (reduction.directional_derivative + 0.5 * reduction.actual)
            } else {
                0.5
            };
            if 0.1 * current_cost >= previous_cost || factor < 0.1 {
                factor = 0.1;
            }
            self.delta = factor * self.delta.min(10.0 * lm_norm);
            self.lm_par /= factor;
        } else if self.lm_par == 0.0 || reduction.ratio >= GROW_RATIO {
            self.delta = 2.0 * lm_norm;
            self.lm_par *= 0.5;
        }
    }
}
