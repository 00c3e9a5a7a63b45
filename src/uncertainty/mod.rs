//! # Uncertainty Calculation
//!
//! Parameter uncertainties derived from the weighted Jacobian at a solution:
//!
//! - Covariance matrix estimation `(JᵀJ)⁻¹` with an explicit singularity threshold
//! - Standard errors (square roots of the variances)
//! - Correlation coefficients between parameters

mod covariance;

pub use covariance::{
    calculate_correlation, calculate_covariance, standard_errors_from_covariance,
};
