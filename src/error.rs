use thiserror::Error;

/// Error types for the leastsq-rs library.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LeastSqError {
    /// Two sizes that must agree do not.
    #[error("Dimension mismatch in {context}: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// What was being checked, e.g. "jacobian rows".
        context: &'static str,
        expected: usize,
        actual: usize,
    },

    /// The evaluation budget was exhausted.
    #[error("Maximal count ({max}) of evaluations exceeded after {iterations} iterations")]
    TooManyEvaluations {
        max: usize,
        /// Iterations performed when the budget ran out.
        iterations: usize,
    },

    /// The iteration budget was exhausted.
    #[error("Maximal count ({max}) of iterations exceeded after {evaluations} evaluations")]
    TooManyIterations {
        max: usize,
        /// Evaluations performed when the budget ran out.
        evaluations: usize,
    },

    /// A decomposition found a pivot at or below the singularity threshold.
    #[error("Matrix is singular (threshold {threshold:e})")]
    SingularMatrix { threshold: f64 },

    /// A required builder input was never supplied.
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// Weights that cannot be factored as `Lᵀ·L`.
    #[error("Weight matrix is not positive semi-definite (smallest eigenvalue {min_eigenvalue:e})")]
    NotPositiveSemiDefinite { min_eigenvalue: f64 },

    /// The weighted Jacobian contains infinite or NaN entries.
    #[error("Unable to perform QR decomposition on the {rows}x{cols} jacobian")]
    UnableToDecomposeJacobian { rows: usize, cols: usize },

    /// A tolerance is too small for any further improvement to be measurable.
    #[error("{tolerance} tolerance is too small ({value:e}), no further reduction is possible")]
    ToleranceTooSmall {
        tolerance: &'static str,
        value: f64,
    },
}

/// Result type for leastsq-rs operations.
pub type Result<T> = std::result::Result<T, LeastSqError>;
