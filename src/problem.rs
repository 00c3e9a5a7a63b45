//! Problem definition: model functions, observations and the builder that ties them together.
//!
//! A [`LeastSquaresProblem`] couples a [`ModelFunction`] with the observed target
//! values, optional weights, a start point and the evaluation/iteration budgets.
//! It is immutable once built and can be shared between threads.

use std::fmt;
use std::sync::Arc;

use ndarray::{Array1, Array2};

use crate::error::{LeastSqError, Result};
use crate::evaluation::PointEvaluation;
use crate::lm::convergence::ConvergenceChecker;
use crate::utils::WeightFactor;

/// A parametric model with an analytic Jacobian.
///
/// Implementations must be side-effect free: the optimizer may call them any
/// number of times, from any thread.
pub trait ModelFunction: Send + Sync {
    /// Model values at `point`, one per observation.
    fn value(&self, point: &Array1<f64>) -> Array1<f64>;

    /// Jacobian of the model values with respect to the parameters at `point`.
    ///
    /// The matrix has one row per observation and one column per parameter.
    fn jacobian(&self, point: &Array1<f64>) -> Array2<f64>;
}

/// [`ModelFunction`] built from a pair of closures. See [`model_fn`].
pub struct FnModel<V, J> {
    value: V,
    jacobian: J,
}

impl<V, J> ModelFunction for FnModel<V, J>
where
    V: Fn(&Array1<f64>) -> Array1<f64> + Send + Sync,
    J: Fn(&Array1<f64>) -> Array2<f64> + Send + Sync,
{
    fn value(&self, point: &Array1<f64>) -> Array1<f64> {
        (self.value)(point)
    }

    fn jacobian(&self, point: &Array1<f64>) -> Array2<f64> {
        (self.jacobian)(point)
    }
}

/// Combine a value function and a Jacobian function into a [`ModelFunction`].
///
/// # Example
///
/// ```
/// use leastsq_rs::model_fn;
/// use ndarray::{array, Array2};
///
/// let x = array![0.0, 1.0, 2.0];
/// let xj = x.clone();
/// let model = model_fn(
///     move |p| x.mapv(|x| p[0] * x + p[1]),
///     move |_| Array2::from_shape_fn((xj.len(), 2), |(i, j)| if j == 0 { xj[i] } else { 1.0 }),
/// );
/// # let _ = model;
/// ```
pub fn model_fn<V, J>(value: V, jacobian: J) -> FnModel<V, J>
where
    V: Fn(&Array1<f64>) -> Array1<f64> + Send + Sync,
    J: Fn(&Array1<f64>) -> Array2<f64> + Send + Sync,
{
    FnModel { value, jacobian }
}

/// Maps a trial point onto the admissible parameter domain before it is evaluated.
pub trait ParameterValidator: Send + Sync {
    fn validate(&self, point: Array1<f64>) -> Array1<f64>;
}

impl<F> ParameterValidator for F
where
    F: Fn(Array1<f64>) -> Array1<f64> + Send + Sync,
{
    fn validate(&self, point: Array1<f64>) -> Array1<f64> {
        self(point)
    }
}

/// A fully specified least-squares problem.
#[derive(Clone)]
pub struct LeastSquaresProblem {
    model: Arc<dyn ModelFunction>,
    target: Array1<f64>,
    start: Array1<f64>,
    weights: Arc<WeightFactor>,
    max_evaluations: usize,
    max_iterations: usize,
    checker: Option<Arc<dyn ConvergenceChecker>>,
    validator: Option<Arc<dyn ParameterValidator>>,
}

impl LeastSquaresProblem {
    /// Evaluate the problem at `point`.
    ///
    /// # Errors
    ///
    /// [`LeastSqError::DimensionMismatch`] when the point, the model values or the
    /// model Jacobian do not have the shapes implied by the start point and target.
    pub fn evaluate(&self, point: &Array1<f64>) -> Result<PointEvaluation> {
        if point.len() != self.start.len() {
            return Err(LeastSqError::DimensionMismatch {
                context: "point length",
                expected: self.start.len(),
                actual: point.len(),
            });
        }

        let values = self.model.value(point);
        if values.len() != self.target.len() {
            return Err(LeastSqError::DimensionMismatch {
                context: "model values",
                expected: self.target.len(),
                actual: values.len(),
            });
        }
        let jacobian = self.model.jacobian(point);
        let residuals = &self.target - &values;

        PointEvaluation::new(point.clone(), residuals, jacobian, Arc::clone(&self.weights))
    }

    /// Apply the parameter validator, if any.
    pub fn validate(&self, point: Array1<f64>) -> Array1<f64> {
        match &self.validator {
            Some(validator) => validator.validate(point),
            None => point,
        }
    }

    /// The same problem started from a different point.
    ///
    /// # Errors
    ///
    /// [`LeastSqError::DimensionMismatch`] when `start` has a different length.
    pub fn with_start(&self, start: Array1<f64>) -> Result<Self> {
        if start.len() != self.start.len() {
            return Err(LeastSqError::DimensionMismatch {
                context: "start length",
                expected: self.start.len(),
                actual: start.len(),
            });
        }
        Ok(Self {
            start,
            ..self.clone()
        })
    }

    /// Observed values.
    pub fn target(&self) -> &Array1<f64> {
        &self.target
    }

    /// Initial guess.
    pub fn start(&self) -> &Array1<f64> {
        &self.start
    }

    /// Number of observations.
    pub fn observation_size(&self) -> usize {
        self.target.len()
    }

    /// Number of parameters.
    pub fn parameter_size(&self) -> usize {
        self.start.len()
    }

    pub fn max_evaluations(&self) -> usize {
        self.max_evaluations
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    /// Additional convergence test consulted after every accepted step.
    pub fn checker(&self) -> Option<&dyn ConvergenceChecker> {
        self.checker.as_deref()
    }
}

impl fmt::Debug for LeastSquaresProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LeastSquaresProblem")
            .field("observation_size", &self.observation_size())
            .field("parameter_size", &self.parameter_size())
            .field("start", &self.start)
            .field("weights", &self.weights)
            .field("max_evaluations", &self.max_evaluations)
            .field("max_iterations", &self.max_iterations)
            .field("has_checker", &self.checker.is_some())
            .field("has_validator", &self.validator.is_some())
            .finish()
    }
}

/// Raw weights as supplied to the builder.
#[derive(Debug, Clone)]
enum Weights {
    Diagonal(Array1<f64>),
    Matrix(Array2<f64>),
}

/// Fluent builder for [`LeastSquaresProblem`].
///
/// The model, the target and the start point are required; everything else is
/// optional. Budgets default to unbounded.
///
/// # Example
///
/// ```
/// use leastsq_rs::{model_fn, LeastSquaresBuilder};
/// use ndarray::{array, Array2};
///
/// let problem = LeastSquaresBuilder::new()
///     .model(model_fn(
///         |p| array![p[0], p[0]],
///         |_| Array2::ones((2, 1)),
///     ))
///     .target(array![1.0, 3.0])
///     .start(array![0.0])
///     .max_evaluations(100)
///     .build()
///     .unwrap();
/// assert_eq!(problem.observation_size(), 2);
/// ```
pub struct LeastSquaresBuilder {
    model: Option<Arc<dyn ModelFunction>>,
    target: Option<Array1<f64>>,
    start: Option<Array1<f64>>,
    weights: Option<Weights>,
    max_evaluations: usize,
    max_iterations: usize,
    checker: Option<Arc<dyn ConvergenceChecker>>,
    validator: Option<Arc<dyn ParameterValidator>>,
}

impl Default for LeastSquaresBuilder {
    fn default() -> Self {
        Self {
            model: None,
            target: None,
            start: None,
            weights: None,
            max_evaluations: usize::MAX,
            max_iterations: usize::MAX,
            checker: None,
            validator: None,
        }
    }
}

impl LeastSquaresBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the model function and its Jacobian.
    pub fn model<M: ModelFunction + 'static>(mut self, model: M) -> Self {
        self.model = Some(Arc::new(model));
        self
    }

    /// Set the observed values.
    pub fn target(mut self, target: Array1<f64>) -> Self {
        self.target = Some(target);
        self
    }

    /// Set the initial guess.
    pub fn start(mut self, start: Array1<f64>) -> Self {
        self.start = Some(start);
        self
    }

    /// Weight each observation independently; replaces any previous weights.
    pub fn weight_diagonal(mut self, weights: Array1<f64>) -> Self {
        self.weights = Some(Weights::Diagonal(weights));
        self
    }

    /// Weight observations with a symmetric positive semi-definite matrix;
    /// replaces any previous weights.
    pub fn weight_matrix(mut self, weights: Array2<f64>) -> Self {
        self.weights = Some(Weights::Matrix(weights));
        self
    }

    /// Set the maximum number of model evaluations.
    pub fn max_evaluations(mut self, max_evaluations: usize) -> Self {
        self.max_evaluations = max_evaluations;
        self
    }

    /// Set the maximum number of optimizer iterations.
    pub fn max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Add a convergence test consulted after each accepted step.
    pub fn checker<C: ConvergenceChecker + 'static>(mut self, checker: C) -> Self {
        self.checker = Some(Arc::new(checker));
        self
    }

    /// Map every trial point through `validator` before it is evaluated.
    pub fn parameter_validator<V: ParameterValidator + 'static>(mut self, validator: V) -> Self {
        self.validator = Some(Arc::new(validator));
        self
    }

    /// Build the problem.
    ///
    /// # Errors
    ///
    /// * [`LeastSqError::MissingField`] if the model, target or start was not set
    /// * [`LeastSqError::DimensionMismatch`] if the weights do not match the target length
    /// * [`LeastSqError::NotPositiveSemiDefinite`] for invalid weights
    pub fn build(self) -> Result<LeastSquaresProblem> {
        let model = self.model.ok_or(LeastSqError::MissingField("model"))?;
        let target = self.target.ok_or(LeastSqError::MissingField("target"))?;
        let start = self.start.ok_or(LeastSqError::MissingField("start"))?;

        let weights = match self.weights {
            None => WeightFactor::Unit,
            Some(Weights::Diagonal(diagonal)) => {
                check_weight_dimension(target.len(), diagonal.len())?;
                WeightFactor::from_diagonal(&diagonal)?
            }
            Some(Weights::Matrix(matrix)) => {
                check_weight_dimension(target.len(), matrix.nrows())?;
                WeightFactor::from_matrix(&matrix)?
            }
        };

        Ok(LeastSquaresProblem {
            model,
            target,
            start,
            weights: Arc::new(weights),
            max_evaluations: self.max_evaluations,
            max_iterations: self.max_iterations,
            checker: self.checker,
            validator: self.validator,
        })
    }
}

fn check_weight_dimension(expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(LeastSqError::DimensionMismatch {
            context: "weight dimension",
            expected,
            actual,
        });
    }
    Ok(())
}
