//! Levenberg-Marquardt optimizer.
//!
//! This module contains the MINPACK-style Levenberg-Marquardt implementation:
//! - Configuration of tolerances and the initial step bound
//! - Pivoted QR step computation with Givens-rotation damping
//! - Trust region management
//! - Convergence criteria and termination reasons
//! - Parallel batch optimization

pub mod algorithm;
pub mod config;
pub mod convergence;
pub mod optimum;
pub mod parallel;
mod step;
mod trust_region;

pub use algorithm::LevenbergMarquardt;
pub use config::LmConfig;
pub use convergence::{ConvergenceChecker, EvaluationRmsChecker, PointChecker, Termination};
pub use optimum::Optimum;
