//! Parallel batch optimization.
//!
//! Independent problems (or independent starts of one problem) are fanned out on
//! the Rayon thread pool. Each run is the ordinary sequential optimizer; nothing is
//! shared between runs except the immutable problem data.

use ndarray::Array1;
use rayon::prelude::*;

use crate::error::Result;
use crate::evaluation::Evaluation;
use crate::problem::LeastSquaresProblem;

use super::algorithm::LevenbergMarquardt;
use super::optimum::Optimum;

impl LevenbergMarquardt {
    /// Optimize several independent problems in parallel.
    ///
    /// Results are returned in the order of `problems`; a failure in one run does
    /// not affect the others.
    pub fn optimize_all(&self, problems: &[LeastSquaresProblem]) -> Vec<Result<Optimum>> {
        problems
            .par_iter()
            .map(|problem| self.optimize(problem))
            .collect()
    }

    /// Optimize one problem from several start points in parallel.
    ///
    /// # Returns
    ///
    /// * One result per start point, in the order of `starts`
    pub fn optimize_starts(
        &self,
        problem: &LeastSquaresProblem,
        starts: &[Array1<f64>],
    ) -> Vec<Result<Optimum>> {
        starts
            .par_iter()
            .map(|start| {
                let restarted = problem.with_start(start.clone())?;
                self.optimize(&restarted)
            })
            .collect()
    }

    /// Optimize from several start points and keep the lowest-cost optimum.
    ///
    /// Returns the first error only when every start fails.
    pub fn optimize_best_of(
        &self,
        problem: &LeastSquaresProblem,
        starts: &[Array1<f64>],
    ) -> Option<Result<Optimum>> {
        let mut first_error = None;
        let mut best: Option<Optimum> = None;
        for result in self.optimize_starts(problem, starts) {
            match result {
                Ok(optimum) => {
                    let better = best
                        .as_ref()
                        .map_or(true, |b| optimum.compute_cost() < b.compute_cost());
                    if better {
                        best = Some(optimum);
                    }
                }
                Err(err) => {
                    first_error.get_or_insert(err);
                }
            }
        }
        match (best, first_error) {
            (Some(optimum), _) => Some(Ok(optimum)),
            (None, Some(err)) => Some(Err(err)),
            (None, None) => None,
        }
    }
}
