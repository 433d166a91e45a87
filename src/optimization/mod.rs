//! The `optimization` module provides the nonlinear least-squares machinery
//! behind inverse projection.
//!
//! Camera models never hand-derive their inverse. They describe the problem as
//! a [`ResidualObjective`], a residual vector that vanishes at the solution,
//! and hand it to any [`NonlinearSolver`] together with a seed, a target and
//! [`SolverSettings`]. The solver returns a [`SolverOutcome`] carrying the
//! solution and a status, which keeps the numerical method independent of the
//! camera geometry.
//!
//! Objectives are evaluated generically over [`RealField`] so that solvers can
//! differentiate them automatically.

use nalgebra::{DVector, RealField};
use serde::{Deserialize, Serialize};

pub mod levenberg_marquardt;
pub mod point_to_pixel;

pub use levenberg_marquardt::LevenbergMarquardt;
pub use point_to_pixel::PointToPixelObjective;

/// A residual function to be driven to its target by a [`NonlinearSolver`].
pub trait ResidualObjective: Clone + Send + Sync + 'static {
    /// Length of the residual vector.
    fn residual_dim(&self) -> usize;

    /// Evaluates the residual at `params`.
    ///
    /// Must not fail: points where the underlying model is undefined should
    /// map to a large, finite residual so the solver backs away from them.
    fn residual<T: RealField>(&self, params: &DVector<T>) -> DVector<T>;
}

/// Convergence settings shared by all solvers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverSettings {
    /// Stop when the cost decreases by less than this.
    pub abs_tolerance: f64,
    /// Stop when the relative cost decrease is below this.
    pub rel_tolerance: f64,
    /// Stop once the cost is below this.
    pub min_error: f64,
    pub max_iterations: usize,
    /// Largest final residual norm reported as [`SolveStatus::Converged`].
    pub max_residual: f64,
}

impl Default for SolverSettings {
    fn default() -> Self {
        SolverSettings {
            abs_tolerance: 1e-16,
            rel_tolerance: 1e-16,
            min_error: 1e-30,
            max_iterations: 100_000,
            max_residual: 1e-3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolveStatus {
    /// The final residual norm is within `max_residual`.
    Converged,
    /// The solver stopped at a finite point whose residual norm is above
    /// `max_residual`, for example after running out of iterations.
    Stalled,
    /// No usable solution was produced.
    Failed,
}

/// Result of a solve. On failure `solution` holds the initial guess; when
/// stalled it holds the point where the solver stopped.
#[derive(Debug, Clone)]
pub struct SolverOutcome {
    pub solution: DVector<f64>,
    pub status: SolveStatus,
    /// Half the squared residual norm at `solution`.
    pub final_cost: f64,
}

/// A generic nonlinear least-squares solver.
pub trait NonlinearSolver {
    /// Minimizes `|objective(x) - target|²` starting from `initial_guess`.
    fn solve<O: ResidualObjective>(
        &self,
        objective: O,
        initial_guess: &DVector<f64>,
        target: &DVector<f64>,
        settings: &SolverSettings,
    ) -> SolverOutcome;
}
