//! Levenberg-Marquardt backend built on `tiny_solver`.
//!
//! The objective is wrapped in a `tiny_solver` factor over a single parameter
//! block; Jacobians come from `tiny_solver`'s automatic differentiation.

use std::collections::HashMap;

use log::{debug, warn};
use nalgebra::{DVector, RealField};
use tiny_solver::factors::Factor;
use tiny_solver::optimizer::OptimizerOptions;
use tiny_solver::{LevenbergMarquardtOptimizer, Optimizer as TinySolverOptimizer};

use crate::geometry::lift;
use crate::optimization::{
    NonlinearSolver, ResidualObjective, SolveStatus, SolverOutcome, SolverSettings,
};

const PARAMS_KEY: &str = "params";

/// Cost function for `tiny_solver`: the objective minus its target.
#[derive(Debug, Clone)]
struct ObjectiveFactor<O> {
    objective: O,
    target: DVector<f64>,
}

impl<T: RealField, O: ResidualObjective> Factor<T> for ObjectiveFactor<O> {
    fn residual_func(&self, params: &[DVector<T>]) -> DVector<T> {
        let target = self.target.map(lift::<T>);
        self.objective.residual(&params[0]) - target
    }
}

/// Levenberg-Marquardt solver.
#[derive(Debug, Clone, Copy, Default)]
pub struct LevenbergMarquardt;

impl LevenbergMarquardt {
    fn options(settings: &SolverSettings) -> OptimizerOptions {
        OptimizerOptions {
            max_iteration: settings.max_iterations,
            min_abs_error_decrease_threshold: settings.abs_tolerance,
            min_rel_error_decrease_threshold: settings.rel_tolerance,
            min_error_threshold: settings.min_error,
            ..OptimizerOptions::default()
        }
    }
}

impl NonlinearSolver for LevenbergMarquardt {
    fn solve<O: ResidualObjective>(
        &self,
        objective: O,
        initial_guess: &DVector<f64>,
        target: &DVector<f64>,
        settings: &SolverSettings,
    ) -> SolverOutcome {
        let failed = || SolverOutcome {
            solution: initial_guess.clone(),
            status: SolveStatus::Failed,
            final_cost: f64::INFINITY,
        };

        if objective.residual_dim() != target.len() {
            warn!(
                "Residual dimension {} does not match target length {}",
                objective.residual_dim(),
                target.len()
            );
            return failed();
        }

        let mut problem = tiny_solver::Problem::new();
        let factor = ObjectiveFactor {
            objective: objective.clone(),
            target: target.clone(),
        };
        problem.add_residual_block(
            objective.residual_dim(),
            &[PARAMS_KEY],
            Box::new(factor),
            None,
        );

        let mut initial_values = HashMap::new();
        initial_values.insert(PARAMS_KEY.to_string(), initial_guess.clone());

        let optimizer = LevenbergMarquardtOptimizer::default();
        let Some(mut result) =
            optimizer.optimize(&problem, &initial_values, Some(Self::options(settings)))
        else {
            debug!("Levenberg-Marquardt returned no solution");
            return failed();
        };
        let Some(solution) = result.remove(PARAMS_KEY) else {
            return failed();
        };

        let residual = objective.residual(&solution) - target;
        let final_cost = 0.5 * residual.norm_squared();
        if !final_cost.is_finite() || solution.iter().any(|v| !v.is_finite()) {
            return failed();
        }

        // tiny-solver does not report why it stopped, so judge the result.
        let residual_norm = residual.norm();
        let status = if residual_norm <= settings.max_residual {
            SolveStatus::Converged
        } else {
            debug!(
                "Levenberg-Marquardt stopped with residual {residual_norm:e} above {:e}",
                settings.max_residual
            );
            SolveStatus::Stalled
        };

        SolverOutcome {
            solution,
            status,
            final_cost,
        }
    }
}
