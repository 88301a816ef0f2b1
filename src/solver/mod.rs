//! Feasibility solving and classification of the result.
//!
//! A [`FeasibilitySolver`] maximizes the model objective over the steady-state
//! flux polytope. [`assess`] turns whatever it returns into errors, warnings
//! and an objective value.

pub mod lp;

use crate::core::error::SolverError;
use crate::core::{SolverConfig, ValidationOutcome};
use crate::model::Model;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use lp::ClarabelSolver;

/// Termination status of a solve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolveStatus {
    /// An optimal point was found.
    Optimal,
    /// No flux distribution satisfies the constraints.
    Infeasible,
    /// The objective can grow without limit.
    Unbounded,
    /// Stopped at the iteration limit.
    IterationLimit,
    /// Stopped at the time limit.
    TimeLimit,
    /// The solver lost numerical accuracy.
    NumericalError,
    /// The problem could not be solved for another reason.
    Failed(String),
}

impl SolveStatus {
    /// Check if the solve reached optimality.
    pub fn is_optimal(&self) -> bool {
        matches!(self, SolveStatus::Optimal)
    }
}

impl fmt::Display for SolveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolveStatus::Optimal => write!(f, "optimal"),
            SolveStatus::Infeasible => write!(f, "infeasible"),
            SolveStatus::Unbounded => write!(f, "unbounded"),
            SolveStatus::IterationLimit => write!(f, "iteration_limit"),
            SolveStatus::TimeLimit => write!(f, "time_limit"),
            SolveStatus::NumericalError => write!(f, "numerical_error"),
            SolveStatus::Failed(detail) => write!(f, "failed: {}", detail),
        }
    }
}

/// Result of optimizing a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Solution {
    /// Termination status.
    pub status: SolveStatus,
    /// Objective value at the returned point; meaningful only when optimal.
    pub objective_value: f64,
    /// Flux per reaction id.
    pub fluxes: IndexMap<String, f64>,
}

impl Solution {
    /// A solution with no usable point.
    pub fn with_status(status: SolveStatus) -> Self {
        Self {
            status,
            objective_value: f64::NAN,
            fluxes: IndexMap::new(),
        }
    }
}

/// Optimizer for the steady-state flux problem.
pub trait FeasibilitySolver: Send + Sync {
    /// Name for logs.
    fn name(&self) -> &str;

    /// Maximize `sum(c_j * v_j)` subject to `S v = 0` and `lb <= v <= ub`.
    fn optimize(&self, model: &Model) -> Result<Solution, SolverError>;
}

/// Classify a solve into errors, warnings and an objective value.
pub fn assess(
    model: &Model,
    result: Result<Solution, SolverError>,
    config: &SolverConfig,
) -> ValidationOutcome {
    let mut outcome = ValidationOutcome::new();
    let solution = match result {
        Ok(solution) => solution,
        Err(e) => Solution::with_status(SolveStatus::Failed(e.to_string())),
    };

    if !solution.status.is_optimal() {
        outcome.add_error(format!(
            "model can not be solved (status '{}')",
            solution.status
        ));
        return outcome;
    }

    let mut value = solution.objective_value;
    if value.abs() <= config.zero_tolerance {
        value = 0.0;
    }

    let terms = model.objective_len();
    if terms == 0 {
        outcome.add_warning("model has no objective function");
    } else if value <= 0.0 {
        outcome.add_warning("model can not produce nonzero biomass");
    } else if value <= config.low_flux_threshold {
        outcome.add_warning(format!("biomass flux {} too low", value));
    }
    if terms > 1 {
        outcome.add_warning("model should only have one reaction as the objective");
    }

    outcome.objective = Some(value);
    outcome
}
