//! Flux balance LP solved with clarabel's interior-point method.

use crate::core::error::SolverError;
use crate::core::SolverConfig;
use crate::model::Model;
use crate::solver::{FeasibilitySolver, SolveStatus, Solution};
use clarabel::algebra::*;
use clarabel::solver::*;
use indexmap::IndexMap;
use std::collections::HashMap;

/// Default [`FeasibilitySolver`].
///
/// Clarabel minimizes `q'x` subject to `Ax + s = b`, `s` in a cone, so the
/// objective is negated and bounds become rows:
///
/// - `S v = 0` and fixed bounds (`lb == ub`) go in the zero cone
/// - `v_j <= ub_j` and `-v_j <= -lb_j` go in the nonnegative cone
///
/// Infinite bounds produce no row.
#[derive(Debug, Clone)]
pub struct ClarabelSolver {
    max_iterations: u32,
    time_limit_secs: Option<f64>,
}

impl Default for ClarabelSolver {
    fn default() -> Self {
        Self::from_config(&SolverConfig::default())
    }
}

impl ClarabelSolver {
    /// Build a solver with limits from configuration.
    pub fn from_config(config: &SolverConfig) -> Self {
        Self {
            max_iterations: config.max_iterations,
            time_limit_secs: config.time_limit_secs,
        }
    }

    fn settings(&self) -> DefaultSettings<f64> {
        DefaultSettings {
            verbose: false,
            max_iter: self.max_iterations,
            time_limit: self.time_limit_secs.unwrap_or(f64::INFINITY),
            ..DefaultSettings::default()
        }
    }
}

fn map_status(status: &SolverStatus) -> SolveStatus {
    match status {
        SolverStatus::Solved | SolverStatus::AlmostSolved => SolveStatus::Optimal,
        SolverStatus::PrimalInfeasible | SolverStatus::AlmostPrimalInfeasible => {
            SolveStatus::Infeasible
        }
        SolverStatus::DualInfeasible | SolverStatus::AlmostDualInfeasible => SolveStatus::Unbounded,
        SolverStatus::MaxIterations => SolveStatus::IterationLimit,
        SolverStatus::MaxTime => SolveStatus::TimeLimit,
        SolverStatus::NumericalError | SolverStatus::InsufficientProgress => {
            SolveStatus::NumericalError
        }
        other => SolveStatus::Failed(format!("{:?}", other)),
    }
}

/// Constraint rows in cone order, stored by column.
struct Problem {
    q: Vec<f64>,
    columns: Vec<Vec<(usize, f64)>>,
    b: Vec<f64>,
    zero_rows: usize,
    nonnegative_rows: usize,
}

impl Problem {
    fn build(model: &Model) -> Result<Self, SolverError> {
        let n = model.reactions.len();
        let mut columns: Vec<Vec<(usize, f64)>> = vec![Vec::new(); n];
        let mut q = vec![0.0; n];

        // Mass balance rows, one per metabolite that takes part in a reaction.
        let mut metabolite_rows: HashMap<&str, usize> = HashMap::new();
        for (j, reaction) in model.reactions.values().enumerate() {
            if reaction.lower_bound.is_nan() || reaction.upper_bound.is_nan() {
                return Err(SolverError::InvalidProblem(format!(
                    "reaction '{}' has a NaN bound",
                    reaction.id
                )));
            }
            if !reaction.objective_coefficient.is_finite() {
                return Err(SolverError::InvalidProblem(format!(
                    "reaction '{}' has a non-finite objective coefficient",
                    reaction.id
                )));
            }
            q[j] = -reaction.objective_coefficient;
            for (metabolite, coefficient) in &reaction.metabolites {
                if *coefficient == 0.0 {
                    continue;
                }
                let next = metabolite_rows.len();
                let row = *metabolite_rows.entry(metabolite.as_str()).or_insert(next);
                columns[j].push((row, *coefficient));
            }
        }
        let mut b = vec![0.0; metabolite_rows.len()];

        for (j, reaction) in model.reactions.values().enumerate() {
            if reaction.lower_bound == reaction.upper_bound && reaction.lower_bound.is_finite() {
                columns[j].push((b.len(), 1.0));
                b.push(reaction.lower_bound);
            }
        }
        let zero_rows = b.len();

        for (j, reaction) in model.reactions.values().enumerate() {
            if reaction.lower_bound == reaction.upper_bound && reaction.lower_bound.is_finite() {
                continue;
            }
            if reaction.upper_bound.is_finite() {
                columns[j].push((b.len(), 1.0));
                b.push(reaction.upper_bound);
            }
            if reaction.lower_bound.is_finite() {
                columns[j].push((b.len(), -1.0));
                b.push(-reaction.lower_bound);
            }
        }
        let nonnegative_rows = b.len() - zero_rows;

        Ok(Self {
            q,
            columns,
            b,
            zero_rows,
            nonnegative_rows,
        })
    }

    fn rows(&self) -> usize {
        self.b.len()
    }

    fn constraint_matrix(&self) -> CscMatrix<f64> {
        let mut colptr = Vec::with_capacity(self.columns.len() + 1);
        let mut rowval = Vec::new();
        let mut nzval = Vec::new();
        colptr.push(0);
        for column in &self.columns {
            let mut entries = column.clone();
            entries.sort_by_key(|(row, _)| *row);
            for (row, value) in entries {
                rowval.push(row);
                nzval.push(value);
            }
            colptr.push(rowval.len());
        }
        CscMatrix::new(self.rows(), self.columns.len(), colptr, rowval, nzval)
    }

    fn cones(&self) -> Vec<SupportedConeT<f64>> {
        let mut cones = Vec::new();
        if self.zero_rows > 0 {
            cones.push(ZeroConeT(self.zero_rows));
        }
        if self.nonnegative_rows > 0 {
            cones.push(NonnegativeConeT(self.nonnegative_rows));
        }
        cones
    }
}

fn point_solution(model: &Model, status: SolveStatus, x: &[f64]) -> Solution {
    let objective_value = model
        .reactions
        .values()
        .zip(x)
        .map(|(reaction, flux)| reaction.objective_coefficient * flux)
        .sum();
    let fluxes = model
        .reactions
        .keys()
        .cloned()
        .zip(x.iter().copied())
        .collect::<IndexMap<_, _>>();
    Solution {
        status,
        objective_value,
        fluxes,
    }
}

impl FeasibilitySolver for ClarabelSolver {
    fn name(&self) -> &str {
        "clarabel"
    }

    fn optimize(&self, model: &Model) -> Result<Solution, SolverError> {
        let problem = Problem::build(model)?;
        let n = model.reactions.len();

        // Nothing to hand to the interior-point method.
        if n == 0 {
            return Ok(point_solution(model, SolveStatus::Optimal, &[]));
        }
        if problem.rows() == 0 {
            let status = if problem.q.iter().all(|c| *c == 0.0) {
                SolveStatus::Optimal
            } else {
                SolveStatus::Unbounded
            };
            return Ok(point_solution(model, status, &vec![0.0; n]));
        }

        let p = CscMatrix::<f64>::zeros((n, n));
        let a = problem.constraint_matrix();
        let cones = problem.cones();

        let mut solver = DefaultSolver::new(&p, &problem.q, &a, &problem.b, &cones, self.settings());
        solver.solve();

        let status = map_status(&solver.solution.status);
        log::debug!(
            "clarabel finished with {:?} after {} iterations ({} reactions, {} rows)",
            solver.solution.status,
            solver.solution.iterations,
            n,
            problem.rows()
        );
        if !status.is_optimal() {
            return Ok(Solution::with_status(status));
        }
        Ok(point_solution(model, status, &solver.solution.x))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Metabolite, Reaction};

    fn chain(uptake: f64) -> Model {
        let mut model = Model::new("chain");
        for id in ["a_e", "a_c"] {
            model.add_metabolite(Metabolite::new(id)).unwrap();
        }
        model
            .add_reaction(
                Reaction::new("EX_a")
                    .with_metabolite("a_e", -1.0)
                    .with_bounds(-uptake, 1000.0),
            )
            .unwrap();
        model
            .add_reaction(
                Reaction::new("Ta")
                    .with_metabolite("a_e", -1.0)
                    .with_metabolite("a_c", 1.0),
            )
            .unwrap();
        model
            .add_reaction(
                Reaction::new("BIOMASS")
                    .with_metabolite("a_c", -1.0)
                    .with_objective(1.0),
            )
            .unwrap();
        model
    }

    #[test]
    fn test_uptake_limited_objective() {
        let solution = ClarabelSolver::default().optimize(&chain(10.0)).unwrap();
        assert_eq!(solution.status, SolveStatus::Optimal);
        assert!((solution.objective_value - 10.0).abs() < 1e-5, "{}", solution.objective_value);
        assert!((solution.fluxes["Ta"] - 10.0).abs() < 1e-5);
    }

    #[test]
    fn test_infeasible_fixed_flux() {
        let mut model = chain(10.0);
        // forced secretion with nothing to secrete
        model.reactions["EX_a"].lower_bound = 5.0;
        model.reactions["EX_a"].upper_bound = 5.0;
        model.reactions["BIOMASS"].lower_bound = 0.0;
        let solution = ClarabelSolver::default().optimize(&model).unwrap();
        assert_eq!(solution.status, SolveStatus::Infeasible);
    }

    #[test]
    fn test_unbounded() {
        let mut model = chain(10.0);
        model.reactions["EX_a"].lower_bound = f64::NEG_INFINITY;
        model.reactions["Ta"].upper_bound = f64::INFINITY;
        model.reactions["BIOMASS"].upper_bound = f64::INFINITY;
        let solution = ClarabelSolver::default().optimize(&model).unwrap();
        assert_eq!(solution.status, SolveStatus::Unbounded);
    }

    #[test]
    fn test_empty_model() {
        let solution = ClarabelSolver::default().optimize(&Model::new("empty")).unwrap();
        assert_eq!(solution.status, SolveStatus::Optimal);
        assert_eq!(solution.objective_value, 0.0);
    }

    #[test]
    fn test_nan_bound_rejected() {
        let mut model = chain(10.0);
        model.reactions["Ta"].upper_bound = f64::NAN;
        assert!(matches!(
            ClarabelSolver::default().optimize(&model),
            Err(SolverError::InvalidProblem(_))
        ));
    }

    #[test]
    fn test_constraint_layout() {
        let problem = Problem::build(&chain(10.0)).unwrap();
        assert_eq!(problem.zero_rows, 2);
        // EX_a both bounds, Ta and BIOMASS both bounds
        assert_eq!(problem.nonnegative_rows, 6);
        assert_eq!(problem.q, vec![0.0, 0.0, -1.0]);
    }
}
