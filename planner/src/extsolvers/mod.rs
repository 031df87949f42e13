//! Adapters for external MILP solvers.

use fanet_structs::{report::SolveStatus, scenario::SolverLimits};
use thiserror::Error;

use crate::{
    linexpr::LinExpr,
    model::{Constraint, VarId, Variable},
};

pub use crate::model::ObjectiveSense;

pub mod gurobi;
pub mod highs;

#[derive(Debug, Error)]
pub enum SolverError {
    #[error("solver rejected the model: {0}")]
    InvalidModel(String),
    #[error("solver failed: {0}")]
    Backend(String),
    #[error("no solution values available (status {0:?})")]
    NoSolution(Option<SolveStatus>),
}

/// A MILP backend fed in bulk: all variables, then all constraints, then the
/// objective. Variables are numbered in the order they are added, so
/// `VarId(i)` is the `i`-th variable submitted.
pub trait MilpSolver {
    fn set_limits(&mut self, limits: &SolverLimits);
    fn add_variables(&mut self, vars: &[Variable]) -> Result<(), SolverError>;
    fn add_constraints(&mut self, constrs: &[Constraint]) -> Result<(), SolverError>;
    fn set_objective(&mut self, objective: &LinExpr, sense: ObjectiveSense) -> Result<(), SolverError>;
    fn solve(&mut self) -> Result<SolveStatus, SolverError>;
    /// `None` until [`MilpSolver::solve`] has returned successfully.
    fn status(&self) -> Option<SolveStatus>;
    fn objective_value(&self) -> Option<f64>;
    fn value_of(&self, var: VarId) -> Option<f64>;
    /// Values of all variables, indexed by `VarId`.
    fn values(&self) -> Option<&[f64]>;
}
