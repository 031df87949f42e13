#![cfg(feature = "highs")]

use std::{
    convert::TryFrom,
    ffi::{c_void, CStr},
    fmt::{Debug, Formatter},
    os::raw::c_int,
};

use fanet_structs::{report::SolveStatus, scenario::SolverLimits};
use highs_sys::*;
use log::{debug, warn};

use super::{MilpSolver, ObjectiveSense, SolverError};
use crate::{
    linexpr::LinExpr,
    model::{Constraint, Sense, VarId, VarKind, Variable},
};

/// Value of HiGHS's `primal_solution_status` info when a feasible point is known.
const SOLUTION_STATUS_FEASIBLE: HighsInt = 2;

const VAR_TYPE_CONTINUOUS: HighsInt = 0;
const VAR_TYPE_INTEGER: HighsInt = 1;
const OBJ_SENSE_MINIMIZE: HighsInt = 1;
const OBJ_SENSE_MAXIMIZE: HighsInt = -1;

pub struct HighsSolver {
    ptr: *mut c_void,
    n_cols: usize,
    status: Option<SolveStatus>,
    objective: Option<f64>,
    solution: Vec<f64>,
}

impl Drop for HighsSolver {
    fn drop(&mut self) {
        unsafe {
            highs_sys::Highs_destroy(self.ptr);
        }
    }
}

impl Default for HighsSolver {
    fn default() -> Self {
        Self::new()
    }
}

impl HighsSolver {
    pub fn new() -> Self {
        let ptr = unsafe { highs_sys::Highs_create() };
        let mut solver = Self {
            ptr,
            n_cols: 0,
            status: None,
            objective: None,
            solution: Vec::new(),
        };
        solver.set_string_option(c"presolve", c"on");
        solver.set_limits(&SolverLimits::default());
        solver
    }

    pub fn with_limits(limits: &SolverLimits) -> Self {
        let mut solver = Self::new();
        solver.set_limits(limits);
        solver
    }

    pub fn inf(&self) -> f64 {
        unsafe { highs_sys::Highs_getInfinity(self.ptr) }
    }

    fn set_string_option(&mut self, name: &CStr, value: &CStr) {
        let retval = unsafe { highs_sys::Highs_setStringOptionValue(self.ptr, name.as_ptr(), value.as_ptr()) };
        if HighsStatus::try_from(retval) != Ok(HighsStatus::OK) {
            warn!("HiGHS refused option {:?} = {:?}", name, value);
        }
    }

    fn set_bool_option(&mut self, name: &CStr, value: bool) {
        let retval = unsafe { highs_sys::Highs_setBoolOptionValue(self.ptr, name.as_ptr(), value as HighsInt) };
        if HighsStatus::try_from(retval) != Ok(HighsStatus::OK) {
            warn!("HiGHS refused option {:?} = {}", name, value);
        }
    }

    fn set_double_option(&mut self, name: &CStr, value: f64) {
        let retval = unsafe { highs_sys::Highs_setDoubleOptionValue(self.ptr, name.as_ptr(), value) };
        if HighsStatus::try_from(retval) != Ok(HighsStatus::OK) {
            warn!("HiGHS refused option {:?} = {}", name, value);
        }
    }

    fn check(retval: HighsInt, what: &str) -> Result<(), SolverError> {
        match HighsStatus::try_from(retval) {
            Ok(HighsStatus::OK) => Ok(()),
            Ok(HighsStatus::Warning) => {
                warn!("HiGHS reported a warning while {}", what);
                Ok(())
            }
            _ => Err(SolverError::InvalidModel(format!("HiGHS failed while {}", what))),
        }
    }

    fn primal_solution_status(&self) -> HighsInt {
        let mut primal_solution_status: HighsInt = 0;
        unsafe {
            highs_sys::Highs_getIntInfoValue(
                self.ptr,
                c"primal_solution_status".as_ptr(),
                &mut primal_solution_status,
            )
        };
        primal_solution_status
    }

    fn run(&mut self) -> Result<HighsModelStatus, SolverError> {
        let retval = unsafe { highs_sys::Highs_run(self.ptr) };
        if HighsStatus::try_from(retval) == Ok(HighsStatus::Error) {
            return Err(SolverError::Backend("Highs_run returned an error".to_string()));
        }
        let model_status_retval = unsafe { highs_sys::Highs_getModelStatus(self.ptr) };
        HighsModelStatus::try_from(model_status_retval).map_err(|e| SolverError::Backend(format!("{:?}", e)))
    }
}

impl MilpSolver for HighsSolver {
    fn set_limits(&mut self, limits: &SolverLimits) {
        if let Some(seconds) = limits.time_limit {
            self.set_double_option(c"time_limit", seconds);
        }
        if let Some(mb) = limits.memory_limit_mb {
            warn!("HiGHS has no memory limit, ignoring the requested {} MB", mb);
        }
        self.set_double_option(c"mip_rel_gap", limits.mip_rel_gap);
        self.set_bool_option(c"output_flag", limits.verbose);
    }

    fn add_variables(&mut self, vars: &[Variable]) -> Result<(), SolverError> {
        if vars.is_empty() {
            return Ok(());
        }
        let costs = vec![0.0; vars.len()];
        let lower = vars.iter().map(|v| v.lower).collect::<Vec<_>>();
        let upper = vars.iter().map(|v| v.upper).collect::<Vec<_>>();
        let retval = unsafe {
            highs_sys::Highs_addCols(
                self.ptr,
                vars.len() as HighsInt,
                costs.as_ptr(),
                lower.as_ptr(),
                upper.as_ptr(),
                0,
                std::ptr::null(),
                std::ptr::null(),
                std::ptr::null(),
            )
        };
        Self::check(retval, "adding columns")?;

        let integrality = vars
            .iter()
            .map(|v| match v.kind {
                VarKind::Binary | VarKind::Integer => VAR_TYPE_INTEGER,
                VarKind::Continuous => VAR_TYPE_CONTINUOUS,
            })
            .collect::<Vec<HighsInt>>();
        let from = self.n_cols as HighsInt;
        let to = (self.n_cols + vars.len() - 1) as HighsInt;
        let retval =
            unsafe { highs_sys::Highs_changeColsIntegralityByRange(self.ptr, from, to, integrality.as_ptr()) };
        Self::check(retval, "setting integrality")?;

        self.n_cols += vars.len();
        Ok(())
    }

    fn add_constraints(&mut self, constrs: &[Constraint]) -> Result<(), SolverError> {
        if constrs.is_empty() {
            return Ok(());
        }
        let inf = self.inf();
        let nnz = constrs.iter().map(|c| c.expr.len()).sum::<usize>();
        let mut lower = Vec::with_capacity(constrs.len());
        let mut upper = Vec::with_capacity(constrs.len());
        let mut starts: Vec<HighsInt> = Vec::with_capacity(constrs.len());
        let mut index: Vec<HighsInt> = Vec::with_capacity(nnz);
        let mut value = Vec::with_capacity(nnz);

        for c in constrs {
            starts.push(index.len() as HighsInt);
            for (var, coeff) in c.expr.terms() {
                assert!(var.idx() < self.n_cols, "constraint {} uses unknown variable {:?}", c.key, var);
                index.push(var.0 as HighsInt);
                value.push(*coeff);
            }
            let (lb, ub) = match c.sense {
                Sense::Le => (-inf, c.rhs),
                Sense::Eq => (c.rhs, c.rhs),
                Sense::Ge => (c.rhs, inf),
            };
            lower.push(lb);
            upper.push(ub);
        }

        let retval = unsafe {
            highs_sys::Highs_addRows(
                self.ptr,
                constrs.len() as HighsInt,
                lower.as_ptr(),
                upper.as_ptr(),
                nnz as HighsInt,
                starts.as_ptr(),
                index.as_ptr(),
                value.as_ptr(),
            )
        };
        Self::check(retval, "adding rows")
    }

    fn set_objective(&mut self, objective: &LinExpr, sense: ObjectiveSense) -> Result<(), SolverError> {
        let mut costs = vec![0.0; self.n_cols];
        for (var, coeff) in objective.terms() {
            assert!(var.idx() < self.n_cols, "objective uses unknown variable {:?}", var);
            costs[var.idx()] += coeff;
        }
        if !costs.is_empty() {
            let retval = unsafe {
                highs_sys::Highs_changeColsCostByRange(self.ptr, 0, (costs.len() - 1) as HighsInt, costs.as_ptr())
            };
            Self::check(retval, "setting costs")?;
        }
        let sense = match sense {
            ObjectiveSense::Minimize => OBJ_SENSE_MINIMIZE,
            ObjectiveSense::Maximize => OBJ_SENSE_MAXIMIZE,
        };
        let retval = unsafe { highs_sys::Highs_changeObjectiveSense(self.ptr, sense) };
        Self::check(retval, "setting the objective sense")
    }

    fn solve(&mut self) -> Result<SolveStatus, SolverError> {
        #[cfg(feature = "prof")]
        let _p = hprof::enter("highs solve");

        self.status = None;
        self.objective = None;
        self.solution.clear();

        let model_status = self.run()?;
        let primal_feasible = self.primal_solution_status() == SOLUTION_STATUS_FEASIBLE;
        debug!("HiGHS finished with {:?} (primal feasible: {})", model_status, primal_feasible);

        let status = match model_status {
            HighsModelStatus::Optimal | HighsModelStatus::ModelEmpty => SolveStatus::Optimal,
            // Every variable of a deployment model is bounded.
            HighsModelStatus::Infeasible | HighsModelStatus::UnboundedOrInfeasible => SolveStatus::Infeasible,
            HighsModelStatus::ReachedTimeLimit
            | HighsModelStatus::ReachedIterationLimit
            | HighsModelStatus::SolutionLimit
            | HighsModelStatus::Interrupt
            | HighsModelStatus::MemoryLimit
            | HighsModelStatus::ObjectiveBound
            | HighsModelStatus::ObjectiveTarget
            | HighsModelStatus::Unknown => {
                if primal_feasible {
                    SolveStatus::LimitFeasible
                } else {
                    SolveStatus::LimitInfeasible
                }
            }
            other => {
                return Err(SolverError::Backend(format!("unexpected HiGHS model status {:?}", other)));
            }
        };

        if status.has_solution() {
            self.solution = vec![0.0; self.n_cols];
            if self.n_cols > 0 {
                let null = std::ptr::null_mut();
                let retval =
                    unsafe { highs_sys::Highs_getSolution(self.ptr, self.solution.as_mut_ptr(), null, null, null) };
                Self::check(retval, "reading the solution")?;
            }
            self.objective = Some(unsafe { highs_sys::Highs_getObjectiveValue(self.ptr) });
        }
        self.status = Some(status);
        Ok(status)
    }

    fn status(&self) -> Option<SolveStatus> {
        self.status
    }

    fn objective_value(&self) -> Option<f64> {
        self.objective
    }

    fn value_of(&self, var: VarId) -> Option<f64> {
        self.values().and_then(|v| v.get(var.idx()).copied())
    }

    fn values(&self) -> Option<&[f64]> {
        self.status
            .is_some_and(|s| s.has_solution())
            .then_some(self.solution.as_slice())
    }
}

// Model statuses newer than the constants exported by `highs-sys`.
const MODEL_STATUS_SOLUTION_LIMIT: c_int = 16;
const MODEL_STATUS_INTERRUPT: c_int = 17;
const MODEL_STATUS_MEMORY_LIMIT: c_int = 18;

/// The kinds of results of an optimization
#[derive(Clone, Copy, Debug, PartialOrd, PartialEq, Ord, Eq)]
pub enum HighsModelStatus {
    NotSet = MODEL_STATUS_NOTSET as isize,
    LoadError = MODEL_STATUS_LOAD_ERROR as isize,
    ModelError = MODEL_STATUS_MODEL_ERROR as isize,
    PresolveError = MODEL_STATUS_PRESOLVE_ERROR as isize,
    SolveError = MODEL_STATUS_SOLVE_ERROR as isize,
    PostsolveError = MODEL_STATUS_POSTSOLVE_ERROR as isize,
    /// No variables in the model: nothing to optimize
    ModelEmpty = MODEL_STATUS_MODEL_EMPTY as isize,
    Infeasible = MODEL_STATUS_INFEASIBLE as isize,
    UnboundedOrInfeasible = MODEL_STATUS_UNBOUNDED_OR_INFEASIBLE as isize,
    Unbounded = MODEL_STATUS_UNBOUNDED as isize,
    Optimal = MODEL_STATUS_OPTIMAL as isize,
    ObjectiveBound = MODEL_STATUS_OBJECTIVE_BOUND as isize,
    ObjectiveTarget = MODEL_STATUS_OBJECTIVE_TARGET as isize,
    ReachedTimeLimit = MODEL_STATUS_REACHED_TIME_LIMIT as isize,
    ReachedIterationLimit = MODEL_STATUS_REACHED_ITERATION_LIMIT as isize,
    Unknown = MODEL_STATUS_UNKNOWN as isize,
    SolutionLimit = MODEL_STATUS_SOLUTION_LIMIT as isize,
    Interrupt = MODEL_STATUS_INTERRUPT as isize,
    MemoryLimit = MODEL_STATUS_MEMORY_LIMIT as isize,
}

/// An unexpected status code returned by HiGHS.
#[derive(PartialEq, Clone, Copy)]
pub struct InvalidStatus(pub c_int);

impl Debug for InvalidStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} is not a known HiGHS status", self.0)
    }
}

impl TryFrom<c_int> for HighsModelStatus {
    type Error = InvalidStatus;

    fn try_from(value: c_int) -> Result<Self, Self::Error> {
        match value {
            MODEL_STATUS_NOTSET => Ok(Self::NotSet),
            MODEL_STATUS_LOAD_ERROR => Ok(Self::LoadError),
            MODEL_STATUS_MODEL_ERROR => Ok(Self::ModelError),
            MODEL_STATUS_PRESOLVE_ERROR => Ok(Self::PresolveError),
            MODEL_STATUS_SOLVE_ERROR => Ok(Self::SolveError),
            MODEL_STATUS_POSTSOLVE_ERROR => Ok(Self::PostsolveError),
            MODEL_STATUS_MODEL_EMPTY => Ok(Self::ModelEmpty),
            MODEL_STATUS_INFEASIBLE => Ok(Self::Infeasible),
            MODEL_STATUS_UNBOUNDED => Ok(Self::Unbounded),
            MODEL_STATUS_UNBOUNDED_OR_INFEASIBLE => Ok(Self::UnboundedOrInfeasible),
            MODEL_STATUS_OPTIMAL => Ok(Self::Optimal),
            MODEL_STATUS_OBJECTIVE_BOUND => Ok(Self::ObjectiveBound),
            MODEL_STATUS_OBJECTIVE_TARGET => Ok(Self::ObjectiveTarget),
            MODEL_STATUS_REACHED_TIME_LIMIT => Ok(Self::ReachedTimeLimit),
            MODEL_STATUS_REACHED_ITERATION_LIMIT => Ok(Self::ReachedIterationLimit),
            MODEL_STATUS_UNKNOWN => Ok(Self::Unknown),
            MODEL_STATUS_SOLUTION_LIMIT => Ok(Self::SolutionLimit),
            MODEL_STATUS_INTERRUPT => Ok(Self::Interrupt),
            MODEL_STATUS_MEMORY_LIMIT => Ok(Self::MemoryLimit),
            n => Err(InvalidStatus(n)),
        }
    }
}

/// The status of a highs operation
#[derive(Clone, Copy, Debug, PartialOrd, PartialEq, Ord, Eq)]
pub enum HighsStatus {
    OK = 0,
    Warning = 1,
    Error = 2,
}

impl TryFrom<c_int> for HighsStatus {
    type Error = InvalidStatus;

    fn try_from(value: c_int) -> Result<Self, InvalidStatus> {
        match value {
            STATUS_OK => Ok(Self::OK),
            STATUS_WARNING => Ok(Self::Warning),
            STATUS_ERROR => Ok(Self::Error),
            n => Err(InvalidStatus(n)),
        }
    }
}
