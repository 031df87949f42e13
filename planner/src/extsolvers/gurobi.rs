#![cfg(feature = "gurobi")]

use std::cell::RefCell;

use fanet_structs::{report::SolveStatus, scenario::SolverLimits};
use grb::{expr::LinExpr as GrbLinExpr, prelude::*};
use log::debug;

use super::{MilpSolver, ObjectiveSense, SolverError};
use crate::{
    linexpr::LinExpr,
    model::{Constraint, Sense, VarId, VarKind, Variable},
};

thread_local! {
static GLOBAL_GUROBI_ENV :RefCell<Option<grb::Env>> = const { RefCell::new(None) };
}

fn backend(e: grb::Error) -> SolverError {
    SolverError::Backend(e.to_string())
}

pub struct GurobiSolver {
    grb: grb::Model,
    added_vars: Vec<grb::Var>,
    status: Option<SolveStatus>,
    objective: Option<f64>,
    solution: Vec<f64>,
}

impl GurobiSolver {
    /// Models share one Gurobi environment per thread.
    pub fn new() -> Result<Self, SolverError> {
        let mut grb = GLOBAL_GUROBI_ENV.with_borrow_mut(|e| {
            if e.is_none() {
                *e = Some(grb::Env::new("").map_err(backend)?);
            }
            match e.as_ref() {
                Some(env) => grb::Model::with_env("fanet", env).map_err(backend),
                None => Err(SolverError::Backend("no Gurobi environment".to_string())),
            }
        })?;
        grb.set_param(grb::param::OutputFlag, 0).map_err(backend)?;
        Ok(Self {
            grb,
            added_vars: Vec::new(),
            status: None,
            objective: None,
            solution: Vec::new(),
        })
    }

    pub fn with_limits(limits: &SolverLimits) -> Result<Self, SolverError> {
        let mut solver = Self::new()?;
        solver.set_limits(limits);
        Ok(solver)
    }
}

impl MilpSolver for GurobiSolver {
    fn set_limits(&mut self, limits: &SolverLimits) {
        let mut set = || -> grb::Result<()> {
            if let Some(seconds) = limits.time_limit {
                self.grb.set_param(grb::param::TimeLimit, seconds)?;
            }
            if let Some(mb) = limits.memory_limit_mb {
                // Gurobi takes gigabytes.
                self.grb.set_param(grb::param::MemLimit, mb / 1024.0)?;
            }
            self.grb.set_param(grb::param::MIPGap, limits.mip_rel_gap)?;
            self.grb.set_param(grb::param::OutputFlag, limits.verbose as i32)?;
            Ok(())
        };
        if let Err(e) = set() {
            log::warn!("Gurobi refused a solver limit: {}", e);
        }
    }

    fn add_variables(&mut self, vars: &[Variable]) -> Result<(), SolverError> {
        for v in vars {
            let vtype = match v.kind {
                VarKind::Binary => VarType::Binary,
                VarKind::Integer => VarType::Integer,
                VarKind::Continuous => VarType::Continuous,
            };
            let var = self
                .grb
                .add_var(&v.key.to_string(), vtype, 0.0, v.lower, v.upper, std::iter::empty())
                .map_err(|e| SolverError::InvalidModel(e.to_string()))?;
            self.added_vars.push(var);
        }
        Ok(())
    }

    fn add_constraints(&mut self, constrs: &[Constraint]) -> Result<(), SolverError> {
        for c in constrs {
            let mut expr = GrbLinExpr::new();
            for (var, coeff) in c.expr.terms() {
                expr.add_term(*coeff, self.added_vars[var.idx()]);
            }
            let rhs = c.rhs;
            let name = c.key.to_string();
            let constr = match c.sense {
                Sense::Le => c!(expr <= rhs),
                Sense::Eq => c!(expr == rhs),
                Sense::Ge => c!(expr >= rhs),
            };
            self.grb
                .add_constr(&name, constr)
                .map_err(|e| SolverError::InvalidModel(e.to_string()))?;
        }
        Ok(())
    }

    fn set_objective(&mut self, objective: &LinExpr, sense: ObjectiveSense) -> Result<(), SolverError> {
        let mut expr = GrbLinExpr::new();
        for (var, coeff) in objective.terms() {
            expr.add_term(*coeff, self.added_vars[var.idx()]);
        }
        let sense = match sense {
            ObjectiveSense::Minimize => ModelSense::Minimize,
            ObjectiveSense::Maximize => ModelSense::Maximize,
        };
        self.grb.set_objective(expr, sense).map_err(backend)
    }

    fn solve(&mut self) -> Result<SolveStatus, SolverError> {
        #[cfg(feature = "prof")]
        let _p = hprof::enter("gurobi solve");

        self.status = None;
        self.objective = None;
        self.solution.clear();

        self.grb.optimize().map_err(backend)?;
        let grb_status = self.grb.status().map_err(backend)?;
        let has_incumbent = self.grb.get_attr(attr::SolCount).map_err(backend)? > 0;
        debug!("Gurobi finished with {:?} ({} incumbent)", grb_status, if has_incumbent { "with" } else { "no" });

        let status = match grb_status {
            Status::Optimal => SolveStatus::Optimal,
            // Every variable of a deployment model is bounded.
            Status::Infeasible | Status::InfOrUnbd => SolveStatus::Infeasible,
            Status::Loaded | Status::InProgress | Status::Unbounded | Status::Numeric => {
                return Err(SolverError::Backend(format!("unexpected Gurobi status {:?}", grb_status)));
            }
            _ => {
                if has_incumbent {
                    SolveStatus::LimitFeasible
                } else {
                    SolveStatus::LimitInfeasible
                }
            }
        };

        if status.has_solution() {
            self.objective = Some(self.grb.get_attr(attr::ObjVal).map_err(backend)?);
            self.solution = self
                .grb
                .get_obj_attr_batch(attr::X, self.added_vars.iter().cloned())
                .map_err(backend)?;
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
