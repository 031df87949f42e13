pub mod coverage;
pub mod energy;
pub mod extsolvers;
pub mod linexpr;
pub mod milp;
pub mod model;

mod milp_tests;

pub use coverage::{CoverageGraph, Node};
pub use extsolvers::{MilpSolver, SolverError};
pub use milp::{DeploymentModel, DeploymentSolution};
