use serde::{Deserialize, Serialize};

use crate::Position;

/// Outcome of a solver run. Infeasibility and resource limits are ordinary
/// outcomes, not errors.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SolveStatus {
    /// Proven optimal within the configured gap.
    Optimal,
    /// Proven infeasible.
    Infeasible,
    /// A resource limit was hit with a feasible incumbent.
    LimitFeasible,
    /// A resource limit was hit before any feasible solution was found.
    LimitInfeasible,
}

impl SolveStatus {
    pub fn has_solution(&self) -> bool {
        matches!(self, SolveStatus::Optimal | SolveStatus::LimitFeasible)
    }
}

impl std::fmt::Display for SolveStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SolveStatus::Optimal => "optimal",
            SolveStatus::Infeasible => "infeasible",
            SolveStatus::LimitFeasible => "limit reached (feasible)",
            SolveStatus::LimitInfeasible => "limit reached (no solution)",
        };
        f.write_str(s)
    }
}

/// Where one drone is at one time step.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub enum Placement {
    Base,
    Deployed(Position),
}

impl std::fmt::Display for Placement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Placement::Base => f.write_str("base"),
            Placement::Deployed(p) => write!(f, "{}", p),
        }
    }
}

/// Human-readable report of one solved scenario.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SolutionSummary {
    pub status: SolveStatus,
    /// `-1` when no solution exists.
    pub objective: f64,
    /// `-1` when no solution exists.
    pub distance: f64,
    /// `-1` when no solution exists.
    pub energy: f64,
    /// Seconds spent inside the solver.
    pub solve_time: f64,
    /// Indexed by time step, then drone. Empty when no solution exists.
    pub deployment: Vec<Vec<Placement>>,
}

impl std::fmt::Display for SolutionSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "status = {}", self.status)?;
        writeln!(f, "objective = {}", self.objective)?;
        writeln!(f, "distance = {}", self.distance)?;
        writeln!(f, "energy = {}", self.energy)?;
        writeln!(f, "solve_time = {:.3}", self.solve_time)?;
        for (t, drones) in self.deployment.iter().enumerate() {
            for (drone, placement) in drones.iter().enumerate() {
                writeln!(f, "t {} drone {} {}", t, drone, placement)?;
            }
        }
        Ok(())
    }
}

/// One line of the experiment results log.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ResultRow {
    pub scenario: String,
    pub positions_per_axis: u32,
    pub n_drones: usize,
    pub n_targets: usize,
    pub target_speed: f64,
    pub alpha: f64,
    pub instance: usize,
    pub status: SolveStatus,
    pub objective: f64,
    pub distance: f64,
    pub energy: f64,
    pub solve_time: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_lists_every_drone() {
        let summary = SolutionSummary {
            status: SolveStatus::Optimal,
            objective: 142.5,
            distance: 142.5,
            energy: 0.0,
            solve_time: 0.25,
            deployment: vec![vec![Placement::Deployed(Position::new(50.0, 50.0, 10.0)), Placement::Base]],
        };
        let text = summary.to_string();
        assert!(text.starts_with("status = optimal\n"));
        assert!(text.contains("objective = 142.5\n"));
        assert!(text.contains("t 0 drone 0 (50,50,10)\n"));
        assert!(text.contains("t 0 drone 1 base\n"));
    }

    #[test]
    fn only_feasible_outcomes_carry_solutions() {
        assert!(SolveStatus::Optimal.has_solution());
        assert!(SolveStatus::LimitFeasible.has_solution());
        assert!(!SolveStatus::Infeasible.has_solution());
        assert!(!SolveStatus::LimitInfeasible.has_solution());
    }
}
