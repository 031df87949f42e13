//! Scenario configuration.
//!
//! All parameters are plain immutable values passed by argument. A [`Sweep`]
//! enumerates parameter combinations for batch experiments; each combination
//! becomes one [`Scenario`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Position;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ScenarioError {
    #[error("scenario needs at least one target")]
    NoTargets,
    #[error("scenario needs at least one drone")]
    NoDrones,
    #[error("observation period must be at least one time step")]
    EmptyObservationPeriod,
    #[error("{name} must be positive and finite, got {value}")]
    NonPositive { name: &'static str, value: f64 },
    #[error("{name} must be finite and non-negative, got {value}")]
    Negative { name: &'static str, value: f64 },
    #[error("no allowed deployment heights")]
    NoHeights,
    #[error("grid needs at least one subdivision per axis")]
    NoSubdivisions,
    #[error("coverage angle must lie strictly between 0 and pi/2, got {0}")]
    CoverageAngle(f64),
    #[error("candidate position set is empty")]
    EmptyCandidateSet,
    #[error("alpha must lie in [0, 1], got {0}")]
    AlphaOutOfRange(f64),
    #[error("trace covers {trace} time steps but the model expects {model}")]
    PeriodMismatch { trace: usize, model: usize },
    #[error("trace holds {found} trajectories but declares {declared} targets")]
    TargetCountMismatch { declared: usize, found: usize },
    #[error("trajectory {target} has {len} positions, expected {expected}")]
    TrajectoryLength { target: usize, len: usize, expected: usize },
    #[error("trajectory {target} leaves the area at time step {time_step}")]
    OutOfArea { target: usize, time_step: usize },
    #[error("sweep list `{0}` is empty")]
    EmptySweepList(&'static str),
}

fn positive(name: &'static str, value: f64) -> Result<(), ScenarioError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ScenarioError::NonPositive { name, value })
    }
}

fn non_negative(name: &'static str, value: f64) -> Result<(), ScenarioError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ScenarioError::Negative { name, value })
    }
}

/// Geometry of the search space: the square area, the candidate grid and the
/// radio/coverage model.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct GraphParams {
    /// Side length of the square area.
    pub area_size: f64,
    /// Allowed deployment heights.
    pub heights: Vec<f64>,
    pub base_station: Position,
    /// Grid subdivisions per axis. The grid has `n^2 * heights` positions.
    pub positions_per_axis: u32,
    /// Maximum distance between two communicating nodes.
    pub comm_range: f64,
    /// Half-angle of the coverage cone, in radians.
    pub coverage_angle: f64,
}

impl GraphParams {
    pub fn coverage_tangent(&self) -> f64 {
        self.coverage_angle.tan()
    }

    pub fn validate(&self) -> Result<(), ScenarioError> {
        positive("area_size", self.area_size)?;
        positive("comm_range", self.comm_range)?;
        if self.heights.is_empty() {
            return Err(ScenarioError::NoHeights);
        }
        for h in self.heights.iter() {
            non_negative("height", *h)?;
        }
        if !self.base_station.is_finite() {
            return Err(ScenarioError::NonPositive { name: "base_station", value: f64::NAN });
        }
        if self.positions_per_axis == 0 {
            return Err(ScenarioError::NoSubdivisions);
        }
        if !(self.coverage_angle > 0.0 && self.coverage_angle < std::f64::consts::FRAC_PI_2) {
            return Err(ScenarioError::CoverageAngle(self.coverage_angle));
        }
        Ok(())
    }
}

/// Parameters of the random-waypoint target trace.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct TraceParams {
    pub n_targets: usize,
    /// Number of time steps.
    pub observation_period: usize,
    /// Target speed in m/s.
    pub target_speed: f64,
    pub area_size: f64,
    /// Seconds between two time steps.
    pub time_step_delta: f64,
}

impl Default for TraceParams {
    fn default() -> Self {
        Self {
            n_targets: 5,
            observation_period: 5,
            target_speed: 5.0,
            area_size: 100.0,
            time_step_delta: 1.0,
        }
    }
}

impl TraceParams {
    pub fn validate(&self) -> Result<(), ScenarioError> {
        if self.n_targets == 0 {
            return Err(ScenarioError::NoTargets);
        }
        if self.observation_period == 0 {
            return Err(ScenarioError::EmptyObservationPeriod);
        }
        positive("target_speed", self.target_speed)?;
        positive("area_size", self.area_size)?;
        positive("time_step_delta", self.time_step_delta)?;
        positive("step_length", self.step_length())?;
        Ok(())
    }

    /// Distance a target covers in one time step.
    pub fn step_length(&self) -> f64 {
        self.target_speed * self.time_step_delta
    }
}

/// Parameters of the deployment model itself.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct ModelParams {
    pub n_drones: usize,
    pub observation_period: usize,
    pub time_step_delta: f64,
    /// Weight of energy against distance in the objective.
    pub alpha: f64,
    /// Normalisation of energy units against metres.
    pub beta: f64,
}

impl ModelParams {
    pub fn validate(&self) -> Result<(), ScenarioError> {
        if self.n_drones == 0 {
            return Err(ScenarioError::NoDrones);
        }
        if self.observation_period == 0 {
            return Err(ScenarioError::EmptyObservationPeriod);
        }
        positive("time_step_delta", self.time_step_delta)?;
        if !(0.0..=1.0).contains(&self.alpha) {
            return Err(ScenarioError::AlphaOutOfRange(self.alpha));
        }
        non_negative("beta", self.beta)?;
        Ok(())
    }
}

/// Limits handed to the external solver.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SolverLimits {
    /// Wall-clock limit in seconds.
    pub time_limit: Option<f64>,
    /// Working memory limit in megabytes. Not every backend supports this.
    pub memory_limit_mb: Option<f64>,
    pub mip_rel_gap: f64,
    pub verbose: bool,
}

impl Default for SolverLimits {
    fn default() -> Self {
        Self {
            time_limit: None,
            memory_limit_mb: None,
            mip_rel_gap: 1e-6,
            verbose: false,
        }
    }
}

/// One concrete parameter combination of a [`Sweep`].
#[derive(Clone, Debug, PartialEq)]
pub struct Scenario {
    pub graph: GraphParams,
    pub trace: TraceParams,
    pub model: ModelParams,
    pub instance: usize,
}

impl Scenario {
    /// Identifier used to cache results of this scenario on disk.
    pub fn key(&self) -> String {
        format!(
            "p_{}_d_{}_nt_{}_t_{}_v_{}_alpha_{}_i_{}",
            self.graph.positions_per_axis,
            self.model.n_drones,
            self.trace.n_targets,
            self.trace.observation_period,
            self.trace.target_speed,
            self.model.alpha,
            self.instance
        )
    }

    /// Identifier of the trace this scenario uses. Scenarios that differ only
    /// in drones, alpha or grid share a trace.
    pub fn trace_key(&self) -> String {
        format!(
            "nt_{}_t_{}_v_{}_i_{}",
            self.trace.n_targets, self.trace.observation_period, self.trace.target_speed, self.instance
        )
    }

    pub fn validate(&self) -> Result<(), ScenarioError> {
        self.graph.validate()?;
        self.trace.validate()?;
        self.model.validate()?;
        if self.trace.observation_period != self.model.observation_period {
            return Err(ScenarioError::PeriodMismatch {
                trace: self.trace.observation_period,
                model: self.model.observation_period,
            });
        }
        Ok(())
    }
}

/// A parameter sweep. List-valued fields are crossed with each other.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Sweep {
    /// Becomes the output directory of the experiment.
    pub experiment_name: String,
    pub n_drones: Vec<usize>,
    pub n_targets: Vec<usize>,
    pub target_speeds: Vec<f64>,
    pub observation_period: usize,
    pub time_step_delta: f64,
    pub alphas: Vec<f64>,
    pub beta: f64,
    pub area_size: f64,
    pub positions_per_axis: Vec<u32>,
    pub heights: Vec<f64>,
    pub base_station: Position,
    pub comm_range: f64,
    pub coverage_angle: f64,
    /// Number of random trace instances per combination.
    pub n_instances: usize,
    #[serde(default)]
    pub limits: SolverLimits,
}

const DEFAULT_BETA: f64 = 0.08095;

impl Default for Sweep {
    fn default() -> Self {
        Sweep {
            experiment_name: "default".to_string(),
            n_drones: vec![3, 5, 10],
            n_targets: vec![1, 5, 10],
            target_speeds: vec![10.0],
            observation_period: 5,
            time_step_delta: 1.0,
            alphas: vec![0.0],
            beta: DEFAULT_BETA,
            area_size: 100.0,
            positions_per_axis: vec![3],
            heights: vec![45.0],
            base_station: Position::new(0.0, 0.0, 0.0),
            comm_range: 60.0,
            coverage_angle: std::f64::consts::FRAC_PI_6,
            n_instances: 100,
            limits: SolverLimits {
                time_limit: Some(3.0 * 3600.0),
                memory_limit_mb: Some(10000.0),
                ..Default::default()
            },
        }
    }
}

impl Sweep {
    pub fn test() -> Self {
        Sweep {
            experiment_name: "test".to_string(),
            n_drones: vec![5],
            n_targets: vec![10],
            alphas: vec![1.0],
            n_instances: 10,
            limits: SolverLimits {
                time_limit: Some(10.0),
                memory_limit_mb: Some(10000.0),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    pub fn experiment() -> Self {
        Sweep {
            experiment_name: "exp".to_string(),
            n_drones: vec![5, 10],
            n_targets: vec![10, 20, 30, 40, 50],
            alphas: vec![0.0, 0.5, 1.0],
            n_instances: 10,
            limits: SolverLimits {
                time_limit: Some(3600.0),
                memory_limit_mb: Some(10000.0),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// A single large combination for calibrating solver time limits.
    pub fn time_limit_sweep() -> Self {
        Sweep {
            experiment_name: "exp".to_string(),
            n_drones: vec![10],
            n_targets: vec![50],
            alphas: vec![0.5],
            positions_per_axis: vec![10],
            n_instances: 10,
            limits: SolverLimits {
                time_limit: Some(300.0),
                memory_limit_mb: Some(10000.0),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    pub fn preset(name: &str) -> Option<Self> {
        match name {
            "default" => Some(Self::default()),
            "test" => Some(Self::test()),
            "experiment" => Some(Self::experiment()),
            "time_limit" => Some(Self::time_limit_sweep()),
            _ => None,
        }
    }

    pub fn graph_params(&self, positions_per_axis: u32) -> GraphParams {
        GraphParams {
            area_size: self.area_size,
            heights: self.heights.clone(),
            base_station: self.base_station,
            positions_per_axis,
            comm_range: self.comm_range,
            coverage_angle: self.coverage_angle,
        }
    }

    /// All combinations, grid-major then targets, speed, drones, alpha and
    /// instance.
    pub fn scenarios(&self) -> Vec<Scenario> {
        let mut out = Vec::new();
        for &positions_per_axis in self.positions_per_axis.iter() {
            let graph = self.graph_params(positions_per_axis);
            for &n_targets in self.n_targets.iter() {
                for &target_speed in self.target_speeds.iter() {
                    let trace = TraceParams {
                        n_targets,
                        observation_period: self.observation_period,
                        target_speed,
                        area_size: self.area_size,
                        time_step_delta: self.time_step_delta,
                    };
                    for &n_drones in self.n_drones.iter() {
                        for &alpha in self.alphas.iter() {
                            let model = ModelParams {
                                n_drones,
                                observation_period: self.observation_period,
                                time_step_delta: self.time_step_delta,
                                alpha,
                                beta: self.beta,
                            };
                            for instance in 0..self.n_instances {
                                out.push(Scenario { graph: graph.clone(), trace, model, instance });
                            }
                        }
                    }
                }
            }
        }
        out
    }

    pub fn validate(&self) -> Result<(), ScenarioError> {
        let lists: [(&'static str, bool); 5] = [
            ("n_drones", self.n_drones.is_empty()),
            ("n_targets", self.n_targets.is_empty()),
            ("target_speeds", self.target_speeds.is_empty()),
            ("alphas", self.alphas.is_empty()),
            ("positions_per_axis", self.positions_per_axis.is_empty()),
        ];
        if let Some(&(name, _)) = lists.iter().find(|(_, empty)| *empty) {
            return Err(ScenarioError::EmptySweepList(name));
        }
        self.scenarios().iter().try_for_each(|s| s.validate())
    }
}
