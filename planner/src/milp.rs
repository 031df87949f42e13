//! Drone deployment as a multi-commodity flow over a time-expanded graph.
//!
//! At every time step each target must receive one unit of flow that
//! originates at the base station and is relayed through occupied candidate
//! positions within communication range of each other. Drones move between
//! positions from one time step to the next; the objective prices the
//! deployment flight, every movement and the final return to base.

use std::time::Instant;

use fanet_sim::TargetsTrace;
use fanet_structs::{
    report::{Placement, SolutionSummary, SolveStatus},
    scenario::{ModelParams, ScenarioError},
};
use log::{debug, info};

use crate::{
    coverage::{CoverageGraph, Node},
    energy::energy,
    extsolvers::{MilpSolver, SolverError},
    linexpr::LinExpr,
    model::{ConstrKey, FlowEnd, ObjectiveSense, OptimizationModel, Sense, VarId, VarKey, VarKind},
};

/// Reported in place of objective, distance and energy when there is no
/// solution.
pub const NO_SOLUTION: f64 = -1.0;

/// Threshold above which a binary solver value counts as set.
const BINARY_THRESHOLD: f64 = 0.5;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Leg {
    pub distance: f64,
    pub energy: f64,
}

/// Distance and energy of a one-time-step flight between every ordered pair
/// of nodes.
#[derive(Debug, Clone)]
pub struct LegTable {
    n_positions: usize,
    legs: Vec<Leg>,
}

impl LegTable {
    pub fn new(graph: &CoverageGraph, time_step_delta: f64) -> Self {
        #[cfg(feature = "prof")]
        let _p = hprof::enter("leg table");
        let mut legs = Vec::with_capacity(graph.n_nodes() * graph.n_nodes());
        for from in graph.nodes() {
            for to in graph.nodes() {
                let distance = graph.distance(from, to);
                // Landing at or taking off from the base ends the flight. A
                // drone resting at the base still draws power(0).
                let hover = from != Node::Base && to != Node::Base;
                legs.push(Leg { distance, energy: energy(distance, time_step_delta, hover) });
            }
        }
        LegTable { n_positions: graph.n_positions(), legs }
    }

    fn idx(&self, node: Node) -> usize {
        match node {
            Node::Deploy(i) => i as usize,
            Node::Base => self.n_positions,
        }
    }

    pub fn leg(&self, from: Node, to: Node) -> Leg {
        self.legs[self.idx(from) * (self.n_positions + 1) + self.idx(to)]
    }

    /// `(1 - alpha) * distance + alpha * beta * energy`
    pub fn cost(&self, from: Node, to: Node, alpha: f64, beta: f64) -> f64 {
        let leg = self.leg(from, to);
        (1.0 - alpha) * leg.distance + alpha * beta * leg.energy
    }
}

pub struct DeploymentModel<'a> {
    params: ModelParams,
    trace: &'a TargetsTrace,
    graph: &'a CoverageGraph,
    /// Covering positions of each target, indexed by time step then target.
    covering: Vec<Vec<Vec<Node>>>,
    /// Targets covered by each position, indexed by time step then position.
    covered: Vec<Vec<Vec<u32>>>,
    legs: LegTable,
    model: OptimizationModel,
}

impl<'a> DeploymentModel<'a> {
    pub fn build(params: ModelParams, trace: &'a TargetsTrace, graph: &'a CoverageGraph) -> Result<Self, ScenarioError> {
        #[cfg(feature = "prof")]
        let _p = hprof::enter("build model");
        params.validate()?;
        if trace.observation_period() != params.observation_period {
            return Err(ScenarioError::PeriodMismatch {
                trace: trace.observation_period(),
                model: params.observation_period,
            });
        }

        let covering = (0..params.observation_period)
            .map(|t| {
                trace
                    .positions_at(t)
                    .iter()
                    .map(|target| graph.coverage_of(target))
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<_>>();
        let covered = covering
            .iter()
            .map(|at_t| {
                let mut covered = vec![Vec::new(); graph.n_positions()];
                for (target, nodes) in at_t.iter().enumerate() {
                    for node in nodes {
                        covered[graph.node_index(*node)].push(target as u32);
                    }
                }
                covered
            })
            .collect();

        let mut m = DeploymentModel {
            params,
            trace,
            graph,
            covering,
            covered,
            legs: LegTable::new(graph, params.time_step_delta),
            model: OptimizationModel::new(),
        };

        m.define_variables();
        m.define_flow_constraints();
        m.define_flow_occupancy_constraints();
        m.define_integrity_constraints();
        m.define_occupancy_constraints();
        m.define_movement_constraints();
        m.define_objective();

        debug!(
            "Deployment model: {} drones, {} targets, {} time steps, {} positions -> {} variables, {} constraints",
            params.n_drones,
            trace.n_targets(),
            params.observation_period,
            graph.n_positions(),
            m.model.n_variables(),
            m.model.n_constraints()
        );
        Ok(m)
    }

    pub fn params(&self) -> &ModelParams {
        &self.params
    }

    pub fn model(&self) -> &OptimizationModel {
        &self.model
    }

    pub fn legs(&self) -> &LegTable {
        &self.legs
    }

    fn n_targets(&self) -> usize {
        self.trace.n_targets()
    }

    fn time_steps(&self) -> std::ops::Range<u32> {
        0..self.params.observation_period as u32
    }

    fn drones(&self) -> std::ops::Range<u32> {
        0..self.params.n_drones as u32
    }

    fn covered_by(&self, t: u32, node: Node) -> &[u32] {
        match node {
            Node::Deploy(i) => &self.covered[t as usize][i as usize],
            Node::Base => &[],
        }
    }

    /// Handle of a variable the builder defined earlier.
    pub fn var(&self, key: VarKey) -> VarId {
        match self.model.var(&key) {
            Some(id) => id,
            None => panic!("variable {} was never defined", key),
        }
    }

    fn occupied(&self, t: u32, node: Node) -> VarId {
        self.var(VarKey::Occupied { t, node })
    }

    fn assigned(&self, t: u32, drone: u32, node: Node) -> VarId {
        self.var(VarKey::Assigned { t, drone, node })
    }

    fn flow(&self, t: u32, from: Node, to: FlowEnd) -> VarId {
        self.var(VarKey::Flow { t, from, to })
    }

    fn define_variables(&mut self) {
        #[cfg(feature = "prof")]
        let _p = hprof::enter("variables");
        let n_drones = self.params.n_drones as f64;
        let n_targets = self.n_targets() as f64;

        for t in self.time_steps() {
            self.model.add_variable(VarKey::Occupied { t, node: Node::Base }, 0.0, n_drones, VarKind::Integer);
            for node in self.graph.deploy_nodes() {
                self.model.add_variable(VarKey::Occupied { t, node }, 0.0, 1.0, VarKind::Binary);
            }
        }

        for t in self.time_steps() {
            for drone in self.drones() {
                for node in self.graph.nodes() {
                    self.model.add_variable(VarKey::Assigned { t, drone, node }, 0.0, 1.0, VarKind::Binary);
                }
            }
        }

        for t in self.time_steps() {
            for from in self.graph.nodes() {
                for to in self.graph.neighbors(from) {
                    let key = VarKey::Flow { t, from, to: FlowEnd::Node(*to) };
                    self.model.add_variable(key, 0.0, n_targets, VarKind::Continuous);
                }
            }
            for (target, nodes) in self.covering[t as usize].iter().enumerate() {
                for from in nodes {
                    let key = VarKey::Flow { t, from: *from, to: FlowEnd::Target(target as u32) };
                    self.model.add_variable(key, 0.0, n_targets, VarKind::Continuous);
                }
            }
        }

        for t in self.time_steps().skip(1) {
            for drone in self.drones() {
                for from in self.graph.nodes() {
                    for to in self.graph.nodes() {
                        self.model.add_variable(VarKey::Move { t, drone, from, to }, 0.0, 1.0, VarKind::Binary);
                    }
                }
            }
        }
    }

    /// Relay positions pass on everything they receive; each target receives
    /// at least one unit from the positions covering it.
    fn define_flow_constraints(&mut self) {
        #[cfg(feature = "prof")]
        let _p = hprof::enter("flow constraints");
        for t in self.time_steps() {
            for node in self.graph.deploy_nodes() {
                let mut expr = LinExpr::new();
                for other in self.graph.neighbors(node) {
                    expr.add_term(self.flow(t, node, FlowEnd::Node(*other)), 1.0);
                    expr.add_term(self.flow(t, *other, FlowEnd::Node(node)), -1.0);
                }
                for target in self.covered_by(t, node) {
                    expr.add_term(self.flow(t, node, FlowEnd::Target(*target)), 1.0);
                }
                self.model.add_constraint(ConstrKey::FlowConservation { t, node }, expr, Sense::Eq, 0.0);
            }

            for target in 0..self.n_targets() {
                // Stays empty, and so infeasible, for a target no position covers.
                let expr = self.covering[t as usize][target]
                    .iter()
                    .map(|from| (self.flow(t, *from, FlowEnd::Target(target as u32)), 1.0))
                    .collect();
                let key = ConstrKey::Coverage { t, target: target as u32 };
                self.model.add_constraint(key, expr, Sense::Ge, 1.0);
            }
        }
    }

    /// Flow may only touch a position while some drone is there.
    fn define_flow_occupancy_constraints(&mut self) {
        #[cfg(feature = "prof")]
        let _p = hprof::enter("flow occupancy constraints");
        let n_targets = self.n_targets() as f64;
        for t in self.time_steps() {
            let mut edges = Vec::new();
            for from in self.graph.nodes() {
                edges.extend(self.graph.neighbors(from).iter().map(|to| (from, FlowEnd::Node(*to))));
                edges.extend(self.covered_by(t, from).iter().map(|s| (from, FlowEnd::Target(*s))));
            }

            for (from, to) in edges {
                let flow = self.flow(t, from, to);
                let endpoints = [Some(from), match to {
                    FlowEnd::Node(n) => Some(n),
                    FlowEnd::Target(_) => None,
                }];
                for at in endpoints.into_iter().flatten().filter(|n| *n != Node::Base) {
                    let mut expr = LinExpr::new();
                    expr.add_term(flow, 1.0).add_term(self.occupied(t, at), -n_targets);
                    self.model.add_constraint(ConstrKey::FlowOccupancy { t, at, from, to }, expr, Sense::Le, 0.0);
                }
            }
        }
    }

    /// Every drone is at exactly one node, base included, at every time step.
    fn define_integrity_constraints(&mut self) {
        #[cfg(feature = "prof")]
        let _p = hprof::enter("integrity constraints");
        for t in self.time_steps() {
            for drone in self.drones() {
                let expr = self.graph.nodes().map(|node| (self.assigned(t, drone, node), 1.0)).collect();
                self.model.add_constraint(ConstrKey::Integrity { t, drone }, expr, Sense::Eq, 1.0);
            }
        }
    }

    /// Occupancy equals the number of drones assigned to the node. Binary
    /// occupancy of deployment positions limits them to one drone each.
    fn define_occupancy_constraints(&mut self) {
        #[cfg(feature = "prof")]
        let _p = hprof::enter("occupancy constraints");
        for t in self.time_steps() {
            for node in self.graph.nodes() {
                let mut expr = self.drones().map(|drone| (self.assigned(t, drone, node), 1.0)).collect::<LinExpr>();
                expr.add_term(self.occupied(t, node), -1.0);
                self.model.add_constraint(ConstrKey::Occupancy { t, node }, expr, Sense::Eq, 0.0);
            }
        }
    }

    /// `move(t, d, p, q) = assigned(t-1, d, p) AND assigned(t, d, q)`
    fn define_movement_constraints(&mut self) {
        #[cfg(feature = "prof")]
        let _p = hprof::enter("movement constraints");
        for t in self.time_steps().skip(1) {
            for drone in self.drones() {
                for from in self.graph.nodes() {
                    for to in self.graph.nodes() {
                        let mv = self.var(VarKey::Move { t, drone, from, to });
                        let before = self.assigned(t - 1, drone, from);
                        let after = self.assigned(t, drone, to);

                        let mut expr = LinExpr::new();
                        expr.add_term(mv, 1.0).add_term(before, -1.0);
                        self.model.add_constraint(ConstrKey::MoveFrom { t, drone, from, to }, expr, Sense::Le, 0.0);

                        let mut expr = LinExpr::new();
                        expr.add_term(mv, 1.0).add_term(after, -1.0);
                        self.model.add_constraint(ConstrKey::MoveTo { t, drone, from, to }, expr, Sense::Le, 0.0);

                        let mut expr = LinExpr::new();
                        expr.add_term(mv, 1.0).add_term(before, -1.0).add_term(after, -1.0);
                        self.model.add_constraint(ConstrKey::MoveBoth { t, drone, from, to }, expr, Sense::Ge, -1.0);
                    }
                }
            }
        }
    }

    fn define_objective(&mut self) {
        #[cfg(feature = "prof")]
        let _p = hprof::enter("objective");
        let (alpha, beta) = (self.params.alpha, self.params.beta);
        let last = self.params.observation_period as u32 - 1;
        let mut objective = LinExpr::new();

        for node in self.graph.deploy_nodes() {
            objective.add_term(self.occupied(0, node), self.legs.cost(Node::Base, node, alpha, beta));
        }
        for node in self.graph.deploy_nodes() {
            objective.add_term(self.occupied(last, node), self.legs.cost(node, Node::Base, alpha, beta));
        }
        if last == 0 {
            // Deployment and return price the same variables.
            objective.merge_duplicates();
        }

        for t in self.time_steps().skip(1) {
            for drone in self.drones() {
                for from in self.graph.nodes() {
                    for to in self.graph.nodes() {
                        let cost = self.legs.cost(from, to, alpha, beta);
                        if cost != 0.0 {
                            objective.add_term(self.var(VarKey::Move { t, drone, from, to }), cost);
                        }
                    }
                }
            }
        }

        debug_assert!(!objective.has_duplicates());
        self.model.set_objective(objective, ObjectiveSense::Minimize);
    }

    /// Distance and energy flown by the given per-(time step, drone) nodes,
    /// leg by leg as the objective prices them.
    pub fn realized_costs(&self, deployment: &[Vec<Node>]) -> Leg {
        let mut total = Leg::default();
        let mut fly = |from: Node, to: Node| {
            let leg = self.legs.leg(from, to);
            total.distance += leg.distance;
            total.energy += leg.energy;
        };

        if let (Some(first), Some(last)) = (deployment.first(), deployment.last()) {
            // A drone at the base at the first or last step has no deploy or return leg.
            for node in first.iter().filter(|n| **n != Node::Base) {
                fly(Node::Base, *node);
            }
            for w in deployment.windows(2) {
                for (from, to) in w[0].iter().zip(w[1].iter()) {
                    fly(*from, *to);
                }
            }
            for node in last.iter().filter(|n| **n != Node::Base) {
                fly(*node, Node::Base);
            }
        }
        total
    }

    fn extract_deployment(&self, values: &[f64]) -> Result<Vec<Vec<Node>>, SolverError> {
        self.time_steps()
            .map(|t| {
                self.drones()
                    .map(|drone| {
                        self.graph
                            .nodes()
                            .find(|node| values[self.assigned(t, drone, *node).idx()] > BINARY_THRESHOLD)
                            .ok_or_else(|| {
                                SolverError::Backend(format!("drone {} has no position at time step {}", drone, t))
                            })
                    })
                    .collect::<Result<Vec<_>, _>>()
            })
            .collect()
    }

    /// Submits the model in bulk, solves it and reads back the deployment.
    /// Infeasibility and exhausted limits are reported through the status of
    /// the returned solution.
    pub fn solve(&self, solver: &mut impl MilpSolver) -> Result<DeploymentSolution, SolverError> {
        {
            #[cfg(feature = "prof")]
            let _p = hprof::enter("submit model");
            solver.add_variables(self.model.variables())?;
            solver.add_constraints(self.model.constraints())?;
            solver.set_objective(self.model.objective(), self.model.objective_sense())?;
        }

        let start = Instant::now();
        let status = solver.solve()?;
        let solve_time = start.elapsed().as_secs_f64();
        info!("Solved in {:.3} s: {}", solve_time, status);

        if !status.has_solution() {
            return Ok(DeploymentSolution {
                status,
                solve_time,
                costs: None,
                deployment: Vec::new(),
                placements: Vec::new(),
            });
        }

        let values = solver.values().ok_or(SolverError::NoSolution(Some(status)))?;
        let objective = solver.objective_value().ok_or(SolverError::NoSolution(Some(status)))?;
        let deployment = self.extract_deployment(values)?;
        let realized = self.realized_costs(&deployment);
        let placements = deployment
            .iter()
            .map(|at_t| {
                at_t.iter()
                    .map(|node| match node {
                        Node::Base => Placement::Base,
                        Node::Deploy(_) => Placement::Deployed(self.graph.position(*node)),
                    })
                    .collect::<Vec<_>>()
            })
            .collect();

        Ok(DeploymentSolution {
            status,
            solve_time,
            costs: Some(SolutionCosts {
                objective,
                distance: realized.distance,
                energy: realized.energy,
            }),
            deployment,
            placements,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct SolutionCosts {
    objective: f64,
    distance: f64,
    energy: f64,
}

/// Result of solving a [`DeploymentModel`].
#[derive(Clone, Debug)]
pub struct DeploymentSolution {
    status: SolveStatus,
    solve_time: f64,
    costs: Option<SolutionCosts>,
    deployment: Vec<Vec<Node>>,
    placements: Vec<Vec<Placement>>,
}

impl DeploymentSolution {
    pub fn status(&self) -> SolveStatus {
        self.status
    }

    pub fn has_solution(&self) -> bool {
        self.costs.is_some()
    }

    /// Seconds spent inside the solver.
    pub fn solve_time(&self) -> f64 {
        self.solve_time
    }

    pub fn objective_value(&self) -> f64 {
        self.costs.map_or(NO_SOLUTION, |c| c.objective)
    }

    pub fn total_distance(&self) -> f64 {
        self.costs.map_or(NO_SOLUTION, |c| c.distance)
    }

    pub fn total_energy(&self) -> f64 {
        self.costs.map_or(NO_SOLUTION, |c| c.energy)
    }

    /// Node of every drone, indexed by time step then drone. Empty without a
    /// solution.
    pub fn deployment(&self) -> &[Vec<Node>] {
        &self.deployment
    }

    pub fn placements(&self) -> &[Vec<Placement>] {
        &self.placements
    }

    /// Number of drones at `node` at time step `t`.
    pub fn drones_at(&self, t: usize, node: Node) -> usize {
        self.deployment.get(t).map_or(0, |at_t| at_t.iter().filter(|n| **n == node).count())
    }

    pub fn summary(&self) -> SolutionSummary {
        SolutionSummary {
            status: self.status,
            objective: self.objective_value(),
            distance: self.total_distance(),
            energy: self.total_energy(),
            solve_time: self.solve_time,
            deployment: self.placements.clone(),
        }
    }
}
