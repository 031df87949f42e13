//! The discretised search space: candidate deployment positions, the base
//! station, the coverage cone of each position and the communication graph.

use fanet_sim::TargetsTrace;
use fanet_structs::{
    scenario::{GraphParams, ScenarioError},
    GroundPoint, Position,
};
use log::debug;

/// A node of the communication graph.
#[derive(Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum Node {
    /// Index into the candidate deployment positions.
    Deploy(u32),
    Base,
}

impl std::fmt::Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Node::Deploy(i) => write!(f, "p{}", i),
            Node::Base => f.write_str("base"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CoverageGraph {
    params: GraphParams,
    coverage_tangent: f64,
    deployment_positions: Vec<Position>,
    /// Indexed by [`CoverageGraph::node_index`].
    adjacency: Vec<Vec<Node>>,
}

/// The regular candidate grid: `n` interior points per axis crossed with every
/// allowed height, x-major. Points on the zero axes are never generated.
pub fn candidate_grid(area_size: f64, heights: &[f64], positions_per_axis: u32) -> Vec<Position> {
    let step = area_size / (positions_per_axis as f64 + 1.0);
    let mut positions = Vec::with_capacity((positions_per_axis * positions_per_axis) as usize * heights.len());
    for i in 1..=positions_per_axis {
        for j in 1..=positions_per_axis {
            for z in heights.iter() {
                positions.push(Position { x: i as f64 * step, y: j as f64 * step, z: *z });
            }
        }
    }
    positions
}

impl CoverageGraph {
    pub fn new(params: GraphParams) -> Result<Self, ScenarioError> {
        params.validate()?;
        let positions = candidate_grid(params.area_size, &params.heights, params.positions_per_axis);
        Self::from_parts(params, positions)
    }

    /// Replaces the regular grid by an explicit set of candidate positions.
    pub fn with_deployment_positions(self, positions: Vec<Position>) -> Result<Self, ScenarioError> {
        Self::from_parts(self.params, positions)
    }

    fn from_parts(params: GraphParams, deployment_positions: Vec<Position>) -> Result<Self, ScenarioError> {
        if deployment_positions.is_empty() {
            return Err(ScenarioError::EmptyCandidateSet);
        }
        let mut graph = CoverageGraph {
            coverage_tangent: params.coverage_tangent(),
            params,
            deployment_positions,
            adjacency: Vec::new(),
        };
        graph.adjacency = graph
            .nodes()
            .map(|a| {
                graph
                    .nodes()
                    .filter(|b| *b != a && graph.distance(a, *b) <= graph.params.comm_range)
                    .collect()
            })
            .collect();

        debug!(
            "Coverage graph with {} positions, {} communication edges",
            graph.deployment_positions.len(),
            graph.adjacency.iter().map(|n| n.len()).sum::<usize>()
        );
        Ok(graph)
    }

    pub fn params(&self) -> &GraphParams {
        &self.params
    }

    pub fn candidate_positions(&self) -> &[Position] {
        &self.deployment_positions
    }

    pub fn n_positions(&self) -> usize {
        self.deployment_positions.len()
    }

    /// Every deployment node in candidate order, then the base.
    pub fn nodes(&self) -> impl Iterator<Item = Node> + 'static {
        (0..self.deployment_positions.len() as u32)
            .map(Node::Deploy)
            .chain(std::iter::once(Node::Base))
    }

    pub fn deploy_nodes(&self) -> impl Iterator<Item = Node> + 'static {
        (0..self.deployment_positions.len() as u32).map(Node::Deploy)
    }

    /// Dense index of a node: deployment positions first, the base last.
    pub fn node_index(&self, node: Node) -> usize {
        match node {
            Node::Deploy(i) => i as usize,
            Node::Base => self.deployment_positions.len(),
        }
    }

    pub fn n_nodes(&self) -> usize {
        self.deployment_positions.len() + 1
    }

    pub fn position(&self, node: Node) -> Position {
        match node {
            Node::Deploy(i) => self.deployment_positions[i as usize],
            Node::Base => self.params.base_station,
        }
    }

    /// Euclidean distance in 3-D, base station height included.
    pub fn distance(&self, a: Node, b: Node) -> f64 {
        self.position(a).dist(&self.position(b))
    }

    /// Radius of the ground disk covered from `position`.
    pub fn coverage_radius(&self, position: &Position) -> f64 {
        self.coverage_tangent * position.z
    }

    fn covers(&self, position: &Position, target: &GroundPoint) -> bool {
        position.dist_xy(target) <= self.coverage_radius(position)
    }

    /// Deployment nodes whose coverage cone contains `target`.
    pub fn coverage_of(&self, target: &GroundPoint) -> Vec<Node> {
        self.deploy_nodes()
            .filter(|n| self.covers(&self.position(*n), target))
            .collect()
    }

    /// Indices into `targets` of the targets covered from `node`. The base
    /// station covers nothing.
    pub fn covered_targets(&self, node: Node, targets: &[GroundPoint]) -> Vec<usize> {
        match node {
            Node::Base => Vec::new(),
            Node::Deploy(_) => {
                let position = self.position(node);
                targets
                    .iter()
                    .enumerate()
                    .filter(|(_, t)| self.covers(&position, t))
                    .map(|(i, _)| i)
                    .collect()
            }
        }
    }

    /// Nodes within communication range of `node`, excluding itself.
    pub fn neighbors(&self, node: Node) -> &[Node] {
        &self.adjacency[self.node_index(node)]
    }

    /// Whether every target is covered by some candidate position at every
    /// time step. An empty trace is never feasible.
    pub fn is_feasible(&self, trace: &TargetsTrace) -> bool {
        !trace.trajectories().is_empty()
            && trace
                .trajectories()
                .iter()
                .all(|trajectory| trajectory.iter().all(|p| !self.coverage_of(p).is_empty()))
    }
}
