#[cfg(test)]
mod tests {
use std::f64::consts::PI;

use fanet_sim::TargetsTrace;
use fanet_structs::{
    scenario::{GraphParams, ModelParams, ScenarioError, TraceParams},
    GroundPoint, Position,
};

use crate::{
    coverage::{CoverageGraph, Node},
    energy::power,
    milp::DeploymentModel,
    model::{FlowEnd, VarKey, VarKind},
};

const BETA: f64 = 0.08095;

fn graph(comm_range: f64, positions: Option<Vec<Position>>) -> CoverageGraph {
    let params = GraphParams {
        area_size: 100.0,
        heights: vec![10.0],
        base_station: Position::new(0.0, 0.0, 0.0),
        positions_per_axis: 1,
        comm_range,
        coverage_angle: PI / 6.0,
    };
    let graph = CoverageGraph::new(params).unwrap();
    match positions {
        Some(positions) => graph.with_deployment_positions(positions).unwrap(),
        None => graph,
    }
}

fn two_positions(comm_range: f64) -> CoverageGraph {
    graph(comm_range, Some(vec![Position::new(25.0, 50.0, 10.0), Position::new(75.0, 50.0, 10.0)]))
}

fn trace(trajectories: Vec<Vec<(f64, f64)>>) -> TargetsTrace {
    let params = TraceParams {
        n_targets: trajectories.len(),
        observation_period: trajectories[0].len(),
        ..Default::default()
    };
    let trajectories = trajectories
        .into_iter()
        .map(|t| t.into_iter().map(|(x, y)| GroundPoint::new(x, y)).collect())
        .collect();
    TargetsTrace::from_trajectories(params, trajectories).unwrap()
}

fn params(n_drones: usize, observation_period: usize, alpha: f64) -> ModelParams {
    ModelParams {
        n_drones,
        observation_period,
        time_step_delta: 1.0,
        alpha,
        beta: BETA,
    }
}

fn moving_target() -> TargetsTrace {
    trace(vec![vec![(25.0, 50.0), (75.0, 50.0)]])
}

#[test]
fn model_size() {
    let g = two_positions(100.0);
    let tr = moving_target();
    let m = DeploymentModel::build(params(1, 2, 0.0), &tr, &g).unwrap();
    // occupied 6, assigned 6, flow 12 + 2, move 9
    assert_eq!(m.model().n_variables(), 35);
    // conservation 4, coverage 2, flow occupancy 18, integrity 2, occupancy 6, movement 27
    assert_eq!(m.model().n_constraints(), 59);
    // deploy 2, return 2, and the six moves that change place
    assert_eq!(m.model().objective().len(), 10);
}

#[test]
fn single_time_step_merges_deploy_and_return() {
    let g = graph(100.0, None);
    let tr = trace(vec![vec![(50.0, 50.0)]]);
    let m = DeploymentModel::build(params(1, 1, 0.0), &tr, &g).unwrap();
    let objective = m.model().objective();
    assert!(!objective.has_duplicates());
    assert_eq!(objective.len(), 1);
    let (var, coeff) = objective.terms()[0];
    assert_eq!(var, m.var(VarKey::Occupied { t: 0, node: Node::Deploy(0) }));
    assert!((coeff - 2.0 * 5100f64.sqrt()).abs() < 1e-9);
    assert!(m.model().var(&VarKey::Move { t: 0, drone: 0, from: Node::Base, to: Node::Base }).is_none());
}

#[test]
fn hand_built_plan_satisfies_every_constraint() {
    let g = two_positions(100.0);
    let tr = moving_target();
    let m = DeploymentModel::build(params(1, 2, 0.0), &tr, &g).unwrap();
    let (p0, p1) = (Node::Deploy(0), Node::Deploy(1));

    let mut values = vec![0.0; m.model().n_variables()];
    let set = [
        VarKey::Occupied { t: 0, node: p0 },
        VarKey::Occupied { t: 1, node: p1 },
        VarKey::Assigned { t: 0, drone: 0, node: p0 },
        VarKey::Assigned { t: 1, drone: 0, node: p1 },
        VarKey::Flow { t: 0, from: Node::Base, to: FlowEnd::Node(p0) },
        VarKey::Flow { t: 0, from: p0, to: FlowEnd::Target(0) },
        VarKey::Flow { t: 1, from: Node::Base, to: FlowEnd::Node(p1) },
        VarKey::Flow { t: 1, from: p1, to: FlowEnd::Target(0) },
        VarKey::Move { t: 1, drone: 0, from: p0, to: p1 },
    ];
    for key in set {
        values[m.var(key).idx()] = 1.0;
    }
    let violated = m.model().violated_constraints(&values, 1e-9);
    assert!(violated.is_empty(), "{:?}", violated);
    assert!((m.model().objective().eval(&values) - 197.48087).abs() < 1e-3);

    // Without the move flag the AND-linearisation is violated.
    values[m.var(VarKey::Move { t: 1, drone: 0, from: p0, to: p1 }).idx()] = 0.0;
    assert_eq!(m.model().violated_constraints(&values, 1e-9).len(), 1);

    let realized = m.realized_costs(&[vec![p0], vec![p1]]);
    assert!((realized.distance - 197.48087).abs() < 1e-3);
    let legs = m.legs();
    let energy = legs.leg(Node::Base, p0).energy + legs.leg(p0, p1).energy + legs.leg(p1, Node::Base).energy;
    assert!((realized.energy - energy).abs() < 1e-9);
}

#[test]
fn resting_at_base_draws_ground_power() {
    let g = two_positions(100.0);
    let tr = moving_target();
    let m = DeploymentModel::build(params(2, 2, 0.7), &tr, &g).unwrap();
    let rest = m.legs().leg(Node::Base, Node::Base);
    assert_eq!(rest.distance, 0.0);
    assert_eq!(rest.energy, power(0.0));
    assert!((m.legs().cost(Node::Base, Node::Base, 0.7, BETA) - 0.7 * BETA * power(0.0)).abs() < 1e-12);

    let realized = m.realized_costs(&[vec![Node::Base, Node::Base], vec![Node::Base, Node::Base]]);
    assert_eq!(realized.distance, 0.0);
    assert!((realized.energy - 2.0 * power(0.0)).abs() < 1e-9);

    // Priced in the objective once energy carries weight.
    let mv = m.var(VarKey::Move { t: 1, drone: 1, from: Node::Base, to: Node::Base });
    assert!(m.model().objective().terms().iter().any(|(v, _)| *v == mv));
    let free = DeploymentModel::build(params(2, 2, 0.0), &tr, &g).unwrap();
    let mv = free.var(VarKey::Move { t: 1, drone: 1, from: Node::Base, to: Node::Base });
    assert!(!free.model().objective().terms().iter().any(|(v, _)| *v == mv));
}

/// Solver-free assignment for a plan: each drone's node per time step, and
/// the flow edges carrying one unit each.
fn plan_values(m: &DeploymentModel, deployment: &[Vec<Node>], flows: &[VarKey]) -> Vec<f64> {
    let mut values = vec![0.0; m.model().n_variables()];
    for (t, at_t) in deployment.iter().enumerate() {
        let t = t as u32;
        for (drone, node) in at_t.iter().enumerate() {
            let drone = drone as u32;
            values[m.var(VarKey::Assigned { t, drone, node: *node }).idx()] = 1.0;
            values[m.var(VarKey::Occupied { t, node: *node }).idx()] += 1.0;
            if t > 0 {
                let from = deployment[t as usize - 1][drone as usize];
                values[m.var(VarKey::Move { t, drone, from, to: *node }).idx()] = 1.0;
            }
        }
    }
    for key in flows {
        values[m.var(*key).idx()] = 1.0;
    }
    values
}

fn assert_objective_matches_realized(m: &DeploymentModel, deployment: &[Vec<Node>], flows: &[VarKey]) {
    let values = plan_values(m, deployment, flows);
    let violated = m.model().violated_constraints(&values, 1e-9);
    assert!(violated.is_empty(), "{:?}", violated);

    let (alpha, beta) = (m.params().alpha, m.params().beta);
    let realized = m.realized_costs(deployment);
    let expected = (1.0 - alpha) * realized.distance + alpha * beta * realized.energy;
    let objective = m.model().objective().eval(&values);
    assert!((objective - expected).abs() < 1e-6 * expected.max(1.0), "objective {} realized {}", objective, expected);
}

#[test]
fn variable_kinds_and_bounds() {
    let g = two_positions(100.0);
    let tr = trace(vec![vec![(25.0, 50.0), (25.0, 50.0)], vec![(75.0, 50.0), (75.0, 50.0)]]);
    let m = DeploymentModel::build(params(3, 2, 0.0), &tr, &g).unwrap();
    let mut seen = [0; 5];
    for v in m.model().variables() {
        let (kind, upper, family) = match v.key {
            VarKey::Occupied { node: Node::Base, .. } => (VarKind::Integer, 3.0, 0),
            VarKey::Occupied { .. } => (VarKind::Binary, 1.0, 1),
            VarKey::Assigned { .. } => (VarKind::Binary, 1.0, 2),
            VarKey::Flow { .. } => (VarKind::Continuous, 2.0, 3),
            VarKey::Move { t, .. } => {
                assert!(t >= 1, "{}", v.key);
                (VarKind::Binary, 1.0, 4)
            }
        };
        assert_eq!(v.kind, kind, "{}", v.key);
        assert_eq!(v.lower, 0.0, "{}", v.key);
        assert_eq!(v.upper, upper, "{}", v.key);
        seen[family] += 1;
    }
    // two time steps; base, two positions; three drones
    assert_eq!(seen, [2, 4, 18, 12 + 4, 27]);
}

#[test]
fn single_time_step_objective_matches_realized_costs() {
    let g = graph(100.0, None);
    let tr = trace(vec![vec![(50.0, 50.0)]]);
    let m = DeploymentModel::build(params(2, 1, 0.6), &tr, &g).unwrap();
    let p0 = Node::Deploy(0);
    assert_objective_matches_realized(
        &m,
        &[vec![p0, Node::Base]],
        &[
            VarKey::Flow { t: 0, from: Node::Base, to: FlowEnd::Node(p0) },
            VarKey::Flow { t: 0, from: p0, to: FlowEnd::Target(0) },
        ],
    );
}

#[test]
fn idle_drone_objective_matches_realized_costs() {
    let g = two_positions(100.0);
    let tr = moving_target();
    let m = DeploymentModel::build(params(2, 2, 0.5), &tr, &g).unwrap();
    let (p0, p1) = (Node::Deploy(0), Node::Deploy(1));
    assert_objective_matches_realized(
        &m,
        &[vec![p0, Node::Base], vec![p1, Node::Base]],
        &[
            VarKey::Flow { t: 0, from: Node::Base, to: FlowEnd::Node(p0) },
            VarKey::Flow { t: 0, from: p0, to: FlowEnd::Target(0) },
            VarKey::Flow { t: 1, from: Node::Base, to: FlowEnd::Node(p1) },
            VarKey::Flow { t: 1, from: p1, to: FlowEnd::Target(0) },
        ],
    );
}

#[test]
fn period_mismatch_is_rejected() {
    let g = two_positions(100.0);
    let tr = moving_target();
    assert_eq!(
        DeploymentModel::build(params(1, 3, 0.0), &tr, &g).err(),
        Some(ScenarioError::PeriodMismatch { trace: 2, model: 3 })
    );
    assert_eq!(DeploymentModel::build(params(0, 2, 0.0), &tr, &g).err(), Some(ScenarioError::NoDrones));
}

#[cfg(feature = "highs")]
mod highs {
    use fanet_structs::report::{Placement, SolveStatus};

    use super::*;
    use crate::{extsolvers::highs::HighsSolver, milp::DeploymentSolution};

    fn solve(params: ModelParams, trace: &TargetsTrace, graph: &CoverageGraph) -> DeploymentSolution {
        let _ = env_logger::try_init();
        let m = DeploymentModel::build(params, trace, graph).unwrap();
        m.solve(&mut HighsSolver::new()).unwrap()
    }

    fn assert_objective(solution: &DeploymentSolution, expected: f64) {
        assert_eq!(solution.status(), SolveStatus::Optimal);
        assert!(
            (solution.objective_value() - expected).abs() < 1e-3,
            "objective {} expected {}",
            solution.objective_value(),
            expected
        );
    }

    #[test]
    fn basic_0() {
        let g = graph(100.0, None);
        let s = solve(params(1, 1, 0.0), &trace(vec![vec![(50.0, 50.0)]]), &g);
        assert_objective(&s, 142.82857);
        assert!((s.total_distance() - 142.82857).abs() < 1e-3);
        assert_eq!(s.deployment(), &[vec![Node::Deploy(0)]]);
        assert_eq!(s.placements()[0][0], Placement::Deployed(Position::new(50.0, 50.0, 10.0)));
    }

    #[test]
    fn basic_1() {
        let g = graph(100.0, None);
        let s = solve(params(1, 2, 0.0), &trace(vec![vec![(50.0, 50.0), (50.0, 50.0)]]), &g);
        assert_objective(&s, 142.82857);
        assert_eq!(s.deployment(), &[vec![Node::Deploy(0)], vec![Node::Deploy(0)]]);
    }

    #[test]
    fn movement_0() {
        let s = solve(params(1, 2, 0.0), &moving_target(), &two_positions(100.0));
        assert_objective(&s, 197.48087);
        assert_eq!(s.deployment(), &[vec![Node::Deploy(0)], vec![Node::Deploy(1)]]);
        assert!((s.total_distance() - 197.48087).abs() < 1e-3);
    }

    #[test]
    fn movement_1() {
        // Out of range of the base, the second position needs a relay.
        let s = solve(params(1, 2, 0.0), &moving_target(), &two_positions(60.0));
        assert_eq!(s.status(), SolveStatus::Infeasible);
        assert_eq!(s.objective_value(), -1.0);
        assert_eq!(s.total_distance(), -1.0);
        assert_eq!(s.total_energy(), -1.0);
        assert!(s.deployment().is_empty());
        assert!(s.summary().to_string().starts_with("status = infeasible\nobjective = -1\n"));
    }

    #[test]
    fn movement_2() {
        let s = solve(params(2, 2, 0.0), &moving_target(), &two_positions(60.0));
        assert_objective(&s, 294.96174);
        assert_eq!(s.drones_at(0, Node::Deploy(0)), 1);
        assert_eq!(s.drones_at(1, Node::Deploy(0)), 1);
        assert_eq!(s.drones_at(1, Node::Deploy(1)), 1);
    }

    #[test]
    fn idle_drones_stay_at_base() {
        let s = solve(params(10, 2, 0.0), &moving_target(), &two_positions(100.0));
        assert_objective(&s, 197.48087);
        for t in 0..2 {
            assert_eq!(s.drones_at(t, Node::Base), 9);
            assert_eq!(s.deployment()[t].len(), 10);
        }
    }

    fn static_pair() -> TargetsTrace {
        trace(vec![vec![(25.0, 50.0), (25.0, 50.0)], vec![(75.0, 50.0), (75.0, 50.0)]])
    }

    #[test]
    fn two_static_targets_need_two_drones() {
        let s = solve(params(2, 2, 0.0), &static_pair(), &two_positions(100.0));
        assert_objective(&s, 294.96174);
        for t in 0..2 {
            assert_eq!(s.drones_at(t, Node::Deploy(0)), 1);
            assert_eq!(s.drones_at(t, Node::Deploy(1)), 1);
        }
    }

    #[test]
    fn two_static_targets_with_one_drone_is_infeasible() {
        let s = solve(params(1, 2, 0.0), &static_pair(), &two_positions(100.0));
        assert_eq!(s.status(), SolveStatus::Infeasible);
        assert_eq!(s.objective_value(), -1.0);
    }

    #[test]
    fn uncoverable_target_is_infeasible() {
        let g = graph(100.0, None);
        let s = solve(params(3, 1, 0.0), &trace(vec![vec![(50.0, 50.0)], vec![(5.0, 95.0)]]), &g);
        assert_eq!(s.status(), SolveStatus::Infeasible);
        assert_eq!(s.objective_value(), -1.0);
    }

    #[test]
    fn two_targets_need_a_relay() {
        let mut grid = GraphParams {
            area_size: 100.0,
            heights: vec![10.0],
            base_station: Position::new(0.0, 0.0, 0.0),
            positions_per_axis: 3,
            comm_range: 40.0,
            coverage_angle: PI / 6.0,
        };
        let g = CoverageGraph::new(grid.clone()).unwrap();
        let tr = trace(vec![vec![(25.0, 25.0)], vec![(75.0, 75.0)]]);
        let m = DeploymentModel::build(params(5, 1, 0.0), &tr, &g).unwrap();
        let s = m.solve(&mut HighsSolver::new()).unwrap();
        assert_eq!(s.status(), SolveStatus::Optimal);

        let corner = |x: f64, y: f64| {
            let i = g.candidate_positions().iter().position(|p| p.x == x && p.y == y).unwrap();
            Node::Deploy(i as u32)
        };
        assert_eq!(s.drones_at(0, corner(25.0, 25.0)), 1);
        assert_eq!(s.drones_at(0, corner(75.0, 75.0)), 1);
        // Only the diagonal through the centre links the two corners within 40 m.
        assert_eq!(s.drones_at(0, corner(50.0, 50.0)), 1);
        assert_eq!(s.drones_at(0, Node::Base), 2);
        let expected = 2.0 * (1350f64.sqrt() + 5100f64.sqrt() + 11350f64.sqrt());
        assert_objective(&s, expected);

        grid.comm_range = 30.0;
        let g = CoverageGraph::new(grid).unwrap();
        let m = DeploymentModel::build(params(5, 1, 0.0), &tr, &g).unwrap();
        let s = m.solve(&mut HighsSolver::new()).unwrap();
        // The base station is out of range of every position.
        assert_eq!(s.status(), SolveStatus::Infeasible);
    }

    #[test]
    fn weighted_objective_matches_realized_costs() {
        let alpha = 0.5;
        let s = solve(params(2, 2, alpha), &moving_target(), &two_positions(100.0));
        assert_eq!(s.status(), SolveStatus::Optimal);
        let expected = (1.0 - alpha) * s.total_distance() + alpha * BETA * s.total_energy();
        assert!(
            (s.objective_value() - expected).abs() < 1e-4 * expected,
            "objective {} realized {}",
            s.objective_value(),
            expected
        );
        assert!(s.total_energy() > 0.0);
    }

    #[test]
    fn summary_lists_solution() {
        let s = solve(params(2, 2, 0.0), &moving_target(), &two_positions(100.0));
        let text = s.summary().to_string();
        assert!(text.starts_with("status = optimal\n"));
        assert!(text.contains("t 0 drone 0 "));
        assert!(text.contains("t 1 drone 1 "));
        assert_eq!(s.summary().deployment.len(), 2);
    }
}
}
