//! Random-waypoint mobility traces for ground targets.
//!
//! Every target starts at a uniformly drawn point of the square area and, at
//! each time step, moves `speed * time_step_delta` metres in a uniformly drawn
//! direction. Coordinates that leave the area are reflected back in by
//! [`wall_bounce`].

use std::time::{Duration, Instant};

use fanet_structs::{
    scenario::{ScenarioError, TraceParams},
    GroundPoint,
};
use log::{debug, trace};
use rand::Rng;
use thiserror::Error;

pub mod trace_file;

#[derive(Debug, Error)]
pub enum TraceError {
    #[error(transparent)]
    Scenario(#[from] ScenarioError),
    #[error("trace file i/o: {0}")]
    Io(#[from] std::io::Error),
    #[error("line {line}: expected `{key} = <value>`")]
    Header { line: usize, key: &'static str },
    #[error("line {line}: malformed value `{value}` for `{key}`")]
    HeaderValue { line: usize, key: &'static str, value: String },
    #[error("line {line}: expected two coordinates, got `{text}`")]
    Coordinates { line: usize, text: String },
    #[error("trace file ended after {found} of {expected} positions")]
    Truncated { expected: usize, found: usize },
    #[error("line {line}: unexpected data after the last position")]
    TrailingData { line: usize },
    #[error("no feasible trace after {attempts} attempts in {elapsed:?}")]
    NoFeasibleTrace { attempts: usize, elapsed: Duration },
}

/// Reflects a coordinate into `[0, area_size]`.
///
/// The magnitude is folded back and forth across the area as many times as it
/// overflows, so the result is a triangle wave with period `2 * area_size`:
/// `area_size + k` maps to `area_size - k`, `2 * area_size + k` maps to `k`,
/// and `-k` maps to `k`.
pub fn wall_bounce(coordinate: f64, area_size: f64) -> f64 {
    let coordinate = coordinate.abs();
    if coordinate <= area_size {
        return coordinate;
    }
    let rest = coordinate % area_size;
    // `coordinate - rest` is an exact multiple of the area size.
    let folds = ((coordinate - rest) / area_size).round();
    if folds % 2.0 == 0.0 {
        rest
    } else {
        area_size - rest
    }
}

/// A uniformly oriented unit vector, drawn by normalising a point of `[-1,1]^2`.
pub fn random_direction(rng: &mut impl Rng) -> (f64, f64) {
    loop {
        let x: f64 = rng.gen_range(-1.0..=1.0);
        let y: f64 = rng.gen_range(-1.0..=1.0);
        let norm = (x * x + y * y).sqrt();
        if norm > 0.0 {
            return (x / norm, y / norm);
        }
    }
}

fn generate_target_trace(params: &TraceParams, rng: &mut impl Rng) -> Vec<GroundPoint> {
    let step = params.step_length();
    let mut curr = GroundPoint {
        x: rng.gen::<f64>() * params.area_size,
        y: rng.gen::<f64>() * params.area_size,
    };
    let mut trajectory = Vec::with_capacity(params.observation_period);
    trajectory.push(curr);
    for _ in 1..params.observation_period {
        let (dx, dy) = random_direction(rng);
        curr = GroundPoint {
            x: wall_bounce(curr.x + dx * step, params.area_size),
            y: wall_bounce(curr.y + dy * step, params.area_size),
        };
        trajectory.push(curr);
    }
    trajectory
}

/// Trajectories of all targets over the observation period. Immutable once
/// constructed.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetsTrace {
    params: TraceParams,
    trajectories: Vec<Vec<GroundPoint>>,
}

impl TargetsTrace {
    pub fn generate(params: TraceParams, rng: &mut impl Rng) -> Result<Self, ScenarioError> {
        params.validate()?;
        let trajectories = (0..params.n_targets)
            .map(|_| generate_target_trace(&params, rng))
            .collect();
        Ok(Self { params, trajectories })
    }

    /// Wraps given trajectories, checking that they match `params` and stay
    /// inside the area.
    pub fn from_trajectories(
        params: TraceParams,
        trajectories: Vec<Vec<GroundPoint>>,
    ) -> Result<Self, ScenarioError> {
        params.validate()?;
        if trajectories.len() != params.n_targets {
            return Err(ScenarioError::TargetCountMismatch {
                declared: params.n_targets,
                found: trajectories.len(),
            });
        }
        let inside = |v: f64| v.is_finite() && (0.0..=params.area_size).contains(&v);
        for (target, trajectory) in trajectories.iter().enumerate() {
            if trajectory.len() != params.observation_period {
                return Err(ScenarioError::TrajectoryLength {
                    target,
                    len: trajectory.len(),
                    expected: params.observation_period,
                });
            }
            if let Some(time_step) = trajectory.iter().position(|p| !(inside(p.x) && inside(p.y))) {
                return Err(ScenarioError::OutOfArea { target, time_step });
            }
        }
        Ok(Self { params, trajectories })
    }

    pub fn params(&self) -> &TraceParams {
        &self.params
    }

    pub fn n_targets(&self) -> usize {
        self.params.n_targets
    }

    pub fn observation_period(&self) -> usize {
        self.params.observation_period
    }

    pub fn time_step_delta(&self) -> f64 {
        self.params.time_step_delta
    }

    pub fn area_size(&self) -> f64 {
        self.params.area_size
    }

    pub fn trajectories(&self) -> &[Vec<GroundPoint>] {
        &self.trajectories
    }

    pub fn position(&self, target: usize, time_step: usize) -> GroundPoint {
        self.trajectories[target][time_step]
    }

    /// Positions of all targets at `time_step`, in target order.
    pub fn positions_at(&self, time_step: usize) -> Vec<GroundPoint> {
        self.trajectories.iter().map(|t| t[time_step]).collect()
    }
}

/// Bounds on the feasibility rejection loop of [`generate_feasible`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: Option<usize>,
    pub timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: Some(10_000),
            timeout: None,
        }
    }
}

impl RetryPolicy {
    /// Retries forever. Never terminates when no feasible trace exists, e.g.
    /// when the coverage radius is too small for the area.
    pub fn unbounded() -> Self {
        Self {
            max_attempts: None,
            timeout: None,
        }
    }

    fn exhausted(&self, attempts: usize, elapsed: Duration) -> bool {
        self.max_attempts.is_some_and(|m| attempts >= m) || self.timeout.is_some_and(|t| elapsed >= t)
    }
}

/// Regenerates whole traces until `is_feasible` accepts one.
///
/// Returns the accepted trace and the number of attempts it took. Every
/// attempt builds a fresh trace; rejected traces are dropped.
pub fn generate_feasible(
    params: TraceParams,
    rng: &mut impl Rng,
    policy: &RetryPolicy,
    mut is_feasible: impl FnMut(&TargetsTrace) -> bool,
) -> Result<(TargetsTrace, usize), TraceError> {
    let start = Instant::now();
    let mut attempts = 0;
    loop {
        let candidate = TargetsTrace::generate(params, rng)?;
        attempts += 1;
        if is_feasible(&candidate) {
            debug!("Accepted trace after {} attempts", attempts);
            return Ok((candidate, attempts));
        }
        trace!("Rejected infeasible trace (attempt {})", attempts);

        let elapsed = start.elapsed();
        if policy.exhausted(attempts, elapsed) {
            return Err(TraceError::NoFeasibleTrace { attempts, elapsed });
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, SeedableRng};

    use super::*;

    fn params(speed: f64) -> TraceParams {
        TraceParams {
            n_targets: 7,
            observation_period: 12,
            target_speed: speed,
            area_size: 100.0,
            time_step_delta: 1.0,
        }
    }

    #[test]
    fn wall_bounce_reflects() {
        let a = 100.0;
        assert_eq!(wall_bounce(42.0, a), 42.0);
        assert_eq!(wall_bounce(-1.0, a), 1.0);
        assert_eq!(wall_bounce(a, a), a);
        assert_eq!(wall_bounce(101.0, a), 99.0);
        assert_eq!(wall_bounce(201.0, a), 1.0);
        assert_eq!(wall_bounce(-101.0, a), 99.0);
        assert_eq!(wall_bounce(2.0 * a, a), 0.0);
        assert_eq!(wall_bounce(350.0, a), 50.0);
        assert_eq!(wall_bounce(375.0, a), 25.0);
    }

    #[test]
    fn wall_bounce_folds_back_from_far_wall() {
        let a = 100.0;
        for k in 0..=100 {
            let k = k as f64;
            assert!((wall_bounce(a + k, a) - (a - k)).abs() < 1e-9, "k = {}", k);
        }
    }

    #[test]
    fn wall_bounce_stays_in_area_and_is_periodic() {
        let mut rng = StdRng::seed_from_u64(3);
        for area in [1.0, 7.5, 100.0, 1234.0] {
            for _ in 0..2000 {
                let c: f64 = rng.gen_range(-1e5..1e5);
                let b = wall_bounce(c, area);
                assert!((0.0..=area).contains(&b), "c = {} area = {} -> {}", c, area, b);
                let shifted = wall_bounce(c.abs() + 2.0 * area, area);
                assert!((b - shifted).abs() < 1e-6, "c = {} area = {}", c, area);
            }
        }
    }

    #[test]
    fn random_direction_is_unit() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..1000 {
            let (x, y) = random_direction(&mut rng);
            assert!(((x * x + y * y).sqrt() - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn generated_traces_stay_inside_area() {
        let mut rng = StdRng::seed_from_u64(1);
        for speed in [1.0, 10.0, 450.0, 10_000.0] {
            let trace = TargetsTrace::generate(params(speed), &mut rng).unwrap();
            assert_eq!(trace.trajectories().len(), 7);
            for trajectory in trace.trajectories() {
                assert_eq!(trajectory.len(), 12);
                for p in trajectory {
                    assert!((0.0..=100.0).contains(&p.x) && (0.0..=100.0).contains(&p.y));
                }
            }
        }
    }

    #[test]
    fn consecutive_positions_respect_speed() {
        let mut rng = StdRng::seed_from_u64(5);
        let trace = TargetsTrace::generate(params(5.0), &mut rng).unwrap();
        for trajectory in trace.trajectories() {
            for w in trajectory.windows(2) {
                // Reflection only ever shortens the displacement.
                assert!(w[0].dist(&w[1]) <= 5.0 + 1e-9);
            }
        }
    }

    #[test]
    fn same_seed_same_trace() {
        let a = TargetsTrace::generate(params(10.0), &mut StdRng::seed_from_u64(9)).unwrap();
        let b = TargetsTrace::generate(params(10.0), &mut StdRng::seed_from_u64(9)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn malformed_params_are_rejected() {
        let mut rng = StdRng::seed_from_u64(0);
        let p = TraceParams { n_targets: 0, ..params(1.0) };
        assert_eq!(TargetsTrace::generate(p, &mut rng), Err(ScenarioError::NoTargets));
        let p = TraceParams { target_speed: -1.0, ..params(1.0) };
        assert!(TargetsTrace::generate(p, &mut rng).is_err());
    }

    #[test]
    fn from_trajectories_checks_shape() {
        let p = TraceParams { n_targets: 1, observation_period: 2, ..Default::default() };
        let ok = TargetsTrace::from_trajectories(p, vec![vec![GroundPoint::new(25.0, 50.0), GroundPoint::new(75.0, 50.0)]]);
        assert_eq!(ok.unwrap().positions_at(1), vec![GroundPoint::new(75.0, 50.0)]);

        let short = TargetsTrace::from_trajectories(p, vec![vec![GroundPoint::new(25.0, 50.0)]]);
        assert!(matches!(short, Err(ScenarioError::TrajectoryLength { target: 0, len: 1, expected: 2 })));

        let outside = TargetsTrace::from_trajectories(p, vec![vec![GroundPoint::new(25.0, 50.0), GroundPoint::new(175.0, 50.0)]]);
        assert_eq!(outside, Err(ScenarioError::OutOfArea { target: 0, time_step: 1 }));

        let missing = TargetsTrace::from_trajectories(p, vec![]);
        assert!(matches!(missing, Err(ScenarioError::TargetCountMismatch { declared: 1, found: 0 })));
    }

    #[test]
    fn feasible_generation_retries_until_accepted() {
        let _ = env_logger::try_init();
        let mut rng = StdRng::seed_from_u64(2);
        let mut calls = 0;
        let (trace, attempts) = generate_feasible(params(10.0), &mut rng, &RetryPolicy::default(), |_| {
            calls += 1;
            calls == 4
        })
        .unwrap();
        assert_eq!(attempts, 4);
        assert_eq!(trace.n_targets(), 7);
    }

    #[test]
    fn feasible_generation_gives_up() {
        let mut rng = StdRng::seed_from_u64(2);
        let policy = RetryPolicy { max_attempts: Some(25), timeout: None };
        match generate_feasible(params(10.0), &mut rng, &policy, |_| false) {
            Err(TraceError::NoFeasibleTrace { attempts, .. }) => assert_eq!(attempts, 25),
            other => panic!("unexpected {:?}", other),
        }

        let policy = RetryPolicy { max_attempts: None, timeout: Some(Duration::from_millis(20)) };
        assert!(matches!(
            generate_feasible(params(10.0), &mut rng, &policy, |_| false),
            Err(TraceError::NoFeasibleTrace { .. })
        ));
    }
}
