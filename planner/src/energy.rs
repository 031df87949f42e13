//! Rotorcraft propulsion power and minimum travel energy.

use ordered_float::OrderedFloat;

/// Weight (N).
const WEIGHT: f64 = 20.0;
/// Air density (kg/m^3).
const AIR_DENSITY: f64 = 1.225;
/// Rotor radius (m).
const ROTOR_RADIUS: f64 = 0.4;
/// Rotor disc area (m^2).
const DISC_AREA: f64 = 0.503;
/// Blade angular velocity (rad/s).
const BLADE_ANGULAR_VELOCITY: f64 = 300.0;
/// Tip speed of the rotor blade (m/s).
const TIP_SPEED: f64 = 120.0;
const ROTOR_SOLIDITY: f64 = 0.05;
const FUSELAGE_DRAG_RATIO: f64 = 0.6;
/// Incremental correction factor to induced power.
const INDUCED_CORRECTION: f64 = 0.1;
/// Mean rotor induced velocity in hover (m/s).
const HOVER_INDUCED_VELOCITY: f64 = 4.03;
const PROFILE_DRAG: f64 = 0.012;

/// Propulsion power (W) at horizontal speed `v` (m/s).
pub fn power(v: f64) -> f64 {
    let blade_profile_hover = PROFILE_DRAG
        * AIR_DENSITY
        * ROTOR_SOLIDITY
        * DISC_AREA
        * BLADE_ANGULAR_VELOCITY.powi(3)
        * ROTOR_RADIUS.powi(3)
        / 8.0;
    let induced_hover = (1.0 + INDUCED_CORRECTION) * WEIGHT.powf(1.5) / (2.0 * AIR_DENSITY * DISC_AREA).sqrt();

    let v2 = v * v;
    let v0_2 = HOVER_INDUCED_VELOCITY * HOVER_INDUCED_VELOCITY;

    let blade_profile = blade_profile_hover * (1.0 + 3.0 * v2 / (TIP_SPEED * TIP_SPEED));
    let induced = induced_hover * ((1.0 + v2 * v2 / (4.0 * v0_2 * v0_2)).sqrt() - v2 / (2.0 * v0_2)).sqrt();
    let parasite = 0.5 * FUSELAGE_DRAG_RATIO * AIR_DENSITY * ROTOR_SOLIDITY * DISC_AREA * v2 * v;

    blade_profile + induced + parasite
}

/// Cruise speeds tried by [`energy_with`]. A smaller step gets closer to the
/// true minimum at proportionally more evaluations of [`power`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeedScan {
    pub max_speed: f64,
    pub step: f64,
}

impl Default for SpeedScan {
    fn default() -> Self {
        Self { max_speed: 30.0, step: 0.1 }
    }
}

/// Minimum energy (J) to travel `distance` metres within `duration` seconds.
///
/// With `hover` the drone stays airborne for the rest of the duration after
/// arriving; otherwise it lands on arrival.
pub fn energy(distance: f64, duration: f64, hover: bool) -> f64 {
    energy_with(distance, duration, hover, &SpeedScan::default())
}

pub fn energy_with(distance: f64, duration: f64, hover: bool, scan: &SpeedScan) -> f64 {
    assert!(distance.is_finite() && distance >= 0.0, "bad distance {}", distance);
    assert!(duration.is_finite() && duration > 0.0, "bad duration {}", duration);
    assert!(scan.step > 0.0);

    if distance == 0.0 {
        return power(0.0) * duration;
    }

    // Slowest speed that still arrives in time.
    let v_min = distance / duration;
    let at_v_min = power(v_min) * duration;

    let hover_power = power(0.0);
    let cost = |v: f64| {
        let flight_time = distance / v;
        if hover {
            power(v) * flight_time + (duration - flight_time) * hover_power
        } else {
            power(v) * flight_time
        }
    };

    let n_steps = ((scan.max_speed - v_min) / scan.step).ceil().max(0.0) as usize;
    (0..n_steps)
        .map(|i| v_min + i as f64 * scan.step)
        .map(|v| OrderedFloat(cost(v)))
        .min()
        .map_or(at_v_min, |best| best.0.min(at_v_min))
}
