//! Line-oriented text form of a [`TargetsTrace`].
//!
//! ```text
//! n_targets = 2
//! observation_period = 3
//! target_speed = 5
//! area_size = 100
//! time_step_delta = 1
//! 12.5 40.25
//! ...
//! ```
//!
//! The five header lines are followed by one `x y` line per target and time
//! step, target-major. Floats are written in their shortest round-trip form,
//! so loading reproduces the saved values exactly.

use std::{
    fs::File,
    io::{BufRead, BufReader, BufWriter, Write},
    path::Path,
};

use fanet_structs::{scenario::TraceParams, GroundPoint};

use crate::{TargetsTrace, TraceError};

const MAX_PREALLOCATED_POSITIONS: usize = 1 << 16;

impl TargetsTrace {
    pub fn write_to(&self, mut w: impl Write) -> Result<(), TraceError> {
        let p = self.params();
        writeln!(w, "n_targets = {}", p.n_targets)?;
        writeln!(w, "observation_period = {}", p.observation_period)?;
        writeln!(w, "target_speed = {}", p.target_speed)?;
        writeln!(w, "area_size = {}", p.area_size)?;
        writeln!(w, "time_step_delta = {}", p.time_step_delta)?;
        for trajectory in self.trajectories() {
            for pos in trajectory {
                writeln!(w, "{} {}", pos.x, pos.y)?;
            }
        }
        w.flush()?;
        Ok(())
    }

    pub fn read_from(r: impl BufRead) -> Result<Self, TraceError> {
        let mut lines = r.lines().enumerate().map(|(i, l)| (i + 1, l));

        let mut header = |key: &'static str| -> Result<(usize, String), TraceError> {
            let (line, text) = match lines.next() {
                Some((line, text)) => (line, text?),
                None => return Err(TraceError::Header { line: 0, key }),
            };
            match text.split_once('=') {
                Some((k, v)) if k.trim() == key => Ok((line, v.trim().to_string())),
                _ => Err(TraceError::Header { line, key }),
            }
        };

        let n_targets = parse_count(header("n_targets")?, "n_targets")?;
        let (period_line, period_value) = header("observation_period")?;
        let observation_period = parse_count((period_line, period_value.clone()), "observation_period")?;
        let target_speed = parse_float(header("target_speed")?, "target_speed")?;
        let area_size = parse_float(header("area_size")?, "area_size")?;
        let time_step_delta = parse_float(header("time_step_delta")?, "time_step_delta")?;

        let params = TraceParams {
            n_targets,
            observation_period,
            target_speed,
            area_size,
            time_step_delta,
        };
        params.validate()?;

        let expected = n_targets.checked_mul(observation_period).ok_or(TraceError::HeaderValue {
            line: period_line,
            key: "observation_period",
            value: period_value,
        })?;
        // Header counts are untrusted; grow with the data actually present.
        let mut positions = Vec::with_capacity(expected.min(MAX_PREALLOCATED_POSITIONS));
        while positions.len() < expected {
            let Some((line, text)) = lines.next() else {
                return Err(TraceError::Truncated { expected, found: positions.len() });
            };
            let text = text?;
            let mut fields = text.split_whitespace().map(str::parse::<f64>);
            match (fields.next(), fields.next(), fields.next()) {
                (Some(Ok(x)), Some(Ok(y)), None) => positions.push(GroundPoint { x, y }),
                _ => return Err(TraceError::Coordinates { line, text }),
            }
        }

        for (line, text) in lines {
            if !text?.trim().is_empty() {
                return Err(TraceError::TrailingData { line });
            }
        }

        let trajectories = positions
            .chunks(observation_period)
            .map(|c| c.to_vec())
            .collect();
        Ok(TargetsTrace::from_trajectories(params, trajectories)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), TraceError> {
        self.write_to(BufWriter::new(File::create(path)?))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, TraceError> {
        Self::read_from(BufReader::new(File::open(path)?))
    }
}

fn parse_float((line, value): (usize, String), key: &'static str) -> Result<f64, TraceError> {
    value
        .parse::<f64>()
        .map_err(|_| TraceError::HeaderValue { line, key, value })
}

/// Accepts `5` as well as `5.0`.
fn parse_count((line, value): (usize, String), key: &'static str) -> Result<usize, TraceError> {
    if let Ok(n) = value.parse::<usize>() {
        return Ok(n);
    }
    match value.parse::<f64>() {
        Ok(f) if f >= 0.0 && f.fract() == 0.0 && f <= u32::MAX as f64 => Ok(f as usize),
        _ => Err(TraceError::HeaderValue { line, key, value }),
    }
}
