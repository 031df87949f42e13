//! Arena of variables and constraints for a mixed-integer linear program.
//!
//! Variables and constraints are addressed by dense integer handles. Each
//! carries a structured key; a readable name is only rendered when writing
//! the model out or handing names to a solver that wants them.

use std::{collections::HashMap, io::Write};

use crate::{coverage::Node, linexpr::LinExpr};

#[derive(Clone, Copy, Default, Hash, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct VarId(pub u32);

impl VarId {
    pub fn idx(&self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Copy, Default, Hash, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct ConstrId(pub u32);

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum VarKind {
    Binary,
    Integer,
    Continuous,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Sense {
    Le,
    Eq,
    Ge,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ObjectiveSense {
    Minimize,
    Maximize,
}

/// Head of a flow edge: another node of the communication graph, or a target
/// served by the tail position.
#[derive(Clone, Copy, Hash, PartialEq, Eq, Debug)]
pub enum FlowEnd {
    Node(Node),
    Target(u32),
}

impl std::fmt::Display for FlowEnd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FlowEnd::Node(n) => write!(f, "{}", n),
            FlowEnd::Target(s) => write!(f, "s{}", s),
        }
    }
}

#[derive(Clone, Copy, Hash, PartialEq, Eq, Debug)]
pub enum VarKey {
    /// Some drone is at `node` at time `t`.
    Occupied { t: u32, node: Node },
    /// Drone `drone` is at `node` at time `t`.
    Assigned { t: u32, drone: u32, node: Node },
    /// Targets' worth of data routed along an edge at time `t`.
    Flow { t: u32, from: Node, to: FlowEnd },
    /// Drone `drone` was at `from` at `t - 1` and is at `to` at `t`.
    Move { t: u32, drone: u32, from: Node, to: Node },
}

impl std::fmt::Display for VarKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VarKey::Occupied { t, node } => write!(f, "z_t{}_{}", t, node),
            VarKey::Assigned { t, drone, node } => write!(f, "z_t{}_d{}_{}", t, drone, node),
            VarKey::Flow { t, from, to } => write!(f, "f_t{}_{}_{}", t, from, to),
            VarKey::Move { t, drone, from, to } => write!(f, "m_t{}_d{}_{}_{}", t, drone, from, to),
        }
    }
}

#[derive(Clone, Copy, Hash, PartialEq, Eq, Debug)]
pub enum ConstrKey {
    FlowConservation { t: u32, node: Node },
    Coverage { t: u32, target: u32 },
    FlowOccupancy { t: u32, at: Node, from: Node, to: FlowEnd },
    Integrity { t: u32, drone: u32 },
    Occupancy { t: u32, node: Node },
    MoveFrom { t: u32, drone: u32, from: Node, to: Node },
    MoveTo { t: u32, drone: u32, from: Node, to: Node },
    MoveBoth { t: u32, drone: u32, from: Node, to: Node },
}

impl std::fmt::Display for ConstrKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConstrKey::FlowConservation { t, node } => write!(f, "flow_t{}_{}", t, node),
            ConstrKey::Coverage { t, target } => write!(f, "cover_t{}_s{}", t, target),
            ConstrKey::FlowOccupancy { t, at, from, to } => write!(f, "flowocc_t{}_{}_{}_{}", t, at, from, to),
            ConstrKey::Integrity { t, drone } => write!(f, "integrity_t{}_d{}", t, drone),
            ConstrKey::Occupancy { t, node } => write!(f, "occ_t{}_{}", t, node),
            ConstrKey::MoveFrom { t, drone, from, to } => write!(f, "mvfrom_t{}_d{}_{}_{}", t, drone, from, to),
            ConstrKey::MoveTo { t, drone, from, to } => write!(f, "mvto_t{}_d{}_{}_{}", t, drone, from, to),
            ConstrKey::MoveBoth { t, drone, from, to } => write!(f, "mvand_t{}_d{}_{}_{}", t, drone, from, to),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Variable {
    pub key: VarKey,
    pub lower: f64,
    pub upper: f64,
    pub kind: VarKind,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Constraint {
    pub key: ConstrKey,
    pub expr: LinExpr,
    pub sense: Sense,
    pub rhs: f64,
}

impl Constraint {
    pub fn is_satisfied(&self, values: &[f64], tolerance: f64) -> bool {
        let lhs = self.expr.eval(values);
        match self.sense {
            Sense::Le => lhs <= self.rhs + tolerance,
            Sense::Eq => (lhs - self.rhs).abs() <= tolerance,
            Sense::Ge => lhs >= self.rhs - tolerance,
        }
    }
}

/// Variables, constraints and objective accumulated before a single bulk
/// submission to a solver. `VarId(i)` is the `i`-th variable added.
#[derive(Debug, Clone)]
pub struct OptimizationModel {
    variables: Vec<Variable>,
    constraints: Vec<Constraint>,
    var_index: HashMap<VarKey, VarId>,
    objective: LinExpr,
    objective_sense: ObjectiveSense,
}

impl Default for OptimizationModel {
    fn default() -> Self {
        Self {
            variables: Vec::new(),
            constraints: Vec::new(),
            var_index: HashMap::new(),
            objective: LinExpr::new(),
            objective_sense: ObjectiveSense::Minimize,
        }
    }
}

impl OptimizationModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_variable(&mut self, key: VarKey, lower: f64, upper: f64, kind: VarKind) -> VarId {
        assert!(lower <= upper, "empty domain for {}", key);
        let id = VarId(self.variables.len() as u32);
        let prev = self.var_index.insert(key, id);
        assert!(prev.is_none(), "variable {} defined twice", key);
        self.variables.push(Variable { key, lower, upper, kind });
        id
    }

    pub fn var(&self, key: &VarKey) -> Option<VarId> {
        self.var_index.get(key).copied()
    }

    pub fn add_constraint(&mut self, key: ConstrKey, expr: LinExpr, sense: Sense, rhs: f64) -> ConstrId {
        debug_assert!(!expr.has_duplicates(), "duplicate terms in {}", key);
        let id = ConstrId(self.constraints.len() as u32);
        self.constraints.push(Constraint { key, expr, sense, rhs });
        id
    }

    /// Repeated variables in `expr` are merged before the objective is stored.
    pub fn set_objective(&mut self, mut expr: LinExpr, sense: ObjectiveSense) {
        expr.merge_duplicates();
        self.objective = expr;
        self.objective_sense = sense;
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn variable(&self, id: VarId) -> &Variable {
        &self.variables[id.idx()]
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn objective(&self) -> &LinExpr {
        &self.objective
    }

    pub fn objective_sense(&self) -> ObjectiveSense {
        self.objective_sense
    }

    pub fn n_variables(&self) -> usize {
        self.variables.len()
    }

    pub fn n_constraints(&self) -> usize {
        self.constraints.len()
    }

    pub fn violated_constraints(&self, values: &[f64], tolerance: f64) -> Vec<ConstrKey> {
        self.constraints
            .iter()
            .filter(|c| !c.is_satisfied(values, tolerance))
            .map(|c| c.key)
            .collect()
    }

    /// Writes the model in CPLEX LP format.
    pub fn write_lp(&self, mut w: impl Write) -> std::io::Result<()> {
        let name = |v: VarId| self.variables[v.idx()].key.to_string();
        let fallback = VarId(0);

        let write_expr = |w: &mut dyn Write, expr: &LinExpr| -> std::io::Result<()> {
            if expr.is_empty() {
                // Empty rows keep a zero term so that readers do not drop them.
                if !self.variables.is_empty() {
                    write!(w, " 0 {}", name(fallback))?;
                }
                return Ok(());
            }
            for (i, (var, coeff)) in expr.terms().iter().enumerate() {
                if *coeff < 0.0 {
                    write!(w, " - {} {}", -coeff, name(*var))?;
                } else if i > 0 {
                    write!(w, " + {} {}", coeff, name(*var))?;
                } else {
                    write!(w, " {} {}", coeff, name(*var))?;
                }
            }
            Ok(())
        };

        match self.objective_sense {
            ObjectiveSense::Minimize => writeln!(w, "Minimize")?,
            ObjectiveSense::Maximize => writeln!(w, "Maximize")?,
        }
        write!(w, " obj:")?;
        write_expr(&mut w, &self.objective)?;
        writeln!(w)?;

        writeln!(w, "Subject To")?;
        for c in self.constraints.iter() {
            write!(w, " {}:", c.key)?;
            write_expr(&mut w, &c.expr)?;
            let sense = match c.sense {
                Sense::Le => "<=",
                Sense::Eq => "=",
                Sense::Ge => ">=",
            };
            writeln!(w, " {} {}", sense, c.rhs)?;
        }

        writeln!(w, "Bounds")?;
        for v in self.variables.iter().filter(|v| v.kind != VarKind::Binary) {
            writeln!(w, " {} <= {} <= {}", v.lower, v.key, v.upper)?;
        }

        let generals = self.variables.iter().filter(|v| v.kind == VarKind::Integer).collect::<Vec<_>>();
        if !generals.is_empty() {
            writeln!(w, "General")?;
            for v in generals {
                writeln!(w, " {}", v.key)?;
            }
        }
        let binaries = self.variables.iter().filter(|v| v.kind == VarKind::Binary).collect::<Vec<_>>();
        if !binaries.is_empty() {
            writeln!(w, "Binary")?;
            for v in binaries {
                writeln!(w, " {}", v.key)?;
            }
        }
        writeln!(w, "End")?;
        w.flush()
    }
}
