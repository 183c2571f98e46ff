//! Linear passive components: Resistor, Capacitor, Inductor, Wire.

use super::{Element, StepContext, Terminals};
use crate::circuit::ConnectionPoint;
use crate::solver::MnaMatrix;

/// Smallest resistance accepted, to keep the conductance finite.
const MIN_RESISTANCE: f64 = 1e-12;

/// A resistor component.
#[derive(Debug, Clone)]
pub struct Resistor {
    pub name: String,
    pub terminals: Terminals,
    pub resistance: f64,
}

impl Resistor {
    /// Create a new resistor.
    pub fn new(
        name: impl Into<String>,
        a: impl Into<ConnectionPoint>,
        b: impl Into<ConnectionPoint>,
        resistance: f64,
    ) -> Self {
        Self {
            name: name.into(),
            terminals: Terminals::new([a.into(), b.into()]),
            resistance: resistance.max(MIN_RESISTANCE),
        }
    }

    /// Get the conductance (1/R).
    pub fn conductance(&self) -> f64 {
        1.0 / self.resistance
    }

    /// Change the resistance. The simulator must restamp afterwards.
    pub fn set_resistance(&mut self, resistance: f64) {
        self.resistance = resistance.max(MIN_RESISTANCE);
    }
}

impl Element for Resistor {
    fn name(&self) -> &str {
        &self.name
    }

    fn terminals(&self) -> &Terminals {
        &self.terminals
    }

    fn terminals_mut(&mut self) -> &mut Terminals {
        &mut self.terminals
    }

    fn stamp(&self, matrix: &mut MnaMatrix, _ctx: &StepContext) {
        matrix.stamp_conductance(self.terminals.node(0), self.terminals.node(1), self.conductance());
    }

    fn current(&self) -> f64 {
        self.voltage_diff() * self.conductance()
    }
}

/// A zero-resistance connector. Its terminals share one node, so it never
/// reaches the matrix.
#[derive(Debug, Clone)]
pub struct Wire {
    pub name: String,
    pub terminals: Terminals,
}

impl Wire {
    pub fn new(name: impl Into<String>, a: impl Into<ConnectionPoint>, b: impl Into<ConnectionPoint>) -> Self {
        Self {
            name: name.into(),
            terminals: Terminals::new([a.into(), b.into()]),
        }
    }
}

impl Element for Wire {
    fn name(&self) -> &str {
        &self.name
    }

    fn terminals(&self) -> &Terminals {
        &self.terminals
    }

    fn terminals_mut(&mut self) -> &mut Terminals {
        &mut self.terminals
    }

    fn is_wire(&self) -> bool {
        true
    }

    fn stamp(&self, _matrix: &mut MnaMatrix, _ctx: &StepContext) {}
}

/// A capacitor component.
///
/// In discrete-time simulation, a capacitor is modeled using a companion model.
/// Using the trapezoidal rule:
///   i(t) = (2C/dt) * v(t) - i_eq(t-dt)
///
/// where i_eq(t-dt) = (2C/dt) * v(t-dt) + i(t-dt)
///
/// This gives an equivalent conductance G_eq = 2C/dt and an equivalent
/// current source I_eq = -i_eq(t-dt).
#[derive(Debug, Clone)]
pub struct Capacitor {
    pub name: String,
    pub terminals: Terminals,
    pub capacitance: f64,

    // State for discrete-time model
    /// Voltage across the capacitor at the last committed step
    pub v_prev: f64,
    /// Current through the capacitor at the last committed step
    pub i_prev: f64,
}

impl Capacitor {
    /// Create a new capacitor.
    pub fn new(
        name: impl Into<String>,
        a: impl Into<ConnectionPoint>,
        b: impl Into<ConnectionPoint>,
        capacitance: f64,
    ) -> Self {
        Self {
            name: name.into(),
            terminals: Terminals::new([a.into(), b.into()]),
            capacitance,
            v_prev: 0.0,
            i_prev: 0.0,
        }
    }

    /// Get the equivalent conductance for the trapezoidal companion model.
    ///
    /// For a capacitor with trapezoidal integration:
    ///   i(n) = G * v(n) - I_eq
    /// where G = 2C/dt and I_eq = G*v(n-1) + i(n-1)
    pub fn conductance(&self, dt: f64) -> f64 {
        2.0 * self.capacitance / dt
    }

    /// Get the equivalent current source value for the companion model.
    ///
    /// The history term is subtracted from the element current, so it is
    /// stamped as a source flowing from terminal 1 to terminal 0.
    pub fn current_source(&self, dt: f64) -> f64 {
        -(self.conductance(dt) * self.v_prev + self.i_prev)
    }
}

impl Element for Capacitor {
    fn name(&self) -> &str {
        &self.name
    }

    fn terminals(&self) -> &Terminals {
        &self.terminals
    }

    fn terminals_mut(&mut self) -> &mut Terminals {
        &mut self.terminals
    }

    fn stamp(&self, matrix: &mut MnaMatrix, ctx: &StepContext) {
        let (n1, n2) = (self.terminals.node(0), self.terminals.node(1));
        matrix.stamp_conductance(n1, n2, self.conductance(ctx.dt));
        matrix.mark_node_rhs_changes(n1);
        matrix.mark_node_rhs_changes(n2);
    }

    fn do_step(&mut self, matrix: &mut MnaMatrix, ctx: &StepContext) {
        let (n1, n2) = (self.terminals.node(0), self.terminals.node(1));
        matrix.stamp_current_source(n1, n2, self.current_source(ctx.dt));
    }

    fn step_finished(&mut self, ctx: &StepContext) {
        // i_new = (2C/dt) * (v_new - v_prev) - i_prev
        let v_new = self.voltage_diff();
        let i_new = self.conductance(ctx.dt) * (v_new - self.v_prev) - self.i_prev;
        self.v_prev = v_new;
        self.i_prev = i_new;
    }

    fn reset(&mut self) {
        self.terminals.volts.fill(0.0);
        self.v_prev = 0.0;
        self.i_prev = 0.0;
    }

    fn current(&self) -> f64 {
        self.i_prev
    }
}

/// An inductor component.
///
/// In discrete-time simulation, an inductor is modeled using a companion model.
/// Using the trapezoidal rule:
///   v(n) = (2L/dt) * (i(n) - i(n-1)) - v(n-1)
///
/// This requires an additional branch current unknown in the MNA matrix.
#[derive(Debug, Clone)]
pub struct Inductor {
    pub name: String,
    pub terminals: Terminals,
    pub inductance: f64,

    // State for discrete-time model
    /// Current through the inductor at the last committed step
    pub i_prev: f64,
    /// Voltage across the inductor at the last committed step
    pub v_prev: f64,
    /// Branch current from the latest solve
    i_solved: f64,
}

impl Inductor {
    /// Create a new inductor.
    pub fn new(
        name: impl Into<String>,
        a: impl Into<ConnectionPoint>,
        b: impl Into<ConnectionPoint>,
        inductance: f64,
    ) -> Self {
        Self {
            name: name.into(),
            terminals: Terminals::new([a.into(), b.into()]),
            inductance,
            i_prev: 0.0,
            v_prev: 0.0,
            i_solved: 0.0,
        }
    }

    /// Get the equivalent resistance for the trapezoidal companion model.
    pub fn resistance(&self, dt: f64) -> f64 {
        2.0 * self.inductance / dt
    }

    /// Get the equivalent voltage source value for the companion model.
    ///
    /// Branch equation: v(n) - R * i(n) = -(R * i(n-1) + v(n-1))
    pub fn voltage_source(&self, dt: f64) -> f64 {
        -(self.resistance(dt) * self.i_prev + self.v_prev)
    }
}

impl Element for Inductor {
    fn name(&self) -> &str {
        &self.name
    }

    fn terminals(&self) -> &Terminals {
        &self.terminals
    }

    fn terminals_mut(&mut self) -> &mut Terminals {
        &mut self.terminals
    }

    fn aux_count(&self) -> usize {
        1
    }

    fn stamp(&self, matrix: &mut MnaMatrix, ctx: &StepContext) {
        let aux = self.terminals.aux(0);
        matrix.stamp_voltage_source(self.terminals.node(0), self.terminals.node(1), aux, 0.0);
        let br = matrix.aux_row(aux);
        matrix.add(br, br, -self.resistance(ctx.dt));
        matrix.mark_rhs_changes(br);
    }

    fn do_step(&mut self, matrix: &mut MnaMatrix, ctx: &StepContext) {
        matrix.stamp_aux_rhs(self.terminals.aux(0), self.voltage_source(ctx.dt));
    }

    fn set_aux_current(&mut self, _k: usize, current: f64) {
        self.i_solved = current;
    }

    fn step_finished(&mut self, _ctx: &StepContext) {
        self.i_prev = self.i_solved;
        self.v_prev = self.voltage_diff();
    }

    fn reset(&mut self) {
        self.terminals.volts.fill(0.0);
        self.i_prev = 0.0;
        self.v_prev = 0.0;
        self.i_solved = 0.0;
    }

    fn current(&self) -> f64 {
        self.i_solved
    }
}
