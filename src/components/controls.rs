//! Control components: Potentiometer and Switch.

use super::{Element, StepContext, Terminals};
use crate::circuit::ConnectionPoint;
use crate::solver::MnaMatrix;

/// A potentiometer component.
///
/// Modeled as two resistors in series with a wiper tap:
///   n1 ----[R1]---- wiper ----[R2]---- n2
///
/// where R1 = position * total_resistance
/// and   R2 = (1 - position) * total_resistance
#[derive(Debug, Clone)]
pub struct Potentiometer {
    pub name: String,
    pub terminals: Terminals, // [n1, wiper, n2]
    pub total_resistance: f64,
    /// Position from 0.0 to 1.0
    pub position: f64,
}

impl Potentiometer {
    /// Create a new potentiometer.
    pub fn new(
        name: impl Into<String>,
        n1: impl Into<ConnectionPoint>,
        wiper: impl Into<ConnectionPoint>,
        n2: impl Into<ConnectionPoint>,
        total_resistance: f64,
        position: f64,
    ) -> Self {
        Self {
            name: name.into(),
            terminals: Terminals::new([n1.into(), wiper.into(), n2.into()]),
            total_resistance: total_resistance.max(1.0), // Minimum 1 ohm
            position: position.clamp(0.001, 0.999),      // Avoid zero resistance
        }
    }

    /// Get the resistance from n1 to wiper.
    pub fn r1(&self) -> f64 {
        (self.position * self.total_resistance).max(0.1)
    }

    /// Get the resistance from wiper to n2.
    pub fn r2(&self) -> f64 {
        ((1.0 - self.position) * self.total_resistance).max(0.1)
    }

    /// Set the wiper position. The simulator must restamp afterwards.
    pub fn set_position(&mut self, position: f64) {
        self.position = position.clamp(0.001, 0.999);
    }
}

impl Element for Potentiometer {
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
        let t = &self.terminals;
        matrix.stamp_resistor(t.node(0), t.node(1), self.r1());
        matrix.stamp_resistor(t.node(1), t.node(2), self.r2());
    }

    /// Current entering n1.
    fn current(&self) -> f64 {
        (self.terminals.volt(0) - self.terminals.volt(1)) / self.r1()
    }
}

/// A switch component.
///
/// A closed switch is a wire and merges its terminals into one node; an open
/// switch connects nothing. Toggling therefore changes topology.
#[derive(Debug, Clone)]
pub struct Switch {
    pub name: String,
    pub terminals: Terminals,
    pub closed: bool,
}

impl Switch {
    /// Create a new switch.
    pub fn new(
        name: impl Into<String>,
        a: impl Into<ConnectionPoint>,
        b: impl Into<ConnectionPoint>,
        closed: bool,
    ) -> Self {
        Self {
            name: name.into(),
            terminals: Terminals::new([a.into(), b.into()]),
            closed,
        }
    }

    /// Set the switch state. The simulator must re-analyze afterwards.
    pub fn set_closed(&mut self, closed: bool) {
        self.closed = closed;
    }

    /// Toggle the switch state. The simulator must re-analyze afterwards.
    pub fn toggle(&mut self) {
        self.closed = !self.closed;
    }
}

impl Element for Switch {
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
        self.closed
    }

    fn conducts(&self, _a: usize, _b: usize) -> bool {
        self.closed
    }

    fn stamp(&self, _matrix: &mut MnaMatrix, _ctx: &StepContext) {}
}
