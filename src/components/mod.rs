//! Element models for circuit simulation.
//!
//! This module provides the stamp contract every circuit element implements,
//! plus the built-in catalog:
//! - Linear: Resistor, Capacitor, Inductor, Wire
//! - Sources: Voltage Source, Current Source
//! - Controls: Potentiometer, Switch
//! - Active: Op-Amp
//! - Nonlinear: Diode, Behavioral source
//!
//! Each element stamps its constant contribution once per analysis through
//! [`Element::stamp`] and its operating-point dependent contribution every
//! iteration through [`Element::do_step`].

mod behavioral;
mod controls;
mod diode;
mod linear;
mod opamp;
mod sources;

pub use behavioral::{Behavioral, TransferFn};
pub use controls::{Potentiometer, Switch};
pub use diode::{Diode, DiodeParams};
pub use linear::{Capacitor, Inductor, Resistor, Wire};
pub use opamp::{OpAmp, OpAmpParams};
pub use sources::{CurrentSource, VoltageSource, Waveform};

use std::fmt;

use crate::circuit::{AuxId, ConnectionPoint, NodeId};
use crate::solver::MnaMatrix;

/// Per-step information handed to elements while stamping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepContext {
    /// Simulated time at the end of the step being solved (seconds)
    pub time: f64,
    /// Timestep being solved (seconds)
    pub dt: f64,
    /// Newton-Raphson subiteration within the step
    pub subiteration: usize,
}

impl StepContext {
    pub fn new(time: f64, dt: f64) -> Self {
        Self {
            time,
            dt,
            subiteration: 0,
        }
    }
}

/// Connection bookkeeping shared by every element.
///
/// Slots `0..points.len()` are the external terminals; any further slots are
/// internal nodes requested through [`Element::internal_node_count`].
#[derive(Debug, Clone, Default)]
pub struct Terminals {
    /// Connection point of each external terminal
    pub points: Vec<ConnectionPoint>,
    /// Resolved node of each slot (valid after analysis)
    pub nodes: Vec<NodeId>,
    /// Last distributed voltage of each slot
    pub volts: Vec<f64>,
    /// Auxiliary unknowns owned by the element
    pub aux: Vec<AuxId>,
}

impl Terminals {
    /// Create terminals at the given connection points.
    pub fn new<I, P>(points: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<ConnectionPoint>,
    {
        let points: Vec<ConnectionPoint> = points.into_iter().map(Into::into).collect();
        let n = points.len();
        Self {
            points,
            nodes: vec![NodeId::GROUND; n],
            volts: vec![0.0; n],
            aux: Vec::new(),
        }
    }

    /// Resize the slot tables for a new analysis.
    ///
    /// Voltages survive when the slot count is unchanged so that a
    /// re-analysis keeps its warm start.
    pub fn allocate(&mut self, internal: usize, aux: usize) {
        let slots = self.points.len() + internal;
        self.nodes = vec![NodeId::GROUND; slots];
        if self.volts.len() != slots {
            self.volts = vec![0.0; slots];
        }
        self.aux = vec![AuxId(0); aux];
    }

    /// Node of a slot.
    pub fn node(&self, slot: usize) -> NodeId {
        self.nodes[slot]
    }

    /// Voltage of a slot.
    pub fn volt(&self, slot: usize) -> f64 {
        self.volts[slot]
    }

    /// Auxiliary unknown `k`.
    pub fn aux(&self, k: usize) -> AuxId {
        self.aux[k]
    }
}

/// The stamp contract.
///
/// Implementors only describe their own contribution; node numbering,
/// auxiliary unknown allocation and voltage distribution are done by the
/// solver through the provided methods.
pub trait Element: fmt::Debug {
    /// Human-readable name for diagnostics.
    fn name(&self) -> &str;

    /// Connection bookkeeping.
    fn terminals(&self) -> &Terminals;

    /// Mutable connection bookkeeping.
    fn terminals_mut(&mut self) -> &mut Terminals;

    /// Number of internal (not user-visible) nodes this element needs.
    fn internal_node_count(&self) -> usize {
        0
    }

    /// Number of auxiliary unknowns (branch currents) this element needs.
    fn aux_count(&self) -> usize {
        0
    }

    /// Zero-resistance connector: its terminals are merged into one node.
    fn is_wire(&self) -> bool {
        false
    }

    /// Whether the element re-linearizes every iteration.
    fn is_nonlinear(&self) -> bool {
        false
    }

    /// Whether current can flow between two slots (connectivity check).
    fn conducts(&self, _a: usize, _b: usize) -> bool {
        true
    }

    /// Whether a slot is tied to ground inside the element.
    fn has_ground_connection(&self, _slot: usize) -> bool {
        false
    }

    /// Terminal whose group becomes ground when no point is named ground.
    fn ground_reference(&self) -> Option<usize> {
        None
    }

    /// Stamp the constant contribution. Called once per analysis (and again
    /// whenever the timestep or parameters change).
    ///
    /// Elements must flag the rows that [`Element::do_step`] touches with
    /// [`MnaMatrix::mark_nonlinear`] or [`MnaMatrix::mark_rhs_changes`].
    fn stamp(&self, matrix: &mut MnaMatrix, ctx: &StepContext);

    /// Stamp the per-iteration contribution from the current terminal
    /// voltages (companion models, time-varying sources, history terms).
    fn do_step(&mut self, _matrix: &mut MnaMatrix, _ctx: &StepContext) {}

    /// Receive the solved value of auxiliary unknown `k`.
    fn set_aux_current(&mut self, _k: usize, _current: f64) {}

    /// Commit internal state after a converged timestep.
    fn step_finished(&mut self, _ctx: &StepContext) {}

    /// Clear accumulated state (history, warm-start guesses).
    fn reset(&mut self) {
        self.terminals_mut().volts.fill(0.0);
    }

    /// Current through the element (terminal 0 to terminal 1).
    fn current(&self) -> f64 {
        0.0
    }

    /// Iteration state, beyond terminal voltages, that seeds the next
    /// linearization (a junction operating point, previous inputs).
    fn warm_start(&self) -> &[f64] {
        &[]
    }

    /// Put back state captured from [`Element::warm_start`].
    fn set_warm_start(&mut self, _state: &[f64]) {}

    // ============ Provided ============

    /// Number of external terminals.
    fn terminal_count(&self) -> usize {
        self.terminals().points.len()
    }

    /// Connection point of a terminal.
    fn terminal_point(&self, terminal: usize) -> &ConnectionPoint {
        &self.terminals().points[terminal]
    }

    /// Node assigned to a slot.
    fn terminal_node(&self, slot: usize) -> NodeId {
        self.terminals().node(slot)
    }

    /// Last distributed voltage of a slot.
    fn terminal_voltage(&self, slot: usize) -> f64 {
        self.terminals().volt(slot)
    }

    /// Distribution hook: record a solved slot voltage.
    fn set_terminal_voltage(&mut self, slot: usize, voltage: f64) {
        self.terminals_mut().volts[slot] = voltage;
    }

    /// Voltage from terminal 0 to terminal 1.
    fn voltage_diff(&self) -> f64 {
        let t = self.terminals();
        t.volt(0) - t.volt(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_allocation_keeps_warm_start() {
        let mut t = Terminals::new(["a", "b"]);
        t.volts = vec![1.0, 2.0];
        t.allocate(0, 1);
        assert_eq!(t.volts, vec![1.0, 2.0]);
        assert_eq!(t.aux.len(), 1);

        t.allocate(1, 0);
        assert_eq!(t.nodes.len(), 3);
        assert_eq!(t.volts, vec![0.0, 0.0, 0.0]);
    }
}
