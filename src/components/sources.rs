//! Voltage and current sources.

use std::f64::consts::PI;

use super::{Element, StepContext, Terminals};
use crate::circuit::ConnectionPoint;
use crate::solver::MnaMatrix;

/// Time dependence of a source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Waveform {
    /// Constant value
    Dc(f64),
    /// offset + amplitude * sin(2*pi*frequency*t + phase)
    Sine {
        amplitude: f64,
        frequency: f64,
        offset: f64,
        phase: f64,
    },
    /// offset +/- amplitude, high for `duty` of each period
    Square {
        amplitude: f64,
        frequency: f64,
        offset: f64,
        duty: f64,
    },
}

impl Waveform {
    /// Value at time `t`.
    pub fn value(&self, t: f64) -> f64 {
        match *self {
            Waveform::Dc(v) => v,
            Waveform::Sine {
                amplitude,
                frequency,
                offset,
                phase,
            } => offset + amplitude * (2.0 * PI * frequency * t + phase).sin(),
            Waveform::Square {
                amplitude,
                frequency,
                offset,
                duty,
            } => {
                let cycle = (t * frequency).rem_euclid(1.0);
                if cycle < duty {
                    offset + amplitude
                } else {
                    offset - amplitude
                }
            }
        }
    }

    /// Whether the value is the same at every instant.
    pub fn is_constant(&self) -> bool {
        matches!(self, Waveform::Dc(_))
    }
}

/// A voltage source component.
///
/// Voltage sources require an extra row/column in the MNA matrix for the
/// branch current. The source enforces: V+ - V- = V_source
#[derive(Debug, Clone)]
pub struct VoltageSource {
    pub name: String,
    pub terminals: Terminals, // [positive, negative]
    pub waveform: Waveform,
    /// Branch current from the latest solve (into the positive terminal)
    current: f64,
}

impl VoltageSource {
    /// Create a new voltage source.
    pub fn new(
        name: impl Into<String>,
        pos: impl Into<ConnectionPoint>,
        neg: impl Into<ConnectionPoint>,
        waveform: Waveform,
    ) -> Self {
        Self {
            name: name.into(),
            terminals: Terminals::new([pos.into(), neg.into()]),
            waveform,
            current: 0.0,
        }
    }

    /// Create a constant voltage source.
    pub fn dc(
        name: impl Into<String>,
        pos: impl Into<ConnectionPoint>,
        neg: impl Into<ConnectionPoint>,
        voltage: f64,
    ) -> Self {
        Self::new(name, pos, neg, Waveform::Dc(voltage))
    }

    /// Source voltage at time `t`.
    pub fn voltage(&self, t: f64) -> f64 {
        self.waveform.value(t)
    }

    /// Set a constant value. The simulator must restamp afterwards.
    pub fn set_value(&mut self, voltage: f64) {
        self.waveform = Waveform::Dc(voltage);
    }
}

impl Element for VoltageSource {
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

    fn ground_reference(&self) -> Option<usize> {
        Some(1)
    }

    fn stamp(&self, matrix: &mut MnaMatrix, _ctx: &StepContext) {
        let aux = self.terminals.aux(0);
        let value = match self.waveform {
            Waveform::Dc(v) => v,
            _ => 0.0,
        };
        matrix.stamp_voltage_source(self.terminals.node(0), self.terminals.node(1), aux, value);
        if !self.waveform.is_constant() {
            let row = matrix.aux_row(aux);
            matrix.mark_rhs_changes(row);
        }
    }

    fn do_step(&mut self, matrix: &mut MnaMatrix, ctx: &StepContext) {
        if !self.waveform.is_constant() {
            matrix.stamp_aux_rhs(self.terminals.aux(0), self.waveform.value(ctx.time));
        }
    }

    fn set_aux_current(&mut self, _k: usize, current: f64) {
        self.current = current;
    }

    fn reset(&mut self) {
        self.terminals.volts.fill(0.0);
        self.current = 0.0;
    }

    fn current(&self) -> f64 {
        self.current
    }
}

/// A current source component.
///
/// Current sources add directly to the RHS vector of the MNA equations.
#[derive(Debug, Clone)]
pub struct CurrentSource {
    pub name: String,
    pub terminals: Terminals, // current flows from terminal 0 to terminal 1 through the source
    pub value: f64,
}

impl CurrentSource {
    /// Create a new current source.
    pub fn new(
        name: impl Into<String>,
        from: impl Into<ConnectionPoint>,
        to: impl Into<ConnectionPoint>,
        current: f64,
    ) -> Self {
        Self {
            name: name.into(),
            terminals: Terminals::new([from.into(), to.into()]),
            value: current,
        }
    }

    /// Set the source value. The simulator must restamp afterwards.
    pub fn set_value(&mut self, current: f64) {
        self.value = current;
    }
}

impl Element for CurrentSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn terminals(&self) -> &Terminals {
        &self.terminals
    }

    fn terminals_mut(&mut self) -> &mut Terminals {
        &mut self.terminals
    }

    fn conducts(&self, _a: usize, _b: usize) -> bool {
        false
    }

    fn stamp(&self, matrix: &mut MnaMatrix, _ctx: &StepContext) {
        matrix.stamp_current_source(self.terminals.node(0), self.terminals.node(1), self.value);
    }

    fn current(&self) -> f64 {
        self.value
    }
}
