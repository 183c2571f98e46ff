//! Operational amplifier model.
//!
//! A finite-gain linear model: the output is a voltage-controlled current
//! source into the output node, loaded by the output resistance, so that
//! Vout = A * (V+ - V-) with no load attached.

use super::{Element, StepContext, Terminals};
use crate::circuit::{ConnectionPoint, NodeId};
use crate::solver::MnaMatrix;

/// Parameters for an op-amp model.
#[derive(Debug, Clone, PartialEq)]
pub struct OpAmpParams {
    /// Open-loop DC gain (A_OL)
    pub gain: f64,
    /// Output resistance (R_out)
    pub r_out: f64,
    /// Input resistance (R_in)
    pub r_in: f64,
}

impl Default for OpAmpParams {
    fn default() -> Self {
        Self::ideal()
    }
}

impl OpAmpParams {
    /// Near-ideal op-amp. The gain stays finite to keep the matrix well
    /// conditioned.
    pub fn ideal() -> Self {
        Self {
            gain: 1e6,
            r_out: 1.0,
            r_in: 1e12,
        }
    }

    /// Typical 741-style op-amp.
    pub fn ua741() -> Self {
        Self {
            gain: 2e5, // 200,000 open-loop gain
            r_out: 75.0,
            r_in: 2e6,
        }
    }

    /// Typical TL072-style JFET op-amp.
    pub fn tl072() -> Self {
        Self {
            gain: 2e5,
            r_out: 100.0,
            r_in: 1e12,
        }
    }
}

/// An operational amplifier component.
#[derive(Debug, Clone)]
pub struct OpAmp {
    pub name: String,
    pub terminals: Terminals, // [output, non-inverting (+), inverting (-)]
    pub params: OpAmpParams,
}

impl OpAmp {
    /// Create a new op-amp.
    pub fn new(
        name: impl Into<String>,
        output: impl Into<ConnectionPoint>,
        input_pos: impl Into<ConnectionPoint>,
        input_neg: impl Into<ConnectionPoint>,
        params: OpAmpParams,
    ) -> Self {
        Self {
            name: name.into(),
            terminals: Terminals::new([output.into(), input_pos.into(), input_neg.into()]),
            params,
        }
    }

    /// Unloaded output for the given input voltages.
    pub fn open_loop_output(&self, v_pos: f64, v_neg: f64) -> f64 {
        self.params.gain * (v_pos - v_neg)
    }

    /// Effective transconductance: I_out = gm * (V+ - V-)
    pub fn transconductance(&self) -> f64 {
        self.params.gain / self.params.r_out
    }

    pub fn input_conductance(&self) -> f64 {
        1.0 / self.params.r_in
    }

    pub fn output_conductance(&self) -> f64 {
        1.0 / self.params.r_out
    }
}

impl Element for OpAmp {
    fn name(&self) -> &str {
        &self.name
    }

    fn terminals(&self) -> &Terminals {
        &self.terminals
    }

    fn terminals_mut(&mut self) -> &mut Terminals {
        &mut self.terminals
    }

    /// Only the two inputs see each other (through R_in).
    fn conducts(&self, a: usize, b: usize) -> bool {
        a != 0 && b != 0
    }

    fn has_ground_connection(&self, slot: usize) -> bool {
        slot == 0
    }

    fn stamp(&self, matrix: &mut MnaMatrix, _ctx: &StepContext) {
        let t = &self.terminals;
        let (out, inp, inn) = (t.node(0), t.node(1), t.node(2));

        // Current gm*(V+ - V-) pushed from ground into the output node
        matrix.stamp_vccs(NodeId::GROUND, out, inp, inn, self.transconductance());
        matrix.stamp_conductance(out, NodeId::GROUND, self.output_conductance());
        matrix.stamp_conductance(inp, inn, self.input_conductance());
    }

    /// Current delivered by the output into the load.
    fn current(&self) -> f64 {
        let t = &self.terminals;
        (self.open_loop_output(t.volt(1), t.volt(2)) - t.volt(0)) * self.output_conductance()
    }
}
