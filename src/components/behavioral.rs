//! Behavioral voltage source.
//!
//! Drives its output to `f(inputs)` for an arbitrary transfer function. The
//! function is linearized each iteration by numerical differentiation:
//!
//!   V_out - sum(dF/dV_i * V_i) = F(V) - sum(dF/dV_i * V_i)
//!
//! Each partial derivative is a backward difference whose step is the change
//! of that input since the previous iteration.

use std::fmt;
use std::sync::Arc;

use super::{Element, StepContext, Terminals};
use crate::circuit::{ConnectionPoint, NodeId};
use crate::solver::MnaMatrix;

/// Transfer function of a [`Behavioral`] source.
pub type TransferFn = Arc<dyn Fn(&[f64]) -> f64 + Send + Sync>;

/// Smallest differentiation step.
const MIN_STEP: f64 = 1e-6;
/// Bounds on the magnitude of a partial derivative.
const MIN_DERIVATIVE: f64 = 1e-6;
const MAX_DERIVATIVE: f64 = 1e6;

/// A voltage source from the output terminal to ground, controlled by a
/// function of the input terminal voltages.
#[derive(Clone)]
pub struct Behavioral {
    pub name: String,
    pub terminals: Terminals, // [inputs..., output]
    function: TransferFn,
    last_inputs: Vec<f64>,
    scratch: Vec<f64>,
    output: f64,
    current: f64,
}

impl fmt::Debug for Behavioral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Behavioral")
            .field("name", &self.name)
            .field("terminals", &self.terminals)
            .field("output", &self.output)
            .finish_non_exhaustive()
    }
}

impl Behavioral {
    /// Create a behavioral source.
    pub fn new<I, P>(
        name: impl Into<String>,
        inputs: I,
        output: impl Into<ConnectionPoint>,
        function: impl Fn(&[f64]) -> f64 + Send + Sync + 'static,
    ) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<ConnectionPoint>,
    {
        let mut points: Vec<ConnectionPoint> = inputs.into_iter().map(Into::into).collect();
        let input_count = points.len();
        points.push(output.into());
        Self {
            name: name.into(),
            terminals: Terminals::new(points),
            function: Arc::new(function),
            last_inputs: vec![0.0; input_count],
            scratch: vec![0.0; input_count],
            output: 0.0,
            current: 0.0,
        }
    }

    /// Output = a * b
    pub fn multiplier(
        name: impl Into<String>,
        a: impl Into<ConnectionPoint>,
        b: impl Into<ConnectionPoint>,
        output: impl Into<ConnectionPoint>,
    ) -> Self {
        let inputs: [ConnectionPoint; 2] = [a.into(), b.into()];
        Self::new(name, inputs, output, |v: &[f64]| v[0] * v[1])
    }

    /// Output = a / b, held at zero when b vanishes.
    pub fn divider(
        name: impl Into<String>,
        a: impl Into<ConnectionPoint>,
        b: impl Into<ConnectionPoint>,
        output: impl Into<ConnectionPoint>,
    ) -> Self {
        let inputs: [ConnectionPoint; 2] = [a.into(), b.into()];
        Self::new(name, inputs, output, |v: &[f64]| {
            if v[1] == 0.0 {
                0.0
            } else {
                v[0] / v[1]
            }
        })
    }

    /// Number of input terminals.
    pub fn input_count(&self) -> usize {
        self.last_inputs.len()
    }

    fn output_slot(&self) -> usize {
        self.input_count()
    }

    /// Function value from the last iteration.
    pub fn output_value(&self) -> f64 {
        self.output
    }

    /// Evaluate the transfer function directly.
    pub fn evaluate(&self, inputs: &[f64]) -> f64 {
        (self.function)(inputs)
    }
}

/// Clamp a derivative into `[MIN_DERIVATIVE, MAX_DERIVATIVE]` in magnitude,
/// keeping its sign.
fn clamp_derivative(dx: f64) -> f64 {
    if !dx.is_finite() {
        return if dx.is_nan() {
            MIN_DERIVATIVE
        } else {
            MAX_DERIVATIVE.copysign(dx)
        };
    }
    dx.abs().clamp(MIN_DERIVATIVE, MAX_DERIVATIVE).copysign(dx)
}

impl Element for Behavioral {
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

    fn is_nonlinear(&self) -> bool {
        true
    }

    /// Inputs are high impedance.
    fn conducts(&self, _a: usize, _b: usize) -> bool {
        false
    }

    fn has_ground_connection(&self, slot: usize) -> bool {
        slot == self.output_slot()
    }

    fn stamp(&self, matrix: &mut MnaMatrix, _ctx: &StepContext) {
        let aux = self.terminals.aux(0);
        matrix.stamp_voltage_source(self.terminals.node(self.output_slot()), NodeId::GROUND, aux, 0.0);
        let row = matrix.aux_row(aux);
        matrix.mark_nonlinear(row);
        matrix.mark_rhs_changes(row);
    }

    fn do_step(&mut self, matrix: &mut MnaMatrix, _ctx: &StepContext) {
        let n = self.input_count();
        let aux = self.terminals.aux(0);
        self.scratch.copy_from_slice(&self.terminals.volts[..n]);
        let f0 = (self.function)(&self.scratch);
        let mut rhs = f0;

        for i in 0..n {
            let v = self.terminals.volts[i];
            let mut dv = v - self.last_inputs[i];
            if dv.abs() < MIN_STEP {
                dv = MIN_STEP;
            }

            self.scratch[i] = v - dv;
            let f_back = (self.function)(&self.scratch);
            self.scratch[i] = v;

            let dx = clamp_derivative((f0 - f_back) / dv);
            matrix.stamp_aux_coefficient(aux, self.terminals.node(i), -dx);
            rhs -= dx * v;
        }

        matrix.stamp_aux_rhs(aux, rhs);
        self.last_inputs.copy_from_slice(&self.terminals.volts[..n]);
        self.output = f0;
    }

    fn set_aux_current(&mut self, _k: usize, current: f64) {
        self.current = current;
    }

    fn reset(&mut self) {
        self.terminals.volts.fill(0.0);
        self.last_inputs.fill(0.0);
        self.output = 0.0;
        self.current = 0.0;
    }

    fn warm_start(&self) -> &[f64] {
        &self.last_inputs
    }

    fn set_warm_start(&mut self, state: &[f64]) {
        if state.len() == self.last_inputs.len() {
            self.last_inputs.copy_from_slice(state);
        }
    }

    fn current(&self) -> f64 {
        self.current
    }
}
