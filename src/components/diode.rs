//! Diode model.
//!
//! Uses the Shockley diode equation:
//!   I = Is * (exp(V / (n * Vt)) - 1)
//!
//! For Newton-Raphson iteration, we linearize around the current operating point:
//!   I ≈ I0 + G_d * (V - V0)
//!
//! where G_d = dI/dV = Is/(n*Vt) * exp(V0/(n*Vt))
//!
//! An optional series resistance puts the junction behind an internal node.

use super::{Element, StepContext, Terminals};
use crate::circuit::ConnectionPoint;
use crate::solver::MnaMatrix;
use crate::THERMAL_VOLTAGE;

/// Floor on the junction conductance so the row never empties.
const MIN_CONDUCTANCE: f64 = 1e-12;

/// Parameters for a diode model.
#[derive(Debug, Clone, PartialEq)]
pub struct DiodeParams {
    /// Saturation current (Is), typically 1e-14 to 1e-12 A
    pub is: f64,
    /// Ideality factor (n), typically 1.0 to 2.0
    pub n: f64,
    /// Voltage above which the exponential is continued linearly
    pub v_crit: f64,
}

impl Default for DiodeParams {
    fn default() -> Self {
        Self {
            is: 1e-14,
            n: 1.0,
            v_crit: 0.7, // About 27 * Vt
        }
    }
}

impl DiodeParams {
    /// Germanium diode (lower forward voltage).
    pub fn germanium() -> Self {
        Self {
            is: 1e-9,
            n: 1.5,
            v_crit: 0.5,
        }
    }

    /// LED with the given forward voltage (red ~1.8V, green ~2.2V, blue ~3.3V).
    pub fn led(forward_voltage: f64) -> Self {
        Self {
            is: 1e-18,
            n: 2.0,
            v_crit: forward_voltage,
        }
    }

    /// Thermal voltage times ideality factor.
    pub fn n_vt(&self) -> f64 {
        self.n * THERMAL_VOLTAGE
    }
}

/// A diode component.
#[derive(Debug, Clone)]
pub struct Diode {
    pub name: String,
    pub terminals: Terminals, // [anode, cathode, (junction anode)]
    pub params: DiodeParams,
    /// Series resistance, 0 for none
    pub series_resistance: f64,
    /// Current operating point voltage (for Newton-Raphson)
    pub v_op: f64,
}

impl Diode {
    /// Create a new diode.
    pub fn new(
        name: impl Into<String>,
        anode: impl Into<ConnectionPoint>,
        cathode: impl Into<ConnectionPoint>,
        params: DiodeParams,
    ) -> Self {
        Self::with_series_resistance(name, anode, cathode, params, 0.0)
    }

    /// Create a diode with a series resistance between the anode and the
    /// junction.
    pub fn with_series_resistance(
        name: impl Into<String>,
        anode: impl Into<ConnectionPoint>,
        cathode: impl Into<ConnectionPoint>,
        params: DiodeParams,
        series_resistance: f64,
    ) -> Self {
        Self {
            name: name.into(),
            terminals: Terminals::new([anode.into(), cathode.into()]),
            params,
            series_resistance: series_resistance.max(0.0),
            v_op: 0.0,
        }
    }

    fn has_series_resistance(&self) -> bool {
        self.series_resistance > 0.0
    }

    /// Slot on the anode side of the junction.
    fn junction_slot(&self) -> usize {
        if self.has_series_resistance() {
            2
        } else {
            0
        }
    }

    /// Voltage across the junction from the last distribution.
    pub fn junction_voltage(&self) -> f64 {
        self.terminals.volt(self.junction_slot()) - self.terminals.volt(1)
    }

    /// Calculate the diode current at a given voltage.
    pub fn current_at(&self, v: f64) -> f64 {
        let n_vt = self.params.n_vt();

        // Limit voltage to prevent overflow
        let v_limited = v.min(self.params.v_crit * 2.0);

        if v_limited > self.params.v_crit {
            // Linear extrapolation for high forward bias
            let i_crit = self.params.is * ((self.params.v_crit / n_vt).exp() - 1.0);
            let g_crit = self.params.is / n_vt * (self.params.v_crit / n_vt).exp();
            i_crit + g_crit * (v_limited - self.params.v_crit)
        } else if v_limited < -5.0 * n_vt {
            // Deep reverse bias - just use saturation current
            -self.params.is
        } else {
            self.params.is * ((v_limited / n_vt).exp() - 1.0)
        }
    }

    /// Calculate the conductance (dI/dV) at a given voltage.
    pub fn conductance(&self, v: f64) -> f64 {
        let n_vt = self.params.n_vt();
        let v_limited = v.min(self.params.v_crit * 2.0);

        if v_limited > self.params.v_crit {
            self.params.is / n_vt * (self.params.v_crit / n_vt).exp()
        } else if v_limited < -5.0 * n_vt {
            MIN_CONDUCTANCE
        } else {
            // dI/dV = Is/(n*Vt) * exp(V/(n*Vt))
            self.params.is / n_vt * (v_limited / n_vt).exp()
        }
    }

    /// Linearized model at an operating point.
    /// Returns (conductance G, equivalent current source I_eq)
    /// such that I = G * V + I_eq
    pub fn linearize(&self, v_op: f64) -> (f64, f64) {
        let g = self.conductance(v_op);
        let i = self.current_at(v_op);
        let i_eq = i - g * v_op;
        (g.max(MIN_CONDUCTANCE), i_eq)
    }

    /// Limit voltage step for Newton-Raphson convergence.
    ///
    /// Steps up to the critical voltage are allowed, which keeps the
    /// exponential in range without slowing convergence much.
    pub fn limit_voltage_step(&self, v_old: f64, v_new: f64) -> f64 {
        let max_step = self.params.v_crit.max(0.5);
        v_new.clamp(v_old - max_step, v_old + max_step)
    }
}

impl Element for Diode {
    fn name(&self) -> &str {
        &self.name
    }

    fn terminals(&self) -> &Terminals {
        &self.terminals
    }

    fn terminals_mut(&mut self) -> &mut Terminals {
        &mut self.terminals
    }

    fn internal_node_count(&self) -> usize {
        usize::from(self.has_series_resistance())
    }

    fn is_nonlinear(&self) -> bool {
        true
    }

    fn stamp(&self, matrix: &mut MnaMatrix, _ctx: &StepContext) {
        let t = &self.terminals;
        let junction = t.node(self.junction_slot());
        if self.has_series_resistance() {
            matrix.stamp_resistor(t.node(0), junction, self.series_resistance);
        }
        matrix.mark_node_nonlinear(junction);
        matrix.mark_node_nonlinear(t.node(1));
    }

    fn do_step(&mut self, matrix: &mut MnaMatrix, _ctx: &StepContext) {
        let v = self.limit_voltage_step(self.v_op, self.junction_voltage());
        let (g, i_eq) = self.linearize(v);
        self.v_op = v;

        let anode = self.terminals.node(self.junction_slot());
        let cathode = self.terminals.node(1);
        matrix.stamp_conductance(anode, cathode, g);
        matrix.stamp_current_source(anode, cathode, i_eq);
    }

    fn reset(&mut self) {
        self.terminals.volts.fill(0.0);
        self.v_op = 0.0;
    }

    fn warm_start(&self) -> &[f64] {
        std::slice::from_ref(&self.v_op)
    }

    fn set_warm_start(&mut self, state: &[f64]) {
        if let Some(&v) = state.first() {
            self.v_op = v;
        }
    }

    fn current(&self) -> f64 {
        self.current_at(self.junction_voltage())
    }
}
