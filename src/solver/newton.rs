//! Newton-Raphson iteration for nonlinear elements.
//!
//! One timestep is: stamp, reduce, factor and solve, distribute the solution
//! back to element terminals, then compare the nonlinear elements' terminal
//! voltages against the previous iteration. Purely linear circuits skip the
//! loop and reuse one factorization until the next linear restamp.

use std::collections::HashMap;

use log::trace;

use crate::circuit::{AuxId, Circuit, NodeId, NodeTable, TerminalLink, VarIndex};
use crate::components::StepContext;
use crate::error::{Result, SimError};

use super::lu::{FactorError, LuFactors};
use super::mna::MnaMatrix;
use super::simplify::Reduction;
use super::DEFAULT_MAX_ITERATIONS;

/// Adaptive convergence threshold.
///
/// Tight while the iteration is young, looser as it drags on, so a circuit
/// dithering around a stable point does not loop forever.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvergencePolicy {
    /// Iterations run at `early_tolerance`
    pub early_iterations: usize,
    /// Iterations before switching to `late_tolerance`
    pub late_iterations: usize,
    /// Relative tolerance for the first band
    pub early_tolerance: f64,
    /// Relative tolerance between the bands
    pub mid_tolerance: f64,
    /// Relative tolerance past the second band
    pub late_tolerance: f64,
    /// Differences below this (volts) always count as converged
    pub absolute_floor: f64,
}

impl Default for ConvergencePolicy {
    fn default() -> Self {
        Self {
            early_iterations: 10,
            late_iterations: 100,
            early_tolerance: 0.001,
            mid_tolerance: 0.01,
            late_tolerance: 0.1,
            absolute_floor: 1e-6,
        }
    }
}

impl ConvergencePolicy {
    /// Relative tolerance at a given subiteration.
    pub fn relative_tolerance(&self, iteration: usize) -> f64 {
        if iteration < self.early_iterations {
            self.early_tolerance
        } else if iteration < self.late_iterations {
            self.mid_tolerance
        } else {
            self.late_tolerance
        }
    }

    /// Whether a voltage moving from `old` to `new` has settled.
    pub fn is_converged(&self, old: f64, new: f64, iteration: usize) -> bool {
        let diff = (new - old).abs();
        let scale = new.abs().max(old.abs());
        diff <= self.absolute_floor.max(self.relative_tolerance(iteration) * scale)
    }
}

/// Externally computed node voltages that replace solved values during
/// distribution.
pub trait VoltageOverride {
    /// Voltage to report for `node`, or `None` to keep the solved value.
    fn node_voltage(&self, node: NodeId) -> Option<f64>;
}

impl VoltageOverride for HashMap<NodeId, f64> {
    fn node_voltage(&self, node: NodeId) -> Option<f64> {
        self.get(&node).copied()
    }
}

/// Broadcast a solution to every terminal link.
///
/// Ground always receives exactly 0 V and cannot be overridden.
pub fn distribute<F>(x: &[f64], table: &NodeTable, overrides: Option<&dyn VoltageOverride>, mut sink: F)
where
    F: FnMut(TerminalLink, f64),
{
    let num_nodes = table.node_count();
    for (id, node) in table.iter() {
        let voltage = if id.is_ground() {
            0.0
        } else {
            overrides
                .and_then(|o| o.node_voltage(id))
                .unwrap_or_else(|| x[VarIndex::Voltage(id).to_index(num_nodes)])
        };
        for &link in &node.links {
            sink(link, voltage);
        }
    }
}

/// Push a solution into the circuit: terminal voltages and auxiliary
/// currents.
pub fn distribute_to_circuit(
    x: &[f64],
    table: &NodeTable,
    overrides: Option<&dyn VoltageOverride>,
    circuit: &mut Circuit,
) {
    distribute(x, table, overrides, |link, v| {
        if let Some(element) = circuit.get_mut(link.element) {
            element.set_terminal_voltage(link.terminal, v);
        }
    });

    let num_nodes = table.node_count();
    for (k, link) in table.aux_links().iter().enumerate() {
        let value = x[VarIndex::Current(AuxId(k)).to_index(num_nodes)];
        if let Some(element) = circuit.get_mut(link.element) {
            element.set_aux_current(link.terminal, value);
        }
    }
}

/// The stamped MNA system for one analysis pass, with its reduction plan and
/// cached factors.
#[derive(Debug, Clone)]
pub struct MnaSystem {
    matrix: MnaMatrix,
    reduction: Reduction,
    factors: LuFactors,
    /// Factors match the current linear stamp
    factored: bool,
    nonlinear: bool,
    simplify: bool,
    /// Nodes tied to ground because nothing else reaches them
    ties: Vec<NodeId>,
    tie_conductance: f64,
}

impl MnaSystem {
    /// Allocate a system sized for `table`.
    pub fn new(table: &NodeTable, ties: Vec<NodeId>, tie_resistance: f64, simplify: bool) -> Self {
        let matrix = MnaMatrix::new(table.node_count(), table.aux_count());
        let size = matrix.size;
        Self {
            matrix,
            reduction: Reduction::identity(size),
            factors: LuFactors::default(),
            factored: false,
            nonlinear: false,
            simplify,
            ties,
            tie_conductance: 1.0 / tie_resistance,
        }
    }

    /// Full system dimension.
    pub fn size(&self) -> usize {
        self.matrix.size
    }

    /// Dimension actually factored.
    pub fn reduced_size(&self) -> usize {
        self.reduction.reduced_size()
    }

    /// Whether any element re-linearizes per iteration.
    pub fn is_nonlinear(&self) -> bool {
        self.nonlinear
    }

    /// Nodes auto-tied to ground.
    pub fn ties(&self) -> &[NodeId] {
        &self.ties
    }

    /// Latest full solution.
    pub fn solution(&self) -> &[f64] {
        &self.matrix.x
    }

    /// Overwrite the solution (restoring a saved state).
    pub fn set_solution(&mut self, x: &[f64]) {
        if x.len() == self.matrix.x.len() {
            self.matrix.x.copy_from_slice(x);
        }
    }

    fn stamp_elements(&mut self, circuit: &Circuit, ctx: &StepContext) {
        for element in circuit.elements() {
            element.stamp(&mut self.matrix, ctx);
        }
        for &node in &self.ties {
            self.matrix.stamp_conductance(node, NodeId::GROUND, self.tie_conductance);
        }
    }

    /// Linear stamp pass. Re-run whenever the timestep or an element's
    /// parameters change; invalidates the cached factors and re-plans the
    /// reduction.
    pub fn stamp_linear(&mut self, circuit: &Circuit, ctx: &StepContext) {
        self.matrix.clear();
        self.matrix.clear_flags();
        self.stamp_elements(circuit, ctx);
        self.matrix.save_rhs_base();

        self.nonlinear = circuit.elements().iter().any(|e| e.is_nonlinear());
        self.reduction = if self.simplify {
            Reduction::plan(&self.matrix)
        } else {
            Reduction::identity(self.matrix.size)
        };
        self.factored = false;
    }

    /// Rebuild the right-hand side for a linear step.
    fn stamp_step(&mut self, circuit: &mut Circuit, ctx: &StepContext) {
        self.matrix.restore_rhs_base();
        for element in circuit.elements_mut() {
            element.do_step(&mut self.matrix, ctx);
        }
    }

    /// Zero and restamp everything for one nonlinear iteration.
    fn stamp_iteration(&mut self, circuit: &mut Circuit, ctx: &StepContext) {
        self.matrix.clear();
        self.stamp_elements(circuit, ctx);
        for element in circuit.elements_mut() {
            element.do_step(&mut self.matrix, ctx);
        }
    }

    /// Reduce, factor (unless the cached factors are still valid) and solve.
    fn solve(&mut self, circuit: &Circuit, table: &NodeTable) -> Result<()> {
        self.reduction.apply(&self.matrix.a, &self.matrix.rhs);

        if self.nonlinear || !self.factored {
            let m = self.reduction.reduced_size();
            if let Err(err) = self.factors.refactor(self.reduction.matrix(), m) {
                self.factored = false;
                return Err(self.factor_error(err, circuit, table));
            }
            self.factored = !self.nonlinear;
        }

        self.factors.solve(self.reduction.rhs_mut());
        self.reduction.expand(&mut self.matrix.x);

        if let Some(row) = self.matrix.x.iter().position(|v| !v.is_finite()) {
            self.factored = false;
            return Err(SimError::SingularMatrix {
                row,
                location: table.describe(row, circuit),
            });
        }
        Ok(())
    }

    /// Map a reduced-system failure back to the full system.
    fn factor_error(&self, err: FactorError, circuit: &Circuit, table: &NodeTable) -> SimError {
        match err {
            FactorError::ZeroRow(r) => {
                let row = self.reduction.original_row(r);
                SimError::EmptyMatrixRow {
                    row,
                    location: table.describe(row, circuit),
                }
            }
            FactorError::SingularAt(c) => {
                let row = self.reduction.original_col(c);
                SimError::SingularMatrix {
                    row,
                    location: table.describe(row, circuit),
                }
            }
        }
    }
}

/// Newton-Raphson solver for nonlinear circuits.
#[derive(Debug, Clone)]
pub struct NewtonRaphson {
    /// Maximum iterations per timestep
    pub max_iterations: usize,
    /// Convergence threshold policy
    pub policy: ConvergencePolicy,
    /// Nonlinear terminal voltages from the previous iteration
    previous: Vec<f64>,
}

impl Default for NewtonRaphson {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ITERATIONS, ConvergencePolicy::default())
    }
}

impl NewtonRaphson {
    pub fn new(max_iterations: usize, policy: ConvergencePolicy) -> Self {
        Self {
            max_iterations,
            policy,
            previous: Vec::new(),
        }
    }

    /// Solve one timestep and commit it.
    ///
    /// Elements start from their last distributed voltages. On success every
    /// element's `step_finished` hook has run and the number of iterations
    /// used is returned. On failure no element state is committed. Nonlinear
    /// circuits take at least two iterations per step.
    pub fn run_timestep(
        &mut self,
        system: &mut MnaSystem,
        circuit: &mut Circuit,
        table: &NodeTable,
        overrides: Option<&dyn VoltageOverride>,
        ctx: StepContext,
    ) -> Result<usize> {
        if !system.is_nonlinear() {
            system.stamp_step(circuit, &ctx);
            system.solve(circuit, table)?;
            distribute_to_circuit(system.solution(), table, overrides, circuit);
            commit(circuit, &ctx);
            return Ok(1);
        }

        let mut residual = 0.0;
        for iter in 0..self.max_iterations {
            let ctx = StepContext {
                subiteration: iter,
                ..ctx
            };

            system.stamp_iteration(circuit, &ctx);
            system.solve(circuit, table)?;

            self.snapshot(circuit);
            distribute_to_circuit(system.solution(), table, overrides, circuit);
            let (converged, worst) = self.check(circuit, iter);
            residual = worst;
            trace!("t={:.6e} iteration {}: max delta {:.3e}", ctx.time, iter, worst);

            // Iteration 0 only compares against the warm start
            if converged && iter > 0 {
                commit(circuit, &ctx);
                return Ok(iter + 1);
            }
        }

        Err(SimError::convergence_failure(self.max_iterations, residual))
    }

    fn snapshot(&mut self, circuit: &Circuit) {
        self.previous.clear();
        for element in circuit.elements().iter().filter(|e| e.is_nonlinear()) {
            self.previous.extend_from_slice(&element.terminals().volts);
        }
    }

    /// Compare distributed voltages against the snapshot. Returns whether all
    /// settled and the largest change seen.
    fn check(&self, circuit: &Circuit, iteration: usize) -> (bool, f64) {
        let mut converged = true;
        let mut worst = 0.0f64;
        let current = circuit
            .elements()
            .iter()
            .filter(|e| e.is_nonlinear())
            .flat_map(|e| e.terminals().volts.iter().copied());

        for (&old, new) in self.previous.iter().zip(current) {
            worst = worst.max((new - old).abs());
            if !self.policy.is_converged(old, new, iteration) {
                converged = false;
            }
        }
        (converged, worst)
    }
}

fn commit(circuit: &mut Circuit, ctx: &StepContext) {
    for element in circuit.elements_mut() {
        element.step_finished(ctx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{Diode, DiodeParams, Resistor, VoltageSource};
    use approx::assert_relative_eq;

    #[test]
    fn test_policy_bands() {
        let p = ConvergencePolicy::default();
        assert_eq!(p.relative_tolerance(0), 0.001);
        assert_eq!(p.relative_tolerance(10), 0.01);
        assert_eq!(p.relative_tolerance(150), 0.1);

        assert!(p.is_converged(1.0, 1.0005, 0));
        assert!(!p.is_converged(1.0, 1.005, 0));
        assert!(p.is_converged(1.0, 1.005, 20));
        // Absolute floor near zero
        assert!(p.is_converged(0.0, 5e-7, 0));
    }

    #[test]
    fn test_distribute_respects_ground_and_overrides() {
        let mut circuit = Circuit::new();
        circuit.add(VoltageSource::dc("V1", "a", "0", 5.0));
        circuit.add(Resistor::new("R1", "a", "b", 1000.0));
        circuit.add(Resistor::new("R2", "b", "0", 1000.0));
        let table = NodeTable::build(&mut circuit);

        let x = [5.0, 2.5, -0.0025];
        let mut overrides = HashMap::new();
        overrides.insert(NodeId(2), 1.0);
        overrides.insert(NodeId::GROUND, 9.0);

        let mut seen = Vec::new();
        let lookup: &dyn VoltageOverride = &overrides;
        distribute(&x, &table, Some(lookup), |link, v| seen.push((link, v)));

        for (link, v) in seen {
            let node = circuit.get(link.element).unwrap().terminal_node(link.terminal);
            match node.0 {
                0 => assert_eq!(v, 0.0),
                1 => assert_eq!(v, 5.0),
                2 => assert_eq!(v, 1.0),
                _ => unreachable!(),
            }
        }
    }

    #[test]
    fn test_diode_timestep_converges() {
        let mut circuit = Circuit::new();
        circuit.add(VoltageSource::dc("V1", "in", "0", 5.0));
        circuit.add(Resistor::new("R1", "in", "a", 1000.0));
        let d = circuit.add(Diode::new("D1", "a", "0", DiodeParams::default()));
        let table = NodeTable::build(&mut circuit);

        let ctx = StepContext::new(1e-5, 1e-5);
        let mut system = MnaSystem::new(&table, Vec::new(), 1e9, true);
        system.stamp_linear(&circuit, &ctx);
        assert!(system.is_nonlinear());

        let mut newton = NewtonRaphson::default();
        let iterations = newton.run_timestep(&mut system, &mut circuit, &table, None, ctx).unwrap();
        assert!(iterations > 1 && iterations < 100);

        let va = circuit.get(d).unwrap().terminal_voltage(0);
        assert!(va > 0.6 && va < 0.75, "diode drop {va}");
        // Current through resistor matches diode current
        let i = circuit.get(d).unwrap().current();
        assert_relative_eq!(i, (5.0 - va) / 1000.0, max_relative = 0.01);
    }

    #[test]
    fn test_settled_nonlinear_step_iterates_past_the_warm_start() {
        let mut circuit = Circuit::new();
        circuit.add(VoltageSource::dc("V1", "in", "0", 5.0));
        circuit.add(Resistor::new("R1", "in", "a", 1000.0));
        circuit.add(Diode::new("D1", "a", "0", DiodeParams::default()));
        let table = NodeTable::build(&mut circuit);

        let ctx = StepContext::new(1e-5, 1e-5);
        let mut system = MnaSystem::new(&table, Vec::new(), 1e9, true);
        system.stamp_linear(&circuit, &ctx);
        let mut newton = NewtonRaphson::default();
        for _ in 0..3 {
            newton.run_timestep(&mut system, &mut circuit, &table, None, ctx).unwrap();
        }

        // Warm start already sits on the operating point
        let iterations = newton.run_timestep(&mut system, &mut circuit, &table, None, ctx).unwrap();
        assert!((2..5).contains(&iterations), "{iterations} iterations");
    }
}
