//! End-to-end tests driving whole circuits through the simulator.

use std::collections::HashMap;

use approx::assert_relative_eq;
use voltaic_core::circuit::ConnectionPoint;
use voltaic_core::components::{
    Behavioral, Capacitor, CurrentSource, Diode, DiodeParams, Element, OpAmp, OpAmpParams, Resistor, StepContext,
    Switch, Terminals, VoltageSource,
};
use voltaic_core::solver::MnaMatrix;
use voltaic_core::{presets, Circuit, SimError, SimStatus, Simulator, SimulatorConfig};

const FRAME: f64 = 1.0 / 60.0;

fn volts(sim: &Simulator, point: &str) -> f64 {
    sim.node_voltage(point)
        .unwrap_or_else(|| panic!("no voltage at {point}"))
}

#[test]
fn test_ohms_law_current_into_resistor() {
    let mut sim = Simulator::new(presets::find("ohm").unwrap().build());
    sim.advance(FRAME).unwrap();
    assert_relative_eq!(volts(&sim, "n1"), 10.0, epsilon = 1e-9);
    assert_eq!(sim.status(), &SimStatus::Ok);
}

#[test]
fn test_voltage_divider() {
    let mut sim = Simulator::new(presets::find("divider").unwrap().build());
    let report = sim.advance(FRAME).unwrap();
    assert!(report.steps > 0);
    assert_relative_eq!(volts(&sim, "n1"), 5.0, epsilon = 1e-9);
    assert_relative_eq!(volts(&sim, "n2"), 2.5, epsilon = 1e-9);
}

#[test]
fn test_simplification_does_not_change_the_answer() {
    let mut plain = Simulator::with_config(
        presets::find("divider").unwrap().build(),
        SimulatorConfig::new().with_simplify(false),
    )
    .unwrap();
    let mut simplified = Simulator::new(presets::find("divider").unwrap().build());
    plain.advance(FRAME).unwrap();
    simplified.advance(FRAME).unwrap();

    assert!(simplified.reduced_size().unwrap() < plain.reduced_size().unwrap());
    assert_relative_eq!(volts(&plain, "n2"), volts(&simplified, "n2"), epsilon = 1e-9);
}

#[test]
fn test_diode_forward_bias_converges() {
    let mut circuit = Circuit::new();
    circuit.add(VoltageSource::dc("V1", "in", "0", 5.0));
    circuit.add(Resistor::new("R1", "in", "a", 1000.0));
    let d1 = circuit.add(Diode::new("D1", "a", "0", DiodeParams::default()));

    let mut sim = Simulator::new(circuit);
    sim.advance(FRAME).unwrap();

    let vd = volts(&sim, "a");
    assert!(vd > 0.6 && vd < 0.75, "diode drop {vd}");
    assert!(sim.iterations() >= 1);

    // KCL at the anode
    let i_r = (5.0 - vd) / 1000.0;
    let i_d = sim.element(d1).unwrap().current();
    assert_relative_eq!(i_r, i_d, max_relative = 1e-2);
}

#[test]
fn test_unconnected_node_is_tied_to_ground() {
    let mut sim = Simulator::new(presets::find("floating").unwrap().build());
    let report = sim.advance(FRAME).unwrap();

    assert!(report.steps > 0);
    assert!(matches!(report.status, SimStatus::UnconnectedNode { .. }));
    assert!(report.status.is_running());
    assert_eq!(sim.unconnected_nodes().len(), 2);
    assert_relative_eq!(volts(&sim, "dangling"), 0.0, epsilon = 1e-6);
    assert_relative_eq!(volts(&sim, "a"), 5.0, epsilon = 1e-9);
}

#[test]
fn test_zero_tick_is_idempotent() {
    let config = SimulatorConfig::new().with_timestep(1e-5).with_max_steps_per_frame(100);
    let mut sim = Simulator::with_config(presets::find("rc").unwrap().build(), config).unwrap();

    // A long frame hits the step cap and leaves time owed
    let report = sim.advance(FRAME).unwrap();
    assert_eq!(report.steps, 100);
    let time = sim.time();
    let v = volts(&sim, "out");

    for _ in 0..3 {
        let report = sim.advance(0.0).unwrap();
        assert_eq!(report.steps, 0);
    }
    assert_eq!(sim.time(), time);
    assert_eq!(volts(&sim, "out"), v);

    // The owed time is paid on the next real tick
    let report = sim.advance(1e-9).unwrap();
    assert_eq!(report.steps, 100);
    assert!(sim.time() > time);
}

#[test]
fn test_negative_elapsed_is_rejected() {
    let mut sim = Simulator::new(presets::find("divider").unwrap().build());
    assert!(matches!(sim.advance(-1.0), Err(SimError::InvalidSimulationParam { .. })));
    assert_eq!(sim.time(), 0.0);
}

#[test]
fn test_ground_terminals_read_zero() {
    let mut sim = Simulator::new(presets::find("rlc").unwrap().build());
    for _ in 0..5 {
        sim.advance(1e-4).unwrap();
    }

    assert_eq!(sim.node_voltage("0"), Some(0.0));
    for element in sim.circuit().elements() {
        for slot in 0..element.terminals().nodes.len() {
            if element.terminal_node(slot).is_ground() {
                assert_eq!(element.terminal_voltage(slot), 0.0, "{} slot {}", element.name(), slot);
            }
        }
    }
}

#[test]
fn test_conflicting_sources_stop_with_singular_status() {
    let mut circuit = Circuit::new();
    circuit.add(VoltageSource::dc("V1", "a", "0", 5.0));
    circuit.add(VoltageSource::dc("V2", "a", "0", 3.0));
    circuit.add(Resistor::new("R1", "a", "0", 1000.0));

    let mut sim = Simulator::new(circuit);
    let err = sim.advance(FRAME).unwrap_err();
    assert!(err.is_recoverable());
    assert!(matches!(sim.status(), SimStatus::SingularMatrix { .. }));
    assert!(!sim.status().is_running());
    assert_eq!(sim.time(), 0.0);

    // Frozen until something changes
    assert_eq!(sim.advance(FRAME).unwrap_err(), err);
    assert!(sim.stop_error().is_some());
}

#[test]
fn test_removing_the_conflict_restarts_the_simulation() {
    let mut circuit = Circuit::new();
    circuit.add(VoltageSource::dc("V1", "a", "0", 5.0));
    let v2 = circuit.add(VoltageSource::dc("V2", "a", "0", 3.0));
    circuit.add(Resistor::new("R1", "a", "0", 1000.0));

    let mut sim = Simulator::new(circuit);
    assert!(sim.advance(FRAME).is_err());

    sim.remove_element(v2).unwrap();
    sim.advance(FRAME).unwrap();
    assert_eq!(sim.status(), &SimStatus::Ok);
    assert_relative_eq!(volts(&sim, "a"), 5.0, epsilon = 1e-9);
}

#[test]
fn test_behavioral_multiplier() {
    let mut circuit = Circuit::new();
    circuit.add(VoltageSource::dc("V1", "a", "0", 2.0));
    circuit.add(VoltageSource::dc("V2", "b", "0", 3.0));
    circuit.add(Behavioral::multiplier("B1", "a", "b", "out"));
    circuit.add(Resistor::new("RL", "out", "0", 1000.0));

    let mut sim = Simulator::new(circuit);
    sim.advance(FRAME).unwrap();
    assert_relative_eq!(volts(&sim, "out"), 6.0, epsilon = 1e-3);
}

#[test]
fn test_opamp_non_inverting_gain() {
    let mut circuit = Circuit::new();
    circuit.add(VoltageSource::dc("V1", "in", "0", 1.0));
    circuit.add(OpAmp::new("U1", "out", "in", "fb", OpAmpParams::default()));
    circuit.add(Resistor::new("Rf", "out", "fb", 10_000.0));
    circuit.add(Resistor::new("Rg", "fb", "0", 10_000.0));

    let mut sim = Simulator::new(circuit);
    sim.advance(FRAME).unwrap();
    assert_relative_eq!(volts(&sim, "out"), 2.0, epsilon = 1e-3);
    assert_relative_eq!(volts(&sim, "fb"), 1.0, epsilon = 1e-3);
}

#[test]
fn test_switch_opens_and_closes() {
    let mut circuit = Circuit::new();
    circuit.add(VoltageSource::dc("V1", "in", "0", 5.0));
    let s1 = circuit.add(Switch::new("S1", "in", "a", true));
    circuit.add(Resistor::new("R1", "a", "b", 1000.0));
    circuit.add(Resistor::new("R2", "b", "0", 1000.0));

    let mut sim = Simulator::new(circuit);
    sim.advance(FRAME).unwrap();
    assert_relative_eq!(volts(&sim, "b"), 2.5, epsilon = 1e-9);

    sim.replace_element(s1, Switch::new("S1", "in", "a", false)).unwrap();
    sim.advance(FRAME).unwrap();
    assert_relative_eq!(volts(&sim, "b"), 0.0, epsilon = 1e-6);
    assert_relative_eq!(volts(&sim, "in"), 5.0, epsilon = 1e-9);

    sim.replace_element(s1, Switch::new("S1", "in", "a", true)).unwrap();
    sim.advance(FRAME).unwrap();
    assert_relative_eq!(volts(&sim, "b"), 2.5, epsilon = 1e-9);
}

#[test]
fn test_rc_follows_square_wave() {
    let config = SimulatorConfig::new().with_timestep(1e-5);
    let mut sim = Simulator::with_config(presets::find("rc").unwrap().build(), config).unwrap();

    // First half period: input high for 5 time constants
    for _ in 0..5 {
        sim.advance(1e-3).unwrap();
    }
    assert!(volts(&sim, "out") > 0.98);

    // Second half period: input low
    for _ in 0..5 {
        sim.advance(1e-3).unwrap();
    }
    assert!(volts(&sim, "out") < 0.05);
}

#[test]
fn test_voltage_override_is_seen_by_elements() {
    let mut sim = Simulator::new(presets::find("divider").unwrap().build());
    sim.advance(0.0).unwrap();
    let n2 = sim
        .node_table()
        .and_then(|t| t.node_for(&ConnectionPoint::new("n2")))
        .unwrap();

    let overrides: HashMap<_, _> = [(n2, 1.25)].into_iter().collect();
    sim.set_overrides(Some(Box::new(overrides)));
    sim.advance(FRAME).unwrap();
    assert_eq!(volts(&sim, "n2"), 1.25);
    assert_relative_eq!(volts(&sim, "n1"), 5.0, epsilon = 1e-9);

    sim.set_overrides(None);
    sim.advance(FRAME).unwrap();
    assert_relative_eq!(volts(&sim, "n2"), 2.5, epsilon = 1e-9);
}

#[test]
fn test_reset_restarts_time() {
    let mut sim = Simulator::new(presets::find("rc").unwrap().build());
    sim.advance(1e-3).unwrap();
    assert!(sim.time() > 0.0);

    sim.reset();
    assert_eq!(sim.time(), 0.0);
    assert_eq!(sim.timestep(), sim.config().timestep);
}

#[test]
fn test_added_capacitor_is_analyzed_next_frame() {
    let mut sim = Simulator::new(presets::find("divider").unwrap().build());
    sim.advance(FRAME).unwrap();
    let before = sim.unknown_count().unwrap();

    sim.add_element(Capacitor::new("C1", "n2", "0", 1e-6));
    sim.add_element(CurrentSource::new("I1", "0", "n3", 1e-3));
    sim.add_element(Resistor::new("R3", "n3", "0", 1000.0));
    sim.advance(FRAME).unwrap();

    assert_eq!(sim.unknown_count().unwrap(), before + 1);
    assert_relative_eq!(volts(&sim, "n3"), 1.0, epsilon = 1e-9);
    assert_relative_eq!(volts(&sim, "n2"), 2.5, epsilon = 1e-3);
}

/// Conductance to ground that only settles when the timestep is small
/// enough: above `max_dt` it flips between two values every iteration.
#[derive(Debug)]
struct StiffLoad {
    terminals: Terminals,
    max_dt: f64,
}

impl StiffLoad {
    fn new(point: &str, max_dt: f64) -> Self {
        Self {
            terminals: Terminals::new([point, "0"]),
            max_dt,
        }
    }
}

impl Element for StiffLoad {
    fn name(&self) -> &str {
        "X1"
    }

    fn terminals(&self) -> &Terminals {
        &self.terminals
    }

    fn terminals_mut(&mut self) -> &mut Terminals {
        &mut self.terminals
    }

    fn is_nonlinear(&self) -> bool {
        true
    }

    fn stamp(&self, matrix: &mut MnaMatrix, _ctx: &StepContext) {
        matrix.mark_node_nonlinear(self.terminals.node(0));
    }

    fn do_step(&mut self, matrix: &mut MnaMatrix, ctx: &StepContext) {
        let g = if ctx.dt > self.max_dt && ctx.subiteration % 2 == 1 {
            2e-3
        } else {
            1e-3
        };
        matrix.stamp_conductance(self.terminals.node(0), self.terminals.node(1), g);
    }
}

fn stiff_circuit(max_dt: f64) -> Circuit {
    let mut circuit = Circuit::new();
    circuit.add(VoltageSource::dc("V1", "in", "0", 5.0));
    circuit.add(Resistor::new("R1", "in", "a", 1000.0));
    circuit.add(StiffLoad::new("a", max_dt));
    circuit
}

#[test]
fn test_timestep_shrinks_until_the_step_converges() {
    let config = SimulatorConfig::new().with_timestep(4e-6);
    let mut sim = Simulator::with_config(stiff_circuit(3e-6), config).unwrap();

    let report = sim.advance(8e-6).unwrap();
    assert!(report.steps >= 1);
    assert!(sim.time() > 0.0);
    assert_eq!(sim.status(), &SimStatus::Ok);
    assert_relative_eq!(volts(&sim, "a"), 2.5, epsilon = 1e-6);
}

#[test]
fn test_no_shrink_attempts_freezes_on_nonconvergence() {
    let config = SimulatorConfig::new().with_timestep(4e-6).with_max_shrink_attempts(0);
    let mut sim = Simulator::with_config(stiff_circuit(3e-6), config).unwrap();

    let err = sim.advance(8e-6).unwrap_err();
    assert!(matches!(err, SimError::ConvergenceFailure { .. }));
    assert!(matches!(sim.status(), SimStatus::NonConvergent { .. }));
    assert_eq!(sim.time(), 0.0);

    // The failed iterate never becomes the visible state
    assert_eq!(sim.node_voltage("a"), Some(0.0));
    assert_eq!(sim.node_voltage("in"), Some(0.0));

    sim.resume();
    assert!(sim.stop_error().is_none());
}

#[test]
fn test_failed_step_after_good_steps_keeps_last_good_voltages() {
    let mut circuit = Circuit::new();
    circuit.add(VoltageSource::dc("V1", "in", "0", 5.0));
    circuit.add(Resistor::new("R1", "in", "a", 1000.0));
    let load = circuit.add(StiffLoad::new("a", 1.0));
    let config = SimulatorConfig::new().with_timestep(4e-6).with_max_shrink_attempts(0);
    let mut sim = Simulator::with_config(circuit, config).unwrap();
    sim.advance(8e-6).unwrap();
    assert_relative_eq!(volts(&sim, "a"), 2.5, epsilon = 1e-9);
    let time = sim.time();

    // Same points and connectivity, so only the linear stamp is redone
    sim.replace_element(load, StiffLoad::new("a", 3e-6)).unwrap();
    assert!(sim.advance(8e-6).is_err());
    assert_eq!(sim.time(), time);
    assert_relative_eq!(volts(&sim, "a"), 2.5, epsilon = 1e-9);
}

#[test]
fn test_replacing_the_only_ground_path_ties_the_node() {
    let mut circuit = Circuit::new();
    circuit.add(VoltageSource::dc("V1", "in", "0", 5.0));
    circuit.add(Resistor::new("R1", "in", "0", 1000.0));
    let r2 = circuit.add(Resistor::new("R2", "a", "0", 1000.0));

    let mut sim = Simulator::new(circuit);
    sim.advance(FRAME).unwrap();
    assert_eq!(sim.status(), &SimStatus::Ok);

    // A current source offers no path to ground, so `a` must be tied
    sim.replace_element(r2, CurrentSource::new("I2", "a", "0", 0.0)).unwrap();
    let report = sim.advance(FRAME).unwrap();
    assert!(report.steps > 0);
    assert!(matches!(report.status, SimStatus::UnconnectedNode { .. }));
    assert_eq!(sim.unconnected_nodes().len(), 1);
    assert_relative_eq!(volts(&sim, "a"), 0.0, epsilon = 1e-6);

    sim.replace_element(r2, Resistor::new("R2", "a", "0", 1000.0)).unwrap();
    sim.advance(FRAME).unwrap();
    assert_eq!(sim.status(), &SimStatus::Ok);
    assert!(sim.unconnected_nodes().is_empty());
}
