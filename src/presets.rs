//! Ready-made circuits for the CLI and for smoke testing.

use crate::circuit::Circuit;
use crate::components::{
    Behavioral, Capacitor, CurrentSource, Diode, DiodeParams, Inductor, OpAmp, OpAmpParams, Resistor, Switch,
    VoltageSource, Waveform, Wire,
};

/// A named demonstration circuit.
#[derive(Debug, Clone, Copy)]
pub struct Preset {
    pub name: &'static str,
    pub description: &'static str,
    build: fn() -> Circuit,
}

impl Preset {
    /// Build a fresh copy of the circuit.
    pub fn build(&self) -> Circuit {
        (self.build)()
    }
}

/// Every preset, in display order.
pub const PRESETS: &[Preset] = &[
    Preset {
        name: "ohm",
        description: "10 mA into 1 kOhm: node n1 sits at 10 V",
        build: ohm,
    },
    Preset {
        name: "divider",
        description: "5 V across two 1 kOhm resistors",
        build: divider,
    },
    Preset {
        name: "diode",
        description: "5 V through 1 kOhm into a silicon diode",
        build: diode,
    },
    Preset {
        name: "rc",
        description: "100 Hz square wave into a 1 ms RC low-pass",
        build: rc,
    },
    Preset {
        name: "rlc",
        description: "Series RLC ringing after a switch closes onto 1 V",
        build: rlc,
    },
    Preset {
        name: "opamp",
        description: "Non-inverting amplifier, gain 2, 1 kHz sine input",
        build: opamp,
    },
    Preset {
        name: "multiplier",
        description: "Behavioral source multiplying two sines",
        build: multiplier,
    },
    Preset {
        name: "floating",
        description: "Resistor with one end left unconnected",
        build: floating,
    },
];

/// Look up a preset by name.
pub fn find(name: &str) -> Option<&'static Preset> {
    PRESETS.iter().find(|p| p.name.eq_ignore_ascii_case(name))
}

fn ohm() -> Circuit {
    let mut c = Circuit::new();
    c.add(CurrentSource::new("I1", "0", "n1", 0.01));
    c.add(Resistor::new("R1", "n1", "0", 1000.0));
    c
}

fn divider() -> Circuit {
    let mut c = Circuit::new();
    c.add(VoltageSource::dc("V1", "n1", "0", 5.0));
    c.add(Resistor::new("R1", "n1", "n2", 1000.0));
    c.add(Resistor::new("R2", "n2", "0", 1000.0));
    c
}

fn diode() -> Circuit {
    let mut c = Circuit::new();
    c.add(VoltageSource::dc("V1", "in", "0", 5.0));
    c.add(Resistor::new("R1", "in", "a", 1000.0));
    c.add(Diode::new("D1", "a", "0", DiodeParams::default()));
    c
}

fn rc() -> Circuit {
    let mut c = Circuit::new();
    c.add(VoltageSource::new(
        "V1",
        "in",
        "0",
        Waveform::Square {
            amplitude: 1.0,
            frequency: 100.0,
            offset: 0.0,
            duty: 0.5,
        },
    ));
    c.add(Resistor::new("R1", "in", "out", 1000.0));
    c.add(Capacitor::new("C1", "out", "0", 1e-6));
    c
}

fn rlc() -> Circuit {
    let mut c = Circuit::new();
    c.add(VoltageSource::dc("V1", "in", "0", 1.0));
    c.add(Switch::new("S1", "in", "a", true));
    c.add(Resistor::new("R1", "a", "b", 10.0));
    c.add(Inductor::new("L1", "b", "c", 10e-3));
    c.add(Capacitor::new("C1", "c", "0", 1e-6));
    c
}

fn opamp() -> Circuit {
    let mut c = Circuit::new();
    c.add(VoltageSource::new(
        "V1",
        "in",
        "0",
        Waveform::Sine {
            amplitude: 0.5,
            frequency: 1000.0,
            offset: 0.0,
            phase: 0.0,
        },
    ));
    c.add(OpAmp::new("U1", "out", "in", "fb", OpAmpParams::default()));
    c.add(Resistor::new("Rf", "out", "fb", 10_000.0));
    c.add(Resistor::new("Rg", "fb", "0", 10_000.0));
    c.add(Resistor::new("RL", "out", "0", 2_000.0));
    c
}

fn multiplier() -> Circuit {
    let mut c = Circuit::new();
    for (name, point, frequency) in [("V1", "a", 50.0), ("V2", "b", 75.0)] {
        c.add(VoltageSource::new(
            name,
            point,
            "0",
            Waveform::Sine {
                amplitude: 2.0,
                frequency,
                offset: 0.0,
                phase: 0.0,
            },
        ));
    }
    c.add(Behavioral::multiplier("B1", "a", "b", "out"));
    c.add(Resistor::new("RL", "out", "0", 1000.0));
    c
}

fn floating() -> Circuit {
    let mut c = Circuit::new();
    c.add(VoltageSource::dc("V1", "in", "0", 5.0));
    c.add(Wire::new("W1", "in", "a"));
    c.add(Resistor::new("R1", "a", "0", 1000.0));
    c.add(CurrentSource::new("I1", "a", "dangling", 0.0));
    c.add(Resistor::new("R2", "dangling", "end", 1000.0));
    c
}
