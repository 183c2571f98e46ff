//! # Voltaic Core
//!
//! A frame-driven circuit simulation engine.
//!
//! This library provides:
//! - An editable circuit model built from elements on named connection points
//! - Modified Nodal Analysis (MNA) with node reduction and matrix simplification
//! - Damped Newton-Raphson iteration for nonlinear elements
//! - A timestep controller that catches simulated time up with wall time,
//!   shrinks the timestep on failure and freezes on the last good state
//!
//! ## Architecture
//!
//! - [`circuit`] - Circuit container, node reduction and validation
//! - [`components`] - The element stamp contract and built-in elements
//! - [`solver`] - LU kernel, MNA assembly, simplification, Newton-Raphson and
//!   the simulator
//! - [`presets`] - Demonstration circuits
//!
//! ## Usage
//!
//! ```
//! use voltaic_core::components::{Resistor, VoltageSource};
//! use voltaic_core::{Circuit, Simulator};
//!
//! let mut circuit = Circuit::new();
//! circuit.add(VoltageSource::dc("V1", "in", "0", 5.0));
//! circuit.add(Resistor::new("R1", "in", "out", 1000.0));
//! circuit.add(Resistor::new("R2", "out", "0", 1000.0));
//!
//! let mut sim = Simulator::new(circuit);
//! sim.advance(1.0 / 60.0)?;
//! assert!((sim.node_voltage("out").unwrap() - 2.5).abs() < 1e-9);
//! # Ok::<(), voltaic_core::SimError>(())
//! ```
//!
//! ## Circuit Simulation Method
//!
//! For each timestep:
//!
//! 1. Re-analyze if the topology changed (node numbering, matrix dimensions)
//! 2. Stamp the system matrix A and source vector b
//! 3. Solve Ax = b for node voltages and branch currents
//! 4. For nonlinear elements, iterate using Newton-Raphson until convergence
//! 5. Commit element state and advance simulated time
//!
//! Reactive elements (C, L) are discretized using the trapezoidal rule for
//! accuracy and stability.

pub mod circuit;
pub mod components;
pub mod error;
pub mod presets;
pub mod solver;

// Re-export main types for convenience
pub use circuit::Circuit;
pub use error::{Result, SimError};
pub use solver::{FrameReport, SimStatus, Simulator, SimulatorConfig};

/// Thermal voltage at room temperature (approximately 26mV)
pub const THERMAL_VOLTAGE: f64 = 0.0258;
