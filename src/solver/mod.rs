//! MNA (Modified Nodal Analysis) solver.
//!
//! This module provides the numerical engine for circuit simulation.
//!
//! ## Modified Nodal Analysis
//!
//! MNA assembles a system of equations Ax = b where:
//! - x contains node voltages and auxiliary unknowns (branch currents)
//! - A is the conductance/coefficient matrix
//! - b is the source vector
//!
//! The matrix structure is:
//! ```text
//! [ G   B ] [ v ]   [ i ]
//! [ C   D ] [ j ] = [ e ]
//! ```
//!
//! where:
//! - G is the conductance matrix (node equations)
//! - B, C connect voltage sources to nodes
//! - D is usually 0 (for ideal voltage sources)
//! - v is the vector of node voltages (ground excluded)
//! - j is the vector of auxiliary unknowns, in element order
//! - i is the sum of current sources into each node
//! - e is the vector of voltage source values
//!
//! ## Pipeline
//!
//! [`MnaSystem`] stamps the linear baseline once per analysis, plans a
//! [`Reduction`] that folds trivially determined unknowns away, and factors
//! the reduced matrix with [`LuFactors`]. [`NewtonRaphson`] drives one
//! timestep; [`Simulator`] drives frames of timesteps.

mod lu;
mod mna;
mod newton;
mod simplify;
mod simulator;

pub use lu::{lu_factor, lu_solve, FactorError, LuFactors};
pub use mna::MnaMatrix;
pub use newton::{distribute, distribute_to_circuit, ConvergencePolicy, MnaSystem, NewtonRaphson, VoltageOverride};
pub use simplify::Reduction;
pub use simulator::{FrameReport, SimStatus, Simulator, SimulatorConfig};

/// Maximum Newton-Raphson iterations per timestep.
pub const DEFAULT_MAX_ITERATIONS: usize = 100;

/// Default simulation timestep (seconds).
pub const DEFAULT_TIMESTEP: f64 = 5e-6;

/// Resistance used to tie unconnected nodes to ground (ohms).
pub const DEFAULT_TIE_RESISTANCE: f64 = 1e9;
