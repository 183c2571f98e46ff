//! Circuit graph representation and validation.
//!
//! A [`Circuit`] is an editable list of elements whose terminals sit on named
//! connection points. [`NodeTable::build`] reduces those points to numbered
//! electrical nodes (wires merged, ground forced to node 0) and allocates the
//! auxiliary unknowns the elements ask for.

mod graph;
mod types;
mod validate;

pub use graph::{Circuit, Node, NodeTable, TerminalLink};
pub use types::*;
pub use validate::{find_unconnected_nodes, validate_circuit};
