//! Core types for circuit representation.

use std::fmt;

/// A unique identifier for a node in the circuit.
/// Node 0 is always ground.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

impl NodeId {
    /// The ground node (always index 0).
    pub const GROUND: NodeId = NodeId(0);

    /// Check if this is the ground node.
    pub fn is_ground(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_ground() {
            write!(f, "GND")
        } else {
            write!(f, "N{}", self.0)
        }
    }
}

/// A unique identifier for an element in the circuit (its position in
/// insertion order).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(pub usize);

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{}", self.0)
    }
}

/// Index for extra unknowns in the MNA matrix (e.g., voltage source currents).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AuxId(pub usize);

impl fmt::Display for AuxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "I{}", self.0)
    }
}

/// Variable index in the MNA solution vector.
/// Can be either a node voltage or an auxiliary branch current.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VarIndex {
    /// Node voltage variable
    Voltage(NodeId),
    /// Auxiliary current variable (voltage sources, inductors)
    Current(AuxId),
}

impl VarIndex {
    /// Get the raw index into the solution vector.
    /// Node voltages come first (excluding ground), then auxiliary currents.
    pub fn to_index(&self, num_nodes: usize) -> usize {
        match self {
            VarIndex::Voltage(NodeId(n)) => {
                debug_assert!(*n > 0, "Ground node should not be in solution vector");
                n - 1
            }
            VarIndex::Current(AuxId(b)) => (num_nodes - 1) + b,
        }
    }

    /// Inverse of [`VarIndex::to_index`].
    pub fn from_index(index: usize, num_nodes: usize) -> Self {
        if index < num_nodes - 1 {
            VarIndex::Voltage(NodeId(index + 1))
        } else {
            VarIndex::Current(AuxId(index - (num_nodes - 1)))
        }
    }
}

/// Identity of a place where element terminals meet.
///
/// The editor decides what the identity means (a grid coordinate, a net
/// label); the engine only compares them. Points named `0` or `gnd` are
/// ground.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionPoint(pub String);

impl ConnectionPoint {
    /// Create a point from any label.
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    /// A point at grid coordinates, for editors that connect by position.
    pub fn at(x: i32, y: i32) -> Self {
        Self(format!("{x},{y}"))
    }

    /// The conventional ground point.
    pub fn ground() -> Self {
        Self("0".to_string())
    }

    /// Check if this point is a ground reference by name.
    pub fn is_ground(&self) -> bool {
        self.0 == "0" || self.0.eq_ignore_ascii_case("gnd")
    }

    /// The label as given.
    pub fn label(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConnectionPoint {
    fn from(label: &str) -> Self {
        Self::new(label)
    }
}

impl From<String> for ConnectionPoint {
    fn from(label: String) -> Self {
        Self(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_var_index_layout() {
        // 3 nodes (ground + 2) and one auxiliary unknown
        assert_eq!(VarIndex::Voltage(NodeId(1)).to_index(3), 0);
        assert_eq!(VarIndex::Voltage(NodeId(2)).to_index(3), 1);
        assert_eq!(VarIndex::Current(AuxId(0)).to_index(3), 2);
        assert_eq!(VarIndex::from_index(2, 3), VarIndex::Current(AuxId(0)));
        assert_eq!(VarIndex::from_index(0, 3), VarIndex::Voltage(NodeId(1)));
    }

    #[test]
    fn test_ground_point_names() {
        assert!(ConnectionPoint::from("0").is_ground());
        assert!(ConnectionPoint::from("GND").is_ground());
        assert!(!ConnectionPoint::from("out").is_ground());
        assert_eq!(ConnectionPoint::at(3, -4).label(), "3,-4");
    }
}
