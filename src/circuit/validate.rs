//! Circuit validation.

use std::collections::VecDeque;

use crate::error::{Result, SimError};

use super::{Circuit, NodeId, NodeTable};

/// Validate a circuit for analysis.
///
/// Checks:
/// - The circuit has at least one element
/// - Every element has at least one terminal
pub fn validate_circuit(circuit: &Circuit) -> Result<()> {
    if circuit.is_empty() {
        return Err(SimError::InvalidTopology {
            message: "Circuit has no elements".to_string(),
        });
    }

    for element in circuit.elements() {
        if element.terminal_count() == 0 {
            return Err(SimError::invalid_element(element.name(), "element has no terminals"));
        }
    }

    Ok(())
}

/// Nodes with no conducting path to ground.
///
/// Walks outward from ground across element slot pairs that conduct, and
/// from any slot an element ties to ground internally. Nodes never reached
/// are returned in ascending order.
pub fn find_unconnected_nodes(circuit: &Circuit, table: &NodeTable) -> Vec<NodeId> {
    let n = table.node_count();
    let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut grounded = vec![false; n];
    grounded[NodeId::GROUND.0] = true;

    for element in circuit.elements().iter().filter(|e| !e.is_wire()) {
        let slots = element.terminals().nodes.len();
        for a in 0..slots {
            let na = element.terminal_node(a).0;
            if element.has_ground_connection(a) {
                grounded[na] = true;
            }
            for b in (a + 1)..slots {
                let nb = element.terminal_node(b).0;
                if na != nb && element.conducts(a, b) {
                    adjacency[na].push(nb);
                    adjacency[nb].push(na);
                }
            }
        }
    }

    let mut visited = grounded.clone();
    let mut queue: VecDeque<usize> = (0..n).filter(|&i| grounded[i]).collect();
    while let Some(node) = queue.pop_front() {
        for &next in &adjacency[node] {
            if !visited[next] {
                visited[next] = true;
                queue.push_back(next);
            }
        }
    }

    (1..n).filter(|&i| !visited[i]).map(NodeId).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{CurrentSource, Resistor, VoltageSource};

    #[test]
    fn test_empty_circuit_rejected() {
        let circuit = Circuit::new();
        assert!(matches!(
            validate_circuit(&circuit),
            Err(SimError::InvalidTopology { .. })
        ));
    }

    #[test]
    fn test_connected_circuit_has_no_floating_nodes() {
        let mut circuit = Circuit::new();
        circuit.add(VoltageSource::dc("V1", "a", "0", 5.0));
        circuit.add(Resistor::new("R1", "a", "b", 1000.0));
        circuit.add(Resistor::new("R2", "b", "0", 1000.0));
        let table = NodeTable::build(&mut circuit);

        assert!(validate_circuit(&circuit).is_ok());
        assert!(find_unconnected_nodes(&circuit, &table).is_empty());
    }

    #[test]
    fn test_island_behind_current_source_is_found() {
        let mut circuit = Circuit::new();
        circuit.add(Resistor::new("R1", "a", "0", 1000.0));
        // Current sources do not provide a path
        circuit.add(CurrentSource::new("I1", "a", "b", 1e-3));
        circuit.add(Resistor::new("R2", "b", "c", 1000.0));
        let table = NodeTable::build(&mut circuit);

        let floating = find_unconnected_nodes(&circuit, &table);
        let b = table.node_for(&"b".into()).unwrap();
        let c = table.node_for(&"c".into()).unwrap();
        assert_eq!(floating, vec![b, c]);
    }
}
