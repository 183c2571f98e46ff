//! Circuit graph structure and node reduction.

use std::collections::HashMap;

use log::debug;

use super::types::{AuxId, ConnectionPoint, ElementId, NodeId, VarIndex};
use crate::components::Element;
use crate::error::{Result, SimError};

/// An editable, ordered collection of elements.
#[derive(Debug, Default)]
pub struct Circuit {
    elements: Vec<Box<dyn Element>>,
}

impl Circuit {
    /// Create an empty circuit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an element, returning its id.
    pub fn add<E: Element + 'static>(&mut self, element: E) -> ElementId {
        self.add_boxed(Box::new(element))
    }

    /// Add an already boxed element.
    pub fn add_boxed(&mut self, element: Box<dyn Element>) -> ElementId {
        self.elements.push(element);
        ElementId(self.elements.len() - 1)
    }

    /// Remove an element. Ids of later elements shift down by one.
    pub fn remove(&mut self, id: ElementId) -> Result<Box<dyn Element>> {
        if id.0 >= self.elements.len() {
            return Err(SimError::ElementNotFound { id });
        }
        Ok(self.elements.remove(id.0))
    }

    /// Swap an element for another in place, keeping its id.
    pub fn replace(&mut self, id: ElementId, element: Box<dyn Element>) -> Result<Box<dyn Element>> {
        match self.elements.get_mut(id.0) {
            Some(slot) => Ok(std::mem::replace(slot, element)),
            None => Err(SimError::ElementNotFound { id }),
        }
    }

    /// Look up an element.
    pub fn get(&self, id: ElementId) -> Option<&dyn Element> {
        self.elements.get(id.0).map(|e| e.as_ref())
    }

    /// Look up an element mutably.
    pub fn get_mut(&mut self, id: ElementId) -> Option<&mut (dyn Element + 'static)> {
        self.elements.get_mut(id.0).map(|e| e.as_mut())
    }

    /// Find an element by name.
    pub fn find(&self, name: &str) -> Option<ElementId> {
        self.elements.iter().position(|e| e.name() == name).map(ElementId)
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Whether the circuit has no elements.
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// All elements in insertion order.
    pub fn elements(&self) -> &[Box<dyn Element>] {
        &self.elements
    }

    /// All elements in insertion order, mutably.
    pub fn elements_mut(&mut self) -> &mut [Box<dyn Element>] {
        &mut self.elements
    }
}

/// A (element, terminal slot) pair recorded on a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TerminalLink {
    pub element: ElementId,
    pub terminal: usize,
}

/// An electrically distinct point.
#[derive(Debug, Clone, Default)]
pub struct Node {
    /// Every terminal attached here
    pub links: Vec<TerminalLink>,
    /// Created by an element for its own use, not user-visible
    pub internal: bool,
}

/// Union-find over connection point indices.
#[derive(Debug, Default)]
struct Groups {
    parent: Vec<usize>,
}

impl Groups {
    fn push(&mut self) -> usize {
        self.parent.push(self.parent.len());
        self.parent.len() - 1
    }

    fn find(&mut self, mut i: usize) -> usize {
        while self.parent[i] != i {
            self.parent[i] = self.parent[self.parent[i]];
            i = self.parent[i];
        }
        i
    }

    /// Merge two groups; the later-discovered one is absorbed.
    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            let (keep, absorb) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[absorb] = keep;
        }
    }
}

/// Canonical node numbering for one analysis pass.
#[derive(Debug, Clone)]
pub struct NodeTable {
    nodes: Vec<Node>,
    point_nodes: HashMap<ConnectionPoint, NodeId>,
    aux_links: Vec<TerminalLink>,
}

impl NodeTable {
    /// Discover nodes, assign them to every element terminal, and allocate
    /// auxiliary unknowns in element order.
    ///
    /// Wires merge their endpoint groups. The group holding the ground
    /// reference becomes node 0; the rest are numbered densely in discovery
    /// order, followed by internal nodes.
    pub fn build(circuit: &mut Circuit) -> Self {
        let mut groups = Groups::default();
        let mut point_index: HashMap<ConnectionPoint, usize> = HashMap::new();
        let mut points: Vec<ConnectionPoint> = Vec::new();

        for element in circuit.elements() {
            for point in &element.terminals().points {
                if !point_index.contains_key(point) {
                    point_index.insert(point.clone(), groups.push());
                    points.push(point.clone());
                }
            }
        }

        for element in circuit.elements().iter().filter(|e| e.is_wire()) {
            let first = point_index[element.terminal_point(0)];
            for t in 1..element.terminal_count() {
                groups.union(first, point_index[element.terminal_point(t)]);
            }
        }

        let ground_point = points
            .iter()
            .find(|p| p.is_ground())
            .or_else(|| {
                circuit
                    .elements()
                    .iter()
                    .find_map(|e| e.ground_reference().map(|t| e.terminal_point(t)))
            })
            .or_else(|| points.first());

        let mut group_nodes: HashMap<usize, NodeId> = HashMap::new();
        if let Some(point) = ground_point {
            let root = groups.find(point_index[point]);
            group_nodes.insert(root, NodeId::GROUND);
        }

        let mut next = 1;
        let mut point_nodes = HashMap::new();
        for point in &points {
            let root = groups.find(point_index[point]);
            let node = *group_nodes.entry(root).or_insert_with(|| {
                next += 1;
                NodeId(next - 1)
            });
            point_nodes.insert(point.clone(), node);
        }

        let external = next;
        let internal_total: usize = circuit.elements().iter().map(|e| e.internal_node_count()).sum();
        let mut nodes = vec![Node::default(); external + internal_total];
        for node in nodes.iter_mut().skip(external) {
            node.internal = true;
        }

        let mut next_internal = external;
        let mut aux_links = Vec::new();
        for (idx, element) in circuit.elements_mut().iter_mut().enumerate() {
            let id = ElementId(idx);
            let terminal_count = element.terminal_count();
            let internal = element.internal_node_count();
            let aux = element.aux_count();

            let mut assigned = Vec::with_capacity(terminal_count + internal);
            for t in 0..terminal_count {
                assigned.push(point_nodes[element.terminal_point(t)]);
            }
            for _ in 0..internal {
                assigned.push(NodeId(next_internal));
                next_internal += 1;
            }

            let terminals = element.terminals_mut();
            terminals.allocate(internal, aux);
            for (slot, node) in assigned.into_iter().enumerate() {
                terminals.nodes[slot] = node;
                nodes[node.0].links.push(TerminalLink {
                    element: id,
                    terminal: slot,
                });
            }
            for k in 0..aux {
                terminals.aux[k] = AuxId(aux_links.len());
                aux_links.push(TerminalLink {
                    element: id,
                    terminal: k,
                });
            }
            debug_assert_eq!(
                terminals.nodes.len(),
                terminal_count + internal,
                "element {} reports inconsistent terminal counts",
                idx
            );
        }

        debug!(
            "Node reduction: {} points -> {} nodes ({} internal), {} auxiliary unknowns",
            points.len(),
            nodes.len(),
            internal_total,
            aux_links.len()
        );

        Self {
            nodes,
            point_nodes,
            aux_links,
        }
    }

    /// Number of nodes including ground.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of auxiliary unknowns.
    pub fn aux_count(&self) -> usize {
        self.aux_links.len()
    }

    /// Size of the MNA system.
    pub fn unknown_count(&self) -> usize {
        (self.nodes.len() - 1) + self.aux_links.len()
    }

    /// A node by id.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    /// All nodes with their ids, ground first.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter().enumerate().map(|(i, n)| (NodeId(i), n))
    }

    /// The node a connection point resolved to.
    pub fn node_for(&self, point: &ConnectionPoint) -> Option<NodeId> {
        self.point_nodes.get(point).copied()
    }

    /// Owner of each auxiliary unknown as (element, k), in unknown order.
    pub fn aux_links(&self) -> &[TerminalLink] {
        &self.aux_links
    }

    /// Describe a full-system unknown for diagnostics.
    pub fn describe(&self, index: usize, circuit: &Circuit) -> String {
        match VarIndex::from_index(index, self.nodes.len()) {
            VarIndex::Voltage(node) => {
                let mut names: Vec<&str> = self.nodes[node.0]
                    .links
                    .iter()
                    .filter_map(|l| circuit.get(l.element).map(|e| e.name()))
                    .collect();
                names.dedup();
                let kind = if self.nodes[node.0].internal {
                    "internal node"
                } else {
                    "node"
                };
                format!("{} {} at {}", kind, node, names.join(", "))
            }
            VarIndex::Current(aux) => match self.aux_links.get(aux.0) {
                Some(link) => match circuit.get(link.element) {
                    Some(e) => format!("current {} of {}", aux, e.name()),
                    None => format!("current {}", aux),
                },
                None => format!("current {}", aux),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{Diode, DiodeParams, Resistor, VoltageSource, Wire};

    #[test]
    fn test_ground_point_is_node_zero() {
        let mut circuit = Circuit::new();
        circuit.add(Resistor::new("R1", "a", "b", 100.0));
        circuit.add(Resistor::new("R2", "b", "gnd", 100.0));
        let table = NodeTable::build(&mut circuit);

        assert_eq!(table.node_count(), 3);
        assert_eq!(table.node_for(&"gnd".into()), Some(NodeId::GROUND));
        assert_eq!(table.node_for(&"a".into()), Some(NodeId(1)));
        assert_eq!(table.node_for(&"b".into()), Some(NodeId(2)));
    }

    #[test]
    fn test_wires_merge_groups() {
        let mut circuit = Circuit::new();
        circuit.add(Resistor::new("R1", "a", "b", 100.0));
        circuit.add(Wire::new("W1", "b", "c"));
        circuit.add(Wire::new("W2", "c", "d"));
        circuit.add(Resistor::new("R2", "d", "0", 100.0));
        let table = NodeTable::build(&mut circuit);

        // a, {b, c, d}, ground
        assert_eq!(table.node_count(), 3);
        let b = table.node_for(&"b".into());
        assert_eq!(b, table.node_for(&"d".into()));
        assert_eq!(table.node(b.unwrap()).links.len(), 6);
    }

    #[test]
    fn test_voltage_source_negative_is_default_ground() {
        let mut circuit = Circuit::new();
        circuit.add(Resistor::new("R1", "top", "bottom", 100.0));
        circuit.add(VoltageSource::dc("V1", "top", "bottom", 1.0));
        let table = NodeTable::build(&mut circuit);

        assert_eq!(table.node_for(&"bottom".into()), Some(NodeId::GROUND));
        assert_eq!(table.node_for(&"top".into()), Some(NodeId(1)));
        assert_eq!(table.aux_count(), 1);
        assert_eq!(table.unknown_count(), 2);
    }

    #[test]
    fn test_aux_unknowns_follow_element_order() {
        let mut circuit = Circuit::new();
        circuit.add(VoltageSource::dc("V1", "a", "0", 1.0));
        circuit.add(Resistor::new("R1", "a", "b", 100.0));
        circuit.add(VoltageSource::dc("V2", "b", "0", 1.0));
        let table = NodeTable::build(&mut circuit);

        let owners: Vec<ElementId> = table.aux_links().iter().map(|l| l.element).collect();
        assert_eq!(owners, vec![ElementId(0), ElementId(2)]);
        assert_eq!(circuit.get(ElementId(2)).unwrap().terminals().aux(0), AuxId(1));
    }

    #[test]
    fn test_internal_nodes_come_last() {
        let mut circuit = Circuit::new();
        circuit.add(Diode::with_series_resistance("D1", "a", "0", DiodeParams::default(), 10.0));
        circuit.add(Resistor::new("R1", "a", "b", 100.0));
        let table = NodeTable::build(&mut circuit);

        assert_eq!(table.node_count(), 4);
        let internal = circuit.get(ElementId(0)).unwrap().terminal_node(2);
        assert_eq!(internal, NodeId(3));
        assert!(table.node(internal).internal);
        assert!(!table.node(NodeId(2)).internal);
    }

    #[test]
    fn test_describe_names_elements() {
        let mut circuit = Circuit::new();
        circuit.add(VoltageSource::dc("V1", "a", "0", 1.0));
        circuit.add(Resistor::new("R1", "a", "0", 100.0));
        let table = NodeTable::build(&mut circuit);

        let node = table.describe(0, &circuit);
        assert!(node.contains("V1") && node.contains("R1"));
        assert!(table.describe(1, &circuit).contains("current I0 of V1"));
    }
}
