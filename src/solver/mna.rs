//! MNA matrix assembly.

use crate::circuit::{AuxId, NodeId, VarIndex};

/// MNA matrix system Ax = b.
#[derive(Debug, Clone)]
pub struct MnaMatrix {
    /// System matrix A (row-major)
    pub a: Vec<f64>,
    /// Right-hand-side vector b
    pub rhs: Vec<f64>,
    /// Solution vector x
    pub x: Vec<f64>,
    /// Matrix dimension
    pub size: usize,
    /// Number of nodes including ground
    pub num_nodes: usize,
    /// Rows whose matrix entries are restamped every iteration
    nonlinear_rows: Vec<bool>,
    /// Rows whose right-hand side is restamped every step
    rhs_rows: Vec<bool>,
    /// Right-hand side as left by the linear stamp
    rhs_base: Vec<f64>,
}

impl MnaMatrix {
    /// Create a zeroed system for `num_nodes` nodes (ground included) and
    /// `num_aux` auxiliary unknowns.
    pub fn new(num_nodes: usize, num_aux: usize) -> Self {
        let size = num_nodes.saturating_sub(1) + num_aux;
        Self {
            a: vec![0.0; size * size],
            rhs: vec![0.0; size],
            x: vec![0.0; size],
            size,
            num_nodes,
            nonlinear_rows: vec![false; size],
            rhs_rows: vec![false; size],
            rhs_base: vec![0.0; size],
        }
    }

    /// Clear the matrix and right-hand side to zero.
    ///
    /// Row flags are kept; they describe the structure, not the values.
    pub fn clear(&mut self) {
        self.a.fill(0.0);
        self.rhs.fill(0.0);
    }

    /// Clear the row flags (start of a linear stamp pass).
    pub fn clear_flags(&mut self) {
        self.nonlinear_rows.fill(false);
        self.rhs_rows.fill(false);
    }

    /// Get matrix element at (row, col).
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.a[row * self.size + col]
    }

    /// Add to matrix element at (row, col).
    pub fn add(&mut self, row: usize, col: usize, value: f64) {
        self.a[row * self.size + col] += value;
    }

    /// Add to right-hand-side element.
    pub fn add_rhs(&mut self, row: usize, value: f64) {
        self.rhs[row] += value;
    }

    /// Matrix row of a node voltage. Ground has none.
    pub fn node_row(&self, node: NodeId) -> Option<usize> {
        if node.is_ground() {
            None
        } else {
            Some(VarIndex::Voltage(node).to_index(self.num_nodes))
        }
    }

    /// Matrix row of an auxiliary unknown.
    pub fn aux_row(&self, aux: AuxId) -> usize {
        VarIndex::Current(aux).to_index(self.num_nodes)
    }

    /// Flag a row as restamped every nonlinear iteration.
    pub fn mark_nonlinear(&mut self, row: usize) {
        self.nonlinear_rows[row] = true;
    }

    /// Flag a node's row as restamped every nonlinear iteration.
    pub fn mark_node_nonlinear(&mut self, node: NodeId) {
        if let Some(row) = self.node_row(node) {
            self.mark_nonlinear(row);
        }
    }

    /// Flag a row whose right-hand side is restamped every step.
    pub fn mark_rhs_changes(&mut self, row: usize) {
        self.rhs_rows[row] = true;
    }

    /// Flag a node's row as having a per-step right-hand side.
    pub fn mark_node_rhs_changes(&mut self, node: NodeId) {
        if let Some(row) = self.node_row(node) {
            self.mark_rhs_changes(row);
        }
    }

    /// Whether a row is restamped every nonlinear iteration.
    pub fn is_nonlinear_row(&self, row: usize) -> bool {
        self.nonlinear_rows[row]
    }

    /// Whether a row's right-hand side is restamped every step.
    pub fn rhs_changes(&self, row: usize) -> bool {
        self.rhs_rows[row]
    }

    /// Remember the current right-hand side as the linear baseline.
    pub fn save_rhs_base(&mut self) {
        self.rhs_base.copy_from_slice(&self.rhs);
    }

    /// Restore the right-hand side to the linear baseline.
    pub fn restore_rhs_base(&mut self) {
        self.rhs.copy_from_slice(&self.rhs_base);
    }

    /// Stamp a conductance between two nodes.
    /// For a conductance G between nodes n1 and n2:
    ///   A[n1,n1] += G
    ///   A[n2,n2] += G
    ///   A[n1,n2] -= G
    ///   A[n2,n1] -= G
    pub fn stamp_conductance(&mut self, n1: NodeId, n2: NodeId, g: f64) {
        let r1 = self.node_row(n1);
        let r2 = self.node_row(n2);
        if let Some(i) = r1 {
            self.add(i, i, g);
        }
        if let Some(j) = r2 {
            self.add(j, j, g);
        }
        if let (Some(i), Some(j)) = (r1, r2) {
            self.add(i, j, -g);
            self.add(j, i, -g);
        }
    }

    /// Stamp a resistor between two nodes.
    pub fn stamp_resistor(&mut self, n1: NodeId, n2: NodeId, r: f64) {
        debug_assert!(r > 0.0, "resistance must be positive, got {r}");
        self.stamp_conductance(n1, n2, 1.0 / r);
    }

    /// Stamp a voltage source between two nodes with its current at `aux`.
    /// V[n+] - V[n-] = E
    pub fn stamp_voltage_source(&mut self, n_pos: NodeId, n_neg: NodeId, aux: AuxId, voltage: f64) {
        let vs = self.aux_row(aux);
        if let Some(i) = self.node_row(n_pos) {
            self.add(vs, i, 1.0);
            self.add(i, vs, 1.0);
        }
        if let Some(j) = self.node_row(n_neg) {
            self.add(vs, j, -1.0);
            self.add(j, vs, -1.0);
        }
        self.rhs[vs] = voltage;
    }

    /// Stamp a current source between two nodes.
    /// Current flows from n+ to n- through the source.
    pub fn stamp_current_source(&mut self, n_pos: NodeId, n_neg: NodeId, current: f64) {
        if let Some(i) = self.node_row(n_pos) {
            self.add_rhs(i, -current);
        }
        if let Some(j) = self.node_row(n_neg) {
            self.add_rhs(j, current);
        }
    }

    /// Stamp a VCCS (Voltage-Controlled Current Source).
    /// I = gm * (V[ctrl+] - V[ctrl-]) flowing from out+ to out- through the source.
    pub fn stamp_vccs(
        &mut self,
        n_out_pos: NodeId,
        n_out_neg: NodeId,
        n_ctrl_pos: NodeId,
        n_ctrl_neg: NodeId,
        gm: f64,
    ) {
        let out_pos = self.node_row(n_out_pos);
        let out_neg = self.node_row(n_out_neg);
        let ctrl_pos = self.node_row(n_ctrl_pos);
        let ctrl_neg = self.node_row(n_ctrl_neg);

        if let (Some(i), Some(k)) = (out_pos, ctrl_pos) {
            self.add(i, k, gm);
        }
        if let (Some(i), Some(l)) = (out_pos, ctrl_neg) {
            self.add(i, l, -gm);
        }
        if let (Some(j), Some(k)) = (out_neg, ctrl_pos) {
            self.add(j, k, -gm);
        }
        if let (Some(j), Some(l)) = (out_neg, ctrl_neg) {
            self.add(j, l, gm);
        }
    }

    /// Stamp a coefficient into an auxiliary row against a node column.
    /// Ground columns are dropped.
    pub fn stamp_aux_coefficient(&mut self, aux: AuxId, node: NodeId, value: f64) {
        let vs = self.aux_row(aux);
        if let Some(col) = self.node_row(node) {
            self.add(vs, col, value);
        }
    }

    /// Add to the right-hand side of an auxiliary row.
    pub fn stamp_aux_rhs(&mut self, aux: AuxId, value: f64) {
        let vs = self.aux_row(aux);
        self.add_rhs(vs, value);
    }
}
