//! Matrix simplification.
//!
//! Before factoring, rows that trivially determine an unknown are folded
//! away so the LU kernel works on a smaller system:
//!
//! - a row with a single remaining entry fixes its unknown to `b[i] / a[i][j]`,
//!   which is then substituted into every other row;
//! - a row `a*x[j] - a*x[k] = 0` makes `x[j]` an alias of `x[k]`, so column
//!   `j` is folded into column `k`.
//!
//! Only rows whose matrix entries never change after the linear stamp are
//! candidates. The plan is computed once per analysis; the numbers are
//! re-derived from the freshly stamped system on every [`Reduction::apply`].

use log::debug;

use super::mna::MnaMatrix;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Elimination {
    /// `row` alone determines `col`.
    Known { row: usize, col: usize },
    /// `row` states `x[col] == x[target]`.
    Equal { row: usize, col: usize, target: usize },
}

/// Elimination plan plus the buffers it is applied with.
#[derive(Debug, Clone, Default)]
pub struct Reduction {
    size: usize,
    steps: Vec<Elimination>,
    kept_rows: Vec<usize>,
    kept_cols: Vec<usize>,
    known: Vec<f64>,
    work_a: Vec<f64>,
    work_b: Vec<f64>,
    reduced_a: Vec<f64>,
    reduced_b: Vec<f64>,
}

impl Reduction {
    /// A plan that keeps every row and column.
    pub fn identity(size: usize) -> Self {
        Self::from_steps(size, Vec::new(), (0..size).collect(), (0..size).collect())
    }

    /// Plan eliminations from a linearly stamped system.
    pub fn plan(matrix: &MnaMatrix) -> Self {
        let n = matrix.size;
        let mut w = matrix.a.clone();
        let mut wb = matrix.rhs.clone();
        let mut dynamic_rhs: Vec<bool> = (0..n).map(|i| matrix.rhs_changes(i)).collect();
        let mut row_dropped = vec![false; n];
        let mut col_dropped = vec![false; n];
        let mut steps = Vec::new();

        let mut changed = true;
        while changed {
            changed = false;
            for i in 0..n {
                if row_dropped[i] || matrix.is_nonlinear_row(i) {
                    continue;
                }

                let mut entries = (0..n).filter(|&j| !col_dropped[j] && w[i * n + j] != 0.0);
                let first = entries.next();
                let second = entries.next();
                let third = entries.next();

                match (first, second, third) {
                    (Some(col), None, _) => {
                        // Known value: move column into every other right-hand side
                        let value = wb[i] / w[i * n + col];
                        for k in 0..n {
                            let c = w[k * n + col];
                            if k != i && c != 0.0 {
                                wb[k] -= c * value;
                                w[k * n + col] = 0.0;
                                dynamic_rhs[k] |= dynamic_rhs[i];
                            }
                        }
                        steps.push(Elimination::Known { row: i, col });
                    }
                    (Some(col), Some(target), None)
                        if !dynamic_rhs[i]
                            && wb[i] == 0.0
                            && w[i * n + col] == -w[i * n + target] =>
                    {
                        for r in 0..n {
                            let c = w[r * n + col];
                            if c != 0.0 {
                                w[r * n + target] += c;
                                w[r * n + col] = 0.0;
                            }
                        }
                        steps.push(Elimination::Equal {
                            row: i,
                            col,
                            target,
                        });
                    }
                    _ => continue,
                }

                row_dropped[i] = true;
                match steps.last() {
                    Some(Elimination::Known { col, .. }) | Some(Elimination::Equal { col, .. }) => {
                        col_dropped[*col] = true;
                    }
                    None => {}
                }
                changed = true;
            }
        }

        let kept_rows: Vec<usize> = (0..n).filter(|&i| !row_dropped[i]).collect();
        let kept_cols: Vec<usize> = (0..n).filter(|&j| !col_dropped[j]).collect();
        debug!(
            "Simplified {}x{} system to {}x{} ({} eliminations)",
            n,
            n,
            kept_rows.len(),
            kept_cols.len(),
            steps.len()
        );
        Self::from_steps(n, steps, kept_rows, kept_cols)
    }

    fn from_steps(size: usize, steps: Vec<Elimination>, kept_rows: Vec<usize>, kept_cols: Vec<usize>) -> Self {
        debug_assert_eq!(kept_rows.len(), kept_cols.len());
        let m = kept_rows.len();
        Self {
            size,
            known: vec![0.0; steps.len()],
            steps,
            kept_rows,
            kept_cols,
            work_a: vec![0.0; size * size],
            work_b: vec![0.0; size],
            reduced_a: vec![0.0; m * m],
            reduced_b: vec![0.0; m],
        }
    }

    /// Dimension of the reduced system.
    pub fn reduced_size(&self) -> usize {
        self.kept_rows.len()
    }

    /// Number of unknowns folded away.
    pub fn eliminated(&self) -> usize {
        self.steps.len()
    }

    /// Full-system row behind a reduced row.
    pub fn original_row(&self, reduced_row: usize) -> usize {
        self.kept_rows[reduced_row]
    }

    /// Full-system unknown behind a reduced column.
    pub fn original_col(&self, reduced_col: usize) -> usize {
        self.kept_cols[reduced_col]
    }

    /// Reduced matrix from the last [`Reduction::apply`].
    pub fn matrix(&self) -> &[f64] {
        &self.reduced_a
    }

    /// Mutable reduced right-hand side, solved in place by the LU kernel.
    pub fn rhs_mut(&mut self) -> &mut [f64] {
        &mut self.reduced_b
    }

    /// Reduce a freshly stamped system.
    pub fn apply(&mut self, a: &[f64], b: &[f64]) {
        let n = self.size;
        debug_assert_eq!(a.len(), n * n);
        self.work_a.copy_from_slice(a);
        self.work_b.copy_from_slice(b);
        let (wa, wb) = (&mut self.work_a, &mut self.work_b);

        for (s, step) in self.steps.iter().enumerate() {
            match *step {
                Elimination::Known { row, col } => {
                    let value = wb[row] / wa[row * n + col];
                    self.known[s] = value;
                    for k in 0..n {
                        let c = wa[k * n + col];
                        if k != row && c != 0.0 {
                            wb[k] -= c * value;
                            wa[k * n + col] = 0.0;
                        }
                    }
                }
                Elimination::Equal { col, target, .. } => {
                    for r in 0..n {
                        let c = wa[r * n + col];
                        if c != 0.0 {
                            wa[r * n + target] += c;
                            wa[r * n + col] = 0.0;
                        }
                    }
                }
            }
        }

        let m = self.kept_rows.len();
        for (rr, &row) in self.kept_rows.iter().enumerate() {
            for (cc, &col) in self.kept_cols.iter().enumerate() {
                self.reduced_a[rr * m + cc] = wa[row * n + col];
            }
            self.reduced_b[rr] = wb[row];
        }
    }

    /// Rebuild the full solution from the reduced one (held in [`Reduction::rhs`]
    /// after the solve).
    pub fn expand(&self, x: &mut [f64]) {
        debug_assert_eq!(x.len(), self.size);
        for (cc, &col) in self.kept_cols.iter().enumerate() {
            x[col] = self.reduced_b[cc];
        }
        for (s, step) in self.steps.iter().enumerate().rev() {
            match *step {
                Elimination::Known { col, .. } => x[col] = self.known[s],
                Elimination::Equal { col, target, .. } => x[col] = x[target],
            }
        }
    }
}
