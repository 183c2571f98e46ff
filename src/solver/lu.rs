//! Dense LU factorization (Crout's method, partial pivoting).
//!
//! Matrices are row-major `n * n` slices. [`lu_factor`] overwrites the
//! matrix with its factors: the strictly lower triangle holds the
//! unit-diagonal L multipliers, the upper triangle (diagonal included)
//! holds U. [`lu_solve`] overwrites the right-hand side with the solution.

use std::fmt;

/// Why a matrix could not be factored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FactorError {
    /// Row is identically zero: nothing constrains that unknown.
    ZeroRow(usize),
    /// No usable pivot in this column.
    SingularAt(usize),
}

impl FactorError {
    /// The offending row (or column, for pivot failures).
    pub fn row(&self) -> usize {
        match *self {
            FactorError::ZeroRow(row) | FactorError::SingularAt(row) => row,
        }
    }
}

impl fmt::Display for FactorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FactorError::ZeroRow(row) => write!(f, "row {row} is all zeros"),
            FactorError::SingularAt(row) => write!(f, "no pivot at row {row}"),
        }
    }
}

/// Factor `a` in place, recording row interchanges in `pivots`.
pub fn lu_factor(a: &mut [f64], n: usize, pivots: &mut [usize]) -> Result<(), FactorError> {
    debug_assert_eq!(a.len(), n * n);
    debug_assert_eq!(pivots.len(), n);

    // An all-zero row is a modeling error, not a numerical one
    for i in 0..n {
        if a[i * n..(i + 1) * n].iter().all(|&v| v == 0.0) {
            return Err(FactorError::ZeroRow(i));
        }
    }

    for j in 0..n {
        // Upper triangular entries above the diagonal
        for i in 0..j {
            let mut q = a[i * n + j];
            for k in 0..i {
                q -= a[i * n + k] * a[k * n + j];
            }
            a[i * n + j] = q;
        }

        // Lower triangular entries (diagonal included), tracking the pivot
        let mut largest = 0.0;
        let mut largest_row = None;
        for i in j..n {
            let mut q = a[i * n + j];
            for k in 0..j {
                q -= a[i * n + k] * a[k * n + j];
            }
            a[i * n + j] = q;
            let x = q.abs();
            if x >= largest {
                largest = x;
                largest_row = Some(i);
            }
        }

        // NaN entries never compare, leaving no candidate row
        let Some(pivot_row) = largest_row else {
            return Err(FactorError::SingularAt(j));
        };

        if pivot_row != j {
            for k in 0..n {
                a.swap(pivot_row * n + k, j * n + k);
            }
        }
        pivots[j] = pivot_row;

        let diag = a[j * n + j];
        if diag == 0.0 || !diag.is_finite() {
            return Err(FactorError::SingularAt(j));
        }

        // Scale the column below the diagonal
        let mult = 1.0 / diag;
        for i in (j + 1)..n {
            a[i * n + j] *= mult;
        }
    }

    Ok(())
}

/// Solve with factors from [`lu_factor`], overwriting `b` with the solution.
pub fn lu_solve(a: &[f64], n: usize, pivots: &[usize], b: &mut [f64]) {
    debug_assert_eq!(b.len(), n);

    // Apply the recorded interchanges in factor order
    for i in 0..n {
        b.swap(i, pivots[i]);
    }

    // Forward substitution with the unit-diagonal lower triangle
    for i in 0..n {
        let mut tot = b[i];
        for j in 0..i {
            tot -= a[i * n + j] * b[j];
        }
        b[i] = tot;
    }

    // Back substitution with the upper triangle
    for i in (0..n).rev() {
        let mut tot = b[i];
        for j in (i + 1)..n {
            tot -= a[i * n + j] * b[j];
        }
        b[i] = tot / a[i * n + i];
    }
}

/// A factored matrix that can be solved against many right-hand sides.
#[derive(Debug, Clone, Default)]
pub struct LuFactors {
    lu: Vec<f64>,
    pivots: Vec<usize>,
    size: usize,
}

impl LuFactors {
    /// Factor a copy of `a`.
    pub fn factor(a: &[f64], size: usize) -> Result<Self, FactorError> {
        let mut factors = Self::default();
        factors.refactor(a, size)?;
        Ok(factors)
    }

    /// Replace the factors with those of a new matrix, reusing storage.
    pub fn refactor(&mut self, a: &[f64], size: usize) -> Result<(), FactorError> {
        self.size = size;
        self.lu.clear();
        self.lu.extend_from_slice(a);
        self.pivots.clear();
        self.pivots.resize(size, 0);
        lu_factor(&mut self.lu, size, &mut self.pivots)
    }

    /// Solve in place against the stored factors.
    pub fn solve(&self, b: &mut [f64]) {
        lu_solve(&self.lu, self.size, &self.pivots, b);
    }

    /// Matrix dimension.
    pub fn size(&self) -> usize {
        self.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn mat_vec(a: &[f64], n: usize, x: &[f64]) -> Vec<f64> {
        (0..n)
            .map(|i| (0..n).map(|j| a[i * n + j] * x[j]).sum())
            .collect()
    }

    /// Deterministic pseudo-random values in [-1, 1).
    fn lcg(seed: &mut u64) -> f64 {
        *seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        ((*seed >> 11) as f64 / (1u64 << 53) as f64) * 2.0 - 1.0
    }

    #[test]
    fn test_solve_satisfies_system() {
        let mut seed = 42;
        for n in [1, 2, 5, 12] {
            let mut a: Vec<f64> = (0..n * n).map(|_| lcg(&mut seed)).collect();
            // keep it comfortably nonsingular
            for i in 0..n {
                a[i * n + i] += n as f64;
            }
            let b: Vec<f64> = (0..n).map(|_| lcg(&mut seed)).collect();

            let factors = LuFactors::factor(&a, n).unwrap();
            let mut x = b.clone();
            factors.solve(&mut x);

            let ax = mat_vec(&a, n, &x);
            for i in 0..n {
                assert_relative_eq!(ax[i], b[i], epsilon = 1e-9, max_relative = 1e-9);
            }
        }
    }

    #[test]
    fn test_pivoting_handles_zero_diagonal() {
        // [[0, 1], [1, 0]] needs a row swap
        let a = vec![0.0, 1.0, 1.0, 0.0];
        let factors = LuFactors::factor(&a, 2).unwrap();
        let mut b = vec![3.0, 7.0];
        factors.solve(&mut b);
        assert_relative_eq!(b[0], 7.0);
        assert_relative_eq!(b[1], 3.0);
    }

    #[test]
    fn test_zero_row_reported() {
        let mut a = vec![1.0, 2.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 3.0];
        let mut pivots = vec![0; 3];
        assert_eq!(lu_factor(&mut a, 3, &mut pivots), Err(FactorError::ZeroRow(1)));
    }

    #[test]
    fn test_singular_pivot_reported() {
        // Second row is a multiple of the first
        let mut a = vec![1.0, 2.0, 2.0, 4.0];
        let mut pivots = vec![0; 2];
        assert_eq!(lu_factor(&mut a, 2, &mut pivots), Err(FactorError::SingularAt(1)));
    }

    #[test]
    fn test_nan_column_is_singular() {
        let mut a = vec![f64::NAN, 1.0, f64::NAN, 2.0];
        let mut pivots = vec![0; 2];
        assert_eq!(lu_factor(&mut a, 2, &mut pivots), Err(FactorError::SingularAt(0)));
    }

    #[test]
    fn test_resolve_with_new_rhs_reuses_factors() {
        let a = vec![4.0, 1.0, 2.0, 3.0];
        let factors = LuFactors::factor(&a, 2).unwrap();
        for b in [[1.0, 0.0], [0.0, 1.0], [5.0, -2.0]] {
            let mut x = b.to_vec();
            factors.solve(&mut x);
            let ax = mat_vec(&a, 2, &x);
            assert_relative_eq!(ax[0], b[0], epsilon = 1e-12);
            assert_relative_eq!(ax[1], b[1], epsilon = 1e-12);
        }
    }
}
