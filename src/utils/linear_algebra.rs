//! Small dense linear algebra helpers for the vector-transmission periodic orbit and the
//! damped Newton solve used to fit the emergence rate (see `vector_transmission`).
//!
//! These matrices are tiny (dimension `eta = 2*mt + tau`, typically well under 100), so a
//! hand-rolled `Vec<Vec<f64>>` Gauss-Jordan solve is preferable to bringing in a linear-algebra
//! crate the rest of the dependency stack has no other use for.

use ixa::IxaError;

pub type Matrix = Vec<Vec<f64>>;

#[must_use]
pub fn zeros(rows: usize, cols: usize) -> Matrix {
    vec![vec![0.0; cols]; rows]
}

#[must_use]
pub fn identity(n: usize) -> Matrix {
    let mut m = zeros(n, n);
    for (i, row) in m.iter_mut().enumerate() {
        row[i] = 1.0;
    }
    m
}

#[must_use]
pub fn mat_vec_mul(a: &Matrix, x: &[f64]) -> Vec<f64> {
    a.iter()
        .map(|row| row.iter().zip(x).map(|(aij, xj)| aij * xj).sum())
        .collect()
}

#[must_use]
pub fn mat_mat_mul(a: &Matrix, b: &Matrix) -> Matrix {
    let rows = a.len();
    let inner = b.len();
    let cols = b.first().map_or(0, Vec::len);
    let mut out = zeros(rows, cols);
    for i in 0..rows {
        for (k, a_row_k) in a[i].iter().enumerate().take(inner) {
            if *a_row_k == 0.0 {
                continue;
            }
            for j in 0..cols {
                out[i][j] += a_row_k * b[k][j];
            }
        }
    }
    out
}

/// Solve `a x = b` via Gauss-Jordan elimination with partial pivoting.
///
/// # Errors
/// Returns `IxaError` if `a` is singular to numerical precision.
pub fn solve(a: &Matrix, b: &[f64]) -> Result<Vec<f64>, IxaError> {
    let n = a.len();
    let mut aug: Vec<Vec<f64>> = a
        .iter()
        .zip(b)
        .map(|(row, bi)| {
            let mut r = row.clone();
            r.push(*bi);
            r
        })
        .collect();

    for col in 0..n {
        let pivot_row = (col..n)
            .max_by(|&r1, &r2| aug[r1][col].abs().total_cmp(&aug[r2][col].abs()))
            .unwrap();
        if aug[pivot_row][col].abs() < 1e-14 {
            return Err(IxaError::IxaError(
                "linear system is singular to working precision".to_string(),
            ));
        }
        aug.swap(col, pivot_row);

        let pivot = aug[col][col];
        for v in &mut aug[col] {
            *v /= pivot;
        }
        for row in 0..n {
            if row == col {
                continue;
            }
            let factor = aug[row][col];
            if factor == 0.0 {
                continue;
            }
            for c in 0..=n {
                aug[row][c] -= factor * aug[col][c];
            }
        }
    }
    Ok(aug.into_iter().map(|row| row[n]).collect())
}

/// Estimate the spectral radius of a square matrix via power iteration.
#[must_use]
pub fn spectral_radius(a: &Matrix, iterations: usize) -> f64 {
    let n = a.len();
    if n == 0 {
        return 0.0;
    }
    let mut v = vec![1.0 / (n as f64).sqrt(); n];
    let mut eigenvalue = 0.0;
    for _ in 0..iterations {
        let w = mat_vec_mul(a, &v);
        let norm: f64 = w.iter().map(|x| x * x).sum::<f64>().sqrt();
        if norm < 1e-300 {
            return 0.0;
        }
        v = w.iter().map(|x| x / norm).collect();
        eigenvalue = norm;
    }
    eigenvalue
}

#[cfg(test)]
mod test {
    use super::{identity, mat_mat_mul, mat_vec_mul, solve, spectral_radius};
    use statrs::assert_almost_eq;

    #[test]
    fn test_identity_mat_vec() {
        let i = identity(3);
        let x = vec![1.0, 2.0, 3.0];
        assert_eq!(mat_vec_mul(&i, &x), x);
    }

    #[test]
    fn test_mat_mat_mul() {
        let a = vec![vec![1.0, 2.0], vec![3.0, 4.0]];
        let b = identity(2);
        let c = mat_mat_mul(&a, &b);
        assert_eq!(c, a);
    }

    #[test]
    fn test_solve_simple_system() {
        // 2x + y = 5 ; x + 3y = 10  =>  x=1, y=3
        let a = vec![vec![2.0, 1.0], vec![1.0, 3.0]];
        let b = vec![5.0, 10.0];
        let x = solve(&a, &b).unwrap();
        assert_almost_eq!(x[0], 1.0, 1e-9);
        assert_almost_eq!(x[1], 3.0, 1e-9);
    }

    #[test]
    fn test_solve_singular_errors() {
        let a = vec![vec![1.0, 2.0], vec![2.0, 4.0]];
        let b = vec![1.0, 2.0];
        assert!(solve(&a, &b).is_err());
    }

    #[test]
    fn test_spectral_radius_diagonal() {
        let a = vec![vec![0.5, 0.0], vec![0.0, 0.2]];
        let rho = spectral_radius(&a, 100);
        assert_almost_eq!(rho, 0.5, 1e-6);
    }
}
