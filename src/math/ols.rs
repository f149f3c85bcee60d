//! Dense linear least squares and small-matrix helpers.
//!
//! Every iterative estimator in this crate reduces each step to a problem of
//! the form:
//!
//! ```text
//! minimize ‖A δ - b‖²
//! ```
//!
//! Implementation choices:
//! - We scale rows by `sqrt(w_i)` before calling in, so the solver itself is
//!   unweighted.
//! - We use SVD so tall systems (more rows than columns) solve robustly.
//!   (Nalgebra's `QR::solve` is intended for square systems and will panic for
//!   non-square matrices.)
//! - Parameter counts are small (a handful of columns), so SVD cost is
//!   negligible next to model evaluation.

use nalgebra::{DMatrix, DVector};

/// Solve a least squares problem using SVD.
///
/// Returns `None` if the system is too ill-conditioned to solve robustly.
pub fn solve_least_squares(a: &DMatrix<f64>, b: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = a.clone().svd(true, true);

    // Try progressively looser tolerances if strict solve fails.
    for &tol in &[1e-12, 1e-10, 1e-8] {
        if let Ok(x) = svd.solve(b, tol) {
            if x.iter().all(|v| v.is_finite()) {
                return Some(x);
            }
        }
    }

    None
}

/// Inverse of a symmetric positive-definite matrix (normal matrix `JᵀWJ`).
///
/// Returns `None` when the matrix is singular or numerically indefinite.
pub fn invert_normal_matrix(m: &DMatrix<f64>) -> Option<DMatrix<f64>> {
    if m.nrows() != m.ncols() || m.iter().any(|v| !v.is_finite()) {
        return None;
    }
    // Relative rank test: Cholesky alone accepts badly conditioned matrices.
    let svd = m.clone().svd(false, false);
    let s_max = svd.singular_values.max();
    let s_min = svd.singular_values.min();
    if !(s_max > 0.0) || s_min <= s_max * 1e-14 {
        return None;
    }
    let inv = m.clone().cholesky().map(|c| c.inverse()).or_else(|| m.clone().try_inverse())?;
    inv.iter().all(|v| v.is_finite()).then_some(inv)
}

/// Cholesky factor `L` (lower) of a covariance matrix, if positive definite.
pub fn cholesky_lower(m: &DMatrix<f64>) -> Option<DMatrix<f64>> {
    m.clone().cholesky().map(|c| c.l())
}

/// Convert a matrix to row-major nested vectors (for serialization).
pub fn to_rows(m: &DMatrix<f64>) -> Vec<Vec<f64>> {
    (0..m.nrows())
        .map(|i| (0..m.ncols()).map(|j| m[(i, j)]).collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn least_squares_solves_simple_system() {
        // Fit y = 2 + 3x on x = [0,1,2]
        let a = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0]);
        let b = DVector::from_row_slice(&[2.0, 5.0, 8.0]);

        let x = solve_least_squares(&a, &b).unwrap();
        assert_relative_eq!(x[0], 2.0, epsilon = 1e-10);
        assert_relative_eq!(x[1], 3.0, epsilon = 1e-10);
    }

    #[test]
    fn singular_normal_matrix_is_rejected() {
        let m = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 4.0]);
        assert!(invert_normal_matrix(&m).is_none());

        let m = DMatrix::from_row_slice(2, 2, &[4.0, 1.0, 1.0, 3.0]);
        let inv = invert_normal_matrix(&m).unwrap();
        let id = &m * &inv;
        assert_relative_eq!(id[(0, 0)], 1.0, epsilon = 1e-12);
        assert_relative_eq!(id[(0, 1)], 0.0, epsilon = 1e-12);
    }
}
