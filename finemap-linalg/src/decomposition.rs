//! Symmetric eigendecomposition.
//!
//! Thin wrapper around faer's self-adjoint eigen solver, used to check that
//! an LD window is positive semi-definite.

use crate::dense::DenseMatrix;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LinalgError {
    #[error("Matrix is not square: {nrows} x {ncols}")]
    NotSquare { nrows: usize, ncols: usize },

    #[error("Matrix contains non-finite entries")]
    NonFinite,
}

/// Eigenvalues and eigenvectors of a symmetric matrix.
///
/// Eigenvalues are sorted in descending order; column `k` of `vectors`
/// belongs to `values[k]`.
pub struct SymmetricEigen {
    pub values: Vec<f64>,
    pub vectors: DenseMatrix,
}

impl SymmetricEigen {
    pub fn new(a: &DenseMatrix) -> Result<Self, LinalgError> {
        let n = a.nrows();
        if n != a.ncols() {
            return Err(LinalgError::NotSquare {
                nrows: n,
                ncols: a.ncols(),
            });
        }
        for i in 0..n {
            for j in 0..n {
                if !a.get(i, j).is_finite() {
                    return Err(LinalgError::NonFinite);
                }
            }
        }

        let evd = a.as_faer().selfadjoint_eigendecomposition(faer::Side::Lower);
        let s = evd.s();
        let u = evd.u();

        // faer returns ascending order
        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&x, &y| {
            s.column_vector()
                .read(y)
                .partial_cmp(&s.column_vector().read(x))
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let values: Vec<f64> = order.iter().map(|&k| s.column_vector().read(k)).collect();
        let mut vectors = DenseMatrix::zeros(n, n);
        for (col, &k) in order.iter().enumerate() {
            for row in 0..n {
                vectors.set(row, col, u.read(row, k));
            }
        }

        Ok(Self { values, vectors })
    }

    /// Smallest eigenvalue, or 0 for an empty matrix.
    pub fn min_value(&self) -> f64 {
        self.values.last().copied().unwrap_or(0.0)
    }
}
