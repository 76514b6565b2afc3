#![allow(clippy::needless_range_loop)]
//! Sparse matrix storage backed by sprs.
//!
//! Pairwise LD tables only list correlated pairs, so they are collected as
//! triplets, compressed to CSR and densified once the window is known.

use sprs::{CsMatI, TriMat};

use crate::dense::DenseMatrix;

/// A sparse matrix wrapper around sprs CSR format.
#[derive(Debug, Clone)]
pub struct SparseMatrix {
    inner: CsMatI<f64, usize>,
    nrows: usize,
    ncols: usize,
}

impl SparseMatrix {
    /// Create a sparse matrix from COO (coordinate) triplets.
    ///
    /// Duplicate coordinates are summed, as in sprs.
    pub fn from_triplets(
        nrows: usize,
        ncols: usize,
        rows: &[usize],
        cols: &[usize],
        vals: &[f64],
    ) -> Self {
        assert_eq!(rows.len(), cols.len());
        assert_eq!(rows.len(), vals.len());
        let mut tri = TriMat::new((nrows, ncols));
        for i in 0..rows.len() {
            tri.add_triplet(rows[i], cols[i], vals[i]);
        }
        Self {
            inner: tri.to_csr(),
            nrows,
            ncols,
        }
    }

    pub fn nrows(&self) -> usize {
        self.nrows
    }

    pub fn ncols(&self) -> usize {
        self.ncols
    }

    /// Number of stored entries.
    pub fn nnz(&self) -> usize {
        self.inner.nnz()
    }

    /// Get element at (row, col). Returns 0.0 if not stored.
    pub fn get(&self, row: usize, col: usize) -> f64 {
        match self.inner.get(row, col) {
            Some(&v) => v,
            None => 0.0,
        }
    }

    /// Expand into a dense matrix.
    pub fn to_dense(&self) -> DenseMatrix {
        let mut dense = DenseMatrix::zeros(self.nrows, self.ncols);
        for (&val, (i, j)) in self.inner.iter() {
            dense.set(i, j, val);
        }
        dense
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_triplets() {
        let m = SparseMatrix::from_triplets(2, 2, &[0, 1], &[0, 1], &[3.0, 7.0]);
        assert_eq!(m.nnz(), 2);
        assert_eq!(m.get(0, 0), 3.0);
        assert_eq!(m.get(1, 1), 7.0);
        assert_eq!(m.get(0, 1), 0.0);
    }

    #[test]
    fn test_to_dense() {
        let m = SparseMatrix::from_triplets(3, 3, &[0, 2, 1], &[2, 0, 1], &[0.4, 0.4, 1.0]);
        let d = m.to_dense();
        assert_eq!(d.get(0, 2), 0.4);
        assert_eq!(d.get(2, 0), 0.4);
        assert_eq!(d.get(1, 1), 1.0);
        assert_eq!(d.get(0, 0), 0.0);
    }
}
