//! finemap-linalg: Linear algebra wrappers for finemap-rs
//!
//! Dense matrices (faer), sparse triplet storage (sprs) and the symmetric
//! eigen solver used for LD diagnostics.

pub mod decomposition;
pub mod dense;
pub mod sparse;

pub use decomposition::{LinalgError, SymmetricEigen};
pub use dense::DenseMatrix;
pub use sparse::SparseMatrix;
