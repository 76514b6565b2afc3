//! Linkage-disequilibrium matrices: labelled storage, sources and the
//! validating builder.

pub mod builder;
pub mod matrix;
pub mod source;
pub mod store;

pub use builder::LdMatrixBuilder;
pub use matrix::{compute_ld_matrix, LdError, LdMatrix};
pub use source::{LdSource, MatrixStoreSource, PanelLdSource, RhoTableSource};
pub use store::MatrixStore;
