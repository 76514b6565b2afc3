pub mod coalesce;
pub mod filter;
pub mod ld_matrix;
pub mod run;
