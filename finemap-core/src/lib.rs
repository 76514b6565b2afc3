//! finemap-core: Locus fine-mapping for finemap-rs
//!
//! Clusters loci, builds one validated LD matrix per cluster, aligns and
//! normalizes per-gene summary statistics, fits SuSiE-RSS with a
//! credible-set-count fallback, and flattens the results into output rows.

pub mod assemble;
pub mod cluster;
pub mod config;
pub mod engine;
pub mod ld;
pub mod output;
pub mod postprocess;
pub mod runner;
pub mod stats;
pub mod susie;

pub use config::{EngineConfig, SusieConfig};
pub use engine::{Engine, EngineOutput};
