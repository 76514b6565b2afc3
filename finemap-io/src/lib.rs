//! finemap-io: Input tables and genotype panels for finemap-rs
//!
//! Locus definitions, the variant reference, summary statistic stores and a
//! memory-mapped PLINK panel reader.

pub mod error;
pub mod locus;
pub mod plink;
pub mod reference;
pub mod sumstats;
pub mod tabular;
pub mod traits;

pub use error::InputError;
pub use locus::{read_loci, Locus};
pub use reference::{VariantReference, VariantWindow, WindowError};
pub use sumstats::{InMemoryStatsStore, StatsDirectory, SummaryStat, SummaryStatsStore};
pub use traits::{GenotypeReader, MarkerInfo};
