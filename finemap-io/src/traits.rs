//! Core trait for reading genotype panels.

use anyhow::Result;

/// Information about a panel marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerInfo {
    pub chrom: String,
    pub pos: u64,
    pub id: String,
}

/// Random-access reader over a genotype panel, one marker at a time.
///
/// Callers read only the markers of the current window, so a panel is never
/// materialized as a whole.
pub trait GenotypeReader: Send {
    fn n_markers(&self) -> usize;

    fn n_samples(&self) -> usize;

    fn marker_info(&self, index: u64) -> Result<MarkerInfo>;

    /// Dosages of the alternative allele (0.0 to 2.0, NaN for missing).
    fn read_dosages(&self, index: u64) -> Result<Vec<f64>>;

    /// Panel rows of every marker at (chrom, pos), in panel order. More than
    /// one row means a split multi-allelic site.
    fn find_markers(&self, chrom: &str, pos: u64) -> Vec<u64>;
}
