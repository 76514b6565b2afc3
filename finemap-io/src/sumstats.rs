//! Per-variant association summary statistics.
//!
//! Statistics are keyed by (phenotype, variantIndex) and always queried by
//! phenotype plus a closed variant-index window. The on-disk store keeps one
//! file per phenotype, sorted by variant index:
//! ```text
//! variantIndex  beta    standardError  sampleSize  iSquared
//! 1041          0.031   0.012          31684       0
//! ```

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tracing::debug;

use crate::error::InputError;
use crate::reference::VariantWindow;
use crate::tabular::{parse_field, parse_numeric, split_fields, TableHeader};

/// One tested (variant, phenotype) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryStat {
    pub variant_index: u64,
    pub phenotype: String,
    pub beta: f64,
    pub standard_error: f64,
    pub sample_size: f64,
    pub i_squared: f64,
}

/// Source of summary statistics for a phenotype and variant window.
///
/// Implementations return rows in ascending variant-index order.
pub trait SummaryStatsStore {
    fn fetch(&self, phenotype: &str, window: VariantWindow) -> Result<Vec<SummaryStat>>;
}

/// Statistics held in memory, keyed by (phenotype, variantIndex).
#[derive(Debug, Clone, Default)]
pub struct InMemoryStatsStore {
    rows: BTreeMap<(String, u64), SummaryStat>,
}

impl InMemoryStatsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a row, replacing any previous row with the same key.
    pub fn insert(&mut self, stat: SummaryStat) {
        self.rows
            .insert((stat.phenotype.clone(), stat.variant_index), stat);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl FromIterator<SummaryStat> for InMemoryStatsStore {
    fn from_iter<I: IntoIterator<Item = SummaryStat>>(iter: I) -> Self {
        let mut store = Self::new();
        for stat in iter {
            store.insert(stat);
        }
        store
    }
}

impl SummaryStatsStore for InMemoryStatsStore {
    fn fetch(&self, phenotype: &str, window: VariantWindow) -> Result<Vec<SummaryStat>> {
        let lo = (phenotype.to_string(), window.start);
        let hi = (phenotype.to_string(), window.end);
        Ok(self.rows.range(lo..=hi).map(|(_, s)| s.clone()).collect())
    }
}

/// Directory of per-phenotype TSV files, streamed on every query.
#[derive(Debug, Clone)]
pub struct StatsDirectory {
    dir: PathBuf,
    suffix: String,
}

impl StatsDirectory {
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            bail!("Summary statistics directory not found: {}", dir.display());
        }
        Ok(Self {
            dir: dir.to_path_buf(),
            suffix: ".tsv".to_string(),
        })
    }

    /// File holding a phenotype's statistics.
    pub fn phenotype_path(&self, phenotype: &str) -> PathBuf {
        self.dir.join(format!("{}{}", phenotype, self.suffix))
    }
}

impl SummaryStatsStore for StatsDirectory {
    fn fetch(&self, phenotype: &str, window: VariantWindow) -> Result<Vec<SummaryStat>> {
        let path = self.phenotype_path(phenotype);
        if !path.exists() {
            debug!("No summary statistics file for {}", phenotype);
            return Ok(Vec::new());
        }
        let file = File::open(&path)
            .with_context(|| format!("Failed to open summary statistics: {}", path.display()))?;
        let mut lines = BufReader::new(file).lines();

        let header_line = match lines.next() {
            Some(line) => line?,
            None => return Err(InputError::EmptyFile { path }.into()),
        };
        let header = TableHeader::parse(&path, &header_line);
        let index_idx = header.require("variantIndex")?;
        let beta_idx = header.require("beta")?;
        let se_idx = header.require("standardError")?;
        let n_idx = header.require("sampleSize")?;
        let i2_idx = header.require("iSquared")?;

        let mut rows = Vec::new();
        let mut previous: Option<u64> = None;
        for (line_num, line) in lines.enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let line_no = line_num + 2;
            let fields = split_fields(&line);
            let variant_index: u64 =
                parse_field(&fields, index_idx, "variantIndex", &path, line_no)?;

            if previous.is_some_and(|p| variant_index < p) {
                bail!(
                    "{}:{}: rows are not sorted by variantIndex",
                    path.display(),
                    line_no
                );
            }
            previous = Some(variant_index);

            if variant_index < window.start {
                continue;
            }
            if variant_index > window.end {
                break;
            }

            rows.push(SummaryStat {
                variant_index,
                phenotype: phenotype.to_string(),
                beta: parse_numeric(&fields, beta_idx, "beta", &path, line_no)?,
                standard_error: parse_numeric(&fields, se_idx, "standardError", &path, line_no)?,
                sample_size: parse_numeric(&fields, n_idx, "sampleSize", &path, line_no)?,
                i_squared: parse_numeric(&fields, i2_idx, "iSquared", &path, line_no)?,
            });
        }
        Ok(rows)
    }
}
