//! Interchangeable LD providers.
//!
//! Every source answers the same question: the correlation matrix over the
//! variant indices `window.start..=window.end`, labelled ascending.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::debug;

use finemap_io::tabular::{parse_field, split_fields, TableHeader};
use finemap_io::{GenotypeReader, InputError, VariantReference, VariantWindow};
use finemap_linalg::SparseMatrix;

use super::matrix::{compute_ld_matrix, LdError, LdMatrix};
use super::store::MatrixStore;

pub trait LdSource {
    fn range_to_matrix(&self, window: VariantWindow) -> Result<LdMatrix, LdError>;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

/// LD computed on the fly from a genotype panel.
///
/// Variants are matched to panel markers by (chromosome, position). At a
/// split multi-allelic site the k-th reference variant, by variant index,
/// reads the k-th panel row at that position.
pub struct PanelLdSource<'a, R: GenotypeReader> {
    reader: R,
    reference: &'a VariantReference,
}

impl<'a, R: GenotypeReader> PanelLdSource<'a, R> {
    pub fn new(reader: R, reference: &'a VariantReference) -> Self {
        Self { reader, reference }
    }
}

impl<R: GenotypeReader> PanelLdSource<'_, R> {
    fn marker_of(&self, variant: u64) -> Result<u64, LdError> {
        let missing = || LdError::NotInPanel { variant };
        let (chrom, pos) = self.reference.locate(variant).ok_or_else(missing)?;
        let siblings = self.reference.variants_at(chrom, pos);
        let rank = siblings
            .iter()
            .position(|e| e.variant_index == variant)
            .ok_or_else(missing)?;
        let rows = self.reader.find_markers(chrom, pos);
        if rows.len() != siblings.len() {
            debug!(
                "{}:{} has {} reference variants and {} panel markers",
                chrom,
                pos,
                siblings.len(),
                rows.len()
            );
        }
        rows.get(rank).copied().ok_or_else(missing)
    }
}

impl<R: GenotypeReader> LdSource for PanelLdSource<'_, R> {
    fn range_to_matrix(&self, window: VariantWindow) -> Result<LdMatrix, LdError> {
        let order: Vec<u64> = (window.start..=window.end).collect();
        let mut dosages = Vec::with_capacity(order.len());
        for &variant in &order {
            let marker = self.marker_of(variant)?;
            dosages.push(self.reader.read_dosages(marker)?);
        }
        debug!(
            "Panel LD over [{}, {}]: {} markers x {} samples",
            window.start,
            window.end,
            order.len(),
            self.reader.n_samples()
        );
        LdMatrix::new(order, compute_ld_matrix(dosages))
    }

    fn name(&self) -> &'static str {
        "plink"
    }
}

/// Pairwise correlations from a `variantIndexA variantIndexB rho` table.
///
/// The table is streamed on every request and only pairs inside the window
/// are kept. Unlisted pairs are uncorrelated; the diagonal is 1.
#[derive(Debug, Clone)]
pub struct RhoTableSource {
    path: PathBuf,
}

impl RhoTableSource {
    pub fn new(path: &Path) -> anyhow::Result<Self> {
        if !path.is_file() {
            anyhow::bail!("LD table not found: {}", path.display());
        }
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    fn read_pairs(&self, window: VariantWindow) -> anyhow::Result<BTreeMap<(u64, u64), f64>> {
        let path = self.path.as_path();
        let file =
            File::open(path).with_context(|| format!("Failed to open LD table: {}", path.display()))?;
        let mut lines = BufReader::new(file).lines();
        let header_line = lines
            .next()
            .ok_or_else(|| InputError::EmptyFile {
                path: path.to_path_buf(),
            })?
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let header = TableHeader::parse(path, &header_line);
        let a_idx = header.require("variantIndexA")?;
        let b_idx = header.require("variantIndexB")?;
        let rho_idx = header.require("rho")?;

        let mut pairs = BTreeMap::new();
        for (line_num, line) in lines.enumerate() {
            let line = line.with_context(|| format!("Failed to read {}", path.display()))?;
            if line.trim().is_empty() {
                continue;
            }
            let fields = split_fields(&line);
            let line_no = line_num + 2;
            let a: u64 = parse_field(&fields, a_idx, "variantIndexA", path, line_no)?;
            let b: u64 = parse_field(&fields, b_idx, "variantIndexB", path, line_no)?;
            if a == b || !window.contains(a) || !window.contains(b) {
                continue;
            }
            let rho: f64 = parse_field(&fields, rho_idx, "rho", path, line_no)?;
            pairs.insert((a.min(b), a.max(b)), rho);
        }
        Ok(pairs)
    }
}

impl LdSource for RhoTableSource {
    fn range_to_matrix(&self, window: VariantWindow) -> Result<LdMatrix, LdError> {
        let pairs = self.read_pairs(window)?;
        let k = window.span();
        let mut rows = Vec::with_capacity(k + 2 * pairs.len());
        let mut cols = Vec::with_capacity(rows.capacity());
        let mut vals = Vec::with_capacity(rows.capacity());
        for i in 0..k {
            rows.push(i);
            cols.push(i);
            vals.push(1.0);
        }
        for (&(a, b), &rho) in &pairs {
            let i = (a - window.start) as usize;
            let j = (b - window.start) as usize;
            rows.extend([i, j]);
            cols.extend([j, i]);
            vals.extend([rho, rho]);
        }
        let sparse = SparseMatrix::from_triplets(k, k, &rows, &cols, &vals);
        debug!(
            "Rho table LD over [{}, {}]: {} stored entries",
            window.start,
            window.end,
            sparse.nnz()
        );
        LdMatrix::new((window.start..=window.end).collect(), sparse.to_dense())
    }

    fn name(&self) -> &'static str {
        "rho-table"
    }
}

/// Precomputed matrices from a keyed store, sliced to the request.
#[derive(Debug, Clone)]
pub struct MatrixStoreSource {
    store: MatrixStore,
}

impl MatrixStoreSource {
    pub fn new(store: MatrixStore) -> Self {
        Self { store }
    }
}

impl LdSource for MatrixStoreSource {
    fn range_to_matrix(&self, window: VariantWindow) -> Result<LdMatrix, LdError> {
        let stored = self
            .store
            .covering(window)?
            .ok_or(LdError::NotStored {
                start: window.start,
                end: window.end,
            })?;
        let matrix = self.store.load(stored)?;
        let order: Vec<u64> = (window.start..=window.end).collect();
        matrix.subset(&order).map_err(|e| LdError::Labels {
            start: window.start,
            end: window.end,
            detail: format!("stored range [{}, {}]: {}", stored.start, stored.end, e),
        })
    }

    fn name(&self) -> &'static str {
        "matrix-store"
    }
}
