//! Variant reference: the join key between every other table.
//!
//! Tab-delimited with at least the columns
//! `variantIndex chromosome basePairPosition`. Rows are kept sorted by
//! (chromosome, position, variantIndex), so a closed base-pair interval maps
//! to a contiguous run and a variant-index window is its min and max key.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use thiserror::Error;
use tracing::debug;

use crate::error::InputError;
use crate::tabular::{parse_field, split_fields, TableHeader};

/// One row of the variant reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferenceEntry {
    pub variant_index: u64,
    pub position: u64,
}

/// Closed variant-index range `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VariantWindow {
    pub start: u64,
    pub end: u64,
}

impl VariantWindow {
    pub fn contains(&self, index: u64) -> bool {
        index >= self.start && index <= self.end
    }

    /// Number of indices in the window.
    pub fn span(&self) -> usize {
        (self.end - self.start + 1) as usize
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WindowError {
    #[error("no reference variants in {chrom}:{start}-{end}")]
    EmptyWindow { chrom: String, start: u64, end: u64 },
}

/// In-memory variant reference, indexed both ways.
#[derive(Debug, Clone, Default)]
pub struct VariantReference {
    by_chrom: HashMap<String, Vec<ReferenceEntry>>,
    by_index: HashMap<u64, (String, u64)>,
}

impl VariantReference {
    /// Build from `(variantIndex, chromosome, position)` rows.
    pub fn from_entries<I>(rows: I) -> Result<Self, InputError>
    where
        I: IntoIterator<Item = (u64, String, u64)>,
    {
        let mut by_chrom: HashMap<String, Vec<ReferenceEntry>> = HashMap::new();
        let mut by_index = HashMap::new();
        for (variant_index, chrom, position) in rows {
            if by_index
                .insert(variant_index, (chrom.clone(), position))
                .is_some()
            {
                return Err(InputError::DuplicateVariant {
                    index: variant_index,
                });
            }
            by_chrom.entry(chrom).or_default().push(ReferenceEntry {
                variant_index,
                position,
            });
        }
        for entries in by_chrom.values_mut() {
            entries.sort_by_key(|e| (e.position, e.variant_index));
        }
        Ok(Self { by_chrom, by_index })
    }

    /// Parse a reference file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read variant reference: {}", path.display()))?;

        let mut lines = contents.lines().enumerate();
        let (_, header_line) = lines.next().ok_or_else(|| InputError::EmptyFile {
            path: path.to_path_buf(),
        })?;
        let header = TableHeader::parse(path, header_line);
        let index_idx = header.require("variantIndex")?;
        let chrom_idx = header.require("chromosome")?;
        let pos_idx = header.require("basePairPosition")?;

        let mut rows = Vec::new();
        for (line_num, line) in lines {
            if line.trim().is_empty() {
                continue;
            }
            let fields = split_fields(line);
            let line_no = line_num + 1;
            rows.push((
                parse_field::<u64>(&fields, index_idx, "variantIndex", path, line_no)?,
                parse_field::<String>(&fields, chrom_idx, "chromosome", path, line_no)?,
                parse_field::<u64>(&fields, pos_idx, "basePairPosition", path, line_no)?,
            ));
        }

        let reference = Self::from_entries(rows)?;
        debug!(
            "Variant reference {}: {} variants on {} chromosomes",
            path.display(),
            reference.len(),
            reference.by_chrom.len()
        );
        Ok(reference)
    }

    pub fn len(&self) -> usize {
        self.by_index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_index.is_empty()
    }

    /// Min and max variant index among rows in `[start, end]` on `chrom`.
    pub fn window(&self, chrom: &str, start: u64, end: u64) -> Result<VariantWindow, WindowError> {
        let empty = || WindowError::EmptyWindow {
            chrom: chrom.to_string(),
            start,
            end,
        };
        let entries = self.by_chrom.get(chrom).ok_or_else(empty)?;
        let lo = entries.partition_point(|e| e.position < start);
        let hi = entries.partition_point(|e| e.position <= end);
        if lo >= hi {
            return Err(empty());
        }
        let run = &entries[lo..hi];
        let min = run.iter().map(|e| e.variant_index).min().ok_or_else(empty)?;
        let max = run.iter().map(|e| e.variant_index).max().ok_or_else(empty)?;
        Ok(VariantWindow {
            start: min,
            end: max,
        })
    }

    /// Variant index at an exact position (the lowest index if several
    /// variants share the position).
    pub fn index_at(&self, chrom: &str, position: u64) -> Option<u64> {
        self.variants_at(chrom, position)
            .first()
            .map(|e| e.variant_index)
    }

    /// All rows at an exact position, by ascending variant index.
    pub fn variants_at(&self, chrom: &str, position: u64) -> &[ReferenceEntry] {
        let Some(entries) = self.by_chrom.get(chrom) else {
            return &[];
        };
        let lo = entries.partition_point(|e| e.position < position);
        let hi = entries.partition_point(|e| e.position <= position);
        &entries[lo..hi]
    }

    /// Chromosome and position of a variant index.
    pub fn locate(&self, variant_index: u64) -> Option<(&str, u64)> {
        self.by_index
            .get(&variant_index)
            .map(|(chrom, pos)| (chrom.as_str(), *pos))
    }
}
