//! Keyed alignment of statistics to LD labels.

use std::collections::HashSet;

use thiserror::Error;

use crate::ld::LdMatrix;
use crate::stats::PreparedStat;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AlignmentError {
    #[error("variant {0} appears more than once in the statistics")]
    Duplicate(u64),

    #[error("{count} statistics have no LD row (first: variant {first})")]
    MissingFromLd { count: usize, first: u64 },

    #[error("reordered statistics do not match the LD order")]
    OrderMismatch,
}

/// Statistics and LD restricted to their common variants, in LD order.
#[derive(Debug, Clone)]
pub struct Alignment {
    /// Index into the input statistics for each aligned row.
    pub rows: Vec<usize>,
    pub ld: LdMatrix,
}

impl Alignment {
    pub fn variant_order(&self) -> &[u64] {
        self.ld.variant_order()
    }
}

/// Join `stats` onto `ld` by variant index.
///
/// The intersection keeps the LD label order. The statistics are reordered
/// by a keyed lookup of each row's LD position, and the resulting sequence
/// must equal the intersection element for element: a statistic with no LD
/// row, or a variant present twice, forbids fitting.
pub fn align(stats: &[PreparedStat], ld: &LdMatrix) -> Result<Alignment, AlignmentError> {
    let positions = ld.positions();

    let stat_variants: HashSet<u64> = stats.iter().map(|s| s.variant_index()).collect();
    let intersection: Vec<u64> = ld
        .variant_order()
        .iter()
        .copied()
        .filter(|v| stat_variants.contains(v))
        .collect();

    let mut rows: Vec<usize> = (0..stats.len()).collect();
    rows.sort_by_key(|&i| {
        let v = stats[i].variant_index();
        (positions.get(&v).copied().unwrap_or(usize::MAX), v)
    });
    let reordered: Vec<u64> = rows.iter().map(|&i| stats[i].variant_index()).collect();

    if reordered != intersection {
        return Err(diagnose(&reordered, &positions));
    }

    let ld = ld
        .subset(&intersection)
        .map_err(|_| AlignmentError::OrderMismatch)?;
    Ok(Alignment { rows, ld })
}

fn diagnose(
    reordered: &[u64],
    positions: &std::collections::HashMap<u64, usize>,
) -> AlignmentError {
    let missing: Vec<u64> = reordered
        .iter()
        .copied()
        .filter(|v| !positions.contains_key(v))
        .collect();
    if let Some(&first) = missing.first() {
        return AlignmentError::MissingFromLd {
            count: missing.len(),
            first,
        };
    }
    let mut seen = HashSet::new();
    if let Some(&dup) = reordered.iter().find(|&&v| !seen.insert(v)) {
        return AlignmentError::Duplicate(dup);
    }
    AlignmentError::OrderMismatch
}
