//! Summary-statistic extraction for one phenotype and window.

use anyhow::Result;
use tracing::debug;

use finemap_io::{SummaryStat, SummaryStatsStore, VariantWindow};

pub struct SummaryStatisticsExtractor<'a> {
    store: &'a dyn SummaryStatsStore,
}

impl<'a> SummaryStatisticsExtractor<'a> {
    pub fn new(store: &'a dyn SummaryStatsStore) -> Self {
        Self { store }
    }

    /// Rows for `phenotype` inside `window`, ascending by variant index.
    ///
    /// A phenotype the store does not know yields no rows.
    pub fn extract(&self, phenotype: &str, window: VariantWindow) -> Result<Vec<SummaryStat>> {
        let mut rows: Vec<SummaryStat> = self
            .store
            .fetch(phenotype, window)?
            .into_iter()
            .filter(|s| s.phenotype == phenotype && window.contains(s.variant_index))
            .collect();
        rows.sort_by_key(|s| s.variant_index);
        debug!(
            "{}: {} statistics in [{}, {}]",
            phenotype,
            rows.len(),
            window.start,
            window.end
        );
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use finemap_io::InMemoryStatsStore;

    fn stat(phenotype: &str, variant_index: u64) -> SummaryStat {
        SummaryStat {
            variant_index,
            phenotype: phenotype.to_string(),
            beta: 0.1,
            standard_error: 0.05,
            sample_size: 1000.0,
            i_squared: 0.0,
        }
    }

    #[test]
    fn test_extract_window_and_phenotype() {
        let store: InMemoryStatsStore = vec![
            stat("GENE1", 7),
            stat("GENE1", 3),
            stat("GENE1", 12),
            stat("GENE2", 5),
        ]
        .into_iter()
        .collect();
        let extractor = SummaryStatisticsExtractor::new(&store);

        let rows = extractor
            .extract("GENE1", VariantWindow { start: 3, end: 10 })
            .unwrap();
        let indices: Vec<u64> = rows.iter().map(|r| r.variant_index).collect();
        assert_eq!(indices, vec![3, 7]);

        let rows = extractor
            .extract("GENE9", VariantWindow { start: 0, end: 100 })
            .unwrap();
        assert!(rows.is_empty());
    }
}
