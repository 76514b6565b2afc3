//! Sample-size and heterogeneity thresholds.
//!
//! A row is excluded from fitting when its estimate is unusable, when
//! `sampleSize < max(sampleSize) * minSampleSizeProportion`, or when
//! `iSquared > maxISquared`. Excluded rows are kept so that they can be
//! reported with NA posterior fields.

use finemap_io::SummaryStat;

/// Why a row was excluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exclusion {
    /// Non-finite beta or sample size, or a standard error that is not a
    /// positive number.
    InvalidEstimate,
    LowSampleSize,
    Heterogeneity,
}

#[derive(Debug, Clone, Default)]
pub struct FilterOutcome {
    pub kept: Vec<SummaryStat>,
    pub excluded: Vec<(SummaryStat, Exclusion)>,
}

fn is_usable(stat: &SummaryStat) -> bool {
    stat.beta.is_finite()
        && stat.standard_error.is_finite()
        && stat.standard_error > 0.0
        && stat.sample_size.is_finite()
}

/// Split `stats` into rows to fit and rows to report only.
///
/// The maximum sample size is taken over usable rows. A missing `iSquared`
/// (NaN) never exceeds the threshold.
pub fn apply_thresholds(
    stats: Vec<SummaryStat>,
    max_i_squared: f64,
    min_sample_size_proportion: f64,
) -> FilterOutcome {
    let max_n = stats
        .iter()
        .filter(|s| is_usable(s))
        .map(|s| s.sample_size)
        .fold(f64::NEG_INFINITY, f64::max);
    let min_n = max_n * min_sample_size_proportion;

    let mut outcome = FilterOutcome::default();
    for stat in stats {
        let exclusion = if !is_usable(&stat) {
            Some(Exclusion::InvalidEstimate)
        } else if stat.sample_size < min_n {
            Some(Exclusion::LowSampleSize)
        } else if stat.i_squared > max_i_squared {
            Some(Exclusion::Heterogeneity)
        } else {
            None
        };
        match exclusion {
            Some(reason) => outcome.excluded.push((stat, reason)),
            None => outcome.kept.push(stat),
        }
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stat(variant_index: u64, sample_size: f64, i_squared: f64) -> SummaryStat {
        SummaryStat {
            variant_index,
            phenotype: "G".to_string(),
            beta: 0.2,
            standard_error: 0.1,
            sample_size,
            i_squared,
        }
    }

    #[test]
    fn test_sample_size_threshold_is_relative() {
        let outcome = apply_thresholds(
            vec![
                stat(1, 10_000.0, 0.0),
                stat(2, 8_000.0, 0.0),
                stat(3, 7_999.0, 0.0),
            ],
            40.0,
            0.8,
        );
        let kept: Vec<u64> = outcome.kept.iter().map(|s| s.variant_index).collect();
        assert_eq!(kept, vec![1, 2]);
        assert_eq!(outcome.excluded.len(), 1);
        assert_eq!(outcome.excluded[0].1, Exclusion::LowSampleSize);
    }

    #[test]
    fn test_heterogeneity_threshold() {
        let outcome = apply_thresholds(
            vec![
                stat(1, 100.0, 40.0),
                stat(2, 100.0, 40.5),
                stat(3, 100.0, f64::NAN),
            ],
            40.0,
            0.8,
        );
        let kept: Vec<u64> = outcome.kept.iter().map(|s| s.variant_index).collect();
        assert_eq!(kept, vec![1, 3]);
        assert_eq!(outcome.excluded[0].1, Exclusion::Heterogeneity);
    }

    #[test]
    fn test_unusable_rows_do_not_set_the_maximum() {
        let mut bad = stat(1, 1_000_000.0, 0.0);
        bad.standard_error = 0.0;
        let outcome = apply_thresholds(vec![bad, stat(2, 500.0, 0.0)], 40.0, 0.8);
        assert_eq!(outcome.kept.len(), 1);
        assert_eq!(outcome.kept[0].variant_index, 2);
        assert_eq!(outcome.excluded[0].1, Exclusion::InvalidEstimate);
    }
}
