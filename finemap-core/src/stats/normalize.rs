//! Effect-size normalization.
//!
//! With `z = beta / se`:
//! ```text
//! beta' = z / sqrt(N + z^2)
//! se'   = 1 / sqrt(N_min + z^2)
//! z'    = beta' / se'
//! ```
//! where `N` is the row's sample size and `N_min` the smallest sample size
//! among the rows being normalized together.

use finemap_io::SummaryStat;

/// A summary statistic together with the values handed to the fitter.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedStat {
    pub stat: SummaryStat,
    pub effect: f64,
    pub standard_error: f64,
    pub z: f64,
}

impl PreparedStat {
    pub fn variant_index(&self) -> u64 {
        self.stat.variant_index
    }
}

/// Attach fitter inputs to every row, rescaled when `normalize` is set.
pub fn prepare(stats: Vec<SummaryStat>, normalize: bool) -> Vec<PreparedStat> {
    if !normalize {
        return stats
            .into_iter()
            .map(|stat| PreparedStat {
                effect: stat.beta,
                standard_error: stat.standard_error,
                z: stat.beta / stat.standard_error,
                stat,
            })
            .collect();
    }

    let min_n = stats
        .iter()
        .map(|s| s.sample_size)
        .fold(f64::INFINITY, f64::min);
    stats
        .into_iter()
        .map(|stat| {
            let (effect, standard_error, z) = normalize_effect(&stat, min_n);
            PreparedStat {
                stat,
                effect,
                standard_error,
                z,
            }
        })
        .collect()
}

/// Normalized `(beta', se', z')` for one row.
pub fn normalize_effect(stat: &SummaryStat, min_sample_size: f64) -> (f64, f64, f64) {
    let z = stat.beta / stat.standard_error;
    let z2 = z * z;
    let beta = z / (stat.sample_size + z2).sqrt();
    let se = 1.0 / (min_sample_size + z2).sqrt();
    (beta, se, beta / se)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stat(variant_index: u64, beta: f64, se: f64, n: f64) -> SummaryStat {
        SummaryStat {
            variant_index,
            phenotype: "G".to_string(),
            beta,
            standard_error: se,
            sample_size: n,
            i_squared: 0.0,
        }
    }

    #[test]
    fn test_normalize_formula() {
        let s = stat(1, 0.5, 0.1, 10_000.0);
        let (b, se, z) = normalize_effect(&s, 8_000.0);
        // z = 5
        assert!((b - 5.0 / 10_025.0f64.sqrt()).abs() < 1e-12);
        assert!((se - 1.0 / 8_025.0f64.sqrt()).abs() < 1e-12);
        assert!((z - b / se).abs() < 1e-12);
    }

    #[test]
    fn test_equal_sample_sizes_keep_z() {
        let rows = prepare(
            vec![stat(1, 0.5, 0.1, 5000.0), stat(2, -0.2, 0.1, 5000.0)],
            true,
        );
        assert!((rows[0].z - 5.0).abs() < 1e-10);
        assert!((rows[1].z + 2.0).abs() < 1e-10);
        assert_eq!(rows[0].stat.beta, 0.5);
    }

    #[test]
    fn test_min_sample_size_from_rows() {
        let rows = prepare(
            vec![stat(1, 0.3, 0.1, 9000.0), stat(2, 0.3, 0.1, 6000.0)],
            true,
        );
        let expected_se = 1.0 / (6000.0f64 + 9.0).sqrt();
        assert!((rows[0].standard_error - expected_se).abs() < 1e-12);
        assert!((rows[1].standard_error - expected_se).abs() < 1e-12);
        // the larger study is shrunk relative to the smaller one
        assert!(rows[0].z < rows[1].z);
    }

    #[test]
    fn test_disabled_passes_through() {
        let rows = prepare(vec![stat(1, 0.3, 0.1, 9000.0)], false);
        assert_eq!(rows[0].effect, 0.3);
        assert_eq!(rows[0].standard_error, 0.1);
        assert!((rows[0].z - 3.0).abs() < 1e-12);
    }
}
