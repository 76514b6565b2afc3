//! Credible sets from single-effect posterior weights.

use std::collections::HashSet;

use finemap_linalg::DenseMatrix;

/// Credible set of one slot, members as positions in the fit.
#[derive(Debug, Clone, PartialEq)]
pub struct FittedSet {
    pub slot: usize,
    /// Ordered by decreasing posterior weight.
    pub members: Vec<usize>,
    /// Summed posterior weight of the members.
    pub coverage: f64,
    /// Minimum absolute correlation between members.
    pub purity: f64,
}

/// Smallest top-weight set per slot reaching `coverage`.
///
/// Slots with prior variance at or below `prior_tol` carry no signal and
/// are skipped, as are impure sets and sets identical to an earlier slot's.
pub fn credible_sets(
    alpha: &[Vec<f64>],
    prior_variance: &[f64],
    ld: &DenseMatrix,
    coverage: f64,
    min_abs_corr: f64,
    prior_tol: f64,
) -> Vec<FittedSet> {
    let mut seen: HashSet<Vec<usize>> = HashSet::new();
    let mut sets = Vec::new();
    for (slot, weights) in alpha.iter().enumerate() {
        if prior_variance[slot] <= prior_tol {
            continue;
        }
        let (members, reached) = top_coverage(weights, coverage);
        let mut key = members.clone();
        key.sort_unstable();
        if !seen.insert(key) {
            continue;
        }
        let purity = min_abs_corr_of(&members, ld);
        if purity < min_abs_corr {
            continue;
        }
        sets.push(FittedSet {
            slot,
            members,
            coverage: reached,
            purity,
        });
    }
    sets
}

fn top_coverage(weights: &[f64], coverage: f64) -> (Vec<usize>, f64) {
    let mut order: Vec<usize> = (0..weights.len()).collect();
    order.sort_by(|&a, &b| weights[b].total_cmp(&weights[a]).then(a.cmp(&b)));
    let mut total = 0.0;
    let mut members = Vec::new();
    for j in order {
        members.push(j);
        total += weights[j];
        if total >= coverage {
            break;
        }
    }
    (members, total)
}

fn min_abs_corr_of(members: &[usize], ld: &DenseMatrix) -> f64 {
    let mut purity: f64 = 1.0;
    for (k, &i) in members.iter().enumerate() {
        for &j in &members[k + 1..] {
            purity = purity.min(ld.get(i, j).abs());
        }
    }
    purity
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concentrated_weight_gives_singleton() {
        let alpha = vec![vec![0.01, 0.97, 0.02]];
        let sets = credible_sets(&alpha, &[0.1], &DenseMatrix::identity(3), 0.95, 0.5, 1e-9);
        assert_eq!(sets.len(), 1);
        assert_eq!(sets[0].members, vec![1]);
        assert_eq!(sets[0].purity, 1.0);
    }

    #[test]
    fn test_impure_set_dropped() {
        // weight split between two uncorrelated variants
        let alpha = vec![vec![0.5, 0.5, 0.0]];
        let sets = credible_sets(&alpha, &[0.1], &DenseMatrix::identity(3), 0.95, 0.5, 1e-9);
        assert!(sets.is_empty());

        let mut ld = DenseMatrix::identity(3);
        ld.set(0, 1, 0.9);
        ld.set(1, 0, 0.9);
        let sets = credible_sets(&alpha, &[0.1], &ld, 0.95, 0.5, 1e-9);
        assert_eq!(sets.len(), 1);
        assert!((sets[0].purity - 0.9).abs() < 1e-12);
        assert!((sets[0].coverage - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_duplicates_and_null_slots_skipped() {
        let alpha = vec![
            vec![0.0, 0.99, 0.01],
            vec![0.0, 0.98, 0.02],
            vec![0.96, 0.02, 0.02],
        ];
        let sets = credible_sets(
            &alpha,
            &[0.1, 0.1, 0.0],
            &DenseMatrix::identity(3),
            0.95,
            0.5,
            1e-9,
        );
        assert_eq!(sets.len(), 1);
        assert_eq!(sets[0].slot, 0);
    }
}
