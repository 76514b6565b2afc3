//! Flattening unit outcomes into output rows.
//!
//! Every statistic considered for a unit becomes one record, fitted or not;
//! every unit becomes one diagnostic row.

use std::collections::BTreeSet;

use finemap_io::{Locus, VariantReference};

use crate::runner::{format_trace, FailureReason, UnitOutcome, UnitState};

/// One (locus, gene, variant) output row.
#[derive(Debug, Clone, PartialEq)]
pub struct FinemappingRecord {
    pub locus: Locus,
    pub variant_index: u64,
    pub position: Option<u64>,
    pub phenotype: String,
    pub beta: f64,
    pub standard_error: f64,
    pub sample_size: f64,
    pub i_squared: f64,
    /// z handed to the fitter.
    pub z: Option<f64>,
    /// Passed the sample-size and heterogeneity thresholds.
    pub included: bool,
    pub pip: Option<f64>,
    /// Slot of the credible set containing the variant.
    pub credible_set: Option<usize>,
    /// One entry per slot up to the largest candidate L.
    pub lbf: Vec<Option<f64>>,
    pub trace: String,
    pub lambda: Option<f64>,
    pub l: Option<usize>,
    pub residual_variance_estimated: Option<bool>,
}

/// One row per (locus, gene).
#[derive(Debug, Clone, PartialEq)]
pub struct DiagnosticRow {
    pub locus: Locus,
    pub lambda: Option<f64>,
    pub converged: bool,
    pub distinct_credible_sets: usize,
    pub status: UnitState,
}

impl DiagnosticRow {
    /// Belongs in the failed-loci extract.
    pub fn is_failed(&self) -> bool {
        !self.converged || self.distinct_credible_sets == 0
    }
}

pub struct ResultAssembler<'a> {
    reference: &'a VariantReference,
    max_l: usize,
}

impl<'a> ResultAssembler<'a> {
    pub fn new(reference: &'a VariantReference, max_l: usize) -> Self {
        Self { reference, max_l }
    }

    pub fn max_l(&self) -> usize {
        self.max_l
    }

    /// Records ordered by variant index, plus the unit's diagnostic row.
    pub fn assemble(
        &self,
        locus: &Locus,
        outcome: &UnitOutcome,
    ) -> (Vec<FinemappingRecord>, DiagnosticRow) {
        let trace = format_trace(&outcome.trace);
        let lambda = outcome.lambda();
        let fit = outcome.fit.as_ref();

        let base = |stat: &finemap_io::SummaryStat| FinemappingRecord {
            locus: locus.clone(),
            variant_index: stat.variant_index,
            position: self.reference.locate(stat.variant_index).map(|(_, pos)| pos),
            phenotype: stat.phenotype.clone(),
            beta: stat.beta,
            standard_error: stat.standard_error,
            sample_size: stat.sample_size,
            i_squared: stat.i_squared,
            z: None,
            included: false,
            pip: None,
            credible_set: None,
            lbf: vec![None; self.max_l],
            trace: trace.clone(),
            lambda,
            l: fit.map(|f| f.l),
            residual_variance_estimated: fit.map(|f| f.residual_variance_estimated),
        };

        let mut records = Vec::with_capacity(outcome.fitted.len() + outcome.excluded.len());
        for prepared in &outcome.fitted {
            let variant = prepared.variant_index();
            let mut record = base(&prepared.stat);
            record.z = Some(prepared.z);
            record.included = true;
            if let Some(fit) = fit {
                record.pip = fit.pip.get(&variant).copied();
                record.credible_set = fit.credible_set_of(variant);
                for (slot, value) in record.lbf.iter_mut().enumerate() {
                    *value = fit.lbf_of(slot, variant);
                }
            }
            records.push(record);
        }
        for (stat, _) in &outcome.excluded {
            records.push(base(stat));
        }
        records.sort_by_key(|r| r.variant_index);

        let distinct: BTreeSet<usize> = records.iter().filter_map(|r| r.credible_set).collect();
        let diagnostic = DiagnosticRow {
            locus: locus.clone(),
            lambda,
            converged: outcome.all_attempts_converged(),
            distinct_credible_sets: distinct.len(),
            status: outcome.state,
        };
        (records, diagnostic)
    }

    /// Diagnostic row for a unit with no reference variants or no statistics.
    pub fn empty_window(&self, locus: &Locus) -> DiagnosticRow {
        DiagnosticRow {
            locus: locus.clone(),
            lambda: None,
            converged: false,
            distinct_credible_sets: 0,
            status: UnitState::Failed(FailureReason::EmptyWindow),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::ld::LdMatrix;
    use crate::runner::FineMappingRunner;
    use crate::susie::{FitError, FitRequest, FittedSet, Fitter, ModelFit};
    use finemap_io::SummaryStat;
    use finemap_linalg::DenseMatrix;

    struct OneSet;

    impl Fitter for OneSet {
        fn fit(&self, request: &FitRequest<'_>) -> Result<ModelFit, FitError> {
            let p = request.variants.len();
            let mut pip = vec![0.01; p];
            pip[1] = 0.98;
            Ok(ModelFit {
                converged: true,
                iterations: 3,
                pip,
                credible_sets: vec![FittedSet {
                    slot: 0,
                    members: vec![1],
                    coverage: 0.98,
                    purity: 1.0,
                }],
                lbf: (0..request.l).map(|l| vec![l as f64; p]).collect(),
                residual_variance: 0.95,
            })
        }
    }

    fn locus() -> Locus {
        Locus {
            chrom: "1".into(),
            start: 100,
            end: 400,
            gene: "G".into(),
            gene_cluster: "G".into(),
            cluster: "0".into(),
        }
    }

    fn reference() -> VariantReference {
        VariantReference::from_entries((0..4).map(|i| (i, "1".to_string(), 100 + 100 * i))).unwrap()
    }

    fn stat(variant_index: u64, sample_size: f64) -> SummaryStat {
        SummaryStat {
            variant_index,
            phenotype: "G".into(),
            beta: 0.2,
            standard_error: 0.05,
            sample_size,
            i_squared: 0.0,
        }
    }

    #[test]
    fn test_converged_unit() {
        let config = EngineConfig {
            l_candidates: vec![3, 2],
            ..Default::default()
        };
        let runner = FineMappingRunner::new(&config, &OneSet);
        let ld = LdMatrix::new(vec![0, 1, 2, 3], DenseMatrix::identity(4)).unwrap();
        let outcome = runner.run(
            vec![stat(2, 1000.0), stat(0, 1000.0), stat(1, 1000.0), stat(3, 10.0)],
            &ld,
        );
        let reference = reference();
        let assembler = ResultAssembler::new(&reference, config.max_l());
        let (records, diagnostic) = assembler.assemble(&locus(), &outcome);

        let order: Vec<u64> = records.iter().map(|r| r.variant_index).collect();
        assert_eq!(order, vec![0, 1, 2, 3]);
        assert_eq!(records[1].pip, Some(0.98));
        assert_eq!(records[1].credible_set, Some(0));
        assert_eq!(records[1].position, Some(200));
        assert_eq!(records[0].lbf, vec![Some(0.0), Some(1.0), Some(2.0)]);
        assert_eq!(records[0].l, Some(3));

        // excluded by sample size
        assert!(!records[3].included);
        assert_eq!(records[3].pip, None);
        assert_eq!(records[3].lbf, vec![None; 3]);
        assert_eq!(records[3].lambda, Some(0.95));

        assert!(diagnostic.converged);
        assert_eq!(diagnostic.distinct_credible_sets, 1);
        assert!(!diagnostic.is_failed());
    }

    /// Fails to converge for every L above 1.
    struct OnlySingleEffect;

    impl Fitter for OnlySingleEffect {
        fn fit(&self, request: &FitRequest<'_>) -> Result<ModelFit, FitError> {
            if request.l > 1 {
                return Err(FitError::Numerical {
                    iteration: 7,
                    detail: "diverged".into(),
                });
            }
            OneSet.fit(request)
        }
    }

    #[test]
    fn test_later_candidate_success_is_not_fully_converged() {
        let config = EngineConfig {
            l_candidates: vec![3, 1],
            ..Default::default()
        };
        let runner = FineMappingRunner::new(&config, &OnlySingleEffect);
        let ld = LdMatrix::new(vec![0, 1, 2], DenseMatrix::identity(3)).unwrap();
        let outcome = runner.run(vec![stat(0, 1000.0), stat(1, 1000.0), stat(2, 1000.0)], &ld);
        let reference = reference();
        let assembler = ResultAssembler::new(&reference, config.max_l());
        let (records, diagnostic) = assembler.assemble(&locus(), &outcome);

        assert_eq!(diagnostic.status, UnitState::Converged);
        assert_eq!(records[1].credible_set, Some(0));
        assert_eq!(diagnostic.lambda, Some(0.95));
        assert_eq!(diagnostic.distinct_credible_sets, 1);
        // the L=3 attempt did not converge
        assert!(!diagnostic.converged);
        assert!(diagnostic.is_failed());
    }

    #[test]
    fn test_lbf_width_is_fixed() {
        let config = EngineConfig {
            l_candidates: vec![5, 1],
            ..Default::default()
        };
        let runner = FineMappingRunner::new(&config, &OneSet);
        let ld = LdMatrix::new(vec![0, 1], DenseMatrix::identity(2)).unwrap();
        let outcome = runner.run(vec![stat(0, 1000.0), stat(1, 1000.0)], &ld);
        let reference = reference();
        let assembler = ResultAssembler::new(&reference, config.max_l());
        let (records, _) = assembler.assemble(&locus(), &outcome);
        // L clamped to 2 variants; remaining slots are NA
        assert_eq!(
            records[0].lbf,
            vec![Some(0.0), Some(1.0), None, None, None]
        );
    }

    #[test]
    fn test_empty_window_row_is_failed() {
        let reference = reference();
        let assembler = ResultAssembler::new(&reference, 10);
        let row = assembler.empty_window(&locus());
        assert!(row.is_failed());
        assert_eq!(row.status.label(), "EmptyWindow");
        assert_eq!(row.lambda, None);
    }
}
