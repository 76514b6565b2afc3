//! Per-unit fine-mapping: filtering, normalization, alignment and the
//! credible-set-count fallback.
//!
//! A unit is one gene within one locus. Its lifecycle is
//! ```text
//! Unaligned -> Aligned -> FittingWithEstimatedVariance
//!           -> FittingWithFixedVariance -> Converged | Failed
//! ```
//! Each candidate L is tried in order with the residual variance estimated,
//! then the whole list again with it fixed. The first attempt that converges
//! with at least one credible set wins.

pub mod align;
pub mod state;

use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

use tracing::{debug, info, trace};

use finemap_io::SummaryStat;

use crate::config::EngineConfig;
use crate::ld::LdMatrix;
use crate::stats::{apply_thresholds, prepare, Exclusion, FilterOutcome, PreparedStat};
use crate::susie::{FitRequest, Fitter, ModelFit};

pub use align::{align, Alignment, AlignmentError};
pub use state::{format_trace, Attempt, FailureReason, UnitState};

/// A credible set labelled by the slot that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct CredibleSet {
    pub slot: usize,
    pub variants: Vec<u64>,
    pub coverage: f64,
    pub purity: f64,
}

/// Posterior of the winning attempt, keyed by variant index.
#[derive(Debug, Clone, PartialEq)]
pub struct FitResult {
    pub converged: bool,
    pub variant_order: Vec<u64>,
    pub pip: BTreeMap<u64, f64>,
    /// Ordered by slot.
    pub credible_sets: Vec<CredibleSet>,
    /// Slot by position in `variant_order`.
    pub log_bayes_factors: Vec<Vec<f64>>,
    pub residual_variance_estimated: bool,
    pub lambda: f64,
    pub l: usize,
    pub trace: Vec<Attempt>,
    /// Variant index -> position in `variant_order`.
    positions: HashMap<u64, usize>,
    /// Variant index -> lowest slot of a credible set holding it.
    membership: HashMap<u64, usize>,
}

impl FitResult {
    fn from_model(fit: ModelFit, variants: &[u64], attempt: &Attempt, trace: Vec<Attempt>) -> Self {
        let pip = variants.iter().copied().zip(fit.pip).collect();
        let mut credible_sets: Vec<CredibleSet> = fit
            .credible_sets
            .into_iter()
            .map(|cs| CredibleSet {
                slot: cs.slot,
                variants: cs.members.iter().map(|&j| variants[j]).collect(),
                coverage: cs.coverage,
                purity: cs.purity,
            })
            .collect();
        credible_sets.sort_by_key(|cs| cs.slot);

        let positions = variants.iter().enumerate().map(|(i, &v)| (v, i)).collect();
        let mut membership = HashMap::new();
        for cs in &credible_sets {
            for &v in &cs.variants {
                membership.entry(v).or_insert(cs.slot);
            }
        }
        Self {
            converged: fit.converged,
            variant_order: variants.to_vec(),
            pip,
            credible_sets,
            log_bayes_factors: fit.lbf,
            residual_variance_estimated: attempt.estimate_residual_variance,
            lambda: fit.residual_variance,
            l: attempt.l,
            trace,
            positions,
            membership,
        }
    }

    /// Slot of the credible set containing `variant`; the lowest slot wins.
    pub fn credible_set_of(&self, variant: u64) -> Option<usize> {
        self.membership.get(&variant).copied()
    }

    pub fn lbf_of(&self, slot: usize, variant: u64) -> Option<f64> {
        let pos = *self.positions.get(&variant)?;
        self.log_bayes_factors.get(slot)?.get(pos).copied()
    }
}

/// Everything the assembler needs about one unit.
#[derive(Debug, Clone)]
pub struct UnitOutcome {
    pub state: UnitState,
    pub trace: Vec<Attempt>,
    /// Rows that survived filtering; in LD order once aligned.
    pub fitted: Vec<PreparedStat>,
    pub excluded: Vec<(SummaryStat, Exclusion)>,
    /// Present only for `Converged`.
    pub fit: Option<FitResult>,
}

impl UnitOutcome {
    pub fn converged(&self) -> bool {
        self.state == UnitState::Converged
    }

    /// At least one attempt was made and none failed to converge.
    pub fn all_attempts_converged(&self) -> bool {
        !self.trace.is_empty() && self.trace.iter().all(|a| a.converged)
    }

    /// Residual variance of the winning attempt, else of the last attempt.
    pub fn lambda(&self) -> Option<f64> {
        match &self.fit {
            Some(fit) => Some(fit.lambda),
            None => self.trace.last().and_then(|a| a.lambda),
        }
    }
}

struct Unit {
    state: UnitState,
    trace: Vec<Attempt>,
}

impl Unit {
    fn new() -> Self {
        Self {
            state: UnitState::Unaligned,
            trace: Vec::new(),
        }
    }

    fn transition(&mut self, next: UnitState) {
        debug_assert!(
            !self.state.is_terminal(),
            "unit already finished as {:?}",
            self.state
        );
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid transition {:?} -> {:?}",
            self.state,
            next
        );
        trace!("Unit {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    fn finish(
        self,
        fitted: Vec<PreparedStat>,
        excluded: Vec<(SummaryStat, Exclusion)>,
        fit: Option<FitResult>,
    ) -> UnitOutcome {
        UnitOutcome {
            state: self.state,
            trace: self.trace,
            fitted,
            excluded,
            fit,
        }
    }
}

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

pub struct FineMappingRunner<'a> {
    config: &'a EngineConfig,
    fitter: &'a dyn Fitter,
}

impl<'a> FineMappingRunner<'a> {
    pub fn new(config: &'a EngineConfig, fitter: &'a dyn Fitter) -> Self {
        Self { config, fitter }
    }

    fn filter(&self, stats: Vec<SummaryStat>) -> FilterOutcome {
        let outcome = apply_thresholds(
            stats,
            self.config.max_i_squared,
            self.config.min_sample_size_proportion,
        );
        if !outcome.excluded.is_empty() {
            debug!(
                "{} of {} statistics excluded by thresholds",
                outcome.excluded.len(),
                outcome.excluded.len() + outcome.kept.len()
            );
        }
        outcome
    }

    /// Fit one unit against the cluster's LD matrix.
    pub fn run(&self, stats: Vec<SummaryStat>, ld: &LdMatrix) -> UnitOutcome {
        let mut unit = Unit::new();
        let FilterOutcome { kept, excluded } = self.filter(stats);
        if kept.is_empty() {
            unit.transition(UnitState::Failed(FailureReason::EmptyWindow));
            return unit.finish(Vec::new(), excluded, None);
        }

        let prepared = prepare(kept, self.config.normalize);
        let alignment = match align(&prepared, ld) {
            Ok(alignment) => alignment,
            Err(e) => {
                debug!("Alignment failed: {}", e);
                unit.transition(UnitState::Failed(FailureReason::AlignmentMismatch));
                return unit.finish(prepared, excluded, None);
            }
        };
        let aligned: Vec<PreparedStat> = alignment
            .rows
            .iter()
            .map(|&i| prepared[i].clone())
            .collect();
        unit.transition(UnitState::Aligned);

        let sample_sizes: Vec<f64> = aligned.iter().map(|s| s.stat.sample_size).collect();
        let n = median(&sample_sizes);
        if self.config.dry_run {
            info!(
                "Dry run: {} aligned variants, n={}, would try L in {:?} with estimated then fixed residual variance",
                aligned.len(),
                n,
                self.config.l_candidates
            );
            return unit.finish(aligned, excluded, None);
        }

        let effect: Vec<f64> = aligned.iter().map(|s| s.effect).collect();
        let standard_error: Vec<f64> = aligned.iter().map(|s| s.standard_error).collect();
        let variants = alignment.variant_order();

        for (mode, estimate_residual_variance) in [
            (UnitState::FittingWithEstimatedVariance, true),
            (UnitState::FittingWithFixedVariance, false),
        ] {
            unit.transition(mode);
            for &candidate in &self.config.l_candidates {
                let l = candidate.min(aligned.len());
                let request = FitRequest {
                    variants,
                    effect: &effect,
                    standard_error: &standard_error,
                    ld: alignment.ld.values(),
                    n,
                    l,
                    estimate_residual_variance,
                    deadline: self.config.fit_timeout().map(|t| Instant::now() + t),
                };
                let (attempt, fit) = match self.fitter.fit(&request) {
                    Ok(fit) => {
                        let attempt = Attempt {
                            l,
                            estimate_residual_variance,
                            converged: fit.converged,
                            has_nonempty_cs: fit
                                .credible_sets
                                .iter()
                                .any(|cs| !cs.members.is_empty()),
                            lambda: Some(fit.residual_variance),
                        };
                        (attempt, Some(fit))
                    }
                    Err(e) => {
                        debug!(
                            "Fit L={} erv={} did not converge: {}",
                            l, estimate_residual_variance, e
                        );
                        let attempt = Attempt {
                            l,
                            estimate_residual_variance,
                            converged: false,
                            has_nonempty_cs: false,
                            lambda: None,
                        };
                        (attempt, None)
                    }
                };
                debug!("Attempt {}", attempt);
                unit.trace.push(attempt);

                if let (true, Some(fit)) = (attempt.succeeded(), fit) {
                    unit.transition(UnitState::Converged);
                    let result = FitResult::from_model(fit, variants, &attempt, unit.trace.clone());
                    return unit.finish(aligned, excluded, Some(result));
                }
            }
        }

        unit.transition(UnitState::Failed(FailureReason::NoConvergence));
        unit.finish(aligned, excluded, None)
    }

    /// Record a unit whose LD could not be resolved.
    pub fn reject(&self, stats: Vec<SummaryStat>) -> UnitOutcome {
        let mut unit = Unit::new();
        let FilterOutcome { kept, excluded } = self.filter(stats);
        if kept.is_empty() {
            unit.transition(UnitState::Failed(FailureReason::EmptyWindow));
            return unit.finish(Vec::new(), excluded, None);
        }
        unit.transition(UnitState::Failed(FailureReason::AlignmentMismatch));
        let prepared = prepare(kept, self.config.normalize);
        unit.finish(prepared, excluded, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::susie::{FitError, FittedSet};
    use finemap_linalg::DenseMatrix;
    use std::cell::RefCell;

    /// Converges with a single credible set on the first variant when
    /// `accept` says so.
    struct StubFitter<F: Fn(usize, bool) -> bool> {
        accept: F,
        calls: RefCell<Vec<(usize, bool, Vec<u64>)>>,
    }

    impl<F: Fn(usize, bool) -> bool> StubFitter<F> {
        fn new(accept: F) -> Self {
            Self {
                accept,
                calls: RefCell::new(Vec::new()),
            }
        }
    }

    impl<F: Fn(usize, bool) -> bool> Fitter for StubFitter<F> {
        fn fit(&self, request: &FitRequest<'_>) -> Result<ModelFit, FitError> {
            self.calls.borrow_mut().push((
                request.l,
                request.estimate_residual_variance,
                request.variants.to_vec(),
            ));
            if !(self.accept)(request.l, request.estimate_residual_variance) {
                return Err(FitError::Numerical {
                    iteration: 0,
                    detail: "stub".into(),
                });
            }
            let p = request.variants.len();
            let mut pip = vec![0.0; p];
            pip[0] = 0.97;
            Ok(ModelFit {
                converged: true,
                iterations: 1,
                pip,
                credible_sets: vec![FittedSet {
                    slot: 0,
                    members: vec![0],
                    coverage: 0.97,
                    purity: 1.0,
                }],
                lbf: vec![vec![1.5; p]; request.l],
                residual_variance: if request.estimate_residual_variance {
                    0.9
                } else {
                    1.0
                },
            })
        }
    }

    fn stat(variant_index: u64, sample_size: f64) -> SummaryStat {
        SummaryStat {
            variant_index,
            phenotype: "G".into(),
            beta: 0.1,
            standard_error: 0.05,
            sample_size,
            i_squared: 0.0,
        }
    }

    fn identity_ld(order: Vec<u64>) -> LdMatrix {
        let k = order.len();
        LdMatrix::new(order, DenseMatrix::identity(k)).unwrap()
    }

    #[test]
    fn test_first_success_wins() {
        let config = EngineConfig {
            l_candidates: vec![3, 2, 1],
            ..Default::default()
        };
        let fitter = StubFitter::new(|l, _| l == 2);
        let runner = FineMappingRunner::new(&config, &fitter);
        let outcome = runner.run(
            vec![stat(1, 100.0), stat(2, 100.0), stat(3, 100.0)],
            &identity_ld(vec![1, 2, 3]),
        );
        assert_eq!(outcome.state, UnitState::Converged);
        assert_eq!(
            format_trace(&outcome.trace),
            "L=3,erv=T,conv=F,cs=F;L=2,erv=T,conv=T,cs=T"
        );
        let fit = outcome.fit.unwrap();
        assert_eq!(fit.l, 2);
        assert!(fit.residual_variance_estimated);
        assert_eq!(fit.lambda, 0.9);
        assert_eq!(fit.credible_set_of(1), Some(0));
        assert_eq!(fit.credible_set_of(2), None);
        assert_eq!(fit.lbf_of(1, 3), Some(1.5));
        assert_eq!(fit.lbf_of(2, 3), None);
    }

    #[test]
    fn test_all_attempts_converged_only_without_earlier_failures() {
        let config = EngineConfig {
            l_candidates: vec![2, 1],
            ..Default::default()
        };
        let first = StubFitter::new(|_, _| true);
        let outcome = FineMappingRunner::new(&config, &first)
            .run(vec![stat(1, 100.0), stat(2, 100.0)], &identity_ld(vec![1, 2]));
        assert!(outcome.converged());
        assert!(outcome.all_attempts_converged());

        let later = StubFitter::new(|l, _| l == 1);
        let outcome = FineMappingRunner::new(&config, &later)
            .run(vec![stat(1, 100.0), stat(2, 100.0)], &identity_ld(vec![1, 2]));
        assert!(outcome.converged());
        assert!(!outcome.all_attempts_converged());
    }

    #[test]
    fn test_membership_uses_lowest_slot() {
        let model = ModelFit {
            converged: true,
            iterations: 3,
            pip: vec![0.9, 0.8, 0.1],
            credible_sets: vec![
                FittedSet {
                    slot: 1,
                    members: vec![1, 0],
                    coverage: 0.96,
                    purity: 0.9,
                },
                FittedSet {
                    slot: 0,
                    members: vec![0],
                    coverage: 0.97,
                    purity: 1.0,
                },
            ],
            lbf: vec![vec![2.0, 0.5, 0.1], vec![1.0, 1.8, 0.2]],
            residual_variance: 1.0,
        };
        let attempt = Attempt {
            l: 2,
            estimate_residual_variance: false,
            converged: true,
            has_nonempty_cs: true,
            lambda: Some(1.0),
        };
        let fit = FitResult::from_model(model, &[30, 10, 20], &attempt, vec![attempt]);
        assert_eq!(fit.credible_set_of(30), Some(0));
        assert_eq!(fit.credible_set_of(10), Some(1));
        assert_eq!(fit.credible_set_of(20), None);
        assert_eq!(fit.lbf_of(1, 10), Some(1.8));
        assert_eq!(fit.lbf_of(0, 20), Some(0.1));
        assert_eq!(fit.lbf_of(0, 99), None);
    }

    #[test]
    fn test_falls_back_to_fixed_variance() {
        let config = EngineConfig {
            l_candidates: vec![2, 1],
            ..Default::default()
        };
        let fitter = StubFitter::new(|l, erv| !erv && l == 1);
        let runner = FineMappingRunner::new(&config, &fitter);
        let outcome = runner.run(vec![stat(1, 100.0), stat(2, 100.0)], &identity_ld(vec![1, 2]));
        assert_eq!(outcome.state, UnitState::Converged);
        assert_eq!(outcome.trace.len(), 4);
        assert!(outcome.trace[..3].iter().all(|a| !a.succeeded()));
        assert!(outcome.trace[3].succeeded());
        assert!(!outcome.fit.as_ref().unwrap().residual_variance_estimated);
        assert_eq!(outcome.lambda(), Some(1.0));
    }

    #[test]
    fn test_no_convergence_keeps_trace() {
        let config = EngineConfig {
            l_candidates: vec![2, 1],
            ..Default::default()
        };
        let fitter = StubFitter::new(|_, _| false);
        let runner = FineMappingRunner::new(&config, &fitter);
        let outcome = runner.run(vec![stat(1, 100.0), stat(2, 100.0)], &identity_ld(vec![1, 2]));
        assert_eq!(
            outcome.state,
            UnitState::Failed(FailureReason::NoConvergence)
        );
        assert_eq!(outcome.trace.len(), 4);
        assert!(outcome.fit.is_none());
        assert_eq!(outcome.lambda(), None);
        assert_eq!(outcome.fitted.len(), 2);
    }

    #[test]
    fn test_candidate_clamped_to_variant_count() {
        let config = EngineConfig {
            l_candidates: vec![10],
            ..Default::default()
        };
        let fitter = StubFitter::new(|_, _| true);
        let runner = FineMappingRunner::new(&config, &fitter);
        let outcome = runner.run(vec![stat(4, 100.0), stat(5, 100.0)], &identity_ld(vec![4, 5]));
        assert_eq!(outcome.trace[0].l, 2);
        assert_eq!(fitter.calls.borrow()[0].0, 2);
    }

    #[test]
    fn test_alignment_mismatch_skips_fitting() {
        let config = EngineConfig::default();
        let fitter = StubFitter::new(|_, _| true);
        let runner = FineMappingRunner::new(&config, &fitter);
        let outcome = runner.run(
            vec![stat(1, 100.0), stat(2, 100.0), stat(3, 100.0)],
            &identity_ld(vec![1, 3]),
        );
        assert_eq!(
            outcome.state,
            UnitState::Failed(FailureReason::AlignmentMismatch)
        );
        assert!(outcome.trace.is_empty());
        assert!(fitter.calls.borrow().is_empty());
        assert_eq!(outcome.fitted.len(), 3);
    }

    #[test]
    fn test_all_filtered_is_empty_window() {
        let config = EngineConfig {
            max_i_squared: -1.0,
            ..Default::default()
        };
        let fitter = StubFitter::new(|_, _| true);
        let runner = FineMappingRunner::new(&config, &fitter);
        let outcome = runner.run(vec![stat(1, 100.0)], &identity_ld(vec![1]));
        assert_eq!(outcome.state, UnitState::Failed(FailureReason::EmptyWindow));
        assert_eq!(outcome.excluded.len(), 1);
    }

    #[test]
    fn test_dry_run_stops_aligned() {
        let config = EngineConfig {
            dry_run: true,
            ..Default::default()
        };
        let fitter = StubFitter::new(|_, _| true);
        let runner = FineMappingRunner::new(&config, &fitter);
        let outcome = runner.run(vec![stat(2, 100.0), stat(1, 100.0)], &identity_ld(vec![1, 2]));
        assert_eq!(outcome.state, UnitState::Aligned);
        assert!(fitter.calls.borrow().is_empty());
        let order: Vec<u64> = outcome.fitted.iter().map(|s| s.variant_index()).collect();
        assert_eq!(order, vec![1, 2]);
    }

    #[test]
    fn test_low_sample_size_never_reaches_fitter() {
        let config = EngineConfig {
            l_candidates: vec![1],
            ..Default::default()
        };
        let fitter = StubFitter::new(|_, _| true);
        let runner = FineMappingRunner::new(&config, &fitter);
        runner.run(
            vec![stat(1, 1000.0), stat(2, 500.0), stat(3, 900.0)],
            &identity_ld(vec![1, 2, 3]),
        );
        assert_eq!(fitter.calls.borrow()[0].2, vec![1, 3]);
    }

    #[test]
    fn test_median() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), 2.5);
    }
}
