//! Unit lifecycle and attempt trace.

use std::fmt;

/// Why a unit produced no posterior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    EmptyWindow,
    AlignmentMismatch,
    NoConvergence,
}

/// Lifecycle of one (locus, gene) unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitState {
    Unaligned,
    Aligned,
    FittingWithEstimatedVariance,
    FittingWithFixedVariance,
    Converged,
    Failed(FailureReason),
}

impl UnitState {
    /// Whether `self -> next` is an edge of the lifecycle.
    pub fn can_transition_to(self, next: UnitState) -> bool {
        use UnitState::*;
        matches!(
            (self, next),
            (Unaligned, Aligned)
                | (Unaligned, Failed(FailureReason::EmptyWindow))
                | (Unaligned, Failed(FailureReason::AlignmentMismatch))
                | (Aligned, FittingWithEstimatedVariance)
                | (FittingWithEstimatedVariance, FittingWithFixedVariance)
                | (FittingWithEstimatedVariance, Converged)
                | (FittingWithFixedVariance, Converged)
                | (FittingWithFixedVariance, Failed(FailureReason::NoConvergence))
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, UnitState::Converged | UnitState::Failed(_))
    }

    /// Status column value.
    pub fn label(self) -> &'static str {
        match self {
            UnitState::Unaligned => "Unaligned",
            // A unit only rests in Aligned after a dry run.
            UnitState::Aligned => "DryRun",
            UnitState::FittingWithEstimatedVariance => "FittingWithEstimatedVariance",
            UnitState::FittingWithFixedVariance => "FittingWithFixedVariance",
            UnitState::Converged => "Converged",
            UnitState::Failed(FailureReason::EmptyWindow) => "EmptyWindow",
            UnitState::Failed(FailureReason::AlignmentMismatch) => "AlignmentMismatch",
            UnitState::Failed(FailureReason::NoConvergence) => "NoConvergence",
        }
    }
}

/// One fitting attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Attempt {
    pub l: usize,
    pub estimate_residual_variance: bool,
    pub converged: bool,
    pub has_nonempty_cs: bool,
    /// Residual variance reported by the fitter, if it returned a fit.
    pub lambda: Option<f64>,
}

impl Attempt {
    pub fn succeeded(&self) -> bool {
        self.converged && self.has_nonempty_cs
    }
}

impl fmt::Display for Attempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flag = |b: bool| if b { 'T' } else { 'F' };
        write!(
            f,
            "L={},erv={},conv={},cs={}",
            self.l,
            flag(self.estimate_residual_variance),
            flag(self.converged),
            flag(self.has_nonempty_cs)
        )
    }
}

/// `attempt;attempt;...`, or `NA` when nothing was attempted.
pub fn format_trace(trace: &[Attempt]) -> String {
    if trace.is_empty() {
        return "NA".to_string();
    }
    trace
        .iter()
        .map(|a| a.to_string())
        .collect::<Vec<_>>()
        .join(";")
}
