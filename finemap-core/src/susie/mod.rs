//! Fitting capability behind the runner.
//!
//! The runner only sees the `Fitter` trait: effect sizes and standard errors
//! in LD order, the matching correlation matrix, and a structured fit or an
//! error back. `SusieRss` is the shipped implementation.

pub mod credible;
pub mod ibss;

use std::time::Instant;

use thiserror::Error;

use finemap_linalg::DenseMatrix;

pub use credible::FittedSet;
pub use ibss::SusieRss;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FitError {
    #[error("invalid fit input: {0}")]
    InvalidInput(String),

    #[error("deadline exceeded after {iterations} iterations")]
    Timeout { iterations: usize },

    #[error("numerical failure at iteration {iteration}: {detail}")]
    Numerical { iteration: usize, detail: String },
}

/// One fitting attempt. All slices are in the order of `variants`, which is
/// also the row order of `ld`.
#[derive(Debug, Clone, Copy)]
pub struct FitRequest<'a> {
    pub variants: &'a [u64],
    pub effect: &'a [f64],
    pub standard_error: &'a [f64],
    pub ld: &'a DenseMatrix,
    /// Total sample size.
    pub n: f64,
    /// Number of single effects.
    pub l: usize,
    pub estimate_residual_variance: bool,
    pub deadline: Option<Instant>,
}

impl FitRequest<'_> {
    pub fn validate(&self) -> Result<(), FitError> {
        let p = self.variants.len();
        if p == 0 {
            return Err(FitError::InvalidInput("no variants".into()));
        }
        if self.effect.len() != p || self.standard_error.len() != p {
            return Err(FitError::InvalidInput(format!(
                "{} variants but {} effects and {} standard errors",
                p,
                self.effect.len(),
                self.standard_error.len()
            )));
        }
        if self.ld.nrows() != p || self.ld.ncols() != p {
            return Err(FitError::InvalidInput(format!(
                "{} variants but LD is {}x{}",
                p,
                self.ld.nrows(),
                self.ld.ncols()
            )));
        }
        if self.n.is_nan() || self.n <= 1.0 {
            return Err(FitError::InvalidInput(format!(
                "sample size {} is too small",
                self.n
            )));
        }
        if self.l == 0 {
            return Err(FitError::InvalidInput("L must be positive".into()));
        }
        Ok(())
    }
}

/// Structured result of one attempt, indexed by position in the request.
#[derive(Debug, Clone)]
pub struct ModelFit {
    pub converged: bool,
    pub iterations: usize,
    pub pip: Vec<f64>,
    pub credible_sets: Vec<FittedSet>,
    /// Log Bayes factors, slot by position.
    pub lbf: Vec<Vec<f64>>,
    pub residual_variance: f64,
}

pub trait Fitter {
    fn fit(&self, request: &FitRequest<'_>) -> Result<ModelFit, FitError>;
}
