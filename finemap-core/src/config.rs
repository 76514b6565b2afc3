//! Run configuration.
//!
//! One `EngineConfig` is built per invocation (defaults, then an optional
//! JSON file, then command-line overrides) and passed by reference to every
//! component.

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

/// Settings for the SuSiE-RSS fitter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SusieConfig {
    /// Maximum IBSS iterations per attempt.
    pub max_iter: usize,
    /// ELBO change below which an attempt has converged.
    pub tol: f64,
    /// Target posterior coverage of a credible set.
    pub coverage: f64,
    /// Credible sets whose minimum |r| among members is lower are dropped.
    pub min_abs_corr: f64,
    /// Initial prior effect variance, as a fraction of var(y).
    pub scaled_prior_variance: f64,
    /// Effects with prior variance at or below this are ignored.
    pub prior_tol: f64,
    /// Update the prior effect variance by EM.
    pub estimate_prior_variance: bool,
}

impl Default for SusieConfig {
    fn default() -> Self {
        Self {
            max_iter: 100,
            tol: 1e-3,
            coverage: 0.95,
            min_abs_corr: 0.5,
            scaled_prior_variance: 0.2,
            prior_tol: 1e-9,
            estimate_prior_variance: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Variants with a larger heterogeneity index are excluded.
    pub max_i_squared: f64,
    /// Variants with sample size below this fraction of the locus maximum
    /// are excluded.
    pub min_sample_size_proportion: f64,
    /// Rescale effects to remove per-variant sample-size differences.
    pub normalize: bool,
    /// Credible-set counts tried in order; the first success wins.
    pub l_candidates: Vec<usize>,
    /// Align and log, but never call the fitter.
    pub dry_run: bool,
    /// Per-attempt wall-clock limit.
    pub fit_timeout_secs: Option<f64>,
    /// Log the smallest eigenvalue of every cluster LD matrix.
    pub check_ld_eigenvalues: bool,
    pub susie: SusieConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_i_squared: 40.0,
            min_sample_size_proportion: 0.8,
            normalize: true,
            l_candidates: vec![10, 5, 2, 1],
            dry_run: false,
            fit_timeout_secs: None,
            check_ld_eigenvalues: true,
            susie: SusieConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load from a JSON file; absent keys keep their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_json::from_str(&text)
            .with_context(|| format!("Invalid config file: {}", path.display()))?;
        Ok(config)
    }

    /// Width of the log-Bayes-factor block in every output row.
    pub fn max_l(&self) -> usize {
        self.l_candidates.iter().copied().max().unwrap_or(0)
    }

    pub fn fit_timeout(&self) -> Option<Duration> {
        self.fit_timeout_secs.map(Duration::from_secs_f64)
    }

    pub fn validate(&self) -> Result<()> {
        if self.l_candidates.is_empty() {
            bail!("At least one credible-set count candidate is required");
        }
        if self.l_candidates.contains(&0) {
            bail!("Credible-set count candidates must be positive");
        }
        if !(0.0..=1.0).contains(&self.min_sample_size_proportion) {
            bail!(
                "minSampleSizeProportion must be in [0, 1], got {}",
                self.min_sample_size_proportion
            );
        }
        if self.max_i_squared.is_nan() {
            bail!("maxISquared must be a number");
        }
        if let Some(secs) = self.fit_timeout_secs {
            if !(secs.is_finite() && secs > 0.0) {
                bail!("fitTimeoutSecs must be positive, got {}", secs);
            }
        }
        if !(self.susie.coverage > 0.0 && self.susie.coverage <= 1.0) {
            bail!("coverage must be in (0, 1], got {}", self.susie.coverage);
        }
        if self.susie.max_iter == 0 {
            bail!("maxIter must be positive");
        }
        Ok(())
    }
}
