//! SuSiE on summary statistics, fitted by iterative Bayesian stepwise
//! selection (IBSS).
//!
//! Sufficient statistics are rebuilt from z-scores and the LD matrix:
//!   XtX = (n-1) R,  Xty = sqrt(n-1) z,  yty = n-1
//! with z adjusted for sample size as z * sqrt((n-1)/(z^2 + n - 2)).
//! Each iteration refits every single effect against the residual of the
//! others, then evaluates the ELBO.

use statrs::distribution::{Continuous, Normal};
use tracing::{debug, trace};

use finemap_linalg::DenseMatrix;

use super::credible::credible_sets;
use super::{FitError, FitRequest, Fitter, ModelFit};
use crate::config::SusieConfig;

/// The shipped `Fitter`.
#[derive(Debug, Clone, Default)]
pub struct SusieRss {
    config: SusieConfig,
}

impl SusieRss {
    pub fn new(config: SusieConfig) -> Self {
        Self { config }
    }
}

/// Posterior of one single-effect regression.
struct SingleEffect {
    alpha: Vec<f64>,
    mu: Vec<f64>,
    mu2: Vec<f64>,
    lbf: Vec<f64>,
    lbf_model: f64,
    prior_variance: f64,
}

/// Current state of all L effects.
struct Model {
    alpha: Vec<Vec<f64>>,
    mu: Vec<Vec<f64>>,
    mu2: Vec<Vec<f64>>,
    lbf: Vec<Vec<f64>>,
    kl: Vec<f64>,
    prior_variance: Vec<f64>,
    /// XtX * (alpha_l * mu_l) per effect.
    xtx_b: Vec<Vec<f64>>,
}

impl Model {
    fn new(l: usize, p: usize, prior_variance: f64) -> Self {
        Self {
            alpha: vec![vec![1.0 / p as f64; p]; l],
            mu: vec![vec![0.0; p]; l],
            mu2: vec![vec![0.0; p]; l],
            lbf: vec![vec![0.0; p]; l],
            kl: vec![0.0; l],
            prior_variance: vec![prior_variance; l],
            xtx_b: vec![vec![0.0; p]; l],
        }
    }

    fn posterior_mean(&self, l: usize) -> Vec<f64> {
        self.alpha[l]
            .iter()
            .zip(&self.mu[l])
            .map(|(a, m)| a * m)
            .collect()
    }

    /// Expected residual sum of squares.
    fn expected_rss(&self, xty: &[f64], yty: f64, d: &[f64]) -> f64 {
        let p = xty.len();
        let mut beta_bar = vec![0.0; p];
        let mut xtx_beta_bar = vec![0.0; p];
        let mut per_effect = 0.0;
        let mut second_moment = 0.0;
        for l in 0..self.alpha.len() {
            let b = self.posterior_mean(l);
            per_effect += DenseMatrix::dot(&b, &self.xtx_b[l]);
            for j in 0..p {
                beta_bar[j] += b[j];
                xtx_beta_bar[j] += self.xtx_b[l][j];
                second_moment += d[j] * self.alpha[l][j] * self.mu2[l][j];
            }
        }
        yty - 2.0 * DenseMatrix::dot(&beta_bar, xty) + DenseMatrix::dot(&beta_bar, &xtx_beta_bar)
            - per_effect
            + second_moment
    }
}

fn ln_normal(x: f64, variance: f64, iteration: usize) -> Result<f64, FitError> {
    let normal = Normal::new(0.0, variance.sqrt()).map_err(|e| FitError::Numerical {
        iteration,
        detail: format!("normal with variance {variance}: {e}"),
    })?;
    Ok(normal.ln_pdf(x))
}

/// Per-variant log Bayes factors of a nonzero effect with prior variance
/// `v` against no effect.
fn log_bayes_factors(
    xtr: &[f64],
    d: &[f64],
    v: f64,
    sigma2: f64,
    iteration: usize,
) -> Result<Vec<f64>, FitError> {
    xtr.iter()
        .zip(d)
        .map(|(&r, &dj)| {
            if v <= 0.0 || dj <= 0.0 {
                return Ok(0.0);
            }
            let shat2 = sigma2 / dj;
            let betahat = r / dj;
            Ok(ln_normal(betahat, v + shat2, iteration)? - ln_normal(betahat, shat2, iteration)?)
        })
        .collect()
}

/// log sum_j exp(lbf_j + log_prior), the log marginal Bayes factor of the
/// single-effect model.
fn log_marginal(lbf: &[f64], log_prior: f64) -> f64 {
    let max = lbf.iter().copied().fold(f64::NEG_INFINITY, f64::max) + log_prior;
    let sum: f64 = lbf.iter().map(|b| (b + log_prior - max).exp()).sum();
    max + sum.ln()
}

fn single_effect_regression(
    xtr: &[f64],
    d: &[f64],
    prior_variance: f64,
    sigma2: f64,
    config: &SusieConfig,
    iteration: usize,
) -> Result<SingleEffect, FitError> {
    let p = xtr.len();
    let log_prior = -(p as f64).ln();
    let lbf = log_bayes_factors(xtr, d, prior_variance, sigma2, iteration)?;
    if lbf.iter().any(|b| b.is_nan()) {
        return Err(FitError::Numerical {
            iteration,
            detail: "log Bayes factor is NaN".into(),
        });
    }

    let lbf_model = log_marginal(&lbf, log_prior);
    let alpha: Vec<f64> = lbf
        .iter()
        .map(|b| (b + log_prior - lbf_model).exp())
        .collect();

    let mut mu = vec![0.0; p];
    let mut mu2 = vec![0.0; p];
    if prior_variance > 0.0 {
        for j in 0..p {
            let post_var = 1.0 / (1.0 / prior_variance + d[j] / sigma2);
            mu[j] = post_var * xtr[j] / sigma2;
            mu2[j] = post_var + mu[j] * mu[j];
        }
    }

    let mut next_prior = prior_variance;
    if config.estimate_prior_variance && prior_variance > 0.0 {
        next_prior = alpha.iter().zip(&mu2).map(|(a, m2)| a * m2).sum();
        // Drop the effect when a zero prior explains the data as well.
        let lbf_next = log_bayes_factors(xtr, d, next_prior, sigma2, iteration)?;
        if log_marginal(&lbf_next, log_prior) <= 0.0 {
            next_prior = 0.0;
        }
    }

    Ok(SingleEffect {
        alpha,
        mu,
        mu2,
        lbf,
        lbf_model,
        prior_variance: next_prior,
    })
}

/// Expected log-likelihood of one effect's posterior against its residual.
fn posterior_expected_loglik(effect: &SingleEffect, xtr: &[f64], d: &[f64], sigma2: f64) -> f64 {
    let mut cross = 0.0;
    let mut second = 0.0;
    for j in 0..xtr.len() {
        cross += effect.alpha[j] * effect.mu[j] * xtr[j];
        second += d[j] * effect.alpha[j] * effect.mu2[j];
    }
    -0.5 / sigma2 * (-2.0 * cross + second)
}

fn adjusted_z(request: &FitRequest<'_>) -> Result<Vec<f64>, FitError> {
    let n = request.n;
    request
        .effect
        .iter()
        .zip(request.standard_error)
        .map(|(&b, &se)| {
            let z = b / se;
            if !z.is_finite() {
                return Err(FitError::InvalidInput(format!(
                    "non-finite z-score from beta {b}, se {se}"
                )));
            }
            Ok(z * ((n - 1.0) / (z * z + n - 2.0)).sqrt())
        })
        .collect()
}

impl Fitter for SusieRss {
    fn fit(&self, request: &FitRequest<'_>) -> Result<ModelFit, FitError> {
        request.validate()?;
        let config = &self.config;
        let p = request.variants.len();
        let n = request.n;

        let z = adjusted_z(request)?;
        let xtx = request.ld.scale(n - 1.0);
        let xty: Vec<f64> = z.iter().map(|zj| zj * (n - 1.0).sqrt()).collect();
        let yty = n - 1.0;
        let d = xtx.diag();
        let var_y = yty / (n - 1.0);

        let mut sigma2 = var_y;
        let mut model = Model::new(request.l, p, config.scaled_prior_variance * var_y);
        let mut xtx_beta = vec![0.0; p];
        let mut elbo_prev = f64::NEG_INFINITY;
        let mut converged = false;
        let mut iterations = 0;

        for iteration in 0..config.max_iter {
            if let Some(deadline) = request.deadline {
                if std::time::Instant::now() >= deadline {
                    return Err(FitError::Timeout { iterations });
                }
            }
            iterations = iteration + 1;

            for l in 0..request.l {
                for (acc, prev) in xtx_beta.iter_mut().zip(&model.xtx_b[l]) {
                    *acc -= prev;
                }
                let xtr: Vec<f64> = xty.iter().zip(&xtx_beta).map(|(a, b)| a - b).collect();

                let effect = single_effect_regression(
                    &xtr,
                    &d,
                    model.prior_variance[l],
                    sigma2,
                    config,
                    iteration,
                )?;
                model.kl[l] =
                    -effect.lbf_model + posterior_expected_loglik(&effect, &xtr, &d, sigma2);
                model.alpha[l] = effect.alpha;
                model.mu[l] = effect.mu;
                model.mu2[l] = effect.mu2;
                model.lbf[l] = effect.lbf;
                model.prior_variance[l] = effect.prior_variance;

                model.xtx_b[l] = xtx.mat_vec(&model.posterior_mean(l));
                for (acc, cur) in xtx_beta.iter_mut().zip(&model.xtx_b[l]) {
                    *acc += cur;
                }
            }

            let er2 = model.expected_rss(&xty, yty, &d);
            let expected_loglik =
                -0.5 * n * (2.0 * std::f64::consts::PI * sigma2).ln() - er2 / (2.0 * sigma2);
            let elbo = expected_loglik - model.kl.iter().sum::<f64>();
            if !elbo.is_finite() {
                return Err(FitError::Numerical {
                    iteration,
                    detail: format!("ELBO is {elbo}"),
                });
            }
            trace!("IBSS iteration {}: ELBO {:.6}, sigma2 {:.6}", iteration, elbo, sigma2);

            if elbo - elbo_prev < config.tol {
                converged = true;
                break;
            }
            elbo_prev = elbo;

            if request.estimate_residual_variance {
                sigma2 = (er2 / n).max(var_y * 1e-4);
            }
        }

        let active: Vec<usize> = (0..request.l)
            .filter(|&l| model.prior_variance[l] > config.prior_tol)
            .collect();
        let pip: Vec<f64> = (0..p)
            .map(|j| 1.0 - active.iter().map(|&l| 1.0 - model.alpha[l][j]).product::<f64>())
            .collect();
        let credible_sets = credible_sets(
            &model.alpha,
            &model.prior_variance,
            request.ld,
            config.coverage,
            config.min_abs_corr,
            config.prior_tol,
        );

        debug!(
            "SuSiE-RSS L={} erv={}: converged={} after {} iterations, {} credible sets, sigma2 {:.4}",
            request.l,
            request.estimate_residual_variance,
            converged,
            iterations,
            credible_sets.len(),
            sigma2
        );

        Ok(ModelFit {
            converged,
            iterations,
            pip,
            credible_sets,
            lbf: model.lbf,
            residual_variance: sigma2,
        })
    }
}
