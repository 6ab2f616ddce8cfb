//! Bayesian binning into quantiles

use crate::binning::BinningModel;
use crate::error::{CalibrationError, Result};
use crate::multiclass::{FitState, OneVsRestCalibrator};
use crate::numeric::log_sum_exp;
use crate::{check_class_count, check_fit_inputs, check_score_matrix, CalibrationMethod};
use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use statrs::function::gamma::ln_gamma;
use tracing::debug;

/// One candidate binning model: its partition, per-bin class-1
/// frequencies and Bayesian log score
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CandidateModel {
    binning: BinningModel,
    prob_class_1: Vec<f64>,
    log_score: f64,
}

/// The fitted model family; all candidates are retained for averaging
#[derive(Debug, Clone, Serialize, Deserialize)]
struct EnsembleFit {
    models: Vec<CandidateModel>,
}

impl EnsembleFit {
    /// Normalized linear model weights from the log scores, via
    /// log-sum-exp for stability
    fn model_weights(&self) -> Vec<f64> {
        let log_scores: Vec<f64> = self.models.iter().map(|m| m.log_score).collect();
        let norm = log_sum_exp(&log_scores);
        log_scores.iter().map(|&s| (s - norm).exp()).collect()
    }
}

/// Log marginal likelihood of a binning model under independent
/// Beta-Binomial bins. The Beta prior in each bin spreads an
/// equivalent sample size of `prior_strength` uniformly over bins,
/// centered on the bin midpoint.
fn log_marginal_likelihood(
    binning: &BinningModel,
    scores: ArrayView1<f64>,
    y: &Array1<usize>,
    prior_strength: f64,
) -> f64 {
    let tiny = f64::MIN_POSITIVE;
    let prior_per_bin = prior_strength / binning.n_bins() as f64;
    let (positives, totals) = binning.label_counts(scores, y);

    let mut log_likelihood = 0.0;
    for bin in 0..binning.n_bins() {
        let midpoint = binning.midpoint(bin);
        // Zero-width edge bins would put the gamma function at 0
        let mut alpha = prior_per_bin * midpoint;
        if alpha == 0.0 {
            alpha = tiny;
        }
        let mut beta = prior_per_bin * (1.0 - midpoint);
        if beta == 0.0 {
            beta = tiny;
        }

        let m = positives[bin];
        let neg = totals[bin] - m;
        log_likelihood += ln_gamma(prior_per_bin) + ln_gamma(m + alpha) + ln_gamma(neg + beta)
            - ln_gamma(totals[bin] + prior_per_bin)
            - ln_gamma(alpha)
            - ln_gamma(beta);
    }
    log_likelihood
}

/// Probability calibration using Bayesian binning into quantiles
///
/// Builds equal-frequency binning models for a range of bin counts,
/// scores each with a closed-form Beta-Binomial marginal likelihood
/// under a uniform model prior, and calibrates by averaging all
/// candidate models weighted by their posterior score. No single
/// "best" binning is ever selected; the ensemble's effective
/// resolution adapts to the calibration-set size.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BayesianBinningQuantiles {
    breadth: f64,
    prior_strength: f64,
    input_range: (f64, f64),
    n_jobs: Option<usize>,
    state: Option<FitState<EnsembleFit, BayesianBinningQuantiles>>,
}

impl BayesianBinningQuantiles {
    /// Create a BBQ calibrator with default model-family breadth
    pub fn new() -> Self {
        Self {
            breadth: 10.0,
            prior_strength: 2.0,
            input_range: (0.0, 1.0),
            n_jobs: None,
            state: None,
        }
    }

    /// Set the constant controlling how many candidate bin counts are
    /// considered around N^(1/3). Must be positive.
    pub fn with_breadth(mut self, breadth: f64) -> Result<Self> {
        if !breadth.is_finite() || breadth <= 0.0 {
            return Err(CalibrationError::InvalidParameter {
                name: "breadth".to_string(),
                value: breadth.to_string(),
                reason: "model-family breadth must be greater than 0".to_string(),
            });
        }
        self.breadth = breadth;
        Ok(self)
    }

    /// Set the equivalent sample size of the Beta priors
    pub fn with_prior_strength(mut self, prior_strength: f64) -> Result<Self> {
        if !prior_strength.is_finite() || prior_strength <= 0.0 {
            return Err(CalibrationError::InvalidParameter {
                name: "prior_strength".to_string(),
                value: prior_strength.to_string(),
                reason: "prior strength must be greater than 0".to_string(),
            });
        }
        self.prior_strength = prior_strength;
        Ok(self)
    }

    /// Set the score range covered by the binnings
    pub fn with_input_range(mut self, lo: f64, hi: f64) -> Result<Self> {
        if !lo.is_finite() || !hi.is_finite() || lo >= hi {
            return Err(CalibrationError::InvalidParameter {
                name: "input_range".to_string(),
                value: format!("({}, {})", lo, hi),
                reason: "range must be finite and non-empty".to_string(),
            });
        }
        self.input_range = (lo, hi);
        Ok(self)
    }

    /// Number of parallel jobs for the one-vs-rest fan-out;
    /// `Some(1)` forces sequential per-class fits
    pub fn with_n_jobs(mut self, n_jobs: Option<usize>) -> Self {
        self.n_jobs = n_jobs;
        self
    }

    /// Number of candidate binning models, if fitted on a binary problem
    pub fn n_models(&self) -> Option<usize> {
        match &self.state {
            Some(FitState::Binary(fit)) => Some(fit.models.len()),
            _ => None,
        }
    }

    /// Normalized posterior weights of the candidate models, if fitted
    /// on a binary problem
    pub fn model_weights(&self) -> Option<Vec<f64>> {
        match &self.state {
            Some(FitState::Binary(fit)) => Some(fit.model_weights()),
            _ => None,
        }
    }

    fn unfitted(&self) -> Self {
        Self {
            state: None,
            ..self.clone()
        }
    }

    fn fit_binary(&self, scores: ArrayView1<f64>, y: &Array1<usize>) -> Result<EnsembleFit> {
        let n = y.len() as f64;
        let cube_root = n.powf(1.0 / 3.0);
        let min_bins = ((cube_root / self.breadth).floor() as usize).max(1);
        let max_bins = ((n / 5.0).ceil() as usize)
            .min((self.breadth * cube_root).ceil() as usize)
            .max(min_bins);

        // The family size enters every candidate's score through the
        // uniform model prior, so it must be fixed before scoring
        let family_size = max_bins - min_bins + 1;
        let log_prior = -(family_size as f64).ln();
        debug!(
            "Scoring {} candidate binning models ({}..={} bins)",
            family_size, min_bins, max_bins
        );

        let (lo, hi) = self.input_range;
        let mut models = Vec::with_capacity(family_size);
        for n_bins in min_bins..=max_bins {
            let binning = BinningModel::equal_frequency(scores, lo, hi, n_bins);
            let log_score =
                log_prior + log_marginal_likelihood(&binning, scores, y, self.prior_strength);
            let prob_class_1 = binning.class1_frequency_or_midpoint(scores, y);
            models.push(CandidateModel {
                binning,
                prob_class_1,
                log_score,
            });
        }

        Ok(EnsembleFit { models })
    }
}

impl Default for BayesianBinningQuantiles {
    fn default() -> Self {
        Self::new()
    }
}

impl CalibrationMethod for BayesianBinningQuantiles {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<usize>) -> Result<()> {
        check_fit_inputs(x, y)?;
        self.state = None;
        let state = if x.ncols() == 2 {
            FitState::Binary(self.fit_binary(x.column(1), y)?)
        } else {
            FitState::OneVsRest(OneVsRestCalibrator::fit(
                &self.unfitted(),
                x,
                y,
                self.n_jobs,
            )?)
        };
        self.state = Some(state);
        Ok(())
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        check_score_matrix(x)?;
        match self
            .state
            .as_ref()
            .ok_or_else(|| CalibrationError::NotFitted("binning ensemble".to_string()))?
        {
            FitState::Binary(fit) => {
                check_class_count(2, x)?;
                let weights = fit.model_weights();
                let n = x.nrows();
                let mut proba = Array2::zeros((n, 2));
                for (i, &s) in x.column(1).iter().enumerate() {
                    let mut p = 0.0;
                    for (model, &w) in fit.models.iter().zip(weights.iter()) {
                        p += w * model.prob_class_1[model.binning.locate(s)];
                    }
                    proba[[i, 0]] = 1.0 - p;
                    proba[[i, 1]] = p;
                }
                Ok(proba)
            }
            FitState::OneVsRest(ovr) => ovr.predict_proba(x),
        }
    }
}
