//! Histogram binning calibration

use crate::binning::BinningModel;
use crate::error::{CalibrationError, Result};
use crate::multiclass::{FitState, OneVsRestCalibrator};
use crate::{check_class_count, check_fit_inputs, check_score_matrix, CalibrationMethod};
use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// How bin edges are chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinningMode {
    /// Bins of equal width over the input range
    EqualWidth,
    /// Population-balanced bins with quantile edges
    EqualFreq,
}

impl FromStr for BinningMode {
    type Err = CalibrationError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "equal_width" => Ok(BinningMode::EqualWidth),
            "equal_freq" => Ok(BinningMode::EqualFreq),
            other => Err(CalibrationError::InvalidParameter {
                name: "mode".to_string(),
                value: other.to_string(),
                reason: "choose one of 'equal_width', 'equal_freq'".to_string(),
            }),
        }
    }
}

/// Fitted binning and its per-bin class-1 frequencies
#[derive(Debug, Clone, Serialize, Deserialize)]
struct HistogramFit {
    binning: BinningModel,
    /// NaN marks a bin with no calibration samples
    prob_class_1: Vec<f64>,
}

/// Probability calibration using histogram binning
///
/// Scores are binned either by fixed width or by frequency, and the
/// calibrated probability of a score is the empirical class-1
/// frequency of its bin. A bin that received no calibration samples
/// carries no information; scores landing in one pass through
/// uncalibrated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistogramBinning {
    mode: BinningMode,
    n_bins: usize,
    input_range: (f64, f64),
    n_jobs: Option<usize>,
    state: Option<FitState<HistogramFit, HistogramBinning>>,
}

impl HistogramBinning {
    /// Create a histogram binning calibrator over the unit interval
    pub fn new(mode: BinningMode, n_bins: usize) -> Result<Self> {
        if n_bins == 0 {
            return Err(CalibrationError::InvalidParameter {
                name: "n_bins".to_string(),
                value: n_bins.to_string(),
                reason: "at least one bin is required".to_string(),
            });
        }
        Ok(Self {
            mode,
            n_bins,
            input_range: (0.0, 1.0),
            n_jobs: None,
            state: None,
        })
    }

    /// Set the score range covered by the binning
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

    fn unfitted(&self) -> Self {
        Self {
            state: None,
            ..self.clone()
        }
    }

    fn fit_binary(&self, scores: ArrayView1<f64>, y: &Array1<usize>) -> Result<HistogramFit> {
        let (lo, hi) = self.input_range;
        let binning = match self.mode {
            BinningMode::EqualWidth => BinningModel::equal_width(lo, hi, self.n_bins),
            BinningMode::EqualFreq => BinningModel::equal_frequency(scores, lo, hi, self.n_bins),
        };
        let prob_class_1 = binning.class1_frequency(scores, y);
        Ok(HistogramFit {
            binning,
            prob_class_1,
        })
    }
}

impl CalibrationMethod for HistogramBinning {
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
            .ok_or_else(|| CalibrationError::NotFitted("binning statistics".to_string()))?
        {
            FitState::Binary(fit) => {
                check_class_count(2, x)?;
                let n = x.nrows();
                let mut proba = Array2::zeros((n, 2));
                for (i, &s) in x.column(1).iter().enumerate() {
                    let stat = fit.prob_class_1[fit.binning.locate(s)];
                    // An empty bin has nothing to say: leave the score
                    // uncalibrated rather than inventing a correction
                    let p = if stat.is_finite() { stat } else { s };
                    if !p.is_finite() {
                        return Err(CalibrationError::InternalInvariant(format!(
                            "calibrated probability for score {} is not finite",
                            s
                        )));
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
