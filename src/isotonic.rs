//! Isotonic regression calibration

use crate::error::{CalibrationError, Result};
use crate::multiclass::{FitState, OneVsRestCalibrator};
use crate::{check_class_count, check_fit_inputs, check_score_matrix, CalibrationMethod};
use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Policy for scores outside the training domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutOfBounds {
    /// Extrapolate with the boundary value
    Clip,
    /// Emit NaN outside the training domain
    Nan,
    /// Fail with a domain error
    Raise,
}

impl FromStr for OutOfBounds {
    type Err = CalibrationError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "clip" => Ok(OutOfBounds::Clip),
            "nan" => Ok(OutOfBounds::Nan),
            "raise" => Ok(OutOfBounds::Raise),
            other => Err(CalibrationError::InvalidParameter {
                name: "out_of_bounds".to_string(),
                value: other.to_string(),
                reason: "choose one of 'clip', 'nan', 'raise'".to_string(),
            }),
        }
    }
}

/// Pool Adjacent Violators: merge neighboring blocks until the block
/// means are non-decreasing, then expand each block back to its
/// members.
fn pava(values: &[f64]) -> Vec<f64> {
    let mut mean: Vec<f64> = Vec::with_capacity(values.len());
    let mut weight: Vec<f64> = Vec::with_capacity(values.len());
    let mut count: Vec<usize> = Vec::with_capacity(values.len());

    for &v in values {
        mean.push(v);
        weight.push(1.0);
        count.push(1);
        while mean.len() > 1 && mean[mean.len() - 2] > mean[mean.len() - 1] {
            let k = mean.len() - 2;
            mean[k] = (mean[k] * weight[k] + mean[k + 1] * weight[k + 1])
                / (weight[k] + weight[k + 1]);
            weight[k] += weight[k + 1];
            count[k] += count[k + 1];
            mean.truncate(k + 1);
            weight.truncate(k + 1);
            count.truncate(k + 1);
        }
    }

    let mut out = Vec::with_capacity(values.len());
    for (m, c) in mean.iter().zip(count.iter()) {
        out.extend(std::iter::repeat(*m).take(*c));
    }
    out
}

/// Fitted non-decreasing step map from score to probability
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsotonicFit {
    knots_x: Vec<f64>,
    knots_y: Vec<f64>,
    x_min: f64,
    x_max: f64,
    y_min: f64,
    y_max: f64,
}

impl IsotonicFit {
    /// Build from sorted scores and their pooled values, keeping only
    /// the boundaries of constant runs as interpolation knots.
    fn from_points(xs: &[f64], ys: &[f64]) -> Self {
        let mut knots_x = Vec::new();
        let mut knots_y = Vec::new();

        let mut i = 0;
        while i < xs.len() {
            let mut j = i;
            while j + 1 < xs.len() && (ys[j + 1] - ys[i]).abs() < 1e-12 {
                j += 1;
            }
            knots_x.push(xs[i]);
            knots_y.push(ys[i]);
            if j > i {
                knots_x.push(xs[j]);
                knots_y.push(ys[j]);
            }
            i = j + 1;
        }

        Self {
            x_min: xs[0],
            x_max: xs[xs.len() - 1],
            y_min: knots_y[0],
            y_max: knots_y[knots_y.len() - 1],
            knots_x,
            knots_y,
        }
    }

    /// Evaluate the fitted map at a score under the given policy
    pub fn eval(&self, score: f64, out_of_bounds: OutOfBounds) -> Result<f64> {
        if score < self.x_min || score > self.x_max || score.is_nan() {
            return match out_of_bounds {
                OutOfBounds::Clip => Ok(if score < self.x_min {
                    self.y_min
                } else {
                    self.y_max
                }),
                OutOfBounds::Nan => Ok(f64::NAN),
                OutOfBounds::Raise => Err(CalibrationError::DomainError(format!(
                    "score {} outside the training domain [{}, {}]",
                    score, self.x_min, self.x_max
                ))),
            };
        }

        let idx = self.knots_x.partition_point(|&k| k <= score);
        if idx == 0 {
            return Ok(self.y_min);
        }
        if idx == self.knots_x.len() {
            return Ok(self.y_max);
        }

        let (x0, x1) = (self.knots_x[idx - 1], self.knots_x[idx]);
        let (y0, y1) = (self.knots_y[idx - 1], self.knots_y[idx]);
        if (x1 - x0).abs() < 1e-12 {
            return Ok(y0);
        }
        let frac = (score - x0) / (x1 - x0);
        Ok(y0 + frac * (y1 - y0))
    }
}

/// Probability calibration using isotonic regression
///
/// Non-parametric calibration fitting a monotonically non-decreasing
/// map from the class-1 score to the empirical class-1 probability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsotonicRegression {
    out_of_bounds: OutOfBounds,
    n_jobs: Option<usize>,
    state: Option<FitState<IsotonicFit, IsotonicRegression>>,
}

impl IsotonicRegression {
    /// Create an isotonic calibrator that clips out-of-domain scores
    pub fn new() -> Self {
        Self {
            out_of_bounds: OutOfBounds::Clip,
            n_jobs: None,
            state: None,
        }
    }

    /// Set the out-of-domain policy
    pub fn with_out_of_bounds(mut self, out_of_bounds: OutOfBounds) -> Self {
        self.out_of_bounds = out_of_bounds;
        self
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

    fn fit_binary(&self, scores: ArrayView1<f64>, y: &Array1<usize>) -> Result<IsotonicFit> {
        let n = scores.len();
        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| {
            scores[a]
                .partial_cmp(&scores[b])
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let xs: Vec<f64> = order.iter().map(|&i| scores[i]).collect();
        let raw: Vec<f64> = order.iter().map(|&i| y[i] as f64).collect();
        let pooled = pava(&raw);

        Ok(IsotonicFit::from_points(&xs, &pooled))
    }
}

impl Default for IsotonicRegression {
    fn default() -> Self {
        Self::new()
    }
}

impl CalibrationMethod for IsotonicRegression {
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
            .ok_or_else(|| CalibrationError::NotFitted("isotonic step function".to_string()))?
        {
            FitState::Binary(fit) => {
                check_class_count(2, x)?;
                let n = x.nrows();
                let mut proba = Array2::zeros((n, 2));
                for (i, &s) in x.column(1).iter().enumerate() {
                    let p = fit.eval(s, self.out_of_bounds)?;
                    proba[[i, 0]] = 1.0 - p;
                    proba[[i, 1]] = p;
                }
                Ok(proba)
            }
            FitState::OneVsRest(ovr) => ovr.predict_proba(x),
        }
    }
}
