//! Platt scaling (sigmoid calibration)

use crate::error::{CalibrationError, Result};
use crate::multiclass::{FitState, OneVsRestCalibrator};
use crate::{check_class_count, check_fit_inputs, check_score_matrix, CalibrationMethod};
use ndarray::{Array1, Array2, ArrayView1};
use rand::prelude::*;
use serde::{Deserialize, Serialize};

/// Fitted logistic map p = sigmoid(slope * score + intercept)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigmoidFit {
    slope: f64,
    intercept: f64,
}

impl SigmoidFit {
    fn sigmoid(x: f64) -> f64 {
        if x >= 0.0 {
            1.0 / (1.0 + (-x).exp())
        } else {
            let exp_x = x.exp();
            exp_x / (1.0 + exp_x)
        }
    }

    /// Calibrated class-1 probability for a raw score
    pub fn eval(&self, score: f64) -> f64 {
        Self::sigmoid(self.slope * score + self.intercept)
    }
}

/// Probability calibration using Platt scaling
///
/// Fits a one-dimensional logistic regression of the labels on the
/// class-1 score. `regularization` is the L2 penalty on the slope
/// (the inverse of the usual C constant); the near-zero default leaves
/// the fit effectively unregularized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlattScaling {
    regularization: f64,
    seed: Option<u64>,
    max_iter: usize,
    tol: f64,
    n_jobs: Option<usize>,
    state: Option<FitState<SigmoidFit, PlattScaling>>,
}

impl PlattScaling {
    /// Create a Platt scaling calibrator with near-zero regularization
    pub fn new() -> Self {
        Self {
            regularization: 1e-12,
            seed: None,
            max_iter: 1000,
            tol: 1e-7,
            n_jobs: None,
            state: None,
        }
    }

    /// Set the L2 penalty on the slope. Larger values shrink the
    /// calibrated map toward a constant. Must be positive.
    pub fn with_regularization(mut self, regularization: f64) -> Result<Self> {
        if regularization <= 0.0 {
            return Err(CalibrationError::InvalidParameter {
                name: "regularization".to_string(),
                value: regularization.to_string(),
                reason: "regularization must be greater than 0".to_string(),
            });
        }
        self.regularization = regularization;
        Ok(self)
    }

    /// Seed the solver's restart jitter for reproducibility
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Number of parallel jobs for the one-vs-rest fan-out;
    /// `Some(1)` forces sequential per-class fits
    pub fn with_n_jobs(mut self, n_jobs: Option<usize>) -> Self {
        self.n_jobs = n_jobs;
        self
    }

    /// Fitted sigmoid parameters (slope, intercept) of the binary map
    pub fn parameters(&self) -> Option<(f64, f64)> {
        match &self.state {
            Some(FitState::Binary(fit)) => Some((fit.slope, fit.intercept)),
            _ => None,
        }
    }

    fn unfitted(&self) -> Self {
        Self {
            state: None,
            ..self.clone()
        }
    }

    /// Newton iterations on the penalized logistic log-loss, solving
    /// the 2x2 system with Cramer's rule. If the Hessian goes singular
    /// the parameters are jittered and the iteration restarted.
    fn fit_binary(&self, scores: ArrayView1<f64>, y: &Array1<usize>) -> Result<SigmoidFit> {
        let n = scores.len();
        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut slope = 1.0;
        let mut intercept = 0.0;
        let mut restarts = 0;

        for _ in 0..self.max_iter {
            let mut grad_a = self.regularization * slope;
            let mut grad_b = 0.0;
            let mut hess_aa = self.regularization;
            let mut hess_ab = 0.0;
            let mut hess_bb = 0.0;

            for i in 0..n {
                let s = scores[i];
                let p = SigmoidFit::sigmoid(slope * s + intercept);
                let d1 = p - y[i] as f64;
                let d2 = p * (1.0 - p);

                grad_a += s * d1;
                grad_b += d1;
                hess_aa += s * s * d2;
                hess_ab += s * d2;
                hess_bb += d2;
            }

            // Ridge on the diagonal keeps the solve stable when the
            // sigmoid saturates
            hess_aa += 1e-6;
            hess_bb += 1e-6;

            let det = hess_aa * hess_bb - hess_ab * hess_ab;
            if det.abs() < 1e-12 {
                if restarts < 3 {
                    slope += rng.gen_range(-0.5..0.5);
                    intercept += rng.gen_range(-0.5..0.5);
                    restarts += 1;
                    continue;
                }
                break;
            }

            let delta_a = (hess_bb * grad_a - hess_ab * grad_b) / det;
            let delta_b = (hess_aa * grad_b - hess_ab * grad_a) / det;

            slope -= delta_a;
            intercept -= delta_b;

            if delta_a.abs() < self.tol && delta_b.abs() < self.tol {
                break;
            }
        }

        Ok(SigmoidFit { slope, intercept })
    }
}

impl Default for PlattScaling {
    fn default() -> Self {
        Self::new()
    }
}

impl CalibrationMethod for PlattScaling {
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
            .ok_or_else(|| CalibrationError::NotFitted("sigmoid parameters".to_string()))?
        {
            FitState::Binary(fit) => {
                check_class_count(2, x)?;
                let n = x.nrows();
                let mut proba = Array2::zeros((n, 2));
                for (i, &s) in x.column(1).iter().enumerate() {
                    let p = fit.eval(s);
                    proba[[i, 0]] = 1.0 - p;
                    proba[[i, 1]] = p;
                }
                Ok(proba)
            }
            FitState::OneVsRest(ovr) => ovr.predict_proba(x),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn binary_data() -> (Array2<f64>, Array1<usize>) {
        let scores = [0.1, 0.2, 0.3, 0.35, 0.4, 0.6, 0.65, 0.7, 0.8, 0.9];
        let labels = [0usize, 0, 0, 0, 1, 0, 1, 1, 1, 1];
        let n = scores.len();
        let mut x = Array2::zeros((n, 2));
        for (i, &s) in scores.iter().enumerate() {
            x[[i, 0]] = 1.0 - s;
            x[[i, 1]] = s;
        }
        (x, Array1::from_vec(labels.to_vec()))
    }

    #[test]
    fn test_platt_outputs_are_probabilities() {
        let (x, y) = binary_data();
        let mut method = PlattScaling::new();
        method.fit(&x, &y).unwrap();

        let proba = method.predict_proba(&x).unwrap();
        assert_eq!(proba.shape(), &[10, 2]);
        for row in proba.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-12);
            assert!(row.iter().all(|&p| (0.0..=1.0).contains(&p)));
        }
    }

    #[test]
    fn test_platt_map_is_increasing_for_correlated_data() {
        let (x, y) = binary_data();
        let mut method = PlattScaling::new();
        method.fit(&x, &y).unwrap();

        let (slope, _) = method.parameters().unwrap();
        assert!(slope > 0.0);

        let proba = method.predict_proba(&x).unwrap();
        let p1 = proba.column(1);
        for i in 1..p1.len() {
            assert!(p1[i] >= p1[i - 1] - 1e-12);
        }
    }

    #[test]
    fn test_regularization_shrinks_slope() {
        let (x, y) = binary_data();

        let mut weak = PlattScaling::new();
        weak.fit(&x, &y).unwrap();
        let mut strong = PlattScaling::new().with_regularization(100.0).unwrap();
        strong.fit(&x, &y).unwrap();

        let (slope_weak, _) = weak.parameters().unwrap();
        let (slope_strong, _) = strong.parameters().unwrap();
        assert!(slope_strong.abs() < slope_weak.abs());
    }

    #[test]
    fn test_rejects_non_positive_regularization() {
        assert!(matches!(
            PlattScaling::new().with_regularization(0.0),
            Err(CalibrationError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_unfitted_guard() {
        let method = PlattScaling::new();
        let x = array![[0.5, 0.5]];
        assert!(matches!(
            method.predict_proba(&x),
            Err(CalibrationError::NotFitted(_))
        ));
    }

    #[test]
    fn test_seeded_fit_is_reproducible() {
        let (x, y) = binary_data();

        let mut first = PlattScaling::new().with_seed(7);
        first.fit(&x, &y).unwrap();
        let mut second = PlattScaling::new().with_seed(7);
        second.fit(&x, &y).unwrap();

        assert_eq!(first.parameters(), second.parameters());
    }
}
