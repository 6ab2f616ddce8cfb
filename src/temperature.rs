//! Temperature scaling calibration

use crate::error::{CalibrationError, Result};
use crate::{check_class_count, check_fit_inputs, check_score_matrix, CalibrationMethod};
use crate::numeric::softmax_rows;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Calibration-set negative log-likelihood of the temperature-scaled
/// softmax: -sum_i log(softmax(x_i / t)[y_i] + tiny)
fn negative_log_likelihood(x: &Array2<f64>, y: &Array1<usize>, t: f64) -> f64 {
    let tiny = f64::MIN_POSITIVE;
    let mut nll = 0.0;
    for (row, &label) in x.rows().into_iter().zip(y.iter()) {
        let max = row.iter().map(|&v| v / t).fold(f64::NEG_INFINITY, f64::max);
        let mut sum = 0.0;
        for &v in row.iter() {
            sum += (v / t - max).exp();
        }
        let log_p = row[label] / t - max - sum.ln();
        nll -= (log_p.exp() + tiny).ln();
    }
    nll
}

/// Closed-form derivative of the negative log-likelihood with respect
/// to the temperature:
/// -(1/t^2) sum_i [sum_k e^{x_ik/t} (x_ik - x_{i,y_i})] / sum_k e^{x_ik/t}
fn nll_gradient(x: &Array2<f64>, y: &Array1<usize>, t: f64) -> f64 {
    let mut total = 0.0;
    for (row, &label) in x.rows().into_iter().zip(y.iter()) {
        let max = row.iter().map(|&v| v / t).fold(f64::NEG_INFINITY, f64::max);
        let target = row[label];
        let mut weighted = 0.0;
        let mut denom = 0.0;
        for &v in row.iter() {
            let w = (v / t - max).exp();
            denom += w;
            weighted += w * (v - target);
        }
        total += weighted / denom;
    }
    -total / (t * t)
}

/// Scalar quasi-Newton minimization of the temperature NLL. The inverse
/// curvature is estimated from successive gradient differences (secant
/// update) and each step is backtracked until it satisfies the Armijo
/// condition. Stops when the gradient magnitude drops below `gtol`.
fn minimize_nll(
    x: &Array2<f64>,
    y: &Array1<usize>,
    t_init: f64,
    gtol: f64,
    max_iter: usize,
) -> (f64, usize) {
    let mut t = t_init;
    let mut f = negative_log_likelihood(x, y, t);
    let mut g = nll_gradient(x, y, t);
    let mut inv_curvature = 1.0;

    let mut iterations = 0;
    for iter in 0..max_iter {
        iterations = iter;
        if g.abs() < gtol {
            break;
        }

        let mut direction = -inv_curvature * g;
        if direction * g >= 0.0 {
            direction = -g;
        }

        let mut step = 1.0;
        let mut t_new = t + step * direction;
        let mut f_new = negative_log_likelihood(x, y, t_new);
        let mut backtracks = 0;
        while !(f_new <= f + 1e-4 * step * direction * g) && backtracks < 60 {
            step *= 0.5;
            t_new = t + step * direction;
            f_new = negative_log_likelihood(x, y, t_new);
            backtracks += 1;
        }

        let g_new = nll_gradient(x, y, t_new);
        let s = t_new - t;
        let dg = g_new - g;
        if s * dg > 1e-16 {
            inv_curvature = s / dg;
        }

        t = t_new;
        f = f_new;
        g = g_new;
    }

    (t, iterations)
}

/// Fitted temperature state
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TemperatureFit {
    temperature: f64,
    n_classes: usize,
}

/// Probability calibration using temperature scaling
///
/// A single global temperature T > 0 rescales logits before the
/// softmax: P = softmax(X / T). T > 1 softens the output distribution,
/// T < 1 sharpens it; class ranking is never changed. T is fitted by
/// minimizing the calibration-set negative log-likelihood.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemperatureScaling {
    t_init: f64,
    gtol: f64,
    max_iter: usize,
    fitted: Option<TemperatureFit>,
}

impl TemperatureScaling {
    /// Create a temperature scaling calibrator starting the search at
    /// `t_init`. Fails if the initial temperature is not positive.
    pub fn new(t_init: f64) -> Result<Self> {
        if t_init <= 0.0 {
            return Err(CalibrationError::InvalidParameter {
                name: "t_init".to_string(),
                value: t_init.to_string(),
                reason: "temperature must be greater than 0".to_string(),
            });
        }
        Ok(Self {
            t_init,
            gtol: 1e-6,
            max_iter: 100,
            fitted: None,
        })
    }

    /// Set the gradient tolerance of the optimizer
    pub fn with_gtol(mut self, gtol: f64) -> Self {
        self.gtol = gtol;
        self
    }

    /// Set the optimizer iteration cap
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Fitted temperature, if any
    pub fn temperature(&self) -> Option<f64> {
        self.fitted.as_ref().map(|fit| fit.temperature)
    }

    /// Latent function T*z of the fitted rescaling, for introspection
    /// of how raw confidence values are stretched or compressed
    pub fn latent(&self, z: &Array1<f64>) -> Result<Array1<f64>> {
        let fit = self
            .fitted
            .as_ref()
            .ok_or_else(|| CalibrationError::NotFitted("temperature".to_string()))?;
        Ok(z.mapv(|v| fit.temperature * v))
    }
}

impl Default for TemperatureScaling {
    fn default() -> Self {
        Self {
            t_init: 1.0,
            gtol: 1e-6,
            max_iter: 100,
            fitted: None,
        }
    }
}

impl CalibrationMethod for TemperatureScaling {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<usize>) -> Result<()> {
        check_fit_inputs(x, y)?;

        let (temperature, iterations) = minimize_nll(x, y, self.t_init, self.gtol, self.max_iter);
        debug!(
            "Temperature scaling converged to T = {:.6} after {} iterations",
            temperature, iterations
        );

        if temperature <= 0.0 {
            return Err(CalibrationError::InvalidParameter {
                name: "temperature".to_string(),
                value: temperature.to_string(),
                reason: "fitted temperature must remain greater than 0".to_string(),
            });
        }

        self.fitted = Some(TemperatureFit {
            temperature,
            n_classes: x.ncols(),
        });
        Ok(())
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        check_score_matrix(x)?;
        let fit = self
            .fitted
            .as_ref()
            .ok_or_else(|| CalibrationError::NotFitted("temperature".to_string()))?;
        check_class_count(fit.n_classes, x)?;

        let scaled = x.mapv(|v| v / fit.temperature);
        Ok(softmax_rows(&scaled))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_rejects_non_positive_initial_temperature() {
        assert!(matches!(
            TemperatureScaling::new(0.0),
            Err(CalibrationError::InvalidParameter { .. })
        ));
        assert!(matches!(
            TemperatureScaling::new(-1.0),
            Err(CalibrationError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_overconfident_logits_are_softened() {
        // Confidence sigmoid(2) ~ 0.88 against an empirical accuracy of
        // 0.75; the NLL optimum is at sigmoid(2/T) = 0.75, i.e.
        // T = 2 / ln(3) ~ 1.82.
        let x = array![[0.0, 2.0], [2.0, 0.0], [0.0, 2.0], [2.0, 0.0]];
        let y = array![1usize, 0, 1, 1];

        let mut method = TemperatureScaling::new(1.0).unwrap();
        method.fit(&x, &y).unwrap();

        let t = method.temperature().unwrap();
        assert!((t - 2.0 / 3.0f64.ln()).abs() < 0.05, "T = {}", t);
    }

    #[test]
    fn test_fitted_temperature_is_a_local_minimum() {
        // Three correct predictions at varying confidence and one
        // confidently wrong one: the NLL diverges as T -> 0 and its
        // large-T asymptote is above the value at T = 1, so the
        // minimum is interior.
        let x = array![[0.0, 1.0], [2.0, 0.0], [0.0, 3.0], [0.0, 2.0]];
        let y = array![1usize, 0, 1, 0];

        let mut method = TemperatureScaling::new(1.0).unwrap();
        method.fit(&x, &y).unwrap();
        let t = method.temperature().unwrap();

        let at_optimum = negative_log_likelihood(&x, &y, t);
        assert!(at_optimum <= negative_log_likelihood(&x, &y, t * 0.9) + 1e-9);
        assert!(at_optimum <= negative_log_likelihood(&x, &y, t * 1.1) + 1e-9);
    }

    #[test]
    fn test_predict_rows_sum_to_one() {
        let x = array![[0.2, 1.1, -0.5], [1.0, 0.0, 0.3], [-1.0, 0.2, 0.9]];
        let y = array![1usize, 0, 2];

        let mut method = TemperatureScaling::new(1.0).unwrap();
        method.fit(&x, &y).unwrap();
        let proba = method.predict_proba(&x).unwrap();

        assert_eq!(proba.shape(), &[3, 3]);
        for row in proba.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_latent_requires_fit() {
        let method = TemperatureScaling::new(1.0).unwrap();
        let z = array![0.1, 0.5];
        assert!(matches!(
            method.latent(&z),
            Err(CalibrationError::NotFitted(_))
        ));
    }

    #[test]
    fn test_latent_scales_by_temperature() {
        let x = array![[0.0, 1.0], [1.0, 0.0], [0.0, -1.0], [-1.0, 0.0]];
        let y = array![1usize, 0, 0, 1];

        let mut method = TemperatureScaling::new(1.0).unwrap();
        method.fit(&x, &y).unwrap();
        let t = method.temperature().unwrap();

        let z = array![0.5, 2.0];
        let latent = method.latent(&z).unwrap();
        assert!((latent[0] - t * 0.5).abs() < 1e-12);
        assert!((latent[1] - t * 2.0).abs() < 1e-12);
    }
}
