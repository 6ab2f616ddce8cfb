//! One-vs-rest decomposition for binary-only calibrators
//!
//! Calibrators whose native algorithm is binary handle more than two
//! classes by fitting one fresh clone per class column on the induced
//! two-class problem, then renormalizing the per-class outputs.

use crate::error::{CalibrationError, Result};
use crate::CalibrationMethod;
use ndarray::{Array1, Array2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Fitted state of a method with binary/multiclass dispatch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) enum FitState<B, M> {
    /// Native two-class fit
    Binary(B),
    /// Per-class decomposition for more than two classes
    OneVsRest(OneVsRestCalibrator<M>),
}

/// Two-class sub-problem for class column `class`: [1 - p, p]
fn binary_problem(x: &Array2<f64>, class: usize) -> Array2<f64> {
    let n = x.nrows();
    let mut xb = Array2::zeros((n, 2));
    for (i, &p) in x.column(class).iter().enumerate() {
        xb[[i, 0]] = 1.0 - p;
        xb[[i, 1]] = p;
    }
    xb
}

/// One-vs-rest wrapper owning one fitted calibrator per class
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OneVsRestCalibrator<M> {
    n_classes: usize,
    calibrators: Vec<M>,
}

impl<M: CalibrationMethod + Clone> OneVsRestCalibrator<M> {
    /// Fit one clone of `template` per class column of `x`. The clones
    /// are fitted independently, in parallel unless `n_jobs` is
    /// `Some(1)`.
    pub fn fit(
        template: &M,
        x: &Array2<f64>,
        y: &Array1<usize>,
        n_jobs: Option<usize>,
    ) -> Result<Self> {
        let n_classes = x.ncols();
        debug!("Fitting {} one-vs-rest calibrators", n_classes);

        let fit_one = |class: usize| -> Result<M> {
            let mut calibrator = template.clone();
            let xb = binary_problem(x, class);
            let yb = y.mapv(|label| usize::from(label == class));
            calibrator.fit(&xb, &yb)?;
            Ok(calibrator)
        };

        let calibrators = if n_jobs == Some(1) {
            (0..n_classes).map(fit_one).collect::<Result<Vec<_>>>()?
        } else {
            (0..n_classes)
                .into_par_iter()
                .map(fit_one)
                .collect::<Result<Vec<_>>>()?
        };

        Ok(Self {
            n_classes,
            calibrators,
        })
    }

    /// Number of classes seen at fit time
    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    /// Collect each class calibrator's positive-class probability and
    /// renormalize rows to a distribution. Rows where every calibrator
    /// returns zero fall back to uniform.
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if x.ncols() != self.n_classes {
            return Err(CalibrationError::ShapeError {
                expected: format!("{} class columns", self.n_classes),
                actual: format!("{} class columns", x.ncols()),
            });
        }

        let n = x.nrows();
        let mut proba = Array2::zeros((n, self.n_classes));
        for (class, calibrator) in self.calibrators.iter().enumerate() {
            let p = calibrator.predict_proba(&binary_problem(x, class))?;
            proba.column_mut(class).assign(&p.column(1));
        }

        for mut row in proba.rows_mut() {
            let sum: f64 = row.sum();
            if sum > 0.0 {
                row.mapv_inplace(|v| v / sum);
            } else {
                row.fill(1.0 / self.n_classes as f64);
            }
        }

        Ok(proba)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::histogram::{BinningMode, HistogramBinning};
    use ndarray::array;

    #[test]
    fn test_binary_problem_columns() {
        let x = array![[0.7, 0.2, 0.1], [0.1, 0.3, 0.6]];
        let xb = binary_problem(&x, 2);
        assert_eq!(xb.ncols(), 2);
        assert!((xb[[0, 0]] - 0.9).abs() < 1e-12);
        assert!((xb[[0, 1]] - 0.1).abs() < 1e-12);
        assert!((xb[[1, 1]] - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_one_vs_rest_rows_sum_to_one() {
        let x = array![
            [0.8, 0.1, 0.1],
            [0.1, 0.8, 0.1],
            [0.1, 0.1, 0.8],
            [0.6, 0.3, 0.1],
            [0.2, 0.5, 0.3],
            [0.3, 0.2, 0.5],
        ];
        let y = array![0usize, 1, 2, 0, 1, 2];

        let template = HistogramBinning::new(BinningMode::EqualWidth, 2).unwrap();
        let ovr = OneVsRestCalibrator::fit(&template, &x, &y, Some(1)).unwrap();
        let proba = ovr.predict_proba(&x).unwrap();

        assert_eq!(proba.shape(), &[6, 3]);
        for row in proba.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_one_vs_rest_class_count_mismatch() {
        let x = array![[0.8, 0.1, 0.1], [0.1, 0.8, 0.1], [0.1, 0.1, 0.8]];
        let y = array![0usize, 1, 2];
        let template = HistogramBinning::new(BinningMode::EqualWidth, 2).unwrap();
        let ovr = OneVsRestCalibrator::fit(&template, &x, &y, Some(1)).unwrap();

        let bad = array![[0.5, 0.5], [0.2, 0.8]];
        assert!(matches!(
            ovr.predict_proba(&bad),
            Err(CalibrationError::ShapeError { .. })
        ));
    }
}
