//! Identity baseline (no calibration)

use crate::error::{CalibrationError, Result};
use crate::{check_class_count, check_fit_inputs, check_score_matrix, CalibrationMethod};
use crate::numeric::softmax_rows;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// A calibrator that performs no calibration
///
/// Useful as a benchmarking control: the calibration error of its
/// output is the calibration error of the uncalibrated model. When
/// `logits` is set, inputs are treated as pre-softmax scores and
/// mapped through a row softmax; otherwise they pass through unchanged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoCalibration {
    logits: bool,
    n_classes: Option<usize>,
}

impl NoCalibration {
    /// Create an identity calibrator for probability inputs
    pub fn new() -> Self {
        Self {
            logits: false,
            n_classes: None,
        }
    }

    /// Treat inputs as logits and apply a softmax at predict time
    pub fn with_logits(mut self, logits: bool) -> Self {
        self.logits = logits;
        self
    }
}

impl Default for NoCalibration {
    fn default() -> Self {
        Self::new()
    }
}

impl CalibrationMethod for NoCalibration {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<usize>) -> Result<()> {
        check_fit_inputs(x, y)?;
        self.n_classes = Some(x.ncols());
        Ok(())
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        check_score_matrix(x)?;
        let n_classes = self
            .n_classes
            .ok_or_else(|| CalibrationError::NotFitted("class count".to_string()))?;
        check_class_count(n_classes, x)?;

        if self.logits {
            Ok(softmax_rows(x))
        } else {
            Ok(x.clone())
        }
    }
}
