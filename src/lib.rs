//! probcal - Probability calibration for classifier scores
//!
//! A calibration method takes posterior class probabilities (or logits)
//! produced by an arbitrary classifier and transforms them into
//! calibrated probabilities: a predicted probability p matches the
//! empirical frequency of a correct prediction. Transforms are learned
//! on a held-out calibration set via `fit(X, y)` and applied with
//! `predict_proba(X)`.
//!
//! # Modules
//!
//! ## Calibration methods
//! - [`identity`] - No-op baseline for benchmarking
//! - [`temperature`] - Temperature scaling of logits
//! - [`platt`] - Platt scaling (sigmoid calibration)
//! - [`isotonic`] - Isotonic regression
//! - [`histogram`] - Histogram binning
//! - [`bbq`] - Bayesian binning into quantiles
//!
//! ## Building blocks
//! - [`binning`] - Score binning shared by the histogram-style methods
//! - [`multiclass`] - One-vs-rest decomposition for binary-only methods
//! - [`numeric`] - Softmax, log-sum-exp, quantile kernels
//! - [`metrics`] - Calibration error metrics (ECE, MCE, Brier)

// Core error handling
pub mod error;

// Building blocks
pub mod binning;
pub mod multiclass;
pub mod numeric;

// Calibration methods
pub mod bbq;
pub mod histogram;
pub mod identity;
pub mod isotonic;
pub mod platt;
pub mod temperature;

// Evaluation
pub mod metrics;

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

pub use error::{CalibrationError, Result};

use bbq::BayesianBinningQuantiles;
use histogram::{BinningMode, HistogramBinning};
use identity::NoCalibration;
use isotonic::IsotonicRegression;
use platt::PlattScaling;
use temperature::TemperatureScaling;

/// Shared contract of every calibration method
///
/// `fit` learns the transform from calibration-set scores and labels,
/// `predict_proba` applies it, and `predict` takes the most probable
/// class of the calibrated output.
pub trait CalibrationMethod: Send + Sync {
    /// Learn the calibration transform from uncalibrated class scores
    /// `x` (n_samples x n_classes) and labels `y`
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<usize>) -> Result<()>;

    /// Calibrated posterior probabilities, same shape as the input
    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>>;

    /// Most probable class per sample after calibration
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<usize>> {
        Ok(numeric::argmax_rows(&self.predict_proba(x)?))
    }
}

/// Scores must carry one column per class
pub(crate) fn check_score_matrix(x: &Array2<f64>) -> Result<()> {
    if x.ncols() < 2 {
        return Err(CalibrationError::ShapeError {
            expected: "at least 2 class columns".to_string(),
            actual: format!("{} columns", x.ncols()),
        });
    }
    Ok(())
}

/// Fit-time validation shared by every method
pub(crate) fn check_fit_inputs(x: &Array2<f64>, y: &Array1<usize>) -> Result<()> {
    check_score_matrix(x)?;
    if x.nrows() == 0 {
        return Err(CalibrationError::ShapeError {
            expected: "at least 1 sample".to_string(),
            actual: "0 samples".to_string(),
        });
    }
    if x.nrows() != y.len() {
        return Err(CalibrationError::ShapeError {
            expected: format!("{} labels", x.nrows()),
            actual: format!("{} labels", y.len()),
        });
    }
    if let Some(&label) = y.iter().find(|&&label| label >= x.ncols()) {
        return Err(CalibrationError::ShapeError {
            expected: format!("class labels in 0..{}", x.ncols()),
            actual: format!("label {}", label),
        });
    }
    Ok(())
}

/// Predict-time class count must match the fitted class count
pub(crate) fn check_class_count(expected: usize, x: &Array2<f64>) -> Result<()> {
    if x.ncols() != expected {
        return Err(CalibrationError::ShapeError {
            expected: format!("{} class columns", expected),
            actual: format!("{} class columns", x.ncols()),
        });
    }
    Ok(())
}

/// The closed set of calibration methods, dispatched by tag
///
/// Useful for configuration-driven selection; each variant owns a
/// concrete method with its own parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CalibrationModel {
    NoCalibration(NoCalibration),
    TemperatureScaling(TemperatureScaling),
    PlattScaling(PlattScaling),
    IsotonicRegression(IsotonicRegression),
    HistogramBinning(HistogramBinning),
    BayesianBinningQuantiles(BayesianBinningQuantiles),
}

impl CalibrationModel {
    /// String identifiers accepted by [`CalibrationModel::from_name`]
    pub const NAMES: [&'static str; 6] = [
        "no_calibration",
        "temperature_scaling",
        "platt_scaling",
        "isotonic_regression",
        "histogram_binning",
        "bayesian_binning_quantiles",
    ];

    /// Construct a method with default parameters from its identifier
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "no_calibration" => Ok(Self::NoCalibration(NoCalibration::new())),
            "temperature_scaling" => Ok(Self::TemperatureScaling(TemperatureScaling::default())),
            "platt_scaling" => Ok(Self::PlattScaling(PlattScaling::new())),
            "isotonic_regression" => Ok(Self::IsotonicRegression(IsotonicRegression::new())),
            "histogram_binning" => Ok(Self::HistogramBinning(HistogramBinning::new(
                BinningMode::EqualWidth,
                20,
            )?)),
            "bayesian_binning_quantiles" => Ok(Self::BayesianBinningQuantiles(
                BayesianBinningQuantiles::new(),
            )),
            other => Err(CalibrationError::InvalidParameter {
                name: "method".to_string(),
                value: other.to_string(),
                reason: format!(
                    "unknown calibration method, expected one of {:?}",
                    Self::NAMES
                ),
            }),
        }
    }

    /// Identifier of the wrapped method
    pub fn name(&self) -> &'static str {
        match self {
            Self::NoCalibration(_) => "no_calibration",
            Self::TemperatureScaling(_) => "temperature_scaling",
            Self::PlattScaling(_) => "platt_scaling",
            Self::IsotonicRegression(_) => "isotonic_regression",
            Self::HistogramBinning(_) => "histogram_binning",
            Self::BayesianBinningQuantiles(_) => "bayesian_binning_quantiles",
        }
    }
}

impl CalibrationMethod for CalibrationModel {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<usize>) -> Result<()> {
        match self {
            Self::NoCalibration(m) => m.fit(x, y),
            Self::TemperatureScaling(m) => m.fit(x, y),
            Self::PlattScaling(m) => m.fit(x, y),
            Self::IsotonicRegression(m) => m.fit(x, y),
            Self::HistogramBinning(m) => m.fit(x, y),
            Self::BayesianBinningQuantiles(m) => m.fit(x, y),
        }
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        match self {
            Self::NoCalibration(m) => m.predict_proba(x),
            Self::TemperatureScaling(m) => m.predict_proba(x),
            Self::PlattScaling(m) => m.predict_proba(x),
            Self::IsotonicRegression(m) => m.predict_proba(x),
            Self::HistogramBinning(m) => m.predict_proba(x),
            Self::BayesianBinningQuantiles(m) => m.predict_proba(x),
        }
    }
}

/// Re-export commonly used types
pub mod prelude {
    // Error handling
    pub use crate::error::{CalibrationError, Result};

    // Method contract and registry
    pub use crate::{CalibrationMethod, CalibrationModel};

    // Calibration methods
    pub use crate::bbq::BayesianBinningQuantiles;
    pub use crate::histogram::{BinningMode, HistogramBinning};
    pub use crate::identity::NoCalibration;
    pub use crate::isotonic::{IsotonicRegression, OutOfBounds};
    pub use crate::platt::PlattScaling;
    pub use crate::temperature::TemperatureScaling;

    // Building blocks
    pub use crate::binning::BinningModel;
    pub use crate::multiclass::OneVsRestCalibrator;

    // Metrics
    pub use crate::metrics::{
        brier_score, compute_calibration_metrics, expected_calibration_error,
        maximum_calibration_error, reliability_diagram, CalibrationMetrics, ReliabilityDiagram,
    };
}
