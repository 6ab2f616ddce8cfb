//! Calibration quality metrics
//!
//! Operates on calibrated probability matrices: confidence is the
//! row-wise maximum probability and a prediction counts as correct
//! when its argmax matches the label.

use crate::error::Result;
use crate::numeric::argmax_rows;
use crate::check_fit_inputs;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Calibration metrics container
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationMetrics {
    /// Expected Calibration Error
    pub ece: f64,
    /// Maximum Calibration Error
    pub mce: f64,
    /// Multiclass Brier score
    pub brier_score: f64,
    /// Average confidence
    pub avg_confidence: f64,
    /// Accuracy of the argmax prediction
    pub accuracy: f64,
    /// Reliability diagram data
    pub reliability: Option<ReliabilityDiagram>,
}

/// Reliability diagram data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReliabilityDiagram {
    /// Bin edges over the confidence range [0, 1]
    pub bin_edges: Vec<f64>,
    /// Mean confidence in each bin
    pub bin_confidences: Vec<f64>,
    /// Fraction of correct predictions in each bin
    pub bin_accuracies: Vec<f64>,
    /// Number of samples in each bin
    pub bin_counts: Vec<usize>,
}

fn confidence_and_correctness(
    proba: &Array2<f64>,
    labels: &Array1<usize>,
) -> (Vec<f64>, Vec<bool>) {
    let predicted = argmax_rows(proba);
    let confidences: Vec<f64> = proba
        .rows()
        .into_iter()
        .map(|row| row.iter().cloned().fold(f64::NEG_INFINITY, f64::max))
        .collect();
    let correct: Vec<bool> = predicted
        .iter()
        .zip(labels.iter())
        .map(|(&p, &y)| p == y)
        .collect();
    (confidences, correct)
}

/// Compute reliability diagram data over equal-width confidence bins
pub fn reliability_diagram(
    proba: &Array2<f64>,
    labels: &Array1<usize>,
    n_bins: usize,
) -> Result<ReliabilityDiagram> {
    check_fit_inputs(proba, labels)?;

    let n_bins = n_bins.max(1);
    let bin_width = 1.0 / n_bins as f64;
    let bin_edges: Vec<f64> = (0..=n_bins).map(|i| i as f64 * bin_width).collect();

    let (confidences, correct) = confidence_and_correctness(proba, labels);

    let mut bin_sums = vec![0.0; n_bins];
    let mut bin_correct = vec![0.0; n_bins];
    let mut bin_counts = vec![0usize; n_bins];

    for (&conf, &ok) in confidences.iter().zip(correct.iter()) {
        let bin = ((conf / bin_width) as usize).min(n_bins - 1);
        bin_sums[bin] += conf;
        if ok {
            bin_correct[bin] += 1.0;
        }
        bin_counts[bin] += 1;
    }

    let bin_confidences: Vec<f64> = bin_sums
        .iter()
        .zip(bin_counts.iter())
        .map(|(&sum, &count)| if count > 0 { sum / count as f64 } else { 0.0 })
        .collect();
    let bin_accuracies: Vec<f64> = bin_correct
        .iter()
        .zip(bin_counts.iter())
        .map(|(&hits, &count)| if count > 0 { hits / count as f64 } else { 0.0 })
        .collect();

    Ok(ReliabilityDiagram {
        bin_edges,
        bin_confidences,
        bin_accuracies,
        bin_counts,
    })
}

/// Expected Calibration Error: the bin-count-weighted mean absolute
/// gap between per-bin accuracy and per-bin confidence
pub fn expected_calibration_error(
    proba: &Array2<f64>,
    labels: &Array1<usize>,
    n_bins: usize,
) -> Result<f64> {
    let reliability = reliability_diagram(proba, labels, n_bins)?;
    let n = proba.nrows() as f64;

    let mut ece = 0.0;
    for i in 0..reliability.bin_confidences.len() {
        let count = reliability.bin_counts[i] as f64;
        if count > 0.0 {
            let gap = (reliability.bin_accuracies[i] - reliability.bin_confidences[i]).abs();
            ece += (count / n) * gap;
        }
    }
    Ok(ece)
}

/// Maximum Calibration Error: the largest per-bin accuracy/confidence gap
pub fn maximum_calibration_error(
    proba: &Array2<f64>,
    labels: &Array1<usize>,
    n_bins: usize,
) -> Result<f64> {
    let reliability = reliability_diagram(proba, labels, n_bins)?;

    let mut mce: f64 = 0.0;
    for i in 0..reliability.bin_confidences.len() {
        if reliability.bin_counts[i] > 0 {
            let gap = (reliability.bin_accuracies[i] - reliability.bin_confidences[i]).abs();
            mce = mce.max(gap);
        }
    }
    Ok(mce)
}

/// Multiclass Brier score: mean over samples of the squared distance
/// between the probability row and the one-hot label
pub fn brier_score(proba: &Array2<f64>, labels: &Array1<usize>) -> Result<f64> {
    check_fit_inputs(proba, labels)?;

    let mut total = 0.0;
    for (row, &label) in proba.rows().into_iter().zip(labels.iter()) {
        for (k, &p) in row.iter().enumerate() {
            let target = if k == label { 1.0 } else { 0.0 };
            total += (p - target) * (p - target);
        }
    }
    Ok(total / proba.nrows() as f64)
}

/// Compute all calibration metrics in one pass
pub fn compute_calibration_metrics(
    proba: &Array2<f64>,
    labels: &Array1<usize>,
    n_bins: usize,
) -> Result<CalibrationMetrics> {
    let reliability = reliability_diagram(proba, labels, n_bins)?;
    let ece = expected_calibration_error(proba, labels, n_bins)?;
    let mce = maximum_calibration_error(proba, labels, n_bins)?;
    let brier = brier_score(proba, labels)?;

    let (confidences, correct) = confidence_and_correctness(proba, labels);
    let n = proba.nrows() as f64;
    let avg_confidence = confidences.iter().sum::<f64>() / n;
    let accuracy = correct.iter().filter(|&&ok| ok).count() as f64 / n;

    Ok(CalibrationMetrics {
        ece,
        mce,
        brier_score: brier,
        avg_confidence,
        accuracy,
        reliability: Some(reliability),
    })
}
