//! Score binning for histogram-style calibrators
//!
//! A binning model partitions a score range into bins and maps each
//! calibration score to a bin. Bins are half-open, closed on the right
//! edge of the last bin, and out-of-range scores are clamped into the
//! nearest boundary bin.

use crate::numeric::quantile_sorted;
use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};

/// A partition of a score range into contiguous bins
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinningModel {
    /// Bin edges, length n_bins + 1, non-decreasing
    edges: Vec<f64>,
}

impl BinningModel {
    /// Partition [lo, hi] into `n_bins` bins of equal width
    pub fn equal_width(lo: f64, hi: f64, n_bins: usize) -> Self {
        let width = (hi - lo) / n_bins as f64;
        let mut edges: Vec<f64> = (0..=n_bins).map(|i| lo + i as f64 * width).collect();
        edges[0] = lo;
        edges[n_bins] = hi;
        Self { edges }
    }

    /// Partition [lo, hi] into `n_bins` population-balanced bins whose
    /// edges are quantiles of the calibration scores. The outer edges
    /// are pinned to the range and a running-maximum pass keeps the
    /// edge sequence non-decreasing.
    pub fn equal_frequency(scores: ArrayView1<f64>, lo: f64, hi: f64, n_bins: usize) -> Self {
        let mut sorted: Vec<f64> = scores.iter().copied().collect();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let step = (hi - lo) / n_bins as f64;
        let mut edges: Vec<f64> = (0..=n_bins)
            .map(|i| quantile_sorted(&sorted, lo + i as f64 * step))
            .collect();
        edges[0] = lo;
        edges[n_bins] = hi;

        let mut running_max = f64::NEG_INFINITY;
        for edge in edges.iter_mut() {
            running_max = running_max.max(*edge);
            *edge = running_max;
        }

        Self { edges }
    }

    /// Number of bins
    pub fn n_bins(&self) -> usize {
        self.edges.len() - 1
    }

    /// Bin edges, length n_bins + 1
    pub fn edges(&self) -> &[f64] {
        &self.edges
    }

    /// Midpoint of a bin
    pub fn midpoint(&self, bin: usize) -> f64 {
        (self.edges[bin] + self.edges[bin + 1]) / 2.0
    }

    /// Bin index for a score. A score equal to an interior edge belongs
    /// to the bin above it; a score on the rightmost edge belongs to the
    /// last bin; scores outside the range are clamped into the boundary
    /// bins.
    pub fn locate(&self, score: f64) -> usize {
        let n_bins = self.n_bins();
        self.edges[1..n_bins].partition_point(|&e| e <= score)
    }

    /// Per-bin positive and total label counts
    pub fn label_counts(
        &self,
        scores: ArrayView1<f64>,
        labels: &Array1<usize>,
    ) -> (Vec<f64>, Vec<f64>) {
        let mut positives = vec![0.0; self.n_bins()];
        let mut totals = vec![0.0; self.n_bins()];
        for (&score, &label) in scores.iter().zip(labels.iter()) {
            let bin = self.locate(score);
            totals[bin] += 1.0;
            if label == 1 {
                positives[bin] += 1.0;
            }
        }
        (positives, totals)
    }

    /// Empirical class-1 frequency per bin; NaN marks an empty bin
    pub fn class1_frequency(&self, scores: ArrayView1<f64>, labels: &Array1<usize>) -> Vec<f64> {
        let (positives, totals) = self.label_counts(scores, labels);
        positives
            .iter()
            .zip(totals.iter())
            .map(|(&m, &n)| if n > 0.0 { m / n } else { f64::NAN })
            .collect()
    }

    /// Empirical class-1 frequency per bin, substituting the bin
    /// midpoint for empty bins
    pub fn class1_frequency_or_midpoint(
        &self,
        scores: ArrayView1<f64>,
        labels: &Array1<usize>,
    ) -> Vec<f64> {
        let (positives, totals) = self.label_counts(scores, labels);
        positives
            .iter()
            .zip(totals.iter())
            .enumerate()
            .map(|(bin, (&m, &n))| if n > 0.0 { m / n } else { self.midpoint(bin) })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_equal_width_edges() {
        let binning = BinningModel::equal_width(0.0, 1.0, 4);
        let expected = [0.0, 0.25, 0.5, 0.75, 1.0];
        for (e, x) in binning.edges().iter().zip(expected.iter()) {
            assert!((e - x).abs() < 1e-12);
        }
    }

    #[test]
    fn test_locate_interior_edge_goes_to_upper_bin() {
        let binning = BinningModel::equal_width(0.0, 1.0, 2);
        assert_eq!(binning.locate(0.4), 0);
        assert_eq!(binning.locate(0.5), 1);
        assert_eq!(binning.locate(0.6), 1);
    }

    #[test]
    fn test_locate_rightmost_edge_is_last_bin() {
        let binning = BinningModel::equal_width(0.0, 1.0, 4);
        assert_eq!(binning.locate(1.0), 3);
    }

    #[test]
    fn test_locate_clamps_out_of_range() {
        let binning = BinningModel::equal_width(0.0, 1.0, 4);
        assert_eq!(binning.locate(-0.5), 0);
        assert_eq!(binning.locate(1.5), 3);
    }

    #[test]
    fn test_equal_frequency_edges_monotone_and_pinned() {
        let scores = array![0.9, 0.1, 0.5, 0.4, 0.6, 0.2, 0.8, 0.3];
        let binning = BinningModel::equal_frequency(scores.view(), 0.0, 1.0, 4);
        let edges = binning.edges();
        assert_eq!(edges.len(), 5);
        assert_eq!(edges[0], 0.0);
        assert_eq!(edges[4], 1.0);
        for w in edges.windows(2) {
            assert!(w[0] <= w[1]);
        }
    }

    #[test]
    fn test_class1_frequency() {
        let scores = array![0.1, 0.2, 0.8, 0.9];
        let labels = array![0usize, 1, 1, 1];
        let binning = BinningModel::equal_width(0.0, 1.0, 2);
        let freq = binning.class1_frequency(scores.view(), &labels);
        assert!((freq[0] - 0.5).abs() < 1e-12);
        assert!((freq[1] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_empty_bin_is_nan_or_midpoint() {
        let scores = array![0.1, 0.2];
        let labels = array![0usize, 1];
        let binning = BinningModel::equal_width(0.0, 1.0, 4);
        let freq = binning.class1_frequency(scores.view(), &labels);
        assert!(freq[0].is_finite());
        assert!(freq[2].is_nan());
        assert!(freq[3].is_nan());

        let filled = binning.class1_frequency_or_midpoint(scores.view(), &labels);
        assert!((filled[2] - 0.625).abs() < 1e-12);
        assert!((filled[3] - 0.875).abs() < 1e-12);
    }
}
