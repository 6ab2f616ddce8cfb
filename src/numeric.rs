//! Shared numeric kernels for calibration transforms

use ndarray::{Array1, Array2};

/// Row-wise softmax with the max-subtraction trick for stability
pub fn softmax_rows(x: &Array2<f64>) -> Array2<f64> {
    let mut out = x.clone();
    for mut row in out.rows_mut() {
        let max = row.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        row.mapv_inplace(|v| (v - max).exp());
        let sum: f64 = row.sum();
        if sum > 0.0 {
            row.mapv_inplace(|v| v / sum);
        } else {
            // All entries underflowed (e.g. -inf logits): fall back to uniform
            let k = row.len() as f64;
            row.fill(1.0 / k);
        }
    }
    out
}

/// log(sum(exp(v))) computed without overflow
pub fn log_sum_exp(values: &[f64]) -> f64 {
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return max;
    }
    let sum: f64 = values.iter().map(|&v| (v - max).exp()).sum();
    max + sum.ln()
}

/// Quantile of pre-sorted data with linear interpolation between order
/// statistics. Levels are clamped to [0, 1].
pub fn quantile_sorted(sorted: &[f64], level: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let q = level.clamp(0.0, 1.0);
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    if lo == hi {
        return sorted[lo];
    }
    let frac = pos - lo as f64;
    sorted[lo] + frac * (sorted[hi] - sorted[lo])
}

/// Index of the row-wise maximum (first one wins on ties)
pub fn argmax_rows(p: &Array2<f64>) -> Array1<usize> {
    let indices: Vec<usize> = p
        .rows()
        .into_iter()
        .map(|row| {
            let mut best = 0;
            let mut best_val = f64::NEG_INFINITY;
            for (j, &v) in row.iter().enumerate() {
                if v > best_val {
                    best_val = v;
                    best = j;
                }
            }
            best
        })
        .collect();
    Array1::from_vec(indices)
}
