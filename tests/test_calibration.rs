//! Integration test: calibration method contract end-to-end

use ndarray::{Array1, Array2};
use probcal::numeric::softmax_rows;
use probcal::prelude::*;
use rand::prelude::*;

fn binary_matrix(scores: &[f64]) -> Array2<f64> {
    let mut x = Array2::zeros((scores.len(), 2));
    for (i, &s) in scores.iter().enumerate() {
        x[[i, 0]] = 1.0 - s;
        x[[i, 1]] = s;
    }
    x
}

fn binary_dataset() -> (Array2<f64>, Array1<usize>) {
    let scores = [
        0.05, 0.1, 0.15, 0.2, 0.25, 0.3, 0.35, 0.4, 0.45, 0.5, 0.55, 0.6, 0.65, 0.7, 0.75, 0.8,
        0.85, 0.9, 0.95, 0.99,
    ];
    let labels = [
        0usize, 0, 0, 1, 0, 0, 0, 1, 0, 1, 0, 1, 1, 1, 0, 1, 1, 1, 1, 1,
    ];
    (binary_matrix(&scores), Array1::from_vec(labels.to_vec()))
}

fn multiclass_dataset() -> (Array2<f64>, Array1<usize>) {
    let rows = [
        [0.8, 0.1, 0.1],
        [0.7, 0.2, 0.1],
        [0.6, 0.2, 0.2],
        [0.5, 0.4, 0.1],
        [0.2, 0.6, 0.2],
        [0.1, 0.8, 0.1],
        [0.2, 0.7, 0.1],
        [0.3, 0.5, 0.2],
        [0.1, 0.2, 0.7],
        [0.2, 0.2, 0.6],
        [0.1, 0.1, 0.8],
        [0.2, 0.3, 0.5],
        [0.4, 0.3, 0.3],
        [0.3, 0.3, 0.4],
        [0.25, 0.5, 0.25],
        [0.6, 0.1, 0.3],
        [0.15, 0.15, 0.7],
        [0.1, 0.6, 0.3],
    ];
    let labels = [0usize, 0, 0, 1, 1, 1, 1, 0, 2, 2, 2, 2, 0, 2, 1, 0, 2, 1];

    let mut x = Array2::zeros((rows.len(), 3));
    for (i, row) in rows.iter().enumerate() {
        for (j, &v) in row.iter().enumerate() {
            x[[i, j]] = v;
        }
    }
    (x, Array1::from_vec(labels.to_vec()))
}

fn all_methods() -> Vec<CalibrationModel> {
    CalibrationModel::NAMES
        .iter()
        .map(|name| CalibrationModel::from_name(name).expect("known method name"))
        .collect()
}

#[test]
fn test_shape_contract_binary() {
    let (x, y) = binary_dataset();

    for mut method in all_methods() {
        method
            .fit(&x, &y)
            .unwrap_or_else(|e| panic!("{} failed to fit: {}", method.name(), e));
        let proba = method.predict_proba(&x).unwrap();

        assert_eq!(proba.shape(), x.shape(), "{}", method.name());
        for row in proba.rows() {
            assert!(
                (row.sum() - 1.0).abs() < 1e-9,
                "{} rows must sum to 1",
                method.name()
            );
        }
    }
}

#[test]
fn test_shape_contract_multiclass() {
    let (x, y) = multiclass_dataset();

    for mut method in all_methods() {
        method
            .fit(&x, &y)
            .unwrap_or_else(|e| panic!("{} failed to fit: {}", method.name(), e));
        let proba = method.predict_proba(&x).unwrap();

        assert_eq!(proba.shape(), &[x.nrows(), 3], "{}", method.name());
        for row in proba.rows() {
            assert!(
                (row.sum() - 1.0).abs() < 1e-9,
                "{} rows must sum to 1",
                method.name()
            );
            assert!(
                row.iter().all(|&p| (-1e-9..=1.0 + 1e-9).contains(&p)),
                "{} entries must be probabilities",
                method.name()
            );
        }
    }
}

#[test]
fn test_predict_proba_is_idempotent() {
    let (x, y) = binary_dataset();

    for mut method in all_methods() {
        method.fit(&x, &y).unwrap();
        let first = method.predict_proba(&x).unwrap();
        let second = method.predict_proba(&x).unwrap();
        assert_eq!(first, second, "{}", method.name());
    }
}

#[test]
fn test_identity_baseline_returns_input() {
    let (x, y) = binary_dataset();

    let mut method = NoCalibration::new();
    method.fit(&x, &y).unwrap();
    assert_eq!(method.predict_proba(&x).unwrap(), x);
}

#[test]
fn test_not_fitted_guard_for_every_method() {
    let x = binary_matrix(&[0.3, 0.7]);

    for method in all_methods() {
        let result = method.predict_proba(&x);
        assert!(
            matches!(result, Err(CalibrationError::NotFitted(_))),
            "{} must guard against predict before fit",
            method.name()
        );
    }
}

#[test]
fn test_predict_is_argmax_of_predict_proba() {
    let (x, y) = binary_dataset();

    for mut method in all_methods() {
        method.fit(&x, &y).unwrap();
        let proba = method.predict_proba(&x).unwrap();
        let predicted = method.predict(&x).unwrap();

        for (row, &class) in proba.rows().into_iter().zip(predicted.iter()) {
            let by_hand = if row[1] > row[0] { 1 } else { 0 };
            assert_eq!(class, by_hand, "{}", method.name());
        }
    }
}

#[test]
fn test_class_count_mismatch_is_rejected() {
    let (x, y) = binary_dataset();
    let (wider, _) = multiclass_dataset();

    let mut method = PlattScaling::new();
    method.fit(&x, &y).unwrap();
    assert!(matches!(
        method.predict_proba(&wider),
        Err(CalibrationError::ShapeError { .. })
    ));
}

#[test]
fn test_registry_round_trip() {
    for name in CalibrationModel::NAMES {
        let method = CalibrationModel::from_name(name).unwrap();
        assert_eq!(method.name(), name);
    }
    assert!(matches!(
        CalibrationModel::from_name("bogus"),
        Err(CalibrationError::InvalidParameter { .. })
    ));
}

#[test]
fn test_construction_validation() {
    assert!(TemperatureScaling::new(0.0).is_err());
    assert!(TemperatureScaling::new(-1.0).is_err());
    assert!("bogus".parse::<BinningMode>().is_err());
    assert!("equal_freq".parse::<BinningMode>().is_ok());
}

#[test]
fn test_monotone_methods_preserve_score_order() {
    let (x, y) = binary_dataset();
    let grid = binary_matrix(&[0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9]);

    // Bins wide enough that the per-bin label means are monotone on
    // this calibration set
    let monotone: Vec<(&str, CalibrationModel)> = vec![
        (
            "isotonic_regression",
            CalibrationModel::from_name("isotonic_regression").unwrap(),
        ),
        (
            "histogram_binning",
            CalibrationModel::HistogramBinning(
                HistogramBinning::new(BinningMode::EqualWidth, 2).unwrap(),
            ),
        ),
    ];
    for (name, mut method) in monotone {
        method.fit(&x, &y).unwrap();
        let proba = method.predict_proba(&grid).unwrap();
        let p1 = proba.column(1);
        for i in 1..p1.len() {
            assert!(p1[i] >= p1[i - 1] - 1e-12, "{} must be non-decreasing", name);
        }
    }
}

#[test]
fn test_temperature_scaling_recovers_known_temperature() {
    let mut rng = StdRng::seed_from_u64(42);
    let n = 8000;
    let k = 3;
    let t_true = 2.5;

    // Draw calibrated logits, sample labels from their softmax, then
    // hand the method the logits scaled up by the true temperature
    let mut logits = Array2::zeros((n, k));
    for v in logits.iter_mut() {
        *v = rng.gen_range(-2.0..2.0);
    }
    let proba = softmax_rows(&logits);

    let mut labels = Vec::with_capacity(n);
    for row in proba.rows() {
        let u: f64 = rng.gen();
        let mut cumulative = 0.0;
        let mut label = k - 1;
        for (j, &p) in row.iter().enumerate() {
            cumulative += p;
            if u < cumulative {
                label = j;
                break;
            }
        }
        labels.push(label);
    }
    let y = Array1::from_vec(labels);
    let x = logits.mapv(|v| v * t_true);

    let mut method = TemperatureScaling::new(1.0).unwrap();
    method.fit(&x, &y).unwrap();

    let t = method.temperature().unwrap();
    assert!(
        (t - t_true).abs() < 0.25,
        "recovered T = {}, expected about {}",
        t,
        t_true
    );
}

#[test]
fn test_histogram_concrete_scenario() {
    let x = ndarray::array![[0.9, 0.1], [0.5, 0.5], [0.1, 0.9]];
    let y = ndarray::array![0usize, 1, 1];

    let mut method = HistogramBinning::new(BinningMode::EqualWidth, 2).unwrap();
    method.fit(&x, &y).unwrap();
    let proba = method.predict_proba(&x).unwrap();

    let p1 = proba.column(1);
    for i in 1..p1.len() {
        assert!(p1[i] >= p1[i - 1] - 1e-12);
    }
    for row in proba.rows() {
        assert!((row.sum() - 1.0).abs() < 1e-12);
    }
}

#[test]
fn test_bbq_model_weights_are_normalized() {
    let (x, y) = binary_dataset();

    let mut method = BayesianBinningQuantiles::new();
    method.fit(&x, &y).unwrap();

    let weights = method.model_weights().unwrap();
    assert!(!weights.is_empty());
    assert!(weights.iter().all(|&w| w >= 0.0));
    assert!((weights.iter().sum::<f64>() - 1.0).abs() < 1e-9);
}

#[test]
fn test_uncalibrated_brier_matches_direct_computation() {
    let (x, y) = binary_dataset();

    let mut method = NoCalibration::new();
    method.fit(&x, &y).unwrap();
    let proba = method.predict_proba(&x).unwrap();

    let from_output = brier_score(&proba, &y).unwrap();
    let from_input = brier_score(&x, &y).unwrap();
    assert!((from_output - from_input).abs() < 1e-12);
}
