//! Tests for multidimensional imbalance

mod common;

use cem::pipeline::{
    coarsen, imbalance, match_weights, BinSpec, CemError, CoarseningSchema, Imbalance, Measure,
};
use common::{create_pair_dataframe, create_random_discrete_dataframe, create_synthetic_dataframe};
use polars::prelude::*;

fn scalar(measure: Measure, treatment: &[i32], predictor: &[i32]) -> f64 {
    let df = create_pair_dataframe(treatment, predictor);
    match imbalance(&df, "treatment", measure, None).unwrap() {
        Imbalance::Scalar(v) => v,
        other => panic!("expected a scalar, got {:?}", other),
    }
}

#[test]
fn test_reference_imbalance_cases() {
    for measure in [Measure::L1, Measure::L2] {
        assert!((scalar(measure, &[0, 0, 1, 1], &[1, 1, 2, 2]) - 1.0).abs() < 1e-9);
        assert!(scalar(measure, &[0, 0, 1, 1], &[1, 2, 1, 2]).abs() < 1e-9);
        assert!(
            (scalar(measure, &[0, 0, 1, 1, 1, 0], &[1, 1, 1, 2, 2, 2]) - 1.0 / 3.0).abs() < 1e-9
        );
    }
}

#[test]
fn test_imbalance_is_bounded() {
    for seed in 0..10 {
        let df = create_random_discrete_dataframe(60, 2, 3, seed);
        for measure in [Measure::L1, Measure::L2] {
            let value = imbalance(&df, "treatment", measure, None).unwrap().mean();
            assert!((0.0..=1.0).contains(&value), "seed {}: {}", seed, value);
        }
    }
}

#[test]
fn test_matching_removes_imbalance_on_the_matching_strata() {
    let df = create_random_discrete_dataframe(400, 2, 3, 11);
    let before = imbalance(&df, "treatment", Measure::L1, None).unwrap().mean();

    let result = match_weights(&df, "treatment").unwrap();
    let after = imbalance(&df, "treatment", Measure::L1, Some(&result.weights))
        .unwrap()
        .mean();

    assert!(before > 0.0);
    assert!(after.abs() < 1e-9, "weighted imbalance {}", after);
}

#[test]
fn test_matching_reduces_imbalance_on_synthetic_data() {
    let df = create_synthetic_dataframe(500, 3).drop("outcome").unwrap();
    let schema = CoarseningSchema::new()
        .with_column("age", BinSpec::equal_width(5).unwrap())
        .with_column("income", BinSpec::equal_frequency(3).unwrap());
    let coarse = coarsen(&df, &schema).unwrap();

    let before = imbalance(&coarse, "treated", Measure::L2, None).unwrap().mean();
    let result = match_weights(&coarse, "treated").unwrap();
    let after = imbalance(&coarse, "treated", Measure::L2, Some(&result.weights))
        .unwrap()
        .mean();
    assert!(after < before, "after {} should be below before {}", after, before);
}

#[test]
fn test_pairwise_table_for_three_levels() {
    let df = df! {
        "treatment" => [0i32, 1, 2, 0, 1, 2],
        "predictor" => [1i32, 1, 1, 2, 2, 3],
    }
    .unwrap();

    let result = imbalance(&df, "treatment", Measure::L1, None).unwrap();
    let table = result.to_dataframe().unwrap();
    let names: Vec<&str> = table.get_column_names().iter().map(|s| s.as_str()).collect();
    assert_eq!(names, vec!["level_a", "level_b", "imbalance"]);
    assert_eq!(table.height(), 3);

    let values: Vec<f64> = table
        .column("imbalance")
        .unwrap()
        .f64()
        .unwrap()
        .into_no_null_iter()
        .collect();
    assert!(values[0].abs() < 1e-9);
    assert!((values[1] - 0.5).abs() < 1e-9);
    assert!((values[2] - 0.5).abs() < 1e-9);
}

#[test]
fn test_zero_mass_level_is_reported() {
    let df = create_pair_dataframe(&[0, 0, 1, 1], &[1, 2, 3, 4]);
    let result = match_weights(&df, "treatment").unwrap();
    assert!(matches!(
        imbalance(&df, "treatment", Measure::L1, Some(&result.weights)),
        Err(CemError::EmptyTreatmentLevel { .. })
    ));
}

#[test]
fn test_unknown_measure_is_rejected() {
    assert!(matches!(
        "chi2".parse::<Measure>(),
        Err(CemError::UnknownMeasure { .. })
    ));
}
