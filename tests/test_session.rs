//! End-to-end tests for the matching session

mod common;

use cem::pipeline::{
    marginal_to_dataframe, BalanceStatistic, BinSpec, Cem, CemConfig, CemError, CoarseningSchema,
    Imbalance, MatchStatus, Measure,
};
use common::{create_observational_dataframe, create_synthetic_dataframe, labels};
use polars::prelude::*;

#[test]
fn test_session_with_automatic_h() {
    let df = create_synthetic_dataframe(400, 21);
    let cem = Cem::new(&df, "treated", "outcome", CemConfig::default()).unwrap();

    assert_eq!(cem.profile().len(), 10);
    assert!((1..=10).contains(&cem.h()));
    assert_eq!(cem.levels(), 2);
    assert!(matches!(cem.preimbalance(), Imbalance::Scalar(_)));

    let schema = CoarseningSchema::from_assignments(&["age=cut:6", "income=qcut:4"]).unwrap();
    let result = cem.match_weights(Some(&schema)).unwrap();
    assert_eq!(result.status, MatchStatus::Matched);
    assert!(result.matched_count() > 0);
    assert_eq!(result.weights.len(), df.height());
    assert!(cem.imbalance(Some(&schema)).is_ok());

    // Matching on the scoring schema balances it exactly
    let before = cem.preimbalance().mean();
    let after = cem.imbalance(None).unwrap().mean();
    assert!(before > 0.0);
    assert!(after.abs() < 1e-9, "after {} vs before {}", after, before);
}

#[test]
fn test_default_schema_is_the_h_schema() {
    let df = create_observational_dataframe();
    let config = CemConfig {
        h: Some(2),
        ..Default::default()
    };
    let cem = Cem::new(&df, "treated", "outcome", config).unwrap();

    assert!(cem.schema().contains("age"));
    assert!(cem.schema().contains("income"));
    assert_eq!(
        cem.match_weights(None).unwrap().weights,
        cem.match_weights(Some(cem.schema())).unwrap().weights
    );

    let coarse = cem.coarsened(None).unwrap();
    let age = labels(&coarse, "age");
    assert!(age.iter().flatten().all(|&label| label == 0 || label == 1));
    assert_eq!(coarse.column("outcome").unwrap().dtype(), &DataType::Float64);
}

#[test]
fn test_measure_changes_scores() {
    let df = create_synthetic_dataframe(300, 4);
    let l1 = Cem::new(
        &df,
        "treated",
        "outcome",
        CemConfig {
            h: Some(4),
            ..Default::default()
        },
    )
    .unwrap();
    let l2 = Cem::new(
        &df,
        "treated",
        "outcome",
        CemConfig {
            h: Some(4),
            measure: Measure::L2,
            ..Default::default()
        },
    )
    .unwrap();

    let a = l1.preimbalance().mean();
    let b = l2.preimbalance().mean();
    assert!((0.0..=1.0).contains(&a));
    assert!((0.0..=1.0).contains(&b));
    assert!((a - b).abs() > 1e-12);
}

#[test]
fn test_univariate_imbalance_lists_covariates() {
    let df = create_synthetic_dataframe(300, 8);
    let cem = Cem::new(
        &df,
        "treated",
        "outcome",
        CemConfig {
            h: Some(3),
            ..Default::default()
        },
    )
    .unwrap();

    let marginal = cem.univariate_imbalance(None).unwrap();
    let columns: Vec<&str> = marginal.iter().map(|m| m.column.as_str()).collect();
    assert_eq!(columns, vec!["age", "income", "group"]);
    assert!(marginal.iter().all(|m| (0.0..=1.0).contains(&m.imbalance)));

    let kinds: Vec<BalanceStatistic> = marginal.iter().map(|m| m.kind).collect();
    assert_eq!(
        kinds,
        vec![
            BalanceStatistic::MeanDifference,
            BalanceStatistic::MeanDifference,
            BalanceStatistic::ChiSquared
        ]
    );
    assert!(marginal[0].quantile_diffs.is_some());
    assert!(marginal[2].quantile_diffs.is_none());

    let table = marginal_to_dataframe(&marginal).unwrap();
    assert_eq!(table.height(), 3);
    assert_eq!(table.width(), 9);
}

#[test]
fn test_unmatched_schema_cannot_be_scored() {
    let df = create_observational_dataframe();
    let cem = Cem::new(
        &df,
        "treated",
        "outcome",
        CemConfig {
            h: Some(2),
            ..Default::default()
        },
    )
    .unwrap();

    let raw = CoarseningSchema::new();
    let result = cem.match_weights(Some(&raw)).unwrap();
    assert_eq!(result.status, MatchStatus::NoFullyMatchedStrata);
    assert!(matches!(
        cem.imbalance(Some(&raw)),
        Err(CemError::NoFullyMatchedStrata { .. })
    ));
}

#[test]
fn test_text_treatment_needs_declared_order() {
    let df = df! {
        "arm" => ["drug", "placebo", "drug", "placebo", "drug", "placebo"],
        "dose" => [1.0f64, 1.0, 2.0, 2.0, 3.0, 3.0],
        "y" => [0.5f64, 0.1, 0.7, 0.2, 0.9, 0.3],
    }
    .unwrap();

    let schema = CoarseningSchema::new().with_column("dose", BinSpec::equal_width(3).unwrap());
    let config = CemConfig {
        h: Some(3),
        ..Default::default()
    };
    let cem = Cem::new(&df, "arm", "y", config).unwrap();
    assert!(matches!(
        cem.match_weights(Some(&schema)),
        Err(CemError::UnorderedTreatment { .. })
    ));

    let config = CemConfig {
        h: Some(3),
        treatment_order: Some(vec!["placebo".to_string(), "drug".to_string()]),
        ..Default::default()
    };
    let cem = Cem::new(&df, "arm", "y", config).unwrap();
    let result = cem.match_weights(Some(&schema)).unwrap();
    assert_eq!(result.weights, vec![1.0; 6]);
}

#[test]
fn test_automatic_h_needs_two_levels() {
    let df = df! {
        "arm" => [0i32, 1, 2, 0, 1, 2],
        "x" => [1.0f64, 2.0, 3.0, 1.5, 2.5, 3.5],
        "y" => [0i32, 1, 0, 1, 0, 1],
    }
    .unwrap();
    assert!(matches!(
        Cem::new(&df, "arm", "y", CemConfig::default()),
        Err(CemError::AmbiguousTreatmentLevels { levels: 3, .. })
    ));

    let single = df! {
        "arm" => [1i32, 1],
        "x" => [1.0f64, 2.0],
        "y" => [0i32, 1],
    }
    .unwrap();
    assert!(matches!(
        Cem::new(&single, "arm", "y", CemConfig::default()),
        Err(CemError::TooFewTreatmentLevels { levels: 1, .. })
    ));
}
