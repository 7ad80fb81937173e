//! Shared test utilities and fixture generators

#![allow(dead_code)]

use polars::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::PathBuf;
use tempfile::TempDir;

/// Two-column table of treatment and a single (already discrete) predictor
pub fn create_pair_dataframe(treatment: &[i32], predictor: &[i32]) -> DataFrame {
    df! {
        "treatment" => treatment,
        "predictor" => predictor,
    }
    .unwrap()
}

/// Small observational dataset with known structure
///
/// - `treated`: binary treatment (0/1)
/// - `age`: continuous, treated units skew older
/// - `income`: continuous
/// - `group`: text covariate
/// - `outcome`: continuous outcome (never matched on)
pub fn create_observational_dataframe() -> DataFrame {
    df! {
        "treated" => [0i32, 0, 0, 0, 0, 0, 1, 1, 1, 1, 1, 1],
        "age" => [22.0f64, 25.0, 31.0, 38.0, 45.0, 52.0, 29.0, 41.0, 47.0, 55.0, 61.0, 68.0],
        "income" => [18.0f64, 22.0, 30.0, 35.0, 41.0, 39.0, 27.0, 44.0, 50.0, 48.0, 61.0, 57.0],
        "group" => ["a", "b", "a", "b", "a", "b", "a", "b", "a", "b", "a", "b"],
        "outcome" => [1.0f64, 1.2, 0.9, 1.5, 1.1, 1.3, 2.1, 2.4, 2.0, 2.6, 2.2, 2.5],
    }
    .unwrap()
}

/// Larger synthetic dataset with selection on age, reproducible from `seed`
pub fn create_synthetic_dataframe(rows: usize, seed: u64) -> DataFrame {
    let mut rng = StdRng::seed_from_u64(seed);

    let mut treated = Vec::with_capacity(rows);
    let mut age = Vec::with_capacity(rows);
    let mut income = Vec::with_capacity(rows);
    let mut group = Vec::with_capacity(rows);
    let mut outcome = Vec::with_capacity(rows);

    for _ in 0..rows {
        let a: f64 = rng.gen_range(20.0..70.0);
        let p_treat = 0.2 + 0.6 * (a - 20.0) / 50.0;
        let t = i32::from(rng.gen_bool(p_treat));
        let inc = 15.0 + 0.8 * a + rng.gen_range(-5.0..5.0);
        let g = ["north", "south", "east"][rng.gen_range(0..3)];

        treated.push(t);
        age.push(a);
        income.push(inc);
        group.push(g);
        outcome.push(2.0 * t as f64 + 0.05 * a + rng.gen_range(-1.0..1.0));
    }

    df! {
        "treated" => treated,
        "age" => age,
        "income" => income,
        "group" => group,
        "outcome" => outcome,
    }
    .unwrap()
}

/// Random discrete table: binary treatment and integer covariates in `0..levels`
pub fn create_random_discrete_dataframe(rows: usize, covariates: usize, levels: i32, seed: u64) -> DataFrame {
    let mut rng = StdRng::seed_from_u64(seed);

    let mut columns: Vec<Column> = Vec::with_capacity(covariates + 1);
    let treatment: Vec<i32> = (0..rows).map(|_| rng.gen_range(0..2)).collect();
    columns.push(Column::new("treatment".into(), treatment));

    for i in 0..covariates {
        let values: Vec<i32> = (0..rows).map(|_| rng.gen_range(0..levels)).collect();
        columns.push(Column::new(format!("x{}", i).into(), values));
    }

    DataFrame::new(columns).unwrap()
}

/// Create a temporary directory with a test CSV file
pub fn create_temp_csv(df: &mut DataFrame) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let csv_path = temp_dir.path().join("test_data.csv");

    let mut file = std::fs::File::create(&csv_path).unwrap();
    CsvWriter::new(&mut file).finish(df).unwrap();

    (temp_dir, csv_path)
}

/// Create a temporary directory with a test Parquet file
pub fn create_temp_parquet(df: &mut DataFrame) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let parquet_path = temp_dir.path().join("test_data.parquet");

    let file = std::fs::File::create(&parquet_path).unwrap();
    ParquetWriter::new(file).finish(df).unwrap();

    (temp_dir, parquet_path)
}

/// Assert that two weight vectors agree element-wise
pub fn assert_weights_close(actual: &[f64], expected: &[f64]) {
    assert_eq!(
        actual.len(),
        expected.len(),
        "Weight count mismatch: expected {}, got {}",
        expected.len(),
        actual.len()
    );
    for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
        assert!(
            (a - e).abs() < 1e-9,
            "Weight {} mismatch: expected {:?}, got {:?}",
            i,
            expected,
            actual
        );
    }
}

/// Integer labels of a coarsened column
pub fn labels(df: &DataFrame, column: &str) -> Vec<Option<i64>> {
    df.column(column)
        .unwrap()
        .cast(&DataType::Int64)
        .unwrap()
        .i64()
        .unwrap()
        .into_iter()
        .collect()
}

/// Assert that a DataFrame contains specific columns
pub fn assert_has_columns(df: &DataFrame, expected_cols: &[&str]) {
    let actual_cols: Vec<String> = df.get_column_names().iter().map(|s| s.to_string()).collect();
    for col in expected_cols {
        assert!(
            actual_cols.contains(&col.to_string()),
            "Missing expected column: '{}'. Actual columns: {:?}",
            col,
            actual_cols
        );
    }
}
