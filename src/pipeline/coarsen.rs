//! Coarsening of covariates into integer bin labels
//!
//! Each column named in a [`CoarseningSchema`] is replaced by `Int64` labels
//! `0..k-1` in ascending value order; other columns pass through untouched.
//! Intervals are right-closed with the lowest edge included, so the minimum
//! always lands in bin 0.

use polars::prelude::*;

use super::error::{CemError, Result};
use super::levels::require_column;
use super::schema::{BinMethod, BinSpec, Bins, CoarseningSchema};

/// Coarsen every schema column of `df`. Pure: the input is not modified.
pub fn coarsen(df: &DataFrame, schema: &CoarseningSchema) -> Result<DataFrame> {
    let mut out = df.clone();

    for (name, spec) in schema.iter() {
        let col = require_column(df, name)?;
        let values = numeric_values(col)?;
        let labels = bin_labels(name, &values, spec)?;
        out.with_column(Column::new(name.into(), labels))?;
    }

    Ok(out)
}

/// Numeric view of a column for binning. Booleans map to 0/1, NaN to null.
pub fn numeric_values(col: &Column) -> Result<Vec<Option<f64>>> {
    let dtype = col.dtype();
    if !(dtype.is_primitive_numeric() || matches!(dtype, DataType::Boolean)) {
        return Err(CemError::NonNumericColumn {
            column: col.name().to_string(),
            dtype: dtype.to_string(),
        });
    }

    Ok(col
        .cast(&DataType::Float64)?
        .f64()?
        .into_iter()
        .map(|v| v.filter(|x| !x.is_nan()))
        .collect())
}

/// Compute bin labels for `values` under `spec`. Nulls stay null.
pub fn bin_labels(column: &str, values: &[Option<f64>], spec: &BinSpec) -> Result<Vec<Option<i64>>> {
    let mut sorted: Vec<f64> = values.iter().flatten().copied().collect();
    if sorted.is_empty() {
        return Ok(vec![None; values.len()]);
    }
    sorted.sort_by(|a, b| a.total_cmp(b));

    let edges = match (spec.method(), spec.bins()) {
        (BinMethod::EqualWidth, Bins::Count(n)) => {
            let k = (*n).min(distinct_count(&sorted));
            equal_width_edges(sorted[0], sorted[sorted.len() - 1], k)
        }
        (BinMethod::EqualWidth, Bins::Edges(edges)) => edges.clone(),
        (BinMethod::EqualFrequency, Bins::Count(n)) => {
            let k = (*n).min(distinct_count(&sorted));
            let probs: Vec<f64> = (0..=k).map(|i| i as f64 / k as f64).collect();
            quantile_edges(&sorted, &probs)
        }
        (BinMethod::EqualFrequency, Bins::Edges(probs)) => quantile_edges(&sorted, probs),
    };

    if edges.len() < 2 {
        // Constant column: a single bin
        return Ok(values.iter().map(|v| v.map(|_| 0)).collect());
    }

    values
        .iter()
        .map(|v| v.map(|x| label_for(column, x, &edges)).transpose())
        .collect()
}

fn distinct_count(sorted: &[f64]) -> usize {
    1 + sorted.windows(2).filter(|w| w[0] != w[1]).count()
}

/// `k + 1` evenly spaced edges from `min` to `max` (inclusive)
fn equal_width_edges(min: f64, max: f64, k: usize) -> Vec<f64> {
    if min == max || k == 0 {
        return vec![min];
    }
    let width = (max - min) / k as f64;
    let mut edges: Vec<f64> = (0..k).map(|i| min + width * i as f64).collect();
    edges.push(max);
    edges
}

/// Linear-interpolated quantiles at `probs`, duplicate edges removed
fn quantile_edges(sorted: &[f64], probs: &[f64]) -> Vec<f64> {
    let mut edges: Vec<f64> = probs.iter().map(|&p| quantile(sorted, p)).collect();
    edges.dedup();
    edges
}

/// Linear-interpolated quantile of non-empty ascending `sorted`
pub(crate) fn quantile(sorted: &[f64], p: f64) -> f64 {
    let pos = p * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// Index of the right-closed interval holding `x`; the first interval also
/// includes its lower edge.
fn label_for(column: &str, x: f64, edges: &[f64]) -> Result<i64> {
    let lower = edges[0];
    let upper = edges[edges.len() - 1];
    if x < lower || x > upper {
        return Err(CemError::ValueOutsideEdges {
            column: column.to_string(),
            value: x,
            lower,
            upper,
        });
    }

    let inner = &edges[1..edges.len() - 1];
    Ok(inner.partition_point(|&e| e < x) as i64)
}

/// Floating-point columns that a schema leaves uncoarsened (outcome ignored).
///
/// Matching on such a column almost always degenerates strata to singletons.
pub fn missing_continuous(df: &DataFrame, schema: &CoarseningSchema, outcome: &str) -> Vec<String> {
    df.get_columns()
        .iter()
        .filter(|col| matches!(col.dtype(), DataType::Float32 | DataType::Float64))
        .map(|col| col.name().to_string())
        .filter(|name| name != outcome && !schema.contains(name))
        .collect()
}
