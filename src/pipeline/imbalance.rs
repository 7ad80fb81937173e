//! Multidimensional L1/L2 imbalance between treatment levels
//!
//! Rows are grouped into strata over the (coarsened) covariates. Each treatment
//! level gets a weighted histogram over one shared strata axis; pairs of levels
//! are compared after normalising both histograms to probability vectors.

use std::collections::{BTreeMap, BTreeSet};

use polars::prelude::*;
use serde::Serialize;

use super::coarsen::{numeric_values, quantile};
use super::error::{CemError, Result};
use super::levels::{column_levels, require_column, Level, TreatmentColumn};
use super::strata::Strata;
use super::weights::{total_weight, validate_weights};

/// Imbalance measure
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum Measure {
    /// Half the sum of absolute differences
    #[default]
    L1,
    /// Euclidean distance scaled by 1/sqrt(2)
    L2,
}

impl Measure {
    /// Distance between two probability vectors, in [0, 1]
    pub fn distance(&self, p: &[f64], q: &[f64]) -> f64 {
        match self {
            Measure::L1 => p.iter().zip(q).map(|(a, b)| (a - b).abs()).sum::<f64>() / 2.0,
            Measure::L2 => (p.iter().zip(q).map(|(a, b)| (a - b).powi(2)).sum::<f64>() / 2.0).sqrt(),
        }
    }
}

impl std::fmt::Display for Measure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Measure::L1 => write!(f, "l1"),
            Measure::L2 => write!(f, "l2"),
        }
    }
}

impl std::str::FromStr for Measure {
    type Err = CemError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "l1" => Ok(Measure::L1),
            "l2" => Ok(Measure::L2),
            _ => Err(CemError::UnknownMeasure {
                measure: s.to_string(),
            }),
        }
    }
}

/// Imbalance between one pair of treatment levels
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairImbalance {
    pub level_a: String,
    pub level_b: String,
    pub imbalance: f64,
}

/// Scalar score for two levels, pairwise table for more
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Imbalance {
    Scalar(f64),
    Pairwise(Vec<PairImbalance>),
}

impl Imbalance {
    /// Scalar value, or the mean over all pairs
    pub fn mean(&self) -> f64 {
        match self {
            Imbalance::Scalar(v) => *v,
            Imbalance::Pairwise(pairs) => {
                pairs.iter().map(|p| p.imbalance).sum::<f64>() / pairs.len() as f64
            }
        }
    }

    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Imbalance::Scalar(v) => Some(*v),
            Imbalance::Pairwise(_) => None,
        }
    }

    /// Pairwise view; a scalar score yields an empty slice
    pub fn pairs(&self) -> &[PairImbalance] {
        match self {
            Imbalance::Scalar(_) => &[],
            Imbalance::Pairwise(pairs) => pairs,
        }
    }

    /// Table with columns `level_a`, `level_b`, `imbalance`.
    ///
    /// A scalar score does not carry level names: it becomes a single row with
    /// null `level_a`/`level_b`.
    pub fn to_dataframe(&self) -> Result<DataFrame> {
        let (level_a, level_b, imbalance): (Vec<Option<String>>, Vec<Option<String>>, Vec<f64>) =
            match self {
                Imbalance::Scalar(v) => (vec![None], vec![None], vec![*v]),
                Imbalance::Pairwise(pairs) => (
                    pairs.iter().map(|p| Some(p.level_a.clone())).collect(),
                    pairs.iter().map(|p| Some(p.level_b.clone())).collect(),
                    pairs.iter().map(|p| p.imbalance).collect(),
                ),
            };

        Ok(DataFrame::new(vec![
            Column::new("level_a".into(), level_a),
            Column::new("level_b".into(), level_b),
            Column::new("imbalance".into(), imbalance),
        ])?)
    }
}

/// Imbalance of an already-coarsened table (outcome removed by the caller).
///
/// Without `weights` every observation counts once, which gives the
/// pre-matching imbalance.
pub fn imbalance(
    df: &DataFrame,
    treatment: &str,
    measure: Measure,
    weights: Option<&[f64]>,
) -> Result<Imbalance> {
    imbalance_with_order(df, treatment, None, measure, weights)
}

/// [`imbalance`] with pairs reported in a declared treatment order
pub fn imbalance_with_order(
    df: &DataFrame,
    treatment: &str,
    order: Option<&[String]>,
    measure: Measure,
    weights: Option<&[f64]>,
) -> Result<Imbalance> {
    let treatment = TreatmentColumn::from_frame(df, treatment, order)?;
    let strata = Strata::build(df, &[treatment.name.as_str()])?;
    score_strata(&treatment, &strata, measure, weights)
}

/// Core scoring over precomputed strata
pub fn score_strata(
    treatment: &TreatmentColumn,
    strata: &Strata,
    measure: Measure,
    weights: Option<&[f64]>,
) -> Result<Imbalance> {
    let height = treatment.values.len();
    if let Some(w) = weights {
        validate_weights(w, height)?;
    }

    // One histogram per level over the shared strata axis
    let mut histograms: BTreeMap<&Level, Vec<f64>> = BTreeMap::new();
    for level in treatment.values.iter().flatten() {
        histograms
            .entry(level)
            .or_insert_with(|| vec![0.0; strata.len()]);
    }

    if histograms.len() < 2 {
        return Err(CemError::TooFewTreatmentLevels {
            column: treatment.name.clone(),
            levels: histograms.len(),
        });
    }

    for (row, stratum) in strata.assignments().iter().enumerate() {
        let (Some(stratum), Some(level)) = (stratum, treatment.values[row].as_ref()) else {
            continue;
        };
        let w = weights.map_or(1.0, |w| w[row]);
        if let Some(histogram) = histograms.get_mut(level) {
            histogram[*stratum] += w;
        }
    }

    let mut distributions: Vec<(String, Vec<f64>)> = Vec::with_capacity(histograms.len());
    for (level, histogram) in histograms {
        let mass = total_weight(&histogram);
        if mass <= 0.0 {
            return Err(CemError::EmptyTreatmentLevel {
                level: level.to_string(),
            });
        }
        let probs = histogram.into_iter().map(|h| h / mass).collect();
        distributions.push((level.to_string(), probs));
    }

    let mut pairs = Vec::new();
    for (i, (level_a, p)) in distributions.iter().enumerate() {
        for (level_b, q) in &distributions[i + 1..] {
            pairs.push(PairImbalance {
                level_a: level_a.clone(),
                level_b: level_b.clone(),
                imbalance: measure.distance(p, q),
            });
        }
    }

    if pairs.len() == 1 {
        Ok(Imbalance::Scalar(pairs[0].imbalance))
    } else {
        Ok(Imbalance::Pairwise(pairs))
    }
}

/// Probabilities at which treated and control quantiles are compared
pub const QUANTILES: [f64; 5] = [0.0, 0.25, 0.5, 0.75, 1.0];

/// Balance statistic reported for one covariate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BalanceStatistic {
    /// Weighted mean of the treated level minus that of the control level
    #[serde(rename = "diff")]
    MeanDifference,
    /// Pearson chi-squared statistic of the weighted treatment-by-value table
    #[serde(rename = "Chi2")]
    ChiSquared,
}

impl std::fmt::Display for BalanceStatistic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BalanceStatistic::MeanDifference => write!(f, "diff"),
            BalanceStatistic::ChiSquared => write!(f, "Chi2"),
        }
    }
}

/// Marginal imbalance of a single covariate.
///
/// Treated is the highest treatment level, control the lowest.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarginalImbalance {
    pub column: String,
    /// Mean over treatment-level pairs
    pub imbalance: f64,
    /// `MeanDifference` for numeric columns with more than two distinct
    /// values, `ChiSquared` otherwise
    pub kind: BalanceStatistic,
    /// `None` when treated or control has no weighted observations
    pub statistic: Option<f64>,
    /// Treated minus control at each of [`QUANTILES`]; mean differences only
    pub quantile_diffs: Option<[f64; 5]>,
}

/// Score every covariate on its own, treatment excluded.
///
/// Imbalance is computed on `coarse`; the balance statistics use the
/// uncoarsened values of the same column in `raw`. Only rows with positive
/// weight take part.
pub fn univariate_imbalance(
    coarse: &DataFrame,
    raw: &DataFrame,
    treatment: &str,
    order: Option<&[String]>,
    measure: Measure,
    weights: Option<&[f64]>,
) -> Result<Vec<MarginalImbalance>> {
    let treatment = TreatmentColumn::from_frame(coarse, treatment, order)?;

    coarse
        .get_columns()
        .iter()
        .filter(|col| col.name().as_str() != treatment.name)
        .map(|col| {
            let single = DataFrame::new(vec![col.clone()])?;
            let strata = Strata::build(&single, &[])?;
            let score = score_strata(&treatment, &strata, measure, weights)?;

            let values = require_column(raw, col.name().as_str())?;
            let (kind, statistic, quantile_diffs) = balance_statistic(values, &treatment, weights)?;

            Ok(MarginalImbalance {
                column: col.name().to_string(),
                imbalance: score.mean(),
                kind,
                statistic,
                quantile_diffs,
            })
        })
        .collect()
}

type Balance = (BalanceStatistic, Option<f64>, Option<[f64; 5]>);

fn balance_statistic(values: &Column, treatment: &TreatmentColumn, weights: Option<&[f64]>) -> Result<Balance> {
    if values.len() != treatment.values.len() {
        return Err(CemError::InternalInconsistency(format!(
            "column '{}' has {} rows, treatment has {}",
            values.name(),
            values.len(),
            treatment.values.len()
        )));
    }

    let levels = column_levels(values)?;
    let weight = |row: usize| weights.map_or(1.0, |w| w[row]);
    let rows: Vec<usize> = (0..levels.len())
        .filter(|&row| treatment.values[row].is_some() && levels[row].is_some() && weight(row) > 0.0)
        .collect();

    let distinct: BTreeSet<&Level> = rows.iter().filter_map(|&row| levels[row].as_ref()).collect();
    if values.dtype().is_primitive_numeric() && distinct.len() > 2 {
        let numbers = numeric_values(values)?;
        let observations: Vec<(&Level, f64, f64)> = rows
            .iter()
            .filter_map(|&row| {
                let level = treatment.values[row].as_ref()?;
                Some((level, numbers[row]?, weight(row)))
            })
            .collect();
        mean_difference(&observations, treatment)
    } else {
        let cells: Vec<(&Level, &Level, f64)> = rows
            .iter()
            .filter_map(|&row| Some((treatment.values[row].as_ref()?, levels[row].as_ref()?, weight(row))))
            .collect();
        Ok((BalanceStatistic::ChiSquared, Some(chi_squared(&cells)), None))
    }
}

/// Weighted mean difference and unweighted quantile differences, treated minus control
fn mean_difference(observations: &[(&Level, f64, f64)], treatment: &TreatmentColumn) -> Result<Balance> {
    let present: Vec<&Level> = observations
        .iter()
        .map(|(level, _, _)| *level)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    if present.len() < 2 {
        return Ok((BalanceStatistic::MeanDifference, None, None));
    }
    let treated = treatment.reference(&present)?;
    let control = present[0];

    let summarise = |target: &Level| -> (f64, Vec<f64>) {
        let mut sum = 0.0;
        let mut mass = 0.0;
        let mut sorted = Vec::new();
        for &(_, x, w) in observations.iter().filter(|(level, _, _)| *level == target) {
            sum += x * w;
            mass += w;
            sorted.push(x);
        }
        sorted.sort_by(|a, b| a.total_cmp(b));
        (sum / mass, sorted)
    };

    let (treated_mean, treated_sorted) = summarise(treated);
    let (control_mean, control_sorted) = summarise(control);

    let mut diffs = [0.0; 5];
    for (diff, &p) in diffs.iter_mut().zip(QUANTILES.iter()) {
        *diff = quantile(&treated_sorted, p) - quantile(&control_sorted, p);
    }

    Ok((
        BalanceStatistic::MeanDifference,
        Some(treated_mean - control_mean),
        Some(diffs),
    ))
}

/// Pearson chi-squared over (treatment, value, weight) cells, with Yates'
/// continuity correction for 2x2 tables
fn chi_squared(cells: &[(&Level, &Level, f64)]) -> f64 {
    let mut table: BTreeMap<&Level, BTreeMap<&Level, f64>> = BTreeMap::new();
    let mut column_totals: BTreeMap<&Level, f64> = BTreeMap::new();
    for &(level, value, w) in cells {
        *table.entry(level).or_default().entry(value).or_insert(0.0) += w;
        *column_totals.entry(value).or_insert(0.0) += w;
    }
    if table.len() < 2 || column_totals.len() < 2 {
        return 0.0;
    }

    let total: f64 = column_totals.values().sum();
    let yates = table.len() == 2 && column_totals.len() == 2;

    let mut statistic = 0.0;
    for row in table.values() {
        let row_total: f64 = row.values().sum();
        for (value, column_total) in &column_totals {
            let observed = row.get(value).copied().unwrap_or(0.0);
            let expected = row_total * column_total / total;
            let mut deviation = (observed - expected).abs();
            if yates {
                deviation = (deviation - 0.5).max(0.0);
            }
            statistic += deviation * deviation / expected;
        }
    }
    statistic
}

/// Table with columns `column`, `imbalance`, `type`, `statistic` and one
/// quantile difference column per entry of [`QUANTILES`] (`q0` .. `q100`)
pub fn marginal_to_dataframe(marginal: &[MarginalImbalance]) -> Result<DataFrame> {
    let columns: Vec<String> = marginal.iter().map(|m| m.column.clone()).collect();
    let values: Vec<f64> = marginal.iter().map(|m| m.imbalance).collect();
    let kinds: Vec<String> = marginal.iter().map(|m| m.kind.to_string()).collect();
    let statistics: Vec<Option<f64>> = marginal.iter().map(|m| m.statistic).collect();

    let mut out = vec![
        Column::new("column".into(), columns),
        Column::new("imbalance".into(), values),
        Column::new("type".into(), kinds),
        Column::new("statistic".into(), statistics),
    ];
    for (i, p) in QUANTILES.iter().enumerate() {
        let diffs: Vec<Option<f64>> = marginal
            .iter()
            .map(|m| m.quantile_diffs.map(|d| d[i]))
            .collect();
        out.push(Column::new(format!("q{}", (p * 100.0).round() as u32).into(), diffs));
    }

    Ok(DataFrame::new(out)?)
}
