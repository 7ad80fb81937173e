//! CEM weighting of stratified observations
//!
//! Only strata containing every treatment level present in the table receive
//! non-zero weights. Inside such a stratum the reference level (maximum under
//! the treatment order) has weight 1 and every other level `c` gets
//! `(M[c] / M[T]) * (m[T] / m[c])`, where `M` counts levels across all matched
//! strata and `m` counts them within the stratum.

use std::collections::BTreeMap;

use log::warn;
use polars::prelude::*;
use serde::Serialize;

use super::error::{CemError, Result};
use super::levels::{Level, TreatmentColumn};
use super::strata::Strata;

/// Outcome of a matching run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MatchStatus {
    /// At least one stratum covers every treatment level
    Matched,
    /// No stratum covers every level; all weights are zero
    NoFullyMatchedStrata,
}

/// Per-observation matching weights plus stratum bookkeeping
#[derive(Debug, Clone, Serialize)]
pub struct MatchResult {
    /// One weight per input row, in input order
    pub weights: Vec<f64>,
    pub status: MatchStatus,
    /// Strata covering every treatment level
    pub matched_strata: usize,
    /// All strata observed (rows with null covariates excluded)
    pub total_strata: usize,
    /// Number of distinct treatment levels in the table
    pub levels: usize,
}

impl MatchResult {
    fn unmatched(height: usize, total_strata: usize, levels: usize) -> Self {
        Self {
            weights: vec![0.0; height],
            status: MatchStatus::NoFullyMatchedStrata,
            matched_strata: 0,
            total_strata,
            levels,
        }
    }

    /// Number of observations with positive weight
    pub fn matched_count(&self) -> usize {
        self.weights.iter().filter(|&&w| w > 0.0).count()
    }

    /// Weights as a polars `Series` named `weights`
    pub fn to_series(&self) -> Series {
        Series::new("weights".into(), self.weights.clone())
    }

    /// Turn a degenerate match into an error for callers that need matched data
    pub fn require_matched(self) -> Result<Self> {
        match self.status {
            MatchStatus::Matched => Ok(self),
            MatchStatus::NoFullyMatchedStrata => Err(CemError::NoFullyMatchedStrata {
                levels: self.levels,
            }),
        }
    }
}

/// Weight the rows of an already-coarsened table (outcome removed by the caller).
///
/// Strata are formed from every column except `treatment`.
pub fn match_weights(df: &DataFrame, treatment: &str) -> Result<MatchResult> {
    match_weights_with_order(df, treatment, None)
}

/// [`match_weights`] with an explicit ascending order of treatment labels
pub fn match_weights_with_order(
    df: &DataFrame,
    treatment: &str,
    order: Option<&[String]>,
) -> Result<MatchResult> {
    let treatment = TreatmentColumn::from_frame(df, treatment, order)?;
    let strata = Strata::build(df, &[treatment.name.as_str()])?;
    weight_strata(&treatment, &strata)
}

/// Core weighting over precomputed strata
pub fn weight_strata(treatment: &TreatmentColumn, strata: &Strata) -> Result<MatchResult> {
    let height = treatment.values.len();
    let level_count = treatment.distinct().len();

    // Local level counts per stratum, null treatments ignored
    let members = strata.members();
    let local_counts: Vec<BTreeMap<&Level, usize>> = members
        .iter()
        .map(|rows| {
            let mut counts = BTreeMap::new();
            for level in rows.iter().filter_map(|&row| treatment.values[row].as_ref()) {
                *counts.entry(level).or_insert(0) += 1;
            }
            counts
        })
        .collect();

    let matched: Vec<usize> = local_counts
        .iter()
        .enumerate()
        .filter(|(_, counts)| level_count > 0 && counts.len() == level_count)
        .map(|(id, _)| id)
        .collect();

    if matched.is_empty() {
        warn!(
            "{}",
            CemError::NoFullyMatchedStrata {
                levels: level_count
            }
        );
        return Ok(MatchResult::unmatched(height, strata.len(), level_count));
    }

    let mut global_counts: BTreeMap<&Level, usize> = BTreeMap::new();
    for &id in &matched {
        for (level, count) in &local_counts[id] {
            *global_counts.entry(*level).or_insert(0) += count;
        }
    }

    let mut weights = vec![0.0; height];
    for &id in &matched {
        let local = &local_counts[id];
        let present: Vec<&Level> = local.keys().copied().collect();
        let reference = treatment.reference(&present)?;

        let m_ref = count_of(local, reference)?;
        let big_m_ref = count_of(&global_counts, reference)?;

        for &row in &members[id] {
            let Some(level) = treatment.values[row].as_ref() else {
                continue;
            };
            weights[row] = if level == reference {
                1.0
            } else {
                let m_c = count_of(local, level)?;
                let big_m_c = count_of(&global_counts, level)?;
                (big_m_c as f64 / big_m_ref as f64) * (m_ref as f64 / m_c as f64)
            };
        }
    }

    Ok(MatchResult {
        weights,
        status: MatchStatus::Matched,
        matched_strata: matched.len(),
        total_strata: strata.len(),
        levels: level_count,
    })
}

fn count_of(counts: &BTreeMap<&Level, usize>, level: &Level) -> Result<usize> {
    match counts.get(level) {
        Some(&n) if n > 0 => Ok(n),
        _ => Err(CemError::InternalInconsistency(format!(
            "treatment level '{}' has no observations in a matched stratum",
            level
        ))),
    }
}

/// Validate externally supplied weights: one per row, finite and non-negative.
pub fn validate_weights(weights: &[f64], height: usize) -> Result<()> {
    if weights.len() != height {
        return Err(CemError::InvalidWeights(format!(
            "expected {} weights (one per row), got {}",
            height,
            weights.len()
        )));
    }

    for &w in weights {
        if w.is_nan() {
            return Err(CemError::InvalidWeights(
                "weights contain NaN. All weights must be valid numbers".to_string(),
            ));
        }
        if w.is_infinite() {
            return Err(CemError::InvalidWeights(
                "weights contain an infinite value. All weights must be finite".to_string(),
            ));
        }
        if w < 0.0 {
            return Err(CemError::InvalidWeights(format!(
                "weights contain negative value: {}. All weights must be non-negative",
                w
            )));
        }
    }

    Ok(())
}

/// Calculate the total weight (sum of all weights).
#[inline]
pub fn total_weight(weights: &[f64]) -> f64 {
    weights.iter().sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weights_for(treatment: &[i32], predictor: &[i32]) -> Vec<f64> {
        let df = df! {
            "treatment" => treatment,
            "predictor" => predictor,
        }
        .unwrap();
        match_weights(&df, "treatment").unwrap().weights
    }

    fn assert_close(actual: &[f64], expected: &[f64]) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() < 1e-9, "expected {:?}, got {:?}", expected, actual);
        }
    }

    #[test]
    fn test_singleton_strata_get_zero_weight() {
        let weights = weights_for(&[0, 0, 1, 1], &[1, 2, 3, 4]);
        assert_close(&weights, &[0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_balanced_strata_get_unit_weight() {
        let weights = weights_for(&[0, 0, 1, 1], &[1, 2, 1, 2]);
        assert_close(&weights, &[1.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_uneven_strata_are_reweighted() {
        let weights = weights_for(&[0, 0, 1, 1, 1, 0], &[1, 1, 1, 2, 2, 2]);
        assert_close(&weights, &[0.5, 0.5, 1.0, 1.0, 1.0, 2.0]);
    }

    #[test]
    fn test_partially_covered_strata() {
        let weights = weights_for(&[0, 0, 1, 1], &[1, 2, 1, 1]);
        assert_close(&weights, &[1.0, 0.0, 1.0, 1.0]);
    }

    #[test]
    fn test_degenerate_match_reports_status() {
        let df = df! {
            "treatment" => [0i32, 0, 1, 1],
            "predictor" => [1i32, 2, 3, 4],
        }
        .unwrap();
        let result = match_weights(&df, "treatment").unwrap();
        assert_eq!(result.status, MatchStatus::NoFullyMatchedStrata);
        assert_eq!(result.matched_strata, 0);
        assert_eq!(result.total_strata, 4);
        assert!(matches!(
            result.require_matched(),
            Err(CemError::NoFullyMatchedStrata { levels: 2 })
        ));
    }

    #[test]
    fn test_three_levels_reference_is_maximum() {
        // One stratum holding all three levels, one missing level 2
        let df = df! {
            "treatment" => [0i32, 1, 2, 2, 0, 1],
            "predictor" => [1i32, 1, 1, 1, 2, 2],
        }
        .unwrap();
        let result = match_weights(&df, "treatment").unwrap();
        assert_eq!(result.matched_strata, 1);
        // M = {0: 1, 1: 1, 2: 2}; m = same; weight(c) = (M[c]/M[2]) * (m[2]/m[c]) = 1
        assert_close(&result.weights, &[1.0, 1.0, 1.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_string_treatment_needs_order() {
        let df = df! {
            "treatment" => ["control", "treated", "control", "treated"],
            "predictor" => [1i32, 1, 2, 2],
        }
        .unwrap();
        assert!(matches!(
            match_weights(&df, "treatment"),
            Err(CemError::UnorderedTreatment { .. })
        ));

        let order = vec!["control".to_string(), "treated".to_string()];
        let result = match_weights_with_order(&df, "treatment", Some(&order)).unwrap();
        assert_close(&result.weights, &[1.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_enum_treatment_follows_declared_order() {
        let categories = StringChunked::from_slice("categories".into(), &["treated", "control"]);
        let dtype = create_enum_dtype(categories.downcast_iter().next().unwrap().clone());
        let labels = ["control", "treated", "control", "treated", "control"];
        let predictor = [1i32, 1, 2, 2, 2];

        let df = df! {
            "treatment" => labels,
            "predictor" => predictor,
        }
        .unwrap();
        let mut enum_df = df.clone();
        let cast = df.column("treatment").unwrap().cast(&dtype).unwrap();
        enum_df.with_column(cast).unwrap();

        // "control" is declared last, so it is the reference level
        let result = match_weights(&enum_df, "treatment").unwrap();
        assert_close(&result.weights, &[1.0, 2.0 / 3.0, 1.0, 4.0 / 3.0, 1.0]);

        // Lexical order would make "treated" the reference instead
        let order = vec!["control".to_string(), "treated".to_string()];
        let result = match_weights_with_order(&df, "treatment", Some(&order)).unwrap();
        assert_close(&result.weights, &[1.5, 1.0, 0.75, 1.0, 0.75]);
    }

    #[test]
    fn test_null_treatment_gets_zero_weight() {
        let df = df! {
            "treatment" => [Some(0i32), Some(1), None, Some(0), Some(1)],
            "predictor" => [1i32, 1, 1, 2, 2],
        }
        .unwrap();
        let result = match_weights(&df, "treatment").unwrap();
        assert_close(&result.weights, &[1.0, 1.0, 0.0, 1.0, 1.0]);
    }

    #[test]
    fn test_to_series_named_weights() {
        let df = df! {
            "treatment" => [0i32, 1],
            "predictor" => [1i32, 1],
        }
        .unwrap();
        let series = match_weights(&df, "treatment").unwrap().to_series();
        assert_eq!(series.name().as_str(), "weights");
        assert_eq!(series.len(), 2);
    }

    #[test]
    fn test_validate_weights() {
        assert!(validate_weights(&[1.0, 0.0, 2.5], 3).is_ok());
        assert!(validate_weights(&[1.0], 3).is_err());

        let err = validate_weights(&[1.0, -0.5], 2).unwrap_err();
        assert!(err.to_string().contains("negative value"));

        let err = validate_weights(&[f64::NAN], 1).unwrap_err();
        assert!(err.to_string().contains("NaN"));

        let err = validate_weights(&[f64::INFINITY], 1).unwrap_err();
        assert!(err.to_string().contains("infinite"));
    }

    #[test]
    fn test_total_weight() {
        let weights = vec![1.0, 2.0, 0.5, 1.5];
        assert!((total_weight(&weights) - 5.0).abs() < 1e-10);
    }
}
