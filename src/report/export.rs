//! JSON export of a matching run

use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;

use crate::pipeline::{Cem, CoarseningSchema, Imbalance, SweepStep};

use super::summary::MatchSummary;

/// Metadata about the matching run
#[derive(Serialize)]
pub struct MatchMetadata {
    /// Timestamp of the run (ISO 8601 format)
    pub timestamp: String,
    pub cem_version: String,
    pub input_file: String,
    pub treatment_column: String,
    pub outcome_column: String,
    pub measure: String,
    pub h: usize,
    /// Whether H came from the sweep rather than the caller
    pub h_selected: bool,
    pub lower_h: usize,
    pub upper_h: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub treatment_order: Option<Vec<String>>,
}

/// Complete match report
#[derive(Serialize)]
pub struct MatchReport<'a> {
    pub metadata: MatchMetadata,
    pub summary: &'a MatchSummary,
    /// Schema used for matching
    pub matching_schema: &'a CoarseningSchema,
    /// Equal-width schema at H used for imbalance scoring
    pub imbalance_schema: &'a CoarseningSchema,
    pub preimbalance: &'a Imbalance,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postimbalance: Option<&'a Imbalance>,
    /// H sweep, empty when H was supplied
    pub h_profile: &'a [SweepStep],
}

/// Parameters for the match report export
pub struct ExportParams<'a> {
    pub input_file: &'a str,
    pub matching_schema: &'a CoarseningSchema,
    pub summary: &'a MatchSummary,
    pub postimbalance: Option<&'a Imbalance>,
}

/// Build the report for a session
pub fn build_match_report<'a>(cem: &'a Cem, params: &ExportParams<'a>) -> MatchReport<'a> {
    let config = cem.config();
    MatchReport {
        metadata: MatchMetadata {
            timestamp: Utc::now().to_rfc3339(),
            cem_version: env!("CARGO_PKG_VERSION").to_string(),
            input_file: params.input_file.to_string(),
            treatment_column: cem.treatment().to_string(),
            outcome_column: cem.outcome().to_string(),
            measure: config.measure.to_string(),
            h: cem.h(),
            h_selected: config.h.is_none(),
            lower_h: config.lower_h,
            upper_h: config.upper_h,
            treatment_order: config.treatment_order.clone(),
        },
        summary: params.summary,
        matching_schema: params.matching_schema,
        imbalance_schema: cem.schema(),
        preimbalance: cem.preimbalance(),
        postimbalance: params.postimbalance,
        h_profile: cem.profile(),
    }
}

/// Export the match report to a JSON file
pub fn export_match_report(cem: &Cem, params: &ExportParams, output_path: &Path) -> Result<()> {
    let report = build_match_report(cem, params);

    let json = serde_json::to_string_pretty(&report)
        .context("Failed to serialize match report to JSON")?;

    std::fs::write(output_path, json)
        .with_context(|| format!("Failed to write match report to {}", output_path.display()))?;

    Ok(())
}
