//! Command-line argument definitions using clap

use std::path::{Path, PathBuf};

use clap::Parser;

use crate::pipeline::{CemConfig, CoarseningSchema, Measure, Result};

/// cem - Coarsened exact matching for observational data
#[derive(Parser, Debug)]
#[command(name = "cem")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Input file path (CSV or Parquet)
    #[arg(short, long)]
    pub input: PathBuf,

    /// Treatment column name
    #[arg(short, long)]
    pub treatment: String,

    /// Outcome column name (never coarsened or matched on)
    #[arg(short = 'y', long)]
    pub outcome: String,

    /// Imbalance measure: "l1" or "l2"
    #[arg(long, default_value = "l1", value_parser = parse_measure)]
    pub measure: Measure,

    /// Bin count H used for imbalance scoring.
    /// When omitted, H is searched in [--lower-h, --upper-h] (two-level treatments only).
    #[arg(long = "h")]
    pub h: Option<usize>,

    /// Lower bound of the H search (inclusive)
    #[arg(long, default_value = "1")]
    pub lower_h: usize,

    /// Upper bound of the H search (inclusive)
    #[arg(long, default_value = "10")]
    pub upper_h: usize,

    /// Coarsening for one covariate as COLUMN=METHOD[:BINS], repeatable.
    /// METHOD is "cut" (equal-width) or "qcut" (equal-frequency);
    /// BINS is a bin count or comma-separated edges (e.g. age=cut:0,18,65,120).
    /// Without any --coarsen, matching uses the equal-width schema at H.
    #[arg(short, long = "coarsen", value_name = "COLUMN=SPEC")]
    pub coarsen: Vec<String>,

    /// Ascending order of treatment labels (comma-separated), needed for text treatments.
    /// The last label is the reference level.
    #[arg(long, value_delimiter = ',')]
    pub treatment_order: Option<Vec<String>>,

    /// Output file path (CSV or Parquet, determined by extension).
    /// Defaults to input directory with '_matched' suffix (e.g., data.csv -> data_matched.csv).
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Write a JSON report (schemas, H profile, imbalance) to this path
    #[arg(long)]
    pub export: Option<PathBuf>,

    /// Evaluate the H search on a single thread
    #[arg(long, default_value = "false")]
    pub sequential: bool,

    /// Hide the H search progress bar
    #[arg(long, default_value = "false")]
    pub no_progress: bool,

    /// Enable debug logging
    #[arg(short, long, default_value = "false")]
    pub verbose: bool,

    /// Number of rows to use for schema inference (CSV only).
    /// Use 0 for full table scan (very slow for large files).
    #[arg(long, default_value = "10000")]
    pub infer_schema_length: usize,
}

impl Cli {
    /// Get the output path, deriving from input if not explicitly provided.
    pub fn output_path(&self) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| derived_path(&self.input, "matched"))
    }

    /// Session configuration from the flags
    pub fn config(&self) -> CemConfig {
        CemConfig {
            h: self.h,
            measure: self.measure,
            lower_h: self.lower_h,
            upper_h: self.upper_h,
            treatment_order: self.treatment_order.clone(),
            parallel: !self.sequential,
        }
    }

    /// Matching schema from repeated --coarsen flags; `None` when none were given
    pub fn coarsening_schema(&self) -> Result<Option<CoarseningSchema>> {
        if self.coarsen.is_empty() {
            return Ok(None);
        }
        CoarseningSchema::from_assignments(&self.coarsen).map(Some)
    }
}

fn derived_path(input: &Path, suffix: &str) -> PathBuf {
    let parent = input.parent().unwrap_or_else(|| Path::new("."));
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");
    let extension = input
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("parquet");
    parent.join(format!("{}_{}.{}", stem, suffix, extension))
}

/// Validator for the measure parameter
fn parse_measure(s: &str) -> std::result::Result<Measure, String> {
    s.parse::<Measure>().map_err(|e| e.to_string())
}
