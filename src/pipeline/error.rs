//! Error types for coarsening, matching and imbalance scoring.
//!
//! Every fallible operation in the pipeline returns [`CemError`]. Variants
//! carry enough context (column names, offending values) to be reported
//! to the caller without further lookups.

use polars::prelude::PolarsError;
use thiserror::Error;

/// Result alias used throughout the pipeline.
pub type Result<T> = std::result::Result<T, CemError>;

/// Errors raised by the matching engine.
#[derive(Debug, Error)]
pub enum CemError {
    /// The coarsening method is neither equal-width (`cut`) nor equal-frequency (`qcut`).
    #[error("'{method}' not supported. Coarsening only possible with \"cut\" and \"qcut\"")]
    UnsupportedMethod { method: String },

    /// A bin specification is malformed or tries to override labels/boundaries.
    #[error("Invalid bin specification for '{column}': {reason}")]
    InvalidBinSpec { column: String, reason: String },

    /// No stratum contains every treatment level present in the data.
    ///
    /// Matching reports this as a status rather than an error; see
    /// [`MatchResult::require_matched`](super::MatchResult::require_matched).
    #[error(
        "No strata had all {levels} levels of the treatment variable. All weights are zero. \
         This usually happens when a continuous variable (including the treatment) is not coarsened"
    )]
    NoFullyMatchedStrata { levels: usize },

    /// The treatment column has no total order and a stratum holds several levels.
    #[error(
        "Treatment column '{column}' has no total order; declare a level order or use a numeric, boolean or enum column"
    )]
    UnorderedTreatment { column: String },

    /// A treatment level carries zero (weighted) mass in an imbalance histogram.
    #[error("Treatment level '{level}' has zero total weight; imbalance is undefined")]
    EmptyTreatmentLevel { level: String },

    /// The imbalance measure is not one of `l1`/`l2`.
    #[error("'{measure}' not a valid measure. Choose from [\"l1\", \"l2\"]")]
    UnknownMeasure { measure: String },

    /// Automatic H search was requested for a treatment with more than two levels.
    #[error(
        "Treatment column '{column}' has {levels} levels; automatic H selection needs exactly two. Supply H explicitly"
    )]
    AmbiguousTreatmentLevels { column: String, levels: usize },

    /// Local and global counts disagree inside a matched stratum.
    #[error("Internal inconsistency while weighting stratum: {0}")]
    InternalInconsistency(String),

    #[error("Column '{0}' not found in DataFrame")]
    ColumnNotFound(String),

    #[error("Column '{column}' must be numeric to be coarsened (found {dtype})")]
    NonNumericColumn { column: String, dtype: String },

    #[error("Value {value} in column '{column}' lies outside the supplied bin edges [{lower}, {upper}]")]
    ValueOutsideEdges {
        column: String,
        value: f64,
        lower: f64,
        upper: f64,
    },

    #[error("Treatment column '{column}' needs at least two levels, found {levels}")]
    TooFewTreatmentLevels { column: String, levels: usize },

    #[error("Invalid weights: {0}")]
    InvalidWeights(String),

    #[error("Invalid H range: lower={lower}, upper={upper} (need 1 <= lower <= upper)")]
    InvalidHRange { lower: usize, upper: usize },

    #[error("Invalid treatment order for '{column}': {reason}")]
    InvalidTreatmentOrder { column: String, reason: String },

    #[error(transparent)]
    Polars(#[from] PolarsError),
}
