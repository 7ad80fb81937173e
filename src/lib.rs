//! cem: Coarsened Exact Matching
//!
//! A library for matching observational data by coarsening covariates into
//! strata, weighting observations within fully matched strata, and measuring
//! multidimensional L1/L2 imbalance between treatment groups.

pub mod cli;
pub mod pipeline;
pub mod report;
pub mod utils;

pub use pipeline::{
    coarsen, imbalance, match_weights, select_schema, BinMethod, BinSpec, Bins, Cem, CemConfig,
    CemError, CoarseningSchema, Imbalance, MatchResult, MatchStatus, Measure, Result,
};
