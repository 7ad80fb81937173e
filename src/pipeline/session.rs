//! Matching session over one dataset
//!
//! A [`Cem`] holds its own copy of the data, the treatment and outcome column
//! names, and the H schema used for imbalance scoring (explicit or found by
//! the H sweep). Matching and imbalance calls default to that schema.

use log::warn;
use polars::prelude::*;
use serde::Serialize;

use super::coarsen::{coarsen, missing_continuous};
use super::error::{CemError, Result};
use super::imbalance::{imbalance_with_order, univariate_imbalance, Imbalance, MarginalImbalance, Measure};
use super::levels::{require_column, TreatmentColumn};
use super::schema::CoarseningSchema;
use super::selector::{equal_width_schema, select_schema_with_observer, SweepObserver, SweepOptions, SweepStep};
use super::weights::{match_weights_with_order, MatchResult};

/// Session configuration
#[derive(Debug, Clone, Serialize)]
pub struct CemConfig {
    /// Bin count for imbalance scoring; searched in `[lower_h, upper_h]` when `None`
    pub h: Option<usize>,
    pub measure: Measure,
    pub lower_h: usize,
    pub upper_h: usize,
    /// Ascending order of treatment labels for string treatments
    pub treatment_order: Option<Vec<String>>,
    /// Run the H sweep on the rayon pool
    pub parallel: bool,
}

impl Default for CemConfig {
    fn default() -> Self {
        Self {
            h: None,
            measure: Measure::L1,
            lower_h: 1,
            upper_h: 10,
            treatment_order: None,
            parallel: true,
        }
    }
}

impl CemConfig {
    fn sweep_options(&self) -> SweepOptions {
        SweepOptions {
            lower: self.lower_h,
            upper: self.upper_h,
            measure: self.measure,
            parallel: self.parallel,
        }
    }
}

/// Coarsened exact matching session
#[derive(Debug, Clone)]
pub struct Cem {
    data: DataFrame,
    treatment: String,
    outcome: String,
    config: CemConfig,
    h: usize,
    h_schema: CoarseningSchema,
    profile: Vec<SweepStep>,
    levels: usize,
    preimbalance: Imbalance,
}

impl Cem {
    pub fn new(data: &DataFrame, treatment: &str, outcome: &str, config: CemConfig) -> Result<Self> {
        Self::with_observer(data, treatment, outcome, config, &|_: &SweepStep| {})
    }

    /// Build a session, reporting H sweep progress to `observer`
    pub fn with_observer(
        data: &DataFrame,
        treatment: &str,
        outcome: &str,
        config: CemConfig,
        observer: &dyn SweepObserver,
    ) -> Result<Self> {
        require_column(data, treatment)?;
        require_column(data, outcome)?;
        let data = data.clone();
        let covariates = data.drop(outcome)?;

        let treatment_col =
            TreatmentColumn::from_frame(&covariates, treatment, config.treatment_order.as_deref())?;
        let levels = treatment_col.distinct().len();
        if levels < 2 {
            return Err(CemError::TooFewTreatmentLevels {
                column: treatment.to_string(),
                levels,
            });
        }

        let (h, h_schema, profile) = match config.h {
            Some(h) => {
                if h == 0 {
                    return Err(CemError::InvalidHRange { lower: h, upper: h });
                }
                let schema = equal_width_schema(&covariates, &[treatment], h)?;
                (h, schema, Vec::new())
            }
            None => {
                if levels > 2 {
                    return Err(CemError::AmbiguousTreatmentLevels {
                        column: treatment.to_string(),
                        levels,
                    });
                }
                let selection = select_schema_with_observer(
                    &data,
                    treatment,
                    outcome,
                    &config.sweep_options(),
                    observer,
                )?;
                (selection.h, selection.schema, selection.profile)
            }
        };

        let preimbalance = imbalance_with_order(
            &coarsen(&covariates, &h_schema)?,
            treatment,
            config.treatment_order.as_deref(),
            config.measure,
            None,
        )?;

        Ok(Self {
            data,
            treatment: treatment.to_string(),
            outcome: outcome.to_string(),
            config,
            h,
            h_schema,
            profile,
            levels,
            preimbalance,
        })
    }

    /// Match the data under `schema` (default: the H schema)
    pub fn match_weights(&self, schema: Option<&CoarseningSchema>) -> Result<MatchResult> {
        let schema = schema.unwrap_or(&self.h_schema);
        if schema.contains(&self.outcome) {
            return Err(CemError::InvalidBinSpec {
                column: self.outcome.clone(),
                reason: "outcome column is never coarsened".to_string(),
            });
        }

        let missing: Vec<String> = missing_continuous(&self.data, schema, &self.outcome)
            .into_iter()
            .filter(|name| name != &self.treatment)
            .collect();
        if !missing.is_empty() {
            warn!(
                "Continuous columns not coarsened: {}. Matching on raw values rarely finds full strata",
                missing.join(", ")
            );
        }

        let coarse = coarsen(&self.covariates()?, schema)?;
        match_weights_with_order(&coarse, &self.treatment, self.order())
    }

    /// Imbalance left after matching under `schema`, scored on the H schema.
    ///
    /// Fails with [`CemError::NoFullyMatchedStrata`] when nothing matched.
    pub fn imbalance(&self, schema: Option<&CoarseningSchema>) -> Result<Imbalance> {
        let matched = self.match_weights(schema)?.require_matched()?;
        let coarse = coarsen(&self.covariates()?, &self.h_schema)?;
        imbalance_with_order(
            &coarse,
            &self.treatment,
            self.order(),
            self.config.measure,
            Some(&matched.weights),
        )
    }

    /// Per-covariate imbalance left after matching under `schema`
    pub fn univariate_imbalance(&self, schema: Option<&CoarseningSchema>) -> Result<Vec<MarginalImbalance>> {
        let matched = self.match_weights(schema)?.require_matched()?;
        let covariates = self.covariates()?;
        let coarse = coarsen(&covariates, &self.h_schema)?;
        univariate_imbalance(
            &coarse,
            &covariates,
            &self.treatment,
            self.order(),
            self.config.measure,
            Some(&matched.weights),
        )
    }

    /// Full dataset (outcome included) coarsened under `schema`
    pub fn coarsened(&self, schema: Option<&CoarseningSchema>) -> Result<DataFrame> {
        coarsen(&self.data, schema.unwrap_or(&self.h_schema))
    }

    fn covariates(&self) -> Result<DataFrame> {
        Ok(self.data.drop(&self.outcome)?)
    }

    fn order(&self) -> Option<&[String]> {
        self.config.treatment_order.as_deref()
    }

    pub fn data(&self) -> &DataFrame {
        &self.data
    }

    pub fn treatment(&self) -> &str {
        &self.treatment
    }

    pub fn outcome(&self) -> &str {
        &self.outcome
    }

    pub fn config(&self) -> &CemConfig {
        &self.config
    }

    /// Bin count used for imbalance scoring
    pub fn h(&self) -> usize {
        self.h
    }

    /// Equal-width schema at [`Cem::h`]
    pub fn schema(&self) -> &CoarseningSchema {
        &self.h_schema
    }

    /// H sweep results; empty when H was given
    pub fn profile(&self) -> &[SweepStep] {
        &self.profile
    }

    /// Number of distinct treatment levels
    pub fn levels(&self) -> usize {
        self.levels
    }

    /// Unweighted imbalance before matching
    pub fn preimbalance(&self) -> &Imbalance {
        &self.preimbalance
    }
}
