//! Automatic selection of the bin count H
//!
//! Every integer H in an inclusive range is tried: numeric covariates are cut
//! into `min(distinct, H)` equal-width bins and the unweighted imbalance of
//! the coarsened table is recorded. The chosen H is the first entry, in
//! descending-imbalance order, whose imbalance does not exceed the median.

use log::{debug, info};
use polars::prelude::*;
use rayon::prelude::*;
use serde::Serialize;

use super::coarsen::{coarsen, numeric_values};
use super::error::{CemError, Result};
use super::imbalance::{imbalance, Imbalance, Measure};
use super::levels::require_column;
use super::schema::{BinSpec, CoarseningSchema};

/// Imbalance recorded for one H
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SweepStep {
    pub h: usize,
    pub imbalance: f64,
}

/// Receives sweep progress. Calls may arrive from several threads and in
/// any H order.
pub trait SweepObserver: Sync {
    fn on_start(&self, _total: usize) {}
    fn on_step(&self, step: &SweepStep);
    fn on_finish(&self, _selected: usize) {}
}

impl<F> SweepObserver for F
where
    F: Fn(&SweepStep) + Sync,
{
    fn on_step(&self, step: &SweepStep) {
        self(step)
    }
}

/// Range and measure for an H sweep
#[derive(Debug, Clone, Copy)]
pub struct SweepOptions {
    pub lower: usize,
    pub upper: usize,
    pub measure: Measure,
    /// Evaluate H values on the rayon pool
    pub parallel: bool,
}

impl Default for SweepOptions {
    fn default() -> Self {
        Self {
            lower: 1,
            upper: 10,
            measure: Measure::L1,
            parallel: true,
        }
    }
}

impl SweepOptions {
    pub fn validate(&self) -> Result<()> {
        if self.lower == 0 || self.lower > self.upper {
            return Err(CemError::InvalidHRange {
                lower: self.lower,
                upper: self.upper,
            });
        }
        Ok(())
    }
}

/// Winning H with its schema and the full sweep profile
#[derive(Debug, Clone, Serialize)]
pub struct SchemaSelection {
    pub h: usize,
    pub schema: CoarseningSchema,
    /// Unweighted imbalance at the selected H
    pub imbalance: Imbalance,
    /// One entry per H, ascending
    pub profile: Vec<SweepStep>,
}

/// Equal-width schema binning every numeric covariate to `min(distinct, h)` bins.
///
/// Booleans, strings and categoricals are left out. All-null columns are skipped.
pub fn equal_width_schema(df: &DataFrame, exclude: &[&str], h: usize) -> Result<CoarseningSchema> {
    let mut schema = CoarseningSchema::new();

    for col in df.get_columns() {
        let name = col.name().as_str();
        if exclude.contains(&name) || !col.dtype().is_primitive_numeric() {
            continue;
        }

        let mut values: Vec<f64> = numeric_values(col)?.into_iter().flatten().collect();
        values.sort_by(|a, b| a.total_cmp(b));
        values.dedup();
        if values.is_empty() {
            continue;
        }

        schema.insert(name, BinSpec::equal_width(values.len().min(h))?);
    }

    Ok(schema)
}

/// Sweep H over `[lower, upper]` and pick a default schema.
pub fn select_schema(
    df: &DataFrame,
    treatment: &str,
    outcome: &str,
    options: &SweepOptions,
) -> Result<SchemaSelection> {
    select_schema_with_observer(df, treatment, outcome, options, &|_: &SweepStep| {})
}

/// [`select_schema`] reporting each evaluated H to `observer`
pub fn select_schema_with_observer(
    df: &DataFrame,
    treatment: &str,
    outcome: &str,
    options: &SweepOptions,
    observer: &dyn SweepObserver,
) -> Result<SchemaSelection> {
    options.validate()?;
    require_column(df, treatment)?;
    require_column(df, outcome)?;
    let covariates = df.drop(outcome)?;

    info!(
        "Searching H in [{}, {}] using {} imbalance",
        options.lower, options.upper, options.measure
    );
    observer.on_start(options.upper - options.lower + 1);

    let evaluate = |h: usize| -> Result<SweepStep> {
        let schema = equal_width_schema(&covariates, &[treatment], h)?;
        let coarse = coarsen(&covariates, &schema)?;
        let score = imbalance(&coarse, treatment, options.measure, None)?;
        let step = SweepStep {
            h,
            imbalance: score.mean(),
        };
        debug!("H = {}: imbalance {:.6}", step.h, step.imbalance);
        observer.on_step(&step);
        Ok(step)
    };

    let mut profile: Vec<SweepStep> = if options.parallel {
        (options.lower..=options.upper)
            .into_par_iter()
            .map(evaluate)
            .collect::<Result<_>>()?
    } else {
        (options.lower..=options.upper)
            .map(evaluate)
            .collect::<Result<_>>()?
    };
    profile.sort_by_key(|step| step.h);

    let h = select_h(&profile).ok_or_else(|| {
        CemError::InternalInconsistency("H sweep produced no imbalance values".to_string())
    })?;

    let schema = equal_width_schema(&covariates, &[treatment], h)?;
    let coarse = coarsen(&covariates, &schema)?;
    let score = imbalance(&coarse, treatment, options.measure, None)?;

    info!("Selected H = {} (imbalance {:.4})", h, score.mean());
    observer.on_finish(h);

    Ok(SchemaSelection {
        h,
        schema,
        imbalance: score,
        profile,
    })
}

/// Median rule over a sweep profile.
///
/// Entries are ordered by imbalance descending (larger H first on ties) and
/// the first one at or below the median imbalance wins.
pub fn select_h(profile: &[SweepStep]) -> Option<usize> {
    let median = median(profile.iter().map(|step| step.imbalance).collect())?;

    let mut ordered: Vec<&SweepStep> = profile.iter().collect();
    ordered.sort_by(|a, b| {
        b.imbalance
            .total_cmp(&a.imbalance)
            .then_with(|| b.h.cmp(&a.h))
    });

    ordered
        .into_iter()
        .find(|step| step.imbalance <= median)
        .map(|step| step.h)
}

/// Median with linear interpolation between the two middle values
fn median(mut values: Vec<f64>) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        Some(values[mid])
    } else {
        Some((values[mid - 1] + values[mid]) / 2.0)
    }
}

/// Coarsen `df` with the automatically selected schema. The outcome passes through.
pub fn auto_coarsen(
    df: &DataFrame,
    treatment: &str,
    outcome: &str,
    options: &SweepOptions,
) -> Result<DataFrame> {
    let selection = select_schema(df, treatment, outcome, options)?;
    coarsen(df, &selection.schema)
}
