//! Coarsening schema definitions
//!
//! A schema maps covariate names to a validated [`BinSpec`]. Validation happens
//! once, when a spec is built or parsed, so coarsening never sees a malformed spec.

use std::collections::BTreeMap;

use serde::Serialize;

use super::error::{CemError, Result};

/// Binning method for a single covariate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BinMethod {
    /// Equal-width intervals over the observed range (`cut`)
    EqualWidth,
    /// Empirical quantile groups of roughly equal count (`qcut`)
    EqualFrequency,
}

impl std::fmt::Display for BinMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BinMethod::EqualWidth => write!(f, "cut"),
            BinMethod::EqualFrequency => write!(f, "qcut"),
        }
    }
}

impl std::str::FromStr for BinMethod {
    type Err = CemError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "cut" | "equal-width" => Ok(BinMethod::EqualWidth),
            "qcut" | "equal-frequency" => Ok(BinMethod::EqualFrequency),
            _ => Err(CemError::UnsupportedMethod {
                method: s.to_string(),
            }),
        }
    }
}

/// Bin count or explicit boundaries
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Bins {
    /// Requested number of bins (clamped to the column's distinct-value count)
    Count(usize),
    /// Explicit edges for `cut`, quantile probabilities for `qcut`
    Edges(Vec<f64>),
}

/// Validated binning specification for one covariate
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BinSpec {
    method: BinMethod,
    bins: Bins,
}

impl BinSpec {
    /// Build and validate a spec. `column` is only used in error messages.
    pub fn new(column: &str, method: BinMethod, bins: Bins) -> Result<Self> {
        let invalid = |reason: String| CemError::InvalidBinSpec {
            column: column.to_string(),
            reason,
        };

        match &bins {
            Bins::Count(0) => return Err(invalid("bin count must be at least 1".to_string())),
            Bins::Count(_) => {}
            Bins::Edges(edges) => {
                if edges.len() < 2 {
                    return Err(invalid(format!(
                        "at least two edges are required, got {}",
                        edges.len()
                    )));
                }
                if edges.iter().any(|e| !e.is_finite()) {
                    return Err(invalid("edges must be finite numbers".to_string()));
                }
                if edges.windows(2).any(|w| w[0] >= w[1]) {
                    return Err(invalid("edges must be strictly increasing".to_string()));
                }
                if method == BinMethod::EqualFrequency
                    && edges.iter().any(|&q| !(0.0..=1.0).contains(&q))
                {
                    return Err(invalid(
                        "qcut edges are quantile probabilities and must lie in [0, 1]".to_string(),
                    ));
                }
            }
        }

        Ok(Self { method, bins })
    }

    /// Equal-width spec with `n` bins
    pub fn equal_width(n: usize) -> Result<Self> {
        Self::new("<unnamed>", BinMethod::EqualWidth, Bins::Count(n))
    }

    /// Equal-frequency spec with `n` bins
    pub fn equal_frequency(n: usize) -> Result<Self> {
        Self::new("<unnamed>", BinMethod::EqualFrequency, Bins::Count(n))
    }

    /// Equal-width spec with explicit edges
    pub fn with_edges(edges: Vec<f64>) -> Result<Self> {
        Self::new("<unnamed>", BinMethod::EqualWidth, Bins::Edges(edges))
    }

    /// Parse the textual form `method[:bins]` used on the command line.
    ///
    /// `bins` is either an integer count or comma-separated edges. Anything
    /// after a second `:` (label or boundary overrides) is rejected.
    pub fn parse(column: &str, text: &str) -> Result<Self> {
        let mut parts = text.split(':');
        let method: BinMethod = parts.next().unwrap_or_default().parse()?;

        let bins = match parts.next() {
            None => Bins::Count(5),
            Some(raw) => parse_bins(column, raw)?,
        };

        if let Some(extra) = parts.next() {
            return Err(CemError::InvalidBinSpec {
                column: column.to_string(),
                reason: format!(
                    "unexpected parameter '{}'; bin labels and boundaries are computed internally",
                    extra
                ),
            });
        }

        Self::new(column, method, bins)
    }

    pub fn method(&self) -> BinMethod {
        self.method
    }

    pub fn bins(&self) -> &Bins {
        &self.bins
    }
}

fn parse_bins(column: &str, raw: &str) -> Result<Bins> {
    let raw = raw.trim().trim_start_matches('[').trim_end_matches(']');
    if !raw.contains(',') {
        if let Ok(n) = raw.parse::<usize>() {
            return Ok(Bins::Count(n));
        }
    }

    raw.split(',')
        .map(|s| {
            s.trim().parse::<f64>().map_err(|_| CemError::InvalidBinSpec {
                column: column.to_string(),
                reason: format!("'{}' is not a bin count or numeric edge", s.trim()),
            })
        })
        .collect::<Result<Vec<f64>>>()
        .map(Bins::Edges)
}

/// Mapping from covariate name to its binning specification.
///
/// Columns absent from the schema pass through coarsening unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct CoarseningSchema {
    specs: BTreeMap<String, BinSpec>,
}

impl CoarseningSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) the spec for `column`
    pub fn with_column(mut self, column: impl Into<String>, spec: BinSpec) -> Self {
        self.specs.insert(column.into(), spec);
        self
    }

    pub fn insert(&mut self, column: impl Into<String>, spec: BinSpec) {
        self.specs.insert(column.into(), spec);
    }

    pub fn get(&self, column: &str) -> Option<&BinSpec> {
        self.specs.get(column)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.specs.contains_key(column)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.specs.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BinSpec)> {
        self.specs.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Parse `COLUMN=SPEC` assignments, e.g. `["age=cut:4", "income=qcut:5"]`
    pub fn from_assignments<S: AsRef<str>>(assignments: &[S]) -> Result<Self> {
        let mut schema = Self::new();
        for assignment in assignments {
            let assignment = assignment.as_ref();
            let (column, spec) =
                assignment
                    .split_once('=')
                    .ok_or_else(|| CemError::InvalidBinSpec {
                        column: assignment.to_string(),
                        reason: "expected COLUMN=METHOD[:BINS]".to_string(),
                    })?;
            let column = column.trim();
            schema.insert(column, BinSpec::parse(column, spec)?);
        }
        Ok(schema)
    }
}

impl FromIterator<(String, BinSpec)> for CoarseningSchema {
    fn from_iter<I: IntoIterator<Item = (String, BinSpec)>>(iter: I) -> Self {
        Self {
            specs: iter.into_iter().collect(),
        }
    }
}
