//! Column values as hashable, ordered levels
//!
//! Matching and imbalance scoring group rows by exact values. Polars columns
//! are converted once into [`Level`] vectors so grouping works the same way for
//! numeric, boolean, string and categorical data.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use polars::prelude::*;

use super::error::{CemError, Result};

/// A single (non-null) value of a grouping or treatment column
#[derive(Debug, Clone)]
pub enum Level {
    Bool(bool),
    Int(i64),
    /// Never NaN; `-0.0` is normalised to `0.0`
    Float(f64),
    Text(String),
    /// Category with a declared position
    Category { rank: u32, label: String },
}

impl Level {
    fn variant_index(&self) -> u8 {
        match self {
            Level::Bool(_) => 0,
            Level::Int(_) => 1,
            Level::Float(_) => 2,
            Level::Text(_) => 3,
            Level::Category { .. } => 4,
        }
    }
}

impl PartialEq for Level {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Level {}

impl PartialOrd for Level {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Level {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Level::Bool(a), Level::Bool(b)) => a.cmp(b),
            (Level::Int(a), Level::Int(b)) => a.cmp(b),
            (Level::Float(a), Level::Float(b)) => a.total_cmp(b),
            (Level::Text(a), Level::Text(b)) => a.cmp(b),
            (Level::Category { rank: a, .. }, Level::Category { rank: b, .. }) => a.cmp(b),
            _ => self.variant_index().cmp(&other.variant_index()),
        }
    }
}

impl Hash for Level {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.variant_index().hash(state);
        match self {
            Level::Bool(b) => b.hash(state),
            Level::Int(i) => i.hash(state),
            Level::Float(f) => f.to_bits().hash(state),
            Level::Text(s) => s.hash(state),
            Level::Category { rank, .. } => rank.hash(state),
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Level::Bool(b) => write!(f, "{}", b),
            Level::Int(i) => write!(f, "{}", i),
            Level::Float(v) => write!(f, "{}", v),
            Level::Text(s) => write!(f, "{}", s),
            Level::Category { label, .. } => write!(f, "{}", label),
        }
    }
}

/// Convert a column into per-row levels. Nulls and NaNs become `None`.
pub fn column_levels(col: &Column) -> Result<Vec<Option<Level>>> {
    let levels = match col.dtype() {
        DataType::Boolean => col
            .bool()?
            .into_iter()
            .map(|v| v.map(Level::Bool))
            .collect(),
        DataType::Float32 | DataType::Float64 => col
            .cast(&DataType::Float64)?
            .f64()?
            .into_iter()
            .map(|v| match v {
                Some(x) if x.is_nan() => None,
                // -0.0 and 0.0 must share a stratum
                Some(x) if x == 0.0 => Some(Level::Float(0.0)),
                Some(x) => Some(Level::Float(x)),
                None => None,
            })
            .collect(),
        dtype if dtype.is_primitive_numeric() => col
            .cast(&DataType::Int64)?
            .i64()?
            .into_iter()
            .map(|v| v.map(Level::Int))
            .collect(),
        DataType::Enum(_, _) => enum_levels(col)?,
        DataType::String => string_values(col)?
            .into_iter()
            .map(|v| v.map(Level::Text))
            .collect(),
        _ => string_values(&col.cast(&DataType::String)?)?
            .into_iter()
            .map(|v| v.map(Level::Text))
            .collect(),
    };
    Ok(levels)
}

/// Enum columns keep their declared category order through the physical codes
fn enum_levels(col: &Column) -> Result<Vec<Option<Level>>> {
    let series = col.as_materialized_series();
    let codes = series.to_physical_repr().cast(&DataType::Int64)?;
    let labels = string_values(&col.cast(&DataType::String)?)?;

    let levels = codes
        .i64()?
        .into_iter()
        .zip(labels)
        .map(|(code, label)| match (code, label) {
            (Some(rank), Some(label)) => Some(Level::Category {
                rank: rank as u32,
                label,
            }),
            _ => None,
        })
        .collect();
    Ok(levels)
}

fn string_values(col: &Column) -> Result<Vec<Option<String>>> {
    Ok(col
        .str()?
        .into_iter()
        .map(|v| v.map(|s| s.to_string()))
        .collect())
}

/// Look up a column by name, mapping polars' error to [`CemError::ColumnNotFound`]
pub fn require_column<'a>(df: &'a DataFrame, name: &str) -> Result<&'a Column> {
    df.column(name)
        .map_err(|_| CemError::ColumnNotFound(name.to_string()))
}

/// Treatment values together with whether they admit a total order
#[derive(Debug, Clone)]
pub struct TreatmentColumn {
    pub name: String,
    pub values: Vec<Option<Level>>,
    pub ordered: bool,
}

impl TreatmentColumn {
    /// Extract the treatment column. Plain strings and unordered categoricals are
    /// unordered unless `order` declares the position of every label.
    pub fn from_frame(df: &DataFrame, name: &str, order: Option<&[String]>) -> Result<Self> {
        let col = require_column(df, name)?;
        let values = column_levels(col)?;

        match order {
            Some(order) => Self::with_declared_order(name, values, order),
            None => {
                let ordered = values
                    .iter()
                    .flatten()
                    .all(|level| !matches!(level, Level::Text(_)));
                Ok(Self {
                    name: name.to_string(),
                    values,
                    ordered,
                })
            }
        }
    }

    fn with_declared_order(name: &str, values: Vec<Option<Level>>, order: &[String]) -> Result<Self> {
        let mut ranks: HashMap<&str, u32> = HashMap::with_capacity(order.len());
        for (i, label) in order.iter().enumerate() {
            if ranks.insert(label.as_str(), i as u32).is_some() {
                return Err(CemError::InvalidTreatmentOrder {
                    column: name.to_string(),
                    reason: format!("label '{}' declared twice", label),
                });
            }
        }

        let values = values
            .into_iter()
            .map(|v| {
                v.map(|level| {
                    let label = level.to_string();
                    ranks
                        .get(label.as_str())
                        .map(|&rank| Level::Category {
                            rank,
                            label: label.clone(),
                        })
                        .ok_or_else(|| CemError::InvalidTreatmentOrder {
                            column: name.to_string(),
                            reason: format!("level '{}' missing from the declared order", label),
                        })
                })
                .transpose()
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            name: name.to_string(),
            values,
            ordered: true,
        })
    }

    /// Distinct non-null levels in ascending order
    pub fn distinct(&self) -> Vec<Level> {
        let mut levels: Vec<Level> = self.values.iter().flatten().cloned().collect();
        levels.sort();
        levels.dedup();
        levels
    }

    /// Reference ("policy") level among `present`, which must be sorted ascending.
    ///
    /// The maximum level under the column order. A single present level is its
    /// own reference even when the column is unordered.
    pub fn reference<'a>(&self, present: &[&'a Level]) -> Result<&'a Level> {
        if present.len() > 1 && !self.ordered {
            return Err(CemError::UnorderedTreatment {
                column: self.name.clone(),
            });
        }
        present.last().copied().ok_or_else(|| {
            CemError::InternalInconsistency(format!(
                "stratum without treatment levels in '{}'",
                self.name
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_levels_drop_nan_and_normalise_zero() {
        let col = Column::new("x".into(), &[Some(-0.0f64), Some(0.0), Some(f64::NAN), None, Some(1.5)]);
        let levels = column_levels(&col).unwrap();
        assert_eq!(levels[0], Some(Level::Float(0.0)));
        assert_eq!(levels[0], levels[1]);
        assert!(levels[2].is_none());
        assert!(levels[3].is_none());
        assert_eq!(levels[4], Some(Level::Float(1.5)));
    }

    #[test]
    fn test_integer_and_bool_levels() {
        let col = Column::new("x".into(), &[3i32, 1, 2]);
        let levels = column_levels(&col).unwrap();
        assert_eq!(levels, vec![Some(Level::Int(3)), Some(Level::Int(1)), Some(Level::Int(2))]);

        let col = Column::new("b".into(), &[true, false]);
        let levels = column_levels(&col).unwrap();
        assert!(levels[1] < levels[0]);
    }

    #[test]
    fn test_string_treatment_is_unordered() {
        let df = df! {
            "t" => ["a", "b", "a"],
        }
        .unwrap();
        let treatment = TreatmentColumn::from_frame(&df, "t", None).unwrap();
        assert!(!treatment.ordered);

        let levels = treatment.distinct();
        let present: Vec<&Level> = levels.iter().collect();
        assert!(matches!(
            treatment.reference(&present),
            Err(CemError::UnorderedTreatment { .. })
        ));
        // A single level is always its own reference
        assert_eq!(treatment.reference(&present[..1]).unwrap(), &levels[0]);
    }

    #[test]
    fn test_declared_order_ranks_labels() {
        let df = df! {
            "t" => ["high", "low", "mid"],
        }
        .unwrap();
        let order = vec!["low".to_string(), "mid".to_string(), "high".to_string()];
        let treatment = TreatmentColumn::from_frame(&df, "t", Some(&order)).unwrap();
        assert!(treatment.ordered);

        let levels = treatment.distinct();
        let labels: Vec<String> = levels.iter().map(|l| l.to_string()).collect();
        assert_eq!(labels, vec!["low", "mid", "high"]);

        let present: Vec<&Level> = levels.iter().collect();
        assert_eq!(treatment.reference(&present).unwrap().to_string(), "high");
    }

    #[test]
    fn test_declared_order_must_cover_levels() {
        let df = df! {
            "t" => ["a", "b", "c"],
        }
        .unwrap();
        let order = vec!["a".to_string(), "b".to_string()];
        let result = TreatmentColumn::from_frame(&df, "t", Some(&order));
        assert!(matches!(result, Err(CemError::InvalidTreatmentOrder { .. })));
    }

    #[test]
    fn test_missing_column() {
        let df = df! { "t" => [0i32, 1] }.unwrap();
        assert!(matches!(
            TreatmentColumn::from_frame(&df, "nope", None),
            Err(CemError::ColumnNotFound(_))
        ));
    }
}
