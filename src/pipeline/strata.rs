//! Stratification of coarsened observations
//!
//! A stratum is the set of rows sharing identical values across every grouping
//! column. Strata are built in a single pass with a hashmap keyed on the tuple
//! of row values; ids follow first appearance so results are deterministic.

use std::collections::HashMap;

use polars::prelude::*;

use super::error::Result;
use super::levels::{column_levels, Level};

/// Row-to-stratum assignment for a table
#[derive(Debug, Clone)]
pub struct Strata {
    /// Stratum id per row; `None` when a grouping value is null
    assignments: Vec<Option<usize>>,
    /// Distinct grouping tuples, indexed by stratum id
    keys: Vec<Vec<Level>>,
}

impl Strata {
    /// Group the rows of `df` by all columns except `exclude`.
    ///
    /// With no grouping columns every row falls into a single stratum.
    pub fn build(df: &DataFrame, exclude: &[&str]) -> Result<Self> {
        let columns: Vec<Vec<Option<Level>>> = df
            .get_columns()
            .iter()
            .filter(|col| !exclude.contains(&col.name().as_str()))
            .map(column_levels)
            .collect::<Result<_>>()?;

        let mut index: HashMap<Vec<Level>, usize> = HashMap::new();
        let mut keys: Vec<Vec<Level>> = Vec::new();
        let mut assignments = Vec::with_capacity(df.height());

        for row in 0..df.height() {
            let key: Option<Vec<Level>> = columns.iter().map(|values| values[row].clone()).collect();

            let id = key.map(|key| {
                *index.entry(key).or_insert_with_key(|key| {
                    keys.push(key.clone());
                    keys.len() - 1
                })
            });
            assignments.push(id);
        }

        Ok(Self { assignments, keys })
    }

    /// Number of distinct strata
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Stratum id of each row
    pub fn assignments(&self) -> &[Option<usize>] {
        &self.assignments
    }

    /// Grouping tuple of stratum `id`
    pub fn key(&self, id: usize) -> &[Level] {
        &self.keys[id]
    }

    /// Row indices per stratum, indexed by stratum id
    pub fn members(&self) -> Vec<Vec<usize>> {
        let mut members = vec![Vec::new(); self.keys.len()];
        for (row, id) in self.assignments.iter().enumerate() {
            if let Some(id) = id {
                members[*id].push(row);
            }
        }
        members
    }
}
