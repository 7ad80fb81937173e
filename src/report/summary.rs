//! Match summary report generation

use std::collections::BTreeMap;

use comfy_table::{presets::UTF8_FULL_CONDENSED, Attribute, Cell, Color, Table};
use console::style;
use serde::Serialize;

use crate::pipeline::{Cem, Imbalance, Level, MatchResult, MatchStatus, Measure, Result, TreatmentColumn};

/// Row counts for one treatment level
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LevelCounts {
    pub level: String,
    pub total: usize,
    pub matched: usize,
    /// Sum of match weights
    pub weighted: f64,
}

/// Summary of a matching run
#[derive(Debug, Clone, Serialize)]
pub struct MatchSummary {
    pub h: usize,
    pub measure: Measure,
    pub status: MatchStatus,
    pub total_strata: usize,
    pub matched_strata: usize,
    pub levels: Vec<LevelCounts>,
    pub pre_imbalance: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_imbalance: Option<f64>,
}

impl MatchSummary {
    /// Collect per-level counts for `result`. `post` is the imbalance after
    /// matching, when it could be computed.
    pub fn new(cem: &Cem, result: &MatchResult, post: Option<&Imbalance>) -> Result<Self> {
        let treatment = TreatmentColumn::from_frame(
            cem.data(),
            cem.treatment(),
            cem.config().treatment_order.as_deref(),
        )?;

        let mut counts: BTreeMap<&Level, (usize, usize, f64)> = BTreeMap::new();
        for (row, level) in treatment.values.iter().enumerate() {
            let Some(level) = level else {
                continue;
            };
            let entry = counts.entry(level).or_insert((0, 0, 0.0));
            entry.0 += 1;
            if result.weights[row] > 0.0 {
                entry.1 += 1;
                entry.2 += result.weights[row];
            }
        }

        let levels = counts
            .into_iter()
            .map(|(level, (total, matched, weighted))| LevelCounts {
                level: level.to_string(),
                total,
                matched,
                weighted,
            })
            .collect();

        Ok(Self {
            h: cem.h(),
            measure: cem.config().measure,
            status: result.status,
            total_strata: result.total_strata,
            matched_strata: result.matched_strata,
            levels,
            pre_imbalance: cem.preimbalance().mean(),
            post_imbalance: post.map(Imbalance::mean),
        })
    }

    /// Overview table (metric/value)
    pub fn overview_table(&self) -> Table {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL_CONDENSED);
        table.set_header(vec![
            Cell::new("Metric").add_attribute(Attribute::Bold),
            Cell::new("Value").add_attribute(Attribute::Bold),
        ]);

        table.add_row(vec![Cell::new("📏 H (bins)"), Cell::new(self.h)]);
        table.add_row(vec![
            Cell::new("🧩 Matched Strata"),
            Cell::new(format!("{} / {}", self.matched_strata, self.total_strata)).fg(
                if self.matched_strata == 0 {
                    Color::Red
                } else {
                    Color::Green
                },
            ),
        ]);
        table.add_row(vec![
            Cell::new(format!("⚖️  Imbalance before ({})", self.measure)),
            Cell::new(format!("{:.4}", self.pre_imbalance)),
        ]);

        let (post, color) = match self.post_imbalance {
            Some(post) if post < self.pre_imbalance => (format!("{:.4}", post), Color::Green),
            Some(post) => (format!("{:.4}", post), Color::Yellow),
            None => ("n/a".to_string(), Color::Red),
        };
        table.add_row(vec![
            Cell::new(format!("✅ Imbalance after ({})", self.measure)),
            Cell::new(post).fg(color).add_attribute(Attribute::Bold),
        ]);

        table
    }

    /// Per-level counts table
    pub fn levels_table(&self) -> Table {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL_CONDENSED);
        table.set_header(vec![
            Cell::new("Level").add_attribute(Attribute::Bold),
            Cell::new("Rows").add_attribute(Attribute::Bold),
            Cell::new("Matched").add_attribute(Attribute::Bold),
            Cell::new("Weight Sum").add_attribute(Attribute::Bold),
        ]);

        for level in &self.levels {
            table.add_row(vec![
                Cell::new(&level.level),
                Cell::new(level.total),
                Cell::new(level.matched).fg(if level.matched == 0 {
                    Color::Red
                } else {
                    Color::White
                }),
                Cell::new(format!("{:.2}", level.weighted)),
            ]);
        }

        table
    }

    pub fn display(&self) {
        println!();
        println!(
            "    {} {}",
            style("📋").cyan(),
            style("MATCH SUMMARY").white().bold()
        );
        println!("    {}", style("─".repeat(50)).dim());
        println!();

        // Indent the tables
        for line in self.overview_table().to_string().lines() {
            println!("    {}", line);
        }
        println!();
        for line in self.levels_table().to_string().lines() {
            println!("    {}", line);
        }

        if self.status == MatchStatus::NoFullyMatchedStrata {
            println!();
            println!(
                "    {} {}",
                style("⚠").yellow(),
                style("No stratum holds every treatment level; all weights are zero").yellow()
            );
        }
    }
}
