//! cem: Coarsened Exact Matching CLI Tool
//!
//! Loads a dataset, coarsens covariates, computes matching weights and
//! reports multidimensional imbalance before and after matching.

use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use console::style;

use cem::cli::Cli;
use cem::pipeline::{dataset_stats, load_dataset, save_dataset, Cem, MatchStatus};
use cem::report::{export_match_report, ExportParams, MatchSummary};
use cem::utils::{
    create_spinner, finish_with_success, finish_with_warning, print_banner, print_completion,
    print_config, print_info, print_step_header, print_success, SweepProgress,
};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let config = cli.config();
    let output_path = cli.output_path();
    let matching_schema = cli
        .coarsening_schema()
        .context("Invalid --coarsen specification")?;

    print_banner(env!("CARGO_PKG_VERSION"));
    print_config(&cli.input, &cli.treatment, &cli.outcome, &output_path, &config);

    // Step 1: Load dataset
    print_step_header(1, "Load Dataset");
    let step_start = Instant::now();
    let spinner = create_spinner("Reading dataset...");
    let df = load_dataset(&cli.input, cli.infer_schema_length)?;
    finish_with_success(&spinner, "Dataset loaded");

    let (rows, cols, memory_mb) = dataset_stats(&df);
    println!("\n    {} Dataset Statistics:", style("✧").cyan());
    println!("      Rows: {}", rows);
    println!("      Columns: {}", cols);
    println!("      Estimated memory: {:.2} MB", memory_mb);
    println!("      {}", style(format!("{:.2?}", step_start.elapsed())).dim());

    // Step 2: Imbalance scale (H) and pre-matching imbalance
    print_step_header(2, "Imbalance Baseline");
    let progress = if cli.no_progress || config.h.is_some() {
        SweepProgress::hidden()
    } else {
        SweepProgress::new()
    };
    let cem = Cem::with_observer(&df, &cli.treatment, &cli.outcome, config, &progress)
        .context("Failed to set up matching session")?;
    print_info(&format!(
        "H = {} ({} treatment levels), imbalance before matching: {:.4}",
        cem.h(),
        cem.levels(),
        cem.preimbalance().mean()
    ));

    // Step 3: Matching
    print_step_header(3, "Coarsened Exact Matching");
    let spinner = create_spinner("Matching strata...");
    let result = cem
        .match_weights(matching_schema.as_ref())
        .context("Matching failed")?;
    let postimbalance = match result.status {
        MatchStatus::Matched => {
            finish_with_success(
                &spinner,
                &format!(
                    "{} of {} strata matched ({} rows)",
                    result.matched_strata,
                    result.total_strata,
                    result.matched_count()
                ),
            );
            Some(cem.imbalance(matching_schema.as_ref())?)
        }
        MatchStatus::NoFullyMatchedStrata => {
            finish_with_warning(&spinner, "No stratum holds every treatment level");
            None
        }
    };

    // Step 4: Save output
    print_step_header(4, "Save Results");
    let spinner = create_spinner("Writing output file...");
    let mut out = df.clone();
    out.with_column(result.to_series())
        .context("Failed to append weights column")?;
    save_dataset(&mut out, &output_path)?;
    finish_with_success(&spinner, &format!("Saved to {}", output_path.display()));

    let summary = MatchSummary::new(&cem, &result, postimbalance.as_ref())?;

    if let Some(export_path) = &cli.export {
        let input_file = cli.input.display().to_string();
        let default_schema = cem.schema().clone();
        let params = ExportParams {
            input_file: &input_file,
            matching_schema: matching_schema.as_ref().unwrap_or(&default_schema),
            summary: &summary,
            postimbalance: postimbalance.as_ref(),
        };
        export_match_report(&cem, &params, export_path)?;
        print_success(&format!("Report written to {}", export_path.display()));
    }

    summary.display();
    print_completion();

    Ok(())
}
