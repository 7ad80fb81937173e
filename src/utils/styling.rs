//! Terminal styling utilities

use console::{style, Emoji};
use std::path::Path;

use crate::pipeline::CemConfig;

// Emoji icons with fallbacks for terminals that don't support them
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "[*] ");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", ">> ");
pub static CHART: Emoji<'_, '_> = Emoji("📊 ", "");
pub static FOLDER: Emoji<'_, '_> = Emoji("📂 ", "");
pub static TARGET: Emoji<'_, '_> = Emoji("🎯 ", "");
pub static SAVE: Emoji<'_, '_> = Emoji("💾 ", "");
pub static RULER: Emoji<'_, '_> = Emoji("📏 ", "");

/// Print the application banner
pub fn print_banner(version: &str) {
    println!();
    println!(
        "    {} {}",
        style("cem").cyan().bold(),
        style("Coarsened exact matching").dim()
    );
    println!("    {}", style(format!("v{}", version)).dim());
    println!("    {}", style("━".repeat(50)).dim());
    println!();
}

/// Print configuration card
pub fn print_config(input: &Path, treatment: &str, outcome: &str, output: &Path, config: &CemConfig) {
    let box_width = 56;
    let line = "─".repeat(box_width - 2);

    let h = match config.h {
        Some(h) => h.to_string(),
        None => format!("auto [{}, {}]", config.lower_h, config.upper_h),
    };

    println!("    ┌{}┐", line);
    println!("    │ {}{}│", style("⚙️  Configuration").cyan().bold(), " ".repeat(box_width - 20));
    println!("    ├{}┤", line);
    println!("    │  {} Input:     {:<36}│", FOLDER, truncate_path(input, 35));
    println!("    │  {} Treatment: {:<36}│", TARGET, truncate_string(treatment, 35));
    println!("    │  {} Outcome:   {:<36}│", CHART, truncate_string(outcome, 35));
    println!("    │  {} Output:    {:<36}│", SAVE, truncate_path(output, 35));
    println!("    ├{}┤", line);
    println!("    │  {} H:         {:<36}│", RULER, style(h).yellow());
    println!(
        "    │  {} Measure:   {:<36}│",
        CHART,
        style(config.measure.to_string()).yellow()
    );
    println!("    └{}┘", line);
    println!();
}

/// Print a step header with styling
pub fn print_step_header(step_num: u8, title: &str) {
    println!();
    println!(
        "    {} {} {}",
        style(format!("STEP {}", step_num)).cyan().bold(),
        style("│").dim(),
        style(title).white().bold()
    );
    println!("    {}", style("─".repeat(50)).dim());
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("    {} {}", style("✓").green().bold(), style(message).green());
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("    {} {}", INFO, message);
}

/// Print the final completion message
pub fn print_completion() {
    println!();
    println!("    {} {}", ROCKET, style("Matching complete!").green().bold());
    println!();
}

fn truncate_path(path: &Path, max_len: usize) -> String {
    let path_str = path.display().to_string();
    truncate_string(&path_str, max_len)
}

fn truncate_string(s: &str, max_len: usize) -> String {
    let chars: Vec<char> = s.chars().collect();
    if chars.len() <= max_len {
        s.to_string()
    } else {
        let tail: String = chars[chars.len() - (max_len - 3)..].iter().collect();
        format!("...{}", tail)
    }
}
