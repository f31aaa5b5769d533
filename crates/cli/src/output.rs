//! Output formatting: annotated sheet, console summary, progress

use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use sitewatch_harness::{Outcome, Report, ReportSink, Verdict};

use crate::input::Sheet;

pub const RESULT_COLUMN: &str = "test result";
pub const TIME_COLUMN: &str = "total time";

/// Write the sheet back out with a result and a timing column per row.
pub fn write_results_csv(path: &Path, sheet: &Sheet, outcomes: &[Outcome]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;

    let mut header: Vec<&str> = sheet.headers.iter().map(String::as_str).collect();
    header.extend([RESULT_COLUMN, TIME_COLUMN]);
    writer.write_record(&header)?;

    let by_row: HashMap<usize, &Outcome> = outcomes.iter().map(|o| (o.row_index, o)).collect();
    for (index, record) in sheet.records.iter().enumerate() {
        let mut fields: Vec<String> = (0..sheet.headers.len())
            .map(|i| record.get(i).unwrap_or_default().to_string())
            .collect();
        match by_row.get(&index) {
            Some(outcome) => {
                fields.push(outcome.result_label());
                fields.push(format!("{:.2}", outcome.elapsed.as_secs_f64()));
            }
            None => fields.extend([String::new(), String::new()]),
        }
        writer.write_record(&fields)?;
    }
    writer.flush()?;

    info!("Results written to: {}", path.display());
    Ok(())
}

/// [`ReportSink`] that collects outcomes and advances a progress bar.
pub struct ProgressSink {
    bar: ProgressBar,
    outcomes: Vec<Outcome>,
}

impl ProgressSink {
    pub fn new(total: usize) -> Self {
        let bar = ProgressBar::new(total as u64);
        bar.set_style(
            ProgressStyle::with_template("{spinner} [{bar:40}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        Self {
            bar,
            outcomes: Vec::with_capacity(total),
        }
    }

    pub fn finish(self) -> Vec<Outcome> {
        self.bar.finish_and_clear();
        self.outcomes
    }
}

impl ReportSink for ProgressSink {
    fn record(&mut self, outcome: Outcome) {
        self.bar.set_message(format!("row {} {}", outcome.row_index + 1, outcome.test_type));
        self.bar.inc(1);
        self.outcomes.push(outcome);
    }
}

fn colored_verdict(verdict: Verdict) -> String {
    match verdict {
        Verdict::Passed => "✓ Passed".green().to_string(),
        Verdict::Failed => "✗ Failed".red().to_string(),
        Verdict::Errored => "! Error".yellow().to_string(),
    }
}

/// Print the per-row table and the totals line.
pub fn print_summary(report: &Report) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Row", "Test Type", "URL", "Result", "Time (s)", "Message"]);

    for outcome in &report.outcomes {
        table.add_row(vec![
            (outcome.row_index + 1).to_string(),
            outcome.test_type.clone(),
            outcome.url.clone(),
            colored_verdict(outcome.verdict),
            format!("{:.2}", outcome.elapsed.as_secs_f64()),
            outcome.message.clone(),
        ]);
    }
    println!("{table}");

    println!(
        "{} {} passed, {} failed, {} errored ({} ms)",
        "Test Results:".bold(),
        report.passed.to_string().green(),
        report.failed.to_string().red(),
        report.errored.to_string().yellow(),
        report.duration_ms
    );
}

/// Print success message
pub fn print_success(message: &str) {
    println!("✅ {}", message);
}

/// Print error message
pub fn print_error(message: &str) {
    eprintln!("❌ {}", message);
}
