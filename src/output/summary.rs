use std::fmt::Write;

use comfy_table::Cell;
use qestimate::report::{percentile_label, EstimationMode, QuantileReport};

use super::styling::{bright, cyan, dim};
use super::tables::{color_coded_error_cell, create_table, format_value, header_cells, value_cell};

/// Prints a human-readable summary of a quantile report to stdout.
///
/// Displays:
/// - Overview: source, estimation mode, observation count and basic statistics
/// - Estimates: one row per requested rank
/// - Invariants: the quantile targets and the error each one allows
pub fn print_summary(report: &QuantileReport) {
    println!("{}", render_summary(report));
}

fn add_section_header(output: &mut String, emoji: &str, title: &str) {
    let _ = writeln!(output, "{} {}", bright(emoji), bright(title).underlined());
}

fn describe_mode(mode: &EstimationMode) -> String {
    match mode {
        EstimationMode::Stream => "Whole stream".to_string(),
        EstimationMode::Window {
            max_age_seconds,
            age_buckets,
        } => format!("Sliding window of {max_age_seconds}s over {age_buckets} buckets"),
    }
}

fn render_overview(output: &mut String, report: &QuantileReport) {
    add_section_header(output, "📊", "Overview");

    let stats = &report.stats;
    let mut table = create_table();
    table.add_row(vec![Cell::new("Source"), Cell::new(&report.source)]);
    table.add_row(vec![Cell::new("Mode"), Cell::new(describe_mode(&report.mode))]);
    table.add_row(vec![Cell::new("Observations"), Cell::new(stats.count)]);
    table.add_row(vec![Cell::new("Min"), value_cell(stats.min)]);
    table.add_row(vec![Cell::new("Mean"), value_cell(stats.mean())]);
    table.add_row(vec![Cell::new("Max"), value_cell(stats.max)]);
    table.add_row(vec![Cell::new("Sum"), Cell::new(format_value(stats.sum))]);

    let _ = writeln!(output, "{table}\n");
}

fn render_estimates(output: &mut String, report: &QuantileReport) {
    add_section_header(output, "🎯", "Estimates");

    if report.estimates.is_empty() {
        let _ = writeln!(output, "  {}\n", dim("No ranks requested"));
        return;
    }

    let mut table = create_table();
    table.set_header(header_cells(&["Percentile", "Estimate"]));
    for (label, estimate) in &report.estimates {
        table.add_row(vec![Cell::new(label), value_cell(*estimate)]);
    }

    let _ = writeln!(output, "{table}\n");
}

fn render_invariants(output: &mut String, report: &QuantileReport) {
    add_section_header(output, "📐", "Invariants");

    let mut table = create_table();
    table.set_header(header_cells(&["Quantile", "Allowed Error"]));
    for invariant in &report.invariants {
        table.add_row(vec![
            Cell::new(percentile_label(invariant.quantile())),
            color_coded_error_cell(invariant.error()),
        ]);
    }

    let _ = writeln!(output, "{table}\n");
}

pub fn render_summary(report: &QuantileReport) -> String {
    let mut output = String::new();

    render_overview(&mut output, report);
    render_estimates(&mut output, report);
    render_invariants(&mut output, report);

    let _ = write!(
        output,
        "{}",
        cyan(format!(
            "Generated {}",
            report.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
        ))
    );

    output
}
