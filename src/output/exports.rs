use anyhow::Result;
use std::io::Write;

use crate::config::OutputFormat;
use qestimate::report::QuantileReport;

/// Exports a quantile report in a machine-readable format.
///
/// - JSON: the full report, including invariants and statistics
/// - CSV: one `percentile,estimate` row per requested rank
pub fn export_report(
    report: &QuantileReport,
    format: OutputFormat,
    pretty: bool,
    output: &mut dyn Write,
) -> Result<()> {
    match format {
        OutputFormat::Summary => {
            let rendered = super::summary::render_summary(report);
            writeln!(output, "{}", console::strip_ansi_codes(&rendered))?;
            Ok(())
        }
        OutputFormat::Json => export_json(report, pretty, output),
        OutputFormat::Csv => export_csv(report, output),
    }
}

fn export_json(report: &QuantileReport, pretty: bool, output: &mut dyn Write) -> Result<()> {
    let json = if pretty {
        serde_json::to_string_pretty(report)?
    } else {
        serde_json::to_string(report)?
    };
    writeln!(output, "{json}")?;
    Ok(())
}

fn export_csv(report: &QuantileReport, output: &mut dyn Write) -> Result<()> {
    writeln!(output, "percentile,estimate")?;
    for (label, estimate) in &report.estimates {
        match estimate {
            Some(value) => writeln!(output, "{label},{value}")?,
            None => writeln!(output, "{label},")?,
        }
    }

    Ok(())
}
