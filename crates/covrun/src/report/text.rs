//! Plain-text summary table and totals block.

use super::{ReportContext, ReportRenderer};
use crate::coverage::CoverageSummary;
use crate::result::CoverResult;
use std::fmt::Write;

const HEADERS: [&str; 4] = ["% Stmts", "% Branch", "% Funcs", "% Lines"];
const ALL_FILES: &str = "All files";
const SUMMARY_TITLE: &str = " Coverage summary ";
const SUMMARY_WIDTH: usize = 80;

/// Renders `coverage.txt`
#[derive(Debug, Clone, Copy, Default)]
pub struct TextRenderer;

impl ReportRenderer for TextRenderer {
    fn render(&self, ctx: &ReportContext<'_>) -> CoverResult<String> {
        let rows: Vec<(String, &CoverageSummary)> = ctx
            .summaries
            .iter()
            .map(|(path, summary)| (format!(" {}", ctx.display_path(path)), summary))
            .collect();

        let name_width = rows
            .iter()
            .map(|(name, _)| name.len())
            .chain([ALL_FILES.len(), "File".len()])
            .max()
            .unwrap_or(ALL_FILES.len());

        let mut output = String::new();
        let rule = separator(name_width);
        output.push_str(&rule);
        let _ = write!(output, "{:<name_width$} |", "File");
        for header in HEADERS {
            let _ = write!(output, " {header:>8} |");
        }
        output.push('\n');
        output.push_str(&rule);

        row(&mut output, ALL_FILES, &ctx.total, name_width);
        for (name, summary) in &rows {
            row(&mut output, name, summary, name_width);
        }
        output.push_str(&rule);
        Ok(output)
    }
}

/// Renders `coverage-summary.txt`: totals only, one metric per line
#[derive(Debug, Clone, Copy, Default)]
pub struct TextSummaryRenderer;

impl ReportRenderer for TextSummaryRenderer {
    fn render(&self, ctx: &ReportContext<'_>) -> CoverResult<String> {
        let total = &ctx.total;
        let mut output = format!("{SUMMARY_TITLE:=^SUMMARY_WIDTH$}\n");
        for (label, metric) in [
            ("Statements", &total.statements),
            ("Branches", &total.branches),
            ("Functions", &total.functions),
            ("Lines", &total.lines),
        ] {
            let _ = writeln!(
                output,
                "{label:<12} : {:.2}% ( {}/{} )",
                metric.pct(),
                metric.covered,
                metric.total
            );
        }
        output.push_str(&"=".repeat(SUMMARY_WIDTH));
        output.push('\n');
        Ok(output)
    }
}

fn separator(name_width: usize) -> String {
    let mut line = "-".repeat(name_width);
    line.push_str("-|");
    for _ in HEADERS {
        line.push_str(&"-".repeat(10));
        line.push('|');
    }
    line.push('\n');
    line
}

fn row(output: &mut String, name: &str, summary: &CoverageSummary, name_width: usize) {
    let _ = write!(output, "{name:<name_width$} |");
    for metric in [
        summary.statements,
        summary.branches,
        summary.functions,
        summary.lines,
    ] {
        let _ = write!(output, " {:>8.2} |", metric.pct());
    }
    output.push('\n');
}
