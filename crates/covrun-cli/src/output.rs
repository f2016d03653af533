//! Output formatting for suite and coverage results

use console::{style, Term};
use covrun::{ReportOutcome, SuiteResults};
use std::path::Path;

/// Writes human-readable results to stdout
#[derive(Debug)]
pub struct Reporter {
    term: Term,
    quiet: bool,
}

impl Reporter {
    /// Create a reporter; quiet mode prints failures only
    #[must_use]
    pub fn new(quiet: bool) -> Self {
        Self {
            term: Term::stdout(),
            quiet,
        }
    }

    /// Print one line per test of a suite file
    pub fn suite(&self, suite: &SuiteResults) {
        if !self.quiet {
            let _ = self.term.write_line(&format!("{}", style(suite.file.display()).bold()));
        }
        for result in &suite.results {
            if result.passed {
                if !self.quiet {
                    let _ = self.term.write_line(&format!("  {} {}", style("✓").green().bold(), result.name));
                }
            } else {
                let error = result.error.as_deref().unwrap_or("failed");
                let _ = self.term.write_line(&format!(
                    "  {} {}: {}",
                    style("✗").red().bold(),
                    result.name,
                    style(error).red()
                ));
            }
        }
    }

    /// Print the pass/fail totals
    pub fn totals(&self, passed: usize, failed: usize) {
        if self.quiet {
            return;
        }
        let failed_text = if failed == 0 {
            style(format!("{failed} failed")).dim()
        } else {
            style(format!("{failed} failed")).red().bold()
        };
        let _ = self.term.write_line(&format!(
            "\n{} {}, {failed_text}",
            style("Tests:").bold(),
            style(format!("{passed} passed")).green()
        ));
    }

    /// Print where coverage reports went
    pub fn coverage(&self, outcome: &ReportOutcome) {
        if self.quiet {
            return;
        }
        match outcome {
            ReportOutcome::NoData => {
                let _ = self
                    .term
                    .write_line(&format!("{} no coverage collected", style("Coverage:").bold()));
            }
            ReportOutcome::Written { reports, backfill } => {
                let _ = self.term.write_line(&format!(
                    "{} {} report(s), {} unloaded file(s) backfilled",
                    style("Coverage:").bold(),
                    reports.written.len(),
                    backfill.filled
                ));
                for path in &reports.written {
                    let _ = self.term.write_line(&format!("  {}", path.display()));
                }
                for (format, error) in &reports.failed {
                    let _ = self
                        .term
                        .write_line(&format!("  {} {format}: {error}", style("✗").yellow().bold()));
                }
            }
            ReportOutcome::Failed { message, .. } => {
                let _ = self.term.write_line(&format!(
                    "{} {} {}",
                    style("Coverage:").bold(),
                    style("reports not written:").yellow(),
                    message
                ));
            }
        }
    }

    /// Print a discovered path
    pub fn path(&self, path: &Path) {
        let _ = self.term.write_line(&path.display().to_string());
    }
}
