//! Coverage summary statistics.

use serde::{Deserialize, Serialize};

/// Covered / total counts for one metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Metric {
    /// Number of countable items
    pub total: usize,
    /// Number of items with a hit count above zero
    pub covered: usize,
}

impl Metric {
    /// Build a metric from raw hit counts
    pub fn from_counts<'a>(counts: impl IntoIterator<Item = &'a u64>) -> Self {
        let mut metric = Self::default();
        for count in counts {
            metric.total += 1;
            if *count > 0 {
                metric.covered += 1;
            }
        }
        metric
    }

    /// Coverage percentage; an empty metric counts as fully covered
    #[must_use]
    pub fn pct(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            (self.covered as f64 / self.total as f64) * 100.0
        }
    }

    /// Coverage ratio in `0.0..=1.0`
    #[must_use]
    pub fn rate(&self) -> f64 {
        self.pct() / 100.0
    }

    /// Add another metric into this one
    pub fn add(&mut self, other: Self) {
        self.total += other.total;
        self.covered += other.covered;
    }
}

/// Summary of all metrics for a file or a whole map
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CoverageSummary {
    /// Line coverage (derived from statements)
    pub lines: Metric,
    /// Statement coverage
    pub statements: Metric,
    /// Function coverage
    pub functions: Metric,
    /// Branch arm coverage
    pub branches: Metric,
}

impl CoverageSummary {
    /// Accumulate another summary into this one
    pub fn merge(&mut self, other: &Self) {
        self.lines.add(other.lines);
        self.statements.add(other.statements);
        self.functions.add(other.functions);
        self.branches.add(other.branches);
    }
}
