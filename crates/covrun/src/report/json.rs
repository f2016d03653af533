//! JSON renderers: the full coverage map and the summary table.

use super::{ReportContext, ReportRenderer};
use crate::coverage::{CoverageSummary, Metric};
use crate::result::CoverResult;
use serde_json::{json, Map, Value};

/// Renders `coverage-final.json`, the full coverage map
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonRenderer;

impl ReportRenderer for JsonRenderer {
    fn render(&self, ctx: &ReportContext<'_>) -> CoverResult<String> {
        Ok(serde_json::to_string(ctx.map)?)
    }
}

/// Renders `coverage-summary.json`: a `total` entry plus one entry per file
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSummaryRenderer;

impl ReportRenderer for JsonSummaryRenderer {
    fn render(&self, ctx: &ReportContext<'_>) -> CoverResult<String> {
        let mut root = Map::new();
        let _ = root.insert("total".to_string(), summary_json(&ctx.total));
        for (path, summary) in &ctx.summaries {
            let _ = root.insert(path.to_string(), summary_json(summary));
        }
        Ok(serde_json::to_string(&Value::Object(root))?)
    }
}

fn summary_json(summary: &CoverageSummary) -> Value {
    json!({
        "lines": metric_json(summary.lines),
        "statements": metric_json(summary.statements),
        "functions": metric_json(summary.functions),
        "branches": metric_json(summary.branches),
    })
}

fn metric_json(metric: Metric) -> Value {
    json!({
        "total": metric.total,
        "covered": metric.covered,
        "skipped": 0,
        "pct": (metric.pct() * 100.0).round() / 100.0,
    })
}
