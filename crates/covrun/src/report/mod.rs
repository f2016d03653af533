//! Coverage report emission.
//!
//! Each [`ReportFormat`] has one [`ReportRenderer`]. All renderers share a
//! [`ReportContext`] built once per emission, and every artifact is written
//! to a temporary file in the output directory before being persisted over
//! its final name, so readers never observe a half-written report.

mod cobertura;
mod json;
mod lcov;
mod text;

pub use cobertura::CoberturaRenderer;
pub use json::{JsonRenderer, JsonSummaryRenderer};
pub use lcov::LcovRenderer;
pub use text::{TextRenderer, TextSummaryRenderer};

use crate::coverage::{CoverageMap, CoverageSummary};
use crate::path::CanonicalPath;
use crate::result::{CoverError, CoverResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tempfile::NamedTempFile;

/// Supported report formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum ReportFormat {
    /// LCOV tracefile
    #[default]
    #[serde(rename = "lcovonly")]
    Lcov,
    /// LCOV tracefile under the `lcov` id; no HTML is produced
    #[serde(rename = "lcov")]
    LcovReport,
    /// Full coverage map as JSON
    #[serde(rename = "json")]
    Json,
    /// Per-file and total summaries as JSON
    #[serde(rename = "json-summary")]
    JsonSummary,
    /// Plain-text summary table
    #[serde(rename = "text")]
    Text,
    /// Plain-text totals
    #[serde(rename = "text-summary")]
    TextSummary,
    /// Cobertura XML
    #[serde(rename = "cobertura")]
    Cobertura,
}

impl ReportFormat {
    /// Every format, in identifier order
    pub const ALL: [Self; 7] = [
        Self::Lcov,
        Self::LcovReport,
        Self::Json,
        Self::JsonSummary,
        Self::Text,
        Self::TextSummary,
        Self::Cobertura,
    ];

    /// Configuration identifier
    #[must_use]
    pub const fn id(self) -> &'static str {
        match self {
            Self::Lcov => "lcovonly",
            Self::LcovReport => "lcov",
            Self::Json => "json",
            Self::JsonSummary => "json-summary",
            Self::Text => "text",
            Self::TextSummary => "text-summary",
            Self::Cobertura => "cobertura",
        }
    }

    /// Artifact file name inside the coverage directory
    #[must_use]
    pub const fn file_name(self) -> &'static str {
        match self {
            Self::Lcov | Self::LcovReport => "lcov.info",
            Self::Json => "coverage-final.json",
            Self::JsonSummary => "coverage-summary.json",
            Self::Text => "coverage.txt",
            Self::TextSummary => "coverage-summary.txt",
            Self::Cobertura => "cobertura-coverage.xml",
        }
    }

    /// Renderer for this format
    #[must_use]
    pub fn renderer(self) -> Box<dyn ReportRenderer> {
        match self {
            Self::Lcov | Self::LcovReport => Box::new(LcovRenderer),
            Self::Json => Box::new(JsonRenderer),
            Self::JsonSummary => Box::new(JsonSummaryRenderer),
            Self::Text => Box::new(TextRenderer),
            Self::TextSummary => Box::new(TextSummaryRenderer),
            Self::Cobertura => Box::new(CoberturaRenderer),
        }
    }
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for ReportFormat {
    type Err = CoverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|format| format.id() == s)
            .ok_or_else(|| {
                let known: Vec<&str> = Self::ALL.iter().map(|f| f.id()).collect();
                CoverError::configuration(format!(
                    "unknown report format '{s}' (expected one of: {})",
                    known.join(", ")
                ))
            })
    }
}

/// Data shared by all renderers of one emission
#[derive(Debug)]
pub struct ReportContext<'a> {
    /// Output directory
    pub dir: &'a Path,
    /// Final coverage map
    pub map: &'a CoverageMap,
    /// Summary per file
    pub summaries: BTreeMap<CanonicalPath, CoverageSummary>,
    /// Summary over all files
    pub total: CoverageSummary,
    /// Directory that displayed paths are made relative to
    pub root: Option<CanonicalPath>,
}

impl<'a> ReportContext<'a> {
    /// Build a context over `map`
    #[must_use]
    pub fn new(dir: &'a Path, map: &'a CoverageMap, root: Option<CanonicalPath>) -> Self {
        Self {
            dir,
            map,
            summaries: map.file_summaries(),
            total: map.summary(),
            root,
        }
    }

    /// `path` relative to the context root, or unchanged when outside it
    #[must_use]
    pub fn display_path<'p>(&self, path: &'p CanonicalPath) -> &'p str {
        let full = path.as_str();
        self.root
            .as_ref()
            .and_then(|root| full.strip_prefix(root.as_str()))
            .and_then(|rest| rest.strip_prefix('/'))
            .filter(|rest| !rest.is_empty())
            .unwrap_or(full)
    }
}

/// Renders one report format
pub trait ReportRenderer {
    /// Render the artifact content
    fn render(&self, ctx: &ReportContext<'_>) -> CoverResult<String>;
}

/// Files written and formats that failed during one emission
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmitSummary {
    /// Artifacts written, in request order
    pub written: Vec<PathBuf>,
    /// Formats that failed, with the reason
    pub failed: Vec<(ReportFormat, String)>,
}

impl EmitSummary {
    /// Check if every requested format was written
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Writes the requested report formats into a directory
#[derive(Debug, Clone)]
pub struct ReportEmitter {
    dir: PathBuf,
    formats: Vec<ReportFormat>,
}

impl ReportEmitter {
    /// Create an emitter; formats sharing an artifact are written once,
    /// by the first one requested
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, formats: &[ReportFormat]) -> Self {
        let mut unique: Vec<ReportFormat> = Vec::with_capacity(formats.len());
        for format in formats {
            if !unique.iter().any(|f| f.file_name() == format.file_name()) {
                unique.push(*format);
            }
        }
        Self {
            dir: dir.into(),
            formats: unique,
        }
    }

    /// Output directory
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Formats that will be written
    #[must_use]
    pub fn formats(&self) -> &[ReportFormat] {
        &self.formats
    }

    /// Render and write every format.
    ///
    /// A failing format is logged and recorded; the others are still written.
    /// Only failure to create the output directory aborts the emission.
    pub fn emit(&self, map: &CoverageMap, root: Option<CanonicalPath>) -> CoverResult<EmitSummary> {
        fs::create_dir_all(&self.dir)?;
        let ctx = ReportContext::new(&self.dir, map, root);

        let mut summary = EmitSummary::default();
        for format in &self.formats {
            match self.emit_one(*format, &ctx) {
                Ok(path) => {
                    tracing::debug!(format = %format, path = %path.display(), "report written");
                    summary.written.push(path);
                }
                Err(e) => {
                    tracing::warn!(format = %format, error = %e, "report failed");
                    summary.failed.push((*format, e.to_string()));
                }
            }
        }
        tracing::info!(
            dir = %self.dir.display(),
            written = summary.written.len(),
            failed = summary.failed.len(),
            "coverage reports emitted"
        );
        Ok(summary)
    }

    fn emit_one(&self, format: ReportFormat, ctx: &ReportContext<'_>) -> CoverResult<PathBuf> {
        let content = format.renderer().render(ctx)?;
        let target = self.dir.join(format.file_name());
        let mut file = NamedTempFile::new_in(&self.dir)?;
        file.write_all(content.as_bytes())?;
        file.flush()?;
        let _ = file.persist(&target)?;
        Ok(target)
    }
}

/// Escape text for use inside XML attributes and content
pub(crate) fn xml_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}
