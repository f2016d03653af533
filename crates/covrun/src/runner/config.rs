//! Coverage configuration.
//!
//! ```json
//! {
//!   "enabled": true,
//!   "relativeSourcePath": "../src",
//!   "relativeCoverageDir": "../coverage",
//!   "ignorePatterns": ["**/vendor/**"],
//!   "reports": ["lcovonly", "cobertura"],
//!   "verbose": false
//! }
//! ```

use crate::report::ReportFormat;
use crate::result::{CoverError, CoverResult};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Default coverage output directory, relative to the test root
pub const DEFAULT_COVERAGE_DIR: &str = "coverage";

/// Options of one coverage run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RunnerOptions {
    /// Whether coverage is collected at all
    pub enabled: bool,
    /// Report directory, relative to the test root
    pub relative_coverage_dir: String,
    /// Source root, relative to the test root
    pub relative_source_path: Option<String>,
    /// Globs of source files to leave uninstrumented, relative to the source root
    pub ignore_patterns: Vec<String>,
    /// Report formats to write
    #[serde(deserialize_with = "deserialize_reports")]
    pub reports: Vec<ReportFormat>,
    /// Log per-file events at info level
    pub verbose: bool,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            enabled: false,
            relative_coverage_dir: DEFAULT_COVERAGE_DIR.to_string(),
            relative_source_path: None,
            ignore_patterns: Vec::new(),
            reports: vec![ReportFormat::default()],
            verbose: false,
        }
    }
}

impl RunnerOptions {
    /// Parse options from JSON text
    pub fn from_json(text: &str) -> CoverResult<Self> {
        serde_json::from_str(text)
            .map_err(|e| CoverError::configuration(format!("invalid coverage configuration: {e}")))
    }

    /// Enable collection
    #[must_use]
    pub const fn enabled(mut self) -> Self {
        self.enabled = true;
        self
    }

    /// Set the source root
    #[must_use]
    pub fn with_source_path(mut self, path: impl Into<String>) -> Self {
        self.relative_source_path = Some(path.into());
        self
    }

    /// Set the report directory
    #[must_use]
    pub fn with_coverage_dir(mut self, path: impl Into<String>) -> Self {
        self.relative_coverage_dir = path.into();
        self
    }

    /// Add an ignore pattern
    #[must_use]
    pub fn with_ignore_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.ignore_patterns.push(pattern.into());
        self
    }

    /// Replace the report formats
    #[must_use]
    pub fn with_reports(mut self, reports: impl IntoIterator<Item = ReportFormat>) -> Self {
        self.reports = reports.into_iter().collect();
        self
    }
}

/// A non-array `reports` value falls back to the default format; unknown
/// identifiers are rejected.
fn deserialize_reports<'de, D>(deserializer: D) -> Result<Vec<ReportFormat>, D::Error>
where
    D: Deserializer<'de>,
{
    let Value::Array(items) = Value::deserialize(deserializer)? else {
        return Ok(vec![ReportFormat::default()]);
    };
    items
        .iter()
        .map(|item| {
            let id = item
                .as_str()
                .ok_or_else(|| serde::de::Error::custom(format!("report format must be a string, got {item}")))?;
            id.parse::<ReportFormat>()
                .map_err(|e| serde::de::Error::custom(e.to_string()))
        })
        .collect()
}

/// Options supplied through the harness entry point
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCoverOptions {
    /// Coverage configuration file, relative to the test root
    pub cover_config: Option<PathBuf>,
}

impl TestCoverOptions {
    /// Options pointing at a configuration file
    #[must_use]
    pub fn with_cover_config(path: impl Into<PathBuf>) -> Self {
        Self {
            cover_config: Some(path.into()),
        }
    }
}

/// Read the coverage configuration named by `options`.
///
/// Returns `None` when no configuration is named or the file does not
/// exist; malformed content is a configuration error.
pub fn read_cover_options(test_root: &Path, options: &TestCoverOptions) -> CoverResult<Option<RunnerOptions>> {
    let Some(relative) = &options.cover_config else {
        return Ok(None);
    };
    let path = test_root.join(relative);
    let text = match fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "no coverage configuration");
            return Ok(None);
        }
        Err(e) => return Err(e.into()),
    };
    let parsed = RunnerOptions::from_json(&text).map_err(|e| match e {
        CoverError::Configuration { message } => {
            CoverError::configuration(format!("{}: {message}", path.display()))
        }
        other => other,
    })?;
    Ok(Some(parsed))
}
