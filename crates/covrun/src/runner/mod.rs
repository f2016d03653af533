//! Coverage run lifecycle.
//!
//! ```text
//! setup_coverage ──► (tests execute through the hooked provider)
//!                          │
//! report_coverage ◄────────┘
//!   teardown ─► backfill ─► remap ─► emit
//! ```

mod backfill;
mod config;

pub use backfill::{backfill, BackfillSummary};
pub use config::{read_cover_options, RunnerOptions, TestCoverOptions, DEFAULT_COVERAGE_DIR};

use crate::coverage::{CoverageAggregator, CoverageVariable};
use crate::engine::TestEngine;
use crate::hook::{HookedProvider, LoadHook};
use crate::instrument::{Instrumenter, Transformer};
use crate::matcher::MatchIndex;
use crate::path::{CanonicalPath, CaseFolding};
use crate::report::{EmitSummary, ReportEmitter};
use crate::result::{CoverError, CoverResult};
use crate::sourcemap::SourceMapStore;
use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// Result of the reporting phase
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportOutcome {
    /// Nothing was collected; no files were written
    NoData,
    /// Reports were emitted
    Written {
        /// Artifacts written and formats that failed
        reports: EmitSummary,
        /// Backfill statistics
        backfill: BackfillSummary,
    },
    /// Collection finished but the report directory could not be written
    Failed {
        /// Why emitting stopped
        message: String,
        /// Backfill statistics
        backfill: BackfillSummary,
    },
}

impl ReportOutcome {
    /// Paths of the artifacts written
    #[must_use]
    pub fn written_files(&self) -> &[PathBuf] {
        match self {
            Self::NoData | Self::Failed { .. } => &[],
            Self::Written { reports, .. } => &reports.written,
        }
    }
}

enum Lifecycle {
    Idle,
    Active {
        index: Rc<MatchIndex>,
        provider: Rc<HookedProvider>,
    },
    TornDown {
        index: Rc<MatchIndex>,
    },
}

impl fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("Idle"),
            Self::Active { index, .. } => write!(f, "Active({} files)", index.len()),
            Self::TornDown { index } => write!(f, "TornDown({} files)", index.len()),
        }
    }
}

/// Drives instrumentation, collection and reporting for one run
#[derive(Debug)]
pub struct CoverageRunner {
    options: RunnerOptions,
    source_root: PathBuf,
    coverage_dir: PathBuf,
    folding: CaseFolding,
    instrumenter: Rc<dyn Instrumenter>,
    aggregator: CoverageAggregator,
    lifecycle: Lifecycle,
}

impl CoverageRunner {
    /// Create a runner for the suite rooted at `test_root`.
    ///
    /// Fails when no source path is configured.
    pub fn new(
        options: RunnerOptions,
        test_root: &Path,
        instrumenter: Rc<dyn Instrumenter>,
        folding: CaseFolding,
    ) -> CoverResult<Self> {
        let relative_source = options
            .relative_source_path
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| {
                CoverError::configuration("relativeSourcePath is required to collect coverage")
            })?;

        let source_root = lexical(&test_root.join(relative_source));
        let coverage_dir = lexical(&test_root.join(&options.relative_coverage_dir));
        Ok(Self {
            options,
            source_root,
            coverage_dir,
            folding,
            instrumenter,
            aggregator: CoverageAggregator::new(),
            lifecycle: Lifecycle::Idle,
        })
    }

    /// Directory scanned for sources
    #[must_use]
    pub fn source_root(&self) -> &Path {
        &self.source_root
    }

    /// Directory reports are written to
    #[must_use]
    pub fn coverage_dir(&self) -> &Path {
        &self.coverage_dir
    }

    /// The run's coverage variable
    #[must_use]
    pub fn variable(&self) -> &CoverageVariable {
        self.aggregator.variable()
    }

    /// Check if the hook is currently installed
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self.lifecycle, Lifecycle::Active { .. })
    }

    /// Match sources, evict stale cached copies, initialize collection and
    /// install the load hook on `provider`
    pub fn setup_coverage(&mut self, provider: &Rc<HookedProvider>, engine: &mut dyn TestEngine) -> CoverResult<()> {
        if self.is_active() {
            return Err(CoverError::invalid_state("coverage is already set up"));
        }

        let index = Rc::new(MatchIndex::build(
            &self.source_root,
            &self.options.ignore_patterns,
            self.folding,
        )?);

        let evicted = index
            .files()
            .iter()
            .filter(|file| engine.evict_module(&file.canonical))
            .count();
        if evicted > 0 {
            tracing::debug!(evicted, "cached modules evicted before instrumentation");
        }

        self.aggregator.initialize();

        let transformer = Transformer::new(
            Rc::clone(&self.instrumenter),
            self.aggregator.variable().clone(),
            self.folding,
        );
        let hook = LoadHook::new(
            Rc::clone(&index),
            transformer,
            self.aggregator.sink(),
            self.options.verbose,
        );
        provider.install(hook)?;

        tracing::info!(
            root = %self.source_root.display(),
            files = index.len(),
            "coverage hook installed"
        );
        self.lifecycle = Lifecycle::Active {
            index,
            provider: Rc::clone(provider),
        };
        Ok(())
    }

    /// Remove the load hook; a no-op unless coverage is set up
    pub fn teardown_coverage(&mut self) {
        let lifecycle = std::mem::replace(&mut self.lifecycle, Lifecycle::Idle);
        self.lifecycle = match lifecycle {
            Lifecycle::Active { index, provider } => {
                let _ = provider.uninstall();
                tracing::debug!("coverage hook removed");
                Lifecycle::TornDown { index }
            }
            other => other,
        };
    }

    /// Tear down, then backfill, remap and write the configured reports.
    ///
    /// An empty collection is reported as [`ReportOutcome::NoData`] and
    /// writes nothing. Write errors are logged and returned as
    /// [`ReportOutcome::Failed`].
    pub fn report_coverage(&mut self) -> ReportOutcome {
        self.teardown_coverage();

        if self.aggregator.is_empty() {
            tracing::warn!("No coverage information was collected, exit without writing coverage information");
            return ReportOutcome::NoData;
        }

        let mut map = self.aggregator.take();
        let backfill = match &self.lifecycle {
            Lifecycle::TornDown { index } => {
                let transformer = Transformer::new(
                    Rc::clone(&self.instrumenter),
                    self.aggregator.variable().clone(),
                    self.folding,
                );
                backfill(index, &transformer, &mut map, self.options.verbose)
            }
            _ => BackfillSummary::default(),
        };

        let map = SourceMapStore::new(self.folding).transform_coverage(map);

        let root = CanonicalPath::new(&self.source_root, self.folding);
        match ReportEmitter::new(&self.coverage_dir, &self.options.reports).emit(&map, Some(root)) {
            Ok(reports) => ReportOutcome::Written { reports, backfill },
            Err(e) => {
                tracing::warn!(
                    dir = %self.coverage_dir.display(),
                    error = %e,
                    "coverage reports could not be written"
                );
                ReportOutcome::Failed {
                    message: e.to_string(),
                    backfill,
                }
            }
        }
    }
}

fn lexical(path: &Path) -> PathBuf {
    CanonicalPath::new(path, CaseFolding::Sensitive).to_path_buf()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::hook::SourceProvider;
    use crate::report::ReportFormat;
    use crate::script::{ScriptEngine, ScriptInstrumenter};
    use std::fs;

    fn project() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::create_dir_all(dir.path().join("test")).unwrap();
        fs::write(dir.path().join("src/a.js"), "let on = true\nfunction go() {\n  work\n}\n").unwrap();
        fs::write(dir.path().join("src/c.js"), "idle\n").unwrap();
        dir
    }

    fn runner(dir: &Path, options: RunnerOptions) -> CoverResult<CoverageRunner> {
        CoverageRunner::new(
            options,
            &dir.join("test"),
            Rc::new(ScriptInstrumenter::new()),
            CaseFolding::Sensitive,
        )
    }

    fn options() -> RunnerOptions {
        RunnerOptions::default()
            .enabled()
            .with_source_path("../src")
            .with_reports([ReportFormat::Json])
    }

    #[test]
    fn test_missing_source_path_is_configuration_error() {
        let dir = project();
        let err = runner(dir.path(), RunnerOptions::default().enabled()).unwrap_err();
        assert!(matches!(err, CoverError::Configuration { .. }));
        let err = runner(dir.path(), RunnerOptions::default().with_source_path("  ")).unwrap_err();
        assert!(matches!(err, CoverError::Configuration { .. }));
    }

    #[test]
    fn test_paths_resolve_against_test_root() {
        let dir = project();
        let runner = runner(dir.path(), options()).unwrap();
        assert!(runner.source_root().ends_with("src"));
        assert!(!runner.source_root().to_string_lossy().contains(".."));
        assert_eq!(runner.coverage_dir(), dir.path().join("test/coverage"));
    }

    #[test]
    fn test_setup_installs_and_teardown_is_idempotent() {
        let dir = project();
        let mut runner = runner(dir.path(), options()).unwrap();
        let provider = Rc::new(HookedProvider::default());
        let mut engine = ScriptEngine::with_case_folding(CaseFolding::Sensitive);

        runner.setup_coverage(&provider, &mut engine).unwrap();
        assert!(provider.is_installed());
        assert!(runner.is_active());

        let err = runner.setup_coverage(&provider, &mut engine).unwrap_err();
        assert!(matches!(err, CoverError::InvalidState { .. }));

        runner.teardown_coverage();
        runner.teardown_coverage();
        assert!(!provider.is_installed());
        assert!(!runner.is_active());
    }

    #[test]
    fn test_teardown_without_setup_is_noop() {
        let dir = project();
        let mut runner = runner(dir.path(), options()).unwrap();
        runner.teardown_coverage();
        assert!(!runner.is_active());
    }

    #[test]
    fn test_setup_evicts_cached_sources() {
        let dir = project();
        let provider = Rc::new(HookedProvider::default());
        let mut engine = ScriptEngine::with_case_folding(CaseFolding::Sensitive);
        engine.preload(&dir.path().join("src/a.js"), provider.as_ref()).unwrap();
        assert_eq!(engine.cached_modules(), 1);

        let mut runner = runner(dir.path(), options()).unwrap();
        runner.setup_coverage(&provider, &mut engine).unwrap();
        assert_eq!(engine.cached_modules(), 0);
    }

    #[test]
    fn test_report_without_hits_is_no_data() {
        let dir = project();
        let mut runner = runner(dir.path(), options()).unwrap();
        let provider = Rc::new(HookedProvider::default());
        let mut engine = ScriptEngine::with_case_folding(CaseFolding::Sensitive);
        runner.setup_coverage(&provider, &mut engine).unwrap();

        assert_eq!(runner.report_coverage(), ReportOutcome::NoData);
        assert!(!provider.is_installed());
        assert!(!dir.path().join("test/coverage").exists());
    }

    #[test]
    fn test_report_backfills_and_writes() {
        let dir = project();
        let mut runner = runner(dir.path(), options()).unwrap();
        let provider = Rc::new(HookedProvider::default());
        let mut engine = ScriptEngine::with_case_folding(CaseFolding::Sensitive);
        runner.setup_coverage(&provider, &mut engine).unwrap();

        let loaded = provider.load(&dir.path().join("test/../src/a.js")).unwrap();
        assert!(loaded.coverage.is_some());
        engine.preload(&dir.path().join("test/../src/a.js"), provider.as_ref()).unwrap();

        let outcome = runner.report_coverage();
        let ReportOutcome::Written { reports, backfill } = &outcome else {
            panic!("expected reports");
        };
        assert_eq!(backfill.filled, 1);
        assert_eq!(reports.written.len(), 1);

        let json = fs::read_to_string(&outcome.written_files()[0]).unwrap();
        let map: crate::coverage::CoverageMap = serde_json::from_str(&json).unwrap();
        assert_eq!(map.len(), 2);
        let c = CanonicalPath::new(dir.path().join("src/c.js"), CaseFolding::Sensitive);
        assert!(map.get(&c).unwrap().is_unexecuted());
    }

    #[test]
    fn test_unwritable_coverage_dir_is_failed_outcome() {
        let dir = project();
        fs::write(dir.path().join("test/coverage"), "not a directory").unwrap();
        let mut runner = runner(dir.path(), options()).unwrap();
        let provider = Rc::new(HookedProvider::default());
        let mut engine = ScriptEngine::with_case_folding(CaseFolding::Sensitive);
        runner.setup_coverage(&provider, &mut engine).unwrap();
        engine.preload(&dir.path().join("src/a.js"), provider.as_ref()).unwrap();

        let outcome = runner.report_coverage();
        let ReportOutcome::Failed { message, backfill } = &outcome else {
            panic!("expected a failed outcome, got {outcome:?}");
        };
        assert!(!message.is_empty());
        assert_eq!(backfill.filled, 1);
        assert!(outcome.written_files().is_empty());
        assert!(!provider.is_installed());
    }
}
