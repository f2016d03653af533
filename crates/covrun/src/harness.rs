//! Suite entry point.
//!
//! Wires configuration, test discovery, the engine and the coverage runner
//! together for one run.

use crate::engine::{SuiteHook, TestEngine};
use crate::hook::{HookedProvider, SourceProvider};
use crate::instrument::Instrumenter;
use crate::path::{CanonicalPath, CaseFolding};
use crate::result::{CoverError, CoverResult};
use crate::runner::{read_cover_options, CoverageRunner, ReportOutcome, TestCoverOptions};
use crate::script::ScriptInstrumenter;
use glob::Pattern;
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// Glob of test files under the test root
pub const TEST_PATTERN: &str = "**/*.test.js";

/// Outcome of one suite run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Number of failed tests
    pub failures: usize,
    /// Coverage outcome, when coverage was enabled
    pub coverage: Option<ReportOutcome>,
}

/// Runs a test suite with optional coverage collection
#[derive(Debug)]
pub struct Harness {
    engine: Box<dyn TestEngine>,
    options: TestCoverOptions,
    instrumenter: Rc<dyn Instrumenter>,
    folding: CaseFolding,
    provider: Rc<HookedProvider>,
    test_pattern: String,
}

impl Harness {
    /// Create a harness reading sources from the filesystem
    #[must_use]
    pub fn new(engine: Box<dyn TestEngine>, options: TestCoverOptions) -> Self {
        Self {
            engine,
            options,
            instrumenter: Rc::new(ScriptInstrumenter::new()),
            folding: CaseFolding::platform(),
            provider: Rc::new(HookedProvider::default()),
            test_pattern: TEST_PATTERN.to_string(),
        }
    }

    /// Replace the engine and options used by subsequent runs
    pub fn configure(&mut self, engine: Box<dyn TestEngine>, options: TestCoverOptions) {
        self.engine = engine;
        self.options = options;
    }

    /// Use a different instrumenter
    #[must_use]
    pub fn with_instrumenter(mut self, instrumenter: Rc<dyn Instrumenter>) -> Self {
        self.instrumenter = instrumenter;
        self
    }

    /// Override the platform case-folding policy
    #[must_use]
    pub const fn with_case_folding(mut self, folding: CaseFolding) -> Self {
        self.folding = folding;
        self
    }

    /// Load modules through `provider` instead of the filesystem
    #[must_use]
    pub fn with_source_provider(mut self, provider: Box<dyn SourceProvider>) -> Self {
        self.provider = Rc::new(HookedProvider::new(provider));
        self
    }

    /// Glob, relative to the test root, selecting test files
    #[must_use]
    pub fn with_test_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.test_pattern = pattern.into();
        self
    }

    /// Provider engines load modules through
    #[must_use]
    pub fn provider(&self) -> &Rc<HookedProvider> {
        &self.provider
    }

    /// Run the suite under `test_root`, handing the failure count (or the
    /// error that stopped the run) to `callback` exactly once
    pub fn run(&mut self, test_root: &Path, callback: impl FnOnce(CoverResult<usize>)) {
        callback(self.run_suite(test_root).map(|summary| summary.failures));
    }

    /// Run the suite under `test_root`.
    ///
    /// Reports are written before this returns, whether or not the engine
    /// fired its after-all hooks. Only setup and discovery errors fail the
    /// run; a report that cannot be written shows up in
    /// [`RunSummary::coverage`].
    pub fn run_suite(&mut self, test_root: &Path) -> CoverResult<RunSummary> {
        let test_root = absolute(test_root)?;

        let runner = match read_cover_options(&test_root, &self.options)? {
            Some(options) if options.enabled => {
                let mut runner = CoverageRunner::new(
                    options,
                    &test_root,
                    Rc::clone(&self.instrumenter),
                    self.folding,
                )?;
                runner.setup_coverage(&self.provider, self.engine.as_mut())?;
                Some(Rc::new(RefCell::new(runner)))
            }
            _ => None,
        };

        let files = match discover_matching(&test_root, &self.test_pattern) {
            Ok(files) => files,
            Err(e) => {
                if let Some(runner) = &runner {
                    runner.borrow_mut().teardown_coverage();
                }
                return Err(e);
            }
        };

        let outcome: Rc<RefCell<Option<ReportOutcome>>> = Rc::new(RefCell::new(None));
        let hook = runner.map(|runner| {
            let slot = Rc::clone(&outcome);
            SuiteHook::new(move || {
                let report = runner.borrow_mut().report_coverage();
                *slot.borrow_mut() = Some(report);
            })
        });
        if let Some(hook) = &hook {
            self.engine.after_all(hook.clone());
        }

        tracing::info!(root = %test_root.display(), files = files.len(), "running tests");
        for file in files {
            self.engine.add_file(file);
        }
        let failures = self.engine.run(self.provider.as_ref());

        if let Some(hook) = &hook {
            if hook.fire() {
                tracing::debug!("engine did not run after-all hooks, reporting now");
            }
        }

        let coverage = outcome.borrow_mut().take();
        tracing::info!(failures, "suite finished");
        Ok(RunSummary { failures, coverage })
    }
}

/// Test files under `test_root`, in scan order
pub fn discover_tests(test_root: &Path) -> CoverResult<Vec<PathBuf>> {
    discover_matching(test_root, TEST_PATTERN)
}

/// Files under `test_root` matching `relative`, in scan order
pub fn discover_matching(test_root: &Path, relative: &str) -> CoverResult<Vec<PathBuf>> {
    let pattern = format!("{}/{relative}", Pattern::escape(&test_root.to_string_lossy()));
    let entries = glob::glob(&pattern)
        .map_err(|e| CoverError::discovery(format!("invalid test pattern '{pattern}': {e}")))?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| CoverError::discovery(format!("scanning {}: {e}", test_root.display())))?;
        if path.is_file() {
            files.push(path);
        }
    }
    tracing::debug!(root = %test_root.display(), files = files.len(), "test files discovered");
    Ok(files)
}

fn absolute(path: &Path) -> CoverResult<PathBuf> {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    Ok(CanonicalPath::new(joined, CaseFolding::Sensitive).to_path_buf())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::coverage::{CoverageMap, CoverageVariable};
    use crate::hook::{FsSourceProvider, LoadedSource};
    use crate::instrument::Instrumented;
    use crate::script::ScriptEngine;
    use crate::sourcemap::SourceMap;
    use std::cell::Cell;
    use std::collections::HashMap;
    use std::fs;

    #[derive(Debug, Default)]
    struct SilentEngine {
        files: Vec<PathBuf>,
        hooks: Vec<SuiteHook>,
    }

    impl TestEngine for SilentEngine {
        fn add_file(&mut self, path: PathBuf) {
            self.files.push(path);
        }

        fn after_all(&mut self, hook: SuiteHook) {
            self.hooks.push(hook);
        }

        fn evict_module(&mut self, _path: &CanonicalPath) -> bool {
            false
        }

        // Never fires its hooks.
        fn run(&mut self, provider: &dyn SourceProvider) -> usize {
            for file in &self.files {
                let _ = provider.load(file);
            }
            0
        }
    }

    /// Serves overridden text for some paths and reads the rest from disk
    #[derive(Debug, Default)]
    struct MemoryProvider {
        files: HashMap<PathBuf, String>,
    }

    impl SourceProvider for MemoryProvider {
        fn load(&self, path: &Path) -> CoverResult<LoadedSource> {
            match self.files.get(path) {
                Some(text) => Ok(LoadedSource::plain(text.clone())),
                None => FsSourceProvider.load(path),
            }
        }
    }

    #[derive(Debug, Default)]
    struct CountingInstrumenter {
        calls: Rc<Cell<usize>>,
    }

    impl Instrumenter for CountingInstrumenter {
        fn instrument(
            &self,
            code: &str,
            file: &CanonicalPath,
            variable: &CoverageVariable,
            source_map: Option<&SourceMap>,
        ) -> CoverResult<Instrumented> {
            self.calls.set(self.calls.get() + 1);
            ScriptInstrumenter::new().instrument(code, file, variable, source_map)
        }
    }

    fn project() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::create_dir_all(dir.path().join("test/unit")).unwrap();
        fs::write(dir.path().join("src/a.js"), "function go() {\n  work\n}\n").unwrap();
        fs::write(dir.path().join("test/a.test.js"), "use ../src/a.js as a\ntest go\ncall a.go\n").unwrap();
        fs::write(dir.path().join("test/unit/b.test.js"), "test fails\nfail boom\n").unwrap();
        fs::write(dir.path().join("test/helper.js"), "work\n").unwrap();
        fs::write(
            dir.path().join("test/cover.json"),
            r#"{"enabled":true,"relativeSourcePath":"../src","reports":["json"]}"#,
        )
        .unwrap();
        dir
    }

    fn harness(options: TestCoverOptions) -> Harness {
        Harness::new(
            Box::new(ScriptEngine::with_case_folding(CaseFolding::Sensitive)),
            options,
        )
        .with_case_folding(CaseFolding::Sensitive)
    }

    #[test]
    fn test_discover_tests_recursively() {
        let dir = project();
        let files = discover_tests(&dir.path().join("test")).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| f.to_string_lossy().ends_with(".test.js")));
    }

    #[test]
    fn test_run_without_configuration() {
        let dir = project();
        let mut harness = harness(TestCoverOptions::default());
        let summary = harness.run_suite(&dir.path().join("test")).unwrap();
        assert_eq!(summary.failures, 1);
        assert!(summary.coverage.is_none());
        assert!(!dir.path().join("test/coverage").exists());
    }

    #[test]
    fn test_run_with_coverage_writes_reports() {
        let dir = project();
        let mut harness = harness(TestCoverOptions::with_cover_config("cover.json"));
        let summary = harness.run_suite(&dir.path().join("test")).unwrap();
        assert_eq!(summary.failures, 1);
        let coverage = summary.coverage.unwrap();
        assert_eq!(coverage.written_files().len(), 1);
        assert!(dir.path().join("test/coverage/coverage-final.json").is_file());
        assert!(!harness.provider().is_installed());
    }

    #[test]
    fn test_callback_receives_failures_once() {
        let dir = project();
        let mut harness = harness(TestCoverOptions::default());
        let mut calls = Vec::new();
        harness.run(&dir.path().join("test"), |result| calls.push(result.unwrap()));
        assert_eq!(calls, vec![1]);
    }

    #[test]
    fn test_callback_receives_configuration_error() {
        let dir = project();
        fs::write(dir.path().join("test/cover.json"), r#"{"enabled":true}"#).unwrap();
        let mut harness = harness(TestCoverOptions::with_cover_config("cover.json"));
        let mut seen = None;
        harness.run(&dir.path().join("test"), |result| seen = Some(result));
        assert!(matches!(seen, Some(Err(CoverError::Configuration { .. }))));
        assert!(!harness.provider().is_installed());
    }

    #[test]
    fn test_reports_written_when_engine_skips_hooks() {
        let dir = project();
        let mut harness = harness(TestCoverOptions::default());
        harness.configure(
            Box::new(SilentEngine::default()),
            TestCoverOptions::with_cover_config("cover.json"),
        );

        let summary = harness.run_suite(&dir.path().join("test")).unwrap();
        assert_eq!(summary.failures, 0);
        assert_eq!(summary.coverage, Some(ReportOutcome::NoData));
        assert!(!harness.provider().is_installed());
    }

    #[test]
    fn test_unwritable_coverage_dir_keeps_failure_count() {
        let dir = project();
        fs::write(dir.path().join("test/coverage"), "in the way").unwrap();
        let mut first = harness(TestCoverOptions::with_cover_config("cover.json"));

        let summary = first.run_suite(&dir.path().join("test")).unwrap();
        assert_eq!(summary.failures, 1);
        assert!(matches!(summary.coverage, Some(ReportOutcome::Failed { .. })));
        assert!(!first.provider().is_installed());

        let mut calls = Vec::new();
        let mut second = harness(TestCoverOptions::with_cover_config("cover.json"));
        second.run(&dir.path().join("test"), |result| calls.push(result.unwrap()));
        assert_eq!(calls, vec![1]);
    }

    #[test]
    fn test_discovery_error_removes_hook() {
        let dir = project();
        let mut harness = harness(TestCoverOptions::with_cover_config("cover.json")).with_test_pattern("[");

        let err = harness.run_suite(&dir.path().join("test")).unwrap_err();
        assert!(matches!(err, CoverError::Discovery { .. }));
        assert!(!harness.provider().is_installed());
        assert!(!dir.path().join("test/coverage").exists());
    }

    #[test]
    fn test_custom_pattern_selects_other_files() {
        let dir = project();
        let files = discover_matching(&dir.path().join("test"), "*.js").unwrap();
        assert_eq!(files, vec![dir.path().join("test/a.test.js"), dir.path().join("test/helper.js")]);
    }

    #[test]
    fn test_custom_provider_and_instrumenter_are_used() {
        let dir = project();
        let source = dir.path().join("src/a.js");
        let mut provider = MemoryProvider::default();
        // Imports resolve next to the test file without normalization.
        let _ = provider.files.insert(
            dir.path().join("test/../src/a.js"),
            "function go() {\n  work\n  more\n}\n".to_string(),
        );
        let instrumenter = CountingInstrumenter::default();
        let calls = Rc::clone(&instrumenter.calls);

        let mut harness = harness(TestCoverOptions::with_cover_config("cover.json"))
            .with_source_provider(Box::new(provider))
            .with_instrumenter(Rc::new(instrumenter));
        let summary = harness.run_suite(&dir.path().join("test")).unwrap();
        assert_eq!(summary.failures, 1);
        assert_eq!(calls.get(), 1);

        let json = fs::read_to_string(dir.path().join("test/coverage/coverage-final.json")).unwrap();
        let map: CoverageMap = serde_json::from_str(&json).unwrap();
        let a = map.get(&CanonicalPath::new(&source, CaseFolding::Sensitive)).unwrap();
        assert_eq!(a.statement_map.len(), 3);
        assert!(a.s.values().all(|hits| *hits == 1));
    }

    #[test]
    fn test_relative_test_root_is_resolved() {
        let root = absolute(Path::new("some/dir/../tests")).unwrap();
        assert!(root.is_absolute());
        assert!(root.ends_with("some/tests"));
    }
}
