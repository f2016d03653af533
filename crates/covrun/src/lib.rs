//! covrun: Coverage-Instrumenting Test Harness
//!
//! Runs a suite of test files through a pluggable engine, instruments in-scope
//! source files as they are loaded, and writes coverage reports once the
//! suite has finished.
//!
//! # Architecture
//!
//! ```text
//!  Harness ──► CoverageRunner ──► MatchIndex
//!     │             │ installs
//!     ▼             ▼
//!  TestEngine ──► HookedProvider ──► Transformer ──► Instrumenter
//!     │ probes
//!     ▼
//!  CoverageSink ──► CoverageAggregator ──► backfill ──► remap ──► ReportEmitter
//! ```
//!
//! # Example
//!
//! ```no_run
//! use covrun::{Harness, ScriptEngine, TestCoverOptions};
//! use std::path::Path;
//!
//! let mut harness = Harness::new(
//!     Box::new(ScriptEngine::new()),
//!     TestCoverOptions::with_cover_config("coverconfig.json"),
//! );
//! harness.run(Path::new("test"), |result| match result {
//!     Ok(failures) => println!("{failures} tests failed"),
//!     Err(e) => eprintln!("Error: {e}"),
//! });
//! ```

#![warn(missing_docs)]

pub mod coverage;
mod engine;
mod harness;
mod hook;
mod instrument;
mod matcher;
mod path;
pub mod report;
mod result;
pub mod runner;
pub mod script;
pub mod sourcemap;

pub use coverage::{
    CoverageAggregator, CoverageMap, CoverageSink, CoverageSummary, CoverageVariable, FileCoverage, Probe,
};
pub use engine::{ModuleCache, SuiteHook, SuiteResults, TestEngine, TestResult};
pub use harness::{discover_matching, discover_tests, Harness, RunSummary, TEST_PATTERN};
pub use hook::{FsSourceProvider, HookedProvider, LoadHook, LoadedSource, SourceProvider};
pub use instrument::{Instrumented, Instrumenter, Transformer};
pub use matcher::{MatchIndex, SourceFile, SOURCE_PATTERN};
pub use path::{CanonicalPath, CaseFolding};
pub use report::{ReportEmitter, ReportFormat, ReportRenderer};
pub use result::{CoverError, CoverResult};
pub use runner::{CoverageRunner, ReportOutcome, RunnerOptions, TestCoverOptions};
pub use script::{ScriptEngine, ScriptInstrumenter};
pub use sourcemap::{SourceMap, SourceMapStore};
