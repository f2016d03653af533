//! Covrun CLI: run test suites with coverage instrumentation
//!
//! ## Usage
//!
//! ```bash
//! covrun run test --config coverconfig.json   # Run with coverage
//! covrun instrument src/a.js                  # Show instrumented text
//! covrun discover test                        # List test files
//! ```
//!
//! Exit status: 0 when every test passed, 1 when any test failed, 2 when
//! the run could not start.

use clap::Parser;
use covrun::{
    discover_tests, CaseFolding, CoverageVariable, Harness, ScriptEngine, ScriptInstrumenter, TestCoverOptions,
    Transformer,
};
use covrun_cli::{Cli, CliError, CliResult, Commands, DiscoverArgs, InstrumentArgs, Reporter, RunArgs, Verbosity};
use std::path::Path;
use std::process::ExitCode;
use std::rc::Rc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const TESTS_FAILED: u8 = 1;
const SETUP_FAILED: u8 = 2;

fn main() -> ExitCode {
    let cli = Cli::parse();
    let verbosity = Verbosity::from_flags(cli.quiet, cli.verbose);
    init_logging(verbosity);

    match run(cli, verbosity) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(SETUP_FAILED)
        }
    }
}

fn init_logging(verbosity: Verbosity) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(verbosity.filter_directive()));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(filter)
        .init();
}

fn run(cli: Cli, verbosity: Verbosity) -> CliResult<ExitCode> {
    match cli.command {
        Commands::Run(args) => run_suite(&args, verbosity),
        Commands::Instrument(args) => {
            run_instrument(&args)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Discover(args) => {
            run_discover(&args, verbosity)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn run_suite(args: &RunArgs, verbosity: Verbosity) -> CliResult<ExitCode> {
    require_dir(&args.test_root)?;
    let options = TestCoverOptions {
        cover_config: args.config.clone(),
    };

    let engine = ScriptEngine::new();
    let results = engine.results();
    let mut harness = Harness::new(Box::new(engine), options);
    let summary = harness.run_suite(&args.test_root)?;

    let reporter = Reporter::new(verbosity.is_quiet());
    let mut passed = 0;
    for suite in results.borrow().iter() {
        reporter.suite(suite);
        passed += suite.passed_count();
    }
    reporter.totals(passed, summary.failures);
    if let Some(outcome) = &summary.coverage {
        reporter.coverage(outcome);
    }

    Ok(if summary.failures == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(TESTS_FAILED)
    })
}

fn run_instrument(args: &InstrumentArgs) -> CliResult<()> {
    if args.file.is_dir() {
        return Err(CliError::invalid_argument(format!(
            "{} is a directory, expected a source file",
            args.file.display()
        )));
    }
    let code = std::fs::read_to_string(&args.file)?;
    let transformer = Transformer::new(
        Rc::new(ScriptInstrumenter::new()),
        CoverageVariable::generate(),
        CaseFolding::platform(),
    );
    let file = if args.file.is_absolute() {
        args.file.clone()
    } else {
        std::env::current_dir()?.join(&args.file)
    };
    let instrumented = transformer.transform(&code, &file)?;
    print!("{}", instrumented.code);
    Ok(())
}

fn run_discover(args: &DiscoverArgs, verbosity: Verbosity) -> CliResult<()> {
    require_dir(&args.test_root)?;
    let files = discover_tests(&args.test_root)?;
    let reporter = Reporter::new(verbosity.is_quiet());
    for file in &files {
        reporter.path(file);
    }
    tracing::info!(files = files.len(), "discovery finished");
    Ok(())
}

fn require_dir(test_root: &Path) -> CliResult<()> {
    if test_root.is_dir() {
        Ok(())
    } else {
        Err(CliError::invalid_argument(format!(
            "test root {} is not a directory",
            test_root.display()
        )))
    }
}
