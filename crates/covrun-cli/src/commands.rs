//! CLI command definitions using clap

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Covrun: run test suites with coverage instrumentation
#[derive(Parser, Debug)]
#[command(name = "covrun")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a test suite, collecting coverage when configured
    Run(RunArgs),

    /// Print the instrumented text of a source file
    Instrument(InstrumentArgs),

    /// List the test files found under a test root
    Discover(DiscoverArgs),
}

/// Arguments for the run command
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Directory containing the test files
    pub test_root: PathBuf,

    /// Coverage configuration file, relative to the test root
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

/// Arguments for the instrument command
#[derive(Parser, Debug)]
pub struct InstrumentArgs {
    /// Source file to instrument
    pub file: PathBuf,
}

/// Arguments for the discover command
#[derive(Parser, Debug)]
pub struct DiscoverArgs {
    /// Directory to scan
    pub test_root: PathBuf,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_with_config() {
        let cli = Cli::parse_from(["covrun", "run", "tests", "--config", "cover.json"]);
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.test_root, PathBuf::from("tests"));
                assert_eq!(args.config, Some(PathBuf::from("cover.json")));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_global_flags() {
        let cli = Cli::parse_from(["covrun", "-vv", "discover", "tests"]);
        assert_eq!(cli.verbose, 2);
        assert!(!cli.quiet);

        let cli = Cli::parse_from(["covrun", "instrument", "a.js", "-q"]);
        assert!(cli.quiet);
        assert!(matches!(cli.command, Commands::Instrument(_)));
    }

    #[test]
    fn test_run_requires_test_root() {
        assert!(Cli::try_parse_from(["covrun", "run"]).is_err());
    }
}
