//! Covrun CLI Library
//!
//! Command-line interface for the covrun coverage harness.

#![warn(missing_docs)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

mod commands;
mod config;
mod error;
mod output;

pub use commands::{Cli, Commands, DiscoverArgs, InstrumentArgs, RunArgs};
pub use config::Verbosity;
pub use error::{CliError, CliResult};
pub use output::Reporter;
