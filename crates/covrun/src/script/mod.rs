//! Reference engine and instrumenter for a small line-oriented script
//! dialect, so suites can run end to end without an external runtime.

mod engine;
mod instrumenter;
mod suite;
pub mod syntax;

pub use engine::{ResultLog, ScriptEngine};
pub use instrumenter::ScriptInstrumenter;
pub use suite::{Import, Step, TestFile, TestSpec};
