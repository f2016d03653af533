//! Test-file parser.
//!
//! ```text
//! use ../src/greeter.js as greeter
//!
//! test greets loudly
//! call greeter.greet true
//!
//! test reports a failure
//! fail not ready yet
//! ```
//!
//! When the file itself was instrumented, each `@cov` counter line is kept
//! with the directive that follows it so the engine can count the file's
//! own statements as it runs them.

use super::syntax::{is_identifier, parse_header, parse_probe, Header, PROBE_PREFIX};
use crate::coverage::Probe;
use crate::result::{CoverError, CoverResult};
use std::path::{Path, PathBuf};

/// A module import
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Import {
    /// Path relative to the test file's directory
    pub module: PathBuf,
    /// Name the module is referred to by
    pub alias: String,
    /// Counters to record when the import runs
    pub counters: Vec<Probe>,
}

/// One step of a test
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Call an exported function
    Call {
        /// Import alias
        alias: String,
        /// Function name
        function: String,
        /// Argument bound to the function's parameter
        arg: bool,
    },
    /// Fail unconditionally
    Fail(String),
    /// Count an instrumented statement of the test file
    Record(Probe),
}

/// A named test
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestSpec {
    /// Test name
    pub name: String,
    /// Steps in order
    pub steps: Vec<Step>,
}

/// Parsed test file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestFile {
    /// Instrumentation header, present when the file was instrumented
    pub header: Option<Header>,
    /// Imports in declaration order
    pub imports: Vec<Import>,
    /// Tests in declaration order
    pub tests: Vec<TestSpec>,
}

impl TestFile {
    /// Parse test file text; `path` is used for error messages only
    pub fn parse(text: &str, path: &Path) -> CoverResult<Self> {
        let mut file = Self::default();
        let error = |line: usize, message: String| CoverError::Parse {
            path: path.to_path_buf(),
            line: line as u32 + 1,
            message,
        };

        let mut pending: Vec<Probe> = Vec::new();
        for (index, raw) in text.lines().enumerate() {
            if index == 0 {
                file.header = parse_header(raw, path)?;
            }
            let line = raw.trim();
            if let Some(rest) = line.strip_prefix(PROBE_PREFIX) {
                pending.push(parse_probe(rest).map_err(|message| error(index, message))?);
                continue;
            }
            if line.is_empty() || line.starts_with("//") {
                continue;
            }
            let (keyword, rest) = line.split_once(' ').unwrap_or((line, ""));
            let rest = rest.trim();

            match keyword {
                "use" => {
                    let (module, alias) = rest
                        .rsplit_once(" as ")
                        .map(|(m, a)| (m.trim(), a.trim()))
                        .filter(|(m, a)| !m.is_empty() && is_identifier(a))
                        .ok_or_else(|| error(index, format!("expected 'use PATH as ALIAS', got '{line}'")))?;
                    file.imports.push(Import {
                        module: PathBuf::from(module),
                        alias: alias.to_string(),
                        counters: std::mem::take(&mut pending),
                    });
                }
                "test" => {
                    if rest.is_empty() {
                        return Err(error(index, "test needs a name".to_string()));
                    }
                    file.tests.push(TestSpec {
                        name: rest.to_string(),
                        steps: pending.drain(..).map(Step::Record).collect(),
                    });
                }
                "call" | "fail" => {
                    let step = if keyword == "fail" {
                        Step::Fail(rest.to_string())
                    } else {
                        parse_call(rest).ok_or_else(|| {
                            error(index, format!("expected 'call ALIAS.FN [true|false]', got '{line}'"))
                        })?
                    };
                    let steps = &mut file
                        .tests
                        .last_mut()
                        .ok_or_else(|| error(index, format!("'{keyword}' outside of a test")))?
                        .steps;
                    steps.extend(pending.drain(..).map(Step::Record));
                    steps.push(step);
                }
                other => return Err(error(index, format!("unknown directive '{other}'"))),
            }
        }
        if let Some(test) = file.tests.last_mut() {
            test.steps.extend(pending.drain(..).map(Step::Record));
        }
        Ok(file)
    }
}

fn parse_call(rest: &str) -> Option<Step> {
    let mut parts = rest.split_whitespace();
    let target = parts.next()?;
    let arg = match parts.next() {
        None | Some("false") => false,
        Some("true") => true,
        Some(_) => return None,
    };
    if parts.next().is_some() {
        return None;
    }
    let (alias, function) = target.split_once('.')?;
    (is_identifier(alias) && is_identifier(function)).then(|| Step::Call {
        alias: alias.to_string(),
        function: function.to_string(),
        arg,
    })
}
