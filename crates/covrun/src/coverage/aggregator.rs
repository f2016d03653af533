//! Live hit-count state of a run.

use super::file::{FileCoverage, Probe};
use super::map::CoverageMap;
use crate::path::CanonicalPath;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use uuid::Uuid;

/// Process-unique token naming a run's coverage slot.
///
/// Instrumented text carries the token so a loader can tell which run the
/// code was instrumented for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CoverageVariable(String);

impl CoverageVariable {
    /// Generate a fresh token
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("$$cov_{}$$", Uuid::new_v4().simple()))
    }

    /// Use a fixed token
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The token
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CoverageVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Owner of the live coverage map
#[derive(Debug)]
pub struct CoverageAggregator {
    variable: CoverageVariable,
    state: Rc<RefCell<CoverageMap>>,
    initialized: bool,
}

impl CoverageAggregator {
    /// Create an aggregator with a fresh coverage variable
    #[must_use]
    pub fn new() -> Self {
        Self::with_variable(CoverageVariable::generate())
    }

    /// Create an aggregator with a given coverage variable
    #[must_use]
    pub fn with_variable(variable: CoverageVariable) -> Self {
        Self {
            variable,
            state: Rc::new(RefCell::new(CoverageMap::new())),
            initialized: false,
        }
    }

    /// Reset the live map to empty.
    ///
    /// Only the first call has an effect; later calls leave collected hits
    /// untouched.
    pub fn initialize(&mut self) {
        if self.initialized {
            return;
        }
        *self.state.borrow_mut() = CoverageMap::new();
        self.initialized = true;
    }

    /// Check if the slot has been initialized
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// The run's coverage variable
    #[must_use]
    pub fn variable(&self) -> &CoverageVariable {
        &self.variable
    }

    /// Handle for instrumented code to report into
    #[must_use]
    pub fn sink(&self) -> CoverageSink {
        CoverageSink {
            variable: self.variable.clone(),
            state: Rc::clone(&self.state),
        }
    }

    /// Check if nothing has been recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.borrow().is_empty()
    }

    /// Copy of the live map
    #[must_use]
    pub fn snapshot(&self) -> CoverageMap {
        self.state.borrow().clone()
    }

    /// Move the live map out, leaving an empty one behind
    #[must_use]
    pub fn take(&self) -> CoverageMap {
        std::mem::take(&mut *self.state.borrow_mut())
    }
}

impl Default for CoverageAggregator {
    fn default() -> Self {
        Self::new()
    }
}

/// Cloneable handle through which instrumented code records hits
#[derive(Debug, Clone)]
pub struct CoverageSink {
    variable: CoverageVariable,
    state: Rc<RefCell<CoverageMap>>,
}

impl CoverageSink {
    /// Coverage variable this sink belongs to
    #[must_use]
    pub fn variable(&self) -> &CoverageVariable {
        &self.variable
    }

    /// Create the entry for a file on first touch; an existing entry wins
    pub fn register(&self, coverage: FileCoverage) {
        let path = coverage.path.clone();
        if self.state.borrow_mut().insert_new(coverage) {
            tracing::debug!(file = %path, "coverage entry created");
        }
    }

    /// Increment one counter of one file
    pub fn hit(&self, path: &CanonicalPath, probe: Probe) {
        let mut state = self.state.borrow_mut();
        match state.get_mut(path) {
            Some(coverage) => {
                if !coverage.hit(probe) {
                    tracing::debug!(file = %path, ?probe, "probe id not in coverage entry");
                }
            }
            None => tracing::debug!(file = %path, ?probe, "probe for unregistered file"),
        }
    }
}
