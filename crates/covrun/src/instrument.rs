//! Instrumentation adapter.
//!
//! The [`Instrumenter`] trait is the contract with the instrumentation
//! engine: raw text in, instrumented text plus the file's coverage descriptor
//! out. [`Transformer`] wraps an instrumenter with source-map discovery and
//! path canonicalization.

use crate::coverage::{CoverageVariable, FileCoverage};
use crate::path::{CanonicalPath, CaseFolding};
use crate::result::CoverResult;
use crate::sourcemap::SourceMap;
use std::fmt;
use std::path::Path;
use std::rc::Rc;

/// Output of one instrumentation pass
#[derive(Debug, Clone, PartialEq)]
pub struct Instrumented {
    /// Instrumented source text
    pub code: String,
    /// Coverage descriptor with every counter at its initial value
    pub coverage: FileCoverage,
}

/// Instrumentation engine contract.
///
/// Implementations must be deterministic: the same input produces
/// byte-identical output.
pub trait Instrumenter: fmt::Debug {
    /// Instrument `code` belonging to `file`, recording hits under `variable`
    fn instrument(
        &self,
        code: &str,
        file: &CanonicalPath,
        variable: &CoverageVariable,
        source_map: Option<&SourceMap>,
    ) -> CoverResult<Instrumented>;
}

/// Turns raw module text into instrumented text for one run
#[derive(Debug, Clone)]
pub struct Transformer {
    instrumenter: Rc<dyn Instrumenter>,
    variable: CoverageVariable,
    folding: CaseFolding,
}

impl Transformer {
    /// Create a transformer
    #[must_use]
    pub fn new(
        instrumenter: Rc<dyn Instrumenter>,
        variable: CoverageVariable,
        folding: CaseFolding,
    ) -> Self {
        Self {
            instrumenter,
            variable,
            folding,
        }
    }

    /// Case-folding policy applied to file identifiers
    #[must_use]
    pub const fn folding(&self) -> CaseFolding {
        self.folding
    }

    /// Instrument `code` loaded from `path`.
    ///
    /// An adjacent `<path>.map` is picked up when present; a missing or
    /// malformed map is not an error.
    pub fn transform(&self, code: &str, path: &Path) -> CoverResult<Instrumented> {
        let source_map = SourceMap::load_adjacent(path);
        let file = CanonicalPath::new(path, self.folding);
        self.instrumenter
            .instrument(code, &file, &self.variable, source_map.as_ref())
    }
}
