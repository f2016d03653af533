//! Module source interception.
//!
//! Engines load module text through a [`SourceProvider`]. The harness hands
//! them a [`HookedProvider`], which forwards to the real provider and, while a
//! [`LoadHook`] is installed, substitutes instrumented text for in-scope
//! files.

use crate::coverage::CoverageSink;
use crate::instrument::Transformer;
use crate::matcher::MatchIndex;
use crate::path::CanonicalPath;
use crate::result::{CoverError, CoverResult};
use std::cell::RefCell;
use std::fmt;
use std::fs;
use std::path::Path;
use std::rc::Rc;

/// Module text handed to an engine
#[derive(Debug, Clone)]
pub struct LoadedSource {
    /// Text to execute
    pub text: String,
    /// Sink for probe hits, present when the text was instrumented this run
    pub coverage: Option<CoverageSink>,
}

impl LoadedSource {
    /// Uninstrumented text
    #[must_use]
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            coverage: None,
        }
    }
}

/// Supplies module text by path
pub trait SourceProvider: fmt::Debug {
    /// Load the module at `path`
    fn load(&self, path: &Path) -> CoverResult<LoadedSource>;
}

/// Reads modules from the filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct FsSourceProvider;

impl SourceProvider for FsSourceProvider {
    fn load(&self, path: &Path) -> CoverResult<LoadedSource> {
        fs::read_to_string(path)
            .map(LoadedSource::plain)
            .map_err(|e| CoverError::load(path, e.to_string()))
    }
}

/// Interception installed for the duration of a coverage run
#[derive(Debug)]
pub struct LoadHook {
    matcher: Rc<MatchIndex>,
    transformer: Transformer,
    sink: CoverageSink,
    verbose: bool,
}

impl LoadHook {
    /// Create a hook
    #[must_use]
    pub fn new(matcher: Rc<MatchIndex>, transformer: Transformer, sink: CoverageSink, verbose: bool) -> Self {
        Self {
            matcher,
            transformer,
            sink,
            verbose,
        }
    }

    /// Instrument `source` when `path` is in scope
    pub fn apply(&self, path: &Path, source: LoadedSource) -> CoverResult<LoadedSource> {
        let canonical = CanonicalPath::new(path, self.transformer.folding());
        if !self.matcher.contains(&canonical) {
            return Ok(source);
        }

        let instrumented = self.transformer.transform(&source.text, path)?;
        if self.verbose {
            tracing::info!(file = %canonical, "instrumented");
        } else {
            tracing::debug!(file = %canonical, "instrumented");
        }
        Ok(LoadedSource {
            text: instrumented.code,
            coverage: Some(self.sink.clone()),
        })
    }
}

/// Source provider with an installable [`LoadHook`].
///
/// Nothing is cached here; every load goes to the wrapped provider.
#[derive(Debug)]
pub struct HookedProvider {
    inner: Box<dyn SourceProvider>,
    hook: RefCell<Option<LoadHook>>,
}

impl HookedProvider {
    /// Wrap a provider
    #[must_use]
    pub fn new(inner: Box<dyn SourceProvider>) -> Self {
        Self {
            inner,
            hook: RefCell::new(None),
        }
    }

    /// Install the hook; fails if one is already installed
    pub fn install(&self, hook: LoadHook) -> CoverResult<()> {
        let mut slot = self.hook.borrow_mut();
        if slot.is_some() {
            return Err(CoverError::invalid_state("a load hook is already installed"));
        }
        *slot = Some(hook);
        Ok(())
    }

    /// Remove the hook, returning whether one was installed
    pub fn uninstall(&self) -> bool {
        self.hook.borrow_mut().take().is_some()
    }

    /// Check if a hook is installed
    #[must_use]
    pub fn is_installed(&self) -> bool {
        self.hook.borrow().is_some()
    }
}

impl Default for HookedProvider {
    fn default() -> Self {
        Self::new(Box::new(FsSourceProvider))
    }
}

impl SourceProvider for HookedProvider {
    fn load(&self, path: &Path) -> CoverResult<LoadedSource> {
        let source = self.inner.load(path)?;
        match self.hook.borrow().as_ref() {
            Some(hook) => hook.apply(path, source),
            None => Ok(source),
        }
    }
}
