//! Test engine contract.

use crate::hook::SourceProvider;
use crate::path::CanonicalPath;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

/// Result of running a single test
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestResult {
    /// Test name
    pub name: String,
    /// Whether test passed
    pub passed: bool,
    /// Error message if failed
    pub error: Option<String>,
    /// Test duration
    pub duration: Duration,
}

impl TestResult {
    /// Create a passing test result
    #[must_use]
    pub fn pass(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: true,
            error: None,
            duration: Duration::ZERO,
        }
    }

    /// Create a failing test result
    #[must_use]
    pub fn fail(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: false,
            error: Some(error.into()),
            duration: Duration::ZERO,
        }
    }

    /// Set duration
    #[must_use]
    pub const fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }
}

/// Results of one test file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuiteResults {
    /// Test file the results belong to
    pub file: PathBuf,
    /// Individual test results
    pub results: Vec<TestResult>,
    /// Total duration
    pub duration: Duration,
}

impl SuiteResults {
    /// Check if all tests passed
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.results.iter().all(|r| r.passed)
    }

    /// Count passed tests
    #[must_use]
    pub fn passed_count(&self) -> usize {
        self.results.iter().filter(|r| r.passed).count()
    }

    /// Count failed tests
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.results.iter().filter(|r| !r.passed).count()
    }

    /// Get total test count
    #[must_use]
    pub fn total(&self) -> usize {
        self.results.len()
    }

    /// Get failed tests
    #[must_use]
    pub fn failures(&self) -> Vec<&TestResult> {
        self.results.iter().filter(|r| !r.passed).collect()
    }
}

/// One-shot callback run after the last test.
///
/// Clones share the same slot: whichever clone fires first runs the callback,
/// later calls are no-ops.
#[derive(Clone)]
pub struct SuiteHook {
    slot: Rc<RefCell<Option<Box<dyn FnOnce()>>>>,
}

impl SuiteHook {
    /// Wrap a callback
    pub fn new(callback: impl FnOnce() + 'static) -> Self {
        Self {
            slot: Rc::new(RefCell::new(Some(Box::new(callback)))),
        }
    }

    /// Run the callback if it has not run yet; returns whether it ran
    pub fn fire(&self) -> bool {
        // Taken before the call so a re-entrant fire sees an empty slot.
        let callback = self.slot.borrow_mut().take();
        match callback {
            Some(callback) => {
                callback();
                true
            }
            None => false,
        }
    }

    /// Check if the callback already ran
    #[must_use]
    pub fn has_fired(&self) -> bool {
        self.slot.borrow().is_none()
    }
}

impl fmt::Debug for SuiteHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SuiteHook")
            .field("fired", &self.has_fired())
            .finish()
    }
}

/// A test-execution engine
pub trait TestEngine: fmt::Debug {
    /// Queue a test file
    fn add_file(&mut self, path: PathBuf);

    /// Register a callback to run once after all tests complete
    fn after_all(&mut self, hook: SuiteHook);

    /// Drop a cached module so the next load reads it again; returns whether
    /// it was cached
    fn evict_module(&mut self, path: &CanonicalPath) -> bool;

    /// Run every queued file, loading modules through `provider`; returns
    /// the number of failed tests
    fn run(&mut self, provider: &dyn SourceProvider) -> usize;
}

/// Module cache keyed by canonical path
#[derive(Debug, Clone)]
pub struct ModuleCache<T> {
    entries: HashMap<CanonicalPath, T>,
}

impl<T> ModuleCache<T> {
    /// Create an empty cache
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Cached entry for `path`
    #[must_use]
    pub fn get(&self, path: &CanonicalPath) -> Option<&T> {
        self.entries.get(path)
    }

    /// Cache an entry, replacing any previous one
    pub fn insert(&mut self, path: CanonicalPath, entry: T) {
        let _ = self.entries.insert(path, entry);
    }

    /// Remove an entry; returns whether it existed
    pub fn evict(&mut self, path: &CanonicalPath) -> bool {
        self.entries.remove(path).is_some()
    }

    /// Number of cached modules
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if nothing is cached
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T> Default for ModuleCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::path::CaseFolding;
    use std::cell::Cell;

    #[test]
    fn test_suite_hook_fires_once_across_clones() {
        let count = Rc::new(Cell::new(0));
        let counter = Rc::clone(&count);
        let hook = SuiteHook::new(move || counter.set(counter.get() + 1));
        let clone = hook.clone();

        assert!(!hook.has_fired());
        assert!(clone.fire());
        assert!(!hook.fire());
        assert!(hook.has_fired());
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn test_suite_hook_reentrant_fire_is_noop() {
        let inner: Rc<RefCell<Option<SuiteHook>>> = Rc::new(RefCell::new(None));
        let observed = Rc::new(Cell::new(true));
        let (slot, seen) = (Rc::clone(&inner), Rc::clone(&observed));
        let hook = SuiteHook::new(move || {
            if let Some(hook) = slot.borrow().as_ref() {
                seen.set(hook.fire());
            }
        });
        *inner.borrow_mut() = Some(hook.clone());
        assert!(hook.fire());
        assert!(!observed.get());
    }

    #[test]
    fn test_suite_results_counts() {
        let suite = SuiteResults {
            file: PathBuf::from("a.test.js"),
            results: vec![
                TestResult::pass("one"),
                TestResult::fail("two", "boom").with_duration(Duration::from_millis(3)),
            ],
            duration: Duration::ZERO,
        };
        assert!(!suite.all_passed());
        assert_eq!(suite.passed_count(), 1);
        assert_eq!(suite.failed_count(), 1);
        assert_eq!(suite.total(), 2);
        assert_eq!(suite.failures()[0].error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_module_cache_evict() {
        let mut cache = ModuleCache::new();
        let path = CanonicalPath::new("/src/a.js", CaseFolding::Sensitive);
        cache.insert(path.clone(), 7);
        assert_eq!(cache.get(&path), Some(&7));
        assert!(cache.evict(&path));
        assert!(!cache.evict(&path));
        assert!(cache.is_empty());
    }
}
