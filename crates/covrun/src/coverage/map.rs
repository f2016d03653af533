//! Coverage map keyed by canonical file path.

use super::file::FileCoverage;
use super::summary::CoverageSummary;
use crate::path::CanonicalPath;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Canonical path -> per-file coverage, ordered for deterministic reports
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CoverageMap {
    files: BTreeMap<CanonicalPath, FileCoverage>,
}

impl CoverageMap {
    /// Create an empty map
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if no file has been recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Number of files
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Check if `path` has an entry
    #[must_use]
    pub fn contains(&self, path: &CanonicalPath) -> bool {
        self.files.contains_key(path)
    }

    /// Coverage of one file
    #[must_use]
    pub fn get(&self, path: &CanonicalPath) -> Option<&FileCoverage> {
        self.files.get(path)
    }

    /// Mutable coverage of one file
    pub fn get_mut(&mut self, path: &CanonicalPath) -> Option<&mut FileCoverage> {
        self.files.get_mut(path)
    }

    /// Insert a record under its own path unless one already exists.
    ///
    /// Returns `true` when the record was inserted.
    pub fn insert_new(&mut self, coverage: FileCoverage) -> bool {
        if self.files.contains_key(&coverage.path) {
            return false;
        }
        let _ = self.files.insert(coverage.path.clone(), coverage);
        true
    }

    /// Add a record, merging counters into an existing entry for the same path
    pub fn add_file_coverage(&mut self, coverage: FileCoverage) {
        match self.files.get_mut(&coverage.path) {
            Some(existing) => existing.merge(&coverage),
            None => {
                let _ = self.files.insert(coverage.path.clone(), coverage);
            }
        }
    }

    /// Merge every record of `other` into this map
    pub fn merge(&mut self, other: Self) {
        for coverage in other.files.into_values() {
            self.add_file_coverage(coverage);
        }
    }

    /// Paths in order
    pub fn files(&self) -> impl Iterator<Item = &CanonicalPath> {
        self.files.keys()
    }

    /// Records in path order
    pub fn iter(&self) -> impl Iterator<Item = (&CanonicalPath, &FileCoverage)> {
        self.files.iter()
    }

    /// Summary per file
    #[must_use]
    pub fn file_summaries(&self) -> BTreeMap<CanonicalPath, CoverageSummary> {
        self.files
            .iter()
            .map(|(path, cov)| (path.clone(), cov.summary()))
            .collect()
    }

    /// Summary over all files
    #[must_use]
    pub fn summary(&self) -> CoverageSummary {
        let mut total = CoverageSummary::default();
        for cov in self.files.values() {
            total.merge(&cov.summary());
        }
        total
    }
}

impl IntoIterator for CoverageMap {
    type Item = (CanonicalPath, FileCoverage);
    type IntoIter = std::collections::btree_map::IntoIter<CanonicalPath, FileCoverage>;

    fn into_iter(self) -> Self::IntoIter {
        self.files.into_iter()
    }
}

impl FromIterator<FileCoverage> for CoverageMap {
    fn from_iter<I: IntoIterator<Item = FileCoverage>>(iter: I) -> Self {
        let mut map = Self::new();
        for coverage in iter {
            map.add_file_coverage(coverage);
        }
        map
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::coverage::{Probe, Range};
    use crate::path::CaseFolding;

    fn file(path: &str, hits: u32) -> FileCoverage {
        let mut cov = FileCoverage::new(CanonicalPath::new(path, CaseFolding::Sensitive));
        let id = cov.add_statement(Range::on_line(1, 0, 4));
        for _ in 0..hits {
            let _ = cov.hit(Probe::Statement(id));
        }
        cov
    }

    #[test]
    fn test_insert_new_keeps_first() {
        let mut map = CoverageMap::new();
        assert!(map.insert_new(file("/a.js", 2)));
        assert!(!map.insert_new(file("/a.js", 0)));
        let key = CanonicalPath::new("/a.js", CaseFolding::Sensitive);
        assert_eq!(map.get(&key).unwrap().s[&0], 2);
    }

    #[test]
    fn test_add_file_coverage_merges() {
        let mut map = CoverageMap::new();
        map.add_file_coverage(file("/a.js", 2));
        map.add_file_coverage(file("/a.js", 3));
        map.add_file_coverage(file("/b.js", 0));
        assert_eq!(map.len(), 2);
        let key = CanonicalPath::new("/a.js", CaseFolding::Sensitive);
        assert_eq!(map.get(&key).unwrap().s[&0], 5);
    }

    #[test]
    fn test_files_are_ordered() {
        let map: CoverageMap = vec![file("/c.js", 0), file("/a.js", 1)].into_iter().collect();
        let paths: Vec<_> = map.files().map(CanonicalPath::as_str).collect();
        assert_eq!(paths, vec!["/a.js", "/c.js"]);
    }

    #[test]
    fn test_summary_totals() {
        let map: CoverageMap = vec![file("/a.js", 1), file("/b.js", 0)].into_iter().collect();
        let summary = map.summary();
        assert_eq!(summary.statements.total, 2);
        assert_eq!(summary.statements.covered, 1);
        assert_eq!(map.file_summaries().len(), 2);
    }

    #[test]
    fn test_serializes_as_object_keyed_by_path() {
        let map: CoverageMap = vec![file("/a.js", 1)].into_iter().collect();
        let json = serde_json::to_value(&map).unwrap();
        assert_eq!(json["/a.js"]["s"]["0"], 1);
    }
}
