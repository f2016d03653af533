//! Source file matching.
//!
//! Resolves the set of in-scope source files once per run: every `*.js`
//! file under the source root that no ignore pattern excludes.

use crate::path::{CanonicalPath, CaseFolding};
use crate::result::{CoverError, CoverResult};
use glob::{MatchOptions, Pattern};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Extension glob of source files
pub const SOURCE_PATTERN: &str = "**/*.js";

/// One in-scope file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Canonical identity used for membership and coverage keys
    pub canonical: CanonicalPath,
    /// Path as found on disk
    pub path: PathBuf,
}

/// Membership index of in-scope source files
#[derive(Debug, Clone)]
pub struct MatchIndex {
    root: PathBuf,
    folding: CaseFolding,
    members: HashSet<CanonicalPath>,
    files: Vec<SourceFile>,
}

impl MatchIndex {
    /// Scan `root` for source files, excluding `ignore_patterns`.
    ///
    /// Ignore patterns are matched against the path relative to `root`.
    pub fn build(root: &Path, ignore_patterns: &[String], folding: CaseFolding) -> CoverResult<Self> {
        let ignores = ignore_patterns
            .iter()
            .map(|p| {
                Pattern::new(p).map_err(|e| {
                    CoverError::configuration(format!("invalid ignore pattern '{p}': {e}"))
                })
            })
            .collect::<CoverResult<Vec<_>>>()?;
        let options = MatchOptions {
            case_sensitive: !folding.is_insensitive(),
            require_literal_separator: true,
            require_literal_leading_dot: false,
        };

        let pattern = format!(
            "{}/{}",
            Pattern::escape(&root.to_string_lossy()),
            SOURCE_PATTERN
        );
        let entries = glob::glob(&pattern).map_err(|e| {
            CoverError::discovery(format!("invalid source pattern '{pattern}': {e}"))
        })?;

        let mut index = Self {
            root: root.to_path_buf(),
            folding,
            members: HashSet::new(),
            files: Vec::new(),
        };

        for entry in entries {
            let path = entry.map_err(|e| {
                CoverError::discovery(format!("scanning {}: {e}", root.display()))
            })?;
            if !path.is_file() {
                continue;
            }
            let relative = path.strip_prefix(root).unwrap_or(&path);
            if ignores.iter().any(|p| p.matches_path_with(relative, options)) {
                tracing::debug!(file = %relative.display(), "excluded by ignore pattern");
                continue;
            }
            index.insert(path);
        }

        index.files.sort_by(|a, b| a.canonical.cmp(&b.canonical));
        tracing::debug!(root = %root.display(), files = index.files.len(), "source files matched");
        Ok(index)
    }

    /// Build an index from an explicit file list
    #[must_use]
    pub fn from_files(root: &Path, files: impl IntoIterator<Item = PathBuf>, folding: CaseFolding) -> Self {
        let mut index = Self {
            root: root.to_path_buf(),
            folding,
            members: HashSet::new(),
            files: Vec::new(),
        };
        for path in files {
            index.insert(path);
        }
        index.files.sort_by(|a, b| a.canonical.cmp(&b.canonical));
        index
    }

    fn insert(&mut self, path: PathBuf) {
        let canonical = CanonicalPath::new(&path, self.folding);
        if self.members.insert(canonical.clone()) {
            self.files.push(SourceFile { canonical, path });
        }
    }

    /// Check membership of an already canonical path
    #[must_use]
    pub fn contains(&self, path: &CanonicalPath) -> bool {
        self.members.contains(path)
    }

    /// Canonicalize `path` and check membership
    #[must_use]
    pub fn matches(&self, path: &Path) -> bool {
        self.contains(&CanonicalPath::new(path, self.folding))
    }

    /// All in-scope files, sorted by canonical path
    #[must_use]
    pub fn files(&self) -> &[SourceFile] {
        &self.files
    }

    /// Number of in-scope files
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Check if nothing is in scope
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Source root the index was built from
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Folding policy of the index
    #[must_use]
    pub const fn folding(&self) -> CaseFolding {
        self.folding
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::fs;

    fn tree(files: &[&str]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for file in files {
            let path = dir.path().join(file);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, "work\n").unwrap();
        }
        dir
    }

    #[test]
    fn test_matches_js_files_recursively() {
        let dir = tree(&["a.js", "lib/b.js", "lib/deep/c.js", "notes.txt"]);
        let index = MatchIndex::build(dir.path(), &[], CaseFolding::Sensitive).unwrap();
        assert_eq!(index.len(), 3);
        assert!(index.matches(&dir.path().join("lib/deep/c.js")));
        assert!(!index.matches(&dir.path().join("notes.txt")));
    }

    #[test]
    fn test_ignore_patterns_exclude_files() {
        let dir = tree(&["a.js", "b.js", "vendor/x.js", "lib/vendor/y.js"]);
        let ignores = vec!["b.js".to_string(), "**/vendor/**".to_string()];
        let index = MatchIndex::build(dir.path(), &ignores, CaseFolding::Sensitive).unwrap();
        let names: Vec<_> = index
            .files()
            .iter()
            .map(|f| f.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.js".to_string()]);
    }

    #[test]
    fn test_single_star_does_not_cross_directories() {
        let dir = tree(&["a.js", "lib/b.js"]);
        let ignores = vec!["*.js".to_string()];
        let index = MatchIndex::build(dir.path(), &ignores, CaseFolding::Sensitive).unwrap();
        assert_eq!(index.len(), 1);
        assert!(index.matches(&dir.path().join("lib/b.js")));
    }

    #[test]
    fn test_invalid_ignore_pattern_is_configuration_error() {
        let dir = tree(&["a.js"]);
        let err = MatchIndex::build(dir.path(), &["[".to_string()], CaseFolding::Sensitive)
            .unwrap_err();
        assert!(matches!(err, CoverError::Configuration { .. }));
    }

    #[test]
    fn test_missing_root_matches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let index =
            MatchIndex::build(&dir.path().join("absent"), &[], CaseFolding::Sensitive).unwrap();
        assert!(index.is_empty());
    }

    #[test]
    fn test_case_insensitive_membership() {
        let index = MatchIndex::from_files(
            Path::new("/proj/src"),
            vec![PathBuf::from("/proj/src/Widget.js")],
            CaseFolding::Insensitive,
        );
        assert!(index.matches(Path::new("/PROJ/SRC/widget.js")));
        assert!(index.matches(Path::new("/proj/src/lib/../Widget.js")));
    }

    #[test]
    fn test_case_sensitive_membership() {
        let index = MatchIndex::from_files(
            Path::new("/proj/src"),
            vec![PathBuf::from("/proj/src/Widget.js")],
            CaseFolding::Sensitive,
        );
        assert!(!index.matches(Path::new("/proj/src/widget.js")));
        assert!(index.matches(Path::new("/proj/src/Widget.js")));
    }

    #[test]
    fn test_duplicate_paths_collapse() {
        let index = MatchIndex::from_files(
            Path::new("/p"),
            vec![PathBuf::from("/p/A.js"), PathBuf::from("/p/a.js")],
            CaseFolding::Insensitive,
        );
        assert_eq!(index.len(), 1);
    }
}
