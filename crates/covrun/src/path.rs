//! Canonical path handling.
//!
//! Every comparison between a discovered source file, a path requested by the
//! loader and a key of the coverage map goes through [`CanonicalPath`], so the
//! case-folding policy is decided in exactly one place.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Case-folding policy applied when canonicalizing paths
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaseFolding {
    /// Paths differing only in case are different files
    Sensitive,
    /// Paths differing only in case name the same file
    Insensitive,
}

impl CaseFolding {
    /// Policy of the host platform
    #[must_use]
    pub const fn platform() -> Self {
        if cfg!(windows) {
            Self::Insensitive
        } else {
            Self::Sensitive
        }
    }

    /// Check if this policy folds case
    #[must_use]
    pub const fn is_insensitive(self) -> bool {
        matches!(self, Self::Insensitive)
    }
}

impl Default for CaseFolding {
    fn default() -> Self {
        Self::platform()
    }
}

/// Absolute, lexically normalized, `/`-separated path string
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalPath(String);

impl CanonicalPath {
    /// Canonicalize `path` under the given folding policy.
    ///
    /// Normalization is purely lexical: `.` segments and repeated separators
    /// are dropped, `..` pops the previous segment. The filesystem is never
    /// consulted, so paths of files that do not exist yet canonicalize too.
    #[must_use]
    pub fn new(path: impl AsRef<Path>, folding: CaseFolding) -> Self {
        let raw = path.as_ref().to_string_lossy();
        let raw = if cfg!(windows) {
            raw.replace('\\', "/")
        } else {
            raw.into_owned()
        };

        let absolute = raw.starts_with('/');
        let mut segments: Vec<&str> = Vec::new();
        for segment in raw.split('/') {
            match segment {
                "" | "." => {}
                ".." => {
                    if matches!(segments.last(), Some(last) if *last != "..") {
                        let _ = segments.pop();
                    } else if !absolute {
                        segments.push(segment);
                    }
                }
                other => segments.push(other),
            }
        }

        let mut normalized = String::with_capacity(raw.len());
        if absolute {
            normalized.push('/');
        }
        normalized.push_str(&segments.join("/"));

        if folding.is_insensitive() {
            normalized = normalized.to_lowercase();
        }
        Self(normalized)
    }

    /// The canonical string
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The canonical string as a filesystem path
    #[must_use]
    pub fn to_path_buf(&self) -> PathBuf {
        PathBuf::from(&self.0)
    }

    /// Directory containing this path, if any
    #[must_use]
    pub fn parent(&self) -> Option<PathBuf> {
        Path::new(&self.0).parent().map(Path::to_path_buf)
    }
}

impl fmt::Display for CanonicalPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CanonicalPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
