//! Result and error types for covrun.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for covrun operations
pub type CoverResult<T> = Result<T, CoverError>;

/// Errors that can occur while running an instrumented suite
#[derive(Debug, Error)]
pub enum CoverError {
    /// A required option is missing or invalid
    #[error("Configuration error: {message}")]
    Configuration {
        /// Error message
        message: String,
    },

    /// Test or source files could not be located
    #[error("Discovery failed: {message}")]
    Discovery {
        /// Error message
        message: String,
    },

    /// Operation called in the wrong lifecycle state
    #[error("Invalid state: {message}")]
    InvalidState {
        /// Error message
        message: String,
    },

    /// The instrumenter rejected a file
    #[error("Instrumentation of {} failed: {message}", path.display())]
    Instrument {
        /// File being instrumented
        path: PathBuf,
        /// Error message
        message: String,
    },

    /// Script text could not be parsed
    #[error("Parse error in {}:{line}: {message}", path.display())]
    Parse {
        /// File being parsed
        path: PathBuf,
        /// 1-based line number
        line: u32,
        /// Error message
        message: String,
    },

    /// Malformed source map
    #[error("Source map error: {message}")]
    SourceMap {
        /// Error message
        message: String,
    },

    /// A module could not be loaded or executed
    #[error("Failed to load {}: {message}", path.display())]
    Load {
        /// Module path
        path: PathBuf,
        /// Error message
        message: String,
    },

    /// A report renderer failed
    #[error("Report {format} failed: {message}")]
    Render {
        /// Report format identifier
        format: String,
        /// Error message
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid glob pattern
    #[error("Invalid pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    /// Directory scan error
    #[error("Directory scan failed: {0}")]
    Glob(#[from] glob::GlobError),

    /// Report file could not be moved into place
    #[error("Failed to persist report: {0}")]
    Persist(#[from] tempfile::PersistError),
}

impl CoverError {
    /// Create a configuration error
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a discovery error
    #[must_use]
    pub fn discovery(message: impl Into<String>) -> Self {
        Self::Discovery {
            message: message.into(),
        }
    }

    /// Create an invalid state error
    #[must_use]
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Create a module load error
    #[must_use]
    pub fn load(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Load {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Whether this error aborts a run before any test executes
    #[must_use]
    pub const fn is_setup_failure(&self) -> bool {
        matches!(
            self,
            Self::Configuration { .. } | Self::Discovery { .. } | Self::Pattern(_) | Self::Glob(_)
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_error() {
        let err = CoverError::configuration("relativeSourcePath must be defined");
        assert!(err.to_string().contains("Configuration"));
        assert!(err.to_string().contains("relativeSourcePath"));
        assert!(err.is_setup_failure());
    }

    #[test]
    fn test_discovery_error() {
        let err = CoverError::discovery("unreadable directory");
        assert!(err.to_string().contains("Discovery"));
        assert!(err.is_setup_failure());
    }

    #[test]
    fn test_load_error_names_path() {
        let err = CoverError::load("/src/a.js", "boom");
        assert!(err.to_string().contains("/src/a.js"));
        assert!(!err.is_setup_failure());
    }

    #[test]
    fn test_parse_error_names_line() {
        let err = CoverError::Parse {
            path: PathBuf::from("a.js"),
            line: 7,
            message: "unbalanced '}'".to_string(),
        };
        assert!(err.to_string().contains("a.js:7"));
    }

    #[test]
    fn test_io_error_from() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: CoverError = io_err.into();
        assert!(err.to_string().contains("I/O"));
    }
}
