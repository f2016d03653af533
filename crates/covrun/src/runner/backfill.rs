//! Zero-coverage entries for in-scope files that were never loaded.

use crate::coverage::{CoverageMap, FileCoverage};
use crate::instrument::Transformer;
use crate::matcher::{MatchIndex, SourceFile};
use crate::result::{CoverError, CoverResult};
use std::fs;
use std::path::PathBuf;

/// Outcome of a backfill pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackfillSummary {
    /// Entries synthesized
    pub filled: usize,
    /// Files that could not be backfilled, with the reason
    pub failures: Vec<(PathBuf, String)>,
}

/// Add an all-zero entry to `map` for every file of `index` it lacks.
///
/// A file that cannot be read or instrumented is logged and skipped.
pub fn backfill(index: &MatchIndex, transformer: &Transformer, map: &mut CoverageMap, verbose: bool) -> BackfillSummary {
    let mut summary = BackfillSummary::default();

    for file in index.files() {
        if map.contains(&file.canonical) {
            continue;
        }
        match unexecuted_entry(file, transformer) {
            Ok(coverage) => {
                let _ = map.insert_new(coverage);
                summary.filled += 1;
                if verbose {
                    tracing::info!(file = %file.canonical, "backfilled");
                } else {
                    tracing::debug!(file = %file.canonical, "backfilled");
                }
            }
            Err(e) => {
                tracing::warn!(file = %file.path.display(), error = %e, "backfill failed");
                summary.failures.push((file.path.clone(), e.to_string()));
            }
        }
    }
    summary
}

fn unexecuted_entry(file: &SourceFile, transformer: &Transformer) -> CoverResult<FileCoverage> {
    let code = fs::read_to_string(&file.path).map_err(|e| CoverError::load(&file.path, e.to_string()))?;
    let mut coverage = transformer.transform(&code, &file.path)?.coverage;
    // Declarations come out of the instrumenter pre-counted.
    coverage.reset_hits();
    coverage.path = file.canonical.clone();
    Ok(coverage)
}
