//! Coverage data model and live aggregation.
//!
//! ```text
//! instrumented code ──probe──► CoverageSink ──► CoverageAggregator (live map)
//!                                                      │
//!                                   backfill ─► remap ─► report
//! ```

mod aggregator;
mod file;
mod map;
mod summary;

pub use aggregator::{CoverageAggregator, CoverageSink, CoverageVariable};
pub use file::{BranchMeta, FileCoverage, FunctionMeta, Position, Probe, Range};
pub use map::CoverageMap;
pub use summary::{CoverageSummary, Metric};
