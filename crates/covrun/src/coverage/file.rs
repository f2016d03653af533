//! Per-file coverage records.
//!
//! The serialized layout follows the istanbul `coverage-final.json` schema so
//! reports can be consumed by existing tooling.

use super::summary::{CoverageSummary, Metric};
use crate::path::CanonicalPath;
use crate::sourcemap::SourceMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Position in a source file (1-based line, 0-based column)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    /// 1-based line
    pub line: u32,
    /// 0-based column
    pub column: u32,
}

impl Position {
    /// Create a position
    #[must_use]
    pub const fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

/// Half-open source range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Range {
    /// Start position
    pub start: Position,
    /// End position
    pub end: Position,
}

impl Range {
    /// Create a range
    #[must_use]
    pub const fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    /// Range spanning `start..end` columns of a single line
    #[must_use]
    pub const fn on_line(line: u32, start: u32, end: u32) -> Self {
        Self {
            start: Position::new(line, start),
            end: Position::new(line, end),
        }
    }
}

/// Function metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionMeta {
    /// Function name
    pub name: String,
    /// Range of the declaration header
    pub decl: Range,
    /// Range of the whole function
    pub loc: Range,
    /// Line of the declaration
    pub line: u32,
}

/// Branch metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchMeta {
    /// Range of the branching construct
    pub loc: Range,
    /// Kind of branch (`if`, ...)
    #[serde(rename = "type")]
    pub kind: String,
    /// One range per arm
    pub locations: Vec<Range>,
    /// Line of the construct
    pub line: u32,
}

/// A single counter increment emitted by instrumented code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    /// Statement executed
    Statement(u32),
    /// Function entered
    Function(u32),
    /// Branch arm taken: (branch id, arm index)
    Branch(u32, usize),
}

/// Hit counters and position maps for one file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileCoverage {
    /// Canonical path of the file
    pub path: CanonicalPath,
    /// Statement id -> location
    pub statement_map: BTreeMap<u32, Range>,
    /// Function id -> metadata
    pub fn_map: BTreeMap<u32, FunctionMeta>,
    /// Branch id -> metadata
    pub branch_map: BTreeMap<u32, BranchMeta>,
    /// Statement hit counts
    pub s: BTreeMap<u32, u64>,
    /// Function hit counts
    pub f: BTreeMap<u32, u64>,
    /// Branch arm hit counts
    pub b: BTreeMap<u32, Vec<u64>>,
    /// Source map of the instrumented input, used for remapping
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_source_map: Option<SourceMap>,
}

impl FileCoverage {
    /// Create an empty record for `path`
    #[must_use]
    pub fn new(path: CanonicalPath) -> Self {
        Self {
            path,
            statement_map: BTreeMap::new(),
            fn_map: BTreeMap::new(),
            branch_map: BTreeMap::new(),
            s: BTreeMap::new(),
            f: BTreeMap::new(),
            b: BTreeMap::new(),
            input_source_map: None,
        }
    }

    /// Register a statement, returning its id
    pub fn add_statement(&mut self, loc: Range) -> u32 {
        let id = self.statement_map.len() as u32;
        let _ = self.statement_map.insert(id, loc);
        let _ = self.s.insert(id, 0);
        id
    }

    /// Register a function, returning its id
    pub fn add_function(&mut self, name: impl Into<String>, decl: Range, loc: Range) -> u32 {
        let id = self.fn_map.len() as u32;
        let meta = FunctionMeta {
            name: name.into(),
            decl,
            loc,
            line: decl.start.line,
        };
        let _ = self.fn_map.insert(id, meta);
        let _ = self.f.insert(id, 0);
        id
    }

    /// Register a branch with one counter per arm, returning its id
    pub fn add_branch(&mut self, kind: impl Into<String>, loc: Range, locations: Vec<Range>) -> u32 {
        let id = self.branch_map.len() as u32;
        let arms = locations.len();
        let meta = BranchMeta {
            loc,
            kind: kind.into(),
            locations,
            line: loc.start.line,
        };
        let _ = self.branch_map.insert(id, meta);
        let _ = self.b.insert(id, vec![0; arms]);
        id
    }

    /// Increment the counter addressed by `probe`.
    ///
    /// Returns `false` when the id is unknown to this file.
    pub fn hit(&mut self, probe: Probe) -> bool {
        let counter = match probe {
            Probe::Statement(id) => self.s.get_mut(&id),
            Probe::Function(id) => self.f.get_mut(&id),
            Probe::Branch(id, arm) => self.b.get_mut(&id).and_then(|arms| arms.get_mut(arm)),
        };
        match counter {
            Some(count) => {
                *count += 1;
                true
            }
            None => false,
        }
    }

    /// Zero every statement, function and branch counter
    pub fn reset_hits(&mut self) {
        self.s.values_mut().for_each(|count| *count = 0);
        self.f.values_mut().for_each(|count| *count = 0);
        self.b
            .values_mut()
            .for_each(|arms| arms.iter_mut().for_each(|count| *count = 0));
    }

    /// Check that no counter is above zero
    #[must_use]
    pub fn is_unexecuted(&self) -> bool {
        self.s.values().all(|c| *c == 0)
            && self.f.values().all(|c| *c == 0)
            && self.b.values().flatten().all(|c| *c == 0)
    }

    /// Add the counters of `other` into this record.
    ///
    /// Both records must describe the same instrumented content; ids missing
    /// here are adopted together with their locations.
    pub fn merge(&mut self, other: &Self) {
        for (id, count) in &other.s {
            *self.s.entry(*id).or_insert(0) += count;
            if let Some(loc) = other.statement_map.get(id) {
                let _ = self.statement_map.entry(*id).or_insert(*loc);
            }
        }
        for (id, count) in &other.f {
            *self.f.entry(*id).or_insert(0) += count;
            if let Some(meta) = other.fn_map.get(id) {
                let _ = self.fn_map.entry(*id).or_insert_with(|| meta.clone());
            }
        }
        for (id, arms) in &other.b {
            let mine = self.b.entry(*id).or_insert_with(|| vec![0; arms.len()]);
            if mine.len() < arms.len() {
                mine.resize(arms.len(), 0);
            }
            for (slot, count) in mine.iter_mut().zip(arms) {
                *slot += count;
            }
            if let Some(meta) = other.branch_map.get(id) {
                let _ = self.branch_map.entry(*id).or_insert_with(|| meta.clone());
            }
        }
    }

    /// Line hit counts derived from statements (max hits of the statements
    /// starting on each line)
    #[must_use]
    pub fn line_hits(&self) -> BTreeMap<u32, u64> {
        let mut lines = BTreeMap::new();
        for (id, loc) in &self.statement_map {
            let count = self.s.get(id).copied().unwrap_or(0);
            let entry = lines.entry(loc.start.line).or_insert(0);
            if count > *entry {
                *entry = count;
            }
        }
        lines
    }

    /// Summary statistics for this file
    #[must_use]
    pub fn summary(&self) -> CoverageSummary {
        let lines = self.line_hits();
        CoverageSummary {
            lines: Metric::from_counts(lines.values()),
            statements: Metric::from_counts(self.s.values()),
            functions: Metric::from_counts(self.f.values()),
            branches: Metric::from_counts(self.b.values().flatten()),
        }
    }
}
