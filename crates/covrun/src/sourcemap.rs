//! Source map v3 support and coverage remapping.
//!
//! ## Mappings format
//!
//! ```text
//! mappings = line (";" line)*
//! line     = segment ("," segment)*
//! segment  = VLQ(generated column) [VLQ(source) VLQ(line) VLQ(column) [VLQ(name)]]
//! ```
//!
//! The generated column is relative to the previous segment of the same
//! line; all other fields are relative to the previous segment anywhere in
//! the map.

use crate::coverage::{CoverageMap, FileCoverage, Position, Range};
use crate::path::{CanonicalPath, CaseFolding};
use crate::result::{CoverError, CoverResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

/// Raw source map (revision 3)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceMap {
    /// Format revision, always 3
    pub version: u32,
    /// Generated file name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    /// Prefix applied to every entry of `sources`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_root: Option<String>,
    /// Original source files
    pub sources: Vec<String>,
    /// Symbol names
    #[serde(default)]
    pub names: Vec<String>,
    /// Encoded mappings
    pub mappings: String,
}

impl SourceMap {
    /// Parse a source map from JSON text
    pub fn from_json(text: &str) -> CoverResult<Self> {
        let map: Self = serde_json::from_str(text)?;
        if map.version != 3 {
            return Err(CoverError::SourceMap {
                message: format!("unsupported source map version {}", map.version),
            });
        }
        Ok(map)
    }

    /// Read `<path>.map` next to a compiled file.
    ///
    /// Returns `None` when the file is missing or malformed.
    #[must_use]
    pub fn load_adjacent(path: &Path) -> Option<Self> {
        let mut map_path = path.as_os_str().to_owned();
        map_path.push(".map");
        let map_path = PathBuf::from(map_path);

        let text = match std::fs::read_to_string(&map_path) {
            Ok(text) => text,
            Err(_) => return None,
        };
        match Self::from_json(&text) {
            Ok(map) => Some(map),
            Err(e) => {
                tracing::debug!(map = %map_path.display(), error = %e, "ignoring unreadable source map");
                None
            }
        }
    }

    /// Decode the mappings string
    pub fn decode(&self) -> CoverResult<Mappings> {
        Mappings::parse(&self.mappings)
    }
}

/// One decoded mapping segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    /// 0-based generated column
    pub generated_column: u32,
    /// Original location, absent for unmapped segments
    pub original: Option<OriginalPosition>,
}

/// Location in an original source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OriginalPosition {
    /// Index into `sources`
    pub source: u32,
    /// 0-based line
    pub line: u32,
    /// 0-based column
    pub column: u32,
}

/// Decoded mappings, one segment list per generated line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Mappings {
    lines: Vec<Vec<Segment>>,
}

impl Mappings {
    /// Decode a mappings string
    pub fn parse(encoded: &str) -> CoverResult<Self> {
        let mut lines = Vec::new();
        let mut source: i64 = 0;
        let mut orig_line: i64 = 0;
        let mut orig_column: i64 = 0;

        for line in encoded.split(';') {
            let mut segments = Vec::new();
            let mut column: i64 = 0;

            for raw in line.split(',').filter(|s| !s.is_empty()) {
                let fields = decode_vlq(raw)?;
                match fields.len() {
                    1 | 4 | 5 => {}
                    n => {
                        return Err(CoverError::SourceMap {
                            message: format!("segment '{raw}' has {n} fields"),
                        })
                    }
                }

                column += fields[0];
                let original = if fields.len() >= 4 {
                    source += fields[1];
                    orig_line += fields[2];
                    orig_column += fields[3];
                    Some(OriginalPosition {
                        source: to_index(source, raw)?,
                        line: to_index(orig_line, raw)?,
                        column: to_index(orig_column, raw)?,
                    })
                } else {
                    None
                };
                segments.push(Segment {
                    generated_column: to_index(column, raw)?,
                    original,
                });
            }

            segments.sort_by_key(|s| s.generated_column);
            lines.push(segments);
        }

        Ok(Self { lines })
    }

    /// Number of generated lines
    #[must_use]
    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Original position of a generated 0-based `(line, column)`.
    ///
    /// Picks the closest mapped segment at or before the column, falling
    /// back to the first mapped segment of the line.
    #[must_use]
    pub fn original_position(&self, line: u32, column: u32) -> Option<OriginalPosition> {
        let segments = self.lines.get(line as usize)?;
        segments
            .iter()
            .rev()
            .filter(|s| s.generated_column <= column)
            .find_map(|s| s.original)
            .or_else(|| segments.iter().find_map(|s| s.original))
    }
}

fn to_index(value: i64, segment: &str) -> CoverResult<u32> {
    u32::try_from(value).map_err(|_| CoverError::SourceMap {
        message: format!("segment '{segment}' produced out-of-range value {value}"),
    })
}

const fn base64_value(byte: u8) -> Option<i64> {
    match byte {
        b'A'..=b'Z' => Some((byte - b'A') as i64),
        b'a'..=b'z' => Some((byte - b'a') as i64 + 26),
        b'0'..=b'9' => Some((byte - b'0') as i64 + 52),
        b'+' => Some(62),
        b'/' => Some(63),
        _ => None,
    }
}

/// Decode a Base64 VLQ segment into its signed fields
pub fn decode_vlq(segment: &str) -> CoverResult<Vec<i64>> {
    let mut values = Vec::new();
    let mut value: i64 = 0;
    let mut shift = 0u32;

    for byte in segment.bytes() {
        let digit = base64_value(byte).ok_or_else(|| CoverError::SourceMap {
            message: format!("invalid base64 character '{}' in '{segment}'", byte as char),
        })?;
        value += (digit & 0x1f) << shift;
        if digit & 0x20 != 0 {
            shift += 5;
            if shift > 55 {
                return Err(CoverError::SourceMap {
                    message: format!("VLQ value too large in '{segment}'"),
                });
            }
        } else {
            let negative = value & 1 == 1;
            value >>= 1;
            values.push(if negative { -value } else { value });
            value = 0;
            shift = 0;
        }
    }

    if shift != 0 {
        return Err(CoverError::SourceMap {
            message: format!("truncated VLQ segment '{segment}'"),
        });
    }
    Ok(values)
}

/// Remaps coverage from compiled files to their original sources
#[derive(Debug, Clone, Copy)]
pub struct SourceMapStore {
    folding: CaseFolding,
}

impl SourceMapStore {
    /// Create a store canonicalizing original paths with `folding`
    #[must_use]
    pub const fn new(folding: CaseFolding) -> Self {
        Self { folding }
    }

    /// Translate every record that carries an input source map.
    ///
    /// Records without a map, or whose map cannot be decoded, pass through
    /// unchanged.
    #[must_use]
    pub fn transform_coverage(&self, map: CoverageMap) -> CoverageMap {
        let mut out = CoverageMap::new();
        let mut remapped: BTreeMap<CanonicalPath, RemapBuilder> = BTreeMap::new();

        for (path, coverage) in map {
            let Some(source_map) = coverage.input_source_map.clone() else {
                out.add_file_coverage(coverage);
                continue;
            };
            let mappings = match source_map.decode() {
                Ok(mappings) => mappings,
                Err(e) => {
                    tracing::warn!(file = %path, error = %e, "source map unusable, keeping compiled positions");
                    out.add_file_coverage(coverage);
                    continue;
                }
            };
            let sources = self.resolve_sources(&path, &source_map);
            let mut translator = Translator {
                mappings: &mappings,
                sources: &sources,
                builders: &mut remapped,
            };
            translator.translate(&coverage);
        }

        for builder in remapped.into_values() {
            out.add_file_coverage(builder.finish());
        }
        out
    }

    fn resolve_sources(&self, compiled: &CanonicalPath, map: &SourceMap) -> Vec<CanonicalPath> {
        let mut base = compiled.parent().unwrap_or_default();
        if let Some(root) = map.source_root.as_deref().filter(|r| !r.is_empty()) {
            base = base.join(root);
        }
        map.sources
            .iter()
            .map(|source| CanonicalPath::new(base.join(source), self.folding))
            .collect()
    }
}

struct Translator<'a> {
    mappings: &'a Mappings,
    sources: &'a [CanonicalPath],
    builders: &'a mut BTreeMap<CanonicalPath, RemapBuilder>,
}

impl Translator<'_> {
    fn translate(&mut self, coverage: &FileCoverage) {
        for (id, loc) in &coverage.statement_map {
            if let Some((source, range)) = self.map_range(loc) {
                let count = coverage.s.get(id).copied().unwrap_or(0);
                self.builder(source).statement(range, count);
            }
        }
        for (id, meta) in &coverage.fn_map {
            if let Some((source, decl)) = self.map_range(&meta.decl) {
                let loc = self.map_within(&meta.loc, &source).unwrap_or(decl);
                let count = coverage.f.get(id).copied().unwrap_or(0);
                self.builder(source).function(&meta.name, decl, loc, count);
            }
        }
        for (id, meta) in &coverage.branch_map {
            if let Some((source, loc)) = self.map_range(&meta.loc) {
                let locations = meta
                    .locations
                    .iter()
                    .map(|arm| self.map_within(arm, &source).unwrap_or(loc))
                    .collect();
                let counts = coverage.b.get(id).cloned().unwrap_or_default();
                self.builder(source).branch(&meta.kind, loc, locations, &counts);
            }
        }
    }

    fn builder(&mut self, source: CanonicalPath) -> &mut RemapBuilder {
        self.builders
            .entry(source.clone())
            .or_insert_with(|| RemapBuilder::new(source))
    }

    fn map_position(&self, pos: Position) -> Option<(CanonicalPath, Position)> {
        let original = self
            .mappings
            .original_position(pos.line.checked_sub(1)?, pos.column)?;
        let source = self.sources.get(original.source as usize)?;
        Some((
            source.clone(),
            Position::new(original.line + 1, original.column),
        ))
    }

    fn map_range(&self, range: &Range) -> Option<(CanonicalPath, Range)> {
        let (source, start) = self.map_position(range.start)?;
        let end = match self.map_position(range.end) {
            Some((end_source, end)) if end_source == source && end >= start => end,
            _ => start,
        };
        Some((source, Range::new(start, end)))
    }

    fn map_within(&self, range: &Range, source: &CanonicalPath) -> Option<Range> {
        match self.map_range(range) {
            Some((mapped_source, mapped)) if &mapped_source == source => Some(mapped),
            _ => None,
        }
    }
}

/// Accumulates remapped entries for one original file, deduplicating by
/// location so several compiled files can feed the same source.
struct RemapBuilder {
    coverage: FileCoverage,
    statements: HashMap<Range, u32>,
    functions: HashMap<(String, Range), u32>,
    branches: HashMap<Range, u32>,
}

impl RemapBuilder {
    fn new(path: CanonicalPath) -> Self {
        Self {
            coverage: FileCoverage::new(path),
            statements: HashMap::new(),
            functions: HashMap::new(),
            branches: HashMap::new(),
        }
    }

    fn statement(&mut self, range: Range, count: u64) {
        let coverage = &mut self.coverage;
        let id = *self
            .statements
            .entry(range)
            .or_insert_with(|| coverage.add_statement(range));
        *coverage.s.entry(id).or_insert(0) += count;
    }

    fn function(&mut self, name: &str, decl: Range, loc: Range, count: u64) {
        let coverage = &mut self.coverage;
        let id = *self
            .functions
            .entry((name.to_string(), decl))
            .or_insert_with(|| coverage.add_function(name, decl, loc));
        *coverage.f.entry(id).or_insert(0) += count;
    }

    fn branch(&mut self, kind: &str, loc: Range, locations: Vec<Range>, counts: &[u64]) {
        let coverage = &mut self.coverage;
        let id = *self
            .branches
            .entry(loc)
            .or_insert_with(|| coverage.add_branch(kind, loc, locations));
        if let Some(arms) = coverage.b.get_mut(&id) {
            for (slot, count) in arms.iter_mut().zip(counts) {
                *slot += count;
            }
        }
    }

    fn finish(self) -> FileCoverage {
        self.coverage
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::coverage::Probe;
    use proptest::prelude::*;

    fn encode_vlq(value: i64) -> String {
        const CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";
        let mut vlq = if value < 0 { ((-value) << 1) | 1 } else { value << 1 };
        let mut out = String::new();
        loop {
            let mut digit = vlq & 0x1f;
            vlq >>= 5;
            if vlq > 0 {
                digit |= 0x20;
            }
            out.push(CHARS[digit as usize] as char);
            if vlq == 0 {
                break;
            }
        }
        out
    }

    fn compiled_map(mappings: &str) -> SourceMap {
        SourceMap {
            version: 3,
            file: Some("a.js".to_string()),
            source_root: None,
            sources: vec!["../lib/a.ts".to_string()],
            names: Vec::new(),
            mappings: mappings.to_string(),
        }
    }

    #[test]
    fn test_decode_known_segments() {
        assert_eq!(decode_vlq("AAAA").unwrap(), vec![0, 0, 0, 0]);
        assert_eq!(decode_vlq("AACA").unwrap(), vec![0, 0, 1, 0]);
        assert_eq!(decode_vlq("D").unwrap(), vec![-1]);
        assert_eq!(decode_vlq("gB").unwrap(), vec![16]);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_vlq("A*").is_err());
        assert!(decode_vlq("g").is_err());
    }

    #[test]
    fn test_mappings_accumulate_across_lines() {
        let mappings = Mappings::parse("AACA;AACA;;AAEA").unwrap();
        assert_eq!(mappings.line_count(), 4);
        assert_eq!(mappings.original_position(0, 0).unwrap().line, 1);
        assert_eq!(mappings.original_position(1, 0).unwrap().line, 2);
        assert!(mappings.original_position(2, 0).is_none());
        assert_eq!(mappings.original_position(3, 0).unwrap().line, 4);
    }

    #[test]
    fn test_original_position_greatest_lower_bound() {
        // line 0: col 0 -> (0,0), col 4 -> (0,10)
        let mappings = Mappings::parse("AAAA,IAAU").unwrap();
        assert_eq!(mappings.original_position(0, 2).unwrap().column, 0);
        assert_eq!(mappings.original_position(0, 6).unwrap().column, 10);
    }

    #[test]
    fn test_original_position_falls_back_to_first_segment() {
        let mappings = Mappings::parse("IAAA").unwrap();
        let pos = mappings.original_position(0, 0).unwrap();
        assert_eq!(pos.line, 0);
    }

    #[test]
    fn test_from_json_rejects_other_versions() {
        let err = SourceMap::from_json(r#"{"version":2,"sources":[],"mappings":""}"#).unwrap_err();
        assert!(err.to_string().contains("version 2"));
    }

    #[test]
    fn test_load_adjacent() {
        let dir = tempfile::tempdir().unwrap();
        let js = dir.path().join("a.js");
        std::fs::write(&js, "x\n").unwrap();
        assert!(SourceMap::load_adjacent(&js).is_none());

        std::fs::write(
            dir.path().join("a.js.map"),
            r#"{"version":3,"sources":["a.ts"],"names":[],"mappings":"AAAA"}"#,
        )
        .unwrap();
        let map = SourceMap::load_adjacent(&js).unwrap();
        assert_eq!(map.sources, vec!["a.ts".to_string()]);

        std::fs::write(dir.path().join("a.js.map"), "not json").unwrap();
        assert!(SourceMap::load_adjacent(&js).is_none());
    }

    #[test]
    fn test_transform_passes_unmapped_files_through() {
        let path = CanonicalPath::new("/out/plain.js", CaseFolding::Sensitive);
        let mut cov = FileCoverage::new(path.clone());
        let _ = cov.add_statement(Range::on_line(1, 0, 3));
        let map: CoverageMap = vec![cov.clone()].into_iter().collect();

        let out = SourceMapStore::new(CaseFolding::Sensitive).transform_coverage(map);
        assert_eq!(out.get(&path), Some(&cov));
    }

    #[test]
    fn test_transform_moves_hits_to_original_source() {
        let compiled = CanonicalPath::new("/proj/out/a.js", CaseFolding::Sensitive);
        let mut cov = FileCoverage::new(compiled.clone());
        let first = cov.add_statement(Range::on_line(1, 0, 5));
        let second = cov.add_statement(Range::on_line(2, 0, 5));
        let func = cov.add_function("go", Range::on_line(2, 0, 5), Range::on_line(2, 0, 5));
        let _ = cov.hit(Probe::Statement(first));
        let _ = cov.hit(Probe::Statement(second));
        let _ = cov.hit(Probe::Statement(second));
        let _ = cov.hit(Probe::Function(func));
        // generated lines 0,1 -> original lines 1,2 (0-based)
        cov.input_source_map = Some(compiled_map("AACA;AACA"));

        let out = SourceMapStore::new(CaseFolding::Sensitive)
            .transform_coverage(vec![cov].into_iter().collect());

        assert!(!out.contains(&compiled));
        let original = CanonicalPath::new("/proj/lib/a.ts", CaseFolding::Sensitive);
        let remapped = out.get(&original).unwrap();
        assert_eq!(remapped.statement_map[&0].start.line, 2);
        assert_eq!(remapped.statement_map[&1].start.line, 3);
        assert_eq!(remapped.s[&1], 2);
        assert_eq!(remapped.f[&0], 1);
        assert!(remapped.input_source_map.is_none());
    }

    #[test]
    fn test_transform_drops_unmappable_statements() {
        let compiled = CanonicalPath::new("/proj/out/a.js", CaseFolding::Sensitive);
        let mut cov = FileCoverage::new(compiled);
        let _ = cov.add_statement(Range::on_line(1, 0, 5));
        let _ = cov.add_statement(Range::on_line(9, 0, 5));
        cov.input_source_map = Some(compiled_map("AAAA"));

        let out = SourceMapStore::new(CaseFolding::Sensitive)
            .transform_coverage(vec![cov].into_iter().collect());
        let original = CanonicalPath::new("/proj/lib/a.ts", CaseFolding::Sensitive);
        assert_eq!(out.get(&original).unwrap().statement_map.len(), 1);
    }

    #[test]
    fn test_transform_merges_compiled_files_of_one_source() {
        let mut maps = Vec::new();
        for name in ["/proj/out/a.js", "/proj/out/b.js"] {
            let mut cov = FileCoverage::new(CanonicalPath::new(name, CaseFolding::Sensitive));
            let id = cov.add_statement(Range::on_line(1, 0, 5));
            let _ = cov.hit(Probe::Statement(id));
            cov.input_source_map = Some(compiled_map("AAAA"));
            maps.push(cov);
        }

        let out = SourceMapStore::new(CaseFolding::Sensitive)
            .transform_coverage(maps.into_iter().collect());
        assert_eq!(out.len(), 1);
        let original = CanonicalPath::new("/proj/lib/a.ts", CaseFolding::Sensitive);
        assert_eq!(out.get(&original).unwrap().s[&0], 2);
    }

    #[test]
    fn test_source_root_is_applied() {
        let compiled = CanonicalPath::new("/proj/out/a.js", CaseFolding::Sensitive);
        let mut cov = FileCoverage::new(compiled);
        let _ = cov.add_statement(Range::on_line(1, 0, 5));
        let mut source_map = compiled_map("AAAA");
        source_map.source_root = Some("/abs/src".to_string());
        source_map.sources = vec!["a.ts".to_string()];
        cov.input_source_map = Some(source_map);

        let out = SourceMapStore::new(CaseFolding::Sensitive)
            .transform_coverage(vec![cov].into_iter().collect());
        assert!(out.contains(&CanonicalPath::new("/abs/src/a.ts", CaseFolding::Sensitive)));
    }

    proptest! {
        #[test]
        fn prop_vlq_decodes_encoded_fields(fields in prop::collection::vec(-100_000i64..100_000, 1..6)) {
            let encoded: String = fields.iter().map(|v| encode_vlq(*v)).collect();
            prop_assert_eq!(decode_vlq(&encoded).unwrap(), fields);
        }
    }
}
