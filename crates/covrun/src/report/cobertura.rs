//! Cobertura XML renderer.
//!
//! Files are grouped into packages by directory; each file becomes a class
//! with its functions as methods.

use super::{xml_escape, ReportContext, ReportRenderer};
use crate::coverage::{FileCoverage, Metric};
use crate::path::CanonicalPath;
use crate::result::CoverResult;
use std::collections::BTreeMap;
use std::fmt::Write;

type PackageMap<'a> = BTreeMap<String, Vec<(&'a CanonicalPath, &'a FileCoverage)>>;

/// Renders `cobertura-coverage.xml`
#[derive(Debug, Clone, Copy, Default)]
pub struct CoberturaRenderer;

impl ReportRenderer for CoberturaRenderer {
    fn render(&self, ctx: &ReportContext<'_>) -> CoverResult<String> {
        let total = &ctx.total;
        let mut xml = String::from(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
        xml.push('\n');
        xml.push_str(r#"<!DOCTYPE coverage SYSTEM "http://cobertura.sourceforge.net/xml/coverage-04.dtd">"#);
        xml.push('\n');
        let _ = writeln!(
            xml,
            r#"<coverage line-rate="{:.4}" branch-rate="{:.4}" lines-covered="{}" lines-valid="{}" branches-covered="{}" branches-valid="{}" complexity="0" version="{}">"#,
            total.lines.rate(),
            total.branches.rate(),
            total.lines.covered,
            total.lines.total,
            total.branches.covered,
            total.branches.total,
            env!("CARGO_PKG_VERSION"),
        );

        xml.push_str("  <sources>\n");
        let source = ctx.root.as_ref().map_or("/", CanonicalPath::as_str);
        let _ = writeln!(xml, "    <source>{}</source>", xml_escape(source));
        xml.push_str("  </sources>\n");

        xml.push_str("  <packages>\n");
        for (package, files) in group_by_package(ctx) {
            let mut lines = Metric::default();
            let mut branches = Metric::default();
            for (path, _) in &files {
                if let Some(summary) = ctx.summaries.get(*path) {
                    lines.add(summary.lines);
                    branches.add(summary.branches);
                }
            }
            let _ = writeln!(
                xml,
                r#"    <package name="{}" line-rate="{:.4}" branch-rate="{:.4}" complexity="0">"#,
                xml_escape(&package),
                lines.rate(),
                branches.rate(),
            );
            xml.push_str("      <classes>\n");
            for (path, coverage) in files {
                class(&mut xml, ctx, path, coverage);
            }
            xml.push_str("      </classes>\n");
            xml.push_str("    </package>\n");
        }
        xml.push_str("  </packages>\n");
        xml.push_str("</coverage>\n");

        Ok(xml)
    }
}

fn group_by_package<'a>(ctx: &ReportContext<'a>) -> PackageMap<'a> {
    let mut packages: PackageMap<'a> = BTreeMap::new();
    for (path, coverage) in ctx.map.iter() {
        let package = ctx
            .display_path(path)
            .rsplit_once('/')
            .map_or_else(|| "main".to_string(), |(dir, _)| dir.to_string());
        packages.entry(package).or_default().push((path, coverage));
    }
    packages
}

fn class(xml: &mut String, ctx: &ReportContext<'_>, path: &CanonicalPath, coverage: &FileCoverage) {
    let filename = ctx.display_path(path);
    let name = filename.rsplit_once('/').map_or(filename, |(_, name)| name);
    let summary = coverage.summary();
    let _ = writeln!(
        xml,
        r#"        <class name="{}" filename="{}" line-rate="{:.4}" branch-rate="{:.4}" complexity="0">"#,
        xml_escape(name),
        xml_escape(filename),
        summary.lines.rate(),
        summary.branches.rate(),
    );

    xml.push_str("          <methods>\n");
    for (id, meta) in &coverage.fn_map {
        let hits = coverage.f.get(id).copied().unwrap_or(0);
        let _ = writeln!(
            xml,
            r#"            <method name="{}" hits="{hits}" signature="" line-rate="{}" branch-rate="1">"#,
            xml_escape(&meta.name),
            if hits > 0 { "1" } else { "0" },
        );
        let _ = writeln!(
            xml,
            r#"              <lines><line number="{}" hits="{hits}"/></lines>"#,
            meta.line,
        );
        xml.push_str("            </method>\n");
    }
    xml.push_str("          </methods>\n");

    let mut branches_by_line: BTreeMap<u32, Metric> = BTreeMap::new();
    for (id, meta) in &coverage.branch_map {
        if let Some(arms) = coverage.b.get(id) {
            branches_by_line
                .entry(meta.line)
                .or_default()
                .add(Metric::from_counts(arms));
        }
    }

    xml.push_str("          <lines>\n");
    for (line, hits) in coverage.line_hits() {
        match branches_by_line.get(&line) {
            Some(branch) => {
                let _ = writeln!(
                    xml,
                    r#"            <line number="{line}" hits="{hits}" branch="true" condition-coverage="{:.0}% ({}/{})"/>"#,
                    branch.pct(),
                    branch.covered,
                    branch.total,
                );
            }
            None => {
                let _ = writeln!(xml, r#"            <line number="{line}" hits="{hits}" branch="false"/>"#);
            }
        }
    }
    xml.push_str("          </lines>\n");
    xml.push_str("        </class>\n");
}
