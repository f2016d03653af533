//! Probe insertion for script modules.

use super::syntax::{self, Node, HEADER_PREFIX};
use crate::coverage::{CoverageVariable, FileCoverage, Range};
use crate::instrument::{Instrumented, Instrumenter};
use crate::path::CanonicalPath;
use crate::result::{CoverError, CoverResult};
use crate::sourcemap::SourceMap;
use std::fmt::Write as _;

const INDENT: &str = "  ";

/// Instrumenter for the script dialect.
///
/// Every statement gets an `@cov s` probe, every function body an `@cov f`
/// probe and every `if` arm an `@cov b` probe. Positions recorded in the
/// descriptor are those of the input text.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScriptInstrumenter;

impl ScriptInstrumenter {
    /// Create an instrumenter
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Instrumenter for ScriptInstrumenter {
    fn instrument(
        &self,
        code: &str,
        file: &CanonicalPath,
        variable: &CoverageVariable,
        source_map: Option<&SourceMap>,
    ) -> CoverResult<Instrumented> {
        let path = file.to_path_buf();
        let script = syntax::parse(code, &path)?;
        if script.header.is_some() || contains_probe(&script.body) {
            return Err(CoverError::Instrument {
                path,
                message: "input is already instrumented".to_string(),
            });
        }

        let mut emitter = Emitter {
            coverage: FileCoverage::new(file.clone()),
            out: String::new(),
        };
        emitter.nodes(&script.body, 0);

        let Emitter {
            mut coverage,
            out: body,
        } = emitter;
        coverage.input_source_map = source_map.cloned();

        let descriptor = serde_json::to_string(&coverage)?;
        let mut code = format!("{HEADER_PREFIX}{variable} {descriptor}\n");
        code.push_str(&body);
        Ok(Instrumented { code, coverage })
    }
}

fn contains_probe(nodes: &[Node]) -> bool {
    nodes.iter().any(|node| match node {
        Node::Probe(_) => true,
        Node::Statement { .. } => false,
        Node::Function { body, .. } => contains_probe(body),
        Node::If {
            then_body,
            else_body,
            ..
        } => contains_probe(then_body) || else_body.as_deref().is_some_and(contains_probe),
    })
}

struct Emitter {
    coverage: FileCoverage,
    out: String,
}

impl Emitter {
    fn line(&mut self, depth: usize, text: impl std::fmt::Display) {
        let _ = writeln!(self.out, "{}{text}", INDENT.repeat(depth));
    }

    fn nodes(&mut self, nodes: &[Node], depth: usize) {
        for node in nodes {
            self.node(node, depth);
        }
    }

    fn node(&mut self, node: &Node, depth: usize) {
        match node {
            Node::Probe(_) => {}
            Node::Statement { text, loc, .. } => {
                let sid = self.coverage.add_statement(*loc);
                self.line(depth, format_args!("@cov s {sid}"));
                self.line(depth, text);
            }
            Node::Function {
                name,
                param,
                decl,
                loc,
                body,
            } => {
                // Declarations are hoisted, so the statement counts as run.
                let sid = self.coverage.add_statement(*loc);
                let _ = self.coverage.s.insert(sid, 1);
                let fid = self.coverage.add_function(name.as_str(), *decl, *loc);
                let param = param.as_deref().unwrap_or_default();
                self.line(depth, format_args!("function {name}({param}) {{"));
                self.line(depth + 1, format_args!("@cov f {fid}"));
                self.nodes(body, depth + 1);
                self.line(depth, "}");
            }
            Node::If {
                cond,
                loc,
                then_loc,
                then_body,
                else_loc,
                else_body,
            } => {
                let sid = self.coverage.add_statement(*loc);
                let arms: Vec<Range> = vec![*then_loc, *else_loc];
                let bid = self.coverage.add_branch("if", *loc, arms);
                self.line(depth, format_args!("@cov s {sid}"));
                self.line(depth, format_args!("if {cond} {{"));
                self.line(depth + 1, format_args!("@cov b {bid} 0"));
                self.nodes(then_body, depth + 1);
                self.line(depth, "} else {");
                self.line(depth + 1, format_args!("@cov b {bid} 1"));
                if let Some(else_body) = else_body {
                    self.nodes(else_body, depth + 1);
                }
                self.line(depth, "}");
            }
        }
    }
}
