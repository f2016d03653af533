//! Parser for the line-oriented script dialect.
//!
//! ```text
//! let ready = true            // flag binding
//! function greet(loud) {      // top-level function, optional flag parameter
//!   if loud {                 // condition: true | false | NAME | !NAME
//!     shout
//!   } else {
//!     whisper
//!   }
//!   throw not implemented     // raises when executed
//! }
//! ```
//!
//! Instrumented text additionally carries a `//@cov` header on its first line
//! and `@cov` probe lines.

use crate::coverage::{Probe, Range};
use crate::result::{CoverError, CoverResult};
use std::fmt;
use std::path::{Path, PathBuf};

/// Prefix of the header line written by the instrumenter
pub const HEADER_PREFIX: &str = "//@cov ";
/// Prefix of probe lines
pub const PROBE_PREFIX: &str = "@cov ";

/// Instrumentation header: coverage variable and serialized descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Coverage variable the text was instrumented for
    pub variable: String,
    /// JSON of the file's coverage descriptor
    pub descriptor: String,
}

/// Branch condition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// `true` / `false`
    Literal(bool),
    /// A bound flag
    Flag(String),
    /// A negated flag
    Not(String),
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(value) => write!(f, "{value}"),
            Self::Flag(name) => f.write_str(name),
            Self::Not(name) => write!(f, "!{name}"),
        }
    }
}

/// What a plain statement does when executed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatementKind {
    /// No effect
    Inert,
    /// `let NAME = true|false`
    Let(String, bool),
    /// `throw MESSAGE`
    Throw(String),
}

/// Syntax tree node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// Counter increment
    Probe(Probe),
    /// Single-line statement
    Statement {
        /// Source text
        text: String,
        /// Behaviour
        kind: StatementKind,
        /// Location
        loc: Range,
    },
    /// Function declaration
    Function {
        /// Function name
        name: String,
        /// Optional flag parameter
        param: Option<String>,
        /// Header location
        decl: Range,
        /// Whole declaration
        loc: Range,
        /// Body
        body: Vec<Node>,
    },
    /// Conditional
    If {
        /// Condition
        cond: Condition,
        /// Whole construct
        loc: Range,
        /// `if` header location
        then_loc: Range,
        /// Then arm
        then_body: Vec<Node>,
        /// `} else {` location, or the closing brace when there is no else
        else_loc: Range,
        /// Else arm, if written
        else_body: Option<Vec<Node>>,
    },
}

/// Parsed script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    /// Instrumentation header, present on instrumented text
    pub header: Option<Header>,
    /// Top-level nodes
    pub body: Vec<Node>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Block {
    TopLevel,
    Function,
    Then,
    Else,
}

enum End {
    Eof,
    Close(Range),
    Else(Range),
}

struct SourceLine<'a> {
    number: u32,
    text: &'a str,
    loc: Range,
}

/// Read the instrumentation header from the first line of a file
pub fn parse_header(first: &str, path: &Path) -> CoverResult<Option<Header>> {
    let Some(rest) = first.trim().strip_prefix(HEADER_PREFIX) else {
        return Ok(None);
    };
    let (variable, descriptor) = rest.split_once(' ').ok_or_else(|| CoverError::Parse {
        path: path.to_path_buf(),
        line: 1,
        message: "malformed instrumentation header".to_string(),
    })?;
    Ok(Some(Header {
        variable: variable.to_string(),
        descriptor: descriptor.to_string(),
    }))
}

/// Parse the text of a probe line after [`PROBE_PREFIX`]
pub fn parse_probe(rest: &str) -> Result<Probe, String> {
    let parts: Vec<&str> = rest.split_whitespace().collect();
    let id = |s: &str| s.parse::<u32>().map_err(|_| format!("invalid probe id '{s}'"));
    match parts.as_slice() {
        ["s", sid] => Ok(Probe::Statement(id(sid)?)),
        ["f", fid] => Ok(Probe::Function(id(fid)?)),
        ["b", bid, arm] => {
            let arm = arm
                .parse::<usize>()
                .map_err(|_| format!("invalid branch arm '{arm}'"))?;
            Ok(Probe::Branch(id(bid)?, arm))
        }
        _ => Err(format!("malformed probe '{rest}'")),
    }
}

/// Parse script text; `path` is used for error messages only
pub fn parse(text: &str, path: &Path) -> CoverResult<Script> {
    let mut lines = text.lines().enumerate().peekable();
    let mut header = None;

    if let Some((_, first)) = lines.peek() {
        header = parse_header(first, path)?;
        if header.is_some() {
            let _ = lines.next();
        }
    }

    let source_lines = lines.filter_map(|(index, raw)| {
        let text = raw.trim();
        if text.is_empty() || (text.starts_with("//") && !text.starts_with(HEADER_PREFIX)) {
            return None;
        }
        let number = index as u32 + 1;
        let indent = (raw.len() - raw.trim_start().len()) as u32;
        Some(SourceLine {
            number,
            text,
            loc: Range::on_line(number, indent, indent + text.len() as u32),
        })
    });

    let mut parser = Parser {
        path: path.to_path_buf(),
        lines: source_lines.collect(),
        pos: 0,
    };
    let (body, _) = parser.block(Block::TopLevel)?;
    Ok(Script { header, body })
}

struct Parser<'a> {
    path: PathBuf,
    lines: Vec<SourceLine<'a>>,
    pos: usize,
}

impl Parser<'_> {
    fn error(&self, line: u32, message: impl Into<String>) -> CoverError {
        CoverError::Parse {
            path: self.path.clone(),
            line,
            message: message.into(),
        }
    }

    fn block(&mut self, block: Block) -> CoverResult<(Vec<Node>, End)> {
        let mut nodes = Vec::new();

        while let Some(line) = self.lines.get(self.pos) {
            self.pos += 1;
            let (number, text, loc) = (line.number, line.text, line.loc);

            if text == "}" {
                if block == Block::TopLevel {
                    return Err(self.error(number, "unbalanced '}'"));
                }
                return Ok((nodes, End::Close(loc)));
            }
            if is_else(text) {
                if block != Block::Then {
                    return Err(self.error(number, "'else' without 'if'"));
                }
                return Ok((nodes, End::Else(loc)));
            }
            if let Some(rest) = text.strip_prefix(PROBE_PREFIX) {
                nodes.push(Node::Probe(self.probe(number, rest)?));
                continue;
            }
            if text.starts_with(HEADER_PREFIX) {
                return Err(self.error(number, "instrumentation header must be the first line"));
            }
            if !text.ends_with('{') {
                nodes.push(Node::Statement {
                    text: text.to_string(),
                    kind: statement_kind(text),
                    loc,
                });
                continue;
            }
            if let Some(header) = text.strip_prefix("function ") {
                if block != Block::TopLevel {
                    return Err(self.error(number, "functions must be declared at top level"));
                }
                nodes.push(self.function(number, header, loc)?);
                continue;
            }
            if let Some(cond) = text.strip_prefix("if ") {
                nodes.push(self.conditional(number, cond, loc)?);
                continue;
            }
            return Err(self.error(number, format!("unsupported block '{text}'")));
        }

        if block == Block::TopLevel {
            Ok((nodes, End::Eof))
        } else {
            let last = self.lines.last().map_or(1, |l| l.number);
            Err(self.error(last, "unexpected end of file, missing '}'"))
        }
    }

    fn function(&mut self, number: u32, header: &str, decl: Range) -> CoverResult<Node> {
        let signature = header.trim_end_matches('{').trim();
        let (name, params) = signature
            .strip_suffix(')')
            .and_then(|s| s.split_once('('))
            .ok_or_else(|| self.error(number, "function header must be 'function NAME(PARAM) {'"))?;
        let name = name.trim();
        let param = params.trim();
        if !is_identifier(name) {
            return Err(self.error(number, format!("invalid function name '{name}'")));
        }
        let param = if param.is_empty() {
            None
        } else if is_identifier(param) {
            Some(param.to_string())
        } else {
            return Err(self.error(number, format!("invalid parameter '{param}'")));
        };

        let (body, end) = self.block(Block::Function)?;
        let End::Close(close) = end else {
            return Err(self.error(number, "function body not closed"));
        };
        Ok(Node::Function {
            name: name.to_string(),
            param,
            decl,
            loc: Range::new(decl.start, close.end),
            body,
        })
    }

    fn conditional(&mut self, number: u32, rest: &str, then_loc: Range) -> CoverResult<Node> {
        let cond = rest.trim_end_matches('{').trim();
        let cond = parse_condition(cond).ok_or_else(|| self.error(number, format!("invalid condition '{cond}'")))?;

        let (then_body, end) = self.block(Block::Then)?;
        let (else_loc, else_body, close) = match end {
            End::Else(else_loc) => {
                let (else_body, end) = self.block(Block::Else)?;
                let End::Close(close) = end else {
                    return Err(self.error(number, "else arm not closed"));
                };
                (else_loc, Some(else_body), close)
            }
            End::Close(close) => (close, None, close),
            End::Eof => return Err(self.error(number, "if block not closed")),
        };

        Ok(Node::If {
            cond,
            loc: Range::new(then_loc.start, close.end),
            then_loc,
            then_body,
            else_loc,
            else_body,
        })
    }

    fn probe(&self, number: u32, rest: &str) -> CoverResult<Probe> {
        parse_probe(rest).map_err(|message| self.error(number, message))
    }
}

fn is_else(text: &str) -> bool {
    text.strip_prefix('}')
        .and_then(|s| s.trim().strip_prefix("else"))
        .and_then(|s| s.trim().strip_prefix('{'))
        .is_some_and(|s| s.trim().is_empty())
}

/// Check that `name` is a valid identifier
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn parse_condition(text: &str) -> Option<Condition> {
    match text {
        "true" => Some(Condition::Literal(true)),
        "false" => Some(Condition::Literal(false)),
        _ => match text.strip_prefix('!') {
            Some(name) if is_identifier(name) => Some(Condition::Not(name.to_string())),
            None if is_identifier(text) => Some(Condition::Flag(text.to_string())),
            _ => None,
        },
    }
}

fn statement_kind(text: &str) -> StatementKind {
    if let Some(message) = text.strip_prefix("throw") {
        if message.is_empty() || message.starts_with(' ') {
            return StatementKind::Throw(message.trim().to_string());
        }
    }
    if let Some(binding) = text.strip_prefix("let ") {
        if let Some((name, value)) = binding.split_once('=') {
            let name = name.trim();
            let value = match value.trim() {
                "true" => Some(true),
                "false" => Some(false),
                _ => None,
            };
            if let (true, Some(value)) = (is_identifier(name), value) {
                return StatementKind::Let(name.to_string(), value);
            }
        }
    }
    StatementKind::Inert
}
