//! Variable path expressions.
//!
//! A variable reference has the form `$segment(.segment)*(|filter)*` where a
//! segment is a literal key, a nested variable (`{$other}` or `$other`) whose
//! value becomes the key, or a parenthesized expression computing the key.

use crate::constants::MAX_EXPR_NESTING;
use crate::error::{Error, Result};
use crate::expr::Expr;

/// Which store the first segment of a path addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// The active layer of the context stack
    #[default]
    Shared,
    /// The parameters and locals of the block being rendered
    Local,
}

/// One step of a variable path.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    /// A literal key
    Key(String),
    /// A variable whose resolved value is used as the key
    Nested(Box<VarExpr>),
    /// A computed index: `(expression)`
    Index(Expr),
}

/// A settable path such as `$user.address.city`.
#[derive(Debug, Clone, PartialEq)]
pub struct VarPath {
    pub mode: Mode,
    pub segments: Vec<Segment>,
}

/// A path followed by its filter pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct VarExpr {
    pub path: VarPath,
    pub filters: Vec<String>,
}

impl VarPath {
    /// A one-segment path naming `name`.
    pub fn simple(name: &str, mode: Mode) -> Self {
        Self { mode, segments: vec![Segment::Key(name.to_string())] }
    }

    /// Parses an assignment target; filters are rejected.
    pub fn parse(source: &str, mode: Mode) -> Result<Self> {
        let expr = VarExpr::parse(source, mode)?;
        if !expr.filters.is_empty() {
            return Err(Error::syntax(format!(
                "filters are not allowed on assignment target \"{}\"",
                source.trim()
            )));
        }
        Ok(expr.path)
    }

    /// The literal name of the first segment, if it has one.
    pub fn root_name(&self) -> Option<&str> {
        match self.segments.first() {
            Some(Segment::Key(key)) => Some(key),
            _ => None,
        }
    }
}

impl VarExpr {
    /// Parses `$path|filters`, also accepting the `{$path|filters}` form that
    /// nested variable nodes keep inside directive arguments.
    pub fn parse(source: &str, mode: Mode) -> Result<Self> {
        Self::parse_nested(source, mode, 0)
    }

    pub(crate) fn parse_nested(source: &str, mode: Mode, nesting: usize) -> Result<Self> {
        let source = unwrap_node(source.trim());
        if nesting >= MAX_EXPR_NESTING {
            return Err(Error::syntax(format!("variable \"{source}\" nested too deeply")));
        }
        let Some(body) = source.strip_prefix('$') else {
            return Err(Error::syntax(format!("invalid variable \"{source}\"")));
        };

        let mut parts = split_top_level(body, '|').into_iter();
        let path_source = parts.next().unwrap_or_default();
        let filters = parts
            .map(|f| f.trim().to_string())
            .filter(|f| !f.is_empty())
            .collect();

        let segments = split_top_level(path_source, '.')
            .into_iter()
            .map(|segment| parse_segment(segment, mode, source, nesting + 1))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { path: VarPath { mode, segments }, filters })
    }
}

fn parse_segment(segment: &str, mode: Mode, source: &str, nesting: usize) -> Result<Segment> {
    let segment = segment.trim();
    if segment.is_empty() {
        return Err(Error::syntax(format!("empty segment in variable \"{source}\"")));
    }

    if (segment.starts_with('{') && segment.ends_with('}')) || segment.starts_with('$') {
        Ok(Segment::Nested(Box::new(VarExpr::parse_nested(segment, mode, nesting)?)))
    } else if let Some(inner) = segment.strip_prefix('(').and_then(|s| s.strip_suffix(')')) {
        Ok(Segment::Index(Expr::parse_nested(inner, mode, nesting)?))
    } else {
        Ok(Segment::Key(segment.to_string()))
    }
}

/// Strips the braces of a `{$...}` node kept verbatim inside arguments.
pub(crate) fn unwrap_node(source: &str) -> &str {
    match source.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
        Some(inner) if inner.trim_start().starts_with('$') && closes_at_end(source) => inner.trim(),
        _ => source,
    }
}

// True when the brace opening `source` is the one closing it.
fn closes_at_end(source: &str) -> bool {
    let mut depth = 0usize;
    for (i, c) in source.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return i == source.len() - 1;
                }
            }
            _ => {}
        }
    }
    false
}

/// Splits on `separator` outside of braces, parentheses, brackets and quotes.
pub(crate) fn split_top_level(source: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut start = 0;

    for (i, c) in source.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' if depth > 0 => quote = Some(c),
            '{' | '(' | '[' => depth += 1,
            '}' | ')' | ']' => depth = depth.saturating_sub(1),
            c if c == separator && depth == 0 => {
                parts.push(&source[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&source[start..]);
    parts
}
