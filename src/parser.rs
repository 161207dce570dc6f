//! Node extraction for wtemplate sources.
//! Splits template text into literal text and `{...}` nodes, resolving the
//! innermost nodes first so that an outer node receives the compiled form of
//! the nodes nested in its arguments.

use crate::error::{Error, Position, Result};
use log::trace;
use std::iter::Peekable;
use std::str::Chars;

/// Receiver of the text and nodes found by [`extract_nodes`].
pub trait NodeHandler {
    /// Called with literal text found at depth 0.
    fn text(&mut self, text: &str) -> Result<()>;

    /// Called with the content of a node, without its wrapping braces.
    ///
    /// `inner` is true when the node is nested inside another node. The
    /// returned string replaces the node: inside the argument string of the
    /// enclosing node when `inner`, in the output text otherwise.
    fn node(&mut self, node: &str, inner: bool) -> Result<String>;
}

/// Returns true if `c` may follow `{` to open a node.
pub fn is_node_start(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '/' | '$' | '%')
}

struct Cursor<'s> {
    chars: Peekable<Chars<'s>>,
    line: usize,
    column: usize,
}

impl<'s> Cursor<'s> {
    fn new(source: &'s str) -> Self {
        Self { chars: source.chars().peekable(), line: 1, column: 1 }
    }

    fn position(&self) -> Position {
        Position { line: self.line, column: self.column }
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    /// Consumes a `{% ... %}` comment whose `{` has already been consumed.
    fn skip_comment(&mut self, start: Position) -> Result<()> {
        // the opening '%'
        self.bump();
        let mut last = '\0';
        while let Some(c) = self.bump() {
            if c == '}' && last == '%' {
                return Ok(());
            }
            last = c;
        }
        Err(Error::syntax("unterminated comment").at(start))
    }
}

/// Walks `source`, handing literal text and nodes to `handler`.
///
/// A backslash before `{`, `}` or another backslash makes that character
/// literal. `{%...%}` comments are dropped. A raw line break inside an open
/// node is a syntax error.
pub fn extract_nodes<H: NodeHandler>(source: &str, handler: &mut H) -> Result<()> {
    let mut cursor = Cursor::new(source);
    // Open nodes from outermost to innermost
    let mut levels: Vec<(String, Position)> = Vec::new();
    let mut text = String::new();

    while let Some(c) = cursor.peek() {
        let position = cursor.position();
        cursor.bump();

        match c {
            '\\' => {
                let literal = match cursor.peek() {
                    Some(next @ ('{' | '}' | '\\')) => {
                        cursor.bump();
                        next
                    }
                    _ => '\\',
                };
                push_char(&mut levels, &mut text, literal);
            }
            '{' if cursor.peek().is_some_and(is_node_start) => {
                if cursor.peek() == Some('%') {
                    cursor.skip_comment(position)?;
                } else {
                    if levels.is_empty() && !text.is_empty() {
                        handler.text(&text)?;
                        text.clear();
                    }
                    levels.push((String::new(), position));
                }
            }
            '}' if !levels.is_empty() => {
                let Some((node, start)) = levels.pop() else {
                    continue;
                };
                let inner = !levels.is_empty();
                trace!("resolving node {{{node}}} at {start} (inner: {inner})");
                let compiled = handler.node(&node, inner).map_err(|e| e.at(start))?;

                match levels.last_mut() {
                    Some((parent, _)) => parent.push_str(&compiled),
                    None if !compiled.is_empty() => handler.text(&compiled)?,
                    None => {}
                }
            }
            '\n' if !levels.is_empty() => {
                let (partial, start) = &levels[levels.len() - 1];
                return Err(Error::syntax(format!(
                    "found illegal line break in a node ({partial})"
                ))
                .at(*start));
            }
            _ => push_char(&mut levels, &mut text, c),
        }
    }

    if let Some((partial, start)) = levels.pop() {
        return Err(Error::syntax(format!("unterminated node {{{partial}")).at(start));
    }

    if !text.is_empty() {
        handler.text(&text)?;
    }

    Ok(())
}

fn push_char(levels: &mut [(String, Position)], text: &mut String, c: char) {
    match levels.last_mut() {
        Some((node, _)) => node.push(c),
        None => text.push(c),
    }
}

struct Replacer<F> {
    callback: F,
    output: String,
}

impl<F> NodeHandler for Replacer<F>
where
    F: FnMut(&str, bool) -> Result<String>,
{
    fn text(&mut self, text: &str) -> Result<()> {
        self.output.push_str(text);
        Ok(())
    }

    fn node(&mut self, node: &str, inner: bool) -> Result<String> {
        (self.callback)(node, inner)
    }
}

/// Replaces every node of `source` by the result of `callback`.
///
/// # Arguments
/// * `source` - Template text to walk
/// * `callback` - Receives the node content and whether it is nested
///
/// # Returns
/// * `Result<String>` - The text with all nodes replaced
pub fn replace_nodes<F>(source: &str, callback: F) -> Result<String>
where
    F: FnMut(&str, bool) -> Result<String>,
{
    let mut replacer = Replacer { callback, output: String::new() };
    extract_nodes(source, &mut replacer)?;
    Ok(replacer.output)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn echo(source: &str) -> Result<String> {
        replace_nodes(source, |node, inner| {
            Ok(if inner { format!("<{node}>") } else { format!("[{node}]") })
        })
    }

    #[test]
    fn test_innermost_first() {
        assert_eq!(echo("a {if {$b}} c").unwrap(), "a [if <$b>] c");
        assert_eq!(echo("{$a.{$b.{$c}}}").unwrap(), "[$a.<$b.<$c>>]");
    }

    #[test]
    fn test_literal_braces() {
        assert_eq!(echo("{ x }").unwrap(), "{ x }");
        assert_eq!(echo("a } b").unwrap(), "a } b");
        assert_eq!(echo("{").unwrap(), "{");
    }

    #[test]
    fn test_position_of_failing_node() {
        let err = replace_nodes("ab\n  {boom}", |_, _| Err(Error::unknown_node("boom"))).unwrap_err();
        assert_eq!(err.position(), Some(Position { line: 2, column: 3 }));
    }
}
