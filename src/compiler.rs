//! Node compilation.
//!
//! Each node found by the extractor is dispatched by name to a built-in
//! directive or an external handler and turned into instructions. Nodes whose
//! handler has a closing counterpart are tracked on an open-node stack that
//! must be empty once the whole source is compiled.

use crate::error::{Error, Result};
use crate::expr::Expr;
use crate::instruction::{Bound, Instruction, PathPart, Template};
use crate::parser::extract_nodes;
use crate::parser::NodeHandler;
use crate::registry::{Builtin, CloseHandler, Handler, Registry};
use crate::variable::{unwrap_node, Mode, VarExpr, VarPath};
use log::debug;
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

fn for_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?:\{?\$([A-Za-z0-9_]+)\}?,\s*)?\{?\$([A-Za-z0-9_]+)\}?\s+in\s+(.+)$")
            .expect("valid for pattern")
    })
}

fn range_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        let bound = r"(?:\{?\$([A-Za-z0-9_]+)\}?|(-?[0-9]+))";
        Regex::new(&format!(
            r"^\{{?\$([A-Za-z0-9_]+)\}}?\s*=\s*{bound}\.(?:{bound})?\.{bound}\s*$"
        ))
        .expect("valid range pattern")
    })
}

fn identifier_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_]+").expect("valid identifier pattern"))
}

/// Compiles template sources into executable [`Template`]s.
#[derive(Debug, Clone, Default)]
pub struct Compiler {
    registry: Registry,
}

impl Compiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Registers an external node handler; see [`Registry::register`].
    pub fn register<O>(&mut self, name: &str, open: O, close: Option<CloseHandler>) -> bool
    where
        O: Fn(&str) -> Result<Vec<Instruction>> + Send + Sync + 'static,
    {
        self.registry.register(name, open, close)
    }

    pub fn unregister(&mut self, name: &str) -> bool {
        self.registry.unregister(name)
    }

    /// Compiles `source`.
    ///
    /// # Arguments
    /// * `source` - Template text
    /// * `dir` - Directory of the template, used to resolve relative `{include}` paths
    ///
    /// # Returns
    /// * `Result<Template>` - The linked instruction sequence
    pub fn compile(&self, source: &str, dir: Option<&Path>) -> Result<Template> {
        let mut session = Session {
            registry: &self.registry,
            dir: dir.map(|d| d.to_string_lossy().replace('\\', "/")),
            instructions: Vec::new(),
            open_nodes: Vec::new(),
            for_depth: 0,
            mode: Mode::Shared,
            closed_inner_for: false,
        };

        extract_nodes(source, &mut session)?;

        if !session.open_nodes.is_empty() {
            return Err(Error::unbalanced(format!(
                "some tags were not properly closed ({})",
                session.open_nodes.join(", ")
            )));
        }

        debug!("compiled {} instructions", session.instructions.len());
        Template::new(session.instructions, dir)
    }
}

/// State of one compilation.
struct Session<'c> {
    registry: &'c Registry,
    dir: Option<String>,
    instructions: Vec<Instruction>,
    open_nodes: Vec<String>,
    for_depth: usize,
    mode: Mode,
    /// A `{for}` was closed inside the body of the innermost open loop
    closed_inner_for: bool,
}

impl NodeHandler for Session<'_> {
    fn text(&mut self, text: &str) -> Result<()> {
        match self.instructions.last_mut() {
            Some(Instruction::Literal(literal)) => literal.push_str(text),
            _ => self.instructions.push(Instruction::Literal(text.to_string())),
        }
        Ok(())
    }

    fn node(&mut self, node: &str, inner: bool) -> Result<String> {
        let trimmed = node.trim();
        if trimmed.is_empty() {
            return Ok(String::new());
        }

        if trimmed.starts_with('$') {
            if inner {
                // Inner variables are interpreted by the directive owning them
                return Ok(format!("{{{node}}}"));
            }
            let var = VarExpr::parse(trimmed, self.mode)?;
            self.instructions.push(Instruction::Emit(var));
            return Ok(String::new());
        }

        let fragment = match trimmed.strip_prefix('/') {
            Some(name) => self.compile_close(name.trim(), inner)?,
            None => self.compile_open(trimmed, inner)?,
        };

        if inner {
            return literal_text(fragment, trimmed);
        }
        for instruction in fragment {
            match instruction {
                Instruction::Literal(text) => self.text(&text)?,
                other => self.instructions.push(other),
            }
        }
        Ok(String::new())
    }
}

/// Joins a nested node's output, which must be plain text.
fn literal_text(fragment: Vec<Instruction>, node: &str) -> Result<String> {
    fragment
        .into_iter()
        .map(|instruction| match instruction {
            Instruction::Literal(text) => Ok(text),
            _ => Err(Error::syntax(format!("node {{{node}}} cannot be nested in another node"))),
        })
        .collect()
}

impl Session<'_> {
    fn compile_close(&mut self, name: &str, inner: bool) -> Result<Vec<Instruction>> {
        if inner {
            return Err(Error::syntax(format!("closing node {{/{name}}} cannot be nested")));
        }

        match self.open_nodes.pop() {
            Some(open) if open == name => {}
            Some(open) => {
                return Err(Error::unbalanced(format!(
                    "mismatched node {{/{name}}}, expected {{/{open}}}"
                )))
            }
            None => {
                return Err(Error::unbalanced(format!(
                    "mismatched node {{/{name}}} opening tag"
                )))
            }
        }

        let registry = self.registry;
        let fragment = match registry.get(name) {
            Some(Handler::Builtin(builtin)) => self.close_builtin(*builtin),
            Some(Handler::External(external)) => match &external.close {
                Some(close) => close(),
                None => Err(Error::unknown_node(format!("{name}_close"))),
            },
            None => Err(Error::unknown_node(format!("{name}_close"))),
        }?;

        if name == "for" {
            self.closed_inner_for = true;
        }
        Ok(fragment)
    }

    fn compile_open(&mut self, node: &str, inner: bool) -> Result<Vec<Instruction>> {
        let name = identifier_pattern()
            .find(node)
            .map(|m| m.as_str())
            .ok_or_else(|| Error::syntax(format!("invalid node \"{{{node}}}\"")))?;
        let args = node[name.len()..].trim();

        let registry = self.registry;
        let handler = registry.get(name).ok_or_else(|| Error::unknown_node(node))?;
        let has_close = handler.has_close();
        if inner && has_close {
            return Err(Error::syntax(format!("node {{{name}}} cannot be nested")));
        }

        let fragment = match handler {
            Handler::Builtin(builtin) => self.open_builtin(*builtin, args)?,
            Handler::External(external) => (external.open)(args)?,
        };
        debug!("compiled node {{{node}}}");

        if has_close {
            self.open_nodes.push(name.to_string());
        }
        Ok(fragment)
    }

    fn open_builtin(&mut self, builtin: Builtin, args: &str) -> Result<Vec<Instruction>> {
        match builtin {
            Builtin::If => Ok(vec![Instruction::BeginIf(self.condition("if", args)?)]),
            Builtin::ElseIf => {
                self.expect_inside_if("elseif")?;
                Ok(vec![Instruction::ElseIf(self.condition("elseif", args)?)])
            }
            Builtin::Else => {
                self.expect_inside_if("else")?;
                Ok(vec![Instruction::Else])
            }
            Builtin::For => self.compile_for(args),
            Builtin::Empty => Ok(vec![self.compile_empty()]),
            Builtin::Set => self.compile_set(args),
            Builtin::DefineBlock => self.compile_define_block(args),
            Builtin::Block => self.compile_block(args),
            Builtin::Range => self.compile_range(args),
            Builtin::Include => self.compile_include(args),
        }
    }

    fn close_builtin(&mut self, builtin: Builtin) -> Result<Vec<Instruction>> {
        let instruction = match builtin {
            Builtin::If => Instruction::EndIf,
            Builtin::For => {
                self.for_depth = self.for_depth.saturating_sub(1);
                Instruction::EndFor
            }
            Builtin::Empty => Instruction::EndEmpty,
            Builtin::DefineBlock => {
                self.mode = Mode::Shared;
                Instruction::EndBlockDef
            }
            Builtin::Range => Instruction::EndRange,
            other => return Err(Error::unknown_node(format!("{other:?}_close").to_lowercase())),
        };
        Ok(vec![instruction])
    }

    fn condition(&self, name: &str, args: &str) -> Result<Expr> {
        if args.is_empty() {
            return Err(Error::syntax(format!("{{{name}}} requires a condition")));
        }
        Expr::parse(args, self.mode)
    }

    fn expect_inside_if(&self, name: &str) -> Result<()> {
        match self.open_nodes.last() {
            Some(open) if open == "if" => Ok(()),
            _ => Err(Error::syntax(format!("{{{name}}} found outside of {{if}}"))),
        }
    }

    /// `{for [$key, ]$value in collection}`
    fn compile_for(&mut self, args: &str) -> Result<Vec<Instruction>> {
        let captures = for_pattern()
            .captures(args)
            .ok_or_else(|| Error::syntax(format!("wrong syntax for node {{for {args}}}")))?;

        let key = captures.get(1).map(|m| VarPath::simple(m.as_str(), self.mode));
        let value = VarPath::simple(&captures[2], self.mode);
        let collection = Expr::parse(&captures[3], self.mode)?;

        self.for_depth += 1;
        self.closed_inner_for = false;
        Ok(vec![Instruction::BeginForEach { key, value, collection, depth: self.for_depth }])
    }

    /// `{empty}` following a closed `{for}` refers to the loop at the next
    /// depth; directly inside a loop body with no closed inner loop it is that
    /// loop's else-clause.
    fn compile_empty(&self) -> Instruction {
        let inside_for = self.open_nodes.last().is_some_and(|open| open == "for");
        if inside_for && !self.closed_inner_for {
            Instruction::Empty { depth: self.for_depth, inline: true }
        } else {
            Instruction::Empty { depth: self.for_depth + 1, inline: false }
        }
    }

    /// `{set target = value}`
    fn compile_set(&self, args: &str) -> Result<Vec<Instruction>> {
        let (target, value) = args
            .split_once('=')
            .filter(|(_, value)| !value.starts_with('='))
            .ok_or_else(|| Error::syntax(format!("wrong syntax for node {{set {args}}}")))?;

        let target = VarPath::parse(unwrap_node(target.trim()), self.mode)?;
        let value = Expr::parse(value.trim(), self.mode)?;
        Ok(vec![Instruction::Assign { target, value }])
    }

    /// `{define_block name $param...}`
    fn compile_define_block(&mut self, args: &str) -> Result<Vec<Instruction>> {
        if self.open_nodes.iter().any(|open| open == "define_block") {
            return Err(Error::syntax("{define_block} cannot be nested"));
        }

        let mut words = args.split_whitespace();
        let name = words
            .next()
            .filter(|name| is_identifier(name))
            .ok_or_else(|| Error::syntax(format!("wrong syntax for node {{define_block {args}}}")))?;

        let params = words
            .map(|param| {
                unwrap_node(param)
                    .strip_prefix('$')
                    .filter(|p| is_identifier(p))
                    .map(str::to_string)
                    .ok_or_else(|| {
                        Error::syntax(format!("invalid block parameter \"{param}\" in {{define_block {args}}}"))
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        self.mode = Mode::Local;
        Ok(vec![Instruction::BeginBlockDef { name: name.to_string(), params }])
    }

    /// `{block name arg...}`
    fn compile_block(&self, args: &str) -> Result<Vec<Instruction>> {
        let (name, rest) = match args.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, rest),
            None => (args, ""),
        };
        if !is_identifier(name) {
            return Err(Error::syntax(format!("wrong syntax for node {{block {args}}}")));
        }
        let args = Expr::parse_arguments(rest, self.mode)?;
        Ok(vec![Instruction::InvokeBlock { name: name.to_string(), args }])
    }

    /// `{range $i = start.step.end}`, step defaulting to 1
    fn compile_range(&self, args: &str) -> Result<Vec<Instruction>> {
        let captures = range_pattern()
            .captures(args)
            .ok_or_else(|| Error::syntax(format!("wrong syntax for node {{range {args}}}")))?;

        let bound = |var: usize, literal: usize| -> Result<Option<Bound>> {
            if let Some(name) = captures.get(var) {
                let path = VarPath::simple(name.as_str(), self.mode);
                return Ok(Some(Bound::Var(VarExpr { path, filters: Vec::new() })));
            }
            captures
                .get(literal)
                .map(|m| {
                    m.as_str().parse::<i64>().map(Bound::Literal).map_err(|_| {
                        Error::syntax(format!("range bound \"{}\" is out of range", m.as_str()))
                    })
                })
                .transpose()
        };

        let counter = VarPath::simple(&captures[1], self.mode);
        let start = bound(2, 3)?.ok_or_else(|| Error::syntax("missing range start"))?;
        let step = bound(4, 5)?.unwrap_or(Bound::Literal(1));
        let end = bound(6, 7)?.ok_or_else(|| Error::syntax("missing range end"))?;

        if let Bound::Literal(step) = step {
            if step <= 0 {
                return Err(Error::syntax(format!("{{range {args}}} needs a positive step")));
            }
        }

        Ok(vec![Instruction::BeginRange { counter, start, step, end }])
    }

    /// `{include path}`; `{$var}` nodes in the path are concatenated at render time.
    fn compile_include(&self, args: &str) -> Result<Vec<Instruction>> {
        let path: String = args.chars().filter(|c| !matches!(c, '"' | '\'')).collect();
        if path.is_empty() {
            debug!("empty {{include}} ignored");
            return Ok(Vec::new());
        }

        let mut parts = Vec::new();
        let mut rest = path.as_str();
        while let Some(start) = rest.find("{$") {
            if start > 0 {
                parts.push(PathPart::Text(rest[..start].to_string()));
            }
            let end = closing_brace(&rest[start..])
                .map(|end| start + end)
                .ok_or_else(|| Error::syntax(format!("unclosed variable in {{include {args}}}")))?;
            parts.push(PathPart::Var(VarExpr::parse(&rest[start..=end], self.mode)?));
            rest = &rest[end + 1..];
        }
        if !rest.is_empty() {
            parts.push(PathPart::Text(rest.to_string()));
        }

        if let (Some(dir), Some(PathPart::Text(first))) = (&self.dir, parts.first_mut()) {
            if first.starts_with("./") || first.starts_with("../") {
                *first = resolve_relative(dir, first);
            }
        }

        Ok(vec![Instruction::Include(parts)])
    }
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

// Byte index of the brace closing the one `s` starts with.
fn closing_brace(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in s.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Resolves leading `./` and `../` segments of `path` against `dir`.
fn resolve_relative(dir: &str, path: &str) -> String {
    let mut base = dir.trim_end_matches('/').to_string();
    let mut rest = path;
    loop {
        if let Some(stripped) = rest.strip_prefix("./") {
            rest = stripped;
        } else if let Some(stripped) = rest.strip_prefix("../") {
            base = match base.rsplit_once('/') {
                Some((parent, _)) if !parent.is_empty() => parent.to_string(),
                Some(_) => String::new(),
                None => ".".to_string(),
            };
            rest = stripped;
        } else {
            break;
        }
    }
    format!("{base}/{rest}")
}
