//! Compiled form of a template.
//!
//! A template compiles to a flat sequence of instructions. Structured
//! instructions (conditionals, loops, block definitions) are paired with
//! their partners once, when the [`Template`] is built, so the renderer can
//! jump between them without re-scanning.

use crate::error::{Error, Result};
use crate::expr::Expr;
use crate::variable::{VarExpr, VarPath};
use indexmap::IndexMap;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// A `{range}` bound.
#[derive(Debug, Clone, PartialEq)]
pub enum Bound {
    Literal(i64),
    Var(VarExpr),
}

/// A piece of an `{include}` path.
#[derive(Debug, Clone, PartialEq)]
pub enum PathPart {
    Text(String),
    Var(VarExpr),
}

/// One unit of compiled output.
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    Literal(String),
    Emit(VarExpr),
    BeginIf(Expr),
    ElseIf(Expr),
    Else,
    EndIf,
    BeginForEach {
        key: Option<VarPath>,
        value: VarPath,
        collection: Expr,
        /// Loop nesting depth, starting at 1
        depth: usize,
    },
    /// Opens an `{empty}` section rendered when the loop at `depth` ran zero times.
    /// `inline` sections sit inside their loop's body and act as its else-clause.
    Empty {
        depth: usize,
        inline: bool,
    },
    EndEmpty,
    EndFor,
    Assign {
        target: VarPath,
        value: Expr,
    },
    BeginBlockDef {
        name: String,
        params: Vec<String>,
    },
    EndBlockDef,
    InvokeBlock {
        name: String,
        args: Vec<Expr>,
    },
    BeginRange {
        counter: VarPath,
        start: Bound,
        step: Bound,
        end: Bound,
    },
    EndRange,
    Include(Vec<PathPart>),
}

impl Instruction {
    fn name(&self) -> &'static str {
        match self {
            Instruction::Literal(_) => "literal",
            Instruction::Emit(_) => "$",
            Instruction::BeginIf(_) | Instruction::EndIf => "if",
            Instruction::ElseIf(_) => "elseif",
            Instruction::Else => "else",
            Instruction::BeginForEach { .. } | Instruction::EndFor => "for",
            Instruction::Empty { .. } | Instruction::EndEmpty => "empty",
            Instruction::Assign { .. } => "set",
            Instruction::BeginBlockDef { .. } | Instruction::EndBlockDef => "define_block",
            Instruction::InvokeBlock { .. } => "block",
            Instruction::BeginRange { .. } | Instruction::EndRange => "range",
            Instruction::Include(_) => "include",
        }
    }
}

/// Jump information for a structured instruction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Link {
    /// Index of the partner instruction: next branch of an `if` chain, or the
    /// closing instruction of a loop, section or block definition.
    pub next: usize,
    /// For a loop, the index of its inline `{empty}` section.
    pub clause: Option<usize>,
}

/// A hoisted `{define_block}`.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockDef {
    pub params: Vec<String>,
    pub body: Range<usize>,
}

#[derive(Debug, PartialEq)]
struct Program {
    instructions: Vec<Instruction>,
    links: Vec<Link>,
    blocks: IndexMap<String, BlockDef>,
    dir: Option<PathBuf>,
}

/// An executable unit: linked instructions plus the blocks they define.
///
/// Cloning is cheap; clones share the same program.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    program: Rc<Program>,
}

impl Template {
    /// Links `instructions`, checking that structured instructions are balanced.
    pub fn new(instructions: Vec<Instruction>, dir: Option<&Path>) -> Result<Self> {
        let (links, blocks) = link(&instructions)?;
        Ok(Self {
            program: Rc::new(Program {
                instructions,
                links,
                blocks,
                dir: dir.map(Path::to_path_buf),
            }),
        })
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.program.instructions
    }

    pub fn link(&self, index: usize) -> Link {
        self.program.links[index]
    }

    pub fn blocks(&self) -> &IndexMap<String, BlockDef> {
        &self.program.blocks
    }

    /// Directory hint the template was compiled with.
    pub fn dir(&self) -> Option<&Path> {
        self.program.dir.as_deref()
    }

    pub fn len(&self) -> usize {
        self.program.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.program.instructions.is_empty()
    }
}

enum Frame {
    If { last_branch: usize, has_else: bool },
    For { start: usize, clause: Option<usize> },
    Empty { start: usize },
    Block { start: usize },
    Range { start: usize },
}

impl Frame {
    fn name(&self) -> &'static str {
        match self {
            Frame::If { .. } => "if",
            Frame::For { .. } => "for",
            Frame::Empty { .. } => "empty",
            Frame::Block { .. } => "define_block",
            Frame::Range { .. } => "range",
        }
    }
}

fn link(instructions: &[Instruction]) -> Result<(Vec<Link>, IndexMap<String, BlockDef>)> {
    let mut links = vec![Link::default(); instructions.len()];
    let mut blocks = IndexMap::new();
    let mut stack: Vec<Frame> = Vec::new();

    let mismatch = |instruction: &Instruction, stack: &[Frame]| {
        let expected = stack.last().map(Frame::name).unwrap_or("nothing");
        Error::unbalanced(format!(
            "mismatched {{{}}} node, expected closing of {{{expected}}}",
            instruction.name()
        ))
    };

    for (i, instruction) in instructions.iter().enumerate() {
        match instruction {
            Instruction::BeginIf(_) => stack.push(Frame::If { last_branch: i, has_else: false }),
            Instruction::ElseIf(_) | Instruction::Else => match stack.last_mut() {
                Some(Frame::If { last_branch, has_else }) if !*has_else => {
                    links[*last_branch].next = i;
                    *last_branch = i;
                    *has_else = matches!(instruction, Instruction::Else);
                }
                Some(Frame::If { .. }) => {
                    return Err(Error::syntax(format!(
                        "{{{}}} found after {{else}}",
                        instruction.name()
                    )))
                }
                _ => {
                    return Err(Error::syntax(format!(
                        "{{{}}} found outside of {{if}}",
                        instruction.name()
                    )))
                }
            },
            Instruction::EndIf => match stack.pop() {
                Some(Frame::If { last_branch, .. }) => links[last_branch].next = i,
                other => return Err(mismatch(instruction, other.as_slice())),
            },
            Instruction::BeginForEach { .. } => stack.push(Frame::For { start: i, clause: None }),
            Instruction::Empty { inline, .. } => {
                if *inline {
                    match stack.last_mut() {
                        Some(Frame::For { clause, .. }) if clause.is_none() => *clause = Some(i),
                        Some(Frame::For { .. }) => {
                            return Err(Error::syntax("a {for} loop has more than one {empty} section"))
                        }
                        _ => return Err(Error::syntax("inline {empty} found outside of {for}")),
                    }
                }
                stack.push(Frame::Empty { start: i });
            }
            Instruction::EndEmpty => match stack.pop() {
                Some(Frame::Empty { start }) => links[start].next = i,
                other => return Err(mismatch(instruction, other.as_slice())),
            },
            Instruction::EndFor => match stack.pop() {
                Some(Frame::For { start, clause }) => links[start] = Link { next: i, clause },
                other => return Err(mismatch(instruction, other.as_slice())),
            },
            Instruction::BeginBlockDef { .. } => {
                if stack.iter().any(|f| matches!(f, Frame::Block { .. })) {
                    return Err(Error::syntax("{define_block} cannot be nested"));
                }
                stack.push(Frame::Block { start: i });
            }
            Instruction::EndBlockDef => match stack.pop() {
                Some(Frame::Block { start }) => {
                    links[start].next = i;
                    if let Instruction::BeginBlockDef { name, params } = &instructions[start] {
                        let def = BlockDef { params: params.clone(), body: start + 1..i };
                        if blocks.insert(name.clone(), def).is_some() {
                            return Err(Error::syntax(format!("block \"{name}\" is defined twice")));
                        }
                    }
                }
                other => return Err(mismatch(instruction, other.as_slice())),
            },
            Instruction::BeginRange { .. } => stack.push(Frame::Range { start: i }),
            Instruction::EndRange => match stack.pop() {
                Some(Frame::Range { start }) => links[start].next = i,
                other => return Err(mismatch(instruction, other.as_slice())),
            },
            Instruction::Literal(_)
            | Instruction::Emit(_)
            | Instruction::Assign { .. }
            | Instruction::InvokeBlock { .. }
            | Instruction::Include(_) => {}
        }
    }

    if !stack.is_empty() {
        let open: Vec<&str> = stack.iter().map(Frame::name).collect();
        return Err(Error::unbalanced(format!(
            "some nodes were not properly closed ({})",
            open.join(", ")
        )));
    }

    Ok((links, blocks))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cond() -> Expr {
        Expr::Literal(json!(true))
    }

    #[test]
    fn test_if_chain_links() {
        let template = Template::new(
            vec![
                Instruction::BeginIf(cond()),
                Instruction::Literal("a".into()),
                Instruction::ElseIf(cond()),
                Instruction::Else,
                Instruction::EndIf,
            ],
            None,
        )
        .unwrap();
        assert_eq!(template.link(0).next, 2);
        assert_eq!(template.link(2).next, 3);
        assert_eq!(template.link(3).next, 4);
    }

    #[test]
    fn test_unbalanced_fragments() {
        let err = Template::new(vec![Instruction::EndFor], None).unwrap_err();
        assert!(matches!(err, Error::UnbalancedNodeError { .. }));

        let err = Template::new(vec![Instruction::Else], None).unwrap_err();
        assert!(matches!(err, Error::SyntaxError { .. }));

        let err = Template::new(vec![Instruction::BeginIf(cond())], None).unwrap_err();
        assert!(err.to_string().contains("(if)"));
    }
}
