//! Dispatch table mapping node names to their handlers.
//!
//! Built-in directives are fixed entries of the table; external handlers are
//! layered on top through the same lookup. A name keeps its first
//! registration, so built-ins cannot be shadowed.
//!
//! The registry belongs to a [`Compiler`](crate::compiler::Compiler) instead
//! of being process-wide state: share a compiler across threads only behind
//! your own synchronization.

use crate::error::Result;
use crate::instruction::Instruction;
use indexmap::IndexMap;
use log::{debug, warn};
use std::sync::Arc;

/// Handler of an opening node: receives the raw argument string.
pub type OpenHandler = Arc<dyn Fn(&str) -> Result<Vec<Instruction>> + Send + Sync>;

/// Handler of a closing node.
pub type CloseHandler = Arc<dyn Fn() -> Result<Vec<Instruction>> + Send + Sync>;

/// Built-in directives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    If,
    ElseIf,
    Else,
    For,
    Empty,
    Set,
    DefineBlock,
    Block,
    Range,
    Include,
}

impl Builtin {
    pub const ALL: [(&'static str, Builtin); 10] = [
        ("if", Builtin::If),
        ("elseif", Builtin::ElseIf),
        ("else", Builtin::Else),
        ("for", Builtin::For),
        ("empty", Builtin::Empty),
        ("set", Builtin::Set),
        ("define_block", Builtin::DefineBlock),
        ("block", Builtin::Block),
        ("range", Builtin::Range),
        ("include", Builtin::Include),
    ];

    /// Whether the directive opens a section that needs a closing node.
    pub fn has_close(self) -> bool {
        matches!(
            self,
            Builtin::If | Builtin::For | Builtin::Empty | Builtin::DefineBlock | Builtin::Range
        )
    }
}

/// An external handler pair.
#[derive(Clone)]
pub struct External {
    pub open: OpenHandler,
    pub close: Option<CloseHandler>,
}

/// Capability registered for a node name.
#[derive(Clone)]
pub enum Handler {
    Builtin(Builtin),
    External(External),
}

impl Handler {
    pub fn has_close(&self) -> bool {
        match self {
            Handler::Builtin(builtin) => builtin.has_close(),
            Handler::External(external) => external.close.is_some(),
        }
    }
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Handler::Builtin(builtin) => write!(f, "Builtin({builtin:?})"),
            Handler::External(external) => {
                write!(f, "External(close: {})", external.close.is_some())
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct Registry {
    handlers: IndexMap<String, Handler>,
}

impl Default for Registry {
    fn default() -> Self {
        Registry::new()
    }
}

impl Registry {
    /// Creates a registry holding the built-in directives.
    pub fn new() -> Self {
        let handlers = Builtin::ALL
            .iter()
            .map(|(name, builtin)| (name.to_string(), Handler::Builtin(*builtin)))
            .collect();
        Self { handlers }
    }

    /// Registers an external handler for `name` unless the name is taken.
    ///
    /// # Returns
    /// * `bool` - Whether the handler was added
    pub fn register<O>(&mut self, name: &str, open: O, close: Option<CloseHandler>) -> bool
    where
        O: Fn(&str) -> Result<Vec<Instruction>> + Send + Sync + 'static,
    {
        if self.handlers.contains_key(name) {
            debug!("handler for node {{{name}}} already registered, ignoring");
            return false;
        }
        self.handlers.insert(
            name.to_string(),
            Handler::External(External { open: Arc::new(open), close }),
        );
        debug!("registered handler for node {{{name}}}");
        true
    }

    /// Removes the external handler registered for `name`.
    pub fn unregister(&mut self, name: &str) -> bool {
        match self.handlers.get(name) {
            Some(Handler::External(_)) => {
                self.handlers.shift_remove(name);
                debug!("unregistered handler for node {{{name}}}");
                true
            }
            Some(Handler::Builtin(_)) => {
                warn!("built-in node {{{name}}} cannot be unregistered");
                false
            }
            None => false,
        }
    }

    pub fn get(&self, name: &str) -> Option<&Handler> {
        self.handlers.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }
}
