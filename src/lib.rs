//! wtemplate compiles brace-delimited template sources into instruction
//! sequences and renders them against a layered variable context.
//! Directives such as `{if}`, `{for}`, `{define_block}` and `{include}` are
//! built in; hosts can register their own node handlers and filters.

/// Command-line interface module for the wtemplate binary
pub mod cli;

/// Node compiler: built-in directives and dispatch to registered handlers
pub mod compiler;

/// Engine configuration and variable files
/// Supports JSON and YAML formats (wtemplate.json, wtemplate.yml, wtemplate.yaml)
pub mod config;

/// Common constants
pub mod constants;

/// Layered variable contexts
pub mod context;

/// Host-facing engine
pub mod engine;

/// Error types and handling for wtemplate
pub mod error;

/// Expression language of directive arguments
pub mod expr;

/// Named value filters
pub mod filters;

/// Compiled instruction sequences
pub mod instruction;

/// Template loaders used by `{include}`
pub mod loader;

pub mod logger;

/// Node extraction from raw template source
pub mod parser;

/// Node handler registry
pub mod registry;

/// Render executor
pub mod renderer;

pub mod value;

/// Variable path parsing
pub mod variable;

pub use compiler::Compiler;
pub use context::ContextStack;
pub use engine::Engine;
pub use error::{Error, Result};
pub use instruction::Template;
