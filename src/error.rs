//! Error handling for wtemplate.
//! Defines the error taxonomy shared by the compiler, the renderer and the CLI.

use std::fmt;
use std::io;
use thiserror::Error;

/// Location of a node in template source, 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

fn located(position: &Option<Position>) -> String {
    match position {
        Some(position) => format!(" (at {position})"),
        None => String::new(),
    }
}

/// Custom error types for template compilation and rendering.
///
/// Compile-time kinds carry the position of the offending node once the
/// node extractor has seen them; render-time failures only carry a message.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed directive arguments or an illegal line break inside a node
    #[error("Syntax error: {message}{}", located(.position))]
    SyntaxError { message: String, position: Option<Position> },

    /// Mismatched or unclosed open/close nodes
    #[error("Unbalanced node error: {message}{}", located(.position))]
    UnbalancedNodeError { message: String, position: Option<Position> },

    /// A node name with no built-in or registered handler
    #[error("Unknown node error: no handler found for node {{{node}}}{}", located(.position))]
    UnknownNodeError { node: String, position: Option<Position> },

    /// Failure while evaluating a path, filter or expression during rendering
    #[error("Execution error: {0}.")]
    ExecutionError(String),

    /// Represents errors that occur during file system operations
    #[error("IO error: {0}.")]
    IoError(#[from] io::Error),

    /// Represents errors that occur during configuration parsing or processing
    #[error("Configuration error: {0}.")]
    ConfigError(String),
}

impl Error {
    pub fn syntax<S: Into<String>>(message: S) -> Self {
        Error::SyntaxError { message: message.into(), position: None }
    }

    pub fn unbalanced<S: Into<String>>(message: S) -> Self {
        Error::UnbalancedNodeError { message: message.into(), position: None }
    }

    pub fn unknown_node<S: Into<String>>(node: S) -> Self {
        Error::UnknownNodeError { node: node.into(), position: None }
    }

    pub fn execution<S: Into<String>>(message: S) -> Self {
        Error::ExecutionError(message.into())
    }

    /// Attaches `at` to a compile-time error that has no position yet.
    pub fn at(mut self, at: Position) -> Self {
        match &mut self {
            Error::SyntaxError { position, .. }
            | Error::UnbalancedNodeError { position, .. }
            | Error::UnknownNodeError { position, .. } => {
                if position.is_none() {
                    *position = Some(at);
                }
            }
            _ => {}
        }
        self
    }

    /// Source position of a compile-time error, if known.
    pub fn position(&self) -> Option<Position> {
        match self {
            Error::SyntaxError { position, .. }
            | Error::UnbalancedNodeError { position, .. }
            | Error::UnknownNodeError { position, .. } => *position,
            _ => None,
        }
    }
}

/// Convenience type alias for Results with wtemplate's Error as the error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Default error handler that prints the error and exits the program.
///
/// # Arguments
/// * `err` - The error to handle
pub fn default_error_handler(err: Error) {
    eprintln!("{err}");
    std::process::exit(1);
}
