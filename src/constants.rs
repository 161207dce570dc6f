//! Common constants used throughout wtemplate.

/// Supported configuration file names, in lookup order
pub const CONFIG_FILES: [&str; 3] = ["wtemplate.json", "wtemplate.yml", "wtemplate.yaml"];

/// Default bound on nested includes and block invocations
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Bound on nested parentheses, unary operators and variable segments in one node
pub const MAX_EXPR_NESTING: usize = 64;
