//! Engine configuration and variable files.
//! Both are read as JSON first, falling back to YAML.

use crate::constants::{CONFIG_FILES, DEFAULT_MAX_DEPTH};
use crate::error::{Error, Result};
use log::debug;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::io::Read;
use std::path::{Path, PathBuf};

fn default_max_depth() -> usize {
    DEFAULT_MAX_DEPTH
}

/// Rendering settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Bound on nested includes and block invocations
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// Fail on unknown filter names instead of passing the value through
    #[serde(default)]
    pub strict_filters: bool,

    /// Root directory of the filesystem loader
    #[serde(default)]
    pub base_dir: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { max_depth: DEFAULT_MAX_DEPTH, strict_filters: false, base_dir: None }
    }
}

/// Finds the first configuration file present in `dir`.
///
/// # Arguments
/// * `dir` - Directory to look in
///
/// # Returns
/// * `Option<PathBuf>` - Path of the first existing file of [`CONFIG_FILES`]
pub fn find_config<P: AsRef<Path>>(dir: P) -> Option<PathBuf> {
    CONFIG_FILES
        .iter()
        .map(|file| dir.as_ref().join(file))
        .find(|path| path.is_file())
}

/// Loads an [`EngineConfig`] from `path`.
///
/// # Errors
/// * `Error::IoError` if the file cannot be read
/// * `Error::ConfigError` if its content is neither valid JSON nor valid YAML
pub fn load_config_file<P: AsRef<Path>>(path: P) -> Result<EngineConfig> {
    let path = path.as_ref();
    debug!("Loading configuration from {}", path.display());
    let content = std::fs::read_to_string(path).map_err(Error::IoError)?;
    parse_config(&content)
}

/// Loads the configuration found in `dir`, or the default one.
pub fn get_config<P: AsRef<Path>>(dir: P) -> Result<EngineConfig> {
    match find_config(dir) {
        Some(path) => load_config_file(path),
        None => Ok(EngineConfig::default()),
    }
}

fn parse<T: DeserializeOwned>(content: &str, what: &str) -> Result<T> {
    // Try parsing as JSON first
    match serde_json::from_str(content) {
        Ok(v) => Ok(v),
        Err(_) => serde_yaml::from_str(content)
            .map_err(|e| Error::ConfigError(format!("Invalid {what} format: {e}"))),
    }
}

/// Parses configuration content.
pub fn parse_config(content: &str) -> Result<EngineConfig> {
    if content.trim().is_empty() {
        return Ok(EngineConfig::default());
    }
    parse(content, "configuration")
}

/// Parses a variable file: a mapping of names to template values.
///
/// # Returns
/// * `Result<serde_json::Map<String, Value>>` - Variables in file order
///
/// # Errors
/// * `Error::ConfigError` if the content is not a mapping
pub fn parse_variables(content: &str) -> Result<serde_json::Map<String, Value>> {
    if content.trim().is_empty() {
        return Ok(serde_json::Map::new());
    }
    match parse::<Value>(content, "variables")? {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(serde_json::Map::new()),
        other => Err(Error::ConfigError(format!(
            "Variables must be a mapping, got {other}"
        ))),
    }
}

/// Reads template variables from a file, from stdin, or neither.
///
/// # Arguments
/// * `vars_file` - JSON or YAML variable file
/// * `take_from_stdin` - Read the variables from stdin instead of a file
///
/// # Returns
/// * `Result<serde_json::Map<String, Value>>` - Variables in source order
pub fn get_variables_from(
    vars_file: Option<&Path>,
    take_from_stdin: bool,
) -> Result<serde_json::Map<String, Value>> {
    if take_from_stdin {
        let mut buffer = String::new();
        std::io::stdin().read_to_string(&mut buffer)?;
        return parse_variables(&buffer);
    }
    match vars_file {
        Some(path) => {
            debug!("Loading variables from {}", path.display());
            let content = std::fs::read_to_string(path).map_err(Error::IoError)?;
            parse_variables(&content)
        }
        None => Ok(serde_json::Map::new()),
    }
}
