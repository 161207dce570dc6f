//! Template loaders.
//!
//! A loader turns an `{include}` reference into a compiled [`Template`],
//! handing the compiler the directory used to resolve the unit's own relative
//! includes.

use crate::compiler::Compiler;
use crate::error::{Error, Result};
use crate::instruction::Template;
use indexmap::IndexMap;
use log::{debug, trace};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Supplies compiled templates by reference.
pub trait TemplateLoader {
    /// Loads and compiles the template referenced by `href`.
    ///
    /// # Arguments
    /// * `href` - Template reference, as written in `{include}` after variable substitution
    /// * `compiler` - Compiler to use for sources not yet compiled
    ///
    /// # Returns
    /// * `Result<Template>` - The compiled unit
    fn load(&self, href: &str, compiler: &Compiler) -> Result<Template>;
}

fn io_error(path: &Path, err: io::Error) -> Error {
    Error::IoError(io::Error::new(err.kind(), format!("{}: {err}", path.display())))
}

/// Loads templates from disk, caching compiled units by path and modification time.
#[derive(Debug, Default)]
pub struct FileSystemLoader {
    base_dir: Option<PathBuf>,
    cache: RefCell<HashMap<PathBuf, (SystemTime, Template)>>,
}

impl FileSystemLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves relative references against `base_dir`.
    pub fn with_base_dir<P: Into<PathBuf>>(base_dir: P) -> Self {
        Self { base_dir: Some(base_dir.into()), cache: RefCell::default() }
    }

    pub fn resolve(&self, href: &str) -> PathBuf {
        let path = Path::new(href);
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }
}

impl TemplateLoader for FileSystemLoader {
    fn load(&self, href: &str, compiler: &Compiler) -> Result<Template> {
        let path = self.resolve(href);
        let modified = fs::metadata(&path)
            .and_then(|metadata| metadata.modified())
            .map_err(|e| io_error(&path, e))?;

        if let Some((cached_at, template)) = self.cache.borrow().get(&path) {
            if *cached_at == modified {
                trace!("template cache hit for {}", path.display());
                return Ok(template.clone());
            }
        }

        debug!("compiling template {}", path.display());
        let source = fs::read_to_string(&path).map_err(|e| io_error(&path, e))?;
        let dir = path.parent().filter(|dir| !dir.as_os_str().is_empty());
        let template = compiler.compile(&source, dir)?;

        self.cache.borrow_mut().insert(path, (modified, template.clone()));
        Ok(template)
    }
}

/// Serves templates from named in-memory sources.
#[derive(Debug, Default, Clone)]
pub struct MemoryLoader {
    sources: IndexMap<String, String>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<N: Into<String>, S: Into<String>>(&mut self, name: N, source: S) {
        self.sources.insert(name.into(), source.into());
    }

    pub fn with_source<N: Into<String>, S: Into<String>>(mut self, name: N, source: S) -> Self {
        self.insert(name, source);
        self
    }
}

impl TemplateLoader for MemoryLoader {
    fn load(&self, href: &str, compiler: &Compiler) -> Result<Template> {
        let source = self.sources.get(href).ok_or_else(|| {
            Error::IoError(io::Error::new(io::ErrorKind::NotFound, format!("{href}: no such template")))
        })?;
        compiler.compile(source, None)
    }
}
