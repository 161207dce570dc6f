//! Host-facing entry point tying the compiler, the context stack, the filter
//! table and a template loader together.

use crate::compiler::Compiler;
use crate::config::EngineConfig;
use crate::context::ContextStack;
use crate::error::{Error, Result};
use crate::filters::FilterSet;
use crate::instruction::{Instruction, Template};
use crate::loader::{FileSystemLoader, TemplateLoader};
use crate::registry::CloseHandler;
use crate::renderer::Renderer;
use serde_json::Value;
use std::path::Path;

/// A template engine instance.
///
/// Not internally synchronized: registering handlers or filters while another
/// thread renders through the same engine needs external locking.
pub struct Engine {
    compiler: Compiler,
    context: ContextStack,
    filters: FilterSet,
    loader: Option<Box<dyn TemplateLoader>>,
    config: EngineConfig,
}

impl Default for Engine {
    fn default() -> Self {
        Engine::new()
    }
}

impl Engine {
    /// Creates an engine with the default configuration and a filesystem loader.
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let loader = match &config.base_dir {
            Some(dir) => FileSystemLoader::with_base_dir(dir),
            None => FileSystemLoader::new(),
        };
        Self {
            compiler: Compiler::new(),
            context: ContextStack::new(),
            filters: FilterSet::new(),
            loader: Some(Box::new(loader)),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Replaces the loader used by `{include}` and [`Engine::render_file`].
    pub fn set_loader<L: TemplateLoader + 'static>(&mut self, loader: L) {
        self.loader = Some(Box::new(loader));
    }

    pub fn context(&self) -> &ContextStack {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut ContextStack {
        &mut self.context
    }

    pub fn assign<V: Into<Value>>(&mut self, name: &str, value: V, global: bool) {
        self.context.assign(name, value.into(), global);
    }

    pub fn assign_all<I>(&mut self, values: I, global: bool)
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        self.context.assign_all(values, global);
    }

    pub fn append<V: Into<Value>>(&mut self, name: &str, value: V) {
        self.context.append(name, value.into());
    }

    pub fn get_var(&self, name: &str) -> Value {
        self.context.get_var(name)
    }

    pub fn clear(&mut self, name: &str) {
        self.context.clear(name);
    }

    pub fn clear_all<'n, I>(&mut self, names: I)
    where
        I: IntoIterator<Item = &'n str>,
    {
        self.context.clear_all(names);
    }

    pub fn push_context(&mut self) {
        self.context.push_context();
    }

    pub fn pop_context(&mut self) {
        self.context.pop_context();
    }

    /// Registers an external node handler. Built-in names and names already
    /// registered are kept.
    pub fn register<O>(&mut self, name: &str, open: O, close: Option<CloseHandler>) -> bool
    where
        O: Fn(&str) -> Result<Vec<Instruction>> + Send + Sync + 'static,
    {
        self.compiler.register(name, open, close)
    }

    pub fn unregister(&mut self, name: &str) -> bool {
        self.compiler.unregister(name)
    }

    /// Adds a filter usable as `{$var|name}`.
    pub fn register_filter<F>(&mut self, name: &str, filter: F) -> bool
    where
        F: Fn(&Value) -> Result<Value> + Send + Sync + 'static,
    {
        self.filters.register(name, filter)
    }

    /// Compiles `source`; see [`Compiler::compile`].
    pub fn compile(&self, source: &str, dir: Option<&Path>) -> Result<Template> {
        self.compiler.compile(source, dir)
    }

    /// Renders a compiled template against the active context layer.
    pub fn render(&mut self, template: &Template) -> Result<String> {
        Renderer::new(
            &mut self.context,
            &self.compiler,
            &self.filters,
            self.loader.as_deref(),
            &self.config,
        )
        .render(template)
    }

    pub fn render_string(&mut self, source: &str) -> Result<String> {
        let template = self.compile(source, None)?;
        self.render(&template)
    }

    /// Loads `href` through the configured loader and renders it.
    ///
    /// # Errors
    /// * `Error::IoError` if the template cannot be read
    /// * Any compile or render error of the template
    pub fn render_file(&mut self, href: &str) -> Result<String> {
        let loader = self
            .loader
            .as_deref()
            .ok_or_else(|| Error::execution(format!("cannot load \"{href}\" without a loader")))?;
        let template = loader.load(href, &self.compiler)?;
        self.render(&template)
    }
}
