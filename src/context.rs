//! Variable contexts.
//!
//! The context stack isolates variable state across template inclusion and
//! block invocation: a pushed layer starts empty apart from the names declared
//! global, and popping it restores the caller's bindings. Writes to a global
//! name reach every existing layer.

use indexmap::{IndexMap, IndexSet};
use log::debug;
use serde_json::Value;

/// One level of variable bindings.
pub type Layer = IndexMap<String, Value>;

/// Stack of variable layers with exactly one active layer.
#[derive(Debug, Default, Clone)]
pub struct ContextStack {
    /// Store used while no layer has been pushed yet
    detached: Layer,
    layers: Vec<Layer>,
    active: usize,
    global_keys: IndexSet<String>,
}

impl ContextStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of pushed layers, the archived base layer included.
    pub fn depth(&self) -> usize {
        self.layers.len()
    }

    /// Bindings of the active layer.
    pub fn active(&self) -> &Layer {
        if self.layers.is_empty() {
            &self.detached
        } else {
            &self.layers[self.active]
        }
    }

    pub fn active_mut(&mut self) -> &mut Layer {
        if self.layers.is_empty() {
            &mut self.detached
        } else {
            &mut self.layers[self.active]
        }
    }

    /// Starts a new layer seeded with the current value of every global name.
    pub fn push_context(&mut self) {
        if self.layers.is_empty() && !self.detached.is_empty() {
            self.layers.push(std::mem::take(&mut self.detached));
        }

        let current = self.active();
        let layer: Layer = self
            .global_keys
            .iter()
            .filter_map(|key| current.get(key).map(|value| (key.clone(), value.clone())))
            .collect();

        self.layers.push(layer);
        self.active = self.layers.len() - 1;
        debug!("pushed variable context #{}", self.active);
    }

    /// Drops the top layer, or clears the last remaining one in place.
    pub fn pop_context(&mut self) {
        match self.layers.len() {
            0 => {}
            1 => {
                self.layers[0].clear();
                self.active = 0;
                debug!("cleared variable context #0");
            }
            count => {
                self.layers.pop();
                self.active = count - 2;
                debug!("popped back to variable context #{}", self.active);
            }
        }
    }

    /// Binds `name` in the active layer; a global binding is also written to
    /// every layer and inherited by layers pushed later.
    pub fn assign(&mut self, name: &str, value: Value, global: bool) {
        if global {
            self.global_keys.insert(name.to_string());
            for layer in &mut self.layers {
                layer.insert(name.to_string(), value.clone());
            }
        }
        self.active_mut().insert(name.to_string(), value);
    }

    /// Binds every entry of `values`.
    pub fn assign_all<I>(&mut self, values: I, global: bool)
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        for (name, value) in values {
            self.assign(&name, value, global);
        }
    }

    /// Appends `value` to the sequence bound to `name`, creating it if needed.
    /// A non-sequence binding becomes the first element of the sequence.
    pub fn append(&mut self, name: &str, value: Value) {
        let layer = self.active_mut();
        match layer.get_mut(name) {
            Some(Value::Array(items)) => items.push(value),
            Some(Value::Null) | None => {
                layer.insert(name.to_string(), Value::Array(vec![value]));
            }
            Some(existing) => {
                let previous = existing.take();
                *existing = Value::Array(vec![previous, value]);
            }
        }
    }

    /// Bound value of `name`, or an empty string when unbound.
    pub fn get_var(&self, name: &str) -> Value {
        match self.active().get(name) {
            Some(Value::Null) | None => Value::String(String::new()),
            Some(value) => value.clone(),
        }
    }

    /// Removes `name` from the active layer only.
    pub fn clear(&mut self, name: &str) {
        self.active_mut().shift_remove(name);
    }

    pub fn clear_all<'n, I>(&mut self, names: I)
    where
        I: IntoIterator<Item = &'n str>,
    {
        for name in names {
            self.clear(name);
        }
    }

    pub fn is_global(&self, name: &str) -> bool {
        self.global_keys.contains(name)
    }
}
