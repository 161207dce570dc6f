//! Render executor.
//!
//! Walks the linked instructions of a [`Template`] against a [`ContextStack`].
//! Every unit and block invocation runs in its own [`Frame`], which holds the
//! block's parameters and the per-depth loop iteration counters consulted by
//! `{empty}` sections.

use crate::compiler::Compiler;
use crate::config::EngineConfig;
use crate::context::{ContextStack, Layer};
use crate::error::{Error, Result};
use crate::expr::{Expr, Resolve};
use crate::filters::FilterSet;
use crate::instruction::{BlockDef, Bound, Instruction, PathPart, Template};
use crate::loader::TemplateLoader;
use crate::value::{is_truthy, lookup, to_display, to_number, Number};
use crate::variable::{Mode, Segment, VarExpr, VarPath};
use log::{debug, warn};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::ops::Range;

/// State of one unit or block invocation being rendered.
#[derive(Debug, Default)]
struct Frame {
    /// Parameters and locals of a block invocation
    locals: Option<Layer>,
    /// Iteration count of the last loop run at each nesting depth
    counters: Vec<Option<usize>>,
}

impl Frame {
    fn block(locals: Layer) -> Self {
        Self { locals: Some(locals), counters: Vec::new() }
    }

    fn counter(&self, depth: usize) -> Option<usize> {
        self.counters.get(depth).copied().flatten()
    }

    fn set_counter(&mut self, depth: usize, count: usize) {
        if self.counters.len() <= depth {
            self.counters.resize(depth + 1, None);
        }
        self.counters[depth] = Some(count);
    }
}

/// Read-only view used to resolve variables.
struct Scope<'s> {
    context: &'s ContextStack,
    locals: Option<&'s Layer>,
    filters: &'s FilterSet,
    strict_filters: bool,
}

impl Resolve for Scope<'_> {
    fn resolve(&self, var: &VarExpr) -> Result<Value> {
        let mut value = self.lookup(&var.path)?;
        for filter in &var.filters {
            value = self.filters.apply(filter, value, self.strict_filters)?;
        }
        Ok(value)
    }
}

impl Scope<'_> {
    fn key(&self, segment: &Segment) -> Result<String> {
        match segment {
            Segment::Key(key) => Ok(key.clone()),
            Segment::Nested(var) => Ok(to_display(&self.resolve(var)?)),
            Segment::Index(expr) => Ok(to_display(&expr.eval(self)?)),
        }
    }

    fn keys(&self, path: &VarPath) -> Result<Vec<String>> {
        path.segments.iter().map(|segment| self.key(segment)).collect()
    }

    /// Block locals shadow the shared context; other names fall through to it.
    fn root(&self, mode: Mode, name: &str) -> Option<&Value> {
        match (mode, self.locals) {
            (Mode::Local, Some(locals)) => {
                locals.get(name).or_else(|| self.context.active().get(name))
            }
            _ => self.context.active().get(name),
        }
    }

    fn lookup(&self, path: &VarPath) -> Result<Value> {
        let Some((first, rest)) = path.segments.split_first() else {
            return Ok(Value::Null);
        };
        let Some(mut current) = self.root(path.mode, &self.key(first)?) else {
            return Ok(Value::Null);
        };
        for segment in rest {
            match lookup(current, &self.key(segment)?) {
                Some(value) => current = value,
                None => return Ok(Value::Null),
            }
        }
        Ok(current.clone())
    }
}

/// Writes `value` at `keys` below `slot`, creating intermediate mappings.
fn set_path(slot: &mut Value, keys: &[String], value: Value) -> Result<()> {
    let Some((key, rest)) = keys.split_first() else {
        *slot = value;
        return Ok(());
    };

    if matches!(slot, Value::Null) || matches!(slot, Value::String(s) if s.is_empty()) {
        *slot = Value::Object(Map::new());
    }

    match slot {
        Value::Object(map) => set_path(map.entry(key.clone()).or_insert(Value::Null), rest, value),
        Value::Array(items) => {
            let index: usize = key
                .parse()
                .map_err(|_| Error::execution(format!("\"{key}\" is not a sequence index")))?;
            if index == items.len() {
                items.push(Value::Null);
            }
            let len = items.len();
            match items.get_mut(index) {
                Some(item) => set_path(item, rest, value),
                None => Err(Error::execution(format!(
                    "index {index} is out of bounds for a sequence of {len} items"
                ))),
            }
        }
        other => Err(Error::execution(format!("cannot set key \"{key}\" on scalar {other}"))),
    }
}

/// Executes templates against a context stack.
pub struct Renderer<'a> {
    context: &'a mut ContextStack,
    compiler: &'a Compiler,
    filters: &'a FilterSet,
    loader: Option<&'a dyn TemplateLoader>,
    config: &'a EngineConfig,
    /// Blocks hoisted from every unit rendered so far
    blocks: HashMap<String, (Template, BlockDef)>,
    depth: usize,
}

impl<'a> Renderer<'a> {
    pub fn new(
        context: &'a mut ContextStack,
        compiler: &'a Compiler,
        filters: &'a FilterSet,
        loader: Option<&'a dyn TemplateLoader>,
        config: &'a EngineConfig,
    ) -> Self {
        Self { context, compiler, filters, loader, config, blocks: HashMap::new(), depth: 0 }
    }

    /// Renders `template` to a string.
    ///
    /// # Errors
    /// * `Error::ExecutionError` on failing expressions, unknown blocks, missing
    ///   includes or when nesting exceeds `max_depth`
    pub fn render(&mut self, template: &Template) -> Result<String> {
        let mut out = String::new();
        self.run_unit(template, &mut out)?;
        Ok(out)
    }

    fn run_unit(&mut self, unit: &Template, out: &mut String) -> Result<()> {
        for (name, def) in unit.blocks() {
            self.blocks.insert(name.clone(), (unit.clone(), def.clone()));
        }
        self.execute(unit, 0..unit.len(), &mut Frame::default(), out)
    }

    fn scope<'s>(&'s self, frame: &'s Frame) -> Scope<'s> {
        Scope {
            context: &*self.context,
            locals: frame.locals.as_ref(),
            filters: self.filters,
            strict_filters: self.config.strict_filters,
        }
    }

    fn eval(&self, expr: &Expr, frame: &Frame) -> Result<Value> {
        expr.eval(&self.scope(frame))
    }

    fn descend<F>(&mut self, what: &str, f: F) -> Result<()>
    where
        F: FnOnce(&mut Self) -> Result<()>,
    {
        if self.depth >= self.config.max_depth {
            return Err(Error::execution(format!(
                "maximum nesting depth of {} exceeded by {what}",
                self.config.max_depth
            )));
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    fn assign(&mut self, target: &VarPath, value: Value, frame: &mut Frame) -> Result<()> {
        let keys = self.scope(frame).keys(target)?;
        let Some((name, rest)) = keys.split_first() else {
            return Ok(());
        };

        if let (Mode::Local, Some(locals)) = (target.mode, frame.locals.as_mut()) {
            let slot = locals.entry(name.clone()).or_insert(Value::Null);
            return set_path(slot, rest, value);
        }

        let mut root = self.context.active().get(name).cloned().unwrap_or(Value::Null);
        set_path(&mut root, rest, value)?;
        let global = self.context.is_global(name);
        self.context.assign(name, root, global);
        Ok(())
    }

    fn execute(
        &mut self,
        unit: &Template,
        range: Range<usize>,
        frame: &mut Frame,
        out: &mut String,
    ) -> Result<()> {
        let mut pc = range.start;
        while pc < range.end {
            let link = unit.link(pc);
            match &unit.instructions()[pc] {
                Instruction::Literal(text) => out.push_str(text),
                Instruction::Emit(var) => {
                    let value = self.scope(frame).resolve(var)?;
                    out.push_str(&to_display(&value));
                }
                Instruction::BeginIf(_) => {
                    pc = self.run_if(unit, pc, frame, out)?;
                    continue;
                }
                Instruction::BeginForEach { key, value, collection, depth } => {
                    let items = self.eval(collection, frame)?;
                    let mut count = 0;
                    frame.set_counter(*depth, 0);
                    for (k, v) in entries(items) {
                        count += 1;
                        frame.set_counter(*depth, count);
                        if let Some(key) = key {
                            self.assign(key, k, frame)?;
                        }
                        self.assign(value, v, frame)?;
                        match link.clause {
                            Some(clause) => {
                                self.execute(unit, pc + 1..clause, frame, out)?;
                                let after = unit.link(clause).next + 1;
                                self.execute(unit, after..link.next, frame, out)?;
                            }
                            None => self.execute(unit, pc + 1..link.next, frame, out)?,
                        }
                    }
                    frame.set_counter(*depth, count);
                    if let (0, Some(clause)) = (count, link.clause) {
                        self.execute(unit, clause + 1..unit.link(clause).next, frame, out)?;
                    }
                    pc = link.next;
                }
                Instruction::Empty { depth, inline } => {
                    if !*inline && frame.counter(*depth) == Some(0) {
                        self.execute(unit, pc + 1..link.next, frame, out)?;
                    }
                    pc = link.next;
                }
                Instruction::Assign { target, value } => {
                    let value = self.eval(value, frame)?;
                    self.assign(target, value, frame)?;
                }
                Instruction::BeginBlockDef { .. } => pc = link.next,
                Instruction::InvokeBlock { name, args } => self.invoke_block(name, args, frame, out)?,
                Instruction::BeginRange { counter, start, step, end } => {
                    let start = self.bound(start, frame)?;
                    let step = self.bound(step, frame)?;
                    let end = self.bound(end, frame)?;
                    if step <= 0 {
                        return Err(Error::execution(format!(
                            "range step must be positive, got {step}"
                        )));
                    }
                    let mut i = start;
                    while i <= end {
                        self.assign(counter, Value::from(i), frame)?;
                        self.execute(unit, pc + 1..link.next, frame, out)?;
                        match i.checked_add(step) {
                            Some(next) => i = next,
                            None => break,
                        }
                    }
                    pc = link.next;
                }
                Instruction::Include(parts) => self.include(parts, frame, out)?,
                Instruction::ElseIf(_)
                | Instruction::Else
                | Instruction::EndIf
                | Instruction::EndEmpty
                | Instruction::EndFor
                | Instruction::EndBlockDef
                | Instruction::EndRange => {}
            }
            pc += 1;
        }
        Ok(())
    }

    /// Runs the taken branch of the `if` chain starting at `start`.
    ///
    /// # Returns
    /// * `Result<usize>` - Index following the chain's `EndIf`
    fn run_if(
        &mut self,
        unit: &Template,
        start: usize,
        frame: &mut Frame,
        out: &mut String,
    ) -> Result<usize> {
        let mut branch = start;
        let mut taken = false;
        loop {
            let next = unit.link(branch).next;
            let hit = match &unit.instructions()[branch] {
                Instruction::EndIf => return Ok(branch + 1),
                _ if taken => false,
                Instruction::BeginIf(condition) | Instruction::ElseIf(condition) => {
                    is_truthy(&self.eval(condition, frame)?)
                }
                _ => true,
            };
            if hit {
                self.execute(unit, branch + 1..next, frame, out)?;
                taken = true;
            }
            branch = next;
        }
    }

    fn bound(&self, bound: &Bound, frame: &Frame) -> Result<i64> {
        match bound {
            Bound::Literal(i) => Ok(*i),
            Bound::Var(var) => {
                let value = self.scope(frame).resolve(var)?;
                match to_number(&value) {
                    Some(Number::Int(i)) => Ok(i),
                    Some(Number::Float(f)) if f.is_finite() => Ok(f.trunc() as i64),
                    _ => Err(Error::execution(format!("range bound {value} is not a number"))),
                }
            }
        }
    }

    fn invoke_block(
        &mut self,
        name: &str,
        args: &[Expr],
        frame: &Frame,
        out: &mut String,
    ) -> Result<()> {
        let (unit, def) = self
            .blocks
            .get(name)
            .cloned()
            .ok_or_else(|| Error::execution(format!("block \"{name}\" is not defined")))?;

        let mut values = args
            .iter()
            .map(|arg| self.eval(arg, frame))
            .collect::<Result<Vec<_>>>()?
            .into_iter();
        let locals: Layer = def
            .params
            .iter()
            .map(|param| (param.clone(), values.next().unwrap_or(Value::Null)))
            .collect();

        self.descend(&format!("block \"{name}\""), |renderer| {
            renderer.execute(&unit, def.body.clone(), &mut Frame::block(locals), out)
        })
    }

    fn include(&mut self, parts: &[PathPart], frame: &Frame, out: &mut String) -> Result<()> {
        let mut href = String::new();
        for part in parts {
            match part {
                PathPart::Text(text) => href.push_str(text),
                PathPart::Var(var) => href.push_str(&to_display(&self.scope(frame).resolve(var)?)),
            }
        }
        if href.is_empty() {
            warn!("{{include}} resolved to an empty path, skipped");
            return Ok(());
        }

        let loader = self
            .loader
            .ok_or_else(|| Error::execution(format!("cannot include \"{href}\" without a loader")))?;
        debug!("including {href}");
        let unit = loader.load(&href, self.compiler)?;

        self.descend(&format!("include \"{href}\""), |renderer| renderer.run_unit(&unit, out))
    }
}

/// Key/value pairs iterated by `{for}`; a scalar iterates once.
fn entries(items: Value) -> Vec<(Value, Value)> {
    match items {
        Value::Null => Vec::new(),
        Value::String(s) if s.is_empty() => Vec::new(),
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, item)| (Value::from(i), item))
            .collect(),
        Value::Object(map) => map.into_iter().map(|(k, v)| (Value::String(k), v)).collect(),
        scalar => vec![(Value::from(0), scalar)],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_path_autovivifies() {
        let mut root = Value::Null;
        set_path(&mut root, &["a".into(), "b".into()], json!(1)).unwrap();
        assert_eq!(root, json!({"a": {"b": 1}}));

        let mut list = json!([1]);
        set_path(&mut list, &["1".into()], json!(2)).unwrap();
        assert_eq!(list, json!([1, 2]));
        assert!(set_path(&mut list, &["5".into()], json!(3)).is_err());

        let mut scalar = json!(3);
        assert!(matches!(
            set_path(&mut scalar, &["x".into()], json!(1)),
            Err(Error::ExecutionError(_))
        ));
    }

    #[test]
    fn test_entries() {
        assert!(entries(Value::Null).is_empty());
        assert_eq!(entries(json!({"k": "v"})), vec![(json!("k"), json!("v"))]);
        assert_eq!(entries(json!("x")), vec![(json!(0), json!("x"))]);
    }
}
