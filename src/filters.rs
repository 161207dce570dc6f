//! Named unary transforms applied with `{$var|name}`.
//!
//! Unknown filter names pass the value through unchanged unless the engine
//! runs with `strict_filters`.

use crate::error::{Error, Result};
use crate::value::{to_display, to_number, Number};
use cruet::Inflector;
use indexmap::IndexMap;
use log::warn;
use serde_json::Value;
use std::sync::Arc;

/// A filter implementation.
pub type Filter = Arc<dyn Fn(&Value) -> Result<Value> + Send + Sync>;

/// Table of filters by name.
#[derive(Clone)]
pub struct FilterSet {
    filters: IndexMap<String, Filter>,
}

impl std::fmt::Debug for FilterSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.filters.keys()).finish()
    }
}

impl Default for FilterSet {
    fn default() -> Self {
        FilterSet::new()
    }
}

impl FilterSet {
    /// Creates a set holding the built-in filters.
    pub fn new() -> Self {
        let mut set = Self { filters: IndexMap::new() };
        let builtins: [(&str, fn(&Value) -> Result<Value>); 21] = [
            ("upper", upper),
            ("lower", lower),
            ("capitalize", capitalize),
            ("title", title),
            ("trim", trim),
            ("length", length),
            ("count", length),
            ("escape", escape),
            ("e", escape),
            ("nl2br", nl2br),
            ("json", json),
            ("reverse", reverse),
            ("first", first),
            ("last", last),
            ("keys", keys),
            ("abs", abs),
            ("int", int),
            ("snake_case", |v| text(v, |s| s.to_snake_case())),
            ("camel_case", |v| text(v, |s| s.to_camel_case())),
            ("pascal_case", |v| text(v, |s| s.to_pascal_case())),
            ("kebab_case", |v| text(v, |s| s.to_kebab_case())),
        ];
        for (name, filter) in builtins {
            set.register(name, filter);
        }
        set
    }

    /// Adds a filter; the first registration of a name wins.
    ///
    /// # Returns
    /// * `bool` - Whether the filter was added
    pub fn register<F>(&mut self, name: &str, filter: F) -> bool
    where
        F: Fn(&Value) -> Result<Value> + Send + Sync + 'static,
    {
        if self.filters.contains_key(name) {
            return false;
        }
        self.filters.insert(name.to_string(), Arc::new(filter));
        true
    }

    pub fn contains(&self, name: &str) -> bool {
        self.filters.contains_key(name)
    }

    /// Applies the filter called `name` to `value`.
    pub fn apply(&self, name: &str, value: Value, strict: bool) -> Result<Value> {
        match self.filters.get(name) {
            Some(filter) => filter(&value),
            None if strict => Err(Error::execution(format!("unknown filter \"{name}\""))),
            None => {
                warn!("unknown filter \"{name}\" ignored");
                Ok(value)
            }
        }
    }
}

fn text(value: &Value, f: impl Fn(&str) -> String) -> Result<Value> {
    Ok(Value::String(f(&to_display(value))))
}

fn upper(value: &Value) -> Result<Value> {
    text(value, str::to_uppercase)
}

fn lower(value: &Value) -> Result<Value> {
    text(value, str::to_lowercase)
}

fn capitalize_word(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn capitalize(value: &Value) -> Result<Value> {
    text(value, capitalize_word)
}

fn title(value: &Value) -> Result<Value> {
    text(value, |s| {
        let mut out = String::with_capacity(s.len());
        let mut start_of_word = true;
        for c in s.chars() {
            if start_of_word {
                out.extend(c.to_uppercase());
            } else {
                out.push(c);
            }
            start_of_word = c.is_whitespace();
        }
        out
    })
}

fn trim(value: &Value) -> Result<Value> {
    text(value, |s| s.trim().to_string())
}

fn length(value: &Value) -> Result<Value> {
    let len = match value {
        Value::Null => 0,
        Value::Array(items) => items.len(),
        Value::Object(map) => map.len(),
        Value::String(s) => s.chars().count(),
        other => to_display(other).chars().count(),
    };
    Ok(Value::from(len))
}

fn escape(value: &Value) -> Result<Value> {
    text(value, |s| {
        let mut out = String::with_capacity(s.len());
        for c in s.chars() {
            match c {
                '&' => out.push_str("&amp;"),
                '<' => out.push_str("&lt;"),
                '>' => out.push_str("&gt;"),
                '"' => out.push_str("&quot;"),
                '\'' => out.push_str("&#039;"),
                c => out.push(c),
            }
        }
        out
    })
}

fn nl2br(value: &Value) -> Result<Value> {
    text(value, |s| s.replace('\n', "<br />\n"))
}

fn json(value: &Value) -> Result<Value> {
    serde_json::to_string(value)
        .map(Value::String)
        .map_err(|e| Error::execution(format!("json filter failed: {e}")))
}

fn reverse(value: &Value) -> Result<Value> {
    match value {
        Value::Array(items) => Ok(Value::Array(items.iter().rev().cloned().collect())),
        other => text(other, |s| s.chars().rev().collect()),
    }
}

fn first(value: &Value) -> Result<Value> {
    Ok(match value {
        Value::Array(items) => items.first().cloned().unwrap_or(Value::Null),
        Value::Object(map) => map.values().next().cloned().unwrap_or(Value::Null),
        other => to_display(other).chars().next().map(|c| Value::String(c.to_string())).unwrap_or(Value::Null),
    })
}

fn last(value: &Value) -> Result<Value> {
    Ok(match value {
        Value::Array(items) => items.last().cloned().unwrap_or(Value::Null),
        Value::Object(map) => map.values().next_back().cloned().unwrap_or(Value::Null),
        other => to_display(other).chars().next_back().map(|c| Value::String(c.to_string())).unwrap_or(Value::Null),
    })
}

fn keys(value: &Value) -> Result<Value> {
    Ok(match value {
        Value::Object(map) => Value::Array(map.keys().cloned().map(Value::String).collect()),
        Value::Array(items) => Value::Array((0..items.len()).map(Value::from).collect()),
        _ => Value::Array(Vec::new()),
    })
}

fn abs(value: &Value) -> Result<Value> {
    match to_number(value) {
        Some(Number::Int(i)) => Ok(i.checked_abs().map(Value::from).unwrap_or(Value::Null)),
        Some(Number::Float(f)) => Ok(Number::Float(f.abs()).into_value()),
        None => Err(Error::execution(format!("abs filter expects a number, got {value}"))),
    }
}

fn int(value: &Value) -> Result<Value> {
    Ok(Value::from(match to_number(value) {
        Some(Number::Int(i)) => i,
        Some(Number::Float(f)) => f.trunc() as i64,
        None => 0,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn apply(name: &str, value: Value) -> Value {
        FilterSet::new().apply(name, value, true).unwrap()
    }

    #[test]
    fn test_text_filters() {
        assert_eq!(apply("upper", json!("hi")), json!("HI"));
        assert_eq!(apply("capitalize", json!("élan vital")), json!("Élan vital"));
        assert_eq!(apply("title", json!("hello big world")), json!("Hello Big World"));
        assert_eq!(apply("escape", json!("<a href='x'>")), json!("&lt;a href=&#039;x&#039;&gt;"));
        assert_eq!(apply("snake_case", json!("HelloWorld")), json!("hello_world"));
        assert_eq!(apply("kebab_case", json!("hello world")), json!("hello-world"));
    }

    #[test]
    fn test_collection_filters() {
        assert_eq!(apply("length", json!([1, 2, 3])), json!(3));
        assert_eq!(apply("count", json!("abc")), json!(3));
        assert_eq!(apply("reverse", json!([1, 2])), json!([2, 1]));
        assert_eq!(apply("keys", json!({"a": 1, "b": 2})), json!(["a", "b"]));
        assert_eq!(apply("last", json!({"a": 1, "b": 2})), json!(2));
    }

    #[test]
    fn test_unknown_filter() {
        let filters = FilterSet::new();
        assert_eq!(filters.apply("nope", json!("x"), false).unwrap(), json!("x"));
        assert!(matches!(filters.apply("nope", json!("x"), true), Err(Error::ExecutionError(_))));
    }

    #[test]
    fn test_first_registration_wins() {
        let mut filters = FilterSet::new();
        assert!(!filters.register("upper", |_| Ok(json!("replaced"))));
        assert!(filters.register("shout", |v| Ok(Value::String(format!("{}!", to_display(v))))));
        assert_eq!(filters.apply("upper", json!("a"), true).unwrap(), json!("A"));
        assert_eq!(filters.apply("shout", json!("a"), true).unwrap(), json!("a!"));
    }
}
