//! Conversions and comparisons over template values.
//!
//! Template values are plain `serde_json::Value`s: `Null` stands for an
//! absent binding, arrays are sequences and objects are ordered mappings.

use serde_json::Value;
use std::cmp::Ordering;

/// A value coerced for arithmetic.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    pub fn as_f64(self) -> f64 {
        match self {
            Number::Int(i) => i as f64,
            Number::Float(f) => f,
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            Number::Int(i) => Value::from(i),
            Number::Float(f) => serde_json::Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        }
    }
}

/// Renders a value the way it appears in template output.
pub fn to_display(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(true) => "1".to_string(),
        Value::Bool(false) => String::new(),
        // Whole floats print without a fraction: 7.0 renders as "7"
        Value::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() => f.to_string(),
            _ => n.to_string(),
        },
        Value::String(s) => s.clone(),
        collection => collection.to_string(),
    }
}

/// Truthiness used by `{if}`: absent, false, zero, "", "0" and empty collections are false.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !(s.is_empty() || s == "0"),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Coerces a value to a number, if it has a numeric reading.
///
/// Absent values, booleans and the empty string read as integers; strings
/// must parse as a number.
pub fn to_number(value: &Value) -> Option<Number> {
    match value {
        Value::Null => Some(Number::Int(0)),
        Value::Bool(b) => Some(Number::Int(i64::from(*b))),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Some(Number::Int(i)),
            None => n.as_f64().map(Number::Float),
        },
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                Some(Number::Int(0))
            } else if let Ok(i) = s.parse::<i64>() {
                Some(Number::Int(i))
            } else {
                s.parse::<f64>().ok().filter(|f| f.is_finite()).map(Number::Float)
            }
        }
        Value::Array(_) | Value::Object(_) => None,
    }
}

/// Looks `key` up inside a collection value.
pub fn lookup<'v>(value: &'v Value, key: &str) -> Option<&'v Value> {
    match value {
        Value::Object(map) => map.get(key),
        Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}

/// Loose equality: numeric when both sides read as numbers, textual otherwise.
pub fn loose_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Array(_) | Value::Object(_), _) | (_, Value::Array(_) | Value::Object(_)) => {
            left == right
        }
        (Value::String(_), Value::String(_)) => left == right,
        _ => match (to_number(left), to_number(right)) {
            (Some(l), Some(r)) => l.as_f64() == r.as_f64(),
            _ => to_display(left) == to_display(right),
        },
    }
}

/// Ordering used by `<`, `<=`, `>` and `>=`.
pub fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    let numeric = !matches!((left, right), (Value::String(_), Value::String(_)))
        || (is_numeric_string(left) && is_numeric_string(right));
    if numeric {
        if let (Some(l), Some(r)) = (to_number(left), to_number(right)) {
            return l.as_f64().partial_cmp(&r.as_f64());
        }
    }
    match (left, right) {
        (Value::Array(_) | Value::Object(_), _) | (_, Value::Array(_) | Value::Object(_)) => None,
        _ => Some(to_display(left).cmp(&to_display(right))),
    }
}

fn is_numeric_string(value: &Value) -> bool {
    matches!(value, Value::String(s) if !s.trim().is_empty() && s.trim().parse::<f64>().is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_truthiness() {
        for falsy in [json!(null), json!(false), json!(0), json!(0.0), json!(""), json!("0"), json!([]), json!({})] {
            assert!(!is_truthy(&falsy), "{falsy} should be false");
        }
        for truthy in [json!(true), json!(2), json!("a"), json!([0]), json!({"a": null})] {
            assert!(is_truthy(&truthy), "{truthy} should be true");
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(to_display(&json!(null)), "");
        assert_eq!(to_display(&json!(true)), "1");
        assert_eq!(to_display(&json!(1.5)), "1.5");
        assert_eq!(to_display(&json!(7.0)), "7");
        assert_eq!(to_display(&json!(-2.0)), "-2");
        assert_eq!(to_display(&json!([1, "a"])), r#"[1,"a"]"#);
    }

    #[test]
    fn test_comparisons() {
        assert!(loose_eq(&json!("5"), &json!(5)));
        assert!(!loose_eq(&json!("abc"), &json!("abd")));
        assert_eq!(compare(&json!("10"), &json!("9")), Some(Ordering::Greater));
        assert_eq!(compare(&json!("b"), &json!("a")), Some(Ordering::Greater));
        assert_eq!(compare(&json!(2), &json!(2.5)), Some(Ordering::Less));
    }
}
