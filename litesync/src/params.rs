//! Coercion of free-form `additional_litellm_params` values.
//!
//! Declared extra parameters arrive as strings. Each one runs through a fixed
//! pipeline: JSON (only for text that looks like an array or object), boolean
//! literal, integer, float, and finally the string itself.

use serde_json::{Map, Number, Value};
use tracing::warn;

/// Reserved key naming parameters to remove after merging.
pub const DROP_PARAMS_KEY: &str = "additional_drop_params";

/// Result of coercing one string parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum Coerced {
    Json(Value),
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl Coerced {
    pub fn into_value(self) -> Value {
        match self {
            Coerced::Json(v) => v,
            Coerced::Bool(b) => Value::Bool(b),
            Coerced::Int(i) => Value::from(i),
            Coerced::Float(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
            Coerced::Str(s) => Value::String(s),
        }
    }
}

/// Coerce a declared string into the most specific JSON type it spells.
pub fn coerce(raw: &str) -> Coerced {
    let trimmed = raw.trim();
    if trimmed.starts_with('[') || trimmed.starts_with('{') {
        if let Ok(parsed) = serde_json::from_str::<Value>(raw) {
            return Coerced::Json(parsed);
        }
    }

    match raw {
        "true" => return Coerced::Bool(true),
        "false" => return Coerced::Bool(false),
        _ => {}
    }

    if let Ok(i) = raw.parse::<i64>() {
        return Coerced::Int(i);
    }

    // NaN and infinities have no JSON representation.
    match raw.parse::<f64>() {
        Ok(f) if f.is_finite() => Coerced::Float(f),
        _ => Coerced::Str(raw.to_string()),
    }
}

/// Merge extra parameters into `params`, then remove the keys listed under
/// [`DROP_PARAMS_KEY`].
///
/// The reserved key itself is never merged. Non-string values are copied
/// unchanged.
pub fn merge_additional(params: &mut Map<String, Value>, extra: &Map<String, Value>) {
    let mut drop = Vec::new();

    for (key, value) in extra {
        if key == DROP_PARAMS_KEY {
            match drop_list(value) {
                Some(keys) => drop.extend(keys),
                None => warn!(value = %value, "Ignoring {}: expected a JSON list of strings", DROP_PARAMS_KEY),
            }
            continue;
        }

        let merged = match value {
            Value::String(s) => coerce(s).into_value(),
            other => other.clone(),
        };
        params.insert(key.clone(), merged);
    }

    for key in drop {
        params.remove(&key);
    }
}

fn drop_list(value: &Value) -> Option<Vec<String>> {
    let list = match value {
        Value::String(s) => match coerce(s) {
            Coerced::Json(Value::Array(items)) => items,
            _ => return None,
        },
        Value::Array(items) => items.clone(),
        _ => return None,
    };
    Some(
        list.into_iter()
            .filter_map(|item| item.as_str().map(str::to_string))
            .collect(),
    )
}
