//! Lenient field deserializers for model-produced JSON
//!
//! The generative model is an unreliable JSON author: numbers arrive as
//! strings, absent values arrive as `null` or `"N/A"`. These helpers map all of
//! that onto plain defaults instead of failing the whole document.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Numbers, numeric strings ("$1,200.50"), or null/garbage → 0.0
pub fn number<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(value_to_f64(&Value::deserialize(deserializer)?).unwrap_or(0.0))
}

/// Like [`number`] but keeps absence distinguishable
pub fn optional_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(value_to_f64(&Value::deserialize(deserializer)?))
}

/// Strings, numbers (stringified), or null → String
pub fn string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(value_to_string(Value::deserialize(deserializer)?).unwrap_or_default())
}

/// Blank strings and placeholder values collapse to `None`
pub fn optional_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(value_to_string(Value::deserialize(deserializer)?))
}

/// Arrays of anything stringly; a single string becomes a one-element list
pub fn string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => items.into_iter().filter_map(value_to_string).collect(),
        other => value_to_string(other).into_iter().collect(),
    })
}

/// Arrays of objects; anything else is an empty list, malformed entries are dropped
pub fn list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: serde::de::DeserializeOwned,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect(),
        _ => Vec::new(),
    })
}

pub(crate) fn value_to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let cleaned: String = s
                .chars()
                .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
                .collect();
            cleaned.parse().ok()
        }
        _ => None,
    }
    .filter(|n| n.is_finite())
}

fn value_to_string(value: Value) -> Option<String> {
    let s = match value {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    let trimmed = s.trim();
    if trimmed.is_empty() || is_placeholder(trimmed) {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn is_placeholder(s: &str) -> bool {
    matches!(
        s.to_ascii_lowercase().as_str(),
        "null" | "none" | "n/a" | "na" | "unknown" | "not visible"
    )
}
