// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lenient scalar deserializers.
//!
//! Providers are inconsistent about scalar types: ids arrive as strings or
//! numbers, booleans as `"true"`, timestamps as numeric strings. These
//! helpers accept every such form and turn anything else into `None`
//! instead of failing the whole payload.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Non-empty string from a string or number.
pub fn opt_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(string_of(&Value::deserialize(d)?))
}

/// Message id from a string, a number, or an object carrying
/// `_serialized` or `id`.
pub fn opt_id<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    let value = Value::deserialize(d)?;
    Ok(match &value {
        Value::Object(map) => map
            .get("_serialized")
            .and_then(string_of)
            .or_else(|| map.get("id").and_then(string_of)),
        other => string_of(other),
    })
}

/// Boolean from a bool, `"true"`/`"false"`, or `0`/`1`.
pub fn opt_bool<'de, D: Deserializer<'de>>(d: D) -> Result<Option<bool>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Bool(b) => Some(b),
        Value::Number(n) => n.as_i64().map(|n| n != 0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Some(true),
            "false" | "0" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    })
}

/// Integer from a number or numeric string.
pub fn opt_i64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Floating point from a number or numeric string.
pub fn opt_f64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Text body from a plain string or an object with `message`/`body`/`text`.
pub fn opt_text<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    let value = Value::deserialize(d)?;
    Ok(match &value {
        Value::Object(map) => ["message", "body", "text"]
            .iter()
            .find_map(|k| map.get(*k).and_then(string_of)),
        other => string_of(other),
    })
}

/// List that tolerates `null` and non-array values as empty.
pub fn list<'de, D, T>(d: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(match Value::deserialize(d)? {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| T::deserialize(item).ok())
            .collect(),
        _ => Vec::new(),
    })
}

pub(crate) fn string_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Deserialize, Default)]
    #[serde(default)]
    struct Loose {
        #[serde(deserialize_with = "opt_string")]
        s: Option<String>,
        #[serde(deserialize_with = "opt_id")]
        id: Option<String>,
        #[serde(deserialize_with = "opt_bool")]
        b: Option<bool>,
        #[serde(deserialize_with = "opt_i64")]
        n: Option<i64>,
        #[serde(deserialize_with = "opt_text")]
        t: Option<String>,
        #[serde(deserialize_with = "list")]
        items: Vec<i64>,
    }

    #[test]
    fn accepts_loose_scalars() {
        let p: Loose = serde_json::from_value(json!({
            "s": 5534999999999u64,
            "id": {"_serialized": "true_5534@c.us_ABC", "fromMe": true},
            "b": "true",
            "n": "1700000000",
            "t": {"message": "olá"}
        }))
        .unwrap();
        assert_eq!(p.s.as_deref(), Some("5534999999999"));
        assert_eq!(p.id.as_deref(), Some("true_5534@c.us_ABC"));
        assert_eq!(p.b, Some(true));
        assert_eq!(p.n, Some(1_700_000_000));
        assert_eq!(p.t.as_deref(), Some("olá"));
    }

    #[test]
    fn wrong_shapes_become_none() {
        let p: Loose = serde_json::from_value(json!({
            "s": {"nested": 1},
            "b": "maybe",
            "n": [1],
            "t": "   "
        }))
        .unwrap();
        assert!(p.s.is_none() && p.b.is_none() && p.n.is_none() && p.t.is_none());

        let empty: Loose = serde_json::from_value(json!({})).unwrap();
        assert!(empty.id.is_none());
    }

    #[test]
    fn null_lists_read_as_empty() {
        let p: Loose = serde_json::from_value(json!({"items": null})).unwrap();
        assert!(p.items.is_empty());

        let p: Loose = serde_json::from_value(json!({"items": [1, "x", 3]})).unwrap();
        assert_eq!(p.items, vec![1, 3]);
    }
}
