// SPDX-FileCopyrightText: 2026 Zapline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Delivery envelopes.
//!
//! A single webhook delivery may hold one event, an array of events, an
//! object wrapping either, or a cloud `entry[].changes[].value` tree.
//! [`explode`] flattens all of these into the list of elements the
//! normalizer understands.

use serde_json::{Map, Value};

use zapline_core::types::ProviderKind;

/// Keys under which providers nest the actual event(s).
const WRAPPER_KEYS: [&str; 5] = ["data", "payload", "body", "events", "results"];

/// Keys that mark an object as an event in its own right.
const EVENT_KEYS: [&str; 6] = ["messageId", "id", "ids", "phone", "from", "chatId"];

/// Flatten a delivery into individual raw elements.
pub fn explode(provider: ProviderKind, body: Value) -> Vec<Value> {
    let mut out = Vec::new();
    explode_into(provider, body, None, &mut out);
    out
}

fn explode_into(
    provider: ProviderKind,
    value: Value,
    outer_event: Option<&Value>,
    out: &mut Vec<Value>,
) {
    match value {
        Value::Array(items) => {
            for item in items {
                explode_into(provider, item, outer_event, out);
            }
        }
        Value::Object(mut map) => {
            if let Some(event) = outer_event {
                map.entry("event").or_insert_with(|| event.clone());
            }

            if let Some(key) = wrapper_key(&map) {
                let event = map.get("event").cloned();
                if let Some(inner) = map.remove(key) {
                    explode_into(provider, inner, event.as_ref(), out);
                }
                return;
            }

            if map.get("entry").is_some_and(Value::is_array) {
                if let Some(Value::Array(entries)) = map.remove("entry") {
                    split_cloud_entries(entries, out);
                }
                return;
            }

            if provider == ProviderKind::Gateway {
                if let Some(ids) = multi_id_status(&map) {
                    for id in ids {
                        let mut element = map.clone();
                        element.remove("ids");
                        element.insert("messageId".to_string(), id);
                        out.push(Value::Object(element));
                    }
                    return;
                }
            }

            out.push(Value::Object(map));
        }
        // Scalars are passed through so the normalizer can reject them with
        // a proper payload error.
        other => out.push(other),
    }
}

fn wrapper_key(map: &Map<String, Value>) -> Option<&'static str> {
    if EVENT_KEYS.iter().any(|k| map.contains_key(*k)) {
        return None;
    }
    WRAPPER_KEYS.iter().copied().find(|k| {
        map.get(*k)
            .is_some_and(|v| v.is_object() || v.is_array())
    })
}

/// `ids: [...]` on a status callback: one acknowledgement for several messages.
fn multi_id_status(map: &Map<String, Value>) -> Option<Vec<Value>> {
    if !(map.contains_key("status") || map.contains_key("ack")) {
        return None;
    }
    match map.get("ids")? {
        Value::Array(ids) if !ids.is_empty() => Some(ids.clone()),
        _ => None,
    }
}

fn split_cloud_entries(entries: Vec<Value>, out: &mut Vec<Value>) {
    for entry in entries {
        let Some(changes) = entry.get("changes").and_then(Value::as_array) else {
            continue;
        };
        for change in changes {
            let Some(value) = change.get("value") else {
                continue;
            };
            let contacts = value.get("contacts").filter(|c| c.is_array());
            let metadata = value.get("metadata").filter(|m| m.is_object());
            let wrap = |key: &str, item: &Value| {
                let mut element = Map::new();
                element.insert(key.into(), item.clone());
                if let Some(metadata) = metadata {
                    element.insert("metadata".into(), metadata.clone());
                }
                element
            };

            for message in array_at(value, "messages") {
                let mut element = wrap("message", message);
                if let Some(contacts) = contacts {
                    element.insert("contacts".into(), contacts.clone());
                }
                out.push(Value::Object(element));
            }
            for echo in array_at(value, "message_echoes") {
                let mut element = wrap("message", echo);
                element.insert("echo".into(), Value::Bool(true));
                out.push(Value::Object(element));
            }
            for status in array_at(value, "statuses") {
                out.push(Value::Object(wrap("status", status)));
            }
        }
    }
}

fn array_at<'a>(value: &'a Value, key: &str) -> impl Iterator<Item = &'a Value> {
    value
        .get(key)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
}
