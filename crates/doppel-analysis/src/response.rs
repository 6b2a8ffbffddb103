// SPDX-FileCopyrightText: 2026 Doppel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Parsing of generator responses into JSON objects.

use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Parse a generator response into a non-empty JSON object.
///
/// Handles markdown code fences and prose around the object. Returns `None`
/// for anything that is not a non-empty object.
pub fn parse_json_object(response: &str) -> Option<Map<String, Value>> {
    let trimmed = response.trim();
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end < start {
        return None;
    }

    match serde_json::from_str::<Value>(&trimmed[start..=end]) {
        Ok(Value::Object(map)) if !map.is_empty() => Some(map),
        Ok(_) => {
            debug!("analysis response was an empty object");
            None
        }
        Err(e) => {
            warn!("Failed to parse analysis response: {e}");
            debug!("Raw response: {response}");
            None
        }
    }
}

/// Trimmed, non-empty string value of `key`. Numbers and booleans are
/// rendered as text.
pub fn string_field(map: &Map<String, Value>, key: &str) -> Option<String> {
    let text = match map.get(key)? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

/// Non-empty string items of the array at `key`.
pub fn list_field(map: &Map<String, Value>, key: &str) -> Vec<String> {
    let Some(Value::Array(items)) = map.get(key) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match item {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .filter(|s| !s.is_empty())
        .collect()
}
