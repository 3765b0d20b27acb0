//! Argument normalisation for backend-returned tool calls
//!
//! Backends routinely emit near-miss arguments: renamed parameters
//! (`path` instead of `file_path`), explicit nulls for optional fields, or a
//! bare list of strings where a list of objects is required. Normalisation
//! rewrites those into the canonical shape before the call is shown to the
//! client.

use serde_json::{Map, Value, json};
use thiserror::Error;

use crate::ToolEntry;

/// A tool call's arguments failed the rename+validate pass
#[derive(Debug, Clone, Error)]
#[error("invalid arguments for tool {tool}: missing required property {missing}")]
pub struct InvalidArgs {
    /// Canonical tool name
    pub tool: String,
    /// The required property still absent after normalisation
    pub missing: String,
}

/// Apply an entry's normalisation rules to raw arguments
pub(crate) fn normalize_args(entry: &ToolEntry, raw: Value) -> Result<Value, InvalidArgs> {
    let Value::Object(raw) = raw else {
        // Non-object arguments cannot satisfy an object schema; report the
        // first required property as missing
        return Err(InvalidArgs {
            tool: entry.name.to_owned(),
            missing: entry.required.first().copied().unwrap_or("").to_owned(),
        });
    };

    let mut args = Map::with_capacity(raw.len());
    for (key, value) in raw {
        // Null-valued optional properties trip backend validators; drop them
        if value.is_null() {
            tracing::debug!(tool = entry.name, property = %key, "dropping null argument");
            continue;
        }
        let canonical_key = entry
            .renames
            .iter()
            .find(|(from, _)| *from == key)
            .map_or(key, |(_, to)| (*to).to_owned());
        args.insert(canonical_key, value);
    }

    if let Some(list_prop) = entry.todo_list_property
        && let Some(Value::Array(items)) = args.get(list_prop)
    {
        let coerced = items.iter().map(coerce_todo_item).collect::<Vec<_>>();
        args.insert(list_prop.to_owned(), Value::Array(coerced));
    }

    for required in entry.required {
        if !args.contains_key(*required) {
            return Err(InvalidArgs {
                tool: entry.name.to_owned(),
                missing: (*required).to_owned(),
            });
        }
    }

    Ok(Value::Object(args))
}

/// Rewrite one todo-list element into the three mandatory fields
///
/// String elements are wrapped into a minimal object; object elements keep
/// exactly `content`, `status` and `activeForm`, with defaults filled in.
fn coerce_todo_item(item: &Value) -> Value {
    match item {
        Value::String(text) => json!({
            "content": text,
            "status": "pending",
            "activeForm": present_continuous(text),
        }),
        Value::Object(fields) => {
            let content = fields
                .get("content")
                .or_else(|| fields.get("description"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned();
            let status = fields
                .get("status")
                .and_then(Value::as_str)
                .unwrap_or("pending")
                .to_owned();
            let active_form = fields
                .get("activeForm")
                .and_then(Value::as_str)
                .map_or_else(|| present_continuous(&content), str::to_owned);
            json!({
                "content": content,
                "status": status,
                "activeForm": active_form,
            })
        }
        other => other.clone(),
    }
}

/// Synthesise a present-continuous form from an imperative phrase
///
/// Appends "ing" to the first word, dropping a single trailing "e" so that
/// "write spec" becomes "writing spec".
fn present_continuous(text: &str) -> String {
    let mut words = text.split_whitespace();
    let Some(verb) = words.next() else {
        return String::new();
    };
    let stem = match verb.strip_suffix('e') {
        Some(stem) if !stem.ends_with('e') => stem,
        _ => verb,
    };
    let rest: Vec<&str> = words.collect();
    if rest.is_empty() {
        format!("{stem}ing")
    } else {
        format!("{stem}ing {}", rest.join(" "))
    }
}
