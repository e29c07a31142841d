//! Raw configuration documents.
//!
//! Parses JSON or YAML text into an ordered JSON object, sanitizes scalar
//! settings and deep-merges layers over the defaults. Typed validation is
//! left to the section parsers.

use crate::{Error, Result};
use serde_json::{Map, Value};

/// Prefix that forces JSON parsing of a configuration document.
pub const JSON_PREFIX: &str = "JSON";

/// Maximum length of a sanitized scalar setting.
pub const MAX_SETTING_LENGTH: usize = 255;

/// Parses a configuration document.
///
/// Empty text yields an empty object. A document starting with the literal
/// `JSON` prefix, or with `{`, is JSON; everything else is YAML.
pub fn parse(raw: &str) -> Result<Map<String, Value>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(Map::new());
    }

    let value: Value = if let Some(json) = trimmed.strip_prefix(JSON_PREFIX) {
        serde_json::from_str(json)
            .map_err(|e| Error::InvalidConfig(format!("invalid JSON document: {e}")))?
    } else if trimmed.starts_with('{') {
        serde_json::from_str(trimmed)
            .map_err(|e| Error::InvalidConfig(format!("invalid JSON document: {e}")))?
    } else {
        serde_yaml_ng::from_str(trimmed)
            .map_err(|e| Error::InvalidConfig(format!("invalid YAML document: {e}")))?
    };

    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        other => Err(Error::InvalidConfig(format!(
            "configuration root must be a mapping, found {}",
            kind_name(&other)
        ))),
    }
}

/// Sanitizes a scalar string setting.
///
/// Control characters other than tab are removed, surrounding spaces are
/// trimmed and the result is bounded to [`MAX_SETTING_LENGTH`] characters.
pub fn sanitize_text(text: &str) -> String {
    text.chars()
        .filter(|c| *c == '\t' || !c.is_control())
        .collect::<String>()
        .trim_matches(' ')
        .chars()
        .take(MAX_SETTING_LENGTH)
        .collect()
}

/// Sanitizes string leaves at setting level; structured values pass as is.
pub fn sanitize(value: Value) -> Value {
    match value {
        Value::String(s) => Value::String(sanitize_text(&s)),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| {
                    let v = match v {
                        Value::String(s) => Value::String(sanitize_text(&s)),
                        other => other,
                    };
                    (k, v)
                })
                .collect(),
        ),
        other => other,
    }
}

/// Merges `overlay` into `base` one setting at a time.
///
/// Object sections are merged per setting; a `null` setting removes the
/// inherited one. Any other section value replaces the base value. A `null`
/// section keeps the base section.
pub fn merge(base: &mut Map<String, Value>, overlay: Map<String, Value>) {
    for (section, value) in overlay {
        match (base.get_mut(&section), value) {
            (_, Value::Null) => {},
            (Some(Value::Object(existing)), Value::Object(settings)) => {
                for (key, setting) in settings {
                    if setting.is_null() {
                        existing.shift_remove(&key);
                    } else {
                        existing.insert(key, setting);
                    }
                }
            },
            (_, value) => {
                base.insert(section, value);
            },
        }
    }
}

/// Returns a human readable name of the value's JSON type.
pub const fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "mapping",
    }
}

/// Reads an optional string setting; numbers are accepted as text.
pub fn get_string(section: &Map<String, Value>, key: &str) -> Result<Option<String>> {
    match section.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(Error::InvalidConfig(format!(
            "'{key}' must be a string, found {}",
            kind_name(other)
        ))),
    }
}

/// Reads an optional non-negative integer setting; numeric strings are accepted.
pub fn get_u64(section: &Map<String, Value>, key: &str) -> Result<Option<u64>> {
    match section.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_u64()
            .map(Some)
            .ok_or_else(|| Error::InvalidConfig(format!("'{key}' must be a non-negative integer"))),
        Some(Value::String(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::InvalidConfig(format!("'{key}' must be a non-negative integer"))),
        Some(other) => Err(Error::InvalidConfig(format!(
            "'{key}' must be an integer, found {}",
            kind_name(other)
        ))),
    }
}

/// Reads an optional boolean setting; `0`/`1` and `"true"`/`"false"` are accepted.
pub fn get_bool(section: &Map<String, Value>, key: &str) -> Result<Option<bool>> {
    match section.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(Value::Number(n)) => Ok(Some(n.as_u64().unwrap_or(0) != 0)),
        Some(Value::String(s)) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" | "1" => Ok(Some(true)),
            "false" | "no" | "0" | "" => Ok(Some(false)),
            _ => Err(Error::InvalidConfig(format!("'{key}' must be a boolean"))),
        },
        Some(other) => Err(Error::InvalidConfig(format!(
            "'{key}' must be a boolean, found {}",
            kind_name(other)
        ))),
    }
}

/// Reads a list of strings; a scalar string is split on commas and whitespace.
pub fn get_string_list(section: &Map<String, Value>, key: &str) -> Result<Vec<String>> {
    match section.get(key) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::String(s)) => Ok(split_list(s)),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => Ok(s.trim().to_string()),
                Value::Number(n) => Ok(n.to_string()),
                other => Err(Error::InvalidConfig(format!(
                    "'{key}' entries must be strings, found {}",
                    kind_name(other)
                ))),
            })
            .filter(|r| r.as_ref().map_or(true, |s| !s.is_empty()))
            .collect(),
        Some(other) => Err(Error::InvalidConfig(format!(
            "'{key}' must be a list, found {}",
            kind_name(other)
        ))),
    }
}

/// Splits a comma or whitespace separated list.
pub fn split_list(text: &str) -> Vec<String> {
    text.split(|c: char| c == ',' || c.is_whitespace())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Returns the named section as an object, or an empty one.
pub fn section<'a>(
    document: &'a Map<String, Value>,
    name: &str,
    empty: &'a Map<String, Value>,
) -> Result<&'a Map<String, Value>> {
    match document.get(name) {
        None | Some(Value::Null) => Ok(empty),
        Some(Value::Object(map)) => Ok(map),
        Some(other) => Err(Error::InvalidConfig(format!(
            "section '{name}' must be a mapping, found {}",
            kind_name(other)
        ))),
    }
}
