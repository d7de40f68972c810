//! Tolerant JSON reading for tool output.
//!
//! Tools print banners, warnings, or several JSON documents in a row. This
//! reads every top-level value it can and skips past anything it can't.

use serde_json::{Deserializer, Map, Value};

/// Every JSON value in `text`, in order.
///
/// On a syntax error, reading resumes on the line after the one where the
/// bad value started.
pub(crate) fn values(text: &str) -> Vec<Value> {
    let mut values = Vec::new();
    let mut rest = text;

    loop {
        let mut stream = Deserializer::from_str(rest).into_iter::<Value>();
        let mut failed = false;
        for item in stream.by_ref() {
            match item {
                Ok(value) => values.push(value),
                Err(_) => {
                    failed = true;
                    break;
                }
            }
        }
        if !failed {
            break;
        }

        let after = &rest[stream.byte_offset()..];
        let start = after.len() - after.trim_start().len();
        match after[start..].find('\n') {
            Some(newline) => rest = &after[start + newline + 1..],
            None => break,
        }
    }

    values
}

/// Calls `visit` for every object nested anywhere in `value`, parents first.
pub(crate) fn for_each_object<'a>(value: &'a Value, visit: &mut dyn FnMut(&'a Map<String, Value>)) {
    match value {
        Value::Object(map) => {
            visit(map);
            for child in map.values() {
                for_each_object(child, visit);
            }
        }
        Value::Array(items) => {
            for child in items {
                for_each_object(child, visit);
            }
        }
        _ => {}
    }
}

/// A non-empty string field.
pub(crate) fn text<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    map.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}

/// A string or numeric field, as text.
pub(crate) fn text_or_number(map: &Map<String, Value>, key: &str) -> Option<String> {
    match map.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
