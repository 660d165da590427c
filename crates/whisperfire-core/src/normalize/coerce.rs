//! Scalar coercions applied to loosely-typed model output.

use serde_json::Value;

/// Object keys that carry the human-readable text of a list item.
const TEXT_KEYS: [&str; 5] = ["quote", "text", "content", "message", "value"];

/// Coerce a value into an integer score in `0..=100`.
///
/// Booleans map to 0/100. Fractions strictly between 0 and 1 are read as
/// ratios and scaled. Numeric strings are parsed, with an optional trailing
/// `%`. Everything else is 0.
pub fn score(value: Option<&Value>) -> u8 {
    match value {
        Some(Value::Bool(true)) => 100,
        Some(Value::Bool(false)) => 0,
        Some(Value::Number(n)) => n.as_f64().map(|f| clamp_score(f, true)).unwrap_or(0),
        Some(Value::String(s)) => parse_numeric(s).unwrap_or(0),
        _ => 0,
    }
}

fn parse_numeric(s: &str) -> Option<u8> {
    let trimmed = s.trim();
    let (digits, percent) = match trimmed.strip_suffix('%') {
        Some(rest) => (rest.trim_end(), true),
        None => (trimmed, false),
    };
    let n: f64 = digits.parse().ok()?;
    Some(clamp_score(n, !percent))
}

fn clamp_score(n: f64, allow_ratio: bool) -> u8 {
    if !n.is_finite() {
        return 0;
    }
    let n = if allow_ratio && n > 0.0 && n < 1.0 {
        n * 100.0
    } else {
        n
    };
    n.round().clamp(0.0, 100.0) as u8
}

/// Truncate to at most `cap` characters, never splitting a code point.
pub fn truncate(s: &str, cap: usize) -> String {
    match s.char_indices().nth(cap) {
        Some((idx, _)) => s[..idx].trim_end().to_string(),
        None => s.to_string(),
    }
}

/// Coerce into a capped string. Arrays are joined with `"; "`.
pub fn text(value: Option<&Value>, cap: usize) -> String {
    text_joined(value, cap, "; ")
}

/// Coerce into a capped string, joining array items with `separator`.
pub fn text_joined(value: Option<&Value>, cap: usize, separator: &str) -> String {
    let flat = match value {
        Some(Value::Array(items)) => join_items(items, separator),
        Some(v) => flatten(v),
        None => String::new(),
    };
    truncate(flat.trim(), cap)
}

/// Like [`text`], but blank results are `None`.
pub fn optional_text(value: Option<&Value>, cap: usize) -> Option<String> {
    Some(text(value, cap)).filter(|s| !s.is_empty())
}

/// Coerce into a list of non-empty capped strings, keeping at most `max_items`.
///
/// A lone scalar becomes a one-item list.
pub fn string_list(value: Option<&Value>, item_cap: usize, max_items: usize) -> Vec<String> {
    let items: Vec<&Value> = match value {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(Value::Null) | None => Vec::new(),
        Some(other) => vec![other],
    };

    items
        .into_iter()
        .map(|item| truncate(flatten(item).trim(), item_cap))
        .filter(|s| !s.is_empty())
        .take(max_items)
        .collect()
}

/// Label text from a string value; anything else is empty.
pub fn label(value: Option<&Value>) -> &str {
    value.and_then(Value::as_str).unwrap_or_default()
}

fn join_items(items: &[Value], separator: &str) -> String {
    items
        .iter()
        .map(flatten)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(separator)
}

fn flatten(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(_) | Value::Number(_) => value.to_string(),
        Value::Array(items) => join_items(items, "; "),
        Value::Object(map) => TEXT_KEYS
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str))
            .map(str::to_string)
            .unwrap_or_else(|| value.to_string()),
    }
}
