//! Locate the JSON object inside raw model text.
//!
//! Two strategies, tried in order:
//!
//! 1. The trimmed text is itself a `{...}` object.
//! 2. The first fenced code block (optionally tagged `json`) holding an object.
//!
//! Anything else is a parse failure. There is no brace-balancing scan over
//! arbitrary prose.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Map, Value};

use super::ParseError;

lazy_static! {
    static ref FENCED_OBJECT: Regex =
        Regex::new(r"(?s)```(?:json|JSON)?\s*(\{.*?\})\s*```").unwrap();
}

/// Pull a non-empty JSON object out of `raw`.
pub fn extract_object(raw: &str) -> Result<Map<String, Value>, ParseError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ParseError::EmptyResponse);
    }

    let whole = if trimmed.starts_with('{') && trimmed.ends_with('}') {
        parse_object(trimmed)
    } else {
        None
    };

    let found = whole.or_else(|| {
        FENCED_OBJECT
            .captures_iter(trimmed)
            .find_map(|caps| caps.get(1).and_then(|m| parse_object(m.as_str())))
    });

    match found {
        Some(map) if map.is_empty() => Err(ParseError::EmptyObject),
        Some(map) => Ok(map),
        None => Err(ParseError::NoJsonObject),
    }
}

fn parse_object(text: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}
