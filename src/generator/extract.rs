//! Best-effort recovery of a JSON object from free-form model output.
//!
//! The decoder tries, in order: the whole text, the first fenced code block,
//! and the span from the first `{` to the last `}`. A span that still fails
//! to parse gets one more attempt with raw control characters blanked out.
//! Nothing cleverer is attempted; anything else is an [`ExtractError`].

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use super::error::ExtractError;

pub fn extract_json(text: &str) -> Result<Map<String, Value>, ExtractError> {
    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return into_object(value);
    }

    let candidate = fenced_block(trimmed).unwrap_or(trimmed);
    let span = object_span(candidate).ok_or(ExtractError::NotFound)?;

    match serde_json::from_str::<Value>(span) {
        Ok(value) => into_object(value),
        Err(_) => {
            let cleaned: String = span
                .chars()
                .map(|c| if c.is_control() { ' ' } else { c })
                .collect();
            serde_json::from_str::<Value>(&cleaned)
                .map_err(|e| ExtractError::Malformed(e.to_string()))
                .and_then(into_object)
        }
    }
}

/// Extract and deserialize into `T`.
pub fn extract_as<T: DeserializeOwned>(text: &str) -> Result<T, ExtractError> {
    let object = extract_json(text)?;
    serde_json::from_value(Value::Object(object)).map_err(|e| ExtractError::Malformed(e.to_string()))
}

fn into_object(value: Value) -> Result<Map<String, Value>, ExtractError> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(ExtractError::Malformed(format!(
            "expected a JSON object, found {}",
            type_name(&other)
        ))),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn fenced_block(text: &str) -> Option<&str> {
    let start = text.find("```")?;
    let after = &text[start + 3..];
    // Skip an optional language tag on the opening fence line.
    let body_start = after.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &after[body_start..];
    let end = body.find("```")?;
    Some(body[..end].trim())
}

fn object_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}
