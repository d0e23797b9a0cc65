//! Defensive JSON extraction from LLM responses.
//!
//! Models wrap JSON in markdown fences, prepend commentary, and emit LaTeX
//! escapes (`\(`, `\sqrt`) that are invalid JSON. Parsing tries, in order:
//! the raw text, the text with escapes repaired, fenced code blocks, and
//! finally the first object or array found anywhere in the response.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::services::llm::LlmError;

fn fenced_block_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)```(?:json)?\s*\n(.*?)\n\s*```").expect("fenced block regex")
    })
}

fn object_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\{[^{}]*(?:\{[^{}]*\}[^{}]*)*\}").expect("object regex")
    })
}

fn array_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)\[.*\]").expect("array regex"))
}

/// Repair invalid escape sequences produced by LaTeX inside JSON strings.
///
/// `\"` and `\\` are structural and preserved; every other `\X` becomes a
/// literal backslash followed by X, so `\(\sqrt{16}\)` survives parsing.
fn fix_latex_escapes(text: &str) -> String {
    let mut result = String::with_capacity(text.len() + 8);
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.peek() {
                Some('"') => {
                    result.push('\\');
                    result.push('"');
                    chars.next();
                }
                Some('\\') => {
                    result.push_str("\\\\");
                    chars.next();
                }
                Some(&next) => {
                    result.push_str("\\\\");
                    result.push(next);
                    chars.next();
                }
                None => result.push_str("\\\\"),
            }
        } else {
            result.push(c);
        }
    }
    result
}

fn try_parse(text: &str) -> Option<Value> {
    serde_json::from_str(text)
        .ok()
        .or_else(|| serde_json::from_str(&fix_latex_escapes(text)).ok())
}

/// Extract and parse JSON from an LLM response.
pub fn parse_value(text: &str) -> Result<Value, LlmError> {
    let cleaned = text.trim();

    if let Some(value) = try_parse(cleaned) {
        return Ok(value);
    }

    if let Some(caps) = fenced_block_re().captures(cleaned) {
        if let Some(value) = try_parse(caps[1].trim()) {
            return Ok(value);
        }
    }

    for re in [object_re(), array_re()] {
        if let Some(m) = re.find(cleaned) {
            if let Some(value) = try_parse(m.as_str()) {
                return Ok(value);
            }
        }
    }

    Err(LlmError::MalformedJson(truncate(cleaned, 300)))
}

/// Parse an LLM response, guaranteeing a JSON object. Arrays are searched
/// for their first object element.
pub fn parse_object(text: &str) -> Result<serde_json::Map<String, Value>, LlmError> {
    match parse_value(text)? {
        Value::Object(map) => Ok(map),
        Value::Array(items) => items
            .into_iter()
            .find_map(|v| match v {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .ok_or_else(|| {
                LlmError::MalformedJson(format!(
                    "JSON array with no object elements: {}",
                    truncate(text, 300)
                ))
            }),
        other => Err(LlmError::MalformedJson(format!(
            "expected JSON object, got {}: {}",
            kind_of(&other),
            truncate(text, 300)
        ))),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn truncate(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}
