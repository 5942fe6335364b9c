//! Carry-over extraction: mining step output for variables the next
//! step can use.
//!
//! Extraction is best-effort and advisory. The orchestrator merges what
//! it finds into the next step's inputs; nothing here fails a pipeline.

use serde_json::{Map, Value};
use std::collections::HashMap;

/// Pull candidate variables out of one step's output.
///
/// Two sources:
/// - every line is checked for `key: value` or `key = value`, with
///   surrounding quotes stripped from the value;
/// - if the whole output also parses as a JSON object, its top-level
///   entries are taken verbatim (typed values preserved) and win over
///   any line-derived value for the same key.
///
/// Keys must look identifier-like (`[A-Za-z_][A-Za-z0-9_]*`) so prose
/// containing colons does not turn into variables.
pub fn extract_variables(output: &str) -> HashMap<String, Value> {
    let mut vars = HashMap::new();

    for line in output.lines() {
        if let Some((key, value)) = parse_line(line) {
            vars.insert(key, value);
        }
    }

    let json_object: Option<Map<String, Value>> = serde_json::from_str::<Value>(output.trim())
        .ok()
        .and_then(|v| match v {
            Value::Object(map) => Some(map),
            _ => None,
        });

    if let Some(map) = json_object {
        for (key, value) in map {
            if is_identifier(&key) {
                vars.insert(key, value);
            }
        }
    }

    vars
}

fn parse_line(line: &str) -> Option<(String, Value)> {
    let (key, value) = line
        .split_once(':')
        .or_else(|| line.split_once('='))?;
    let key = key.trim();
    if !is_identifier(key) {
        return None;
    }
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    let value = strip_quotes(value);
    Some((key.to_string(), Value::String(value.to_string())))
}

fn is_identifier(s: &str) -> bool {
    let mut bytes = s.bytes();
    match bytes.next() {
        Some(b) if b.is_ascii_alphabetic() || b == b'_' => {}
        _ => return false,
    }
    bytes.all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

fn strip_quotes(s: &str) -> &str {
    let stripped = s
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .or_else(|| s.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')));
    stripped.unwrap_or(s)
}
