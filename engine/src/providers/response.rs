//! Lenient JSON extraction from model replies
//!
//! Chat models are asked for a single JSON object but often wrap it in a
//! markdown fence or surround it with prose. Handles, in order:
//! 1. Raw JSON: the whole reply is the object
//! 2. Fenced JSON, with or without trailing text
//! 3. The first balanced `{...}` object embedded in prose

use serde_json::Value;

/// Extract the first JSON object from a model reply
pub fn extract_json_object(content: &str) -> Option<Value> {
    let trimmed = content.trim();

    if let Some(value) = parse_object(trimmed) {
        return Some(value);
    }

    if let Some(inner) = extract_fenced_json(trimmed) {
        if let Some(value) = parse_object(inner.trim()) {
            return Some(value);
        }
    }

    // Scan every opening brace; prose may contain stray braces before the object
    for (pos, _) in trimmed.match_indices('{') {
        if let Some(candidate) = extract_balanced_json(&trimmed[pos..]) {
            if let Some(value) = parse_object(candidate) {
                return Some(value);
            }
        }
    }

    None
}

fn parse_object(s: &str) -> Option<Value> {
    serde_json::from_str::<Value>(s)
        .ok()
        .filter(|value| value.is_object())
}

/// Extract the body of the first markdown code fence in the text.
///
/// Returns `None` if no fenced block is found.
fn extract_fenced_json(content: &str) -> Option<&str> {
    let fence_start = content.find("```")?;
    let after_opening = &content[fence_start + 3..];
    // Skip the language tag line (e.g. "json\n")
    let body_start = fence_start + 3 + after_opening.find('\n')? + 1;
    let closing = content[body_start..].find("```")?;
    let body_end = body_start + closing;
    if body_start >= body_end {
        return None;
    }
    Some(&content[body_start..body_end])
}

/// Extract a balanced JSON object starting at position 0 of `s`.
///
/// Counts brace depth outside string literals.
fn extract_balanced_json(s: &str) -> Option<&str> {
    if !s.starts_with('{') {
        return None;
    }

    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in s.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&s[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Read a number that models sometimes send as a string
pub fn number_field(value: &Value, key: &str) -> Option<f64> {
    match value.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .filter(|n: &f64| n.is_finite())
}

/// Read a list of strings, skipping anything that is not a non-empty string
pub fn string_list(value: &Value, key: &str) -> Vec<String> {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
