// SPDX-License-Identifier: MIT

//! JSON carried inside free-form model text
//!
//! Models wrap JSON in markdown fences, prefix it with chatter, or trail off
//! after the closing brace. [`extract_json`] digs the JSON value out.

use serde_json::Value;

/// Content of the first fenced code block, if any
pub fn strip_code_fences(text: &str) -> Option<&str> {
    let start = text.find("```")?;
    let after_fence = &text[start + 3..];
    // Skip the info string (`json`, `JSON`, ...)
    let body_start = after_fence.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &after_fence[body_start..];
    let end = body.find("```").unwrap_or(body.len());
    Some(body[..end].trim())
}

/// The first `{ ... }` block whose braces balance, ignoring braces in strings
pub fn find_balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Pull a JSON value out of free-form model text.
///
/// Tries, in order: the fenced block (or the whole text), the first balanced
/// object, and the span from the first `{` to the last `}`. When nothing
/// parses, the error from parsing the text itself is returned.
pub fn extract_json(text: &str) -> Result<Value, serde_json::Error> {
    let candidate = strip_code_fences(text).unwrap_or_else(|| text.trim());

    let first_error = match serde_json::from_str::<Value>(candidate) {
        Ok(value) => return Ok(value),
        Err(e) => e,
    };

    if let Some(block) = find_balanced_object(candidate) {
        if let Ok(value) = serde_json::from_str(block) {
            return Ok(value);
        }
    }

    if let (Some(first), Some(last)) = (candidate.find('{'), candidate.rfind('}')) {
        if first < last {
            if let Ok(value) = serde_json::from_str(&candidate[first..=last]) {
                return Ok(value);
            }
        }
    }

    // The fence may have held something else; fall back to the raw text
    if candidate.len() != text.trim().len() {
        if let Some(block) = find_balanced_object(text) {
            if let Ok(value) = serde_json::from_str(block) {
                return Ok(value);
            }
        }
    }

    Err(first_error)
}
