// SPDX-License-Identifier: MIT

//! Turn provider failures into messages fit for a chat window

use crate::adk::error::{ProviderError, ProviderErrorCode};
use serde_json::Value;

/// What the user can do about an error of this kind
pub fn suggestion_for(code: ProviderErrorCode) -> Option<&'static str> {
    match code {
        ProviderErrorCode::RateLimited => {
            Some("The provider is rate limiting requests. Wait a moment and try again.")
        }
        ProviderErrorCode::Unauthorized => {
            Some("Check that your API key is set and still valid.")
        }
        ProviderErrorCode::ContextLength => Some(
            "The conversation is too long for this model. Start a new thread or attach less content.",
        ),
        ProviderErrorCode::Timeout => Some("The model took too long to answer. Try again."),
        ProviderErrorCode::Network => {
            Some("Could not reach the provider. Check your connection or the base URL.")
        }
        ProviderErrorCode::ModelNotFound => {
            Some("The configured model does not exist. Check the model name.")
        }
        ProviderErrorCode::InvalidResponse | ProviderErrorCode::Other => None,
    }
}

/// Dig the human message out of a nested JSON error payload such as
/// `{"error": {"message": "..."}}`
fn inner_message(text: &str) -> Option<String> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    let value: Value = serde_json::from_str(&text[start..=end]).ok()?;
    find_message(&value)
}

fn find_message(value: &Value) -> Option<String> {
    match value {
        Value::Object(map) => {
            if let Some(inner) = map.get("error") {
                if let Some(found) = find_message(inner) {
                    return Some(found);
                }
            }
            if let Some(message) = map.get("message") {
                return match message {
                    Value::String(s) => match inner_message(s) {
                        Some(nested) => Some(nested),
                        None => Some(s.clone()),
                    },
                    other => find_message(other),
                };
            }
            None
        }
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        _ => None,
    }
}

/// Remove leading `[E_CODE]` and `E_CODE:` markers
fn strip_code_prefixes(text: &str) -> &str {
    let mut rest = text.trim_start();
    loop {
        if let Some(after) = rest.strip_prefix('[') {
            if let Some(close) = after.find(']') {
                if is_error_code(&after[..close]) {
                    rest = after[close + 1..].trim_start();
                    continue;
                }
            }
        }
        if let Some(colon) = rest.find(':') {
            if is_error_code(&rest[..colon]) {
                rest = rest[colon + 1..].trim_start();
                continue;
            }
        }
        return rest;
    }
}

fn is_error_code(token: &str) -> bool {
    token.len() > 2
        && token.starts_with("E_")
        && token
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

/// The message a chat user sees for a provider failure
pub fn sanitize_provider_error(error: &ProviderError) -> String {
    let message = inner_message(&error.message).unwrap_or_else(|| error.message.clone());
    let message = strip_code_prefixes(&message).trim();
    let message = if message.is_empty() {
        "The model request failed."
    } else {
        message
    };

    match suggestion_for(error.code) {
        Some(suggestion) => format!("{}\n\n{}", message, suggestion),
        None => message.to_string(),
    }
}
