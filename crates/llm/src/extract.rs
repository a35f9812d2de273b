//! Extracting structured results from free-form model text.
//!
//! Models regularly wrap JSON in markdown fences or add a sentence before
//! or after the payload. [`extract_json`] is the one place that deals with
//! that; callers get either a parsed [`serde_json::Value`] or a
//! [`LlmError::ResponseParse`] they can treat as a provider failure.

use serde_json::Value;

use crate::error::{LlmError, LlmResult};

/// Maximum number of response characters echoed back in parse errors.
const ERROR_EXCERPT_CHARS: usize = 200;

/// Extract a JSON value from model output.
///
/// Tried in order:
/// 1. the trimmed text as-is
/// 2. the body of the first markdown code fence
/// 3. the outermost `[...]` or `{...}` span
pub fn extract_json(text: &str) -> LlmResult<Value> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(LlmError::parse("empty response"));
    }

    if let Ok(value) = serde_json::from_str(trimmed) {
        return Ok(value);
    }

    if let Some(fenced) = strip_code_fence(trimmed) {
        if let Ok(value) = serde_json::from_str(fenced) {
            return Ok(value);
        }
    }

    if let Some(span) = outermost_span(trimmed) {
        if let Ok(value) = serde_json::from_str(span) {
            return Ok(value);
        }
    }

    let excerpt: String = trimmed.chars().take(ERROR_EXCERPT_CHARS).collect();
    Err(LlmError::parse(format!("no JSON payload found in: {excerpt}")))
}

/// Return the body of the first ``` fence, skipping an optional language tag.
fn strip_code_fence(text: &str) -> Option<&str> {
    let start = text.find("```")?;
    let after_ticks = &text[start + 3..];
    let body_start = after_ticks.find('\n').map_or(0, |i| i + 1);
    let body = &after_ticks[body_start..];
    let end = body.find("```").unwrap_or(body.len());
    Some(body[..end].trim())
}

/// Slice from the first opening bracket to the matching last closing one.
fn outermost_span(text: &str) -> Option<&str> {
    let open = text.find(['[', '{'])?;
    let close_char = if text[open..].starts_with('[') { ']' } else { '}' };
    let close = text.rfind(close_char)?;
    (close > open).then(|| &text[open..=close])
}
