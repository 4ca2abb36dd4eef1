//! Structured-result detection for finished assistant messages
//!
//! Some agents answer with a JSON object (a task split, a schedule plan)
//! instead of prose. Such an answer either opens with a ```json fence or
//! starts the message as a bare object. Anything that does not parse, or
//! whose `type` is not registered, is treated as markdown.

use serde_json::Value;
use tracing::debug;

use crate::registry::ResultRegistry;

/// How a finished message should be displayed
#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    Structured(Value),
    Markdown,
}

/// Classify finished content against the registered result types
pub fn classify(content: &str, registry: &dyn ResultRegistry) -> Classification {
    let Some(value) = parse_structured(content) else {
        return Classification::Markdown;
    };
    match value.get("type").and_then(Value::as_str) {
        Some(result_type) if registry.is_registered_result_type(result_type) => {
            debug!(%result_type, "classify: structured result");
            Classification::Structured(value)
        }
        other => {
            debug!(result_type = ?other, "classify: unregistered type, treating as markdown");
            Classification::Markdown
        }
    }
}

/// Parse the JSON object carried by `content`, if any
pub fn parse_structured(content: &str) -> Option<Value> {
    let candidate = json_candidate(content)?;
    match serde_json::from_str::<Value>(candidate) {
        Ok(value) if value.is_object() => Some(value),
        Ok(_) => None,
        Err(e) => {
            debug!(error = %e, "parse_structured: candidate is not valid JSON");
            None
        }
    }
}

/// Locate the JSON text: a leading ```json (or bare ```) fence, else a leading object
fn json_candidate(content: &str) -> Option<&str> {
    let trimmed = content.trim();
    if trimmed.starts_with("```") {
        return fenced_json(trimmed);
    }
    if trimmed.starts_with('{') {
        let end = matching_brace(trimmed)?;
        return Some(&trimmed[..=end]);
    }
    None
}

/// Body of the fence opening `text`, when its info string is empty or `json`
fn fenced_json(text: &str) -> Option<&str> {
    let after_fence = text.strip_prefix("```")?;
    let line_end = after_fence.find('\n')?;
    let info = after_fence[..line_end].trim();
    if !(info.is_empty() || info.eq_ignore_ascii_case("json")) {
        return None;
    }
    let body = &after_fence[line_end + 1..];
    let close = body.find("```")?;
    Some(body[..close].trim())
}

/// Byte index of the brace closing the object that starts at index 0
fn matching_brace(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}
