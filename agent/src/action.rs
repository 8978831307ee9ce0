//! Selecting an action from free-form model output.
//!
//! Models asked to reply with `{"action": ..., "args": {...}}` often wrap the
//! object in prose or code fences, or ignore the format entirely. Parsing
//! therefore tries three strategies in a fixed order:
//!
//! 1. [`parse_strict`]: the whole trimmed output is the action object.
//! 2. [`parse_embedded`]: the first balanced `{...}` span inside the output
//!    that is a valid action object.
//! 3. the whole output is taken as a plain-text answer.

use crate::tools::{Answer, ToolCall};
use serde::Deserialize;
use serde::de::DeserializeOwned;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParseStrategy {
    Strict,
    Embedded,
    PlainText,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ParsedAction {
    pub call: ToolCall,
    pub strategy: ParseStrategy,
}

#[derive(Deserialize)]
struct Envelope {
    action: String,
    #[serde(default)]
    args: Option<serde_json::Map<String, serde_json::Value>>,
}

impl From<Envelope> for ToolCall {
    fn from(envelope: Envelope) -> Self {
        ToolCall {
            name: envelope.action,
            args: serde_json::Value::Object(envelope.args.unwrap_or_default()).to_string(),
        }
    }
}

pub fn parse_strict(raw: &str) -> Option<ToolCall> {
    serde_json::from_str::<Envelope>(raw.trim())
        .ok()
        .map(ToolCall::from)
}

pub fn parse_embedded(raw: &str) -> Option<ToolCall> {
    extract_json::<Envelope>(raw).map(ToolCall::from)
}

pub fn parse_action(raw: &str) -> ParsedAction {
    if let Some(call) = parse_strict(raw) {
        return ParsedAction {
            call,
            strategy: ParseStrategy::Strict,
        };
    }

    if let Some(call) = parse_embedded(raw) {
        return ParsedAction {
            call,
            strategy: ParseStrategy::Embedded,
        };
    }

    ParsedAction {
        call: Answer::call(raw.trim()),
        strategy: ParseStrategy::PlainText,
    }
}

/// Deserializes the first balanced JSON object in `raw` that fits `T`.
pub fn extract_json<T: DeserializeOwned>(raw: &str) -> Option<T> {
    if let Ok(value) = serde_json::from_str(raw.trim()) {
        return Some(value);
    }

    object_spans(raw).find_map(|span| serde_json::from_str(span).ok())
}

/// Yields every balanced `{...}` span in `text`, outermost first, skipping
/// braces that appear inside JSON string literals.
fn object_spans(text: &str) -> impl Iterator<Item = &str> {
    text.char_indices()
        .filter(|&(_, c)| c == '{')
        .filter_map(move |(start, _)| {
            balanced_end(&text[start..]).map(|len| &text[start..start + len])
        })
}

fn balanced_end(text: &str) -> Option<usize> {
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
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }

    None
}
