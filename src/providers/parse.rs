//! Defensive parsing of backend replies.
//!
//! Nothing in here returns an error. A reply that cannot be understood
//! becomes the conservative fallback for its request kind.

use serde_json::Value;
use tracing::warn;

use crate::types::{
    AssistRequest, AssistResponse, Difficulty, Encouragement, ShrinkRequest, ShrinkResult,
    ShrinkStep, Tone,
};

const DEFAULT_STEP_MINUTES: u32 = 5;
const MAX_STEP_MINUTES: u32 = 240;
const MAX_PLAIN_MESSAGE_CHARS: usize = 280;

/// Recover a JSON object from a reply.
///
/// Tries the whole text first, then the first balanced `{...}` span,
/// honouring string literals and escapes while matching braces.
pub fn extract_json(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(trimmed) {
        return Some(value);
    }
    let span = first_balanced_object(trimmed)?;
    match serde_json::from_str::<Value>(span) {
        Ok(value @ Value::Object(_)) => Some(value),
        _ => None,
    }
}

fn first_balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
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

/// Turn a raw reply into the response shape the request asked for.
pub fn parse_response(request: &AssistRequest, text: &str) -> AssistResponse {
    match request {
        AssistRequest::Shrink(req) => AssistResponse::Shrink(parse_shrink(req, text)),
        AssistRequest::Encourage(_) => AssistResponse::Encouragement(parse_encouragement(text)),
    }
}

pub fn parse_shrink(request: &ShrinkRequest, text: &str) -> ShrinkResult {
    let Some(value) = extract_json(text) else {
        warn!(reply_len = text.len(), "shrink reply had no JSON, using fallback");
        return ShrinkResult::fallback(&request.task_title);
    };

    let steps: Vec<ShrinkStep> = ["shrunkTasks", "steps", "tasks"]
        .iter()
        .find_map(|field| value.get(*field).and_then(Value::as_array))
        .map(|items| items.iter().filter_map(parse_step).collect())
        .unwrap_or_default();

    if steps.is_empty() {
        warn!("shrink reply had no usable steps, using fallback");
        return ShrinkResult::fallback(&request.task_title);
    }

    ShrinkResult {
        original_task: request.task_title.clone(),
        steps,
        reasoning: non_empty_str(&value, "reasoning"),
        encouragement: non_empty_str(&value, "encouragement"),
    }
}

fn parse_step(item: &Value) -> Option<ShrinkStep> {
    if let Some(action) = item.as_str() {
        let action = action.trim();
        return (!action.is_empty())
            .then(|| ShrinkStep::new(action, DEFAULT_STEP_MINUTES, Difficulty::Easy));
    }

    let action = ["action", "title", "task", "text"]
        .iter()
        .find_map(|field| non_empty_str(item, field))?;
    let minutes = ["estimatedMinutes", "minutes", "duration"]
        .iter()
        .find_map(|field| item.get(*field).and_then(as_minutes))
        .unwrap_or(DEFAULT_STEP_MINUTES)
        .clamp(1, MAX_STEP_MINUTES);
    let difficulty = item
        .get("difficulty")
        .and_then(Value::as_str)
        .map(Difficulty::from_label)
        .unwrap_or_default();

    Some(ShrinkStep::new(action, minutes, difficulty))
}

/// Minutes may arrive as a number, a float, or a string like "10 min".
fn as_minutes(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f.round() as u64))
            .map(|m| m.min(u32::MAX as u64) as u32),
        Value::String(s) => s
            .split(|c: char| !c.is_ascii_digit())
            .find(|part| !part.is_empty())
            .and_then(|digits| digits.parse().ok()),
        _ => None,
    }
}

pub fn parse_encouragement(text: &str) -> Encouragement {
    if let Some(value) = extract_json(text)
        && let Some(message) = non_empty_str(&value, "message")
    {
        return Encouragement {
            message,
            tone: value
                .get("tone")
                .and_then(Value::as_str)
                .map(Tone::from_label)
                .unwrap_or_default(),
            emoji: non_empty_str(&value, "emoji"),
        };
    }

    // A short plain-text reply is still a usable message.
    let plain = text.trim();
    if !plain.is_empty() && !plain.contains('{') && plain.chars().count() <= MAX_PLAIN_MESSAGE_CHARS
    {
        return Encouragement {
            message: plain.to_string(),
            tone: Tone::Gentle,
            emoji: None,
        };
    }

    warn!(reply_len = text.len(), "encouragement reply unusable, using fallback");
    Encouragement::fallback()
}

fn non_empty_str(value: &Value, field: &str) -> Option<String> {
    value
        .get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
