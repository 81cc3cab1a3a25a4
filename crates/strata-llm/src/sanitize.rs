//! Pre-flight conversation history repair
//!
//! Long-running conversations get truncated and occasionally corrupted
//! upstream; vendors reject histories with dangling tool results or empty
//! message bodies. The sanitizer runs once per request, before dispatch,
//! and keeps such histories valid across every subsequent call.

use std::collections::HashSet;

use serde_json::{Map, Value};

use crate::types::{Content, ContentBlock, Message, Role};

/// Placeholder inserted when orphan removal empties a message body
const EMPTIED_CONTENT_PLACEHOLDER: &str = "[tool result unavailable]";

/// Repair a conversation history in place
///
/// In order: drop any `tool_result` block (or tool-role message) whose
/// referenced id does not appear in an earlier `tool_use`; replace a
/// message body emptied by that removal with a placeholder text block;
/// drop user messages whose content is empty after cleanup.
pub fn sanitize_history(messages: &mut Vec<Message>) {
    let mut seen_tool_ids: HashSet<String> = HashSet::new();
    let mut cleaned: Vec<Message> = Vec::with_capacity(messages.len());

    for mut message in messages.drain(..) {
        let mut dropped_blocks = false;

        if let Content::Blocks(blocks) = &mut message.content {
            blocks.retain(|block| match block {
                ContentBlock::ToolResult { tool_use_id, .. } if !seen_tool_ids.contains(tool_use_id) => {
                    tracing::warn!(
                        tool_use_id = %tool_use_id,
                        "dropping orphaned tool result with no matching tool use"
                    );
                    dropped_blocks = true;
                    false
                }
                _ => true,
            });

            for block in blocks.iter() {
                if let ContentBlock::ToolUse { id, .. } = block {
                    seen_tool_ids.insert(id.clone());
                }
            }
        }

        match message.role {
            // A tool turn stripped of every result has nothing left to say
            Role::Tool => {
                if message.content.is_empty() {
                    continue;
                }
            }
            Role::User => {
                if message.content.is_empty() {
                    if dropped_blocks {
                        // Vendors reject empty bodies; keep the turn with a marker
                        message.content = Content::Blocks(vec![ContentBlock::Text {
                            text: EMPTIED_CONTENT_PLACEHOLDER.to_owned(),
                        }]);
                    } else {
                        tracing::warn!("dropping user message with empty content");
                        continue;
                    }
                }
            }
            Role::System | Role::Assistant => {}
        }

        cleaned.push(message);
    }

    *messages = cleaned;
}

/// Coerce a `tool_use` input into a plain JSON object
///
/// Model output is occasionally malformed and every vendor's tool-call
/// contract requires a plain key/value object. Precedence: object is used
/// as-is; a JSON string is parsed (object used directly, any other parse
/// result wrapped under `value`); null becomes `{}`; an array is wrapped
/// under `items`; any other scalar is wrapped under `value`.
pub fn normalize_tool_input(input: Value) -> Map<String, Value> {
    match input {
        Value::Object(map) => map,
        Value::String(raw) => match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Object(map)) => map,
            Ok(parsed) => singleton("value", parsed),
            Err(_) => singleton("value", Value::String(raw)),
        },
        Value::Null => Map::new(),
        Value::Array(items) => singleton("items", Value::Array(items)),
        scalar => singleton("value", scalar),
    }
}

/// Undo a common model mistake of double-wrapping tool arguments
///
/// An object whose only key is `value` holding another object is
/// unwrapped; anything else (including a multi-key object that happens to
/// contain `value`) passes through unchanged.
pub fn unwrap_value_wrapper(arguments: Value) -> Value {
    if let Value::Object(map) = &arguments
        && map.len() == 1
        && let Some(inner) = map.get("value")
        && inner.is_object()
    {
        return inner.clone();
    }
    arguments
}

fn singleton(key: &str, value: Value) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert(key.to_owned(), value);
    map
}
