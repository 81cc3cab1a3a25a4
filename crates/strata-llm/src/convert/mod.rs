//! Conversion between canonical types and vendor wire formats

pub mod anthropic;

use crate::types::{Content, ContentBlock, Message, Role};

/// Max tokens sent when the caller does not specify one
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Headroom added above the thinking budget when `max_tokens` would not
/// leave room for any visible output
pub const THINKING_MAX_TOKENS_MARGIN: u32 = 4096;

/// Concatenate system-role messages into one system prompt
///
/// Order is preserved; messages are joined by a blank line. Returns
/// `None` when the history carries no system content.
pub fn extract_system_prompt(messages: &[Message]) -> Option<String> {
    let parts: Vec<String> = messages
        .iter()
        .filter(|message| message.role == Role::System)
        .map(|message| message.content.as_text())
        .filter(|text| !text.is_empty())
        .collect();

    if parts.is_empty() { None } else { Some(parts.join("\n\n")) }
}

/// Whether the history can be replayed with extended thinking enabled
///
/// Resuming after a tool round requires the assistant turn that issued
/// the calls to begin with its original thinking block. A history that
/// lacks one cannot be repaired — fabricated thinking blocks fail vendor
/// signature verification — so the caller disables thinking for the call
/// instead.
pub fn history_supports_thinking(messages: &[Message]) -> bool {
    let Some(last_assistant) = messages.iter().rev().find(|m| m.role == Role::Assistant) else {
        return true;
    };

    match &last_assistant.content {
        Content::Text(_) => true,
        Content::Blocks(blocks) => {
            let issued_tool_calls = blocks.iter().any(|b| matches!(b, ContentBlock::ToolUse { .. }));
            if !issued_tool_calls {
                return true;
            }
            matches!(blocks.first(), Some(ContentBlock::Thinking { .. }))
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn system_messages_joined_by_blank_line() {
        let messages = vec![
            Message::text(Role::System, "You are helpful."),
            Message::text(Role::User, "hi"),
            Message::text(Role::System, "Answer in French."),
        ];
        assert_eq!(
            extract_system_prompt(&messages).as_deref(),
            Some("You are helpful.\n\nAnswer in French.")
        );
    }

    #[test]
    fn no_system_messages_yields_none() {
        let messages = vec![Message::text(Role::User, "hi")];
        assert_eq!(extract_system_prompt(&messages), None);
    }

    #[test]
    fn thinking_allowed_without_assistant_turns() {
        let messages = vec![Message::text(Role::User, "hi")];
        assert!(history_supports_thinking(&messages));
    }

    #[test]
    fn thinking_allowed_when_tool_turn_leads_with_thinking() {
        let messages = vec![Message::blocks(
            Role::Assistant,
            vec![
                ContentBlock::Thinking {
                    thinking: "I should read the file".to_owned(),
                    signature: Some("sig".to_owned()),
                },
                ContentBlock::ToolUse {
                    id: "tu_1".to_owned(),
                    name: "read_file".to_owned(),
                    input: json!({"path": "a.txt"}),
                },
            ],
        )];
        assert!(history_supports_thinking(&messages));
    }

    #[test]
    fn thinking_disabled_when_tool_turn_lacks_thinking() {
        let messages = vec![Message::blocks(
            Role::Assistant,
            vec![ContentBlock::ToolUse {
                id: "tu_1".to_owned(),
                name: "read_file".to_owned(),
                input: json!({"path": "a.txt"}),
            }],
        )];
        assert!(!history_supports_thinking(&messages));
    }

    #[test]
    fn plain_text_assistant_turns_are_compatible() {
        let messages = vec![
            Message::text(Role::User, "hi"),
            Message::text(Role::Assistant, "hello"),
        ];
        assert!(history_supports_thinking(&messages));
    }
}
