//! Conversion between canonical types and the Anthropic wire format

use serde_json::Value;

use super::{DEFAULT_MAX_TOKENS, THINKING_MAX_TOKENS_MARGIN, extract_system_prompt, history_supports_thinking};
use crate::accumulate::{ToolCallAccumulator, ToolCallFragment};
use crate::error::GatewayError;
use crate::protocol::anthropic::{
    AnthropicContent, AnthropicContentBlock, AnthropicMessage, AnthropicRequest, AnthropicResponse,
    AnthropicResponseBlock, AnthropicStreamContentBlock, AnthropicStreamDelta, AnthropicStreamEvent, AnthropicThinking,
    AnthropicTool, AnthropicToolChoice,
};
use crate::sanitize::normalize_tool_input;
use crate::types::{
    CompletionRequest, CompletionResponse, Content, ContentBlock, FinishReason, Message, Role, StreamEvent, ToolChoice,
    Usage,
};

// -- Outbound: canonical request -> Anthropic wire format --

/// Build an Anthropic request body from a canonical request
///
/// System messages move to the top-level `system` field, consecutive tool
/// turns merge into single user turns, and tool inputs are coerced to
/// plain objects. When a thinking budget is present the API's constraints
/// are applied: temperature forced to 1, `max_tokens` raised above the
/// budget, and thinking disabled outright on an incompatible history.
pub fn build_request(request: &CompletionRequest) -> AnthropicRequest {
    let system = extract_system_prompt(&request.messages);
    let messages = build_messages(&request.messages);

    let budget = request.thinking_budget.filter(|_| {
        if history_supports_thinking(&request.messages) {
            true
        } else {
            tracing::warn!(
                model = %request.model,
                "assistant turn lacks a leading thinking block; disabling extended thinking for this call"
            );
            false
        }
    });

    let mut max_tokens = request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS);
    let mut temperature = request.temperature;
    let thinking = budget.map(|budget_tokens| {
        // The API requires temperature 1 alongside thinking and rejects
        // budgets that consume the whole completion window
        temperature = Some(1.0);
        if max_tokens <= budget_tokens {
            max_tokens = budget_tokens + THINKING_MAX_TOKENS_MARGIN;
        }
        AnthropicThinking::enabled(budget_tokens)
    });

    let tools = request.tools.as_ref().map(|tools| {
        tools
            .iter()
            .map(|tool| AnthropicTool {
                name: tool.name.clone(),
                description: tool.description.clone(),
                input_schema: tool.parameters.clone(),
            })
            .collect()
    });

    AnthropicRequest {
        model: request.model.clone(),
        max_tokens,
        system,
        messages,
        temperature,
        stream: None,
        tools,
        tool_choice: request.tool_choice.as_ref().map(tool_choice_to_wire),
        thinking,
    }
}

/// Convert conversation messages, merging consecutive tool turns
///
/// Vendors reject tool results split across multiple turns, so every run
/// of tool-role messages collapses into one user turn whose content is
/// the ordered tool_result blocks.
fn build_messages(messages: &[Message]) -> Vec<AnthropicMessage> {
    let mut wire: Vec<AnthropicMessage> = Vec::with_capacity(messages.len());
    let mut pending_results: Vec<AnthropicContentBlock> = Vec::new();

    for message in messages {
        if message.role == Role::Tool {
            pending_results.extend(tool_result_blocks(message));
            continue;
        }

        if !pending_results.is_empty() {
            wire.push(AnthropicMessage {
                role: "user".to_owned(),
                content: AnthropicContent::Blocks(std::mem::take(&mut pending_results)),
            });
        }

        match message.role {
            Role::System => {} // lifted into the top-level system field
            Role::User => wire.push(AnthropicMessage {
                role: "user".to_owned(),
                content: content_to_wire(&message.content, false),
            }),
            Role::Assistant => wire.push(AnthropicMessage {
                role: "assistant".to_owned(),
                content: content_to_wire(&message.content, true),
            }),
            Role::Tool => unreachable!("tool turns handled above"),
        }
    }

    if !pending_results.is_empty() {
        wire.push(AnthropicMessage {
            role: "user".to_owned(),
            content: AnthropicContent::Blocks(pending_results),
        });
    }

    wire
}

/// Extract tool_result blocks from a tool-role message
fn tool_result_blocks(message: &Message) -> Vec<AnthropicContentBlock> {
    match &message.content {
        Content::Text(_) => Vec::new(),
        Content::Blocks(blocks) => blocks
            .iter()
            .filter_map(|block| match block {
                ContentBlock::ToolResult { tool_use_id, content } => Some(AnthropicContentBlock::ToolResult {
                    tool_use_id: tool_use_id.clone(),
                    content: Some(content.clone()),
                    is_error: None,
                }),
                _ => None,
            })
            .collect(),
    }
}

fn content_to_wire(content: &Content, assistant: bool) -> AnthropicContent {
    match content {
        Content::Text(text) => AnthropicContent::Text(text.clone()),
        Content::Blocks(blocks) => {
            let wire = blocks
                .iter()
                .filter_map(|block| match block {
                    ContentBlock::Text { text } => Some(AnthropicContentBlock::Text { text: text.clone() }),
                    ContentBlock::Thinking { thinking, signature } if assistant => {
                        Some(AnthropicContentBlock::Thinking {
                            thinking: thinking.clone(),
                            signature: signature.clone(),
                        })
                    }
                    ContentBlock::ToolUse { id, name, input } if assistant => Some(AnthropicContentBlock::ToolUse {
                        id: id.clone(),
                        name: name.clone(),
                        input: Value::Object(normalize_tool_input(input.clone())),
                    }),
                    ContentBlock::ToolResult { tool_use_id, content } if !assistant => {
                        Some(AnthropicContentBlock::ToolResult {
                            tool_use_id: tool_use_id.clone(),
                            content: Some(content.clone()),
                            is_error: None,
                        })
                    }
                    _ => None,
                })
                .collect();
            AnthropicContent::Blocks(wire)
        }
    }
}

fn tool_choice_to_wire(choice: &ToolChoice) -> AnthropicToolChoice {
    let (choice_type, name) = match choice {
        ToolChoice::Auto => ("auto", None),
        ToolChoice::Any => ("any", None),
        ToolChoice::None => ("none", None),
        ToolChoice::Tool { name } => ("tool", Some(name.clone())),
    };
    AnthropicToolChoice {
        choice_type: choice_type.to_owned(),
        name,
    }
}

// -- Inbound: Anthropic wire format -> canonical types --

impl From<AnthropicResponse> for CompletionResponse {
    fn from(response: AnthropicResponse) -> Self {
        let content = response
            .content
            .into_iter()
            .map(|block| match block {
                AnthropicResponseBlock::Text { text } => ContentBlock::Text { text },
                AnthropicResponseBlock::Thinking { thinking, signature } => {
                    ContentBlock::Thinking { thinking, signature }
                }
                AnthropicResponseBlock::ToolUse { id, name, input } => ContentBlock::ToolUse { id, name, input },
            })
            .collect();

        Self {
            id: response.id,
            model: response.model,
            content,
            stop_reason: response.stop_reason.as_deref().and_then(parse_stop_reason),
            usage: Some(Usage {
                prompt_tokens: response.usage.input_tokens,
                completion_tokens: response.usage.output_tokens,
            }),
        }
    }
}

/// Map an Anthropic stop reason onto the canonical finish reason
pub fn parse_stop_reason(reason: &str) -> Option<FinishReason> {
    match reason {
        "end_turn" | "stop_sequence" => Some(FinishReason::Stop),
        "max_tokens" => Some(FinishReason::Length),
        "tool_use" => Some(FinishReason::ToolUse),
        "refusal" => Some(FinishReason::ContentFilter),
        _ => None,
    }
}

// -- Stream conversion --

/// Per-call state machine converting Anthropic SSE events to unified events
///
/// Suppresses everything without caller-facing meaning (pings, block
/// starts for text and thinking, signature deltas, block stops) and
/// flushes accumulated tool calls before the terminal `Done`.
#[derive(Debug, Default)]
pub struct AnthropicStreamState {
    tools: ToolCallAccumulator,
    prompt_tokens: u32,
    finish_reason: Option<FinishReason>,
}

impl AnthropicStreamState {
    /// Create state for one streaming call
    pub fn new() -> Self {
        Self::default()
    }

    /// Convert one vendor event into zero or more unified events
    pub fn convert_event(&mut self, event: AnthropicStreamEvent) -> Vec<Result<StreamEvent, GatewayError>> {
        match event {
            AnthropicStreamEvent::MessageStart { message } => {
                self.prompt_tokens = message.usage.map_or(0, |usage| usage.input_tokens);
                Vec::new()
            }

            AnthropicStreamEvent::Ping | AnthropicStreamEvent::ContentBlockStop { .. } => Vec::new(),

            AnthropicStreamEvent::ContentBlockStart { index, content_block } => match content_block {
                AnthropicStreamContentBlock::ToolUse { id, name, .. } => {
                    self.tools.push(ToolCallFragment {
                        index,
                        id: Some(id.clone()),
                        name: Some(name.clone()),
                        arguments: None,
                    });
                    vec![Ok(StreamEvent::ToolCallStart { id, name })]
                }
                AnthropicStreamContentBlock::Text { .. } | AnthropicStreamContentBlock::Thinking { .. } => Vec::new(),
            },

            AnthropicStreamEvent::ContentBlockDelta { index, delta } => match delta {
                AnthropicStreamDelta::TextDelta { text } => vec![Ok(StreamEvent::ContentDelta { text })],
                AnthropicStreamDelta::ThinkingDelta { thinking } => {
                    vec![Ok(StreamEvent::ThinkingDelta { text: thinking })]
                }
                // Verification-only; nothing for the caller
                AnthropicStreamDelta::SignatureDelta { .. } => Vec::new(),
                AnthropicStreamDelta::InputJsonDelta { partial_json } => {
                    let id = self.tools.id_for(index).unwrap_or_default().to_owned();
                    self.tools.push(ToolCallFragment {
                        index,
                        arguments: Some(partial_json.clone()),
                        ..Default::default()
                    });
                    vec![Ok(StreamEvent::ToolCallDelta {
                        id,
                        fragment: partial_json,
                    })]
                }
            },

            AnthropicStreamEvent::MessageDelta { delta, usage } => {
                if let Some(reason) = delta.stop_reason.as_deref().and_then(parse_stop_reason) {
                    self.finish_reason = Some(reason);
                }
                usage
                    .map(|usage| {
                        Ok(StreamEvent::Usage(Usage {
                            prompt_tokens: if usage.input_tokens > 0 {
                                usage.input_tokens
                            } else {
                                self.prompt_tokens
                            },
                            completion_tokens: usage.output_tokens,
                        }))
                    })
                    .into_iter()
                    .collect()
            }

            AnthropicStreamEvent::MessageStop => {
                let mut events: Vec<Result<StreamEvent, GatewayError>> = self
                    .tools
                    .finish()
                    .into_iter()
                    .map(|call| {
                        Ok(StreamEvent::ToolCallComplete {
                            id: call.id,
                            name: call.name,
                            arguments: call.arguments,
                        })
                    })
                    .collect();
                events.push(Ok(StreamEvent::Done {
                    finish_reason: self.finish_reason.take(),
                }));
                events
            }

            AnthropicStreamEvent::Error { error } => {
                vec![Err(GatewayError::Streaming(format!(
                    "{}: {}",
                    error.error_type, error.message
                )))]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::protocol::anthropic::{AnthropicMessageDelta, AnthropicStreamMessage, AnthropicUsage};
    use crate::types::ToolDefinition;

    fn request_with(messages: Vec<Message>) -> CompletionRequest {
        CompletionRequest::new("claude-sonnet-4-20250514", messages)
    }

    #[test]
    fn system_messages_lifted_out_of_line() {
        let request = request_with(vec![
            Message::text(Role::System, "Be brief."),
            Message::text(Role::User, "hi"),
            Message::text(Role::System, "Use markdown."),
        ]);

        let wire = build_request(&request);
        assert_eq!(wire.system.as_deref(), Some("Be brief.\n\nUse markdown."));
        assert_eq!(wire.messages.len(), 1);
        assert_eq!(wire.messages[0].role, "user");
    }

    #[test]
    fn consecutive_tool_turns_merge_into_one_user_turn() {
        let request = request_with(vec![
            Message::blocks(
                Role::Assistant,
                vec![
                    ContentBlock::ToolUse {
                        id: "tu_1".to_owned(),
                        name: "read".to_owned(),
                        input: json!({"path": "a"}),
                    },
                    ContentBlock::ToolUse {
                        id: "tu_2".to_owned(),
                        name: "read".to_owned(),
                        input: json!({"path": "b"}),
                    },
                ],
            ),
            Message::blocks(
                Role::Tool,
                vec![ContentBlock::ToolResult {
                    tool_use_id: "tu_1".to_owned(),
                    content: "alpha".to_owned(),
                }],
            ),
            Message::blocks(
                Role::Tool,
                vec![ContentBlock::ToolResult {
                    tool_use_id: "tu_2".to_owned(),
                    content: "beta".to_owned(),
                }],
            ),
        ]);

        let wire = build_request(&request);
        assert_eq!(wire.messages.len(), 2);

        let AnthropicContent::Blocks(blocks) = &wire.messages[1].content else {
            panic!("expected block content");
        };
        assert_eq!(blocks.len(), 2);
        assert!(matches!(
            &blocks[0],
            AnthropicContentBlock::ToolResult { tool_use_id, .. } if tool_use_id == "tu_1"
        ));
        assert!(matches!(
            &blocks[1],
            AnthropicContentBlock::ToolResult { tool_use_id, .. } if tool_use_id == "tu_2"
        ));
    }

    #[test]
    fn malformed_tool_input_coerced_to_object() {
        let request = request_with(vec![Message::blocks(
            Role::Assistant,
            vec![
                ContentBlock::Thinking {
                    thinking: "planning".to_owned(),
                    signature: Some("sig".to_owned()),
                },
                ContentBlock::ToolUse {
                    id: "tu_1".to_owned(),
                    name: "read".to_owned(),
                    input: json!("{\"path\": \"a.txt\"}"),
                },
            ],
        )]);

        let wire = build_request(&request);
        let AnthropicContent::Blocks(blocks) = &wire.messages[0].content else {
            panic!("expected block content");
        };
        assert!(matches!(
            &blocks[1],
            AnthropicContentBlock::ToolUse { input, .. } if *input == json!({"path": "a.txt"})
        ));
    }

    #[test]
    fn thinking_budget_forces_temperature_and_max_tokens() {
        let mut request = request_with(vec![Message::text(Role::User, "hi")]);
        request.temperature = Some(0.2);
        request.max_tokens = Some(1024);
        request.thinking_budget = Some(2048);

        let wire = build_request(&request);
        assert_eq!(wire.temperature, Some(1.0));
        assert_eq!(wire.max_tokens, 2048 + THINKING_MAX_TOKENS_MARGIN);
        assert_eq!(wire.thinking.as_ref().unwrap().budget_tokens, 2048);
    }

    #[test]
    fn ample_max_tokens_not_bumped() {
        let mut request = request_with(vec![Message::text(Role::User, "hi")]);
        request.max_tokens = Some(16_000);
        request.thinking_budget = Some(2048);

        let wire = build_request(&request);
        assert_eq!(wire.max_tokens, 16_000);
    }

    #[test]
    fn incompatible_history_disables_thinking() {
        let mut request = request_with(vec![
            Message::blocks(
                Role::Assistant,
                vec![ContentBlock::ToolUse {
                    id: "tu_1".to_owned(),
                    name: "read".to_owned(),
                    input: json!({}),
                }],
            ),
            Message::blocks(
                Role::Tool,
                vec![ContentBlock::ToolResult {
                    tool_use_id: "tu_1".to_owned(),
                    content: "ok".to_owned(),
                }],
            ),
        ]);
        request.temperature = Some(0.5);
        request.thinking_budget = Some(2048);

        let wire = build_request(&request);
        assert!(wire.thinking.is_none());
        // With thinking disabled the caller's temperature stands
        assert_eq!(wire.temperature, Some(0.5));
    }

    #[test]
    fn tools_and_forced_choice_forwarded() {
        let mut request = request_with(vec![Message::text(Role::User, "hi")]);
        request.tools = Some(vec![ToolDefinition {
            name: "read".to_owned(),
            description: Some("Read a file".to_owned()),
            parameters: json!({"type": "object", "properties": {"path": {"type": "string"}}}),
        }]);
        request.tool_choice = Some(ToolChoice::Tool { name: "read".to_owned() });

        let wire = build_request(&request);
        assert_eq!(wire.tools.as_ref().unwrap().len(), 1);
        let choice = wire.tool_choice.unwrap();
        assert_eq!(choice.choice_type, "tool");
        assert_eq!(choice.name.as_deref(), Some("read"));
    }

    #[test]
    fn response_blocks_map_straight_through() {
        let response = AnthropicResponse {
            id: "msg_1".to_owned(),
            response_type: "message".to_owned(),
            role: "assistant".to_owned(),
            content: vec![
                AnthropicResponseBlock::Thinking {
                    thinking: "hmm".to_owned(),
                    signature: Some("sig".to_owned()),
                },
                AnthropicResponseBlock::Text {
                    text: "hello".to_owned(),
                },
            ],
            model: "claude-sonnet-4-20250514".to_owned(),
            stop_reason: Some("end_turn".to_owned()),
            usage: AnthropicUsage {
                input_tokens: 10,
                output_tokens: 5,
            },
        };

        let canonical: CompletionResponse = response.into();
        assert_eq!(canonical.text(), "hello");
        assert_eq!(canonical.stop_reason, Some(FinishReason::Stop));
        assert_eq!(canonical.usage.unwrap().completion_tokens, 5);
    }

    fn drive(state: &mut AnthropicStreamState, events: Vec<AnthropicStreamEvent>) -> Vec<StreamEvent> {
        events
            .into_iter()
            .flat_map(|event| state.convert_event(event))
            .map(Result::unwrap)
            .collect()
    }

    #[test]
    fn stream_grammar_suppresses_bookkeeping_events() {
        let mut state = AnthropicStreamState::new();
        let events = drive(
            &mut state,
            vec![
                AnthropicStreamEvent::MessageStart {
                    message: AnthropicStreamMessage {
                        id: "msg_1".to_owned(),
                        model: "claude-sonnet-4-20250514".to_owned(),
                        usage: Some(AnthropicUsage {
                            input_tokens: 12,
                            output_tokens: 0,
                        }),
                    },
                },
                AnthropicStreamEvent::Ping,
                AnthropicStreamEvent::ContentBlockStart {
                    index: 0,
                    content_block: AnthropicStreamContentBlock::Thinking {
                        thinking: String::new(),
                    },
                },
                AnthropicStreamEvent::ContentBlockDelta {
                    index: 0,
                    delta: AnthropicStreamDelta::ThinkingDelta {
                        thinking: "let me think".to_owned(),
                    },
                },
                AnthropicStreamEvent::ContentBlockDelta {
                    index: 0,
                    delta: AnthropicStreamDelta::SignatureDelta {
                        signature: "opaque".to_owned(),
                    },
                },
                AnthropicStreamEvent::ContentBlockStop { index: 0 },
                AnthropicStreamEvent::ContentBlockStart {
                    index: 1,
                    content_block: AnthropicStreamContentBlock::Text { text: String::new() },
                },
                AnthropicStreamEvent::ContentBlockDelta {
                    index: 1,
                    delta: AnthropicStreamDelta::TextDelta { text: "hi".to_owned() },
                },
                AnthropicStreamEvent::ContentBlockStop { index: 1 },
                AnthropicStreamEvent::MessageDelta {
                    delta: AnthropicMessageDelta {
                        stop_reason: Some("end_turn".to_owned()),
                    },
                    usage: Some(AnthropicUsage {
                        input_tokens: 0,
                        output_tokens: 7,
                    }),
                },
                AnthropicStreamEvent::MessageStop,
            ],
        );

        assert!(matches!(&events[0], StreamEvent::ThinkingDelta { text } if text == "let me think"));
        assert!(matches!(&events[1], StreamEvent::ContentDelta { text } if text == "hi"));
        assert!(matches!(
            &events[2],
            StreamEvent::Usage(usage) if usage.prompt_tokens == 12 && usage.completion_tokens == 7
        ));
        assert!(matches!(
            &events[3],
            StreamEvent::Done {
                finish_reason: Some(FinishReason::Stop)
            }
        ));
        assert_eq!(events.len(), 4);
    }

    #[test]
    fn streamed_tool_call_completes_at_stream_end() {
        let mut state = AnthropicStreamState::new();
        let events = drive(
            &mut state,
            vec![
                AnthropicStreamEvent::ContentBlockStart {
                    index: 1,
                    content_block: AnthropicStreamContentBlock::ToolUse {
                        id: "tu_1".to_owned(),
                        name: "read".to_owned(),
                        input: json!({}),
                    },
                },
                AnthropicStreamEvent::ContentBlockDelta {
                    index: 1,
                    delta: AnthropicStreamDelta::InputJsonDelta {
                        partial_json: "{\"path\":".to_owned(),
                    },
                },
                AnthropicStreamEvent::ContentBlockDelta {
                    index: 1,
                    delta: AnthropicStreamDelta::InputJsonDelta {
                        partial_json: " \"a.txt\"}".to_owned(),
                    },
                },
                AnthropicStreamEvent::ContentBlockStop { index: 1 },
                AnthropicStreamEvent::MessageDelta {
                    delta: AnthropicMessageDelta {
                        stop_reason: Some("tool_use".to_owned()),
                    },
                    usage: None,
                },
                AnthropicStreamEvent::MessageStop,
            ],
        );

        assert!(matches!(&events[0], StreamEvent::ToolCallStart { id, name } if id == "tu_1" && name == "read"));
        assert!(matches!(&events[1], StreamEvent::ToolCallDelta { id, .. } if id == "tu_1"));

        let complete: Vec<_> = events
            .iter()
            .filter(|event| matches!(event, StreamEvent::ToolCallComplete { .. }))
            .collect();
        assert_eq!(complete.len(), 1);
        assert!(matches!(
            complete[0],
            StreamEvent::ToolCallComplete { id, arguments, .. }
                if id == "tu_1" && *arguments == json!({"path": "a.txt"})
        ));
        assert!(matches!(
            events.last().unwrap(),
            StreamEvent::Done {
                finish_reason: Some(FinishReason::ToolUse)
            }
        ));
    }

    #[test]
    fn stream_error_event_surfaces_as_error() {
        let mut state = AnthropicStreamState::new();
        let converted = state.convert_event(AnthropicStreamEvent::Error {
            error: crate::protocol::anthropic::AnthropicErrorDetail {
                error_type: "overloaded_error".to_owned(),
                message: "overloaded".to_owned(),
            },
        });
        assert_eq!(converted.len(), 1);
        assert!(matches!(&converted[0], Err(GatewayError::Streaming(_))));
    }
}
