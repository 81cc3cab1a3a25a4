//! AWS Bedrock provider implementation using the Converse API
//!
//! Bedrock hosts models from several vendors behind region-qualified
//! "inference profile" identifiers, so requests go through model-ID
//! resolution before anything is sent.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use aws_sdk_bedrockruntime::Client as BedrockClient;
use aws_sdk_bedrockruntime::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_bedrockruntime::types::{
    ContentBlock as BedrockBlock, ContentBlockDelta, ContentBlockStart, ConversationRole, ConverseOutput,
    ConverseStreamOutput as StreamChunk, InferenceConfiguration, Message as BedrockMessage, ReasoningContentBlock,
    ReasoningContentBlockDelta, ReasoningTextBlock, StopReason, SystemContentBlock, Tool, ToolChoice as BedrockToolChoice,
    ToolConfiguration, ToolInputSchema, ToolResultBlock, ToolResultContentBlock, ToolSpecification, ToolUseBlock,
};
use secrecy::ExposeSecret;
use serde_json::Value;
use strata_config::{BedrockConfig, LlmProviderConfig, LlmProviderType};

use super::{Provider, ProviderCapabilities, supports_reasoning};
use crate::accumulate::{ToolCallAccumulator, ToolCallFragment};
use crate::convert::{DEFAULT_MAX_TOKENS, THINKING_MAX_TOKENS_MARGIN, extract_system_prompt, history_supports_thinking};
use crate::error::{GatewayError, looks_like_throttling};
use crate::metrics::ProviderMetrics;
use crate::retry::{ModelAttempts, RetryPolicy};
use crate::sanitize::normalize_tool_input;
use crate::types::{
    CompletionRequest, CompletionResponse, Content, ContentBlock, EventStream, FinishReason, Message, Role,
    StreamEvent, Usage,
};

/// Default per-call network timeout
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Region prefixes Bedrock already understands; such IDs pass through untouched
const REGION_PREFIXES: &[&str] = &["us.", "eu.", "apac.", "global."];

/// Vendor prefixes for which a region-qualified profile can be synthesized
const VENDOR_PREFIXES: &[&str] = &["anthropic.", "amazon.", "meta.", "mistral.", "cohere.", "ai21."];

/// AWS Bedrock provider using the Converse API
pub struct BedrockProvider {
    name: String,
    client: BedrockClient,
    models: Vec<String>,
    fallback_model: Option<String>,
    region_prefix: Option<String>,
    inference_profiles: HashMap<String, String>,
    retry: RetryPolicy,
    metrics: Arc<ProviderMetrics>,
}

impl BedrockProvider {
    /// Create from provider configuration
    ///
    /// When the configuration pins no model catalog, one is discovered at
    /// startup from the Bedrock control plane; discovery failure leaves
    /// the catalog empty rather than failing initialization.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Internal` when handed a non-Bedrock config.
    pub async fn new(name: String, config: &LlmProviderConfig, retry: RetryPolicy) -> Result<Self, GatewayError> {
        let LlmProviderType::Bedrock(bedrock_config) = &config.provider_type else {
            return Err(GatewayError::Internal(anyhow::anyhow!("expected bedrock provider type")));
        };

        let timeout = config.timeout_secs.map_or(DEFAULT_TIMEOUT, Duration::from_secs);
        let sdk_config = load_sdk_config(bedrock_config, timeout).await;
        let client = BedrockClient::new(&sdk_config);

        let models = if config.models.is_empty() {
            match discover_models(&sdk_config).await {
                Ok(models) => {
                    tracing::debug!(provider = %name, count = models.len(), "discovered bedrock models");
                    models
                }
                Err(e) => {
                    tracing::warn!(provider = %name, error = %e, "bedrock model discovery failed; catalog empty");
                    Vec::new()
                }
            }
        } else {
            config.models.clone()
        };

        let metrics = Arc::new(ProviderMetrics::new(name.clone()));

        Ok(Self {
            name,
            client,
            models,
            fallback_model: config.fallback_model.clone(),
            region_prefix: bedrock_config.region_prefix.clone(),
            inference_profiles: bedrock_config.inference_profiles.clone(),
            retry,
            metrics,
        })
    }

    fn attempts_for(&self, model: &str) -> ModelAttempts {
        ModelAttempts::new(model, self.fallback_model.clone())
    }

    /// Resolve a model name to the concrete ID Bedrock expects
    fn resolve(&self, model: &str) -> String {
        resolve_model_id(model, self.region_prefix.as_deref(), &self.inference_profiles)
    }

    /// Thinking budget actually sent for one model attempt
    fn effective_thinking_budget(&self, request: &CompletionRequest, model_id: &str) -> Option<u32> {
        let budget = request.thinking_budget?;
        if !supports_reasoning(model_id) {
            tracing::debug!(model = model_id, "model lacks the reasoning capability; dropping thinking budget");
            return None;
        }
        if !history_supports_thinking(&request.messages) {
            tracing::warn!(
                model = model_id,
                "assistant turn lacks a leading thinking block; disabling extended thinking for this call"
            );
            return None;
        }
        Some(budget)
    }

    /// One non-streaming vendor attempt
    async fn converse_once(&self, request: &CompletionRequest, model_id: &str) -> Result<CompletionResponse, GatewayError> {
        let (system_blocks, messages) = build_converse_messages(request)?;
        let budget = self.effective_thinking_budget(request, model_id);

        let mut converse = self.client.converse().model_id(model_id);
        for block in system_blocks {
            converse = converse.system(block);
        }
        for message in messages {
            converse = converse.messages(message);
        }
        converse = converse.inference_config(build_inference_config(request, budget));
        if let Some(tool_config) = build_tool_config(request)? {
            converse = converse.tool_config(tool_config);
        }
        if let Some(budget) = budget {
            converse = converse.additional_model_request_fields(thinking_request_fields(budget));
        }

        let output = converse.send().await.map_err(|e| {
            let error = classify_sdk_error(&e);
            tracing::warn!(provider = %self.name, model = model_id, error = %error, "bedrock converse failed");
            error
        })?;

        let stop_reason = Some(map_stop_reason(output.stop_reason()));
        let content = match output.output() {
            Some(ConverseOutput::Message(message)) => extract_content(message),
            _ => Vec::new(),
        };
        let usage = output.usage().map(|u| Usage {
            prompt_tokens: u32::try_from(u.input_tokens()).unwrap_or_default(),
            completion_tokens: u32::try_from(u.output_tokens()).unwrap_or_default(),
        });

        Ok(CompletionResponse {
            id: format!("{}-{}", self.name, response_stamp()),
            model: model_id.to_owned(),
            content,
            stop_reason,
            usage,
        })
    }

    /// One streaming vendor attempt; returns the open event stream
    async fn start_stream(
        &self,
        request: &CompletionRequest,
        model_id: &str,
    ) -> Result<aws_sdk_bedrockruntime::operation::converse_stream::ConverseStreamOutput, GatewayError> {
        let (system_blocks, messages) = build_converse_messages(request)?;
        let budget = self.effective_thinking_budget(request, model_id);

        let mut converse = self.client.converse_stream().model_id(model_id);
        for block in system_blocks {
            converse = converse.system(block);
        }
        for message in messages {
            converse = converse.messages(message);
        }
        converse = converse.inference_config(build_inference_config(request, budget));
        if let Some(tool_config) = build_tool_config(request)? {
            converse = converse.tool_config(tool_config);
        }
        if let Some(budget) = budget {
            converse = converse.additional_model_request_fields(thinking_request_fields(budget));
        }

        converse.send().await.map_err(|e| {
            let error = classify_sdk_error(&e);
            tracing::warn!(provider = %self.name, model = model_id, error = %error, "bedrock converse_stream failed");
            error
        })
    }
}

#[async_trait]
impl Provider for BedrockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            streaming: true,
            tool_calling: true,
            reasoning: true,
        }
    }

    fn models(&self) -> Vec<String> {
        self.models.clone()
    }

    fn metrics(&self) -> Arc<ProviderMetrics> {
        Arc::clone(&self.metrics)
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, GatewayError> {
        let attempts = self.attempts_for(&request.model);

        let response = self
            .retry
            .run(&attempts, |model, _attempt| {
                let model_id = self.resolve(&model);
                async move {
                    let start = Instant::now();
                    let result = self.converse_once(request, &model_id).await;
                    match &result {
                        Ok(_) => self.metrics.record_success(start.elapsed()),
                        Err(error) => self.metrics.record_failure(error),
                    }
                    result
                }
            })
            .await?;

        if let Some(usage) = &response.usage {
            self.metrics.record_usage(usage);
        }
        Ok(response)
    }

    async fn complete_stream(&self, request: &CompletionRequest) -> Result<EventStream, GatewayError> {
        let attempts = self.attempts_for(&request.model);

        let output = self
            .retry
            .run(&attempts, |model, _attempt| {
                let model_id = self.resolve(&model);
                async move {
                    let start = Instant::now();
                    let result = self.start_stream(request, &model_id).await;
                    match &result {
                        Ok(_) => self.metrics.record_success(start.elapsed()),
                        Err(error) => self.metrics.record_failure(error),
                    }
                    result
                }
            })
            .await?;

        let metrics = Arc::clone(&self.metrics);
        let receiver = output.stream;
        let state = BedrockStreamState::default();
        let pending: VecDeque<Result<StreamEvent, GatewayError>> = VecDeque::new();

        // Single producer pulled by the caller; dropping the stream drops
        // the receiver and aborts the vendor connection.
        let events = futures_util::stream::unfold(
            (receiver, state, pending, false),
            move |(mut receiver, mut state, mut pending, mut finished)| {
                let metrics = Arc::clone(&metrics);
                async move {
                    loop {
                        if let Some(event) = pending.pop_front() {
                            if let Ok(StreamEvent::Usage(usage)) = &event {
                                metrics.record_usage(usage);
                            }
                            return Some((event, (receiver, state, pending, finished)));
                        }
                        if finished {
                            return None;
                        }

                        match receiver.recv().await {
                            Ok(Some(chunk)) => pending.extend(state.convert_chunk(chunk)),
                            Ok(None) => {
                                finished = true;
                                for call in state.tools.finish() {
                                    pending.push_back(Ok(StreamEvent::ToolCallComplete {
                                        id: call.id,
                                        name: call.name,
                                        arguments: call.arguments,
                                    }));
                                }
                                pending.push_back(Ok(StreamEvent::Done {
                                    finish_reason: state.finish_reason.take(),
                                }));
                            }
                            Err(e) => {
                                finished = true;
                                pending.push_back(Err(GatewayError::Streaming(e.to_string())));
                            }
                        }
                    }
                }
            },
        );

        Ok(Box::pin(events))
    }
}

/// Per-call state for converting Bedrock stream chunks
#[derive(Debug, Default)]
struct BedrockStreamState {
    tools: ToolCallAccumulator,
    finish_reason: Option<FinishReason>,
}

impl BedrockStreamState {
    /// Convert one stream chunk into zero or more unified events
    fn convert_chunk(&mut self, chunk: StreamChunk) -> Vec<Result<StreamEvent, GatewayError>> {
        match chunk {
            StreamChunk::ContentBlockStart(start) => {
                let index = u32::try_from(start.content_block_index()).unwrap_or_default();
                match start.start() {
                    Some(ContentBlockStart::ToolUse(tool)) => {
                        let id = tool.tool_use_id().to_owned();
                        let name = tool.name().to_owned();
                        self.tools.push(ToolCallFragment {
                            index,
                            id: Some(id.clone()),
                            name: Some(name.clone()),
                            arguments: None,
                        });
                        vec![Ok(StreamEvent::ToolCallStart { id, name })]
                    }
                    _ => Vec::new(),
                }
            }

            StreamChunk::ContentBlockDelta(event) => {
                let index = u32::try_from(event.content_block_index()).unwrap_or_default();
                match event.delta() {
                    Some(ContentBlockDelta::Text(text)) => {
                        vec![Ok(StreamEvent::ContentDelta { text: text.clone() })]
                    }
                    Some(ContentBlockDelta::ToolUse(tool)) => {
                        let fragment = tool.input().to_owned();
                        let id = self.tools.id_for(index).unwrap_or_default().to_owned();
                        self.tools.push(ToolCallFragment {
                            index,
                            arguments: Some(fragment.clone()),
                            ..Default::default()
                        });
                        vec![Ok(StreamEvent::ToolCallDelta { id, fragment })]
                    }
                    Some(ContentBlockDelta::ReasoningContent(reasoning)) => match reasoning {
                        ReasoningContentBlockDelta::Text(text) => {
                            vec![Ok(StreamEvent::ThinkingDelta { text: text.clone() })]
                        }
                        // Signatures and redacted content are verification-only
                        _ => Vec::new(),
                    },
                    _ => Vec::new(),
                }
            }

            StreamChunk::MessageStop(stop) => {
                self.finish_reason = Some(map_stop_reason(stop.stop_reason()));
                Vec::new()
            }

            StreamChunk::Metadata(metadata) => metadata
                .usage()
                .map(|u| {
                    Ok(StreamEvent::Usage(Usage {
                        prompt_tokens: u32::try_from(u.input_tokens()).unwrap_or_default(),
                        completion_tokens: u32::try_from(u.output_tokens()).unwrap_or_default(),
                    }))
                })
                .into_iter()
                .collect(),

            _ => Vec::new(),
        }
    }
}

/// Build the AWS SDK configuration for a provider
async fn load_sdk_config(config: &BedrockConfig, timeout: Duration) -> aws_config::SdkConfig {
    let timeouts = aws_config::timeout::TimeoutConfig::builder()
        .operation_timeout(timeout)
        .build();

    let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(aws_config::Region::new(config.region.clone()))
        .timeout_config(timeouts);

    // Explicit credentials when configured, default chain otherwise
    if let (Some(access_key), Some(secret_key)) = (&config.access_key_id, &config.secret_access_key) {
        let credentials = aws_credential_types::Credentials::new(
            access_key.expose_secret(),
            secret_key.expose_secret(),
            None,
            None,
            "strata-config",
        );
        loader = loader.credentials_provider(credentials);
    }

    loader.load().await
}

/// Fetch the model catalog from the Bedrock control plane
async fn discover_models(sdk_config: &aws_config::SdkConfig) -> Result<Vec<String>, String> {
    let client = aws_sdk_bedrock::Client::new(sdk_config);
    let output = client
        .list_foundation_models()
        .send()
        .await
        .map_err(|e| format!("list foundation models failed: {e}"))?;

    Ok(output
        .model_summaries()
        .iter()
        .map(|summary| summary.model_id().to_owned())
        .collect())
}

/// Resolve a model name to a Bedrock model or inference profile ID
///
/// Order: an ID already carrying a known region prefix is used as-is;
/// then the explicit mapping table; then, for recognized vendor-name
/// prefixes, `<region_prefix>.<model>` is synthesized (logged, since it
/// is inferred rather than verified); anything else passes through.
fn resolve_model_id(model: &str, region_prefix: Option<&str>, profiles: &HashMap<String, String>) -> String {
    if REGION_PREFIXES.iter().any(|prefix| model.starts_with(prefix)) {
        return model.to_owned();
    }

    if let Some(profile) = profiles.get(model) {
        return profile.clone();
    }

    if let Some(prefix) = region_prefix
        && VENDOR_PREFIXES.iter().any(|vendor| model.starts_with(vendor))
    {
        let qualified = format!("{prefix}.{model}");
        tracing::info!(model, qualified = %qualified, "inferred region-qualified inference profile");
        return qualified;
    }

    model.to_owned()
}

/// Build Converse API system blocks and messages from a canonical request
///
/// Consecutive tool turns merge into one user turn; Bedrock rejects tool
/// results split across messages and empty message bodies.
fn build_converse_messages(
    request: &CompletionRequest,
) -> Result<(Vec<SystemContentBlock>, Vec<BedrockMessage>), GatewayError> {
    let mut system_blocks = Vec::new();
    if let Some(system) = extract_system_prompt(&request.messages) {
        system_blocks.push(SystemContentBlock::Text(system));
    }

    let mut messages: Vec<BedrockMessage> = Vec::new();
    let mut pending_results: Vec<BedrockBlock> = Vec::new();

    for message in &request.messages {
        if message.role == Role::Tool {
            pending_results.extend(tool_result_blocks(message)?);
            continue;
        }

        if !pending_results.is_empty() {
            messages.push(build_message(ConversationRole::User, std::mem::take(&mut pending_results))?);
        }

        match message.role {
            Role::System => {} // lifted into system_blocks
            Role::User => messages.push(build_message(ConversationRole::User, content_blocks(message)?)?),
            Role::Assistant => messages.push(build_message(ConversationRole::Assistant, content_blocks(message)?)?),
            Role::Tool => unreachable!("tool turns handled above"),
        }
    }

    if !pending_results.is_empty() {
        messages.push(build_message(ConversationRole::User, pending_results)?);
    }

    Ok((system_blocks, messages))
}

fn build_message(role: ConversationRole, blocks: Vec<BedrockBlock>) -> Result<BedrockMessage, GatewayError> {
    BedrockMessage::builder()
        .role(role)
        .set_content(Some(blocks))
        .build()
        .map_err(|e| GatewayError::Validation(format!("invalid message: {e}")))
}

fn tool_result_blocks(message: &Message) -> Result<Vec<BedrockBlock>, GatewayError> {
    let Content::Blocks(blocks) = &message.content else {
        return Ok(Vec::new());
    };

    blocks
        .iter()
        .filter_map(|block| match block {
            ContentBlock::ToolResult { tool_use_id, content } => Some(
                ToolResultBlock::builder()
                    .tool_use_id(tool_use_id)
                    .content(ToolResultContentBlock::Text(content.clone()))
                    .build()
                    .map(BedrockBlock::ToolResult)
                    .map_err(|e| GatewayError::Validation(format!("invalid tool result: {e}"))),
            ),
            _ => None,
        })
        .collect()
}

fn content_blocks(message: &Message) -> Result<Vec<BedrockBlock>, GatewayError> {
    let mut blocks = Vec::new();

    match &message.content {
        Content::Text(text) => {
            if !text.is_empty() {
                blocks.push(BedrockBlock::Text(text.clone()));
            }
        }
        Content::Blocks(parts) => {
            for part in parts {
                match part {
                    ContentBlock::Text { text } => blocks.push(BedrockBlock::Text(text.clone())),
                    ContentBlock::Thinking { thinking, signature } => {
                        let mut builder = ReasoningTextBlock::builder().text(thinking);
                        if let Some(signature) = signature {
                            builder = builder.signature(signature);
                        }
                        let block = builder
                            .build()
                            .map_err(|e| GatewayError::Validation(format!("invalid reasoning block: {e}")))?;
                        blocks.push(BedrockBlock::ReasoningContent(ReasoningContentBlock::ReasoningText(block)));
                    }
                    ContentBlock::ToolUse { id, name, input } => {
                        let document = value_to_document(&Value::Object(normalize_tool_input(input.clone())));
                        let block = ToolUseBlock::builder()
                            .tool_use_id(id)
                            .name(name)
                            .input(document)
                            .build()
                            .map_err(|e| GatewayError::Validation(format!("invalid tool use: {e}")))?;
                        blocks.push(BedrockBlock::ToolUse(block));
                    }
                    ContentBlock::ToolResult { tool_use_id, content } => {
                        let block = ToolResultBlock::builder()
                            .tool_use_id(tool_use_id)
                            .content(ToolResultContentBlock::Text(content.clone()))
                            .build()
                            .map_err(|e| GatewayError::Validation(format!("invalid tool result: {e}")))?;
                        blocks.push(BedrockBlock::ToolResult(block));
                    }
                }
            }
        }
    }

    // Bedrock rejects empty message bodies
    if blocks.is_empty() {
        blocks.push(BedrockBlock::Text(String::new()));
    }

    Ok(blocks)
}

/// Build inference configuration, applying the thinking constraints
fn build_inference_config(request: &CompletionRequest, thinking_budget: Option<u32>) -> InferenceConfiguration {
    let mut temperature = request.temperature;
    let mut max_tokens = request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS);

    if let Some(budget) = thinking_budget {
        temperature = Some(1.0);
        if max_tokens <= budget {
            max_tokens = budget + THINKING_MAX_TOKENS_MARGIN;
        }
    }

    let mut config = InferenceConfiguration::builder();
    if let Some(temperature) = temperature {
        #[allow(clippy::cast_possible_truncation)]
        {
            config = config.temperature(temperature as f32);
        }
    }
    config = config.max_tokens(i32::try_from(max_tokens).unwrap_or(i32::MAX));
    config.build()
}

/// Thinking budget rides the model-specific passthrough field
fn thinking_request_fields(budget: u32) -> aws_smithy_types::Document {
    value_to_document(&serde_json::json!({
        "thinking": { "type": "enabled", "budget_tokens": budget }
    }))
}

fn build_tool_config(request: &CompletionRequest) -> Result<Option<ToolConfiguration>, GatewayError> {
    let Some(tools) = request.tools.as_ref().filter(|tools| !tools.is_empty()) else {
        return Ok(None);
    };

    let mut config = ToolConfiguration::builder();
    for tool in tools {
        let schema = ToolInputSchema::Json(value_to_document(&tool.parameters));
        let mut spec = ToolSpecification::builder().name(&tool.name).input_schema(schema);
        if let Some(description) = &tool.description {
            spec = spec.description(description);
        }
        let spec = spec
            .build()
            .map_err(|e| GatewayError::Validation(format!("invalid tool '{}': {e}", tool.name)))?;
        config = config.tools(Tool::ToolSpec(spec));
    }

    if let Some(choice) = &request.tool_choice {
        let bedrock_choice = match choice {
            // Bedrock has no "none" mode; both map to auto
            crate::types::ToolChoice::Auto | crate::types::ToolChoice::None => {
                BedrockToolChoice::Auto(aws_sdk_bedrockruntime::types::AutoToolChoice::builder().build())
            }
            crate::types::ToolChoice::Any => {
                BedrockToolChoice::Any(aws_sdk_bedrockruntime::types::AnyToolChoice::builder().build())
            }
            crate::types::ToolChoice::Tool { name } => BedrockToolChoice::Tool(
                aws_sdk_bedrockruntime::types::SpecificToolChoice::builder()
                    .name(name)
                    .build()
                    .map_err(|e| GatewayError::Validation(format!("invalid tool choice: {e}")))?,
            ),
        };
        config = config.tool_choice(bedrock_choice);
    }

    config
        .build()
        .map(Some)
        .map_err(|e| GatewayError::Validation(format!("invalid tool configuration: {e}")))
}

/// Extract canonical content blocks from a Bedrock response message
fn extract_content(message: &BedrockMessage) -> Vec<ContentBlock> {
    let mut content = Vec::new();

    for block in message.content() {
        match block {
            BedrockBlock::Text(text) => content.push(ContentBlock::Text { text: text.clone() }),
            BedrockBlock::ReasoningContent(ReasoningContentBlock::ReasoningText(reasoning)) => {
                content.push(ContentBlock::Thinking {
                    thinking: reasoning.text().to_owned(),
                    signature: reasoning.signature().map(ToOwned::to_owned),
                });
            }
            BedrockBlock::ToolUse(tool) => content.push(ContentBlock::ToolUse {
                id: tool.tool_use_id().to_owned(),
                name: tool.name().to_owned(),
                input: document_to_value(tool.input()),
            }),
            _ => {}
        }
    }

    content
}

fn map_stop_reason(reason: &StopReason) -> FinishReason {
    match reason {
        StopReason::MaxTokens => FinishReason::Length,
        StopReason::ToolUse => FinishReason::ToolUse,
        StopReason::ContentFiltered | StopReason::GuardrailIntervened => FinishReason::ContentFilter,
        // EndTurn, StopSequence, and unknown variants all end the turn
        _ => FinishReason::Stop,
    }
}

/// Classify an SDK error into the gateway taxonomy
fn classify_sdk_error<E, R>(error: &SdkError<E, R>) -> GatewayError
where
    SdkError<E, R>: ProvideErrorMetadata + std::fmt::Display,
{
    let code = error.code().unwrap_or_default().to_owned();
    let message = error.message().map_or_else(|| error.to_string(), ToOwned::to_owned);

    match code.as_str() {
        "ThrottlingException" | "TooManyRequestsException" | "ServiceQuotaExceededException" => {
            GatewayError::Throttled(message)
        }
        "AccessDeniedException" | "UnrecognizedClientException" | "ExpiredTokenException" => {
            GatewayError::Auth(message)
        }
        "ValidationException" => GatewayError::Validation(message),
        _ if looks_like_throttling(&code) || looks_like_throttling(&message) => GatewayError::Throttled(message),
        // Dispatch failures, timeouts, and unrecognized service errors are
        // transport-shaped and retried under the same bound as throttling
        _ => GatewayError::Unavailable(message),
    }
}

/// Monotonic-enough stamp for synthetic response IDs
fn response_stamp() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

/// Convert a `serde_json::Value` to an AWS `Document`
fn value_to_document(value: &Value) -> aws_smithy_types::Document {
    use aws_smithy_types::{Document, Number};

    match value {
        Value::Null => Document::Null,
        Value::Bool(b) => Document::Bool(*b),
        Value::Number(n) => {
            if let Some(u) = n.as_u64() {
                Document::Number(Number::PosInt(u))
            } else if let Some(i) = n.as_i64() {
                Document::Number(Number::NegInt(i))
            } else {
                Document::Number(Number::Float(n.as_f64().unwrap_or(0.0)))
            }
        }
        Value::String(s) => Document::String(s.clone()),
        Value::Array(items) => Document::Array(items.iter().map(value_to_document).collect()),
        Value::Object(map) => Document::Object(
            map.iter()
                .map(|(key, value)| (key.clone(), value_to_document(value)))
                .collect(),
        ),
    }
}

/// Convert an AWS `Document` to a `serde_json::Value`
fn document_to_value(document: &aws_smithy_types::Document) -> Value {
    use aws_smithy_types::{Document, Number};

    match document {
        Document::Null => Value::Null,
        Document::Bool(b) => Value::Bool(*b),
        Document::Number(Number::PosInt(u)) => Value::Number((*u).into()),
        Document::Number(Number::NegInt(i)) => Value::Number((*i).into()),
        Document::Number(Number::Float(f)) => serde_json::Number::from_f64(*f).map_or(Value::Null, Value::Number),
        Document::String(s) => Value::String(s.clone()),
        Document::Array(items) => Value::Array(items.iter().map(document_to_value).collect()),
        Document::Object(map) => {
            let mut object = serde_json::Map::new();
            for (key, value) in map {
                object.insert(key.clone(), document_to_value(value));
            }
            Value::Object(object)
        }
    }
}
