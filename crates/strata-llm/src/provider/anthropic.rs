//! Anthropic Messages API provider implementation

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures_util::StreamExt;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use strata_config::LlmProviderConfig;
use url::Url;

use super::{Provider, ProviderCapabilities, supports_reasoning};
use crate::convert::anthropic::{AnthropicStreamState, build_request};
use crate::error::GatewayError;
use crate::metrics::ProviderMetrics;
use crate::protocol::anthropic::{AnthropicErrorResponse, AnthropicRequest, AnthropicResponse, AnthropicStreamEvent};
use crate::retry::{ModelAttempts, RetryPolicy};
use crate::types::{CompletionRequest, CompletionResponse, EventStream, StreamEvent};

/// Default Anthropic API base URL
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";

/// Anthropic API version header value
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Default per-call network timeout
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Catalog used when the configuration does not pin one
fn builtin_models() -> Vec<String> {
    [
        "claude-opus-4-20250514",
        "claude-sonnet-4-20250514",
        "claude-3-7-sonnet-20250219",
        "claude-3-5-sonnet-20241022",
        "claude-3-5-haiku-20241022",
    ]
    .map(str::to_owned)
    .to_vec()
}

/// Anthropic Messages API provider
pub struct AnthropicProvider {
    name: String,
    client: Client,
    base_url: Url,
    api_key: Option<SecretString>,
    models: Vec<String>,
    fallback_model: Option<String>,
    retry: RetryPolicy,
    metrics: Arc<ProviderMetrics>,
}

impl AnthropicProvider {
    /// Create from provider configuration
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Internal` if the HTTP client cannot be built.
    ///
    /// # Panics
    ///
    /// Panics if the hardcoded default base URL is invalid (never happens).
    pub fn new(name: String, config: &LlmProviderConfig, retry: RetryPolicy) -> Result<Self, GatewayError> {
        let timeout = config.timeout_secs.map_or(DEFAULT_TIMEOUT, Duration::from_secs);
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Internal(e.into()))?;

        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| Url::parse(DEFAULT_BASE_URL).expect("valid default URL"));

        let models = if config.models.is_empty() {
            builtin_models()
        } else {
            config.models.clone()
        };

        let metrics = Arc::new(ProviderMetrics::new(name.clone()));

        Ok(Self {
            name,
            client,
            base_url,
            api_key: config.api_key.clone(),
            models,
            fallback_model: config.fallback_model.clone(),
            retry,
            metrics,
        })
    }

    fn messages_url(&self) -> String {
        let base = self.base_url.as_str().trim_end_matches('/');
        format!("{base}/messages")
    }

    /// Build the wire request for one model attempt
    ///
    /// The thinking budget is silently dropped for models without the
    /// reasoning capability.
    fn wire_request(&self, request: &CompletionRequest, model: &str, stream: bool) -> AnthropicRequest {
        let mut attempt = request.clone();
        model.clone_into(&mut attempt.model);

        if attempt.thinking_budget.is_some() && !supports_reasoning(model) {
            tracing::debug!(model, "model lacks the reasoning capability; dropping thinking budget");
            attempt.thinking_budget = None;
        }

        let mut wire = build_request(&attempt);
        wire.stream = stream.then_some(true);
        wire
    }

    /// Perform one vendor attempt, recording metrics for it
    async fn send(&self, wire: &AnthropicRequest) -> Result<reqwest::Response, GatewayError> {
        let start = Instant::now();
        let result = self.send_inner(wire).await;
        match &result {
            Ok(_) => self.metrics.record_success(start.elapsed()),
            Err(error) => self.metrics.record_failure(error),
        }
        result
    }

    async fn send_inner(&self, wire: &AnthropicRequest) -> Result<reqwest::Response, GatewayError> {
        let mut builder = self
            .client
            .post(self.messages_url())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(wire);

        if let Some(key) = &self.api_key {
            builder = builder.header("x-api-key", key.expose_secret());
        }

        let response = builder.send().await.map_err(|e| {
            tracing::error!(provider = %self.name, error = %e, "upstream request failed");
            GatewayError::Unavailable(e.to_string())
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<AnthropicErrorResponse>(&body)
            .map_or(body, |parsed| format!("{}: {}", parsed.error.error_type, parsed.error.message));
        tracing::warn!(provider = %self.name, status = %status, message = %message, "upstream returned error");
        Err(GatewayError::from_http_status(status.as_u16(), message))
    }

    fn attempts_for(&self, model: &str) -> ModelAttempts {
        ModelAttempts::new(model, self.fallback_model.clone())
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
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
                let wire = self.wire_request(request, &model, false);
                async move { self.send(&wire).await }
            })
            .await?;

        let wire_response: AnthropicResponse = match response.json().await {
            Ok(parsed) => parsed,
            Err(e) => {
                let error = GatewayError::Unavailable(format!("failed to parse response: {e}"));
                self.metrics.record_failure(&error);
                return Err(error);
            }
        };

        let completion: CompletionResponse = wire_response.into();
        if let Some(usage) = &completion.usage {
            self.metrics.record_usage(usage);
        }
        Ok(completion)
    }

    async fn complete_stream(&self, request: &CompletionRequest) -> Result<EventStream, GatewayError> {
        let attempts = self.attempts_for(&request.model);

        // Failover is only possible before the first event; once the SSE
        // stream is open, errors propagate to the caller as terminal items.
        let response = self
            .retry
            .run(&attempts, |model, _attempt| {
                let wire = self.wire_request(request, &model, true);
                async move { self.send(&wire).await }
            })
            .await?;

        let mut state = AnthropicStreamState::new();
        let metrics = Arc::clone(&self.metrics);

        let events = response.bytes_stream().eventsource().flat_map(move |result| {
            let converted = match result {
                Ok(event) => {
                    let data = event.data.trim();
                    if data.is_empty() {
                        Vec::new()
                    } else {
                        match serde_json::from_str::<AnthropicStreamEvent>(data) {
                            Ok(stream_event) => state.convert_event(stream_event),
                            Err(e) => {
                                tracing::debug!(error = %e, "skipping unparseable SSE event");
                                Vec::new()
                            }
                        }
                    }
                }
                Err(e) => vec![Err(GatewayError::Streaming(e.to_string()))],
            };

            for event in &converted {
                if let Ok(StreamEvent::Usage(usage)) = event {
                    metrics.record_usage(usage);
                }
            }

            futures_util::stream::iter(converted)
        });

        Ok(Box::pin(events))
    }
}
