//! Provider registry and request router
//!
//! Pure dispatch plus metrics aggregation: resolves the requested model
//! to the first provider advertising it, runs the history sanitizer, and
//! hands the request to that provider. Retry, failover, and translation
//! all live below this layer.

use std::sync::Arc;

use strata_config::{LlmConfig, LlmProviderType};

use crate::error::GatewayError;
use crate::metrics::MetricsSnapshot;
use crate::provider::Provider;
use crate::provider::anthropic::AnthropicProvider;
use crate::provider::bedrock::BedrockProvider;
use crate::retry::RetryPolicy;
use crate::sanitize::sanitize_history;
use crate::types::{CompletionRequest, CompletionResponse, EventStream};

/// Outcome of a completion call, shaped by `request.stream`
pub enum Completion {
    /// Non-streaming response
    Response(CompletionResponse),
    /// Unified event stream
    Stream(EventStream),
}

/// Registry of configured providers
#[derive(Default)]
pub struct ProviderRegistry {
    providers: Vec<Arc<dyn Provider>>,
    default_model: Option<String>,
    default_thinking_budget: Option<u32>,
}

impl ProviderRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from configuration, constructing all providers
    ///
    /// # Errors
    ///
    /// Returns an error if any provider fails to initialize.
    pub async fn from_config(config: &LlmConfig) -> Result<Self, GatewayError> {
        let retry = RetryPolicy::from_config(&config.retry);
        let mut registry = Self {
            providers: Vec::with_capacity(config.providers.len()),
            default_model: config.default_model.clone(),
            default_thinking_budget: config
                .reasoning
                .enabled
                .then_some(config.reasoning.budget_tokens),
        };

        for (name, provider_config) in &config.providers {
            let provider: Arc<dyn Provider> = match &provider_config.provider_type {
                LlmProviderType::Anthropic => {
                    Arc::new(AnthropicProvider::new(name.clone(), provider_config, retry.clone())?)
                }
                LlmProviderType::Bedrock(_) => {
                    Arc::new(BedrockProvider::new(name.clone(), provider_config, retry.clone()).await?)
                }
            };
            registry.register(provider);
        }

        Ok(registry)
    }

    /// Register a provider; earlier registrations win model-routing ties
    pub fn register(&mut self, provider: Arc<dyn Provider>) {
        tracing::info!(
            provider = provider.name(),
            models = provider.models().len(),
            "registered provider"
        );
        self.providers.push(provider);
    }

    /// Model callers should fall back to after a routing failure
    pub fn default_model(&self) -> Option<&str> {
        self.default_model.as_deref()
    }

    /// Look up a provider by name
    pub fn provider(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.iter().find(|p| p.name() == name).cloned()
    }

    /// Resolve the provider serving a model
    ///
    /// Membership test against each provider's advertised catalog; the
    /// first match wins.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::NoProviderForModel` when nothing serves the
    /// model; callers are expected to retry with the configured default.
    pub fn resolve_for_model(&self, model: &str) -> Result<Arc<dyn Provider>, GatewayError> {
        self.providers
            .iter()
            .find(|provider| provider.models().iter().any(|m| m == model))
            .cloned()
            .ok_or_else(|| GatewayError::NoProviderForModel { model: model.to_owned() })
    }

    /// Execute a completion against the provider serving the model
    ///
    /// Sanitizes the history, applies the configured thinking default,
    /// resolves the provider (or honors an explicit override), and
    /// dispatches as a stream or single response per `request.stream`.
    ///
    /// # Errors
    ///
    /// Returns routing errors immediately and provider errors after that
    /// provider's own retry/failover handling is exhausted.
    pub async fn create_completion(
        &self,
        mut request: CompletionRequest,
        provider_override: Option<&str>,
    ) -> Result<Completion, GatewayError> {
        sanitize_history(&mut request.messages);

        if request.thinking_budget.is_none() {
            request.thinking_budget = self.default_thinking_budget;
        }

        let provider = match provider_override {
            Some(name) => self.provider(name).ok_or_else(|| GatewayError::NoProviderForModel {
                model: format!("{name}/{}", request.model),
            })?,
            None => self.resolve_for_model(&request.model)?,
        };

        if request.stream {
            Ok(Completion::Stream(provider.complete_stream(&request).await?))
        } else {
            Ok(Completion::Response(provider.complete(&request).await?))
        }
    }

    /// Per-provider metrics snapshots
    pub fn metrics(&self) -> Vec<MetricsSnapshot> {
        self.providers.iter().map(|provider| provider.metrics().snapshot()).collect()
    }

    /// Merged metrics across all providers
    pub fn aggregate_metrics(&self) -> MetricsSnapshot {
        MetricsSnapshot::merge(&self.metrics())
    }

    /// Zero every provider's metrics (operator action)
    pub fn reset_metrics(&self) {
        for provider in &self.providers {
            provider.metrics().reset();
        }
    }
}
