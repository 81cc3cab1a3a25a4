//! Provider trait and implementations for LLM back ends

pub mod anthropic;
pub mod bedrock;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::GatewayError;
use crate::metrics::ProviderMetrics;
use crate::types::{CompletionRequest, CompletionResponse, EventStream};

/// Capabilities advertised by a provider
#[derive(Debug, Clone, Copy)]
pub struct ProviderCapabilities {
    /// Whether the provider supports streaming responses
    pub streaming: bool,
    /// Whether the provider supports tool/function calling
    pub tool_calling: bool,
    /// Whether the provider can serve extended thinking requests
    pub reasoning: bool,
}

/// Trait implemented by each LLM provider back end
///
/// Deliberately narrow: each implementation is a self-contained struct
/// owning its client, quirks, and metrics; retry/failover is the shared
/// [`crate::retry::RetryPolicy`] engine rather than anything inherited.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Human-readable provider name
    fn name(&self) -> &str;

    /// Advertised capabilities
    fn capabilities(&self) -> ProviderCapabilities;

    /// Model catalog used by the registry for routing
    fn models(&self) -> Vec<String>;

    /// Shared call metrics, one instance for the provider's lifetime
    fn metrics(&self) -> Arc<ProviderMetrics>;

    /// Send a non-streaming completion request
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, GatewayError>;

    /// Send a streaming completion request
    async fn complete_stream(&self, request: &CompletionRequest) -> Result<EventStream, GatewayError>;
}

/// Model families that accept an extended thinking budget
const REASONING_MODEL_MARKERS: &[&str] = &["claude-3-7", "claude-opus-4", "claude-sonnet-4", "claude-haiku-4"];

/// Whether a model accepts an extended thinking budget
///
/// Matches on substrings so region- and vendor-qualified Bedrock IDs
/// (`us.anthropic.claude-sonnet-4-…`) resolve the same as native ones.
pub(crate) fn supports_reasoning(model: &str) -> bool {
    REASONING_MODEL_MARKERS.iter().any(|marker| model.contains(marker))
}
