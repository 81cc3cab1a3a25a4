use std::collections::HashMap;

use indexmap::IndexMap;
use secrecy::SecretString;
use serde::Deserialize;
use url::Url;

/// Top-level LLM gateway configuration
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LlmConfig {
    /// Model used when a caller falls back after a routing failure
    #[serde(default)]
    pub default_model: Option<String>,
    /// Retry and backoff tuning shared by all providers
    #[serde(default)]
    pub retry: RetryConfig,
    /// Extended thinking defaults
    #[serde(default)]
    pub reasoning: ReasoningConfig,
    /// Provider configurations keyed by name
    #[serde(default)]
    pub providers: IndexMap<String, LlmProviderConfig>,
}

/// Configuration for a single LLM provider
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LlmProviderConfig {
    /// Provider protocol type
    #[serde(rename = "type")]
    pub provider_type: LlmProviderType,
    /// API key for authentication
    #[serde(default)]
    pub api_key: Option<SecretString>,
    /// Base URL override
    #[serde(default)]
    pub base_url: Option<Url>,
    /// Models this provider serves; empty means discover at startup
    /// (or fall back to the provider's built-in catalog)
    #[serde(default)]
    pub models: Vec<String>,
    /// Secondary model tried after the primary exhausts its retries
    #[serde(default)]
    pub fallback_model: Option<String>,
    /// Per-call network timeout in seconds
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// Supported LLM provider protocols
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProviderType {
    /// Anthropic Messages API
    Anthropic,
    /// AWS Bedrock Converse API
    Bedrock(BedrockConfig),
}

/// AWS Bedrock-specific configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BedrockConfig {
    /// AWS region
    pub region: String,
    /// Region prefix used to synthesize inference profile IDs
    /// (e.g. "us" turns `anthropic.claude-…` into `us.anthropic.claude-…`)
    #[serde(default)]
    pub region_prefix: Option<String>,
    /// Explicit model ID -> inference profile ID mappings
    #[serde(default)]
    pub inference_profiles: HashMap<String, String>,
    /// Access key ID (optional, uses default credential chain if absent)
    #[serde(default)]
    pub access_key_id: Option<SecretString>,
    /// Secret access key
    #[serde(default)]
    pub secret_access_key: Option<SecretString>,
}

/// Retry and backoff tuning
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct RetryConfig {
    /// Retries per model after the initial attempt
    pub max_retries: u32,
    /// Base backoff delay in milliseconds, doubled per attempt
    pub base_delay_ms: u64,
    /// Backoff delay cap in milliseconds
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 500,
            max_delay_ms: 8000,
        }
    }
}

/// Extended thinking defaults applied when a request does not carry its own budget
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ReasoningConfig {
    /// Whether extended thinking is requested by default
    pub enabled: bool,
    /// Default thinking token budget
    pub budget_tokens: u32,
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            budget_tokens: 2048,
        }
    }
}
