//! LLM completion gateway for Strata
//!
//! Accepts one vendor-neutral conversation/tool-call request and executes
//! it against incompatible model back ends (the Anthropic Messages API
//! and AWS Bedrock's Converse API), presenting callers with a single
//! unified streaming event grammar regardless of vendor. Covers request
//! normalization, the streaming state machines, retry/failover with
//! capped jittered backoff, tool-call delta reassembly, and pre-flight
//! history repair.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

pub mod accumulate;
pub mod convert;
pub mod error;
pub mod metrics;
pub mod protocol;
pub mod provider;
pub mod registry;
pub mod retry;
pub mod sanitize;
pub mod types;

pub use error::GatewayError;
pub use metrics::{MetricsSnapshot, ProviderMetrics};
pub use provider::{Provider, ProviderCapabilities};
pub use registry::{Completion, ProviderRegistry};
pub use retry::{ModelAttempts, RetryPolicy};
pub use types::{CompletionRequest, CompletionResponse, EventStream, StreamEvent};
