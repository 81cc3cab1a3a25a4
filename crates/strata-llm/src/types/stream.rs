use std::pin::Pin;

use futures_util::Stream;
use serde::{Deserialize, Serialize};

use super::response::{FinishReason, Usage};
use crate::error::GatewayError;

/// Boxed stream of unified events as produced by a provider
///
/// A terminal `Err` item is the stream's error event; dropping the stream
/// aborts the underlying vendor connection.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, GatewayError>> + Send>>;

/// Unified streaming event
///
/// Every vendor's stream grammar is reduced to this sequence; events that
/// carry no meaning for callers (pings, signature deltas, block stops)
/// are suppressed before they get here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Incremental text content
    ContentDelta {
        /// Text fragment
        text: String,
    },
    /// Incremental extended thinking content
    ThinkingDelta {
        /// Thinking fragment
        text: String,
    },
    /// A tool call opened
    ToolCallStart {
        /// Tool use identifier
        id: String,
        /// Tool name
        name: String,
    },
    /// Partial tool call arguments
    ToolCallDelta {
        /// Tool use identifier
        id: String,
        /// Raw JSON fragment of the arguments
        fragment: String,
    },
    /// A tool call finished accumulating
    ToolCallComplete {
        /// Tool use identifier
        id: String,
        /// Tool name
        name: String,
        /// Parsed arguments; raw string when the fragments never formed valid JSON
        arguments: serde_json::Value,
    },
    /// Token usage for the call
    Usage(Usage),
    /// Stream has completed
    Done {
        /// Why generation stopped
        finish_reason: Option<FinishReason>,
    },
}
