//! Canonical request, response, and stream event types
//!
//! These are the only shapes callers ever see, regardless of which vendor
//! serves the request.

mod message;
mod request;
mod response;
mod stream;
mod tool;

pub use message::{Content, ContentBlock, Message, Role};
pub use request::CompletionRequest;
pub use response::{CompletionResponse, FinishReason, Usage};
pub use stream::{EventStream, StreamEvent};
pub use tool::{ToolChoice, ToolDefinition};
