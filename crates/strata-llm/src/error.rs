use thiserror::Error;

/// Errors surfaced by the completion gateway
///
/// Every variant carries the original vendor message for diagnostics.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Vendor is throttling requests; bounded retries apply
    #[error("throttled by provider: {0}")]
    Throttled(String),

    /// Malformed request or tool schema; surfaced immediately
    #[error("invalid request: {0}")]
    Validation(String),

    /// Credentials rejected; provider is marked unhealthy
    #[error("authentication failed: {0}")]
    Auth(String),

    /// No configured provider serves the requested model
    #[error("no provider serves model: {model}")]
    NoProviderForModel {
        /// The model that could not be routed
        model: String,
    },

    /// Network or connection failure; retried the same as throttling
    #[error("provider unavailable: {0}")]
    Unavailable(String),

    /// Error after the stream started; not retryable
    #[error("streaming error: {0}")]
    Streaming(String),

    /// Unexpected internal error
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl GatewayError {
    /// Whether the retry engine may attempt this call again
    ///
    /// Only throttling and transport failures qualify; everything else
    /// cannot succeed on retry and propagates on first occurrence.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Throttled(_) | Self::Unavailable(_))
    }

    /// Classify an HTTP error response from a vendor
    ///
    /// Throttling detection is heuristic: a 429 status or known message
    /// substrings, whichever hits first.
    pub fn from_http_status(status: u16, message: String) -> Self {
        if status == 429 || looks_like_throttling(&message) {
            return Self::Throttled(message);
        }
        match status {
            401 | 403 => Self::Auth(message),
            400 | 404 | 413 | 422 => Self::Validation(message),
            500..=599 => Self::Unavailable(message),
            _ => Self::Unavailable(format!("unexpected status {status}: {message}")),
        }
    }
}

/// Heuristic throttling match on a vendor error message
pub fn looks_like_throttling(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("too many requests") || lower.contains("rate exceeded") || lower.contains("throttl")
}
