//! Nudge error types

use std::time::Duration;

/// Nudge error types
#[derive(Debug, thiserror::Error)]
pub enum NudgeError {
    // Provider/network errors
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("request timed out")]
    Timeout,

    #[error("authentication failed")]
    AuthenticationFailed,

    /// Error reported by a provider that has no typed equivalent.
    ///
    /// Retryability is decided from the message text.
    #[error("provider error: {0}")]
    Provider(String),

    // Streaming errors
    #[error("stream interrupted after {delivered} chunk(s): {message}")]
    StreamInterrupted { delivered: usize, message: String },

    // Data errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    // Orchestration errors
    #[error("no provider available")]
    NoProviderAvailable,

    #[error("cost limit exceeded: {0}")]
    CostLimitExceeded(String),

    #[error("queue cleared")]
    QueueCleared,

    /// The job's completion handle was dropped before it settled.
    #[error("queue shut down before the request settled")]
    QueueClosed,

    // Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("provider does not support this operation")]
    Unsupported,
}

impl NudgeError {
    /// Whether this error is worth retrying.
    ///
    /// Typed variants are classified directly. Untyped provider and HTTP
    /// errors fall back to a scan of the message for rate-limit, timeout,
    /// network and 5xx/429 signatures.
    pub fn is_transient(&self) -> bool {
        match self {
            NudgeError::RateLimited { .. } | NudgeError::Timeout => true,
            NudgeError::Api { status, .. } => *status == 429 || (500..600).contains(status),
            NudgeError::Http(msg) | NudgeError::Provider(msg) => looks_transient(msg),
            _ => false,
        }
    }

    /// Provider-supplied retry hint, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            NudgeError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for NudgeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            NudgeError::Timeout
        } else {
            NudgeError::Http(err.to_string())
        }
    }
}

const TRANSIENT_SIGNATURES: &[&str] = &[
    "rate limit",
    "rate_limit",
    "too many requests",
    "timeout",
    "timed out",
    "network",
    "connection",
    "econnreset",
    "overloaded",
    "temporarily unavailable",
    "429",
    "500",
    "502",
    "503",
    "504",
];

/// Scan an error message for signatures of a transient failure.
pub(crate) fn looks_transient(message: &str) -> bool {
    let lower = message.to_lowercase();
    TRANSIENT_SIGNATURES.iter().any(|sig| lower.contains(sig))
}

/// Result type alias for Nudge operations
pub type Result<T> = std::result::Result<T, NudgeError>;
