//! Error types for the assay domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all assay operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Executor errors ---
    #[error("Executor error: {0}")]
    Executor(#[from] ExecutorError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Provider returned an empty response: {0}")]
    EmptyResponse(String),
}

/// How the controller should react to a failed model call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Shrink the context and retry once.
    Recoverable,
    /// Propagate to the caller.
    Fatal,
}

/// Why a retried model call still failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// API key, endpoint, or authentication problem.
    Misconfigured,
    /// The conversation no longer fits the model's context window.
    ContextOverflow,
}

/// Substrings that mark a provider failure as recoverable by shrinking context.
const RECOVERABLE_MARKERS: &[&str] = &[
    "null value for choices",
    "context",
    "token",
    "content filter",
    "content_filter",
    "rate limit",
    "rate_limit",
];

impl ProviderError {
    /// Classify by variant and message content.
    pub fn disposition(&self) -> Disposition {
        match self {
            Self::RateLimited { .. } | Self::EmptyResponse(_) => Disposition::Recoverable,
            Self::AuthenticationFailed(_) | Self::NotConfigured(_) => Disposition::Fatal,
            other => {
                let text = other.to_string().to_lowercase();
                if RECOVERABLE_MARKERS.iter().any(|m| text.contains(m)) {
                    Disposition::Recoverable
                } else {
                    Disposition::Fatal
                }
            }
        }
    }

    /// Classify a failure that survived the truncate-and-retry path.
    pub fn failure_class(&self) -> FailureClass {
        match self {
            Self::AuthenticationFailed(_) | Self::NotConfigured(_) => FailureClass::Misconfigured,
            other => {
                let text = other.to_string().to_lowercase();
                if text.contains("api key") || text.contains("endpoint") {
                    FailureClass::Misconfigured
                } else {
                    FailureClass::ContextOverflow
                }
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("Failed to start interpreter '{program}': {reason}")]
    Spawn { program: String, reason: String },

    #[error("I/O error while talking to '{program}': {reason}")]
    Io { program: String, reason: String },

    #[error("Execution task aborted: {0}")]
    Aborted(String),
}
