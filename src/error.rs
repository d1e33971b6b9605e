//! Aisle error types

use std::time::Duration;

/// Aisle error types
#[derive(Debug, thiserror::Error)]
pub enum AisleError {
    // Classifier/network errors
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("classifier timed out after {0:?}")]
    Timeout(Duration),

    #[error("malformed classifier response: {0}")]
    MalformedResponse(String),

    #[error("empty response from classifier")]
    EmptyResponse,

    // Data errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("unknown category: {0}")]
    InvalidCategory(String),

    #[error("unknown language: {0}")]
    InvalidLanguage(String),

    // Store errors
    /// Insert or update against the shared store failed. The local index
    /// already holds the optimistic value.
    #[error("remote write failed for '{key}' in scope '{scope}': {reason}")]
    RemoteWriteFailed {
        scope: String,
        key: String,
        reason: String,
    },

    /// Subscribing to a scope failed. The cache keeps serving its local index.
    #[error("subscription to scope '{scope}' failed: {reason}")]
    ScopeSubscriptionFailed { scope: String, reason: String },

    #[error("no scope attached")]
    NoScope,

    #[error("cache entry not found: {0}")]
    EntryNotFound(String),

    #[error("store error: {0}")]
    Store(String),

    // Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),

    // Wrapped llm crate error
    #[error("LLM error: {0}")]
    Llm(String),
}

impl AisleError {
    /// Whether a classifier call failing with this error is worth retrying.
    ///
    /// Transport hiccups, rate limits, server-side 5xx and empty bodies are
    /// transient. Authentication, client errors and malformed payloads are
    /// permanent.
    pub fn is_transient(&self) -> bool {
        match self {
            AisleError::Http(_)
            | AisleError::RateLimited { .. }
            | AisleError::Timeout(_)
            | AisleError::EmptyResponse => true,
            AisleError::Api { status, .. } => *status >= 500 || *status == 408,
            AisleError::Llm(msg) => {
                let msg = msg.to_lowercase();
                msg.contains("timeout")
                    || msg.contains("timed out")
                    || msg.contains("connection")
                    || msg.contains("temporarily")
            }
            _ => false,
        }
    }

    /// Server-provided backoff hint, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            AisleError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

impl From<llm::error::LLMError> for AisleError {
    fn from(err: llm::error::LLMError) -> Self {
        // Map llm errors to our error types
        let msg = err.to_string();
        let lower = msg.to_lowercase();
        if lower.contains("rate limit") || lower.contains("429") {
            AisleError::RateLimited { retry_after: None }
        } else if lower.contains("authentication")
            || lower.contains("401")
            || lower.contains("invalid api key")
        {
            AisleError::AuthenticationFailed
        } else {
            AisleError::Llm(msg)
        }
    }
}

/// Result type alias for Aisle operations
pub type Result<T> = std::result::Result<T, AisleError>;
