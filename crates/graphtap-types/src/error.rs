//! Structured extraction error model.
//!
//! [`ExtractError`] carries classification, retry metadata, and the
//! originating stream and context so every fatal error is attributable.
//! Construct via category-specific factory methods.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Broad classification of an extraction error.
///
/// Determines retry behavior and operator-facing categorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Upstream rejected the request (HTTP 4xx). Fatal for the context.
    Client,
    /// Upstream failure (HTTP 5xx). Retryable.
    Server,
    /// Transport-level failure (timeout, connection). Retryable.
    Transport,
    /// Rate limit exceeded. Retryable with slow backoff.
    RateLimit,
    /// Stream misconfiguration detected before any request.
    Config,
    /// Persisted state could not be used.
    State,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Client => "client",
            Self::Server => "server",
            Self::Transport => "transport",
            Self::RateLimit => "rate_limit",
            Self::Config => "config",
            Self::State => "state",
        };
        f.write_str(s)
    }
}

/// Retry backoff strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffClass {
    /// Second-scale retry.
    Normal,
    /// Minute-scale retry.
    Slow,
}

/// Structured error from an extraction operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("[{category}] stream '{stream}': {message}")]
pub struct ExtractError {
    pub category: ErrorCategory,
    /// Stream the error originated in.
    pub stream: String,
    /// Context the stream was being extracted for, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    /// Upstream HTTP status, when the error came from a response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    pub message: String,
    pub retryable: bool,
    pub backoff_class: BackoffClass,
    /// Upstream retry hint, when provided.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
}

impl ExtractError {
    fn new(
        category: ErrorCategory,
        retryable: bool,
        backoff_class: BackoffClass,
        stream: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            category,
            stream: stream.into(),
            context: None,
            status: None,
            message: message.into(),
            retryable,
            backoff_class,
            retry_after_ms: None,
        }
    }

    /// Client error (4xx): fatal for the current context.
    #[must_use]
    pub fn client(stream: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        let mut err = Self::new(
            ErrorCategory::Client,
            false,
            BackoffClass::Normal,
            stream,
            message,
        );
        err.status = Some(status);
        err
    }

    /// Server error (5xx): retryable.
    #[must_use]
    pub fn server(stream: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        let mut err = Self::new(
            ErrorCategory::Server,
            true,
            BackoffClass::Normal,
            stream,
            message,
        );
        err.status = Some(status);
        err
    }

    /// Transport failure (timeout, connection reset): retryable.
    #[must_use]
    pub fn transport(stream: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(
            ErrorCategory::Transport,
            true,
            BackoffClass::Normal,
            stream,
            message,
        )
    }

    /// Rate limit: retryable with slow backoff, honoring any upstream hint.
    #[must_use]
    pub fn rate_limit(
        stream: impl Into<String>,
        message: impl Into<String>,
        retry_after_ms: Option<u64>,
    ) -> Self {
        let mut err = Self::new(
            ErrorCategory::RateLimit,
            true,
            BackoffClass::Slow,
            stream,
            message,
        );
        err.status = Some(429);
        err.retry_after_ms = retry_after_ms;
        err
    }

    /// Misconfiguration detected before any request. Fatal for the stream.
    #[must_use]
    pub fn config(stream: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(
            ErrorCategory::Config,
            false,
            BackoffClass::Normal,
            stream,
            message,
        )
    }

    /// Unusable persisted state. Callers degrade to the fallback window;
    /// this variant exists for state that cannot even be loaded.
    #[must_use]
    pub fn state(stream: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(
            ErrorCategory::State,
            false,
            BackoffClass::Normal,
            stream,
            message,
        )
    }

    /// Attach the context the error occurred under.
    #[must_use]
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Promote a retryable error to fatal after retries are exhausted.
    #[must_use]
    pub fn into_fatal(mut self) -> Self {
        self.retryable = false;
        self
    }
}
