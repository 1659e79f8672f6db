//! Error types for the GitHub metrics gateway.

use std::time::Duration;
use thiserror::Error;

/// Additional context from GitHub errors for debugging.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    /// HTTP status code returned by GitHub.
    pub http_status: Option<u16>,
    /// GraphQL error type (e.g. "NOT_FOUND", "RATE_LIMITED").
    pub error_type: Option<String>,
    /// Request ID from GitHub (x-github-request-id header).
    pub request_id: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        self
    }

    pub fn with_error_type(mut self, error_type: impl Into<String>) -> Self {
        self.error_type = Some(error_type.into());
        self
    }

    pub fn with_request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }
}

/// Errors that can occur while fetching metrics for one repository.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Repository does not exist or is not visible with the current credentials.
    #[error("repository {repo} not found")]
    NotFound {
        repo: String,
        context: Option<ErrorContext>,
    },

    /// Rate limited - caller should retry after the specified duration.
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited {
        retry_after: Duration,
        context: Option<ErrorContext>,
    },

    /// Token rejected by GitHub - permanent error.
    #[error("unauthorized: {message}")]
    Unauthorized {
        message: String,
        context: Option<ErrorContext>,
    },

    /// GitHub API error - may be retryable.
    #[error("github api error: {message}")]
    Api {
        message: String,
        retryable: bool,
        context: Option<ErrorContext>,
    },

    /// Response body could not be interpreted.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Request timed out - retryable.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    /// HTTP/network error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Configuration error (bad token format, client construction, etc.).
    #[error("configuration error: {0}")]
    Config(String),
}

impl FetchError {
    /// Create a not-found error.
    pub fn not_found(repo: impl Into<String>, context: Option<ErrorContext>) -> Self {
        Self::NotFound {
            repo: repo.into(),
            context,
        }
    }

    /// Create a rate limited error.
    pub fn rate_limited(retry_after: Duration, context: ErrorContext) -> Self {
        Self::RateLimited {
            retry_after,
            context: Some(context),
        }
    }

    /// Create an unauthorized error.
    pub fn unauthorized(message: impl Into<String>, context: ErrorContext) -> Self {
        Self::Unauthorized {
            message: message.into(),
            context: Some(context),
        }
    }

    /// Create an API error.
    pub fn api(message: impl Into<String>, retryable: bool) -> Self {
        Self::Api {
            message: message.into(),
            retryable,
            context: None,
        }
    }

    /// Create an API error with context.
    pub fn api_with_context(
        message: impl Into<String>,
        retryable: bool,
        context: ErrorContext,
    ) -> Self {
        Self::Api {
            message: message.into(),
            retryable,
            context: Some(context),
        }
    }

    /// Create an invalid response error.
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse(message.into())
    }

    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Whether this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::NotFound { .. } => false,
            Self::RateLimited { .. } => true,
            Self::Unauthorized { .. } => false,
            Self::Api { retryable, .. } => *retryable,
            Self::InvalidResponse(_) => false,
            Self::Timeout(_) => true,
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            Self::Config(_) => false,
        }
    }

    /// Get a short error code for logging.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::RateLimited { .. } => "rate_limited",
            Self::Unauthorized { .. } => "unauthorized",
            Self::Api { .. } => "api_error",
            Self::InvalidResponse(_) => "invalid_response",
            Self::Timeout(_) => "timeout",
            Self::Http(e) if e.is_timeout() => "timeout",
            Self::Http(_) => "http_error",
            Self::Config(_) => "config_error",
        }
    }

    /// Get the error context if available.
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Self::NotFound { context, .. } => context.as_ref(),
            Self::RateLimited { context, .. } => context.as_ref(),
            Self::Unauthorized { context, .. } => context.as_ref(),
            Self::Api { context, .. } => context.as_ref(),
            Self::InvalidResponse(_) => None,
            Self::Timeout(_) => None,
            Self::Http(_) => None,
            Self::Config(_) => None,
        }
    }

    /// Get the request ID if available.
    pub fn request_id(&self) -> Option<&str> {
        self.context().and_then(|c| c.request_id.as_deref())
    }
}
