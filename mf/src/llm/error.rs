//! LLM error types

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during LLM operations
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("API error {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Missing API key: set the {env_var} environment variable or pass credentials explicitly")]
    MissingApiKey { env_var: String },

    #[error("Unknown LLM provider: '{0}'. Supported: openai, ollama, google")]
    UnknownProvider(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LlmError {
    /// Check if this is a rate limit error
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, LlmError::RateLimited { .. })
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::RateLimited { .. } => true,
            LlmError::ApiError { status, .. } => *status >= 500,
            LlmError::Network(_) => true,
            LlmError::Timeout(_) => true,
            LlmError::InvalidResponse(_)
            | LlmError::MissingApiKey { .. }
            | LlmError::UnknownProvider(_)
            | LlmError::Json(_) => false,
        }
    }

    /// Check if the error comes from configuration rather than the provider
    pub fn is_configuration(&self) -> bool {
        matches!(self, LlmError::MissingApiKey { .. } | LlmError::UnknownProvider(_))
    }
}
