//! LLM client module
//!
//! Provides the completion client abstraction, the OpenAI-compatible
//! implementation and the prompt context that workflow nodes share.

use std::sync::Arc;

use tracing::debug;

pub mod client;
mod error;
mod openai;
mod prompt;
mod types;

pub use client::LlmClient;
pub use error::LlmError;
pub use openai::OpenAIClient;
pub use prompt::PromptContext;
pub use types::{CompletionRequest, CompletionResponse, Message, Role, StopReason, TokenUsage};

use crate::config::{LlmConfig, ResolvedLlmConfig};

/// Credentials handed to the engine at initialization
///
/// An explicit key wins over the environment variable named in config.
#[derive(Clone, Default)]
pub struct Credentials {
    pub api_key: Option<String>,
}

impl Credentials {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
        }
    }

    /// No explicit key; fall back to the configured environment variable
    pub fn from_env() -> Self {
        Self::default()
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Create an LLM client based on the provider specified in config
pub fn create_client(config: &LlmConfig, credentials: &Credentials) -> Result<Arc<dyn LlmClient>, LlmError> {
    let resolved = config.resolve()?;
    create_client_from_resolved(&resolved, credentials)
}

/// Create an LLM client from a resolved configuration
pub fn create_client_from_resolved(
    config: &ResolvedLlmConfig,
    credentials: &Credentials,
) -> Result<Arc<dyn LlmClient>, LlmError> {
    debug!(provider = %config.provider, model = %config.model, "create_client_from_resolved: called");
    match config.provider.as_str() {
        "openai" | "ollama" | "google" => {
            let api_key = config.get_api_key(credentials)?;
            Ok(Arc::new(OpenAIClient::from_config(config, api_key)?))
        }
        other => {
            debug!(provider = %other, "create_client_from_resolved: unknown provider");
            Err(LlmError::UnknownProvider(other.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_client_with_explicit_key() {
        let config = LlmConfig {
            provider: "openai".to_string(),
            ..Default::default()
        };
        assert!(create_client(&config, &Credentials::new("sk-test")).is_ok());
    }

    #[test]
    fn test_create_client_ollama_needs_no_key() {
        let config = LlmConfig {
            provider: "ollama".to_string(),
            ..Default::default()
        };
        assert!(create_client(&config, &Credentials::from_env()).is_ok());
    }

    #[test]
    fn test_create_client_unknown_provider() {
        let config = LlmConfig {
            provider: "bedrock".to_string(),
            ..Default::default()
        };
        let err = create_client(&config, &Credentials::new("k")).err().unwrap();
        assert!(matches!(err, LlmError::UnknownProvider(_)));
    }

    #[test]
    fn test_credentials_debug_redacts_key() {
        let rendered = format!("{:?}", Credentials::new("secret-value"));
        assert!(!rendered.contains("secret-value"));
    }
}
