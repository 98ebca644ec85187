//! LLM Client module for Tripline
//!
//! Provides the [`LlmClient`] adapter trait, the Gemini implementation and a
//! concurrency-limiting decorator.

use std::sync::Arc;

use tracing::debug;

pub mod client;
mod error;
mod gemini;
mod limited;
mod types;

pub use client::LlmClient;
pub use error::{ErrorKind, LlmError};
pub use gemini::GeminiClient;
pub use limited::LimitedClient;
pub use types::{DEFAULT_MAX_OUTPUT_TOKENS, DEFAULT_TEMPERATURE, GenerationOptions};

use crate::config::ResolvedLlmConfig;

/// Create an LLM client based on the provider specified in config
///
/// When `max_api_calls` is non-zero the client is wrapped in a
/// [`LimitedClient`] shared by every run that uses it.
pub fn create_client(config: &ResolvedLlmConfig, max_api_calls: usize) -> Result<Arc<dyn LlmClient>, LlmError> {
    debug!(provider = %config.provider, model = %config.model, max_api_calls, "create_client: called");
    let client: Arc<dyn LlmClient> = match config.provider.as_str() {
        "gemini" => {
            debug!("create_client: creating Gemini client");
            Arc::new(GeminiClient::from_config(config)?)
        }
        other => {
            debug!(provider = %other, "create_client: unknown provider");
            return Err(LlmError::Fatal(format!(
                "Unknown LLM provider: '{}'. Supported: gemini",
                other
            )));
        }
    };

    if max_api_calls == 0 {
        debug!("create_client: no concurrency limit");
        return Ok(client);
    }
    Ok(Arc::new(LimitedClient::new(client, max_api_calls)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolved(provider: &str) -> ResolvedLlmConfig {
        ResolvedLlmConfig {
            provider: provider.to_string(),
            model: "gemini-2.0-flash-lite".to_string(),
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            api_key: "key".to_string(),
            timeout_ms: 1000,
        }
    }

    #[test]
    fn test_create_client_gemini() {
        let client = create_client(&resolved("gemini"), 4).unwrap();
        assert_eq!(client.model(), "gemini-2.0-flash-lite");
    }

    #[test]
    fn test_create_client_unknown_provider() {
        let err = create_client(&resolved("openai"), 0).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Fatal);
        assert!(err.to_string().contains("openai"));
    }
}
