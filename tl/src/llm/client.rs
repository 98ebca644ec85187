//! LlmClient trait definition

use async_trait::async_trait;

use super::{GenerationOptions, LlmError};

/// Stateless LLM client - each call is independent
///
/// Implementations are pure adapters: exactly one network call per
/// invocation and no internal retry. Retrying is the job of
/// [`RetryExecutor`](crate::retry::RetryExecutor).
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send a single prompt and return the raw generated text
    async fn invoke(&self, prompt: &str, options: &GenerationOptions) -> Result<String, LlmError>;

    /// Model identifier this client talks to
    fn model(&self) -> &str;
}
