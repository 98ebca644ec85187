//! Stage abstraction

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::StageError;
use super::state::{PartialUpdate, PipelineState};
use crate::llm::{GenerationOptions, LlmClient, LlmError};
use crate::retry::{AttemptBudget, RetryExecutor};

/// The four pipeline stages, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageName {
    Planner,
    Researcher,
    Executor,
    Validator,
}

impl StageName {
    pub const ALL: [StageName; 4] = [Self::Planner, Self::Researcher, Self::Executor, Self::Validator];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Planner => "planner",
            Self::Researcher => "researcher",
            Self::Executor => "executor",
            Self::Validator => "validator",
        }
    }
}

impl std::fmt::Display for StageName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One step of the pipeline
///
/// A stage reads the fields of [`PipelineState`] it depends on, calls the LLM
/// through the run's [`RetryExecutor`], and returns the fields it owns as a
/// [`PartialUpdate`]. Stages keep no per-run state of their own.
#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> StageName;

    async fn execute(&self, state: &PipelineState, retry: &RetryExecutor) -> Result<PartialUpdate, StageError>;
}

/// Invoke the LLM under the retry policy and return non-empty text
///
/// An empty or whitespace-only reply counts as `InvalidResponse`, which is
/// never retried.
pub async fn complete_text(
    stage: StageName,
    llm: &dyn LlmClient,
    retry: &RetryExecutor,
    prompt: &str,
    options: &GenerationOptions,
) -> Result<String, StageError> {
    let mut budget = retry.budget(1);
    complete_text_within(stage, llm, retry, &mut budget, prompt, options).await
}

/// [`complete_text`] for stages that make several calls from one budget
pub async fn complete_text_within(
    stage: StageName,
    llm: &dyn LlmClient,
    retry: &RetryExecutor,
    budget: &mut AttemptBudget,
    prompt: &str,
    options: &GenerationOptions,
) -> Result<String, StageError> {
    debug!(%stage, prompt_len = prompt.len(), used = budget.used(), ?options, "complete_text_within: called");
    retry
        .call_within(stage, budget, move || async move {
            let text = llm.invoke(prompt, options).await?;
            let trimmed = text.trim();
            if trimmed.is_empty() {
                return Err(LlmError::InvalidResponse(format!("{} received an empty response", stage)));
            }
            Ok(trimmed.to_string())
        })
        .await
        .map_err(|e| StageError::from_retry(stage, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ErrorKind;
    use crate::llm::client::mock::MockLlmClient;
    use crate::retry::RetryPolicy;

    #[test]
    fn test_stage_order_and_names() {
        let names: Vec<&str> = StageName::ALL.iter().map(|s| s.as_str()).collect();
        assert_eq!(names, vec!["planner", "researcher", "executor", "validator"]);
        assert_eq!(serde_json::to_string(&StageName::Researcher).unwrap(), "\"researcher\"");
    }

    #[tokio::test]
    async fn test_complete_text_trims() {
        let llm = MockLlmClient::always("  a plan \n");
        let retry = RetryExecutor::new(RetryPolicy::no_retry());

        let text = complete_text(StageName::Planner, &llm, &retry, "p", &GenerationOptions::default())
            .await
            .unwrap();

        assert_eq!(text, "a plan");
    }

    #[tokio::test]
    async fn test_empty_reply_is_invalid_response_without_retry() {
        let llm = MockLlmClient::new(vec![Ok("   ".to_string()), Ok("late".to_string())]);
        let retry = RetryExecutor::new(RetryPolicy::default());

        let err = complete_text(StageName::Executor, &llm, &retry, "p", &GenerationOptions::default())
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::InvalidResponse);
        assert_eq!(err.attempt, 1);
        assert_eq!(err.stage, StageName::Executor);
        assert_eq!(llm.call_count(), 1);
    }
}
