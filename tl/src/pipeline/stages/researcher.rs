//! Researcher stage

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::{render, require};
use crate::llm::{GenerationOptions, LlmClient};
use crate::pipeline::{
    PartialUpdate, PipelineSettings, PipelineState, Stage, StageError, StageName, complete_text,
};
use crate::prompts::{PromptContext, PromptLoader};
use crate::retry::RetryExecutor;

/// Results recorded when the plan produced no research tasks
pub const NO_RESEARCH_TASKS: &str = "No research tasks provided.";

const MAX_TOKENS: u32 = 4096;

pub struct Researcher {
    llm: Arc<dyn LlmClient>,
    prompts: Arc<PromptLoader>,
    temperature: f32,
}

impl Researcher {
    pub fn new(llm: Arc<dyn LlmClient>, prompts: Arc<PromptLoader>, settings: &PipelineSettings) -> Self {
        Self {
            llm,
            prompts,
            temperature: settings.temperature,
        }
    }
}

#[async_trait]
impl Stage for Researcher {
    fn name(&self) -> StageName {
        StageName::Researcher
    }

    async fn execute(&self, state: &PipelineState, retry: &RetryExecutor) -> Result<PartialUpdate, StageError> {
        let stage = self.name();
        debug!(run_id = %state.run_id(), tasks = state.research_tasks().len(), "Researcher::execute: called");
        let plan = require(stage, "plan", state.plan())?;

        if state.research_tasks().is_empty() {
            warn!(run_id = %state.run_id(), "No research tasks, skipping research");
            return Ok(PartialUpdate::Research {
                results: NO_RESEARCH_TASKS.to_string(),
            });
        }

        let ctx = PromptContext::new(state.query())
            .with_plan(plan)
            .with_research_tasks(state.research_tasks());
        let prompt = render(&self.prompts, stage, "research", &ctx)?;
        let options = GenerationOptions::new(self.temperature, MAX_TOKENS);
        let results = complete_text(stage, self.llm.as_ref(), retry, &prompt, &options).await?;

        info!(run_id = %state.run_id(), results_chars = results.len(), "Research completed");
        Ok(PartialUpdate::Research { results })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ErrorKind;
    use crate::llm::client::mock::MockLlmClient;
    use crate::pipeline::stages::fixtures;
    use crate::retry::RetryPolicy;

    fn researcher(llm: Arc<MockLlmClient>) -> Researcher {
        Researcher::new(llm, Arc::new(PromptLoader::embedded_only()), &PipelineSettings::default())
    }

    #[tokio::test]
    async fn test_researches_listed_tasks() {
        let llm = Arc::new(MockLlmClient::always("Hotel Artemide, 180 EUR"));
        let state = fixtures::planned(&["Research hotels in Rome"]);
        let retry = RetryExecutor::new(RetryPolicy::no_retry());

        let update = researcher(llm.clone()).execute(&state, &retry).await.unwrap();

        assert_eq!(
            update,
            PartialUpdate::Research {
                results: "Hotel Artemide, 180 EUR".to_string()
            }
        );
        let prompt = &llm.prompts()[0];
        assert!(prompt.contains("Research hotels in Rome"));
        assert!(prompt.contains("Day 1: Colosseum"));
    }

    #[tokio::test]
    async fn test_no_tasks_skips_llm() {
        let llm = Arc::new(MockLlmClient::always("unused"));
        let state = fixtures::planned(&[]);
        let retry = RetryExecutor::new(RetryPolicy::no_retry());

        let update = researcher(llm.clone()).execute(&state, &retry).await.unwrap();

        assert_eq!(
            update,
            PartialUpdate::Research {
                results: NO_RESEARCH_TASKS.to_string()
            }
        );
        assert_eq!(llm.call_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_plan_is_fatal() {
        let llm = Arc::new(MockLlmClient::always("unused"));
        let state = PipelineState::new("Rome", vec![]);
        let retry = RetryExecutor::new(RetryPolicy::no_retry());

        let err = researcher(llm.clone()).execute(&state, &retry).await.unwrap_err();

        assert_eq!(err.kind, ErrorKind::Fatal);
        assert_eq!(err.attempt, 0);
        assert!(err.message.contains("plan"));
        assert_eq!(llm.call_count(), 0);
    }
}
