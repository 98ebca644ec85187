//! Executor stage: synthesises plan and research into the final itinerary

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use super::{render, require};
use crate::llm::{GenerationOptions, LlmClient};
use crate::pipeline::{
    PartialUpdate, PipelineSettings, PipelineState, Stage, StageError, StageName, complete_text,
};
use crate::prompts::{PromptContext, PromptLoader};
use crate::retry::RetryExecutor;

const MAX_TOKENS: u32 = 4096;

pub struct Executor {
    llm: Arc<dyn LlmClient>,
    prompts: Arc<PromptLoader>,
    temperature: f32,
}

impl Executor {
    pub fn new(llm: Arc<dyn LlmClient>, prompts: Arc<PromptLoader>, settings: &PipelineSettings) -> Self {
        Self {
            llm,
            prompts,
            temperature: settings.temperature,
        }
    }
}

#[async_trait]
impl Stage for Executor {
    fn name(&self) -> StageName {
        StageName::Executor
    }

    async fn execute(&self, state: &PipelineState, retry: &RetryExecutor) -> Result<PartialUpdate, StageError> {
        let stage = self.name();
        debug!(run_id = %state.run_id(), "Executor::execute: called");
        let plan = require(stage, "plan", state.plan())?;
        let research_results = require(stage, "research_results", state.research_results())?;

        let ctx = PromptContext::new(state.query())
            .with_plan(plan)
            .with_research_results(research_results);
        let prompt = render(&self.prompts, stage, "execute", &ctx)?;
        let options = GenerationOptions::new(self.temperature, MAX_TOKENS);
        let itinerary = complete_text(stage, self.llm.as_ref(), retry, &prompt, &options).await?;

        info!(run_id = %state.run_id(), itinerary_chars = itinerary.len(), "Itinerary created");
        Ok(PartialUpdate::Itinerary { itinerary })
    }
}
