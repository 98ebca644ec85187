//! Validator stage

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

const MAX_TOKENS: u32 = 2048;

pub struct Validator {
    llm: Arc<dyn LlmClient>,
    prompts: Arc<PromptLoader>,
    temperature: f32,
}

impl Validator {
    pub fn new(llm: Arc<dyn LlmClient>, prompts: Arc<PromptLoader>, settings: &PipelineSettings) -> Self {
        Self {
            llm,
            prompts,
            temperature: settings.temperature,
        }
    }
}

#[async_trait]
impl Stage for Validator {
    fn name(&self) -> StageName {
        StageName::Validator
    }

    async fn execute(&self, state: &PipelineState, retry: &RetryExecutor) -> Result<PartialUpdate, StageError> {
        let stage = self.name();
        debug!(run_id = %state.run_id(), "Validator::execute: called");
        let itinerary = require(stage, "final_itinerary", state.final_itinerary())?;
        let plan = require(stage, "plan", state.plan())?;
        let research_results = require(stage, "research_results", state.research_results())?;

        let ctx = PromptContext::new(state.query())
            .with_final_itinerary(itinerary)
            .with_plan(plan)
            .with_research_results(research_results);
        let prompt = render(&self.prompts, stage, "validate", &ctx)?;
        let options = GenerationOptions::new(self.temperature, MAX_TOKENS);
        let validation = complete_text(stage, self.llm.as_ref(), retry, &prompt, &options).await?;

        info!(run_id = %state.run_id(), validation_chars = validation.len(), "Validation completed");
        Ok(PartialUpdate::Validation { validation })
    }
}
