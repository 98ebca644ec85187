//! Planner stage: trip plan plus the research tasks it depends on

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use super::render;
use crate::llm::{GenerationOptions, LlmClient};
use crate::pipeline::{
    PartialUpdate, PipelineSettings, PipelineState, Stage, StageError, StageName, complete_text_within,
};
use crate::prompts::{PromptContext, PromptLoader};
use crate::retry::RetryExecutor;

const PLAN_MAX_TOKENS: u32 = 2048;
const TASKS_MAX_TOKENS: u32 = 512;
const LLM_CALLS: u32 = 2;

pub struct Planner {
    llm: Arc<dyn LlmClient>,
    prompts: Arc<PromptLoader>,
    history_window: usize,
    temperature: f32,
}

impl Planner {
    pub fn new(llm: Arc<dyn LlmClient>, prompts: Arc<PromptLoader>, settings: &PipelineSettings) -> Self {
        Self {
            llm,
            prompts,
            history_window: settings.history_window,
            temperature: settings.temperature,
        }
    }
}

#[async_trait]
impl Stage for Planner {
    fn name(&self) -> StageName {
        StageName::Planner
    }

    async fn execute(&self, state: &PipelineState, retry: &RetryExecutor) -> Result<PartialUpdate, StageError> {
        let stage = self.name();
        let history = state.recent_history(self.history_window);
        debug!(run_id = %state.run_id(), history_len = history.len(), "Planner::execute: called");

        if state.query().trim().is_empty() {
            return Err(StageError::fatal(stage, "query is empty"));
        }

        // Both calls draw from one attempt budget
        let mut budget = retry.budget(LLM_CALLS);

        let ctx = PromptContext::new(state.query()).with_history(history);
        let prompt = render(&self.prompts, stage, "plan", &ctx)?;
        let options = GenerationOptions::new(self.temperature, PLAN_MAX_TOKENS);
        let plan = complete_text_within(stage, self.llm.as_ref(), retry, &mut budget, &prompt, &options).await?;

        let ctx = PromptContext::new(state.query()).with_plan(plan.as_str());
        let prompt = render(&self.prompts, stage, "research-tasks", &ctx)?;
        let options = GenerationOptions::new(self.temperature, TASKS_MAX_TOKENS);
        let raw_tasks =
            complete_text_within(stage, self.llm.as_ref(), retry, &mut budget, &prompt, &options).await?;
        let research_tasks = parse_tasks(&raw_tasks);

        info!(
            run_id = %state.run_id(),
            plan_chars = plan.len(),
            tasks = research_tasks.len(),
            "Plan created"
        );
        Ok(PartialUpdate::Plan { plan, research_tasks })
    }
}

/// Split a task list into one task per line
///
/// Leading bullets (`-`, `*`, `+`, `•`), numbering (`1.`, `2)`) and markdown
/// emphasis are stripped. Blank lines and headings (lines ending in `:`) are
/// dropped.
pub fn parse_tasks(text: &str) -> Vec<String> {
    text.lines()
        .map(strip_marker)
        .map(|line| line.replace("**", "").trim().trim_matches('*').trim().to_string())
        .filter(|line| !line.is_empty() && !line.ends_with(':'))
        .collect()
}

fn strip_marker(line: &str) -> &str {
    let line = line.trim().trim_start_matches(['-', '*', '+', '•']).trim_start();
    let rest = line.trim_start_matches(|c: char| c.is_ascii_digit());
    if rest.len() < line.len()
        && let Some(after) = rest.strip_prefix('.').or_else(|| rest.strip_prefix(')'))
    {
        return after.trim();
    }
    line.trim()
}
