//! The four standard stages
//!
//! Each stage renders its prompt template, calls the LLM through the run's
//! retry executor and returns the fields it owns.

mod executor;
mod planner;
mod researcher;
mod validator;

pub use executor::Executor;
pub use planner::{Planner, parse_tasks};
pub use researcher::{NO_RESEARCH_TASKS, Researcher};
pub use validator::Validator;

use super::error::StageError;
use super::stage::StageName;
use crate::prompts::{PromptContext, PromptLoader};

/// Render a template, turning loader failures into a stage error
fn render(prompts: &PromptLoader, stage: StageName, template: &str, ctx: &PromptContext) -> Result<String, StageError> {
    prompts
        .render(template, ctx)
        .map_err(|e| StageError::fatal(stage, e.to_string()))
}

/// Fail with a `Fatal` stage error when a required input is missing
fn require<'a>(stage: StageName, field: &str, value: Option<&'a str>) -> Result<&'a str, StageError> {
    value.ok_or_else(|| StageError::fatal(stage, format!("missing required input: {}", field)))
}
