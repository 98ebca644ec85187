//! Embedded prompts
//!
//! These are compiled into the binary from .pmt files at build time.

use tracing::debug;

/// Planner: trip plan from the request and recent history
pub const PLAN: &str = include_str!("../../prompts/plan.pmt");

/// Planner: research task list extracted from the plan
pub const RESEARCH_TASKS: &str = include_str!("../../prompts/research-tasks.pmt");

/// Researcher
pub const RESEARCH: &str = include_str!("../../prompts/research.pmt");

/// Executor
pub const EXECUTE: &str = include_str!("../../prompts/execute.pmt");

/// Validator
pub const VALIDATE: &str = include_str!("../../prompts/validate.pmt");

/// Names of every embedded template
pub const NAMES: [&str; 5] = ["plan", "research-tasks", "research", "execute", "validate"];

/// Get the embedded prompt by name
pub fn get_embedded(name: &str) -> Option<&'static str> {
    debug!(%name, "get_embedded: called");
    match name {
        "plan" => Some(PLAN),
        "research-tasks" => Some(RESEARCH_TASKS),
        "research" => Some(RESEARCH),
        "execute" => Some(EXECUTE),
        "validate" => Some(VALIDATE),
        _ => {
            debug!("get_embedded: no match found");
            None
        }
    }
}
