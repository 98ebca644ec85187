//! Tripline - multi-stage LLM trip planner
//!
//! Tripline turns a free-form travel request into a validated itinerary by
//! running four LLM-backed stages in strict order: Planner, Researcher,
//! Executor and Validator. Every LLM call goes through a bounded retry loop
//! with exponential backoff, so transient provider failures (rate limits,
//! overloaded backends) are absorbed while permanent ones stop the run early.
//!
//! # Modules
//!
//! - [`pipeline`] - Orchestrator, stages and per-run state
//! - [`retry`] - Retry policy and executor
//! - [`llm`] - LLM client trait and Gemini implementation
//! - [`events`] - Lifecycle events, sinks and the JSONL event log
//! - [`store`] - Conversation history persistence
//! - [`prompts`] - Handlebars prompt templates
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod cli;
pub mod config;
pub mod domain;
pub mod events;
pub mod llm;
pub mod pipeline;
pub mod prompts;
pub mod retry;
pub mod store;

// Re-export commonly used types
pub use config::{Config, LlmConfig};
pub use domain::{Role, Turn};
pub use events::{EventBus, EventKind, EventSink, PipelineEvent, RecordingSink, RunEmitter, create_event_bus};
pub use llm::{ErrorKind, GeminiClient, GenerationOptions, LlmClient, LlmError, create_client};
pub use pipeline::{
    FinalItinerary, Orchestrator, PartialUpdate, PipelineError, PipelineSettings, PipelineState, RunContext, RunStatus,
    Stage, StageError, StageName,
};
pub use prompts::PromptLoader;
pub use retry::{RetryError, RetryExecutor, RetryPolicy};
pub use store::{ConversationStore, JsonlStore, MemoryStore};
