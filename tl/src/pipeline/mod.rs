//! The four-stage planning pipeline
//!
//! A run threads one [`PipelineState`] through Planner, Researcher, Executor
//! and Validator. Each stage returns a [`PartialUpdate`]; the
//! [`Orchestrator`] merges it and moves on, or stops at the first failure.

mod context;
mod error;
mod orchestrator;
mod stage;
pub mod stages;
mod state;

pub use context::{PipelineSettings, RunContext};
pub use error::{PipelineError, StageError};
pub use orchestrator::{Orchestrator, Phase, StageSet};
pub use stage::{Stage, StageName, complete_text, complete_text_within};
pub use state::{FinalItinerary, PartialUpdate, PipelineState, RunStatus, StateError};
