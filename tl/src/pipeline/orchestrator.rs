//! Orchestrator: runs the stages in fixed order over one state per run

use std::sync::Arc;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::context::{PipelineSettings, RunContext};
use super::error::{PipelineError, StageError};
use super::stage::{Stage, StageName};
use super::stages::{Executor, Planner, Researcher, Validator};
use super::state::{FinalItinerary, PipelineState, RunStatus};
use crate::domain::Turn;
use crate::events::RunEmitter;
use crate::llm::{ErrorKind, LlmClient};
use crate::prompts::PromptLoader;
use crate::retry::RetryExecutor;

/// Where a run is in its lifecycle
///
/// `Done` and `Failed` are absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Planning,
    Researching,
    Executing,
    Validating,
    Done,
    Failed,
}

impl Phase {
    pub fn for_stage(stage: StageName) -> Self {
        match stage {
            StageName::Planner => Self::Planning,
            StageName::Researcher => Self::Researching,
            StageName::Executor => Self::Executing,
            StageName::Validator => Self::Validating,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

/// The four stages a run goes through
#[derive(Clone)]
pub struct StageSet {
    pub planner: Arc<dyn Stage>,
    pub researcher: Arc<dyn Stage>,
    pub executor: Arc<dyn Stage>,
    pub validator: Arc<dyn Stage>,
}

impl StageSet {
    /// The standard LLM-backed stages
    pub fn standard(llm: Arc<dyn LlmClient>, prompts: Arc<PromptLoader>, settings: &PipelineSettings) -> Self {
        Self {
            planner: Arc::new(Planner::new(llm.clone(), prompts.clone(), settings)),
            researcher: Arc::new(Researcher::new(llm.clone(), prompts.clone(), settings)),
            executor: Arc::new(Executor::new(llm.clone(), prompts.clone(), settings)),
            validator: Arc::new(Validator::new(llm, prompts, settings)),
        }
    }

    fn in_order(&self) -> [&Arc<dyn Stage>; 4] {
        [&self.planner, &self.researcher, &self.executor, &self.validator]
    }
}

/// Runs queries through Planner → Researcher → Executor → Validator
///
/// Holds only shared, immutable collaborators, so one orchestrator can serve
/// many concurrent runs; each run gets its own state, emitter and retry
/// executor.
#[derive(Clone)]
pub struct Orchestrator {
    ctx: RunContext,
    stages: StageSet,
}

impl Orchestrator {
    pub fn new(ctx: RunContext, llm: Arc<dyn LlmClient>, prompts: Arc<PromptLoader>) -> Self {
        debug!(model = llm.model(), "Orchestrator::new: called");
        let stages = StageSet::standard(llm, prompts, &ctx.settings);
        Self { ctx, stages }
    }

    /// Use custom stage implementations
    pub fn with_stages(ctx: RunContext, stages: StageSet) -> Self {
        debug!("Orchestrator::with_stages: called");
        Self { ctx, stages }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.ctx.settings
    }

    /// Run the pipeline for one query
    pub async fn run(&self, query: impl Into<String>, history: Vec<Turn>) -> Result<FinalItinerary, PipelineError> {
        self.run_with_cancel(query, history, CancellationToken::new()).await
    }

    /// Run the pipeline, stopping early if `cancel` fires
    pub async fn run_with_cancel(
        &self,
        query: impl Into<String>,
        history: Vec<Turn>,
        cancel: CancellationToken,
    ) -> Result<FinalItinerary, PipelineError> {
        let started = Instant::now();
        let mut state = PipelineState::new(query, history);
        let run_id = state.run_id().to_string();
        let emitter = RunEmitter::new(run_id.clone(), self.ctx.sink.clone());
        let deadline = self.ctx.settings.run_timeout.map(|timeout| started + timeout);
        let retry = RetryExecutor::new(self.ctx.settings.retry.clone())
            .with_emitter(emitter.clone())
            .with_cancellation(cancel.clone())
            .with_deadline(deadline);

        info!(%run_id, query_len = state.query().len(), "Pipeline run started");
        emitter.run_started(state.query());
        let mut phase = Phase::Idle;
        debug!(%run_id, ?phase, "Orchestrator::run_with_cancel: entering run");
        if let Err(e) = state.set_status(RunStatus::InProgress) {
            debug!(%run_id, error = %e, "Orchestrator::run_with_cancel: status not advanced");
        }

        for stage in self.stages.in_order() {
            let name = stage.name();
            phase = Phase::for_stage(name);
            debug!(%run_id, ?phase, "Orchestrator::run_with_cancel: entering phase");

            emitter.stage_started(name);
            let stage_started = Instant::now();

            let outcome = match interruption(name, &cancel, deadline) {
                Some(err) => Err(err),
                None => stage.execute(&state, &retry).await.and_then(|update| {
                    if update.stage() != name {
                        return Err(StageError::fatal(
                            name,
                            format!("{} returned output owned by {}", name, update.stage()),
                        ));
                    }
                    let chars = update.output_chars();
                    state
                        .apply(update)
                        .map(|_| chars)
                        .map_err(|e| StageError::fatal(name, e.to_string()))
                }),
            };

            match outcome {
                Ok(output_chars) => {
                    info!(%run_id, stage = %name, output_chars, "Stage completed");
                    emitter.stage_completed(name, stage_started.elapsed(), output_chars);
                }
                Err(stage_error) => {
                    phase = Phase::Failed;
                    error!(
                        %run_id,
                        stage = %name,
                        kind = %stage_error.kind,
                        attempts = stage_error.attempt,
                        ?phase,
                        "Stage failed: {}",
                        stage_error.message
                    );
                    emitter.stage_failed(name, stage_error.kind, stage_error.attempt, &stage_error.message);
                    state.record_failure(stage_error.clone());
                    emitter.run_completed(RunStatus::Failed.as_str(), started.elapsed(), Some(name));
                    return Err(PipelineError {
                        stage: name,
                        error: stage_error,
                        state: Box::new(state),
                    });
                }
            }
        }

        phase = Phase::Done;
        debug!(%run_id, ?phase, "Orchestrator::run_with_cancel: all stages completed");
        if let Err(e) = state.set_status(RunStatus::Completed) {
            return Err(self.finish_inconsistent(state, &emitter, started, e.to_string()));
        }
        match state.into_final() {
            Ok(result) => {
                info!(%run_id, elapsed_ms = started.elapsed().as_millis() as u64, "Pipeline run completed");
                emitter.run_completed(RunStatus::Completed.as_str(), started.elapsed(), None);
                Ok(result)
            }
            Err(state) => Err(self.finish_inconsistent(state, &emitter, started, "incomplete state".to_string())),
        }
    }

    /// Fail a run whose state could not be completed after every stage succeeded
    fn finish_inconsistent(
        &self,
        mut state: PipelineState,
        emitter: &RunEmitter,
        started: Instant,
        message: String,
    ) -> PipelineError {
        let stage = StageName::Validator;
        error!(run_id = %state.run_id(), %message, "Pipeline state inconsistent after final stage");
        let stage_error = StageError::fatal(stage, message);
        emitter.stage_failed(stage, stage_error.kind, stage_error.attempt, &stage_error.message);
        state.record_failure(stage_error.clone());
        emitter.run_completed(RunStatus::Failed.as_str(), started.elapsed(), Some(stage));
        PipelineError {
            stage,
            error: stage_error,
            state: Box::new(state),
        }
    }
}

/// A stage must not start once the run is cancelled or past its deadline
fn interruption(stage: StageName, cancel: &CancellationToken, deadline: Option<Instant>) -> Option<StageError> {
    if cancel.is_cancelled() {
        return Some(StageError::new(stage, ErrorKind::Cancelled, "run cancelled", 0));
    }
    if deadline.is_some_and(|at| Instant::now() >= at) {
        return Some(StageError::new(stage, ErrorKind::Timeout, "run deadline exceeded", 0));
    }
    None
}
