//! Per-run pipeline state

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use super::error::StageError;
use super::stage::StageName;
use crate::domain::Turn;

/// Run status
///
/// Moves forward only: `Pending → InProgress → {Completed | Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl RunStatus {
    fn rank(&self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::InProgress => 1,
            Self::Completed | Self::Failed => 2,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Rejected state changes
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("status cannot move from {from} to {to}")]
    InvalidTransition { from: RunStatus, to: RunStatus },

    #[error("{stage} output cannot be applied before {missing} is set")]
    OutOfOrder { stage: StageName, missing: &'static str },

    #[error("run is already {0}")]
    Terminal(RunStatus),
}

/// Fields produced by one stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartialUpdate {
    Plan { plan: String, research_tasks: Vec<String> },
    Research { results: String },
    Itinerary { itinerary: String },
    Validation { validation: String },
}

impl PartialUpdate {
    /// The stage that owns these fields
    pub fn stage(&self) -> StageName {
        match self {
            Self::Plan { .. } => StageName::Planner,
            Self::Research { .. } => StageName::Researcher,
            Self::Itinerary { .. } => StageName::Executor,
            Self::Validation { .. } => StageName::Validator,
        }
    }

    /// Characters of primary output, for progress events
    pub fn output_chars(&self) -> usize {
        match self {
            Self::Plan { plan, .. } => plan.chars().count(),
            Self::Research { results } => results.chars().count(),
            Self::Itinerary { itinerary } => itinerary.chars().count(),
            Self::Validation { validation } => validation.chars().count(),
        }
    }
}

/// Accumulator passed through the stages of a single run
///
/// Fields are filled strictly in pipeline order by [`apply`](Self::apply).
/// `query` and `history` never change after creation.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineState {
    run_id: String,
    query: String,
    history: Vec<Turn>,
    plan: Option<String>,
    research_tasks: Vec<String>,
    research_results: Option<String>,
    final_itinerary: Option<String>,
    validation: Option<String>,
    status: RunStatus,
    errors: Vec<StageError>,
}

impl PipelineState {
    pub fn new(query: impl Into<String>, history: Vec<Turn>) -> Self {
        let run_id = Uuid::now_v7().to_string();
        let query = query.into();
        debug!(%run_id, query_len = query.len(), history_len = history.len(), "PipelineState::new: called");
        Self {
            run_id,
            query,
            history,
            plan: None,
            research_tasks: Vec::new(),
            research_results: None,
            final_itinerary: None,
            validation: None,
            status: RunStatus::Pending,
            errors: Vec::new(),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn history(&self) -> &[Turn] {
        &self.history
    }

    /// The most recent `window` turns
    pub fn recent_history(&self, window: usize) -> &[Turn] {
        let start = self.history.len().saturating_sub(window);
        &self.history[start..]
    }

    pub fn plan(&self) -> Option<&str> {
        self.plan.as_deref()
    }

    pub fn research_tasks(&self) -> &[String] {
        &self.research_tasks
    }

    pub fn research_results(&self) -> Option<&str> {
        self.research_results.as_deref()
    }

    pub fn final_itinerary(&self) -> Option<&str> {
        self.final_itinerary.as_deref()
    }

    pub fn validation(&self) -> Option<&str> {
        self.validation.as_deref()
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn errors(&self) -> &[StageError] {
        &self.errors
    }

    /// Move the status forward; backwards or sideways moves are rejected
    pub fn set_status(&mut self, next: RunStatus) -> Result<(), StateError> {
        debug!(run_id = %self.run_id, from = %self.status, to = %next, "PipelineState::set_status: called");
        if next.rank() <= self.status.rank() {
            return Err(StateError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        if next == RunStatus::Completed && self.validation.is_none() {
            return Err(StateError::OutOfOrder {
                stage: StageName::Validator,
                missing: "validation",
            });
        }
        self.status = next;
        Ok(())
    }

    /// Merge a stage's output
    pub fn apply(&mut self, update: PartialUpdate) -> Result<(), StateError> {
        debug!(run_id = %self.run_id, stage = %update.stage(), "PipelineState::apply: called");
        if self.status.is_terminal() {
            return Err(StateError::Terminal(self.status));
        }
        let stage = update.stage();
        let missing = match stage {
            StageName::Planner => None,
            StageName::Researcher => self.plan.is_none().then_some("plan"),
            StageName::Executor => self.research_results.is_none().then_some("research_results"),
            StageName::Validator => self.final_itinerary.is_none().then_some("final_itinerary"),
        };
        if let Some(missing) = missing {
            return Err(StateError::OutOfOrder { stage, missing });
        }

        match update {
            PartialUpdate::Plan { plan, research_tasks } => {
                self.plan = Some(plan);
                self.research_tasks = research_tasks;
            }
            PartialUpdate::Research { results } => self.research_results = Some(results),
            PartialUpdate::Itinerary { itinerary } => self.final_itinerary = Some(itinerary),
            PartialUpdate::Validation { validation } => self.validation = Some(validation),
        }
        Ok(())
    }

    /// Record a stage failure and mark the run failed
    pub fn record_failure(&mut self, error: StageError) {
        debug!(run_id = %self.run_id, stage = %error.stage, kind = %error.kind, "PipelineState::record_failure: called");
        self.errors.push(error);
        if !self.status.is_terminal() {
            self.status = RunStatus::Failed;
        }
    }

    /// Convert a completed state into the caller-facing result
    ///
    /// Hands the state back unchanged if the run did not complete.
    pub fn into_final(self) -> Result<FinalItinerary, PipelineState> {
        if self.status != RunStatus::Completed {
            return Err(self);
        }
        match (self.plan, self.research_results, self.final_itinerary, self.validation) {
            (Some(plan), Some(research_results), Some(final_itinerary), Some(validation)) => Ok(FinalItinerary {
                run_id: self.run_id,
                plan,
                research_tasks: self.research_tasks,
                research_results,
                final_itinerary,
                validation,
                status: self.status,
            }),
            (plan, research_results, final_itinerary, validation) => Err(PipelineState {
                plan,
                research_results,
                final_itinerary,
                validation,
                ..self
            }),
        }
    }
}

/// Aggregated output of a completed run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalItinerary {
    pub run_id: String,
    pub plan: String,
    pub research_tasks: Vec<String>,
    pub research_results: String,
    pub final_itinerary: String,
    pub validation: String,
    pub status: RunStatus,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ErrorKind;

    fn plan_update() -> PartialUpdate {
        PartialUpdate::Plan {
            plan: "Day 1: Colosseum".to_string(),
            research_tasks: vec!["Research hotels".to_string()],
        }
    }

    fn completed_state() -> PipelineState {
        let mut state = PipelineState::new("Plan a 3-day trip to Rome", vec![]);
        state.set_status(RunStatus::InProgress).unwrap();
        state.apply(plan_update()).unwrap();
        state
            .apply(PartialUpdate::Research {
                results: "Hotel Roma".to_string(),
            })
            .unwrap();
        state
            .apply(PartialUpdate::Itinerary {
                itinerary: "Day 1 at 9:00".to_string(),
            })
            .unwrap();
        state
            .apply(PartialUpdate::Validation {
                validation: "good".to_string(),
            })
            .unwrap();
        state
    }

    #[test]
    fn test_new_state_is_pending_and_empty() {
        let state = PipelineState::new("q", vec![Turn::user("hi")]);
        assert_eq!(state.status(), RunStatus::Pending);
        assert!(state.plan().is_none());
        assert!(state.errors().is_empty());
        assert_eq!(state.history().len(), 1);
        assert!(Uuid::parse_str(state.run_id()).is_ok());
    }

    #[test]
    fn test_run_ids_are_unique() {
        let a = PipelineState::new("q", vec![]);
        let b = PipelineState::new("q", vec![]);
        assert_ne!(a.run_id(), b.run_id());
    }

    #[test]
    fn test_status_never_moves_backwards() {
        let mut state = PipelineState::new("q", vec![]);
        state.set_status(RunStatus::InProgress).unwrap();
        assert_eq!(
            state.set_status(RunStatus::Pending),
            Err(StateError::InvalidTransition {
                from: RunStatus::InProgress,
                to: RunStatus::Pending
            })
        );
        state.set_status(RunStatus::Failed).unwrap();
        assert!(state.set_status(RunStatus::Completed).is_err());
        assert!(state.set_status(RunStatus::InProgress).is_err());
        assert_eq!(state.status(), RunStatus::Failed);
    }

    #[test]
    fn test_completed_requires_validation() {
        let mut state = PipelineState::new("q", vec![]);
        state.set_status(RunStatus::InProgress).unwrap();
        state.apply(plan_update()).unwrap();
        assert!(matches!(
            state.set_status(RunStatus::Completed),
            Err(StateError::OutOfOrder { .. })
        ));
    }

    #[test]
    fn test_out_of_order_update_rejected() {
        let mut state = PipelineState::new("q", vec![]);
        let err = state
            .apply(PartialUpdate::Itinerary {
                itinerary: "too early".to_string(),
            })
            .unwrap_err();
        assert_eq!(
            err,
            StateError::OutOfOrder {
                stage: StageName::Executor,
                missing: "research_results"
            }
        );
        assert!(state.final_itinerary().is_none());
    }

    #[test]
    fn test_failed_state_rejects_updates() {
        let mut state = PipelineState::new("q", vec![]);
        state.set_status(RunStatus::InProgress).unwrap();
        state.record_failure(StageError::fatal(StageName::Planner, "boom"));

        assert_eq!(state.status(), RunStatus::Failed);
        assert_eq!(state.errors().len(), 1);
        assert_eq!(state.apply(plan_update()), Err(StateError::Terminal(RunStatus::Failed)));
    }

    #[test]
    fn test_recent_history_window() {
        let history: Vec<Turn> = (0..8).map(|i| Turn::user(format!("msg {}", i))).collect();
        let state = PipelineState::new("q", history);

        let recent = state.recent_history(5);
        assert_eq!(recent.len(), 5);
        assert_eq!(recent[0].content, "msg 3");
        assert_eq!(state.recent_history(50).len(), 8);
        assert!(state.recent_history(0).is_empty());
    }

    #[test]
    fn test_into_final() {
        let mut state = completed_state();
        state.set_status(RunStatus::Completed).unwrap();
        let run_id = state.run_id().to_string();

        let result = state.into_final().unwrap();

        assert_eq!(result.run_id, run_id);
        assert_eq!(result.status, RunStatus::Completed);
        assert_eq!(result.plan, "Day 1: Colosseum");
        assert_eq!(result.validation, "good");
    }

    #[test]
    fn test_into_final_requires_completion() {
        let state = completed_state();
        let back = state.into_final().unwrap_err();
        assert_eq!(back.status(), RunStatus::InProgress);
        assert_eq!(back.validation(), Some("good"));
    }

    #[test]
    fn test_errors_only_accumulate() {
        let mut state = PipelineState::new("q", vec![]);
        state.record_failure(StageError::new(StageName::Planner, ErrorKind::Timeout, "slow", 4));
        state.record_failure(StageError::fatal(StageName::Planner, "again"));
        assert_eq!(state.errors().len(), 2);
        assert_eq!(state.errors()[0].kind, ErrorKind::Timeout);
    }
}
