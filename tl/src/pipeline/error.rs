//! Stage and pipeline error types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::stage::StageName;
use super::state::PipelineState;
use crate::llm::ErrorKind;
use crate::retry::RetryError;

/// Terminal failure of one stage
///
/// `attempt` is the number of LLM attempts made for the failing call; 0 means
/// the stage failed before calling the LLM (missing input, bad template).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
#[error("{stage} failed ({kind}) after {attempt} attempt(s): {message}")]
pub struct StageError {
    pub stage: StageName,
    pub kind: ErrorKind,
    pub message: String,
    pub attempt: u32,
    pub occurred_at: DateTime<Utc>,
}

impl StageError {
    pub fn new(stage: StageName, kind: ErrorKind, message: impl Into<String>, attempt: u32) -> Self {
        Self {
            stage,
            kind,
            message: message.into(),
            attempt,
            occurred_at: Utc::now(),
        }
    }

    /// Stage failed before any LLM attempt
    pub fn fatal(stage: StageName, message: impl Into<String>) -> Self {
        Self::new(stage, ErrorKind::Fatal, message, 0)
    }

    pub fn from_retry(stage: StageName, err: RetryError) -> Self {
        Self::new(stage, err.kind(), err.error.to_string(), err.attempts)
    }
}

/// Error returned from a pipeline run
///
/// Carries the failed stage, its error, and the state as it stood when the run
/// stopped. Fields owned by the failed stage and everything after it are unset.
#[derive(Debug, Error)]
#[error("pipeline failed at {stage}: {error}")]
pub struct PipelineError {
    pub stage: StageName,
    pub error: StageError,
    pub state: Box<PipelineState>,
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        self.error.kind
    }

    pub fn attempts(&self) -> u32 {
        self.error.attempt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmError;

    #[test]
    fn test_from_retry_keeps_kind_and_attempts() {
        let err = StageError::from_retry(
            StageName::Researcher,
            RetryError::new(LlmError::RateLimited("quota".to_string()), 4),
        );
        assert_eq!(err.kind, ErrorKind::RateLimited);
        assert_eq!(err.attempt, 4);
        assert!(err.message.contains("quota"));
        assert_eq!(
            err.to_string(),
            "researcher failed (rate_limited) after 4 attempt(s): Rate limited: quota"
        );
    }

    #[test]
    fn test_fatal_has_no_attempts() {
        let err = StageError::fatal(StageName::Executor, "missing plan");
        assert_eq!(err.kind, ErrorKind::Fatal);
        assert_eq!(err.attempt, 0);
    }

    #[test]
    fn test_serializes_for_reports() {
        let err = StageError::fatal(StageName::Validator, "boom");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["stage"], "validator");
        assert_eq!(json["kind"], "fatal");
        assert!(json["occurred_at"].is_string());
    }
}
