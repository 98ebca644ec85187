//! Event types for pipeline lifecycle streaming
//!
//! These events represent all observable activity of a pipeline run:
//! - Run lifecycle (start, completion)
//! - Stage lifecycle (start, completion, failure)
//! - Retries of transient LLM failures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::pipeline::StageName;

/// What happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    RunStarted,
    StageStarted,
    StageCompleted,
    RetryAttempted,
    StageFailed,
    RunCompleted,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RunStarted => "RunStarted",
            Self::StageStarted => "StageStarted",
            Self::StageCompleted => "StageCompleted",
            Self::RetryAttempted => "RetryAttempted",
            Self::StageFailed => "StageFailed",
            Self::RunCompleted => "RunCompleted",
        }
    }
}

/// A single lifecycle event
///
/// `stage` is absent for run-level events. `payload` carries kind-specific
/// details (attempt numbers, delays, durations) as plain JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineEvent {
    pub run_id: String,
    pub kind: EventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<StageName>,
    #[serde(default)]
    pub payload: Map<String, Value>,
    #[serde(rename = "ts")]
    pub timestamp: DateTime<Utc>,
}

impl PipelineEvent {
    /// Create an event stamped with the current time
    pub fn new(run_id: impl Into<String>, kind: EventKind, stage: Option<StageName>) -> Self {
        Self {
            run_id: run_id.into(),
            kind,
            stage,
            payload: Map::new(),
            timestamp: Utc::now(),
        }
    }

    /// Add a payload field
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.payload.insert(key.to_string(), value.into());
        self
    }

    pub fn event_type(&self) -> &'static str {
        self.kind.as_str()
    }

    /// Short human-readable summary for logs and replay
    pub fn summary(&self) -> String {
        let stage = self.stage.map(|s| s.to_string()).unwrap_or_else(|| "run".to_string());
        if self.payload.is_empty() {
            return format!("{} {}", stage, self.kind.as_str());
        }
        let details: Vec<String> = self.payload.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        format!("{} {} {}", stage, self.kind.as_str(), details.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type() {
        let event = PipelineEvent::new("run-1", EventKind::RetryAttempted, Some(StageName::Planner));
        assert_eq!(event.event_type(), "RetryAttempted");
        assert_eq!(event.run_id, "run-1");
    }

    #[test]
    fn test_event_serialization() {
        let event = PipelineEvent::new("run-1", EventKind::StageFailed, Some(StageName::Researcher))
            .with("error_kind", "invalid_response")
            .with("attempts", 1);

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("StageFailed"));
        assert!(json.contains("researcher"));
        assert!(json.contains("\"ts\""));

        let parsed: PipelineEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn test_run_level_event_omits_stage() {
        let event = PipelineEvent::new("run-2", EventKind::RunCompleted, None);
        let json = serde_json::to_string(&event).unwrap();
        assert!(!json.contains("stage"));
        assert_eq!(event.summary(), "run RunCompleted");
    }

    #[test]
    fn test_summary_includes_payload() {
        let event = PipelineEvent::new("run-3", EventKind::RetryAttempted, Some(StageName::Executor))
            .with("attempt", 2)
            .with("delay_ms", 4000);
        let summary = event.summary();
        assert!(summary.starts_with("executor RetryAttempted"));
        assert!(summary.contains("attempt=2"));
        assert!(summary.contains("delay_ms=4000"));
    }
}
