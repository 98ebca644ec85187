//! Per-run event emitter
//!
//! Binds a sink to one run id and swallows delivery failures so that event
//! plumbing can never fail a pipeline run.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::sink::EventSink;
use super::types::{EventKind, PipelineEvent};
use crate::llm::ErrorKind;
use crate::pipeline::StageName;

/// Longest query excerpt carried in a RunStarted payload
const QUERY_EXCERPT_CHARS: usize = 200;

/// Handle for components to emit events for one run
///
/// RunEmitter is cheap to clone and provides convenience methods for each
/// lifecycle event with the run id pre-set.
#[derive(Clone)]
pub struct RunEmitter {
    run_id: String,
    sink: Arc<dyn EventSink>,
}

impl RunEmitter {
    pub fn new(run_id: impl Into<String>, sink: Arc<dyn EventSink>) -> Self {
        let run_id = run_id.into();
        debug!(%run_id, "RunEmitter::new: called");
        Self { run_id, sink }
    }

    /// Get the run ID this emitter is bound to
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Record an event, logging and dropping any sink error
    pub fn emit(&self, event: PipelineEvent) {
        debug!(event_type = event.event_type(), "RunEmitter::emit");
        if let Err(e) = self.sink.record(&event) {
            warn!(run_id = %self.run_id, event_type = event.event_type(), error = %e, "event delivery failed");
        }
    }

    fn event(&self, kind: EventKind, stage: Option<StageName>) -> PipelineEvent {
        PipelineEvent::new(self.run_id.clone(), kind, stage)
    }

    // === Convenience methods ===

    pub fn run_started(&self, query: &str) {
        let excerpt: String = query.chars().take(QUERY_EXCERPT_CHARS).collect();
        self.emit(self.event(EventKind::RunStarted, None).with("query", excerpt));
    }

    pub fn stage_started(&self, stage: StageName) {
        self.emit(self.event(EventKind::StageStarted, Some(stage)));
    }

    pub fn stage_completed(&self, stage: StageName, duration: Duration, output_chars: usize) {
        self.emit(
            self.event(EventKind::StageCompleted, Some(stage))
                .with("duration_ms", duration_ms(duration))
                .with("output_chars", output_chars),
        );
    }

    /// `attempt` is the 1-based attempt that just failed; `delay` is the wait before the next one
    pub fn retry_attempted(&self, stage: StageName, attempt: u32, delay: Duration, kind: ErrorKind, message: &str) {
        self.emit(
            self.event(EventKind::RetryAttempted, Some(stage))
                .with("attempt", attempt)
                .with("delay_ms", duration_ms(delay))
                .with("error_kind", kind.as_str())
                .with("message", message),
        );
    }

    pub fn stage_failed(&self, stage: StageName, kind: ErrorKind, attempts: u32, message: &str) {
        self.emit(
            self.event(EventKind::StageFailed, Some(stage))
                .with("error_kind", kind.as_str())
                .with("attempts", attempts)
                .with("message", message),
        );
    }

    pub fn run_completed(&self, status: &str, duration: Duration, failed_stage: Option<StageName>) {
        let mut event = self
            .event(EventKind::RunCompleted, None)
            .with("status", status)
            .with("duration_ms", duration_ms(duration));
        if let Some(stage) = failed_stage {
            event = event.with("failed_stage", stage.as_str());
        }
        self.emit(event);
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
