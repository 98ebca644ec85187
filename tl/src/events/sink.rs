//! Event sinks - where lifecycle events are delivered
//!
//! The pipeline records events synchronously and never lets a sink failure
//! become a pipeline failure: [`RunEmitter`](super::RunEmitter) logs and drops
//! any [`SinkError`].

use std::sync::{Arc, Mutex};

use thiserror::Error;
use tracing::{debug, info, warn};

use super::types::{EventKind, PipelineEvent};

/// Errors a sink may report when an event cannot be delivered
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Sink is closed")]
    Closed,

    #[error("invalid run id '{0}'")]
    InvalidRunId(String),

    #[error("Sink state poisoned")]
    Poisoned,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Receiver of pipeline lifecycle events
pub trait EventSink: Send + Sync {
    fn record(&self, event: &PipelineEvent) -> Result<(), SinkError>;
}

/// Forwards events to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn record(&self, event: &PipelineEvent) -> Result<(), SinkError> {
        match event.kind {
            EventKind::RetryAttempted | EventKind::StageFailed => {
                warn!(run_id = %event.run_id, "{}", event.summary());
            }
            _ => {
                info!(run_id = %event.run_id, "{}", event.summary());
            }
        }
        Ok(())
    }
}

/// Keeps every event in memory
///
/// Useful for tests and for embedding callers that want the full event list
/// after a run.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<PipelineEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far
    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Kinds of the recorded events, in order
    pub fn kinds(&self) -> Vec<EventKind> {
        self.events().iter().map(|e| e.kind).collect()
    }

    /// Recorded events of one kind
    pub fn of_kind(&self, kind: EventKind) -> Vec<PipelineEvent> {
        self.events().into_iter().filter(|e| e.kind == kind).collect()
    }
}

impl EventSink for RecordingSink {
    fn record(&self, event: &PipelineEvent) -> Result<(), SinkError> {
        self.events.lock().map_err(|_| SinkError::Poisoned)?.push(event.clone());
        Ok(())
    }
}

/// Delivers each event to several sinks
///
/// Every sink is tried even if an earlier one fails; the first error is returned.
#[derive(Default, Clone)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn EventSink>>) -> Self {
        debug!(sink_count = sinks.len(), "FanoutSink::new: called");
        Self { sinks }
    }

    pub fn push(&mut self, sink: Arc<dyn EventSink>) {
        self.sinks.push(sink);
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl EventSink for FanoutSink {
    fn record(&self, event: &PipelineEvent) -> Result<(), SinkError> {
        let mut first_error = None;
        for sink in &self.sinks {
            if let Err(e) = sink.record(event)
                && first_error.is_none()
            {
                first_error = Some(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
