//! Explicit run context threaded into the orchestrator and stages

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::config::Config;
use crate::events::EventSink;
use crate::llm::DEFAULT_TEMPERATURE;
use crate::retry::{PolicyError, RetryPolicy};

/// Settings shared by every run of an orchestrator
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    pub retry: RetryPolicy,
    /// Upper bound on one run; `None` means unbounded
    pub run_timeout: Option<Duration>,
    /// Most recent history turns the planner sees
    pub history_window: usize,
    pub temperature: f32,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            run_timeout: Some(Duration::from_secs(600)),
            history_window: 5,
            temperature: DEFAULT_TEMPERATURE,
        }
    }
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            retry: config.retry.to_policy(),
            run_timeout: config.pipeline.run_timeout(),
            history_window: config.pipeline.history_window,
            temperature: config.pipeline.temperature,
        }
    }
}

/// Configuration plus event sink for a pipeline
#[derive(Clone)]
pub struct RunContext {
    pub settings: PipelineSettings,
    pub sink: Arc<dyn EventSink>,
}

impl RunContext {
    /// Build a context, rejecting an invalid retry policy
    pub fn new(settings: PipelineSettings, sink: Arc<dyn EventSink>) -> Result<Self, PolicyError> {
        debug!(?settings, "RunContext::new: called");
        settings.retry.validate()?;
        Ok(Self { settings, sink })
    }
}
