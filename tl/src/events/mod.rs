//! Event system for live observability of pipeline runs
//!
//! Every lifecycle step of a run is recorded into an [`EventSink`]. The
//! orchestrator and the retry executor emit through a [`RunEmitter`], which
//! never lets a sink failure reach the pipeline.
//!
//! # Architecture
//!
//! ```text
//!   Orchestrator ──┐
//!                  ├──► RunEmitter ──► EventSink
//!   RetryExecutor ─┘                    │
//!                          ┌────────────┼─────────────┐
//!                          ▼            ▼             ▼
//!                      EventBus    TracingSink   RecordingSink
//!                          │
//!                          ▼
//!                     EventLogger (runs/{run_id}/events.jsonl)
//! ```
//!
//! # Event Kinds
//!
//! See [`EventKind`]: `RunStarted`, `StageStarted`, `StageCompleted`,
//! `RetryAttempted`, `StageFailed`, `RunCompleted`.

mod bus;
mod emitter;
mod logger;
mod sink;
mod types;

pub use bus::{DEFAULT_CHANNEL_CAPACITY, EventBus, create_event_bus};
pub use emitter::RunEmitter;
pub use logger::{EventLogger, read_run_events, run_log_path, spawn_event_logger};
pub use sink::{EventSink, FanoutSink, RecordingSink, SinkError, TracingSink};
pub use types::{EventKind, PipelineEvent};
