//! JSONL event log, one file per run
//!
//! [`EventLogger`] subscribes to the [`EventBus`] and appends every event to
//! `{runs_dir}/{run_id}/events.jsonl`. A run's file is closed as soon as its
//! `RunCompleted` event is on disk, so a long-lived bus serving many runs only
//! holds files for runs still in flight. `tl events` replays a log with
//! [`read_run_events`].

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use super::bus::EventBus;
use super::sink::SinkError;
use super::types::{EventKind, PipelineEvent};
use crate::store::validate_key;

const EVENTS_FILE: &str = "events.jsonl";

/// Path of a run's event log
///
/// Run ids become directory names, so anything that could escape `runs_dir`
/// is rejected.
pub fn run_log_path(runs_dir: &Path, run_id: &str) -> Result<PathBuf, SinkError> {
    validate_key("run id", run_id).map_err(|_| SinkError::InvalidRunId(run_id.to_string()))?;
    Ok(runs_dir.join(run_id).join(EVENTS_FILE))
}

/// Log file of a run that has not completed yet
struct RunLog {
    writer: BufWriter<File>,
    written: usize,
}

impl RunLog {
    fn open(path: &Path) -> Result<Self, SinkError> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        debug!(?path, "RunLog::open: opening log file");
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            written: 0,
        })
    }

    fn append(&mut self, event: &PipelineEvent) -> Result<(), SinkError> {
        serde_json::to_writer(&mut self.writer, event)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        self.written += 1;
        Ok(())
    }
}

/// Bus subscriber persisting events per run
pub struct EventLogger {
    runs_dir: PathBuf,
    open: HashMap<String, RunLog>,
}

impl EventLogger {
    pub fn new(runs_dir: impl AsRef<Path>) -> Self {
        let runs_dir = runs_dir.as_ref().to_path_buf();
        debug!(?runs_dir, "EventLogger::new: called");
        Self {
            runs_dir,
            open: HashMap::new(),
        }
    }

    /// Runs with an open log file
    pub fn open_runs(&self) -> usize {
        self.open.len()
    }

    /// Append an event to its run's log, closing the log on `RunCompleted`
    pub fn write_event(&mut self, event: &PipelineEvent) -> Result<(), SinkError> {
        debug!(run_id = %event.run_id, kind = event.event_type(), "EventLogger::write_event: called");
        let log = match self.open.entry(event.run_id.clone()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let path = run_log_path(&self.runs_dir, entry.key())?;
                entry.insert(RunLog::open(&path)?)
            }
        };
        log.append(event)?;

        if event.kind == EventKind::RunCompleted {
            let status = event.payload.get("status").and_then(|v| v.as_str()).unwrap_or("unknown");
            if let Some(written) = self.close_run(&event.run_id) {
                info!(run_id = %event.run_id, %status, events = written, "Run event log closed");
            }
        }
        Ok(())
    }

    /// Flush and drop a run's writer, returning how many events it wrote
    pub fn close_run(&mut self, run_id: &str) -> Option<usize> {
        let mut log = self.open.remove(run_id)?;
        if let Err(e) = log.writer.flush() {
            warn!(%run_id, error = %e, "EventLogger::close_run: flush failed");
        }
        Some(log.written)
    }

    /// Consume events from the bus until every sender is gone
    pub async fn run(mut self, mut rx: broadcast::Receiver<PipelineEvent>) {
        debug!("EventLogger::run: called");
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Err(e) = self.write_event(&event) {
                        error!(run_id = %event.run_id, error = %e, "Failed to persist event");
                    }
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, open_runs = self.open_runs(), "Event logger lagged, events lost");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }

        let unfinished: Vec<String> = self.open.keys().cloned().collect();
        for run_id in unfinished {
            debug!(%run_id, "EventLogger::run: closing unfinished run");
            self.close_run(&run_id);
        }
    }
}

/// Replay a run's event log, skipping lines that do not parse
///
/// A run without a log yields an empty list.
pub fn read_run_events(runs_dir: impl AsRef<Path>, run_id: &str) -> Result<Vec<PipelineEvent>, SinkError> {
    let path = run_log_path(runs_dir.as_ref(), run_id)?;
    debug!(?path, "read_run_events: called");
    if !path.exists() {
        return Ok(Vec::new());
    }

    let events: Vec<PipelineEvent> = fs::read_to_string(&path)?
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match serde_json::from_str(line) {
            Ok(event) => Some(event),
            Err(e) => {
                warn!(%run_id, error = %e, "Skipping unreadable event line");
                None
            }
        })
        .collect();
    debug!(count = events.len(), "read_run_events: loaded");
    Ok(events)
}

/// Spawn an [`EventLogger`] on the bus
///
/// The subscription is taken before this returns, so no event recorded after
/// the call is missed.
pub fn spawn_event_logger(event_bus: &Arc<EventBus>, runs_dir: impl AsRef<Path>) -> tokio::task::JoinHandle<()> {
    let logger = EventLogger::new(runs_dir);
    let rx = event_bus.subscribe();
    tokio::spawn(logger.run(rx))
}
