//! Integration tests for Tripline
//!
//! These drive the public pipeline API end to end with a scripted LLM client.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;

use tripline::events::{EventKind, RecordingSink, create_event_bus, read_run_events, spawn_event_logger};
use tripline::llm::{ErrorKind, GenerationOptions, LlmClient, LlmError};
use tripline::pipeline::{Orchestrator, PipelineSettings, RunContext, RunStatus, StageName};
use tripline::prompts::PromptLoader;
use tripline::retry::RetryPolicy;
use tripline::store::{ConversationStore, MemoryStore};
use tripline::{Role, Turn};

// =============================================================================
// Scripted client
// =============================================================================

/// Which template a prompt was rendered from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Call {
    Plan,
    Tasks,
    Research,
    Execute,
    Validate,
}

fn classify(prompt: &str) -> Call {
    if prompt.contains("list the concrete research tasks") {
        Call::Tasks
    } else if prompt.contains("meticulous travel researcher") {
        Call::Research
    } else if prompt.contains("turn travel plans into itineraries") {
        Call::Execute
    } else if prompt.contains("You review travel itineraries") {
        Call::Validate
    } else {
        Call::Plan
    }
}

const CITIES: [&str; 3] = ["Rome", "Lisbon", "Kyoto"];

/// Answers each call from the city named in the prompt, optionally failing one call type
struct ScriptedClient {
    fail: Option<(Call, LlmError)>,
    calls: Mutex<Vec<Call>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedClient {
    fn new() -> Self {
        Self {
            fail: None,
            calls: Mutex::new(Vec::new()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    fn failing(call: Call, error: LlmError) -> Self {
        Self {
            fail: Some((call, error)),
            ..Self::new()
        }
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmClient for ScriptedClient {
    async fn invoke(&self, prompt: &str, _options: &GenerationOptions) -> Result<String, LlmError> {
        let call = classify(prompt);
        self.calls.lock().unwrap().push(call);
        self.prompts.lock().unwrap().push(prompt.to_string());

        // Yield so concurrent runs interleave
        tokio::task::yield_now().await;

        if let Some((failing, error)) = &self.fail
            && *failing == call
        {
            return Err(error.clone());
        }

        let city = CITIES.iter().find(|c| prompt.contains(*c)).copied().unwrap_or("Nowhere");
        Ok(match call {
            Call::Plan => format!("Plan: three days in {}", city),
            Call::Tasks => format!("- Research hotels in {}\n- Research food in {}", city, city),
            Call::Research => format!("Research: hotels and food in {}", city),
            Call::Execute => format!("Itinerary: day by day in {}", city),
            Call::Validate => format!("Validation: {} plan looks good", city),
        })
    }

    fn model(&self) -> &str {
        "scripted"
    }
}

fn settings() -> PipelineSettings {
    PipelineSettings {
        retry: RetryPolicy {
            jitter_fraction: 0.0,
            ..RetryPolicy::default()
        },
        ..PipelineSettings::default()
    }
}

fn orchestrator(llm: Arc<ScriptedClient>, sink: Arc<RecordingSink>) -> Orchestrator {
    let ctx = RunContext::new(settings(), sink).expect("valid settings");
    Orchestrator::new(ctx, llm, Arc::new(PromptLoader::embedded_only()))
}

// =============================================================================
// Pipeline Tests
// =============================================================================

#[tokio::test]
async fn test_rome_trip_completes() {
    let llm = Arc::new(ScriptedClient::new());
    let sink = Arc::new(RecordingSink::new());

    let result = orchestrator(llm.clone(), sink.clone())
        .run("Plan a 3-day trip to Rome", vec![])
        .await
        .expect("run should complete");

    assert_eq!(result.status, RunStatus::Completed);
    assert!(!result.plan.is_empty());
    assert!(!result.research_results.is_empty());
    assert!(!result.final_itinerary.is_empty());
    assert!(!result.validation.is_empty());
    assert_eq!(result.research_tasks, vec!["Research hotels in Rome", "Research food in Rome"]);
    assert_eq!(
        llm.calls(),
        vec![Call::Plan, Call::Tasks, Call::Research, Call::Execute, Call::Validate]
    );

    let started: Vec<StageName> = sink
        .of_kind(EventKind::StageStarted)
        .iter()
        .filter_map(|e| e.stage)
        .collect();
    assert_eq!(started, StageName::ALL.to_vec());
    assert_eq!(sink.kinds().first(), Some(&EventKind::RunStarted));
    assert_eq!(sink.kinds().last(), Some(&EventKind::RunCompleted));
}

#[tokio::test]
async fn test_researcher_failure_stops_pipeline() {
    let llm = Arc::new(ScriptedClient::failing(
        Call::Research,
        LlmError::Fatal("API key rejected".to_string()),
    ));
    let sink = Arc::new(RecordingSink::new());

    let err = orchestrator(llm.clone(), sink.clone())
        .run("Plan a 3-day trip to Rome", vec![])
        .await
        .expect_err("run should fail");

    assert_eq!(err.stage, StageName::Researcher);
    assert_eq!(err.kind(), ErrorKind::Fatal);
    assert_eq!(err.attempts(), 1);
    assert_eq!(err.state.status(), RunStatus::Failed);
    assert!(err.state.plan().is_some());
    assert!(err.state.research_results().is_none());
    assert!(err.state.final_itinerary().is_none());
    assert!(err.state.validation().is_none());
    assert_eq!(err.state.errors().len(), 1);

    // Nothing downstream of the failure was invoked
    let calls = llm.calls();
    assert!(!calls.contains(&Call::Execute));
    assert!(!calls.contains(&Call::Validate));
    assert!(
        sink.of_kind(EventKind::StageStarted)
            .iter()
            .all(|e| e.stage != Some(StageName::Executor))
    );
}

#[tokio::test(start_paused = true)]
async fn test_rate_limited_researcher_exhausts_retries() {
    let llm = Arc::new(ScriptedClient::failing(
        Call::Research,
        LlmError::RateLimited("quota exceeded".to_string()),
    ));
    let sink = Arc::new(RecordingSink::new());

    let err = orchestrator(llm.clone(), sink.clone())
        .run("Plan a 3-day trip to Rome", vec![])
        .await
        .expect_err("run should fail");

    assert_eq!(err.stage, StageName::Researcher);
    assert_eq!(err.kind(), ErrorKind::RateLimited);
    assert_eq!(err.attempts(), 4);
    assert_eq!(llm.calls().iter().filter(|c| **c == Call::Research).count(), 4);

    let delays: Vec<u64> = sink
        .of_kind(EventKind::RetryAttempted)
        .iter()
        .map(|e| e.payload["delay_ms"].as_u64().unwrap())
        .collect();
    assert_eq!(delays, vec![2000, 4000, 8000]);
}

#[tokio::test]
async fn test_concurrent_runs_are_isolated() {
    let llm = Arc::new(ScriptedClient::new());
    let sink = Arc::new(RecordingSink::new());
    let orchestrator = Arc::new(orchestrator(llm, sink.clone()));

    let runs = CITIES.iter().map(|city| {
        let orchestrator = orchestrator.clone();
        let query = format!("Plan a weekend in {}", city);
        async move { orchestrator.run(query, vec![]).await }
    });
    let results = futures::future::join_all(runs).await;

    let mut run_ids = Vec::new();
    for (city, result) in CITIES.iter().zip(results) {
        let result = result.expect("run should complete");
        assert!(result.final_itinerary.contains(city));
        for other in CITIES.iter().filter(|c| *c != city) {
            assert!(!result.plan.contains(other));
            assert!(!result.final_itinerary.contains(other));
            assert!(!result.validation.contains(other));
        }
        run_ids.push(result.run_id);
    }
    run_ids.sort();
    run_ids.dedup();
    assert_eq!(run_ids.len(), CITIES.len());
    assert_eq!(sink.of_kind(EventKind::RunCompleted).len(), CITIES.len());
}

#[tokio::test]
async fn test_history_from_store_reaches_planner() {
    let store = MemoryStore::new();
    store
        .append_message("alice", "trip", Role::User, "I travel with a toddler")
        .await
        .unwrap();
    store
        .append_message("alice", "trip", Role::Assistant, "Noted, short walks only.")
        .await
        .unwrap();
    let history = store.load_history("alice", "trip").await.unwrap();
    assert_eq!(history[0], Turn::user("I travel with a toddler"));

    let llm = Arc::new(ScriptedClient::new());
    orchestrator(llm.clone(), Arc::new(RecordingSink::new()))
        .run("Plan a 3-day trip to Rome", history)
        .await
        .expect("run should complete");

    let plan_prompt = llm.prompts.lock().unwrap()[0].clone();
    assert!(plan_prompt.contains("user: I travel with a toddler"));
    assert!(plan_prompt.contains("assistant: Noted, short walks only."));
}

#[tokio::test]
async fn test_event_log_persists_run() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let bus = create_event_bus();
    let logger = spawn_event_logger(&bus, temp_dir.path());

    let ctx = RunContext::new(settings(), bus.clone()).expect("valid settings");
    let orchestrator = Orchestrator::new(
        ctx,
        Arc::new(ScriptedClient::new()),
        Arc::new(PromptLoader::embedded_only()),
    );
    let result = orchestrator.run("Plan a 3-day trip to Rome", vec![]).await.unwrap();

    drop(orchestrator);
    drop(bus);
    logger.await.unwrap();

    let events = read_run_events(temp_dir.path(), &result.run_id).unwrap();
    assert_eq!(events.first().map(|e| e.kind), Some(EventKind::RunStarted));
    assert_eq!(events.last().map(|e| e.kind), Some(EventKind::RunCompleted));
    assert_eq!(events.iter().filter(|e| e.kind == EventKind::StageCompleted).count(), 4);
}
