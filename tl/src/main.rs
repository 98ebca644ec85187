//! Tripline - multi-stage LLM trip planner
//!
//! CLI entry point: runs the planning pipeline and inspects stored
//! conversations and run event logs.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{CommandFactory, FromArgMatches};
use colored::Colorize;
use eyre::{Context, Result};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use tripline::cli::{Cli, Command, OutputFormat, get_log_path};
use tripline::config::Config;
use tripline::domain::Role;
use tripline::events::{
    EventBus, EventKind, EventSink, FanoutSink, PipelineEvent, TracingSink, create_event_bus, read_run_events,
    spawn_event_logger,
};
use tripline::llm::create_client;
use tripline::pipeline::{FinalItinerary, Orchestrator, PipelineError, PipelineSettings, RunContext};
use tripline::prompts::PromptLoader;
use tripline::store::{ConversationStore, JsonlStore};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Note: Can't log params here since logging isn't initialized yet
    let log_path = get_log_path();
    let log_dir = log_path.parent().map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."));
    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Determine log level with priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = fs::File::create(&log_path).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_arg_matches(&Cli::command().get_matches())?;

    // Load log level from config file early (before full config load)
    let config_log_level = Config::load_log_level(cli.config.as_ref());

    // Setup logging with priority: CLI > config > INFO default
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    info!(provider = %config.llm.provider, model = %config.llm.model, "Tripline loaded config");

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Plan {
            query,
            conversation,
            user,
            format,
        } => {
            debug!(?conversation, %user, %format, "main: matched Plan command");
            cmd_plan(&config, &query, conversation.as_deref(), &user, format).await
        }
        Command::History { conversation, user } => {
            debug!(%conversation, %user, "main: matched History command");
            cmd_history(&config, &conversation, &user).await
        }
        Command::Events { run_id } => {
            debug!(%run_id, "main: matched Events command");
            cmd_events(&config, &run_id)
        }
    }
}

/// Run the pipeline for one query
async fn cmd_plan(
    config: &Config,
    query: &str,
    conversation: Option<&str>,
    user: &str,
    format: OutputFormat,
) -> Result<()> {
    debug!(query_len = query.len(), ?conversation, %user, "cmd_plan: called");
    config.validate()?;

    let resolved = config.llm.resolve()?;
    let llm = create_client(&resolved, config.concurrency.max_api_calls).context("Failed to create LLM client")?;
    let prompts = Arc::new(PromptLoader::new(std::env::current_dir()?));

    let store = JsonlStore::new(config.storage.conversations_dir());
    let history = match conversation {
        Some(id) => store
            .load_history(user, id)
            .await
            .context("Failed to load conversation history")?,
        None => Vec::new(),
    };
    debug!(history_len = history.len(), "cmd_plan: history loaded");

    let bus = create_event_bus();
    let logger = spawn_event_logger(&bus, config.storage.runs_dir());
    let progress = (format == OutputFormat::Text).then(|| tokio::spawn(print_progress(bus.subscribe())));

    let sinks: Vec<Arc<dyn EventSink>> = vec![bus.clone(), Arc::new(TracingSink)];
    let sink: Arc<dyn EventSink> = Arc::new(FanoutSink::new(sinks));
    let ctx = RunContext::new(PipelineSettings::from_config(config), sink).context("Invalid retry configuration")?;
    let orchestrator = Orchestrator::new(ctx, llm, prompts);

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling run");
            ctrl_c.cancel();
        }
    });

    let outcome = orchestrator.run_with_cancel(query, history, cancel).await;

    // Dropping every bus handle lets the logger and progress printer drain and exit
    drop(orchestrator);
    shutdown_bus(bus, logger, progress).await;

    match outcome {
        Ok(result) => {
            if let Some(id) = conversation {
                store.append_message(user, id, Role::User, query).await?;
                store
                    .append_message(user, id, Role::Assistant, &result.final_itinerary)
                    .await?;
                debug!(%id, "cmd_plan: conversation updated");
            }
            print_result(&result, format)?;
            Ok(())
        }
        Err(err) => {
            print_failure(&err, format)?;
            std::process::exit(1);
        }
    }
}

async fn shutdown_bus(
    bus: Arc<EventBus>,
    logger: tokio::task::JoinHandle<()>,
    progress: Option<tokio::task::JoinHandle<()>>,
) {
    drop(bus);
    if let Err(e) = logger.await {
        warn!(error = %e, "Event logger task failed");
    }
    if let Some(handle) = progress
        && let Err(e) = handle.await
    {
        warn!(error = %e, "Progress task failed");
    }
}

/// Print stage progress to stderr while a run is going
async fn print_progress(mut rx: broadcast::Receiver<PipelineEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => print_progress_line(&event),
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn print_progress_line(event: &PipelineEvent) {
    let stage = event.stage.map(|s| s.to_string()).unwrap_or_default();
    match event.kind {
        EventKind::RunStarted => eprintln!("{} run {}", "▶".cyan(), event.run_id.dimmed()),
        EventKind::StageStarted => eprintln!("  {} {}...", "•".cyan(), stage),
        EventKind::StageCompleted => eprintln!(
            "  {} {} ({} ms)",
            "✓".green(),
            stage,
            event.payload.get("duration_ms").and_then(|v| v.as_u64()).unwrap_or(0)
        ),
        EventKind::RetryAttempted => eprintln!(
            "  {} {} attempt {} failed ({}), retrying in {} ms",
            "⚠".yellow(),
            stage,
            event.payload.get("attempt").and_then(|v| v.as_u64()).unwrap_or(0),
            event.payload.get("error_kind").and_then(|v| v.as_str()).unwrap_or("unknown"),
            event.payload.get("delay_ms").and_then(|v| v.as_u64()).unwrap_or(0)
        ),
        EventKind::StageFailed => eprintln!("  {} {} failed", "✗".red(), stage),
        EventKind::RunCompleted => {}
    }
}

fn print_result(result: &FinalItinerary, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(result)?),
        OutputFormat::Text => {
            print_section("Plan", &result.plan);
            print_section("Research", &result.research_results);
            print_section("Itinerary", &result.final_itinerary);
            print_section("Validation", &result.validation);
            println!("{} {}", "Run:".dimmed(), result.run_id.dimmed());
        }
    }
    Ok(())
}

fn print_section(title: &str, body: &str) {
    println!("{}", format!("== {} ==", title).bold().cyan());
    println!("{}\n", body);
}

fn print_failure(err: &PipelineError, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let report = serde_json::json!({
                "status": "failed",
                "run_id": err.state.run_id(),
                "stage": err.stage,
                "kind": err.kind(),
                "attempts": err.attempts(),
                "message": err.error.message,
                "state": err.state,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Text => {
            eprintln!(
                "{} {} failed: {} after {} attempt(s)",
                "✗".red(),
                err.stage.to_string().bold(),
                err.kind(),
                err.attempts()
            );
            eprintln!("  {}", err.error.message);
            if let Some(plan) = err.state.plan() {
                print_section("Plan (partial)", plan);
            }
            eprintln!("{} {}", "Run:".dimmed(), err.state.run_id().dimmed());
        }
    }
    Ok(())
}

/// Print the stored turns of a conversation
async fn cmd_history(config: &Config, conversation: &str, user: &str) -> Result<()> {
    debug!(%conversation, %user, "cmd_history: called");
    let store = JsonlStore::new(config.storage.conversations_dir());
    let messages = store.load_messages(user, conversation).await?;

    if messages.is_empty() {
        println!("No messages in conversation '{}'", conversation);
        return Ok(());
    }
    for message in messages {
        println!(
            "{} {}",
            message.timestamp.format("%Y-%m-%d %H:%M:%S").to_string().dimmed(),
            message.role.to_string().bold()
        );
        println!("{}\n", message.content);
    }
    Ok(())
}

/// Replay a run's event log
fn cmd_events(config: &Config, run_id: &str) -> Result<()> {
    debug!(%run_id, "cmd_events: called");
    let events = read_run_events(config.storage.runs_dir(), run_id)?;

    if events.is_empty() {
        println!("No events found for run {}", run_id);
        return Ok(());
    }
    for event in events {
        println!(
            "{} {}",
            event.timestamp.format("%H:%M:%S%.3f").to_string().dimmed(),
            event.summary()
        );
    }
    Ok(())
}
