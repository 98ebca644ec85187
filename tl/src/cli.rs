//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;

/// Default user id for conversations started from the CLI
pub const DEFAULT_USER: &str = "local";

/// Tripline - multi-stage LLM trip planner
#[derive(Parser)]
#[command(
    name = "tl",
    about = "Plan trips with a four-stage LLM pipeline (plan, research, execute, validate)",
    version = env!("CARGO_PKG_VERSION"),
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the pipeline for a travel request
    Plan {
        /// The travel request, e.g. "Plan a 3-day trip to Rome"
        query: String,

        /// Conversation to load history from and append the exchange to
        #[arg(long)]
        conversation: Option<String>,

        /// User owning the conversation
        #[arg(short, long, default_value = DEFAULT_USER)]
        user: String,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Show the stored turns of a conversation
    History {
        /// Conversation id
        conversation: String,

        /// User owning the conversation
        #[arg(short, long, default_value = DEFAULT_USER)]
        user: String,
    },

    /// Replay the event log of a run
    Events {
        /// Run id as printed by `tl plan`
        run_id: String,
    },
}

/// Output format for plan results
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        debug!(%s, "OutputFormat::from_str: called");
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => {
                debug!(%s, "OutputFormat::from_str: unknown format");
                Err(format!("Unknown format: {}. Use: text or json", s))
            }
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}

/// Location of the log file
pub fn get_log_path() -> PathBuf {
    let path = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tripline")
        .join("logs")
        .join("tripline.log");
    debug!(?path, "get_log_path: returning path");
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plan() {
        let cli = Cli::parse_from(["tl", "plan", "Plan a 3-day trip to Rome"]);
        match cli.command {
            Command::Plan {
                query,
                conversation,
                user,
                format,
            } => {
                assert_eq!(query, "Plan a 3-day trip to Rome");
                assert_eq!(conversation, None);
                assert_eq!(user, DEFAULT_USER);
                assert_eq!(format, OutputFormat::Text);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_plan_with_options() {
        let cli = Cli::parse_from([
            "tl",
            "--log-level",
            "debug",
            "plan",
            "Lisbon",
            "--conversation",
            "trip-1",
            "--user",
            "alice",
            "--format",
            "json",
        ]);
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert!(matches!(
            cli.command,
            Command::Plan { ref conversation, ref user, format: OutputFormat::Json, .. }
                if conversation.as_deref() == Some("trip-1") && user == "alice"
        ));
    }

    #[test]
    fn test_parse_history_and_events() {
        let cli = Cli::parse_from(["tl", "history", "trip-1"]);
        assert!(matches!(cli.command, Command::History { ref conversation, .. } if conversation == "trip-1"));

        let cli = Cli::parse_from(["tl", "-c", "/path/to/config.yml", "events", "0190-abc"]);
        assert_eq!(cli.config, Some(PathBuf::from("/path/to/config.yml")));
        assert!(matches!(cli.command, Command::Events { ref run_id } if run_id == "0190-abc"));
    }

    #[test]
    fn test_output_format_from_str() {
        assert!(matches!("text".parse::<OutputFormat>(), Ok(OutputFormat::Text)));
        assert!(matches!("JSON".parse::<OutputFormat>(), Ok(OutputFormat::Json)));
        assert!("table".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_missing_subcommand_is_an_error() {
        assert!(Cli::try_parse_from(["tl"]).is_err());
    }

    #[test]
    fn test_log_path() {
        assert!(get_log_path().ends_with("tripline/logs/tripline.log"));
    }
}
