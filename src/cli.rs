//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// GanttPilot - assistant core for a Gantt task planner
#[derive(Parser)]
#[command(
    name = "gp",
    about = "Render, resolve and replay GanttPilot assistant conversations",
    version = env!("CARGO_PKG_VERSION"),
    after_help = "Logs are written to: ~/.local/share/ganttpilot/logs/ganttpilot.log"
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands
#[derive(Subcommand)]
pub enum Command {
    /// Classify and render assistant output (reads stdin without FILE)
    Render {
        /// File holding the assistant message
        file: Option<PathBuf>,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Resolve a citation against a task file
    Resolve {
        /// Task file (YAML, or JSON with a .json extension)
        #[arg(short, long)]
        tasks: PathBuf,

        /// Citation marker like "[#1.2 Build API]", a hierarchy id, or a task name
        citation: String,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Run one chat turn against a recorded JSONL event script
    Replay {
        /// Task file (YAML, or JSON with a .json extension)
        #[arg(short, long)]
        tasks: PathBuf,

        /// JSONL stream event script
        script: PathBuf,

        /// User message to send
        #[arg(short, long, default_value = "Hello")]
        message: String,

        /// Agent to bind the chat to
        #[arg(short, long, default_value = "assistant")]
        agent: String,
    },
}

/// Output format for render/resolve
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "plain" | "html" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown format: {}. Use: text or json", s)),
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
