//! GanttPilot - assistant core for a Gantt task planner
//!
//! CLI entry point for rendering, resolving and replaying conversations.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result};
use tracing::info;

use ganttpilot::chat::{ChatSession, Classification, ScriptedTransport, TurnOutcome, classify};
use ganttpilot::citation::{CitationRenderer, parse_citation};
use ganttpilot::cli::{Cli, Command, OutputFormat};
use ganttpilot::composer::MessagePayload;
use ganttpilot::config::Config;
use ganttpilot::registry::{ApplyOptions, ResultRegistry, StructuredTypes};
use ganttpilot::resolver::resolve_citation;
use ganttpilot::store::{MemoryTaskStore, TaskStore};

fn setup_logging(verbose: bool) -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ganttpilot")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Write to the log file, keep stdout for command output
    let level = if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    let log_file = fs::File::create(log_dir.join("ganttpilot.log")).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (verbose: {})", verbose);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;
    info!(
        "GanttPilot loaded config: trigger={}, structured types={}",
        config.composer.trigger,
        config.structured.types.len()
    );

    match cli.command {
        Some(Command::Render { file, format }) => cmd_render(&config, file.as_deref(), format),
        Some(Command::Resolve {
            tasks,
            citation,
            format,
        }) => cmd_resolve(&tasks, &citation, format),
        Some(Command::Replay {
            tasks,
            script,
            message,
            agent,
        }) => cmd_replay(&config, &tasks, &script, &message, &agent).await,
        None => {
            use clap::CommandFactory;
            Cli::command().print_help()?;
            println!();
            Ok(())
        }
    }
}

/// Classify and render one assistant message
fn cmd_render(config: &Config, file: Option<&Path>, format: OutputFormat) -> Result<()> {
    let content = match file {
        Some(path) => fs::read_to_string(path).context(format!("Failed to read {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read stdin")?;
            buf
        }
    };

    let renderer = CitationRenderer::new(&config.citation.chip_template)?;
    let registry = StructuredTypes::from_config(&config.structured);

    match (classify(&content, &registry), format) {
        (Classification::Structured(data), OutputFormat::Json) => {
            let json = serde_json::json!({ "kind": "structured", "data": data });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        (Classification::Structured(data), OutputFormat::Text) => {
            let options = ApplyOptions {
                can_apply: true,
                message_id: None,
            };
            println!("{}", registry.render_result(&data, &options));
        }
        (Classification::Markdown, OutputFormat::Json) => {
            let rendered = renderer.render_markdown(&content);
            let json = serde_json::json!({
                "kind": "markdown",
                "html": rendered.html,
                "citations": rendered.citations,
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        (Classification::Markdown, OutputFormat::Text) => {
            print!("{}", renderer.render_markdown(&content).html);
        }
    }
    Ok(())
}

/// Resolve a citation marker, bare hierarchy id or task name
fn cmd_resolve(tasks: &Path, citation: &str, format: OutputFormat) -> Result<()> {
    let store = MemoryTaskStore::load(tasks).context(format!("Failed to load tasks from {}", tasks.display()))?;
    let snapshot = store.all_tasks_with_hierarchy();

    let (hierarchy_id, name_hint) = split_citation_arg(citation);
    let Some(task) = resolve_citation(hierarchy_id.as_deref(), name_hint.as_deref(), &snapshot) else {
        return Err(eyre::eyre!("Task not found: {}", citation));
    };

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(task)?),
        OutputFormat::Text => println!(
            "{} {} {}",
            format!("#{}", task.hierarchy_id).cyan().bold(),
            task.text,
            format!("(id: {})", task.id).dimmed()
        ),
    }
    Ok(())
}

/// Split a CLI citation argument into hierarchy id and name hint
fn split_citation_arg(arg: &str) -> (Option<String>, Option<String>) {
    if let Some(citation) = parse_citation(arg) {
        return (Some(citation.hierarchy_id), citation.name_hint);
    }
    let bare = arg.trim().trim_start_matches('#');
    let is_hierarchy_id = !bare.is_empty()
        && bare.split('.').all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit()));
    if is_hierarchy_id {
        (Some(bare.to_string()), None)
    } else {
        (None, Some(arg.trim().to_string()))
    }
}

/// Run one turn through a session backed by a scripted transport
async fn cmd_replay(config: &Config, tasks: &Path, script: &Path, message: &str, agent: &str) -> Result<()> {
    let store = MemoryTaskStore::load(tasks).context(format!("Failed to load tasks from {}", tasks.display()))?;
    let transport =
        ScriptedTransport::load(script).context(format!("Failed to load script {}", script.display()))?;

    let mut session = ChatSession::new(config, Box::new(store), Arc::new(transport))?;
    session.select_agent(agent, None);
    session.send_message(MessagePayload::new(message))?;

    let outcome = session.run_turn().await;
    let usage = session.usage_totals();
    let json = serde_json::json!({
        "messages": session.history().messages(),
        "usage": usage,
    });
    println!("{}", serde_json::to_string_pretty(&json)?);

    if let Some(TurnOutcome::Failed(failure)) = outcome {
        eprintln!(
            "{} {} ({})",
            "Turn failed:".red().bold(),
            failure.category.user_message(),
            failure.error
        );
    } else {
        eprintln!(
            "{} prompt={} completion={} total={}",
            "Tokens".green(),
            usage.prompt_tokens,
            usage.completion_tokens,
            usage.total_tokens
        );
    }
    Ok(())
}
