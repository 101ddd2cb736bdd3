//! ModelFlow - requirements to UML models with a human in the loop
//!
//! CLI entry point: runs the pipeline in the terminal and answers its gates
//! through readline prompts.

use std::fs;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use clap::{CommandFactory, FromArgMatches};
use colored::Colorize;
use eyre::{Context, Result};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use modelflow::cli::{Cli, Command, DecisionSource, drive_gates, generate_after_help, get_log_path};
use modelflow::config::Config;
use modelflow::engine::Engine;
use modelflow::events::{EventBus, FlowEvent, create_event_bus, list_runs, read_run_events, spawn_event_logger};
use modelflow::gate::{GateError, GateKind};
use modelflow::llm::Credentials;
use modelflow::prompts::PromptLoader;
use modelflow::render::PlantUmlServerRenderer;
use modelflow::stages::Stage;
use modelflow::tracker::WorkflowExecution;

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Note: Can't log params here since logging isn't initialized yet
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("modelflow")
        .join("logs");

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

    let log_file = fs::File::create(log_dir.join("modelflow.log")).context("Failed to create log file")?;

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
    let cmd = Cli::command().after_help(generate_after_help());
    let cli = Cli::from_arg_matches(&cmd.get_matches())?;

    let config_log_level = Config::load_log_level(cli.config.as_ref());
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    info!(provider = %config.llm.provider, "ModelFlow loaded config");

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Some(Command::Run {
            input,
            file,
            start,
            end,
            no_confirm,
        }) => cmd_run(config, input, file, start, end, no_confirm).await,
        Some(Command::Stages) => cmd_stages(),
        Some(Command::Runs) => cmd_runs(&config),
        Some(Command::Trace { run_id }) => cmd_trace(&config, &run_id),
        Some(Command::Logs { lines }) => cmd_logs(lines),
        None => {
            Cli::command().after_help(generate_after_help()).print_help()?;
            Ok(())
        }
    }
}

// === Run ===

/// Run the pipeline interactively
async fn cmd_run(
    mut config: Config,
    input: Option<String>,
    file: Option<PathBuf>,
    start: Option<Stage>,
    end: Option<Stage>,
    no_confirm: bool,
) -> Result<()> {
    debug!(?start, ?end, no_confirm, "cmd_run: called");
    if let Some(start) = start {
        config.workflow.start_stage = start;
    }
    if let Some(end) = end {
        config.workflow.end_stage = end;
    }
    if no_confirm {
        config.workflow.confirm_between_stages = false;
    }
    config.validate()?;
    let start = config.workflow.start_stage;

    let input = match (input, file) {
        (Some(text), _) => text,
        (None, Some(path)) => fs::read_to_string(&path).context(format!("Failed to read {}", path.display()))?,
        (None, None) => {
            println!("{} {}", "Input for".bright_cyan(), start.title().bright_cyan().bold());
            read_line(format!("{} ", ">".bright_green()))
                .await?
                .ok_or_else(|| eyre::eyre!("No input given"))?
        }
    };
    if input.trim().is_empty() {
        return Err(eyre::eyre!("Input text is empty"));
    }

    let renderer = PlantUmlServerRenderer::from_config(&config.renderer)?;
    let runs_dir = config.runs_dir();
    let bus = create_event_bus();
    let logger = spawn_event_logger(&bus, &runs_dir)?;
    let progress = tokio::spawn(print_progress(Arc::clone(&bus)));

    let engine = Arc::new(
        Engine::new(config, Arc::new(renderer))
            .with_event_bus(Arc::clone(&bus))
            .with_prompts(PromptLoader::new(std::env::current_dir()?)),
    );
    engine.initialize(&Credentials::from_env(), start)?;

    let gates = tokio::spawn(drive_gates(Arc::clone(&engine), TerminalPrompt));
    let interrupt = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                println!("^C");
                engine.reset();
            }
        })
    };

    let result = engine.run(&input).await;

    gates.abort();
    interrupt.abort();
    progress.abort();
    drop(engine);
    drop(bus);
    // the logger stops once every emitter is gone
    if tokio::time::timeout(Duration::from_secs(2), logger).await.is_err() {
        warn!("cmd_run: event logger did not finish in time");
    }

    match result {
        Ok(output) => {
            println!();
            println!("{}", "Result".bright_green().bold());
            println!("{}", output);
            println!();
            println!("Run events written to: {}", runs_dir.display());
            Ok(())
        }
        Err(e) if e.is_cancelled() => {
            println!("{}", "Run cancelled".yellow());
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Read one line in a blocking task; `None` on Ctrl+C or Ctrl+D
async fn read_line(prompt: String) -> Result<Option<String>> {
    tokio::task::spawn_blocking(move || {
        let mut rl = DefaultEditor::new().map_err(|e| eyre::eyre!("Failed to initialize readline: {}", e))?;
        match rl.readline(&prompt) {
            Ok(line) => Ok(Some(line)),
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => Ok(None),
            Err(err) => Err(eyre::eyre!("Readline error: {}", err)),
        }
    })
    .await?
}

/// Reads gate decisions at the terminal
struct TerminalPrompt;

#[async_trait]
impl DecisionSource for TerminalPrompt {
    async fn ask(&mut self, kind: GateKind, request: &str) -> Result<Option<String>> {
        println!();
        let prompt = match kind {
            GateKind::Clarification => {
                println!("{}", "The model asks:".bright_yellow().bold());
                println!("{}", request);
                format!("{} ", "answer>".bright_green())
            }
            GateKind::Acceptance => {
                println!("{}", "Review:".bright_cyan().bold());
                println!("{}", request);
                format!("{} ", "review>".bright_green())
            }
            GateKind::Selection => format!("{} ", "Press Enter to continue to the next stage".bright_cyan()),
        };
        read_line(prompt).await
    }

    fn decision_dropped(&mut self, _kind: GateKind, error: &GateError) {
        println!("{} {}", "Decision dropped:".red(), error);
    }
}

/// Print node visits as they happen
async fn print_progress(bus: Arc<EventBus>) {
    let mut rx = bus.subscribe();
    drop(bus);
    loop {
        match rx.recv().await {
            Ok(FlowEvent::NodeVisited {
                node_id,
                occurrence,
                name,
                ..
            }) => {
                let repeat = if occurrence > 0 {
                    format!(" (#{})", occurrence + 1)
                } else {
                    String::new()
                };
                println!("{} {}{} {}", "→".bright_blue(), name, repeat, node_id.dimmed());
            }
            Ok(FlowEvent::LlmCallFailed { error, .. }) => {
                println!("{} {}", "LLM call failed:".red(), error);
            }
            Ok(_) => {}
            Err(RecvError::Lagged(n)) => debug!(n, "print_progress: lagged"),
            Err(RecvError::Closed) => break,
        }
    }
}

// === Inspection ===

/// List the pipeline stages
fn cmd_stages() -> Result<()> {
    debug!("cmd_stages: called");
    for stage in Stage::all() {
        println!("{:<5} {}", stage.code().bright_cyan(), stage.title());
    }
    Ok(())
}

/// List recorded runs
fn cmd_runs(config: &Config) -> Result<()> {
    debug!("cmd_runs: called");
    let runs = list_runs(config.runs_dir())?;
    if runs.is_empty() {
        println!("No runs recorded in {}", config.runs_dir().display());
    }
    for run in runs {
        println!("{}", run);
    }
    Ok(())
}

/// Print the execution log of a recorded run
fn cmd_trace(config: &Config, run_id: &str) -> Result<()> {
    debug!(%run_id, "cmd_trace: called");
    let entries = read_run_events(config.runs_dir(), run_id)?;
    if entries.is_empty() {
        return Err(eyre::eyre!("No events recorded for run {}", run_id));
    }
    let execution = WorkflowExecution::replay(&entries);

    for visit in execution.nodes() {
        println!(
            "{} {} {}",
            visit.visited_at.format("%H:%M:%S").to_string().dimmed(),
            visit.name.bright_cyan(),
            visit.id.to_string().dimmed()
        );
        for call in &visit.llm_calls {
            let outcome = match (&call.response, &call.error) {
                (Some(response), _) => format!("{} chars", response.len()).green(),
                (None, Some(error)) => error.as_str().red(),
                (None, None) => "no response".yellow(),
            };
            println!(
                "    LLM call: {} system, {} user messages -> {}",
                call.system_messages.len(),
                call.user_messages.len(),
                outcome
            );
        }
    }
    println!();
    println!("{} visits, {} transitions", execution.nodes().len(), execution.edges().len());
    Ok(())
}

/// Show the last lines of the log file
fn cmd_logs(lines: usize) -> Result<()> {
    debug!(lines, "cmd_logs: called");
    let log_path = get_log_path();

    if !log_path.exists() {
        println!("No log file found at: {}", log_path.display());
        return Ok(());
    }

    let file = fs::File::open(&log_path).context("Failed to open log file")?;
    let all_lines: Vec<String> = BufReader::new(file).lines().map_while(Result::ok).collect();
    let start = all_lines.len().saturating_sub(lines);
    for line in &all_lines[start..] {
        println!("{}", line);
    }
    Ok(())
}
