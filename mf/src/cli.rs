//! CLI command definitions, subcommands and the interactive gate driver

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::engine::Engine;
use crate::gate::{GateError, GateKind};
use crate::stages::Stage;

/// ModelFlow - LLM workflows from requirements to UML models
#[derive(Parser)]
#[command(
    name = "mf",
    about = "Human-in-the-loop LLM workflows from requirements to use case and activity models",
    version
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
    pub command: Option<Command>,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the modeling pipeline interactively
    Run {
        /// Input text for the first stage (a description, diagram or scenarios)
        input: Option<String>,

        /// Read the input text from a file
        #[arg(short, long, conflicts_with = "input")]
        file: Option<PathBuf>,

        /// Stage to start from (ucd, sad, adm)
        #[arg(short, long)]
        start: Option<Stage>,

        /// Last stage to run (ucd, sad, adm)
        #[arg(short, long)]
        end: Option<Stage>,

        /// Continue to the next stage without asking
        #[arg(long)]
        no_confirm: bool,
    },

    /// List the pipeline stages
    Stages,

    /// List recorded runs, newest first
    Runs,

    /// Show the node visits and LLM calls of a recorded run
    Trace {
        /// Run id as printed by `mf runs`
        run_id: String,
    },

    /// Show log output
    Logs {
        /// Number of lines to show
        #[arg(short, long, default_value = "50")]
        lines: usize,
    },
}

/// Get the log file path
pub fn get_log_path() -> PathBuf {
    debug!("get_log_path: called");
    let path = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("modelflow")
        .join("logs")
        .join("modelflow.log");
    debug!(?path, "get_log_path: returning path");
    path
}

/// Generate the after_help text with the stage list and log location
pub fn generate_after_help() -> String {
    debug!("generate_after_help: called");
    let mut help = String::new();

    help.push_str("Stages:\n");
    for stage in Stage::all() {
        help.push_str(&format!("  {:<5} {}\n", stage.code(), stage.title()));
    }

    help.push('\n');
    help.push_str(&format!("Logs are written to: {}\n", get_log_path().display()));
    help
}

/// Where the human's gate decisions come from
#[async_trait]
pub trait DecisionSource: Send {
    /// Show a request and read the reply
    ///
    /// `request` is empty for selection gates. `Ok(None)` abandons the run.
    async fn ask(&mut self, kind: GateKind, request: &str) -> eyre::Result<Option<String>>;

    /// A reply arrived after its request was withdrawn
    fn decision_dropped(&mut self, _kind: GateKind, _error: &GateError) {}
}

/// Answer the engine's gate requests from `source` until the request streams close
///
/// A source that gives up or fails resets the engine, so the blocked run
/// ends as cancelled instead of waiting on a request nobody will answer.
pub async fn drive_gates(engine: Arc<Engine>, mut source: impl DecisionSource) -> Result<(), GateError> {
    debug!("drive_gates: called");
    let gates = engine.gates();
    let mut clarifications = gates.clarification.observe_requests()?;
    let mut acceptances = gates.acceptance.observe_requests()?;
    let mut selections = gates.selection.observe_requests()?;

    loop {
        let (kind, request) = tokio::select! {
            Some(request) = clarifications.next() => (GateKind::Clarification, request.payload),
            Some(request) = acceptances.next() => (GateKind::Acceptance, request.payload),
            Some(_) = selections.next() => (GateKind::Selection, String::new()),
            else => break,
        };

        let reply = match source.ask(kind, &request).await {
            Ok(Some(reply)) => reply,
            Ok(None) => {
                info!(%kind, "drive_gates: no decision given, resetting");
                engine.reset();
                continue;
            }
            Err(e) => {
                warn!(%kind, error = %e, "drive_gates: failed to read decision, resetting");
                engine.reset();
                continue;
            }
        };

        let submitted = match kind {
            GateKind::Clarification => gates.clarification.submit_decision(reply),
            GateKind::Acceptance => gates.acceptance.submit_decision(reply),
            GateKind::Selection => gates.selection.submit_decision(()),
        };
        if let Err(e) = submitted {
            warn!(%kind, error = %e, "drive_gates: decision not delivered");
            source.decision_dropped(kind, &e);
        }
    }
    debug!("drive_gates: request streams closed");
    Ok(())
}
