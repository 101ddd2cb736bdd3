//! Workflow engine: the object a UI or test drives
//!
//! One engine runs at most one workflow at a time. It owns the gates and the
//! execution tracker the UI observes, and keeps its configuration across
//! [`Engine::reset`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cancel::CancelToken;
use crate::config::Config;
use crate::events::EventBus;
use crate::gate::Gates;
use crate::graph::{self, Graph, GraphError, RunContext, WorkflowError};
use crate::llm::{Credentials, LlmClient, LlmError, create_client};
use crate::pipeline::{PipelineOptions, build_pipeline};
use crate::prompts::PromptLoader;
use crate::render::DiagramRenderer;
use crate::stages::Stage;
use crate::tracker::{ExecutionTracker, WorkflowExecution};

/// Errors returned by [`Engine`] operations
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine is not initialized; call initialize first")]
    NotInitialized,

    #[error("a workflow run is already in progress")]
    Busy,

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("invalid workflow graph: {0}")]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Workflow(#[from] WorkflowError),
}

impl EngineError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, EngineError::Workflow(e) if e.is_cancelled())
    }
}

/// What `initialize` produced: the client and the graph for one start stage
#[derive(Clone)]
struct Session {
    llm: Arc<dyn LlmClient>,
    graph: Graph<String, String>,
    options: PipelineOptions,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Runs the modeling pipeline with human-in-the-loop gates
pub struct Engine {
    config: Config,
    renderer: Arc<dyn DiagramRenderer>,
    prompts: Arc<PromptLoader>,
    gates: Arc<Gates>,
    tracker: Arc<ExecutionTracker>,
    events: Option<Arc<EventBus>>,
    processing: watch::Sender<bool>,
    session: Mutex<Option<Session>>,
    active: Mutex<Option<CancelToken>>,
    run_lock: tokio::sync::Mutex<()>,
}

impl Engine {
    pub fn new(config: Config, renderer: Arc<dyn DiagramRenderer>) -> Self {
        debug!("Engine::new: called");
        let (processing, _) = watch::channel(false);
        Self {
            config,
            renderer,
            prompts: Arc::new(PromptLoader::embedded_only()),
            gates: Arc::new(Gates::new()),
            tracker: Arc::new(ExecutionTracker::new()),
            events: None,
            processing,
            session: Mutex::new(None),
            active: Mutex::new(None),
            run_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Publish run events on `bus`
    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.events = Some(bus);
        self
    }

    pub fn with_prompts(mut self, prompts: PromptLoader) -> Self {
        self.prompts = Arc::new(prompts);
        self
    }

    // === Setup ===

    /// Create the LLM client and build the pipeline starting at `start`
    pub fn initialize(&self, credentials: &Credentials, start: Stage) -> Result<(), EngineError> {
        debug!(%start, ?credentials, "Engine::initialize: called");
        let llm = create_client(&self.config.llm, credentials)?;
        self.initialize_with_client(llm, start)
    }

    /// Like [`Engine::initialize`] with a ready-made client
    pub fn initialize_with_client(&self, llm: Arc<dyn LlmClient>, start: Stage) -> Result<(), EngineError> {
        let workflow = &self.config.workflow;
        let options = PipelineOptions {
            start,
            end: workflow.end_stage.max(start),
            confirm_between_stages: workflow.confirm_between_stages,
        };
        let graph = build_pipeline(options)?;
        info!(start = %options.start, end = %options.end, "Engine initialized");
        *lock(&self.session) = Some(Session { llm, graph, options });
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        lock(&self.session).is_some()
    }

    // === Running ===

    /// Run the pipeline on `input` and return the last stage's artifact
    pub async fn run(&self, input: &str) -> Result<String, EngineError> {
        let session = lock(&self.session).clone().ok_or(EngineError::NotInitialized)?;
        let _run = self.run_lock.try_lock().map_err(|_| EngineError::Busy)?;

        let run_id = Uuid::now_v7().to_string();
        let cancel = CancelToken::new();
        *lock(&self.active) = Some(cancel.clone());
        let _processing = ProcessingFlag::raise(&self.processing);

        self.tracker.reset();
        let emitter = self.events.as_ref().map(|bus| bus.emitter_for(run_id.clone()));
        let handle = self.tracker.handle(emitter.clone());
        info!(%run_id, input_len = input.len(), "Engine::run: starting");
        if let Some(events) = &emitter {
            events.run_started(session.options.start.code(), session.options.end.code(), input);
        }

        let mut ctx = RunContext::new(session.llm, Arc::clone(&self.renderer), Arc::clone(&self.gates), handle)
            .with_prompts(Arc::clone(&self.prompts))
            .with_cancel(cancel.clone())
            .with_limits(self.config.workflow.limits())
            .with_max_tokens(self.config.llm.max_tokens);
        if let Some(events) = &emitter {
            ctx = ctx.with_events(events.clone());
        }

        let result = tokio::select! {
            result = graph::execute(&session.graph, input.to_string(), &mut ctx) => result,
            _ = cancel.cancelled() => Err(WorkflowError::Cancelled),
        };

        {
            let mut active = lock(&self.active);
            if active.as_ref().is_some_and(|token| token.same_as(&cancel)) {
                *active = None;
            }
        }

        let visits = ctx.tracker().snapshot().nodes().len();
        match &result {
            Ok(_) => info!(%run_id, visits, "Engine::run: completed"),
            Err(e) if e.is_cancelled() => info!(%run_id, "Engine::run: cancelled"),
            Err(e) => warn!(%run_id, error = %e, "Engine::run: failed"),
        }
        if let Some(events) = &emitter {
            match &result {
                Ok(_) => events.run_completed(true, visits),
                Err(e) if e.is_cancelled() => events.run_cancelled(),
                Err(e) => {
                    events.error("run", &e.to_string());
                    events.run_completed(false, visits);
                }
            }
        }

        Ok(result?)
    }

    /// Abandon the current run, release its gate requests and clear the log
    ///
    /// Configuration and the initialized pipeline are kept.
    pub fn reset(&self) {
        info!("Engine::reset: called");
        if let Some(cancel) = lock(&self.active).take() {
            cancel.cancel();
        }
        self.gates.cancel_all();
        self.tracker.reset();
    }

    // === Observation ===

    /// Gates the UI answers
    pub fn gates(&self) -> Arc<Gates> {
        Arc::clone(&self.gates)
    }

    /// Snapshot of the current run's execution log
    pub fn execution(&self) -> Arc<WorkflowExecution> {
        self.tracker.snapshot()
    }

    /// Live feed of execution snapshots
    pub fn subscribe_execution(&self) -> watch::Receiver<Arc<WorkflowExecution>> {
        self.tracker.subscribe()
    }

    /// True while [`Engine::run`] is in progress
    pub fn is_processing(&self) -> bool {
        *self.processing.borrow()
    }

    pub fn subscribe_processing(&self) -> watch::Receiver<bool> {
        self.processing.subscribe()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

/// Raises the processing flag and lowers it when the run ends
struct ProcessingFlag<'a> {
    tx: &'a watch::Sender<bool>,
}

impl<'a> ProcessingFlag<'a> {
    fn raise(tx: &'a watch::Sender<bool>) -> Self {
        tx.send_replace(true);
        Self { tx }
    }
}

impl Drop for ProcessingFlag<'_> {
    fn drop(&mut self) {
        self.tx.send_replace(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::client::mock::MockLlmClient;
    use crate::test_support::ScriptedRenderer;

    fn engine() -> Engine {
        Engine::new(Config::default(), Arc::new(ScriptedRenderer::default()))
    }

    #[tokio::test]
    async fn test_run_before_initialize_fails() {
        let engine = engine();
        let err = engine.run("Describe a library").await.unwrap_err();
        assert!(matches!(err, EngineError::NotInitialized));
        assert!(engine.execution().is_empty());
        assert!(!engine.is_processing());
    }

    #[test]
    fn test_initialize_with_unknown_provider() {
        let mut config = Config::default();
        config.llm.provider = "nope".to_string();
        let engine = Engine::new(config, Arc::new(ScriptedRenderer::default()));

        let err = engine.initialize(&Credentials::new("key"), Stage::UseCaseDiagram).unwrap_err();
        assert!(matches!(err, EngineError::Llm(LlmError::UnknownProvider(_))));
        assert!(!engine.is_initialized());
    }

    #[test]
    fn test_initialize_clamps_end_stage() {
        let mut config = Config::default();
        config.workflow.end_stage = Stage::UseCaseDiagram;
        let engine = Engine::new(config, Arc::new(ScriptedRenderer::default()));

        engine
            .initialize_with_client(Arc::new(MockLlmClient::new(vec![])), Stage::ActivityModel)
            .unwrap();
        let session = lock(&engine.session).clone().unwrap();
        assert_eq!(session.options.end, Stage::ActivityModel);
    }

    #[tokio::test]
    async fn test_llm_failure_fails_the_run() {
        let engine = engine();
        engine
            .initialize_with_client(Arc::new(MockLlmClient::new(vec![])), Stage::UseCaseDiagram)
            .unwrap();

        let err = engine.run("Describe a library").await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::Workflow(WorkflowError::Node { ref node_id, .. }) if node_id == "ucd.generation"
        ));
        assert!(!engine.is_processing());
    }
}
