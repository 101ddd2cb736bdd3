//! ModelFlow - human-in-the-loop LLM workflows for requirements modeling
//!
//! ModelFlow turns a natural-language system description into UML models in
//! three stages, each a typed workflow graph of LLM nodes:
//!
//! - **UCD**: description → PlantUML use case diagram, rendered and
//!   auto-corrected until it parses
//! - **SAD**: diagram → scenarios with `<A>`/`<P>` tagged activities
//! - **ADM**: tagged scenarios → activity model with control-flow tags
//!
//! A human answers the LLM's clarifying questions and accepts or corrects
//! every stage's output through [`gate::Gates`]. Every node visit and LLM
//! call is recorded by the [`tracker`] for live inspection.
//!
//! # Modules
//!
//! - [`graph`] - Typed workflow graphs and the interpreter
//! - [`stages`] - The UCD, SAD and ADM subgraphs and their nodes
//! - [`pipeline`] - Chains stage subgraphs into one runnable graph
//! - [`engine`] - Initialize, run and reset a workflow
//! - [`gate`] - Human-in-the-loop rendezvous
//! - [`tracker`] - Execution log of node visits and LLM calls
//! - [`events`] - Event bus and per-run JSONL logs
//! - [`llm`] - LLM client trait and OpenAI-compatible implementation
//! - [`render`] - PlantUML rendering
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod cancel;
pub mod cli;
pub mod config;
pub mod engine;
pub mod events;
pub mod gate;
pub mod graph;
pub mod llm;
pub mod pipeline;
pub mod prompts;
pub mod render;
pub mod stages;
pub mod tracker;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types
pub use cancel::CancelToken;
pub use config::{Config, LlmConfig, RendererConfig, WorkflowConfig};
pub use engine::{Engine, EngineError};
pub use events::{EventBus, EventEmitter, EventLogEntry, FlowEvent, create_event_bus, spawn_event_logger};
pub use gate::{Gate, GateError, GateKind, GateRequest, Gates};
pub use graph::{
    EdgeSpec, Graph, GraphBuilder, GraphError, Node, NodeError, NodeKind, RunContext, WorkflowError, WorkflowLimits,
    execute,
};
pub use llm::{CompletionRequest, CompletionResponse, Credentials, LlmClient, LlmError, OpenAIClient, create_client};
pub use pipeline::{PipelineOptions, build_pipeline};
pub use prompts::PromptLoader;
pub use render::{DiagramRenderer, PlantUmlServerRenderer, RenderError, RenderOutcome, RenderedDiagram};
pub use stages::{ACCEPT, AcceptanceResult, Stage};
pub use tracker::{ExecutionTracker, LlmCallRecord, TrackerHandle, VisitId, WorkflowExecution, WorkflowNodeVisit};
