//! Graph build and execution errors

use thiserror::Error;

use crate::gate::GateError;
use crate::llm::LlmError;
use crate::render::RenderError;

/// Errors raised while building a graph
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("graph '{graph}': node '{node_id}' has no outgoing edge")]
    DeadEnd { graph: String, node_id: String },

    #[error("graph '{graph}': the finish node cannot have outgoing edges")]
    EdgeFromFinish { graph: String },

    #[error("graph '{graph}': node '{node_id}' is unreachable from start")]
    Unreachable { graph: String, node_id: String },

    #[error("graph '{graph}': node id '{node_id}' is used more than once")]
    DuplicateNodeId { graph: String, node_id: String },

    #[error("graph '{graph}': edge refers to a node from another graph builder")]
    ForeignHandle { graph: String },

    #[error("stage range {start} -> {end} is empty")]
    InvalidStageRange { start: String, end: String },
}

/// Errors a node body can fail with
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("LLM call failed: {0}")]
    Llm(#[from] LlmError),

    #[error("gate request failed: {0}")]
    Gate(#[from] GateError),

    #[error("diagram rendering failed: {0}")]
    Render(#[from] RenderError),

    #[error("prompt template error: {0}")]
    Prompt(String),

    #[error("{what} limit of {limit} reached")]
    LimitExceeded { what: &'static str, limit: u32 },

    #[error("node received a payload that is not a {expected}")]
    InputType { expected: &'static str },

    /// The run was cancelled while the node was waiting
    #[error("node was cancelled")]
    Cancelled,

    /// Failure of a nested graph, kept whole so it can be flattened
    #[error(transparent)]
    Workflow(Box<WorkflowError>),
}

impl NodeError {
    pub fn is_cancelled(&self) -> bool {
        match self {
            NodeError::Cancelled => true,
            NodeError::Gate(e) => e.is_cancelled(),
            NodeError::Workflow(e) => e.is_cancelled(),
            _ => false,
        }
    }
}

/// Errors that end a workflow run
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("workflow run was cancelled")]
    Cancelled,

    #[error("node '{node_id}' failed: {source}")]
    Node {
        node_id: String,
        #[source]
        source: NodeError,
    },

    #[error("graph '{graph}': no edge out of '{node_id}' accepts its output")]
    NoMatchingEdge { graph: String, node_id: String },

    #[error("graph '{graph}': step limit of {limit} reached")]
    StepLimit { graph: String, limit: u64 },

    #[error("graph '{graph}': payload at '{node_id}' is not a {expected}")]
    PayloadType {
        graph: String,
        node_id: String,
        expected: &'static str,
    },
}

impl WorkflowError {
    /// Wrap a node failure, flattening cancellation and nested graph errors
    pub fn from_node(node_id: &str, err: NodeError) -> Self {
        if err.is_cancelled() {
            return WorkflowError::Cancelled;
        }
        match err {
            NodeError::Workflow(inner) => *inner,
            source => WorkflowError::Node {
                node_id: node_id.to_string(),
                source,
            },
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, WorkflowError::Cancelled)
    }
}
