//! Execution tracking
//!
//! Records which nodes a run visited, in order, with an occurrence index per
//! node, the transitions between consecutive visits and the LLM calls made
//! during each visit. The UI observes immutable snapshots.

mod execution;
mod node_tracker;
mod recorder;

pub use execution::{LlmCallRecord, VisitId, WorkflowEdgeVisit, WorkflowExecution, WorkflowNodeVisit};
pub use node_tracker::{ExecutionTracker, TrackerHandle};
pub use recorder::LlmCallRecorder;
