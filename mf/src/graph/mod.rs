//! Typed workflow graphs
//!
//! A workflow is a directed graph of [`Node`]s built with a
//! [`GraphBuilder`]. Nodes have typed inputs and outputs; edges may carry a
//! condition over the source's output and a conversion into the target's
//! input. Both are checked by the compiler when the edge is added, so a built
//! [`Graph`] cannot route a value into a node of the wrong type.
//!
//! Graphs may contain cycles (retry and review loops) and may be nested:
//! a built graph can be added to another builder as a single node.
//!
//! [`execute`] walks a graph iteratively, one node at a time, recording
//! each tracked visit in the run's execution log.

mod builder;
mod context;
mod edge;
mod error;
mod interpreter;
mod node;

pub use builder::{Graph, GraphBuilder};
pub use context::{RunContext, WorkflowLimits};
pub use edge::EdgeSpec;
pub use error::{GraphError, NodeError, WorkflowError};
pub use interpreter::execute;
pub use node::{Node, NodeHandle, NodeKind, Payload, TransformNode};
