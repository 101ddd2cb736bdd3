//! Typed nodes and their type-erased form

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::any::{Any, type_name};
use std::fmt;
use std::marker::PhantomData;

use super::{NodeError, RunContext};
use crate::gate::GateKind;

/// Value flowing between nodes once types are erased
pub type Payload = Box<dyn Any + Send>;

/// What a node does; decides whether the tracker records its visits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeKind {
    /// Virtual start/finish of a graph
    Boundary,
    PromptRewrite,
    LlmGeneration,
    Critic,
    Render,
    Corrector,
    Gate(GateKind),
    /// Pure payload adapter
    Transform,
    Subgraph,
}

impl NodeKind {
    /// Boundaries, adapters and subgraph wrappers are plumbing; only the
    /// nodes inside a subgraph show up in the execution log
    pub fn is_tracked(&self) -> bool {
        !matches!(self, NodeKind::Boundary | NodeKind::Transform | NodeKind::Subgraph)
    }
}

/// A step of a workflow with a typed input and output
#[async_trait]
pub trait Node: Send + Sync + 'static {
    type Input: Send + 'static;
    type Output: Send + 'static;

    /// Stable identifier, unique within a pipeline
    fn id(&self) -> &str;

    /// Human readable name shown in the execution log
    fn name(&self) -> &str;

    fn kind(&self) -> NodeKind;

    async fn execute(&self, input: Self::Input, ctx: &mut RunContext) -> Result<Self::Output, NodeError>;

    /// Ids of nodes nested inside this one (subgraphs)
    fn nested_ids(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Object-safe view of a [`Node`] used by the interpreter
#[async_trait]
pub(crate) trait ErasedNode: Send + Sync {
    fn node_id(&self) -> &str;
    fn node_name(&self) -> &str;
    fn node_kind(&self) -> NodeKind;
    fn nested_node_ids(&self) -> Vec<String>;
    async fn run(&self, input: Payload, ctx: &mut RunContext) -> Result<Payload, NodeError>;
}

#[async_trait]
impl<N: Node> ErasedNode for N {
    fn node_id(&self) -> &str {
        Node::id(self)
    }

    fn node_name(&self) -> &str {
        Node::name(self)
    }

    fn node_kind(&self) -> NodeKind {
        Node::kind(self)
    }

    fn nested_node_ids(&self) -> Vec<String> {
        Node::nested_ids(self)
    }

    async fn run(&self, input: Payload, ctx: &mut RunContext) -> Result<Payload, NodeError> {
        let input = input.downcast::<N::Input>().map_err(|_| NodeError::InputType {
            expected: type_name::<N::Input>(),
        })?;
        let output = self.execute(*input, ctx).await?;
        Ok(Box::new(output))
    }
}

/// Typed reference to a node added to a [`super::GraphBuilder`]
pub struct NodeHandle<I, O> {
    pub(crate) index: usize,
    pub(crate) graph: u64,
    _marker: PhantomData<fn(I) -> O>,
}

impl<I, O> NodeHandle<I, O> {
    pub(crate) fn new(index: usize, graph: u64) -> Self {
        Self {
            index,
            graph,
            _marker: PhantomData,
        }
    }
}

impl<I, O> Clone for NodeHandle<I, O> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<I, O> Copy for NodeHandle<I, O> {}

impl<I, O> fmt::Debug for NodeHandle<I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeHandle")
            .field("index", &self.index)
            .field("graph", &self.graph)
            .finish()
    }
}

/// Pure adapter between payload types; never tracked
pub struct TransformNode<I, O, F> {
    id: String,
    name: String,
    f: F,
    _marker: PhantomData<fn(I) -> O>,
}

impl<I, O, F> TransformNode<I, O, F>
where
    F: Fn(I) -> O + Send + Sync + 'static,
{
    pub fn new(id: impl Into<String>, name: impl Into<String>, f: F) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            f,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<I, O, F> Node for TransformNode<I, O, F>
where
    I: Send + 'static,
    O: Send + 'static,
    F: Fn(I) -> O + Send + Sync + 'static,
{
    type Input = I;
    type Output = O;

    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Transform
    }

    async fn execute(&self, input: I, _ctx: &mut RunContext) -> Result<O, NodeError> {
        Ok((self.f)(input))
    }
}

/// Virtual start or finish node: passes its input through
pub(crate) struct BoundaryNode<T> {
    id: String,
    _marker: PhantomData<fn(T) -> T>,
}

impl<T> BoundaryNode<T> {
    pub(crate) fn new(id: String) -> Self {
        Self {
            id,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<T: Send + 'static> Node for BoundaryNode<T> {
    type Input = T;
    type Output = T;

    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Boundary
    }

    async fn execute(&self, input: T, _ctx: &mut RunContext) -> Result<T, NodeError> {
        Ok(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::run_context;

    #[test]
    fn test_tracked_kinds() {
        assert!(NodeKind::LlmGeneration.is_tracked());
        assert!(NodeKind::Gate(GateKind::Acceptance).is_tracked());
        assert!(!NodeKind::Transform.is_tracked());
        assert!(!NodeKind::Subgraph.is_tracked());
        assert!(!NodeKind::Boundary.is_tracked());
    }

    #[tokio::test]
    async fn test_erased_run_checks_payload_type() {
        let node = TransformNode::new("len", "Length", |s: String| s.len());
        let (mut ctx, _) = run_context(vec![]);

        let out = node.run(Box::new("four".to_string()), &mut ctx).await.unwrap();
        assert_eq!(*out.downcast::<usize>().unwrap(), 4);

        let err = node.run(Box::new(7u32), &mut ctx).await.err().unwrap();
        assert!(matches!(err, NodeError::InputType { .. }));
    }
}
