//! Graph construction and validation

use async_trait::async_trait;
use std::any::type_name;
use std::collections::{HashSet, VecDeque};
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

use super::edge::{Edge, EdgeSpec};
use super::interpreter;
use super::node::{BoundaryNode, ErasedNode, Node, NodeHandle, NodeKind};
use super::{GraphError, NodeError, RunContext};

pub(crate) const START: usize = 0;
pub(crate) const FINISH: usize = 1;

static NEXT_BUILDER_ID: AtomicU64 = AtomicU64::new(1);

/// Incrementally assembles a [`Graph`] from typed nodes and edges
///
/// Every builder starts with a virtual start node (`NodeHandle<I, I>`) and a
/// virtual finish node (`NodeHandle<O, O>`). Edges are tried in the order
/// they were added; the first whose condition holds is taken.
pub struct GraphBuilder<I, O> {
    id: u64,
    name: String,
    nodes: Vec<Arc<dyn ErasedNode>>,
    edges: Vec<Vec<Edge>>,
    errors: Vec<GraphError>,
    _marker: PhantomData<fn(I) -> O>,
}

impl<I: Send + 'static, O: Send + 'static> GraphBuilder<I, O> {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        debug!(%name, "GraphBuilder::new: called");
        let start: Arc<dyn ErasedNode> = Arc::new(BoundaryNode::<I>::new(format!("{name}.start")));
        let finish: Arc<dyn ErasedNode> = Arc::new(BoundaryNode::<O>::new(format!("{name}.finish")));
        Self {
            id: NEXT_BUILDER_ID.fetch_add(1, Ordering::Relaxed),
            name,
            nodes: vec![start, finish],
            edges: vec![Vec::new(), Vec::new()],
            errors: Vec::new(),
            _marker: PhantomData,
        }
    }

    pub fn start(&self) -> NodeHandle<I, I> {
        NodeHandle::new(START, self.id)
    }

    pub fn finish(&self) -> NodeHandle<O, O> {
        NodeHandle::new(FINISH, self.id)
    }

    pub fn add_node<N: Node>(&mut self, node: N) -> NodeHandle<N::Input, N::Output> {
        debug!(graph = %self.name, node_id = %node.id(), "add_node: called");
        self.nodes.push(Arc::new(node));
        self.edges.push(Vec::new());
        NodeHandle::new(self.nodes.len() - 1, self.id)
    }

    /// Embed a built graph as a single node
    pub fn add_subgraph<A: Send + 'static, B: Send + 'static>(&mut self, graph: Graph<A, B>) -> NodeHandle<A, B> {
        self.add_node(SubgraphNode { graph })
    }

    /// Add an edge; `spec` decides when it is taken and how the value changes
    pub fn edge<A, B, C, D>(&mut self, from: NodeHandle<A, B>, to: NodeHandle<C, D>, spec: EdgeSpec<B, C>) -> &mut Self
    where
        B: Send + 'static,
        C: Send + 'static,
    {
        if from.graph != self.id || to.graph != self.id {
            self.errors.push(GraphError::ForeignHandle {
                graph: self.name.clone(),
            });
            return self;
        }
        if let Some(last) = self.edges[from.index].last()
            && !last.is_conditional()
        {
            warn!(
                graph = %self.name,
                node_id = %self.nodes[from.index].node_id(),
                "edge: added after an unconditional edge and will never be taken"
            );
        }
        self.edges[from.index].push(spec.into_edge(to.index));
        self
    }

    /// Unconditional edge passing the value through unchanged
    pub fn forward<A, B, D>(&mut self, from: NodeHandle<A, B>, to: NodeHandle<B, D>) -> &mut Self
    where
        B: Send + 'static,
    {
        self.edge(from, to, EdgeSpec::forward())
    }

    /// Validate the wiring and freeze the graph
    pub fn build(mut self) -> Result<Graph<I, O>, GraphError> {
        debug!(graph = %self.name, nodes = self.nodes.len(), "build: called");
        if !self.errors.is_empty() {
            return Err(self.errors.swap_remove(0));
        }

        if !self.edges[FINISH].is_empty() {
            return Err(GraphError::EdgeFromFinish { graph: self.name });
        }

        for (index, node) in self.nodes.iter().enumerate() {
            if index != FINISH && self.edges[index].is_empty() {
                return Err(GraphError::DeadEnd {
                    graph: self.name.clone(),
                    node_id: node.node_id().to_string(),
                });
            }
        }

        let mut reached = vec![false; self.nodes.len()];
        let mut queue = VecDeque::from([START]);
        reached[START] = true;
        while let Some(index) = queue.pop_front() {
            for edge in &self.edges[index] {
                if !reached[edge.target] {
                    reached[edge.target] = true;
                    queue.push_back(edge.target);
                }
            }
        }
        if let Some(index) = reached.iter().position(|r| !r) {
            return Err(GraphError::Unreachable {
                graph: self.name.clone(),
                node_id: self.nodes[index].node_id().to_string(),
            });
        }

        let core = GraphCore {
            name: self.name,
            nodes: self.nodes,
            edges: self.edges,
        };
        let mut seen = HashSet::new();
        for id in core.all_node_ids() {
            if !seen.insert(id.clone()) {
                return Err(GraphError::DuplicateNodeId {
                    graph: core.name,
                    node_id: id,
                });
            }
        }

        Ok(Graph {
            core: Arc::new(core),
            _marker: PhantomData,
        })
    }
}

/// Nodes and edges shared by every typed view of a graph
pub(crate) struct GraphCore {
    pub(crate) name: String,
    pub(crate) nodes: Vec<Arc<dyn ErasedNode>>,
    pub(crate) edges: Vec<Vec<Edge>>,
}

impl GraphCore {
    fn all_node_ids(&self) -> Vec<String> {
        self.nodes
            .iter()
            .flat_map(|n| std::iter::once(n.node_id().to_string()).chain(n.nested_node_ids()))
            .collect()
    }
}

/// A validated, immutable workflow graph from `I` to `O`
///
/// Cloning is cheap; clones share the same nodes.
pub struct Graph<I, O> {
    pub(crate) core: Arc<GraphCore>,
    _marker: PhantomData<fn(I) -> O>,
}

impl<I, O> Clone for Graph<I, O> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
            _marker: PhantomData,
        }
    }
}

impl<I, O> std::fmt::Debug for Graph<I, O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field("name", &self.core.name)
            .field("nodes", &self.core.nodes.len())
            .finish()
    }
}

impl<I, O> Graph<I, O> {
    pub fn name(&self) -> &str {
        &self.core.name
    }

    /// Every node id in this graph and its subgraphs, boundaries included
    pub fn node_ids(&self) -> Vec<String> {
        self.core.all_node_ids()
    }

    /// Ids of the nodes the tracker records, in insertion order
    pub fn tracked_node_ids(&self) -> Vec<String> {
        self.core
            .nodes
            .iter()
            .filter(|n| n.node_kind().is_tracked())
            .map(|n| n.node_id().to_string())
            .collect()
    }
}

/// Runs an embedded graph as one step of the enclosing graph
struct SubgraphNode<A, B> {
    graph: Graph<A, B>,
}

#[async_trait]
impl<A: Send + 'static, B: Send + 'static> Node for SubgraphNode<A, B> {
    type Input = A;
    type Output = B;

    fn id(&self) -> &str {
        &self.graph.core.name
    }

    fn name(&self) -> &str {
        &self.graph.core.name
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Subgraph
    }

    fn nested_ids(&self) -> Vec<String> {
        self.graph.node_ids()
    }

    async fn execute(&self, input: A, ctx: &mut RunContext) -> Result<B, NodeError> {
        debug!(graph = %self.graph.core.name, "SubgraphNode::execute: called");
        let output = interpreter::run_graph(&self.graph.core, Box::new(input), ctx)
            .await
            .map_err(|e| NodeError::Workflow(Box::new(e)))?;
        output.downcast::<B>().map(|b| *b).map_err(|_| NodeError::InputType {
            expected: type_name::<B>(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::TransformNode;

    fn inc(id: &str) -> TransformNode<u32, u32, fn(u32) -> u32> {
        TransformNode::new(id, id, (|n| n + 1) as fn(u32) -> u32)
    }

    #[test]
    fn test_build_minimal_graph() {
        let mut b = GraphBuilder::<u32, u32>::new("minimal");
        let (start, finish) = (b.start(), b.finish());
        let a = b.add_node(inc("a"));
        b.forward(start, a).forward(a, finish);

        let graph = b.build().unwrap();
        assert_eq!(graph.name(), "minimal");
        assert_eq!(graph.node_ids(), vec!["minimal.start", "minimal.finish", "a"]);
        // transforms are not tracked
        assert!(graph.tracked_node_ids().is_empty());
    }

    #[test]
    fn test_dead_end_is_rejected() {
        let mut b = GraphBuilder::<u32, u32>::new("g");
        let (start, finish) = (b.start(), b.finish());
        let a = b.add_node(inc("a"));
        let dangling = b.add_node(inc("dangling"));
        b.forward(start, a).forward(a, finish).forward(a, dangling);

        assert_eq!(
            b.build().unwrap_err(),
            GraphError::DeadEnd {
                graph: "g".to_string(),
                node_id: "dangling".to_string()
            }
        );
    }

    #[test]
    fn test_unreachable_node_is_rejected() {
        let mut b = GraphBuilder::<u32, u32>::new("g");
        let (start, finish) = (b.start(), b.finish());
        let orphan = b.add_node(inc("orphan"));
        b.forward(start, finish).forward(orphan, finish);

        assert!(matches!(b.build(), Err(GraphError::Unreachable { node_id, .. }) if node_id == "orphan"));
    }

    #[test]
    fn test_duplicate_ids_across_subgraphs_are_rejected() {
        let mut inner = GraphBuilder::<u32, u32>::new("inner");
        let (s, f) = (inner.start(), inner.finish());
        let a = inner.add_node(inc("a"));
        inner.forward(s, a).forward(a, f);
        let inner = inner.build().unwrap();

        let mut outer = GraphBuilder::<u32, u32>::new("outer");
        let (s, f) = (outer.start(), outer.finish());
        let sub = outer.add_subgraph(inner);
        let a = outer.add_node(inc("a"));
        outer.forward(s, sub).forward(sub, a).forward(a, f);

        assert!(matches!(outer.build(), Err(GraphError::DuplicateNodeId { node_id, .. }) if node_id == "a"));
    }

    #[test]
    fn test_foreign_handle_is_rejected() {
        let mut other = GraphBuilder::<u32, u32>::new("other");
        let foreign = other.add_node(inc("x"));

        let mut b = GraphBuilder::<u32, u32>::new("g");
        let (start, finish) = (b.start(), b.finish());
        b.forward(start, foreign).forward(start, finish);

        assert!(matches!(b.build(), Err(GraphError::ForeignHandle { .. })));
    }
}
