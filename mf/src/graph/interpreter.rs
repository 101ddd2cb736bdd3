//! Graph interpreter
//!
//! Walks a graph one node at a time: execute the current node, pick the
//! first outgoing edge whose condition accepts the output, convert the value
//! and continue until the finish node returns.

use std::any::{Any, type_name};
use tracing::{debug, info};

use super::builder::{FINISH, GraphCore, START};
use super::edge::Edge;
use super::node::Payload;
use super::{Graph, RunContext, WorkflowError};

/// Run `graph` on `input` to completion
pub async fn execute<I, O>(graph: &Graph<I, O>, input: I, ctx: &mut RunContext) -> Result<O, WorkflowError>
where
    I: Send + 'static,
    O: Send + 'static,
{
    info!(graph = %graph.core.name, "execute: starting workflow");
    let output = run_graph(&graph.core, Box::new(input), ctx).await?;
    output.downcast::<O>().map(|o| *o).map_err(|_| WorkflowError::PayloadType {
        graph: graph.core.name.clone(),
        node_id: graph.core.nodes[FINISH].node_id().to_string(),
        expected: type_name::<O>(),
    })
}

pub(crate) async fn run_graph(core: &GraphCore, input: Payload, ctx: &mut RunContext) -> Result<Payload, WorkflowError> {
    debug!(graph = %core.name, "run_graph: called");
    let mut current = START;
    let mut payload = input;

    loop {
        if ctx.cancel().is_cancelled() {
            debug!(graph = %core.name, "run_graph: cancelled");
            return Err(WorkflowError::Cancelled);
        }
        ctx.count_step().map_err(|limit| WorkflowError::StepLimit {
            graph: core.name.clone(),
            limit,
        })?;

        let node = &core.nodes[current];
        if node.node_kind().is_tracked() {
            ctx.tracker().track_node_visit(node.node_id(), node.node_name());
        }

        debug!(graph = %core.name, node_id = %node.node_id(), "run_graph: executing node");
        let output = node
            .run(payload, ctx)
            .await
            .map_err(|e| WorkflowError::from_node(node.node_id(), e))?;

        if current == FINISH {
            debug!(graph = %core.name, "run_graph: reached finish");
            return Ok(output);
        }

        let edge = select_edge(&core.edges[current], &*output).ok_or_else(|| WorkflowError::NoMatchingEdge {
            graph: core.name.clone(),
            node_id: node.node_id().to_string(),
        })?;

        payload = edge.traverse(output).map_err(|expected| WorkflowError::PayloadType {
            graph: core.name.clone(),
            node_id: node.node_id().to_string(),
            expected,
        })?;
        current = edge.target;
    }
}

/// First edge, in declaration order, whose condition accepts `value`
pub(crate) fn select_edge<'a>(edges: &'a [Edge], value: &(dyn Any + Send)) -> Option<&'a Edge> {
    edges.iter().find(|edge| edge.accepts(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{EdgeSpec, GraphBuilder, Node, NodeError, NodeKind, TransformNode};
    use crate::test_support::run_context;
    use async_trait::async_trait;
    use proptest::prelude::*;

    /// Tracked node that adds one
    struct Step(&'static str);

    #[async_trait]
    impl Node for Step {
        type Input = u32;
        type Output = u32;

        fn id(&self) -> &str {
            self.0
        }

        fn name(&self) -> &str {
            self.0
        }

        fn kind(&self) -> NodeKind {
            NodeKind::LlmGeneration
        }

        async fn execute(&self, input: u32, _ctx: &mut RunContext) -> Result<u32, NodeError> {
            Ok(input + 1)
        }
    }

    struct Failing;

    #[async_trait]
    impl Node for Failing {
        type Input = u32;
        type Output = u32;

        fn id(&self) -> &str {
            "failing"
        }

        fn name(&self) -> &str {
            "Failing"
        }

        fn kind(&self) -> NodeKind {
            NodeKind::Render
        }

        async fn execute(&self, _input: u32, _ctx: &mut RunContext) -> Result<u32, NodeError> {
            Err(NodeError::Prompt("broken template".to_string()))
        }
    }

    fn visited(ctx: &RunContext) -> Vec<String> {
        ctx.tracker()
            .snapshot()
            .nodes()
            .iter()
            .map(|v| v.id.node_id.clone())
            .collect()
    }

    #[tokio::test]
    async fn test_linear_graph_with_transform_edges() {
        let mut b = GraphBuilder::<String, String>::new("linear");
        let (start, finish) = (b.start(), b.finish());
        let step = b.add_node(Step("step"));
        b.edge(start, step, EdgeSpec::map(|s: String| s.len() as u32));
        b.edge(step, finish, EdgeSpec::map(|n: u32| format!("len+1={n}")));
        let graph = b.build().unwrap();

        let (mut ctx, _) = run_context(vec![]);
        let out = execute(&graph, "abc".to_string(), &mut ctx).await.unwrap();

        assert_eq!(out, "len+1=4");
        assert_eq!(visited(&ctx), vec!["step"]);
    }

    #[tokio::test]
    async fn test_cycle_until_condition() {
        let mut b = GraphBuilder::<u32, u32>::new("cycle");
        let (start, finish) = (b.start(), b.finish());
        let step = b.add_node(Step("step"));
        b.forward(start, step);
        b.edge(step, finish, EdgeSpec::forward().on_condition(|n: &u32| *n >= 3));
        b.forward(step, step);
        let graph = b.build().unwrap();

        let (mut ctx, _) = run_context(vec![]);
        let out = execute(&graph, 0, &mut ctx).await.unwrap();

        assert_eq!(out, 3);
        let execution = ctx.tracker().snapshot();
        assert_eq!(execution.nodes().len(), 3);
        assert_eq!(execution.nodes()[2].id.occurrence, 2);
        assert_eq!(execution.edges().len(), 2);
    }

    #[tokio::test]
    async fn test_no_matching_edge() {
        let mut b = GraphBuilder::<u32, u32>::new("strict");
        let (start, finish) = (b.start(), b.finish());
        let step = b.add_node(Step("step"));
        b.forward(start, step);
        b.edge(step, finish, EdgeSpec::forward().on_condition(|n: &u32| *n > 100));
        let graph = b.build().unwrap();

        let (mut ctx, _) = run_context(vec![]);
        let err = execute(&graph, 0, &mut ctx).await.unwrap_err();
        assert!(matches!(err, WorkflowError::NoMatchingEdge { node_id, .. } if node_id == "step"));
    }

    #[tokio::test]
    async fn test_step_limit_stops_endless_cycle() {
        let mut b = GraphBuilder::<u32, u32>::new("endless");
        let (start, finish) = (b.start(), b.finish());
        let step = b.add_node(Step("step"));
        b.forward(start, step);
        b.edge(step, finish, EdgeSpec::forward().on_condition(|_: &u32| false));
        b.forward(step, step);
        let graph = b.build().unwrap();

        let (mut ctx, _) = run_context(vec![]);
        ctx.limits_mut().max_steps = 10;
        let err = execute(&graph, 0, &mut ctx).await.unwrap_err();
        assert!(matches!(err, WorkflowError::StepLimit { limit: 10, .. }));
    }

    #[tokio::test]
    async fn test_node_failure_names_node() {
        let mut b = GraphBuilder::<u32, u32>::new("failing");
        let (start, finish) = (b.start(), b.finish());
        let failing = b.add_node(Failing);
        b.forward(start, failing).forward(failing, finish);
        let graph = b.build().unwrap();

        let (mut ctx, _) = run_context(vec![]);
        let err = execute(&graph, 0, &mut ctx).await.unwrap_err();
        assert!(matches!(err, WorkflowError::Node { node_id, .. } if node_id == "failing"));
        // the failing node was still visited
        assert_eq!(visited(&ctx), vec!["failing"]);
    }

    #[tokio::test]
    async fn test_subgraph_runs_inline_and_failures_flatten() {
        let mut inner = GraphBuilder::<u32, u32>::new("inner");
        let (s, f) = (inner.start(), inner.finish());
        let a = inner.add_node(Step("inner.step"));
        let broken = inner.add_node(Failing);
        inner.forward(s, a);
        inner.edge(a, f, EdgeSpec::forward().on_condition(|n: &u32| *n < 5));
        inner.forward(a, broken).forward(broken, f);
        let inner = inner.build().unwrap();

        let mut outer = GraphBuilder::<u32, String>::new("outer");
        let (s, f) = (outer.start(), outer.finish());
        let sub = outer.add_subgraph(inner);
        let show = outer.add_node(TransformNode::new("show", "Show", |n: u32| n.to_string()));
        outer.forward(s, sub).forward(sub, show).forward(show, f);
        let graph = outer.build().unwrap();

        let (mut ctx, _) = run_context(vec![]);
        assert_eq!(execute(&graph, 1, &mut ctx).await.unwrap(), "2");
        assert_eq!(visited(&ctx), vec!["inner.step"]);

        let (mut ctx, _) = run_context(vec![]);
        let err = execute(&graph, 10, &mut ctx).await.unwrap_err();
        assert!(matches!(err, WorkflowError::Node { node_id, .. } if node_id == "failing"));
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let mut b = GraphBuilder::<u32, u32>::new("g");
        let (start, finish) = (b.start(), b.finish());
        b.forward(start, finish);
        let graph = b.build().unwrap();

        let (mut ctx, _) = run_context(vec![]);
        ctx.cancel().cancel();
        assert!(execute(&graph, 0, &mut ctx).await.unwrap_err().is_cancelled());
    }

    proptest! {
        #[test]
        fn prop_first_accepting_edge_wins(thresholds in prop::collection::vec(0u32..100, 1..8), value in 0u32..120) {
            let edges: Vec<Edge> = thresholds
                .iter()
                .enumerate()
                .map(|(target, t)| {
                    let t = *t;
                    EdgeSpec::<u32, u32>::forward().on_condition(move |v: &u32| *v >= t).into_edge(target)
                })
                .collect();

            let expected = thresholds.iter().position(|t| value >= *t);
            let chosen = select_edge(&edges, &value).map(|e| e.target);
            prop_assert_eq!(chosen, expected);
        }
    }
}
