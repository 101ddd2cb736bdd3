//! Pipeline composer
//!
//! Chains the stage subgraphs into one `String -> String` workflow:
//!
//! ```text
//! start -> input adapter -> ucd -> [continue?] -> adapter -> sad -> [continue?] -> adapter -> adm -> output adapter -> finish
//! ```
//!
//! The start stage decides where the raw input enters; earlier stages are
//! left out of the graph entirely. The shape is fixed when the graph is
//! built.

use tracing::{debug, info};

use crate::graph::{EdgeSpec, Graph, GraphBuilder, GraphError, NodeHandle, TransformNode};
use crate::stages::{
    ActivityModelInput, ActivityModelOutput, Artifact, ScenarioActivityInput, ScenarioActivityOutput, SelectionNode,
    Stage, UseCaseDiagramInput, UseCaseDiagramOutput, activity, scenario, use_case,
};

pub const PIPELINE: &str = "pipeline";

/// Id of the selection gate in front of `stage`
pub fn continue_id(stage: Stage) -> String {
    format!("{PIPELINE}.continue_{}", stage.code())
}

/// How the pipeline graph is shaped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineOptions {
    pub start: Stage,
    pub end: Stage,
    /// Wait on the selection gate before each stage after the first
    pub confirm_between_stages: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            start: Stage::UseCaseDiagram,
            end: Stage::ActivityModel,
            confirm_between_stages: true,
        }
    }
}

impl PipelineOptions {
    /// Stages the pipeline runs, in order
    pub fn stages(&self) -> Vec<Stage> {
        Stage::all()
            .into_iter()
            .filter(|s| *s >= self.start && *s <= self.end)
            .collect()
    }
}

/// The last stage added so far, typed by its artifacts
enum StageTail {
    UseCase(NodeHandle<UseCaseDiagramInput, UseCaseDiagramOutput>),
    Scenario(NodeHandle<ScenarioActivityInput, ScenarioActivityOutput>),
    Activity(NodeHandle<ActivityModelInput, ActivityModelOutput>),
}

/// Wire the raw input into the first stage through an adapter node
fn link_input<T: Artifact>(b: &mut GraphBuilder<String, String>, stage: NodeHandle<T, impl Send + 'static>, code: &str) {
    let start = b.start();
    let adapter = b.add_node(TransformNode::new(
        format!("{PIPELINE}.input_to_{code}"),
        "Input",
        T::from_text,
    ));
    b.forward(start, adapter).forward(adapter, stage);
}

/// Wire one stage's output into the next stage, optionally behind a
/// selection gate
fn link_stage<A, B, C, D>(
    b: &mut GraphBuilder<String, String>,
    prev: NodeHandle<A, B>,
    next: NodeHandle<C, D>,
    stage: Stage,
    confirm: bool,
) where
    A: Send + 'static,
    B: Artifact,
    C: From<B> + Send + 'static,
    D: Send + 'static,
{
    let adapter = b.add_node(TransformNode::new(
        format!("{PIPELINE}.to_{}", stage.code()),
        format!("Adapt for {}", stage.title()),
        C::from,
    ));
    if confirm {
        let gate = b.add_node(SelectionNode::<B>::new(continue_id(stage)));
        b.forward(prev, gate).forward(gate, adapter);
    } else {
        b.forward(prev, adapter);
    }
    b.forward(adapter, next);
}

/// Wire the last stage's artifact text into the finish node
fn link_output<A: Send + 'static, B: Artifact>(b: &mut GraphBuilder<String, String>, last: NodeHandle<A, B>) {
    let finish = b.finish();
    let adapter = b.add_node(TransformNode::new(format!("{PIPELINE}.output"), "Output", B::into_text));
    b.forward(last, adapter).forward(adapter, finish);
}

/// Build the end-to-end workflow for `options`
pub fn build_pipeline(options: PipelineOptions) -> Result<Graph<String, String>, GraphError> {
    debug!(?options, "build_pipeline: called");
    if options.end < options.start {
        return Err(GraphError::InvalidStageRange {
            start: options.start.to_string(),
            end: options.end.to_string(),
        });
    }

    let mut b = GraphBuilder::<String, String>::new(PIPELINE);
    let confirm = options.confirm_between_stages;
    let mut tail: Option<StageTail> = None;

    for stage in options.stages() {
        tail = Some(match (stage, tail) {
            (Stage::UseCaseDiagram, _) => {
                let ucd = b.add_subgraph(use_case::build()?);
                link_input(&mut b, ucd, stage.code());
                StageTail::UseCase(ucd)
            }
            (Stage::ScenarioActivity, prev) => {
                let sad = b.add_subgraph(scenario::build()?);
                match prev {
                    Some(StageTail::UseCase(ucd)) => link_stage(&mut b, ucd, sad, stage, confirm),
                    _ => link_input(&mut b, sad, stage.code()),
                }
                StageTail::Scenario(sad)
            }
            (Stage::ActivityModel, prev) => {
                let adm = b.add_subgraph(activity::build()?);
                match prev {
                    Some(StageTail::Scenario(sad)) => link_stage(&mut b, sad, adm, stage, confirm),
                    _ => link_input(&mut b, adm, stage.code()),
                }
                StageTail::Activity(adm)
            }
        });
    }

    match tail {
        Some(StageTail::UseCase(last)) => link_output(&mut b, last),
        Some(StageTail::Scenario(last)) => link_output(&mut b, last),
        Some(StageTail::Activity(last)) => link_output(&mut b, last),
        None => {}
    }

    let graph = b.build()?;
    info!(start = %options.start, end = %options.end, confirm, "build_pipeline: built");
    Ok(graph)
}
