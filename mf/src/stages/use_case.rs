//! Use case diagram stage (UCD)
//!
//! ```text
//! start -> change_prompt -> generation -> render --ok--> acceptance --ACCEPT--> finish
//!              ^                          |   ^               |
//!              |                     fail v   |               |
//!              |                        corrector             |
//!              +----------------- corrections ----------------+
//! ```

use tracing::debug;

use super::{
    AcceptanceNode, AcceptanceResult, Artifact, CorrectorNode, GenerationNode, PromptRewriteNode, RenderNode, Stage,
    UseCaseDiagramInput, UseCaseDiagramOutput,
};
use crate::graph::{EdgeSpec, Graph, GraphBuilder, GraphError};
use crate::render::RenderOutcome;

pub const CHANGE_PROMPT: &str = "ucd.change_prompt";
pub const GENERATION: &str = "ucd.generation";
pub const RENDER: &str = "ucd.render";
pub const CORRECTOR: &str = "ucd.corrector";
pub const ACCEPTANCE: &str = "ucd.acceptance";

/// Build the use case diagram subgraph
pub fn build() -> Result<Graph<UseCaseDiagramInput, UseCaseDiagramOutput>, GraphError> {
    debug!("use_case::build: called");
    let mut b = GraphBuilder::new(Stage::UseCaseDiagram.code());
    let (start, finish) = (b.start(), b.finish());

    let change_prompt = b.add_node(PromptRewriteNode::new(
        CHANGE_PROMPT,
        "Change Prompt",
        "Use case diagram prompt",
        "use_case",
        "Use case description",
    ));
    let generation = b.add_node(
        GenerationNode::<UseCaseDiagramInput>::new(GENERATION, "Generate Diagram", "use case diagram").diagram(),
    );
    let render = b.add_node(RenderNode::new(RENDER));
    let corrector = b.add_node(CorrectorNode::new(CORRECTOR));
    let acceptance = b.add_node(AcceptanceNode::<UseCaseDiagramOutput>::new(ACCEPTANCE));

    b.forward(start, change_prompt)
        .forward(change_prompt, generation)
        .forward(generation, render);
    b.edge(
        render,
        corrector,
        EdgeSpec::forward().on_condition(RenderOutcome::is_failure),
    );
    b.forward(corrector, render);
    b.edge(
        render,
        acceptance,
        EdgeSpec::map(|outcome: RenderOutcome| UseCaseDiagramOutput::from_text(outcome.source().to_string())),
    );
    b.edge(
        acceptance,
        finish,
        EdgeSpec::map(AcceptanceResult::into_response).on_condition(AcceptanceResult::is_accepted),
    );
    b.edge(acceptance, change_prompt, EdgeSpec::map(AcceptanceResult::rework));

    b.build()
}
