//! Activity model stage (ADM)
//!
//! Applies the control-flow tags one at a time, each step told which tags
//! are already in place: SEQ, COND, ALT, LOOP, PARA. A critique round runs
//! after the first rewrite.

use serde_json::json;
use tracing::debug;

use super::{
    AcceptanceNode, AcceptanceResult, ActivityModelInput, ActivityModelOutput, Artifact, CriticNode, GenerationNode,
    PromptRewriteNode, Stage,
};
use crate::graph::{EdgeSpec, Graph, GraphBuilder, GraphError, NodeHandle};

pub const CRITIC: &str = "adm.critic";
pub const ACCEPTANCE: &str = "adm.acceptance";

/// One control-flow tag applied by its own rewrite and generation step
struct TagStep {
    tag: &'static str,
    definition: &'static str,
    example: &'static str,
}

const TAG_STEPS: [TagStep; 5] = [
    TagStep {
        tag: "SEQ",
        definition: "sequences of activities, steps performed in a specific order; it may contain one or two activities",
        example: "The user <SEQ><A>enters data</A>. The system <A>verifies the data</A> and <A>stores it in the database</A></SEQ>.",
    },
    TagStep {
        tag: "COND",
        definition: "conditional activities, steps executed based on a condition",
        example: "<COND> If <A>the data is incorrect</A>, the system <A>sends a notification</A> and <A>rejects the order</A></COND>.",
    },
    TagStep {
        tag: "ALT",
        definition: "conditional activities without an \"else\" branch",
        example: "<ALT> If <A>the data is valid</A>, the system <A>completes the order</A></ALT>.",
    },
    TagStep {
        tag: "LOOP",
        definition: "loops, repeated activities",
        example: "If <A>there are more records</A>, <LOOP>the system <A>processes the next record</A></LOOP>",
    },
    TagStep {
        tag: "PARA",
        definition: "parallel activities, operations performed simultaneously",
        example: "<PARA><A>the change history is updated</A> and <A>events are logged</A></PARA>.",
    },
];

/// Id of the rewrite node applying `tag`, e.g. `adm.change_prompt_seq`
pub fn change_prompt_id(tag: &str) -> String {
    format!("adm.change_prompt_{}", tag.to_ascii_lowercase())
}

/// Id of the generation node applying `tag`
pub fn generation_id(tag: &str) -> String {
    format!("adm.generation_{}", tag.to_ascii_lowercase())
}

/// Tags already present before `index`, formatted for the prompt
fn applied_tags(index: usize) -> String {
    let tags: Vec<String> = std::iter::once("A")
        .chain(TAG_STEPS[..index].iter().map(|s| s.tag))
        .map(|t| format!("<{t}>"))
        .collect();
    match tags.split_last() {
        Some((last, [])) => last.clone(),
        Some((last, rest)) => format!("{} and {}", rest.join(", "), last),
        None => String::new(),
    }
}

fn rewrite_node(index: usize) -> PromptRewriteNode<ActivityModelInput> {
    let step = &TAG_STEPS[index];
    let applied = applied_tags(index);
    PromptRewriteNode::new(
        change_prompt_id(step.tag),
        format!("Change Prompt ({})", step.tag),
        format!("ADM {} prompt: {} applied", step.tag, applied),
        "activity_model",
        "Scenarios and activities",
    )
    .with_params(json!({
        "applied": applied,
        "tag": step.tag,
        "definition": step.definition,
        "example": step.example,
    }))
}

/// Build the activity model subgraph
pub fn build() -> Result<Graph<ActivityModelInput, ActivityModelOutput>, GraphError> {
    debug!("activity::build: called");
    let mut b = GraphBuilder::new(Stage::ActivityModel.code());
    let (start, finish) = (b.start(), b.finish());

    let critic = b.add_node(CriticNode::<ActivityModelInput>::new(CRITIC));
    let acceptance = b.add_node(AcceptanceNode::<ActivityModelOutput>::new(ACCEPTANCE));

    let mut first: Option<NodeHandle<ActivityModelInput, ActivityModelInput>> = None;
    let mut previous: Option<NodeHandle<ActivityModelInput, String>> = None;
    for (index, step) in TAG_STEPS.iter().enumerate() {
        let rewrite = b.add_node(rewrite_node(index));
        let generation = b.add_node(GenerationNode::<ActivityModelInput>::new(
            generation_id(step.tag),
            format!("Apply {}", step.tag),
            "scenarios with the new control-flow tags applied",
        ));

        match previous {
            None => {
                b.forward(start, rewrite).forward(rewrite, critic).forward(critic, generation);
                first = Some(rewrite);
            }
            Some(prev) => {
                b.edge(prev, rewrite, EdgeSpec::map(ActivityModelInput::from_text));
                b.forward(rewrite, generation);
            }
        }
        previous = Some(generation);
    }

    if let (Some(first), Some(last)) = (first, previous) {
        b.edge(last, acceptance, EdgeSpec::map(ActivityModelOutput::from_text));
        b.edge(
            acceptance,
            finish,
            EdgeSpec::map(AcceptanceResult::into_response).on_condition(AcceptanceResult::is_accepted),
        );
        b.edge(acceptance, first, EdgeSpec::map(AcceptanceResult::rework));
    }

    b.build()
}
