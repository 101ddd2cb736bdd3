//! Scenario and activity stage (SAD)
//!
//! Extracts scenarios from the use case diagram (with a critique round),
//! then tags their activities and parameters with `<A>` and `<P>`.

use tracing::debug;

use super::{
    AcceptanceNode, AcceptanceResult, Artifact, CriticNode, GenerationNode, PromptRewriteNode, ScenarioActivityInput,
    ScenarioActivityOutput, ScenarioDraft, Stage,
};
use crate::graph::{EdgeSpec, Graph, GraphBuilder, GraphError};

pub const CHANGE_PROMPT_SCENARIOS: &str = "sad.change_prompt_scenarios";
pub const CRITIC: &str = "sad.critic";
pub const GENERATION_SCENARIOS: &str = "sad.generation_scenarios";
pub const CHANGE_PROMPT_ACTIVITIES: &str = "sad.change_prompt_activities";
pub const GENERATION_ACTIVITIES: &str = "sad.generation_activities";
pub const ACCEPTANCE: &str = "sad.acceptance";

/// Build the scenario and activity subgraph
pub fn build() -> Result<Graph<ScenarioActivityInput, ScenarioActivityOutput>, GraphError> {
    debug!("scenario::build: called");
    let mut b = GraphBuilder::new(Stage::ScenarioActivity.code());
    let (start, finish) = (b.start(), b.finish());

    let change_prompt_scenarios = b.add_node(PromptRewriteNode::new(
        CHANGE_PROMPT_SCENARIOS,
        "Change Prompt (scenarios)",
        "SAD scenarios prompt",
        "scenarios",
        "Use case diagram",
    ));
    let critic = b.add_node(CriticNode::<ScenarioActivityInput>::new(CRITIC));
    let generation_scenarios = b.add_node(GenerationNode::<ScenarioActivityInput>::new(
        GENERATION_SCENARIOS,
        "Generate Scenarios",
        "list of scenarios with their activities",
    ));
    let change_prompt_activities = b.add_node(PromptRewriteNode::<ScenarioDraft>::new(
        CHANGE_PROMPT_ACTIVITIES,
        "Change Prompt (activities)",
        "SAD activities prompt: A, P tags",
        "activities",
        "Scenarios",
    ));
    let generation_activities = b.add_node(GenerationNode::<ScenarioDraft>::new(
        GENERATION_ACTIVITIES,
        "Tag Activities",
        "scenarios with <A> and <P> tags applied",
    ));
    let acceptance = b.add_node(AcceptanceNode::<ScenarioActivityOutput>::new(ACCEPTANCE));

    b.forward(start, change_prompt_scenarios)
        .forward(change_prompt_scenarios, critic)
        .forward(critic, generation_scenarios);
    b.edge(
        generation_scenarios,
        change_prompt_activities,
        EdgeSpec::map(ScenarioDraft::from_text),
    );
    b.forward(change_prompt_activities, generation_activities);
    b.edge(
        generation_activities,
        acceptance,
        EdgeSpec::map(ScenarioActivityOutput::from_text),
    );
    b.edge(
        acceptance,
        finish,
        EdgeSpec::map(AcceptanceResult::into_response).on_condition(AcceptanceResult::is_accepted),
    );
    b.edge(acceptance, change_prompt_scenarios, EdgeSpec::map(AcceptanceResult::rework));

    b.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::execute;
    use crate::test_support::run_context;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_scenarios_then_activities() {
        let (mut ctx, harness) = run_context(vec![
            "Is returning a book in scope?",
            "1. Borrow book: member picks a book, librarian scans it.",
            "The member <A>picks a book</A>. The librarian <A>scans the <P>book id</P></A>.",
        ]);
        let gates = harness.gates.clone();
        let mut clarifications = gates.clarification.observe_requests().unwrap();
        let mut acceptances = gates.acceptance.observe_requests().unwrap();
        tokio::spawn(async move {
            clarifications.next().await.unwrap();
            gates.clarification.submit_decision("DONE".into()).unwrap();
            acceptances.next().await.unwrap();
            gates.acceptance.submit_decision("ACCEPT".into()).unwrap();
        });

        let input = ScenarioActivityInput::from_text("@startuml\nactor Member\n@enduml".into());
        let out = execute(&build().unwrap(), input, &mut ctx).await.unwrap();

        assert!(out.scenarios.contains("<A>picks a book</A>"));
        assert_eq!(
            harness.tracker.snapshot().path(),
            vec![
                CHANGE_PROMPT_SCENARIOS,
                CRITIC,
                GENERATION_SCENARIOS,
                CHANGE_PROMPT_ACTIVITIES,
                GENERATION_ACTIVITIES,
                ACCEPTANCE
            ]
        );

        // the activity prompt starts from the generated scenario list
        let last = harness.llm.requests().pop().unwrap();
        assert!(last.system_prompt.contains("<A> ... </A>"));
        assert_eq!(
            last.messages[0].content,
            "Scenarios: 1. Borrow book: member picks a book, librarian scans it."
        );
    }
}
