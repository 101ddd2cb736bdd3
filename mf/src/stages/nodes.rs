//! Node bodies shared by the stage subgraphs

use async_trait::async_trait;
use serde_json::json;
use std::marker::PhantomData;
use tracing::{debug, info, warn};

use super::{ACCEPTANCE_INSTRUCTIONS, AcceptanceResult, Artifact};
use crate::gate::GateKind;
use crate::graph::{Node, NodeError, NodeKind, RunContext, WorkflowLimits};
use crate::render::{RenderOutcome, extract_plantuml};

/// Prefix of a model reply that asks the human a question instead of
/// producing the artifact
pub const CLARIFY_PREFIX: &str = "CLARIFY:";

/// Human answers that end a critique loop
const CRITIQUE_DONE: &[&str] = &["", "DONE", "SKIP"];

// === Prompt rewrite ===

/// Replaces the prompt context with a stage instruction and the input
///
/// Passes its input through unchanged.
pub struct PromptRewriteNode<T> {
    id: String,
    name: String,
    prompt_id: String,
    template: &'static str,
    params: serde_json::Value,
    label: &'static str,
    _marker: PhantomData<fn(T) -> T>,
}

impl<T: Artifact> PromptRewriteNode<T> {
    /// `prompt_id` names the prompt (and so the tags applied so far);
    /// `label` introduces the input in the user message
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        prompt_id: impl Into<String>,
        template: &'static str,
        label: &'static str,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            prompt_id: prompt_id.into(),
            template,
            params: json!({}),
            label,
            _marker: PhantomData,
        }
    }

    /// Values substituted into the template
    pub fn with_params(mut self, params: serde_json::Value) -> Self {
        self.params = params;
        self
    }
}

#[async_trait]
impl<T: Artifact> Node for PromptRewriteNode<T> {
    type Input = T;
    type Output = T;

    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> NodeKind {
        NodeKind::PromptRewrite
    }

    async fn execute(&self, input: T, ctx: &mut RunContext) -> Result<T, NodeError> {
        debug!(node_id = %self.id, prompt_id = %self.prompt_id, "PromptRewriteNode::execute: called");
        let system = ctx.render_prompt(self.template, &self.params)?;
        let user = format!("{}: {}", self.label, input.text());
        ctx.prompt_mut().rewrite(self.prompt_id.clone(), system, user);
        Ok(input)
    }
}

// === Critic ===

/// Critiques the input with the LLM and collects the human's answers
///
/// Each round sends one critique through the clarification gate and
/// appends the answer to the prompt context. The loop ends when the human
/// answers blank, `DONE` or `SKIP`, or after `max_critique_rounds`.
/// Passes its input through unchanged.
pub struct CriticNode<T> {
    id: String,
    _marker: PhantomData<fn(T) -> T>,
}

impl<T: Artifact> CriticNode<T> {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<T: Artifact> Node for CriticNode<T> {
    type Input = T;
    type Output = T;

    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        "Critic"
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Critic
    }

    async fn execute(&self, input: T, ctx: &mut RunContext) -> Result<T, NodeError> {
        let instruction = ctx.render_prompt("critic", &json!({}))?;
        ctx.prompt_mut().push_system(instruction);

        let max_rounds = ctx.limits().max_critique_rounds;
        let mut round = 0u32;
        loop {
            round += 1;
            let critique = ctx.call_llm().await?;
            let answer = ctx.request_clarification(critique).await?;
            let answer = answer.trim();
            if CRITIQUE_DONE.iter().any(|done| answer.eq_ignore_ascii_case(done)) {
                debug!(node_id = %self.id, round, "CriticNode::execute: human ended critique");
                break;
            }
            ctx.prompt_mut().push_user(format!("Clarification: {answer}"));
            if max_rounds != 0 && round >= max_rounds {
                info!(node_id = %self.id, round, "CriticNode::execute: critique round limit reached");
                break;
            }
        }
        Ok(input)
    }
}

// === Generation ===

/// Produces an artifact from the prompt context with one model call
///
/// A reply starting with [`CLARIFY_PREFIX`] is a question: it goes through
/// the clarification gate, the answer is appended and the call repeated.
/// Diagram generators return the extracted PlantUML block.
pub struct GenerationNode<I> {
    id: String,
    name: String,
    artifact: &'static str,
    diagram: bool,
    _marker: PhantomData<fn(I)>,
}

impl<I: Artifact> GenerationNode<I> {
    /// `artifact` describes what to write, e.g. "use case diagram"
    pub fn new(id: impl Into<String>, name: impl Into<String>, artifact: &'static str) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            artifact,
            diagram: false,
            _marker: PhantomData,
        }
    }

    /// Ask for PlantUML and extract it from the reply
    pub fn diagram(mut self) -> Self {
        self.diagram = true;
        self
    }
}

#[async_trait]
impl<I: Artifact> Node for GenerationNode<I> {
    type Input = I;
    type Output = String;

    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> NodeKind {
        NodeKind::LlmGeneration
    }

    async fn execute(&self, _input: I, ctx: &mut RunContext) -> Result<String, NodeError> {
        let instruction = ctx.render_prompt("generate", &json!({"artifact": self.artifact, "diagram": self.diagram}))?;
        ctx.prompt_mut().push_user(instruction);

        let max_questions = ctx.limits().max_clarifications;
        let mut questions = 0u32;
        loop {
            let reply = ctx.call_llm().await?;
            let Some(question) = reply.trim_start().strip_prefix(CLARIFY_PREFIX) else {
                debug!(node_id = %self.id, questions, "GenerationNode::execute: artifact generated");
                return Ok(if self.diagram {
                    extract_plantuml(&reply)
                } else {
                    reply.trim().to_string()
                });
            };

            questions += 1;
            if WorkflowLimits::exceeded(max_questions, questions) {
                return Err(NodeError::LimitExceeded {
                    what: "clarification",
                    limit: max_questions,
                });
            }
            let answer = ctx.request_clarification(question.trim().to_string()).await?;
            ctx.prompt_mut().push_user(format!("Clarification: {}", answer.trim()));
        }
    }
}

// === Render and correct ===

/// Renders diagram source; failures are returned as a value
pub struct RenderNode {
    id: String,
}

impl RenderNode {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

#[async_trait]
impl Node for RenderNode {
    type Input = String;
    type Output = RenderOutcome;

    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        "Render Diagram"
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Render
    }

    async fn execute(&self, source: String, ctx: &mut RunContext) -> Result<RenderOutcome, NodeError> {
        let rendered = tokio::select! {
            rendered = ctx.renderer().render(&source) => rendered,
            _ = ctx.cancel().cancelled() => return Err(NodeError::Cancelled),
        };
        Ok(match rendered {
            Ok(diagram) => {
                info!(node_id = %self.id, path = %diagram.path.display(), "RenderNode::execute: rendered");
                RenderOutcome::Rendered {
                    source,
                    image: diagram.path,
                }
            }
            Err(e) => {
                warn!(node_id = %self.id, error = %e, "RenderNode::execute: render failed");
                RenderOutcome::Failed {
                    source,
                    message: e.to_string(),
                }
            }
        })
    }
}

/// Asks the LLM to repair a diagram that failed to render
pub struct CorrectorNode {
    id: String,
}

impl CorrectorNode {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

#[async_trait]
impl Node for CorrectorNode {
    type Input = RenderOutcome;
    type Output = String;

    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        "Correct Diagram"
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Corrector
    }

    async fn execute(&self, outcome: RenderOutcome, ctx: &mut RunContext) -> Result<String, NodeError> {
        let (source, message) = match outcome {
            RenderOutcome::Failed { source, message } => (source, message),
            RenderOutcome::Rendered { source, .. } => return Ok(source),
        };

        let limit = ctx.limits().max_render_attempts;
        let attempts = u32::try_from(ctx.tracker().occurrences(&self.id)).unwrap_or(u32::MAX);
        if WorkflowLimits::exceeded(limit, attempts) {
            return Err(NodeError::LimitExceeded {
                what: "render attempt",
                limit,
            });
        }

        debug!(node_id = %self.id, attempts, "CorrectorNode::execute: requesting fix");
        let request = ctx.render_prompt("corrector", &json!({"error": message, "source": source}))?;
        ctx.prompt_mut().push_user(request);
        let reply = ctx.call_llm().await?;
        Ok(extract_plantuml(&reply))
    }
}

// === Gates ===

/// Shows the artifact to the human and waits for `ACCEPT` or corrections
pub struct AcceptanceNode<T> {
    id: String,
    _marker: PhantomData<fn(T) -> T>,
}

impl<T: Artifact> AcceptanceNode<T> {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<T: Artifact> Node for AcceptanceNode<T> {
    type Input = T;
    type Output = AcceptanceResult<T>;

    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        "Acceptance"
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Gate(GateKind::Acceptance)
    }

    async fn execute(&self, artifact: T, ctx: &mut RunContext) -> Result<AcceptanceResult<T>, NodeError> {
        let limit = ctx.limits().max_rejections;
        let visits = u32::try_from(ctx.tracker().occurrences(&self.id)).unwrap_or(u32::MAX);
        let rejections = visits.saturating_sub(1);
        if WorkflowLimits::exceeded(limit, rejections) {
            return Err(NodeError::LimitExceeded {
                what: "rejection",
                limit,
            });
        }

        let payload = format!("{}\n{}", artifact.text(), ACCEPTANCE_INSTRUCTIONS);
        let decision = ctx.request_acceptance(payload).await?;
        let result = AcceptanceResult::from_decision(artifact, &decision);
        info!(node_id = %self.id, accepted = result.is_accepted(), "AcceptanceNode::execute: decided");
        Ok(result)
    }
}

/// Waits for the human to confirm moving on; passes its input through
pub struct SelectionNode<T> {
    id: String,
    _marker: PhantomData<fn(T) -> T>,
}

impl<T: Send + 'static> SelectionNode<T> {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<T: Send + 'static> Node for SelectionNode<T> {
    type Input = T;
    type Output = T;

    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        "Continue?"
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Gate(GateKind::Selection)
    }

    async fn execute(&self, input: T, ctx: &mut RunContext) -> Result<T, NodeError> {
        ctx.request_selection().await?;
        Ok(input)
    }
}
