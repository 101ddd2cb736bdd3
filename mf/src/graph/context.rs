//! Per-run state shared by every node of a workflow

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

use super::NodeError;
use crate::cancel::CancelToken;
use crate::events::EventEmitter;
use crate::gate::{Gate, GateKind, Gates};
use crate::llm::{LlmClient, PromptContext};
use crate::prompts::PromptLoader;
use crate::render::DiagramRenderer;
use crate::tracker::{LlmCallRecorder, TrackerHandle};

/// Loop bounds of a run
///
/// The `u32` bounds treat 0 as unbounded; `max_steps` always applies so a
/// run cannot spin forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkflowLimits {
    /// Node executions per run, boundaries and adapters included
    pub max_steps: u64,
    /// Corrector visits per corrector node and run
    pub max_render_attempts: u32,
    /// Rejections per acceptance node and run
    pub max_rejections: u32,
    /// CLARIFY questions per generation node execution
    pub max_clarifications: u32,
    /// Critique rounds per critic node execution
    pub max_critique_rounds: u32,
}

impl Default for WorkflowLimits {
    fn default() -> Self {
        Self {
            max_steps: 500,
            max_render_attempts: 10,
            max_rejections: 10,
            max_clarifications: 5,
            max_critique_rounds: 3,
        }
    }
}

impl WorkflowLimits {
    /// True when `count` has gone past a `u32` bound
    pub fn exceeded(limit: u32, count: u32) -> bool {
        limit != 0 && count > limit
    }
}

/// Everything a node needs while a run is in progress
///
/// Node definitions are immutable and shared between runs; the mutable
/// part of a run (prompt history, step counter) lives here.
pub struct RunContext {
    llm: Arc<dyn LlmClient>,
    renderer: Arc<dyn DiagramRenderer>,
    gates: Arc<Gates>,
    tracker: TrackerHandle,
    events: Option<EventEmitter>,
    prompts: Arc<PromptLoader>,
    cancel: CancelToken,
    limits: WorkflowLimits,
    prompt: PromptContext,
    max_tokens: u32,
    steps: u64,
}

impl RunContext {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        renderer: Arc<dyn DiagramRenderer>,
        gates: Arc<Gates>,
        tracker: TrackerHandle,
    ) -> Self {
        Self {
            llm,
            renderer,
            gates,
            tracker,
            events: None,
            prompts: Arc::new(PromptLoader::embedded_only()),
            cancel: CancelToken::new(),
            limits: WorkflowLimits::default(),
            prompt: PromptContext::default(),
            max_tokens: 8192,
            steps: 0,
        }
    }

    pub fn with_events(mut self, events: EventEmitter) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_prompts(mut self, prompts: Arc<PromptLoader>) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_limits(mut self, limits: WorkflowLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    // === Accessors ===

    pub fn cancel(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn tracker(&self) -> &TrackerHandle {
        &self.tracker
    }

    pub fn events(&self) -> Option<&EventEmitter> {
        self.events.as_ref()
    }

    pub fn limits(&self) -> &WorkflowLimits {
        &self.limits
    }

    pub fn limits_mut(&mut self) -> &mut WorkflowLimits {
        &mut self.limits
    }

    pub fn prompt(&self) -> &PromptContext {
        &self.prompt
    }

    pub fn prompt_mut(&mut self) -> &mut PromptContext {
        &mut self.prompt
    }

    pub fn renderer(&self) -> &dyn DiagramRenderer {
        self.renderer.as_ref()
    }

    pub fn gates(&self) -> &Gates {
        &self.gates
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Count one node execution; `Err(limit)` once the step budget is spent
    pub(crate) fn count_step(&mut self) -> Result<(), u64> {
        self.steps += 1;
        if self.steps > self.limits.max_steps {
            return Err(self.limits.max_steps);
        }
        Ok(())
    }

    /// Render a prompt template with `data`
    pub fn render_prompt<T: Serialize>(&self, name: &str, data: &T) -> Result<String, NodeError> {
        self.prompts
            .render(name, data)
            .map_err(|e| NodeError::Prompt(e.to_string()))
    }

    // === LLM ===

    /// Send the current prompt context to the LLM and append the reply
    ///
    /// The call is reported to the tracker before it is sent and after it
    /// returns, so it lands on the visit of the calling node.
    pub async fn call_llm(&mut self) -> Result<String, NodeError> {
        let request = self.prompt.to_request(self.max_tokens);
        debug!(
            prompt_id = %self.prompt.id(),
            messages = request.messages.len(),
            "call_llm: called"
        );
        self.tracker
            .call_starting(self.prompt.system_messages(), self.prompt.user_messages());

        let result = tokio::select! {
            result = self.llm.complete(request) => result,
            _ = self.cancel.cancelled() => {
                self.tracker.call_failed("cancelled".to_string());
                return Err(NodeError::Cancelled);
            }
        };

        match result {
            Ok(response) => {
                let text = response.content.unwrap_or_default();
                self.tracker.call_completed(text.clone());
                self.prompt.push_assistant(text.clone());
                Ok(text)
            }
            Err(e) => {
                warn!(error = %e, "call_llm: request failed");
                self.tracker.call_failed(e.to_string());
                Err(e.into())
            }
        }
    }

    // === Gates ===

    /// Ask the human a question and wait for the answer
    pub async fn request_clarification(&self, question: String) -> Result<String, NodeError> {
        self.wait_on(&self.gates.clarification, question).await
    }

    /// Show an artifact and wait for `ACCEPT` or corrections
    pub async fn request_acceptance(&self, payload: String) -> Result<String, NodeError> {
        self.wait_on(&self.gates.acceptance, payload).await
    }

    /// Wait for the human to confirm moving to the next stage
    pub async fn request_selection(&self) -> Result<(), NodeError> {
        if let Some(events) = &self.events {
            events.gate_requested(GateKind::Selection, "");
        }
        self.gates.selection.request_decision((), &self.cancel).await?;
        if let Some(events) = &self.events {
            events.gate_resolved(GateKind::Selection, "continue");
        }
        Ok(())
    }

    async fn wait_on(&self, gate: &Gate<String, String>, payload: String) -> Result<String, NodeError> {
        debug!(gate = %gate.kind(), "wait_on: called");
        if let Some(events) = &self.events {
            events.gate_requested(gate.kind(), &payload);
        }
        let decision = gate.request_decision(payload, &self.cancel).await?;
        if let Some(events) = &self.events {
            events.gate_resolved(gate.kind(), &decision);
        }
        Ok(decision)
    }
}
