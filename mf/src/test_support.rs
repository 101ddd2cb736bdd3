//! Shared fixtures for unit tests

use std::sync::Arc;

use crate::gate::Gates;
use crate::graph::RunContext;
use crate::llm::client::mock::MockLlmClient;
pub(crate) use crate::render::ScriptedRenderer;
use crate::tracker::ExecutionTracker;

/// Collaborators behind a test [`RunContext`]
pub(crate) struct TestHarness {
    pub llm: Arc<MockLlmClient>,
    pub renderer: Arc<ScriptedRenderer>,
    pub gates: Arc<Gates>,
    pub tracker: Arc<ExecutionTracker>,
}

/// A run context over a mock LLM replying with `responses` in order
pub(crate) fn run_context(responses: Vec<&str>) -> (RunContext, TestHarness) {
    let harness = TestHarness {
        llm: Arc::new(MockLlmClient::new(responses)),
        renderer: Arc::new(ScriptedRenderer::default()),
        gates: Arc::new(Gates::new()),
        tracker: Arc::new(ExecutionTracker::new()),
    };
    let ctx = RunContext::new(
        harness.llm.clone(),
        harness.renderer.clone(),
        Arc::clone(&harness.gates),
        harness.tracker.handle(None),
    );
    (ctx, harness)
}
