//! Scripted collaborators for engine integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use modelflow::config::Config;
use modelflow::engine::Engine;
use modelflow::llm::{CompletionRequest, CompletionResponse, LlmClient, LlmError};
pub use modelflow::render::ScriptedRenderer;
use modelflow::stages::Stage;

pub const DIAGRAM: &str = "@startuml\nactor Member\nMember --> (Borrow Book)\n@enduml";
pub const FIXED_DIAGRAM: &str = "@startuml\nactor Member\nMember --> (Borrow Book)\nMember --> (Return Book)\n@enduml";
pub const ADMIN_DIAGRAM: &str = "@startuml\nactor Member\nactor Admin\nMember --> (Borrow Book)\nAdmin --> (Manage Catalog)\n@enduml";

/// LLM that replies from a fixed script and records every request
pub struct ScriptedLlm {
    replies: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedLlm {
    pub fn new(replies: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.requests.lock().unwrap().push(request);
        match self.replies.lock().unwrap().pop_front() {
            Some(reply) => Ok(CompletionResponse::text(reply)),
            None => Err(LlmError::InvalidResponse("script exhausted".to_string())),
        }
    }
}

/// Engine over `renderer` running `start..=end` without stage confirmation
pub fn engine(renderer: Arc<ScriptedRenderer>, start: Stage, end: Stage, confirm: bool) -> Arc<Engine> {
    let mut config = Config::default();
    config.workflow.start_stage = start;
    config.workflow.end_stage = end;
    config.workflow.confirm_between_stages = confirm;
    Arc::new(Engine::new(config, renderer))
}
