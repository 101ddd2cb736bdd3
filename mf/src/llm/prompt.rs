//! The prompt context carried through a workflow run

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{CompletionRequest, Message, Role};

/// Ordered chat history that LLM nodes read and extend
///
/// Prompt-rewrite nodes replace the whole history; generation, critic and
/// corrector nodes append to it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptContext {
    id: String,
    messages: Vec<Message>,
}

impl PromptContext {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            messages: Vec::new(),
        }
    }

    /// Identifier of the prompt that produced this context
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Replace the context with a fresh system + user pair
    pub fn rewrite(&mut self, id: impl Into<String>, system: impl Into<String>, user: impl Into<String>) {
        self.id = id.into();
        debug!(id = %self.id, "PromptContext::rewrite: called");
        self.messages.clear();
        self.messages.push(Message::system(system));
        self.messages.push(Message::user(user));
    }

    pub fn push_system(&mut self, text: impl Into<String>) {
        self.messages.push(Message::system(text));
    }

    pub fn push_user(&mut self, text: impl Into<String>) {
        self.messages.push(Message::user(text));
    }

    pub fn push_assistant(&mut self, text: impl Into<String>) {
        self.messages.push(Message::assistant(text));
    }

    /// Text of every system message, in order
    pub fn system_messages(&self) -> Vec<String> {
        self.contents(Role::System)
    }

    /// Text of every user message, in order
    pub fn user_messages(&self) -> Vec<String> {
        self.contents(Role::User)
    }

    fn contents(&self, role: Role) -> Vec<String> {
        self.messages
            .iter()
            .filter(|m| m.role == role)
            .map(|m| m.content.clone())
            .collect()
    }

    /// Build a completion request: system messages are joined into the
    /// system prompt, everything else is sent as conversation turns
    pub fn to_request(&self, max_tokens: u32) -> CompletionRequest {
        CompletionRequest {
            system_prompt: self.system_messages().join("\n\n"),
            messages: self
                .messages
                .iter()
                .filter(|m| m.role != Role::System)
                .cloned()
                .collect(),
            max_tokens,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rewrite_replaces_history() {
        let mut ctx = PromptContext::new("initial");
        ctx.push_user("stale");
        ctx.push_assistant("stale reply");

        ctx.rewrite("use_case", "You are a modeler", "Use case description: library");

        assert_eq!(ctx.id(), "use_case");
        assert_eq!(ctx.messages().len(), 2);
        assert_eq!(ctx.system_messages(), vec!["You are a modeler"]);
        assert_eq!(ctx.user_messages(), vec!["Use case description: library"]);
    }

    #[test]
    fn test_to_request_joins_system_messages() {
        let mut ctx = PromptContext::new("p");
        ctx.rewrite("p", "first", "question");
        ctx.push_system("second");
        ctx.push_assistant("answer");
        ctx.push_user("Clarification: yes");

        let request = ctx.to_request(512);
        assert_eq!(request.system_prompt, "first\n\nsecond");
        assert_eq!(request.max_tokens, 512);
        let roles: Vec<Role> = request.messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant, Role::User]);
    }
}
