//! Observer interface around LLM requests

/// Receives a callback before and after every LLM request of a run
///
/// Calls are attributed to whichever node visit is current when the callback
/// fires.
pub trait LlmCallRecorder: Send + Sync {
    /// The request is about to be sent with these messages
    fn call_starting(&self, system_messages: Vec<String>, user_messages: Vec<String>);

    /// The request returned `response`
    fn call_completed(&self, response: String);

    /// The request failed; the open record is closed with `error`
    fn call_failed(&self, error: String);
}
