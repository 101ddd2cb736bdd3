//! LlmClient trait definition

use async_trait::async_trait;

use super::{CompletionRequest, CompletionResponse, LlmError};

/// Chat completion client
///
/// Each call carries the complete prompt context; the client keeps no
/// conversation state between calls.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send a single completion request and wait for the full reply
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tracing::debug;

    /// Mock LLM client for unit tests
    ///
    /// Replies are consumed in order; every request is captured for assertions.
    pub struct MockLlmClient {
        responses: Vec<Result<String, String>>,
        call_count: AtomicUsize,
        requests: Mutex<Vec<CompletionRequest>>,
    }

    impl MockLlmClient {
        pub fn new(responses: Vec<&str>) -> Self {
            debug!(response_count = %responses.len(), "MockLlmClient::new: called");
            Self {
                responses: responses.into_iter().map(|r| Ok(r.to_string())).collect(),
                call_count: AtomicUsize::new(0),
                requests: Mutex::new(Vec::new()),
            }
        }

        /// Script a sequence where `Err` entries fail the call
        pub fn scripted(responses: Vec<Result<String, String>>) -> Self {
            Self {
                responses,
                call_count: AtomicUsize::new(0),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub fn call_count(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }

        pub fn requests(&self) -> Vec<CompletionRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LlmClient for MockLlmClient {
        async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
            let idx = self.call_count.fetch_add(1, Ordering::SeqCst);
            debug!(%idx, "MockLlmClient::complete: called");
            self.requests.lock().unwrap().push(request);
            match self.responses.get(idx) {
                Some(Ok(text)) => Ok(CompletionResponse::text(text.clone())),
                Some(Err(message)) => Err(LlmError::ApiError {
                    status: 500,
                    message: message.clone(),
                }),
                None => Err(LlmError::InvalidResponse("No more mock responses".to_string())),
            }
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        fn request() -> CompletionRequest {
            CompletionRequest {
                system_prompt: "Test".to_string(),
                messages: vec![],
                max_tokens: 1000,
            }
        }

        #[tokio::test]
        async fn test_mock_client_returns_responses() {
            let client = MockLlmClient::new(vec!["Response 1", "Response 2"]);

            let resp1 = client.complete(request()).await.unwrap();
            assert_eq!(resp1.content, Some("Response 1".to_string()));

            let resp2 = client.complete(request()).await.unwrap();
            assert_eq!(resp2.content, Some("Response 2".to_string()));

            assert_eq!(client.call_count(), 2);
            assert_eq!(client.requests().len(), 2);
        }

        #[tokio::test]
        async fn test_mock_client_errors_when_exhausted() {
            let client = MockLlmClient::new(vec![]);
            assert!(client.complete(request()).await.is_err());
        }

        #[tokio::test]
        async fn test_mock_client_scripted_failure() {
            let client = MockLlmClient::scripted(vec![Err("boom".to_string())]);
            let err = client.complete(request()).await.unwrap_err();
            assert!(err.to_string().contains("boom"));
        }
    }
}
