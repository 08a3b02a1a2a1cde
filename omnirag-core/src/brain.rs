//! The text-generation capability.
//!
//! The retrieval core only needs single-shot completions: a system prompt, one
//! user prompt, and the model's text back. Strategy classification and graph
//! query generation both go through [`LlmProvider::complete`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::LlmError;

/// Trait for LLM providers, enabling pluggable model backends.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Perform a full completion and return the response.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// Return the model name.
    fn model_name(&self) -> &str;
}

/// A single-turn completion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    pub temperature: f32,
    /// Ask the provider for a JSON object response.
    pub json_response: bool,
    pub max_tokens: Option<usize>,
}

impl CompletionRequest {
    pub fn new(system_prompt: impl Into<String>, user_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            user_prompt: user_prompt.into(),
            temperature: 0.0,
            json_response: false,
            max_tokens: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_json_response(mut self) -> Self {
        self.json_response = true;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: usize,
    pub output_tokens: usize,
}

impl TokenUsage {
    pub fn total(&self) -> usize {
        self.input_tokens + self.output_tokens
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub text: String,
    pub model: String,
    pub usage: TokenUsage,
}

enum MockReply {
    Text(CompletionResponse),
    Failure(String),
}

/// A mock LLM provider for testing.
///
/// Replies are consumed in FIFO order. Once the queue is empty every call
/// returns a fixed placeholder text. All requests are captured.
pub struct MockLlmProvider {
    model: String,
    replies: Mutex<VecDeque<MockReply>>,
    requests: Mutex<Vec<CompletionRequest>>,
    calls: AtomicUsize,
}

impl MockLlmProvider {
    pub const FALLBACK_TEXT: &'static str = "I'm a mock LLM. No queued responses available.";

    pub fn new() -> Self {
        Self {
            model: "mock-model".to_string(),
            replies: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Create a MockLlmProvider that returns the given text for many calls.
    pub fn with_response(text: &str) -> Self {
        let provider = Self::new();
        for _ in 0..20 {
            provider.queue_response(Self::text_response(text));
        }
        provider
    }

    /// Create a MockLlmProvider whose every call fails.
    pub fn failing(message: &str) -> Self {
        let provider = Self::new();
        for _ in 0..20 {
            provider.queue_failure(message);
        }
        provider
    }

    pub fn queue_response(&self, response: CompletionResponse) {
        self.lock_replies().push_back(MockReply::Text(response));
    }

    pub fn queue_text(&self, text: &str) {
        self.queue_response(Self::text_response(text));
    }

    /// Queue a connection failure for the next call.
    pub fn queue_failure(&self, message: &str) {
        self.lock_replies()
            .push_back(MockReply::Failure(message.to_string()));
    }

    pub fn text_response(text: &str) -> CompletionResponse {
        CompletionResponse {
            text: text.to_string(),
            model: "mock-model".to_string(),
            usage: TokenUsage {
                input_tokens: 100,
                output_tokens: 10,
            },
        }
    }

    /// Number of `complete` calls made so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Snapshot of every request received.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn lock_replies(&self) -> std::sync::MutexGuard<'_, VecDeque<MockReply>> {
        self.replies.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for MockLlmProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request);
        match self.lock_replies().pop_front() {
            Some(MockReply::Text(response)) => Ok(response),
            Some(MockReply::Failure(message)) => Err(LlmError::Connection { message }),
            None => Ok(Self::text_response(Self::FALLBACK_TEXT)),
        }
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builders() {
        let req = CompletionRequest::new("sys", "user")
            .with_temperature(0.2)
            .with_json_response()
            .with_max_tokens(64);
        assert_eq!(req.system_prompt, "sys");
        assert_eq!(req.user_prompt, "user");
        assert_eq!(req.temperature, 0.2);
        assert!(req.json_response);
        assert_eq!(req.max_tokens, Some(64));
    }

    #[test]
    fn test_token_usage_total() {
        let usage = TokenUsage {
            input_tokens: 7,
            output_tokens: 3,
        };
        assert_eq!(usage.total(), 10);
    }

    #[tokio::test]
    async fn test_mock_provider_fifo_then_fallback() {
        let provider = MockLlmProvider::new();
        provider.queue_text("first");
        provider.queue_text("second");

        let a = provider.complete(CompletionRequest::new("s", "1")).await.unwrap();
        let b = provider.complete(CompletionRequest::new("s", "2")).await.unwrap();
        let c = provider.complete(CompletionRequest::new("s", "3")).await.unwrap();
        assert_eq!(a.text, "first");
        assert_eq!(b.text, "second");
        assert_eq!(c.text, MockLlmProvider::FALLBACK_TEXT);
        assert_eq!(provider.call_count(), 3);
    }

    #[tokio::test]
    async fn test_mock_provider_failure_and_capture() {
        let provider = MockLlmProvider::new();
        provider.queue_failure("offline");

        let err = provider
            .complete(CompletionRequest::new("system", "hello"))
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Connection { .. }));

        let requests = provider.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].user_prompt, "hello");
        assert_eq!(provider.model_name(), "mock-model");
    }
}
