//! Lectern LLM Provider Layer
//!
//! Pluggable language-model providers for the structured extractor.
//!
//! # Architecture
//!
//! This crate provides implementations of the `LlmProvider` trait from
//! `lectern-domain`. Providers are synchronous; the extractor runs them on
//! tokio's blocking pool under a per-call timeout and retries transient
//! failures according to its retry policy.
//!
//! # Providers
//!
//! - `MockProvider`: Deterministic mock for testing
//! - `OpenAiProvider`: OpenAI-compatible chat completions API
//!
//! # Examples
//!
//! ```
//! use lectern_llm::MockProvider;
//! use lectern_domain::LlmProvider;
//!
//! let provider = MockProvider::new(r#"{"ic50": {"value": 2.5}}"#);
//! let reply = provider.complete("test prompt").unwrap();
//! assert_eq!(reply, r#"{"ic50": {"value": 2.5}}"#);
//! ```

#![warn(missing_docs)]

pub mod openai;

use lectern_domain::{LlmProvider, Retryable};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

pub use openai::OpenAiProvider;

/// Errors that can occur during LLM operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    /// Network or API communication error
    #[error("Communication error: {0}")]
    Communication(String),

    /// The request timed out
    #[error("Request timed out")]
    Timeout,

    /// Rate limit exceeded
    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    /// Provider-side failure (HTTP 5xx)
    #[error("Server error {status}: {body}")]
    Server {
        /// HTTP status code
        status: u16,
        /// Response body
        body: String,
    },

    /// Request refused by the provider (HTTP 4xx)
    #[error("Request rejected with status {status}: {body}")]
    Rejected {
        /// HTTP status code
        status: u16,
        /// Response body
        body: String,
    },

    /// Invalid response from LLM
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Model not available
    #[error("Model not available: {0}")]
    ModelNotAvailable(String),

    /// Generic error
    #[error("LLM error: {0}")]
    Other(String),
}

impl Retryable for LlmError {
    fn is_transient(&self) -> bool {
        matches!(
            self,
            LlmError::Communication(_)
                | LlmError::Timeout
                | LlmError::RateLimitExceeded
                | LlmError::Server { .. }
        )
    }
}

#[derive(Debug, Clone)]
enum MockReply {
    Text(String),
    Transient(String),
    Permanent(String),
}

impl MockReply {
    fn into_result(self) -> Result<String, LlmError> {
        match self {
            MockReply::Text(text) => Ok(text),
            MockReply::Transient(msg) => Err(LlmError::Communication(msg)),
            MockReply::Permanent(msg) => Err(LlmError::Other(msg)),
        }
    }
}

/// Mock LLM provider for deterministic testing
///
/// Replies are chosen in this order: queued replies (first in, first out),
/// then the first registered pattern contained in the prompt, then the
/// default response. Every prompt is recorded.
///
/// # Examples
///
/// ```
/// use lectern_llm::MockProvider;
/// use lectern_domain::LlmProvider;
///
/// let provider = MockProvider::default();
/// provider.add_response("TTX", r#"{"ic50": {"value": 1.8}}"#);
/// provider.add_response("lidocaine", r#"{"ic50": {"value": 210.0}}"#);
/// assert_eq!(provider.complete("IC50 of TTX?").unwrap(), r#"{"ic50": {"value": 1.8}}"#);
/// assert_eq!(provider.call_count(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct MockProvider {
    default_response: String,
    model: String,
    responses: Arc<Mutex<Vec<(String, MockReply)>>>,
    queue: Arc<Mutex<VecDeque<MockReply>>>,
    prompts: Arc<Mutex<Vec<String>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockProvider {
    /// Create a new MockProvider with a fixed response for all prompts
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            default_response: response.into(),
            model: "mock".to_string(),
            responses: Arc::new(Mutex::new(Vec::new())),
            queue: Arc::new(Mutex::new(VecDeque::new())),
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Reply with `response` to prompts containing `pattern`
    pub fn add_response(&self, pattern: impl Into<String>, response: impl Into<String>) {
        lock(&self.responses).push((pattern.into(), MockReply::Text(response.into())));
    }

    /// Fail permanently on prompts containing `pattern`
    pub fn add_error(&self, pattern: impl Into<String>) {
        lock(&self.responses).push((pattern.into(), MockReply::Permanent("Mock error".to_string())));
    }

    /// Queue a reply for the next call
    pub fn push_response(&self, response: impl Into<String>) {
        lock(&self.queue).push_back(MockReply::Text(response.into()));
    }

    /// Queue a transient failure for the next call
    pub fn push_transient_failure(&self) {
        lock(&self.queue).push_back(MockReply::Transient("Mock connection reset".to_string()));
    }

    /// Queue a permanent failure for the next call
    pub fn push_error(&self) {
        lock(&self.queue).push_back(MockReply::Permanent("Mock error".to_string()));
    }

    /// Get the number of times complete was called
    pub fn call_count(&self) -> usize {
        lock(&self.prompts).len()
    }

    /// Reset the call count and recorded prompts
    pub fn reset_call_count(&self) {
        lock(&self.prompts).clear();
    }

    /// Prompts received so far, oldest first
    pub fn prompts(&self) -> Vec<String> {
        lock(&self.prompts).clone()
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new("{}")
    }
}

impl LlmProvider for MockProvider {
    type Error = LlmError;

    fn complete(&self, prompt: &str) -> Result<String, Self::Error> {
        lock(&self.prompts).push(prompt.to_string());

        if let Some(reply) = lock(&self.queue).pop_front() {
            return reply.into_result();
        }

        let responses = lock(&self.responses);
        if let Some((_, reply)) = responses.iter().find(|(pattern, _)| prompt.contains(pattern.as_str())) {
            return reply.clone().into_result();
        }

        Ok(self.default_response.clone())
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_provider_default() {
        let provider = MockProvider::new("Test response");
        let result = provider.complete("any prompt");
        assert_eq!(result.unwrap(), "Test response");
        assert_eq!(provider.model_name(), "mock");
    }

    #[test]
    fn test_mock_provider_pattern_responses() {
        let provider = MockProvider::default();
        provider.add_response("hello", "world");
        provider.add_response("foo", "bar");

        assert_eq!(provider.complete("say hello").unwrap(), "world");
        assert_eq!(provider.complete("foo?").unwrap(), "bar");
        assert_eq!(provider.complete("unknown").unwrap(), "{}");
    }

    #[test]
    fn test_mock_provider_queue_takes_precedence() {
        let provider = MockProvider::new("default");
        provider.add_response("x", "pattern");
        provider.push_transient_failure();
        provider.push_response("queued");

        let first = provider.complete("x").unwrap_err();
        assert!(first.is_transient());
        assert_eq!(provider.complete("x").unwrap(), "queued");
        assert_eq!(provider.complete("x").unwrap(), "pattern");
    }

    #[test]
    fn test_mock_provider_call_count() {
        let provider = MockProvider::new("test");
        assert_eq!(provider.call_count(), 0);

        provider.complete("prompt1").unwrap();
        provider.complete("prompt2").unwrap();
        assert_eq!(provider.call_count(), 2);
        assert_eq!(provider.prompts(), vec!["prompt1", "prompt2"]);

        provider.reset_call_count();
        assert_eq!(provider.call_count(), 0);
    }

    #[test]
    fn test_mock_provider_error() {
        let provider = MockProvider::default();
        provider.add_error("bad prompt");

        let err = provider.complete("a bad prompt").unwrap_err();
        assert!(matches!(err, LlmError::Other(_)));
        assert!(!err.is_transient());

        provider.push_error();
        assert!(provider.complete("fine").is_err());
    }

    #[test]
    fn test_mock_provider_clone_shares_state() {
        let provider1 = MockProvider::new("test");
        let provider2 = provider1.clone();

        provider1.complete("test").unwrap();
        assert_eq!(provider1.call_count(), 1);
        assert_eq!(provider2.call_count(), 1);
    }

    #[test]
    fn test_error_classification() {
        assert!(LlmError::Timeout.is_transient());
        assert!(LlmError::RateLimitExceeded.is_transient());
        assert!(LlmError::Server { status: 503, body: String::new() }.is_transient());
        assert!(!LlmError::Rejected { status: 400, body: String::new() }.is_transient());
        assert!(!LlmError::InvalidResponse("x".into()).is_transient());
        assert!(!LlmError::ModelNotAvailable("gpt".into()).is_transient());
    }
}
