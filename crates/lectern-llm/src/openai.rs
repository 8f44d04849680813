//! OpenAI-compatible Provider Implementation
//!
//! Talks to any server exposing the `/chat/completions` endpoint (OpenAI,
//! Azure-style gateways, vLLM, llama.cpp server, Ollama's compatibility API).
//!
//! # Features
//!
//! - Blocking HTTP client, meant to run on a blocking thread
//! - JSON reply mode so the model answers with a single object
//! - Error classification into transient and permanent failures
//!
//! # Examples
//!
//! ```no_run
//! use lectern_llm::OpenAiProvider;
//! use std::time::Duration;
//!
//! let provider = OpenAiProvider::new(
//!     "https://api.openai.com/v1",
//!     "gpt-4o-mini",
//!     Some("sk-...".to_string()),
//!     Duration::from_secs(120),
//! )
//! .unwrap()
//! .with_temperature(0.0);
//! ```

use crate::LlmError;
use lectern_domain::LlmProvider;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Default API endpoint
pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1";

/// Default sampling temperature
pub const DEFAULT_TEMPERATURE: f32 = 0.0;

/// Chat-completions provider
pub struct OpenAiProvider {
    endpoint: String,
    model: String,
    api_key: Option<String>,
    temperature: f32,
    json_mode: bool,
    client: reqwest::blocking::Client,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

/// Request body for the chat completions API
#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

/// Response from the chat completions API
#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiProvider {
    /// Create a provider
    ///
    /// # Parameters
    ///
    /// - `endpoint`: API base URL, without the `/chat/completions` suffix
    /// - `model`: Model to use
    /// - `api_key`: Bearer token, if the endpoint needs one
    /// - `timeout`: Upper bound on one HTTP exchange
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::Communication(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key,
            temperature: DEFAULT_TEMPERATURE,
            json_mode: true,
            client,
        })
    }

    /// Set the sampling temperature
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Ask for a JSON object reply (on by default)
    pub fn with_json_mode(mut self, json_mode: bool) -> Self {
        self.json_mode = json_mode;
        self
    }

    fn request_body<'a>(&'a self, prompt: &'a str) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.temperature,
            response_format: self.json_mode.then_some(ResponseFormat { kind: "json_object" }),
        }
    }
}

/// Map a non-success HTTP status to an error
fn classify_status(status: u16, body: String, model: &str) -> LlmError {
    match status {
        429 => LlmError::RateLimitExceeded,
        404 => LlmError::ModelNotAvailable(model.to_string()),
        500..=599 => LlmError::Server { status, body },
        _ => LlmError::Rejected { status, body },
    }
}

/// Pull the reply text out of a chat completions response body
fn parse_completion(body: &str) -> Result<String, LlmError> {
    let response: ChatResponse = serde_json::from_str(body)
        .map_err(|e| LlmError::InvalidResponse(format!("Failed to parse response: {}", e)))?;
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| LlmError::InvalidResponse("Response contains no message content".to_string()))
}

impl LlmProvider for OpenAiProvider {
    type Error = LlmError;

    fn complete(&self, prompt: &str) -> Result<String, Self::Error> {
        let url = format!("{}/chat/completions", self.endpoint);
        let mut request = self.client.post(&url).json(&self.request_body(prompt));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().map_err(|e| {
            if e.is_timeout() {
                LlmError::Timeout
            } else {
                LlmError::Communication(format!("Request failed: {}", e))
            }
        })?;

        let status = response.status();
        let body = response.text().map_err(|e| {
            if e.is_timeout() {
                LlmError::Timeout
            } else {
                LlmError::Communication(format!("Failed to read response: {}", e))
            }
        })?;

        if !status.is_success() {
            return Err(classify_status(status.as_u16(), body, &self.model));
        }

        let content = parse_completion(&body)?;
        debug!(model = %self.model, reply_chars = content.len(), "Completion received");
        Ok(content)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
