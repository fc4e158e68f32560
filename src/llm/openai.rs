//! OpenAI-compatible LLM client implementation.
//!
//! Talks to the chat-completions API of OpenAI or any compatible server;
//! a project's `llm_base_url` points it at local gateways.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::{LexigenError, Result};
use crate::llm::debug_log::DebugSink;
use crate::llm::{call_with_retry, AttemptError, CallOptions, LlmClient};

/// OpenAI API base URL.
const OPENAI_API_URL: &str = "https://api.openai.com/v1";

/// OpenAI client configuration.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// API key for authentication; may be empty for local compatible servers.
    pub api_key: String,
    /// Model to use (e.g., "gpt-4o-mini").
    pub model: String,
    /// API base URL up to and including the version segment.
    pub base_url: String,
}

impl OpenAiConfig {
    /// Creates a new config with the given API key and model.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: OPENAI_API_URL.to_string(),
        }
    }

    /// Sets the base URL (for OpenAI-compatible servers).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

/// OpenAI-compatible LLM client.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    config: OpenAiConfig,
    client: Client,
    debug: DebugSink,
}

impl OpenAiClient {
    /// Creates a new client with the given configuration.
    pub fn new(config: OpenAiConfig, debug: DebugSink) -> Result<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| LexigenError::llm(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            config,
            client,
            debug,
        })
    }

    /// Returns the chat-completions endpoint URL.
    fn completions_url(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }

    /// Parses an API error response into a user-facing message.
    fn parse_error(status: reqwest::StatusCode, body: &str) -> LexigenError {
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return LexigenError::llm("Authentication failed. Check your OPENAI_API_KEY.");
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return LexigenError::llm("Rate limited. Please wait and try again.");
        }
        if let Ok(error_response) = serde_json::from_str::<OpenAiErrorResponse>(body) {
            return LexigenError::llm(format!("OpenAI API error: {}", error_response.error.message));
        }
        LexigenError::llm(format!("OpenAI API error ({status}): {body}"))
    }

    /// Issues one completion request; classifies failures for the retry loop.
    async fn attempt_generate(
        &self,
        prompt: &str,
        options: &CallOptions,
    ) -> std::result::Result<String, AttemptError> {
        let request = OpenAiRequest {
            model: self.config.model.clone(),
            messages: vec![OpenAiMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            stream: false,
        };

        let mut builder = self
            .client
            .post(self.completions_url())
            .timeout(options.timeout)
            .json(&request);
        if !self.config.api_key.is_empty() {
            builder = builder.bearer_auth(&self.config.api_key);
        }

        let response = builder.send().await.map_err(|e| {
            let error = if e.is_timeout() {
                LexigenError::llm("Request timed out")
            } else if e.is_connect() {
                LexigenError::llm("Failed to connect to the OpenAI-compatible endpoint")
            } else {
                LexigenError::llm(format!("Request failed: {}", e))
            };
            AttemptError::retryable(error)
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            AttemptError::retryable(LexigenError::llm(format!("Failed to read response: {e}")))
        })?;

        // A completed HTTP exchange with a bad status is not a transport
        // failure; surface it without retrying.
        if !status.is_success() {
            return Err(AttemptError::fatal(Self::parse_error(status, &body)));
        }

        let parsed: OpenAiResponse = serde_json::from_str(&body).map_err(|e| {
            AttemptError::fatal(LexigenError::llm(format!("Failed to parse response: {e}")))
        })?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();

        if text.is_empty() {
            return Err(AttemptError::fatal(LexigenError::llm(
                "No response content from the model",
            )));
        }

        Ok(text)
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn generate(&self, prompt: &str, options: &CallOptions) -> Result<String> {
        let start = Instant::now();
        let result = call_with_retry(options, || self.attempt_generate(prompt, options)).await;

        let response_for_log = match &result {
            Ok(text) => text.clone(),
            Err(e) => format!("ERROR: {e}"),
        };
        self.debug.record(
            &self.config.model,
            "generate",
            start.elapsed(),
            prompt,
            &response_for_log,
        );

        result
    }

    async fn is_available(&self) -> bool {
        let url = format!("{}/models", self.config.base_url.trim_end_matches('/'));
        let mut builder = self.client.get(&url);
        if !self.config.api_key.is_empty() {
            builder = builder.bearer_auth(&self.config.api_key);
        }
        match builder.send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}

// OpenAI API types

#[derive(Debug, Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    stream: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiResponseMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponseMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorResponse {
    error: OpenAiError,
}

#[derive(Debug, Deserialize)]
struct OpenAiError {
    message: String,
}
