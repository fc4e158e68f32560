//! Ollama LLM client implementation.
//!
//! Implements the LlmClient trait for local Ollama instances, the default
//! provider for glossary runs without API costs.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::{LexigenError, Result};
use crate::llm::debug_log::DebugSink;
use crate::llm::{call_with_retry, AttemptError, CallOptions, LlmClient};

/// Default Ollama API URL.
const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Ollama client configuration.
#[derive(Debug, Clone)]
pub struct OllamaConfig {
    /// Base URL for the Ollama API.
    pub base_url: String,
    /// Model to use (e.g., "qwen2.5:14b", "llama3.2:3b").
    pub model: String,
}

impl OllamaConfig {
    /// Creates a new config with the given model.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_OLLAMA_URL.to_string(),
            model: model.into(),
        }
    }

    /// Sets the base URL.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

/// Ollama LLM client.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    config: OllamaConfig,
    client: Client,
    debug: DebugSink,
}

impl OllamaClient {
    /// Creates a new Ollama client with the given configuration.
    pub fn new(config: OllamaConfig, debug: DebugSink) -> Result<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| LexigenError::llm(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            config,
            client,
            debug,
        })
    }

    /// Returns the generate API endpoint URL.
    fn generate_url(&self) -> String {
        format!("{}/api/generate", self.config.base_url.trim_end_matches('/'))
    }

    /// Issues one generate request; classifies failures for the retry loop.
    async fn attempt_generate(
        &self,
        prompt: &str,
        options: &CallOptions,
    ) -> std::result::Result<String, AttemptError> {
        let request = OllamaGenerateRequest {
            model: self.config.model.clone(),
            prompt: prompt.to_string(),
            stream: false,
        };

        let response = self
            .client
            .post(self.generate_url())
            .timeout(options.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                let error = if e.is_timeout() {
                    LexigenError::llm("Ollama request timed out")
                } else if e.is_connect() {
                    LexigenError::llm(
                        "Failed to connect to Ollama. Is it running? Try: ollama serve",
                    )
                } else {
                    LexigenError::llm(format!("Ollama request failed: {}", e))
                };
                AttemptError::retryable(error)
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            AttemptError::retryable(LexigenError::llm(format!("Failed to read response: {e}")))
        })?;

        if !status.is_success() {
            return Err(AttemptError::fatal(LexigenError::llm(format!(
                "Ollama API error ({status}): {body}"
            ))));
        }

        let parsed: OllamaGenerateResponse = serde_json::from_str(&body).map_err(|e| {
            AttemptError::fatal(LexigenError::llm(format!("Failed to parse response: {e}")))
        })?;

        if parsed.response.is_empty() {
            return Err(AttemptError::fatal(LexigenError::llm(
                "Empty response from Ollama",
            )));
        }

        Ok(parsed.response)
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
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
        let url = format!("{}/api/tags", self.config.base_url.trim_end_matches('/'));
        match self.client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}

// Ollama API types

#[derive(Debug, Serialize)]
struct OllamaGenerateRequest {
    model: String,
    prompt: String,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct OllamaGenerateResponse {
    #[serde(default)]
    response: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = OllamaConfig::new("qwen2.5:14b");
        assert_eq!(config.base_url, DEFAULT_OLLAMA_URL);
        assert_eq!(config.model, "qwen2.5:14b");
    }

    #[test]
    fn test_generate_url_handles_trailing_slash() {
        let client = OllamaClient::new(
            OllamaConfig::new("m").with_url("http://host:11434/"),
            DebugSink::disabled(),
        )
        .unwrap();
        assert_eq!(client.generate_url(), "http://host:11434/api/generate");
    }

    #[test]
    fn test_response_parses_with_missing_field() {
        let parsed: OllamaGenerateResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.response.is_empty());
    }
}
