//! LLM client factory.
//!
//! Centralizes provider-specific construction and is the single place the
//! debug sink is plumbed into clients, so every call path logs the same way.

use std::sync::Arc;

use crate::error::{LexigenError, Result};
use crate::llm::{
    DebugSink, LlmClient, LlmProvider, MockLlmClient, OllamaClient, OllamaConfig, OpenAiClient,
    OpenAiConfig,
};
use crate::model::Project;

/// Creates an LLM client for the given provider settings.
///
/// `base_url` overrides the provider default when non-empty. For OpenAI the
/// API key resolves from `OPENAI_API_KEY`; a missing key is allowed only
/// when a custom base URL points at a local compatible server.
pub fn create_client(
    provider: LlmProvider,
    model: &str,
    base_url: &str,
    debug: DebugSink,
) -> Result<Arc<dyn LlmClient>> {
    match provider {
        LlmProvider::Ollama => {
            let mut config = OllamaConfig::new(model);
            if !base_url.is_empty() {
                config = config.with_url(base_url);
            }
            Ok(Arc::new(OllamaClient::new(config, debug)?))
        }
        LlmProvider::OpenAi => {
            let api_key = std::env::var("OPENAI_API_KEY").unwrap_or_default();
            if api_key.is_empty() && base_url.is_empty() {
                return Err(LexigenError::llm(
                    "No API key configured. Set OPENAI_API_KEY or configure a base URL.",
                ));
            }
            let mut config = OpenAiConfig::new(api_key, model);
            if !base_url.is_empty() {
                config = config.with_base_url(base_url);
            }
            Ok(Arc::new(OpenAiClient::new(config, debug)?))
        }
        LlmProvider::Mock => Ok(Arc::new(MockLlmClient::new())),
    }
}

/// Creates the client for a project row.
pub fn create_client_for_project(project: &Project, debug: DebugSink) -> Result<Arc<dyn LlmClient>> {
    let provider = project
        .llm_provider
        .parse::<LlmProvider>()
        .map_err(LexigenError::config)?;
    create_client(provider, &project.llm_model, &project.llm_base_url, debug)
}
