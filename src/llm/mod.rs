//! LLM integration for lexigen.
//!
//! Provides the client trait shared by all providers, retry/backoff around
//! transport failures, and structured-output parsing with a lenient repair
//! pass.

pub mod debug_log;
pub mod factory;
pub mod mock;
pub mod ollama;
pub mod openai;
pub mod prompt;

pub use debug_log::DebugSink;
pub use factory::{create_client, create_client_for_project};
pub use mock::MockLlmClient;
pub use ollama::{OllamaClient, OllamaConfig};
pub use openai::{OpenAiClient, OpenAiConfig};

use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::{LexigenError, Result};

/// Maximum attempts per logical LLM call.
const MAX_ATTEMPTS: u32 = 3;

/// Options carried by every LLM call.
#[derive(Debug, Clone)]
pub struct CallOptions {
    /// Per-call HTTP timeout. In-flight requests are not preempted by
    /// cancellation; this bound is what limits them.
    pub timeout: Duration,
    /// Cooperative cancellation latch, checked between attempts and
    /// immediately before each HTTP request.
    pub cancel: CancellationToken,
}

impl CallOptions {
    /// Creates options with the given timeout and cancel token.
    pub fn new(timeout: Duration, cancel: CancellationToken) -> Self {
        Self { timeout, cancel }
    }

    /// Returns the cancellation sentinel if the token is set.
    pub fn ensure_not_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(LexigenError::Cancelled);
        }
        Ok(())
    }
}

impl Default for CallOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            cancel: CancellationToken::new(),
        }
    }
}

/// Trait for LLM clients that generate glossary content.
///
/// Implementations must be thread-safe (Send + Sync) to support async
/// operations across run workers.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Generates a free-text completion for the given prompt.
    async fn generate(&self, prompt: &str, options: &CallOptions) -> Result<String>;

    /// Generates a completion constrained to a JSON object.
    ///
    /// The client asks the model to answer with JSON matching `schema`,
    /// parses the reply strictly, and on failure makes a single repair pass
    /// that extracts the outermost `{...}` block before giving up.
    async fn generate_structured(
        &self,
        prompt: &str,
        schema: &Value,
        options: &CallOptions,
    ) -> Result<Value> {
        let wrapped = structured_prompt(prompt, schema);
        let text = self.generate(&wrapped, options).await?;
        parse_structured(&text)
    }

    /// Cheap round-trip probe of the backing service.
    async fn is_available(&self) -> bool;
}

/// LLM provider type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LlmProvider {
    /// Local Ollama instance.
    #[default]
    Ollama,
    /// OpenAI or any OpenAI-compatible endpoint.
    OpenAi,
    /// Mock client for testing (no network).
    Mock,
}

impl LlmProvider {
    /// Returns the provider as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ollama => "ollama",
            Self::OpenAi => "openai",
            Self::Mock => "mock",
        }
    }
}

impl FromStr for LlmProvider {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAi),
            "mock" => Ok(Self::Mock),
            _ => Err(format!("Unknown LLM provider: {}", s)),
        }
    }
}

impl std::fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One attempt's failure, tagged with whether retrying can help.
pub(crate) struct AttemptError {
    pub error: LexigenError,
    pub retryable: bool,
}

impl AttemptError {
    pub fn retryable(error: LexigenError) -> Self {
        Self {
            error,
            retryable: true,
        }
    }

    pub fn fatal(error: LexigenError) -> Self {
        Self {
            error,
            retryable: false,
        }
    }
}

/// Runs an LLM attempt with retry and exponential backoff.
///
/// Up to three attempts; the delay before retry n is `2^(n-1)` seconds
/// (1 s, then 2 s). Only transport errors and timeouts are retried; a
/// successful HTTP response that fails validation is not. Cancellation is
/// observed during backoff sleeps and before every attempt.
pub(crate) async fn call_with_retry<F, Fut>(options: &CallOptions, mut attempt_fn: F) -> Result<String>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<String, AttemptError>>,
{
    for attempt in 1..=MAX_ATTEMPTS {
        if attempt > 1 {
            let delay = Duration::from_secs(1 << (attempt - 2));
            tokio::select! {
                _ = options.cancel.cancelled() => return Err(LexigenError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
        options.ensure_not_cancelled()?;

        match attempt_fn().await {
            Ok(text) => return Ok(text),
            Err(err) if err.retryable && attempt < MAX_ATTEMPTS => {
                warn!(attempt, "LLM call failed, retrying: {}", err.error);
            }
            Err(err) => return Err(err.error),
        }
    }

    unreachable!("retry loop returns on the final attempt")
}

/// Wraps a prompt with the JSON-output instruction and expected schema.
fn structured_prompt(prompt: &str, schema: &Value) -> String {
    format!(
        "{prompt}\n\nAnswer with a single JSON object matching this schema, \
         and nothing else:\n{schema}"
    )
}

/// Parses model output as a JSON object, with a single repair pass.
pub fn parse_structured(text: &str) -> Result<Value> {
    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        if value.is_object() {
            return Ok(value);
        }
    }

    let block = extract_json_object(trimmed).ok_or_else(|| {
        LexigenError::llm(format!(
            "Response contains no JSON object: {}",
            truncate_for_log(trimmed)
        ))
    })?;

    serde_json::from_str(&block).map_err(|e| {
        LexigenError::llm(format!(
            "Failed to parse extracted JSON object: {e}: {}",
            truncate_for_log(&block)
        ))
    })
}

/// Extracts the first balanced `{...}` block from free text.
///
/// String literals are tracked so braces inside them do not affect nesting.
fn extract_json_object(text: &str) -> Option<String> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(text[start..start + offset + c.len_utf8()].to_string());
                }
            }
            _ => {}
        }
    }

    None
}

fn truncate_for_log(text: &str) -> &str {
    let mut end = text.len().min(200);
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Instant;

    #[test]
    fn test_provider_from_str() {
        assert_eq!("ollama".parse::<LlmProvider>().unwrap(), LlmProvider::Ollama);
        assert_eq!("OpenAI".parse::<LlmProvider>().unwrap(), LlmProvider::OpenAi);
        assert_eq!("mock".parse::<LlmProvider>().unwrap(), LlmProvider::Mock);
        assert!("cohere".parse::<LlmProvider>().is_err());
    }

    #[test]
    fn test_parse_structured_strict() {
        let value = parse_structured(r#"{"category": "person_name"}"#).unwrap();
        assert_eq!(value["category"], "person_name");
    }

    #[test]
    fn test_parse_structured_repairs_wrapped_json() {
        let text = "Sure! Here is the result:\n```json\n{\"category\": \"coined\"}\n```\nDone.";
        let value = parse_structured(text).unwrap();
        assert_eq!(value["category"], "coined");
    }

    #[test]
    fn test_parse_structured_handles_braces_in_strings() {
        let text = r#"prefix {"definition": "uses { and } freely", "confidence": 0.8} suffix"#;
        let value = parse_structured(text).unwrap();
        assert_eq!(value["definition"], "uses { and } freely");
    }

    #[test]
    fn test_parse_structured_takes_first_balanced_block() {
        let text = r#"{"a": 1} {"b": 2}"#;
        let value = parse_structured(text).unwrap();
        assert_eq!(value["a"], 1);
        assert!(value.get("b").is_none());
    }

    #[test]
    fn test_parse_structured_fails_without_object() {
        assert!(parse_structured("no json here").is_err());
        assert!(parse_structured("[1, 2, 3]").is_err());
        assert!(parse_structured("{unclosed").is_err());
    }

    #[test]
    fn test_structured_prompt_includes_schema() {
        let schema = serde_json::json!({"category": "string"});
        let prompt = structured_prompt("Classify this.", &schema);
        assert!(prompt.starts_with("Classify this."));
        assert!(prompt.contains("\"category\""));
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_transient_failure() {
        let attempts = Arc::new(AtomicU32::new(0));
        let options = CallOptions::default();

        let attempts_clone = attempts.clone();
        let start = Instant::now();
        let result = call_with_retry(&options, move || {
            let attempts = attempts_clone.clone();
            async move {
                if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(AttemptError::retryable(LexigenError::llm("connect refused")))
                } else {
                    Ok("ok".to_string())
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        // Backoff before the second attempt is one second
        assert!(start.elapsed() >= Duration::from_millis(900));
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_three_attempts() {
        let attempts = Arc::new(AtomicU32::new(0));
        let options = CallOptions::default();

        let attempts_clone = attempts.clone();
        let result = call_with_retry(&options, move || {
            let attempts = attempts_clone.clone();
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err::<String, _>(AttemptError::retryable(LexigenError::llm("down")))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_does_not_retry_fatal_errors() {
        let attempts = Arc::new(AtomicU32::new(0));
        let options = CallOptions::default();

        let attempts_clone = attempts.clone();
        let result = call_with_retry(&options, move || {
            let attempts = attempts_clone.clone();
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err::<String, _>(AttemptError::fatal(LexigenError::llm("400 bad request")))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_observes_cancellation_before_attempt() {
        let options = CallOptions::default();
        options.cancel.cancel();

        let result = call_with_retry(&options, || async { Ok("never".to_string()) }).await;
        assert!(matches!(result, Err(LexigenError::Cancelled)));
    }

    #[tokio::test]
    async fn test_retry_observes_cancellation_during_backoff() {
        let options = CallOptions::default();
        let cancel = options.cancel.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        });

        let start = Instant::now();
        let result = call_with_retry(&options, || async {
            Err::<String, _>(AttemptError::retryable(LexigenError::llm("down")))
        })
        .await;

        assert!(matches!(result, Err(LexigenError::Cancelled)));
        // Cancelled mid-backoff, well before the one-second delay elapses
        assert!(start.elapsed() < Duration::from_millis(900));
    }
}
