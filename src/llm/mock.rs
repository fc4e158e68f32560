//! Mock LLM client for testing.
//!
//! Returns canned responses based on prompt patterns, with optional per-call
//! latency and transient-failure injection so retry and cancellation paths
//! can be exercised without a network.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::error::{LexigenError, Result};
use crate::llm::{call_with_retry, AttemptError, CallOptions, LlmClient};

/// Mock LLM client that returns canned responses based on input patterns.
///
/// Used for unit and pipeline testing without making real API calls.
#[derive(Debug, Clone, Default)]
pub struct MockLlmClient {
    /// Custom response mappings (pattern -> response), first match wins.
    custom_responses: Vec<(String, String)>,
    /// Simulated per-call latency (an in-flight call ignores cancellation,
    /// like a real HTTP request).
    delay: Option<Duration>,
    /// Remaining transient failures before calls start succeeding.
    transient_failures: Arc<AtomicU32>,
    /// Prompts matching any of these patterns fail hard, without retry.
    failing_patterns: Vec<String>,
    /// Started-attempt timestamps, for asserting retry pacing.
    attempt_log: Arc<Mutex<Vec<Instant>>>,
}

impl MockLlmClient {
    /// Creates a new mock client with no canned responses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a custom response mapping.
    ///
    /// When the prompt contains `pattern` (case-insensitive), the mock
    /// returns `response`.
    pub fn with_response(
        mut self,
        pattern: impl Into<String>,
        response: impl Into<String>,
    ) -> Self {
        self.custom_responses
            .push((pattern.into(), response.into()));
        self
    }

    /// Simulates slow calls; useful for cancellation tests.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Makes the next `n` attempts fail with a retryable transport error.
    pub fn with_transient_failures(self, n: u32) -> Self {
        self.transient_failures.store(n, Ordering::SeqCst);
        self
    }

    /// Fails hard for prompts containing `pattern` (case-insensitive).
    pub fn with_failing_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.failing_patterns.push(pattern.into());
        self
    }

    /// Returns the number of attempts started so far.
    pub fn attempt_count(&self) -> usize {
        self.attempt_log.lock().unwrap().len()
    }

    /// Returns the instants at which attempts started.
    pub fn attempt_times(&self) -> Vec<Instant> {
        self.attempt_log.lock().unwrap().clone()
    }

    /// Generates a mock response based on the prompt.
    fn mock_response(&self, prompt: &str) -> String {
        let prompt_lower = prompt.to_lowercase();

        for (pattern, response) in &self.custom_responses {
            if prompt_lower.contains(&pattern.to_lowercase()) {
                return response.clone();
            }
        }

        // Benign structured fallback: engines treat an empty object as
        // "nothing to report"
        "{}".to_string()
    }

    async fn attempt(&self, prompt: &str) -> std::result::Result<String, AttemptError> {
        self.attempt_log.lock().unwrap().push(Instant::now());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let remaining = self.transient_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.transient_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(AttemptError::retryable(LexigenError::llm(
                "mock transport error",
            )));
        }

        let prompt_lower = prompt.to_lowercase();
        if self
            .failing_patterns
            .iter()
            .any(|p| prompt_lower.contains(&p.to_lowercase()))
        {
            return Err(AttemptError::fatal(LexigenError::llm("mock hard failure")));
        }

        Ok(self.mock_response(prompt))
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn generate(&self, prompt: &str, options: &CallOptions) -> Result<String> {
        call_with_retry(options, || self.attempt(prompt)).await
    }

    async fn is_available(&self) -> bool {
        true
    }
}
