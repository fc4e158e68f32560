//! Run events, execution context, and callback safety.
//!
//! The executor never talks to subscribers directly: it emits `RunEvent`s
//! through a log callback owned by the run manager. Every callback
//! invocation goes through `safe_callback`, so a faulty subscriber can
//! never take down a run.

use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::{LexigenError, Result};
use crate::llm::{CallOptions, DebugSink};

/// Severity of a log event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

/// A log record streamed to subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEvent {
    pub run_id: i64,
    pub level: LogLevel,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_current: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_total: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_term: Option<String>,
}

impl LogEvent {
    /// Creates a bare log event with no progress payload.
    pub fn new(run_id: i64, level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            run_id,
            level,
            message: message.into(),
            step: None,
            progress_current: None,
            progress_total: None,
            current_term: None,
        }
    }
}

/// An event on a run's stream; `Complete` is always the last one.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RunEvent {
    Log(LogEvent),
    Complete { run_id: i64, complete: bool },
}

impl RunEvent {
    /// The terminal sentinel for a run's stream.
    pub fn complete(run_id: i64) -> Self {
        Self::Complete {
            run_id,
            complete: true,
        }
    }

    /// Returns true for the terminal sentinel.
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete { .. })
    }

    /// The run this event belongs to.
    pub fn run_id(&self) -> i64 {
        match self {
            Self::Log(event) => event.run_id,
            Self::Complete { run_id, .. } => *run_id,
        }
    }
}

/// Callback the executor emits events through.
pub type LogCallback = Arc<dyn Fn(RunEvent) + Send + Sync>;

/// Progress callback invoked per processed item.
pub type ProgressFn<'a> = dyn Fn(usize, usize, &str) + Sync + 'a;

/// Invokes a callback, swallowing panics.
///
/// Callback faults are logged at warning level and never propagate; the
/// pipeline must keep running no matter what a subscriber does.
pub fn safe_callback<F: FnOnce()>(name: &str, f: F) {
    if catch_unwind(AssertUnwindSafe(f)).is_err() {
        warn!("Callback '{name}' panicked; continuing");
    }
}

/// Everything a pipeline execution needs from its run manager.
#[derive(Clone)]
pub struct ExecutionContext {
    pub run_id: i64,
    pub cancel: CancellationToken,
    pub log: LogCallback,
    pub debug: DebugSink,
    /// Per-LLM-call timeout; there is no global run timeout.
    pub llm_timeout: Duration,
}

impl ExecutionContext {
    /// Creates a context with a no-op log callback (tests, CLI probes).
    pub fn detached(run_id: i64) -> Self {
        Self {
            run_id,
            cancel: CancellationToken::new(),
            log: Arc::new(|_| {}),
            debug: DebugSink::disabled(),
            llm_timeout: Duration::from_secs(120),
        }
    }

    /// Raises the cancellation sentinel if the run was cancelled.
    ///
    /// Stages call this on entry; per-item loops call it before each LLM
    /// call.
    pub fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(LexigenError::Cancelled);
        }
        Ok(())
    }

    /// Builds the LLM call options for this run.
    pub fn call_options(&self) -> CallOptions {
        CallOptions::new(self.llm_timeout, self.cancel.clone())
    }

    /// Emits an info-level log event.
    pub fn log_info(&self, message: impl Into<String>) {
        self.emit(LogEvent::new(self.run_id, LogLevel::Info, message));
    }

    /// Emits a warning-level log event.
    pub fn log_warning(&self, message: impl Into<String>) {
        self.emit(LogEvent::new(self.run_id, LogLevel::Warning, message));
    }

    /// Emits an error-level log event.
    pub fn log_error(&self, message: impl Into<String>) {
        self.emit(LogEvent::new(self.run_id, LogLevel::Error, message));
    }

    /// Emits a progress event for one item within a step.
    pub fn progress(&self, step: &str, current: usize, total: usize, current_term: &str) {
        let mut event = LogEvent::new(
            self.run_id,
            LogLevel::Info,
            format!("{step}: {current}/{total}"),
        );
        event.step = Some(step.to_string());
        event.progress_current = Some(current);
        event.progress_total = Some(total);
        if !current_term.is_empty() {
            event.current_term = Some(current_term.to_string());
        }
        self.emit(event);
    }

    fn emit(&self, event: LogEvent) {
        let log = self.log.clone();
        safe_callback("log", move || log(RunEvent::Log(event)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_safe_callback_swallows_panics() {
        safe_callback("boom", || panic!("subscriber bug"));
        // Reaching this line is the assertion
    }

    #[test]
    fn test_safe_callback_runs_normally() {
        let mut called = false;
        safe_callback("ok", || called = true);
        assert!(called);
    }

    #[test]
    fn test_context_emits_through_callback() {
        let events: Arc<Mutex<Vec<RunEvent>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();

        let ctx = ExecutionContext {
            log: Arc::new(move |event| sink.lock().unwrap().push(event)),
            ..ExecutionContext::detached(7)
        };

        ctx.log_info("starting");
        ctx.progress("extract_terms", 2, 10, "Alice");

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 2);
        match &events[1] {
            RunEvent::Log(event) => {
                assert_eq!(event.run_id, 7);
                assert_eq!(event.step.as_deref(), Some("extract_terms"));
                assert_eq!(event.progress_current, Some(2));
                assert_eq!(event.progress_total, Some(10));
                assert_eq!(event.current_term.as_deref(), Some("Alice"));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_context_survives_panicking_callback() {
        let ctx = ExecutionContext {
            log: Arc::new(|_| panic!("bad subscriber")),
            ..ExecutionContext::detached(1)
        };
        ctx.log_info("still fine");
    }

    #[test]
    fn test_check_cancelled() {
        let ctx = ExecutionContext::detached(1);
        assert!(ctx.check_cancelled().is_ok());
        ctx.cancel.cancel();
        assert!(matches!(ctx.check_cancelled(), Err(LexigenError::Cancelled)));
    }

    #[test]
    fn test_complete_sentinel_serialization() {
        let json = serde_json::to_string(&RunEvent::complete(9)).unwrap();
        assert_eq!(json, r#"{"run_id":9,"complete":true}"#);
    }

    #[test]
    fn test_log_event_serialization_skips_empty_fields() {
        let event = LogEvent::new(3, LogLevel::Info, "hello");
        let json = serde_json::to_string(&RunEvent::Log(event)).unwrap();
        assert!(!json.contains("step"));
        assert!(!json.contains("progress_current"));
        assert!(json.contains(r#""level":"info""#));
    }
}
