//! LLM exchange debug sink.
//!
//! When enabled via the `LLM_DEBUG` environment variable, every LLM call
//! writes one file per exchange with the request and response bodies. The
//! sink is injected through the client factory so all call paths log the
//! same way; a disabled sink is a no-op clone.

use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::config::Config;

/// Directory name for debug files, next to the project database.
const DEBUG_DIR_NAME: &str = "llm-debug";

/// Sink for per-call LLM debug files.
#[derive(Debug, Clone, Default)]
pub struct DebugSink {
    inner: Option<Arc<SinkInner>>,
}

#[derive(Debug)]
struct SinkInner {
    dir: PathBuf,
    /// Sequence number within the sink's lifetime; the sink is constructed
    /// per run, so the counter resets per run.
    counter: AtomicU64,
}

impl DebugSink {
    /// A sink that drops everything.
    pub fn disabled() -> Self {
        Self { inner: None }
    }

    /// A sink writing into the given directory.
    pub fn new(dir: PathBuf) -> Self {
        Self {
            inner: Some(Arc::new(SinkInner {
                dir,
                counter: AtomicU64::new(0),
            })),
        }
    }

    /// Builds the sink for a run, honoring the `LLM_DEBUG` switch.
    ///
    /// Files land in `{db_path_parent}/llm-debug/`, or `./llm-debug/` when
    /// no database path is available (in-memory runs).
    pub fn for_db_path(db_path: Option<&Path>) -> Self {
        if !Config::llm_debug_enabled() {
            return Self::disabled();
        }
        let dir = db_path
            .and_then(Path::parent)
            .map(|parent| parent.join(DEBUG_DIR_NAME))
            .unwrap_or_else(|| PathBuf::from(".").join(DEBUG_DIR_NAME));
        Self::new(dir)
    }

    /// Returns true when the sink writes files.
    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    /// Resets the sequence counter. The run manager calls this when a run
    /// starts, so file numbering is per run.
    pub fn reset(&self) {
        if let Some(inner) = &self.inner {
            inner.counter.store(0, Ordering::SeqCst);
        }
    }

    /// Records one request/response exchange.
    ///
    /// Write failures are logged and swallowed; debugging must never fail a
    /// run.
    pub fn record(&self, model: &str, method: &str, duration: Duration, request: &str, response: &str) {
        let Some(inner) = &self.inner else {
            return;
        };

        let seq = inner.counter.fetch_add(1, Ordering::SeqCst);
        let now = Utc::now();
        let file_name = format!("{}-{:04}.txt", now.format("%Y%m%d-%H%M%S"), seq);
        let path = inner.dir.join(file_name);

        let body = format!(
            "timestamp: {}\nmodel: {}\nmethod: {}\nduration_ms: {}\n\n\
             ## REQUEST\n{}\n\n## RESPONSE\n{}\n",
            now.to_rfc3339(),
            model,
            method,
            duration.as_millis(),
            request,
            response,
        );

        if let Err(e) = std::fs::create_dir_all(&inner.dir) {
            warn!("Failed to create LLM debug directory: {e}");
            return;
        }
        if let Err(e) = std::fs::write(&path, body) {
            warn!("Failed to write LLM debug file {}: {e}", path.display());
        }
    }
}
