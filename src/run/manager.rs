//! Run manager: admission, status state machine, worker hosting, log fan-out.
//!
//! One manager per project. Admission is serialized on `start_run_lock`;
//! the cancel-token map is guarded separately and the lock order is strictly
//! `start_run_lock → cancel_tokens` everywhere. Status transitions go
//! through the conditional SQL updaters, so the database resolves every
//! race between completion, failure, and cancellation.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use crate::error::{LexigenError, Result};
use crate::llm::{DebugSink, LlmClient};
use crate::model::{Run, RunScope, RunStatus};
use crate::persistence::timestamp::now_utc;
use crate::persistence::{runs, ProjectDb};
use crate::pipeline::{ExecutionContext, LogCallback, PipelineExecutor, RunEvent};
use crate::run::logs::{LogSubscription, RunLogBus};

/// Outcome of a cancel request. Idempotent: repeated cancels converge on
/// `AlreadyTerminal` without mutating the run again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    Ok,
    NotFound,
    AlreadyTerminal,
}

/// Manages run lifecycle for one project.
pub struct RunManager {
    project_id: i64,
    db: ProjectDb,
    llm: Arc<dyn LlmClient>,
    /// The sink the LLM client logs through; reset at each run start so
    /// debug files number from zero per run.
    debug: DebugSink,
    doc_root: Option<PathBuf>,
    llm_timeout: Duration,
    /// Serializes admission: the active-run check and the run insert happen
    /// under this lock.
    start_run_lock: AsyncMutex<()>,
    /// `{run_id → cancel token}`; guarded independently of admission, always
    /// acquired after `start_run_lock` when both are held.
    cancel_tokens: Mutex<HashMap<i64, CancellationToken>>,
    /// `{run_id → executor}`; held only while a worker is executing.
    executors: Mutex<HashMap<i64, Arc<PipelineExecutor>>>,
    logs: Arc<RunLogBus>,
}

impl RunManager {
    /// Creates a manager for a project.
    pub fn new(
        project_id: i64,
        db: ProjectDb,
        llm: Arc<dyn LlmClient>,
        debug: DebugSink,
        doc_root: Option<PathBuf>,
        llm_timeout: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            project_id,
            db,
            llm,
            debug,
            doc_root,
            llm_timeout,
            start_run_lock: AsyncMutex::new(()),
            cancel_tokens: Mutex::new(HashMap::new()),
            executors: Mutex::new(HashMap::new()),
            logs: Arc::new(RunLogBus::new(project_id)),
        })
    }

    /// The project this manager serves.
    pub fn project_id(&self) -> i64 {
        self.project_id
    }

    /// Admits and starts a run.
    ///
    /// Fails with `AlreadyRunning` when a non-terminal run exists. The
    /// cancel token is registered before admission serialization ends, so a
    /// cancel arriving mid-initialization still lands.
    pub async fn start_run(
        self: &Arc<Self>,
        scope: RunScope,
        triggered_by: &str,
        document_ids: Option<Vec<i64>>,
    ) -> Result<i64> {
        let admission_guard = self.start_run_lock.lock().await;

        let mut tx = self
            .db
            .pool()
            .begin()
            .await
            .map_err(|e| LexigenError::persistence(format!("Failed to begin transaction: {e}")))?;
        if runs::count_active_runs(&mut tx).await? > 0 {
            return Err(LexigenError::AlreadyRunning);
        }
        let run = runs::create_run(&mut tx, scope, triggered_by, document_ids.as_deref()).await?;
        tx.commit()
            .await
            .map_err(|e| LexigenError::persistence(format!("Failed to commit run: {e}")))?;

        let cancel = CancellationToken::new();
        self.cancel_tokens
            .lock()
            .unwrap()
            .insert(run.id, cancel.clone());
        self.logs.open(run.id);

        drop(admission_guard);

        // The worker launches outside both locks
        let manager = self.clone();
        let worker_run = run.clone();
        tokio::spawn(async move {
            manager.execute_run(worker_run, cancel).await;
        });

        Ok(run.id)
    }

    /// Requests cancellation of a run.
    ///
    /// Sets the cancel token (if the worker is still registered) and issues
    /// the conditional `→ cancelled` update, which no-ops for terminal runs.
    pub async fn cancel_run(&self, run_id: i64) -> Result<CancelOutcome> {
        let token = self.cancel_tokens.lock().unwrap().get(&run_id).cloned();
        if let Some(token) = &token {
            token.cancel();
        }

        let mut conn = self.acquire().await?;
        let Some(run) = runs::get_run(&mut conn, run_id).await? else {
            return Ok(CancelOutcome::NotFound);
        };
        if run.status.is_terminal() {
            return Ok(CancelOutcome::AlreadyTerminal);
        }

        runs::update_if_active(&mut conn, run_id, RunStatus::Cancelled, now_utc(), None).await?;
        Ok(CancelOutcome::Ok)
    }

    /// Returns the current non-terminal run, if any.
    pub async fn get_current_run(&self) -> Result<Option<Run>> {
        let mut conn = self.acquire().await?;
        runs::get_current_run(&mut conn).await
    }

    /// Returns a run by id.
    pub async fn get_run(&self, run_id: i64) -> Result<Option<Run>> {
        let mut conn = self.acquire().await?;
        runs::get_run(&mut conn, run_id).await
    }

    /// Subscribes to a run's log stream: buffered snapshot plus live events
    /// ending with the `complete` sentinel.
    pub fn subscribe_logs(&self, run_id: i64) -> Option<LogSubscription> {
        self.logs.subscribe(run_id)
    }

    /// Waits until the run reaches a terminal state and returns it.
    pub async fn wait_for_terminal(&self, run_id: i64) -> Result<RunStatus> {
        if let Some(mut subscription) = self.subscribe_logs(run_id) {
            let already_complete = subscription.snapshot.iter().any(RunEvent::is_complete);
            if !already_complete {
                loop {
                    match subscription.receiver.recv().await {
                        Ok(event) if event.is_complete() => break,
                        Ok(_) => continue,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        }

        let run = self
            .get_run(run_id)
            .await?
            .ok_or_else(|| LexigenError::not_found(format!("run {run_id}")))?;
        Ok(run.status)
    }

    /// The worker body: mark running, execute, finalize, clean up, sentinel.
    async fn execute_run(self: Arc<Self>, run: Run, cancel: CancellationToken) {
        let log: LogCallback = {
            let logs = self.logs.clone();
            let project_id = self.project_id;
            Arc::new(move |event| logs.publish(project_id, event))
        };
        self.debug.reset();
        let ctx = ExecutionContext {
            run_id: run.id,
            cancel: cancel.clone(),
            log,
            debug: self.debug.clone(),
            llm_timeout: self.llm_timeout,
        };

        let outcome = self.run_pipeline(&run, &ctx).await;
        self.finalize(run.id, outcome, &cancel, &ctx).await;

        // Cleanup on every exit path; the sentinel broadcast is last
        self.executors.lock().unwrap().remove(&run.id);
        self.cancel_tokens.lock().unwrap().remove(&run.id);
        self.logs.complete(run.id);
    }

    /// Marks the run running and executes the pipeline.
    async fn run_pipeline(&self, run: &Run, ctx: &ExecutionContext) -> Result<()> {
        let mut conn = self.acquire().await?;
        let applied = runs::mark_running(&mut conn, run.id, now_utc()).await?;
        drop(conn);
        if applied == 0 {
            // Cancelled while pending; nothing to execute
            return Err(LexigenError::Cancelled);
        }

        let executor = Arc::new(PipelineExecutor::new(
            self.llm.clone(),
            self.doc_root.clone(),
        ));
        self.executors
            .lock()
            .unwrap()
            .insert(run.id, executor.clone());

        let result = executor
            .execute(&self.db, run.scope, ctx, run.document_ids.clone())
            .await;

        // close() runs on every exit path
        executor.close().await;

        result
    }

    /// Applies the finalization rule table with conditional updates.
    ///
    /// | condition                         | target    |
    /// |-----------------------------------|-----------|
    /// | cancelled error, or token set     | cancelled |
    /// | any other error                   | failed    |
    /// | clean return                      | completed |
    async fn finalize(
        &self,
        run_id: i64,
        outcome: Result<()>,
        cancel: &CancellationToken,
        ctx: &ExecutionContext,
    ) {
        let finished_at = now_utc();

        let (target, error_message) = match &outcome {
            Ok(()) => (RunStatus::Completed, None),
            Err(e) if e.is_cancelled() || cancel.is_cancelled() => (RunStatus::Cancelled, None),
            Err(e) => {
                ctx.log_error(format!("Run failed: {e}"));
                error!("Run {run_id} failed: {e}");
                (RunStatus::Failed, Some(e.to_string()))
            }
        };

        let first = self
            .apply_final_status(run_id, target, finished_at, error_message.as_deref())
            .await;
        let Err(e) = first else {
            match target {
                RunStatus::Completed => ctx.log_info("Run completed"),
                RunStatus::Cancelled => ctx.log_info("Run cancelled"),
                _ => {}
            }
            return;
        };

        // The pooled handle can be unusable ("database is locked"); retry
        // once on a fresh dedicated handle. Neither failure re-raises.
        warn!("Run {run_id} finalization failed, retrying on a fresh handle: {e}");
        match self.db.open_dedicated_connection().await {
            Ok(mut fresh) => {
                let retried = match target {
                    RunStatus::Completed => {
                        runs::update_if_running(&mut fresh, run_id, target, finished_at).await
                    }
                    _ => {
                        runs::update_if_active(
                            &mut fresh,
                            run_id,
                            target,
                            finished_at,
                            error_message.as_deref(),
                        )
                        .await
                    }
                };
                if let Err(e) = retried {
                    error!("Run {run_id} finalization retry failed: {e}");
                }
            }
            Err(e) => error!("Run {run_id} finalization retry failed to open a handle: {e}"),
        }
    }

    /// Issues the conditional terminal update appropriate for the target.
    async fn apply_final_status(
        &self,
        run_id: i64,
        target: RunStatus,
        finished_at: chrono::DateTime<chrono::Utc>,
        error_message: Option<&str>,
    ) -> Result<u64> {
        let mut conn = self.acquire().await?;
        match target {
            // Normal completion: a concurrently-served cancel wins
            RunStatus::Completed => {
                runs::update_if_running(&mut conn, run_id, target, finished_at).await
            }
            // Failure and cancel never overwrite a prior terminal state
            _ => {
                runs::update_if_active(&mut conn, run_id, target, finished_at, error_message).await
            }
        }
    }

    async fn acquire(&self) -> Result<sqlx::pool::PoolConnection<sqlx::Sqlite>> {
        self.db
            .pool()
            .acquire()
            .await
            .map_err(|e| LexigenError::persistence(format!("Failed to acquire connection: {e}")))
    }
}
