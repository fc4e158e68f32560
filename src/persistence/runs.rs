//! Run persistence.
//!
//! Runs move out of a non-terminal state only through the conditional
//! updaters in this module; each returns the affected-row count so callers
//! can tell "applied" from "no-op, already terminal or not found". The
//! database, not in-process state, decides every status race.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteConnection;
use sqlx::FromRow;

use crate::error::{LexigenError, Result};
use crate::model::{Run, RunScope, RunStatus};
use crate::persistence::timestamp::{now_utc, parse_iso, parse_iso_opt, to_iso};

/// Raw database row for a run.
#[derive(Debug, Clone, FromRow)]
struct RunRow {
    id: i64,
    scope: String,
    status: String,
    triggered_by: String,
    created_at: String,
    started_at: Option<String>,
    finished_at: Option<String>,
    error_message: Option<String>,
    document_ids: Option<String>,
}

impl RunRow {
    fn into_run(self) -> Result<Run> {
        let scope = self
            .scope
            .parse::<RunScope>()
            .map_err(LexigenError::persistence)?;
        let status = self
            .status
            .parse::<RunStatus>()
            .map_err(LexigenError::persistence)?;
        let document_ids = self
            .document_ids
            .as_deref()
            .map(serde_json::from_str::<Vec<i64>>)
            .transpose()
            .map_err(|e| LexigenError::persistence(format!("Invalid document_ids JSON: {e}")))?;

        Ok(Run {
            id: self.id,
            scope,
            status,
            triggered_by: self.triggered_by,
            created_at: parse_iso(&self.created_at)?,
            started_at: parse_iso_opt(self.started_at.as_deref())?,
            finished_at: parse_iso_opt(self.finished_at.as_deref())?,
            error_message: self.error_message,
            document_ids,
        })
    }
}

const RUN_COLUMNS: &str = "id, scope, status, triggered_by, created_at, started_at, \
                           finished_at, error_message, document_ids";

/// Creates a new run in `pending` status.
pub async fn create_run(
    conn: &mut SqliteConnection,
    scope: RunScope,
    triggered_by: &str,
    document_ids: Option<&[i64]>,
) -> Result<Run> {
    let created_at = now_utc();
    let ids_json = document_ids
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| LexigenError::internal(format!("Failed to encode document_ids: {e}")))?;

    let result = sqlx::query(
        r#"
        INSERT INTO runs (scope, status, triggered_by, created_at, document_ids)
        VALUES (?, 'pending', ?, ?, ?)
        "#,
    )
    .bind(scope.as_str())
    .bind(triggered_by)
    .bind(to_iso(&created_at))
    .bind(&ids_json)
    .execute(&mut *conn)
    .await
    .map_err(|e| LexigenError::persistence(format!("Failed to create run: {e}")))?;

    Ok(Run {
        id: result.last_insert_rowid(),
        scope,
        status: RunStatus::Pending,
        triggered_by: triggered_by.to_string(),
        created_at,
        started_at: None,
        finished_at: None,
        error_message: None,
        document_ids: document_ids.map(<[i64]>::to_vec),
    })
}

/// Gets a run by id.
pub async fn get_run(conn: &mut SqliteConnection, id: i64) -> Result<Option<Run>> {
    let row: Option<RunRow> = sqlx::query_as(&format!(
        "SELECT {RUN_COLUMNS} FROM runs WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| LexigenError::persistence(format!("Failed to get run: {e}")))?;

    row.map(RunRow::into_run).transpose()
}

/// Gets the current (non-terminal) run, if any.
///
/// Admission serialization keeps this set at most one element large.
pub async fn get_current_run(conn: &mut SqliteConnection) -> Result<Option<Run>> {
    let row: Option<RunRow> = sqlx::query_as(&format!(
        "SELECT {RUN_COLUMNS} FROM runs
         WHERE status IN ('pending', 'running')
         ORDER BY created_at DESC, id DESC
         LIMIT 1"
    ))
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| LexigenError::persistence(format!("Failed to get current run: {e}")))?;

    row.map(RunRow::into_run).transpose()
}

/// Counts non-terminal runs. The admission check.
pub async fn count_active_runs(conn: &mut SqliteConnection) -> Result<i64> {
    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM runs WHERE status IN ('pending', 'running')")
            .fetch_one(&mut *conn)
            .await
            .map_err(|e| LexigenError::persistence(format!("Failed to count active runs: {e}")))?;

    Ok(count)
}

/// Lists runs, newest first.
pub async fn list_runs(conn: &mut SqliteConnection, limit: i64) -> Result<Vec<Run>> {
    let rows: Vec<RunRow> = sqlx::query_as(&format!(
        "SELECT {RUN_COLUMNS} FROM runs ORDER BY created_at DESC, id DESC LIMIT ?"
    ))
    .bind(limit)
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| LexigenError::persistence(format!("Failed to list runs: {e}")))?;

    rows.into_iter().map(RunRow::into_run).collect()
}

/// Moves an active run to `running`, stamping `started_at`.
///
/// Returns the affected-row count: 0 means the run was already terminal
/// (a cancel won the race) or does not exist.
pub async fn mark_running(
    conn: &mut SqliteConnection,
    id: i64,
    started_at: DateTime<Utc>,
) -> Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE runs SET status = 'running', started_at = ?
        WHERE id = ? AND status IN ('pending', 'running')
        "#,
    )
    .bind(to_iso(&started_at))
    .bind(id)
    .execute(&mut *conn)
    .await
    .map_err(|e| LexigenError::persistence(format!("Failed to mark run running: {e}")))?;

    Ok(result.rows_affected())
}

/// Moves a `running` run to a terminal state.
///
/// Used for normal completion, so a concurrently-served cancel wins:
/// if the status is no longer `running`, this is a no-op (rowcount 0).
pub async fn update_if_running(
    conn: &mut SqliteConnection,
    id: i64,
    to_status: RunStatus,
    finished_at: DateTime<Utc>,
) -> Result<u64> {
    debug_assert!(to_status.is_terminal());

    let result = sqlx::query(
        r#"
        UPDATE runs SET status = ?, finished_at = ?
        WHERE id = ? AND status = 'running'
        "#,
    )
    .bind(to_status.as_str())
    .bind(to_iso(&finished_at))
    .bind(id)
    .execute(&mut *conn)
    .await
    .map_err(|e| LexigenError::persistence(format!("Failed to finalize run: {e}")))?;

    Ok(result.rows_affected())
}

/// Moves an active (`pending` or `running`) run to a terminal state.
///
/// Used for failure and cancellation, so nothing ever overwrites a prior
/// terminal state. Returns the affected-row count.
pub async fn update_if_active(
    conn: &mut SqliteConnection,
    id: i64,
    to_status: RunStatus,
    finished_at: DateTime<Utc>,
    error_message: Option<&str>,
) -> Result<u64> {
    debug_assert!(to_status.is_terminal());

    let result = sqlx::query(
        r#"
        UPDATE runs SET status = ?, finished_at = ?, error_message = ?
        WHERE id = ? AND status IN ('pending', 'running')
        "#,
    )
    .bind(to_status.as_str())
    .bind(to_iso(&finished_at))
    .bind(error_message)
    .bind(id)
    .execute(&mut *conn)
    .await
    .map_err(|e| LexigenError::persistence(format!("Failed to finalize run: {e}")))?;

    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::ProjectDb;

    async fn test_db() -> ProjectDb {
        ProjectDb::open_in_memory().await.unwrap()
    }

    #[tokio::test]
    async fn test_create_and_get_run() {
        let db = test_db().await;
        let mut conn = db.pool().acquire().await.unwrap();

        let run = create_run(&mut conn, RunScope::Full, "api", None)
            .await
            .unwrap();
        assert!(run.id > 0);
        assert_eq!(run.status, RunStatus::Pending);
        assert!(run.started_at.is_none());

        let fetched = get_run(&mut conn, run.id).await.unwrap().unwrap();
        assert_eq!(fetched.scope, RunScope::Full);
        assert_eq!(fetched.status, RunStatus::Pending);
        assert_eq!(fetched.created_at, run.created_at);
    }

    #[tokio::test]
    async fn test_document_ids_round_trip() {
        let db = test_db().await;
        let mut conn = db.pool().acquire().await.unwrap();

        let run = create_run(&mut conn, RunScope::Extract, "upload", Some(&[3, 5]))
            .await
            .unwrap();
        let fetched = get_run(&mut conn, run.id).await.unwrap().unwrap();
        assert_eq!(fetched.document_ids, Some(vec![3, 5]));
    }

    #[tokio::test]
    async fn test_current_run_and_active_count() {
        let db = test_db().await;
        let mut conn = db.pool().acquire().await.unwrap();

        assert!(get_current_run(&mut conn).await.unwrap().is_none());
        assert_eq!(count_active_runs(&mut conn).await.unwrap(), 0);

        let run = create_run(&mut conn, RunScope::Full, "api", None)
            .await
            .unwrap();
        assert_eq!(count_active_runs(&mut conn).await.unwrap(), 1);
        assert_eq!(
            get_current_run(&mut conn).await.unwrap().unwrap().id,
            run.id
        );

        update_if_active(&mut conn, run.id, RunStatus::Cancelled, now_utc(), None)
            .await
            .unwrap();
        assert!(get_current_run(&mut conn).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_mark_running_sets_started_at() {
        let db = test_db().await;
        let mut conn = db.pool().acquire().await.unwrap();

        let run = create_run(&mut conn, RunScope::Full, "api", None)
            .await
            .unwrap();
        let started = now_utc();
        let affected = mark_running(&mut conn, run.id, started).await.unwrap();
        assert_eq!(affected, 1);

        let fetched = get_run(&mut conn, run.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, RunStatus::Running);
        assert_eq!(fetched.started_at, Some(started));
    }

    #[tokio::test]
    async fn test_update_if_running_noop_when_cancelled() {
        let db = test_db().await;
        let mut conn = db.pool().acquire().await.unwrap();

        let run = create_run(&mut conn, RunScope::Full, "api", None)
            .await
            .unwrap();
        mark_running(&mut conn, run.id, now_utc()).await.unwrap();

        // Cancel wins the race
        let affected = update_if_active(&mut conn, run.id, RunStatus::Cancelled, now_utc(), None)
            .await
            .unwrap();
        assert_eq!(affected, 1);

        // Completion arrives late and must be a no-op
        let affected = update_if_running(&mut conn, run.id, RunStatus::Completed, now_utc())
            .await
            .unwrap();
        assert_eq!(affected, 0);

        let fetched = get_run(&mut conn, run.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, RunStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_update_if_active_noop_on_terminal_preserves_fields() {
        let db = test_db().await;
        let mut conn = db.pool().acquire().await.unwrap();

        let run = create_run(&mut conn, RunScope::Full, "api", None)
            .await
            .unwrap();
        mark_running(&mut conn, run.id, now_utc()).await.unwrap();

        let first_finish = now_utc();
        update_if_active(
            &mut conn,
            run.id,
            RunStatus::Failed,
            first_finish,
            Some("LLM unreachable"),
        )
        .await
        .unwrap();

        // Second attempt with different values changes nothing
        let affected = update_if_active(
            &mut conn,
            run.id,
            RunStatus::Cancelled,
            now_utc(),
            Some("other"),
        )
        .await
        .unwrap();
        assert_eq!(affected, 0);

        let fetched = get_run(&mut conn, run.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, RunStatus::Failed);
        assert_eq!(fetched.finished_at, Some(first_finish));
        assert_eq!(fetched.error_message.as_deref(), Some("LLM unreachable"));
    }

    #[tokio::test]
    async fn test_update_if_active_unknown_run_is_rowcount_zero() {
        let db = test_db().await;
        let mut conn = db.pool().acquire().await.unwrap();

        let affected = update_if_active(&mut conn, 42, RunStatus::Failed, now_utc(), None)
            .await
            .unwrap();
        assert_eq!(affected, 0);
    }

    #[tokio::test]
    async fn test_pending_can_be_cancelled_directly() {
        let db = test_db().await;
        let mut conn = db.pool().acquire().await.unwrap();

        let run = create_run(&mut conn, RunScope::FromTerms, "api", None)
            .await
            .unwrap();
        let affected = update_if_active(&mut conn, run.id, RunStatus::Cancelled, now_utc(), None)
            .await
            .unwrap();
        assert_eq!(affected, 1);

        let fetched = get_run(&mut conn, run.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, RunStatus::Cancelled);
        assert!(fetched.started_at.is_none());
        assert!(fetched.finished_at.is_some());
    }

    #[tokio::test]
    async fn test_list_runs_newest_first() {
        let db = test_db().await;
        let mut conn = db.pool().acquire().await.unwrap();

        let first = create_run(&mut conn, RunScope::Full, "api", None)
            .await
            .unwrap();
        update_if_active(&mut conn, first.id, RunStatus::Completed, now_utc(), None)
            .await
            .unwrap();
        let second = create_run(&mut conn, RunScope::Extract, "api", None)
            .await
            .unwrap();

        let runs = list_runs(&mut conn, 10).await.unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].id, second.id);
        assert_eq!(runs[1].id, first.id);
    }
}
