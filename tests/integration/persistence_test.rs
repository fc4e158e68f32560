//! Cross-cutting persistence invariants.

use lexigen::model::{RunScope, RunStatus, TermSource};
use lexigen::persistence::timestamp::{now_utc, parse_iso, to_iso};
use lexigen::persistence::{batch_insert, runs, terms, ProjectDb, SqlValue};

/// Repositories never commit: rolling back the caller's transaction makes
/// a batch insert disappear entirely.
#[tokio::test]
async fn batch_insert_commits_with_the_caller_only() {
    let db = ProjectDb::open_in_memory().await.unwrap();

    {
        let mut tx = db.pool().begin().await.unwrap();
        let rows: Vec<Vec<SqlValue>> = (0..50)
            .map(|i| vec![SqlValue::from(format!("t{i}")), SqlValue::Null])
            .collect();
        let inserted = batch_insert(&mut tx, "terms_extracted", &["term_text", "category"], rows)
            .await
            .unwrap();
        assert_eq!(inserted, 50);
        // Dropped without commit: rollback
    }

    let mut conn = db.pool().acquire().await.unwrap();
    assert!(terms::list_extracted_terms(&mut conn).await.unwrap().is_empty());

    // Committed transaction makes all rows visible
    let mut tx = db.pool().begin().await.unwrap();
    let rows: Vec<Vec<SqlValue>> = (0..50)
        .map(|i| vec![SqlValue::from(format!("t{i}")), SqlValue::Null])
        .collect();
    batch_insert(&mut tx, "terms_extracted", &["term_text", "category"], rows)
        .await
        .unwrap();
    tx.commit().await.unwrap();

    assert_eq!(
        terms::list_extracted_terms(&mut conn).await.unwrap().len(),
        50
    );
}

/// `started_at` is null exactly while pending; terminal runs carry ordered
/// timestamps.
#[tokio::test]
async fn run_timestamp_invariants() {
    let db = ProjectDb::open_in_memory().await.unwrap();
    let mut conn = db.pool().acquire().await.unwrap();

    let run = runs::create_run(&mut conn, RunScope::Full, "test", None)
        .await
        .unwrap();
    let fetched = runs::get_run(&mut conn, run.id).await.unwrap().unwrap();
    assert_eq!(fetched.status, RunStatus::Pending);
    assert!(fetched.started_at.is_none());
    assert!(fetched.finished_at.is_none());

    runs::mark_running(&mut conn, run.id, now_utc()).await.unwrap();
    runs::update_if_running(&mut conn, run.id, RunStatus::Completed, now_utc())
        .await
        .unwrap();

    let done = runs::get_run(&mut conn, run.id).await.unwrap().unwrap();
    assert!(done.status.is_terminal());
    let started = done.started_at.unwrap();
    let finished = done.finished_at.unwrap();
    assert!(done.created_at <= started);
    assert!(started <= finished);
}

/// Conditional updates return rowcount zero on terminal runs and leave
/// every field untouched.
#[tokio::test]
async fn conditional_update_noop_on_terminal() {
    let db = ProjectDb::open_in_memory().await.unwrap();
    let mut conn = db.pool().acquire().await.unwrap();

    let run = runs::create_run(&mut conn, RunScope::Full, "test", None)
        .await
        .unwrap();
    runs::mark_running(&mut conn, run.id, now_utc()).await.unwrap();
    runs::update_if_active(&mut conn, run.id, RunStatus::Failed, now_utc(), Some("boom"))
        .await
        .unwrap();

    let before = runs::get_run(&mut conn, run.id).await.unwrap().unwrap();

    let affected = runs::update_if_active(
        &mut conn,
        run.id,
        RunStatus::Cancelled,
        now_utc(),
        Some("late cancel"),
    )
    .await
    .unwrap();
    assert_eq!(affected, 0);

    let after = runs::get_run(&mut conn, run.id).await.unwrap().unwrap();
    assert_eq!(after.status, before.status);
    assert_eq!(after.finished_at, before.finished_at);
    assert_eq!(after.error_message, before.error_message);
}

/// A required term is always visible in the project's term list, even when
/// the same text is excluded.
#[tokio::test]
async fn required_terms_always_visible() {
    let db = ProjectDb::open_in_memory().await.unwrap();
    let mut conn = db.pool().acquire().await.unwrap();

    terms::add_required_term(&mut conn, "Mithril").await.unwrap();
    terms::add_excluded_term(&mut conn, "Mithril", TermSource::Manual)
        .await
        .unwrap();

    let visible = terms::enumerate_terms(&mut conn).await.unwrap();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].term_text, "Mithril");
    assert!(visible[0].id < 0, "required-only rows carry synthetic ids");
}

/// Timestamps round-trip through their ISO form and reject naive input.
#[test]
fn timestamp_round_trip() {
    let t = now_utc();
    assert_eq!(parse_iso(&to_iso(&t)).unwrap(), t);
    assert!(parse_iso("2026-08-01 12:00:00").is_err());
}
