//! End-to-end run scenarios over the run manager and pipeline.

use std::sync::Arc;
use std::time::{Duration, Instant};

use lexigen::llm::MockLlmClient;
use lexigen::model::{RunScope, RunStatus, TermCategory};
use lexigen::persistence::glossary::GlossaryTable;
use lexigen::persistence::{documents, glossary, terms, ProjectDb};
use lexigen::run::RunManager;

async fn project_db_with_docs(docs: &[(&str, &str)]) -> ProjectDb {
    let db = ProjectDb::open_in_memory().await.unwrap();
    let mut conn = db.pool().acquire().await.unwrap();
    for (name, content) in docs {
        documents::upsert_document(&mut conn, name, content)
            .await
            .unwrap();
    }
    db
}

fn manager_for(db: ProjectDb, mock: MockLlmClient) -> Arc<RunManager> {
    RunManager::new(
        1,
        db,
        Arc::new(mock),
        lexigen::llm::DebugSink::disabled(),
        None,
        Duration::from_secs(5),
    )
}

fn happy_mock() -> MockLlmClient {
    MockLlmClient::new()
        .with_response(
            "classify",
            r#"{"terms": [
                {"term": "Alice", "category": "person_name"},
                {"term": "Acme", "category": "organization"}
            ]}"#,
        )
        .with_response("review glossary", r#"{"issues": []}"#)
        .with_response(
            "Term: Alice",
            r#"{"definition": "A person.", "confidence": 0.9, "aliases": []}"#,
        )
        .with_response(
            "Term: Acme",
            r#"{"definition": "A company.", "confidence": 0.9, "aliases": []}"#,
        )
}

/// Two preloaded documents, deterministic mock replies: the full pipeline
/// lands two classified terms and two refined definitions, and the log
/// stream ends with the complete sentinel.
#[tokio::test]
async fn happy_path_full_scope() {
    let body_one = format!("Alice opened the office. {}", "Filler text. ".repeat(38));
    let body_two = format!("Acme shipped the order. {}", "More filler. ".repeat(38));
    let db = project_db_with_docs(&[("one.txt", &body_one), ("two.txt", &body_two)]).await;
    let manager = manager_for(db.clone(), happy_mock());

    let run_id = manager
        .start_run(RunScope::Full, "test", None)
        .await
        .unwrap();
    let status = manager.wait_for_terminal(run_id).await.unwrap();
    assert_eq!(status, RunStatus::Completed);

    let run = manager.get_run(run_id).await.unwrap().unwrap();
    assert!(run.started_at.is_some());
    assert!(run.finished_at.is_some());

    let mut conn = db.pool().acquire().await.unwrap();
    let extracted = terms::list_extracted_terms(&mut conn).await.unwrap();
    let pairs: Vec<(&str, Option<TermCategory>)> = extracted
        .iter()
        .map(|t| (t.term_text.as_str(), t.category))
        .collect();
    assert!(pairs.contains(&("Alice", Some(TermCategory::PersonName))));
    assert!(pairs.contains(&("Acme", Some(TermCategory::Organization))));

    let refined = glossary::list_entries(&mut conn, GlossaryTable::Refined)
        .await
        .unwrap();
    assert_eq!(refined.len(), 2);
    let alice = refined.iter().find(|e| e.name == "Alice").unwrap();
    assert_eq!(alice.definition, "A person.");
    let acme = refined.iter().find(|e| e.name == "Acme").unwrap();
    assert_eq!(acme.definition, "A company.");

    let subscription = manager.subscribe_logs(run_id).unwrap();
    assert!(subscription.snapshot.last().unwrap().is_complete());
}

/// A slow mock and an early cancel: the run reaches `cancelled`, the
/// provisional table stays empty, and subscribers still get the sentinel.
#[tokio::test]
async fn cancel_during_generation() {
    let mut body = String::new();
    for i in 0..100 {
        body.push_str(&format!("Widget{i} arrived. "));
    }
    let db = project_db_with_docs(&[("many.txt", &body)]).await;

    let mock = MockLlmClient::new().with_delay(Duration::from_millis(200));
    let manager = manager_for(db.clone(), mock);

    let run_id = manager
        .start_run(RunScope::Full, "test", None)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(250)).await;

    let cancel_issued = Instant::now();
    manager.cancel_run(run_id).await.unwrap();

    let status = manager.wait_for_terminal(run_id).await.unwrap();
    assert_eq!(status, RunStatus::Cancelled);

    // Cancellation latency stays bounded by one in-flight call plus
    // polling granularity, far below a full pipeline
    assert!(cancel_issued.elapsed() < Duration::from_secs(2));

    let mut conn = db.pool().acquire().await.unwrap();
    let provisional = glossary::list_entries(&mut conn, GlossaryTable::Provisional)
        .await
        .unwrap();
    assert!(provisional.is_empty());

    let subscription = manager.subscribe_logs(run_id).unwrap();
    assert!(subscription.snapshot.last().unwrap().is_complete());
}

/// Fast completion raced against a cancel: exactly one terminal state
/// sticks and never changes afterwards.
#[tokio::test]
async fn concurrent_cancel_vs_completion() {
    for _ in 0..10 {
        let db = project_db_with_docs(&[("one.txt", "Alice met Acme.")]).await;
        let manager = manager_for(db, happy_mock());

        let run_id = manager
            .start_run(RunScope::Extract, "test", None)
            .await
            .unwrap();

        let racer = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.cancel_run(run_id).await })
        };

        let status = manager.wait_for_terminal(run_id).await.unwrap();
        racer.await.unwrap().unwrap();

        assert!(
            status == RunStatus::Completed || status == RunStatus::Cancelled,
            "unexpected terminal state {status}"
        );

        // No subsequent status change, whoever lost the race
        let _ = manager.cancel_run(run_id).await.unwrap();
        let after = manager.get_run(run_id).await.unwrap().unwrap();
        assert_eq!(after.status, status);
    }
}

/// Documents and terms already present: an incremental extract keeps them
/// and appends terms from the new document only.
#[tokio::test]
async fn incremental_extract_after_upload() {
    let db = project_db_with_docs(&[
        ("one.txt", "Aster grows here."),
        ("two.txt", "Basil grows there."),
    ])
    .await;
    let mut conn = db.pool().acquire().await.unwrap();
    terms::insert_extracted_terms(
        &mut conn,
        &[("Aster".to_string(), None), ("Basil".to_string(), None)],
    )
    .await
    .unwrap();
    let doc3 = documents::upsert_document(&mut conn, "three.txt", "Clover arrived.")
        .await
        .unwrap();
    drop(conn);

    let mock = MockLlmClient::new().with_response(
        "classify",
        r#"{"terms": [{"term": "Clover", "category": "person_name"}]}"#,
    );
    let manager = manager_for(db.clone(), mock);

    let run_id = manager
        .start_run(RunScope::Extract, "upload", Some(vec![doc3.id]))
        .await
        .unwrap();
    let status = manager.wait_for_terminal(run_id).await.unwrap();
    assert_eq!(status, RunStatus::Completed);

    let mut conn = db.pool().acquire().await.unwrap();
    let texts: Vec<String> = terms::list_extracted_terms(&mut conn)
        .await
        .unwrap()
        .into_iter()
        .map(|t| t.term_text)
        .collect();
    assert!(texts.contains(&"Aster".to_string()));
    assert!(texts.contains(&"Basil".to_string()));
    assert!(texts.contains(&"Clover".to_string()));
    // Only Clover's document was processed
    assert_eq!(texts.iter().filter(|t| *t == "Clover").count(), 1);
}

/// One transport failure, then success: the call retries exactly once with
/// roughly a one-second backoff, and the run completes.
#[tokio::test]
async fn llm_transient_error_then_success() {
    let db = project_db_with_docs(&[("one.txt", "Alice met Acme.")]).await;
    let mock = happy_mock().with_transient_failures(1);
    let probe = mock.clone();
    let manager = manager_for(db, mock);

    let run_id = manager
        .start_run(RunScope::Extract, "test", None)
        .await
        .unwrap();
    let status = manager.wait_for_terminal(run_id).await.unwrap();
    assert_eq!(status, RunStatus::Completed);

    let times = probe.attempt_times();
    assert!(times.len() >= 2, "expected a retry, saw {} attempts", times.len());
    let gap = times[1].duration_since(times[0]);
    assert!(
        gap >= Duration::from_millis(900) && gap < Duration::from_millis(1800),
        "unexpected backoff {gap:?}"
    );
}

/// Cancelling twice produces one terminal state and never mutates the
/// finished run again.
#[tokio::test]
async fn idempotent_cancel() {
    let db = project_db_with_docs(&[("one.txt", "Alice met Acme.")]).await;
    let mock = happy_mock().with_delay(Duration::from_millis(150));
    let manager = manager_for(db, mock);

    let run_id = manager
        .start_run(RunScope::Full, "test", None)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;

    manager.cancel_run(run_id).await.unwrap();
    let status = manager.wait_for_terminal(run_id).await.unwrap();
    assert_eq!(status, RunStatus::Cancelled);

    let before = manager.get_run(run_id).await.unwrap().unwrap();
    manager.cancel_run(run_id).await.unwrap();
    let after = manager.get_run(run_id).await.unwrap().unwrap();

    assert_eq!(after.status, before.status);
    assert_eq!(after.finished_at, before.finished_at);
    assert_eq!(after.error_message, before.error_message);
}
