//! API handler tests: bulk upload validation and run endpoints.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use std::sync::Arc;
use tempfile::TempDir;

use lexigen::api::{self, AppState};
use lexigen::config::Config;
use lexigen::model::Project;
use lexigen::persistence::{documents, projects, runs};

async fn test_state() -> (Arc<AppState>, TempDir) {
    let dir = TempDir::new().unwrap();
    let config = Config {
        projects_root: Some(dir.path().to_path_buf()),
        ..Default::default()
    };
    let state = AppState::new(&config).await.unwrap();
    (state, dir)
}

async fn test_project(state: &AppState) -> Project {
    let mut conn = state.catalog().pool().acquire().await.unwrap();
    projects::create_project(&mut conn, "glossary-1", "", "mock", "", "")
        .await
        .unwrap()
}

fn upload_body(files: &[(&str, &str)]) -> api::documents::BulkUploadRequest {
    api::documents::BulkUploadRequest {
        files: files
            .iter()
            .map(|(name, content)| api::documents::UploadFile {
                file_name: name.to_string(),
                content: content.to_string(),
            })
            .collect(),
    }
}

#[tokio::test]
async fn bulk_upload_rejects_invalid_names_creating_nothing() {
    let (state, _dir) = test_state().await;
    let project = test_project(&state).await;

    let body = upload_body(&[
        ("fine.txt", "ok"),
        ("../etc/passwd", "nope"),
        ("a//b.md", "nope"),
        ("con.txt", "nope"),
        ("x.exe", "nope"),
    ]);

    let response = api::documents::bulk_upload(
        State(state.clone()),
        Path(project.id),
        Json(body),
    )
    .await
    .into_response();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // No documents were created
    let db = state.project_db(&project).await.unwrap();
    let mut conn = db.pool().acquire().await.unwrap();
    assert!(documents::list_documents(&mut conn).await.unwrap().is_empty());

    // No run was triggered
    assert!(runs::get_current_run(&mut conn).await.unwrap().is_none());
    assert!(runs::list_runs(&mut conn, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn bulk_upload_creates_documents_and_triggers_extract() {
    let (state, _dir) = test_state().await;
    let project = test_project(&state).await;

    let body = upload_body(&[("a.txt", "Alice was here."), ("b.md", "Acme too.")]);
    let response = api::documents::bulk_upload(
        State(state.clone()),
        Path(project.id),
        Json(body),
    )
    .await
    .into_response();
    assert_eq!(response.status(), StatusCode::CREATED);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let parsed: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    let ids = parsed["document_ids"].as_array().unwrap();
    assert_eq!(ids.len(), 2);
    let run_id = parsed["run_id"].as_i64().unwrap();

    // The triggered run is an incremental extract over the uploaded ids
    let manager = state.manager(&project).await.unwrap();
    let run = manager.get_run(run_id).await.unwrap().unwrap();
    assert_eq!(run.scope, lexigen::model::RunScope::Extract);
    assert_eq!(
        run.document_ids.as_ref().map(Vec::len),
        Some(2)
    );
    manager.wait_for_terminal(run_id).await.unwrap();

    let db = state.project_db(&project).await.unwrap();
    let mut conn = db.pool().acquire().await.unwrap();
    assert_eq!(documents::list_documents(&mut conn).await.unwrap().len(), 2);
}

#[tokio::test]
async fn start_run_conflicts_while_active() {
    let (state, _dir) = test_state().await;
    let project = test_project(&state).await;

    // A pending run occupies the project; no worker is needed for admission
    let db = state.project_db(&project).await.unwrap();
    let mut conn = db.pool().acquire().await.unwrap();
    runs::create_run(&mut conn, lexigen::model::RunScope::Full, "test", None)
        .await
        .unwrap();
    drop(conn);

    let response = api::runs::start(
        State(state.clone()),
        Path(project.id),
        Json(api::runs::StartRunRequest {
            scope: "full".to_string(),
            document_ids: None,
        }),
    )
    .await
    .into_response();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn start_run_rejects_unknown_scope() {
    let (state, _dir) = test_state().await;
    let project = test_project(&state).await;

    let response = api::runs::start(
        State(state.clone()),
        Path(project.id),
        Json(api::runs::StartRunRequest {
            scope: "everything".to_string(),
            document_ids: None,
        }),
    )
    .await
    .into_response();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn cancel_unknown_run_is_404() {
    let (state, _dir) = test_state().await;
    let project = test_project(&state).await;

    let response = api::runs::cancel(State(state.clone()), Path((project.id, 777)))
        .await
        .into_response();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn cancel_terminal_run_is_accepted_noop() {
    let (state, _dir) = test_state().await;
    let project = test_project(&state).await;

    let manager = state.manager(&project).await.unwrap();
    let run_id = manager
        .start_run(lexigen::model::RunScope::Extract, "api", None)
        .await
        .unwrap();
    manager.wait_for_terminal(run_id).await.unwrap();

    let response = api::runs::cancel(State(state.clone()), Path((project.id, run_id)))
        .await
        .into_response();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn unknown_project_is_404() {
    let (state, _dir) = test_state().await;

    let response = api::runs::current(State(state.clone()), Path(999))
        .await
        .into_response();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
