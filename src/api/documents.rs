//! Document endpoints, including the validated bulk upload.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

use crate::api::{project_conn, ApiError, ApiResult, AppState};
use crate::error::LexigenError;
use crate::model::{validate_content, validate_file_name, RunScope};
use crate::persistence::documents as repo;

#[derive(Debug, Deserialize)]
pub struct BulkUploadRequest {
    pub files: Vec<UploadFile>,
}

#[derive(Debug, Deserialize)]
pub struct UploadFile {
    pub file_name: String,
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct BulkUploadResponse {
    pub document_ids: Vec<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<i64>,
}

/// Validates every entry, stores them in one transaction, and triggers an
/// incremental `extract` run over the created ids.
///
/// Any invalid entry rejects the whole request: no documents are created
/// and no run is triggered.
pub async fn bulk_upload(
    State(state): State<Arc<AppState>>,
    Path(pid): Path<i64>,
    Json(body): Json<BulkUploadRequest>,
) -> ApiResult<impl IntoResponse> {
    if body.files.is_empty() {
        return Err(ApiError(LexigenError::validation("no files supplied")));
    }

    let mut validated = Vec::with_capacity(body.files.len());
    let mut errors = Vec::new();
    for file in &body.files {
        match validate_file_name(&file.file_name)
            .and_then(|name| validate_content(&file.content).map(|()| name))
        {
            Ok(name) => validated.push((name, file.content.as_str())),
            Err(e) => errors.push(format!("{}: {e}", file.file_name)),
        }
    }
    if !errors.is_empty() {
        return Err(ApiError(LexigenError::validation(errors.join("; "))));
    }

    let project = state.project(pid).await?;
    let db = state.project_db(&project).await?;

    let mut tx = db
        .pool()
        .begin()
        .await
        .map_err(|e| LexigenError::persistence(format!("Failed to begin transaction: {e}")))?;
    let mut document_ids = Vec::with_capacity(validated.len());
    for (name, content) in &validated {
        let doc = repo::upsert_document(&mut tx, name, content).await?;
        document_ids.push(doc.id);
    }
    tx.commit()
        .await
        .map_err(|e| LexigenError::persistence(format!("Failed to commit upload: {e}")))?;

    // Kick off incremental extraction over the uploaded documents; an
    // already-active run leaves the upload in place without a new run
    let manager = state.manager(&project).await?;
    let run_id = match manager
        .start_run(RunScope::Extract, "upload", Some(document_ids.clone()))
        .await
    {
        Ok(run_id) => Some(run_id),
        Err(LexigenError::AlreadyRunning) => {
            warn!("Upload to project {pid} while a run is active; extraction not triggered");
            None
        }
        Err(e) => return Err(ApiError(e)),
    };

    Ok((
        StatusCode::CREATED,
        Json(BulkUploadResponse {
            document_ids,
            run_id,
        }),
    ))
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    Path(pid): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let (_db, mut conn) = project_conn(&state, pid).await?;
    let docs = repo::list_documents(&mut conn).await?;

    // Content stays out of the listing; it can be megabytes per row
    let summaries: Vec<serde_json::Value> = docs
        .iter()
        .map(|d| {
            serde_json::json!({
                "id": d.id,
                "file_name": d.file_name,
                "content_hash": d.content_hash,
                "content_bytes": d.content.len(),
            })
        })
        .collect();
    Ok(Json(summaries))
}

pub async fn get_one(
    State(state): State<Arc<AppState>>,
    Path((pid, id)): Path<(i64, i64)>,
) -> ApiResult<impl IntoResponse> {
    let (_db, mut conn) = project_conn(&state, pid).await?;
    let doc = repo::get_document(&mut conn, id)
        .await?
        .ok_or_else(|| LexigenError::not_found(format!("document {id}")))?;
    Ok(Json(doc))
}

pub async fn delete_one(
    State(state): State<Arc<AppState>>,
    Path((pid, id)): Path<(i64, i64)>,
) -> ApiResult<impl IntoResponse> {
    let (_db, mut conn) = project_conn(&state, pid).await?;
    if !repo::delete_document(&mut conn, id).await? {
        return Err(ApiError(LexigenError::not_found(format!("document {id}"))));
    }
    Ok(StatusCode::NO_CONTENT)
}
