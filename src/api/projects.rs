//! Project catalog endpoints.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use serde::Deserialize;
use std::sync::Arc;

use crate::api::{ApiError, ApiResult, AppState};
use crate::error::LexigenError;
use crate::persistence::projects as repo;

#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
    #[serde(default)]
    pub doc_root: String,
    #[serde(default)]
    pub llm_provider: Option<String>,
    #[serde(default)]
    pub llm_model: Option<String>,
    #[serde(default)]
    pub llm_base_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProjectRequest {
    pub doc_root: Option<String>,
    pub llm_provider: Option<String>,
    pub llm_model: Option<String>,
    pub llm_base_url: Option<String>,
}

pub async fn list(State(state): State<Arc<AppState>>) -> ApiResult<impl IntoResponse> {
    let mut conn = catalog_conn(&state).await?;
    let projects = repo::list_projects(&mut conn).await?;
    Ok(Json(projects))
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateProjectRequest>,
) -> ApiResult<impl IntoResponse> {
    let mut conn = catalog_conn(&state).await?;
    let project = repo::create_project(
        &mut conn,
        &body.name,
        &body.doc_root,
        body.llm_provider.as_deref().unwrap_or("ollama"),
        body.llm_model.as_deref().unwrap_or(""),
        body.llm_base_url.as_deref().unwrap_or(""),
    )
    .await?;
    Ok((StatusCode::CREATED, Json(project)))
}

pub async fn get_one(
    State(state): State<Arc<AppState>>,
    Path(pid): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let project = state.project(pid).await?;
    Ok(Json(project))
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    Path(pid): Path<i64>,
    Json(body): Json<UpdateProjectRequest>,
) -> ApiResult<impl IntoResponse> {
    let mut project = state.project(pid).await?;

    if let Some(doc_root) = body.doc_root {
        project.doc_root = doc_root;
    }
    if let Some(provider) = body.llm_provider {
        project.llm_provider = provider;
    }
    if let Some(model) = body.llm_model {
        project.llm_model = model;
    }
    if let Some(base_url) = body.llm_base_url {
        project.llm_base_url = base_url;
    }

    let mut conn = catalog_conn(&state).await?;
    repo::update_project(&mut conn, &project).await?;
    drop(conn);

    // Cached manager holds the old LLM settings
    state.invalidate(pid).await;

    Ok(Json(project))
}

pub async fn delete_one(
    State(state): State<Arc<AppState>>,
    Path(pid): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let mut conn = catalog_conn(&state).await?;
    if !repo::delete_project(&mut conn, pid).await? {
        return Err(ApiError(LexigenError::not_found(format!("project {pid}"))));
    }
    drop(conn);

    state.invalidate(pid).await;
    Ok(StatusCode::NO_CONTENT)
}

async fn catalog_conn(
    state: &AppState,
) -> Result<sqlx::pool::PoolConnection<sqlx::Sqlite>, ApiError> {
    state
        .catalog()
        .pool()
        .acquire()
        .await
        .map_err(|e| {
            ApiError(LexigenError::persistence(format!(
                "Failed to acquire catalog connection: {e}"
            )))
        })
}
