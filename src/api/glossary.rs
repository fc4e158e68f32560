//! Glossary endpoints: provisional, refined, issues, synonym groups.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use serde::Deserialize;
use std::sync::Arc;

use crate::api::{project_conn, ApiError, ApiResult, AppState};
use crate::error::LexigenError;
use crate::model::SynonymGroup;
use crate::persistence::glossary::{self as repo, GlossaryTable};
use crate::persistence::synonyms;

#[derive(Debug, Deserialize)]
pub struct UpdateEntryRequest {
    pub name: Option<String>,
    pub definition: Option<String>,
    pub confidence: Option<f64>,
    pub aliases: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct SynonymGroupRequest {
    pub primary_term_text: String,
    pub members: Vec<String>,
}

pub async fn list_provisional(
    State(state): State<Arc<AppState>>,
    Path(pid): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    list_entries(state, pid, GlossaryTable::Provisional).await
}

pub async fn list_refined(
    State(state): State<Arc<AppState>>,
    Path(pid): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    list_entries(state, pid, GlossaryTable::Refined).await
}

async fn list_entries(
    state: Arc<AppState>,
    pid: i64,
    table: GlossaryTable,
) -> ApiResult<Json<Vec<crate::model::GlossaryEntry>>> {
    let (_db, mut conn) = project_conn(&state, pid).await?;
    let entries = repo::list_entries(&mut conn, table).await?;
    Ok(Json(entries))
}

pub async fn update_provisional(
    State(state): State<Arc<AppState>>,
    Path((pid, id)): Path<(i64, i64)>,
    Json(body): Json<UpdateEntryRequest>,
) -> ApiResult<impl IntoResponse> {
    update_entry(state, pid, id, GlossaryTable::Provisional, body).await
}

pub async fn update_refined(
    State(state): State<Arc<AppState>>,
    Path((pid, id)): Path<(i64, i64)>,
    Json(body): Json<UpdateEntryRequest>,
) -> ApiResult<impl IntoResponse> {
    update_entry(state, pid, id, GlossaryTable::Refined, body).await
}

async fn update_entry(
    state: Arc<AppState>,
    pid: i64,
    id: i64,
    table: GlossaryTable,
    body: UpdateEntryRequest,
) -> ApiResult<Json<crate::model::GlossaryEntry>> {
    let (_db, mut conn) = project_conn(&state, pid).await?;

    let mut entry = repo::get_entry(&mut conn, table, id)
        .await?
        .ok_or_else(|| LexigenError::not_found(format!("glossary entry {id}")))?;

    if let Some(name) = body.name {
        if name.trim().is_empty() {
            return Err(ApiError(LexigenError::validation("entry name is empty")));
        }
        entry.name = name;
    }
    if let Some(definition) = body.definition {
        entry.definition = definition;
    }
    if let Some(confidence) = body.confidence {
        entry.confidence = confidence;
        entry = entry.with_clamped_confidence();
    }
    if let Some(aliases) = body.aliases {
        entry.aliases = aliases;
    }

    repo::update_entry(&mut conn, table, &entry).await?;
    Ok(Json(entry))
}

pub async fn delete_provisional(
    State(state): State<Arc<AppState>>,
    Path((pid, id)): Path<(i64, i64)>,
) -> ApiResult<impl IntoResponse> {
    delete_entry(state, pid, id, GlossaryTable::Provisional).await
}

pub async fn delete_refined(
    State(state): State<Arc<AppState>>,
    Path((pid, id)): Path<(i64, i64)>,
) -> ApiResult<impl IntoResponse> {
    delete_entry(state, pid, id, GlossaryTable::Refined).await
}

async fn delete_entry(
    state: Arc<AppState>,
    pid: i64,
    id: i64,
    table: GlossaryTable,
) -> ApiResult<StatusCode> {
    let (_db, mut conn) = project_conn(&state, pid).await?;
    if !repo::delete_entry(&mut conn, table, id).await? {
        return Err(ApiError(LexigenError::not_found(format!(
            "glossary entry {id}"
        ))));
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_issues(
    State(state): State<Arc<AppState>>,
    Path(pid): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let (_db, mut conn) = project_conn(&state, pid).await?;
    let issues = repo::list_issues(&mut conn).await?;
    Ok(Json(issues))
}

pub async fn delete_issue(
    State(state): State<Arc<AppState>>,
    Path((pid, id)): Path<(i64, i64)>,
) -> ApiResult<impl IntoResponse> {
    let (_db, mut conn) = project_conn(&state, pid).await?;
    if !repo::delete_issue(&mut conn, id).await? {
        return Err(ApiError(LexigenError::not_found(format!("issue {id}"))));
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_synonyms(
    State(state): State<Arc<AppState>>,
    Path(pid): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let (_db, mut conn) = project_conn(&state, pid).await?;
    let groups = synonyms::list_groups(&mut conn).await?;
    Ok(Json(groups))
}

pub async fn create_synonym(
    State(state): State<Arc<AppState>>,
    Path(pid): Path<i64>,
    Json(body): Json<SynonymGroupRequest>,
) -> ApiResult<impl IntoResponse> {
    let (_db, mut conn) = project_conn(&state, pid).await?;
    let group = synonyms::create_group(&mut conn, &body.primary_term_text, &body.members).await?;
    Ok((StatusCode::CREATED, Json(group)))
}

pub async fn get_synonym(
    State(state): State<Arc<AppState>>,
    Path((pid, id)): Path<(i64, i64)>,
) -> ApiResult<impl IntoResponse> {
    let (_db, mut conn) = project_conn(&state, pid).await?;
    let group = synonyms::get_group(&mut conn, id)
        .await?
        .ok_or_else(|| LexigenError::not_found(format!("synonym group {id}")))?;
    Ok(Json(group))
}

pub async fn update_synonym(
    State(state): State<Arc<AppState>>,
    Path((pid, id)): Path<(i64, i64)>,
    Json(body): Json<SynonymGroupRequest>,
) -> ApiResult<impl IntoResponse> {
    let (_db, mut conn) = project_conn(&state, pid).await?;

    synonyms::get_group(&mut conn, id)
        .await?
        .ok_or_else(|| LexigenError::not_found(format!("synonym group {id}")))?;

    let group = SynonymGroup {
        id,
        primary_term_text: body.primary_term_text,
        members: body.members,
    };
    synonyms::update_group(&mut conn, &group).await?;
    Ok(Json(group))
}

pub async fn delete_synonym(
    State(state): State<Arc<AppState>>,
    Path((pid, id)): Path<(i64, i64)>,
) -> ApiResult<impl IntoResponse> {
    let (_db, mut conn) = project_conn(&state, pid).await?;
    if !synonyms::delete_group(&mut conn, id).await? {
        return Err(ApiError(LexigenError::not_found(format!(
            "synonym group {id}"
        ))));
    }
    Ok(StatusCode::NO_CONTENT)
}
