//! Term endpoints: enumeration, exclusions, and required terms.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use serde::Deserialize;
use std::sync::Arc;

use crate::api::{project_conn, ApiError, ApiResult, AppState};
use crate::error::LexigenError;
use crate::model::TermSource;
use crate::persistence::terms as repo;

#[derive(Debug, Deserialize)]
pub struct TermRequest {
    pub term_text: String,
}

/// The UI term list: extracted terms minus exclusions, with required terms
/// always present (synthetic negative ids when extraction never saw them).
pub async fn enumerate(
    State(state): State<Arc<AppState>>,
    Path(pid): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let (_db, mut conn) = project_conn(&state, pid).await?;
    let terms = repo::enumerate_terms(&mut conn).await?;
    Ok(Json(terms))
}

pub async fn list_excluded(
    State(state): State<Arc<AppState>>,
    Path(pid): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let (_db, mut conn) = project_conn(&state, pid).await?;
    let terms = repo::list_excluded_terms(&mut conn).await?;
    Ok(Json(terms))
}

pub async fn add_excluded(
    State(state): State<Arc<AppState>>,
    Path(pid): Path<i64>,
    Json(body): Json<TermRequest>,
) -> ApiResult<impl IntoResponse> {
    let (_db, mut conn) = project_conn(&state, pid).await?;
    let term = repo::add_excluded_term(&mut conn, &body.term_text, TermSource::Manual).await?;
    Ok((StatusCode::CREATED, Json(term)))
}

pub async fn delete_excluded(
    State(state): State<Arc<AppState>>,
    Path((pid, id)): Path<(i64, i64)>,
) -> ApiResult<impl IntoResponse> {
    let (_db, mut conn) = project_conn(&state, pid).await?;
    if !repo::delete_excluded_term(&mut conn, id).await? {
        return Err(ApiError(LexigenError::not_found(format!(
            "excluded term {id}"
        ))));
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_required(
    State(state): State<Arc<AppState>>,
    Path(pid): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let (_db, mut conn) = project_conn(&state, pid).await?;
    let terms = repo::list_required_terms(&mut conn).await?;
    Ok(Json(terms))
}

pub async fn add_required(
    State(state): State<Arc<AppState>>,
    Path(pid): Path<i64>,
    Json(body): Json<TermRequest>,
) -> ApiResult<impl IntoResponse> {
    let (_db, mut conn) = project_conn(&state, pid).await?;
    let term = repo::add_required_term(&mut conn, &body.term_text).await?;
    Ok((StatusCode::CREATED, Json(term)))
}

pub async fn delete_required(
    State(state): State<Arc<AppState>>,
    Path((pid, id)): Path<(i64, i64)>,
) -> ApiResult<impl IntoResponse> {
    let (_db, mut conn) = project_conn(&state, pid).await?;
    if !repo::delete_required_term(&mut conn, id).await? {
        return Err(ApiError(LexigenError::not_found(format!(
            "required term {id}"
        ))));
    }
    Ok(StatusCode::NO_CONTENT)
}
