//! Run endpoints: start, cancel, current, and the SSE log stream.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Json};
use futures::stream::Stream;
use serde::Deserialize;
use std::str::FromStr;
use std::sync::Arc;

use crate::api::{ApiError, ApiResult, AppState};
use crate::error::LexigenError;
use crate::model::RunScope;
use crate::pipeline::RunEvent;
use crate::run::{CancelOutcome, LogSubscription};

#[derive(Debug, Deserialize)]
pub struct StartRunRequest {
    pub scope: String,
    #[serde(default)]
    pub document_ids: Option<Vec<i64>>,
}

pub async fn start(
    State(state): State<Arc<AppState>>,
    Path(pid): Path<i64>,
    Json(body): Json<StartRunRequest>,
) -> ApiResult<impl IntoResponse> {
    let scope = RunScope::from_str(&body.scope).map_err(LexigenError::validation)?;

    let project = state.project(pid).await?;
    let manager = state.manager(&project).await?;
    let run_id = manager
        .start_run(scope, "api", body.document_ids)
        .await?;

    Ok((StatusCode::CREATED, Json(serde_json::json!({ "run_id": run_id }))))
}

pub async fn current(
    State(state): State<Arc<AppState>>,
    Path(pid): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let project = state.project(pid).await?;
    let manager = state.manager(&project).await?;
    let run = manager.get_current_run().await?;
    Ok(Json(run))
}

pub async fn cancel(
    State(state): State<Arc<AppState>>,
    Path((pid, run_id)): Path<(i64, i64)>,
) -> ApiResult<impl IntoResponse> {
    let project = state.project(pid).await?;
    let manager = state.manager(&project).await?;

    match manager.cancel_run(run_id).await? {
        CancelOutcome::NotFound => Err(ApiError(LexigenError::not_found(format!("run {run_id}")))),
        // Cancelling an already-terminal run is an accepted no-op
        CancelOutcome::Ok | CancelOutcome::AlreadyTerminal => Ok(StatusCode::NO_CONTENT),
    }
}

pub async fn logs(
    State(state): State<Arc<AppState>>,
    Path((pid, run_id)): Path<(i64, i64)>,
) -> ApiResult<impl IntoResponse> {
    let project = state.project(pid).await?;
    let manager = state.manager(&project).await?;

    let Some(subscription) = manager.subscribe_logs(run_id) else {
        return Err(ApiError(LexigenError::not_found(format!("run {run_id}"))));
    };

    Ok(Sse::new(event_stream(subscription)).keep_alive(KeepAlive::default()))
}

/// Replays the buffered snapshot, then live events, closing after the
/// `complete` sentinel.
fn event_stream(
    subscription: LogSubscription,
) -> impl Stream<Item = std::result::Result<Event, std::convert::Infallible>> {
    let LogSubscription {
        snapshot,
        mut receiver,
    } = subscription;

    async_stream::stream! {
        let mut finished = false;
        for event in snapshot {
            let complete = event.is_complete();
            yield Ok(to_sse_event(&event));
            if complete {
                finished = true;
                break;
            }
        }

        while !finished {
            match receiver.recv().await {
                Ok(event) => {
                    let complete = event.is_complete();
                    yield Ok(to_sse_event(&event));
                    if complete {
                        break;
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    yield Ok(Event::default()
                        .event("message")
                        .data(format!("{{\"warning\":\"missed {n} events\"}}")));
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    }
}

fn to_sse_event(event: &RunEvent) -> Event {
    let name = if event.is_complete() { "complete" } else { "message" };
    let data = serde_json::to_string(event).unwrap_or_default();
    Event::default().event(name).data(data)
}
