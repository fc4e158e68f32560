//! HTTP API for lexigen.
//!
//! Axum router over the project catalog and per-project run managers. The
//! transport stays thin: handlers validate, call into repositories or the
//! run manager, and map domain errors onto status codes.

pub mod documents;
pub mod glossary;
pub mod projects;
pub mod runs;
pub mod terms;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{delete, get, post};
use axum::Router;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::error::{LexigenError, Result};
use crate::llm::{create_client_for_project, DebugSink};
use crate::model::Project;
use crate::persistence::{projects as project_repo, CatalogDb, ProjectDb};
use crate::run::RunManager;

/// Shared state behind every handler.
pub struct AppState {
    catalog: CatalogDb,
    projects_root: PathBuf,
    llm_timeout: Duration,
    /// Lazily-opened per-project databases.
    project_dbs: Mutex<HashMap<i64, ProjectDb>>,
    /// Lazily-built per-project run managers.
    managers: Mutex<HashMap<i64, Arc<RunManager>>>,
}

impl AppState {
    /// Opens the catalog and builds the state.
    pub async fn new(config: &Config) -> Result<Arc<Self>> {
        let projects_root = config.resolve_projects_root();
        let catalog = CatalogDb::open(&projects_root).await?;
        Ok(Arc::new(Self {
            catalog,
            projects_root,
            llm_timeout: Duration::from_secs(config.llm.timeout_secs),
            project_dbs: Mutex::new(HashMap::new()),
            managers: Mutex::new(HashMap::new()),
        }))
    }

    /// The catalog database.
    pub fn catalog(&self) -> &CatalogDb {
        &self.catalog
    }

    /// Looks up a project or fails with `NotFound`.
    pub async fn project(&self, project_id: i64) -> Result<Project> {
        let mut conn = self
            .catalog
            .pool()
            .acquire()
            .await
            .map_err(|e| LexigenError::persistence(format!("Failed to acquire catalog: {e}")))?;
        project_repo::get_project(&mut conn, project_id)
            .await?
            .ok_or_else(|| LexigenError::not_found(format!("project {project_id}")))
    }

    /// Opens (or returns the cached) database for a project.
    pub async fn project_db(&self, project: &Project) -> Result<ProjectDb> {
        let mut dbs = self.project_dbs.lock().await;
        if let Some(db) = dbs.get(&project.id) {
            return Ok(db.clone());
        }
        let db = ProjectDb::open(&self.projects_root.join(&project.name)).await?;
        dbs.insert(project.id, db.clone());
        Ok(db)
    }

    /// Returns the run manager for a project, building it on first use.
    pub async fn manager(&self, project: &Project) -> Result<Arc<RunManager>> {
        let mut managers = self.managers.lock().await;
        if let Some(manager) = managers.get(&project.id) {
            return Ok(manager.clone());
        }

        let db = self.project_db(project).await?;
        let debug = DebugSink::for_db_path(Some(db.path()));
        let llm = create_client_for_project(project, debug.clone())?;
        let doc_root =
            (!project.doc_root.is_empty()).then(|| PathBuf::from(project.doc_root.clone()));
        let manager = RunManager::new(project.id, db, llm, debug, doc_root, self.llm_timeout);
        managers.insert(project.id, manager.clone());
        Ok(manager)
    }

    /// Drops cached handles after project settings change.
    pub async fn invalidate(&self, project_id: i64) {
        self.managers.lock().await.remove(&project_id);
        self.project_dbs.lock().await.remove(&project_id);
    }
}

/// Error wrapper mapping domain errors onto HTTP responses.
pub struct ApiError(pub LexigenError);

impl From<LexigenError> for ApiError {
    fn from(error: LexigenError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            LexigenError::Validation(_) => StatusCode::BAD_REQUEST,
            LexigenError::AlreadyRunning => StatusCode::CONFLICT,
            LexigenError::NotFound(_) => StatusCode::NOT_FOUND,
            LexigenError::Cancelled => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(serde_json::json!({
            "error": self.0.to_string(),
            "category": self.0.category(),
        }));
        (status, body).into_response()
    }
}

/// Handler result alias.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Builds the application router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/projects", get(projects::list).post(projects::create))
        .route(
            "/api/projects/:pid",
            get(projects::get_one)
                .patch(projects::update)
                .delete(projects::delete_one),
        )
        .route("/api/projects/:pid/runs", post(runs::start))
        .route("/api/projects/:pid/runs/current", get(runs::current))
        .route("/api/projects/:pid/runs/:run_id/cancel", post(runs::cancel))
        .route("/api/projects/:pid/runs/:run_id/logs", get(runs::logs))
        .route("/api/projects/:pid/files/bulk", post(documents::bulk_upload))
        .route("/api/projects/:pid/documents", get(documents::list))
        .route(
            "/api/projects/:pid/documents/:id",
            get(documents::get_one).delete(documents::delete_one),
        )
        .route("/api/projects/:pid/terms", get(terms::enumerate))
        .route(
            "/api/projects/:pid/terms/excluded",
            get(terms::list_excluded).post(terms::add_excluded),
        )
        .route(
            "/api/projects/:pid/terms/excluded/:id",
            delete(terms::delete_excluded),
        )
        .route(
            "/api/projects/:pid/terms/required",
            get(terms::list_required).post(terms::add_required),
        )
        .route(
            "/api/projects/:pid/terms/required/:id",
            delete(terms::delete_required),
        )
        .route(
            "/api/projects/:pid/glossary/provisional",
            get(glossary::list_provisional),
        )
        .route(
            "/api/projects/:pid/glossary/provisional/:id",
            axum::routing::patch(glossary::update_provisional).delete(glossary::delete_provisional),
        )
        .route(
            "/api/projects/:pid/glossary/refined",
            get(glossary::list_refined),
        )
        .route(
            "/api/projects/:pid/glossary/refined/:id",
            axum::routing::patch(glossary::update_refined).delete(glossary::delete_refined),
        )
        .route("/api/projects/:pid/issues", get(glossary::list_issues))
        .route(
            "/api/projects/:pid/issues/:id",
            delete(glossary::delete_issue),
        )
        .route(
            "/api/projects/:pid/synonyms",
            get(glossary::list_synonyms).post(glossary::create_synonym),
        )
        .route(
            "/api/projects/:pid/synonyms/:id",
            get(glossary::get_synonym)
                .patch(glossary::update_synonym)
                .delete(glossary::delete_synonym),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Acquires a project-database connection for a handler.
pub(crate) async fn project_conn(
    state: &AppState,
    project_id: i64,
) -> Result<(ProjectDb, sqlx::pool::PoolConnection<sqlx::Sqlite>)> {
    let project = state.project(project_id).await?;
    let db = state.project_db(&project).await?;
    let conn = db
        .pool()
        .acquire()
        .await
        .map_err(|e| LexigenError::persistence(format!("Failed to acquire connection: {e}")))?;
    Ok((db, conn))
}
