//! Project registry persistence (catalog database).
//!
//! The project name doubles as the directory segment holding its database,
//! so it is validated as a single safe path segment at creation.

use sqlx::sqlite::SqliteConnection;
use sqlx::FromRow;

use crate::error::{LexigenError, Result};
use crate::model::Project;
use crate::persistence::timestamp::{now_utc, parse_iso, to_iso};

#[derive(Debug, Clone, FromRow)]
struct ProjectRow {
    id: i64,
    name: String,
    doc_root: String,
    llm_provider: String,
    llm_model: String,
    llm_base_url: String,
    created_at: String,
}

impl ProjectRow {
    fn into_project(self) -> Result<Project> {
        Ok(Project {
            id: self.id,
            name: self.name,
            doc_root: self.doc_root,
            llm_provider: self.llm_provider,
            llm_model: self.llm_model,
            llm_base_url: self.llm_base_url,
            created_at: parse_iso(&self.created_at)?,
        })
    }
}

const PROJECT_COLUMNS: &str =
    "id, name, doc_root, llm_provider, llm_model, llm_base_url, created_at";

/// Validates a project name for use as a directory segment.
fn validate_project_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(LexigenError::validation("project name is empty"));
    }
    if name.len() > 128 {
        return Err(LexigenError::validation("project name exceeds 128 bytes"));
    }
    if !name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(LexigenError::validation(format!(
            "project name may only contain alphanumerics, '-' and '_': {name}"
        )));
    }
    Ok(())
}

/// Creates a project. The per-project database is created lazily on first write.
pub async fn create_project(
    conn: &mut SqliteConnection,
    name: &str,
    doc_root: &str,
    llm_provider: &str,
    llm_model: &str,
    llm_base_url: &str,
) -> Result<Project> {
    validate_project_name(name)?;

    let created_at = now_utc();
    let result = sqlx::query(
        r#"
        INSERT INTO projects (name, doc_root, llm_provider, llm_model, llm_base_url, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(name)
    .bind(doc_root)
    .bind(llm_provider)
    .bind(llm_model)
    .bind(llm_base_url)
    .bind(to_iso(&created_at))
    .execute(&mut *conn)
    .await
    .map_err(|e| {
        if e.to_string().contains("UNIQUE") {
            LexigenError::validation(format!("project '{name}' already exists"))
        } else {
            LexigenError::persistence(format!("Failed to create project: {e}"))
        }
    })?;

    Ok(Project {
        id: result.last_insert_rowid(),
        name: name.to_string(),
        doc_root: doc_root.to_string(),
        llm_provider: llm_provider.to_string(),
        llm_model: llm_model.to_string(),
        llm_base_url: llm_base_url.to_string(),
        created_at,
    })
}

/// Gets a project by id.
pub async fn get_project(conn: &mut SqliteConnection, id: i64) -> Result<Option<Project>> {
    let row: Option<ProjectRow> =
        sqlx::query_as(&format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ?"))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| LexigenError::persistence(format!("Failed to get project: {e}")))?;

    row.map(ProjectRow::into_project).transpose()
}

/// Gets a project by name.
pub async fn get_project_by_name(
    conn: &mut SqliteConnection,
    name: &str,
) -> Result<Option<Project>> {
    let row: Option<ProjectRow> = sqlx::query_as(&format!(
        "SELECT {PROJECT_COLUMNS} FROM projects WHERE name = ?"
    ))
    .bind(name)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| LexigenError::persistence(format!("Failed to get project: {e}")))?;

    row.map(ProjectRow::into_project).transpose()
}

/// Lists projects alphabetically.
pub async fn list_projects(conn: &mut SqliteConnection) -> Result<Vec<Project>> {
    let rows: Vec<ProjectRow> =
        sqlx::query_as(&format!("SELECT {PROJECT_COLUMNS} FROM projects ORDER BY name"))
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| LexigenError::persistence(format!("Failed to list projects: {e}")))?;

    rows.into_iter().map(ProjectRow::into_project).collect()
}

/// Updates a project's mutable settings. Returns true if a row changed.
pub async fn update_project(conn: &mut SqliteConnection, project: &Project) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE projects
        SET doc_root = ?, llm_provider = ?, llm_model = ?, llm_base_url = ?
        WHERE id = ?
        "#,
    )
    .bind(&project.doc_root)
    .bind(&project.llm_provider)
    .bind(&project.llm_model)
    .bind(&project.llm_base_url)
    .bind(project.id)
    .execute(&mut *conn)
    .await
    .map_err(|e| LexigenError::persistence(format!("Failed to update project: {e}")))?;

    Ok(result.rows_affected() > 0)
}

/// Deletes a project registry row. Returns true if a row was removed.
///
/// The project's database file is left on disk; removing data is a separate,
/// explicit operation.
pub async fn delete_project(conn: &mut SqliteConnection, id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM projects WHERE id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await
        .map_err(|e| LexigenError::persistence(format!("Failed to delete project: {e}")))?;

    Ok(result.rows_affected() > 0)
}
