//! Schema versioning and migrations.
//!
//! Both the catalog and the per-project databases carry a `schema_versions`
//! table with forward-only, integer-versioned migrations. A database newer
//! than the running binary is refused rather than downgraded.

use crate::error::{LexigenError, Result};
use sqlx::sqlite::SqlitePool;
use tracing::info;

const PROJECT_CURRENT_VERSION: i32 = 1;
const CATALOG_CURRENT_VERSION: i32 = 2;

/// Runs all pending migrations on a per-project database.
pub async fn run_project_migrations(pool: &SqlitePool) -> Result<()> {
    run_migrations(pool, PROJECT_CURRENT_VERSION, project_migration, "project").await
}

/// Runs all pending migrations on the catalog database.
pub async fn run_catalog_migrations(pool: &SqlitePool) -> Result<()> {
    run_migrations(pool, CATALOG_CURRENT_VERSION, catalog_migration, "catalog").await
}

async fn run_migrations<F, Fut>(
    pool: &SqlitePool,
    target: i32,
    run_one: F,
    kind: &str,
) -> Result<()>
where
    F: Fn(SqlitePool, i32) -> Fut,
    Fut: std::future::Future<Output = Result<()>>,
{
    ensure_schema_versions_table(pool).await?;

    let current = get_current_version(pool).await?;

    if current > target {
        return Err(LexigenError::persistence(format!(
            "{kind} database schema version ({current}) is newer than supported version \
             ({target}). Please upgrade lexigen to the latest version.",
        )));
    }

    if current < target {
        info!("Migrating {kind} database from version {current} to {target}");
        for version in (current + 1)..=target {
            run_one(pool.clone(), version).await?;
            record_version(pool, version).await?;
            info!("Applied {kind} migration v{version}");
        }
    }

    Ok(())
}

/// Ensures the schema_versions table exists.
async fn ensure_schema_versions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_versions (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| {
        LexigenError::persistence(format!("Failed to create schema_versions table: {e}"))
    })?;

    Ok(())
}

/// Gets the current schema version.
pub async fn get_current_version(pool: &SqlitePool) -> Result<i32> {
    let row: Option<(Option<i32>,)> = sqlx::query_as("SELECT MAX(version) FROM schema_versions")
        .fetch_optional(pool)
        .await
        .map_err(|e| LexigenError::persistence(format!("Failed to get schema version: {e}")))?;

    Ok(row.and_then(|(v,)| v).unwrap_or(0))
}

/// Records a completed migration version.
async fn record_version(pool: &SqlitePool, version: i32) -> Result<()> {
    sqlx::query("INSERT INTO schema_versions (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await
        .map_err(|e| LexigenError::persistence(format!("Failed to record migration: {e}")))?;
    Ok(())
}

/// Runs a specific per-project migration version.
async fn project_migration(pool: SqlitePool, version: i32) -> Result<()> {
    match version {
        1 => project_v1(&pool).await,
        _ => Err(LexigenError::persistence(format!(
            "Unknown project migration version: {version}"
        ))),
    }
}

/// Runs a specific catalog migration version.
async fn catalog_migration(pool: SqlitePool, version: i32) -> Result<()> {
    match version {
        1 => catalog_v1(&pool).await,
        2 => catalog_v2(&pool).await,
        _ => Err(LexigenError::persistence(format!(
            "Unknown catalog migration version: {version}"
        ))),
    }
}

/// Project migration v1: full pipeline schema.
async fn project_v1(pool: &SqlitePool) -> Result<()> {
    let statements = [
        r#"
        CREATE TABLE IF NOT EXISTS runs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            scope TEXT NOT NULL CHECK (scope IN
                ('full', 'extract', 'from_terms', 'provisional_to_refined')),
            status TEXT NOT NULL CHECK (status IN
                ('pending', 'running', 'completed', 'failed', 'cancelled')),
            triggered_by TEXT NOT NULL,
            created_at TEXT NOT NULL,
            started_at TEXT,
            finished_at TEXT,
            error_message TEXT,
            document_ids TEXT
        )
        "#,
        r#"
        CREATE INDEX IF NOT EXISTS idx_runs_status ON runs(status)
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            file_name TEXT NOT NULL UNIQUE,
            content TEXT NOT NULL,
            content_hash TEXT NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS terms_extracted (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            term_text TEXT NOT NULL,
            category TEXT
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS terms_excluded (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            term_text TEXT NOT NULL UNIQUE,
            source TEXT NOT NULL CHECK (source IN ('auto', 'manual')),
            created_at TEXT NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS terms_required (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            term_text TEXT NOT NULL UNIQUE,
            created_at TEXT NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS glossary_provisional (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            definition TEXT NOT NULL,
            confidence REAL NOT NULL DEFAULT 0,
            aliases TEXT NOT NULL DEFAULT '[]'
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS glossary_refined (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            definition TEXT NOT NULL,
            confidence REAL NOT NULL DEFAULT 0,
            aliases TEXT NOT NULL DEFAULT '[]'
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS glossary_issues (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            term_name TEXT NOT NULL,
            issue_type TEXT NOT NULL,
            description TEXT NOT NULL,
            severity TEXT NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS synonym_groups (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            primary_term_text TEXT NOT NULL,
            members TEXT NOT NULL
        )
        "#,
    ];

    for sql in statements {
        sqlx::query(sql)
            .execute(pool)
            .await
            .map_err(|e| LexigenError::persistence(format!("Project migration v1 failed: {e}")))?;
    }

    Ok(())
}

/// Catalog migration v1: project registry.
async fn catalog_v1(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS projects (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            doc_root TEXT NOT NULL DEFAULT '',
            llm_provider TEXT NOT NULL DEFAULT 'ollama',
            llm_model TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| LexigenError::persistence(format!("Catalog migration v1 failed: {e}")))?;

    Ok(())
}

/// Catalog migration v2: add llm_base_url to projects.
async fn catalog_v2(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        ALTER TABLE projects ADD COLUMN llm_base_url TEXT NOT NULL DEFAULT ''
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| LexigenError::persistence(format!("Catalog migration v2 failed: {e}")))?;

    Ok(())
}
