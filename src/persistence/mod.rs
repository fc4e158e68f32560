//! Persistence layer for lexigen.
//!
//! One embedded SQLite database per project (`{projects_root}/{name}/
//! project.db`) plus a top-level catalog database for the project registry.
//! Repository modules are pure data-access functions over a connection; they
//! never commit. Callers open transactions with `pool.begin()` /
//! `conn.begin()`; nested begins become savepoints, commit happens on the
//! explicit `commit()`, and drop rolls back.

pub mod documents;
pub mod glossary;
pub mod migrations;
pub mod projects;
pub mod runs;
pub mod synonyms;
pub mod terms;
pub mod timestamp;

use crate::error::{LexigenError, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqlitePool, SqlitePoolOptions};
use sqlx::{Connection, QueryBuilder};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// File name of the per-project database inside its project directory.
pub const PROJECT_DB_FILE: &str = "project.db";

/// File name of the catalog database inside the projects root.
pub const CATALOG_DB_FILE: &str = "catalog.db";

/// Upper bound on bind parameters per generated INSERT statement.
const MAX_BIND_PARAMS: usize = 900;

/// Handle to a single project's database.
#[derive(Debug, Clone)]
pub struct ProjectDb {
    pool: SqlitePool,
    db_path: PathBuf,
}

impl ProjectDb {
    /// Opens or creates the database for a project directory.
    ///
    /// The database is created lazily on first open; WAL mode and a busy
    /// timeout make the pool safe to share across tasks.
    pub async fn open(project_dir: &Path) -> Result<Self> {
        let path = project_dir.join(PROJECT_DB_FILE);
        ensure_parent_dirs(&path)?;

        let pool = connect(&path).await?;
        migrations::run_project_migrations(&pool).await?;
        info!("Project database opened at {}", path.display());

        Ok(Self {
            pool,
            db_path: path,
        })
    }

    /// Opens an in-memory database (tests and ephemeral runs).
    pub async fn open_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| {
                LexigenError::persistence(format!("Failed to open in-memory database: {e}"))
            })?;
        migrations::run_project_migrations(&pool).await?;
        Ok(Self {
            pool,
            db_path: PathBuf::from(":memory:"),
        })
    }

    /// Returns the path to the database file.
    pub fn path(&self) -> &Path {
        &self.db_path
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Opens a dedicated connection outside the pool.
    ///
    /// Used by the run finalizer as a fresh handle when the pooled one
    /// reports the database as locked.
    pub async fn open_dedicated_connection(&self) -> Result<SqliteConnection> {
        if self.db_path == Path::new(":memory:") {
            return Err(LexigenError::persistence(
                "cannot open a dedicated connection to an in-memory database",
            ));
        }
        let options = connect_options(&self.db_path)?;
        SqliteConnection::connect_with(&options).await.map_err(|e| {
            LexigenError::persistence(format!("Failed to open dedicated connection: {e}"))
        })
    }

    /// Closes the database connection pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Handle to the top-level catalog database (project registry).
#[derive(Debug, Clone)]
pub struct CatalogDb {
    pool: SqlitePool,
    db_path: PathBuf,
}

impl CatalogDb {
    /// Opens or creates the catalog database under the projects root.
    pub async fn open(projects_root: &Path) -> Result<Self> {
        let path = projects_root.join(CATALOG_DB_FILE);
        ensure_parent_dirs(&path)?;

        let pool = connect(&path).await?;
        migrations::run_catalog_migrations(&pool).await?;
        info!("Catalog database opened at {}", path.display());

        Ok(Self {
            pool,
            db_path: path,
        })
    }

    /// Opens an in-memory catalog (tests).
    pub async fn open_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| {
                LexigenError::persistence(format!("Failed to open in-memory catalog: {e}"))
            })?;
        migrations::run_catalog_migrations(&pool).await?;
        Ok(Self {
            pool,
            db_path: PathBuf::from(":memory:"),
        })
    }

    /// Returns the path to the database file.
    pub fn path(&self) -> &Path {
        &self.db_path
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Closes the database connection pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Builds the connect options shared by pools and dedicated connections.
fn connect_options(path: &Path) -> Result<SqliteConnectOptions> {
    let conn_str = format!("sqlite:{}?mode=rwc", path.display());
    let options = SqliteConnectOptions::from_str(&conn_str)
        .map_err(|e| LexigenError::persistence(format!("Invalid database path: {e}")))?
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5))
        .create_if_missing(true);
    Ok(options)
}

/// Creates a connection pool to a SQLite database file.
async fn connect(path: &Path) -> Result<SqlitePool> {
    let options = connect_options(path)?;

    SqlitePoolOptions::new()
        .max_connections(4)
        .acquire_timeout(Duration::from_secs(10))
        .connect_with(options)
        .await
        .map_err(|e| LexigenError::persistence(format!("Failed to connect to database: {e}")))
}

/// Ensures parent directories exist for a database path.
fn ensure_parent_dirs(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            LexigenError::persistence(format!(
                "Failed to create database directory {}: {e}",
                parent.display()
            ))
        })?;
    }
    Ok(())
}

/// A value bound into a generated batch INSERT.
#[derive(Debug, Clone)]
pub enum SqlValue {
    Text(String),
    Integer(i64),
    Real(f64),
    Null,
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        Self::Real(v)
    }
}

impl From<Option<String>> for SqlValue {
    fn from(v: Option<String>) -> Self {
        v.map(Self::Text).unwrap_or(Self::Null)
    }
}

/// Inserts many rows into `table` with a single statement per chunk.
///
/// Shared by every multi-row write in the repository layer. The helper never
/// commits; callers decide the transaction boundary. Rows are chunked so a
/// statement never exceeds the SQLite bind-parameter limit.
pub async fn batch_insert(
    conn: &mut SqliteConnection,
    table: &str,
    columns: &[&str],
    rows: Vec<Vec<SqlValue>>,
) -> Result<u64> {
    if rows.is_empty() {
        return Ok(0);
    }

    let rows_per_chunk = (MAX_BIND_PARAMS / columns.len()).max(1);
    let mut inserted = 0u64;

    for chunk in rows.chunks(rows_per_chunk) {
        let mut qb = QueryBuilder::<sqlx::Sqlite>::new(format!(
            "INSERT INTO {} ({}) ",
            table,
            columns.join(", ")
        ));
        qb.push_values(chunk.iter().cloned(), |mut b, row| {
            for value in row {
                match value {
                    SqlValue::Text(s) => {
                        b.push_bind(s);
                    }
                    SqlValue::Integer(i) => {
                        b.push_bind(i);
                    }
                    SqlValue::Real(r) => {
                        b.push_bind(r);
                    }
                    SqlValue::Null => {
                        b.push_bind(Option::<String>::None);
                    }
                }
            }
        });

        let result = qb
            .build()
            .execute(&mut *conn)
            .await
            .map_err(|e| LexigenError::persistence(format!("Batch insert into {table} failed: {e}")))?;
        inserted += result.rows_affected();
    }

    Ok(inserted)
}
