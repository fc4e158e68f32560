//! Document persistence.
//!
//! Content is mutated only by replace: uploading a file name that already
//! exists overwrites its content and hash in place.

use sqlx::sqlite::SqliteConnection;
use sqlx::FromRow;

use crate::error::{LexigenError, Result};
use crate::model::Document;

#[derive(Debug, Clone, FromRow)]
struct DocumentRow {
    id: i64,
    file_name: String,
    content: String,
    content_hash: String,
}

impl From<DocumentRow> for Document {
    fn from(row: DocumentRow) -> Self {
        Self {
            id: row.id,
            file_name: row.file_name,
            content: row.content,
            content_hash: row.content_hash,
        }
    }
}

/// Inserts a document, or replaces the content of an existing file name.
///
/// Returns the stored document with its row id.
pub async fn upsert_document(
    conn: &mut SqliteConnection,
    file_name: &str,
    content: &str,
) -> Result<Document> {
    let content_hash = Document::hash_content(content);

    sqlx::query(
        r#"
        INSERT INTO documents (file_name, content, content_hash)
        VALUES (?, ?, ?)
        ON CONFLICT(file_name) DO UPDATE SET
            content = excluded.content,
            content_hash = excluded.content_hash
        "#,
    )
    .bind(file_name)
    .bind(content)
    .bind(&content_hash)
    .execute(&mut *conn)
    .await
    .map_err(|e| LexigenError::persistence(format!("Failed to upsert document: {e}")))?;

    // last_insert_rowid is unreliable for the conflict path; read back by name
    let row: DocumentRow = sqlx::query_as(
        "SELECT id, file_name, content, content_hash FROM documents WHERE file_name = ?",
    )
    .bind(file_name)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| LexigenError::persistence(format!("Failed to read back document: {e}")))?;

    Ok(row.into())
}

/// Gets a document by id.
pub async fn get_document(conn: &mut SqliteConnection, id: i64) -> Result<Option<Document>> {
    let row: Option<DocumentRow> = sqlx::query_as(
        "SELECT id, file_name, content, content_hash FROM documents WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| LexigenError::persistence(format!("Failed to get document: {e}")))?;

    Ok(row.map(Document::from))
}

/// Gets a document by its file name.
pub async fn get_document_by_name(
    conn: &mut SqliteConnection,
    file_name: &str,
) -> Result<Option<Document>> {
    let row: Option<DocumentRow> = sqlx::query_as(
        "SELECT id, file_name, content, content_hash FROM documents WHERE file_name = ?",
    )
    .bind(file_name)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| LexigenError::persistence(format!("Failed to get document: {e}")))?;

    Ok(row.map(Document::from))
}

/// Lists all documents, ordered by file name.
pub async fn list_documents(conn: &mut SqliteConnection) -> Result<Vec<Document>> {
    let rows: Vec<DocumentRow> = sqlx::query_as(
        "SELECT id, file_name, content, content_hash FROM documents ORDER BY file_name",
    )
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| LexigenError::persistence(format!("Failed to list documents: {e}")))?;

    Ok(rows.into_iter().map(Document::from).collect())
}

/// Lists the documents with the given ids, ordered by file name.
///
/// Ids not present in the table are silently absent from the result.
pub async fn get_documents_by_ids(
    conn: &mut SqliteConnection,
    ids: &[i64],
) -> Result<Vec<Document>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut qb = sqlx::QueryBuilder::<sqlx::Sqlite>::new(
        "SELECT id, file_name, content, content_hash FROM documents WHERE id IN (",
    );
    let mut separated = qb.separated(", ");
    for id in ids {
        separated.push_bind(id);
    }
    separated.push_unseparated(") ORDER BY file_name");

    let rows: Vec<DocumentRow> = qb
        .build_query_as()
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| LexigenError::persistence(format!("Failed to get documents by id: {e}")))?;

    Ok(rows.into_iter().map(Document::from).collect())
}

/// Counts stored documents.
pub async fn count_documents(conn: &mut SqliteConnection) -> Result<i64> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM documents")
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| LexigenError::persistence(format!("Failed to count documents: {e}")))?;

    Ok(count)
}

/// Deletes a document by id. Returns true if a row was removed.
pub async fn delete_document(conn: &mut SqliteConnection, id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM documents WHERE id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await
        .map_err(|e| LexigenError::persistence(format!("Failed to delete document: {e}")))?;

    Ok(result.rows_affected() > 0)
}

/// Deletes all documents (project-level scope reset).
pub async fn clear_documents(conn: &mut SqliteConnection) -> Result<u64> {
    let result = sqlx::query("DELETE FROM documents")
        .execute(&mut *conn)
        .await
        .map_err(|e| LexigenError::persistence(format!("Failed to clear documents: {e}")))?;

    Ok(result.rows_affected())
}
