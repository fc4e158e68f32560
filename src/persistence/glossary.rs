//! Glossary persistence: provisional entries, refined entries, and issues.
//!
//! Provisional and refined entries live in twin tables with the same shape;
//! the repository functions are parameterized over the table name through a
//! small enum rather than string arguments.

use sqlx::sqlite::SqliteConnection;
use sqlx::FromRow;

use crate::error::{LexigenError, Result};
use crate::model::{GlossaryEntry, Issue};
use crate::persistence::{batch_insert, SqlValue};

/// Which glossary table an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlossaryTable {
    Provisional,
    Refined,
}

impl GlossaryTable {
    fn name(&self) -> &'static str {
        match self {
            Self::Provisional => "glossary_provisional",
            Self::Refined => "glossary_refined",
        }
    }
}

#[derive(Debug, Clone, FromRow)]
struct GlossaryEntryRow {
    id: i64,
    name: String,
    definition: String,
    confidence: f64,
    aliases: String,
}

impl GlossaryEntryRow {
    fn into_entry(self) -> Result<GlossaryEntry> {
        let aliases = serde_json::from_str(&self.aliases)
            .map_err(|e| LexigenError::persistence(format!("Invalid aliases JSON: {e}")))?;
        Ok(GlossaryEntry {
            id: self.id,
            name: self.name,
            definition: self.definition,
            confidence: self.confidence,
            aliases,
        })
    }
}

/// Batch-inserts glossary entries produced by a pipeline stage.
pub async fn insert_entries(
    conn: &mut SqliteConnection,
    table: GlossaryTable,
    entries: &[GlossaryEntry],
) -> Result<u64> {
    let rows: Result<Vec<Vec<SqlValue>>> = entries
        .iter()
        .map(|entry| {
            let aliases = serde_json::to_string(&entry.aliases)
                .map_err(|e| LexigenError::internal(format!("Failed to encode aliases: {e}")))?;
            Ok(vec![
                SqlValue::from(entry.name.clone()),
                SqlValue::from(entry.definition.clone()),
                SqlValue::from(entry.confidence),
                SqlValue::from(aliases),
            ])
        })
        .collect();

    batch_insert(
        conn,
        table.name(),
        &["name", "definition", "confidence", "aliases"],
        rows?,
    )
    .await
}

/// Lists entries alphabetically by name.
pub async fn list_entries(
    conn: &mut SqliteConnection,
    table: GlossaryTable,
) -> Result<Vec<GlossaryEntry>> {
    let rows: Vec<GlossaryEntryRow> = sqlx::query_as(&format!(
        "SELECT id, name, definition, confidence, aliases FROM {} ORDER BY name",
        table.name()
    ))
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| LexigenError::persistence(format!("Failed to list glossary entries: {e}")))?;

    rows.into_iter().map(GlossaryEntryRow::into_entry).collect()
}

/// Gets a single entry by id.
pub async fn get_entry(
    conn: &mut SqliteConnection,
    table: GlossaryTable,
    id: i64,
) -> Result<Option<GlossaryEntry>> {
    let row: Option<GlossaryEntryRow> = sqlx::query_as(&format!(
        "SELECT id, name, definition, confidence, aliases FROM {} WHERE id = ?",
        table.name()
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| LexigenError::persistence(format!("Failed to get glossary entry: {e}")))?;

    row.map(GlossaryEntryRow::into_entry).transpose()
}

/// Updates an entry's user-editable fields. Returns true if a row changed.
pub async fn update_entry(
    conn: &mut SqliteConnection,
    table: GlossaryTable,
    entry: &GlossaryEntry,
) -> Result<bool> {
    let aliases = serde_json::to_string(&entry.aliases)
        .map_err(|e| LexigenError::internal(format!("Failed to encode aliases: {e}")))?;

    let result = sqlx::query(&format!(
        "UPDATE {} SET name = ?, definition = ?, confidence = ?, aliases = ? WHERE id = ?",
        table.name()
    ))
    .bind(&entry.name)
    .bind(&entry.definition)
    .bind(entry.confidence)
    .bind(&aliases)
    .bind(entry.id)
    .execute(&mut *conn)
    .await
    .map_err(|e| LexigenError::persistence(format!("Failed to update glossary entry: {e}")))?;

    Ok(result.rows_affected() > 0)
}

/// Deletes an entry by id. Returns true if a row was removed.
pub async fn delete_entry(
    conn: &mut SqliteConnection,
    table: GlossaryTable,
    id: i64,
) -> Result<bool> {
    let result = sqlx::query(&format!("DELETE FROM {} WHERE id = ?", table.name()))
        .bind(id)
        .execute(&mut *conn)
        .await
        .map_err(|e| LexigenError::persistence(format!("Failed to delete glossary entry: {e}")))?;

    Ok(result.rows_affected() > 0)
}

/// Clears a glossary table.
pub async fn clear_entries(conn: &mut SqliteConnection, table: GlossaryTable) -> Result<u64> {
    let result = sqlx::query(&format!("DELETE FROM {}", table.name()))
        .execute(&mut *conn)
        .await
        .map_err(|e| LexigenError::persistence(format!("Failed to clear glossary table: {e}")))?;

    Ok(result.rows_affected())
}

// === Issues ===

#[derive(Debug, Clone, FromRow)]
struct IssueRow {
    id: i64,
    term_name: String,
    issue_type: String,
    description: String,
    severity: String,
}

impl From<IssueRow> for Issue {
    fn from(row: IssueRow) -> Self {
        Self {
            id: row.id,
            term_name: row.term_name,
            issue_type: row.issue_type,
            description: row.description,
            severity: row.severity,
        }
    }
}

/// Batch-inserts review issues.
pub async fn insert_issues(conn: &mut SqliteConnection, issues: &[Issue]) -> Result<u64> {
    let rows: Vec<Vec<SqlValue>> = issues
        .iter()
        .map(|issue| {
            vec![
                SqlValue::from(issue.term_name.clone()),
                SqlValue::from(issue.issue_type.clone()),
                SqlValue::from(issue.description.clone()),
                SqlValue::from(issue.severity.clone()),
            ]
        })
        .collect();

    batch_insert(
        conn,
        "glossary_issues",
        &["term_name", "issue_type", "description", "severity"],
        rows,
    )
    .await
}

/// Lists issues grouped by term name.
pub async fn list_issues(conn: &mut SqliteConnection) -> Result<Vec<Issue>> {
    let rows: Vec<IssueRow> = sqlx::query_as(
        "SELECT id, term_name, issue_type, description, severity
         FROM glossary_issues ORDER BY term_name, id",
    )
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| LexigenError::persistence(format!("Failed to list issues: {e}")))?;

    Ok(rows.into_iter().map(Issue::from).collect())
}

/// Deletes an issue by id. Returns true if a row was removed.
pub async fn delete_issue(conn: &mut SqliteConnection, id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM glossary_issues WHERE id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await
        .map_err(|e| LexigenError::persistence(format!("Failed to delete issue: {e}")))?;

    Ok(result.rows_affected() > 0)
}

/// Clears all issues.
pub async fn clear_issues(conn: &mut SqliteConnection) -> Result<u64> {
    let result = sqlx::query("DELETE FROM glossary_issues")
        .execute(&mut *conn)
        .await
        .map_err(|e| LexigenError::persistence(format!("Failed to clear issues: {e}")))?;

    Ok(result.rows_affected())
}
