//! Synonym group persistence.

use sqlx::sqlite::SqliteConnection;
use sqlx::FromRow;

use crate::error::{LexigenError, Result};
use crate::model::SynonymGroup;

#[derive(Debug, Clone, FromRow)]
struct SynonymGroupRow {
    id: i64,
    primary_term_text: String,
    members: String,
}

impl SynonymGroupRow {
    fn into_group(self) -> Result<SynonymGroup> {
        let members = serde_json::from_str(&self.members)
            .map_err(|e| LexigenError::persistence(format!("Invalid members JSON: {e}")))?;
        Ok(SynonymGroup {
            id: self.id,
            primary_term_text: self.primary_term_text,
            members,
        })
    }
}

/// Creates a synonym group after checking its primary-membership invariant.
pub async fn create_group(
    conn: &mut SqliteConnection,
    primary_term_text: &str,
    members: &[String],
) -> Result<SynonymGroup> {
    let group = SynonymGroup {
        id: 0,
        primary_term_text: primary_term_text.to_string(),
        members: members.to_vec(),
    };
    group.validate()?;

    let members_json = serde_json::to_string(members)
        .map_err(|e| LexigenError::internal(format!("Failed to encode members: {e}")))?;

    let result = sqlx::query(
        "INSERT INTO synonym_groups (primary_term_text, members) VALUES (?, ?)",
    )
    .bind(primary_term_text)
    .bind(&members_json)
    .execute(&mut *conn)
    .await
    .map_err(|e| LexigenError::persistence(format!("Failed to create synonym group: {e}")))?;

    Ok(SynonymGroup {
        id: result.last_insert_rowid(),
        ..group
    })
}

/// Lists all synonym groups.
pub async fn list_groups(conn: &mut SqliteConnection) -> Result<Vec<SynonymGroup>> {
    let rows: Vec<SynonymGroupRow> = sqlx::query_as(
        "SELECT id, primary_term_text, members FROM synonym_groups ORDER BY primary_term_text",
    )
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| LexigenError::persistence(format!("Failed to list synonym groups: {e}")))?;

    rows.into_iter().map(SynonymGroupRow::into_group).collect()
}

/// Gets a synonym group by id.
pub async fn get_group(conn: &mut SqliteConnection, id: i64) -> Result<Option<SynonymGroup>> {
    let row: Option<SynonymGroupRow> =
        sqlx::query_as("SELECT id, primary_term_text, members FROM synonym_groups WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| {
                LexigenError::persistence(format!("Failed to get synonym group: {e}"))
            })?;

    row.map(SynonymGroupRow::into_group).transpose()
}

/// Replaces a group's primary and members. Returns true if a row changed.
pub async fn update_group(conn: &mut SqliteConnection, group: &SynonymGroup) -> Result<bool> {
    group.validate()?;

    let members_json = serde_json::to_string(&group.members)
        .map_err(|e| LexigenError::internal(format!("Failed to encode members: {e}")))?;

    let result = sqlx::query(
        "UPDATE synonym_groups SET primary_term_text = ?, members = ? WHERE id = ?",
    )
    .bind(&group.primary_term_text)
    .bind(&members_json)
    .bind(group.id)
    .execute(&mut *conn)
    .await
    .map_err(|e| LexigenError::persistence(format!("Failed to update synonym group: {e}")))?;

    Ok(result.rows_affected() > 0)
}

/// Deletes a synonym group by id. Returns true if a row was removed.
pub async fn delete_group(conn: &mut SqliteConnection, id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM synonym_groups WHERE id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await
        .map_err(|e| LexigenError::persistence(format!("Failed to delete synonym group: {e}")))?;

    Ok(result.rows_affected() > 0)
}
