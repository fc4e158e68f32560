//! Term persistence: extracted candidates, exclusions, required terms.
//!
//! A term appearing in `terms_required` overrides its presence in
//! `terms_excluded`: it is never filtered, anywhere.

use sqlx::sqlite::SqliteConnection;
use sqlx::FromRow;
use std::collections::HashSet;

use crate::error::{LexigenError, Result};
use crate::model::{
    normalize_term_text, ExcludedTerm, ExtractedTerm, RequiredTerm, TermCategory, TermSource,
};
use crate::persistence::timestamp::{now_utc, parse_iso, to_iso};
use crate::persistence::{batch_insert, SqlValue};

#[derive(Debug, Clone, FromRow)]
struct ExtractedTermRow {
    id: i64,
    term_text: String,
    category: Option<String>,
}

impl ExtractedTermRow {
    fn into_term(self) -> Result<ExtractedTerm> {
        let category = self
            .category
            .as_deref()
            .map(str::parse::<TermCategory>)
            .transpose()
            .map_err(LexigenError::persistence)?;
        Ok(ExtractedTerm {
            id: self.id,
            term_text: self.term_text,
            category,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
struct ExcludedTermRow {
    id: i64,
    term_text: String,
    source: String,
    created_at: String,
}

#[derive(Debug, Clone, FromRow)]
struct RequiredTermRow {
    id: i64,
    term_text: String,
    created_at: String,
}

// === Extracted terms ===

/// Batch-inserts classified terms from an extraction stage.
pub async fn insert_extracted_terms(
    conn: &mut SqliteConnection,
    terms: &[(String, Option<TermCategory>)],
) -> Result<u64> {
    let rows: Vec<Vec<SqlValue>> = terms
        .iter()
        .map(|(text, category)| {
            vec![
                SqlValue::from(text.clone()),
                SqlValue::from(category.map(|c| c.as_str().to_string())),
            ]
        })
        .collect();

    batch_insert(conn, "terms_extracted", &["term_text", "category"], rows).await
}

/// Lists extracted terms in insertion order.
pub async fn list_extracted_terms(conn: &mut SqliteConnection) -> Result<Vec<ExtractedTerm>> {
    let rows: Vec<ExtractedTermRow> =
        sqlx::query_as("SELECT id, term_text, category FROM terms_extracted ORDER BY id")
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| {
                LexigenError::persistence(format!("Failed to list extracted terms: {e}"))
            })?;

    rows.into_iter().map(ExtractedTermRow::into_term).collect()
}

/// Clears all extracted terms.
pub async fn clear_extracted_terms(conn: &mut SqliteConnection) -> Result<u64> {
    let result = sqlx::query("DELETE FROM terms_extracted")
        .execute(&mut *conn)
        .await
        .map_err(|e| LexigenError::persistence(format!("Failed to clear extracted terms: {e}")))?;

    Ok(result.rows_affected())
}

// === Excluded terms ===

/// Adds an excluded term; a duplicate (after normalization) is a no-op.
pub async fn add_excluded_term(
    conn: &mut SqliteConnection,
    term_text: &str,
    source: TermSource,
) -> Result<ExcludedTerm> {
    let normalized = normalize_term_text(term_text);
    if normalized.is_empty() {
        return Err(LexigenError::validation("excluded term text is empty"));
    }

    sqlx::query(
        r#"
        INSERT INTO terms_excluded (term_text, source, created_at)
        VALUES (?, ?, ?)
        ON CONFLICT(term_text) DO NOTHING
        "#,
    )
    .bind(&normalized)
    .bind(source.as_str())
    .bind(to_iso(&now_utc()))
    .execute(&mut *conn)
    .await
    .map_err(|e| LexigenError::persistence(format!("Failed to add excluded term: {e}")))?;

    let row: ExcludedTermRow = sqlx::query_as(
        "SELECT id, term_text, source, created_at FROM terms_excluded WHERE term_text = ?",
    )
    .bind(&normalized)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| LexigenError::persistence(format!("Failed to read back excluded term: {e}")))?;

    Ok(ExcludedTerm {
        id: row.id,
        term_text: row.term_text,
        source: row
            .source
            .parse::<TermSource>()
            .map_err(LexigenError::persistence)?,
        created_at: parse_iso(&row.created_at)?,
    })
}

/// Lists excluded terms alphabetically.
pub async fn list_excluded_terms(conn: &mut SqliteConnection) -> Result<Vec<ExcludedTerm>> {
    let rows: Vec<ExcludedTermRow> = sqlx::query_as(
        "SELECT id, term_text, source, created_at FROM terms_excluded ORDER BY term_text",
    )
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| LexigenError::persistence(format!("Failed to list excluded terms: {e}")))?;

    rows.into_iter()
        .map(|row| {
            Ok(ExcludedTerm {
                id: row.id,
                term_text: row.term_text,
                source: row
                    .source
                    .parse::<TermSource>()
                    .map_err(LexigenError::persistence)?,
                created_at: parse_iso(&row.created_at)?,
            })
        })
        .collect()
}

/// Removes an excluded term by id. Returns true if a row was removed.
pub async fn delete_excluded_term(conn: &mut SqliteConnection, id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM terms_excluded WHERE id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await
        .map_err(|e| LexigenError::persistence(format!("Failed to delete excluded term: {e}")))?;

    Ok(result.rows_affected() > 0)
}

// === Required terms ===

/// Adds a required term; a duplicate (after normalization) is a no-op.
pub async fn add_required_term(
    conn: &mut SqliteConnection,
    term_text: &str,
) -> Result<RequiredTerm> {
    let normalized = normalize_term_text(term_text);
    if normalized.is_empty() {
        return Err(LexigenError::validation("required term text is empty"));
    }

    sqlx::query(
        r#"
        INSERT INTO terms_required (term_text, created_at)
        VALUES (?, ?)
        ON CONFLICT(term_text) DO NOTHING
        "#,
    )
    .bind(&normalized)
    .bind(to_iso(&now_utc()))
    .execute(&mut *conn)
    .await
    .map_err(|e| LexigenError::persistence(format!("Failed to add required term: {e}")))?;

    let row: RequiredTermRow =
        sqlx::query_as("SELECT id, term_text, created_at FROM terms_required WHERE term_text = ?")
            .bind(&normalized)
            .fetch_one(&mut *conn)
            .await
            .map_err(|e| {
                LexigenError::persistence(format!("Failed to read back required term: {e}"))
            })?;

    Ok(RequiredTerm {
        id: row.id,
        term_text: row.term_text,
        created_at: parse_iso(&row.created_at)?,
    })
}

/// Lists required terms alphabetically.
pub async fn list_required_terms(conn: &mut SqliteConnection) -> Result<Vec<RequiredTerm>> {
    let rows: Vec<RequiredTermRow> =
        sqlx::query_as("SELECT id, term_text, created_at FROM terms_required ORDER BY term_text")
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| {
                LexigenError::persistence(format!("Failed to list required terms: {e}"))
            })?;

    rows.into_iter()
        .map(|row| {
            Ok(RequiredTerm {
                id: row.id,
                term_text: row.term_text,
                created_at: parse_iso(&row.created_at)?,
            })
        })
        .collect()
}

/// Removes a required term by id. Returns true if a row was removed.
pub async fn delete_required_term(conn: &mut SqliteConnection, id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM terms_required WHERE id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await
        .map_err(|e| LexigenError::persistence(format!("Failed to delete required term: {e}")))?;

    Ok(result.rows_affected() > 0)
}

// === UI enumeration ===

/// Builds the term list shown to the UI.
///
/// Extracted terms that are excluded (and not required) are hidden; required
/// terms that extraction never surfaced are appended as synthetic rows with
/// negative ids so the UI can tell them apart.
pub async fn enumerate_terms(conn: &mut SqliteConnection) -> Result<Vec<ExtractedTerm>> {
    let extracted = list_extracted_terms(&mut *conn).await?;
    let excluded: HashSet<String> = list_excluded_terms(&mut *conn)
        .await?
        .into_iter()
        .map(|t| t.term_text)
        .collect();
    let required = list_required_terms(&mut *conn).await?;
    let required_set: HashSet<&str> = required.iter().map(|t| t.term_text.as_str()).collect();

    let mut visible: Vec<ExtractedTerm> = extracted
        .into_iter()
        .filter(|t| required_set.contains(t.term_text.as_str()) || !excluded.contains(&t.term_text))
        .collect();

    let extracted_set: HashSet<String> = visible.iter().map(|t| t.term_text.clone()).collect();
    for req in required {
        if !extracted_set.contains(&req.term_text) {
            visible.push(ExtractedTerm {
                id: -req.id,
                term_text: req.term_text,
                category: None,
            });
        }
    }

    Ok(visible)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::ProjectDb;

    async fn test_db() -> ProjectDb {
        ProjectDb::open_in_memory().await.unwrap()
    }

    #[tokio::test]
    async fn test_insert_and_list_extracted() {
        let db = test_db().await;
        let mut conn = db.pool().acquire().await.unwrap();

        let terms = vec![
            ("Alice".to_string(), Some(TermCategory::PersonName)),
            ("Acme".to_string(), Some(TermCategory::Organization)),
            ("mystery".to_string(), None),
        ];
        let inserted = insert_extracted_terms(&mut conn, &terms).await.unwrap();
        assert_eq!(inserted, 3);

        let listed = list_extracted_terms(&mut conn).await.unwrap();
        assert_eq!(listed.len(), 3);
        assert_eq!(listed[0].term_text, "Alice");
        assert_eq!(listed[0].category, Some(TermCategory::PersonName));
        assert_eq!(listed[2].category, None);
    }

    #[tokio::test]
    async fn test_clear_extracted() {
        let db = test_db().await;
        let mut conn = db.pool().acquire().await.unwrap();

        insert_extracted_terms(&mut conn, &[("X".to_string(), None)])
            .await
            .unwrap();
        assert_eq!(clear_extracted_terms(&mut conn).await.unwrap(), 1);
        assert!(list_extracted_terms(&mut conn).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_excluded_normalized_and_unique() {
        let db = test_db().await;
        let mut conn = db.pool().acquire().await.unwrap();

        let first = add_excluded_term(&mut conn, "  Acme  ", TermSource::Manual)
            .await
            .unwrap();
        assert_eq!(first.term_text, "Acme");

        // Same term with different whitespace is the same row
        let second = add_excluded_term(&mut conn, "Acme", TermSource::Auto)
            .await
            .unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.source, TermSource::Manual);

        assert_eq!(list_excluded_terms(&mut conn).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_excluded_empty_text_rejected() {
        let db = test_db().await;
        let mut conn = db.pool().acquire().await.unwrap();

        assert!(add_excluded_term(&mut conn, "   ", TermSource::Manual)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_required_crud() {
        let db = test_db().await;
        let mut conn = db.pool().acquire().await.unwrap();

        let term = add_required_term(&mut conn, "Tokyo").await.unwrap();
        assert_eq!(list_required_terms(&mut conn).await.unwrap().len(), 1);

        assert!(delete_required_term(&mut conn, term.id).await.unwrap());
        assert!(list_required_terms(&mut conn).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_enumerate_hides_excluded_but_not_required() {
        let db = test_db().await;
        let mut conn = db.pool().acquire().await.unwrap();

        insert_extracted_terms(
            &mut conn,
            &[
                ("Alice".to_string(), Some(TermCategory::PersonName)),
                ("noise".to_string(), Some(TermCategory::CommonNoun)),
            ],
        )
        .await
        .unwrap();
        add_excluded_term(&mut conn, "noise", TermSource::Manual)
            .await
            .unwrap();

        let terms = enumerate_terms(&mut conn).await.unwrap();
        let names: Vec<&str> = terms.iter().map(|t| t.term_text.as_str()).collect();
        assert_eq!(names, vec!["Alice"]);
    }

    #[tokio::test]
    async fn test_enumerate_required_overrides_excluded() {
        let db = test_db().await;
        let mut conn = db.pool().acquire().await.unwrap();

        insert_extracted_terms(&mut conn, &[("Acme".to_string(), Some(TermCategory::Organization))])
            .await
            .unwrap();
        add_excluded_term(&mut conn, "Acme", TermSource::Auto)
            .await
            .unwrap();
        add_required_term(&mut conn, "Acme").await.unwrap();

        let terms = enumerate_terms(&mut conn).await.unwrap();
        assert_eq!(terms.len(), 1);
        assert_eq!(terms[0].term_text, "Acme");
        assert!(terms[0].id > 0, "extracted row wins over synthetic");
    }

    #[tokio::test]
    async fn test_enumerate_synthesizes_required_only_rows() {
        let db = test_db().await;
        let mut conn = db.pool().acquire().await.unwrap();

        let req = add_required_term(&mut conn, "Mithril").await.unwrap();

        let terms = enumerate_terms(&mut conn).await.unwrap();
        assert_eq!(terms.len(), 1);
        assert_eq!(terms[0].term_text, "Mithril");
        assert_eq!(terms[0].id, -req.id);
        assert_eq!(terms[0].category, None);
    }
}
