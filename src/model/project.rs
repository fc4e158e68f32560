//! Project catalog entry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A project registered in the top-level catalog.
///
/// The project `name` doubles as the directory segment under which the
/// per-project database lives, so it is validated like a single path segment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: i64,
    pub name: String,
    /// Filesystem root the CLI loads documents from when the DB is empty.
    pub doc_root: String,
    pub llm_provider: String,
    pub llm_model: String,
    pub llm_base_url: String,
    pub created_at: DateTime<Utc>,
}
