//! Glossary entry, review issue, and synonym group types.

use serde::{Deserialize, Serialize};

use crate::error::{LexigenError, Result};

/// A glossary entry; provisional and refined entries share this shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlossaryEntry {
    pub id: i64,
    pub name: String,
    pub definition: String,
    /// Model confidence in [0, 1].
    pub confidence: f64,
    pub aliases: Vec<String>,
}

impl GlossaryEntry {
    /// Clamps confidence into [0, 1]; LLM output occasionally strays.
    pub fn with_clamped_confidence(mut self) -> Self {
        self.confidence = self.confidence.clamp(0.0, 1.0);
        self
    }
}

/// A reviewer-identified defect attached to a provisional entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub id: i64,
    pub term_name: String,
    pub issue_type: String,
    pub description: String,
    pub severity: String,
}

/// An equivalence class of surface forms with one designated primary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynonymGroup {
    pub id: i64,
    pub primary_term_text: String,
    pub members: Vec<String>,
}

impl SynonymGroup {
    /// Checks the structural invariant: the primary is one of the members.
    pub fn validate(&self) -> Result<()> {
        if !self.members.iter().any(|m| m == &self.primary_term_text) {
            return Err(LexigenError::validation(format!(
                "synonym group primary '{}' is not among its members",
                self.primary_term_text
            )));
        }
        Ok(())
    }
}
