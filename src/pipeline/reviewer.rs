//! Glossary review engine.

use serde::Deserialize;
use std::sync::Arc;
use tracing::warn;

use crate::error::Result;
use crate::llm::{prompt, CallOptions, LlmClient};
use crate::model::{Document, GlossaryEntry, Issue};

/// Entries reviewed per LLM call.
const REVIEW_BATCH_SIZE: usize = 20;

/// Reviews provisional entries and reports defects.
pub struct GlossaryReviewer {
    llm: Arc<dyn LlmClient>,
}

#[derive(Debug, Deserialize)]
struct ReviewResponse {
    #[serde(default)]
    issues: Vec<ReviewIssue>,
}

#[derive(Debug, Deserialize)]
struct ReviewIssue {
    #[serde(default)]
    term_name: String,
    #[serde(default)]
    issue_type: String,
    #[serde(default)]
    description: String,
    #[serde(default = "default_severity")]
    severity: String,
}

fn default_severity() -> String {
    "minor".to_string()
}

impl GlossaryReviewer {
    /// Creates a reviewer over the given client.
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// Reviews the entries against the corpus.
    ///
    /// Returns `None` when the run was cancelled mid-review, in which case
    /// the caller must not persist provisional state. A batch whose reply
    /// cannot be parsed contributes no issues; a transport failure after
    /// retries propagates as an error.
    pub async fn review(
        &self,
        entries: &[GlossaryEntry],
        documents: &[Document],
        options: &CallOptions,
    ) -> Result<Option<Vec<Issue>>> {
        let context = documents
            .iter()
            .map(|d| d.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let mut issues = Vec::new();

        for batch in entries.chunks(REVIEW_BATCH_SIZE) {
            if options.cancel.is_cancelled() {
                return Ok(None);
            }

            let review_prompt = prompt::review_prompt(batch, &context);
            let value = match self
                .llm
                .generate_structured(&review_prompt, &prompt::review_schema(), options)
                .await
            {
                Ok(value) => value,
                Err(e) if e.is_cancelled() => return Ok(None),
                Err(e) => return Err(e),
            };

            let response: ReviewResponse = match serde_json::from_value(value) {
                Ok(response) => response,
                Err(e) => {
                    warn!("Unparseable review reply, skipping batch: {e}");
                    continue;
                }
            };

            let known: std::collections::HashSet<&str> =
                batch.iter().map(|e| e.name.as_str()).collect();

            for issue in response.issues {
                if issue.term_name.is_empty() || issue.description.is_empty() {
                    continue;
                }
                // Issues for terms outside the reviewed batch are reviewer
                // hallucinations
                if !known.contains(issue.term_name.as_str()) {
                    warn!("Reviewer reported unknown term '{}'", issue.term_name);
                    continue;
                }
                issues.push(Issue {
                    id: 0,
                    term_name: issue.term_name,
                    issue_type: if issue.issue_type.is_empty() {
                        "unspecified".to_string()
                    } else {
                        issue.issue_type
                    },
                    description: issue.description,
                    severity: issue.severity,
                });
            }
        }

        Ok(Some(issues))
    }
}
