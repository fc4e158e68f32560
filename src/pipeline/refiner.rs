//! Glossary refinement engine.

use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

use crate::error::Result;
use crate::llm::{prompt, CallOptions, LlmClient};
use crate::model::{Document, GlossaryEntry, Issue};
use crate::pipeline::generator::context_for_term;
use crate::pipeline::progress::ProgressFn;

/// Rewrites provisional entries into the final glossary.
pub struct GlossaryRefiner {
    llm: Arc<dyn LlmClient>,
}

#[derive(Debug, Deserialize)]
struct RefinedResponse {
    #[serde(default)]
    definition: String,
    #[serde(default = "default_confidence")]
    confidence: f64,
    #[serde(default)]
    aliases: Vec<String>,
}

fn default_confidence() -> f64 {
    0.5
}

impl GlossaryRefiner {
    /// Creates a refiner over the given client.
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// Refines each entry against its reported issues.
    ///
    /// Entries without issues pass through unchanged, without an LLM call.
    /// A per-entry failure keeps the provisional definition; cancellation is
    /// checked before every LLM call and propagates.
    pub async fn refine(
        &self,
        entries: &[GlossaryEntry],
        issues: &[Issue],
        documents: &[Document],
        options: &CallOptions,
        progress: Option<&ProgressFn<'_>>,
    ) -> Result<Vec<GlossaryEntry>> {
        let mut issues_by_term: HashMap<&str, Vec<&Issue>> = HashMap::new();
        for issue in issues {
            issues_by_term
                .entry(issue.term_name.as_str())
                .or_default()
                .push(issue);
        }

        let total = entries.len();
        let mut refined = Vec::with_capacity(total);

        for (index, entry) in entries.iter().enumerate() {
            let entry_issues = issues_by_term
                .get(entry.name.as_str())
                .map(Vec::as_slice)
                .unwrap_or(&[]);

            let result = if entry_issues.is_empty() {
                Ok(passthrough(entry))
            } else {
                self.refine_one(entry, entry_issues, documents, options).await
            };

            match result {
                Ok(entry) => refined.push(entry),
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    warn!("Refinement failed for '{}', keeping provisional: {e}", entry.name);
                    refined.push(passthrough(entry));
                }
            }

            if let Some(progress) = progress {
                progress(index + 1, total, &entry.name);
            }
        }

        Ok(refined)
    }

    async fn refine_one(
        &self,
        entry: &GlossaryEntry,
        issues: &[&Issue],
        documents: &[Document],
        options: &CallOptions,
    ) -> Result<GlossaryEntry> {
        options.ensure_not_cancelled()?;

        let context = context_for_term(&entry.name, documents);
        let refine_prompt = prompt::refine_prompt(entry, issues, &context);
        let value = self
            .llm
            .generate_structured(&refine_prompt, &prompt::refine_schema(), options)
            .await?;

        let response: RefinedResponse = serde_json::from_value(value).unwrap_or(RefinedResponse {
            definition: String::new(),
            confidence: default_confidence(),
            aliases: Vec::new(),
        });

        if response.definition.trim().is_empty() {
            warn!("Empty refinement for '{}', keeping provisional", entry.name);
            return Ok(passthrough(entry));
        }

        Ok(GlossaryEntry {
            id: 0,
            name: entry.name.clone(),
            definition: response.definition.trim().to_string(),
            confidence: response.confidence,
            aliases: if response.aliases.is_empty() {
                entry.aliases.clone()
            } else {
                response.aliases
            },
        }
        .with_clamped_confidence())
    }
}

/// Copies an entry into the refined set without a new row id.
fn passthrough(entry: &GlossaryEntry) -> GlossaryEntry {
    GlossaryEntry {
        id: 0,
        name: entry.name.clone(),
        definition: entry.definition.clone(),
        confidence: entry.confidence,
        aliases: entry.aliases.clone(),
    }
}
