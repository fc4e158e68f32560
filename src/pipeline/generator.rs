//! Provisional definition generation engine.

use serde::Deserialize;
use std::sync::Arc;
use tracing::warn;

use crate::error::Result;
use crate::llm::{prompt, CallOptions, LlmClient};
use crate::model::{CandidateTerm, Document, GlossaryEntry, TermCategory};
use crate::pipeline::progress::ProgressFn;

/// Generates one provisional glossary entry per accepted term.
pub struct GlossaryGenerator {
    llm: Arc<dyn LlmClient>,
}

/// Definition reply shape; lenient so partial answers still land.
#[derive(Debug, Deserialize)]
struct DefinitionResponse {
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

impl GlossaryGenerator {
    /// Creates a generator over the given client.
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// Generates provisional entries for the given terms.
    ///
    /// Common nouns are skipped here, not at extraction, so the term list
    /// keeps showing them. A single term's LLM failure is logged and the
    /// term skipped; cancellation is checked before every LLM call and
    /// progress is emitted for every term, including skipped ones.
    pub async fn generate(
        &self,
        terms: &[CandidateTerm],
        documents: &[Document],
        options: &CallOptions,
        progress: Option<&ProgressFn<'_>>,
    ) -> Result<Vec<GlossaryEntry>> {
        let total = terms.len();
        let mut entries = Vec::new();

        for (index, term) in terms.iter().enumerate() {
            let result = self.generate_one(term, documents, options).await;

            match result {
                Ok(Some(entry)) => entries.push(entry),
                Ok(None) => {}
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    warn!("Definition generation failed for '{}': {e}", term.text());
                }
            }

            // Progress never stalls on a skipped or failed term
            if let Some(progress) = progress {
                progress(index + 1, total, term.text());
            }
        }

        Ok(entries)
    }

    /// Generates a single entry; `None` means the term is skipped by policy.
    async fn generate_one(
        &self,
        term: &CandidateTerm,
        documents: &[Document],
        options: &CallOptions,
    ) -> Result<Option<GlossaryEntry>> {
        if term.category() == Some(TermCategory::CommonNoun) {
            return Ok(None);
        }

        options.ensure_not_cancelled()?;

        let context = context_for_term(term.text(), documents);
        let definition_prompt = prompt::definition_prompt(term.text(), term.category(), &context);
        let value = self
            .llm
            .generate_structured(&definition_prompt, &prompt::definition_schema(), options)
            .await?;

        let response: DefinitionResponse = serde_json::from_value(value).unwrap_or(
            DefinitionResponse {
                definition: String::new(),
                confidence: default_confidence(),
                aliases: Vec::new(),
            },
        );

        if response.definition.trim().is_empty() {
            warn!("Empty definition for '{}', skipping", term.text());
            return Ok(None);
        }

        Ok(Some(
            GlossaryEntry {
                id: 0,
                name: term.text().to_string(),
                definition: response.definition.trim().to_string(),
                confidence: response.confidence,
                aliases: response.aliases,
            }
            .with_clamped_confidence(),
        ))
    }
}

/// Builds a context excerpt for a term: paragraphs that mention it, or the
/// head of the corpus when nothing does.
pub(crate) fn context_for_term(term: &str, documents: &[Document]) -> String {
    let mut paragraphs = Vec::new();

    for document in documents {
        for paragraph in document.content.split("\n\n") {
            if paragraph.contains(term) {
                paragraphs.push(paragraph.trim());
            }
        }
    }

    if paragraphs.is_empty() {
        return documents
            .first()
            .map(|d| d.content.clone())
            .unwrap_or_default();
    }

    paragraphs.join("\n\n")
}
