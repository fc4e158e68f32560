//! Term extraction engine.
//!
//! Surfaces candidate terms from one document, applies the required/excluded
//! policy, and classifies the survivors with batched LLM calls.

use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;

use crate::error::Result;
use crate::llm::{prompt, CallOptions, LlmClient};
use crate::model::{normalize_term_text, CandidateTerm, Document, TermCategory};
use crate::pipeline::progress::ProgressFn;
use crate::pipeline::tokenizer;
use tracing::warn;

/// Terms classified per LLM call.
const CLASSIFY_BATCH_SIZE: usize = 40;

/// Extracts and classifies candidate terms for one document at a time.
pub struct TermExtractor {
    llm: Arc<dyn LlmClient>,
}

/// Classification reply shape; lenient so partial answers still help.
#[derive(Debug, Deserialize)]
struct ClassificationResponse {
    #[serde(default)]
    terms: Vec<ClassifiedTerm>,
}

#[derive(Debug, Deserialize)]
struct ClassifiedTerm {
    term: String,
    category: String,
}

impl TermExtractor {
    /// Creates an extractor over the given client.
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// Extracts classified terms from a document.
    ///
    /// Pipeline: tokenize, merge in required terms, filter excluded terms
    /// that are not required, deduplicate, classify via the LLM. The cancel
    /// token inside `options` is checked before every LLM call.
    pub async fn extract_terms(
        &self,
        document: &Document,
        required: &[String],
        excluded: &[String],
        options: &CallOptions,
        progress: Option<&ProgressFn<'_>>,
    ) -> Result<Vec<CandidateTerm>> {
        let mut candidates: Vec<String> = tokenizer::candidate_terms(&document.content)
            .into_iter()
            .map(|t| normalize_term_text(&t))
            .filter(|t| !t.is_empty())
            .collect();

        // Required terms are always candidates, whether or not the
        // tokenizer surfaced them
        let required_set: HashSet<&str> = required.iter().map(String::as_str).collect();
        for term in required {
            candidates.push(term.clone());
        }

        // Excluded terms are dropped unless also required
        let excluded_set: HashSet<&str> = excluded.iter().map(String::as_str).collect();
        candidates.retain(|t| required_set.contains(t.as_str()) || !excluded_set.contains(t.as_str()));

        // Deduplicate, preserving first-seen order
        let mut seen = HashSet::new();
        candidates.retain(|t| seen.insert(t.clone()));

        self.classify(candidates, &document.content, options, progress)
            .await
    }

    /// Classifies candidates in batches of `CLASSIFY_BATCH_SIZE`.
    ///
    /// A failed batch keeps its terms with no category rather than dropping
    /// them; classification is advisory, the term list is not.
    async fn classify(
        &self,
        candidates: Vec<String>,
        context: &str,
        options: &CallOptions,
        progress: Option<&ProgressFn<'_>>,
    ) -> Result<Vec<CandidateTerm>> {
        let total = candidates.len();
        let mut classified = Vec::with_capacity(total);

        for (batch_index, batch) in candidates.chunks(CLASSIFY_BATCH_SIZE).enumerate() {
            options.ensure_not_cancelled()?;

            let batch_prompt = prompt::classification_prompt(batch, context);
            let categories = match self
                .llm
                .generate_structured(&batch_prompt, &prompt::classification_schema(), options)
                .await
            {
                Ok(value) => {
                    let response: ClassificationResponse =
                        serde_json::from_value(value).unwrap_or(ClassificationResponse {
                            terms: Vec::new(),
                        });
                    response
                        .terms
                        .into_iter()
                        .filter_map(|t| {
                            let category = t.category.parse::<TermCategory>().ok()?;
                            Some((normalize_term_text(&t.term), category))
                        })
                        .collect()
                }
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    warn!("Term classification batch failed, keeping terms unclassified: {e}");
                    Vec::new()
                }
            };

            let lookup: std::collections::HashMap<String, TermCategory> =
                categories.into_iter().collect();

            for term in batch {
                let candidate = match lookup.get(term.as_str()) {
                    Some(category) => CandidateTerm::Classified {
                        text: term.clone(),
                        category: *category,
                    },
                    None => CandidateTerm::Unclassified(term.clone()),
                };
                classified.push(candidate);
            }

            if let Some(progress) = progress {
                let done = (batch_index * CLASSIFY_BATCH_SIZE + batch.len()).min(total);
                progress(done, total, batch.last().map(String::as_str).unwrap_or(""));
            }
        }

        Ok(classified)
    }
}
