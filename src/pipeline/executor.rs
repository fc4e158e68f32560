//! Pipeline executor: stage graph, scope dispatch, batch persistence.
//!
//! Drives `load_documents → extract_terms → generate_provisional → review →
//! refine → persist_refined` for a run's scope. Stages check cancellation on
//! entry; per-item loops inside the engines check it before each LLM call.
//! All multi-row writes go through one transaction per stage.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{LexigenError, Result};
use crate::llm::LlmClient;
use crate::model::{
    validate_content, validate_file_name, CandidateTerm, Document, RunScope, TermCategory,
};
use crate::persistence::glossary::GlossaryTable;
use crate::persistence::{documents, glossary, terms, ProjectDb};
use crate::pipeline::extractor::TermExtractor;
use crate::pipeline::generator::GlossaryGenerator;
use crate::pipeline::progress::ExecutionContext;
use crate::pipeline::refiner::GlossaryRefiner;
use crate::pipeline::reviewer::GlossaryReviewer;

/// A table cleared before a run begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearTarget {
    Issues,
    Refined,
    Provisional,
    Extracted,
}

/// Table-clear policy per scope, in clearing order.
///
/// The policy is data, not control flow, so tests can compare it against
/// the declared rules directly.
pub fn clear_policy(scope: RunScope) -> &'static [ClearTarget] {
    use ClearTarget::*;
    match scope {
        RunScope::Full | RunScope::Extract => &[Issues, Refined, Provisional, Extracted],
        RunScope::FromTerms => &[Issues, Refined, Provisional],
        RunScope::ProvisionalToRefined => &[Issues, Refined],
    }
}

/// Executes the pipeline stage graph for one run.
pub struct PipelineExecutor {
    llm: Arc<dyn LlmClient>,
    /// Filesystem fallback for document loading (CLI mode); `None` for
    /// API-driven projects whose documents arrive by upload.
    doc_root: Option<PathBuf>,
}

impl PipelineExecutor {
    /// Creates an executor over the given client.
    pub fn new(llm: Arc<dyn LlmClient>, doc_root: Option<PathBuf>) -> Self {
        Self { llm, doc_root }
    }

    /// Runs the scope's stage subgraph to completion.
    ///
    /// `document_ids` marks an incremental extract after upload: only those
    /// documents are loaded and no tables are cleared.
    pub async fn execute(
        &self,
        db: &ProjectDb,
        scope: RunScope,
        ctx: &ExecutionContext,
        document_ids: Option<Vec<i64>>,
    ) -> Result<()> {
        ctx.log_info(format!("Run started (scope={scope})"));

        if document_ids.is_none() {
            let mut tx = db.pool().begin().await.map_err(begin_error)?;
            for target in clear_policy(scope) {
                let cleared = match target {
                    ClearTarget::Issues => glossary::clear_issues(&mut tx).await?,
                    ClearTarget::Refined => {
                        glossary::clear_entries(&mut tx, GlossaryTable::Refined).await?
                    }
                    ClearTarget::Provisional => {
                        glossary::clear_entries(&mut tx, GlossaryTable::Provisional).await?
                    }
                    ClearTarget::Extracted => terms::clear_extracted_terms(&mut tx).await?,
                };
                debug!(?target, cleared, "cleared table for scope");
            }
            tx.commit().await.map_err(commit_error)?;
        } else {
            ctx.log_info("Incremental extract: keeping existing tables");
        }

        match scope {
            RunScope::Full => self.execute_full(db, ctx).await,
            RunScope::Extract => self.execute_extract(db, ctx, document_ids).await,
            RunScope::FromTerms => self.execute_from_terms(db, ctx).await,
            RunScope::ProvisionalToRefined => self.execute_provisional_to_refined(db, ctx).await,
        }
    }

    /// Releases executor resources. Called by the run manager on all exit
    /// paths.
    pub async fn close(&self) {
        debug!("Pipeline executor closed");
    }

    async fn execute_full(&self, db: &ProjectDb, ctx: &ExecutionContext) -> Result<()> {
        let docs = self.load_documents(db, ctx, None).await?;
        let terms = self.stage_extract(db, ctx, &docs).await?;
        self.stage_generate_to_refined(db, ctx, terms, &docs).await
    }

    async fn execute_extract(
        &self,
        db: &ProjectDb,
        ctx: &ExecutionContext,
        document_ids: Option<Vec<i64>>,
    ) -> Result<()> {
        let docs = self.load_documents(db, ctx, document_ids.as_deref()).await?;
        self.stage_extract(db, ctx, &docs).await?;
        Ok(())
    }

    async fn execute_from_terms(&self, db: &ProjectDb, ctx: &ExecutionContext) -> Result<()> {
        let docs = self.load_documents(db, ctx, None).await?;

        let mut conn = db.pool().acquire().await.map_err(acquire_error)?;
        let stored = terms::list_extracted_terms(&mut conn).await?;
        drop(conn);

        let terms: Vec<CandidateTerm> = stored
            .into_iter()
            .map(|t| match t.category {
                Some(category) => CandidateTerm::Classified {
                    text: t.term_text,
                    category,
                },
                None => CandidateTerm::Unclassified(t.term_text),
            })
            .collect();

        ctx.log_info(format!("Loaded {} extracted terms", terms.len()));
        self.stage_generate_to_refined(db, ctx, terms, &docs).await
    }

    async fn execute_provisional_to_refined(
        &self,
        db: &ProjectDb,
        ctx: &ExecutionContext,
    ) -> Result<()> {
        let docs = self.load_documents(db, ctx, None).await?;

        let mut conn = db.pool().acquire().await.map_err(acquire_error)?;
        let entries = glossary::list_entries(&mut conn, GlossaryTable::Provisional).await?;
        drop(conn);

        ctx.log_info(format!("Loaded {} provisional entries", entries.len()));

        ctx.check_cancelled()?;
        let reviewer = GlossaryReviewer::new(self.llm.clone());
        ctx.log_info("Reviewing provisional entries");
        let Some(issues) = reviewer.review(&entries, &docs, &ctx.call_options()).await? else {
            return Err(LexigenError::Cancelled);
        };

        let mut tx = db.pool().begin().await.map_err(begin_error)?;
        glossary::insert_issues(&mut tx, &issues).await?;
        tx.commit().await.map_err(commit_error)?;
        ctx.log_info(format!("Review found {} issues", issues.len()));

        self.stage_refine(db, ctx, &entries, &issues, &docs).await
    }

    /// Loads documents from the database, falling back to `doc_root` on
    /// disk when the database has none (CLI mode).
    async fn load_documents(
        &self,
        db: &ProjectDb,
        ctx: &ExecutionContext,
        document_ids: Option<&[i64]>,
    ) -> Result<Vec<Document>> {
        ctx.check_cancelled()?;

        let mut conn = db.pool().acquire().await.map_err(acquire_error)?;

        if let Some(ids) = document_ids {
            let docs = documents::get_documents_by_ids(&mut conn, ids).await?;
            ctx.log_info(format!("Loaded {} documents (incremental)", docs.len()));
            return Ok(docs);
        }

        let docs = documents::list_documents(&mut conn).await?;
        drop(conn);
        if !docs.is_empty() {
            ctx.log_info(format!("Loaded {} documents", docs.len()));
            return Ok(docs);
        }

        let Some(root) = &self.doc_root else {
            ctx.log_warning("No documents registered and no document root configured");
            return Ok(Vec::new());
        };

        self.load_documents_from_disk(db, ctx, root.clone()).await
    }

    /// Imports `.txt`/`.md` files under `root` into the database in a
    /// single transaction, skipping unchanged content by hash.
    async fn load_documents_from_disk(
        &self,
        db: &ProjectDb,
        ctx: &ExecutionContext,
        root: PathBuf,
    ) -> Result<Vec<Document>> {
        ctx.log_info(format!("Loading documents from {}", root.display()));

        let mut loaded = Vec::new();
        let mut tx = db.pool().begin().await.map_err(begin_error)?;

        for entry in WalkDir::new(&root).sort_by_file_name() {
            let entry = entry
                .map_err(|e| LexigenError::internal(format!("Failed to walk document root: {e}")))?;
            if !entry.file_type().is_file() {
                continue;
            }

            let relative = entry
                .path()
                .strip_prefix(&root)
                .map_err(|e| LexigenError::internal(format!("Path outside root: {e}")))?
                .to_string_lossy()
                .replace(std::path::MAIN_SEPARATOR, "/");

            let file_name = match validate_file_name(&relative) {
                Ok(name) => name,
                Err(e) => {
                    ctx.log_warning(format!("Skipping {relative}: {e}"));
                    continue;
                }
            };

            let content = match std::fs::read_to_string(entry.path()) {
                Ok(content) => content,
                Err(e) => {
                    ctx.log_warning(format!("Skipping {file_name}: unreadable ({e})"));
                    continue;
                }
            };
            if let Err(e) = validate_content(&content) {
                ctx.log_warning(format!("Skipping {file_name}: {e}"));
                continue;
            }

            // Unchanged files keep their row untouched
            if let Some(existing) = documents::get_document_by_name(&mut tx, &file_name).await? {
                if existing.content_hash == Document::hash_content(&content) {
                    loaded.push(existing);
                    continue;
                }
            }

            let doc = documents::upsert_document(&mut tx, &file_name, &content).await?;
            loaded.push(doc);
        }

        tx.commit().await.map_err(commit_error)?;
        ctx.log_info(format!("Loaded {} documents from disk", loaded.len()));
        Ok(loaded)
    }

    /// Extraction stage: per-document extraction, cross-document dedup,
    /// one batched insert.
    async fn stage_extract(
        &self,
        db: &ProjectDb,
        ctx: &ExecutionContext,
        docs: &[Document],
    ) -> Result<Vec<CandidateTerm>> {
        ctx.check_cancelled()?;

        let mut conn = db.pool().acquire().await.map_err(acquire_error)?;
        let required: Vec<String> = terms::list_required_terms(&mut conn)
            .await?
            .into_iter()
            .map(|t| t.term_text)
            .collect();
        let excluded: Vec<String> = terms::list_excluded_terms(&mut conn)
            .await?
            .into_iter()
            .map(|t| t.term_text)
            .collect();
        drop(conn);

        let extractor = TermExtractor::new(self.llm.clone());
        let options = ctx.call_options();
        let mut all_pairs: Vec<(String, Option<TermCategory>)> = Vec::new();

        for doc in docs {
            ctx.log_info(format!("Extracting terms from {}", doc.file_name));
            let progress = |current: usize, total: usize, term: &str| {
                ctx.progress("extract_terms", current, total, term);
            };
            let extracted = extractor
                .extract_terms(doc, &required, &excluded, &options, Some(&progress))
                .await?;
            all_pairs.extend(
                extracted
                    .into_iter()
                    .map(|t| (t.text().to_string(), t.category())),
            );
        }

        // Deduplicate across documents before any further LLM spend
        let total = all_pairs.len();
        let mut seen = HashSet::new();
        all_pairs.retain(|(text, _)| seen.insert(text.clone()));
        if all_pairs.len() < total {
            ctx.log_info(format!(
                "Deduplicated terms across documents: {total} -> {}",
                all_pairs.len()
            ));
        }

        let mut tx = db.pool().begin().await.map_err(begin_error)?;
        terms::insert_extracted_terms(&mut tx, &all_pairs).await?;
        tx.commit().await.map_err(commit_error)?;
        ctx.log_info(format!("Persisted {} extracted terms", all_pairs.len()));

        Ok(all_pairs
            .into_iter()
            .map(|(text, category)| match category {
                Some(category) => CandidateTerm::Classified { text, category },
                None => CandidateTerm::Unclassified(text),
            })
            .collect())
    }

    /// Generation, review, and refinement stages with their persistence.
    async fn stage_generate_to_refined(
        &self,
        db: &ProjectDb,
        ctx: &ExecutionContext,
        terms: Vec<CandidateTerm>,
        docs: &[Document],
    ) -> Result<()> {
        ctx.check_cancelled()?;

        let generator = GlossaryGenerator::new(self.llm.clone());
        ctx.log_info(format!("Generating definitions for {} terms", terms.len()));
        let progress = |current: usize, total: usize, term: &str| {
            ctx.progress("generate_provisional", current, total, term);
        };
        let entries = generator
            .generate(&terms, docs, &ctx.call_options(), Some(&progress))
            .await?;

        ctx.check_cancelled()?;

        let reviewer = GlossaryReviewer::new(self.llm.clone());
        ctx.log_info(format!("Reviewing {} provisional entries", entries.len()));
        let Some(issues) = reviewer.review(&entries, docs, &ctx.call_options()).await? else {
            // Cancelled mid-review: nothing provisional may become visible
            return Err(LexigenError::Cancelled);
        };

        let mut tx = db.pool().begin().await.map_err(begin_error)?;
        glossary::insert_entries(&mut tx, GlossaryTable::Provisional, &entries).await?;
        glossary::insert_issues(&mut tx, &issues).await?;
        tx.commit().await.map_err(commit_error)?;
        ctx.log_info(format!(
            "Persisted {} provisional entries, {} issues",
            entries.len(),
            issues.len()
        ));

        self.stage_refine(db, ctx, &entries, &issues, docs).await
    }

    /// Refinement stage and final persistence.
    async fn stage_refine(
        &self,
        db: &ProjectDb,
        ctx: &ExecutionContext,
        entries: &[crate::model::GlossaryEntry],
        issues: &[crate::model::Issue],
        docs: &[Document],
    ) -> Result<()> {
        ctx.check_cancelled()?;

        let refiner = GlossaryRefiner::new(self.llm.clone());
        ctx.log_info(format!("Refining {} entries", entries.len()));
        let progress = |current: usize, total: usize, term: &str| {
            ctx.progress("refine", current, total, term);
        };
        let refined = refiner
            .refine(entries, issues, docs, &ctx.call_options(), Some(&progress))
            .await?;

        // A late cancel must not produce visible output
        ctx.check_cancelled()?;

        let mut tx = db.pool().begin().await.map_err(begin_error)?;
        glossary::insert_entries(&mut tx, GlossaryTable::Refined, &refined).await?;
        tx.commit().await.map_err(commit_error)?;
        ctx.log_info(format!("Persisted {} refined entries", refined.len()));

        Ok(())
    }
}

fn begin_error(e: sqlx::Error) -> LexigenError {
    LexigenError::persistence(format!("Failed to begin transaction: {e}"))
}

fn commit_error(e: sqlx::Error) -> LexigenError {
    LexigenError::persistence(format!("Failed to commit transaction: {e}"))
}

fn acquire_error(e: sqlx::Error) -> LexigenError {
    LexigenError::persistence(format!("Failed to acquire connection: {e}"))
}
