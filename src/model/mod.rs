//! Core domain types shared across persistence, pipeline, and API layers.

mod document;
mod glossary;
mod project;
mod run;
mod term;

pub use document::{validate_content, validate_file_name, Document, MAX_DOCUMENT_BYTES};
pub use glossary::{GlossaryEntry, Issue, SynonymGroup};
pub use project::Project;
pub use run::{Run, RunScope, RunStatus};
pub use term::{
    normalize_term_text, CandidateTerm, ExcludedTerm, ExtractedTerm, RequiredTerm, TermCategory,
    TermSource,
};
