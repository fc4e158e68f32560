//! Term types: extracted candidates, exclusions, and required terms.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use unicode_normalization::UnicodeNormalization;

/// The seven classification categories assigned by the LLM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TermCategory {
    PersonName,
    PlaceName,
    Organization,
    WorkName,
    Technical,
    Coined,
    CommonNoun,
}

impl TermCategory {
    /// Returns the category as its wire/storage string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PersonName => "person_name",
            Self::PlaceName => "place_name",
            Self::Organization => "organization",
            Self::WorkName => "work_name",
            Self::Technical => "technical",
            Self::Coined => "coined",
            Self::CommonNoun => "common_noun",
        }
    }

    /// All categories, in prompt order.
    pub fn all() -> &'static [TermCategory] {
        &[
            Self::PersonName,
            Self::PlaceName,
            Self::Organization,
            Self::WorkName,
            Self::Technical,
            Self::Coined,
            Self::CommonNoun,
        ]
    }
}

impl FromStr for TermCategory {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "person_name" => Ok(Self::PersonName),
            "place_name" => Ok(Self::PlaceName),
            "organization" => Ok(Self::Organization),
            "work_name" => Ok(Self::WorkName),
            "technical" => Ok(Self::Technical),
            "coined" => Ok(Self::Coined),
            "common_noun" => Ok(Self::CommonNoun),
            _ => Err(format!("Unknown term category: {}", s)),
        }
    }
}

impl std::fmt::Display for TermCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where an excluded term came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TermSource {
    Auto,
    Manual,
}

impl TermSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Manual => "manual",
        }
    }
}

impl FromStr for TermSource {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "auto" => Ok(Self::Auto),
            "manual" => Ok(Self::Manual),
            _ => Err(format!("Unknown term source: {}", s)),
        }
    }
}

/// A term surfaced by the extraction stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedTerm {
    /// Stable row id; synthetic required-only rows carry negative ids.
    pub id: i64,
    pub term_text: String,
    pub category: Option<TermCategory>,
}

/// A user- or pipeline-declared term that must never appear in the glossary
/// unless also required.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExcludedTerm {
    pub id: i64,
    pub term_text: String,
    pub source: TermSource,
    pub created_at: DateTime<Utc>,
}

/// A user-declared term that must appear in the glossary regardless of
/// heuristic filters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequiredTerm {
    pub id: i64,
    pub term_text: String,
    pub created_at: DateTime<Utc>,
}

/// A term flowing through the pipeline, before or after classification.
///
/// Stages normalize to `Classified` at the extraction boundary; later stages
/// only ever see classified terms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CandidateTerm {
    Unclassified(String),
    Classified {
        text: String,
        category: TermCategory,
    },
}

impl CandidateTerm {
    /// Returns the surface text regardless of classification state.
    pub fn text(&self) -> &str {
        match self {
            Self::Unclassified(text) => text,
            Self::Classified { text, .. } => text,
        }
    }

    /// Returns the category if classified.
    pub fn category(&self) -> Option<TermCategory> {
        match self {
            Self::Unclassified(_) => None,
            Self::Classified { category, .. } => Some(*category),
        }
    }

    /// Tags an unclassified candidate; a classified one keeps its category.
    pub fn classify(self, category: TermCategory) -> Self {
        match self {
            Self::Unclassified(text) => Self::Classified { text, category },
            classified @ Self::Classified { .. } => classified,
        }
    }
}

/// Normalizes user-entered term text: NFC, then whitespace trim.
///
/// Excluded and required term tables are unique over this form.
pub fn normalize_term_text(raw: &str) -> String {
    raw.nfc().collect::<String>().trim().to_string()
}
