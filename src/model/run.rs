//! Run lifecycle types.
//!
//! A run is a single end-to-end or partial execution of the glossary
//! pipeline for one project.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Which subgraph of pipeline stages a run executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunScope {
    /// Everything: clear all derived tables, extract, generate, review, refine.
    Full,
    /// Term extraction only (incremental when document ids are given).
    Extract,
    /// Regenerate the glossary from already-extracted terms.
    FromTerms,
    /// Re-review and refine existing provisional entries.
    ProvisionalToRefined,
}

impl RunScope {
    /// Returns the scope as its wire/storage string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Extract => "extract",
            Self::FromTerms => "from_terms",
            Self::ProvisionalToRefined => "provisional_to_refined",
        }
    }
}

impl FromStr for RunScope {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "full" => Ok(Self::Full),
            "extract" => Ok(Self::Extract),
            "from_terms" => Ok(Self::FromTerms),
            "provisional_to_refined" => Ok(Self::ProvisionalToRefined),
            _ => Err(format!("Unknown run scope: {}", s)),
        }
    }
}

impl std::fmt::Display for RunScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Current status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    /// Returns the status as its wire/storage string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Returns true for the terminal set `{completed, failed, cancelled}`.
    ///
    /// Once terminal, no field of the run mutates.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Returns true for the active set `{pending, running}`.
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }
}

impl FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("Unknown run status: {}", s)),
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: i64,
    pub scope: RunScope,
    pub status: RunStatus,
    pub triggered_by: String,
    pub created_at: DateTime<Utc>,
    /// Set exactly when the worker moves the run to `running`.
    pub started_at: Option<DateTime<Utc>>,
    /// Set exactly when the run enters a terminal state.
    pub finished_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    /// Restricts an `extract` run to specific documents (incremental mode).
    pub document_ids: Option<Vec<i64>>,
}
