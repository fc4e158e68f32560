//! Error types for lexigen.
//!
//! Defines the main error enum used throughout the application.

use thiserror::Error;

/// Main error type for lexigen operations.
#[derive(Error, Debug)]
pub enum LexigenError {
    /// Input validation errors (bad file names, empty terms, oversized content).
    #[error("Validation error: {0}")]
    Validation(String),

    /// Run admission refused because another run is still active.
    #[error("A run is already active for this project")]
    AlreadyRunning,

    /// A referenced entity (project, run, document) does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// LLM API errors (transport failures, timeouts, unparseable output).
    #[error("LLM error: {0}")]
    Llm(String),

    /// Persistence errors (connection, migration, query failures).
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// The run was cancelled cooperatively via its cancel token.
    ///
    /// This is the pipeline's only out-of-band exit: stages propagate it
    /// unchanged and the run manager translates it to the `cancelled` state.
    #[error("Pipeline cancelled")]
    Cancelled,

    /// Configuration errors (invalid config file, missing required fields).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal application errors (unexpected states, bugs).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl LexigenError {
    /// Creates a validation error with the given message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Creates a not-found error with the given message.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Creates an LLM error with the given message.
    pub fn llm(msg: impl Into<String>) -> Self {
        Self::Llm(msg.into())
    }

    /// Creates a persistence error with the given message.
    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns true if this error is the cooperative-cancellation sentinel.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Validation(_) => "Validation Error",
            Self::AlreadyRunning => "Admission Error",
            Self::NotFound(_) => "Not Found",
            Self::Llm(_) => "LLM Error",
            Self::Persistence(_) => "Persistence Error",
            Self::Cancelled => "Cancelled",
            Self::Config(_) => "Configuration Error",
            Self::Internal(_) => "Internal Error",
        }
    }
}

/// Result type alias using LexigenError.
pub type Result<T> = std::result::Result<T, LexigenError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_validation() {
        let err = LexigenError::validation("file name contains '..'");
        assert_eq!(err.to_string(), "Validation error: file name contains '..'");
        assert_eq!(err.category(), "Validation Error");
    }

    #[test]
    fn test_error_display_already_running() {
        let err = LexigenError::AlreadyRunning;
        assert!(err.to_string().contains("already active"));
        assert_eq!(err.category(), "Admission Error");
    }

    #[test]
    fn test_error_display_llm() {
        let err = LexigenError::llm("Rate limited. Please wait.");
        assert_eq!(err.to_string(), "LLM error: Rate limited. Please wait.");
        assert_eq!(err.category(), "LLM Error");
    }

    #[test]
    fn test_error_cancelled_sentinel() {
        let err = LexigenError::Cancelled;
        assert!(err.is_cancelled());
        assert!(!LexigenError::llm("boom").is_cancelled());
        assert_eq!(err.category(), "Cancelled");
    }

    #[test]
    fn test_error_display_persistence() {
        let err = LexigenError::persistence("database is locked");
        assert_eq!(err.to_string(), "Persistence error: database is locked");
        assert_eq!(err.category(), "Persistence Error");
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<LexigenError>();
    }
}
