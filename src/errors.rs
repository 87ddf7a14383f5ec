//! # Error Handling Module
//!
//! ## Purpose
//! Centralized error handling for the ingestion pipeline, providing structured
//! error types for every stage of per-case processing and the surrounding
//! orchestration.
//!
//! ## Input/Output Specification
//! - **Input**: Error conditions from extraction, indexing, database, and config
//! - **Output**: Structured error types with context and error chains
//! - **Error Categories**: Input, Extraction, Indexing, Database, Fatal
//!
//! ## Key Features
//! - Hierarchical error types with detailed context
//! - Automatic error conversion and chaining
//! - Per-case error classification for the orchestrator's outcome log
//! - Recoverability predicate driving the bounded retry budgets

use thiserror::Error;

/// Result type used throughout the application
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Error types for the case ingestion pipeline
#[derive(Debug, Error)]
pub enum PipelineError {
    // Input errors: the case is skipped or fails before extraction
    #[error("PDF unreadable: {file} - {details}")]
    PdfUnreadable { file: String, details: String },

    #[error("No metadata row matches normalized id '{normalized_id}' for {file}")]
    MetadataMissing { file: String, normalized_id: String },

    #[error("Metadata sheet error: {details}")]
    MetadataSheet { details: String },

    // Extraction errors
    #[error("LLM request failed: {details}")]
    LlmRequest { details: String },

    #[error("LLM returned unparseable JSON after retry: {details}")]
    LlmUnparseable { details: String },

    #[error("Extracted field '{field}' out of range: {value}")]
    EnumOutOfRange { field: String, value: String },

    // Indexing errors
    #[error("Embedding generation failed after {attempts} attempts: {details}")]
    EmbeddingFailed { attempts: u32, details: String },

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    EmbeddingDimension { expected: usize, actual: usize },

    #[error("Batch write failed for {entity}: {details}")]
    BatchWrite { entity: String, details: String },

    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Transaction deadlock on case '{case_file_id}'")]
    Deadlock { case_file_id: String },

    // Fatal errors: stop the engine
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Required schema object missing: {object}")]
    SchemaMissing { object: String },

    // Wrapped source errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl PipelineError {
    /// Check if the error is transient and worth a bounded retry
    pub fn is_recoverable(&self) -> bool {
        match self {
            PipelineError::LlmRequest { .. }
            | PipelineError::Deadlock { .. }
            | PipelineError::Http(_) => true,
            PipelineError::Database(e) => is_deadlock(e),
            _ => false,
        }
    }

    /// Error category for the orchestrator's outcome log and metrics
    pub fn category(&self) -> &'static str {
        match self {
            PipelineError::PdfUnreadable { .. }
            | PipelineError::MetadataMissing { .. }
            | PipelineError::MetadataSheet { .. }
            | PipelineError::Csv(_) => "input",
            PipelineError::LlmRequest { .. }
            | PipelineError::LlmUnparseable { .. }
            | PipelineError::EnumOutOfRange { .. } => "extraction",
            PipelineError::EmbeddingFailed { .. }
            | PipelineError::EmbeddingDimension { .. }
            | PipelineError::BatchWrite { .. } => "indexing",
            PipelineError::Database(_) | PipelineError::Deadlock { .. } => "database",
            PipelineError::Config { .. }
            | PipelineError::SchemaMissing { .. }
            | PipelineError::Toml(_) => "fatal",
            PipelineError::Io(_)
            | PipelineError::Http(_)
            | PipelineError::Json(_)
            | PipelineError::Internal { .. } => "generic",
        }
    }

    /// Fatal errors stop the whole engine instead of failing one case
    pub fn is_fatal(&self) -> bool {
        self.category() == "fatal"
    }
}

/// Postgres reports deadlocks as SQLSTATE 40P01
pub fn is_deadlock(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.code().as_deref() == Some("40P01"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_classification() {
        let err = PipelineError::MetadataMissing {
            file: "1.pdf".into(),
            normalized_id: "1".into(),
        };
        assert_eq!(err.category(), "input");

        let err = PipelineError::LlmUnparseable { details: "x".into() };
        assert_eq!(err.category(), "extraction");
        assert!(!err.is_recoverable());

        let err = PipelineError::Config { message: "no url".into() };
        assert!(err.is_fatal());
    }

    #[test]
    fn test_llm_request_is_recoverable() {
        let err = PipelineError::LlmRequest { details: "timeout".into() };
        assert!(err.is_recoverable());
    }
}
