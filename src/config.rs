//! # Configuration Management Module
//!
//! ## Purpose
//! Centralized configuration for the ingestion pipeline, supporting a TOML
//! file, environment-variable overrides, and command-line overrides with
//! validation and type-safe access to all settings.
//!
//! ## Input/Output Specification
//! - **Input**: Configuration file (TOML), environment variables, CLI args
//! - **Output**: Validated configuration structs with defaults and overrides
//! - **Validation**: Required connection strings, range checks on worker and
//!   batch counts
//!
//! ## Configuration Sources (in order of precedence)
//! 1. Command line arguments (highest priority)
//! 2. Environment variables
//! 3. Configuration file
//! 4. Default values (lowest priority)

use crate::errors::{PipelineError, Result};
use crate::model::{ChunkEmbeddingMode, PhraseFilterMode};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure containing all system settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Database connection settings
    pub database: DatabaseConfig,
    /// LLM extraction settings
    pub llm: LlmConfig,
    /// Embedding service settings
    pub embedding: EmbeddingConfig,
    /// Orchestration and batching settings
    pub ingestion: IngestionConfig,
    /// RAG indexing settings
    pub rag: RagConfig,
    /// Logging settings
    pub logging: LoggingConfig,
}

/// Database connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Postgres connection string
    pub url: String,
    /// Base pool size
    pub pool_size: u32,
    /// Extra connections allowed beyond the base pool
    pub max_overflow: u32,
    /// Seconds to wait for a connection before failing
    pub acquire_timeout_seconds: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            pool_size: 5,
            max_overflow: 10,
            acquire_timeout_seconds: 30,
        }
    }
}

impl DatabaseConfig {
    /// Total connections the pool may hand out
    pub fn max_connections(&self) -> u32 {
        self.pool_size + self.max_overflow
    }
}

/// LLM extraction settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL of the model server
    pub base_url: String,
    /// Model name
    pub model: String,
    /// Request timeout in seconds
    pub timeout_seconds: u64,
    /// Character cap for the case text sent to the model
    pub max_text_chars: usize,
    /// Sampling temperature (low for consistent extraction)
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "llama3.1:8b".to_string(),
            timeout_seconds: 180,
            max_text_chars: 25_000,
            temperature: 0.1,
        }
    }
}

/// Embedding service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Base URL of the embedding server
    pub base_url: String,
    /// Embedding model name
    pub model: String,
    /// Fixed vector dimension
    pub dimension: usize,
    /// Texts per request
    pub batch_size: usize,
    /// Per-request timeout in seconds
    pub timeout_seconds: u64,
    /// Character cap per input text
    pub truncate_chars: usize,
    /// Bounded retry attempts with exponential backoff
    pub retry_attempts: u32,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "mxbai-embed-large".to_string(),
            dimension: 1024,
            batch_size: 25,
            timeout_seconds: 30,
            truncate_chars: 4_000,
            retry_attempts: 3,
        }
    }
}

/// Orchestration and batching settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionConfig {
    /// Parallel workers consuming the work queue
    pub workers: usize,
    /// Rows per word-dictionary / occurrence insert statement
    pub word_batch: usize,
    /// Bounded work-queue capacity
    pub queue_capacity: usize,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            word_batch: 500,
            queue_capacity: 16,
        }
    }
}

/// RAG indexing settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    /// Master switch for the RAG write path
    pub enabled: bool,
    /// Which chunks get embeddings
    pub chunk_embeddings: ChunkEmbeddingMode,
    /// Phrase filter strictness
    pub phrase_filter: PhraseFilterMode,
    /// Phrase filter term lists
    pub phrases: PhraseFilterConfig,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            chunk_embeddings: ChunkEmbeddingMode::All,
            phrase_filter: PhraseFilterMode::Strict,
            phrases: PhraseFilterConfig::default(),
        }
    }
}

/// Term lists driving the phrase filter. Shipped defaults cover Washington
/// appellate practice; deployments may override any list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PhraseFilterConfig {
    /// Single tokens that mark an n-gram as legal-domain under strict mode
    pub legal_keywords: Vec<String>,
    /// Curated multi-word legal phrases accepted outright
    pub legal_patterns: Vec<String>,
    /// Function-word n-grams rejected in every mode
    pub stop_phrases: Vec<String>,
}

impl Default for PhraseFilterConfig {
    fn default() -> Self {
        Self {
            legal_keywords: [
                "court", "judge", "justice", "appeal", "appellant", "respondent",
                "petitioner", "plaintiff", "defendant", "motion", "statute", "rcw",
                "evidence", "testimony", "custody", "support", "maintenance",
                "parenting", "sentence", "sentencing", "conviction", "damages",
                "negligence", "contract", "dissolution", "jurisdiction", "remand",
                "discretion", "hearsay", "counsel", "trial", "verdict", "liability",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            legal_patterns: [
                "due process",
                "best interests",
                "best interests of the child",
                "abuse of discretion",
                "substantial evidence",
                "substantial change in circumstances",
                "equal protection",
                "burden of proof",
                "summary judgment",
                "attorney fees",
                "child support",
                "parenting plan",
                "community property",
                "de novo",
                "prima facie",
                "res judicata",
                "ineffective assistance",
                "probable cause",
                "reasonable doubt",
                "statute of limitations",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            stop_phrases: [
                "of the", "in the", "to the", "on the", "at the", "for the",
                "and the", "by the", "with the", "from the", "that the", "it is",
                "there is", "there are", "as well", "as well as", "in this",
                "of this", "to be", "may be", "has been", "have been", "did not",
                "does not", "is not", "was not",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration: defaults, then the optional TOML file, then
    /// environment-variable overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Config::default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&raw)?;
        Ok(config)
    }

    /// Apply recognized environment-variable overrides
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("DATABASE_URL") {
            self.database.url = url;
        }
        if let Ok(url) = std::env::var("LLM_BASE_URL") {
            self.llm.base_url = url;
        }
        if let Ok(model) = std::env::var("LLM_MODEL") {
            self.llm.model = model;
        }
        if let Some(seconds) = env_parse("LLM_TIMEOUT_SEC") {
            self.llm.timeout_seconds = seconds;
        }
        if let Ok(url) = std::env::var("EMBEDDING_BASE_URL") {
            self.embedding.base_url = url;
        }
        if let Ok(model) = std::env::var("EMBEDDING_MODEL") {
            self.embedding.model = model;
        }
        if let Some(dim) = env_parse("EMBEDDING_DIM") {
            self.embedding.dimension = dim;
        }
        if let Some(batch) = env_parse("EMBEDDING_BATCH") {
            self.embedding.batch_size = batch;
        }
        if let Some(chars) = env_parse("EMBED_TRUNC_CHARS") {
            self.embedding.truncate_chars = chars;
        }
        if let Some(workers) = env_parse("WORKERS") {
            self.ingestion.workers = workers;
        }
        if let Some(batch) = env_parse("WORD_BATCH") {
            self.ingestion.word_batch = batch;
        }
    }

    /// Validate that the configuration can drive the engine
    pub fn validate(&self) -> Result<()> {
        if self.database.url.is_empty() {
            return Err(PipelineError::Config {
                message: "DATABASE_URL is required".to_string(),
            });
        }
        if self.ingestion.workers == 0 {
            return Err(PipelineError::Config {
                message: "workers must be at least 1".to_string(),
            });
        }
        if self.ingestion.word_batch == 0 {
            return Err(PipelineError::Config {
                message: "word_batch must be at least 1".to_string(),
            });
        }
        if self.embedding.dimension == 0 {
            return Err(PipelineError::Config {
                message: "embedding dimension must be positive".to_string(),
            });
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|raw| raw.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.ingestion.workers, 4);
        assert_eq!(config.ingestion.word_batch, 500);
        assert_eq!(config.embedding.dimension, 1024);
        assert_eq!(config.embedding.batch_size, 25);
        assert_eq!(config.embedding.truncate_chars, 4000);
        assert_eq!(config.llm.timeout_seconds, 180);
        assert_eq!(config.database.max_connections(), 15);
    }

    #[test]
    fn test_validate_requires_database_url() {
        let config = Config::default();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.database.url = "postgresql://localhost/cases".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_toml() {
        let raw = r#"
            [database]
            url = "postgresql://localhost/cases"
            pool_size = 5
            max_overflow = 10
            acquire_timeout_seconds = 30

            [ingestion]
            workers = 8
            word_batch = 500
            queue_capacity = 16

            [rag]
            enabled = true
            chunk_embeddings = "important"
            phrase_filter = "relaxed"
        "#;
        let config: Config = toml::from_str(raw).unwrap();
        assert_eq!(config.ingestion.workers, 8);
        assert_eq!(config.rag.chunk_embeddings, ChunkEmbeddingMode::Important);
        assert_eq!(config.rag.phrase_filter, PhraseFilterMode::Relaxed);
        // Untouched sections keep their defaults
        assert_eq!(config.llm.max_text_chars, 25_000);
    }

    #[test]
    fn test_default_phrase_lists_nonempty() {
        let phrases = PhraseFilterConfig::default();
        assert!(phrases.legal_keywords.iter().any(|k| k == "court"));
        assert!(phrases.legal_patterns.iter().any(|p| p == "abuse of discretion"));
        assert!(phrases.stop_phrases.iter().any(|p| p == "of the"));
    }
}
