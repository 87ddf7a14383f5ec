//! # Database Module
//!
//! ## Purpose
//! Postgres access for the pipeline: pool construction, schema presence
//! checks, dimension-table get-or-create services, and the single-transaction
//! case inserter.
//!
//! ## Input/Output Specification
//! - **Input**: `DatabaseConfig`, assembled case records
//! - **Output**: Committed cases with all dependents, or nothing at all
//!
//! ## Architecture
//! - `dimensions`: upsert-on-natural-key services with per-worker caches
//! - `inserter`: the §4.9 transactional write path including RAG

pub mod dimensions;
pub mod inserter;

use crate::config::DatabaseConfig;
use crate::errors::{PipelineError, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;
use tracing::info;

/// Tables the engine assumes exist; checked at startup so a missing schema
/// stops the engine instead of failing every case.
const REQUIRED_TABLES: [&str; 10] = [
    "cases",
    "case_types",
    "stage_types",
    "document_types",
    "courts",
    "legal_taxonomy",
    "word_dictionary",
    "case_chunks",
    "case_sentences",
    "embeddings",
];

/// Build the connection pool (base size + overflow)
pub async fn connect(config: &DatabaseConfig) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections())
        .min_connections(config.pool_size.min(config.max_connections()))
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_seconds))
        .connect(&config.url)
        .await?;
    info!(
        "Connected to database (pool: {} base + {} overflow)",
        config.pool_size, config.max_overflow
    );
    Ok(pool)
}

/// Verify connectivity and the presence of the required schema
pub async fn health_check(pool: &PgPool) -> Result<()> {
    sqlx::query_scalar::<_, i32>("SELECT 1").fetch_one(pool).await?;

    for table in REQUIRED_TABLES {
        let present: Option<String> =
            sqlx::query_scalar("SELECT to_regclass($1)::text")
                .bind(table)
                .fetch_one(pool)
                .await?;
        if present.is_none() {
            return Err(PipelineError::SchemaMissing {
                object: table.to_string(),
            });
        }
    }
    Ok(())
}
