//! # Ingestion Pipeline Driver
//!
//! ## Purpose
//! Command-line entry point for the case ingestion pipeline. Parses
//! arguments, loads configuration, initializes logging and the database
//! pool, and routes to single-file, batch, or verification mode.
//!
//! ## Modes
//! - Single file: `--pdf FILE --csv FILE --row N`
//! - Batch: `--batch --pdf-dir DIR --csv FILE [--limit N] [--workers W]
//!   [--sequential]`
//! - Verification: `--verify --case-id N`
//!
//! Exit code is 0 only when no case failed.

use clap::{Arg, ArgAction, Command};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use caselaw_pipeline::config::Config;
use caselaw_pipeline::db;
use caselaw_pipeline::db::inserter::DatabaseInserter;
use caselaw_pipeline::embedding::EmbeddingClient;
use caselaw_pipeline::errors::{PipelineError, Result};
use caselaw_pipeline::extraction::{LlmExtractor, MetadataSheet, PdfiumExtractor};
use caselaw_pipeline::model::{ChunkEmbeddingMode, PhraseFilterMode};
use caselaw_pipeline::pipeline::{Orchestrator, Outcome};
use caselaw_pipeline::rag::RagProcessor;
use caselaw_pipeline::verify::verify_case;

#[tokio::main]
async fn main() {
    let exit_code = match run().await {
        Ok(failed_cases) => {
            if failed_cases > 0 {
                1
            } else {
                0
            }
        }
        Err(e) => {
            error!("Fatal: {}", e);
            eprintln!("Fatal: {e}");
            2
        }
    };
    std::process::exit(exit_code);
}

async fn run() -> Result<usize> {
    let matches = Command::new("caselaw-pipeline")
        .version("1.0.0")
        .about("Batch ingestion pipeline for appellate-court opinions")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path (TOML)"),
        )
        .arg(Arg::new("pdf").long("pdf").value_name("FILE").help("Single PDF to process"))
        .arg(Arg::new("csv").long("csv").value_name("FILE").help("Metadata CSV sheet"))
        .arg(
            Arg::new("row")
                .long("row")
                .value_name("N")
                .value_parser(clap::value_parser!(usize))
                .help("1-indexed metadata row for single-file mode"),
        )
        .arg(
            Arg::new("batch")
                .long("batch")
                .action(ArgAction::SetTrue)
                .help("Process a directory of PDFs"),
        )
        .arg(
            Arg::new("pdf-dir")
                .long("pdf-dir")
                .value_name("DIR")
                .help("Directory of PDFs for batch mode"),
        )
        .arg(
            Arg::new("limit")
                .long("limit")
                .value_name("N")
                .value_parser(clap::value_parser!(usize))
                .help("Limit the number of files in a batch"),
        )
        .arg(
            Arg::new("workers")
                .long("workers")
                .value_name("W")
                .value_parser(clap::value_parser!(usize))
                .help("Parallel workers (default from config: 4)"),
        )
        .arg(
            Arg::new("sequential")
                .long("sequential")
                .action(ArgAction::SetTrue)
                .help("Force sequential processing (one worker)"),
        )
        .arg(
            Arg::new("chunk-embeddings")
                .long("chunk-embeddings")
                .value_name("MODE")
                .help("Chunk embedding mode: all | important | none"),
        )
        .arg(
            Arg::new("phrase-filter")
                .long("phrase-filter")
                .value_name("MODE")
                .help("Phrase filter mode: strict | relaxed"),
        )
        .arg(
            Arg::new("no-rag")
                .long("no-rag")
                .action(ArgAction::SetTrue)
                .help("Disable RAG indexing (insert case only)"),
        )
        .arg(
            Arg::new("verify")
                .long("verify")
                .action(ArgAction::SetTrue)
                .help("Verify an ingested case"),
        )
        .arg(
            Arg::new("case-id")
                .long("case-id")
                .value_name("N")
                .value_parser(clap::value_parser!(i64))
                .help("Case id for verification mode"),
        )
        .get_matches();

    // Configuration: defaults <- file <- env <- CLI
    let config_path = matches.get_one::<String>("config").map(PathBuf::from);
    let mut config = Config::load(config_path.as_deref())?;

    if matches.get_flag("sequential") {
        config.ingestion.workers = 1;
    } else if let Some(&workers) = matches.get_one::<usize>("workers") {
        config.ingestion.workers = workers.max(1);
    }
    if let Some(mode) = matches.get_one::<String>("chunk-embeddings") {
        config.rag.chunk_embeddings =
            ChunkEmbeddingMode::parse(mode).ok_or_else(|| PipelineError::Config {
                message: format!("invalid chunk-embeddings mode '{mode}'"),
            })?;
    }
    if let Some(mode) = matches.get_one::<String>("phrase-filter") {
        config.rag.phrase_filter =
            PhraseFilterMode::parse(mode).ok_or_else(|| PipelineError::Config {
                message: format!("invalid phrase-filter mode '{mode}'"),
            })?;
    }
    if matches.get_flag("no-rag") {
        config.rag.enabled = false;
    }
    config.validate()?;

    init_logging(&config);
    info!("Starting caselaw pipeline v1.0.0");

    // Shared components
    let pool = db::connect(&config.database).await?;
    db::health_check(&pool).await?;

    let config = Arc::new(config);
    let embedder = Arc::new(EmbeddingClient::new(config.embedding.clone())?);
    let rag = config
        .rag
        .enabled
        .then(|| RagProcessor::new(&config.rag, Arc::clone(&embedder)));
    let inserter = Arc::new(DatabaseInserter::new(pool.clone(), rag));
    let llm = Arc::new(LlmExtractor::new(config.llm.clone())?);
    let pdf = Arc::new(PdfiumExtractor::new());
    let orchestrator = Orchestrator::new(
        Arc::clone(&config),
        pdf,
        llm,
        inserter,
    );

    // Mode routing
    if matches.get_flag("verify") {
        let case_id = *matches
            .get_one::<i64>("case-id")
            .ok_or_else(|| PipelineError::Config {
                message: "--verify requires --case-id".to_string(),
            })?;
        verify_case(&pool, case_id).await?;
        return Ok(0);
    }

    if matches.get_flag("batch") {
        let pdf_dir = matches
            .get_one::<String>("pdf-dir")
            .ok_or_else(|| PipelineError::Config {
                message: "--batch requires --pdf-dir".to_string(),
            })?;
        let csv = matches.get_one::<String>("csv").ok_or_else(|| PipelineError::Config {
            message: "--batch requires --csv".to_string(),
        })?;
        let sheet = MetadataSheet::load(Path::new(csv))?;
        let limit = matches.get_one::<usize>("limit").copied();

        // Cancellation: first interrupt stops dispatch, in-flight work
        // finishes or rolls back.
        let (cancel_tx, cancel_rx) = watch::channel(false);
        tokio::spawn(async move {
            if signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received; finishing in-flight cases");
                let _ = cancel_tx.send(true);
            }
        });

        let report = orchestrator
            .run_batch(Path::new(pdf_dir), &sheet, limit, cancel_rx)
            .await?;

        println!("\n{}", "=".repeat(50));
        println!("Batch Processing Complete");
        println!("{}", "=".repeat(50));
        println!("  Attempted: {}", report.stats.attempted);
        println!("  Succeeded: {}", report.stats.succeeded);
        println!("  Skipped (no metadata): {}", report.stats.skipped_no_metadata);
        println!("  Failed: {}", report.stats.failed);
        println!();
        for outcome in &report.outcomes {
            match &outcome.outcome {
                Outcome::Succeeded { case_id, was_update } => {
                    let tag = if *was_update { "updated" } else { "inserted" };
                    println!("  [ok]   {} -> case {} ({})", outcome.file, case_id, tag);
                }
                Outcome::SkippedNoMetadata => {
                    println!("  [skip] {} (no metadata row)", outcome.file);
                }
                Outcome::Failed { kind, message } => {
                    println!("  [fail] {} [{}]: {}", outcome.file, kind, message);
                }
            }
        }
        return Ok(report.stats.failed);
    }

    // Single-file mode
    let pdf_path = matches.get_one::<String>("pdf").ok_or_else(|| PipelineError::Config {
        message: "single-file mode requires --pdf (or use --batch)".to_string(),
    })?;
    let csv = matches.get_one::<String>("csv").ok_or_else(|| PipelineError::Config {
        message: "single-file mode requires --csv".to_string(),
    })?;
    let row = *matches.get_one::<usize>("row").ok_or_else(|| PipelineError::Config {
        message: "single-file mode requires --row".to_string(),
    })?;

    let sheet = MetadataSheet::load(Path::new(csv))?;
    let metadata = sheet.row(row).ok_or_else(|| PipelineError::Config {
        message: format!("row {} not found in {} ({} rows)", row, csv, sheet.len()),
    })?;

    match orchestrator.run_single(Path::new(pdf_path), metadata).await {
        Ok(report) => {
            println!("\nCase {} ingested successfully", report.case_id);
            println!("  Title: {}", metadata.title);
            println!("  Parties: {}", report.parties);
            println!("  Judges: {}", report.judges);
            println!("  Issues: {}", report.issues);
            if config.rag.enabled {
                println!(
                    "  RAG: {} chunks, {} sentences, {} words, {} phrases, {} embeddings",
                    report.rag.chunks,
                    report.rag.sentences,
                    report.rag.words,
                    report.rag.phrases,
                    report.rag.embeddings
                );
            }
            Ok(0)
        }
        Err(e) => {
            error!("Case processing failed: {}", e);
            println!("\nIngestion failed [{}]: {}", e.category(), e);
            Ok(1)
        }
    }
}

/// Initialize tracing with the configured level (RUST_LOG overrides)
fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}
