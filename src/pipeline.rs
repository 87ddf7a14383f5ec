//! # Orchestrator and Worker Pool
//!
//! ## Purpose
//! Walks a directory of PDFs, joins each file against the metadata sheet by
//! normalized case-file id, and dispatches work items to W workers over a
//! bounded queue. Each worker runs the full per-case pipeline end-to-end;
//! a worker failure affects only its one case.
//!
//! ## Input/Output Specification
//! - **Input**: PDF directory, metadata sheet, worker count, RAG flags
//! - **Output**: counters `{attempted, succeeded, skipped_no_metadata,
//!   failed}` plus a per-file outcome log with classified error kinds
//! - **Cancellation**: a signal stops dispatch; in-flight workers finish or
//!   roll back, so interrupted cases leave no partial rows
//!
//! ## Ordering
//! None across cases; within a case the inserter runs the fixed §4.9 order.

use crate::config::Config;
use crate::db::dimensions::DimensionService;
use crate::db::inserter::{DatabaseInserter, IngestReport};
use crate::errors::{PipelineError, Result};
use crate::extraction::{CaseAssembler, LlmExtractor, MetadataSheet, PageTextSource};
use crate::model::CaseMetadata;
use crate::rag::WordProcessor;
use crate::utils::case_file_id_from_filename;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{error, info, warn};

/// Aggregate counters for a run
#[derive(Debug, Default, Clone, Copy)]
pub struct RunStats {
    pub attempted: usize,
    pub succeeded: usize,
    pub skipped_no_metadata: usize,
    pub failed: usize,
}

/// Outcome of one input file
#[derive(Debug, Clone)]
pub enum Outcome {
    Succeeded { case_id: i64, was_update: bool },
    SkippedNoMetadata,
    Failed { kind: &'static str, message: String },
}

/// Per-file line of the outcome log
#[derive(Debug, Clone)]
pub struct FileOutcome {
    pub file: String,
    pub case_file_id: String,
    pub outcome: Outcome,
}

/// Full report of a batch run
#[derive(Debug, Default)]
pub struct BatchReport {
    pub stats: RunStats,
    pub outcomes: Vec<FileOutcome>,
}

/// One unit of work: a PDF joined with its metadata row
struct WorkItem {
    path: PathBuf,
    normalized_id: String,
    metadata: CaseMetadata,
}

/// Batch orchestrator dispatching cases to a bounded worker pool
pub struct Orchestrator {
    config: Arc<Config>,
    pdf: Arc<dyn PageTextSource>,
    llm: Arc<LlmExtractor>,
    inserter: Arc<DatabaseInserter>,
}

impl Orchestrator {
    pub fn new(
        config: Arc<Config>,
        pdf: Arc<dyn PageTextSource>,
        llm: Arc<LlmExtractor>,
        inserter: Arc<DatabaseInserter>,
    ) -> Self {
        Self {
            config,
            pdf,
            llm,
            inserter,
        }
    }

    /// Run a batch over every PDF under `pdf_dir`, joined against `sheet`.
    /// `cancel` flips to true when the operator interrupts the run.
    pub async fn run_batch(
        &self,
        pdf_dir: &Path,
        sheet: &MetadataSheet,
        limit: Option<usize>,
        mut cancel: watch::Receiver<bool>,
    ) -> Result<BatchReport> {
        let mut pdf_files = collect_pdfs(pdf_dir)?;
        pdf_files.sort();
        if let Some(limit) = limit {
            pdf_files.truncate(limit);
        }
        info!("Found {} PDF files under {}", pdf_files.len(), pdf_dir.display());

        let mut report = BatchReport::default();

        // Join against the sheet up front; files without a match are
        // reported and never dispatched.
        let mut items = Vec::new();
        for path in pdf_files {
            let file = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| path.display().to_string());
            let normalized_id = case_file_id_from_filename(&file);
            match sheet.lookup(&normalized_id) {
                Some(metadata) => items.push(WorkItem {
                    path,
                    normalized_id,
                    metadata: metadata.clone(),
                }),
                None => {
                    warn!("No metadata row for {} (normalized id '{}')", file, normalized_id);
                    report.stats.skipped_no_metadata += 1;
                    report.outcomes.push(FileOutcome {
                        file,
                        case_file_id: normalized_id,
                        outcome: Outcome::SkippedNoMetadata,
                    });
                }
            }
        }

        let workers = self.config.ingestion.workers.max(1);
        let (work_tx, work_rx) = mpsc::channel::<WorkItem>(self.config.ingestion.queue_capacity);
        let work_rx = Arc::new(Mutex::new(work_rx));
        let (result_tx, mut result_rx) = mpsc::channel::<FileOutcome>(workers * 2);

        info!("Dispatching {} cases to {} workers", items.len(), workers);

        let mut worker_handles = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            let work_rx = Arc::clone(&work_rx);
            let result_tx = result_tx.clone();
            let pdf = Arc::clone(&self.pdf);
            let llm = Arc::clone(&self.llm);
            let inserter = Arc::clone(&self.inserter);
            let word_batch = self.config.ingestion.word_batch;

            worker_handles.push(tokio::spawn(async move {
                // Per-worker caches; never shared across workers
                let mut dims = DimensionService::new();
                let mut words = WordProcessor::new(word_batch);
                let assembler = CaseAssembler::new();

                loop {
                    let item = { work_rx.lock().await.recv().await };
                    let Some(item) = item else {
                        break;
                    };
                    let file = item
                        .path
                        .file_name()
                        .map(|n| n.to_string_lossy().to_string())
                        .unwrap_or_else(|| item.path.display().to_string());

                    let outcome = match process_case(
                        &*pdf, &llm, &assembler, &inserter, &mut dims, &mut words, &item,
                    )
                    .await
                    {
                        Ok(ingest) => {
                            info!(
                                "[worker {}] {} -> case {} ({} parties, {} judges, {} issues)",
                                worker_id, file, ingest.case_id, ingest.parties, ingest.judges,
                                ingest.issues
                            );
                            Outcome::Succeeded {
                                case_id: ingest.case_id,
                                was_update: ingest.was_update,
                            }
                        }
                        Err(e) => {
                            error!("[worker {}] {} failed: {}", worker_id, file, e);
                            Outcome::Failed {
                                kind: e.category(),
                                message: e.to_string(),
                            }
                        }
                    };

                    let file_outcome = FileOutcome {
                        file,
                        case_file_id: item.normalized_id.clone(),
                        outcome,
                    };
                    if result_tx.send(file_outcome).await.is_err() {
                        break;
                    }
                }
            }));
        }
        drop(result_tx);

        // Producer: stop dispatching when cancelled; in-flight work finishes
        let producer = tokio::spawn(async move {
            let mut dispatched = 0usize;
            for item in items {
                if *cancel.borrow() {
                    info!("Cancellation requested; stopping dispatch");
                    break;
                }
                tokio::select! {
                    _ = cancel.changed() => {
                        info!("Cancellation requested; stopping dispatch");
                        break;
                    }
                    sent = work_tx.send(item) => {
                        if sent.is_err() {
                            break;
                        }
                        dispatched += 1;
                    }
                }
            }
            dispatched
        });

        while let Some(outcome) = result_rx.recv().await {
            report.stats.attempted += 1;
            match &outcome.outcome {
                Outcome::Succeeded { .. } => report.stats.succeeded += 1,
                Outcome::Failed { .. } => report.stats.failed += 1,
                Outcome::SkippedNoMetadata => {}
            }
            report.outcomes.push(outcome);
        }

        let dispatched = producer.await.unwrap_or(0);
        for handle in worker_handles {
            let _ = handle.await;
        }

        info!(
            "Batch complete: {} dispatched, {} succeeded, {} failed, {} skipped (no metadata)",
            dispatched, report.stats.succeeded, report.stats.failed,
            report.stats.skipped_no_metadata
        );
        Ok(report)
    }

    /// Single-file mode: process one PDF against one metadata row
    pub async fn run_single(
        &self,
        pdf_path: &Path,
        metadata: &CaseMetadata,
    ) -> Result<IngestReport> {
        let mut dims = DimensionService::new();
        let mut words = WordProcessor::new(self.config.ingestion.word_batch);
        let assembler = CaseAssembler::new();
        let item = WorkItem {
            path: pdf_path.to_path_buf(),
            normalized_id: case_file_id_from_filename(
                &pdf_path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default(),
            ),
            metadata: metadata.clone(),
        };
        process_case(
            &*self.pdf,
            &self.llm,
            &assembler,
            &self.inserter,
            &mut dims,
            &mut words,
            &item,
        )
        .await
    }
}

/// The full per-case pipeline, run start-to-finish by one worker
async fn process_case(
    pdf: &dyn PageTextSource,
    llm: &LlmExtractor,
    assembler: &CaseAssembler,
    inserter: &DatabaseInserter,
    dims: &mut DimensionService,
    words: &mut WordProcessor,
    item: &WorkItem,
) -> Result<IngestReport> {
    let pages = pdf.extract_pages(&item.path).await?;
    let full_text = pages.join("\n\n");
    if full_text.trim().len() < 100 {
        return Err(PipelineError::PdfUnreadable {
            file: item.path.display().to_string(),
            details: "extraction returned insufficient content".to_string(),
        });
    }

    let extracted = llm.extract(&full_text).await?;
    let source_file = item
        .path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| item.path.display().to_string());
    let record = assembler.assemble(&item.metadata, extracted, full_text, &source_file);

    inserter.ingest_case(dims, words, &record).await
}

/// Recursively collect PDF files under a directory
fn collect_pdfs(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut stack = vec![dir.to_path_buf()];
    while let Some(current) = stack.pop() {
        for entry in std::fs::read_dir(&current)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else if path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
            {
                files.push(path);
            }
        }
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_pdfs_recursive_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("supreme");
        std::fs::create_dir(&sub).unwrap();
        std::fs::write(dir.path().join("102586-6.pdf"), b"%PDF").unwrap();
        std::fs::write(sub.join("39300-3_III.PDF"), b"%PDF").unwrap();
        std::fs::write(dir.path().join("metadata.csv"), b"case_number\n").unwrap();

        let mut files = collect_pdfs(dir.path()).unwrap();
        files.sort();
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| {
            f.extension().unwrap().to_string_lossy().eq_ignore_ascii_case("pdf")
        }));
    }

    #[test]
    fn test_stats_default_zeroed() {
        let stats = RunStats::default();
        assert_eq!(stats.attempted, 0);
        assert_eq!(stats.succeeded + stats.failed + stats.skipped_no_metadata, 0);
    }
}
