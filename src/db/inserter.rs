//! # Database Inserter
//!
//! ## Purpose
//! Single-transaction upsert of a case and all its dependents. The case row
//! upserts on `(case_file_id_normalized, court_level)`; when the conflict
//! path fires, every dependent row is deleted and re-created, so re-running
//! an ingestion converges to the same final state.
//!
//! ## Input/Output Specification
//! - **Input**: An assembled `CaseRecord` and the worker's dimension caches
//! - **Output**: A committed case with parties, attorneys, judges, issues,
//!   arguments, citations, statutes, and the full RAG index, or nothing
//! - **Failure**: any error aborts the transaction; a deadlock retries the
//!   whole case transaction once
//!
//! ## Ordering
//! Steps run in the fixed §4.9 order: dimensions, case upsert, dependent
//! purge, entities, RAG writes, status update, commit.

use crate::db::dimensions::{
    parse_statute_citation, DimensionService, OPINION_DOCUMENT_TYPE,
};
use crate::errors::{is_deadlock, PipelineError, Result};
use crate::model::{ArgumentSide, CaseRecord, ProcessingStatus};
use crate::rag::{RagOutcome, RagProcessor, WordProcessor};
use sqlx::{PgConnection, PgPool};
use tracing::{debug, info, warn};

/// Counters reported per committed case
#[derive(Debug, Default, Clone, Copy)]
pub struct IngestReport {
    pub case_id: i64,
    pub was_update: bool,
    pub parties: usize,
    pub attorneys: usize,
    pub judges: usize,
    pub issues: usize,
    pub rag: RagOutcome,
}

/// Transactional case writer shared by all workers
pub struct DatabaseInserter {
    pool: PgPool,
    rag: Option<RagProcessor>,
}

impl DatabaseInserter {
    /// `rag` is `None` when the RAG write path is disabled (`--no-rag`)
    pub fn new(pool: PgPool, rag: Option<RagProcessor>) -> Self {
        Self { pool, rag }
    }

    /// Ingest one case atomically. A deadlock retries the whole transaction
    /// once; any other error propagates with nothing committed.
    pub async fn ingest_case(
        &self,
        dims: &mut DimensionService,
        words: &mut WordProcessor,
        record: &CaseRecord,
    ) -> Result<IngestReport> {
        match self.try_ingest(dims, words, record).await {
            Ok(report) => Ok(report),
            Err(e) if e.is_recoverable() && matches!(e, PipelineError::Database(_)) => {
                warn!(
                    "Deadlock on case {}, retrying transaction once",
                    record.case_file_id
                );
                self.try_ingest(dims, words, record).await.map_err(|e| {
                    if let PipelineError::Database(db) = &e {
                        if is_deadlock(db) {
                            return PipelineError::Deadlock {
                                case_file_id: record.case_file_id.clone(),
                            };
                        }
                    }
                    e
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn try_ingest(
        &self,
        dims: &mut DimensionService,
        words: &mut WordProcessor,
        record: &CaseRecord,
    ) -> Result<IngestReport> {
        let mut tx = self.pool.begin().await?;

        // 1. Dimension ids
        let court_id = match &record.court_name {
            Some(name) => Some(
                dims.ensure_court(
                    &mut tx,
                    name,
                    record.court_level.as_str(),
                    record.district.as_deref(),
                    record.county.as_deref(),
                )
                .await?,
            ),
            None => None,
        };
        let case_type_id = match &record.extracted.case_type {
            Some(case_type) => Some(dims.ensure_case_type(&mut tx, case_type).await?),
            None => None,
        };
        let stage_name = record
            .opinion_type
            .clone()
            .unwrap_or_else(|| record.court_level.as_str().to_string());
        let stage_type_id = Some(dims.ensure_stage_type(&mut tx, &stage_name).await?);
        // Keep the opinion document type present even though the pipeline
        // stores no per-document rows; downstream readers key off it.
        dims.ensure_document_type(&mut tx, "Opinion", OPINION_DOCUMENT_TYPE)
            .await?;

        // 2. Case upsert on the natural key
        let (case_id, inserted) =
            insert_case_row(&mut tx, record, court_id, case_type_id, stage_type_id).await?;
        let mut report = IngestReport {
            case_id,
            was_update: !inserted,
            ..IngestReport::default()
        };

        // 3. A re-ingested case sheds all dependents before re-creating them
        if !inserted {
            info!("Case {} already present (id {}), rewriting dependents", record.case_file_id, case_id);
            clear_dependents(&mut tx, case_id).await?;
        }

        // 4. Parties, attorneys, judges
        for party in &record.extracted.parties {
            sqlx::query(
                "INSERT INTO parties (case_id, name, legal_role, personal_role) \
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(case_id)
            .bind(&party.name)
            .bind(&party.legal_role)
            .bind(&party.personal_role)
            .execute(&mut *tx)
            .await?;
            report.parties += 1;
        }

        for attorney in &record.extracted.attorneys {
            sqlx::query(
                "INSERT INTO attorneys (case_id, name, firm, representing_role) \
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(case_id)
            .bind(&attorney.name)
            .bind(&attorney.firm)
            .bind(&attorney.representing_role)
            .execute(&mut *tx)
            .await?;
            report.attorneys += 1;
        }

        for judge in &record.extracted.judges {
            // Judges dedupe globally by name; the upsert-returning idiom is
            // atomic under parallel workers.
            let judge_id: i64 = sqlx::query_scalar(
                "INSERT INTO judges (name) VALUES ($1) \
                 ON CONFLICT ((lower(name))) DO UPDATE SET name = judges.name \
                 RETURNING judge_id",
            )
            .bind(&judge.name)
            .fetch_one(&mut *tx)
            .await?;
            sqlx::query("INSERT INTO case_judges (case_id, judge_id, role) VALUES ($1, $2, $3)")
                .bind(case_id)
                .bind(judge_id)
                .bind(judge.role.as_str())
                .execute(&mut *tx)
                .await?;
            report.judges += 1;
        }

        // 5. Issues with taxonomy paths, RCW junctions, and arguments
        for issue in &record.extracted.issues {
            let taxonomy_id = dims
                .ensure_taxonomy_path(
                    &mut tx,
                    &issue.case_type,
                    &issue.category,
                    issue.subcategory.as_deref(),
                )
                .await?;

            let issue_id: i64 = sqlx::query_scalar(
                "INSERT INTO issue_decisions \
                 (case_id, issue_summary, decision_summary, issue_outcome, \
                  winner_legal_role, taxonomy_id) \
                 VALUES ($1, $2, $3, $4, $5, $6) RETURNING issue_id",
            )
            .bind(case_id)
            .bind(&issue.summary)
            .bind(&issue.decision_summary)
            .bind(issue.outcome.map(|o| o.as_str()))
            .bind(&issue.winner_legal_role)
            .bind(taxonomy_id)
            .fetch_one(&mut *tx)
            .await?;

            for rcw in &issue.rcw_references {
                let Some(parsed) = parse_statute_citation(rcw) else {
                    debug!("Unparseable RCW reference '{}', skipping junction", rcw);
                    continue;
                };
                let statute_id = dims
                    .ensure_statute(
                        &mut tx,
                        "WA",
                        &parsed.code,
                        Some(&parsed.title),
                        Some(&parsed.section),
                    )
                    .await?;
                sqlx::query(
                    "INSERT INTO issue_rcw (issue_id, rcw_id) VALUES ($1, $2) \
                     ON CONFLICT DO NOTHING",
                )
                .bind(issue_id)
                .bind(statute_id)
                .execute(&mut *tx)
                .await?;
            }

            // 6a. Arguments linked to the issue
            let sides = [
                (ArgumentSide::Appellant, &issue.appellant_argument),
                (ArgumentSide::Respondent, &issue.respondent_argument),
            ];
            for (side, text) in sides {
                if let Some(text) = text {
                    sqlx::query(
                        "INSERT INTO arguments (issue_id, side, text) VALUES ($1, $2, $3)",
                    )
                    .bind(issue_id)
                    .bind(side.as_str())
                    .bind(text)
                    .execute(&mut *tx)
                    .await?;
                }
            }
            report.issues += 1;
        }

        // 6b. Citation edges (textual; target case resolution out of scope)
        for citation in &record.extracted.citations {
            sqlx::query(
                "INSERT INTO citation_edges \
                 (source_case_id, target_case_citation, relationship, importance) \
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(case_id)
            .bind(&citation.full_citation)
            .bind(citation.relationship.as_str())
            .bind(citation.importance.map(|i| i.as_str()))
            .execute(&mut *tx)
            .await?;
        }

        // 6c. Case-level statute citations, ensuring dimension rows
        for raw in &record.extracted.statutes {
            let Some(parsed) = parse_statute_citation(raw) else {
                debug!("Unparseable statute citation '{}', skipping", raw);
                continue;
            };
            let statute_id = dims
                .ensure_statute(
                    &mut tx,
                    "WA",
                    &parsed.code,
                    Some(&parsed.title),
                    Some(&parsed.section),
                )
                .await?;
            sqlx::query(
                "INSERT INTO statute_citations (case_id, statute_id, context) \
                 VALUES ($1, $2, $3)",
            )
            .bind(case_id)
            .bind(statute_id)
            .bind(raw)
            .execute(&mut *tx)
            .await?;
        }

        // 7–11. RAG write path
        if let Some(rag) = &self.rag {
            report.rag = rag.process(&mut tx, words, case_id, record).await?;
        }

        // 12. Terminal status, then commit
        sqlx::query("UPDATE cases SET processing_status = $1 WHERE case_id = $2")
            .bind(ProcessingStatus::FullyProcessed.as_str())
            .bind(case_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        info!(
            "Committed case {} (id {}, update: {})",
            record.case_file_id, case_id, report.was_update
        );
        Ok(report)
    }
}

/// Upsert the case row; `(xmax = 0)` distinguishes a fresh insert from the
/// conflict-update path.
async fn insert_case_row(
    conn: &mut PgConnection,
    record: &CaseRecord,
    court_id: Option<i64>,
    case_type_id: Option<i64>,
    stage_type_id: Option<i64>,
) -> Result<(i64, bool)> {
    let row: (i64, bool) = sqlx::query_as(
        "INSERT INTO cases ( \
             case_file_id, case_file_id_normalized, court_id, case_type_id, stage_type_id, \
             title, docket_number, court_level, district, county, \
             decision_year, decision_month, appeal_published_date, \
             publication_status, opinion_type, full_text, processing_status, \
             appeal_outcome, winner_legal_role, winner_personal_role, \
             source_file, extraction_timestamp \
         ) VALUES ( \
             $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, \
             $18, $19, $20, $21, $22 \
         ) \
         ON CONFLICT (case_file_id_normalized, court_level) DO UPDATE SET \
             case_file_id = EXCLUDED.case_file_id, \
             court_id = EXCLUDED.court_id, \
             case_type_id = EXCLUDED.case_type_id, \
             stage_type_id = EXCLUDED.stage_type_id, \
             title = EXCLUDED.title, \
             docket_number = EXCLUDED.docket_number, \
             district = EXCLUDED.district, \
             county = EXCLUDED.county, \
             decision_year = EXCLUDED.decision_year, \
             decision_month = EXCLUDED.decision_month, \
             appeal_published_date = EXCLUDED.appeal_published_date, \
             publication_status = EXCLUDED.publication_status, \
             opinion_type = EXCLUDED.opinion_type, \
             full_text = EXCLUDED.full_text, \
             processing_status = EXCLUDED.processing_status, \
             appeal_outcome = EXCLUDED.appeal_outcome, \
             winner_legal_role = EXCLUDED.winner_legal_role, \
             winner_personal_role = EXCLUDED.winner_personal_role, \
             source_file = EXCLUDED.source_file, \
             extraction_timestamp = EXCLUDED.extraction_timestamp \
         RETURNING case_id, (xmax = 0) AS inserted",
    )
    .bind(&record.case_file_id)
    .bind(&record.case_file_id_normalized)
    .bind(court_id)
    .bind(case_type_id)
    .bind(stage_type_id)
    .bind(&record.title)
    .bind(&record.docket_number)
    .bind(record.court_level.as_str())
    .bind(&record.district)
    .bind(&record.county)
    .bind(record.decision_year)
    .bind(record.decision_month)
    .bind(record.appeal_published_date)
    .bind(record.publication_status.as_str())
    .bind(&record.opinion_type)
    .bind(&record.full_text)
    .bind(ProcessingStatus::AiProcessed.as_str())
    .bind(record.extracted.appeal_outcome.map(|o| o.as_str()))
    .bind(&record.extracted.winner_legal_role)
    .bind(&record.extracted.winner_personal_role)
    .bind(&record.source_file)
    .bind(record.extraction_timestamp)
    .fetch_one(conn)
    .await?;
    Ok(row)
}

/// Delete every dependent row of a case before re-insertion. Children go
/// before parents so foreign keys never block.
async fn clear_dependents(conn: &mut PgConnection, case_id: i64) -> Result<()> {
    let statements = [
        "DELETE FROM word_occurrence WHERE case_id = $1",
        "DELETE FROM arguments WHERE issue_id IN \
             (SELECT issue_id FROM issue_decisions WHERE case_id = $1)",
        "DELETE FROM issue_rcw WHERE issue_id IN \
             (SELECT issue_id FROM issue_decisions WHERE case_id = $1)",
        "DELETE FROM issue_decisions WHERE case_id = $1",
        "DELETE FROM parties WHERE case_id = $1",
        "DELETE FROM attorneys WHERE case_id = $1",
        "DELETE FROM case_judges WHERE case_id = $1",
        "DELETE FROM citation_edges WHERE source_case_id = $1",
        "DELETE FROM statute_citations WHERE case_id = $1",
        "DELETE FROM embeddings WHERE case_id = $1",
        "DELETE FROM case_phrases WHERE case_id = $1",
        "DELETE FROM case_sentences WHERE case_id = $1",
        "DELETE FROM case_chunks WHERE case_id = $1",
    ];
    for statement in statements {
        sqlx::query(statement).bind(case_id).execute(&mut *conn).await?;
    }
    debug!("Cleared dependents for case {}", case_id);
    Ok(())
}
