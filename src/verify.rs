//! # Case Verification
//!
//! ## Purpose
//! Read-back report for `--verify --case-id N`: prints every case column and
//! the row counts of all dependent tables so an operator can confirm a case
//! ingested completely.

use crate::errors::{PipelineError, Result};
use sqlx::PgPool;
use sqlx::Row;

/// Case columns rendered in the verification report; each is cast to text so
/// the report can print uniformly.
const CASE_COLUMNS: [&str; 22] = [
    "case_id",
    "case_file_id",
    "case_file_id_normalized",
    "title",
    "docket_number",
    "court_level",
    "district",
    "county",
    "decision_year",
    "decision_month",
    "appeal_published_date",
    "publication_status",
    "opinion_type",
    "processing_status",
    "appeal_outcome",
    "winner_legal_role",
    "winner_personal_role",
    "source_file",
    "extraction_timestamp",
    "court_id",
    "case_type_id",
    "stage_type_id",
];

/// Dependent tables and the count query linking each to the case.
/// `arguments` and `issue_rcw` hang off issues, so they join through
/// `issue_decisions`.
const DEPENDENT_TABLES: [(&str, &str); 13] = [
    ("parties", "SELECT COUNT(*) FROM parties WHERE case_id = $1"),
    ("attorneys", "SELECT COUNT(*) FROM attorneys WHERE case_id = $1"),
    ("case_judges", "SELECT COUNT(*) FROM case_judges WHERE case_id = $1"),
    ("issue_decisions", "SELECT COUNT(*) FROM issue_decisions WHERE case_id = $1"),
    (
        "arguments",
        "SELECT COUNT(*) FROM arguments WHERE issue_id IN \
             (SELECT issue_id FROM issue_decisions WHERE case_id = $1)",
    ),
    (
        "issue_rcw",
        "SELECT COUNT(*) FROM issue_rcw WHERE issue_id IN \
             (SELECT issue_id FROM issue_decisions WHERE case_id = $1)",
    ),
    ("citation_edges", "SELECT COUNT(*) FROM citation_edges WHERE source_case_id = $1"),
    ("statute_citations", "SELECT COUNT(*) FROM statute_citations WHERE case_id = $1"),
    ("case_chunks", "SELECT COUNT(*) FROM case_chunks WHERE case_id = $1"),
    ("case_sentences", "SELECT COUNT(*) FROM case_sentences WHERE case_id = $1"),
    ("word_occurrence", "SELECT COUNT(*) FROM word_occurrence WHERE case_id = $1"),
    ("case_phrases", "SELECT COUNT(*) FROM case_phrases WHERE case_id = $1"),
    ("embeddings", "SELECT COUNT(*) FROM embeddings WHERE case_id = $1"),
];

/// Print the verification report for one case
pub async fn verify_case(pool: &PgPool, case_id: i64) -> Result<()> {
    let select_list: Vec<String> = CASE_COLUMNS
        .iter()
        .map(|col| format!("{col}::text AS {col}"))
        .collect();
    let sql = format!(
        "SELECT {}, LENGTH(full_text)::text AS full_text_length FROM cases WHERE case_id = $1",
        select_list.join(", ")
    );

    let row = sqlx::query(&sql)
        .bind(case_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| PipelineError::Internal {
            message: format!("case {case_id} not found"),
        })?;

    println!("{}", "=".repeat(60));
    println!("Case {case_id} Verification");
    println!("{}", "=".repeat(60));

    for (idx, column) in CASE_COLUMNS
        .iter()
        .chain(std::iter::once(&"full_text_length"))
        .enumerate()
    {
        let value: Option<String> = row.try_get(idx)?;
        match value {
            Some(value) => println!("  [x] {column}: {value}"),
            None => println!("  [ ] {column}: NULL"),
        }
    }

    println!("\n{}", "=".repeat(60));
    println!("Related Entities");
    println!("{}", "=".repeat(60));

    for (table, count_sql) in DEPENDENT_TABLES {
        let count: i64 = sqlx::query_scalar(count_sql)
            .bind(case_id)
            .fetch_one(pool)
            .await?;
        println!("  {table}: {count}");
    }

    Ok(())
}
