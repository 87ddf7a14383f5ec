//! # Word Processor
//!
//! ## Purpose
//! Tokenization into the shared word dictionary plus positional occurrence
//! tracking. Dictionary upserts and occurrence inserts are batched multi-row
//! statements so concurrent workers stay under the database parameter limit
//! while the unique constraint serializes id assignment.
//!
//! ## Input/Output Specification
//! - **Input**: Sentence texts in document order
//! - **Output**: `word_dictionary` rows (conflict-do-nothing on the
//!   normalized word), `word_occurrence` rows keyed
//!   `(word_id, sentence_id, position)`, incremental `df` bumps
//!
//! ## Tokenization Rules
//! Lowercase; strip surrounding punctuation; retain internal hyphens and
//! apostrophes; drop possessive `'s`; require at least two characters
//! including one letter; positions start at 0 per sentence.

use crate::errors::{PipelineError, Result};
use regex::Regex;
use sqlx::PgConnection;
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;
use tracing::debug;
use unicode_normalization::UnicodeNormalization;

/// One positional occurrence awaiting a batched flush
#[derive(Debug, Clone)]
pub struct WordOccurrence {
    pub word_id: i64,
    pub case_id: i64,
    pub chunk_id: i64,
    pub sentence_id: i64,
    pub position: i32,
}

fn token_regex() -> &'static Regex {
    static TOKEN: OnceLock<Regex> = OnceLock::new();
    TOKEN.get_or_init(|| Regex::new(r"[\w'\u{2019}-]+").expect("token pattern"))
}

/// Tokenize text under the word-dictionary normalization rules.
///
/// Every emitted token is a dictionary natural key; the token's index in the
/// returned vector is its occurrence position.
pub fn tokenize(text: &str) -> Vec<String> {
    let normalized: String = text.nfc().collect::<String>().to_lowercase();

    token_regex()
        .find_iter(&normalized)
        .filter_map(|m| normalize_token(m.as_str()))
        .collect()
}

/// Apply per-token normalization; `None` drops the token
fn normalize_token(raw: &str) -> Option<String> {
    let mut token = raw.replace('\u{2019}', "'");

    // Possessives: trailing 's or bare trailing apostrophe
    if let Some(stripped) = token.strip_suffix("'s") {
        token = stripped.to_string();
    }
    // Surrounding punctuation; internal hyphens and apostrophes survive
    let token = token.trim_matches(|c| c == '\'' || c == '-');

    if token.chars().count() < 2 || !token.chars().any(|c| c.is_alphabetic()) {
        return None;
    }
    Some(token.to_string())
}

/// Word dictionary and occurrence writer operating inside the case
/// transaction. Holds a per-worker word→id cache that is only populated
/// after a successful upsert, so concurrent workers converge on one id per
/// normalized word.
pub struct WordProcessor {
    batch_size: usize,
    word_cache: HashMap<String, i64>,
}

impl WordProcessor {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
            word_cache: HashMap::new(),
        }
    }

    /// Resolve ids for every distinct word, upserting missing dictionary
    /// rows in multi-row batches followed by a batched select.
    pub async fn ensure_word_ids(
        &mut self,
        conn: &mut PgConnection,
        words: &HashSet<String>,
    ) -> Result<HashMap<String, i64>> {
        let mut resolved = HashMap::new();
        let mut missing: Vec<&String> = Vec::new();

        for word in words {
            match self.word_cache.get(word) {
                Some(&id) => {
                    resolved.insert(word.clone(), id);
                }
                None => missing.push(word),
            }
        }
        if missing.is_empty() {
            return Ok(resolved);
        }
        missing.sort();

        for batch in missing.chunks(self.batch_size) {
            let insert_sql = format!(
                "INSERT INTO word_dictionary (word) VALUES {} ON CONFLICT (word) DO NOTHING",
                values_clause(batch.len(), 1)
            );
            let mut insert = sqlx::query(&insert_sql);
            for word in batch {
                insert = insert.bind(word.as_str());
            }
            insert.execute(&mut *conn).await?;

            let owned: Vec<String> = batch.iter().map(|w| w.to_string()).collect();
            let rows: Vec<(i64, String)> = sqlx::query_as(
                "SELECT word_id, word FROM word_dictionary WHERE word = ANY($1)",
            )
            .bind(&owned)
            .fetch_all(&mut *conn)
            .await?;

            if rows.len() != batch.len() {
                return Err(PipelineError::BatchWrite {
                    entity: "word_dictionary".to_string(),
                    details: format!("resolved {} of {} words", rows.len(), batch.len()),
                });
            }
            for (word_id, word) in rows {
                self.word_cache.insert(word.clone(), word_id);
                resolved.insert(word, word_id);
            }
        }

        Ok(resolved)
    }

    /// Flush occurrences with multi-row inserts capped at the batch size so
    /// the statement's parameter count stays under the database limit.
    pub async fn insert_occurrences(
        &self,
        conn: &mut PgConnection,
        occurrences: &[WordOccurrence],
    ) -> Result<usize> {
        for batch in occurrences.chunks(self.batch_size) {
            let sql = format!(
                "INSERT INTO word_occurrence (word_id, case_id, chunk_id, sentence_id, position) \
                 VALUES {}",
                values_clause(batch.len(), 5)
            );
            let mut query = sqlx::query(&sql);
            for occ in batch {
                query = query
                    .bind(occ.word_id)
                    .bind(occ.case_id)
                    .bind(occ.chunk_id)
                    .bind(occ.sentence_id)
                    .bind(occ.position);
            }
            query.execute(&mut *conn).await?;
        }
        debug!("Inserted {} word occurrences", occurrences.len());
        Ok(occurrences.len())
    }

    /// Best-effort document frequency: one bump per distinct word per case
    pub async fn bump_document_frequencies(
        &self,
        conn: &mut PgConnection,
        word_ids: &HashSet<i64>,
    ) -> Result<()> {
        if word_ids.is_empty() {
            return Ok(());
        }
        let ids: Vec<i64> = word_ids.iter().copied().collect();
        sqlx::query("UPDATE word_dictionary SET df = df + 1 WHERE word_id = ANY($1)")
            .bind(&ids)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }
}

/// Build a `($1,$2),( $3,$4),...` VALUES clause with uniquely numbered
/// parameters for `rows` rows of `cols` columns.
pub fn values_clause(rows: usize, cols: usize) -> String {
    (0..rows)
        .map(|row| {
            let params: Vec<String> = (0..cols)
                .map(|col| format!("${}", row * cols + col + 1))
                .collect();
            format!("({})", params.join(","))
        })
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_lowercases_and_positions() {
        let tokens = tokenize("The Court REVERSED the judgment");
        assert_eq!(tokens, vec!["the", "court", "reversed", "the", "judgment"]);
    }

    #[test]
    fn test_tokenize_drops_possessives() {
        assert_eq!(tokenize("the court's ruling"), vec!["the", "court", "ruling"]);
        assert_eq!(tokenize("the Smiths\u{2019} appeal"), vec!["the", "smiths", "appeal"]);
    }

    #[test]
    fn test_tokenize_keeps_internal_hyphens_and_apostrophes() {
        assert_eq!(tokenize("cross-examination"), vec!["cross-examination"]);
        assert_eq!(tokenize("don't"), vec!["don't"]);
    }

    #[test]
    fn test_tokenize_minimum_length_and_letter_rules() {
        // Single letters, bare numbers and punctuation all drop
        assert_eq!(tokenize("a 1 22 -- b2"), vec!["b2"]);
        assert!(tokenize("!!! ???").is_empty());
    }

    #[test]
    fn test_tokenize_strips_surrounding_punctuation() {
        assert_eq!(tokenize("'quoted' -dash-"), vec!["quoted", "dash"]);
    }

    #[test]
    fn test_values_clause_numbers_params_uniquely() {
        assert_eq!(values_clause(1, 1), "($1)");
        assert_eq!(values_clause(2, 2), "($1,$2),($3,$4)");
        assert_eq!(values_clause(3, 5).matches('$').count(), 15);
        assert!(values_clause(3, 5).ends_with("($11,$12,$13,$14,$15)"));
    }
}
