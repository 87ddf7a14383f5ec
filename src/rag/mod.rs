//! # RAG Indexing Module
//!
//! ## Purpose
//! Composes the retrieval write path for one case: Chunker →
//! SentenceProcessor → WordProcessor → PhraseExtractor → Embeddings, all
//! inside the case's transaction so a failure anywhere leaves no rows.
//!
//! ## Input/Output Specification
//! - **Input**: The assembled case record and its database `case_id`
//! - **Output**: `case_chunks`, `case_sentences`, `word_dictionary` /
//!   `word_occurrence`, `case_phrases`, and `embeddings` rows with dense
//!   document-order numbering
//!
//! ## Architecture
//! - `chunker`: section-aware ~350-word segmentation
//! - `sentences`: citation-protected sentence splitting
//! - `words`: tokenization, dictionary upserts, positional occurrences
//! - `phrases`: filtered legal n-gram aggregation

pub mod chunker;
pub mod phrases;
pub mod sentences;
pub mod words;

pub use chunker::{Chunker, TextChunk};
pub use phrases::{PhraseExtractor, TokenizedSentence};
pub use sentences::split_sentences;
pub use words::{tokenize, WordOccurrence, WordProcessor};

use crate::config::RagConfig;
use crate::embedding::EmbeddingClient;
use crate::errors::Result;
use crate::model::{CaseRecord, ChunkEmbeddingMode};
use pgvector::Vector;
use sqlx::PgConnection;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

/// Counters for one case's RAG write path
#[derive(Debug, Default, Clone, Copy)]
pub struct RagOutcome {
    pub chunks: usize,
    pub sentences: usize,
    pub words: usize,
    pub phrases: usize,
    pub embeddings: usize,
}

/// RAG write-path orchestrator (steps 7–11 of the case transaction)
pub struct RagProcessor {
    chunker: Chunker,
    phrase_extractor: PhraseExtractor,
    embedder: Arc<EmbeddingClient>,
    chunk_mode: ChunkEmbeddingMode,
}

impl RagProcessor {
    pub fn new(config: &RagConfig, embedder: Arc<EmbeddingClient>) -> Self {
        Self {
            chunker: Chunker::new(),
            phrase_extractor: PhraseExtractor::new(config.phrase_filter, &config.phrases),
            embedder,
            chunk_mode: config.chunk_embeddings,
        }
    }

    /// Run the full RAG write path for a case inside its transaction
    pub async fn process(
        &self,
        conn: &mut PgConnection,
        word_processor: &mut WordProcessor,
        case_id: i64,
        record: &CaseRecord,
    ) -> Result<RagOutcome> {
        let mut outcome = RagOutcome::default();

        // Steps 7–8: chunks and sentences, with dense orders assigned in
        // document order.
        let chunks = self.chunker.chunk_text(&record.full_text);
        let mut inserted_chunks: Vec<(i64, TextChunk)> = Vec::with_capacity(chunks.len());
        let mut tokenized: Vec<TokenizedSentence> = Vec::new();
        let mut occurrences: Vec<WordOccurrence> = Vec::new();
        let mut global_sentence_order = 0i32;

        for chunk in chunks {
            let splits = split_sentences(&chunk.text);

            let chunk_id: i64 = sqlx::query_scalar(
                "INSERT INTO case_chunks (case_id, chunk_order, section, text, sentence_count) \
                 VALUES ($1, $2, $3, $4, $5) RETURNING chunk_id",
            )
            .bind(case_id)
            .bind(chunk.chunk_order)
            .bind(chunk.section.as_str())
            .bind(&chunk.text)
            .bind(splits.len() as i32)
            .fetch_one(&mut *conn)
            .await?;

            for split in splits {
                global_sentence_order += 1;
                let sentence_id: i64 = sqlx::query_scalar(
                    "INSERT INTO case_sentences \
                     (case_id, chunk_id, sentence_order, global_sentence_order, text, word_count) \
                     VALUES ($1, $2, $3, $4, $5, $6) RETURNING sentence_id",
                )
                .bind(case_id)
                .bind(chunk_id)
                .bind(split.sentence_order)
                .bind(global_sentence_order)
                .bind(&split.text)
                .bind(split.word_count as i32)
                .fetch_one(&mut *conn)
                .await?;

                let tokens = tokenize(&split.text);
                tokenized.push(TokenizedSentence {
                    sentence_id,
                    chunk_id,
                    tokens,
                });
                outcome.sentences += 1;
            }

            inserted_chunks.push((chunk_id, chunk));
            outcome.chunks += 1;
        }

        // Step 9: word dictionary and positional occurrences
        let distinct: HashSet<String> = tokenized
            .iter()
            .flat_map(|s| s.tokens.iter().cloned())
            .collect();
        let word_ids = word_processor.ensure_word_ids(&mut *conn, &distinct).await?;

        for sentence in &tokenized {
            for (position, token) in sentence.tokens.iter().enumerate() {
                if let Some(&word_id) = word_ids.get(token) {
                    occurrences.push(WordOccurrence {
                        word_id,
                        case_id,
                        chunk_id: sentence.chunk_id,
                        sentence_id: sentence.sentence_id,
                        position: position as i32,
                    });
                }
            }
        }
        outcome.words = word_processor.insert_occurrences(&mut *conn, &occurrences).await?;

        let distinct_ids: HashSet<i64> = word_ids.values().copied().collect();
        word_processor
            .bump_document_frequencies(&mut *conn, &distinct_ids)
            .await?;

        // Step 10: filtered legal phrases
        for phrase in self.phrase_extractor.extract(&tokenized) {
            sqlx::query(
                "INSERT INTO case_phrases \
                 (case_id, phrase, n, frequency, example_sentence, example_chunk) \
                 VALUES ($1, $2, $3, $4, $5, $6) \
                 ON CONFLICT (case_id, phrase) DO UPDATE SET \
                     frequency = EXCLUDED.frequency, \
                     example_sentence = EXCLUDED.example_sentence, \
                     example_chunk = EXCLUDED.example_chunk",
            )
            .bind(case_id)
            .bind(&phrase.phrase)
            .bind(phrase.n)
            .bind(phrase.frequency)
            .bind(phrase.example_sentence)
            .bind(phrase.example_chunk)
            .execute(&mut *conn)
            .await?;
            outcome.phrases += 1;
        }

        // Step 11: embeddings per the configured mode
        outcome.embeddings = self
            .write_embeddings(&mut *conn, case_id, record, &inserted_chunks)
            .await?;

        info!(
            "RAG indexing for case {}: {} chunks, {} sentences, {} words, {} phrases, {} embeddings",
            case_id, outcome.chunks, outcome.sentences, outcome.words, outcome.phrases,
            outcome.embeddings
        );
        Ok(outcome)
    }

    async fn write_embeddings(
        &self,
        conn: &mut PgConnection,
        case_id: i64,
        record: &CaseRecord,
        chunks: &[(i64, TextChunk)],
    ) -> Result<usize> {
        let mut written = 0usize;

        let eligible: Vec<&(i64, TextChunk)> = match self.chunk_mode {
            ChunkEmbeddingMode::All => chunks.iter().collect(),
            ChunkEmbeddingMode::Important => chunks
                .iter()
                .filter(|(_, chunk)| chunk.section.is_important())
                .collect(),
            ChunkEmbeddingMode::None => Vec::new(),
        };

        if !eligible.is_empty() {
            let texts: Vec<String> = eligible.iter().map(|(_, c)| c.text.clone()).collect();
            let vectors = self.embedder.embed_all(&texts).await?;

            for ((chunk_id, chunk), vector) in eligible.iter().zip(vectors) {
                sqlx::query(
                    "INSERT INTO embeddings (case_id, chunk_id, text, vector, chunk_order, section) \
                     VALUES ($1, $2, $3, $4, $5, $6)",
                )
                .bind(case_id)
                .bind(chunk_id)
                .bind(&chunk.text)
                .bind(Vector::from(vector))
                .bind(chunk.chunk_order)
                .bind(chunk.section.as_str())
                .execute(&mut *conn)
                .await?;
                written += 1;
            }
        }

        // Case-level embedding from title + summary, independent of mode
        let case_text = record.case_level_embedding_text();
        let vector = self.embedder.embed_one(&case_text).await?;
        sqlx::query(
            "INSERT INTO embeddings (case_id, chunk_id, text, vector, chunk_order, section) \
             VALUES ($1, NULL, $2, $3, 0, NULL)",
        )
        .bind(case_id)
        .bind(&case_text)
        .bind(Vector::from(vector))
        .execute(&mut *conn)
        .await?;
        written += 1;

        debug!("Wrote {} embeddings for case {}", written, case_id);
        Ok(written)
    }
}
