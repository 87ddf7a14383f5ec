//! # Phrase Extractor
//!
//! ## Purpose
//! Sliding-window n-gram extraction over each sentence's tokens, filtered by
//! a legal-term policy. Per case, phrases aggregate a frequency count and
//! remember the first observed location as the example.
//!
//! ## Input/Output Specification
//! - **Input**: Tokenized sentences with their sentence/chunk ids
//! - **Output**: Aggregated phrases upserted on `(case_id, phrase)`
//! - **Modes**: `strict` requires a legal keyword or a curated pattern;
//!   `relaxed` drops the keyword requirement; stop-phrases are rejected in
//!   every mode

use crate::config::PhraseFilterConfig;
use crate::model::PhraseFilterMode;
use std::collections::{HashMap, HashSet};

/// General sliding-window sizes. Curated legal patterns may run longer
/// ("substantial change in circumstances", "best interests of the child");
/// windows up to the longest shipped pattern are checked against the curated
/// set only.
const NGRAM_SIZES: std::ops::RangeInclusive<usize> = 2..=4;
const MAX_PATTERN_TOKENS: usize = 6;

/// Aggregated phrase for one case
#[derive(Debug, Clone, PartialEq)]
pub struct PhraseAggregate {
    pub phrase: String,
    /// Window size, clamped to the schema's 2..4 range for curated patterns
    pub n: i32,
    pub frequency: i64,
    pub example_sentence: i64,
    pub example_chunk: i64,
}

/// A tokenized sentence with its database ids
#[derive(Debug, Clone)]
pub struct TokenizedSentence {
    pub sentence_id: i64,
    pub chunk_id: i64,
    pub tokens: Vec<String>,
}

/// Legal n-gram filter and aggregator
pub struct PhraseExtractor {
    mode: PhraseFilterMode,
    keywords: HashSet<String>,
    patterns: HashSet<String>,
    stop_phrases: HashSet<String>,
}

impl PhraseExtractor {
    pub fn new(mode: PhraseFilterMode, config: &PhraseFilterConfig) -> Self {
        Self {
            mode,
            keywords: config.legal_keywords.iter().map(|k| k.to_lowercase()).collect(),
            patterns: config.legal_patterns.iter().map(|p| p.to_lowercase()).collect(),
            stop_phrases: config.stop_phrases.iter().map(|p| p.to_lowercase()).collect(),
        }
    }

    /// Extract aggregated phrases from a case's tokenized sentences.
    /// Sentences must arrive in document order so the stored example is the
    /// first observed location.
    pub fn extract(&self, sentences: &[TokenizedSentence]) -> Vec<PhraseAggregate> {
        let mut aggregates: HashMap<String, PhraseAggregate> = HashMap::new();
        let mut order: Vec<String> = Vec::new();

        for sentence in sentences {
            for n in NGRAM_SIZES {
                self.collect_windows(sentence, n, false, &mut aggregates, &mut order);
            }
            // Longer windows admit curated patterns only
            for n in (*NGRAM_SIZES.end() + 1)..=MAX_PATTERN_TOKENS {
                self.collect_windows(sentence, n, true, &mut aggregates, &mut order);
            }
        }

        order
            .into_iter()
            .filter_map(|phrase| aggregates.remove(&phrase))
            .collect()
    }

    fn collect_windows(
        &self,
        sentence: &TokenizedSentence,
        n: usize,
        patterns_only: bool,
        aggregates: &mut HashMap<String, PhraseAggregate>,
        order: &mut Vec<String>,
    ) {
        if sentence.tokens.len() < n {
            return;
        }
        for window in sentence.tokens.windows(n) {
            let candidate = window.join(" ");
            let accepted = if patterns_only {
                self.patterns.contains(&candidate)
            } else {
                self.accept(&candidate, window)
            };
            if !accepted {
                continue;
            }

            match aggregates.get_mut(&candidate) {
                Some(aggregate) => aggregate.frequency += 1,
                None => {
                    order.push(candidate.clone());
                    aggregates.insert(
                        candidate.clone(),
                        PhraseAggregate {
                            phrase: candidate,
                            n: n.min(*NGRAM_SIZES.end()) as i32,
                            frequency: 1,
                            example_sentence: sentence.sentence_id,
                            example_chunk: sentence.chunk_id,
                        },
                    );
                }
            }
        }
    }

    /// Apply the filter policy to a general-window candidate
    fn accept(&self, candidate: &str, window: &[String]) -> bool {
        if self.stop_phrases.contains(candidate) {
            return false;
        }
        if self.patterns.contains(candidate) {
            return true;
        }
        match self.mode {
            PhraseFilterMode::Strict => window.iter().any(|token| self.keywords.contains(token)),
            PhraseFilterMode::Relaxed => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor(mode: PhraseFilterMode) -> PhraseExtractor {
        PhraseExtractor::new(mode, &PhraseFilterConfig::default())
    }

    fn sentence(id: i64, chunk: i64, text: &str) -> TokenizedSentence {
        TokenizedSentence {
            sentence_id: id,
            chunk_id: chunk,
            tokens: text.split_whitespace().map(str::to_string).collect(),
        }
    }

    #[test]
    fn test_strict_requires_keyword_or_pattern() {
        let phrases = extractor(PhraseFilterMode::Strict)
            .extract(&[sentence(1, 1, "the court reversed the order")]);
        // Windows containing "court" pass; keyword-free windows do not
        assert!(phrases.iter().any(|p| p.phrase == "the court"));
        assert!(phrases.iter().any(|p| p.phrase == "court reversed"));
        assert!(!phrases.iter().any(|p| p.phrase == "reversed the"));
    }

    #[test]
    fn test_relaxed_drops_keyword_requirement() {
        let phrases = extractor(PhraseFilterMode::Relaxed)
            .extract(&[sentence(1, 1, "the weather was cold that morning")]);
        assert!(phrases.iter().any(|p| p.phrase == "weather was"));
    }

    #[test]
    fn test_stop_phrases_rejected_in_both_modes() {
        for mode in [PhraseFilterMode::Strict, PhraseFilterMode::Relaxed] {
            let phrases =
                extractor(mode).extract(&[sentence(1, 1, "of the in the best interests")]);
            assert!(
                !phrases.iter().any(|p| p.phrase == "of the"),
                "stop phrase leaked in {mode:?}"
            );
            assert!(!phrases.iter().any(|p| p.phrase == "in the"));
        }
    }

    #[test]
    fn test_frequency_counts_sliding_window_occurrences() {
        let sentences = [
            sentence(10, 2, "abuse of discretion tainted the ruling"),
            sentence(11, 2, "we find abuse of discretion again"),
            sentence(12, 3, "no abuse of discretion occurred"),
        ];
        let phrases = extractor(PhraseFilterMode::Strict).extract(&sentences);
        let target = phrases.iter().find(|p| p.phrase == "abuse of discretion").unwrap();
        assert_eq!(target.frequency, 3);
        assert_eq!(target.n, 3);
        // Example location is the first observation
        assert_eq!(target.example_sentence, 10);
        assert_eq!(target.example_chunk, 2);
    }

    #[test]
    fn test_curated_pattern_longer_than_four_tokens() {
        let sentences = [
            sentence(1, 1, "the best interests of the child control custody"),
            sentence(2, 1, "the best interests of the child govern here"),
            sentence(3, 2, "again the best interests of the child prevail"),
        ];
        let phrases = extractor(PhraseFilterMode::Strict).extract(&sentences);
        let target = phrases
            .iter()
            .find(|p| p.phrase == "best interests of the child")
            .expect("curated long pattern extracted");
        assert_eq!(target.frequency, 3);
        // Stored n stays within the schema range
        assert_eq!(target.n, 4);
        // Stop phrase inside the pattern is still rejected on its own
        assert!(!phrases.iter().any(|p| p.phrase == "of the"));
    }

    #[test]
    fn test_short_sentences_yield_nothing() {
        let phrases = extractor(PhraseFilterMode::Strict).extract(&[sentence(1, 1, "court")]);
        assert!(phrases.is_empty());
    }
}
