//! # Legal Text Chunker
//!
//! ## Purpose
//! Section-aware segmentation of opinion text into ordered chunks of roughly
//! 350 words, bounded to [200, 500]. Uppercase legal headings close the
//! current chunk and begin a new one carrying the detected section label.
//!
//! ## Input/Output Specification
//! - **Input**: Full case text (pages joined with blank lines)
//! - **Output**: `TextChunk` values in document order; `chunk_order` is
//!   assigned densely 1..N after assembly so no gaps can appear
//! - **Edge cases**: a single paragraph above the max budget is kept whole
//!   (never split mid-sentence); a small trailing chunk is merged into its
//!   predecessor when the merge stays within bounds

use crate::model::Section;
use regex::Regex;
use std::sync::OnceLock;
use tracing::debug;

/// A contiguous segment of case text with a section label
#[derive(Debug, Clone)]
pub struct TextChunk {
    /// 1-based position in document order, dense across the case
    pub chunk_order: i32,
    pub section: Section,
    pub text: String,
    pub word_count: usize,
}

/// Word-count budgets for a chunk
#[derive(Debug, Clone, Copy)]
pub struct ChunkBudget {
    pub target: usize,
    pub min: usize,
    pub max: usize,
}

impl Default for ChunkBudget {
    fn default() -> Self {
        Self {
            target: 350,
            min: 200,
            max: 500,
        }
    }
}

/// Section heading patterns, checked in order; first match wins. Patterns
/// run against the raw paragraph so only genuinely uppercase headings match.
fn section_patterns() -> &'static [(Section, Regex)] {
    static PATTERNS: OnceLock<Vec<(Section, Regex)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let table: [(Section, &str); 10] = [
            (
                Section::Header,
                r"IN THE (SUPREME )?COURT|COURT OF APPEALS OF|STATE OF WASHINGTON|\bDOCKET\b|Case No\.",
            ),
            (
                Section::Parties,
                r"\bAPPELLANTS?\b|\bRESPONDENTS?\b|\bPETITIONERS?\b|\bPLAINTIFFS?\b|\bDEFENDANTS?\b",
            ),
            (
                Section::Procedural,
                r"PROCEDURAL HISTORY|\bBACKGROUND\b|\bPROCEEDINGS\b|\bMOTION\b|\bAPPEAL\b",
            ),
            (
                Section::Facts,
                r"STATEMENT OF FACTS|FACTUAL BACKGROUND|FINDINGS OF FACT|\bFACTS\b",
            ),
            (
                Section::Analysis,
                r"\bANALYSIS\b|\bDISCUSSION\b|CONCLUSIONS OF LAW|\bOPINION\b",
            ),
            (
                Section::Holding,
                r"\bHOLDING\b|\bCONCLUSION\b|\bDECISION\b|\bJUDGMENT\b|\bORDER\b",
            ),
            (
                Section::Custody,
                r"\bCUSTODY\b|PARENTING PLAN|RESIDENTIAL SCHEDULE",
            ),
            (
                Section::Support,
                r"CHILD SUPPORT|SPOUSAL SUPPORT|\bMAINTENANCE\b",
            ),
            (
                Section::Property,
                r"PROPERTY DIVISION|DISTRIBUTION OF PROPERTY|COMMUNITY PROPERTY",
            ),
            (Section::Fees, r"ATTORNEY FEES|FEES ON APPEAL|COSTS AND FEES"),
        ];
        table
            .into_iter()
            .map(|(section, pattern)| (section, Regex::new(pattern).expect("section pattern")))
            .collect()
    })
}

/// Section-aware chunker
pub struct Chunker {
    budget: ChunkBudget,
}

impl Chunker {
    pub fn new() -> Self {
        Self {
            budget: ChunkBudget::default(),
        }
    }

    pub fn with_budget(budget: ChunkBudget) -> Self {
        Self { budget }
    }

    /// Chunk a page sequence (pages joined on blank lines first)
    pub fn chunk_pages(&self, pages: &[String]) -> Vec<TextChunk> {
        self.chunk_text(&pages.join("\n\n"))
    }

    /// Chunk full case text into ordered, dense, section-labelled chunks
    pub fn chunk_text(&self, text: &str) -> Vec<TextChunk> {
        let paragraphs = split_paragraphs(text);

        let mut chunks: Vec<(Section, Vec<&str>, usize)> = Vec::new();
        let mut current: Vec<&str> = Vec::new();
        let mut current_words = 0usize;
        let mut current_section = Section::Content;

        for para in &paragraphs {
            let para_words = para.split_whitespace().count();

            // A heading signal closes the running chunk and relabels
            if let Some(section) = detect_section(para) {
                if section != current_section && !current.is_empty() {
                    chunks.push((current_section, std::mem::take(&mut current), current_words));
                    current_words = 0;
                }
                current_section = section;
            }

            // Never split a paragraph: if adding it would blow the max
            // budget, close the running chunk first.
            if current_words > 0 && current_words + para_words > self.budget.max {
                chunks.push((current_section, std::mem::take(&mut current), current_words));
                current_words = 0;
            }

            current.push(para);
            current_words += para_words;

            if current_words >= self.budget.target {
                chunks.push((current_section, std::mem::take(&mut current), current_words));
                current_words = 0;
            }
        }
        if !current.is_empty() {
            chunks.push((current_section, current, current_words));
        }

        self.merge_undersized(&mut chunks);

        // Dense renumbering happens last so nothing upstream can leave gaps
        let chunks: Vec<TextChunk> = chunks
            .into_iter()
            .enumerate()
            .map(|(i, (section, paras, word_count))| TextChunk {
                chunk_order: i as i32 + 1,
                section,
                text: paras.join("\n\n"),
                word_count,
            })
            .collect();

        debug!("Chunked text into {} chunks", chunks.len());
        chunks
    }

    /// Merge every undersized chunk into an adjacent neighbor while the
    /// combined size stays within the max budget. Heading-triggered early
    /// closes can leave short chunks anywhere in the document, not just at
    /// the tail; dropping them instead would lose text and break the
    /// occurrence and ordering invariants. A same-section neighbor is
    /// preferred; otherwise the merged chunk keeps the larger side's label.
    /// A chunk whose neighbors would all overflow the max budget stays as
    /// it is.
    fn merge_undersized(&self, chunks: &mut Vec<(Section, Vec<&str>, usize)>) {
        loop {
            let mut merged_any = false;
            let mut i = 0;
            while i < chunks.len() && chunks.len() > 1 {
                if chunks[i].2 >= self.budget.min {
                    i += 1;
                    continue;
                }

                let fits = |j: usize| chunks[j].2 + chunks[i].2 <= self.budget.max;
                let prev = (i > 0 && fits(i - 1)).then(|| i - 1);
                let next = (i + 1 < chunks.len() && fits(i + 1)).then(|| i + 1);
                let same_section = |j: &usize| chunks[*j].0 == chunks[i].0;

                let target = prev
                    .filter(same_section)
                    .or(next.filter(same_section))
                    .or(prev)
                    .or(next);
                let Some(target) = target else {
                    i += 1;
                    continue;
                };

                let section = if chunks[target].2 >= chunks[i].2 {
                    chunks[target].0
                } else {
                    chunks[i].0
                };
                let (_, paras, words) = chunks.remove(i);
                // After the removal the target index shifts when it sat
                // past the removed chunk.
                let target = if target > i { target - 1 } else { target };
                let neighbor = &mut chunks[target];
                if target >= i {
                    // Merging into the following chunk: keep document order
                    let mut combined = paras;
                    combined.append(&mut neighbor.1);
                    neighbor.1 = combined;
                } else {
                    neighbor.1.extend(paras);
                }
                neighbor.0 = section;
                neighbor.2 += words;
                merged_any = true;
            }
            if !merged_any {
                break;
            }
        }
    }
}

impl Default for Chunker {
    fn default() -> Self {
        Self::new()
    }
}

/// Split on blank lines, dropping fragments shorter than five words (page
/// numbers, running heads) unless they are heading signals.
fn split_paragraphs(text: &str) -> Vec<String> {
    static BLANK: OnceLock<Regex> = OnceLock::new();
    let blank = BLANK.get_or_init(|| Regex::new(r"\n\s*\n").expect("paragraph splitter"));

    blank
        .split(text)
        .map(str::trim)
        .filter(|para| {
            !para.is_empty()
                && (para.split_whitespace().count() >= 5 || detect_section(para).is_some())
        })
        .map(str::to_string)
        .collect()
}

/// Detect whether a paragraph is a section heading signal
fn detect_section(paragraph: &str) -> Option<Section> {
    section_patterns()
        .iter()
        .find(|(_, regex)| regex.is_match(paragraph))
        .map(|(section, _)| *section)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(n: usize) -> String {
        (0..n).map(|i| format!("word{i}")).collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn test_chunk_orders_are_dense_from_one() {
        let text = (0..10)
            .map(|_| words(120))
            .collect::<Vec<_>>()
            .join("\n\n");
        let chunks = Chunker::new().chunk_text(&text);
        assert!(!chunks.is_empty());
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_order, i as i32 + 1);
        }
    }

    #[test]
    fn test_target_budget_closes_chunks() {
        let text = (0..8).map(|_| words(100)).collect::<Vec<_>>().join("\n\n");
        let chunks = Chunker::new().chunk_text(&text);
        // 100-word paragraphs accumulate until crossing 350
        assert!(chunks[0].word_count >= 350);
        assert!(chunks[0].word_count <= 500);
    }

    #[test]
    fn test_oversized_paragraph_kept_whole() {
        let big = words(700);
        let text = format!("{}\n\n{}", words(100), big);
        let chunks = Chunker::new().chunk_text(&text);
        // The giant paragraph lands alone in its own chunk, unsplit
        assert!(chunks.iter().any(|c| c.word_count == 700));
    }

    #[test]
    fn test_heading_starts_new_labelled_chunk() {
        let text = format!(
            "{}\n\nSTATEMENT OF FACTS\n\n{}\n\nANALYSIS\n\n{}",
            words(250),
            words(250),
            words(250)
        );
        let chunks = Chunker::new().chunk_text(&text);
        let sections: Vec<Section> = chunks.iter().map(|c| c.section).collect();
        assert!(sections.contains(&Section::Facts));
        assert!(sections.contains(&Section::Analysis));
        // Body text before the first heading stays CONTENT
        assert_eq!(chunks[0].section, Section::Content);
    }

    #[test]
    fn test_lowercase_body_text_is_not_a_heading() {
        assert_eq!(detect_section("the facts of this case are disputed"), None);
        assert_eq!(detect_section("STATEMENT OF FACTS"), Some(Section::Facts));
        assert_eq!(detect_section("PARENTING PLAN"), Some(Section::Custody));
        assert_eq!(detect_section("ATTORNEY FEES"), Some(Section::Fees));
    }

    #[test]
    fn test_mid_document_undersized_chunk_merges_into_neighbor() {
        // A short FACTS heading plus one small paragraph, force-closed by
        // the following ANALYSIS heading, must not survive as an undersized
        // mid-document chunk.
        let text = format!(
            "{}\n\nSTATEMENT OF FACTS\n\n{}\n\nANALYSIS\n\n{}",
            words(250),
            words(30),
            words(250)
        );
        let chunks = Chunker::new().chunk_text(&text);
        let budget = ChunkBudget::default();
        assert!(
            chunks.iter().all(|c| c.word_count >= budget.min),
            "undersized chunk survived: {:?}",
            chunks.iter().map(|c| c.word_count).collect::<Vec<_>>()
        );
        // Nothing was dropped and orders stay dense
        let total: usize = chunks.iter().map(|c| c.word_count).sum();
        assert_eq!(total, 250 + 3 + 30 + 1 + 250);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_order, i as i32 + 1);
        }
    }

    #[test]
    fn test_undersized_chunk_prefers_same_section_neighbor() {
        // CONTENT body, then two FACTS chunks where the second is small:
        // the small one must fold into the same-section predecessor, not
        // the CONTENT chunk.
        let text = format!(
            "{}\n\nSTATEMENT OF FACTS\n\n{}\n\n{}\n\nHOLDING\n\n{}",
            words(250),
            words(400),
            words(40),
            words(250)
        );
        let chunks = Chunker::new().chunk_text(&text);
        let facts: Vec<_> = chunks.iter().filter(|c| c.section == Section::Facts).collect();
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].word_count, 400 + 3 + 40);
    }

    #[test]
    fn test_small_trailing_chunk_merges_into_predecessor() {
        let text = format!("{}\n\n{}", words(340), words(30));
        let chunks = Chunker::new().chunk_text(&text);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].word_count, 370);
    }

    #[test]
    fn test_tiny_document_still_produces_one_chunk() {
        let text = words(40);
        let chunks = Chunker::new().chunk_text(&text);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_order, 1);
    }
}
