//! # Utilities Module
//!
//! ## Purpose
//! Common utility functions used throughout the ingestion pipeline: case-file
//! id normalization, text truncation helpers, and performance timing.
//!
//! ## Input/Output Specification
//! - **Input**: Raw case-file identifiers, long text, operation names
//! - **Output**: Normalized join keys, bounded text, timing measurements
//!
//! ## Key Features
//! - Digits-only normalization used for metadata joins and the case unique key
//! - Text truncation with ellipsis for log-safe previews
//! - Lightweight operation timer logging through `tracing`

use std::time::Instant;

/// Performance timer for measuring operation duration
pub struct Timer {
    start: Instant,
    name: String,
}

impl Timer {
    /// Start a new timer with a name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            name: name.into(),
        }
    }

    /// Get elapsed time in milliseconds
    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    /// Stop timer and log duration
    pub fn stop(self) -> u64 {
        let elapsed = self.elapsed_ms();
        tracing::debug!("Timer '{}' completed in {}ms", self.name, elapsed);
        elapsed
    }
}

/// Normalize a case-file identifier to its digits.
///
/// The normalized form is the join key between PDF filenames and the metadata
/// sheet, and one half of the case table's unique key. `"69423-5"`,
/// `"694235"` and `"69423-5-I"` all normalize to `"694235"`.
pub fn normalize_case_file_id(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Extract the normalized case-file id from a PDF filename.
///
/// Filenames encode the id before any suffix (e.g. `"39300-3_III.pdf"`), so
/// the digits of the stem are the join key.
pub fn case_file_id_from_filename(filename: &str) -> String {
    let stem = filename
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .unwrap_or(filename);
    normalize_case_file_id(stem)
}

/// Truncate text to a character budget with ellipsis, for log previews
pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let kept: String = text.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Truncate text to a character budget without ellipsis, on a char boundary
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Count whitespace-separated words
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_case_file_id() {
        assert_eq!(normalize_case_file_id("69423-5"), "694235");
        assert_eq!(normalize_case_file_id("694235"), "694235");
        assert_eq!(normalize_case_file_id("69423-5-I"), "694235");
        assert_eq!(normalize_case_file_id("No. 102586-6"), "1025866");
        assert_eq!(normalize_case_file_id("III"), "");
    }

    #[test]
    fn test_case_file_id_from_filename() {
        assert_eq!(case_file_id_from_filename("102586-6.pdf"), "1025866");
        assert_eq!(case_file_id_from_filename("39300-3_III.pdf"), "393003");
        assert_eq!(case_file_id_from_filename("694235"), "694235");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 20), "short");
        assert_eq!(truncate("a longer piece of text", 10), "a longe...");
    }

    #[test]
    fn test_truncate_chars_boundary() {
        assert_eq!(truncate_chars("abcdef", 4), "abcd");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }
}
