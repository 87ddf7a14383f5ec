//! # Case Extraction Module
//!
//! ## Purpose
//! Per-case extraction pipeline: PDF page text, metadata-sheet join, LLM
//! structured extraction, and assembly into the canonical case record.
//!
//! ## Input/Output Specification
//! - **Input**: PDF files, a CSV metadata sheet, the LLM endpoint
//! - **Output**: `CaseRecord` values ready for the single-transaction insert
//!
//! ## Architecture
//! - `pdf`: page-text contract and the pdfium-backed adapter
//! - `metadata`: metadata sheet loading and normalized-id joins
//! - `llm`: prompt construction, truncation, JSON parsing, enum coercion
//! - `assembler`: metadata + LLM merge, county pre-extraction

pub mod assembler;
pub mod llm;
pub mod metadata;
pub mod pdf;

pub use assembler::CaseAssembler;
pub use llm::LlmExtractor;
pub use metadata::MetadataSheet;
pub use pdf::{PageTextSource, PdfiumExtractor};

use chrono::NaiveDate;

/// Parse dates in the loose formats metadata sheets and LLM output use
/// ("2025-01-16", "Jan. 16, 2025", "January 16, 2025", "1/16/2025").
pub(crate) fn parse_loose_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim().trim_end_matches('.');
    if trimmed.is_empty() {
        return None;
    }
    let cleaned = trimmed.replace(". ", " ").replace(',', "");
    for format in ["%Y-%m-%d", "%m/%d/%Y", "%b %d %Y", "%B %d %Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(&cleaned, format) {
            return Some(date);
        }
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return Some(date);
        }
    }
    None
}

/// Normalize an optional LLM/CSV string: trim, drop empties and the literal
/// null-ish spellings models emit.
pub(crate) fn clean_text(raw: Option<String>) -> Option<String> {
    let value = raw?.trim().to_string();
    if value.is_empty() {
        return None;
    }
    match value.to_lowercase().as_str() {
        "null" | "none" | "n/a" | "not mentioned" | "not specified" | "unknown" => None,
        _ => Some(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_loose_date() {
        let expected = NaiveDate::from_ymd_opt(2025, 1, 16).unwrap();
        assert_eq!(parse_loose_date("2025-01-16"), Some(expected));
        assert_eq!(parse_loose_date("Jan. 16, 2025"), Some(expected));
        assert_eq!(parse_loose_date("January 16, 2025"), Some(expected));
        assert_eq!(parse_loose_date("1/16/2025"), Some(expected));
        assert_eq!(parse_loose_date(""), None);
        assert_eq!(parse_loose_date("not a date"), None);
    }

    #[test]
    fn test_clean_text() {
        assert_eq!(clean_text(Some("King".into())), Some("King".to_string()));
        assert_eq!(clean_text(Some("  null ".into())), None);
        assert_eq!(clean_text(Some("Not mentioned".into())), None);
        assert_eq!(clean_text(Some(String::new())), None);
        assert_eq!(clean_text(None), None);
    }
}
