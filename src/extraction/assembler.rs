//! # Case Assembler
//!
//! ## Purpose
//! Merges metadata-sheet fields with LLM-extracted fields into the one
//! canonical `CaseRecord` the inserter writes. Sheet fields win for identity
//! and dates; LLM fields win for substance; the county is pre-extracted from
//! the full text before the LLM ever saw a truncated version.
//!
//! ## Input/Output Specification
//! - **Input**: `CaseMetadata` row, `ExtractedCase`, full text, source file
//! - **Output**: `CaseRecord` with normalized id, derived court name, docket

use crate::model::{CaseMetadata, CaseRecord, CourtLevel, ExtractedCase};
use crate::utils::normalize_case_file_id;
use chrono::Utc;

/// Official Washington State counties (39)
const WASHINGTON_COUNTIES: [&str; 39] = [
    "adams", "asotin", "benton", "chelan", "clark", "clallam", "columbia", "cowlitz", "douglas",
    "ferry", "franklin", "garfield", "grant", "grays harbor", "island", "jefferson", "king",
    "kitsap", "kittitas", "klickitat", "lewis", "lincoln", "mason", "okanogan", "pacific",
    "pend oreille", "pierce", "san juan", "skagit", "skamania", "snohomish", "spokane", "stevens",
    "thurston", "wahkiakum", "walla walla", "whatcom", "whitman", "yakima",
];

/// County references appear near the caption; scanning further only finds
/// citations to other cases.
const COUNTY_SCAN_CHARS: usize = 15_000;

/// Extract the originating county from the opinion text by scanning for
/// `<county> county` against the official list. Returns title case.
pub fn extract_county_from_text(text: &str) -> Option<String> {
    let scan: String = text.chars().take(COUNTY_SCAN_CHARS).collect();
    let scan = scan.to_lowercase();

    for county in WASHINGTON_COUNTIES {
        let needle = format!("{county} county");
        let mut from = 0;
        while let Some(pos) = scan[from..].find(&needle) {
            let start = from + pos;
            let boundary_ok = start == 0
                || !scan[..start]
                    .chars()
                    .next_back()
                    .is_some_and(|c| c.is_alphanumeric());
            if boundary_ok {
                return Some(title_case(county));
            }
            from = start + needle.len();
        }
    }
    None
}

fn title_case(name: &str) -> String {
    name.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Merges the metadata sheet row and the LLM extraction into one record
pub struct CaseAssembler;

impl CaseAssembler {
    pub fn new() -> Self {
        Self
    }

    pub fn assemble(
        &self,
        metadata: &CaseMetadata,
        extracted: ExtractedCase,
        full_text: String,
        source_file: &str,
    ) -> CaseRecord {
        let county = extract_county_from_text(&full_text)
            .or_else(|| extracted.county.clone())
            .or_else(|| metadata.county.clone());

        let appeal_published_date = extracted
            .opinion_filed_date
            .or(metadata.appeal_published_date);

        CaseRecord {
            case_file_id: metadata.case_file_id.clone(),
            case_file_id_normalized: normalize_case_file_id(&metadata.case_file_id),
            title: metadata.title.clone(),
            court_level: metadata.court_level,
            court_name: derive_court_name(metadata.court_level, metadata.district.as_deref()),
            district: metadata.district.clone(),
            county,
            docket_number: Some(derive_docket_number(
                &metadata.case_file_id,
                metadata.district.as_deref(),
            )),
            decision_year: metadata
                .decision_year
                .or_else(|| appeal_published_date.map(|d| chrono::Datelike::year(&d))),
            decision_month: metadata
                .decision_month
                .or_else(|| appeal_published_date.map(|d| chrono::Datelike::month(&d) as i32)),
            appeal_published_date,
            publication_status: metadata.publication_status,
            opinion_type: metadata.opinion_type.clone(),
            full_text,
            source_file: source_file.to_string(),
            extraction_timestamp: Utc::now(),
            extracted,
        }
    }
}

impl Default for CaseAssembler {
    fn default() -> Self {
        Self::new()
    }
}

/// Human-readable court name for the court dimension row
fn derive_court_name(level: CourtLevel, district: Option<&str>) -> Option<String> {
    match level {
        CourtLevel::SupremeCourt => Some("Washington State Supreme Court".to_string()),
        CourtLevel::CourtOfAppeals => {
            let name = match district {
                Some(district) => format!("Washington Court of Appeals {district}"),
                None => "Washington Court of Appeals".to_string(),
            };
            Some(name)
        }
        _ => None,
    }
}

/// Docket numbers carry the division numeral as a suffix ("39300-3-III")
fn derive_docket_number(case_file_id: &str, district: Option<&str>) -> String {
    match district.and_then(|d| d.split_whitespace().last()) {
        Some(numeral) => format!("{case_file_id}-{numeral}"),
        None => case_file_id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PublicationStatus;
    use chrono::NaiveDate;

    fn metadata() -> CaseMetadata {
        CaseMetadata {
            case_file_id: "39300-3".to_string(),
            title: "State v. Smith".to_string(),
            court_level: CourtLevel::CourtOfAppeals,
            district: Some("Division III".to_string()),
            county: Some("Spokane".to_string()),
            decision_year: Some(2024),
            decision_month: Some(7),
            publication_status: PublicationStatus::Unpublished,
            opinion_type: Some("Court of Appeals Opinions".to_string()),
            appeal_published_date: NaiveDate::from_ymd_opt(2024, 7, 2),
        }
    }

    #[test]
    fn test_extract_county_from_text() {
        let text = "Appeal from Spokane County Superior Court, the Honorable Jane Roe.";
        assert_eq!(extract_county_from_text(text), Some("Spokane".to_string()));

        let text = "In Grays Harbor County the trial court found...";
        assert_eq!(extract_county_from_text(text), Some("Grays Harbor".to_string()));

        assert_eq!(extract_county_from_text("No venue is recited here."), None);
    }

    #[test]
    fn test_extract_county_respects_word_boundary() {
        // "viking county" must not match "king county"
        let text = "The viking county fair has nothing to do with venue.";
        assert_eq!(extract_county_from_text(text), None);
    }

    #[test]
    fn test_assemble_merges_fields() {
        let mut extracted = ExtractedCase::default();
        extracted.summary = Some("Affirmed.".to_string());
        extracted.county = Some("Lincoln".to_string());

        let record = CaseAssembler::new().assemble(
            &metadata(),
            extracted,
            "Appeal from Spokane County Superior Court.".to_string(),
            "39300-3_III.pdf",
        );

        assert_eq!(record.case_file_id_normalized, "393003");
        // Full-text county wins over the LLM's answer
        assert_eq!(record.county.as_deref(), Some("Spokane"));
        assert_eq!(
            record.court_name.as_deref(),
            Some("Washington Court of Appeals Division III")
        );
        assert_eq!(record.docket_number.as_deref(), Some("39300-3-III"));
        assert_eq!(record.decision_year, Some(2024));
        assert_eq!(record.source_file, "39300-3_III.pdf");
    }

    #[test]
    fn test_supreme_court_name_has_no_division() {
        let mut meta = metadata();
        meta.court_level = CourtLevel::SupremeCourt;
        meta.district = None;
        let record = CaseAssembler::new().assemble(
            &meta,
            ExtractedCase::default(),
            String::new(),
            "x.pdf",
        );
        assert_eq!(
            record.court_name.as_deref(),
            Some("Washington State Supreme Court")
        );
        assert_eq!(record.docket_number.as_deref(), Some("39300-3"));
    }

    #[test]
    fn test_case_level_embedding_text() {
        let mut extracted = ExtractedCase::default();
        extracted.summary = Some("Summary.".to_string());
        let record = CaseAssembler::new().assemble(
            &metadata(),
            extracted,
            String::new(),
            "x.pdf",
        );
        assert_eq!(record.case_level_embedding_text(), "State v. Smith\n\nSummary.");
    }
}
