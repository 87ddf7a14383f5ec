//! # Metadata Sheet
//!
//! ## Purpose
//! Loads the companion CSV metadata sheet and indexes rows by the normalized
//! case-file id so PDFs can be joined without caring about dashes or suffixes.
//!
//! ## Input/Output Specification
//! - **Input**: CSV with case-file id, title, court, district, county, date
//!   (year + month), publication status, opinion type columns
//! - **Output**: `CaseMetadata` rows addressable by normalized id or by
//!   1-indexed row number (single-file mode)
//! - **Join rule**: digits of the PDF filename stem == digits of the sheet's
//!   case-file id

use crate::errors::{PipelineError, Result};
use crate::extraction::{clean_text, parse_loose_date};
use crate::model::{CaseMetadata, CourtLevel, PublicationStatus};
use crate::utils::normalize_case_file_id;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, warn};

/// Raw CSV row; every column beyond the id and title is optional because
/// scrape vintages differ.
#[derive(Debug, Deserialize)]
struct RawMetadataRow {
    #[serde(alias = "case_number")]
    case_file_id: String,
    #[serde(alias = "case_title")]
    title: String,
    #[serde(default)]
    court: String,
    #[serde(default, alias = "division")]
    district: String,
    #[serde(default)]
    county: String,
    #[serde(default)]
    year: String,
    #[serde(default)]
    month: String,
    #[serde(default)]
    publication_status: String,
    #[serde(default)]
    opinion_type: String,
    #[serde(default)]
    file_date: String,
}

/// Metadata sheet indexed by normalized case-file id
pub struct MetadataSheet {
    by_normalized_id: HashMap<String, CaseMetadata>,
    /// Sheet order, for `--row N` addressing
    ordered_ids: Vec<String>,
}

impl MetadataSheet {
    /// Load and index a metadata CSV. Rows without a usable case-file id or
    /// court level are logged and dropped; they can never join a PDF.
    pub fn load(path: &Path) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(path)
            .map_err(|e| PipelineError::MetadataSheet {
                details: format!("{}: {e}", path.display()),
            })?;

        let mut by_normalized_id = HashMap::new();
        let mut ordered_ids = Vec::new();

        for (index, row) in reader.deserialize::<RawMetadataRow>().enumerate() {
            let row = match row {
                Ok(row) => row,
                Err(e) => {
                    warn!("Skipping malformed metadata row {}: {}", index + 1, e);
                    continue;
                }
            };
            match parse_row(row) {
                Some(metadata) => {
                    let normalized = normalize_case_file_id(&metadata.case_file_id);
                    ordered_ids.push(normalized.clone());
                    by_normalized_id.insert(normalized, metadata);
                }
                None => warn!("Skipping metadata row {}: no id or court level", index + 1),
            }
        }

        if by_normalized_id.is_empty() {
            return Err(PipelineError::MetadataSheet {
                details: format!("{}: no usable rows", path.display()),
            });
        }

        debug!(
            "Loaded {} metadata rows from {}",
            by_normalized_id.len(),
            path.display()
        );
        Ok(Self {
            by_normalized_id,
            ordered_ids,
        })
    }

    /// Look up the row matching a normalized case-file id
    pub fn lookup(&self, normalized_id: &str) -> Option<&CaseMetadata> {
        self.by_normalized_id.get(normalized_id)
    }

    /// Fetch the Nth row (1-indexed, sheet order) for single-file mode
    pub fn row(&self, n: usize) -> Option<&CaseMetadata> {
        let id = self.ordered_ids.get(n.checked_sub(1)?)?;
        self.by_normalized_id.get(id)
    }

    pub fn len(&self) -> usize {
        self.by_normalized_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_normalized_id.is_empty()
    }
}

fn parse_row(row: RawMetadataRow) -> Option<CaseMetadata> {
    let case_file_id = row.case_file_id.trim().to_string();
    if normalize_case_file_id(&case_file_id).is_empty() {
        return None;
    }

    // Court level comes from the court column when present, otherwise from
    // the opinion type ("Supreme Court Opinions", "Court of Appeals ...").
    let court_level = CourtLevel::parse(&row.court)
        .or_else(|| CourtLevel::parse(&row.opinion_type))?;

    let district = clean_text(Some(row.district)).map(|d| normalize_district(&d));

    let decision_year = row.year.trim().parse::<i32>().ok();
    let decision_month = parse_month(&row.month);
    let appeal_published_date = parse_loose_date(&row.file_date);

    Some(CaseMetadata {
        case_file_id,
        title: if row.title.is_empty() {
            "Unknown".to_string()
        } else {
            row.title
        },
        court_level,
        district,
        county: clean_text(Some(row.county)),
        decision_year: decision_year.or_else(|| appeal_published_date.map(|d| chrono::Datelike::year(&d))),
        decision_month: decision_month
            .or_else(|| appeal_published_date.map(|d| chrono::Datelike::month(&d) as i32)),
        publication_status: PublicationStatus::parse(&row.publication_status),
        opinion_type: clean_text(Some(row.opinion_type)),
        appeal_published_date,
    })
}

/// Sheets carry the appellate division as a bare numeral ("II") or already
/// spelled out ("Division II"); store the spelled-out form.
fn normalize_district(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.to_lowercase().starts_with("division") {
        trimmed.to_string()
    } else {
        format!("Division {trimmed}")
    }
}

fn parse_month(raw: &str) -> Option<i32> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(n) = trimmed.parse::<i32>() {
        return (1..=12).contains(&n).then_some(n);
    }
    let lower = trimmed.to_lowercase();
    const MONTHS: [&str; 12] = [
        "january", "february", "march", "april", "may", "june", "july", "august", "september",
        "october", "november", "december",
    ];
    MONTHS
        .iter()
        .position(|m| m.starts_with(&lower[..lower.len().min(3)]) && lower.len() >= 3)
        .map(|i| i as i32 + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sheet_from(contents: &str) -> MetadataSheet {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        MetadataSheet::load(file.path()).unwrap()
    }

    const SAMPLE: &str = "\
case_number,case_title,court,division,county,year,month,publication_status,opinion_type,file_date
102586-6,Pub. Util. Dist. No. 1 v. State,Supreme Court,,Thurston,2025,January,Published,Supreme Court Opinions,\"Jan. 16, 2025\"
39300-3,State v. Smith,Court of Appeals,III,Spokane,2024,7,Unpublished,Court of Appeals Opinions,\"Jul. 2, 2024\"
";

    #[test]
    fn test_join_by_normalized_id() {
        let sheet = sheet_from(SAMPLE);
        assert_eq!(sheet.len(), 2);

        let case = sheet.lookup("1025866").unwrap();
        assert_eq!(case.title, "Pub. Util. Dist. No. 1 v. State");
        assert_eq!(case.court_level, CourtLevel::SupremeCourt);
        assert_eq!(case.decision_year, Some(2025));
        assert_eq!(case.decision_month, Some(1));

        // Dashes in the sheet id never matter for the join
        assert!(sheet.lookup("393003").is_some());
        assert!(sheet.lookup("999999").is_none());
    }

    #[test]
    fn test_division_normalization() {
        let sheet = sheet_from(SAMPLE);
        let case = sheet.lookup("393003").unwrap();
        assert_eq!(case.district.as_deref(), Some("Division III"));
        assert_eq!(case.publication_status, PublicationStatus::Unpublished);
    }

    #[test]
    fn test_row_addressing_is_one_indexed() {
        let sheet = sheet_from(SAMPLE);
        assert_eq!(sheet.row(1).unwrap().case_file_id, "102586-6");
        assert_eq!(sheet.row(2).unwrap().case_file_id, "39300-3");
        assert!(sheet.row(0).is_none());
        assert!(sheet.row(3).is_none());
    }

    #[test]
    fn test_parse_month_forms() {
        assert_eq!(parse_month("7"), Some(7));
        assert_eq!(parse_month("July"), Some(7));
        assert_eq!(parse_month("jan"), Some(1));
        assert_eq!(parse_month("13"), None);
        assert_eq!(parse_month(""), None);
    }
}
