//! # Case Data Model
//!
//! ## Purpose
//! Canonical data types for extracted and assembled cases: the `ExtractedCase`
//! record produced by LLM extraction, the metadata-sheet row, the merged
//! `CaseRecord` written to the database, and every enumerated vocabulary the
//! schema constrains.
//!
//! ## Input/Output Specification
//! - **Input**: Loosely-typed LLM JSON and CSV strings
//! - **Output**: Validated records with enumerated sum types
//! - **Coercion**: Unknown enum values map to a neutral default where one is
//!   permissible (e.g. issue outcomes to `Mixed`) and are rejected otherwise
//!
//! ## Key Features
//! - Explicit optional fields instead of a dynamically typed case object
//! - Case-insensitive parsing for every textual natural key
//! - Stable string forms matching the database vocabulary

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Court levels recognized by the case table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CourtLevel {
    SupremeCourt,
    CourtOfAppeals,
    SuperiorCourt,
    DistrictCourt,
    MunicipalCourt,
}

impl CourtLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            CourtLevel::SupremeCourt => "Supreme Court",
            CourtLevel::CourtOfAppeals => "Court of Appeals",
            CourtLevel::SuperiorCourt => "Superior Court",
            CourtLevel::DistrictCourt => "District Court",
            CourtLevel::MunicipalCourt => "Municipal Court",
        }
    }

    /// Parse a court level from free text (metadata `court` / `opinion_type`
    /// columns), matching case-insensitively on the distinguishing word.
    pub fn parse(raw: &str) -> Option<Self> {
        let lower = raw.to_lowercase();
        if lower.contains("supreme") {
            Some(CourtLevel::SupremeCourt)
        } else if lower.contains("appeal") {
            Some(CourtLevel::CourtOfAppeals)
        } else if lower.contains("superior") {
            Some(CourtLevel::SuperiorCourt)
        } else if lower.contains("district") {
            Some(CourtLevel::DistrictCourt)
        } else if lower.contains("municipal") {
            Some(CourtLevel::MunicipalCourt)
        } else {
            None
        }
    }
}

/// Case lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessingStatus {
    Pending,
    TextExtracted,
    AiProcessed,
    Embedded,
    FullyProcessed,
    Failed,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::Pending => "pending",
            ProcessingStatus::TextExtracted => "text_extracted",
            ProcessingStatus::AiProcessed => "ai_processed",
            ProcessingStatus::Embedded => "embedded",
            ProcessingStatus::FullyProcessed => "fully_processed",
            ProcessingStatus::Failed => "failed",
        }
    }
}

/// Publication status of an opinion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PublicationStatus {
    Published,
    Unpublished,
    PublishedInPart,
}

impl PublicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublicationStatus::Published => "published",
            PublicationStatus::Unpublished => "unpublished",
            PublicationStatus::PublishedInPart => "published_in_part",
        }
    }

    /// Metadata sheets carry free-text values ("Published Opinion",
    /// "Unpublished", "Published in Part"); classify on the telling words.
    pub fn parse(raw: &str) -> Self {
        let lower = raw.to_lowercase();
        if lower.contains("unpub") {
            PublicationStatus::Unpublished
        } else if lower.contains("part") {
            PublicationStatus::PublishedInPart
        } else {
            PublicationStatus::Published
        }
    }
}

/// Outcome of an issue or of the whole appeal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IssueOutcome {
    Affirmed,
    Dismissed,
    Reversed,
    Remanded,
    Mixed,
}

impl IssueOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueOutcome::Affirmed => "Affirmed",
            IssueOutcome::Dismissed => "Dismissed",
            IssueOutcome::Reversed => "Reversed",
            IssueOutcome::Remanded => "Remanded",
            IssueOutcome::Mixed => "Mixed",
        }
    }

    /// Coerce an LLM-reported outcome; unknown values fall back to `Mixed`
    pub fn coerce(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "affirmed" => IssueOutcome::Affirmed,
            "dismissed" => IssueOutcome::Dismissed,
            "reversed" => IssueOutcome::Reversed,
            "remanded" => IssueOutcome::Remanded,
            _ => IssueOutcome::Mixed,
        }
    }
}

/// Role of a judge on a case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JudgeRole {
    Author,
    Concurring,
    Dissenting,
    PerCuriam,
}

impl JudgeRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            JudgeRole::Author => "author",
            JudgeRole::Concurring => "concurring",
            JudgeRole::Dissenting => "dissenting",
            JudgeRole::PerCuriam => "per_curiam",
        }
    }

    /// Coerce an LLM-reported panel role; signatories and unknown roles are
    /// recorded as per-curiam participation.
    pub fn coerce(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "author" | "authoring" => JudgeRole::Author,
            "concurring" | "concur" => JudgeRole::Concurring,
            "dissenting" | "dissent" => JudgeRole::Dissenting,
            _ => JudgeRole::PerCuriam,
        }
    }
}

/// Which side advanced an argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArgumentSide {
    Appellant,
    Respondent,
    Amicus,
}

impl ArgumentSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArgumentSide::Appellant => "appellant",
            ArgumentSide::Respondent => "respondent",
            ArgumentSide::Amicus => "amicus",
        }
    }
}

/// Relationship of a cited case to the citing opinion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CitationRelationship {
    Cites,
    Distinguishes,
    Overrules,
    Follows,
    Affirms,
    Reverses,
    Discusses,
}

impl CitationRelationship {
    pub fn as_str(&self) -> &'static str {
        match self {
            CitationRelationship::Cites => "cites",
            CitationRelationship::Distinguishes => "distinguishes",
            CitationRelationship::Overrules => "overrules",
            CitationRelationship::Follows => "follows",
            CitationRelationship::Affirms => "affirms",
            CitationRelationship::Reverses => "reverses",
            CitationRelationship::Discusses => "discusses",
        }
    }

    /// Coerce the LLM vocabulary (which includes `relied_upon`, `cited`,
    /// `distinguished`, `overruled`) onto the schema vocabulary; anything
    /// unrecognized is a plain citation.
    pub fn coerce(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "distinguishes" | "distinguished" => CitationRelationship::Distinguishes,
            "overrules" | "overruled" => CitationRelationship::Overrules,
            "follows" | "followed" | "relied_upon" | "relied upon" => CitationRelationship::Follows,
            "affirms" | "affirmed" => CitationRelationship::Affirms,
            "reverses" | "reversed" => CitationRelationship::Reverses,
            "discusses" | "discussed" => CitationRelationship::Discusses,
            _ => CitationRelationship::Cites,
        }
    }
}

/// How load-bearing a citation is for the opinion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CitationImportance {
    Primary,
    Secondary,
    Passing,
}

impl CitationImportance {
    pub fn as_str(&self) -> &'static str {
        match self {
            CitationImportance::Primary => "primary",
            CitationImportance::Secondary => "secondary",
            CitationImportance::Passing => "passing",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "primary" => Some(CitationImportance::Primary),
            "secondary" => Some(CitationImportance::Secondary),
            "passing" => Some(CitationImportance::Passing),
            _ => None,
        }
    }
}

/// Section labels assigned by the chunker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Section {
    Header,
    Parties,
    Procedural,
    Facts,
    Analysis,
    Holding,
    Custody,
    Support,
    Property,
    Fees,
    Content,
}

impl Section {
    pub fn as_str(&self) -> &'static str {
        match self {
            Section::Header => "HEADER",
            Section::Parties => "PARTIES",
            Section::Procedural => "PROCEDURAL",
            Section::Facts => "FACTS",
            Section::Analysis => "ANALYSIS",
            Section::Holding => "HOLDING",
            Section::Custody => "CUSTODY",
            Section::Support => "SUPPORT",
            Section::Property => "PROPERTY",
            Section::Fees => "FEES",
            Section::Content => "CONTENT",
        }
    }

    /// Sections worth embedding under the `important` chunk-embedding mode
    pub fn is_important(&self) -> bool {
        matches!(self, Section::Facts | Section::Analysis | Section::Holding)
    }
}

/// Level of a legal-taxonomy node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaxonomyLevel {
    CaseType,
    Category,
    Subcategory,
}

impl TaxonomyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaxonomyLevel::CaseType => "case_type",
            TaxonomyLevel::Category => "category",
            TaxonomyLevel::Subcategory => "subcategory",
        }
    }
}

/// Chunk-embedding policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkEmbeddingMode {
    All,
    Important,
    None,
}

impl ChunkEmbeddingMode {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "all" => Some(ChunkEmbeddingMode::All),
            "important" => Some(ChunkEmbeddingMode::Important),
            "none" => Some(ChunkEmbeddingMode::None),
            _ => None,
        }
    }
}

/// Phrase-filter strictness
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhraseFilterMode {
    Strict,
    Relaxed,
}

impl PhraseFilterMode {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "strict" => Some(PhraseFilterMode::Strict),
            "relaxed" => Some(PhraseFilterMode::Relaxed),
            _ => None,
        }
    }
}

/// Party as extracted from the opinion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedParty {
    pub name: String,
    /// Appellate role, optionally annotated with the trial role
    pub legal_role: String,
    pub personal_role: Option<String>,
}

/// Counsel of record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedAttorney {
    pub name: String,
    pub firm: Option<String>,
    pub representing_role: Option<String>,
}

/// Panel member with role
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedJudge {
    pub name: String,
    pub role: JudgeRole,
}

/// Precedent citation edge (textual; target resolution is out of scope)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedCitation {
    pub full_citation: String,
    pub relationship: CitationRelationship,
    pub importance: Option<CitationImportance>,
}

/// A distinct legal issue with its decision
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedIssue {
    /// Top-level taxonomy node ("Criminal", "Family", ...)
    pub case_type: String,
    /// Specific topic under the case type ("Sentencing", "Parenting Plan")
    pub category: String,
    /// Optional finer detail ("Exceptional Sentence")
    pub subcategory: Option<String>,
    pub summary: String,
    pub decision_summary: Option<String>,
    pub outcome: Option<IssueOutcome>,
    pub winner_legal_role: Option<String>,
    pub winner_personal_role: Option<String>,
    /// RCW citations tied to this issue
    pub rcw_references: Vec<String>,
    pub appellant_argument: Option<String>,
    pub respondent_argument: Option<String>,
}

/// Structured case facts extracted by the LLM, after validation and coercion
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractedCase {
    pub summary: Option<String>,
    pub case_type: Option<String>,
    pub county: Option<String>,
    pub trial_court: Option<String>,
    pub trial_judge: Option<String>,
    pub source_docket_number: Option<String>,
    pub appeal_outcome: Option<IssueOutcome>,
    pub outcome_detail: Option<String>,
    pub winner_legal_role: Option<String>,
    pub winner_personal_role: Option<String>,
    pub opinion_filed_date: Option<NaiveDate>,
    pub parties: Vec<ExtractedParty>,
    pub attorneys: Vec<ExtractedAttorney>,
    pub judges: Vec<ExtractedJudge>,
    pub citations: Vec<ExtractedCitation>,
    /// Raw RCW statute citations cited anywhere in the opinion
    pub statutes: Vec<String>,
    pub issues: Vec<ExtractedIssue>,
}

/// Metadata-sheet row, parsed and normalized
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseMetadata {
    /// Court-assigned case-file identifier as printed (e.g. "69423-5")
    pub case_file_id: String,
    pub title: String,
    pub court_level: CourtLevel,
    /// Appellate division ("Division II") when applicable
    pub district: Option<String>,
    pub county: Option<String>,
    pub decision_year: Option<i32>,
    pub decision_month: Option<i32>,
    pub publication_status: PublicationStatus,
    pub opinion_type: Option<String>,
    pub appeal_published_date: Option<NaiveDate>,
}

/// Canonical case record: metadata-sheet fields merged with LLM fields,
/// ready for the single-transaction upsert.
#[derive(Debug, Clone)]
pub struct CaseRecord {
    pub case_file_id: String,
    pub case_file_id_normalized: String,
    pub title: String,
    pub court_level: CourtLevel,
    /// Derived human-readable court name used for the court dimension row
    pub court_name: Option<String>,
    pub district: Option<String>,
    pub county: Option<String>,
    pub docket_number: Option<String>,
    pub decision_year: Option<i32>,
    pub decision_month: Option<i32>,
    pub appeal_published_date: Option<NaiveDate>,
    pub publication_status: PublicationStatus,
    pub opinion_type: Option<String>,
    pub full_text: String,
    pub source_file: String,
    pub extraction_timestamp: DateTime<Utc>,
    pub extracted: ExtractedCase,
}

impl CaseRecord {
    /// Text embedded at case level: title plus extraction summary
    pub fn case_level_embedding_text(&self) -> String {
        match &self.extracted.summary {
            Some(summary) => format!("{}\n\n{}", self.title, summary),
            None => self.title.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_court_level_parse() {
        assert_eq!(CourtLevel::parse("Supreme Court Opinion"), Some(CourtLevel::SupremeCourt));
        assert_eq!(
            CourtLevel::parse("court of appeals division ii"),
            Some(CourtLevel::CourtOfAppeals)
        );
        assert_eq!(CourtLevel::parse("traffic"), None);
    }

    #[test]
    fn test_issue_outcome_coercion() {
        assert_eq!(IssueOutcome::coerce("Affirmed"), IssueOutcome::Affirmed);
        assert_eq!(IssueOutcome::coerce("REVERSED"), IssueOutcome::Reversed);
        // Unknown vocabulary coerces to the neutral default
        assert_eq!(IssueOutcome::coerce("affirmed in part"), IssueOutcome::Mixed);
        assert_eq!(IssueOutcome::coerce("granted"), IssueOutcome::Mixed);
    }

    #[test]
    fn test_judge_role_coercion() {
        assert_eq!(JudgeRole::coerce("Author"), JudgeRole::Author);
        assert_eq!(JudgeRole::coerce("Dissenting"), JudgeRole::Dissenting);
        assert_eq!(JudgeRole::coerce("Signatory"), JudgeRole::PerCuriam);
    }

    #[test]
    fn test_citation_relationship_coercion() {
        assert_eq!(CitationRelationship::coerce("relied_upon"), CitationRelationship::Follows);
        assert_eq!(CitationRelationship::coerce("distinguished"), CitationRelationship::Distinguishes);
        assert_eq!(CitationRelationship::coerce("cited"), CitationRelationship::Cites);
        assert_eq!(CitationRelationship::coerce("mentioned"), CitationRelationship::Cites);
    }

    #[test]
    fn test_publication_status_parse() {
        assert_eq!(PublicationStatus::parse("Published Opinion"), PublicationStatus::Published);
        assert_eq!(PublicationStatus::parse("UNPUBLISHED"), PublicationStatus::Unpublished);
        assert_eq!(
            PublicationStatus::parse("Published in Part"),
            PublicationStatus::PublishedInPart
        );
    }

    #[test]
    fn test_important_sections() {
        assert!(Section::Facts.is_important());
        assert!(Section::Analysis.is_important());
        assert!(Section::Holding.is_important());
        assert!(!Section::Header.is_important());
        assert!(!Section::Content.is_important());
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!(ChunkEmbeddingMode::parse("Important"), Some(ChunkEmbeddingMode::Important));
        assert_eq!(ChunkEmbeddingMode::parse("bogus"), None);
        assert_eq!(PhraseFilterMode::parse("relaxed"), Some(PhraseFilterMode::Relaxed));
    }
}
