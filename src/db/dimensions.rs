//! # Dimension Service
//!
//! ## Purpose
//! Get-or-create for the low-cardinality lookup tables (case types, stage
//! types, document types, courts, statutes, the legal taxonomy). Every
//! `ensure` is an upsert on the natural key with a RETURNING clause, so
//! concurrent workers racing on the same key converge to a single id.
//!
//! ## Input/Output Specification
//! - **Input**: Natural keys (case-insensitive) inside the case transaction
//! - **Output**: Dimension row ids
//! - **Caching**: per-worker caches populated only after a successful upsert;
//!   no process-wide mutable state
//!
//! ## Invariant
//! No two rows in a dimension table share a natural key; the database unique
//! constraint resolves races.

use crate::errors::Result;
use crate::model::TaxonomyLevel;
use sqlx::PgConnection;
use std::collections::HashMap;
use tracing::debug;

/// Canonical category names for taxonomy resolution; the LLM reports
/// variations ("tort", "torts", "tort law") that must land on one node.
const CATEGORY_NORMALIZATION: [(&str, &str); 22] = [
    ("tort", "Tort Law"),
    ("tort law", "Tort Law"),
    ("torts", "Tort Law"),
    ("criminal", "Criminal Law"),
    ("criminal law", "Criminal Law"),
    ("civil", "Civil Procedure"),
    ("civil law", "Civil Procedure"),
    ("civil procedure", "Civil Procedure"),
    ("constitutional", "Constitutional Law"),
    ("constitutional law", "Constitutional Law"),
    ("administrative", "Administrative Law"),
    ("administrative law", "Administrative Law"),
    ("family", "Family Law"),
    ("family law", "Family Law"),
    ("domestic relations", "Family Law"),
    ("property", "Property Law"),
    ("property law", "Property Law"),
    ("real property", "Property Law"),
    ("contract", "Contract Law"),
    ("contracts", "Contract Law"),
    ("employment", "Employment Law"),
    ("labor law", "Employment Law"),
];

/// Normalize a category name to its canonical form
pub fn normalize_category(raw: &str) -> String {
    let trimmed = raw.trim();
    let lookup = trimmed.to_lowercase();
    CATEGORY_NORMALIZATION
        .iter()
        .find(|(variant, _)| *variant == lookup)
        .map(|(_, canonical)| canonical.to_string())
        .unwrap_or_else(|| trimmed.to_string())
}

/// Attributes of a document-type dimension row
#[derive(Debug, Clone, Copy)]
pub struct DocumentTypeAttrs {
    pub role: &'static str,
    pub has_decision: bool,
    pub is_adversarial: bool,
    pub processing_strategy: &'static str,
}

/// Attributes for appellate opinions (the only document type this pipeline
/// ingests)
pub const OPINION_DOCUMENT_TYPE: DocumentTypeAttrs = DocumentTypeAttrs {
    role: "court",
    has_decision: true,
    is_adversarial: false,
    processing_strategy: "case_outcome",
};

/// Per-worker dimension cache and upsert service
pub struct DimensionService {
    case_types: HashMap<String, i64>,
    stage_types: HashMap<String, i64>,
    document_types: HashMap<String, i64>,
    courts: HashMap<(String, String), i64>,
    statutes: HashMap<String, i64>,
    taxonomy: HashMap<(i64, String, &'static str), i64>,
}

impl DimensionService {
    pub fn new() -> Self {
        Self {
            case_types: HashMap::new(),
            stage_types: HashMap::new(),
            document_types: HashMap::new(),
            courts: HashMap::new(),
            statutes: HashMap::new(),
            taxonomy: HashMap::new(),
        }
    }

    /// Get or create a case type by name
    pub async fn ensure_case_type(&mut self, conn: &mut PgConnection, name: &str) -> Result<i64> {
        let key = name.trim().to_lowercase();
        if let Some(&id) = self.case_types.get(&key) {
            return Ok(id);
        }
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO case_types (name) VALUES ($1) \
             ON CONFLICT ((lower(name))) DO UPDATE SET name = case_types.name \
             RETURNING case_type_id",
        )
        .bind(name.trim())
        .fetch_one(conn)
        .await?;
        self.case_types.insert(key, id);
        debug!("Resolved case type '{}' -> {}", name, id);
        Ok(id)
    }

    /// Get or create a stage type by name
    pub async fn ensure_stage_type(&mut self, conn: &mut PgConnection, name: &str) -> Result<i64> {
        let key = name.trim().to_lowercase();
        if let Some(&id) = self.stage_types.get(&key) {
            return Ok(id);
        }
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO stage_types (name) VALUES ($1) \
             ON CONFLICT ((lower(name))) DO UPDATE SET name = stage_types.name \
             RETURNING stage_type_id",
        )
        .bind(name.trim())
        .fetch_one(conn)
        .await?;
        self.stage_types.insert(key, id);
        Ok(id)
    }

    /// Get or create a document type by name with its processing attributes
    pub async fn ensure_document_type(
        &mut self,
        conn: &mut PgConnection,
        name: &str,
        attrs: DocumentTypeAttrs,
    ) -> Result<i64> {
        let key = name.trim().to_lowercase();
        if let Some(&id) = self.document_types.get(&key) {
            return Ok(id);
        }
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO document_types (name, role, has_decision, is_adversarial, processing_strategy) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT ((lower(name))) DO UPDATE SET name = document_types.name \
             RETURNING document_type_id",
        )
        .bind(name.trim())
        .bind(attrs.role)
        .bind(attrs.has_decision)
        .bind(attrs.is_adversarial)
        .bind(attrs.processing_strategy)
        .fetch_one(conn)
        .await?;
        self.document_types.insert(key, id);
        Ok(id)
    }

    /// Get or create a court; the natural key is `(name, district)`
    pub async fn ensure_court(
        &mut self,
        conn: &mut PgConnection,
        name: &str,
        level: &str,
        district: Option<&str>,
        county: Option<&str>,
    ) -> Result<i64> {
        let key = (
            name.trim().to_lowercase(),
            district.unwrap_or("").trim().to_lowercase(),
        );
        if let Some(&id) = self.courts.get(&key) {
            return Ok(id);
        }
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO courts (name, level, district, county) VALUES ($1, $2, $3, $4) \
             ON CONFLICT ((lower(name)), (COALESCE(lower(district), ''))) \
             DO UPDATE SET name = courts.name \
             RETURNING court_id",
        )
        .bind(name.trim())
        .bind(level)
        .bind(district)
        .bind(county)
        .fetch_one(conn)
        .await?;
        self.courts.insert(key, id);
        debug!("Resolved court '{}' ({:?}) -> {}", name, district, id);
        Ok(id)
    }

    /// Get or create a statute; the natural key is `(jurisdiction, code)`
    pub async fn ensure_statute(
        &mut self,
        conn: &mut PgConnection,
        jurisdiction: &str,
        code: &str,
        title: Option<&str>,
        section: Option<&str>,
    ) -> Result<i64> {
        let key = format!("{}|{}", jurisdiction.to_lowercase(), code.to_lowercase());
        if let Some(&id) = self.statutes.get(&key) {
            return Ok(id);
        }
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO statutes (jurisdiction, code, title, section) VALUES ($1, $2, $3, $4) \
             ON CONFLICT (jurisdiction, (lower(code))) DO UPDATE SET code = statutes.code \
             RETURNING statute_id",
        )
        .bind(jurisdiction)
        .bind(code)
        .bind(title)
        .bind(section)
        .fetch_one(conn)
        .await?;
        self.statutes.insert(key, id);
        Ok(id)
    }

    /// Ensure the 3-level taxonomy path exists and return the deepest node.
    /// Category names are normalized to canonical forms before resolution.
    pub async fn ensure_taxonomy_path(
        &mut self,
        conn: &mut PgConnection,
        case_type: &str,
        category: &str,
        subcategory: Option<&str>,
    ) -> Result<i64> {
        let case_type_id = self
            .ensure_taxonomy_node(conn, None, case_type.trim(), TaxonomyLevel::CaseType)
            .await?;

        let category = normalize_category(category);
        let category_id = self
            .ensure_taxonomy_node(conn, Some(case_type_id), &category, TaxonomyLevel::Category)
            .await?;

        match subcategory.map(str::trim).filter(|s| !s.is_empty()) {
            Some(subcategory) => {
                self.ensure_taxonomy_node(
                    conn,
                    Some(category_id),
                    subcategory,
                    TaxonomyLevel::Subcategory,
                )
                .await
            }
            None => Ok(category_id),
        }
    }

    /// Upsert a single taxonomy node. The unique key treats a NULL parent as
    /// -1 so root-level names stay unique.
    async fn ensure_taxonomy_node(
        &mut self,
        conn: &mut PgConnection,
        parent_id: Option<i64>,
        name: &str,
        level: TaxonomyLevel,
    ) -> Result<i64> {
        let key = (parent_id.unwrap_or(-1), name.to_lowercase(), level.as_str());
        if let Some(&id) = self.taxonomy.get(&key) {
            return Ok(id);
        }
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO legal_taxonomy (parent_id, name, level) VALUES ($1, $2, $3) \
             ON CONFLICT ((COALESCE(parent_id, -1)), (lower(name)), level) \
             DO UPDATE SET name = legal_taxonomy.name \
             RETURNING taxonomy_id",
        )
        .bind(parent_id)
        .bind(name)
        .bind(level.as_str())
        .fetch_one(conn)
        .await?;
        self.taxonomy.insert(key, id);
        Ok(id)
    }
}

impl Default for DimensionService {
    fn default() -> Self {
        Self::new()
    }
}

/// Parsed RCW statute citation components
#[derive(Debug, Clone, PartialEq)]
pub struct StatuteCitation {
    pub code: String,
    pub title: String,
    pub section: String,
}

/// Parse a statute citation like "RCW 69.50.4013(1)" into components. The
/// canonical code (`RCW 69.50.4013`) is the dimension natural key; trailing
/// subsection parentheses are dropped from it.
pub fn parse_statute_citation(citation: &str) -> Option<StatuteCitation> {
    use regex::Regex;
    use std::sync::OnceLock;
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        Regex::new(r"(?i)^(RCW)\s+(\d+)\.([0-9A-Za-z.]+?)((?:\([^)]+\))+)?$").expect("rcw pattern")
    });

    let captures = pattern.captures(citation.trim())?;
    let title = captures[2].to_string();
    let section = captures[3].trim_end_matches('.').to_string();
    Some(StatuteCitation {
        code: format!("RCW {title}.{section}"),
        title,
        section,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_category() {
        assert_eq!(normalize_category("tort"), "Tort Law");
        assert_eq!(normalize_category("Torts"), "Tort Law");
        assert_eq!(normalize_category("criminal law"), "Criminal Law");
        // Unknown categories pass through trimmed
        assert_eq!(normalize_category("  Water Rights "), "Water Rights");
    }

    #[test]
    fn test_parse_statute_citation() {
        let parsed = parse_statute_citation("RCW 69.50.4013(1)").unwrap();
        assert_eq!(parsed.code, "RCW 69.50.4013");
        assert_eq!(parsed.title, "69");
        assert_eq!(parsed.section, "50.4013");

        let parsed = parse_statute_citation("RCW 9.94A.525").unwrap();
        assert_eq!(parsed.code, "RCW 9.94A.525");
        assert_eq!(parsed.title, "9");
        assert_eq!(parsed.section, "94A.525");

        let parsed = parse_statute_citation("rcw 42.17A.765(3)(a)").unwrap();
        assert_eq!(parsed.code, "RCW 42.17A.765");

        assert!(parse_statute_citation("WAC 388-14A-3200").is_none());
        assert!(parse_statute_citation("some words").is_none());
    }
}
