//! # LLM Structured Extraction
//!
//! ## Purpose
//! Drives the external LLM with a fixed extraction prompt over the (possibly
//! truncated) case text and parses its JSON reply into the validated
//! `ExtractedCase` model, coercing every enumerated field.
//!
//! ## Input/Output Specification
//! - **Input**: Full case text, LLM endpoint configuration
//! - **Output**: `ExtractedCase` with parties, attorneys, judges, issues,
//!   arguments, citations, and statute references
//! - **Failure**: one retry with a stricter reminder on unparseable JSON;
//!   further failure fails the case
//!
//! ## Truncation Policy
//! Texts above the character cap keep the first 40% (parties, court, facts),
//! a 35% sample from the document center (analysis, citations), and the last
//! 25% (disposition), joined with continuation markers.

use crate::config::LlmConfig;
use crate::errors::{PipelineError, Result};
use crate::extraction::{clean_text, parse_loose_date};
use crate::model::{
    CitationImportance, CitationRelationship, ExtractedAttorney, ExtractedCase, ExtractedCitation,
    ExtractedIssue, ExtractedJudge, ExtractedParty, IssueOutcome, JudgeRole,
};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

/// System prompt constraining the model to the schema vocabulary
const SYSTEM_PROMPT: &str = "\
You are an expert legal document analyzer for Washington State case law. \
Extract structured data from court opinions.

CRITICAL RULES - FOLLOW EXACTLY:
1. Return ONLY valid JSON. No explanations, no markdown, no text before or after the JSON.
2. Extract ONLY information explicitly stated in the document.
3. If information is not explicitly stated, return null. Do NOT infer or guess.
4. For enum fields, choose exactly ONE of the listed values or null.
5. Most appellate cases decide 2-5 distinct legal issues. Extract EACH one separately.
6. winner_legal_role is WHO WON (a party role such as Appellant or Respondent), never an outcome.";

/// Extraction prompt; `{text}` is replaced with the (truncated) case text
const EXTRACTION_PROMPT: &str = r#"Analyze this Washington State court opinion and extract structured data.

CASE TEXT:
{text}

Return exactly this JSON structure:
{
    "summary": "5-6 sentence summary: background facts, procedural history, issues, reasoning, disposition",
    "case_category": "ONE of: Criminal, Civil, Family, Administrative, Juvenile, Real Property, Tort Law, Contract, Constitutional, Employment, Probate, Other",
    "originating_court": {
        "county": "County name only, or null",
        "court_name": "Full lower court name, or null",
        "trial_judge": "Trial judge name, or null",
        "source_docket_number": "Lower court case number, or null"
    },
    "outcome": {
        "disposition": "ONE of: Affirmed, Reversed, Remanded, Dismissed, Mixed",
        "details": "Specific outcome details, or null",
        "prevailing_party": "ONE party role: Appellant, Respondent, Petitioner, Neither, or null",
        "winner_personal_role": "ONE of: Employee, Employer, Landlord, Tenant, Parent, Child, Insurer, Insured, or null"
    },
    "parties_parsed": [
        {
            "name": "Full party name",
            "appellate_role": "ONE of: Appellant, Respondent, Petitioner, Cross-Appellant",
            "trial_role": "ONE of: Plaintiff, Defendant, State, Intervenor, or null",
            "personal_role": "ONE of: Employee, Employer, Landlord, Tenant, Parent, Child, Patient, Doctor, Insurer, Insured, or null"
        }
    ],
    "legal_representation": [
        {
            "attorney_name": "Full attorney name, or null",
            "representing": "Role they represent (Appellant/Respondent), or null",
            "firm_or_agency": "Law firm, prosecutor's office, or agency, or null"
        }
    ],
    "judicial_panel": [
        {
            "judge_name": "Appellate judge last name",
            "role": "ONE of: Author, Concurring, Dissenting, Signatory"
        }
    ],
    "cases_cited": [
        {
            "full_citation": "Full citation as written",
            "relationship": "ONE of: relied_upon, distinguished, cited, overruled",
            "importance": "ONE of: primary, secondary, passing, or null"
        }
    ],
    "legal_analysis": {
        "key_statutes_cited": ["All specific RCWs cited, e.g. 'RCW 9.94A.525'"],
        "issues": [
            {
                "case_type": "ONE top-level type: Criminal, Civil, Family, Administrative, Constitutional, Juvenile, Probate, Real Property, Employment, Other",
                "category": "The specific legal topic. MUST differ from case_type (e.g. Criminal -> Sentencing)",
                "subcategory": "Finer detail within the category, or null",
                "question": "The specific legal question for THIS issue",
                "ruling": "How the court ruled on THIS issue",
                "outcome": "ONE of: Affirmed, Reversed, Remanded, Dismissed, Mixed",
                "winner_legal_role": "WHO WON this issue: Appellant, Respondent, Petitioner, State, Neither",
                "winner_personal_role": "Personal role of the winner, or null",
                "related_rcws": ["RCWs cited for THIS issue"],
                "appellant_argument": "Appellant's main argument on this issue (1-2 sentences), or null",
                "respondent_argument": "Respondent's main argument on this issue (1-2 sentences), or null"
            }
        ]
    },
    "procedural_dates": {
        "opinion_filed_date": "YYYY-MM-DD, or null"
    }
}"#;

/// Appended verbatim when the first reply fails to parse
const STRICT_RETRY_REMINDER: &str = "\n\nREMINDER: Your previous reply was not valid JSON. \
Return ONLY the JSON object, starting with '{' and ending with '}'. \
No markdown fences, no commentary, no trailing commas.";

const CONTINUATION_MARKER: &str = "\n\n[...document continues...]\n\n";

/// LLM extractor client
pub struct LlmExtractor {
    client: Client,
    config: LlmConfig,
}

/// Wire request for an Ollama-style generate endpoint
#[derive(serde::Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    system: &'a str,
    stream: bool,
    format: &'a str,
    options: GenerateOptions,
}

#[derive(serde::Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

impl LlmExtractor {
    pub fn new(config: LlmConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent("caselaw-pipeline/1.0")
            .build()
            .map_err(|e| PipelineError::Config {
                message: format!("failed to build LLM client: {e}"),
            })?;
        Ok(Self { client, config })
    }

    /// Extract structured case facts from full case text.
    ///
    /// On a parse failure the request is retried once with a stricter
    /// reminder; a second failure fails the case.
    pub async fn extract(&self, text: &str) -> Result<ExtractedCase> {
        let truncated = smart_truncate(text, self.config.max_text_chars);
        let prompt = EXTRACTION_PROMPT.replace("{text}", &truncated);

        let raw = self.call_model(&prompt).await?;
        match parse_response(&raw) {
            Ok(payload) => Ok(coerce_payload(payload)),
            Err(first_err) => {
                warn!("LLM reply unparseable ({first_err}), retrying with stricter reminder");
                let retry_prompt = format!("{prompt}{STRICT_RETRY_REMINDER}");
                let raw = self.call_model(&retry_prompt).await?;
                match parse_response(&raw) {
                    Ok(payload) => Ok(coerce_payload(payload)),
                    Err(second_err) => Err(PipelineError::LlmUnparseable {
                        details: second_err,
                    }),
                }
            }
        }
    }

    async fn call_model(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/api/generate", self.config.base_url.trim_end_matches('/'));
        debug!("Calling LLM {} ({} prompt chars)", self.config.model, prompt.len());

        let response = self
            .client
            .post(&url)
            .json(&GenerateRequest {
                model: &self.config.model,
                prompt,
                system: SYSTEM_PROMPT,
                stream: false,
                format: "json",
                options: GenerateOptions {
                    temperature: self.config.temperature,
                },
            })
            .send()
            .await
            .map_err(|e| PipelineError::LlmRequest {
                details: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(PipelineError::LlmRequest {
                details: format!(
                    "HTTP {}: {}",
                    response.status(),
                    response.text().await.unwrap_or_default()
                ),
            });
        }

        let body: GenerateResponse = response.json().await.map_err(|e| PipelineError::LlmRequest {
            details: format!("malformed generate response: {e}"),
        })?;
        Ok(body.response)
    }
}

/// Keep the first 40%, a 35% middle sample, and the last 25% of the cap when
/// the text exceeds it: headers carry parties and facts, the center carries
/// analysis, the tail carries the disposition.
pub fn smart_truncate(text: &str, max_chars: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= max_chars {
        return text.to_string();
    }

    let header_size = max_chars * 40 / 100;
    let footer_size = max_chars * 25 / 100;
    let middle_size = max_chars - header_size - footer_size;

    let header: String = chars[..header_size].iter().collect();
    let footer: String = chars[chars.len() - footer_size..].iter().collect();
    let middle_start = chars.len() / 2 - middle_size / 2;
    let middle: String = chars[middle_start..middle_start + middle_size].iter().collect();

    info!(
        "Smart truncation applied: {} chars (header={}, middle={}, footer={})",
        max_chars, header_size, middle_size, footer_size
    );
    format!("{header}{CONTINUATION_MARKER}{middle}{CONTINUATION_MARKER}{footer}")
}

// ---------------------------------------------------------------------------
// Wire payload: lenient mirror of the prompt's JSON structure
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub(crate) struct LlmPayload {
    summary: Option<String>,
    case_category: Option<String>,
    #[serde(default)]
    originating_court: OriginatingCourt,
    #[serde(default)]
    outcome: OutcomeBlock,
    #[serde(default)]
    parties_parsed: Vec<PartyEntry>,
    #[serde(default)]
    legal_representation: Vec<RepresentationEntry>,
    #[serde(default)]
    judicial_panel: Vec<PanelEntry>,
    #[serde(default)]
    cases_cited: Vec<CitationEntry>,
    #[serde(default)]
    legal_analysis: LegalAnalysis,
    #[serde(default)]
    procedural_dates: ProceduralDates,
}

#[derive(Debug, Default, Deserialize)]
struct OriginatingCourt {
    county: Option<String>,
    court_name: Option<String>,
    trial_judge: Option<String>,
    source_docket_number: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OutcomeBlock {
    disposition: Option<String>,
    details: Option<String>,
    prevailing_party: Option<String>,
    winner_personal_role: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PartyEntry {
    name: Option<String>,
    appellate_role: Option<String>,
    trial_role: Option<String>,
    personal_role: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RepresentationEntry {
    attorney_name: Option<String>,
    representing: Option<String>,
    firm_or_agency: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PanelEntry {
    judge_name: Option<String>,
    role: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CitationEntry {
    full_citation: Option<String>,
    relationship: Option<String>,
    importance: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LegalAnalysis {
    #[serde(default)]
    key_statutes_cited: Vec<String>,
    #[serde(default)]
    issues: Vec<IssueEntry>,
}

#[derive(Debug, Deserialize)]
struct IssueEntry {
    case_type: Option<String>,
    category: Option<String>,
    subcategory: Option<String>,
    question: Option<String>,
    #[serde(alias = "summary")]
    issue_summary: Option<String>,
    ruling: Option<String>,
    outcome: Option<String>,
    winner_legal_role: Option<String>,
    winner_personal_role: Option<String>,
    #[serde(default, alias = "rcw_references")]
    related_rcws: Vec<String>,
    appellant_argument: Option<String>,
    respondent_argument: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ProceduralDates {
    opinion_filed_date: Option<String>,
}

/// Parse the model reply into the wire payload, applying the deterministic
/// repairs models commonly need: markdown fences, prose around the object,
/// trailing commas.
pub(crate) fn parse_response(raw: &str) -> std::result::Result<LlmPayload, String> {
    let mut text = raw.trim();

    if let Some(stripped) = text.strip_prefix("```json") {
        text = stripped;
    } else if let Some(stripped) = text.strip_prefix("```") {
        text = stripped;
    }
    if let Some(stripped) = text.strip_suffix("```") {
        text = stripped;
    }
    let text = text.trim();

    let start = text.find('{').ok_or_else(|| "no JSON object in reply".to_string())?;
    let end = text.rfind('}').ok_or_else(|| "reply truncated: no closing brace".to_string())?;
    if end < start {
        return Err("reply truncated: no closing brace".to_string());
    }
    let json_str = &text[start..=end];

    match serde_json::from_str(json_str) {
        Ok(payload) => Ok(payload),
        Err(first) => {
            let repaired = strip_trailing_commas(json_str);
            serde_json::from_str(&repaired).map_err(|_| first.to_string())
        }
    }
}

/// Remove `,` immediately preceding `}` or `]`, outside string literals
fn strip_trailing_commas(json: &str) -> String {
    let mut out = String::with_capacity(json.len());
    let mut in_string = false;
    let mut escaped = false;
    let chars: Vec<char> = json.chars().collect();

    for (i, &c) in chars.iter().enumerate() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            ',' => {
                let next_meaningful = chars[i + 1..].iter().find(|c| !c.is_whitespace());
                if !matches!(next_meaningful, Some('}') | Some(']')) {
                    out.push(c);
                }
            }
            _ => out.push(c),
        }
    }
    out
}

/// Coerce the lenient wire payload into the validated model
pub(crate) fn coerce_payload(payload: LlmPayload) -> ExtractedCase {
    let mut case = ExtractedCase {
        summary: clean_text(payload.summary),
        case_type: clean_text(payload.case_category),
        county: clean_text(payload.originating_court.county),
        trial_court: clean_text(payload.originating_court.court_name),
        trial_judge: clean_text(payload.originating_court.trial_judge),
        source_docket_number: clean_text(payload.originating_court.source_docket_number),
        appeal_outcome: clean_text(payload.outcome.disposition)
            .map(|raw| IssueOutcome::coerce(&raw)),
        outcome_detail: clean_text(payload.outcome.details),
        winner_legal_role: clean_text(payload.outcome.prevailing_party),
        winner_personal_role: clean_text(payload.outcome.winner_personal_role),
        opinion_filed_date: clean_text(payload.procedural_dates.opinion_filed_date)
            .and_then(|raw| parse_loose_date(&raw)),
        ..ExtractedCase::default()
    };

    for entry in payload.parties_parsed {
        let Some(name) = clean_text(entry.name) else {
            continue;
        };
        let appellate = clean_text(entry.appellate_role).unwrap_or_else(|| "Unknown".to_string());
        let legal_role = match clean_text(entry.trial_role) {
            Some(trial) => format!("{appellate} ({trial})"),
            None => appellate,
        };
        case.parties.push(ExtractedParty {
            name,
            legal_role,
            personal_role: clean_text(entry.personal_role),
        });
    }

    for entry in payload.legal_representation {
        let Some(name) = clean_text(entry.attorney_name) else {
            continue;
        };
        case.attorneys.push(ExtractedAttorney {
            name,
            firm: clean_text(entry.firm_or_agency),
            representing_role: clean_text(entry.representing),
        });
    }

    for entry in payload.judicial_panel {
        let Some(name) = clean_text(entry.judge_name) else {
            continue;
        };
        let role = clean_text(entry.role)
            .map(|raw| JudgeRole::coerce(&raw))
            .unwrap_or(JudgeRole::PerCuriam);
        case.judges.push(ExtractedJudge { name, role });
    }

    for entry in payload.cases_cited {
        let Some(full_citation) = clean_text(entry.full_citation) else {
            continue;
        };
        case.citations.push(ExtractedCitation {
            full_citation,
            relationship: clean_text(entry.relationship)
                .map(|raw| CitationRelationship::coerce(&raw))
                .unwrap_or(CitationRelationship::Cites),
            importance: clean_text(entry.importance)
                .and_then(|raw| CitationImportance::parse(&raw)),
        });
    }

    case.statutes = payload
        .legal_analysis
        .key_statutes_cited
        .into_iter()
        .filter_map(|s| clean_text(Some(s)))
        .collect();

    for entry in payload.legal_analysis.issues {
        let summary = clean_text(entry.question).or_else(|| clean_text(entry.issue_summary));
        let Some(summary) = summary else {
            continue;
        };
        case.issues.push(ExtractedIssue {
            case_type: clean_text(entry.case_type).unwrap_or_else(|| "Other".to_string()),
            category: clean_text(entry.category).unwrap_or_else(|| "General".to_string()),
            subcategory: clean_text(entry.subcategory),
            summary,
            decision_summary: clean_text(entry.ruling),
            outcome: clean_text(entry.outcome).map(|raw| IssueOutcome::coerce(&raw)),
            winner_legal_role: clean_text(entry.winner_legal_role),
            winner_personal_role: clean_text(entry.winner_personal_role),
            rcw_references: entry
                .related_rcws
                .into_iter()
                .filter_map(|s| clean_text(Some(s)))
                .collect(),
            appellant_argument: clean_text(entry.appellant_argument),
            respondent_argument: clean_text(entry.respondent_argument),
        });
    }

    case
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_smart_truncate_short_text_untouched() {
        let text = "short opinion text";
        assert_eq!(smart_truncate(text, 25_000), text);
    }

    #[test]
    fn test_smart_truncate_splits_40_35_25() {
        let text: String = std::iter::repeat('a')
            .take(40_000)
            .enumerate()
            .map(|(i, _)| char::from(b'a' + (i % 26) as u8))
            .collect();
        let out = smart_truncate(&text, 1_000);

        // Two continuation markers separate header, middle, and footer
        assert_eq!(out.matches("[...document continues...]").count(), 2);

        let header_size = 400;
        let footer_size = 250;
        assert!(out.starts_with(&text[..header_size]));
        assert!(out.ends_with(&text[text.len() - footer_size..]));
    }

    #[test]
    fn test_parse_response_plain_json() {
        let payload = parse_response(r#"{"summary": "A case.", "case_category": "Criminal"}"#)
            .expect("plain JSON parses");
        let case = coerce_payload(payload);
        assert_eq!(case.summary.as_deref(), Some("A case."));
        assert_eq!(case.case_type.as_deref(), Some("Criminal"));
    }

    #[test]
    fn test_parse_response_with_fences_and_prose() {
        let raw = "Here is the extraction:\n```json\n{\"summary\": \"S\"}\n```";
        assert!(parse_response(raw).is_ok());
    }

    #[test]
    fn test_parse_response_repairs_trailing_commas() {
        let raw = r#"{"summary": "S", "parties_parsed": [{"name": "A", "appellate_role": "Appellant",},],}"#;
        let payload = parse_response(raw).expect("trailing commas repaired");
        let case = coerce_payload(payload);
        assert_eq!(case.parties.len(), 1);
    }

    #[test]
    fn test_parse_response_rejects_non_json() {
        assert!(parse_response("I could not process this document.").is_err());
        assert!(parse_response("{\"summary\": \"truncated").is_err());
    }

    #[test]
    fn test_strip_trailing_commas_preserves_strings() {
        let json = r#"{"a": "x,}", "b": [1, 2,],}"#;
        let out = strip_trailing_commas(json);
        assert_eq!(out, r#"{"a": "x,}", "b": [1, 2]}"#);
    }

    #[test]
    fn test_coerce_full_payload() {
        let raw = r#"{
            "summary": "The court affirmed.",
            "case_category": "Family",
            "originating_court": {"county": "King", "trial_judge": "Judge Roe"},
            "outcome": {"disposition": "Affirmed", "prevailing_party": "Respondent"},
            "parties_parsed": [
                {"name": "Jane Doe", "appellate_role": "Appellant", "trial_role": "Plaintiff", "personal_role": "Parent"},
                {"name": null, "appellate_role": "Respondent"}
            ],
            "legal_representation": [
                {"attorney_name": "A. Counsel", "representing": "Appellant", "firm_or_agency": "Doe Law"}
            ],
            "judicial_panel": [
                {"judge_name": "Smith", "role": "Author"},
                {"judge_name": "Jones", "role": "Signatory"}
            ],
            "cases_cited": [
                {"full_citation": "State v. Smith, 150 Wn.2d 489 (2003)", "relationship": "relied_upon", "importance": "primary"}
            ],
            "legal_analysis": {
                "key_statutes_cited": ["RCW 26.09.187"],
                "issues": [
                    {
                        "case_type": "Family",
                        "category": "Parenting Plan",
                        "subcategory": "Residential Schedule",
                        "question": "Did the trial court abuse its discretion?",
                        "ruling": "No abuse of discretion.",
                        "outcome": "Affirmed",
                        "winner_legal_role": "Respondent",
                        "related_rcws": ["RCW 26.09.187"],
                        "appellant_argument": "The schedule ignored work shifts.",
                        "respondent_argument": "The findings were supported."
                    }
                ]
            },
            "procedural_dates": {"opinion_filed_date": "2025-01-16"}
        }"#;
        let case = coerce_payload(parse_response(raw).unwrap());

        assert_eq!(case.parties.len(), 1);
        assert_eq!(case.parties[0].legal_role, "Appellant (Plaintiff)");
        assert_eq!(case.attorneys.len(), 1);
        assert_eq!(case.judges.len(), 2);
        assert_eq!(case.judges[1].role, JudgeRole::PerCuriam);
        assert_eq!(case.citations[0].relationship, CitationRelationship::Follows);
        assert_eq!(case.citations[0].importance, Some(CitationImportance::Primary));
        assert_eq!(case.issues.len(), 1);
        assert_eq!(case.issues[0].outcome, Some(IssueOutcome::Affirmed));
        assert_eq!(case.issues[0].rcw_references, vec!["RCW 26.09.187"]);
        assert_eq!(
            case.opinion_filed_date,
            chrono::NaiveDate::from_ymd_opt(2025, 1, 16)
        );
        assert_eq!(case.appeal_outcome, Some(IssueOutcome::Affirmed));
    }
}
