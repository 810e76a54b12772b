//! Structured insight parsed from an LLM response

use super::error::LlmError;
use crate::classify::ContactRole;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use tracing::warn;

/// What the model said about the sender's own contact details
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SenderContact {
    pub name: Option<String>,
    #[serde(default)]
    pub name_source: Option<String>,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub title: Option<String>,
    pub nmls_license: Option<String>,
    pub agent_license: Option<String>,
    #[serde(default)]
    pub confidence: f32,
}

/// The model's relationship opinion for one email
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipGuess {
    pub role: String,
    #[serde(default)]
    pub confidence: f32,
    #[serde(default)]
    pub signals: Vec<String>,
}

impl RelationshipGuess {
    pub fn parsed_role(&self) -> ContactRole {
        ContactRole::from_str_loose(&self.role).unwrap_or(ContactRole::Unknown)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmailAnalysis {
    pub intent: Option<String>,
    pub sentiment: Option<String>,
    pub summary: Option<String>,
}

/// Full structured result for one analyzed email
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailInsight {
    pub is_human: bool,
    #[serde(default)]
    pub delete_reason: Option<String>,
    #[serde(default)]
    pub sender_contact: SenderContact,
    #[serde(default)]
    pub relationship: Option<RelationshipGuess>,
    #[serde(default)]
    pub email_analysis: EmailAnalysis,
    #[serde(default)]
    pub deal_info: Option<String>,
}

impl EmailInsight {
    /// Parses a raw LLM response, tolerating markdown fences and prose
    /// around the JSON object. Confidence values are clamped into range.
    pub fn parse(response: &str) -> Result<Self, LlmError> {
        let json_str = extract_json_from_response(response)?;

        let mut insight: EmailInsight =
            serde_json::from_str(&json_str).map_err(|e| LlmError::InvalidResponse {
                message: format!(
                    "{}: {}",
                    e,
                    json_str.chars().take(100).collect::<String>()
                ),
            })?;

        let raw = insight.sender_contact.confidence;
        insight.sender_contact.confidence = raw.clamp(0.0, 1.0);
        if insight.sender_contact.confidence != raw {
            warn!("Sender confidence {} out of range, clamped", raw);
        }
        if let Some(rel) = insight.relationship.as_mut() {
            rel.confidence = rel.confidence.clamp(0.0, 1.0);
        }

        Ok(insight)
    }
}

/// Pulls the JSON object out of a model response that may wrap it in
/// markdown fences or surrounding prose.
pub fn extract_json_from_response(response: &str) -> Result<String, LlmError> {
    let trimmed = response.trim();

    if trimmed.starts_with('{') && trimmed.ends_with('}') {
        return Ok(trimmed.to_string());
    }

    if trimmed.contains("```") {
        static FENCE: OnceLock<Regex> = OnceLock::new();
        let fence = FENCE
            .get_or_init(|| Regex::new(r"```(?:json)?\s*\n?([\s\S]*?)\n?```").unwrap());
        if let Some(captures) = fence.captures(trimmed) {
            if let Some(json_match) = captures.get(1) {
                let json = json_match.as_str().trim();
                if json.starts_with('{') && json.ends_with('}') {
                    return Ok(json.to_string());
                }
            }
        }
    }

    if let Some(start) = trimmed.find('{') {
        if let Some(end) = trimmed.rfind('}') {
            if start < end {
                return Ok(trimmed[start..=end].to_string());
            }
        }
    }

    Err(LlmError::InvalidResponse {
        message: "No JSON object found in response".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "is_human": true,
        "delete_reason": null,
        "sender_contact": {
            "name": "Jane Doe",
            "name_source": "signature",
            "phone": "5551234567",
            "company": "Summit Mortgage Group",
            "title": "Loan Officer",
            "nmls_license": "123456",
            "agent_license": null,
            "confidence": 0.9
        },
        "relationship": {
            "role": "loan_officer",
            "confidence": 0.85,
            "signals": ["signature says Loan Officer"]
        },
        "email_analysis": {
            "intent": "rate lock request",
            "sentiment": "neutral",
            "summary": "Jane asks to lock the rate on the Miller file."
        },
        "deal_info": "Miller file"
    }"#;

    #[test]
    fn test_parse_plain_json() {
        let insight = EmailInsight::parse(SAMPLE).unwrap();
        assert!(insight.is_human);
        assert_eq!(insight.sender_contact.name.as_deref(), Some("Jane Doe"));
        let rel = insight.relationship.unwrap();
        assert_eq!(rel.parsed_role(), ContactRole::LoanOfficer);
        assert_eq!(rel.confidence, 0.85);
    }

    #[test]
    fn test_parse_markdown_fenced() {
        let wrapped = format!("Here is the analysis:\n```json\n{}\n```\n", SAMPLE);
        let insight = EmailInsight::parse(&wrapped).unwrap();
        assert_eq!(insight.deal_info.as_deref(), Some("Miller file"));
    }

    #[test]
    fn test_parse_with_surrounding_prose() {
        let wrapped = format!("Sure! {} Hope that helps.", SAMPLE);
        let insight = EmailInsight::parse(&wrapped).unwrap();
        assert!(insight.is_human);
    }

    #[test]
    fn test_confidence_clamped() {
        let raw = r#"{"is_human": true, "sender_contact": {"confidence": 1.7}}"#;
        let insight = EmailInsight::parse(raw).unwrap();
        assert_eq!(insight.sender_contact.confidence, 1.0);
    }

    #[test]
    fn test_non_human_sender() {
        let raw = r#"{"is_human": false, "delete_reason": "automated newsletter"}"#;
        let insight = EmailInsight::parse(raw).unwrap();
        assert!(!insight.is_human);
        assert_eq!(insight.delete_reason.as_deref(), Some("automated newsletter"));
    }

    #[test]
    fn test_no_json_is_error() {
        assert!(EmailInsight::parse("I cannot analyze this email.").is_err());
    }

    #[test]
    fn test_unknown_role_string_maps_to_unknown() {
        let guess = RelationshipGuess {
            role: "wizard".to_string(),
            confidence: 0.5,
            signals: vec![],
        };
        assert_eq!(guess.parsed_role(), ContactRole::Unknown);
    }
}
