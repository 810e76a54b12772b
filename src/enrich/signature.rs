//! Regex-layer signature extraction
//!
//! Scans decoded, quote-stripped bodies for structured contact fields. Every
//! match passes a structural-noise filter and an operator filter before it
//! counts: encoded blobs must not become "titles", and the operator's own
//! phone forwarded in a reply chain must never attach to a contact.

use super::body::{decode_body, strip_quoted};
use super::knowledge::{FieldKind, KnowledgeBase};
use super::record::SignatureQuality;
use crate::config::{normalize_phone, OperatorProfile};
use regex::Regex;
use std::sync::OnceLock;
use tracing::trace;

/// Lines from the end of a body considered signature territory
const SIGNATURE_REGION_LINES: usize = 12;

fn phone_pattern() -> &'static Regex {
    static P: OnceLock<Regex> = OnceLock::new();
    P.get_or_init(|| {
        Regex::new(r"(?:\+?1[\s.\-]*)?\(?([2-9]\d{2})\)?[\s.\-]?(\d{3})[\s.\-]?(\d{4})\b").unwrap()
    })
}

fn nmls_pattern() -> &'static Regex {
    static P: OnceLock<Regex> = OnceLock::new();
    P.get_or_init(|| Regex::new(r"(?i)\bNMLS\s*(?:ID)?\s*#?\s*:?\s*(\d{4,9})\b").unwrap())
}

fn agent_license_pattern() -> &'static Regex {
    static P: OnceLock<Regex> = OnceLock::new();
    P.get_or_init(|| {
        Regex::new(r"(?i)\b(?:DRE|BRE|CalBRE|CalDRE|RE\s*Lic(?:ense)?)\s*#?\s*:?\s*(\d{6,8})\b")
            .unwrap()
    })
}

fn title_pattern() -> &'static Regex {
    static P: OnceLock<Regex> = OnceLock::new();
    P.get_or_init(|| {
        Regex::new(
            r"(?i)\b(loan officer|loan originator|mortgage (?:advisor|consultant|banker)|loan processor|processor|underwriter|escrow officer|title officer|realtor|real estate (?:agent|broker)|broker associate|attorney at law|attorney|paralegal|appraiser|insurance agent|controller|staff accountant|accountant|office manager|branch manager|transaction coordinator|marketing (?:manager|coordinator)|recruiter|compliance officer)\b",
        )
        .unwrap()
    })
}

fn company_suffix_pattern() -> &'static Regex {
    static P: OnceLock<Regex> = OnceLock::new();
    P.get_or_init(|| {
        Regex::new(
            r"(?i)\b(?:Inc\.?|LLC|L\.L\.C\.?|Corp\.?|Corporation|Company|Group|Realty|Real Estate|Mortgage|Lending|Home Loans|Bank|Title|Escrow|Insurance|Law Office(?:s)?|Associates|Partners)\b",
        )
        .unwrap()
    })
}

fn encoded_blob_pattern() -> &'static Regex {
    static P: OnceLock<Regex> = OnceLock::new();
    P.get_or_init(|| Regex::new(r"^[A-Za-z0-9+/=]{20,}$").unwrap())
}

/// Everything the regex layer pulled out of one contact's sampled bodies
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedSignature {
    /// Normalized 10-digit phone numbers
    pub phones: Vec<String>,
    pub nmls_licenses: Vec<String>,
    pub agent_licenses: Vec<String>,
    pub companies: Vec<String>,
    pub titles: Vec<String>,
    pub quality: SignatureQuality,
}

impl ExtractedSignature {
    fn field_kinds_found(&self) -> usize {
        [
            !self.phones.is_empty(),
            !self.nmls_licenses.is_empty() || !self.agent_licenses.is_empty(),
            !self.companies.is_empty(),
            !self.titles.is_empty(),
        ]
        .iter()
        .filter(|found| **found)
        .count()
    }

    fn grade(&mut self, saw_noise: bool) {
        self.quality = match self.field_kinds_found() {
            4 => SignatureQuality::Excellent,
            3 => SignatureQuality::Good,
            2 => SignatureQuality::Fair,
            1 => SignatureQuality::Poor,
            0 if saw_noise => SignatureQuality::Garbage,
            _ => SignatureQuality::Unknown,
        };
    }
}

/// The regex signature layer
pub struct SignatureExtractor {
    operator: OperatorProfile,
}

impl SignatureExtractor {
    pub fn new(operator: OperatorProfile) -> Self {
        Self { operator }
    }

    /// Extracts candidate fields from raw messages sent by one contact.
    ///
    /// `knowledge` supplies operator-taught patterns that are consulted
    /// before the static tables.
    pub fn extract(&self, raw_messages: &[String], knowledge: &KnowledgeBase) -> ExtractedSignature {
        let mut out = ExtractedSignature::default();
        let mut saw_noise = false;

        for raw in raw_messages {
            let body = strip_quoted(&decode_body(raw));
            let region = signature_region(&body);

            self.extract_phones(&region, &mut out);
            self.extract_licenses(&region, &mut out);
            saw_noise |= self.extract_lines(&region, knowledge, &mut out);
        }

        out.grade(saw_noise);
        trace!(
            phones = out.phones.len(),
            titles = out.titles.len(),
            companies = out.companies.len(),
            quality = ?out.quality,
            "Signature extraction complete"
        );
        out
    }

    fn extract_phones(&self, region: &str, out: &mut ExtractedSignature) {
        for caps in phone_pattern().captures_iter(region) {
            let digits = normalize_phone(caps.get(0).map(|m| m.as_str()).unwrap_or_default());
            if digits.len() != 10 {
                continue;
            }
            if self.operator.owns_phone(&digits) {
                trace!(phone = %digits, "Skipping operator's own phone");
                continue;
            }
            push_unique(&mut out.phones, digits);
        }
    }

    fn extract_licenses(&self, region: &str, out: &mut ExtractedSignature) {
        for caps in nmls_pattern().captures_iter(region) {
            let number = caps[1].to_string();
            if !self.operator.owns_license(&number) {
                push_unique(&mut out.nmls_licenses, number);
            }
        }
        for caps in agent_license_pattern().captures_iter(region) {
            let number = caps[1].to_string();
            if !self.operator.owns_license(&number) {
                push_unique(&mut out.agent_licenses, number);
            }
        }
    }

    /// Line-oriented matching for titles and companies; returns whether any
    /// line looked like structural noise.
    fn extract_lines(
        &self,
        region: &str,
        knowledge: &KnowledgeBase,
        out: &mut ExtractedSignature,
    ) -> bool {
        let mut saw_noise = false;

        for line in region.lines() {
            let line = line.trim().trim_end_matches(['|', ',', ';']).trim();
            if line.is_empty() {
                continue;
            }
            if is_structural_noise(line) {
                saw_noise = true;
                continue;
            }

            // Learned patterns first, static tables second
            if let Some(learned) = knowledge.consult(FieldKind::Title, line) {
                push_unique(&mut out.titles, learned.to_string());
            } else if let Some(m) = title_pattern().find(line) {
                if line.len() <= 60 {
                    push_unique(&mut out.titles, m.as_str().to_string());
                }
            }

            if let Some(learned) = knowledge.consult(FieldKind::Company, line) {
                if !self.operator.owns_company(learned) {
                    push_unique(&mut out.companies, learned.to_string());
                }
                continue;
            }
            if company_suffix_pattern().is_match(line)
                && is_plausible_company_line(line)
                && !self.operator.owns_company(line)
            {
                push_unique(&mut out.companies, line.to_string());
            }
        }

        saw_noise
    }
}

/// The trailing non-empty lines of a body, where signature blocks live
fn signature_region(body: &str) -> String {
    let lines: Vec<&str> = body.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(SIGNATURE_REGION_LINES);
    lines[start..].join("\n")
}

/// Rejects values that are transport artifacts rather than human text
fn is_structural_noise(line: &str) -> bool {
    let lowered = line.to_lowercase();
    if lowered.starts_with("content-")
        || lowered.contains("charset=")
        || lowered.starts_with("--")
        || lowered.contains("boundary=")
    {
        return true;
    }
    if encoded_blob_pattern().is_match(line) {
        return true;
    }
    // Repeated-character runs (separators like ======== or ________)
    let mut run = 1;
    let mut prev = '\0';
    for c in line.chars() {
        if c == prev {
            run += 1;
            if run >= 6 && !c.is_whitespace() {
                return true;
            }
        } else {
            run = 1;
            prev = c;
        }
    }
    false
}

/// Multi-word, bounded length, contains vowels, no transport leftovers
fn is_plausible_company_line(line: &str) -> bool {
    let len = line.len();
    if !(3..=70).contains(&len) {
        return false;
    }
    if !line.contains(' ') {
        return false;
    }
    if line.contains('@') || line.contains("http") {
        return false;
    }
    line.chars().any(|c| "aeiouAEIOU".contains(c))
}

fn push_unique(list: &mut Vec<String>, value: String) {
    if !list.iter().any(|v| v.eq_ignore_ascii_case(&value)) {
        list.push(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(body: &str) -> String {
        format!("From: jane@summit.com\nContent-Type: text/plain\n\n{}", body)
    }

    fn extractor() -> SignatureExtractor {
        SignatureExtractor::new(OperatorProfile::default())
    }

    const SIGNATURE_BODY: &str = "\
Sounds good, see attached.

Jane Doe
Loan Officer | NMLS# 123456
Summit Mortgage Group
Direct: (555) 123-4567
";

    #[test]
    fn test_full_signature_extraction() {
        let sig = extractor().extract(&[message(SIGNATURE_BODY)], &KnowledgeBase::default());

        assert_eq!(sig.phones, vec!["5551234567".to_string()]);
        assert_eq!(sig.nmls_licenses, vec!["123456".to_string()]);
        assert_eq!(sig.titles, vec!["Loan Officer".to_string()]);
        assert_eq!(sig.companies, vec!["Summit Mortgage Group".to_string()]);
        assert_eq!(sig.quality, SignatureQuality::Excellent);
    }

    #[test]
    fn test_quoted_signature_does_not_contaminate() {
        // Message from A quoting B's full signature: only A's fields survive
        let body = "\
Thanks Bob!

Alice Green
Realtor | DRE# 0123456
Green Homes Realty

On Mon, Jan 8, 2024 at 9:00 AM Bob Jones <bob@summit.com> wrote:
> Bob Jones
> Loan Officer | NMLS# 999999
> Summit Mortgage Group
> (555) 999-0000
";
        let sig = extractor().extract(&[message(body)], &KnowledgeBase::default());

        assert_eq!(sig.agent_licenses, vec!["0123456".to_string()]);
        assert!(sig.nmls_licenses.is_empty());
        assert!(sig.phones.is_empty());
        assert_eq!(sig.titles, vec!["Realtor".to_string()]);
        assert_eq!(sig.companies, vec!["Green Homes Realty".to_string()]);
    }

    #[test]
    fn test_operator_values_never_attributed() {
        let mut operator = OperatorProfile::default();
        operator.phones.insert("5551234567".to_string());
        operator.nmls_licenses.insert("123456".to_string());
        operator.companies.insert("summit mortgage group".to_string());

        let sig = SignatureExtractor::new(operator)
            .extract(&[message(SIGNATURE_BODY)], &KnowledgeBase::default());

        assert!(sig.phones.is_empty());
        assert!(sig.nmls_licenses.is_empty());
        assert!(sig.companies.is_empty());
        // The title is not operator-identifying and survives
        assert_eq!(sig.titles, vec!["Loan Officer".to_string()]);
    }

    #[test]
    fn test_encoded_blob_rejected() {
        let body = "\
Jane

UEsDBBQAAAAIAO1dV1cAAAAAAAAAAAAAAAAJAAAAbG9jay5wZGZQSwUGAAAAAAEAAQA3AAAA
Content-Type: application/pdf
";
        let sig = extractor().extract(&[message(body)], &KnowledgeBase::default());
        assert!(sig.titles.is_empty());
        assert!(sig.companies.is_empty());
        assert_eq!(sig.quality, SignatureQuality::Garbage);
    }

    #[test]
    fn test_separator_runs_rejected() {
        let body = "Jane\n================\nAcme Mortgage LLC\n";
        let sig = extractor().extract(&[message(body)], &KnowledgeBase::default());
        assert_eq!(sig.companies, vec!["Acme Mortgage LLC".to_string()]);
    }

    #[test]
    fn test_single_token_company_rejected() {
        // Company lines must be multi-word
        let body = "Jane\nMortgageCo\n";
        let sig = extractor().extract(&[message(body)], &KnowledgeBase::default());
        assert!(sig.companies.is_empty());
    }

    #[test]
    fn test_phone_with_bad_area_code_rejected() {
        let body = "Jane\nCall me: (055) 123-4567\n";
        let sig = extractor().extract(&[message(body)], &KnowledgeBase::default());
        assert!(sig.phones.is_empty());
    }

    #[test]
    fn test_knowledge_base_consulted_before_static_tables() {
        let mut kb = KnowledgeBase::default();
        kb.learn(FieldKind::Title, "Transaction Coordinator", "amy@realty.com");

        let body = "Amy Smith\nTransaction Coordinator\nBlue Door Realty\n";
        let sig = extractor().extract(&[message(body)], &kb);
        assert_eq!(sig.titles, vec!["transaction coordinator".to_string()]);
    }

    #[test]
    fn test_quality_grades_degrade_with_fewer_fields() {
        let sig = extractor().extract(
            &[message("Jane\nLoan Officer\n")],
            &KnowledgeBase::default(),
        );
        assert_eq!(sig.quality, SignatureQuality::Poor);

        let sig = extractor().extract(
            &[message("Jane\nLoan Officer\nSummit Mortgage Group\n")],
            &KnowledgeBase::default(),
        );
        assert_eq!(sig.quality, SignatureQuality::Fair);

        let sig = extractor().extract(&[message("Nothing here.\n")], &KnowledgeBase::default());
        assert_eq!(sig.quality, SignatureQuality::Unknown);
    }

    #[test]
    fn test_multiple_messages_merge_without_duplicates() {
        let sig = extractor().extract(
            &[message(SIGNATURE_BODY), message(SIGNATURE_BODY)],
            &KnowledgeBase::default(),
        );
        assert_eq!(sig.phones.len(), 1);
        assert_eq!(sig.titles.len(), 1);
    }
}
