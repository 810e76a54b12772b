//! Enrichment records: provenance-tagged field candidates per address

use crate::classify::Classification;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Where a field value came from. Declaration order is precedence order:
/// a user correction beats everything, a domain heuristic beats nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    UserCorrection,
    Llm,
    RegexSignature,
    DomainHeuristic,
}

/// How convincing the signature block a value was pulled from looked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SignatureQuality {
    Excellent,
    Good,
    Fair,
    Poor,
    Garbage,
    #[default]
    Unknown,
}

/// One candidate value for a field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldCandidate {
    pub value: String,
    pub provenance: Provenance,
    pub quality: SignatureQuality,
}

impl FieldCandidate {
    pub fn new(value: impl Into<String>, provenance: Provenance, quality: SignatureQuality) -> Self {
        Self {
            value: value.into(),
            provenance,
            quality,
        }
    }

    pub fn corrected(value: impl Into<String>) -> Self {
        Self::new(value, Provenance::UserCorrection, SignatureQuality::Excellent)
    }
}

/// Whether and how a human has looked at this contact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    #[default]
    Unreviewed,
    /// Confidence cleared the threshold, no human needed
    AutoAccepted,
    /// A human accepted or overrode the candidate classification
    UserConfirmed,
    /// A human marked this address as not a real contact
    UserDeleted,
}

impl ReviewStatus {
    /// True once a decision exists; resumed runs skip these contacts
    pub fn is_settled(&self) -> bool {
        !matches!(self, ReviewStatus::Unreviewed)
    }
}

/// Everything learned about one address across all enrichment sources
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentRecord {
    pub address: String,
    #[serde(default)]
    pub names: Vec<FieldCandidate>,
    #[serde(default)]
    pub phones: Vec<FieldCandidate>,
    #[serde(default)]
    pub nmls_licenses: Vec<FieldCandidate>,
    #[serde(default)]
    pub agent_licenses: Vec<FieldCandidate>,
    #[serde(default)]
    pub companies: Vec<FieldCandidate>,
    #[serde(default)]
    pub titles: Vec<FieldCandidate>,
    /// Natural-language summary of recent correspondence, LLM-produced
    pub summary: Option<String>,
    /// Dominant intent of recent messages, LLM-produced
    pub intent: Option<String>,
    /// Role candidate from aggregated LLM calls, advisory
    pub llm_relationship: Option<Classification>,
    /// Advisory hint from subject phrases
    pub subject_hint: Option<Classification>,
    /// The final role decision for this contact, once made
    pub classification: Option<Classification>,
    #[serde(default)]
    pub review: ReviewStatus,
    /// Set only by an operator override; lets a contact skip the exchange gate
    #[serde(default)]
    pub exchange_exempt: bool,
    /// A majority of analyzed emails looked machine-generated
    #[serde(default)]
    pub flagged_automated: bool,
    /// Enrichment already ran for this contact; a resumed run skips it
    #[serde(default)]
    pub enriched: bool,
    pub updated_at: DateTime<Utc>,
}

impl EnrichmentRecord {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            names: Vec::new(),
            phones: Vec::new(),
            nmls_licenses: Vec::new(),
            agent_licenses: Vec::new(),
            companies: Vec::new(),
            titles: Vec::new(),
            summary: None,
            intent: None,
            llm_relationship: None,
            subject_hint: None,
            classification: None,
            review: ReviewStatus::default(),
            exchange_exempt: false,
            flagged_automated: false,
            enriched: false,
            updated_at: Utc::now(),
        }
    }

    /// Adds a candidate to a field list.
    ///
    /// First-non-null wins within a provenance: duplicates (case-insensitive)
    /// are dropped unless the newcomer carries strictly higher provenance, in
    /// which case it replaces the provenance tag on the existing entry.
    /// A `UserCorrection` already present is never displaced.
    pub fn push_candidate(list: &mut Vec<FieldCandidate>, candidate: FieldCandidate) {
        if let Some(existing) = list
            .iter_mut()
            .find(|c| c.value.eq_ignore_ascii_case(&candidate.value))
        {
            if candidate.provenance < existing.provenance {
                existing.provenance = candidate.provenance;
                existing.quality = candidate.quality;
            }
            return;
        }
        list.push(candidate);
    }

    /// Best value for a field: highest provenance first, then arrival order
    pub fn best(list: &[FieldCandidate]) -> Option<&FieldCandidate> {
        list.iter().min_by_key(|c| c.provenance)
    }

    pub fn best_value(list: &[FieldCandidate]) -> Option<&str> {
        Self::best(list).map(|c| c.value.as_str())
    }

    pub fn best_name(&self) -> Option<&str> {
        Self::best_value(&self.names)
    }

    pub fn best_phone(&self) -> Option<&str> {
        Self::best_value(&self.phones)
    }

    pub fn best_company(&self) -> Option<&str> {
        Self::best_value(&self.companies)
    }

    pub fn best_title(&self) -> Option<&str> {
        Self::best_value(&self.titles)
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// The persisted enrichment document: address → record
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnrichmentCache {
    pub records: BTreeMap<String, EnrichmentRecord>,
}

impl EnrichmentCache {
    pub fn record_mut(&mut self, address: &str) -> &mut EnrichmentRecord {
        self.records
            .entry(address.to_string())
            .or_insert_with(|| EnrichmentRecord::new(address))
    }

    pub fn record(&self, address: &str) -> Option<&EnrichmentRecord> {
        self.records.get(address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provenance_precedence_order() {
        assert!(Provenance::UserCorrection < Provenance::Llm);
        assert!(Provenance::Llm < Provenance::RegexSignature);
        assert!(Provenance::RegexSignature < Provenance::DomainHeuristic);
    }

    #[test]
    fn test_first_non_null_wins_within_provenance() {
        let mut list = Vec::new();
        EnrichmentRecord::push_candidate(
            &mut list,
            FieldCandidate::new("Acme Mortgage", Provenance::RegexSignature, SignatureQuality::Good),
        );
        EnrichmentRecord::push_candidate(
            &mut list,
            FieldCandidate::new("Other Corp", Provenance::RegexSignature, SignatureQuality::Good),
        );

        assert_eq!(EnrichmentRecord::best_value(&list), Some("Acme Mortgage"));
    }

    #[test]
    fn test_user_correction_overrides_later_arrivals_and_earlier_ones() {
        let mut list = Vec::new();
        EnrichmentRecord::push_candidate(
            &mut list,
            FieldCandidate::new("Loan Officer", Provenance::RegexSignature, SignatureQuality::Fair),
        );
        EnrichmentRecord::push_candidate(&mut list, FieldCandidate::corrected("Branch Manager"));

        assert_eq!(EnrichmentRecord::best_value(&list), Some("Branch Manager"));

        // A later regex value does not displace the correction
        EnrichmentRecord::push_candidate(
            &mut list,
            FieldCandidate::new("Underwriter", Provenance::RegexSignature, SignatureQuality::Good),
        );
        assert_eq!(EnrichmentRecord::best_value(&list), Some("Branch Manager"));
    }

    #[test]
    fn test_duplicate_value_upgrades_provenance_in_place() {
        let mut list = Vec::new();
        EnrichmentRecord::push_candidate(
            &mut list,
            FieldCandidate::new("555-1234", Provenance::RegexSignature, SignatureQuality::Poor),
        );
        EnrichmentRecord::push_candidate(
            &mut list,
            FieldCandidate::new("555-1234", Provenance::Llm, SignatureQuality::Good),
        );

        assert_eq!(list.len(), 1);
        assert_eq!(list[0].provenance, Provenance::Llm);
        assert_eq!(list[0].quality, SignatureQuality::Good);
    }

    #[test]
    fn test_duplicate_with_lower_provenance_is_dropped() {
        let mut list = Vec::new();
        EnrichmentRecord::push_candidate(&mut list, FieldCandidate::corrected("Jane Doe"));
        EnrichmentRecord::push_candidate(
            &mut list,
            FieldCandidate::new("jane doe", Provenance::Llm, SignatureQuality::Good),
        );

        assert_eq!(list.len(), 1);
        assert_eq!(list[0].provenance, Provenance::UserCorrection);
    }

    #[test]
    fn test_review_status_settled() {
        assert!(!ReviewStatus::Unreviewed.is_settled());
        assert!(ReviewStatus::AutoAccepted.is_settled());
        assert!(ReviewStatus::UserConfirmed.is_settled());
        assert!(ReviewStatus::UserDeleted.is_settled());
    }

    #[test]
    fn test_cache_record_mut_creates_once() {
        let mut cache = EnrichmentCache::default();
        cache.record_mut("a@b.com").summary = Some("hello".to_string());
        assert_eq!(cache.record("a@b.com").unwrap().summary.as_deref(), Some("hello"));
        assert_eq!(cache.records.len(), 1);
        cache.record_mut("a@b.com");
        assert_eq!(cache.records.len(), 1);
    }
}
