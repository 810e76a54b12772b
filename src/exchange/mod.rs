//! Exchange validation: direction partitioning and subject-line hints
//!
//! Classifies every indexed address by communication direction and derives a
//! weak relationship hint from subject text. The hint is advisory; the
//! auto-classifier in [`crate::classify`] uses stronger signals when it has
//! them.

use crate::archive::{AddressRecord, ExchangeIndex};
use crate::classify::{Classification, ContactRole};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Communication direction observed for an address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExchangeStatus {
    /// Messages flow both ways: a genuine relationship
    Confirmed,
    /// The operator wrote, the contact never answered
    SenderOnly,
    /// The contact wrote, the operator never answered
    ReceiverOnly,
    /// Seen, but no direct flow with the operator
    None,
}

impl ExchangeStatus {
    pub fn of(record: &AddressRecord) -> Self {
        match (record.sent_to_contact > 0, record.received_from_contact > 0) {
            (true, true) => ExchangeStatus::Confirmed,
            (true, false) => ExchangeStatus::SenderOnly,
            (false, true) => ExchangeStatus::ReceiverOnly,
            (false, false) => ExchangeStatus::None,
        }
    }
}

/// Definitive subject phrases and the role each implies.
///
/// These are phrases that only occur in one kind of relationship, so a single
/// hit is treated as a full-confidence hint.
const SUBJECT_HINTS: &[(&str, ContactRole)] = &[
    ("rate lock", ContactRole::Client),
    ("loan application", ContactRole::Client),
    ("loan estimate", ContactRole::Client),
    ("closing disclosure", ContactRole::Client),
    ("pre-approval", ContactRole::Client),
    ("preapproval", ContactRole::Client),
    ("your loan", ContactRole::Client),
    ("loan docs", ContactRole::Client),
    ("new listing", ContactRole::Realtor),
    ("listing agreement", ContactRole::Realtor),
    ("showing request", ContactRole::Realtor),
    ("open house", ContactRole::Realtor),
    ("offer accepted", ContactRole::Realtor),
    ("escrow instructions", ContactRole::TitleEscrow),
    ("preliminary title report", ContactRole::TitleEscrow),
    ("prelim title", ContactRole::TitleEscrow),
    ("appraisal report", ContactRole::Appraiser),
    ("appraisal scheduled", ContactRole::Appraiser),
];

/// Per-run direction totals, reported by the validating stage
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExchangeSummary {
    pub confirmed: usize,
    pub sender_only: usize,
    pub receiver_only: usize,
    pub none: usize,
}

/// Validation output for one address
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeAssessment {
    pub status: ExchangeStatus,
    /// `min(sent, received)` - the weaker direction bounds the strength
    pub exchange_score: u64,
    /// Advisory relationship hint from subject phrases, if any matched
    pub subject_hint: Option<Classification>,
}

/// Runs direction partitioning and subject-hint derivation over the index
#[derive(Debug, Default, Clone, Copy)]
pub struct ExchangeValidator;

impl ExchangeValidator {
    pub fn new() -> Self {
        Self
    }

    pub fn assess(&self, record: &AddressRecord) -> ExchangeAssessment {
        ExchangeAssessment {
            status: ExchangeStatus::of(record),
            exchange_score: record.exchange_score(),
            subject_hint: subject_hint(&record.subjects),
        }
    }

    /// Assesses every record; returns the per-address map plus totals
    pub fn validate(
        &self,
        index: &ExchangeIndex,
    ) -> (BTreeMap<String, ExchangeAssessment>, ExchangeSummary) {
        let mut assessments = BTreeMap::new();
        let mut summary = ExchangeSummary::default();

        for (address, record) in &index.records {
            let assessment = self.assess(record);
            match assessment.status {
                ExchangeStatus::Confirmed => summary.confirmed += 1,
                ExchangeStatus::SenderOnly => summary.sender_only += 1,
                ExchangeStatus::ReceiverOnly => summary.receiver_only += 1,
                ExchangeStatus::None => summary.none += 1,
            }
            assessments.insert(address.clone(), assessment);
        }

        debug!(
            confirmed = summary.confirmed,
            sender_only = summary.sender_only,
            receiver_only = summary.receiver_only,
            "Exchange validation complete"
        );
        (assessments, summary)
    }
}

/// First definitive phrase found across the sampled subjects
pub fn subject_hint(subjects: &[String]) -> Option<Classification> {
    for subject in subjects {
        let lowered = subject.to_lowercase();
        for (phrase, role) in SUBJECT_HINTS {
            if lowered.contains(phrase) {
                return Some(Classification::new(*role, 1.0, *phrase));
            }
        }
    }
    None
}
