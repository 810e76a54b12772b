//! Export projection
//!
//! Projects the enrichment cache and exchange index into the final
//! three-way partition: CRM-ready confirmed contacts, a triage list
//! for unassigned ones, and the spam roll. The projection is pure:
//! exporting twice over unchanged inputs yields identical documents.

use crate::archive::{AddressRecord, ExchangeIndex};
use crate::enrich::{EnrichmentCache, EnrichmentRecord};
use crate::validate::{is_spam_address, Disposition, FinalValidator, GateIssue};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Subject samples carried per exported contact
const MAX_EXPORT_SUBJECTS: usize = 5;

/// A contact ready for CRM import
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CrmContact {
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub role: String,
    pub confidence: f64,
    /// Which evidence assigned the role
    pub signal: String,
    pub messages_sent: u64,
    pub messages_received: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_seen: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub subjects: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

/// An unresolved contact, annotated with what kept it out of the CRM set
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TriageContact {
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    pub issues: Vec<GateIssue>,
    pub messages_sent: u64,
    pub messages_received: u64,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub subjects: Vec<String>,
}

/// The complete export document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportPartition {
    pub run_id: String,
    pub generated_at: DateTime<Utc>,
    pub confirmed: Vec<CrmContact>,
    pub unassigned: Vec<TriageContact>,
    /// Addresses judged automated, with the reason when one is known
    pub spam: Vec<SpamEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpamEntry {
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ExportPartition {
    pub fn total(&self) -> usize {
        self.confirmed.len() + self.unassigned.len() + self.spam.len()
    }
}

/// Builds the partition from the final pipeline artifacts
pub struct Exporter {
    validator: FinalValidator,
}

impl Exporter {
    pub fn new(export_min_confidence: f64) -> Self {
        Self {
            validator: FinalValidator::new(export_min_confidence),
        }
    }

    /// Pure projection over the cache plus a sweep of the full exchange
    /// index, so automated senders reach the spam partition even when they
    /// were never promoted into enrichment (one-way `noreply@` traffic
    /// included). Iteration follows BTreeMap order on both walks, so
    /// repeated exports match byte for byte (modulo timestamps).
    pub fn export(
        &self,
        run_id: &str,
        cache: &EnrichmentCache,
        index: &ExchangeIndex,
    ) -> ExportPartition {
        let mut confirmed = Vec::new();
        let mut unassigned = Vec::new();
        let mut spam = Vec::new();

        for (address, record) in &cache.records {
            let address_record = index.record(address);
            let outcome = self.validator.validate(record, address_record);

            match outcome.disposition {
                Disposition::Confirmed => {
                    confirmed.push(project_crm(record, address_record));
                }
                Disposition::Unassigned => {
                    unassigned.push(project_triage(record, address_record, outcome.issues));
                }
                Disposition::Spam => {
                    spam.push(SpamEntry {
                        email: address.clone(),
                        reason: record.summary.clone(),
                    });
                }
            }
        }

        for address in index.records.keys() {
            if cache.records.contains_key(address) {
                continue;
            }
            if is_spam_address(address) {
                spam.push(SpamEntry {
                    email: address.clone(),
                    reason: Some("automated sender address".to_string()),
                });
            }
        }

        info!(
            confirmed = confirmed.len(),
            unassigned = unassigned.len(),
            spam = spam.len(),
            "Export partition built"
        );

        ExportPartition {
            run_id: run_id.to_string(),
            generated_at: Utc::now(),
            confirmed,
            unassigned,
            spam,
        }
    }
}

fn project_crm(record: &EnrichmentRecord, address_record: Option<&AddressRecord>) -> CrmContact {
    let (first_name, last_name) = split_name(record.best_name());
    let classification = record.classification.as_ref();

    CrmContact {
        email: record.address.clone(),
        first_name,
        last_name,
        phone: record.best_phone().map(str::to_string),
        company: record.best_company().map(str::to_string),
        title: record.best_title().map(str::to_string),
        role: classification
            .map(|c| c.role.to_string())
            .unwrap_or_else(|| "unknown".to_string()),
        confidence: classification.map(|c| c.confidence).unwrap_or(0.0),
        signal: classification
            .map(|c| c.signal.clone())
            .unwrap_or_default(),
        messages_sent: address_record.map(|r| r.sent_to_contact).unwrap_or(0),
        messages_received: address_record
            .map(|r| r.received_from_contact)
            .unwrap_or(0),
        first_seen: address_record.and_then(|r| r.first_seen),
        last_seen: address_record.and_then(|r| r.last_seen),
        subjects: address_record
            .map(|r| {
                r.subjects
                    .iter()
                    .take(MAX_EXPORT_SUBJECTS)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default(),
        summary: record.summary.clone(),
    }
}

fn project_triage(
    record: &EnrichmentRecord,
    address_record: Option<&AddressRecord>,
    issues: Vec<GateIssue>,
) -> TriageContact {
    let classification = record.classification.as_ref();
    TriageContact {
        email: record.address.clone(),
        name: record.best_name().map(str::to_string),
        role: classification.map(|c| c.role.to_string()),
        confidence: classification.map(|c| c.confidence),
        issues,
        messages_sent: address_record.map(|r| r.sent_to_contact).unwrap_or(0),
        messages_received: address_record
            .map(|r| r.received_from_contact)
            .unwrap_or(0),
        subjects: address_record
            .map(|r| {
                r.subjects
                    .iter()
                    .take(MAX_EXPORT_SUBJECTS)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default(),
    }
}

/// Splits a display name into first/last at the final space
fn split_name(name: Option<&str>) -> (Option<String>, Option<String>) {
    match name {
        Some(full) => match full.rsplit_once(' ') {
            Some((first, last)) => (Some(first.to_string()), Some(last.to_string())),
            None => (Some(full.to_string()), None),
        },
        None => (None, None),
    }
}
