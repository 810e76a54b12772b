//! Address records and the persisted exchange index

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-address aggregate built by the scanner and read by every later stage.
///
/// Records are keyed by normalized address, never deleted, only superseded by
/// a rescan. Co-recipient aliasing is deliberately not modeled: an address
/// appearing in the same `To:` line as another says nothing about the two
/// belonging to one person.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AddressRecord {
    /// Messages the operator sent to this address (To or Cc)
    pub sent_to_contact: u64,
    /// Messages this address sent to the operator
    pub received_from_contact: u64,
    /// Every message this address appeared in
    pub total_messages: u64,
    /// Timestamp of the earliest message seen, if any date parsed
    pub first_seen: Option<DateTime<Utc>>,
    /// Timestamp of the latest message seen
    pub last_seen: Option<DateTime<Utc>>,
    /// Sampled subject lines, capped by configuration
    #[serde(default)]
    pub subjects: Vec<String>,
    /// Whether any message involving this address carried an attachment
    #[serde(default)]
    pub has_attachments: bool,
    /// Best-known display name from a `From:` header
    pub name: Option<String>,
}

impl AddressRecord {
    /// True when a genuine two-way exchange exists
    pub fn has_exchange(&self) -> bool {
        self.sent_to_contact > 0 && self.received_from_contact > 0
    }

    /// Relationship strength: the weaker direction bounds the score
    pub fn exchange_score(&self) -> u64 {
        self.sent_to_contact.min(self.received_from_contact)
    }

    pub(crate) fn observe(
        &mut self,
        date: Option<DateTime<Utc>>,
        subject: Option<&str>,
        has_attachment: bool,
        max_subjects: usize,
    ) {
        self.total_messages += 1;
        self.has_attachments |= has_attachment;

        if let Some(date) = date {
            match self.first_seen {
                Some(first) if first <= date => {}
                _ => self.first_seen = Some(date),
            }
            match self.last_seen {
                Some(last) if last >= date => {}
                _ => self.last_seen = Some(date),
            }
        }

        if let Some(subject) = subject {
            let subject = subject.trim();
            if !subject.is_empty()
                && self.subjects.len() < max_subjects
                && !self.subjects.iter().any(|s| s == subject)
            {
                self.subjects.push(subject.to_string());
            }
        }
    }

    /// Accepts a display name only if it looks like a person-entered one:
    /// contains a space and is not itself an email address.
    pub(crate) fn observe_name(&mut self, candidate: &str) {
        if self.name.is_some() {
            return;
        }
        let candidate = candidate.trim().trim_matches('"').trim();
        if candidate.contains(' ') && !candidate.contains('@') {
            self.name = Some(candidate.to_string());
        }
    }
}

/// The exchange index: every address ever seen, plus the archive fingerprint
/// that decides whether a rescan is needed on resume.
///
/// A `BTreeMap` keeps serialization deterministic, which is what makes a
/// rescan of an unchanged archive byte-identical.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeIndex {
    /// sha256 over the archive bytes at scan time
    pub archive_fingerprint: String,
    pub built_at: DateTime<Utc>,
    pub message_count: u64,
    pub records: BTreeMap<String, AddressRecord>,
}

impl ExchangeIndex {
    pub fn new(archive_fingerprint: String) -> Self {
        Self {
            archive_fingerprint,
            built_at: Utc::now(),
            message_count: 0,
            records: BTreeMap::new(),
        }
    }

    pub fn record_mut(&mut self, address: &str) -> &mut AddressRecord {
        self.records.entry(normalize_address(address)).or_default()
    }

    pub fn record(&self, address: &str) -> Option<&AddressRecord> {
        self.records.get(&normalize_address(address))
    }

    /// Addresses with a confirmed two-way exchange, strongest first
    pub fn exchanged_addresses(&self) -> Vec<&str> {
        let mut confirmed: Vec<(&str, u64)> = self
            .records
            .iter()
            .filter(|(_, r)| r.has_exchange())
            .map(|(a, r)| (a.as_str(), r.exchange_score()))
            .collect();
        confirmed.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        confirmed.into_iter().map(|(a, _)| a).collect()
    }
}

/// Canonical form used as the record key everywhere
pub fn normalize_address(address: &str) -> String {
    address.trim().trim_matches(|c| c == '<' || c == '>').to_lowercase()
}
