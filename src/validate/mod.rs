//! Final validation gate
//!
//! Decides, per contact, whether the enriched record is fit for export
//! (confirmed), needs human attention (unassigned), or is an automated
//! sender (spam). Blocking issues demote to unassigned; advisory issues
//! ride along on a confirmed contact without demoting it.

use crate::archive::AddressRecord;
use crate::classify::ContactRole;
use crate::enrich::{EnrichmentRecord, ReviewStatus};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Local-part prefixes that mark automated senders
const SPAM_LOCAL_PREFIXES: &[&str] = &[
    "noreply",
    "no-reply",
    "no_reply",
    "donotreply",
    "do-not-reply",
    "do_not_reply",
    "notifications",
    "notification",
    "alerts",
    "alert",
    "newsletter",
    "newsletters",
    "marketing",
    "mailer-daemon",
    "postmaster",
    "bounce",
    "bounces",
    "updates",
    "digest",
    "reminder",
];

/// Domain keywords that mark bulk-mail infrastructure
const SPAM_DOMAIN_KEYWORDS: &[&str] = &[
    "mailchimp",
    "constantcontact",
    "sendgrid",
    "mailgun",
    "salesforce",
    "marketo",
    "hubspot",
    "campaign-archive",
];

/// Corporate suffixes that betray a company name in a name field
const COMPANY_NAME_MARKERS: &[&str] = &[
    " inc", " llc", " corp", " company", " group", " team", " realty", " mortgage", " lending",
    " bank", " title", " escrow", " insurance", " associates",
];

/// A reason a contact failed or nearly failed the final gate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum GateIssue {
    /// No usable name survived enrichment
    MissingName,
    /// No role was ever assigned
    MissingRole,
    /// Role assigned below the export floor
    LowConfidence { confidence: f64 },
    /// No two-way exchange and the record is not exempt
    NoExchange,
    /// Advisory: the name field reads like a company
    NameLooksLikeCompany { name: String },
    /// Advisory: the phone fails structural checks
    SuspiciousPhone { phone: String },
}

impl GateIssue {
    /// Advisory issues annotate a confirmed contact; blocking ones demote it
    pub fn is_blocking(&self) -> bool {
        !matches!(
            self,
            GateIssue::NameLooksLikeCompany { .. } | GateIssue::SuspiciousPhone { .. }
        )
    }
}

impl fmt::Display for GateIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GateIssue::MissingName => write!(f, "no name found"),
            GateIssue::MissingRole => write!(f, "no role assigned"),
            GateIssue::LowConfidence { confidence } => {
                write!(f, "confidence {:.2} below export floor", confidence)
            }
            GateIssue::NoExchange => write!(f, "no two-way exchange"),
            GateIssue::NameLooksLikeCompany { name } => {
                write!(f, "name '{}' looks like a company", name)
            }
            GateIssue::SuspiciousPhone { phone } => {
                write!(f, "phone '{}' fails structural checks", phone)
            }
        }
    }
}

/// Which output partition a contact lands in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    Confirmed,
    Unassigned,
    Spam,
}

/// The gate's verdict for one contact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateOutcome {
    pub disposition: Disposition,
    pub issues: Vec<GateIssue>,
}

/// Applies the export gate to enriched records
pub struct FinalValidator {
    export_min_confidence: f64,
}

impl FinalValidator {
    pub fn new(export_min_confidence: f64) -> Self {
        Self {
            export_min_confidence,
        }
    }

    pub fn validate(
        &self,
        record: &EnrichmentRecord,
        address_record: Option<&AddressRecord>,
    ) -> GateOutcome {
        if record.review == ReviewStatus::UserDeleted
            || record.flagged_automated
            || is_spam_address(&record.address)
        {
            return GateOutcome {
                disposition: Disposition::Spam,
                issues: Vec::new(),
            };
        }

        let mut issues = Vec::new();

        match record.best_name() {
            None => issues.push(GateIssue::MissingName),
            Some(name) if name_looks_like_company(name) => {
                issues.push(GateIssue::NameLooksLikeCompany {
                    name: name.to_string(),
                });
            }
            Some(_) => {}
        }

        match &record.classification {
            None => issues.push(GateIssue::MissingRole),
            Some(c) if c.role == ContactRole::Unknown => issues.push(GateIssue::MissingRole),
            Some(c) if c.confidence < self.export_min_confidence => {
                issues.push(GateIssue::LowConfidence {
                    confidence: c.confidence,
                });
            }
            Some(_) => {}
        }

        let has_exchange = address_record.map(|r| r.has_exchange()).unwrap_or(false);
        if !has_exchange && !record.exchange_exempt {
            issues.push(GateIssue::NoExchange);
        }

        if let Some(phone) = record.best_phone() {
            if !valid_phone(phone) {
                issues.push(GateIssue::SuspiciousPhone {
                    phone: phone.to_string(),
                });
            }
        }

        let disposition = if issues.iter().any(GateIssue::is_blocking) {
            Disposition::Unassigned
        } else {
            Disposition::Confirmed
        };

        debug!(
            address = %record.address,
            ?disposition,
            issues = issues.len(),
            "Final gate decided"
        );

        GateOutcome {
            disposition,
            issues,
        }
    }
}

/// Matches automated-sender addresses by local-part prefix or bulk-mail domain
pub fn is_spam_address(address: &str) -> bool {
    let lowered = address.to_lowercase();
    let (local, domain) = match lowered.split_once('@') {
        Some(parts) => parts,
        None => return false,
    };

    if SPAM_LOCAL_PREFIXES.iter().any(|p| local.starts_with(p)) {
        return true;
    }
    SPAM_DOMAIN_KEYWORDS.iter().any(|k| domain.contains(k))
}

/// A person's name that carries a business suffix, or a single unspaced
/// token too long to be a given name, was probably a company all along.
pub fn name_looks_like_company(name: &str) -> bool {
    let lowered = name.to_lowercase();
    if COMPANY_NAME_MARKERS
        .iter()
        .any(|m| lowered.ends_with(m) || lowered.contains(&format!("{} ", m)))
    {
        return true;
    }
    !name.contains(' ') && name.chars().count() > 15
}

/// Ten digits, a plausible area code, and at least two distinct digits
pub fn valid_phone(phone: &str) -> bool {
    let digits: Vec<char> = phone.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() != 10 {
        return false;
    }
    if digits[0] == '0' || digits[0] == '1' {
        return false;
    }
    digits.iter().any(|&c| c != digits[0])
}
