//! Role classification: signal types and the precedence rule engine

mod rules;

pub use rules::{AutoClassifier, ClassifierInput};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Role a contact plays relative to the operator's loan-origination practice
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactRole {
    /// Borrower / client
    Client,
    LoanOfficer,
    Processor,
    Underwriter,
    Closer,
    BranchManager,
    Realtor,
    TitleEscrow,
    Attorney,
    Insurance,
    Appraiser,
    Finance,
    HumanResources,
    Compliance,
    Operations,
    Admin,
    Marketing,
    It,
    /// Works at a lender, exact function unknown
    LenderEmployee,
    Unknown,
}

impl ContactRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContactRole::Client => "client",
            ContactRole::LoanOfficer => "loan_officer",
            ContactRole::Processor => "processor",
            ContactRole::Underwriter => "underwriter",
            ContactRole::Closer => "closer",
            ContactRole::BranchManager => "branch_manager",
            ContactRole::Realtor => "realtor",
            ContactRole::TitleEscrow => "title_escrow",
            ContactRole::Attorney => "attorney",
            ContactRole::Insurance => "insurance",
            ContactRole::Appraiser => "appraiser",
            ContactRole::Finance => "finance",
            ContactRole::HumanResources => "human_resources",
            ContactRole::Compliance => "compliance",
            ContactRole::Operations => "operations",
            ContactRole::Admin => "admin",
            ContactRole::Marketing => "marketing",
            ContactRole::It => "it",
            ContactRole::LenderEmployee => "lender_employee",
            ContactRole::Unknown => "unknown",
        }
    }

    /// Parses the snake_case form produced by `as_str`
    pub fn from_str_loose(s: &str) -> Option<ContactRole> {
        let normalized = s.trim().to_lowercase().replace([' ', '-'], "_");
        serde_json::from_value(serde_json::Value::String(normalized)).ok()
    }
}

impl fmt::Display for ContactRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A role decision together with the evidence that produced it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub role: ContactRole,
    /// 0.0 - 1.0
    pub confidence: f64,
    /// Names the evidence: a license number, a title keyword, a subject phrase
    pub signal: String,
}

impl Classification {
    pub fn new(role: ContactRole, confidence: f64, signal: impl Into<String>) -> Self {
        Self {
            role,
            confidence: confidence.clamp(0.0, 1.0),
            signal: signal.into(),
        }
    }

    /// The classification a user decision produces: final and beyond doubt
    pub fn user_decided(role: ContactRole) -> Self {
        Self::new(role, 1.0, "user_input")
    }

    pub fn is_user_decided(&self) -> bool {
        self.signal == "user_input"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_round_trip() {
        for role in [
            ContactRole::Client,
            ContactRole::LoanOfficer,
            ContactRole::TitleEscrow,
            ContactRole::HumanResources,
            ContactRole::It,
        ] {
            assert_eq!(ContactRole::from_str_loose(role.as_str()), Some(role));
        }
    }

    #[test]
    fn test_role_loose_parsing() {
        assert_eq!(
            ContactRole::from_str_loose("Loan Officer"),
            Some(ContactRole::LoanOfficer)
        );
        assert_eq!(
            ContactRole::from_str_loose("title-escrow"),
            Some(ContactRole::TitleEscrow)
        );
        assert_eq!(ContactRole::from_str_loose("astronaut"), None);
    }

    #[test]
    fn test_confidence_clamped() {
        let c = Classification::new(ContactRole::Client, 1.7, "x");
        assert_eq!(c.confidence, 1.0);
        let c = Classification::new(ContactRole::Client, -0.2, "x");
        assert_eq!(c.confidence, 0.0);
    }

    #[test]
    fn test_user_decided() {
        let c = Classification::user_decided(ContactRole::Realtor);
        assert_eq!(c.confidence, 1.0);
        assert_eq!(c.signal, "user_input");
        assert!(c.is_user_decided());
    }
}
