//! Human-in-the-loop review seam
//!
//! The orchestrator never talks to a terminal directly; it hands a
//! `ReviewRequest` to whatever `ReviewHandler` the caller injected and
//! applies the decision. Tests inject scripted handlers the same way the
//! CLI injects an interactive one.

use crate::classify::{Classification, ContactRole};
use async_trait::async_trait;

/// What the reviewer sees about a below-threshold contact
#[derive(Debug, Clone)]
pub struct ReviewRequest {
    pub address: String,
    /// The classifier's best guess, if any
    pub proposed: Option<Classification>,
    pub name: Option<String>,
    pub title: Option<String>,
    pub company: Option<String>,
    pub exchange_score: u64,
    /// Sampled subject lines for context
    pub subjects: Vec<String>,
}

/// Field values the reviewer typed in to replace extracted ones
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldOverrides {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub title: Option<String>,
}

impl FieldOverrides {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.phone.is_none()
            && self.company.is_none()
            && self.title.is_none()
    }
}

/// The reviewer's verdict
#[derive(Debug, Clone, PartialEq)]
pub enum ReviewDecision {
    /// Take the proposal as-is
    Accept,
    /// Assign a different role and/or corrected field values. Overridden
    /// contacts are kept even without a two-way exchange.
    Override {
        role: ContactRole,
        fields: FieldOverrides,
    },
    /// Not a real contact; send to the spam partition
    Delete,
}

#[async_trait]
pub trait ReviewHandler: Send + Sync {
    async fn review(&self, request: &ReviewRequest) -> ReviewDecision;
}

/// Accepts every proposal without asking; used by `--auto-accept` runs
#[derive(Debug, Default, Clone, Copy)]
pub struct AutoAcceptHandler;

#[async_trait]
impl ReviewHandler for AutoAcceptHandler {
    async fn review(&self, _request: &ReviewRequest) -> ReviewDecision {
        ReviewDecision::Accept
    }
}
