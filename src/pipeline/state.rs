//! Persisted run state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// The pipeline stages, in execution order
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Build or refresh the exchange index
    Indexing,
    /// Assess exchanges and select contacts
    Validating,
    /// Signature and LLM field extraction
    Enriching,
    /// Role assignment with human review
    Classifying,
    /// Final gate and export partition
    Exporting,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::Indexing,
        Stage::Validating,
        Stage::Enriching,
        Stage::Classifying,
        Stage::Exporting,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Indexing => "indexing",
            Stage::Validating => "validating",
            Stage::Enriching => "enriching",
            Stage::Classifying => "classifying",
            Stage::Exporting => "exporting",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Complete,
    Failed,
}

/// Everything a resumed run needs to know about the previous attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineState {
    pub run_id: String,
    pub status: RunStatus,
    /// Fingerprint the run was started against; a mismatch on resume
    /// forces a fresh index
    pub archive_fingerprint: String,
    pub completed_stages: BTreeSet<Stage>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub contacts_total: usize,
    #[serde(default)]
    pub contacts_enriched: usize,
    #[serde(default)]
    pub reviews_requested: usize,
    #[serde(default)]
    pub llm_calls_failed: usize,
    #[serde(default)]
    pub errors: Vec<String>,
}

impl PipelineState {
    pub fn new(archive_fingerprint: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            run_id: Uuid::new_v4().to_string(),
            status: RunStatus::Pending,
            archive_fingerprint: archive_fingerprint.into(),
            completed_stages: BTreeSet::new(),
            started_at: now,
            updated_at: now,
            contacts_total: 0,
            contacts_enriched: 0,
            reviews_requested: 0,
            llm_calls_failed: 0,
            errors: Vec::new(),
        }
    }

    pub fn is_complete(&self, stage: Stage) -> bool {
        self.completed_stages.contains(&stage)
    }

    pub fn mark_complete(&mut self, stage: Stage) {
        self.completed_stages.insert(stage);
        self.touch();
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// The first stage with work left, if any
    pub fn next_stage(&self) -> Option<Stage> {
        Stage::ALL.iter().copied().find(|s| !self.is_complete(*s))
    }
}
