//! The knowledge base: operator corrections the extractor learns from
//!
//! Append-only and persisted across runs. When an operator overrides a title
//! or company during review, the corrected text becomes a pattern that the
//! signature extractor consults before falling back to static tables. Never
//! pruned automatically.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Field families the knowledge base tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Title,
    Company,
    Phone,
}

/// One learned correction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearnedPattern {
    /// Lowercased text to look for in decoded bodies
    pub pattern: String,
    /// Address whose review produced this pattern
    pub source_address: String,
    pub learned_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KnowledgeBase {
    #[serde(default)]
    pub titles: Vec<LearnedPattern>,
    #[serde(default)]
    pub companies: Vec<LearnedPattern>,
    #[serde(default)]
    pub phones: Vec<LearnedPattern>,
    /// Total corrections ever learned, across all fields
    #[serde(default)]
    pub corrections_learned: u64,
}

impl KnowledgeBase {
    fn list(&self, kind: FieldKind) -> &Vec<LearnedPattern> {
        match kind {
            FieldKind::Title => &self.titles,
            FieldKind::Company => &self.companies,
            FieldKind::Phone => &self.phones,
        }
    }

    fn list_mut(&mut self, kind: FieldKind) -> &mut Vec<LearnedPattern> {
        match kind {
            FieldKind::Title => &mut self.titles,
            FieldKind::Company => &mut self.companies,
            FieldKind::Phone => &mut self.phones,
        }
    }

    /// Records a correction. Appends only; an identical pattern is not
    /// duplicated but the stats counter still moves.
    pub fn learn(&mut self, kind: FieldKind, pattern: &str, source_address: &str) {
        let pattern = pattern.trim().to_lowercase();
        if pattern.is_empty() {
            return;
        }
        self.corrections_learned += 1;

        let list = self.list_mut(kind);
        if list.iter().any(|p| p.pattern == pattern) {
            return;
        }
        debug!(kind = ?kind, pattern = %pattern, source = %source_address, "Learned correction pattern");
        list.push(LearnedPattern {
            pattern,
            source_address: source_address.to_string(),
            learned_at: Utc::now(),
        });
    }

    /// Returns the first learned pattern found in `text`, if any.
    ///
    /// Consulted by the signature extractor before its static tables, so a
    /// correction made once applies to every contact sharing the phrasing.
    pub fn consult(&self, kind: FieldKind, text: &str) -> Option<&str> {
        let lowered = text.to_lowercase();
        self.list(kind)
            .iter()
            .find(|p| lowered.contains(&p.pattern))
            .map(|p| p.pattern.as_str())
    }

    pub fn pattern_count(&self) -> usize {
        self.titles.len() + self.companies.len() + self.phones.len()
    }
}
