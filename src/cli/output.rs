//! Output formatting for the CLI
//!
//! JSON and YAML are straight serializations of the export documents;
//! the human format is a compact terminal summary.

use crate::archive::ScanSummary;
use crate::export::ExportPartition;
use crate::pipeline::{PipelineState, Stage};
use anyhow::{Context, Result};
use std::fmt::Write as _;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Yaml,
    Human,
}

pub struct OutputFormatter {
    format: OutputFormat,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn format_partition(&self, partition: &ExportPartition) -> Result<String> {
        match self.format {
            OutputFormat::Json => {
                serde_json::to_string_pretty(partition).context("Serializing partition to JSON")
            }
            OutputFormat::Yaml => {
                serde_yaml::to_string(partition).context("Serializing partition to YAML")
            }
            OutputFormat::Human => Ok(format_partition_human(partition)),
        }
    }

    pub fn format_status(&self, state: Option<&PipelineState>) -> Result<String> {
        match self.format {
            OutputFormat::Json => {
                serde_json::to_string_pretty(&state).context("Serializing state to JSON")
            }
            OutputFormat::Yaml => serde_yaml::to_string(&state).context("Serializing state to YAML"),
            OutputFormat::Human => Ok(format_status_human(state)),
        }
    }

    pub fn format_scan(&self, summary: &ScanSummary) -> Result<String> {
        match self.format {
            OutputFormat::Json => {
                serde_json::to_string_pretty(summary).context("Serializing scan summary to JSON")
            }
            OutputFormat::Yaml => {
                serde_yaml::to_string(summary).context("Serializing scan summary to YAML")
            }
            OutputFormat::Human => Ok(format!(
                "Scanned {} messages, {} addresses, {} confirmed exchanges ({} ms)",
                summary.messages, summary.addresses, summary.confirmed_exchanges, summary.scan_time_ms
            )),
        }
    }
}

fn format_partition_human(partition: &ExportPartition) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Run {}", partition.run_id);
    let _ = writeln!(
        out,
        "{} confirmed, {} unassigned, {} spam",
        partition.confirmed.len(),
        partition.unassigned.len(),
        partition.spam.len()
    );

    if !partition.confirmed.is_empty() {
        let _ = writeln!(out, "\nConfirmed contacts:");
        for contact in &partition.confirmed {
            let name = match (&contact.first_name, &contact.last_name) {
                (Some(f), Some(l)) => format!("{} {}", f, l),
                (Some(f), None) => f.clone(),
                _ => "(no name)".to_string(),
            };
            let _ = writeln!(
                out,
                "  {:30} {:24} {} ({:.2}, {})",
                contact.email, name, contact.role, contact.confidence, contact.signal
            );
        }
    }

    if !partition.unassigned.is_empty() {
        let _ = writeln!(out, "\nNeeds attention:");
        for contact in &partition.unassigned {
            let issues: Vec<String> = contact.issues.iter().map(|i| i.to_string()).collect();
            let _ = writeln!(out, "  {:30} {}", contact.email, issues.join(", "));
        }
    }

    out
}

fn format_status_human(state: Option<&PipelineState>) -> String {
    let Some(state) = state else {
        return "No run state found".to_string();
    };

    let mut out = String::new();
    let _ = writeln!(out, "Run {} - {:?}", state.run_id, state.status);
    let _ = writeln!(out, "Started {}", state.started_at.to_rfc3339());
    for stage in Stage::ALL {
        let mark = if state.is_complete(stage) { "done" } else { "pending" };
        let _ = writeln!(out, "  {:12} {}", stage.to_string(), mark);
    }
    let _ = writeln!(
        out,
        "{} contacts, {} enriched, {} reviews, {} failed LLM calls",
        state.contacts_total,
        state.contacts_enriched,
        state.reviews_requested,
        state.llm_calls_failed
    );
    for error in &state.errors {
        let _ = writeln!(out, "  error: {}", error);
    }
    out
}
