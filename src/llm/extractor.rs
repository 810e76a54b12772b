//! Per-message insight extraction and cross-message aggregation

use super::LlmClient;
use super::insight::{EmailInsight, RelationshipGuess};
use super::prompt::{build_user_prompt, PromptEmail, SYSTEM_PROMPT};
use super::types::{ChatMessage, LlmRequest};
use crate::classify::ContactRole;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// A contact-level view merged from several per-email insights
#[derive(Debug, Clone, Default)]
pub struct AggregatedInsight {
    pub name: Option<(String, f32)>,
    pub phone: Option<(String, f32)>,
    pub company: Option<(String, f32)>,
    pub title: Option<(String, f32)>,
    pub nmls_license: Option<(String, f32)>,
    pub agent_license: Option<(String, f32)>,
    /// Majority-vote relationship across emails
    pub role: Option<(ContactRole, f32)>,
    pub signals: Vec<String>,
    pub intent: Option<String>,
    pub summary: Option<String>,
    pub deal_info: Option<String>,
    /// Majority of analyzed emails said the sender is automated
    pub looks_automated: bool,
    pub delete_reason: Option<String>,
    pub emails_analyzed: usize,
    pub emails_failed: usize,
}

impl AggregatedInsight {
    /// No insight at all, for contacts where every call failed
    pub fn is_empty(&self) -> bool {
        self.emails_analyzed == 0
    }
}

/// Drives the LLM over a contact's sampled emails and merges the results
pub struct InsightExtractor {
    client: Arc<dyn LlmClient>,
    /// Pause between calls so a local model is not hammered
    rate_limit: Duration,
    temperature: f32,
}

impl InsightExtractor {
    pub fn new(client: Arc<dyn LlmClient>, rate_limit: Duration) -> Self {
        Self {
            client,
            rate_limit,
            temperature: 0.1,
        }
    }

    /// Analyzes each email in turn. A failed call contributes nothing;
    /// the remaining emails still count.
    pub async fn analyze(&self, emails: &[PromptEmail<'_>]) -> AggregatedInsight {
        let mut insights = Vec::new();
        let mut failed = 0;

        for (i, email) in emails.iter().enumerate() {
            if i > 0 && !self.rate_limit.is_zero() {
                tokio::time::sleep(self.rate_limit).await;
            }

            let request = LlmRequest::new(vec![
                ChatMessage::system(SYSTEM_PROMPT),
                ChatMessage::user(build_user_prompt(email)),
            ])
            .with_temperature(self.temperature);

            match self.client.chat(request).await {
                Ok(response) => match EmailInsight::parse(&response.content) {
                    Ok(insight) => insights.push(insight),
                    Err(e) => {
                        warn!(sender = %email.sender, "Unparseable LLM response: {}", e);
                        failed += 1;
                    }
                },
                Err(e) => {
                    warn!(sender = %email.sender, "LLM call failed: {}", e);
                    failed += 1;
                }
            }
        }

        debug!(
            analyzed = insights.len(),
            failed, "Insight extraction finished"
        );

        let mut aggregated = aggregate(&insights);
        aggregated.emails_failed = failed;
        aggregated
    }
}

fn aggregate(insights: &[EmailInsight]) -> AggregatedInsight {
    let mut out = AggregatedInsight {
        emails_analyzed: insights.len(),
        ..Default::default()
    };
    if insights.is_empty() {
        return out;
    }

    let automated_votes = insights.iter().filter(|i| !i.is_human).count();
    out.looks_automated = automated_votes * 2 > insights.len();
    if out.looks_automated {
        out.delete_reason = insights
            .iter()
            .find_map(|i| i.delete_reason.clone());
    }

    for insight in insights {
        let c = &insight.sender_contact;
        let conf = c.confidence;
        keep_best(&mut out.name, &c.name, conf);
        keep_best(&mut out.phone, &c.phone, conf);
        keep_best(&mut out.company, &c.company, conf);
        keep_best(&mut out.title, &c.title, conf);
        keep_best(&mut out.nmls_license, &c.nmls_license, conf);
        keep_best(&mut out.agent_license, &c.agent_license, conf);

        for signal in insight
            .relationship
            .iter()
            .flat_map(|r| r.signals.iter())
        {
            if !out.signals.contains(signal) {
                out.signals.push(signal.clone());
            }
        }
    }

    // The latest email carries the freshest context
    if let Some(last) = insights.last() {
        out.intent = last.email_analysis.intent.clone();
        out.summary = last.email_analysis.summary.clone();
    }
    out.deal_info = out
        .deal_info
        .take()
        .or_else(|| insights.iter().rev().find_map(|i| i.deal_info.clone()));

    out.role = vote_role(
        insights
            .iter()
            .filter_map(|i| i.relationship.as_ref()),
    );

    out
}

fn keep_best(slot: &mut Option<(String, f32)>, value: &Option<String>, confidence: f32) {
    let Some(value) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) else {
        return;
    };
    match slot {
        Some((_, existing)) if *existing >= confidence => {}
        _ => *slot = Some((value.to_string(), confidence)),
    }
}

/// Majority vote over per-email relationship guesses. Ties break toward
/// the higher summed confidence; a remaining tie goes to the guess seen
/// most recently.
fn vote_role<'a>(
    guesses: impl Iterator<Item = &'a RelationshipGuess>,
) -> Option<(ContactRole, f32)> {
    // role -> (votes, summed confidence, last index seen)
    let mut tally: BTreeMap<ContactRole, (usize, f32, usize)> = BTreeMap::new();
    for (i, guess) in guesses.enumerate() {
        let role = guess.parsed_role();
        if role == ContactRole::Unknown {
            continue;
        }
        let entry = tally.entry(role).or_insert((0, 0.0, 0));
        entry.0 += 1;
        entry.1 += guess.confidence;
        entry.2 = i;
    }

    let (role, (votes, total_conf, _)) = tally.into_iter().max_by(
        |(_, (va, ca, ia)), (_, (vb, cb, ib))| {
            va.cmp(vb)
                .then(ca.partial_cmp(cb).unwrap_or(std::cmp::Ordering::Equal))
                .then(ia.cmp(ib))
        },
    )?;

    Some((role, (total_conf / votes as f32).clamp(0.0, 1.0)))
}
