//! Stage-by-stage pipeline execution
//!
//! The orchestrator owns the working documents, runs the stages in order,
//! and persists after every contact-level mutation. Nothing asked of the
//! operator is ever asked twice: decisions land in the enrichment cache
//! before the next contact is touched.

use super::context::PipelineContext;
use super::review::{ReviewDecision, ReviewRequest};
use super::state::{PipelineState, RunStatus, Stage};
use crate::archive::{archive_fingerprint, ArchiveScanner, ExchangeIndex};
use crate::classify::{AutoClassifier, Classification, ClassifierInput, ContactRole};
use crate::enrich::{
    decode_body, EnrichmentCache, EnrichmentRecord, ExtractedSignature, FieldCandidate, FieldKind,
    KnowledgeBase, Provenance, ReviewStatus, SignatureExtractor,
};
use crate::exchange::{subject_hint, ExchangeValidator};
use crate::export::{Exporter, ExportPartition};
use crate::llm::{AggregatedInsight, InsightExtractor, PromptEmail};
use crate::progress::ProgressEvent;
use crate::store::Document;
use crate::validate::is_spam_address;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub struct PipelineOrchestrator {
    context: PipelineContext,
}

/// Owned per-message data reconstructed for prompting
struct SampledEmail {
    subject: String,
    date: Option<DateTime<Utc>>,
    body: String,
}

impl PipelineOrchestrator {
    pub fn new(context: PipelineContext) -> Self {
        Self { context }
    }

    /// Runs every remaining stage. With `resume`, prior state whose archive
    /// fingerprint still matches is picked up; otherwise the run starts over.
    pub async fn run(&self, resume: bool) -> Result<ExportPartition> {
        let start = Instant::now();
        let config = &self.context.config;
        config.validate()?;

        let fingerprint =
            archive_fingerprint(&config.archives).context("Fingerprinting archives")?;

        let mut state = self.load_or_create_state(resume, &fingerprint)?;
        state.status = RunStatus::Running;
        self.save_state(&state)?;

        self.emit(ProgressEvent::Started {
            archive: config
                .archives
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", "),
            run_id: state.run_id.clone(),
        });

        let mut index: Option<ExchangeIndex> = None;
        let mut cache: EnrichmentCache = self
            .context
            .store
            .load(Document::Enrichment)?
            .unwrap_or_default();
        let mut knowledge: KnowledgeBase = self
            .context
            .store
            .load(Document::Knowledge)?
            .unwrap_or_default();
        let mut partition: Option<ExportPartition> = None;

        for stage in Stage::ALL {
            if state.is_complete(stage) {
                debug!(%stage, "Stage already complete, skipping");
                // A later stage still needs the index in memory
                if index.is_none() {
                    index = self.context.store.load(Document::ExchangeIndex)?;
                }
                continue;
            }

            self.emit(ProgressEvent::StageStarted {
                stage: stage.to_string(),
            });
            let stage_start = Instant::now();

            let result = match stage {
                Stage::Indexing => self
                    .stage_index(&fingerprint)
                    .map(|built| index = Some(built)),
                Stage::Validating => self.stage_validate(index.as_ref(), &mut state),
                Stage::Enriching => {
                    self.stage_enrich(index.as_ref(), &mut state, &mut cache, &knowledge)
                        .await
                }
                Stage::Classifying => {
                    self.stage_classify(index.as_ref(), &mut state, &mut cache, &mut knowledge)
                        .await
                }
                Stage::Exporting => self
                    .stage_export(index.as_ref(), &state, &cache)
                    .map(|built| partition = Some(built)),
            };

            if let Err(error) = result {
                state.status = RunStatus::Failed;
                state.errors.push(format!("{}: {:#}", stage, error));
                self.save_state(&state)?;
                self.emit(ProgressEvent::Failed {
                    stage: stage.to_string(),
                    error: format!("{:#}", error),
                });
                return Err(error.context(format!("Stage {} failed", stage)));
            }

            state.mark_complete(stage);
            self.save_state(&state)?;
            self.emit(ProgressEvent::StageComplete {
                stage: stage.to_string(),
                duration: stage_start.elapsed(),
            });
        }

        let partition = match partition {
            Some(p) => p,
            // Every stage was already complete; reload the stored partition
            None => self
                .context
                .store
                .load(Document::Export)?
                .context("Run marked complete but no export document found")?,
        };

        state.status = RunStatus::Complete;
        self.save_state(&state)?;

        self.emit(ProgressEvent::Completed {
            confirmed: partition.confirmed.len(),
            unassigned: partition.unassigned.len(),
            spam: partition.spam.len(),
            total_time: start.elapsed(),
        });
        info!(
            run_id = %state.run_id,
            confirmed = partition.confirmed.len(),
            unassigned = partition.unassigned.len(),
            spam = partition.spam.len(),
            "Pipeline complete"
        );

        Ok(partition)
    }

    fn load_or_create_state(&self, resume: bool, fingerprint: &str) -> Result<PipelineState> {
        if resume {
            if let Some(prior) = self
                .context
                .store
                .load::<PipelineState>(Document::PipelineState)?
            {
                if prior.archive_fingerprint == fingerprint {
                    info!(run_id = %prior.run_id, "Resuming prior run");
                    return Ok(prior);
                }
                warn!("Archive changed since prior run, starting fresh");
            }
        }
        Ok(PipelineState::new(fingerprint))
    }

    fn save_state(&self, state: &PipelineState) -> Result<()> {
        self.context
            .store
            .save(Document::PipelineState, state)
            .context("Persisting pipeline state")
    }

    fn emit(&self, event: ProgressEvent) {
        self.context.progress_handler.on_progress(&event);
    }

    /// Builds the exchange index, or keeps the stored one when the archive
    /// bytes have not changed since it was built.
    fn stage_index(&self, fingerprint: &str) -> Result<ExchangeIndex> {
        if let Some(existing) = self
            .context
            .store
            .load::<ExchangeIndex>(Document::ExchangeIndex)?
        {
            if existing.archive_fingerprint == fingerprint {
                info!(
                    addresses = existing.records.len(),
                    "Exchange index is current, skipping rescan"
                );
                return Ok(existing);
            }
            info!("Archive fingerprint changed, rebuilding index");
        }

        let config = &self.context.config;
        let scanner = ArchiveScanner::new(config.operator.clone(), config.max_subject_samples);
        let (index, summary) = scanner.scan(&config.archives)?;
        info!(
            messages = summary.messages,
            addresses = summary.addresses,
            "Index built"
        );

        self.context.store.save(Document::ExchangeIndex, &index)?;
        Ok(index)
    }

    fn stage_validate(&self, index: Option<&ExchangeIndex>, state: &mut PipelineState) -> Result<()> {
        let index = index.context("Exchange index missing before validation")?;
        let (_, summary) = ExchangeValidator::new().validate(index);

        state.contacts_total = summary.confirmed;
        info!(
            confirmed = summary.confirmed,
            sender_only = summary.sender_only,
            receiver_only = summary.receiver_only,
            "Exchange validation complete"
        );
        Ok(())
    }

    async fn stage_enrich(
        &self,
        index: Option<&ExchangeIndex>,
        state: &mut PipelineState,
        cache: &mut EnrichmentCache,
        knowledge: &KnowledgeBase,
    ) -> Result<()> {
        let index = index.context("Exchange index missing before enrichment")?;
        let config = &self.context.config;
        let scanner = ArchiveScanner::new(config.operator.clone(), config.max_subject_samples);
        let signature_extractor = SignatureExtractor::new(config.operator.clone());
        let insight_extractor = self.context.llm_client.as_ref().map(|client| {
            InsightExtractor::new(
                client.clone(),
                Duration::from_millis(config.rate_limit_ms),
            )
        });

        let addresses: Vec<String> = index
            .exchanged_addresses()
            .into_iter()
            .map(str::to_string)
            .collect();
        let total = addresses.len();

        for (i, address) in addresses.iter().enumerate() {
            self.emit(ProgressEvent::ContactProgress {
                stage: Stage::Enriching.to_string(),
                processed: i,
                total,
            });

            // Automated senders go straight to the spam partition at
            // export; spending LLM calls on them would be wasted
            if is_spam_address(address) {
                debug!(address = %address, "Automated sender, not enriched");
                continue;
            }

            {
                let record = cache.record_mut(address);
                if record.enriched || record.review.is_settled() {
                    continue;
                }
            }

            let address_record = index
                .record(address)
                .context("Exchanged address vanished from index")?;

            let bodies =
                scanner.collect_bodies(&config.archives, address, config.max_bodies_per_contact)?;
            let signature = signature_extractor.extract(&bodies, knowledge);

            let insight = match &insight_extractor {
                Some(extractor) if !bodies.is_empty() => {
                    let sampled = sample_emails(&bodies);
                    let operator_address = config
                        .operator
                        .addresses
                        .iter()
                        .next()
                        .cloned()
                        .unwrap_or_default();
                    let prompts: Vec<PromptEmail<'_>> = sampled
                        .iter()
                        .map(|e| PromptEmail {
                            sender: address,
                            sender_name: address_record.name.as_deref(),
                            recipient: &operator_address,
                            subject: &e.subject,
                            date: e.date,
                            body: &e.body,
                        })
                        .collect();

                    let call_start = Instant::now();
                    let aggregated = extractor.analyze(&prompts).await;
                    self.emit(ProgressEvent::LlmCallComplete {
                        address: address.clone(),
                        success: !aggregated.is_empty(),
                        response_time: call_start.elapsed(),
                    });
                    state.llm_calls_failed += aggregated.emails_failed;
                    Some(aggregated)
                }
                _ => None,
            };

            let record = cache.record_mut(address);
            if let Some(name) = &address_record.name {
                EnrichmentRecord::push_candidate(
                    &mut record.names,
                    FieldCandidate::new(name, Provenance::DomainHeuristic, signature.quality),
                );
            }
            apply_signature(record, &signature);
            if let Some(aggregated) = insight {
                apply_insight(record, &aggregated);
            }
            record.subject_hint = subject_hint(&address_record.subjects);
            record.enriched = true;
            record.touch();

            state.contacts_enriched += 1;
            state.touch();
            self.context.store.save(Document::Enrichment, cache)?;
            self.save_state(state)?;
        }

        Ok(())
    }

    async fn stage_classify(
        &self,
        index: Option<&ExchangeIndex>,
        state: &mut PipelineState,
        cache: &mut EnrichmentCache,
        knowledge: &mut KnowledgeBase,
    ) -> Result<()> {
        let index = index.context("Exchange index missing before classification")?;
        let classifier = AutoClassifier::new();
        let threshold = self.context.config.review_threshold;

        let addresses: Vec<String> = index
            .exchanged_addresses()
            .into_iter()
            .map(str::to_string)
            .collect();
        let total = addresses.len();

        for (i, address) in addresses.iter().enumerate() {
            self.emit(ProgressEvent::ContactProgress {
                stage: Stage::Classifying.to_string(),
                processed: i,
                total,
            });

            // Never escalate an automated sender to the operator
            if is_spam_address(address) {
                continue;
            }

            let candidate = {
                let record = cache.record_mut(address);
                if record.review.is_settled() || record.flagged_automated {
                    continue;
                }
                propose_classification(&classifier, record)
            };

            let accepted = candidate
                .as_ref()
                .map(|c| c.confidence >= threshold)
                .unwrap_or(false);

            if accepted {
                let record = cache.record_mut(address);
                record.classification = candidate;
                record.review = ReviewStatus::AutoAccepted;
                record.touch();
            } else {
                let confidence = candidate.as_ref().map(|c| c.confidence).unwrap_or(0.0);
                self.emit(ProgressEvent::ReviewRequested {
                    address: address.clone(),
                    confidence,
                });

                let request = {
                    let record = cache.record_mut(address);
                    let address_record = index.record(address);
                    ReviewRequest {
                        address: address.clone(),
                        proposed: candidate.clone(),
                        name: record.best_name().map(str::to_string),
                        title: record.best_title().map(str::to_string),
                        company: record.best_company().map(str::to_string),
                        exchange_score: address_record
                            .map(|r| r.exchange_score())
                            .unwrap_or(0),
                        subjects: address_record
                            .map(|r| r.subjects.clone())
                            .unwrap_or_default(),
                    }
                };

                let decision = self.context.review_handler.review(&request).await;
                state.reviews_requested += 1;

                let record = cache.record_mut(address);
                apply_decision(record, knowledge, candidate, decision);
            }

            // Persist before the next contact so a crash never repeats a question
            state.touch();
            self.context.store.save(Document::Enrichment, cache)?;
            self.context.store.save(Document::Knowledge, knowledge)?;
            self.save_state(state)?;
        }

        Ok(())
    }

    fn stage_export(
        &self,
        index: Option<&ExchangeIndex>,
        state: &PipelineState,
        cache: &EnrichmentCache,
    ) -> Result<ExportPartition> {
        let index = index.context("Exchange index missing before export")?;
        let exporter = Exporter::new(self.context.config.export_min_confidence);
        let partition = exporter.export(&state.run_id, cache, index);
        self.context.store.save(Document::Export, &partition)?;
        Ok(partition)
    }
}

/// Classification precedence: hard rules, then the LLM's opinion, then the
/// subject hint. The first source with an answer wins.
fn propose_classification(
    classifier: &AutoClassifier,
    record: &EnrichmentRecord,
) -> Option<Classification> {
    let input = ClassifierInput {
        titles: record.titles.iter().map(|c| c.value.as_str()).collect(),
        companies: record.companies.iter().map(|c| c.value.as_str()).collect(),
        nmls_licenses: record
            .nmls_licenses
            .iter()
            .map(|c| c.value.as_str())
            .collect(),
        agent_licenses: record
            .agent_licenses
            .iter()
            .map(|c| c.value.as_str())
            .collect(),
        domain: record.address.rsplit('@').next(),
    };

    classifier
        .classify(&input)
        .or_else(|| record.llm_relationship.clone())
        .or_else(|| record.subject_hint.clone())
}

/// Folds regex-extracted fields into the record
fn apply_signature(record: &mut EnrichmentRecord, signature: &ExtractedSignature) {
    let quality = signature.quality;
    let lists = [
        (&signature.phones, &mut record.phones),
        (&signature.nmls_licenses, &mut record.nmls_licenses),
        (&signature.agent_licenses, &mut record.agent_licenses),
        (&signature.companies, &mut record.companies),
        (&signature.titles, &mut record.titles),
    ];
    for (values, target) in lists {
        for value in values {
            EnrichmentRecord::push_candidate(
                target,
                FieldCandidate::new(value, Provenance::RegexSignature, quality),
            );
        }
    }
}

/// Folds the aggregated LLM view into the record
fn apply_insight(record: &mut EnrichmentRecord, insight: &AggregatedInsight) {
    let fields = [
        (&insight.name, &mut record.names),
        (&insight.phone, &mut record.phones),
        (&insight.company, &mut record.companies),
        (&insight.title, &mut record.titles),
        (&insight.nmls_license, &mut record.nmls_licenses),
        (&insight.agent_license, &mut record.agent_licenses),
    ];
    for (slot, target) in fields {
        if let Some((value, _confidence)) = slot {
            EnrichmentRecord::push_candidate(
                target,
                FieldCandidate::new(value, Provenance::Llm, Default::default()),
            );
        }
    }

    if let Some((role, confidence)) = &insight.role {
        let signal = if insight.signals.is_empty() {
            "llm".to_string()
        } else {
            format!("llm:{}", insight.signals.join("; "))
        };
        record.llm_relationship = Some(Classification::new(*role, *confidence as f64, signal));
    }
    record.summary = insight.summary.clone().or_else(|| record.summary.take());
    record.intent = insight.intent.clone().or_else(|| record.intent.take());
    if insight.looks_automated {
        record.flagged_automated = true;
        if record.summary.is_none() {
            record.summary = insight.delete_reason.clone();
        }
    }
}

/// Applies a review decision and records what it taught us
fn apply_decision(
    record: &mut EnrichmentRecord,
    knowledge: &mut KnowledgeBase,
    candidate: Option<Classification>,
    decision: ReviewDecision,
) {
    match decision {
        ReviewDecision::Accept => {
            let role = candidate.map(|c| c.role).unwrap_or(ContactRole::Unknown);
            record.classification = Some(Classification::user_decided(role));
            record.review = ReviewStatus::UserConfirmed;
        }
        ReviewDecision::Override { role, fields } => {
            record.classification = Some(Classification::user_decided(role));
            record.review = ReviewStatus::UserConfirmed;
            record.exchange_exempt = true;

            if let Some(name) = fields.name {
                EnrichmentRecord::push_candidate(
                    &mut record.names,
                    FieldCandidate::corrected(name),
                );
            }
            if let Some(phone) = fields.phone {
                knowledge.learn(FieldKind::Phone, &phone, &record.address);
                EnrichmentRecord::push_candidate(
                    &mut record.phones,
                    FieldCandidate::corrected(phone),
                );
            }
            if let Some(company) = fields.company {
                knowledge.learn(FieldKind::Company, &company, &record.address);
                EnrichmentRecord::push_candidate(
                    &mut record.companies,
                    FieldCandidate::corrected(company),
                );
            }
            if let Some(title) = fields.title {
                knowledge.learn(FieldKind::Title, &title, &record.address);
                EnrichmentRecord::push_candidate(
                    &mut record.titles,
                    FieldCandidate::corrected(title),
                );
            }
        }
        ReviewDecision::Delete => {
            record.review = ReviewStatus::UserDeleted;
        }
    }
    record.touch();
}

/// Reconstructs subject, date, and decoded body from raw message text
fn sample_emails(bodies: &[String]) -> Vec<SampledEmail> {
    bodies
        .iter()
        .map(|raw| {
            let (subject, date) = match mailparse::parse_mail(raw.as_bytes()) {
                Ok(parsed) => {
                    let subject = parsed
                        .headers
                        .iter()
                        .find(|h| h.get_key().eq_ignore_ascii_case("Subject"))
                        .map(|h| h.get_value())
                        .unwrap_or_default();
                    let date = parsed
                        .headers
                        .iter()
                        .find(|h| h.get_key().eq_ignore_ascii_case("Date"))
                        .and_then(|h| mailparse::dateparse(&h.get_value()).ok())
                        .and_then(|epoch| {
                            use chrono::TimeZone;
                            Utc.timestamp_opt(epoch, 0).single()
                        });
                    (subject, date)
                }
                Err(_) => (String::new(), None),
            };
            SampledEmail {
                subject,
                date,
                body: decode_body(raw),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrich::SignatureQuality;
    use crate::pipeline::review::FieldOverrides;

    fn record() -> EnrichmentRecord {
        EnrichmentRecord::new("jane@realty.com")
    }

    #[test]
    fn test_signature_fields_land_with_regex_provenance() {
        let mut rec = record();
        let sig = ExtractedSignature {
            phones: vec!["5551234567".to_string()],
            titles: vec!["Realtor".to_string()],
            quality: SignatureQuality::Good,
            ..Default::default()
        };
        apply_signature(&mut rec, &sig);

        assert_eq!(rec.best_phone(), Some("5551234567"));
        assert_eq!(rec.phones[0].provenance, Provenance::RegexSignature);
    }

    #[test]
    fn test_insight_never_displaces_regex_values() {
        let mut rec = record();
        apply_signature(
            &mut rec,
            &ExtractedSignature {
                phones: vec!["5551234567".to_string()],
                quality: SignatureQuality::Good,
                ..Default::default()
            },
        );
        let insight = AggregatedInsight {
            phone: Some(("5559990000".to_string(), 0.9)),
            emails_analyzed: 1,
            ..Default::default()
        };
        apply_insight(&mut rec, &insight);

        // Both survive as candidates; the regex one still ranks first
        assert_eq!(rec.phones.len(), 2);
        assert_eq!(rec.best_phone(), Some("5551234567"));
    }

    #[test]
    fn test_insight_automation_flag_propagates() {
        let mut rec = record();
        let insight = AggregatedInsight {
            looks_automated: true,
            delete_reason: Some("bulk notifications".to_string()),
            emails_analyzed: 2,
            ..Default::default()
        };
        apply_insight(&mut rec, &insight);

        assert!(rec.flagged_automated);
        assert_eq!(rec.summary.as_deref(), Some("bulk notifications"));
    }

    #[test]
    fn test_proposal_precedence_rules_first() {
        let classifier = AutoClassifier::new();
        let mut rec = record();
        rec.llm_relationship = Some(Classification::new(ContactRole::Attorney, 0.9, "llm"));
        EnrichmentRecord::push_candidate(
            &mut rec.titles,
            FieldCandidate::new("Realtor", Provenance::RegexSignature, SignatureQuality::Good),
        );

        let proposal = propose_classification(&classifier, &rec).unwrap();
        assert_eq!(proposal.role, ContactRole::Realtor);
    }

    #[test]
    fn test_proposal_falls_back_to_llm_then_hint() {
        let classifier = AutoClassifier::new();
        let mut rec = record();
        rec.subject_hint = Some(Classification::new(ContactRole::Client, 1.0, "rate lock"));

        let proposal = propose_classification(&classifier, &rec).unwrap();
        assert_eq!(proposal.role, ContactRole::Client);

        rec.llm_relationship = Some(Classification::new(ContactRole::Attorney, 0.7, "llm"));
        let proposal = propose_classification(&classifier, &rec).unwrap();
        assert_eq!(proposal.role, ContactRole::Attorney);
    }

    #[test]
    fn test_accept_decision_finalizes_proposal() {
        let mut rec = record();
        let mut kb = KnowledgeBase::default();
        let candidate = Some(Classification::new(ContactRole::Realtor, 0.6, "weak"));

        apply_decision(&mut rec, &mut kb, candidate, ReviewDecision::Accept);

        let c = rec.classification.unwrap();
        assert_eq!(c.role, ContactRole::Realtor);
        assert_eq!(c.confidence, 1.0);
        assert!(c.is_user_decided());
        assert_eq!(rec.review, ReviewStatus::UserConfirmed);
    }

    #[test]
    fn test_override_learns_and_exempts() {
        let mut rec = record();
        let mut kb = KnowledgeBase::default();

        apply_decision(
            &mut rec,
            &mut kb,
            None,
            ReviewDecision::Override {
                role: ContactRole::Attorney,
                fields: FieldOverrides {
                    title: Some("Paralegal".to_string()),
                    ..Default::default()
                },
            },
        );

        assert_eq!(
            rec.classification.as_ref().unwrap().role,
            ContactRole::Attorney
        );
        assert!(rec.exchange_exempt);
        assert_eq!(rec.best_title(), Some("Paralegal"));
        assert_eq!(rec.titles[0].provenance, Provenance::UserCorrection);
        assert_eq!(kb.pattern_count(), 1);
    }

    #[test]
    fn test_delete_decision_marks_deleted() {
        let mut rec = record();
        let mut kb = KnowledgeBase::default();
        apply_decision(&mut rec, &mut kb, None, ReviewDecision::Delete);
        assert_eq!(rec.review, ReviewStatus::UserDeleted);
        assert!(rec.classification.is_none());
    }

    #[test]
    fn test_sample_emails_reconstructs_headers() {
        let raw = "From: jane@realty.com\nSubject: New Listing\nDate: Mon, 8 Jan 2024 09:00:00 -0800\n\nHi there.\n";
        let sampled = sample_emails(&[raw.to_string()]);
        assert_eq!(sampled.len(), 1);
        assert_eq!(sampled[0].subject, "New Listing");
        assert!(sampled[0].date.is_some());
        assert_eq!(sampled[0].body.trim(), "Hi there.");
    }
}
