//! End-to-end pipeline tests over a small fixture mailbox
//!
//! Each test writes a real mbox file into a temp directory, runs the full
//! orchestrator against it with an injected review handler, and asserts on
//! the exported partitions and the persisted state documents.

use async_trait::async_trait;
use siftbox::classify::ContactRole;
use siftbox::config::SiftboxConfig;
use siftbox::enrich::{EnrichmentCache, ReviewStatus};
use siftbox::llm::{LlmClient, MockLlmClient, MockResponse};
use siftbox::pipeline::{
    AutoAcceptHandler, FieldOverrides, PipelineContext, PipelineOrchestrator, ReviewDecision,
    ReviewHandler, ReviewRequest,
};
use siftbox::progress::NoOpHandler;
use siftbox::store::{Document, DocumentStore};
use siftbox::ExportPartition;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

const OPERATOR: &str = "op@summitlending.com";

/// Four exchanged correspondents: a realtor with a rich signature, two
/// unidentifiable humans, and an automated sender the operator replied to.
const FIXTURE_MBOX: &str = "\
From jane.doe@greenhomes.com Thu Jan 04 09:12:00 2024
From: \"Jane Doe\" <jane.doe@greenhomes.com>
To: op@summitlending.com
Subject: New Listing: 123 Oak St
Date: Thu, 4 Jan 2024 09:12:00 -0800

Hi, sending over the listing we discussed.

Jane Doe
Realtor | DRE# 01234567
Green Homes Realty
Direct: (916) 555-0134

From op@summitlending.com Thu Jan 04 10:03:00 2024
From: <op@summitlending.com>
To: jane.doe@greenhomes.com
Subject: Re: New Listing: 123 Oak St
Date: Thu, 4 Jan 2024 10:03:00 -0800

Thanks Jane, I'll take a look today.

From mystery@example.net Fri Jan 05 12:00:00 2024
From: <mystery@example.net>
To: op@summitlending.com
Subject: lunch tomorrow?
Date: Fri, 5 Jan 2024 12:00:00 -0800

Noon at the usual place?

From op@summitlending.com Fri Jan 05 12:30:00 2024
From: <op@summitlending.com>
To: mystery@example.net
Subject: Re: lunch tomorrow?
Date: Fri, 5 Jan 2024 12:30:00 -0800

Works for me.

From pat@example.org Fri Jan 05 14:00:00 2024
From: <pat@example.org>
To: op@summitlending.com
Subject: quick question
Date: Fri, 5 Jan 2024 14:00:00 -0800

Do you have a minute this week?

From op@summitlending.com Fri Jan 05 14:20:00 2024
From: <op@summitlending.com>
To: pat@example.org
Subject: Re: quick question
Date: Fri, 5 Jan 2024 14:20:00 -0800

Sure, call me Thursday.

From noreply@alerts.megabank.com Sat Jan 06 08:00:00 2024
From: <noreply@alerts.megabank.com>
To: op@summitlending.com
Subject: Your statement is ready
Date: Sat, 6 Jan 2024 08:00:00 -0800

View your statement online.

From op@summitlending.com Sat Jan 06 08:05:00 2024
From: <op@summitlending.com>
To: noreply@alerts.megabank.com
Subject: unsubscribe
Date: Sat, 6 Jan 2024 08:05:00 -0800

Please remove me from this list.
";

fn write_archive(dir: &Path, contents: &str) -> PathBuf {
    let path = dir.join("archive.mbox");
    fs::write(&path, contents).unwrap();
    path
}

fn test_config(archive: &Path, state_dir: &Path) -> SiftboxConfig {
    let mut config = SiftboxConfig::default();
    config.archives = vec![archive.to_path_buf()];
    config.state_dir = state_dir.to_path_buf();
    config.operator.addresses = [OPERATOR.to_string()].into_iter().collect();
    config.llm_enabled = false;
    config.review_threshold = 0.8;
    config.export_min_confidence = 0.5;
    config.rate_limit_ms = 0;
    config
}

/// Replays a queue of canned decisions and records every address it was
/// asked about. Falls back to `Accept` when the queue runs dry.
struct ScriptedReviewHandler {
    decisions: Mutex<VecDeque<ReviewDecision>>,
    asked: Mutex<Vec<String>>,
}

impl ScriptedReviewHandler {
    fn new(decisions: Vec<ReviewDecision>) -> Self {
        Self {
            decisions: Mutex::new(decisions.into()),
            asked: Mutex::new(Vec::new()),
        }
    }

    fn asked(&self) -> Vec<String> {
        self.asked.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReviewHandler for ScriptedReviewHandler {
    async fn review(&self, request: &ReviewRequest) -> ReviewDecision {
        self.asked.lock().unwrap().push(request.address.clone());
        self.decisions
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(ReviewDecision::Accept)
    }
}

async fn run_pipeline(
    config: SiftboxConfig,
    llm_client: Option<Arc<dyn LlmClient>>,
    review_handler: Arc<dyn ReviewHandler>,
    resume: bool,
) -> ExportPartition {
    let store = DocumentStore::open(&config.state_dir).unwrap();
    let context = PipelineContext::new(
        config,
        store,
        llm_client,
        review_handler,
        Arc::new(NoOpHandler),
    );
    PipelineOrchestrator::new(context).run(resume).await.unwrap()
}

#[tokio::test]
async fn test_auto_accept_run_partitions_contacts() {
    let dir = TempDir::new().unwrap();
    let archive = write_archive(dir.path(), FIXTURE_MBOX);
    let config = test_config(&archive, &dir.path().join("state"));

    let partition = run_pipeline(config, None, Arc::new(AutoAcceptHandler), false).await;

    // Jane clears the threshold on her signature title alone
    assert_eq!(partition.confirmed.len(), 1);
    let jane = &partition.confirmed[0];
    assert_eq!(jane.email, "jane.doe@greenhomes.com");
    assert_eq!(jane.first_name.as_deref(), Some("Jane"));
    assert_eq!(jane.last_name.as_deref(), Some("Doe"));
    assert_eq!(jane.role, "realtor");
    assert_eq!(jane.phone.as_deref(), Some("9165550134"));
    assert_eq!(jane.company.as_deref(), Some("Green Homes Realty"));
    assert_eq!(jane.messages_sent, 1);
    assert_eq!(jane.messages_received, 1);

    // Accepting an empty proposal leaves the unidentified senders unassigned
    assert_eq!(partition.unassigned.len(), 2);
    assert_eq!(partition.unassigned[0].email, "mystery@example.net");
    assert_eq!(partition.unassigned[1].email, "pat@example.org");
    assert!(!partition.unassigned[0].issues.is_empty());

    // The automated sender is spam even though the operator replied to it
    assert_eq!(partition.spam.len(), 1);
    assert_eq!(partition.spam[0].email, "noreply@alerts.megabank.com");
}

#[tokio::test]
async fn test_override_decision_reclassifies_and_learns() {
    let dir = TempDir::new().unwrap();
    let archive = write_archive(dir.path(), FIXTURE_MBOX);
    let config = test_config(&archive, &dir.path().join("state"));
    let state_dir = config.state_dir.clone();

    let handler = Arc::new(ScriptedReviewHandler::new(vec![
        ReviewDecision::Override {
            role: ContactRole::Attorney,
            fields: FieldOverrides {
                name: Some("Morgan Reyes".to_string()),
                ..Default::default()
            },
        },
        ReviewDecision::Delete,
    ]));

    let partition = run_pipeline(config, None, handler.clone(), false).await;

    // Only the below-threshold humans were escalated, in score order; the
    // automated sender never reaches the operator
    assert_eq!(
        handler.asked(),
        vec!["mystery@example.net".to_string(), "pat@example.org".to_string()]
    );

    assert_eq!(partition.confirmed.len(), 2);
    let mystery = partition
        .confirmed
        .iter()
        .find(|c| c.email == "mystery@example.net")
        .unwrap();
    assert_eq!(mystery.role, "attorney");
    assert_eq!(mystery.confidence, 1.0);
    assert_eq!(mystery.first_name.as_deref(), Some("Morgan"));
    assert_eq!(mystery.last_name.as_deref(), Some("Reyes"));

    // Deleted and automated senders both end up in the spam roll
    assert_eq!(partition.spam.len(), 2);
    let spam_emails: Vec<&str> = partition.spam.iter().map(|s| s.email.as_str()).collect();
    assert!(spam_emails.contains(&"pat@example.org"));
    assert!(spam_emails.contains(&"noreply@alerts.megabank.com"));

    // The decision is durable: the cache records the confirmation and the
    // manual exemption from the exchange gate
    let store = DocumentStore::open(&state_dir).unwrap();
    let cache: EnrichmentCache = store.load(Document::Enrichment).unwrap().unwrap();
    let rec = &cache.records["mystery@example.net"];
    assert_eq!(rec.review, ReviewStatus::UserConfirmed);
    assert!(rec.exchange_exempt);
    let deleted = &cache.records["pat@example.org"];
    assert_eq!(deleted.review, ReviewStatus::UserDeleted);
    // The automated sender was never promoted into enrichment at all
    assert!(!cache.records.contains_key("noreply@alerts.megabank.com"));
}

#[tokio::test]
async fn test_resumed_run_never_repeats_review_questions() {
    let dir = TempDir::new().unwrap();
    let archive = write_archive(dir.path(), FIXTURE_MBOX);
    let config = test_config(&archive, &dir.path().join("state"));

    let first_handler = Arc::new(ScriptedReviewHandler::new(vec![
        ReviewDecision::Override {
            role: ContactRole::Attorney,
            fields: FieldOverrides::default(),
        },
        ReviewDecision::Delete,
    ]));
    let first = run_pipeline(config.clone(), None, first_handler.clone(), false).await;
    assert_eq!(first_handler.asked().len(), 2);

    // Completed run: resume replays the stored export without asking anyone
    let second_handler = Arc::new(ScriptedReviewHandler::new(Vec::new()));
    let second = run_pipeline(config.clone(), None, second_handler.clone(), true).await;
    assert!(second_handler.asked().is_empty());
    assert_eq!(
        serde_json::to_value(&first).unwrap(),
        serde_json::to_value(&second).unwrap()
    );

    // New mail changes the fingerprint and forces a rescan, but settled
    // review decisions are kept, so nothing is re-asked
    let mut grown = FIXTURE_MBOX.to_string();
    grown.push_str(
        "From mystery@example.net Mon Jan 08 09:00:00 2024
From: <mystery@example.net>
To: op@summitlending.com
Subject: retainer agreement
Date: Mon, 8 Jan 2024 09:00:00 -0800

Attached as promised.
",
    );
    fs::write(&archive, grown).unwrap();

    let third_handler = Arc::new(ScriptedReviewHandler::new(Vec::new()));
    let third = run_pipeline(config, None, third_handler.clone(), true).await;
    assert!(third_handler.asked().is_empty());
    let mystery = third
        .confirmed
        .iter()
        .find(|c| c.email == "mystery@example.net")
        .unwrap();
    assert_eq!(mystery.role, "attorney");
    assert_eq!(mystery.messages_received, 2);
}

const LLM_FIXTURE_MBOX: &str = "\
From bob@harborlaw.com Tue Feb 06 15:00:00 2024
From: <bob@harborlaw.com>
To: op@summitlending.com
Subject: closing timeline
Date: Tue, 6 Feb 2024 15:00:00 -0800

Can we still close by the 28th? My client signed the addendum.

From op@summitlending.com Tue Feb 06 16:00:00 2024
From: <op@summitlending.com>
To: bob@harborlaw.com
Subject: Re: closing timeline
Date: Tue, 6 Feb 2024 16:00:00 -0800

Yes, docs go out Friday.

From weekly@chatterbox.example Wed Feb 07 07:00:00 2024
From: <weekly@chatterbox.example>
To: op@summitlending.com
Subject: Weekly roundup
Date: Wed, 7 Feb 2024 07:00:00 -0800

Here is what you missed this week.

From op@summitlending.com Wed Feb 07 07:10:00 2024
From: <digest-reply@summitlending.com>
To: weekly@chatterbox.example
Subject: Re: Weekly roundup
Date: Wed, 7 Feb 2024 07:10:00 -0800

stop
";

#[tokio::test]
async fn test_llm_insight_classifies_and_flags_automated() {
    let dir = TempDir::new().unwrap();
    let archive = write_archive(dir.path(), LLM_FIXTURE_MBOX);
    let mut config = test_config(&archive, &dir.path().join("state"));
    config.llm_enabled = true;
    // The operator's alias address must count as operator mail
    config
        .operator
        .addresses
        .insert("digest-reply@summitlending.com".to_string());

    let mock = MockLlmClient::new();
    // Contacts are analyzed in address order: bob first, then the weekly sender
    mock.add_response(MockResponse::text(
        r#"{
            "is_human": true,
            "sender_contact": {"name": "Bob Calloway", "confidence": 0.9},
            "relationship": {"role": "attorney", "confidence": 0.9,
                             "signals": ["negotiates closing terms for a client"]},
            "email_analysis": {"intent": "question",
                               "summary": "Asks whether closing by the 28th still holds"}
        }"#,
    ));
    mock.add_response(MockResponse::text(
        r#"{
            "is_human": false,
            "delete_reason": "automated weekly digest",
            "sender_contact": {"confidence": 0.0}
        }"#,
    ));

    let handler = Arc::new(ScriptedReviewHandler::new(Vec::new()));
    let partition = run_pipeline(config, Some(Arc::new(mock)), handler.clone(), false).await;

    // The relationship guess cleared the threshold, so no human was needed
    assert!(handler.asked().is_empty());

    assert_eq!(partition.confirmed.len(), 1);
    let bob = &partition.confirmed[0];
    assert_eq!(bob.email, "bob@harborlaw.com");
    assert_eq!(bob.role, "attorney");
    assert_eq!(bob.first_name.as_deref(), Some("Bob"));
    assert_eq!(bob.last_name.as_deref(), Some("Calloway"));
    assert!(bob.signal.starts_with("llm:"));

    assert_eq!(partition.unassigned.len(), 0);
    assert_eq!(partition.spam.len(), 1);
    assert_eq!(partition.spam[0].email, "weekly@chatterbox.example");
}
