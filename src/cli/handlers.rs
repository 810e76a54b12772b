//! Command handlers: wire config, store, and pipeline together
//!
//! Each handler returns a process exit code. The interactive review
//! handler lives here because only the CLI owns a terminal.

use super::commands::{ExportArgs, RunArgs, ScanArgs, StatusArgs};
use super::output::OutputFormatter;
use crate::archive::{ArchiveScanner, ExchangeIndex};
use crate::classify::ContactRole;
use crate::config::SiftboxConfig;
use crate::enrich::EnrichmentCache;
use crate::export::Exporter;
use crate::llm::GenAiClient;
use crate::pipeline::{
    AutoAcceptHandler, FieldOverrides, PipelineContext, PipelineOrchestrator, PipelineState,
    ReviewDecision, ReviewHandler, ReviewRequest,
};
use crate::progress::{ProgressEvent, ProgressHandler};
use crate::store::{Document, DocumentStore};
use anyhow::{Context, Result};
use async_trait::async_trait;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::Write as _;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::error;

pub async fn handle_run(args: &RunArgs, quiet: bool) -> i32 {
    match run_pipeline(args, quiet).await {
        Ok(output) => {
            if let Err(e) = emit_text(&output, args.output.as_deref()) {
                error!("Failed to write output: {:#}", e);
                return 1;
            }
            0
        }
        Err(e) => {
            error!("Run failed: {:#}", e);
            eprintln!("Error: {:#}", e);
            1
        }
    }
}

async fn run_pipeline(args: &RunArgs, quiet: bool) -> Result<String> {
    let config = build_config(
        &args.archives,
        args.state_dir.as_ref(),
        Some(args),
    );
    let store = DocumentStore::open(&config.state_dir)?;

    let llm_client = if config.llm_enabled {
        let client = GenAiClient::new(
            config.provider,
            config.model.clone(),
            Duration::from_secs(config.request_timeout_secs),
        )?;
        Some(Arc::new(client) as Arc<dyn crate::llm::LlmClient>)
    } else {
        None
    };

    let review_handler: Arc<dyn ReviewHandler> = if args.auto_accept {
        Arc::new(AutoAcceptHandler)
    } else {
        Arc::new(InteractiveReviewHandler)
    };

    let progress_handler: Arc<dyn ProgressHandler> = if quiet {
        Arc::new(crate::progress::NoOpHandler)
    } else {
        Arc::new(TerminalProgressHandler::new())
    };

    let format = args.format.into();
    let context = PipelineContext::new(config, store, llm_client, review_handler, progress_handler);
    let orchestrator = PipelineOrchestrator::new(context);
    let partition = orchestrator.run(args.resume).await?;

    OutputFormatter::new(format).format_partition(&partition)
}

pub async fn handle_scan(args: &ScanArgs) -> i32 {
    let result = (|| -> Result<String> {
        let config = build_config(&args.archives, args.state_dir.as_ref(), None);
        config.validate()?;
        let store = DocumentStore::open(&config.state_dir)?;

        let scanner = ArchiveScanner::new(config.operator.clone(), config.max_subject_samples);
        let (index, summary) = scanner.scan(&config.archives)?;
        store.save(Document::ExchangeIndex, &index)?;

        OutputFormatter::new(super::output::OutputFormat::Human).format_scan(&summary)
    })();

    match result {
        Ok(text) => {
            println!("{}", text);
            0
        }
        Err(e) => {
            error!("Scan failed: {:#}", e);
            eprintln!("Error: {:#}", e);
            1
        }
    }
}

pub async fn handle_status(args: &StatusArgs) -> i32 {
    let result = (|| -> Result<String> {
        let config = build_config(&[], args.state_dir.as_ref(), None);
        let store = DocumentStore::open(&config.state_dir)?;
        let state: Option<PipelineState> = store.load(Document::PipelineState)?;
        OutputFormatter::new(args.format.into()).format_status(state.as_ref())
    })();

    match result {
        Ok(text) => {
            println!("{}", text);
            0
        }
        Err(e) => {
            eprintln!("Error: {:#}", e);
            1
        }
    }
}

pub async fn handle_export(args: &ExportArgs) -> i32 {
    let result = (|| -> Result<String> {
        let config = build_config(&[], args.state_dir.as_ref(), None);
        let store = DocumentStore::open(&config.state_dir)?;

        let index: ExchangeIndex = store
            .load(Document::ExchangeIndex)?
            .context("No exchange index found; run `siftbox run` or `siftbox scan` first")?;
        let cache: EnrichmentCache = store
            .load(Document::Enrichment)?
            .context("No enrichment cache found; run `siftbox run` first")?;
        let run_id = store
            .load::<PipelineState>(Document::PipelineState)?
            .map(|s| s.run_id)
            .unwrap_or_else(|| "adhoc".to_string());

        let partition = Exporter::new(config.export_min_confidence).export(&run_id, &cache, &index);
        let text = OutputFormatter::new(args.format.into()).format_partition(&partition)?;
        emit_text(&text, args.output.as_deref())?;
        Ok(String::new())
    })();

    match result {
        Ok(_) => 0,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            1
        }
    }
}

/// Env-based config with CLI overrides layered on top
fn build_config(
    archives: &[PathBuf],
    state_dir: Option<&PathBuf>,
    run: Option<&RunArgs>,
) -> SiftboxConfig {
    let mut config = SiftboxConfig::default();
    if !archives.is_empty() {
        config.archives = archives.to_vec();
    }
    if let Some(dir) = state_dir {
        config.state_dir = dir.clone();
    }
    if let Some(run) = run {
        if run.no_llm {
            config.llm_enabled = false;
        }
        if let Some(backend) = run.backend {
            config.provider = backend;
        }
        if let Some(model) = &run.model {
            config.model = model.clone();
        }
        if let Some(timeout) = run.timeout {
            config.request_timeout_secs = timeout;
        }
    }
    config
}

fn emit_text(text: &str, path: Option<&std::path::Path>) -> Result<()> {
    match path {
        Some(path) => std::fs::write(path, text)
            .with_context(|| format!("Writing output to {}", path.display())),
        None => {
            println!("{}", text);
            Ok(())
        }
    }
}

/// Progress bar plus stage announcements on stderr
struct TerminalProgressHandler {
    bar: Mutex<Option<ProgressBar>>,
}

impl TerminalProgressHandler {
    fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }

    fn finish_bar(&self) {
        if let Some(bar) = self.bar.lock().unwrap().take() {
            bar.finish_and_clear();
        }
    }
}

impl ProgressHandler for TerminalProgressHandler {
    fn on_progress(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::Started { archive, run_id } => {
                eprintln!("Processing {} (run {})", archive, run_id);
            }
            ProgressEvent::StageStarted { stage } => {
                eprintln!("Stage: {}", stage);
            }
            ProgressEvent::StageComplete { stage, duration } => {
                self.finish_bar();
                eprintln!("Stage {} done in {:.1}s", stage, duration.as_secs_f64());
            }
            ProgressEvent::ContactProgress {
                processed, total, ..
            } => {
                let mut guard = self.bar.lock().unwrap();
                let bar = guard.get_or_insert_with(|| {
                    let bar = ProgressBar::new(*total as u64);
                    bar.set_style(
                        ProgressStyle::with_template(
                            "{bar:40} {pos}/{len} contacts ({eta})",
                        )
                        .unwrap_or_else(|_| ProgressStyle::default_bar()),
                    );
                    bar
                });
                bar.set_position(*processed as u64);
            }
            ProgressEvent::ReviewRequested { .. } => {
                // The interactive handler prints its own prompt
                self.finish_bar();
            }
            ProgressEvent::LlmCallComplete { .. } => {}
            ProgressEvent::Completed {
                confirmed,
                unassigned,
                spam,
                total_time,
            } => {
                self.finish_bar();
                eprintln!(
                    "Done in {:.1}s: {} confirmed, {} unassigned, {} spam",
                    total_time.as_secs_f64(),
                    confirmed,
                    unassigned,
                    spam
                );
            }
            ProgressEvent::Failed { stage, error } => {
                self.finish_bar();
                eprintln!("Stage {} failed: {}", stage, error);
            }
        }
    }
}

/// Terminal review loop. Blocking stdin reads run on the blocking pool so
/// the runtime is never stalled.
struct InteractiveReviewHandler;

#[async_trait]
impl ReviewHandler for InteractiveReviewHandler {
    async fn review(&self, request: &ReviewRequest) -> ReviewDecision {
        let request = request.clone();
        tokio::task::spawn_blocking(move || prompt_for_decision(&request))
            .await
            .unwrap_or(ReviewDecision::Accept)
    }
}

fn prompt_for_decision(request: &ReviewRequest) -> ReviewDecision {
    eprintln!("\n--- Review: {} ---", request.address);
    if let Some(name) = &request.name {
        eprintln!("  name:    {}", name);
    }
    if let Some(title) = &request.title {
        eprintln!("  title:   {}", title);
    }
    if let Some(company) = &request.company {
        eprintln!("  company: {}", company);
    }
    eprintln!("  exchange score: {}", request.exchange_score);
    for subject in request.subjects.iter().take(3) {
        eprintln!("  subject: {}", subject);
    }
    match &request.proposed {
        Some(c) => eprintln!(
            "  proposed: {} ({:.2}, {})",
            c.role, c.confidence, c.signal
        ),
        None => eprintln!("  proposed: none"),
    }

    loop {
        eprint!("[a]ccept / [o]verride / [d]elete > ");
        let _ = std::io::stderr().flush();
        let Some(line) = read_line() else {
            return ReviewDecision::Accept;
        };
        match line.trim().to_lowercase().as_str() {
            "" | "a" | "accept" => return ReviewDecision::Accept,
            "d" | "delete" => return ReviewDecision::Delete,
            "o" | "override" => {
                if let Some(decision) = prompt_for_override() {
                    return decision;
                }
            }
            other => eprintln!("Unrecognized: {}", other),
        }
    }
}

fn prompt_for_override() -> Option<ReviewDecision> {
    eprint!("role (e.g. realtor, client, title_escrow) > ");
    let _ = std::io::stderr().flush();
    let line = read_line()?;
    let Some(role) = ContactRole::from_str_loose(&line) else {
        eprintln!("Unknown role: {}", line.trim());
        return None;
    };

    let mut fields = FieldOverrides::default();
    for (label, slot) in [
        ("name", &mut fields.name),
        ("phone", &mut fields.phone),
        ("company", &mut fields.company),
        ("title", &mut fields.title),
    ] {
        eprint!("{} (blank to keep) > ", label);
        let _ = std::io::stderr().flush();
        if let Some(value) = read_line() {
            let value = value.trim();
            if !value.is_empty() {
                *slot = Some(value.to_string());
            }
        }
    }

    Some(ReviewDecision::Override { role, fields })
}

fn read_line() -> Option<String> {
    let mut line = String::new();
    match std::io::stdin().read_line(&mut line) {
        Ok(0) => None,
        Ok(_) => Some(line),
        Err(_) => None,
    }
}
