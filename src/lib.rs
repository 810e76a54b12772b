//! siftbox - contact extraction and classification for mbox archives
//!
//! This library turns a multi-gigabyte personal email archive into a
//! clean, classified contact list. It streams mbox files without ever
//! loading one whole, keeps only addresses the operator genuinely
//! corresponded with, enriches them from signature blocks and an
//! optional LLM, classifies each relationship with a precedence rule
//! engine, and exports a three-way partition (confirmed, unassigned,
//! spam).
//!
//! # Core Concepts
//!
//! - **Exchange**: an address both received mail from the operator and
//!   sent mail to them. One-way traffic never becomes a contact.
//! - **Provenance**: every extracted field value (name, phone, title...)
//!   carries its source; user corrections beat LLM output, which beats
//!   regex extraction. Conflicts resolve by precedence, never overwrite.
//! - **Resumability**: every stage persists before moving on, so an
//!   interrupted run resumes without repeating work, and an answered
//!   review question is never asked again.
//!
//! # Example Usage
//!
//! ```ignore
//! use siftbox::config::SiftboxConfig;
//! use siftbox::pipeline::{AutoAcceptHandler, PipelineContext, PipelineOrchestrator};
//! use siftbox::progress::NoOpHandler;
//! use siftbox::store::DocumentStore;
//! use std::sync::Arc;
//!
//! async fn run() -> anyhow::Result<()> {
//!     let config = SiftboxConfig::default();
//!     let store = DocumentStore::open(&config.state_dir)?;
//!     let context = PipelineContext::new(
//!         config,
//!         store,
//!         None, // regex-only, no LLM
//!         Arc::new(AutoAcceptHandler),
//!         Arc::new(NoOpHandler),
//!     );
//!     let partition = PipelineOrchestrator::new(context).run(false).await?;
//!     println!("{} confirmed contacts", partition.confirmed.len());
//!     Ok(())
//! }
//! ```

// Public modules
pub mod archive;
pub mod classify;
pub mod cli;
pub mod config;
pub mod enrich;
pub mod exchange;
pub mod export;
pub mod llm;
pub mod pipeline;
pub mod progress;
pub mod store;
pub mod validate;

// Re-export key types for convenient access
pub use archive::{ArchiveScanner, ExchangeIndex, ScanError};
pub use classify::{AutoClassifier, Classification, ContactRole};
pub use config::{ConfigError, OperatorProfile, SiftboxConfig};
pub use enrich::{EnrichmentCache, EnrichmentRecord, Provenance, SignatureExtractor};
pub use export::{CrmContact, Exporter, ExportPartition};
pub use llm::{GenAiClient, LlmClient, LlmError, MockLlmClient};
pub use pipeline::{PipelineContext, PipelineOrchestrator, PipelineState};
pub use store::{DocumentStore, StoreError};
pub use validate::{Disposition, FinalValidator};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
