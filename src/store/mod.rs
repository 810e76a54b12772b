//! File-backed JSON document store
//!
//! All pipeline state lives in a handful of plain JSON documents under one
//! state directory. Writes are atomic (temp file + rename) so a crash never
//! leaves a half-written document behind; the discipline elsewhere in the
//! crate is read-modify-persist per logical unit of work.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, trace};

/// Errors raised by document load/save operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to read {document}: {source}")]
    Read {
        document: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {document}: {source}")]
    Write {
        document: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to decode {document}: {source}")]
    Decode {
        document: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to encode {document}: {source}")]
    Encode {
        document: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to create state directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The persisted documents the pipeline reads and writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Document {
    /// Address record map built by the archive scanner
    ExchangeIndex,
    /// Per-address enrichment records
    Enrichment,
    /// Operator correction patterns
    Knowledge,
    /// Run status and per-stage counters
    PipelineState,
    /// Final confirmed/unassigned/spam partition
    Export,
}

impl Document {
    pub fn file_name(&self) -> &'static str {
        match self {
            Document::ExchangeIndex => "exchange_index.json",
            Document::Enrichment => "enrichment.json",
            Document::Knowledge => "knowledge.json",
            Document::PipelineState => "pipeline_state.json",
            Document::Export => "export.json",
        }
    }
}

/// Handle to the state directory holding every persisted document
#[derive(Debug, Clone)]
pub struct DocumentStore {
    root: PathBuf,
}

impl DocumentStore {
    /// Opens (creating if needed) a store rooted at `root`
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| StoreError::CreateDir {
            path: root.clone(),
            source,
        })?;
        debug!(root = %root.display(), "Opened document store");
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, document: Document) -> PathBuf {
        self.root.join(document.file_name())
    }

    /// Loads a document, returning `None` if it has never been written
    pub fn load<T: DeserializeOwned>(&self, document: Document) -> Result<Option<T>, StoreError> {
        let path = self.path(document);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                trace!(document = document.file_name(), "Document not present");
                return Ok(None);
            }
            Err(source) => {
                return Err(StoreError::Read {
                    document: document.file_name().to_string(),
                    source,
                })
            }
        };

        let value = serde_json::from_str(&raw).map_err(|source| StoreError::Decode {
            document: document.file_name().to_string(),
            source,
        })?;
        Ok(Some(value))
    }

    /// Persists a document atomically: write a sibling temp file, then rename
    pub fn save<T: Serialize>(&self, document: Document, value: &T) -> Result<(), StoreError> {
        let path = self.path(document);
        let tmp = path.with_extension("json.tmp");

        let encoded =
            serde_json::to_string_pretty(value).map_err(|source| StoreError::Encode {
                document: document.file_name().to_string(),
                source,
            })?;

        let write = |p: &Path, data: &str| -> std::io::Result<()> {
            let mut file = fs::File::create(p)?;
            file.write_all(data.as_bytes())?;
            file.sync_all()
        };

        write(&tmp, &encoded)
            .and_then(|_| fs::rename(&tmp, &path))
            .map_err(|source| StoreError::Write {
                document: document.file_name().to_string(),
                source,
            })?;

        trace!(
            document = document.file_name(),
            bytes = encoded.len(),
            "Persisted document"
        );
        Ok(())
    }

    /// Removes a document if present. Used by `run --fresh`.
    pub fn remove(&self, document: Document) -> Result<(), StoreError> {
        let path = self.path(document);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::Write {
                document: document.file_name().to_string(),
                source,
            }),
        }
    }
}
