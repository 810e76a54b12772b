//! Archive scanner: builds the exchange index from one or more mbox files

use super::index::ExchangeIndex;
use super::mbox::{parse_display_name, MboxReader};
use crate::config::OperatorProfile;
use chrono::{DateTime, TimeZone, Utc};
use sha2::{Digest, Sha256};
use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::PathBuf;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, trace, warn};

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Failed to read archive {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Headline numbers for the CLI `scan` command
#[derive(Debug, Clone, serde::Serialize)]
pub struct ScanSummary {
    pub messages: u64,
    pub addresses: usize,
    pub confirmed_exchanges: usize,
    pub scan_time_ms: u64,
}

/// Streams archives and maintains per-address direction counters
pub struct ArchiveScanner {
    operator: OperatorProfile,
    max_subject_samples: usize,
}

impl ArchiveScanner {
    pub fn new(operator: OperatorProfile, max_subject_samples: usize) -> Self {
        Self {
            operator,
            max_subject_samples,
        }
    }

    /// Builds the exchange index from the given archives.
    ///
    /// A single pass per file, one line at a time. Every decision here is
    /// deterministic, so rescanning an unchanged archive reproduces the
    /// identical record map.
    pub fn scan(&self, archives: &[PathBuf]) -> Result<(ExchangeIndex, ScanSummary), ScanError> {
        let start = Instant::now();
        let fingerprint = archive_fingerprint(archives)?;
        let mut index = ExchangeIndex::new(fingerprint);

        for path in archives {
            info!(archive = %path.display(), "Scanning archive");
            let file = File::open(path).map_err(|source| ScanError::Io {
                path: path.clone(),
                source,
            })?;
            let mut reader = MboxReader::new(BufReader::new(file));

            loop {
                let message = match reader.next_message() {
                    Ok(Some(m)) => m,
                    Ok(None) => break,
                    Err(source) => {
                        return Err(ScanError::Io {
                            path: path.clone(),
                            source,
                        })
                    }
                };
                index.message_count += 1;

                let sender = match message.sender() {
                    Some(s) => s,
                    None => {
                        trace!("Message without a parsable From header, skipped");
                        continue;
                    }
                };

                let date = parse_date(message.header("Date"));
                let subject = message.header("Subject");
                let has_attachment = message.has_attachment;

                if self.operator.is_operator_address(&sender) {
                    // Operator → contact: every non-operator recipient counts,
                    // including addresses present only in Cc
                    for recipient in message.recipients() {
                        if self.operator.is_operator_address(&recipient) {
                            continue;
                        }
                        let record = index.record_mut(&recipient);
                        record.sent_to_contact += 1;
                        record.observe(date, subject, has_attachment, self.max_subject_samples);
                    }
                } else {
                    // Contact → operator: the archive is the operator's own
                    // mailbox, so any message they did not send was received
                    let record = index.record_mut(&sender);
                    record.received_from_contact += 1;
                    record.observe(date, subject, has_attachment, self.max_subject_samples);
                    if let Some(name) = message.header("From").and_then(|v| parse_display_name(v)) {
                        record.observe_name(&name);
                    }
                }

                if index.message_count % 10_000 == 0 {
                    debug!(
                        messages = index.message_count,
                        addresses = index.records.len(),
                        "Scan progress"
                    );
                }
            }
        }

        let summary = ScanSummary {
            messages: index.message_count,
            addresses: index.records.len(),
            confirmed_exchanges: index.exchanged_addresses().len(),
            scan_time_ms: start.elapsed().as_millis() as u64,
        };
        info!(
            messages = summary.messages,
            addresses = summary.addresses,
            confirmed = summary.confirmed_exchanges,
            scan_time_ms = summary.scan_time_ms,
            "Archive scan complete"
        );
        Ok((index, summary))
    }

    /// Collects the raw text of the most recent `limit` messages sent by
    /// `address`, for the enrichment layer. Same streaming discipline as
    /// `scan`; only matching messages are retained.
    pub fn collect_bodies(
        &self,
        archives: &[PathBuf],
        address: &str,
        limit: usize,
    ) -> Result<Vec<String>, ScanError> {
        let target = address.to_lowercase();
        let mut kept: VecDeque<String> = VecDeque::with_capacity(limit);

        for path in archives {
            let file = File::open(path).map_err(|source| ScanError::Io {
                path: path.clone(),
                source,
            })?;
            let mut reader = MboxReader::new(BufReader::new(file));

            while let Some(message) = reader.next_message().map_err(|source| ScanError::Io {
                path: path.clone(),
                source,
            })? {
                if message.sender().as_deref() == Some(target.as_str()) {
                    if kept.len() == limit {
                        kept.pop_front();
                    }
                    kept.push_back(message.raw_text());
                }
            }
        }

        trace!(address = %target, bodies = kept.len(), "Collected message bodies");
        Ok(kept.into_iter().collect())
    }
}

/// Parses an RFC-2822 date header; malformed dates become `None`, never errors
pub fn parse_date(value: Option<&str>) -> Option<DateTime<Utc>> {
    let value = value?;
    match mailparse::dateparse(value) {
        Ok(epoch) => Utc.timestamp_opt(epoch, 0).single(),
        Err(e) => {
            warn!(date = %value, error = %e, "Unparsable date header, storing null");
            None
        }
    }
}

/// sha256 over every archive's bytes in order; used for index freshness
pub fn archive_fingerprint(archives: &[PathBuf]) -> Result<String, ScanError> {
    let mut hasher = Sha256::new();
    for path in archives {
        let file = File::open(path).map_err(|source| ScanError::Io {
            path: path.clone(),
            source,
        })?;
        let mut reader = BufReader::new(file);
        let mut buf = [0u8; 65536];
        loop {
            let n = reader.read(&mut buf).map_err(|source| ScanError::Io {
                path: path.clone(),
                source,
            })?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
    }
    Ok(hex::encode(hasher.finalize()))
}
