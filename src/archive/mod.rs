//! Archive ingestion: streaming mbox parsing and the exchange index
//!
//! The scanner streams the mailbox line by line and never holds more than a
//! single message in memory, so multi-gigabyte archives are fine. Output is
//! the [`ExchangeIndex`]: one [`AddressRecord`] per address ever seen, with
//! direction counters that downstream stages use to decide whether a real
//! two-way relationship exists.

mod index;
mod mbox;
mod scanner;

pub use index::{normalize_address, AddressRecord, ExchangeIndex};
pub use mbox::{extract_addresses, parse_display_name, MboxReader, RawMessage};
pub use scanner::{archive_fingerprint, ArchiveScanner, ScanError, ScanSummary};
