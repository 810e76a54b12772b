//! Contact enrichment: signature extraction and the enrichment cache
//!
//! The regex layer scans decoded message bodies for structured contact
//! fields; every value it finds carries a provenance tag and a quality grade
//! so that later stages (and user corrections) can resolve conflicts by
//! precedence instead of by overwrite order.

mod body;
mod knowledge;
mod record;
mod signature;

pub use body::{decode_body, strip_quoted};
pub use knowledge::{FieldKind, KnowledgeBase, LearnedPattern};
pub use record::{
    EnrichmentCache, EnrichmentRecord, FieldCandidate, Provenance, ReviewStatus, SignatureQuality,
};
pub use signature::{ExtractedSignature, SignatureExtractor};
