//! LLM client abstraction and per-message insight extraction
//!
//! This module provides a trait-based abstraction for LLM communication,
//! allowing different backends (GenAI, Mock) to be used interchangeably,
//! plus the insight extractor that turns raw emails into structured
//! contact intelligence.

mod error;
mod extractor;
mod genai;
mod insight;
mod mock;
mod prompt;
mod types;

pub use error::LlmError;
pub use extractor::{AggregatedInsight, InsightExtractor};
pub use genai::GenAiClient;
pub use insight::{
    extract_json_from_response, EmailAnalysis, EmailInsight, RelationshipGuess, SenderContact,
};
pub use mock::{MockLlmClient, MockResponse};
pub use prompt::{build_user_prompt, PromptEmail, SYSTEM_PROMPT};
pub use types::{ChatMessage, LlmRequest, LlmResponse, MessageRole};

use async_trait::async_trait;

/// Chat seam between the insight extractor and whatever backend serves it.
///
/// The pipeline holds an `Arc<dyn LlmClient>` and only ever sends one
/// prompt and reads the text back; everything else (provider selection,
/// timeouts, rate limiting) lives outside the trait.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn chat(&self, request: LlmRequest) -> Result<LlmResponse, LlmError>;
}
