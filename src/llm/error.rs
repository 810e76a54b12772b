//! LLM backend error handling

use thiserror::Error;

/// Errors that can occur while talking to an LLM backend
#[derive(Debug, Clone, Error)]
pub enum LlmError {
    /// API request failed with the given message
    #[error("API error: {message}")]
    Api { message: String },

    /// Request timed out after the specified duration (in seconds)
    #[error("Request timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    /// Invalid or malformed response from the LLM
    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    /// Configuration error (missing API keys, unknown provider, etc.)
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Mock queue exhausted or other generic failure
    #[error("{message}")]
    Other { message: String },
}

impl LlmError {
    /// Transient failures are worth retrying on the next message;
    /// configuration failures are not.
    pub fn is_transient(&self) -> bool {
        matches!(self, LlmError::Api { .. } | LlmError::Timeout { .. })
    }
}
