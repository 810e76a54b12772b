//! Configuration management for siftbox
//!
//! Settings load from `SIFTBOX_*` environment variables with sensible
//! defaults; CLI flags override them afterwards. Provider credentials are
//! read directly by the genai library (`OPENAI_API_KEY`, `ANTHROPIC_API_KEY`,
//! `OLLAMA_HOST`, ...).
//!
//! # Environment Variables
//!
//! - `SIFTBOX_ARCHIVE`: mbox archive path(s), comma-separated
//! - `SIFTBOX_STATE_DIR`: state directory - default: `~/.local/share/siftbox`
//! - `SIFTBOX_OPERATOR_ADDRESSES`: the operator's own email addresses (comma-separated) - **required for a run**
//! - `SIFTBOX_OPERATOR_PHONES`: operator phone numbers to exclude from attribution
//! - `SIFTBOX_OPERATOR_NMLS`: operator NMLS license numbers to exclude
//! - `SIFTBOX_OPERATOR_AGENT_LICENSES`: operator agent/broker license numbers to exclude
//! - `SIFTBOX_OPERATOR_COMPANIES`: operator company names to exclude
//! - `SIFTBOX_REVIEW_THRESHOLD`: confidence below which a human decision is requested - default: "0.8"
//! - `SIFTBOX_EXPORT_MIN_CONFIDENCE`: minimum confidence for the confirmed partition - default: "0.5"
//! - `SIFTBOX_MAX_SUBJECT_SAMPLES`: subject lines kept per address - default: "10"
//! - `SIFTBOX_MAX_BODIES`: message bodies sampled per contact for enrichment - default: "5"
//! - `SIFTBOX_PROVIDER`: LLM provider (ollama|openai|anthropic|gemini|xai|groq) - default: "ollama"
//! - `SIFTBOX_MODEL`: model name - default: "qwen2.5:14b"
//! - `SIFTBOX_REQUEST_TIMEOUT`: LLM timeout in seconds - default: "60"
//! - `SIFTBOX_RATE_LIMIT_MS`: delay between LLM calls in milliseconds - default: "1000"
//! - `SIFTBOX_LOG_LEVEL`: logging level - default: "info"

use genai::adapter::AdapterKind;
use std::collections::HashSet;
use std::env;
use std::path::PathBuf;
use thiserror::Error;

const DEFAULT_MODEL: &str = "qwen2.5:14b";
const DEFAULT_REVIEW_THRESHOLD: f64 = 0.8;
const DEFAULT_EXPORT_MIN_CONFIDENCE: f64 = 0.5;
const DEFAULT_MAX_SUBJECT_SAMPLES: usize = 10;
const DEFAULT_MAX_BODIES: usize = 5;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;
const DEFAULT_RATE_LIMIT_MS: u64 = 1000;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("No operator addresses configured. Set SIFTBOX_OPERATOR_ADDRESSES so exchange direction can be determined")]
    MissingOperatorAddresses,

    #[error("No archive path configured. Set SIFTBOX_ARCHIVE or pass --archive")]
    MissingArchive,

    #[error("Invalid provider: {0}. Valid options: ollama, openai, anthropic, gemini, xai, groq")]
    InvalidProvider(String),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// The operator's own identifying values, filtered out of attribution so a
/// forwarded or replied-to signature never credits the operator's phone,
/// license, or company to a contact.
#[derive(Debug, Clone, Default)]
pub struct OperatorProfile {
    /// Lowercased email addresses belonging to the operator
    pub addresses: HashSet<String>,
    /// Phone numbers, normalized to bare digits
    pub phones: HashSet<String>,
    /// Lender-side (NMLS) license numbers
    pub nmls_licenses: HashSet<String>,
    /// Agent-side license numbers
    pub agent_licenses: HashSet<String>,
    /// Company names, lowercased
    pub companies: HashSet<String>,
}

impl OperatorProfile {
    pub fn is_operator_address(&self, address: &str) -> bool {
        self.addresses.contains(&address.to_lowercase())
    }

    pub fn owns_phone(&self, digits: &str) -> bool {
        self.phones.contains(digits)
    }

    pub fn owns_license(&self, number: &str) -> bool {
        self.nmls_licenses.contains(number) || self.agent_licenses.contains(number)
    }

    pub fn owns_company(&self, name: &str) -> bool {
        self.companies.contains(&name.to_lowercase())
    }
}

/// Main configuration structure for siftbox
#[derive(Debug, Clone)]
pub struct SiftboxConfig {
    /// Mbox archive files to ingest
    pub archives: Vec<PathBuf>,

    /// Directory holding every persisted JSON document
    pub state_dir: PathBuf,

    /// Operator identity used for direction and attribution filtering
    pub operator: OperatorProfile,

    /// Confidence below which a contact is escalated for human review
    pub review_threshold: f64,

    /// Minimum classification confidence for the confirmed partition
    pub export_min_confidence: f64,

    /// Subject lines sampled per address record
    pub max_subject_samples: usize,

    /// Most recent bodies sampled per contact for signature/LLM extraction
    pub max_bodies_per_contact: usize,

    /// Whether the LLM-assisted extraction stage runs at all
    pub llm_enabled: bool,

    /// LLM provider (from genai)
    pub provider: AdapterKind,

    /// Model name (provider-specific)
    pub model: String,

    /// LLM request timeout in seconds
    pub request_timeout_secs: u64,

    /// Fixed delay between LLM calls in milliseconds
    pub rate_limit_ms: u64,

    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
}

fn env_list(key: &str) -> Vec<String> {
    env::var(key)
        .map(|v| {
            v.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Normalizes a phone number to its bare digits, dropping a leading country 1
pub fn normalize_phone(raw: &str) -> String {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() == 11 && digits.starts_with('1') {
        digits[1..].to_string()
    } else {
        digits
    }
}

impl Default for SiftboxConfig {
    /// Loads configuration from environment variables with defaults
    fn default() -> Self {
        let provider = env::var("SIFTBOX_PROVIDER")
            .ok()
            .and_then(|s| AdapterKind::from_lower_str(&s.to_lowercase()))
            .unwrap_or(AdapterKind::Ollama);

        let model = env::var("SIFTBOX_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());

        let state_dir = env::var("SIFTBOX_STATE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::data_dir()
                    .unwrap_or_else(env::temp_dir)
                    .join("siftbox")
            });

        let operator = OperatorProfile {
            addresses: env_list("SIFTBOX_OPERATOR_ADDRESSES")
                .into_iter()
                .map(|a| a.to_lowercase())
                .collect(),
            phones: env_list("SIFTBOX_OPERATOR_PHONES")
                .iter()
                .map(|p| normalize_phone(p))
                .collect(),
            nmls_licenses: env_list("SIFTBOX_OPERATOR_NMLS").into_iter().collect(),
            agent_licenses: env_list("SIFTBOX_OPERATOR_AGENT_LICENSES")
                .into_iter()
                .collect(),
            companies: env_list("SIFTBOX_OPERATOR_COMPANIES")
                .into_iter()
                .map(|c| c.to_lowercase())
                .collect(),
        };

        Self {
            archives: env_list("SIFTBOX_ARCHIVE").into_iter().map(PathBuf::from).collect(),
            state_dir,
            operator,
            review_threshold: env_parse("SIFTBOX_REVIEW_THRESHOLD", DEFAULT_REVIEW_THRESHOLD),
            export_min_confidence: env_parse(
                "SIFTBOX_EXPORT_MIN_CONFIDENCE",
                DEFAULT_EXPORT_MIN_CONFIDENCE,
            ),
            max_subject_samples: env_parse("SIFTBOX_MAX_SUBJECT_SAMPLES", DEFAULT_MAX_SUBJECT_SAMPLES),
            max_bodies_per_contact: env_parse("SIFTBOX_MAX_BODIES", DEFAULT_MAX_BODIES),
            llm_enabled: true,
            provider,
            model,
            request_timeout_secs: env_parse("SIFTBOX_REQUEST_TIMEOUT", DEFAULT_REQUEST_TIMEOUT_SECS),
            rate_limit_ms: env_parse("SIFTBOX_RATE_LIMIT_MS", DEFAULT_RATE_LIMIT_MS),
            log_level: env::var("SIFTBOX_LOG_LEVEL")
                .unwrap_or_else(|_| "info".to_string())
                .to_lowercase(),
        }
    }
}

impl SiftboxConfig {
    /// Validates the configuration for a full pipeline run
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if thresholds are out of range, the archive or
    /// operator identity is missing, or runtime parameters are unreasonable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.operator.addresses.is_empty() {
            return Err(ConfigError::MissingOperatorAddresses);
        }
        if self.archives.is_empty() {
            return Err(ConfigError::MissingArchive);
        }

        for (name, value) in [
            ("review threshold", self.review_threshold),
            ("export minimum confidence", self.export_min_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::ValidationFailed(format!(
                    "{} must be between 0.0 and 1.0, got {}",
                    name, value
                )));
            }
        }

        if self.request_timeout_secs == 0 {
            return Err(ConfigError::ValidationFailed(
                "Request timeout must be at least 1 second".to_string(),
            ));
        }
        if self.request_timeout_secs > 600 {
            return Err(ConfigError::ValidationFailed(
                "Request timeout cannot exceed 10 minutes".to_string(),
            ));
        }

        if self.max_subject_samples == 0 || self.max_bodies_per_contact == 0 {
            return Err(ConfigError::ValidationFailed(
                "Sample limits must be at least 1".to_string(),
            ));
        }

        match self.log_level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(ConfigError::ValidationFailed(format!(
                    "Invalid log level: {}. Valid options: trace, debug, info, warn, error",
                    other
                )))
            }
        }

        Ok(())
    }
}
