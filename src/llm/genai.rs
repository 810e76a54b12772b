//! GenAI-based LLM client implementation
//!
//! Uses the `genai` crate to reach multiple providers (Ollama, OpenAI,
//! Claude, Gemini, Groq) through one interface.

use super::LlmClient;
use super::error::LlmError;
use super::types::{ChatMessage, LlmRequest, LlmResponse, MessageRole};
use async_trait::async_trait;
use genai::adapter::AdapterKind;
use genai::chat::{ChatMessage as GenAiChatMessage, ChatOptions, ChatRequest as GenAiChatRequest};
use genai::resolver::{AuthData, Endpoint, ServiceTargetResolver};
use genai::{Client, ModelIden, ServiceTarget};
use std::time::Duration;
use tracing::{debug, error};

/// GenAI-based LLM client supporting multiple providers
pub struct GenAiClient {
    client: Client,
    model: String,
    provider: AdapterKind,
    timeout: Duration,
}

impl GenAiClient {
    /// Creates a new GenAI client.
    ///
    /// `SIFTBOX_API_BASE_URL` overrides the provider's default endpoint,
    /// which is how a local Ollama on a non-standard port is reached.
    pub fn new(provider: AdapterKind, model: String, timeout: Duration) -> Result<Self, LlmError> {
        let custom_endpoint = std::env::var("SIFTBOX_API_BASE_URL").ok();

        let client = if let Some(endpoint_url) = custom_endpoint {
            debug!(
                "Using custom endpoint for {}: {}",
                provider.as_str(),
                endpoint_url
            );

            let provider_clone = provider;
            let model_clone = model.clone();
            let endpoint_clone = endpoint_url.clone();

            let resolver = ServiceTargetResolver::from_resolver_fn(
                move |_service_target: ServiceTarget| -> Result<ServiceTarget, genai::resolver::Error>
                {
                    let endpoint = Endpoint::from_owned(endpoint_clone.clone());

                    let auth = match provider_clone.default_key_env_name() {
                        Some(api_key_var) => AuthData::from_env(api_key_var),
                        None => AuthData::from_single(""),
                    };

                    let model_iden = ModelIden::new(provider_clone, &model_clone);

                    Ok(ServiceTarget {
                        endpoint,
                        auth,
                        model: model_iden,
                    })
                },
            );

            Client::builder()
                .with_service_target_resolver(resolver)
                .build()
        } else {
            Client::default()
        };

        debug!(
            "Creating GenAI client: provider={}, model={}",
            provider.as_str(),
            model,
        );

        Ok(Self {
            client,
            model,
            provider,
            timeout,
        })
    }

    fn convert_message(msg: &ChatMessage) -> GenAiChatMessage {
        match msg.role {
            MessageRole::System => GenAiChatMessage::system(&msg.content),
            MessageRole::User => GenAiChatMessage::user(&msg.content),
            MessageRole::Assistant => GenAiChatMessage::assistant(&msg.content),
        }
    }
}

#[async_trait]
impl LlmClient for GenAiClient {
    async fn chat(&self, request: LlmRequest) -> Result<LlmResponse, LlmError> {
        let start = std::time::Instant::now();

        let messages: Vec<GenAiChatMessage> =
            request.messages.iter().map(Self::convert_message).collect();

        let genai_request = GenAiChatRequest::new(messages);

        let mut options = ChatOptions::default();
        if let Some(temp) = request.temperature {
            options = options.with_temperature(temp as f64);
        }
        if let Some(max_tokens) = request.max_tokens {
            options = options.with_max_tokens(max_tokens);
        }

        let response = match tokio::time::timeout(
            self.timeout,
            self.client
                .exec_chat(&self.model, genai_request, Some(&options)),
        )
        .await
        {
            Ok(Ok(resp)) => resp,
            Ok(Err(e)) => {
                error!("{} API error: {}", self.provider.as_str(), e);
                return Err(LlmError::Api {
                    message: format!("{} request failed: {}", self.provider.as_str(), e),
                });
            }
            Err(_) => {
                error!(
                    "{} request timed out after {}s",
                    self.provider.as_str(),
                    self.timeout.as_secs()
                );
                return Err(LlmError::Timeout {
                    seconds: self.timeout.as_secs(),
                });
            }
        };

        let content = response.first_text().unwrap_or_default().to_string();

        Ok(LlmResponse::text(content, start.elapsed()))
    }
}

impl std::fmt::Debug for GenAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenAiClient")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_genai_client_creation() {
        let client = GenAiClient::new(
            AdapterKind::Ollama,
            "qwen2.5:14b".to_string(),
            Duration::from_secs(30),
        )
        .unwrap();

        assert_eq!(client.provider.as_str(), "Ollama");
        assert_eq!(client.model, "qwen2.5:14b");
    }

    #[test]
    fn test_debug_impl() {
        fn assert_debug<T: std::fmt::Debug>() {}
        assert_debug::<GenAiClient>();
    }
}
