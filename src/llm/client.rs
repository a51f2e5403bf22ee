//! Provider-failover chat client
//!
//! The client holds an explicit, ordered provider list passed in at
//! construction time, not a process-wide singleton. Each provider gets exactly
//! one attempt per request; failures accumulate and exhaustion yields one
//! aggregated error. No backoff happens inside this subsystem.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::metrics::METRICS;

/// One ordered role/content pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// LLM client errors
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Initialization error: {0}")]
    Initialization(String),

    #[error("No providers configured")]
    NoProviders,

    #[error("All providers failed: {0}")]
    AllProvidersFailed(String),
}

/// One named provider, tried in list order
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub name: String,
    pub api_url: String,
    pub api_key: Option<Secret<String>>,
    pub model: String,
    pub max_tokens: u32,
}

/// Generation seam the pipeline depends on; the HTTP client below is the
/// production implementation
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn generate(&self, messages: &[ChatMessage], temperature: f32)
        -> Result<String, LlmError>;
}

/// OpenAI-compatible chat client with ordered provider failover
pub struct LlmClient {
    http: Client,
    providers: Vec<ProviderConfig>,
}

impl LlmClient {
    pub fn new(providers: Vec<ProviderConfig>) -> Result<Self, LlmError> {
        let http = Client::builder()
            .build()
            .map_err(|e| LlmError::Initialization(e.to_string()))?;
        Ok(Self { http, providers })
    }

    async fn call_provider(
        &self,
        provider: &ProviderConfig,
        messages: &[ChatMessage],
        temperature: f32,
    ) -> Result<String, String> {
        let request = ChatCompletionRequest {
            model: provider.model.clone(),
            messages: messages.to_vec(),
            max_tokens: Some(provider.max_tokens),
            temperature: Some(temperature),
        };

        let mut req = self.http.post(&provider.api_url).json(&request);
        if let Some(api_key) = &provider.api_key {
            req = req.bearer_auth(api_key.expose_secret());
        }

        let response = req.send().await.map_err(|e| e.to_string())?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("HTTP {}: {}", status, body));
        }

        let completion: ChatCompletionResponse =
            response.json().await.map_err(|e| e.to_string())?;

        completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| "no choices in response".to_string())
    }
}

#[async_trait]
impl ChatModel for LlmClient {
    async fn generate(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
    ) -> Result<String, LlmError> {
        if self.providers.is_empty() {
            return Err(LlmError::NoProviders);
        }

        let mut failures = Vec::new();
        for (index, provider) in self.providers.iter().enumerate() {
            if index > 0 {
                METRICS.record_llm_failover();
            }
            debug!(provider = %provider.name, model = %provider.model, "calling provider");

            match self.call_provider(provider, messages, temperature).await {
                Ok(text) => {
                    METRICS.record_llm_request(&provider.name, true);
                    return Ok(text);
                }
                Err(e) => {
                    METRICS.record_llm_request(&provider.name, false);
                    warn!(provider = %provider.name, error = %e, "provider failed, trying next");
                    failures.push(format!("{}: {}", provider.name, e));
                }
            }
        }

        Err(LlmError::AllProvidersFailed(failures.join("; ")))
    }
}

// OpenAI-compatible API types
#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(name: &str, url: &str) -> ProviderConfig {
        ProviderConfig {
            name: name.to_string(),
            api_url: url.to_string(),
            api_key: None,
            model: "test-model".to_string(),
            max_tokens: 256,
        }
    }

    fn completion_body(text: &str) -> String {
        format!(
            r#"{{"choices": [{{"message": {{"role": "assistant", "content": "{}"}}}}]}}"#,
            text
        )
    }

    #[test]
    fn test_empty_provider_list_errors() {
        let client = LlmClient::new(vec![]).unwrap();
        let result = tokio_test::block_on(client.generate(&[ChatMessage::user("hi")], 0.2));
        assert!(matches!(result, Err(LlmError::NoProviders)));
    }

    #[tokio::test]
    async fn test_first_provider_success_short_circuits() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_body(completion_body("hello"))
            .create_async()
            .await;

        let client = LlmClient::new(vec![provider(
            "primary",
            &format!("{}/v1/chat/completions", server.url()),
        )])
        .unwrap();

        let text = client
            .generate(&[ChatMessage::user("hi")], 0.2)
            .await
            .unwrap();
        assert_eq!(text, "hello");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_failover_to_second_provider() {
        let mut broken = mockito::Server::new_async().await;
        broken
            .mock("POST", "/v1/chat/completions")
            .with_status(500)
            .with_body("upstream exploded")
            .create_async()
            .await;

        let mut healthy = mockito::Server::new_async().await;
        healthy
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_body(completion_body("recovered"))
            .create_async()
            .await;

        let client = LlmClient::new(vec![
            provider("primary", &format!("{}/v1/chat/completions", broken.url())),
            provider("fallback", &format!("{}/v1/chat/completions", healthy.url())),
        ])
        .unwrap();

        let text = client
            .generate(&[ChatMessage::user("hi")], 0.2)
            .await
            .unwrap();
        assert_eq!(text, "recovered");
    }

    #[tokio::test]
    async fn test_exhaustion_aggregates_all_failures() {
        let mut a = mockito::Server::new_async().await;
        a.mock("POST", "/v1/chat/completions")
            .with_status(500)
            .with_body("a down")
            .create_async()
            .await;
        let mut b = mockito::Server::new_async().await;
        b.mock("POST", "/v1/chat/completions")
            .with_status(503)
            .with_body("b down")
            .create_async()
            .await;

        let client = LlmClient::new(vec![
            provider("primary", &format!("{}/v1/chat/completions", a.url())),
            provider("fallback", &format!("{}/v1/chat/completions", b.url())),
        ])
        .unwrap();

        let err = client
            .generate(&[ChatMessage::user("hi")], 0.2)
            .await
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("primary"));
        assert!(message.contains("fallback"));
    }
}
