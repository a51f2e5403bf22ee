//! Query embedding client
//!
//! The embedding model itself is an external collaborator; this is the thin
//! HTTP seam the document index uses to vectorize queries and ingested
//! documents.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::error::{Error, Result};

/// Embedding seam
#[async_trait]
pub trait QueryEmbedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Configuration for the HTTP embedder
#[derive(Debug, Clone)]
pub struct EmbedderConfig {
    pub api_url: String,
    pub api_token: Option<Secret<String>>,
    pub model: String,
    pub timeout: Duration,
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8090/v1/embeddings".to_string(),
            api_token: None,
            model: "text-embedding-3-small".to_string(),
            timeout: Duration::from_secs(15),
        }
    }
}

/// HTTP embedder against an OpenAI-compatible embeddings endpoint
pub struct HttpEmbedder {
    client: Client,
    config: EmbedderConfig,
}

impl HttpEmbedder {
    pub fn new(config: EmbedderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Configuration(e.to_string()))?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl QueryEmbedder for HttpEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let request = EmbeddingRequest {
            input: text.to_string(),
            model: self.config.model.clone(),
        };

        let mut req = self.client.post(&self.config.api_url).json(&request);
        if let Some(token) = &self.config.api_token {
            req = req.bearer_auth(token.expose_secret());
        }

        let response = req
            .send()
            .await
            .map_err(|e| Error::External(format!("embedding request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::External(format!(
                "embedding API error {}: {}",
                status, body
            )));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| Error::External(format!("bad embedding response: {}", e)))?;

        let embedding = parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| Error::External("empty embedding response".to_string()))?;

        debug!(dims = embedding.len(), "embedded query text");
        Ok(embedding)
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest {
    input: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedder_config_default() {
        let config = EmbedderConfig::default();
        assert!(config.api_url.contains("/v1/embeddings"));
        assert_eq!(config.timeout, Duration::from_secs(15));
    }

    #[tokio::test]
    async fn test_http_embedder_against_mock() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/embeddings")
            .with_status(200)
            .with_body(r#"{"data": [{"embedding": [0.1, 0.2, 0.3]}]}"#)
            .create_async()
            .await;

        let embedder = HttpEmbedder::new(EmbedderConfig {
            api_url: format!("{}/v1/embeddings", server.url()),
            ..Default::default()
        })
        .unwrap();

        let vector = embedder.embed("hello").await.unwrap();
        assert_eq!(vector.len(), 3);
    }

    #[tokio::test]
    async fn test_http_embedder_error_path() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/embeddings")
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let embedder = HttpEmbedder::new(EmbedderConfig {
            api_url: format!("{}/v1/embeddings", server.url()),
            ..Default::default()
        })
        .unwrap();

        let result = embedder.embed("hello").await;
        assert!(matches!(result, Err(Error::External(_))));
    }
}
