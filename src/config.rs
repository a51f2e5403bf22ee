//! Service configuration
//!
//! Layered: `config/default.toml` (optional) → `ASSISTANT__`-prefixed
//! environment variables. Secrets are referenced by env-var name in the
//! config and resolved to `Secret` values at wiring time.

use secrecy::Secret;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::llm::ProviderConfig;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmSettings,

    #[serde(default)]
    pub embedding: EmbeddingSettings,

    #[serde(default)]
    pub vector_db: VectorDbSettings,

    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub logging: LoggingSettings,

    #[serde(default)]
    pub executor: ExecutorSettings,
}

/// LLM provider list, tried in order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    #[serde(default = "default_providers")]
    pub providers: Vec<ProviderSettings>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_temperature() -> f32 {
    0.2
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            providers: default_providers(),
            temperature: default_temperature(),
        }
    }
}

/// One named provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    pub name: String,

    pub api_url: String,

    /// Name of the environment variable holding the API key
    #[serde(default)]
    pub api_key_env: Option<String>,

    pub model: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_max_tokens() -> u32 {
    2048
}

fn default_providers() -> Vec<ProviderSettings> {
    vec![ProviderSettings {
        name: "openai".to_string(),
        api_url: "https://api.openai.com/v1/chat/completions".to_string(),
        api_key_env: Some("OPENAI_API_KEY".to_string()),
        model: "gpt-4o-mini".to_string(),
        max_tokens: default_max_tokens(),
    }]
}

/// Embedding endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingSettings {
    #[serde(default = "default_embedding_url")]
    pub api_url: String,

    #[serde(default)]
    pub api_token_env: Option<String>,

    #[serde(default = "default_embedding_model")]
    pub model: String,

    #[serde(default = "default_embedding_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_embedding_url() -> String {
    "http://localhost:8090/v1/embeddings".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_embedding_timeout_ms() -> u64 {
    15_000
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            api_url: default_embedding_url(),
            api_token_env: None,
            model: default_embedding_model(),
            timeout_ms: default_embedding_timeout_ms(),
        }
    }
}

/// Vector database connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorDbSettings {
    #[serde(default = "default_vector_db_url")]
    pub url: String,

    #[serde(default = "default_collection_name")]
    pub collection_name: String,

    #[serde(default = "default_vector_size")]
    pub vector_size: usize,
}

fn default_vector_db_url() -> String {
    "http://localhost:6334".to_string()
}

fn default_collection_name() -> String {
    "documents".to_string()
}

fn default_vector_size() -> usize {
    1536
}

impl Default for VectorDbSettings {
    fn default() -> Self {
        Self {
            url: default_vector_db_url(),
            collection_name: default_collection_name(),
            vector_size: default_vector_size(),
        }
    }
}

/// HTTP server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8081
}

fn default_max_body_bytes() -> usize {
    256 * 1024
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

/// Logging
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Executor dedup cache
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorSettings {
    #[serde(default = "default_dedup_ttl_secs")]
    pub dedup_ttl_secs: u64,

    #[serde(default = "default_dedup_capacity")]
    pub dedup_capacity: u64,
}

fn default_dedup_ttl_secs() -> u64 {
    300
}

fn default_dedup_capacity() -> u64 {
    4096
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            dedup_ttl_secs: default_dedup_ttl_secs(),
            dedup_capacity: default_dedup_capacity(),
        }
    }
}

impl Config {
    /// Load from the optional config file and the environment
    pub fn load() -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::Environment::with_prefix("ASSISTANT").separator("__"))
            .build()
            .map_err(|e| Error::Configuration(e.to_string()))?;

        settings
            .try_deserialize()
            .map_err(|e| Error::Configuration(e.to_string()))
    }

    /// Resolve provider settings into client configs, reading API keys from
    /// the environment variables they name
    pub fn provider_configs(&self) -> Vec<ProviderConfig> {
        self.llm
            .providers
            .iter()
            .map(|settings| ProviderConfig {
                name: settings.name.clone(),
                api_url: settings.api_url.clone(),
                api_key: settings
                    .api_key_env
                    .as_deref()
                    .and_then(|name| std::env::var(name).ok())
                    .map(Secret::new),
                model: settings.model.clone(),
                max_tokens: settings.max_tokens,
            })
            .collect()
    }

    pub fn dedup_ttl(&self) -> Duration {
        Duration::from_secs(self.executor.dedup_ttl_secs)
    }

    pub fn embedding_timeout(&self) -> Duration {
        Duration::from_millis(self.embedding.timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.port, 8081);
        assert_eq!(config.executor.dedup_ttl_secs, 300);
        assert_eq!(config.llm.providers.len(), 1);
        assert_eq!(config.llm.providers[0].name, "openai");
    }

    #[test]
    fn test_provider_configs_resolve_in_order() {
        let mut config = Config::default();
        config.llm.providers = vec![
            ProviderSettings {
                name: "primary".to_string(),
                api_url: "https://a.example.test".to_string(),
                api_key_env: None,
                model: "m1".to_string(),
                max_tokens: 1024,
            },
            ProviderSettings {
                name: "fallback".to_string(),
                api_url: "https://b.example.test".to_string(),
                api_key_env: None,
                model: "m2".to_string(),
                max_tokens: 1024,
            },
        ];
        let providers = config.provider_configs();
        assert_eq!(providers.len(), 2);
        assert_eq!(providers[0].name, "primary");
        assert_eq!(providers[1].name, "fallback");
    }

    #[test]
    fn test_vector_db_defaults() {
        let settings = VectorDbSettings::default();
        assert_eq!(settings.url, "http://localhost:6334");
        assert_eq!(settings.collection_name, "documents");
        assert_eq!(settings.vector_size, 1536);
    }
}
