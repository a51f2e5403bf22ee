//! Service entry point

use std::sync::Arc;

use assistant_core::api::{build_router, AppState};
use assistant_core::assistant::Assistant;
use assistant_core::config::Config;
use assistant_core::llm::LlmClient;
use assistant_core::services::memory::{InMemoryStore, SandboxServices};
use assistant_core::services::DocumentSearch;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::load()?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone()));
    if config.logging.json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let store = Arc::new(InMemoryStore::new());
    let sandbox = Arc::new(SandboxServices::new());

    // The qdrant-backed index is wired when the vector DB is reachable;
    // otherwise retrieval degrades to the empty-context path.
    let search: Arc<dyn DocumentSearch> = match build_search_index(&config).await {
        Ok(index) => index,
        Err(e) => {
            tracing::warn!(error = %e, "vector search unavailable, using empty index");
            Arc::new(EmptyIndex)
        }
    };

    let llm = Arc::new(LlmClient::new(config.provider_configs())?);

    let assistant = Arc::new(Assistant::new(
        search,
        store.clone(),
        sandbox.clone(),
        sandbox.clone(),
        sandbox.clone(),
        llm,
        config.llm.temperature,
        config.dedup_ttl(),
        config.executor.dedup_capacity,
    ));

    let state = AppState {
        assistant,
        store,
    };
    let router = build_router(state, config.server.max_body_bytes);

    let address = format!("{}:{}", config.server.host, config.server.port);
    info!(%address, "assistant-core listening");

    let listener = tokio::net::TcpListener::bind(&address).await?;
    axum::serve(listener, router).await?;

    Ok(())
}

async fn build_search_index(config: &Config) -> anyhow::Result<Arc<dyn DocumentSearch>> {
    use assistant_core::services::embedding::{EmbedderConfig, HttpEmbedder};
    use assistant_core::services::qdrant_search::{DocumentIndexConfig, QdrantDocumentIndex};
    use qdrant_client::client::QdrantClient;
    use secrecy::Secret;

    let embedder = Arc::new(HttpEmbedder::new(EmbedderConfig {
        api_url: config.embedding.api_url.clone(),
        api_token: config
            .embedding
            .api_token_env
            .as_deref()
            .and_then(|name| std::env::var(name).ok())
            .map(Secret::new),
        model: config.embedding.model.clone(),
        timeout: config.embedding_timeout(),
    })?);

    let client = QdrantClient::from_url(&config.vector_db.url)
        .build()
        .map_err(|e| anyhow::anyhow!("qdrant client: {}", e))?;

    let index = QdrantDocumentIndex::new(
        client,
        embedder,
        DocumentIndexConfig {
            collection_name: config.vector_db.collection_name.clone(),
            vector_size: config.vector_db.vector_size,
        },
    )
    .await?;

    Ok(Arc::new(index))
}

/// Fallback index when no vector DB is configured: every search is empty
struct EmptyIndex;

#[async_trait::async_trait]
impl DocumentSearch for EmptyIndex {
    async fn search_similar(
        &self,
        _user_id: &str,
        _query: &str,
        _limit: usize,
        _filters: Option<assistant_core::context::SearchFilters>,
    ) -> assistant_core::Result<Vec<assistant_core::context::Document>> {
        Ok(vec![])
    }
}
