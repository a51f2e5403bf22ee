//! Qdrant-backed document index
//!
//! Production implementation of the [`DocumentSearch`] collaborator plus the
//! upsert path the webhook ingestion flow uses. Filters are per-user always,
//! with optional source and date-range narrowing.

use qdrant_client::{
    client::QdrantClient,
    qdrant::{
        Condition, CreateCollection, Distance, FieldCondition, Filter, Match, PointStruct, Range,
        SearchPoints, VectorParams, VectorsConfig,
    },
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use super::embedding::QueryEmbedder;
use super::DocumentSearch;
use crate::context::models::{Document, DocumentSource, SearchFilters};
use crate::error::{Error, Result};

/// Document index configuration
#[derive(Debug, Clone)]
pub struct DocumentIndexConfig {
    pub collection_name: String,
    pub vector_size: usize,
}

impl Default for DocumentIndexConfig {
    fn default() -> Self {
        Self {
            collection_name: "documents".to_string(),
            vector_size: 1536,
        }
    }
}

/// Qdrant document index
pub struct QdrantDocumentIndex {
    client: QdrantClient,
    embedder: Arc<dyn QueryEmbedder>,
    config: DocumentIndexConfig,
}

impl QdrantDocumentIndex {
    /// Create the index, ensuring the collection exists
    pub async fn new(
        client: QdrantClient,
        embedder: Arc<dyn QueryEmbedder>,
        config: DocumentIndexConfig,
    ) -> Result<Self> {
        let index = Self {
            client,
            embedder,
            config,
        };
        index.ensure_collection().await?;
        Ok(index)
    }

    async fn ensure_collection(&self) -> Result<()> {
        let collections = self
            .client
            .list_collections()
            .await
            .map_err(|e| Error::Search(format!("Failed to list collections: {}", e)))?;

        let exists = collections
            .collections
            .iter()
            .any(|c| c.name == self.config.collection_name);

        if !exists {
            info!("Creating document collection: {}", self.config.collection_name);

            self.client
                .create_collection(&CreateCollection {
                    collection_name: self.config.collection_name.clone(),
                    vectors_config: Some(VectorsConfig {
                        config: Some(qdrant_client::qdrant::vectors_config::Config::Params(
                            VectorParams {
                                size: self.config.vector_size as u64,
                                distance: Distance::Cosine.into(),
                                ..Default::default()
                            },
                        )),
                    }),
                    ..Default::default()
                })
                .await
                .map_err(|e| Error::Search(format!("Failed to create collection: {}", e)))?;
        }

        Ok(())
    }

    /// Upsert one ingested document
    pub async fn upsert_document(&self, document: &Document) -> Result<()> {
        let vector = self.embedder.embed(&document.content).await?;

        let payload_json = serde_json::json!({
            "user_id": document.user_id,
            "source": document.source.as_str(),
            "title": document.title,
            "content": document.content,
            "created_at": document.created_at.to_rfc3339(),
            "created_at_ts": document.created_at.timestamp(),
            "metadata": document.metadata,
        });

        let payload: HashMap<String, serde_json::Value> = payload_json
            .as_object()
            .ok_or_else(|| Error::Search("Failed to build payload object".to_string()))?
            .clone()
            .into_iter()
            .collect();

        let point = PointStruct::new(document.id.clone(), vector, payload);

        self.client
            .upsert_points(&self.config.collection_name, None, vec![point], None)
            .await
            .map_err(|e| Error::Search(format!("Failed to upsert document: {}", e)))?;

        debug!(id = %document.id, "document indexed");
        Ok(())
    }

    fn build_filter(user_id: &str, filters: &Option<SearchFilters>) -> Filter {
        let mut conditions = vec![Condition {
            condition_one_of: Some(qdrant_client::qdrant::condition::ConditionOneOf::Field(
                FieldCondition {
                    key: "user_id".to_string(),
                    r#match: Some(Match {
                        match_value: Some(qdrant_client::qdrant::r#match::MatchValue::Keyword(
                            user_id.to_string(),
                        )),
                    }),
                    ..Default::default()
                },
            )),
        }];

        if let Some(filters) = filters {
            if let Some(source) = filters.source {
                conditions.push(Condition {
                    condition_one_of: Some(
                        qdrant_client::qdrant::condition::ConditionOneOf::Field(FieldCondition {
                            key: "source".to_string(),
                            r#match: Some(Match {
                                match_value: Some(
                                    qdrant_client::qdrant::r#match::MatchValue::Keyword(
                                        source.as_str().to_string(),
                                    ),
                                ),
                            }),
                            ..Default::default()
                        }),
                    ),
                });
            }
            if let Some((start, end)) = filters.date_range {
                conditions.push(Condition {
                    condition_one_of: Some(
                        qdrant_client::qdrant::condition::ConditionOneOf::Field(FieldCondition {
                            key: "created_at_ts".to_string(),
                            range: Some(Range {
                                gte: Some(start.timestamp() as f64),
                                lte: Some(end.timestamp() as f64),
                                ..Default::default()
                            }),
                            ..Default::default()
                        }),
                    ),
                });
            }
        }

        Filter {
            must: conditions,
            ..Default::default()
        }
    }
}

#[async_trait::async_trait]
impl DocumentSearch for QdrantDocumentIndex {
    async fn search_similar(
        &self,
        user_id: &str,
        query: &str,
        limit: usize,
        filters: Option<SearchFilters>,
    ) -> Result<Vec<Document>> {
        let vector = self.embedder.embed(query).await?;
        let filter = Self::build_filter(user_id, &filters);

        let search_result = self
            .client
            .search_points(&SearchPoints {
                collection_name: self.config.collection_name.clone(),
                vector,
                filter: Some(filter),
                limit: limit as u64,
                with_payload: Some(true.into()),
                ..Default::default()
            })
            .await
            .map_err(|e| Error::Search(format!("Failed to search documents: {}", e)))?;

        let documents: Vec<Document> = search_result
            .result
            .iter()
            .filter_map(|point| {
                let payload = &point.payload;
                let source = match payload.get("source")?.as_str()? {
                    "email" => DocumentSource::Email,
                    "hubspot" => DocumentSource::Hubspot,
                    "calendar" => DocumentSource::Calendar,
                    _ => DocumentSource::Other,
                };
                Some(Document {
                    id: point.id.clone()?.to_string(),
                    user_id: payload.get("user_id")?.as_str()?.to_string(),
                    source,
                    title: payload.get("title")?.as_str()?.to_string(),
                    content: payload.get("content")?.as_str()?.to_string(),
                    created_at: chrono::DateTime::parse_from_rfc3339(
                        payload.get("created_at")?.as_str()?,
                    )
                    .ok()?
                    .with_timezone(&chrono::Utc),
                    metadata: HashMap::new(),
                })
            })
            .collect();

        debug!(count = documents.len(), limit, "document search complete");
        Ok(documents)
    }
}
