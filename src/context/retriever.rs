//! Retrieval-augmented context assembly
//!
//! Fans out one broad semantic search plus intent-conditioned narrower
//! searches, concatenates the results without dedup, and caps the total.
//! The cap and the non-dedup behavior are load-bearing: overlapping hits
//! count against the 15-document budget.

use chrono::{Duration, Utc};
use futures::future::join_all;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use super::models::{ContextSections, Document, DocumentSource, SearchFilters};
use crate::error::Result;
use crate::intent::{Intent, IntentKind};
use crate::services::{AssistantStore, DocumentSearch};

/// Hard cap on documents handed to the prompt composer
pub const MAX_CONTEXT_DOCUMENTS: usize = 15;

const BROAD_LIMIT: usize = 5;
const SCOPED_LIMIT: usize = 3;
const RECENT_MESSAGE_LIMIT: usize = 10;
const ACTION_LOOKBACK_DAYS: i64 = 30;

/// Context retriever over the search and persistence collaborators
pub struct ContextRetriever {
    search: Arc<dyn DocumentSearch>,
    store: Arc<dyn AssistantStore>,
}

impl ContextRetriever {
    pub fn new(search: Arc<dyn DocumentSearch>, store: Arc<dyn AssistantStore>) -> Self {
        Self { search, store }
    }

    /// Run the search fan-out for a query. All started searches are awaited;
    /// any sub-search failure fails the batch (the caller degrades).
    pub async fn retrieve_documents(
        &self,
        user_id: &str,
        query: &str,
        intent: &Intent,
    ) -> Result<Vec<Document>> {
        let mut searches = vec![self
            .search
            .search_similar(user_id, query, BROAD_LIMIT, None)];

        match intent.kind {
            IntentKind::Question => {
                searches.push(self.search.search_similar(
                    user_id,
                    query,
                    SCOPED_LIMIT,
                    Some(SearchFilters::source(DocumentSource::Email)),
                ));
                searches.push(self.search.search_similar(
                    user_id,
                    query,
                    SCOPED_LIMIT,
                    Some(SearchFilters::source(DocumentSource::Hubspot)),
                ));
            }
            IntentKind::Action => {
                let now = Utc::now();
                searches.push(self.search.search_similar(
                    user_id,
                    query,
                    BROAD_LIMIT,
                    Some(SearchFilters::since(
                        now - Duration::days(ACTION_LOOKBACK_DAYS),
                        now,
                    )),
                ));
            }
            IntentKind::Search => {
                searches.push(self.search.search_similar(
                    user_id,
                    query,
                    SCOPED_LIMIT,
                    Some(SearchFilters::source(DocumentSource::Hubspot)),
                ));
            }
            _ => {}
        }

        let batches = join_all(searches).await;

        let mut documents = Vec::new();
        for batch in batches {
            documents.extend(batch?);
        }

        debug!(
            total = documents.len(),
            capped = documents.len().min(MAX_CONTEXT_DOCUMENTS),
            "search fan-out complete"
        );

        documents.truncate(MAX_CONTEXT_DOCUMENTS);
        Ok(documents)
    }

    /// Assemble the full context bundle for a request. Retrieval failure
    /// degrades to an empty document list with a warning; store reads are
    /// propagated.
    pub async fn build_sections(
        &self,
        user_id: &str,
        query: &str,
        intent: &Intent,
        trigger: Option<Value>,
    ) -> Result<ContextSections> {
        let documents = match self.retrieve_documents(user_id, query, intent).await {
            Ok(docs) => docs,
            Err(e) => {
                warn!(error = %e, "document retrieval failed, continuing with empty context");
                vec![]
            }
        };

        let instructions = self.store.list_instructions(user_id, true).await?;
        let recent_context = self
            .store
            .recent_messages(user_id, RECENT_MESSAGE_LIMIT)
            .await?;
        let pending_tasks = self.store.pending_tasks(user_id).await?;

        Ok(ContextSections {
            documents,
            instructions,
            recent_context,
            pending_tasks,
            trigger,
            summary: Default::default(),
        }
        .with_summary())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::memory::InMemoryStore;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    // Returns `per_search` hits regardless of the requested limit: the cap
    // must hold even against an over-returning backend.
    struct StubSearch {
        per_search: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl DocumentSearch for StubSearch {
        async fn search_similar(
            &self,
            user_id: &str,
            _query: &str,
            _limit: usize,
            _filters: Option<SearchFilters>,
        ) -> Result<Vec<Document>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok((0..self.per_search)
                .map(|i| Document {
                    id: format!("d{}", i),
                    user_id: user_id.to_string(),
                    source: DocumentSource::Email,
                    title: "doc".to_string(),
                    content: "content".to_string(),
                    created_at: Utc::now(),
                    metadata: HashMap::new(),
                })
                .collect())
        }
    }

    fn intent_of(kind: IntentKind) -> Intent {
        Intent {
            kind,
            confidence: 0.5,
            keywords: vec![],
            is_contact_query: false,
            contact_query_type: None,
            is_conditional_instruction: false,
        }
    }

    #[tokio::test]
    async fn test_cap_holds_with_overlapping_hits() {
        // Question intent fans out 3 concurrent searches; with 8 hits each
        // the concatenation is 24 and must be truncated to the cap.
        let search = Arc::new(StubSearch {
            per_search: 8,
            calls: AtomicUsize::new(0),
        });
        let store = Arc::new(InMemoryStore::new());
        let retriever = ContextRetriever::new(search.clone(), store);

        let docs = retriever
            .retrieve_documents("u1", "quarterly report", &intent_of(IntentKind::Question))
            .await
            .unwrap();
        assert_eq!(docs.len(), MAX_CONTEXT_DOCUMENTS);

        for kind in [IntentKind::Action, IntentKind::Search, IntentKind::General] {
            let docs = retriever
                .retrieve_documents("u1", "quarterly report", &intent_of(kind))
                .await
                .unwrap();
            assert!(docs.len() <= MAX_CONTEXT_DOCUMENTS);
        }
    }

    #[tokio::test]
    async fn test_question_intent_fans_out_three_searches() {
        let search = Arc::new(StubSearch {
            per_search: 1,
            calls: AtomicUsize::new(0),
        });
        let store = Arc::new(InMemoryStore::new());
        let retriever = ContextRetriever::new(search.clone(), store);

        retriever
            .retrieve_documents("u1", "what did acme say", &intent_of(IntentKind::Question))
            .await
            .unwrap();

        assert_eq!(search.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_duplicates_are_not_removed() {
        // Every stub search returns ids d0..dN; duplicates must survive.
        let search = Arc::new(StubSearch {
            per_search: 3,
            calls: AtomicUsize::new(0),
        });
        let store = Arc::new(InMemoryStore::new());
        let retriever = ContextRetriever::new(search, store);

        let docs = retriever
            .retrieve_documents("u1", "find acme in crm", &intent_of(IntentKind::Search))
            .await
            .unwrap();

        let d0_count = docs.iter().filter(|d| d.id == "d0").count();
        assert_eq!(d0_count, 2, "overlapping hits are concatenated, not deduped");
    }

    #[tokio::test]
    async fn test_build_sections_summary() {
        let search = Arc::new(StubSearch {
            per_search: 2,
            calls: AtomicUsize::new(0),
        });
        let store = Arc::new(InMemoryStore::new());
        let retriever = ContextRetriever::new(search, store);

        let sections = retriever
            .build_sections("u1", "hello", &intent_of(IntentKind::General), None)
            .await
            .unwrap();

        assert_eq!(sections.summary.documents, sections.documents.len());
        assert!(sections.trigger.is_none());
    }
}
