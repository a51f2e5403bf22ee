//! Data models for retrieved context

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::services::{MessageRecord, OngoingInstruction, TaskRecord};

/// Origin of an ingested document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentSource {
    Email,
    Hubspot,
    Calendar,
    Other,
}

impl DocumentSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Hubspot => "hubspot",
            Self::Calendar => "calendar",
            Self::Other => "other",
        }
    }
}

/// One ingested document as returned by semantic search
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub user_id: String,
    pub source: DocumentSource,
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Filters for a semantic search
#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    pub source: Option<DocumentSource>,
    pub date_range: Option<(DateTime<Utc>, DateTime<Utc>)>,
}

impl SearchFilters {
    pub fn source(source: DocumentSource) -> Self {
        Self {
            source: Some(source),
            date_range: None,
        }
    }

    pub fn since(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            source: None,
            date_range: Some((start, end)),
        }
    }
}

/// Counts summarizing an assembled context bundle
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextSummary {
    pub documents: usize,
    pub instructions: usize,
    pub recent_messages: usize,
    pub pending_tasks: usize,
}

/// The aggregated context bundle handed to the prompt composer.
/// Built fresh per request; read-only downstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextSections {
    pub documents: Vec<Document>,
    pub instructions: Vec<OngoingInstruction>,
    pub recent_context: Vec<MessageRecord>,
    pub pending_tasks: Vec<TaskRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger: Option<Value>,
    pub summary: ContextSummary,
}

impl ContextSections {
    /// An empty bundle, used when retrieval fails and the pipeline degrades
    pub fn empty() -> Self {
        Self {
            documents: vec![],
            instructions: vec![],
            recent_context: vec![],
            pending_tasks: vec![],
            trigger: None,
            summary: ContextSummary::default(),
        }
    }

    pub fn with_summary(mut self) -> Self {
        self.summary = ContextSummary {
            documents: self.documents.len(),
            instructions: self.instructions.len(),
            recent_messages: self.recent_context.len(),
            pending_tasks: self.pending_tasks.len(),
        };
        self
    }
}
