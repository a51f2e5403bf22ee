//! Collaborator trait seams and the entities they exchange
//!
//! The concrete Gmail/Calendar/HubSpot clients, the embedding model, and
//! durable persistence live outside this crate. Everything here is the
//! narrow interface the pipeline consumes, plus an in-memory store used in
//! tests and local development.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::models::{Document, SearchFilters};
use crate::error::Result;

pub mod embedding;
pub mod memory;
pub mod qdrant_search;

pub use embedding::{HttpEmbedder, QueryEmbedder};
pub use memory::InMemoryStore;
pub use qdrant_search::QdrantDocumentIndex;

/// Semantic search over the user's ingested documents
#[async_trait]
pub trait DocumentSearch: Send + Sync {
    async fn search_similar(
        &self,
        user_id: &str,
        query: &str,
        limit: usize,
        filters: Option<SearchFilters>,
    ) -> Result<Vec<Document>>;
}

/// Outgoing email draft
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cc: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bcc: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
}

/// Sent email receipt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentEmail {
    pub id: String,
}

#[async_trait]
pub trait EmailService: Send + Sync {
    async fn send(&self, user_id: &str, email: OutgoingEmail) -> Result<SentEmail>;
}

/// Calendar event draft
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventDraft {
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default)]
    pub attendees: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Created calendar event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: String,
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Free slot on the user's calendar
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeSlot {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[async_trait]
pub trait CalendarService: Send + Sync {
    async fn create_event(&self, user_id: &str, draft: EventDraft) -> Result<CalendarEvent>;

    async fn available_slots(&self, user_id: &str, duration_minutes: u32)
        -> Result<Vec<TimeSlot>>;
}

/// CRM contact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default)]
    pub properties: Value,
}

impl Contact {
    /// Display name falling back to email, then id
    pub fn display_name(&self) -> String {
        match (&self.first_name, &self.last_name) {
            (Some(f), Some(l)) => format!("{} {}", f, l),
            (Some(f), None) => f.clone(),
            (None, Some(l)) => l.clone(),
            (None, None) => self
                .email
                .clone()
                .unwrap_or_else(|| self.id.clone()),
        }
    }
}

/// New contact payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewContact {
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
}

/// Paging parameters for bulk contact listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactPage {
    pub limit: usize,
    pub offset: usize,
    #[serde(default)]
    pub properties: Vec<String>,
}

impl Default for ContactPage {
    fn default() -> Self {
        Self {
            limit: 50,
            offset: 0,
            properties: vec![],
        }
    }
}

/// One page of contacts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactList {
    pub contacts: Vec<Contact>,
    pub total: usize,
    pub has_more: bool,
}

/// CRM note
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactNote {
    pub id: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait CrmService: Send + Sync {
    async fn search_contacts(&self, user_id: &str, query: &str) -> Result<Vec<Contact>>;

    async fn create_contact(&self, user_id: &str, contact: NewContact) -> Result<Contact>;

    async fn add_note(&self, user_id: &str, contact_id: &str, note: &str) -> Result<()>;

    async fn contacts_page(&self, user_id: &str, page: ContactPage) -> Result<ContactList>;

    async fn contact_notes(&self, user_id: &str, contact_id: &str) -> Result<Vec<ContactNote>>;
}

/// Priority of an ongoing instruction
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InstructionPriority {
    Low,
    Normal,
    High,
}

impl Default for InstructionPriority {
    fn default() -> Self {
        Self::Normal
    }
}

/// A persisted natural-language conditional rule, evaluated against future events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OngoingInstruction {
    pub id: String,
    pub user_id: String,
    pub instruction: String,
    pub is_active: bool,
    #[serde(default)]
    pub priority: InstructionPriority,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Task status lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

/// A per-action task record; created before the side effect, updated after.
/// Task creation is not transactional with the external call: a crash in
/// between leaves a pending/in_progress row (at-least-once delivery).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: String,
    pub user_id: String,
    pub kind: String,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Conversation message role/content pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    pub role: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Persistence collaborator: instruction CRUD, task CRUD, conversation
/// history, notifications, and the activity log. Every operation is scoped
/// by user id; writes are create/update-by-id (no optimistic locking,
/// known gap for high-concurrency multi-tab use).
#[async_trait]
pub trait AssistantStore: Send + Sync {
    async fn create_instruction(
        &self,
        user_id: &str,
        instruction: &str,
        priority: InstructionPriority,
    ) -> Result<OngoingInstruction>;

    async fn list_instructions(
        &self,
        user_id: &str,
        only_active: bool,
    ) -> Result<Vec<OngoingInstruction>>;

    async fn set_instruction_active(&self, user_id: &str, id: &str, active: bool) -> Result<()>;

    async fn delete_instruction(&self, user_id: &str, id: &str) -> Result<()>;

    async fn create_task(
        &self,
        user_id: &str,
        kind: &str,
        fingerprint: Option<String>,
    ) -> Result<TaskRecord>;

    async fn update_task_status(
        &self,
        user_id: &str,
        task_id: &str,
        status: TaskStatus,
        detail: Option<String>,
    ) -> Result<()>;

    async fn pending_tasks(&self, user_id: &str) -> Result<Vec<TaskRecord>>;

    async fn recent_messages(&self, user_id: &str, limit: usize) -> Result<Vec<MessageRecord>>;

    async fn append_message(&self, user_id: &str, role: &str, content: &str) -> Result<()>;

    async fn create_notification(&self, user_id: &str, title: &str, body: &str) -> Result<()>;

    async fn append_activity(&self, user_id: &str, kind: &str, detail: &str) -> Result<()>;
}
