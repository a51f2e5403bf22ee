//! In-memory collaborators
//!
//! A dashmap-backed store and sandbox service implementations used by the
//! test suite and by local development when no real integrations are
//! configured. Not durable.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use dashmap::DashMap;
use serde_json::Value;
use uuid::Uuid;

use super::{
    AssistantStore, CalendarEvent, CalendarService, Contact, ContactList, ContactNote,
    ContactPage, CrmService, EmailService, EventDraft, InstructionPriority, MessageRecord,
    NewContact, OngoingInstruction, OutgoingEmail, SentEmail, TaskRecord, TaskStatus, TimeSlot,
};
use crate::error::{Error, Result};

/// In-memory implementation of [`AssistantStore`]
#[derive(Default)]
pub struct InMemoryStore {
    instructions: DashMap<String, Vec<OngoingInstruction>>,
    tasks: DashMap<String, Vec<TaskRecord>>,
    messages: DashMap<String, Vec<MessageRecord>>,
    notifications: DashMap<String, Vec<(String, String)>>,
    activity: DashMap<String, Vec<(String, String)>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Notifications recorded for a user (test hook)
    pub fn notifications_for(&self, user_id: &str) -> Vec<(String, String)> {
        self.notifications
            .get(user_id)
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    /// Activity entries recorded for a user (test hook)
    pub fn activity_for(&self, user_id: &str) -> Vec<(String, String)> {
        self.activity
            .get(user_id)
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    /// All task records for a user (test hook)
    pub fn tasks_for(&self, user_id: &str) -> Vec<TaskRecord> {
        self.tasks
            .get(user_id)
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl AssistantStore for InMemoryStore {
    async fn create_instruction(
        &self,
        user_id: &str,
        instruction: &str,
        priority: InstructionPriority,
    ) -> Result<OngoingInstruction> {
        let now = Utc::now();
        let record = OngoingInstruction {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            instruction: instruction.to_string(),
            is_active: true,
            priority,
            created_at: now,
            updated_at: now,
        };
        self.instructions
            .entry(user_id.to_string())
            .or_default()
            .push(record.clone());
        Ok(record)
    }

    async fn list_instructions(
        &self,
        user_id: &str,
        only_active: bool,
    ) -> Result<Vec<OngoingInstruction>> {
        Ok(self
            .instructions
            .get(user_id)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|i| !only_active || i.is_active)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn set_instruction_active(&self, user_id: &str, id: &str, active: bool) -> Result<()> {
        let mut entries = self
            .instructions
            .get_mut(user_id)
            .ok_or_else(|| Error::NotFound(format!("Instruction {}", id)))?;
        let instruction = entries
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or_else(|| Error::NotFound(format!("Instruction {}", id)))?;
        instruction.is_active = active;
        instruction.updated_at = Utc::now();
        Ok(())
    }

    async fn delete_instruction(&self, user_id: &str, id: &str) -> Result<()> {
        let mut entries = self
            .instructions
            .get_mut(user_id)
            .ok_or_else(|| Error::NotFound(format!("Instruction {}", id)))?;
        let before = entries.len();
        entries.retain(|i| i.id != id);
        if entries.len() == before {
            return Err(Error::NotFound(format!("Instruction {}", id)));
        }
        Ok(())
    }

    async fn create_task(
        &self,
        user_id: &str,
        kind: &str,
        fingerprint: Option<String>,
    ) -> Result<TaskRecord> {
        let now = Utc::now();
        let record = TaskRecord {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            kind: kind.to_string(),
            status: TaskStatus::Pending,
            detail: None,
            fingerprint,
            created_at: now,
            updated_at: now,
        };
        self.tasks
            .entry(user_id.to_string())
            .or_default()
            .push(record.clone());
        Ok(record)
    }

    async fn update_task_status(
        &self,
        user_id: &str,
        task_id: &str,
        status: TaskStatus,
        detail: Option<String>,
    ) -> Result<()> {
        let mut entries = self
            .tasks
            .get_mut(user_id)
            .ok_or_else(|| Error::NotFound(format!("Task {}", task_id)))?;
        let task = entries
            .iter_mut()
            .find(|t| t.id == task_id)
            .ok_or_else(|| Error::NotFound(format!("Task {}", task_id)))?;
        task.status = status;
        if detail.is_some() {
            task.detail = detail;
        }
        task.updated_at = Utc::now();
        Ok(())
    }

    async fn pending_tasks(&self, user_id: &str) -> Result<Vec<TaskRecord>> {
        Ok(self
            .tasks
            .get(user_id)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|t| t.status == TaskStatus::Pending)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn recent_messages(&self, user_id: &str, limit: usize) -> Result<Vec<MessageRecord>> {
        Ok(self
            .messages
            .get(user_id)
            .map(|entries| {
                let start = entries.len().saturating_sub(limit);
                entries[start..].to_vec()
            })
            .unwrap_or_default())
    }

    async fn append_message(&self, user_id: &str, role: &str, content: &str) -> Result<()> {
        self.messages
            .entry(user_id.to_string())
            .or_default()
            .push(MessageRecord {
                role: role.to_string(),
                content: content.to_string(),
                created_at: Utc::now(),
            });
        Ok(())
    }

    async fn create_notification(&self, user_id: &str, title: &str, body: &str) -> Result<()> {
        self.notifications
            .entry(user_id.to_string())
            .or_default()
            .push((title.to_string(), body.to_string()));
        Ok(())
    }

    async fn append_activity(&self, user_id: &str, kind: &str, detail: &str) -> Result<()> {
        self.activity
            .entry(user_id.to_string())
            .or_default()
            .push((kind.to_string(), detail.to_string()));
        Ok(())
    }
}

/// Sandbox implementations of the external services: everything succeeds
/// and is recorded in memory. Useful for local development and tests.
#[derive(Default)]
pub struct SandboxServices {
    pub sent_emails: DashMap<String, Vec<OutgoingEmail>>,
    pub events: DashMap<String, Vec<CalendarEvent>>,
    pub contacts: DashMap<String, Vec<Contact>>,
    pub notes: DashMap<String, Vec<(String, ContactNote)>>,
}

impl SandboxServices {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a contact for a user (test hook)
    pub fn seed_contact(&self, user_id: &str, contact: Contact) {
        self.contacts
            .entry(user_id.to_string())
            .or_default()
            .push(contact);
    }

    pub fn sent_for(&self, user_id: &str) -> Vec<OutgoingEmail> {
        self.sent_emails
            .get(user_id)
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    pub fn events_for(&self, user_id: &str) -> Vec<CalendarEvent> {
        self.events
            .get(user_id)
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    pub fn contacts_for(&self, user_id: &str) -> Vec<Contact> {
        self.contacts
            .get(user_id)
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl EmailService for SandboxServices {
    async fn send(&self, user_id: &str, email: OutgoingEmail) -> Result<SentEmail> {
        let id = Uuid::new_v4().to_string();
        self.sent_emails
            .entry(user_id.to_string())
            .or_default()
            .push(email);
        Ok(SentEmail { id })
    }
}

#[async_trait]
impl CalendarService for SandboxServices {
    async fn create_event(&self, user_id: &str, draft: EventDraft) -> Result<CalendarEvent> {
        let event = CalendarEvent {
            id: Uuid::new_v4().to_string(),
            title: draft.title,
            start: draft.start,
            end: draft.end,
        };
        self.events
            .entry(user_id.to_string())
            .or_default()
            .push(event.clone());
        Ok(event)
    }

    async fn available_slots(
        &self,
        _user_id: &str,
        duration_minutes: u32,
    ) -> Result<Vec<TimeSlot>> {
        let base = Utc::now() + Duration::hours(1);
        Ok((0..3)
            .map(|i| {
                let start = base + Duration::hours(i);
                TimeSlot {
                    start,
                    end: start + Duration::minutes(i64::from(duration_minutes)),
                }
            })
            .collect())
    }
}

#[async_trait]
impl CrmService for SandboxServices {
    async fn search_contacts(&self, user_id: &str, query: &str) -> Result<Vec<Contact>> {
        let needle = query.to_lowercase();
        Ok(self
            .contacts
            .get(user_id)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|c| {
                        c.id == query
                            || c.email
                                .as_deref()
                                .map(|e| e.to_lowercase().contains(&needle))
                                .unwrap_or(false)
                            || c.display_name().to_lowercase().contains(&needle)
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn create_contact(&self, user_id: &str, contact: NewContact) -> Result<Contact> {
        let record = Contact {
            id: Uuid::new_v4().to_string(),
            email: Some(contact.email),
            first_name: contact.first_name,
            last_name: contact.last_name,
            properties: Value::Null,
        };
        self.contacts
            .entry(user_id.to_string())
            .or_default()
            .push(record.clone());
        Ok(record)
    }

    async fn add_note(&self, user_id: &str, contact_id: &str, note: &str) -> Result<()> {
        self.notes
            .entry(user_id.to_string())
            .or_default()
            .push((
                contact_id.to_string(),
                ContactNote {
                    id: Uuid::new_v4().to_string(),
                    body: note.to_string(),
                    created_at: Utc::now(),
                },
            ));
        Ok(())
    }

    async fn contacts_page(&self, user_id: &str, page: ContactPage) -> Result<ContactList> {
        let all = self.contacts_for(user_id);
        let total = all.len();
        let contacts: Vec<Contact> = all
            .into_iter()
            .skip(page.offset)
            .take(page.limit)
            .collect();
        let has_more = page.offset + contacts.len() < total;
        Ok(ContactList {
            contacts,
            total,
            has_more,
        })
    }

    async fn contact_notes(&self, user_id: &str, contact_id: &str) -> Result<Vec<ContactNote>> {
        Ok(self
            .notes
            .get(user_id)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|(id, _)| id == contact_id)
                    .map(|(_, note)| note.clone())
                    .collect()
            })
            .unwrap_or_default())
    }
}
