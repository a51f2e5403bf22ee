//! Integration tests for the assistant pipeline
//!
//! These drive the full query and event flows against the in-memory store,
//! the sandbox services, and a scripted language model.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use assistant_core::context::{Document, SearchFilters};
use assistant_core::llm::{ChatMessage, ChatModel, LlmError};
use assistant_core::prelude::*;
use assistant_core::proactive::EXECUTION_THRESHOLD;
use assistant_core::services::memory::SandboxServices;
use assistant_core::services::{Contact, InstructionPriority, TaskStatus};

struct EmptySearch;

#[async_trait]
impl DocumentSearch for EmptySearch {
    async fn search_similar(
        &self,
        _user_id: &str,
        _query: &str,
        _limit: usize,
        _filters: Option<SearchFilters>,
    ) -> assistant_core::Result<Vec<Document>> {
        Ok(vec![])
    }
}

struct ScriptedLlm {
    response: String,
}

#[async_trait]
impl ChatModel for ScriptedLlm {
    async fn generate(
        &self,
        _messages: &[ChatMessage],
        _temperature: f32,
    ) -> Result<String, LlmError> {
        Ok(self.response.clone())
    }
}

struct DownLlm;

#[async_trait]
impl ChatModel for DownLlm {
    async fn generate(
        &self,
        _messages: &[ChatMessage],
        _temperature: f32,
    ) -> Result<String, LlmError> {
        Err(LlmError::AllProvidersFailed(
            "primary: HTTP 500; fallback: HTTP 503".to_string(),
        ))
    }
}

struct Harness {
    assistant: Assistant,
    store: Arc<InMemoryStore>,
    sandbox: Arc<SandboxServices>,
}

fn harness(llm: Arc<dyn ChatModel>) -> Harness {
    let store = Arc::new(InMemoryStore::new());
    let sandbox = Arc::new(SandboxServices::new());
    let assistant = Assistant::new(
        Arc::new(EmptySearch),
        store.clone(),
        sandbox.clone(),
        sandbox.clone(),
        sandbox.clone(),
        llm,
        0.2,
        Duration::from_secs(300),
        1024,
    );
    Harness {
        assistant,
        store,
        sandbox,
    }
}

fn query(text: &str) -> QueryRequest {
    QueryRequest {
        query: text.to_string(),
        conversation_history: vec![],
        context: None,
    }
}

fn jane() -> Contact {
    Contact {
        id: "c-jane".to_string(),
        email: Some("jane@acme.io".to_string()),
        first_name: Some("Jane".to_string()),
        last_name: Some("Doe".to_string()),
        properties: Value::Null,
    }
}

#[tokio::test]
async fn conditional_instruction_is_persisted() {
    let h = harness(Arc::new(ScriptedLlm {
        response: "Got it. I'll create a contact whenever someone new emails you.".to_string(),
    }));

    let reply = h
        .assistant
        .handle_query("u1", query("when someone emails me, create a contact"))
        .await;

    assert_eq!(reply.intent, "instruction");
    let instructions = h.store.list_instructions("u1", true).await.unwrap();
    assert_eq!(instructions.len(), 1);
    assert!(instructions[0].is_active);
}

#[tokio::test]
async fn fabricated_meeting_confirmation_becomes_a_real_event() {
    let h = harness(Arc::new(ScriptedLlm {
        response: "I've scheduled the meeting with Jane. Date: July 16. Time: 2pm.".to_string(),
    }));
    h.sandbox.seed_contact("u1", jane());

    let reply = h
        .assistant
        .handle_query("u1", query("Schedule meeting with Jane on 16th July at 2pm"))
        .await;

    assert_eq!(reply.actions.len(), 1);
    assert_eq!(reply.actions[0].tool, "schedule_meeting_with_contact");
    assert!(reply.actions[0].success, "{}", reply.actions[0].summary);

    let events = h.sandbox.events_for("u1");
    assert_eq!(events.len(), 1);
    assert!(events[0].title.contains("Jane"));

    let tasks = h.store.tasks_for("u1");
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].status, TaskStatus::Completed);
}

#[tokio::test]
async fn placeholder_recipient_is_dropped_and_surfaced() {
    let h = harness(Arc::new(ScriptedLlm {
        response: r#"Sending now.
```json
{"tool": "send_email", "parameters": {"to": "jane@example.com", "subject": "Hi", "body": "Hello"}}
```"#
            .to_string(),
    }));

    let reply = h
        .assistant
        .handle_query("u1", query("write to jane for me"))
        .await;

    assert!(reply.actions.is_empty());
    assert!(reply.text.contains("skipped"));
    assert!(h.sandbox.sent_for("u1").is_empty());
}

#[tokio::test]
async fn contact_query_synthesizes_listing_call() {
    let h = harness(Arc::new(ScriptedLlm {
        response: "Here are your contacts.".to_string(),
    }));
    h.sandbox.seed_contact("u1", jane());

    let reply = h.assistant.handle_query("u1", query("show all contacts")).await;

    assert_eq!(reply.actions.len(), 1);
    assert_eq!(reply.actions[0].tool, "get_all_contacts");
    assert!(reply.actions[0].success);
    assert!(reply.actions[0].summary.contains("1"));
}

#[tokio::test]
async fn llm_outage_degrades_to_apology() {
    let h = harness(Arc::new(DownLlm));

    let reply = h.assistant.handle_query("u1", query("what's on my plate?")).await;

    assert!(reply.text.contains("sorry"));
    assert!(reply.actions.is_empty());
    assert!(h.store.tasks_for("u1").is_empty());
}

#[tokio::test]
async fn proactive_event_creates_contact_once() {
    let h = harness(Arc::new(ScriptedLlm {
        response: String::new(),
    }));
    h.store
        .create_instruction(
            "u1",
            "When someone emails me who is not in HubSpot, create a contact",
            InstructionPriority::Normal,
        )
        .await
        .unwrap();

    let event = ProactiveEvent::new(
        "new_email",
        "gmail",
        json!({"senderEmail": "x@y.com", "senderName": "X Y", "subject": "Intro"}),
        "u1",
    );

    let outcome = h.assistant.handle_event(event.clone()).await;
    assert_eq!(outcome.matched, 1);
    assert_eq!(outcome.executed.len(), 1);
    assert!(outcome.executed[0].success);

    let contacts = h.sandbox.contacts_for("u1");
    assert_eq!(contacts.len(), 1);
    assert_eq!(contacts[0].email.as_deref(), Some("x@y.com"));
    assert_eq!(contacts[0].first_name.as_deref(), Some("X"));

    let notifications = h.store.notifications_for("u1");
    assert_eq!(notifications.len(), 1);

    // Redelivery of the same event within the TTL is deduplicated.
    let redelivered = h.assistant.handle_event(event).await;
    assert_eq!(redelivered.matched, 1);
    assert!(redelivered.executed.is_empty(), "duplicate must be skipped");
    assert_eq!(h.sandbox.contacts_for("u1").len(), 1);
}

#[tokio::test]
async fn sender_already_in_crm_is_not_recreated() {
    let h = harness(Arc::new(ScriptedLlm {
        response: String::new(),
    }));
    h.sandbox.seed_contact(
        "u1",
        Contact {
            id: "c-x".to_string(),
            email: Some("x@y.com".to_string()),
            first_name: Some("X".to_string()),
            last_name: Some("Y".to_string()),
            properties: Value::Null,
        },
    );
    h.store
        .create_instruction(
            "u1",
            "When someone emails me who is not in HubSpot, create a contact",
            InstructionPriority::Normal,
        )
        .await
        .unwrap();

    let event = ProactiveEvent::new(
        "new_email",
        "gmail",
        json!({"senderEmail": "x@y.com", "senderName": "X Y"}),
        "u1",
    );

    let outcome = h.assistant.handle_event(event).await;
    assert_eq!(outcome.matched, 1);
    assert!(outcome.executed.is_empty());
    assert_eq!(h.sandbox.contacts_for("u1").len(), 1);
}

#[tokio::test]
async fn inactive_instruction_never_fires() {
    let h = harness(Arc::new(ScriptedLlm {
        response: String::new(),
    }));
    let stored = h
        .store
        .create_instruction(
            "u1",
            "When someone emails me who is not in HubSpot, create a contact",
            InstructionPriority::Normal,
        )
        .await
        .unwrap();
    h.store
        .set_instruction_active("u1", &stored.id, false)
        .await
        .unwrap();

    let event = ProactiveEvent::new(
        "new_email",
        "gmail",
        json!({"senderEmail": "x@y.com", "senderName": "X Y"}),
        "u1",
    );

    let outcome = h.assistant.handle_event(event).await;
    assert_eq!(outcome.matched, 0);
    assert!(outcome.executed.is_empty());
    assert!(
        h.store.tasks_for("u1").is_empty(),
        "the executor must never be reached"
    );
}

#[tokio::test]
async fn unmatched_event_reaches_no_executor() {
    let h = harness(Arc::new(ScriptedLlm {
        response: String::new(),
    }));
    h.store
        .create_instruction(
            "u1",
            "when a contact is updated, tell me",
            InstructionPriority::Normal,
        )
        .await
        .unwrap();

    // Event/service pair does not line up with the instruction's pattern.
    let event = ProactiveEvent::new(
        "new_email",
        "gmail",
        json!({"senderEmail": "x@y.com"}),
        "u1",
    );

    let outcome = h.assistant.handle_event(event).await;
    assert_eq!(outcome.matched, 0);
    assert!(h.store.tasks_for("u1").is_empty());
}

#[test]
fn execution_threshold_is_strictly_above_0_7() {
    // The library only ever produces 0.9, but the gate itself is part of
    // the contract: confidence at or below 0.7 must never dispatch.
    assert!(EXECUTION_THRESHOLD >= 0.7);
    assert!(0.7_f32 <= EXECUTION_THRESHOLD);
    assert!(0.9_f32 > EXECUTION_THRESHOLD);
}

#[tokio::test]
async fn calendar_instruction_emails_attendees() {
    let h = harness(Arc::new(ScriptedLlm {
        response: String::new(),
    }));
    h.store
        .create_instruction(
            "u1",
            "when an event is created, email the attendees",
            InstructionPriority::Normal,
        )
        .await
        .unwrap();

    let event = ProactiveEvent::new(
        "event_created",
        "calendar",
        json!({
            "title": "QBR",
            "start": "2026-09-01T10:00:00Z",
            "end": "2026-09-01T11:00:00Z",
            "attendees": ["a@b.io", "c@d.io"]
        }),
        "u1",
    );

    let outcome = h.assistant.handle_event(event).await;
    assert_eq!(outcome.executed.len(), 1);

    let sent = h.sandbox.sent_for("u1");
    assert_eq!(sent.len(), 1);
    assert!(sent[0].to.contains("a@b.io"));
    assert!(sent[0].subject.contains("QBR"));
}
