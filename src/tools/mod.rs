//! Tool-call model
//!
//! A tool call is one side-effecting instruction against an external system.
//! Parameters are a tagged union keyed by tool name so the validator and
//! executor get typed field access; unrecognized names pass through as
//! `Unknown` for forward compatibility.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod parser;
pub mod validator;

pub use parser::ToolCallParser;
pub use validator::{ToolCallValidator, ValidationResult};

/// The ten known tools, in catalog order
pub const TOOL_CATALOG: &[(&str, &str)] = &[
    ("send_email", "Send an email via the user's Gmail account"),
    ("get_available_times", "List free slots on the user's calendar"),
    ("create_calendar_event", "Create a calendar event"),
    (
        "schedule_meeting_with_contact",
        "Schedule a meeting with a CRM contact",
    ),
    ("search_contacts", "Search HubSpot contacts"),
    ("create_contact", "Create a HubSpot contact"),
    ("add_contact_note", "Attach a note to a HubSpot contact"),
    ("get_contact_notes", "List notes for one HubSpot contact"),
    ("get_all_contacts", "List HubSpot contacts with paging"),
    (
        "get_all_contacts_with_notes",
        "List HubSpot contacts together with their notes",
    ),
];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendEmailParams {
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub contact_name: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub cc: Option<String>,
    #[serde(default)]
    pub bcc: Option<String>,
    #[serde(default)]
    pub thread_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCalendarEventParams {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub end: Option<String>,
    #[serde(default)]
    pub attendees: Option<Vec<String>>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleMeetingParams {
    #[serde(default)]
    pub contact_email: Option<String>,
    #[serde(default)]
    pub contact_name: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub duration_minutes: Option<u32>,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetAvailableTimesParams {
    #[serde(default)]
    pub duration_minutes: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddContactNoteParams {
    #[serde(default)]
    pub contact_id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub contact_name: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchContactsParams {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateContactParams {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetContactNotesParams {
    #[serde(default)]
    pub contact_id: Option<String>,
    #[serde(default)]
    pub contact_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactPagingParams {
    #[serde(default)]
    pub limit: Option<Value>,
    #[serde(default)]
    pub offset: Option<Value>,
    #[serde(default)]
    pub include_properties: Option<Value>,
}

/// One validated or to-be-validated tool invocation
#[derive(Debug, Clone, PartialEq)]
pub enum ToolCall {
    SendEmail(SendEmailParams),
    GetAvailableTimes(GetAvailableTimesParams),
    CreateCalendarEvent(CreateCalendarEventParams),
    ScheduleMeetingWithContact(ScheduleMeetingParams),
    SearchContacts(SearchContactsParams),
    CreateContact(CreateContactParams),
    AddContactNote(AddContactNoteParams),
    GetContactNotes(GetContactNotesParams),
    GetAllContacts(ContactPagingParams),
    GetAllContactsWithNotes(ContactPagingParams),
    Unknown { name: String, parameters: Value },
}

impl ToolCall {
    /// Build a call from a raw `{name, parameters}` pair. Malformed
    /// parameters for a known tool degrade to `Unknown` rather than erroring;
    /// the validator decides what to do with them.
    pub fn from_parts(name: &str, parameters: Value) -> Self {
        fn parse<T: serde::de::DeserializeOwned>(name: &str, value: &Value) -> Option<T> {
            match serde_json::from_value(value.clone()) {
                Ok(parsed) => Some(parsed),
                Err(e) => {
                    tracing::debug!(tool = name, error = %e, "parameters did not fit typed shape");
                    None
                }
            }
        }

        let fallback = |parameters: Value| ToolCall::Unknown {
            name: name.to_string(),
            parameters,
        };

        match name {
            "send_email" => parse(name, &parameters)
                .map(ToolCall::SendEmail)
                .unwrap_or_else(|| fallback(parameters)),
            "get_available_times" => parse(name, &parameters)
                .map(ToolCall::GetAvailableTimes)
                .unwrap_or_else(|| fallback(parameters)),
            "create_calendar_event" => parse(name, &parameters)
                .map(ToolCall::CreateCalendarEvent)
                .unwrap_or_else(|| fallback(parameters)),
            "schedule_meeting_with_contact" => parse(name, &parameters)
                .map(ToolCall::ScheduleMeetingWithContact)
                .unwrap_or_else(|| fallback(parameters)),
            "search_contacts" => parse(name, &parameters)
                .map(ToolCall::SearchContacts)
                .unwrap_or_else(|| fallback(parameters)),
            "create_contact" => parse(name, &parameters)
                .map(ToolCall::CreateContact)
                .unwrap_or_else(|| fallback(parameters)),
            "add_contact_note" => parse(name, &parameters)
                .map(ToolCall::AddContactNote)
                .unwrap_or_else(|| fallback(parameters)),
            "get_contact_notes" => parse(name, &parameters)
                .map(ToolCall::GetContactNotes)
                .unwrap_or_else(|| fallback(parameters)),
            "get_all_contacts" => parse(name, &parameters)
                .map(ToolCall::GetAllContacts)
                .unwrap_or_else(|| fallback(parameters)),
            "get_all_contacts_with_notes" => parse(name, &parameters)
                .map(ToolCall::GetAllContactsWithNotes)
                .unwrap_or_else(|| fallback(parameters)),
            _ => fallback(parameters),
        }
    }

    /// The wire name of this call
    pub fn name(&self) -> &str {
        match self {
            Self::SendEmail(_) => "send_email",
            Self::GetAvailableTimes(_) => "get_available_times",
            Self::CreateCalendarEvent(_) => "create_calendar_event",
            Self::ScheduleMeetingWithContact(_) => "schedule_meeting_with_contact",
            Self::SearchContacts(_) => "search_contacts",
            Self::CreateContact(_) => "create_contact",
            Self::AddContactNote(_) => "add_contact_note",
            Self::GetContactNotes(_) => "get_contact_notes",
            Self::GetAllContacts(_) => "get_all_contacts",
            Self::GetAllContactsWithNotes(_) => "get_all_contacts_with_notes",
            Self::Unknown { name, .. } => name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_parts_known_tool() {
        let call = ToolCall::from_parts(
            "send_email",
            json!({"to": "a@b.com", "subject": "Hi", "body": "Hello"}),
        );
        match call {
            ToolCall::SendEmail(params) => {
                assert_eq!(params.to.as_deref(), Some("a@b.com"));
                assert_eq!(params.subject.as_deref(), Some("Hi"));
            }
            other => panic!("expected SendEmail, got {:?}", other),
        }
    }

    #[test]
    fn test_from_parts_camel_case_fields() {
        let call = ToolCall::from_parts(
            "schedule_meeting_with_contact",
            json!({"contactName": "Jane", "date": "2026-07-16", "time": "2pm"}),
        );
        match call {
            ToolCall::ScheduleMeetingWithContact(params) => {
                assert_eq!(params.contact_name.as_deref(), Some("Jane"));
            }
            other => panic!("expected ScheduleMeetingWithContact, got {:?}", other),
        }
    }

    #[test]
    fn test_from_parts_unknown_tool_passes_through() {
        let call = ToolCall::from_parts("future_tool", json!({"anything": 1}));
        assert_eq!(call.name(), "future_tool");
        assert!(matches!(call, ToolCall::Unknown { .. }));
    }

    #[test]
    fn test_catalog_has_ten_tools() {
        assert_eq!(TOOL_CATALOG.len(), 10);
    }
}
