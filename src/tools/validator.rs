//! Defensive tool-call validation
//!
//! Screens calls for placeholder/hallucinated data and per-tool required
//! fields. The table here is the authoritative contract: downstream tests
//! assert specific acceptance and rejection cases, so the rules must not be
//! made stricter than written.

use chrono::NaiveDate;
use tracing::{debug, warn};

use super::{SendEmailParams, ToolCall};
use crate::metrics::METRICS;

/// Values that indicate the model fabricated rather than retrieved data
const PLACEHOLDER_MARKERS: &[&str] = &[
    "[email address]",
    "[first name]",
    "[last name]",
    "[company name]",
    "placeholder",
    "example.com",
];

/// One validation decision; short-lived, never persisted
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationResult {
    pub valid: bool,
    pub reason: Option<String>,
}

impl ValidationResult {
    fn ok() -> Self {
        Self {
            valid: true,
            reason: None,
        }
    }

    fn reject(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            reason: Some(reason.into()),
        }
    }
}

/// Tool-call validator. `validate` decides; `validate_all` repairs, drops
/// invalid calls with a logged reason, and never fails.
#[derive(Debug, Clone, Default)]
pub struct ToolCallValidator;

impl ToolCallValidator {
    pub fn new() -> Self {
        Self
    }

    pub fn validate(&self, call: &ToolCall) -> ValidationResult {
        match call {
            ToolCall::SendEmail(p) => {
                if p.to.is_none() && p.contact_name.is_none() {
                    return ValidationResult::reject("send_email requires to or contactName");
                }
                if let Some(to) = &p.to {
                    if let Some(marker) = placeholder_marker(to) {
                        return ValidationResult::reject(format!(
                            "recipient '{}' contains placeholder data ({})",
                            to, marker
                        ));
                    }
                    if !to.contains('@') {
                        return ValidationResult::reject(format!(
                            "recipient '{}' is not an email address",
                            to
                        ));
                    }
                }
                if !present(&p.subject) {
                    return ValidationResult::reject("send_email requires a subject");
                }
                if !present(&p.body) {
                    return ValidationResult::reject("send_email requires a body");
                }
                ValidationResult::ok()
            }

            ToolCall::CreateCalendarEvent(p) => {
                if !present(&p.title) {
                    return ValidationResult::reject("create_calendar_event requires a title");
                }
                for (label, value) in [("start", &p.start), ("end", &p.end)] {
                    match value {
                        Some(raw) if parseable_date(raw) => {}
                        Some(raw) => {
                            return ValidationResult::reject(format!(
                                "{} '{}' is not a parseable date",
                                label, raw
                            ))
                        }
                        None => {
                            return ValidationResult::reject(format!(
                                "create_calendar_event requires {}",
                                label
                            ))
                        }
                    }
                }
                ValidationResult::ok()
            }

            ToolCall::ScheduleMeetingWithContact(p) => {
                if p.contact_email.is_none() && p.contact_name.is_none() {
                    return ValidationResult::reject(
                        "schedule_meeting_with_contact requires contactEmail or contactName",
                    );
                }
                if let Some(email) = &p.contact_email {
                    if let Some(marker) = placeholder_marker(email) {
                        return ValidationResult::reject(format!(
                            "contactEmail '{}' contains placeholder data ({})",
                            email, marker
                        ));
                    }
                    if !email.contains('@') {
                        return ValidationResult::reject(format!(
                            "contactEmail '{}' is not an email address",
                            email
                        ));
                    }
                }
                // date/time optional: defaults are applied downstream
                ValidationResult::ok()
            }

            ToolCall::AddContactNote(p) => {
                if p.contact_id.is_none() && p.email.is_none() && p.contact_name.is_none() {
                    return ValidationResult::reject(
                        "add_contact_note requires contactId, email, or contactName",
                    );
                }
                if !present(&p.note) {
                    return ValidationResult::reject("add_contact_note requires a note");
                }
                ValidationResult::ok()
            }

            ToolCall::SearchContacts(p) => {
                if p.query.is_none() && p.email.is_none() && p.name.is_none() {
                    return ValidationResult::reject(
                        "search_contacts requires query, email, or name",
                    );
                }
                ValidationResult::ok()
            }

            ToolCall::CreateContact(p) => {
                let email = match &p.email {
                    Some(email) => email,
                    None => return ValidationResult::reject("create_contact requires an email"),
                };
                if !email.contains('@') {
                    return ValidationResult::reject(format!(
                        "email '{}' is not an email address",
                        email
                    ));
                }
                if email.contains('[')
                    || email.contains(']')
                    || email.to_lowercase().contains("example.com")
                {
                    return ValidationResult::reject(format!(
                        "email '{}' looks like placeholder data",
                        email
                    ));
                }
                if p.first_name.is_none() && p.last_name.is_none() {
                    return ValidationResult::reject(
                        "create_contact requires firstName or lastName",
                    );
                }
                for name in [&p.first_name, &p.last_name].into_iter().flatten() {
                    if name.contains('[') || name.contains(']') {
                        return ValidationResult::reject(format!(
                            "name '{}' looks like placeholder data",
                            name
                        ));
                    }
                }
                ValidationResult::ok()
            }

            ToolCall::GetAllContacts(p) | ToolCall::GetAllContactsWithNotes(p) => {
                if let Some(limit) = &p.limit {
                    match limit.as_f64() {
                        Some(n) if n > 0.0 => {}
                        _ => {
                            return ValidationResult::reject(format!(
                                "limit must be a positive number, got {}",
                                limit
                            ))
                        }
                    }
                }
                if let Some(offset) = &p.offset {
                    match offset.as_f64() {
                        Some(n) if n >= 0.0 => {}
                        _ => {
                            return ValidationResult::reject(format!(
                                "offset must be a non-negative number, got {}",
                                offset
                            ))
                        }
                    }
                }
                if let Some(properties) = &p.include_properties {
                    if !properties.is_array() {
                        return ValidationResult::reject("includeProperties must be an array");
                    }
                }
                ValidationResult::ok()
            }

            // No required fields
            ToolCall::GetAvailableTimes(_) | ToolCall::GetContactNotes(_) => ValidationResult::ok(),

            // Forward-compatibility policy: unknown tools pass through
            ToolCall::Unknown { .. } => ValidationResult::ok(),
        }
    }

    /// Repair, validate, and filter a batch. Invalid calls are dropped with
    /// their reason logged; this never fails.
    pub fn validate_all(&self, calls: Vec<ToolCall>) -> Vec<ToolCall> {
        let mut kept = Vec::with_capacity(calls.len());
        for call in calls {
            let call = repair(call);
            let result = self.validate(&call);
            if result.valid {
                kept.push(call);
            } else {
                let reason = result.reason.unwrap_or_default();
                warn!(tool = call.name(), reason = %reason, "dropping invalid tool call");
                METRICS.record_tool_call_rejected(call.name());
            }
        }
        kept
    }

    /// Collect rejection reasons for a batch without dropping anything; used
    /// to build the user-visible failure summary.
    pub fn rejection_reasons(&self, calls: &[ToolCall]) -> Vec<String> {
        calls
            .iter()
            .filter_map(|call| {
                let result = self.validate(call);
                result
                    .reason
                    .map(|reason| format!("{}: {}", call.name(), reason))
            })
            .collect()
    }
}

/// Body placeholders in send_email are repaired, not rejected
fn repair(call: ToolCall) -> ToolCall {
    match call {
        ToolCall::SendEmail(params) => ToolCall::SendEmail(repair_email_body(params)),
        other => other,
    }
}

fn repair_email_body(mut params: SendEmailParams) -> SendEmailParams {
    if let Some(body) = &params.body {
        if body.contains("[Your Name]") || body.contains("[topic]") {
            debug!("repairing placeholder tokens in send_email body");
            let topic = params.subject.clone().unwrap_or_default();
            let repaired = body
                .replace("[Your Name]", "")
                .replace("[topic]", &topic)
                .trim_end()
                .to_string();
            params.body = Some(repaired);
        }
    }
    params
}

fn present(value: &Option<String>) -> bool {
    value.as_deref().map(|v| !v.trim().is_empty()).unwrap_or(false)
}

fn placeholder_marker(value: &str) -> Option<&'static str> {
    let lowered = value.to_lowercase();
    PLACEHOLDER_MARKERS
        .iter()
        .find(|marker| lowered.contains(*marker))
        .copied()
}

/// Accepts RFC 3339, `YYYY-MM-DD HH:MM`, and bare `YYYY-MM-DD`
fn parseable_date(raw: &str) -> bool {
    chrono::DateTime::parse_from_rfc3339(raw).is_ok()
        || chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M").is_ok()
        || chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S").is_ok()
        || NaiveDate::parse_from_str(raw, "%Y-%m-%d").is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{
        AddContactNoteParams, ContactPagingParams, CreateCalendarEventParams, CreateContactParams,
        ScheduleMeetingParams, SearchContactsParams,
    };
    use serde_json::json;

    fn validator() -> ToolCallValidator {
        ToolCallValidator::new()
    }

    fn email_call(to: &str) -> ToolCall {
        ToolCall::SendEmail(SendEmailParams {
            to: Some(to.to_string()),
            subject: Some("Hi".to_string()),
            body: Some("Hello".to_string()),
            ..Default::default()
        })
    }

    #[test]
    fn test_send_email_example_com_rejected() {
        let result = validator().validate(&email_call("bob@example.com"));
        assert!(!result.valid);
        assert!(result.reason.unwrap().contains("placeholder"));
    }

    #[test]
    fn test_send_email_real_recipient_accepted() {
        let result = validator().validate(&email_call("bob@realcompany.io"));
        assert!(result.valid);
    }

    #[test]
    fn test_send_email_requires_recipient_or_contact() {
        let call = ToolCall::SendEmail(SendEmailParams {
            subject: Some("Hi".to_string()),
            body: Some("Hello".to_string()),
            ..Default::default()
        });
        assert!(!validator().validate(&call).valid);
    }

    #[test]
    fn test_send_email_contact_name_without_address_accepted() {
        let call = ToolCall::SendEmail(SendEmailParams {
            contact_name: Some("Jane".to_string()),
            subject: Some("Hi".to_string()),
            body: Some("Hello".to_string()),
            ..Default::default()
        });
        assert!(validator().validate(&call).valid);
    }

    #[test]
    fn test_send_email_non_address_recipient_rejected() {
        let result = validator().validate(&email_call("bob"));
        assert!(!result.valid);
    }

    #[test]
    fn test_body_placeholder_repaired_not_rejected() {
        let call = ToolCall::SendEmail(SendEmailParams {
            to: Some("bob@realcompany.io".to_string()),
            subject: Some("Renewal".to_string()),
            body: Some("Hi Bob,\n\nAbout [topic].\n\nBest,\n[Your Name]".to_string()),
            ..Default::default()
        });
        let kept = validator().validate_all(vec![call]);
        assert_eq!(kept.len(), 1);
        match &kept[0] {
            ToolCall::SendEmail(params) => {
                let body = params.body.as_deref().unwrap();
                assert!(!body.contains("[Your Name]"));
                assert!(body.contains("About Renewal."));
            }
            other => panic!("expected SendEmail, got {:?}", other),
        }
    }

    #[test]
    fn test_create_contact_placeholder_email_rejected() {
        let call = ToolCall::CreateContact(CreateContactParams {
            email: Some("[Email Address]".to_string()),
            first_name: Some("Jane".to_string()),
            last_name: None,
        });
        assert!(!validator().validate(&call).valid);
    }

    #[test]
    fn test_create_contact_accepted() {
        let call = ToolCall::CreateContact(CreateContactParams {
            email: Some("a@b.com".to_string()),
            first_name: Some("Jane".to_string()),
            last_name: None,
        });
        assert!(validator().validate(&call).valid);
    }

    #[test]
    fn test_create_contact_bracketed_name_rejected() {
        let call = ToolCall::CreateContact(CreateContactParams {
            email: Some("a@b.com".to_string()),
            first_name: Some("[First Name]".to_string()),
            last_name: None,
        });
        assert!(!validator().validate(&call).valid);
    }

    #[test]
    fn test_calendar_event_date_parsing() {
        let good = ToolCall::CreateCalendarEvent(CreateCalendarEventParams {
            title: Some("Sync".to_string()),
            start: Some("2026-09-01T10:00:00Z".to_string()),
            end: Some("2026-09-01 10:30".to_string()),
            ..Default::default()
        });
        assert!(validator().validate(&good).valid);

        let bad = ToolCall::CreateCalendarEvent(CreateCalendarEventParams {
            title: Some("Sync".to_string()),
            start: Some("next Tuesday-ish".to_string()),
            end: Some("2026-09-01 10:30".to_string()),
            ..Default::default()
        });
        assert!(!validator().validate(&bad).valid);
    }

    #[test]
    fn test_schedule_meeting_date_optional() {
        let call = ToolCall::ScheduleMeetingWithContact(ScheduleMeetingParams {
            contact_name: Some("Jane".to_string()),
            ..Default::default()
        });
        assert!(validator().validate(&call).valid);
    }

    #[test]
    fn test_schedule_meeting_placeholder_email_rejected() {
        let call = ToolCall::ScheduleMeetingWithContact(ScheduleMeetingParams {
            contact_email: Some("jane@example.com".to_string()),
            ..Default::default()
        });
        assert!(!validator().validate(&call).valid);
    }

    #[test]
    fn test_add_contact_note_rules() {
        let missing_target = ToolCall::AddContactNote(AddContactNoteParams {
            note: Some("Spoke today".to_string()),
            ..Default::default()
        });
        assert!(!validator().validate(&missing_target).valid);

        let empty_note = ToolCall::AddContactNote(AddContactNoteParams {
            email: Some("a@b.com".to_string()),
            note: Some("   ".to_string()),
            ..Default::default()
        });
        assert!(!validator().validate(&empty_note).valid);
    }

    #[test]
    fn test_search_contacts_needs_some_criterion() {
        let empty = ToolCall::SearchContacts(SearchContactsParams::default());
        assert!(!validator().validate(&empty).valid);

        let by_name = ToolCall::SearchContacts(SearchContactsParams {
            name: Some("Jane".to_string()),
            ..Default::default()
        });
        assert!(validator().validate(&by_name).valid);
    }

    #[test]
    fn test_paging_rules() {
        let bad_limit = ToolCall::GetAllContacts(ContactPagingParams {
            limit: Some(json!(-5)),
            ..Default::default()
        });
        assert!(!validator().validate(&bad_limit).valid);

        let bad_properties = ToolCall::GetAllContacts(ContactPagingParams {
            include_properties: Some(json!("email")),
            ..Default::default()
        });
        assert!(!validator().validate(&bad_properties).valid);

        let fine = ToolCall::GetAllContacts(ContactPagingParams {
            limit: Some(json!(25)),
            offset: Some(json!(0)),
            include_properties: Some(json!(["email", "firstname"])),
        });
        assert!(validator().validate(&fine).valid);
    }

    #[test]
    fn test_unknown_tool_passes_through() {
        let call = ToolCall::Unknown {
            name: "future_tool".to_string(),
            parameters: json!({"x": 1}),
        };
        assert!(validator().validate(&call).valid);
    }

    #[test]
    fn test_validate_all_drops_only_invalid() {
        let calls = vec![
            email_call("bob@realcompany.io"),
            email_call("bob@example.com"),
        ];
        let kept = validator().validate_all(calls);
        assert_eq!(kept.len(), 1);
    }
}
