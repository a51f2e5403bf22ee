//! The fixed library of conditional-instruction patterns
//!
//! Each entry pairs a regex over the lower-cased instruction text with the
//! `(event, service)` it may fire on and, for three families, a parameter
//! extractor. The matcher iterates this table in order and keeps the last
//! matching entry per instruction; generic shapes therefore come first and
//! the extractor-bearing families last.

use lazy_static::lazy_static;
use regex::Regex;

/// The pattern families the matcher knows about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    EmailReceived,
    EmailWithAttachment,
    ContactUpdated,
    NoteAdded,
    EventCancelled,
    EventUpcoming,
    ContactCreated,
    CalendarEventCreated,
    EmailNotInCrm,
}

impl PatternKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EmailReceived => "email_received",
            Self::EmailWithAttachment => "email_with_attachment",
            Self::ContactUpdated => "contact_updated",
            Self::NoteAdded => "note_added",
            Self::EventCancelled => "event_cancelled",
            Self::EventUpcoming => "event_upcoming",
            Self::ContactCreated => "contact_created",
            Self::CalendarEventCreated => "calendar_event_created",
            Self::EmailNotInCrm => "email_not_in_crm",
        }
    }
}

/// Which extractor, if any, pulls action parameters out of the event payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractorKind {
    Email,
    Contact,
    CalendarEvent,
}

/// One library entry
pub struct InstructionPattern {
    pub kind: PatternKind,
    pub pattern: Regex,
    pub required_event: &'static str,
    pub required_service: &'static str,
    pub extractor: Option<ExtractorKind>,
}

lazy_static! {
    /// The pattern library. Order is load-bearing: when an instruction
    /// textually satisfies several patterns, the matcher keeps the last one
    /// iterated (documented quirk), so the three extractor families sit at
    /// the end of the table.
    pub static ref PATTERN_LIBRARY: Vec<InstructionPattern> = vec![
        InstructionPattern {
            kind: PatternKind::EmailReceived,
            pattern: Regex::new(
                r"when\s+(someone|somebody|anyone)\s+emails?\s+me|when\s+i\s+(receive|get)\s+(an?\s+)?email"
            ).expect("email_received pattern"),
            required_event: "new_email",
            required_service: "gmail",
            extractor: None,
        },
        InstructionPattern {
            kind: PatternKind::EmailWithAttachment,
            pattern: Regex::new(r"email\s+with\s+(an\s+)?attachment|attachment\s+arrives")
                .expect("email_with_attachment pattern"),
            required_event: "new_email",
            required_service: "gmail",
            extractor: None,
        },
        InstructionPattern {
            kind: PatternKind::ContactUpdated,
            pattern: Regex::new(r"when\s+(a\s+)?contact\s+is\s+(updated|changed|edited)")
                .expect("contact_updated pattern"),
            required_event: "contact_updated",
            required_service: "hubspot",
            extractor: None,
        },
        InstructionPattern {
            kind: PatternKind::NoteAdded,
            pattern: Regex::new(r"when\s+(a\s+)?note\s+is\s+(added|created)")
                .expect("note_added pattern"),
            required_event: "note_created",
            required_service: "hubspot",
            extractor: None,
        },
        InstructionPattern {
            kind: PatternKind::EventCancelled,
            pattern: Regex::new(r"when\s+(an?\s+)?(event|meeting)\s+is\s+(cancelled|canceled)")
                .expect("event_cancelled pattern"),
            required_event: "event_cancelled",
            required_service: "calendar",
            extractor: None,
        },
        InstructionPattern {
            kind: PatternKind::EventUpcoming,
            pattern: Regex::new(r"before\s+(a\s+|my\s+|each\s+)?(meeting|event)|about\s+to\s+start")
                .expect("event_upcoming pattern"),
            required_event: "event_upcoming",
            required_service: "calendar",
            extractor: None,
        },
        InstructionPattern {
            kind: PatternKind::ContactCreated,
            pattern: Regex::new(
                r"when\s+(a\s+)?(new\s+)?contact\s+is\s+(created|added)|new\s+contact\s+in\s+hubspot"
            ).expect("contact_created pattern"),
            required_event: "contact_created",
            required_service: "hubspot",
            extractor: Some(ExtractorKind::Contact),
        },
        InstructionPattern {
            kind: PatternKind::CalendarEventCreated,
            pattern: Regex::new(
                r"when\s+(an?\s+)?(calendar\s+)?event\s+is\s+(created|added|scheduled)|when\s+i\s+(create|schedule)\s+(an?\s+)?(event|meeting)"
            ).expect("calendar_event_created pattern"),
            required_event: "event_created",
            required_service: "calendar",
            extractor: Some(ExtractorKind::CalendarEvent),
        },
        InstructionPattern {
            kind: PatternKind::EmailNotInCrm,
            pattern: Regex::new(r"emails?\s+me.*\bnot\b.*\b(hubspot|crm)\b")
                .expect("email_not_in_crm pattern"),
            required_event: "new_email",
            required_service: "gmail",
            extractor: Some(ExtractorKind::Email),
        },
    ];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_size() {
        assert_eq!(PATTERN_LIBRARY.len(), 9);
    }

    #[test]
    fn test_extractor_families() {
        let with_extractor: Vec<_> = PATTERN_LIBRARY
            .iter()
            .filter(|p| p.extractor.is_some())
            .map(|p| p.kind)
            .collect();
        assert_eq!(
            with_extractor,
            vec![
                PatternKind::ContactCreated,
                PatternKind::CalendarEventCreated,
                PatternKind::EmailNotInCrm,
            ]
        );
    }

    #[test]
    fn test_not_in_crm_shape_matches() {
        let pattern = PATTERN_LIBRARY
            .iter()
            .find(|p| p.kind == PatternKind::EmailNotInCrm)
            .unwrap();
        assert!(pattern
            .pattern
            .is_match("when someone emails me who is not in hubspot, create a contact"));
        assert!(!pattern.pattern.is_match("when someone emails me, reply"));
    }

    #[test]
    fn test_extractor_families_iterate_after_generic_email() {
        let email_received = PATTERN_LIBRARY
            .iter()
            .position(|p| p.kind == PatternKind::EmailReceived)
            .unwrap();
        let not_in_crm = PATTERN_LIBRARY
            .iter()
            .position(|p| p.kind == PatternKind::EmailNotInCrm)
            .unwrap();
        assert!(email_received < not_in_crm);
    }
}
