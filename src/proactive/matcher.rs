//! Scoring stored instructions against live events

use serde_json::{json, Map, Value};
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::debug;

use super::patterns::{ExtractorKind, PatternKind, PATTERN_LIBRARY};
use super::ProactiveEvent;
use crate::metrics::METRICS;
use crate::services::OngoingInstruction;

/// Matches above this confidence are dispatched
pub const EXECUTION_THRESHOLD: f32 = 0.7;

/// Fixed confidence for any pattern hit; not gradated
const MATCH_CONFIDENCE: f32 = 0.9;

/// Ephemeral result of matching one instruction against one event
#[derive(Debug, Clone)]
pub struct InstructionMatch {
    pub instruction: OngoingInstruction,
    pub pattern: PatternKind,
    pub confidence: f32,
    pub extracted: HashMap<String, Value>,
}

impl InstructionMatch {
    pub fn executable(&self) -> bool {
        self.confidence > EXECUTION_THRESHOLD
    }
}

/// Instruction matcher over the static pattern library
#[derive(Debug, Clone, Default)]
pub struct InstructionMatcher;

impl InstructionMatcher {
    pub fn new() -> Self {
        Self
    }

    /// Match one instruction. The library is iterated in order and each
    /// matching entry overwrites the previous one, so an instruction that
    /// textually satisfies several patterns keeps the last, a documented
    /// quirk of the design, not highest-confidence-wins.
    pub fn match_instruction(
        &self,
        event: &ProactiveEvent,
        instruction: &OngoingInstruction,
    ) -> Option<InstructionMatch> {
        let text = instruction.instruction.to_lowercase();
        let mut best: Option<InstructionMatch> = None;

        for entry in PATTERN_LIBRARY.iter() {
            if !entry.pattern.is_match(&text) {
                continue;
            }
            if event.event != entry.required_event || event.service != entry.required_service {
                continue;
            }

            let extracted = match entry.extractor {
                Some(kind) => extract_params(kind, &event.data),
                None => {
                    debug!(
                        pattern = entry.kind.as_str(),
                        "pattern matched but has no extractor wired"
                    );
                    HashMap::new()
                }
            };

            best = Some(InstructionMatch {
                instruction: instruction.clone(),
                pattern: entry.kind,
                confidence: MATCH_CONFIDENCE,
                extracted,
            });
        }

        if let Some(m) = &best {
            METRICS.record_instruction_match(m.pattern.as_str());
        }
        best
    }

    /// Match every active instruction against the event, sorted by
    /// descending confidence. Inactive instructions never match.
    pub fn match_all(
        &self,
        event: &ProactiveEvent,
        instructions: &[OngoingInstruction],
    ) -> Vec<InstructionMatch> {
        let mut matches: Vec<InstructionMatch> = instructions
            .iter()
            .filter(|i| i.is_active)
            .filter_map(|i| self.match_instruction(event, i))
            .collect();

        matches.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(Ordering::Equal)
        });

        debug!(
            event = %event.event,
            service = %event.service,
            candidates = instructions.len(),
            matched = matches.len(),
            "instruction matching complete"
        );

        matches
    }
}

fn extract_params(kind: ExtractorKind, data: &Value) -> HashMap<String, Value> {
    let mut params = HashMap::new();
    let empty = Map::new();
    let object = data.as_object().unwrap_or(&empty);

    let copy = |params: &mut HashMap<String, Value>, from: &str, to: &str| {
        if let Some(value) = object.get(from) {
            if !value.is_null() {
                params.insert(to.to_string(), value.clone());
            }
        }
    };

    match kind {
        ExtractorKind::Email => {
            copy(&mut params, "senderEmail", "email");
            copy(&mut params, "senderName", "name");
            copy(&mut params, "subject", "subject");
            if let Some(name) = object.get("senderName").and_then(|v| v.as_str()) {
                let mut parts = name.split_whitespace();
                if let Some(first) = parts.next() {
                    params.insert("firstName".to_string(), json!(first));
                }
                let rest: Vec<&str> = parts.collect();
                if !rest.is_empty() {
                    params.insert("lastName".to_string(), json!(rest.join(" ")));
                }
            }
        }
        ExtractorKind::Contact => {
            copy(&mut params, "id", "contactId");
            copy(&mut params, "email", "email");
            copy(&mut params, "firstName", "firstName");
            copy(&mut params, "lastName", "lastName");
        }
        ExtractorKind::CalendarEvent => {
            copy(&mut params, "title", "title");
            copy(&mut params, "start", "start");
            copy(&mut params, "end", "end");
            copy(&mut params, "attendees", "attendees");
        }
    }

    params
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn instruction(text: &str, active: bool) -> OngoingInstruction {
        OngoingInstruction {
            id: "i1".to_string(),
            user_id: "u1".to_string(),
            instruction: text.to_string(),
            is_active: active,
            priority: Default::default(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn new_email_event() -> ProactiveEvent {
        ProactiveEvent::new(
            "new_email",
            "gmail",
            json!({"senderEmail": "x@y.com", "senderName": "X Y", "subject": "Hello"}),
            "u1",
        )
    }

    #[test]
    fn test_not_in_crm_match_extracts_sender() {
        let matcher = InstructionMatcher::new();
        let stored =
            instruction("When someone emails me who is not in HubSpot, create a contact", true);

        let matches = matcher.match_all(&new_email_event(), &[stored]);
        assert_eq!(matches.len(), 1);
        let m = &matches[0];
        assert!((m.confidence - 0.9).abs() < f32::EPSILON);
        assert_eq!(m.pattern, PatternKind::EmailNotInCrm);
        assert_eq!(m.extracted.get("email"), Some(&json!("x@y.com")));
        assert_eq!(m.extracted.get("firstName"), Some(&json!("X")));
        assert_eq!(m.extracted.get("lastName"), Some(&json!("Y")));
        assert!(m.executable());
    }

    #[test]
    fn test_inactive_instruction_never_matches() {
        let matcher = InstructionMatcher::new();
        let stored =
            instruction("When someone emails me who is not in HubSpot, create a contact", false);
        let matches = matcher.match_all(&new_email_event(), &[stored]);
        assert!(matches.is_empty());
    }

    #[test]
    fn test_event_service_pair_must_match() {
        let matcher = InstructionMatcher::new();
        let stored =
            instruction("When someone emails me who is not in HubSpot, create a contact", true);
        let wrong_service = ProactiveEvent::new(
            "new_email",
            "hubspot",
            json!({"senderEmail": "x@y.com"}),
            "u1",
        );
        assert!(matcher.match_all(&wrong_service, &[stored]).is_empty());
    }

    #[test]
    fn test_last_matching_pattern_wins() {
        // This instruction satisfies both the generic email_received pattern
        // and email_not_in_crm; the loop overwrites earlier hits, so the
        // later table entry is kept. Known, documented quirk; do not "fix"
        // to first- or highest-confidence-wins.
        let matcher = InstructionMatcher::new();
        let stored =
            instruction("when someone emails me who is not in hubspot, add them", true);
        let m = matcher
            .match_instruction(&new_email_event(), &stored)
            .expect("should match");
        assert_eq!(m.pattern, PatternKind::EmailNotInCrm);
        assert!(!m.extracted.is_empty());
    }

    #[test]
    fn test_pattern_without_extractor_yields_empty_params() {
        let matcher = InstructionMatcher::new();
        let stored = instruction("when i receive an email, flag it", true);
        let m = matcher
            .match_instruction(&new_email_event(), &stored)
            .expect("should match");
        assert_eq!(m.pattern, PatternKind::EmailReceived);
        assert!(m.extracted.is_empty());
    }

    #[test]
    fn test_calendar_extractor() {
        let matcher = InstructionMatcher::new();
        let stored = instruction("when an event is created, add a note", true);
        let event = ProactiveEvent::new(
            "event_created",
            "calendar",
            json!({
                "title": "QBR",
                "start": "2026-09-01T10:00:00Z",
                "end": "2026-09-01T11:00:00Z",
                "attendees": ["a@b.com", "c@d.com"]
            }),
            "u1",
        );
        let m = matcher.match_instruction(&event, &stored).expect("should match");
        assert_eq!(m.pattern, PatternKind::CalendarEventCreated);
        assert_eq!(m.extracted.get("title"), Some(&json!("QBR")));
        assert_eq!(
            m.extracted.get("attendees"),
            Some(&json!(["a@b.com", "c@d.com"]))
        );
    }

    #[test]
    fn test_multiple_instructions_all_match() {
        let matcher = InstructionMatcher::new();
        let a = instruction("when someone emails me who is not in hubspot, create a contact", true);
        let b = instruction("when i receive an email, log it", true);
        let matches = matcher.match_all(&new_email_event(), &[a, b]);
        assert_eq!(matches.len(), 2, "no early exit across instructions");
    }
}
