//! Response-to-tool-call parsing
//!
//! The model is unreliable about emitting machine-parseable calls while
//! narrating success in prose. Parsing therefore runs in four stages:
//!
//! 1. response-shaped leakage: the model echoed the expected *output*
//!    format; extract only the `{"tool", "parameters"}` sub-object,
//! 2. fenced ```json blocks,
//! 3. inline `{"tool": ..., "parameters": ...}` objects in prose,
//! 4. compensating heuristics that synthesize a call when the response
//!    claims success but no call was parsed.
//!
//! Stage 4 is the contract that no side effect is ever reported to the user
//! without either a real parsed call or one of these narrowly-scoped
//! synthesized calls. The stages deliberately overlap; do not fold them.

use chrono::{Datelike, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

use super::{
    ContactPagingParams, GetAvailableTimesParams, ScheduleMeetingParams, SendEmailParams, ToolCall,
};
use crate::intent::{Intent, IntentKind};
use crate::metrics::METRICS;

static FENCED_JSON: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").expect("fenced json pattern"));

/// `{"tool": "...", "parameters": {...}}` with one level of nesting inside
/// the parameters object
static INLINE_CALL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\{\s*"tool"\s*:\s*"[^"]+"\s*,\s*"parameters"\s*:\s*\{(?:[^{}]|\{[^{}]*\})*\}\s*\}"#)
        .expect("inline call pattern")
});

/// Targeted extraction of the call sub-object out of a response-shaped echo:
/// captures the tool name and the parameters object, ignoring whatever
/// trailing keys (such as `response`) the model tacked on
static LEAKED_CALL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""tool"\s*:\s*"([^"]+)"\s*,\s*"parameters"\s*:\s*(\{(?:[^{}]|\{[^{}]*\})*\})"#)
        .expect("leaked call pattern")
});

static EMAIL_ADDRESS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[a-zA-Z0-9._%+\-]+@[a-zA-Z0-9.\-]+\.[a-zA-Z]{2,}").expect("email pattern")
});

static WITH_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[Ww]ith\s+([A-Z][a-zA-Z]+)").expect("with-name pattern"));

static DAY_MONTH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(\d{1,2})(?:st|nd|rd|th)?\s+(?:of\s+)?(january|february|march|april|may|june|july|august|september|october|november|december)\b")
        .expect("day-month pattern")
});

static MONTH_DAY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(january|february|march|april|may|june|july|august|september|october|november|december)\s+(\d{1,2})(?:st|nd|rd|th)?\b")
        .expect("month-day pattern")
});

static TIME_OF_DAY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(\d{1,2})(?::(\d{2}))?\s*(am|pm)\b").expect("time pattern"));

/// Phrases marking a response as an explanation of a tool call rather than
/// an invocation
const INSTRUCTIONAL_PHRASES: &[&str] = &[
    "i'll use",
    "i will use",
    "here's the tool call",
    "here is the tool call",
    "you can use",
    "you could use",
    "would look like",
    "for example",
    "an example of",
];

/// Phrases where the model narrates a side effect as already done
const CLAIMED_SUCCESS_PHRASES: &[&str] = &[
    "i've sent",
    "i have sent",
    "email has been sent",
    "successfully sent",
    "i've scheduled",
    "i have scheduled",
    "successfully scheduled",
    "meeting has been scheduled",
    "has been booked",
    "i've created",
];

const DEFAULT_PAGE_LIMIT: u64 = 50;
const DEFAULT_SLOT_MINUTES: u32 = 30;

/// Parser from model output to tool calls. Pure: identical inputs yield
/// identical call lists in discovery order.
#[derive(Debug, Clone, Default)]
pub struct ToolCallParser;

impl ToolCallParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse(
        &self,
        response: &str,
        intent: Option<&Intent>,
        original_query: Option<&str>,
    ) -> Vec<ToolCall> {
        let lowered_response = response.to_lowercase();
        let instructional = INSTRUCTIONAL_PHRASES
            .iter()
            .any(|p| lowered_response.contains(p));

        // Stage 1: the model echoed the expected-output format instead of
        // invoking a tool. Extract only the call sub-object; the trailing
        // `response` payload is never treated as a second call.
        if response.contains("\"tool\":") && response.contains("\"response\":") {
            let mut calls = Vec::new();
            if let Some(capture) = LEAKED_CALL.captures(response) {
                let name = capture.get(1).map(|m| m.as_str()).unwrap_or_default();
                if let Some(parameters) = capture
                    .get(2)
                    .and_then(|m| serde_json::from_str::<Value>(m.as_str()).ok())
                {
                    METRICS.record_tool_call_parsed("leakage");
                    calls.push(ToolCall::from_parts(name, parameters));
                }
            }
            debug!(
                count = calls.len(),
                "response-shaped leakage detected, extracted call sub-object only"
            );
            return calls;
        }

        let mut calls = Vec::new();

        // Stage 2: fenced json blocks.
        if instructional {
            if FENCED_JSON.is_match(response) {
                debug!("instructional response, skipping fenced blocks");
            }
        } else {
            for capture in FENCED_JSON.captures_iter(response) {
                if let Some(block) = capture.get(1) {
                    if let Some(call) = candidate_from_json(block.as_str()) {
                        METRICS.record_tool_call_parsed("fenced");
                        calls.push(call);
                    }
                }
            }
        }

        // Stage 3: inline objects in prose, only when nothing parsed yet.
        if calls.is_empty() && !instructional {
            for m in INLINE_CALL.find_iter(response) {
                if let Some(call) = candidate_from_json(m.as_str()) {
                    METRICS.record_tool_call_parsed("inline");
                    calls.push(call);
                }
            }
        }

        // Stage 4: compensating heuristics.
        if let (Some(intent), Some(query)) = (intent, original_query) {
            self.compensate(&mut calls, &lowered_response, intent, query);
        }

        calls
    }

    fn compensate(
        &self,
        calls: &mut Vec<ToolCall>,
        lowered_response: &str,
        intent: &Intent,
        original_query: &str,
    ) {
        let had_parsed = !calls.is_empty();

        if !had_parsed && intent.is_contact_query {
            debug!("synthesizing get_all_contacts for contact query");
            METRICS.record_tool_call_synthesized("get_all_contacts");
            calls.push(ToolCall::GetAllContacts(ContactPagingParams {
                limit: Some(Value::from(DEFAULT_PAGE_LIMIT)),
                offset: Some(Value::from(0)),
                include_properties: None,
            }));
        }

        if intent.kind == IntentKind::AllContactsNotes
            && !calls
                .iter()
                .any(|c| c.name() == "get_all_contacts_with_notes")
        {
            debug!("synthesizing get_all_contacts_with_notes");
            METRICS.record_tool_call_synthesized("get_all_contacts_with_notes");
            calls.push(ToolCall::GetAllContactsWithNotes(ContactPagingParams::default()));
        }

        let lowered_query = original_query.to_lowercase();
        let claims_success = CLAIMED_SUCCESS_PHRASES
            .iter()
            .any(|p| lowered_response.contains(p));

        if calls.is_empty() && claims_success {
            if is_email_request(&lowered_query) {
                debug!("response claims an email was sent but no call parsed, synthesizing");
                METRICS.record_tool_call_synthesized("send_email");
                calls.push(ToolCall::SendEmail(synthesize_email(original_query)));
            } else if is_availability_request(&lowered_query) {
                METRICS.record_tool_call_synthesized("get_available_times");
                calls.push(ToolCall::GetAvailableTimes(GetAvailableTimesParams {
                    duration_minutes: Some(DEFAULT_SLOT_MINUTES),
                }));
            } else if is_scheduling_request(&lowered_query) {
                debug!("response claims a meeting was scheduled but no call parsed, synthesizing");
                METRICS.record_tool_call_synthesized("schedule_meeting_with_contact");
                calls.push(ToolCall::ScheduleMeetingWithContact(synthesize_meeting(
                    original_query,
                )));
            }
        }

        // Fabricated meeting confirmation without a parsed call: force the
        // scheduling tool so the narrated state becomes real.
        if calls.is_empty()
            && looks_like_meeting_confirmation(lowered_response)
            && is_scheduling_request(&lowered_query)
        {
            debug!("fabricated meeting confirmation detected, forcing schedule call");
            METRICS.record_tool_call_synthesized("schedule_meeting_with_contact");
            calls.push(ToolCall::ScheduleMeetingWithContact(synthesize_meeting(
                original_query,
            )));
        }
    }
}

/// Parse one JSON candidate; keep it only if it is an object carrying both
/// `tool` and `parameters` and no `response` key (expected-output leakage).
fn candidate_from_json(raw: &str) -> Option<ToolCall> {
    let value: Value = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(e) => {
            debug!(error = %e, "dropping malformed tool-call candidate");
            return None;
        }
    };

    let object = value.as_object()?;
    if object.contains_key("response") {
        debug!("skipping candidate with response key (expected-output leakage)");
        return None;
    }
    let name = object.get("tool")?.as_str()?;
    let parameters = object.get("parameters")?.clone();
    if !parameters.is_object() {
        return None;
    }
    Some(ToolCall::from_parts(name, parameters))
}

fn is_email_request(lowered_query: &str) -> bool {
    lowered_query.contains("email")
        && (lowered_query.contains("send") || lowered_query.contains("write"))
}

fn is_availability_request(lowered_query: &str) -> bool {
    lowered_query.contains("availability")
        || lowered_query.contains("available time")
        || lowered_query.contains("free slot")
        || lowered_query.contains("when am i free")
        || lowered_query.contains("open slot")
}

fn is_scheduling_request(lowered_query: &str) -> bool {
    (lowered_query.contains("schedule")
        || lowered_query.contains("meeting")
        || lowered_query.contains("book"))
        && lowered_query.contains("with")
}

fn looks_like_meeting_confirmation(lowered_response: &str) -> bool {
    lowered_response.contains("i've scheduled")
        || (lowered_response.contains("date:") && lowered_response.contains("time:"))
}

fn synthesize_email(original_query: &str) -> SendEmailParams {
    let to = EMAIL_ADDRESS
        .find(original_query)
        .map(|m| m.as_str().to_string());
    let contact_name = if to.is_none() {
        extract_contact_name(original_query)
    } else {
        None
    };

    let topic = original_query
        .to_lowercase()
        .split_once("about ")
        .map(|(_, rest)| rest.trim_end_matches(['.', '!', '?']).to_string());

    let subject = topic
        .clone()
        .map(|t| {
            let mut chars = t.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => t,
            }
        })
        .unwrap_or_else(|| "Follow-up".to_string());

    let body = match topic {
        Some(t) => format!("Hi,\n\nFollowing up about {}.\n", t),
        None => "Hi,\n\nFollowing up on our conversation.\n".to_string(),
    };

    SendEmailParams {
        to,
        contact_name,
        subject: Some(subject),
        body: Some(body),
        ..Default::default()
    }
}

fn synthesize_meeting(original_query: &str) -> ScheduleMeetingParams {
    ScheduleMeetingParams {
        contact_email: EMAIL_ADDRESS
            .find(original_query)
            .map(|m| m.as_str().to_string()),
        contact_name: extract_contact_name(original_query),
        date: extract_date(original_query, Utc::now().date_naive()),
        time: extract_time(original_query),
        duration_minutes: None,
        title: None,
    }
}

fn extract_contact_name(query: &str) -> Option<String> {
    WITH_NAME
        .captures(query)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Resolve a day-month mention to an ISO date in the current or next year:
/// a date already past this year rolls forward.
fn resolve_day_month(day: u32, month: u32, today: NaiveDate) -> Option<String> {
    let this_year = NaiveDate::from_ymd_opt(today.year(), month, day)?;
    let resolved = if this_year < today {
        NaiveDate::from_ymd_opt(today.year() + 1, month, day)?
    } else {
        this_year
    };
    Some(resolved.format("%Y-%m-%d").to_string())
}

fn month_number(name: &str) -> Option<u32> {
    match name.to_lowercase().as_str() {
        "january" => Some(1),
        "february" => Some(2),
        "march" => Some(3),
        "april" => Some(4),
        "may" => Some(5),
        "june" => Some(6),
        "july" => Some(7),
        "august" => Some(8),
        "september" => Some(9),
        "october" => Some(10),
        "november" => Some(11),
        "december" => Some(12),
        _ => None,
    }
}

fn extract_date(query: &str, today: NaiveDate) -> Option<String> {
    if let Some(capture) = DAY_MONTH.captures(query) {
        let day: u32 = capture.get(1)?.as_str().parse().ok()?;
        let month = month_number(capture.get(2)?.as_str())?;
        return resolve_day_month(day, month, today);
    }
    if let Some(capture) = MONTH_DAY.captures(query) {
        let month = month_number(capture.get(1)?.as_str())?;
        let day: u32 = capture.get(2)?.as_str().parse().ok()?;
        return resolve_day_month(day, month, today);
    }
    let lowered = query.to_lowercase();
    if lowered.contains("tomorrow") {
        return Some((today + chrono::Duration::days(1)).format("%Y-%m-%d").to_string());
    }
    if lowered.contains("today") {
        return Some(today.format("%Y-%m-%d").to_string());
    }
    None
}

fn extract_time(query: &str) -> Option<String> {
    let capture = TIME_OF_DAY.captures(query)?;
    let hour = capture.get(1)?.as_str();
    let meridiem = capture.get(3)?.as_str().to_lowercase();
    match capture.get(2) {
        Some(minutes) => Some(format!("{}:{}{}", hour, minutes.as_str(), meridiem)),
        None => Some(format!("{}{}", hour, meridiem)),
    }
}
