//! Action execution
//!
//! Dispatches validated tool calls and matched proactive actions to the
//! external collaborators. Every dispatch creates a task row first and
//! updates it afterwards; task creation is not transactional with the side
//! effect, so a crash in between leaves a pending/in_progress row:
//! at-least-once, not exactly-once.
//!
//! Execution across multiple calls from one response is strictly sequential
//! in discovery order: later calls may depend on state created by earlier
//! ones (create_contact followed by add_contact_note). Do not parallelize.

use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::metrics::METRICS;
use crate::proactive::{ExtractorKind, InstructionMatch, ProactiveEvent};
use crate::services::{
    AssistantStore, CalendarService, ContactPage, CrmService, EmailService, EventDraft,
    NewContact, OutgoingEmail, TaskStatus,
};
use crate::tools::{
    CreateContactParams, SendEmailParams, ToolCall,
};

pub mod dedup;

pub use dedup::{fingerprint, ActionDedupCache};

const DEFAULT_SLOT_MINUTES: u32 = 30;
const DEFAULT_MEETING_MINUTES: i64 = 30;
const DEFAULT_MEETING_HOUR: u32 = 10;
const WITH_NOTES_CONTACT_CAP: usize = 20;

/// Outcome of one executed action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub tool: String,
    pub success: bool,
    pub summary: String,
}

/// Action executor over the external collaborators
pub struct ActionExecutor {
    email: Arc<dyn EmailService>,
    calendar: Arc<dyn CalendarService>,
    crm: Arc<dyn CrmService>,
    store: Arc<dyn AssistantStore>,
    dedup: ActionDedupCache,
}

impl ActionExecutor {
    pub fn new(
        email: Arc<dyn EmailService>,
        calendar: Arc<dyn CalendarService>,
        crm: Arc<dyn CrmService>,
        store: Arc<dyn AssistantStore>,
        dedup_ttl: Duration,
        dedup_capacity: u64,
    ) -> Self {
        Self {
            email,
            calendar,
            crm,
            store,
            dedup: ActionDedupCache::new(dedup_ttl, dedup_capacity),
        }
    }

    /// Execute a batch sequentially, in discovery order. One failing call
    /// does not stop the rest.
    pub async fn execute_all(&self, user_id: &str, calls: &[ToolCall]) -> Vec<ActionOutcome> {
        let mut outcomes = Vec::with_capacity(calls.len());
        for call in calls {
            outcomes.push(self.execute(user_id, call, None).await);
        }
        outcomes
    }

    /// Execute one call with a full task lifecycle
    pub async fn execute(
        &self,
        user_id: &str,
        call: &ToolCall,
        fingerprint: Option<String>,
    ) -> ActionOutcome {
        let tool = call.name().to_string();
        let started = Instant::now();

        let task = match self.store.create_task(user_id, &tool, fingerprint).await {
            Ok(task) => task,
            Err(e) => {
                warn!(tool = %tool, error = %e, "failed to create task record");
                METRICS.record_action(&tool, false);
                return ActionOutcome {
                    tool,
                    success: false,
                    summary: format!("could not record task: {}", e),
                };
            }
        };

        if let Err(e) = self
            .store
            .update_task_status(user_id, &task.id, TaskStatus::InProgress, None)
            .await
        {
            warn!(task = %task.id, error = %e, "failed to mark task in_progress");
        }

        let outcome = match self.dispatch(user_id, call).await {
            Ok(summary) => {
                if let Err(e) = self
                    .store
                    .update_task_status(
                        user_id,
                        &task.id,
                        TaskStatus::Completed,
                        Some(summary.clone()),
                    )
                    .await
                {
                    warn!(task = %task.id, error = %e, "failed to mark task completed");
                }
                info!(tool = %tool, task = %task.id, "action completed");
                ActionOutcome {
                    tool: tool.clone(),
                    success: true,
                    summary,
                }
            }
            Err(e) => {
                let message = e.to_string();
                if let Err(update_err) = self
                    .store
                    .update_task_status(
                        user_id,
                        &task.id,
                        TaskStatus::Failed,
                        Some(message.clone()),
                    )
                    .await
                {
                    warn!(task = %task.id, error = %update_err, "failed to mark task failed");
                }
                warn!(tool = %tool, task = %task.id, error = %message, "action failed");
                ActionOutcome {
                    tool: tool.clone(),
                    success: false,
                    summary: message,
                }
            }
        };

        METRICS.record_action(&tool, outcome.success);
        METRICS
            .action_duration
            .with_label_values(&[&tool])
            .observe(started.elapsed().as_secs_f64());

        let _ = self
            .store
            .append_activity(user_id, &tool, &outcome.summary)
            .await;

        outcome
    }

    /// Turn a qualifying instruction match into a concrete tool call.
    /// Returns `None` for pattern families with no extractor wired (a known
    /// gap, recorded rather than guessed at) and for matches whose action is
    /// already satisfied (sender already in the CRM).
    pub async fn action_for_match(
        &self,
        event: &ProactiveEvent,
        m: &InstructionMatch,
    ) -> Result<Option<ToolCall>> {
        let extractor = crate::proactive::PATTERN_LIBRARY
            .iter()
            .find(|p| p.kind == m.pattern)
            .and_then(|p| p.extractor);

        let Some(extractor) = extractor else {
            debug!(pattern = m.pattern.as_str(), "no extractor wired for matched pattern");
            let _ = self
                .store
                .append_activity(
                    &event.user_id,
                    "instruction_match",
                    &format!("matched {} but no action is wired", m.pattern.as_str()),
                )
                .await;
            return Ok(None);
        };

        match extractor {
            ExtractorKind::Email => {
                let Some(email) = m.extracted.get("email").and_then(|v| v.as_str()) else {
                    return Ok(None);
                };
                let existing = self.crm.search_contacts(&event.user_id, email).await?;
                if !existing.is_empty() {
                    debug!(email, "sender already in CRM, skipping contact creation");
                    let _ = self
                        .store
                        .append_activity(
                            &event.user_id,
                            "instruction_match",
                            &format!("{} already exists in the CRM", email),
                        )
                        .await;
                    return Ok(None);
                }
                Ok(Some(ToolCall::CreateContact(CreateContactParams {
                    email: Some(email.to_string()),
                    first_name: m
                        .extracted
                        .get("firstName")
                        .and_then(|v| v.as_str())
                        .map(String::from),
                    last_name: m
                        .extracted
                        .get("lastName")
                        .and_then(|v| v.as_str())
                        .map(String::from),
                })))
            }
            ExtractorKind::Contact => {
                let Some(email) = m.extracted.get("email").and_then(|v| v.as_str()) else {
                    return Ok(None);
                };
                let first = m
                    .extracted
                    .get("firstName")
                    .and_then(|v| v.as_str())
                    .unwrap_or("there");
                Ok(Some(ToolCall::SendEmail(SendEmailParams {
                    to: Some(email.to_string()),
                    subject: Some("Great to connect".to_string()),
                    body: Some(format!(
                        "Hi {},\n\nThanks for connecting. I've added you to my contacts. \
                         Looking forward to working together.\n",
                        first
                    )),
                    ..Default::default()
                })))
            }
            ExtractorKind::CalendarEvent => {
                let attendees: Vec<String> = m
                    .extracted
                    .get("attendees")
                    .and_then(|v| v.as_array())
                    .map(|values| {
                        values
                            .iter()
                            .filter_map(|v| v.as_str().map(String::from))
                            .collect()
                    })
                    .unwrap_or_default();
                if attendees.is_empty() {
                    return Ok(None);
                }
                let title = m
                    .extracted
                    .get("title")
                    .and_then(|v| v.as_str())
                    .unwrap_or("our meeting");
                let when = m
                    .extracted
                    .get("start")
                    .and_then(|v| v.as_str())
                    .unwrap_or("soon");
                Ok(Some(ToolCall::SendEmail(SendEmailParams {
                    to: Some(attendees.join(", ")),
                    subject: Some(format!("Scheduled: {}", title)),
                    body: Some(format!(
                        "Hi,\n\n\"{}\" is on the calendar for {}. See you there.\n",
                        title, when
                    )),
                    ..Default::default()
                })))
            }
        }
    }

    /// Execute a proactive action with redelivery dedup. Returns `None`
    /// when the fingerprint was already executed within the TTL.
    pub async fn execute_proactive(
        &self,
        event: &ProactiveEvent,
        m: &InstructionMatch,
        call: &ToolCall,
    ) -> Option<ActionOutcome> {
        let fp = fingerprint(&[
            &event.user_id,
            m.instruction.id.as_str(),
            call.name(),
            &serde_json::to_string(&event.data).unwrap_or_default(),
        ]);

        if self.dedup.seen(&fp) {
            debug!(tool = call.name(), "skipping duplicate proactive action");
            METRICS.record_action_deduplicated();
            return None;
        }
        self.dedup.record(&fp);

        let outcome = self.execute(&event.user_id, call, Some(fp)).await;

        if outcome.success {
            let _ = self
                .store
                .create_notification(
                    &event.user_id,
                    "Proactive action taken",
                    &format!("\"{}\" → {}", m.instruction.instruction, outcome.summary),
                )
                .await;
        }

        Some(outcome)
    }

    async fn dispatch(&self, user_id: &str, call: &ToolCall) -> Result<String> {
        match call {
            ToolCall::SendEmail(p) => {
                let to = match (&p.to, &p.contact_name) {
                    (Some(to), _) => to.clone(),
                    (None, Some(name)) => self.resolve_contact_email(user_id, name).await?,
                    (None, None) => {
                        return Err(Error::Validation(
                            "send_email reached the executor without a recipient".to_string(),
                        ))
                    }
                };
                let sent = self
                    .email
                    .send(
                        user_id,
                        OutgoingEmail {
                            to: to.clone(),
                            subject: p.subject.clone().unwrap_or_default(),
                            body: p.body.clone().unwrap_or_default(),
                            cc: p.cc.clone(),
                            bcc: p.bcc.clone(),
                            thread_id: p.thread_id.clone(),
                        },
                    )
                    .await?;
                Ok(format!("Email {} sent to {}", sent.id, to))
            }

            ToolCall::GetAvailableTimes(p) => {
                let duration = p.duration_minutes.unwrap_or(DEFAULT_SLOT_MINUTES);
                let slots = self.calendar.available_slots(user_id, duration).await?;
                Ok(format!("Found {} available {}-minute slots", slots.len(), duration))
            }

            ToolCall::CreateCalendarEvent(p) => {
                let title = p.title.clone().unwrap_or_default();
                let start = parse_datetime(p.start.as_deref().unwrap_or_default())?;
                let end = parse_datetime(p.end.as_deref().unwrap_or_default())?;
                let event = self
                    .calendar
                    .create_event(
                        user_id,
                        EventDraft {
                            title,
                            start,
                            end,
                            attendees: p.attendees.clone().unwrap_or_default(),
                            description: p.description.clone(),
                        },
                    )
                    .await?;
                Ok(format!("Event '{}' created ({})", event.title, event.id))
            }

            ToolCall::ScheduleMeetingWithContact(p) => {
                let contact = match (&p.contact_email, &p.contact_name) {
                    (Some(email), _) => self.find_contact(user_id, email).await?,
                    (None, Some(name)) => self.find_contact(user_id, name).await?,
                    (None, None) => {
                        return Err(Error::Validation(
                            "schedule_meeting_with_contact reached the executor without a contact"
                                .to_string(),
                        ))
                    }
                };
                let attendee = contact.email.clone().ok_or_else(|| {
                    Error::NotFound(format!("Email for contact {}", contact.display_name()))
                })?;

                // Defaults applied downstream, per the validation contract:
                // tomorrow at 10am, 30 minutes.
                let date = match p.date.as_deref() {
                    Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                        .map_err(|e| Error::Validation(format!("bad date '{}': {}", raw, e)))?,
                    None => (Utc::now() + ChronoDuration::days(1)).date_naive(),
                };
                let time = match p.time.as_deref() {
                    Some(raw) => parse_time_of_day(raw)
                        .ok_or_else(|| Error::Validation(format!("bad time '{}'", raw)))?,
                    None => NaiveTime::from_hms_opt(DEFAULT_MEETING_HOUR, 0, 0)
                        .expect("static time"),
                };
                let start = Utc.from_utc_datetime(&date.and_time(time));
                let minutes = p.duration_minutes.map(i64::from).unwrap_or(DEFAULT_MEETING_MINUTES);
                let end = start + ChronoDuration::minutes(minutes);
                let title = p
                    .title
                    .clone()
                    .unwrap_or_else(|| format!("Meeting with {}", contact.display_name()));

                let event = self
                    .calendar
                    .create_event(
                        user_id,
                        EventDraft {
                            title: title.clone(),
                            start,
                            end,
                            attendees: vec![attendee],
                            description: None,
                        },
                    )
                    .await?;
                Ok(format!(
                    "Meeting '{}' scheduled for {} ({})",
                    title,
                    start.format("%Y-%m-%d %H:%M"),
                    event.id
                ))
            }

            ToolCall::SearchContacts(p) => {
                let needle = p
                    .query
                    .as_deref()
                    .or(p.email.as_deref())
                    .or(p.name.as_deref())
                    .unwrap_or_default();
                let contacts = self.crm.search_contacts(user_id, needle).await?;
                Ok(format!("Found {} contacts matching '{}'", contacts.len(), needle))
            }

            ToolCall::CreateContact(p) => {
                let contact = self
                    .crm
                    .create_contact(
                        user_id,
                        NewContact {
                            email: p.email.clone().unwrap_or_default(),
                            first_name: p.first_name.clone(),
                            last_name: p.last_name.clone(),
                        },
                    )
                    .await?;
                Ok(format!(
                    "Contact {} created ({})",
                    contact.display_name(),
                    contact.id
                ))
            }

            ToolCall::AddContactNote(p) => {
                let contact = if let Some(id) = &p.contact_id {
                    self.find_contact(user_id, id).await?
                } else if let Some(email) = &p.email {
                    self.find_contact(user_id, email).await?
                } else if let Some(name) = &p.contact_name {
                    self.find_contact(user_id, name).await?
                } else {
                    return Err(Error::Validation(
                        "add_contact_note reached the executor without a target".to_string(),
                    ));
                };
                let note = p.note.clone().unwrap_or_default();
                self.crm.add_note(user_id, &contact.id, &note).await?;
                Ok(format!("Note added to {}", contact.display_name()))
            }

            ToolCall::GetContactNotes(p) => {
                let contact = if let Some(id) = &p.contact_id {
                    self.find_contact(user_id, id).await?
                } else if let Some(name) = &p.contact_name {
                    self.find_contact(user_id, name).await?
                } else {
                    return Err(Error::Validation(
                        "get_contact_notes reached the executor without a target".to_string(),
                    ));
                };
                let notes = self.crm.contact_notes(user_id, &contact.id).await?;
                Ok(format!(
                    "{} notes for {}",
                    notes.len(),
                    contact.display_name()
                ))
            }

            ToolCall::GetAllContacts(p) => {
                let page = paging_from(p.limit.as_ref(), p.offset.as_ref(), &p.include_properties);
                let list = self.crm.contacts_page(user_id, page).await?;
                Ok(format!(
                    "Listed {} of {} contacts{}",
                    list.contacts.len(),
                    list.total,
                    if list.has_more { " (more available)" } else { "" }
                ))
            }

            ToolCall::GetAllContactsWithNotes(p) => {
                let mut page =
                    paging_from(p.limit.as_ref(), p.offset.as_ref(), &p.include_properties);
                page.limit = page.limit.min(WITH_NOTES_CONTACT_CAP);
                let list = self.crm.contacts_page(user_id, page).await?;
                let mut note_count = 0usize;
                for contact in &list.contacts {
                    note_count += self
                        .crm
                        .contact_notes(user_id, &contact.id)
                        .await?
                        .len();
                }
                Ok(format!(
                    "Listed {} contacts with {} notes",
                    list.contacts.len(),
                    note_count
                ))
            }

            ToolCall::Unknown { name, .. } => Err(Error::External(format!(
                "no handler for tool '{}'",
                name
            ))),
        }
    }

    async fn resolve_contact_email(&self, user_id: &str, name: &str) -> Result<String> {
        let contact = self.find_contact(user_id, name).await?;
        contact
            .email
            .ok_or_else(|| Error::NotFound(format!("Email for contact {}", name)))
    }

    async fn find_contact(&self, user_id: &str, needle: &str) -> Result<crate::services::Contact> {
        let contacts = self.crm.search_contacts(user_id, needle).await?;
        contacts
            .into_iter()
            .next()
            .ok_or_else(|| Error::NotFound(format!("Contact {}", needle)))
    }
}

fn paging_from(limit: Option<&Value>, offset: Option<&Value>, properties: &Option<Value>) -> ContactPage {
    let mut page = ContactPage::default();
    if let Some(limit) = limit.and_then(|v| v.as_u64()) {
        page.limit = limit as usize;
    }
    if let Some(offset) = offset.and_then(|v| v.as_u64()) {
        page.offset = offset as usize;
    }
    if let Some(values) = properties.as_ref().and_then(|v| v.as_array()) {
        page.properties = values
            .iter()
            .filter_map(|v| v.as_str().map(String::from))
            .collect();
    }
    page
}

/// Accepts the same shapes the validator accepts
fn parse_datetime(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M") {
        return Ok(Utc.from_utc_datetime(&parsed));
    }
    if let Ok(parsed) = chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Ok(Utc.from_utc_datetime(&parsed));
    }
    if let Ok(parsed) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        let midnight = NaiveTime::from_hms_opt(0, 0, 0).expect("static time");
        return Ok(Utc.from_utc_datetime(&parsed.and_time(midnight)));
    }
    Err(Error::Validation(format!("'{}' is not a parseable date", raw)))
}

/// Parse "2pm", "2:30pm", "10am" into a time of day
fn parse_time_of_day(raw: &str) -> Option<NaiveTime> {
    let lowered = raw.trim().to_lowercase();
    let (body, pm) = if let Some(stripped) = lowered.strip_suffix("pm") {
        (stripped.trim().to_string(), true)
    } else if let Some(stripped) = lowered.strip_suffix("am") {
        (stripped.trim().to_string(), false)
    } else {
        (lowered, false)
    };

    let (hour_raw, minute) = match body.split_once(':') {
        Some((h, m)) => (h.to_string(), m.parse::<u32>().ok()?),
        None => (body, 0),
    };
    let mut hour: u32 = hour_raw.parse().ok()?;
    if pm && hour < 12 {
        hour += 12;
    }
    if !pm && hour == 12 {
        hour = 0;
    }
    NaiveTime::from_hms_opt(hour, minute, 0)
}
