//! The assistant pipeline
//!
//! Query flow: classify → retrieve → compose → generate → parse → validate →
//! execute. Event flow: match → threshold → execute. Nothing here is fatal
//! to the host: upstream failures degrade to an apology reply, bad calls are
//! dropped with reasons, failed actions are recorded and skipped over.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::context::{ContextRetriever, ContextSections};
use crate::executor::{ActionExecutor, ActionOutcome};
use crate::intent::IntentClassifier;
use crate::llm::{ChatMessage, ChatModel};
use crate::metrics::METRICS;
use crate::proactive::{InstructionMatcher, ProactiveEvent};
use crate::prompt::PromptComposer;
use crate::services::{
    AssistantStore, CalendarService, CrmService, DocumentSearch, EmailService,
};
use crate::tools::{ToolCallParser, ToolCallValidator};

const APOLOGY: &str =
    "I'm sorry, I couldn't reach my language model just now. Please try again in a moment.";

/// One inbound query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default)]
    pub conversation_history: Vec<ChatMessage>,
    #[serde(default)]
    pub context: Option<Value>,
}

/// The user-facing reply plus what was actually done
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantReply {
    pub text: String,
    pub intent: String,
    pub actions: Vec<ActionOutcome>,
}

/// Result of processing one proactive event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventOutcome {
    pub matched: usize,
    pub executed: Vec<ActionOutcome>,
}

/// The assembled pipeline
pub struct Assistant {
    classifier: IntentClassifier,
    retriever: ContextRetriever,
    composer: PromptComposer,
    parser: ToolCallParser,
    validator: ToolCallValidator,
    matcher: InstructionMatcher,
    executor: ActionExecutor,
    llm: Arc<dyn ChatModel>,
    store: Arc<dyn AssistantStore>,
    temperature: f32,
}

impl Assistant {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        search: Arc<dyn DocumentSearch>,
        store: Arc<dyn AssistantStore>,
        email: Arc<dyn EmailService>,
        calendar: Arc<dyn CalendarService>,
        crm: Arc<dyn CrmService>,
        llm: Arc<dyn ChatModel>,
        temperature: f32,
        dedup_ttl: Duration,
        dedup_capacity: u64,
    ) -> Self {
        Self {
            classifier: IntentClassifier::new(),
            retriever: ContextRetriever::new(search, store.clone()),
            composer: PromptComposer::new(),
            parser: ToolCallParser::new(),
            validator: ToolCallValidator::new(),
            matcher: InstructionMatcher::new(),
            executor: ActionExecutor::new(
                email,
                calendar,
                crm,
                store.clone(),
                dedup_ttl,
                dedup_capacity,
            ),
            llm,
            store,
            temperature,
        }
    }

    /// Process one user query end to end. Never fails: every error path
    /// degrades to a textual reply.
    pub async fn handle_query(&self, user_id: &str, request: QueryRequest) -> AssistantReply {
        let started = Instant::now();
        let intent = self.classifier.classify(&request.query);
        METRICS.record_query(intent.kind.as_str());

        if intent.is_conditional_instruction {
            match self
                .store
                .create_instruction(user_id, &request.query, Default::default())
                .await
            {
                Ok(instruction) => {
                    info!(id = %instruction.id, "stored ongoing instruction from query")
                }
                Err(e) => warn!(error = %e, "failed to store ongoing instruction"),
            }
        }

        let sections = match self
            .retriever
            .build_sections(user_id, &request.query, &intent, request.context.clone())
            .await
        {
            Ok(sections) => sections,
            Err(e) => {
                warn!(error = %e, "context assembly failed, continuing with empty sections");
                ContextSections::empty()
            }
        };

        let system_prompt = self.composer.compose(&sections, &intent, Utc::now());

        let mut messages = vec![ChatMessage::system(system_prompt)];
        messages.extend(request.conversation_history.iter().cloned());
        messages.push(ChatMessage::user(request.query.clone()));

        let response = match self.llm.generate(&messages, self.temperature).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "generation failed");
                METRICS.query_duration.observe(started.elapsed().as_secs_f64());
                return AssistantReply {
                    text: APOLOGY.to_string(),
                    intent: intent.kind.as_str().to_string(),
                    actions: vec![],
                };
            }
        };

        let calls = self
            .parser
            .parse(&response, Some(&intent), Some(&request.query));
        let rejections = self.validator.rejection_reasons(&calls);
        let valid = self.validator.validate_all(calls);
        let actions = self.executor.execute_all(user_id, &valid).await;

        if let Err(e) = self.store.append_message(user_id, "user", &request.query).await {
            warn!(error = %e, "failed to record user message");
        }
        if let Err(e) = self.store.append_message(user_id, "assistant", &response).await {
            warn!(error = %e, "failed to record assistant message");
        }

        let text = render_reply(response, &rejections, &actions);

        METRICS.query_duration.observe(started.elapsed().as_secs_f64());
        AssistantReply {
            text,
            intent: intent.kind.as_str().to_string(),
            actions,
        }
    }

    /// Process one normalized webhook event: match the user's active
    /// instructions, dispatch everything above the threshold. Each dispatch
    /// is isolated; one failing action does not block the rest.
    pub async fn handle_event(&self, event: ProactiveEvent) -> EventOutcome {
        METRICS.record_proactive_event(&event.event);

        let instructions = match self.store.list_instructions(&event.user_id, true).await {
            Ok(instructions) => instructions,
            Err(e) => {
                warn!(error = %e, "failed to load instructions for event");
                return EventOutcome {
                    matched: 0,
                    executed: vec![],
                };
            }
        };

        let matches = self.matcher.match_all(&event, &instructions);
        let matched = matches.len();
        let mut executed = Vec::new();

        for m in matches.iter().filter(|m| m.executable()) {
            let call = match self.executor.action_for_match(&event, m).await {
                Ok(Some(call)) => call,
                Ok(None) => continue,
                Err(e) => {
                    warn!(
                        pattern = m.pattern.as_str(),
                        error = %e,
                        "failed to build action for match"
                    );
                    continue;
                }
            };

            // The executor invariant holds on the proactive path too: no
            // call runs without passing validation.
            let verdict = self.validator.validate(&call);
            if !verdict.valid {
                warn!(
                    tool = call.name(),
                    reason = verdict.reason.as_deref().unwrap_or(""),
                    "proactive action failed validation"
                );
                continue;
            }

            if let Some(outcome) = self.executor.execute_proactive(&event, m, &call).await {
                executed.push(outcome);
            }
        }

        info!(
            event = %event.event,
            matched,
            executed = executed.len(),
            "proactive event processed"
        );

        EventOutcome { matched, executed }
    }
}

fn render_reply(
    response: String,
    rejections: &[String],
    actions: &[ActionOutcome],
) -> String {
    let mut text = response;

    if !rejections.is_empty() {
        text.push_str("\n\nSome requested actions were skipped:");
        for reason in rejections {
            text.push_str(&format!("\n- {}", reason));
        }
    }

    let failures: Vec<&ActionOutcome> = actions.iter().filter(|a| !a.success).collect();
    if !failures.is_empty() {
        text.push_str("\n\nSome actions failed:");
        for failure in failures {
            text.push_str(&format!("\n- {}: {}", failure.tool, failure.summary));
        }
    }

    text
}
