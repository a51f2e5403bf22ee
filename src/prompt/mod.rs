//! Prompt composition
//!
//! Pure assembly of retrieved context, intent, and policy text into the
//! system instruction for the language model. The composer owns the tool
//! catalog wording: all ten tool names and the JSON call shape must appear
//! verbatim, because the parser's patterns depend on the model echoing that
//! shape back.

use chrono::{DateTime, Utc};
use tiktoken_rs::{cl100k_base, CoreBPE};

use crate::context::models::ContextSections;
use crate::intent::Intent;
use crate::tools::TOOL_CATALOG;

/// Per-document token allowance when embedding document bodies
const DOCUMENT_TOKEN_ALLOWANCE: usize = 200;

/// Clips text to a token allowance. Uses cl100k_base when available and a
/// word-count approximation (~1.3 tokens per word) otherwise.
pub struct TokenClipper {
    bpe: Option<CoreBPE>,
}

impl TokenClipper {
    pub fn new() -> Self {
        let bpe = match cl100k_base() {
            Ok(bpe) => Some(bpe),
            Err(e) => {
                tracing::warn!(error = %e, "tiktoken unavailable, falling back to word estimate");
                None
            }
        };
        Self { bpe }
    }

    pub fn clip(&self, text: &str, max_tokens: usize) -> String {
        match &self.bpe {
            Some(bpe) => {
                let tokens = bpe.encode_with_special_tokens(text);
                if tokens.len() <= max_tokens {
                    return text.to_string();
                }
                bpe.decode(tokens[..max_tokens].to_vec())
                    .unwrap_or_else(|_| self.clip_by_words(text, max_tokens))
            }
            None => {
                let estimated = (text.split_whitespace().count() as f64 * 1.3).ceil() as usize;
                if estimated <= max_tokens {
                    text.to_string()
                } else {
                    self.clip_by_words(text, max_tokens)
                }
            }
        }
    }

    fn clip_by_words(&self, text: &str, max_tokens: usize) -> String {
        let keep = ((max_tokens as f64) / 1.3).floor() as usize;
        text.split_whitespace()
            .take(keep.max(1))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl Default for TokenClipper {
    fn default() -> Self {
        Self::new()
    }
}

/// Prompt composer. Pure: all inputs (including the current date) are
/// passed in, no I/O happens here.
pub struct PromptComposer {
    clipper: TokenClipper,
}

impl PromptComposer {
    pub fn new() -> Self {
        Self {
            clipper: TokenClipper::new(),
        }
    }

    pub fn compose(
        &self,
        sections: &ContextSections,
        intent: &Intent,
        now: DateTime<Utc>,
    ) -> String {
        let mut prompt = String::new();

        prompt.push_str(
            "You are an assistant connected to the user's Gmail, Google Calendar, \
             and HubSpot CRM.\n\n",
        );
        prompt.push_str(&format!("Today's date is {}.\n\n", now.format("%Y-%m-%d")));

        prompt.push_str("Available tools:\n");
        for (name, description) in TOOL_CATALOG {
            prompt.push_str(&format!("- {}: {}\n", name, description));
        }
        prompt.push_str(
            "\nTo invoke a tool, respond with a fenced json block of the exact shape:\n\
             ```json\n{\"tool\": \"<tool name>\", \"parameters\": { ... }}\n```\n\n",
        );

        prompt.push_str(
            "Rules:\n\
             - Never invent contact names, email addresses, or company data. \
               Use only data present in the context below or returned by a tool.\n\
             - Never claim an email was sent or a meeting was scheduled unless \
               you emitted the corresponding tool call.\n\
             - Never schedule events in a past year; resolve relative dates \
               against today's date above.\n\
             - Tool calls must be JSON in the shape above; no other syntax is \
               recognized.\n\n",
        );

        if intent.is_conditional_instruction {
            prompt.push_str(
                "The user is stating an ongoing rule, not asking for an immediate \
                 action. The rule has been saved. Acknowledge it and describe when \
                 it will fire; do not invoke any tool now.\n\n",
            );
        }
        if intent.is_contact_query {
            prompt.push_str(
                "The user is asking about their CRM contacts. Use the contact \
                 listing tools rather than answering from memory.\n\n",
            );
        }

        if !sections.documents.is_empty() {
            prompt.push_str("Relevant documents:\n");
            for doc in &sections.documents {
                let body = self
                    .clipper
                    .clip(&doc.content, DOCUMENT_TOKEN_ALLOWANCE);
                prompt.push_str(&format!(
                    "[{} | {}] {}\n{}\n\n",
                    doc.source.as_str(),
                    doc.created_at.format("%Y-%m-%d"),
                    doc.title,
                    body
                ));
            }
        }

        if !sections.instructions.is_empty() {
            prompt.push_str("Active ongoing instructions:\n");
            for instruction in &sections.instructions {
                prompt.push_str(&format!("- {}\n", instruction.instruction));
            }
            prompt.push('\n');
        }

        if !sections.pending_tasks.is_empty() {
            prompt.push_str("Pending tasks:\n");
            for task in &sections.pending_tasks {
                prompt.push_str(&format!("- {}\n", task.kind));
            }
            prompt.push('\n');
        }

        if !sections.recent_context.is_empty() {
            prompt.push_str("Recent conversation:\n");
            for message in &sections.recent_context {
                prompt.push_str(&format!("{}: {}\n", message.role, message.content));
            }
            prompt.push('\n');
        }

        if let Some(trigger) = &sections.trigger {
            prompt.push_str(&format!("Trigger event: {}\n\n", trigger));
        }

        prompt.push_str(&format!(
            "Context summary: {} documents, {} instructions, {} recent messages, {} pending tasks.\n",
            sections.summary.documents,
            sections.summary.instructions,
            sections.summary.recent_messages,
            sections.summary.pending_tasks
        ));

        prompt
    }
}

impl Default for PromptComposer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::{IntentClassifier, IntentKind};

    fn intent() -> Intent {
        Intent {
            kind: IntentKind::General,
            confidence: 0.1,
            keywords: vec![],
            is_contact_query: false,
            contact_query_type: None,
            is_conditional_instruction: false,
        }
    }

    #[test]
    fn test_all_tool_names_present_verbatim() {
        let composer = PromptComposer::new();
        let prompt = composer.compose(&ContextSections::empty(), &intent(), Utc::now());

        for (name, _) in TOOL_CATALOG {
            assert!(prompt.contains(name), "missing tool {}", name);
        }
        assert!(prompt.contains(r#"{"tool": "<tool name>", "parameters": { ... }}"#));
    }

    #[test]
    fn test_current_date_embedded() {
        let composer = PromptComposer::new();
        let now = Utc::now();
        let prompt = composer.compose(&ContextSections::empty(), &intent(), now);
        assert!(prompt.contains(&now.format("%Y-%m-%d").to_string()));
    }

    #[test]
    fn test_conditional_paragraph_only_for_instructions() {
        let composer = PromptComposer::new();
        let classifier = IntentClassifier::new();

        let plain = composer.compose(&ContextSections::empty(), &intent(), Utc::now());
        assert!(!plain.contains("ongoing rule"));

        let conditional = classifier.classify("when someone emails me, create a contact");
        let prompt = composer.compose(&ContextSections::empty(), &conditional, Utc::now());
        assert!(prompt.contains("ongoing rule"));
    }

    #[test]
    fn test_clipper_limits_long_text() {
        let clipper = TokenClipper::new();
        let long = "word ".repeat(2000);
        let clipped = clipper.clip(&long, 50);
        assert!(clipped.len() < long.len());
    }

    #[test]
    fn test_compose_is_deterministic() {
        let composer = PromptComposer::new();
        let now = Utc::now();
        let a = composer.compose(&ContextSections::empty(), &intent(), now);
        let b = composer.compose(&ContextSections::empty(), &intent(), now);
        assert_eq!(a, b);
    }
}
