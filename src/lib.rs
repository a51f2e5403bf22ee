//! assistant-core
//!
//! The decision core of a conversational assistant connected to Gmail,
//! Google Calendar, and HubSpot: intent classification, retrieval-augmented
//! prompting, tool-call parsing and validation, proactive instruction
//! matching, and action execution. External integrations are consumed
//! through the trait seams in [`services`].

pub mod api;
pub mod assistant;
pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod intent;
pub mod llm;
pub mod metrics;
pub mod proactive;
pub mod prompt;
pub mod services;
pub mod tools;

pub use assistant::{Assistant, AssistantReply, EventOutcome, QueryRequest};
pub use config::Config;
pub use error::{Error, Result};

/// Common imports for downstream code and tests
pub mod prelude {
    pub use crate::assistant::{Assistant, AssistantReply, EventOutcome, QueryRequest};
    pub use crate::config::Config;
    pub use crate::context::{ContextRetriever, ContextSections, Document, DocumentSource};
    pub use crate::error::{Error, Result};
    pub use crate::executor::{ActionExecutor, ActionOutcome};
    pub use crate::intent::{Intent, IntentClassifier, IntentKind};
    pub use crate::llm::{ChatMessage, ChatModel, LlmClient};
    pub use crate::proactive::{InstructionMatch, InstructionMatcher, ProactiveEvent};
    pub use crate::prompt::PromptComposer;
    pub use crate::services::{
        AssistantStore, CalendarService, CrmService, DocumentSearch, EmailService, InMemoryStore,
    };
    pub use crate::tools::{ToolCall, ToolCallParser, ToolCallValidator};
}
