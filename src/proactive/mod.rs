//! Proactive instruction matching
//!
//! Every inbound webhook collapses into a [`ProactiveEvent`] before it
//! reaches the matcher.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod matcher;
pub mod patterns;

pub use matcher::{InstructionMatch, InstructionMatcher, EXECUTION_THRESHOLD};
pub use patterns::{ExtractorKind, PatternKind, PATTERN_LIBRARY};

/// The normalized shape every webhook event collapses into
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProactiveEvent {
    pub event: String,
    pub service: String,
    pub data: Value,
    pub user_id: String,
}

impl ProactiveEvent {
    pub fn new(event: &str, service: &str, data: Value, user_id: &str) -> Self {
        Self {
            event: event.to_string(),
            service: service.to_string(),
            data,
            user_id: user_id.to_string(),
        }
    }
}
