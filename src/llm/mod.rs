//! Language model client

pub mod client;

pub use client::{ChatMessage, ChatModel, LlmClient, LlmError, ProviderConfig};
