//! Context retrieval and assembly

pub mod models;
pub mod retriever;

pub use models::{ContextSections, ContextSummary, Document, DocumentSource, SearchFilters};
pub use retriever::{ContextRetriever, MAX_CONTEXT_DOCUMENTS};
