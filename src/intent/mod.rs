//! Query intent classification

pub mod classifier;

pub use classifier::{ContactQueryType, Intent, IntentClassifier, IntentKind};
