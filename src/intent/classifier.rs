//! Keyword/regex intent classifier
//!
//! Scores a query against a fixed table of category keyword lists, applies
//! category-specific boosts, and returns the argmax with flags the rest of
//! the pipeline branches on. The tables are data, not control flow, so tests
//! can enumerate them directly.

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Intent categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    Question,
    Action,
    Search,
    Analysis,
    Creative,
    Meeting,
    Instruction,
    Notes,
    AllContactsNotes,
    General,
}

impl IntentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Question => "question",
            Self::Action => "action",
            Self::Search => "search",
            Self::Analysis => "analysis",
            Self::Creative => "creative",
            Self::Meeting => "meeting",
            Self::Instruction => "instruction",
            Self::Notes => "notes",
            Self::AllContactsNotes => "all_contacts_notes",
            Self::General => "general",
        }
    }
}

/// Kind of contact listing the user asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactQueryType {
    ListAll,
    WithNotes,
}

/// Classification result. Derived purely from the query text; recomputed
/// per query. Downstream components branch on the flags, not just `kind`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Intent {
    pub kind: IntentKind,
    pub confidence: f32,
    pub keywords: Vec<String>,
    pub is_contact_query: bool,
    pub contact_query_type: Option<ContactQueryType>,
    pub is_conditional_instruction: bool,
}

/// Category keyword table. Insertion order is the tie-break: when two
/// categories score equally, the earlier entry wins. This is a stable,
/// documented behavior, not an accident.
static CATEGORY_KEYWORDS: Lazy<IndexMap<IntentKind, &'static [&'static str]>> = Lazy::new(|| {
    let mut table: IndexMap<IntentKind, &'static [&'static str]> = IndexMap::new();
    table.insert(
        IntentKind::Question,
        &["what", "when", "where", "who", "why", "how", "did", "does", "?"][..],
    );
    table.insert(
        IntentKind::Action,
        &["send", "create", "schedule", "add", "update", "delete", "email", "book"][..],
    );
    table.insert(
        IntentKind::Search,
        &["find", "search", "look for", "show", "list", "get"][..],
    );
    table.insert(
        IntentKind::Analysis,
        &["analyze", "summarize", "summary", "report", "compare", "review"][..],
    );
    table.insert(
        IntentKind::Creative,
        &["write", "draft", "compose", "generate"][..],
    );
    table.insert(
        IntentKind::Meeting,
        &["meeting", "calendar", "appointment", "call", "sync", "catch up"][..],
    );
    table.insert(
        IntentKind::Instruction,
        &["when someone", "whenever", "every time", "from now on", "always"][..],
    );
    table.insert(
        IntentKind::Notes,
        &["notes for", "notes on", "tell me about", "what do you know about"][..],
    );
    table.insert(
        IntentKind::AllContactsNotes,
        &["all contacts notes", "contacts with notes", "all contact notes"][..],
    );
    table
});

/// Conditional-instruction shapes ("when someone emails me, ...")
static CONDITIONAL_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"when\s+(someone|somebody|anyone|a\s+person)\s+emails?",
        r"if\s+\S+.*\s+emails?",
        r"from\s+now\s+on",
        r"whenever\s+\w+",
        r"every\s+time\s+\w+",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("conditional pattern"))
    .collect()
});

/// "meet/schedule/book ... with <name>" shape
static MEETING_WITH_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(meet|meeting|schedule|book)\s+.*\bwith\s+\w+").expect("meeting pattern"));

/// Explicit contact listing phrases
const CONTACT_LISTING_PHRASES: &[&str] = &[
    "show all contacts",
    "list all contacts",
    "show me all contacts",
    "get all contacts",
    "all my contacts",
    "show contacts",
    "list contacts",
    "my contacts",
];

/// "notes for X" shapes
const NOTES_PHRASES: &[&str] = &[
    "notes for",
    "notes on",
    "tell me about",
    "what do you know about",
    "background on",
];

/// Bulk notes phrases
const ALL_CONTACTS_NOTES_PHRASES: &[&str] = &[
    "all contacts notes",
    "contacts with notes",
    "all contact notes",
    "notes for all contacts",
];

const INSTRUCTION_BOOST: u32 = 5;
const CONTACT_LISTING_BOOST: u32 = 5;
const ALL_CONTACTS_NOTES_BOOST: u32 = 5;
const NOTES_BOOST: u32 = 3;
const MEETING_BOOST: u32 = 3;

/// Intent classifier over the static tables. Never fails: a query with no
/// matches yields `General` at confidence 0.1.
#[derive(Debug, Clone, Default)]
pub struct IntentClassifier;

impl IntentClassifier {
    pub fn new() -> Self {
        Self
    }

    pub fn classify(&self, query: &str) -> Intent {
        let lowered = query.to_lowercase();
        let word_count = lowered.split_whitespace().count().max(1);

        let mut scores: IndexMap<IntentKind, u32> = IndexMap::new();
        let mut matched_keywords = Vec::new();

        for (kind, keywords) in CATEGORY_KEYWORDS.iter() {
            let mut score = 0u32;
            for keyword in *keywords {
                if lowered.contains(keyword) {
                    score += 1;
                    matched_keywords.push((*keyword).to_string());
                }
            }
            scores.insert(*kind, score);
        }

        let is_conditional = CONDITIONAL_PATTERNS.iter().any(|p| p.is_match(&lowered));
        if is_conditional {
            *scores.entry(IntentKind::Instruction).or_insert(0) += INSTRUCTION_BOOST;
        }

        let is_contact_listing = CONTACT_LISTING_PHRASES.iter().any(|p| lowered.contains(p));
        if is_contact_listing {
            *scores.entry(IntentKind::Search).or_insert(0) += CONTACT_LISTING_BOOST;
        }

        if NOTES_PHRASES.iter().any(|p| lowered.contains(p)) {
            *scores.entry(IntentKind::Notes).or_insert(0) += NOTES_BOOST;
        }

        let wants_all_notes = ALL_CONTACTS_NOTES_PHRASES.iter().any(|p| lowered.contains(p));
        if wants_all_notes {
            *scores.entry(IntentKind::AllContactsNotes).or_insert(0) += ALL_CONTACTS_NOTES_BOOST;
        }

        if MEETING_WITH_PATTERN.is_match(&lowered) {
            *scores.entry(IntentKind::Meeting).or_insert(0) += MEETING_BOOST;
        }

        // Argmax keeps the first strictly-greater score, so equal scores
        // resolve to the earlier table entry.
        let mut best_kind = IntentKind::General;
        let mut best_score = 0u32;
        for (kind, score) in scores.iter() {
            if *score > best_score {
                best_kind = *kind;
                best_score = *score;
            }
        }

        // Floor applies only at zero score; otherwise the raw ratio, capped
        // at 1.0 for short queries with heavy boosts.
        let confidence = if best_score == 0 {
            0.1
        } else {
            (best_score as f32 / word_count as f32).min(1.0)
        };

        let kind = if best_score == 0 {
            IntentKind::General
        } else {
            best_kind
        };

        let is_contact_query = is_contact_listing || wants_all_notes;
        let contact_query_type = if wants_all_notes {
            Some(ContactQueryType::WithNotes)
        } else if is_contact_listing {
            Some(ContactQueryType::ListAll)
        } else {
            None
        };

        tracing::debug!(
            kind = kind.as_str(),
            confidence,
            is_contact_query,
            is_conditional,
            "classified query"
        );

        Intent {
            kind,
            confidence,
            keywords: matched_keywords,
            is_contact_query,
            contact_query_type,
            is_conditional_instruction: kind == IntentKind::Instruction,
        }
    }
}
