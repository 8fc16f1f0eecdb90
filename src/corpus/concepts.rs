//! Concept tag extraction.
//!
//! Tags are drawn from a fixed seed vocabulary by lowercase substring match
//! against a document's title and body. The vocabulary is intentionally small
//! and editable; extraction is deterministic, so re-indexing the same corpus
//! yields the same tags.

/// The seed vocabulary. Order is preserved in extracted tag lists.
pub const SEED_VOCABULARY: &[&str] = &[
    "trust",
    "pattern",
    "mirror",
    "append",
    "history",
    "context",
    "delete",
    "behavior",
    "intention",
    "decision",
    "human",
    "external",
    "brain",
    "command",
    "oracle",
    "timestamp",
    "immutable",
    "preserve",
];

/// Extract concept tags present in `title` or `body` as substrings.
pub fn extract(title: &str, body: &str) -> Vec<String> {
    let haystack = format!("{} {}", title, body).to_lowercase();
    SEED_VOCABULARY
        .iter()
        .filter(|token| haystack.contains(*token))
        .map(|token| token.to_string())
        .collect()
}
