//! Keyword scoring of catalog entries against a free-text description.
//!
//! The score of an entry is the number of description tokens (lower-cased,
//! whitespace-split, counted with repetition) that occur as substrings of the
//! entry's lower-cased description. This is a plain heuristic, not retrieval.

use serde::{Deserialize, Serialize};

use lvkit_shared::CatalogEntry;

/// Number of results returned when the caller does not pick a limit.
pub const DEFAULT_LIMIT: usize = 10;

/// A catalog entry together with its keyword score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoredEntry {
    #[serde(flatten)]
    pub entry: CatalogEntry,
    pub match_score: usize,
}

/// Lower-case and whitespace-split a description into scoring tokens.
pub fn tokenize(description: &str) -> Vec<String> {
    description
        .to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// Count tokens contained in `text` (case-insensitive).
pub fn match_score(tokens: &[String], text: &str) -> usize {
    let haystack = text.to_lowercase();
    tokens
        .iter()
        .filter(|token| haystack.contains(token.as_str()))
        .count()
}

/// Score `entries`, drop zero scores, and return the best `limit` by score.
///
/// Ties keep catalog order.
pub fn score_and_rank(entries: &[CatalogEntry], description: &str, limit: usize) -> Vec<ScoredEntry> {
    let tokens = tokenize(description);
    if tokens.is_empty() {
        return Vec::new();
    }

    let mut scored: Vec<ScoredEntry> = entries
        .iter()
        .filter_map(|entry| {
            let score = match_score(&tokens, &entry.description);
            (score > 0).then(|| ScoredEntry {
                entry: entry.clone(),
                match_score: score,
            })
        })
        .collect();

    // `sort_by` is stable, so equal scores stay in catalog order.
    scored.sort_by(|a, b| b.match_score.cmp(&a.match_score));
    scored.truncate(limit);
    scored
}
