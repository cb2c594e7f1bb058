//! Small text measures used by the quality checks.

use std::collections::HashSet;

/// Lowercased whitespace-separated tokens.
pub fn token_set(text: &str) -> HashSet<String> {
    text.split_whitespace().map(str::to_lowercase).collect()
}

/// Jaccard similarity of the token sets; 0.0 when both are empty.
pub fn jaccard(a: &str, b: &str) -> f64 {
    let left = token_set(a);
    let right = token_set(b);
    let union = left.union(&right).count();
    if union == 0 {
        return 0.0;
    }
    left.intersection(&right).count() as f64 / union as f64
}

/// Non-empty sentences split on runs of `.`, `!` and `?`.
pub fn sentence_count(text: &str) -> usize {
    text.split(['.', '!', '?'])
        .filter(|s| !s.trim().is_empty())
        .count()
}

pub fn average_sentence_length(text: &str) -> f64 {
    let words = text.split_whitespace().count();
    words as f64 / sentence_count(text).max(1) as f64
}

/// Readability proxy in [0, 100]; shorter sentences score higher.
pub fn readability(text: &str) -> f64 {
    (100.0 - 2.0 * average_sentence_length(text)).clamp(0.0, 100.0)
}

/// Occurrences of `keyword` per 100 words of `text`, case-insensitive.
pub fn keyword_density(text: &str, keyword: &str) -> f64 {
    let keyword = keyword.trim().to_lowercase();
    if keyword.is_empty() {
        return 0.0;
    }
    let total_words = text.split_whitespace().count().max(1);
    let occurrences = text.to_lowercase().matches(keyword.as_str()).count();
    occurrences as f64 / total_words as f64 * 100.0
}

/// Whether any of the first `n` words of `phrase` occurs in `haystack_lower`.
/// `haystack_lower` must already be lowercased.
pub fn leading_terms_match(phrase: &str, n: usize, haystack_lower: &str) -> bool {
    phrase
        .split_whitespace()
        .take(n)
        .map(str::to_lowercase)
        .any(|term| haystack_lower.contains(&term))
}
