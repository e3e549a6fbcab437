// src/utils/matching.rs

use std::collections::HashSet;

/// 🔠 Jaro-Winkler over pre-normalized strings. An absent field must never
/// look like a perfect match, so empty input on either side scores 0.
pub fn jaro_winkler(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    strsim::jaro_winkler(a, b)
}

/// Jaccard over whitespace token sets; both-empty scores 0 for the same
/// reason as [`jaro_winkler`]. Inputs are assumed pre-normalized.
pub fn token_jaccard(a: &str, b: &str) -> f64 {
    let sa: HashSet<&str> = a.split_whitespace().collect();
    let sb: HashSet<&str> = b.split_whitespace().collect();
    set_jaccard(&sa, &sb)
}

/// Jaccard over two already-split name lists (children lists).
pub fn list_jaccard(a: &[String], b: &[String]) -> f64 {
    let sa: HashSet<&str> = a.iter().map(String::as_str).collect();
    let sb: HashSet<&str> = b.iter().map(String::as_str).collect();
    set_jaccard(&sa, &sb)
}

fn set_jaccard(a: &HashSet<&str>, b: &HashSet<&str>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// Tokens rejoined in alphabetical order, the order-insensitive comparison
/// key for a full name.
pub fn sorted_join(s: &str) -> String {
    let mut parts: Vec<&str> = s.split_whitespace().collect();
    parts.sort_unstable();
    parts.join(" ")
}

/// 🎯 Order-free composite name similarity: 70% token-set overlap, 30%
/// Jaro-Winkler over the alphabetically rejoined tokens.
pub fn name_order_free_score(a: &str, b: &str) -> f64 {
    0.7 * token_jaccard(a, b) + 0.3 * jaro_winkler(&sorted_join(a), &sorted_join(b))
}
