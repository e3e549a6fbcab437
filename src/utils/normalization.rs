// src/utils/normalization.rs

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

/// Anything outside the Arabic block, ASCII letters, digits and whitespace
/// becomes a single space before the whitespace collapse.
static SCRUB_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\u{0600}-\u{06FF}A-Za-z0-9\s]").unwrap());

/// Arabic combining marks: tanween/harakat, Quranic annotation signs and the
/// small high marks.
fn is_arabic_diacritic(c: char) -> bool {
    matches!(
        c,
        '\u{064B}'..='\u{065F}' | '\u{0610}'..='\u{061A}' | '\u{06D6}'..='\u{06ED}'
    )
}

/// Fold spelling variants that differ only by hamza carrier or final-form
/// convention onto one letter.
fn fold_letter(c: char) -> char {
    match c {
        'آ' | 'أ' | 'إ' => 'ا', // alef variants
        'ؤ' => 'و',             // waw with hamza
        'ئ' => 'ي',             // ya with hamza
        'ة' => 'ه',             // teh marbuta
        _ => c,
    }
}

/// 🔠 Canonical comparison form for Arabic and mixed-script text.
///
/// NFKC composition, diacritic stripping, letter-variant folding, a scrub of
/// everything outside the allowed character classes, whitespace collapse and
/// lowercasing, in that order. Idempotent: normalizing a normalized string
/// is a no-op.
pub fn normalize(s: &str) -> String {
    let composed: String = s.nfkc().collect();
    let folded: String = composed
        .chars()
        .filter(|c| !is_arabic_diacritic(*c))
        .map(fold_letter)
        .collect();
    let scrubbed = SCRUB_RE.replace_all(&folded, " ");
    scrubbed
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Normalized whitespace tokens of `s`.
pub fn tokens(s: &str) -> Vec<String> {
    normalize(s)
        .split_whitespace()
        .map(str::to_owned)
        .collect()
}

/// Keep only ASCII digits; ids and phones compare in this form.
pub fn digits_only(s: &str) -> String {
    s.chars().filter(char::is_ascii_digit).collect()
}

/// Split a single children cell on the common delimiters (including the
/// Arabic comma) and normalize each child name.
pub fn split_children(raw: &str) -> Vec<String> {
    raw.split([';', ',', '|', '،'])
        .map(normalize)
        .filter(|c| !c.is_empty())
        .collect()
}
