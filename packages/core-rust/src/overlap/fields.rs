//! Overlap-layer field normalization.
//!
//! Deliberately separate from [`crate::normalize`] (which serves the
//! match-key/dedup side) so the two systems can evolve independently:
//! this layer uses NFKD instead of NFC, strips bracketed annotations like
//! `[Review]`, and returns an empty string rather than `None` for titles.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use unicode_normalization::UnicodeNormalization;

pub use crate::normalize::{extract_year, normalize_volume};

static BRACKET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[.*?\]").expect("bracket regex"));
static PUNCT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s]").expect("punctuation regex"));

/// Normalizes a title for overlap detection: NFKD, lowercase, remove
/// `[bracketed]` annotations, remove punctuation, collapse whitespace,
/// strip a trailing period. Empty input yields an empty string.
#[must_use]
pub fn normalize_title_for_overlap(raw: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }
    let text: String = raw.nfkd().collect::<String>().to_lowercase();
    let text = BRACKET_RE.replace_all(&text, " ");
    let text = PUNCT_RE.replace_all(&text, " ");
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    match collapsed.strip_suffix('.') {
        Some(stripped) => stripped.to_string(),
        None => collapsed,
    }
}

/// Extracts lowercase surnames from a list of author strings.
///
/// Each entry is treated as "Last, First" (surname before the first comma)
/// or "First Last" (surname is the final whitespace token).
#[must_use]
pub fn parse_authors(entries: &[String]) -> Vec<String> {
    entries
        .iter()
        .filter_map(|entry| surname_of(entry))
        .collect()
}

/// [`parse_authors`] over a JSON value: accepts an array of strings or a
/// single semicolon-delimited string. Anything else yields an empty list.
#[must_use]
pub fn parse_authors_value(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) => s
            .split(';')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .filter_map(surname_of)
            .collect(),
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .filter_map(surname_of)
            .collect(),
        _ => Vec::new(),
    }
}

/// First surname from [`parse_authors_value`], or `None`.
#[must_use]
pub fn first_author_last(value: &Value) -> Option<String> {
    parse_authors_value(value).into_iter().next()
}

fn surname_of(entry: &str) -> Option<String> {
    let last = match entry.split_once(',') {
        Some((before, _)) => before.trim(),
        None => entry.split_whitespace().last().unwrap_or(entry),
    };
    let cleaned: String = last
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_whitespace())
        .collect();
    let cleaned = cleaned.trim().to_string();
    (!cleaned.is_empty()).then_some(cleaned)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn title_strips_bracketed_annotations() {
        assert_eq!(
            normalize_title_for_overlap("Effects of caffeine [Review]"),
            "effects of caffeine",
        );
        assert_eq!(
            normalize_title_for_overlap("[Erratum] Dosing in adults"),
            "dosing in adults",
        );
    }

    #[test]
    fn title_keeps_stop_words() {
        // Unlike the dedup layer, "of"/"the" survive here.
        assert_eq!(
            normalize_title_for_overlap("The Biology of Aging."),
            "the biology of aging",
        );
    }

    #[test]
    fn title_empty_yields_empty_string() {
        assert_eq!(normalize_title_for_overlap(""), "");
        assert_eq!(normalize_title_for_overlap("[]..."), "");
    }

    #[test]
    fn title_is_idempotent() {
        let once = normalize_title_for_overlap("Stress & Coping: a Survey [Review].");
        assert_eq!(normalize_title_for_overlap(&once), once);
    }

    #[test]
    fn authors_from_list() {
        let authors = vec!["Smith, John".to_string(), "Jane Doe".to_string()];
        assert_eq!(parse_authors(&authors), vec!["smith", "doe"]);
    }

    #[test]
    fn authors_from_semicolon_string() {
        let value = json!("Smith, John; Doe, Jane");
        assert_eq!(parse_authors_value(&value), vec!["smith", "doe"]);
    }

    #[test]
    fn authors_from_json_array() {
        let value = json!(["Lee, C", "Garcia-Marquez, G"]);
        assert_eq!(parse_authors_value(&value), vec!["lee", "garciamarquez"]);
    }

    #[test]
    fn first_author_last_takes_head() {
        let value = json!(["Smith, John", "Doe, Jane"]);
        assert_eq!(first_author_last(&value).as_deref(), Some("smith"));
        assert_eq!(first_author_last(&json!(null)), None);
        assert_eq!(first_author_last(&json!([])), None);
    }
}
