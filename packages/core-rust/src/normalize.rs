//! Dedup-layer field normalization for match-key construction.
//!
//! Pure functions, no I/O. Everything here is total: invalid or empty input
//! yields `None`, never an error, and every function is idempotent.
//!
//! This layer feeds the match-key builder and the dedup-mode cluster engine.
//! The overlap detector has its own, deliberately different title
//! normalization in [`crate::overlap::fields`] (NFKD, bracket stripping) —
//! the two must not be unified. [`extract_year`] and [`normalize_volume`]
//! are shared by both layers.

use std::sync::LazyLock;

use regex::Regex;
use unicode_normalization::UnicodeNormalization;

/// Stop words removed from titles before key construction.
const STOP_WORDS: [&str; 18] = [
    "a", "an", "the", "of", "in", "on", "at", "for", "by", "and", "or", "with", "to", "from",
    "is", "are", "was", "were",
];

static PUNCTUATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s]").expect("punctuation regex"));
static AUTHOR_CLEAN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z\s]").expect("author regex"));
static YEAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(1[89]\d{2}|20\d{2})\b").expect("year regex"));
static DOI_SCHEME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^doi[:\s]\s*").expect("doi scheme regex"));
static DOI_URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^https?://(dx\.)?doi\.org/").expect("doi url regex"));
static VOLUME_PREFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^vol(?:ume)?\.?\s*").expect("volume regex"));

/// Normalizes a title for match-key construction.
///
/// Steps: Unicode NFC, lowercase, punctuation → space (alphanumerics and
/// whitespace survive), stop-word removal, whitespace collapse, truncate to
/// 200 characters, strip. Returns `None` when the result is empty.
#[must_use]
pub fn normalize_title(raw: &str) -> Option<String> {
    if raw.is_empty() {
        return None;
    }
    let text: String = raw.nfc().collect::<String>().to_lowercase();
    let text = PUNCTUATION_RE.replace_all(&text, " ");
    let joined = text
        .split_whitespace()
        .filter(|t| !STOP_WORDS.contains(t))
        .collect::<Vec<_>>()
        .join(" ");
    let truncated: String = joined.chars().take(200).collect();
    let result = truncated.trim();
    if result.is_empty() {
        None
    } else {
        Some(result.to_string())
    }
}

/// Normalizes the first author of a list to a lowercase last name.
///
/// "Last, First" keeps the part before the first comma; "First Last" keeps
/// the final whitespace-delimited token. Compound surnames survive
/// ("van den berg"); everything outside `[a-z ]` is dropped.
#[must_use]
pub fn normalize_first_author(authors: &[String]) -> Option<String> {
    let first = authors.first()?.trim();
    if first.is_empty() {
        return None;
    }
    let last_part = match first.split_once(',') {
        Some((before, _)) => before,
        None => first.split_whitespace().last().unwrap_or(first),
    };
    let lowered = last_part.to_lowercase();
    let cleaned = AUTHOR_CLEAN_RE.replace_all(&lowered, "");
    let collapsed = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed)
    }
}

/// Normalizes a DOI: lowercase, strip a leading `doi:` scheme and a leading
/// `https?://(dx.)?doi.org/` resolver prefix. Returns `None` when empty.
#[must_use]
pub fn normalize_doi(raw: &str) -> Option<String> {
    let lowered = raw.trim().to_lowercase();
    let stripped = DOI_SCHEME_RE.replace(&lowered, "");
    let stripped = DOI_URL_RE.replace(&stripped, "");
    let result = stripped.trim();
    if result.is_empty() {
        None
    } else {
        Some(result.to_string())
    }
}

/// Returns the first 4-digit year in 1800..=2099 found in `value`.
#[must_use]
pub fn extract_year(value: &str) -> Option<i32> {
    YEAR_RE
        .captures(value)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Lowercases a volume designation and strips a leading `vol.` / `volume`.
#[must_use]
pub fn normalize_volume(raw: &str) -> Option<String> {
    let lowered = raw.to_lowercase();
    let stripped = VOLUME_PREFIX_RE.replace(&lowered, "");
    let result = stripped.trim();
    if result.is_empty() {
        None
    } else {
        Some(result.to_string())
    }
}
