//! RIS format parser.
//!
//! Tolerant of the spacing variants real exports produce: Scopus writes
//! `TY-JOUR` with no spaces, CINAHL pads inconsistently, and some vendors
//! append text after the `ER` terminator. Every line that looks like a tag
//! is first rewritten to the canonical `XX  - value` shape so one strict
//! tokenizer handles all of them.
//!
//! Tag reference used for mapping:
//!   TI / T1 / T2 — title        AU / A1 — author (one tag per author)
//!   AB / N2      — abstract     PY / Y1 — publication year
//!   JO / JF / T2 / SO / J2 — journal    VL / IS — volume / issue
//!   SP / EP      — pages        DO — DOI       SN — ISSN
//!   KW           — keyword      AN / PMID / PM — accession number
//!
//! `raw_data` always carries the key `source_record_id` (string or null),
//! populated from the accession number when present.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::normalize::extract_year;
use crate::parser::detect::read_text;
use crate::parser::types::{clean_text, ParseResult, ParsedRecord, RecordError, SourceFormat};

/// Any tag-shaped line, with whatever spacing the vendor chose.
static LOOSE_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Z0-9]{2,4})[ \t]*-[ \t]*(.*)$").expect("loose tag"));

/// The canonical tag shape produced by [`normalize_tag_spacing`].
static STRICT_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Z0-9]{2,4})  - (.*)$").expect("strict tag"));

/// Record terminator, tolerating 0/1/2+ spaces and trailing text.
static END_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ER[ \t]*-").expect("end tag"));

static TYPE_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^TY[ \t]*-").expect("type tag"));

/// Parses raw RIS file bytes into a [`ParseResult`]. Never fails; corrupt
/// blocks become [`RecordError`]s.
#[must_use]
pub fn parse(bytes: &[u8]) -> ParseResult {
    parse_text(&read_text(bytes))
}

/// Parses already-decoded RIS text. Used by [`parse`] and by the format
/// detector's last-resort attempt.
#[must_use]
pub(crate) fn parse_text(text: &str) -> ParseResult {
    let respaced = normalize_tag_spacing(text);
    let blocks = split_records(&respaced);

    let mut records = Vec::new();
    let mut errors = Vec::new();
    let total_attempted = blocks.len();

    for (index, block) in blocks.iter().enumerate() {
        match tokenize_block(block) {
            Some(tags) => {
                let record = map_record(tags);
                if record.is_useful() {
                    records.push(record);
                }
            }
            None => errors.push(RecordError::new(
                index,
                "No RIS tags found in record block",
                block,
            )),
        }
    }

    let valid_count = records.len();
    let failed_count = errors.len();
    ParseResult {
        records,
        errors,
        format_detected: SourceFormat::Ris,
        total_attempted,
        valid_count,
        failed_count,
        warnings: Vec::new(),
    }
}

/// Rewrites every tag-shaped line to exactly two spaces before the dash so
/// the strict tokenizer can consume Scopus/CINAHL spacing variants.
fn normalize_tag_spacing(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for line in text.lines() {
        match LOOSE_TAG_RE.captures(line) {
            Some(caps) => {
                out.push_str(&caps[1]);
                out.push_str("  - ");
                out.push_str(&caps[2]);
            }
            None => out.push_str(line),
        }
        out.push('\n');
    }
    out
}

/// Splits respaced text into record blocks.
///
/// Primary delimiter is the `ER` line. When a file carries no terminator at
/// all but clearly holds multiple records (two or more `TY` lines), blank
/// lines separate records instead.
fn split_records(text: &str) -> Vec<String> {
    let has_end_tags = text.lines().any(|l| END_TAG_RE.is_match(l));

    if has_end_tags {
        let mut blocks = Vec::new();
        let mut current = String::new();
        for line in text.lines() {
            if END_TAG_RE.is_match(line) {
                if !current.trim().is_empty() {
                    blocks.push(std::mem::take(&mut current));
                } else {
                    current.clear();
                }
            } else {
                current.push_str(line);
                current.push('\n');
            }
        }
        // A trailing unterminated record still counts.
        if !current.trim().is_empty() {
            blocks.push(current);
        }
        return blocks;
    }

    if TYPE_TAG_RE.find_iter(text).count() >= 2 {
        return text
            .split("\n\n")
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .map(str::to_string)
            .collect();
    }

    if text.trim().is_empty() {
        Vec::new()
    } else {
        vec![text.to_string()]
    }
}

/// Tokenizes one block into tag → values. Non-tag, non-blank lines continue
/// the previous value. Returns `None` when the block has no tags at all.
fn tokenize_block(block: &str) -> Option<BTreeMap<String, Vec<String>>> {
    let mut tags: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut current: Option<(String, String)> = None;

    for line in block.lines() {
        if let Some(caps) = STRICT_TAG_RE.captures(line) {
            if let Some((tag, value)) = current.take() {
                tags.entry(tag).or_default().push(value);
            }
            current = Some((caps[1].to_string(), caps[2].trim().to_string()));
        } else if let Some((_, value)) = &mut current {
            let continuation = line.trim();
            if !continuation.is_empty() {
                if !value.is_empty() {
                    value.push(' ');
                }
                value.push_str(continuation);
            }
        }
    }
    if let Some((tag, value)) = current.take() {
        tags.entry(tag).or_default().push(value);
    }

    (!tags.is_empty()).then_some(tags)
}

fn map_record(tags: BTreeMap<String, Vec<String>>) -> ParsedRecord {
    let first = |tag: &str| -> Option<String> {
        tags.get(tag)
            .and_then(|values| values.first())
            .and_then(|v| clean_text(v))
    };
    let list = |tag: &str| -> Vec<String> {
        tags.get(tag)
            .map(|values| values.iter().filter_map(|v| clean_text(v)).collect())
            .unwrap_or_default()
    };

    let title = first("TI").or_else(|| first("T1")).or_else(|| first("T2"));
    let authors = {
        let au = list("AU");
        if au.is_empty() {
            list("A1")
        } else {
            au
        }
    };
    let abstract_text = first("AB").or_else(|| first("N2"));
    let year = first("PY")
        .or_else(|| first("Y1"))
        .as_deref()
        .and_then(extract_year);
    let journal = first("JO")
        .or_else(|| first("JF"))
        .or_else(|| first("T2"))
        .or_else(|| first("SO"))
        .or_else(|| first("J2"));
    let doi = first("DO").map(|d| d.to_lowercase());
    let pages = match (first("SP"), first("EP")) {
        (Some(start), Some(end)) => Some(format!("{start}-{end}")),
        (start, end) => start.or(end),
    };
    let source_record_id = first("AN").or_else(|| first("PMID")).or_else(|| first("PM"));

    ParsedRecord {
        title,
        abstract_text,
        authors,
        year,
        journal,
        volume: first("VL"),
        issue: first("IS"),
        pages,
        doi,
        issn: first("SN"),
        keywords: list("KW"),
        source_format: SourceFormat::Ris,
        raw_data: serde_json::Value::Null,
    }
    .finish(tags, source_record_id, None)
}
