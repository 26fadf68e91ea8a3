//! MEDLINE/PubMed-tagged format parser.
//!
//! Handles `.txt` exports from PubMed (Send to → Citation manager) and Ovid
//! MEDLINE exports that use the same tag structure:
//!
//! - records separated by one or more blank lines
//! - field lines `XX  - value`, where the value may also follow the dash
//!   immediately (`PMID-12345`)
//! - continuation lines: PubMed indents them six spaces, but some vendors
//!   wrap without the indent, so any non-blank non-tag line continues the
//!   current value
//! - multi-value tags (AU, FAU, MH, OT): one tag per value
//!
//! Tag reference (PubMed subset): PMID, TI, AU/FAU, AB, DP, JT/TA, VI, IP,
//! PG, LID/AID (DOI carries a `[doi]` suffix), IS, MH, OT.
//!
//! Output is the same normalized shape as the RIS parser.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::normalize::{extract_year, normalize_doi};
use crate::parser::detect::read_text;
use crate::parser::types::{clean_text, ParseResult, ParsedRecord, SourceFormat};

static TAG_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Z]{2,4})\s*-\s*(.*)$").expect("tag line regex"));
static DOI_SUFFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s*\[doi\]\s*$").expect("doi suffix regex"));
static ISSN_LABEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\([^)]*\)\s*$").expect("issn label regex"));
static BLANK_LINES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{2,}").expect("blank lines regex"));

/// Parses a MEDLINE/PubMed-tagged file. Each record block is parsed
/// independently; blocks with no recognizable fields are skipped.
#[must_use]
pub fn parse(bytes: &[u8]) -> ParseResult {
    parse_text(&read_text(bytes))
}

/// Parses already-decoded MEDLINE text. Used by [`parse`] and by the
/// format detector's last-resort attempt.
#[must_use]
pub(crate) fn parse_text(text: &str) -> ParseResult {
    let blocks: Vec<&str> = BLANK_LINES_RE
        .split(text.trim())
        .map(str::trim)
        .filter(|b| !b.is_empty())
        .collect();

    let mut records = Vec::new();
    for block in &blocks {
        if let Some(record) = parse_block(block) {
            if record.is_useful() {
                records.push(record);
            }
        }
    }

    let valid_count = records.len();
    ParseResult {
        records,
        errors: Vec::new(),
        format_detected: SourceFormat::Medline,
        total_attempted: blocks.len(),
        valid_count,
        failed_count: 0,
        warnings: Vec::new(),
    }
}

/// Parses one record block into tag → values, handling continuations and
/// repeated tags.
fn parse_fields(block: &str) -> BTreeMap<String, Vec<String>> {
    let mut fields: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut current: Option<(String, String)> = None;

    for line in block.lines() {
        if let Some(caps) = TAG_LINE_RE.captures(line) {
            if let Some((tag, value)) = current.take() {
                fields.entry(tag).or_default().push(value);
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
        fields.entry(tag).or_default().push(value);
    }
    fields
}

/// Converts one block into a normalized record, or `None` for blocks with
/// no recognizable fields (preamble, comments).
fn parse_block(block: &str) -> Option<ParsedRecord> {
    let fields = parse_fields(block);
    if fields.is_empty() {
        return None;
    }

    let first = |tag: &str| -> Option<String> {
        fields
            .get(tag)
            .and_then(|values| values.first())
            .and_then(|v| clean_text(v))
    };
    let list = |tag: &str| -> Vec<String> {
        fields
            .get(tag)
            .map(|values| values.iter().filter_map(|v| clean_text(v)).collect())
            .unwrap_or_default()
    };

    let pmid = first("PMID");

    let authors = {
        let full = list("FAU");
        if full.is_empty() {
            list("AU")
        } else {
            full
        }
    };
    let year = first("DP").as_deref().and_then(extract_year);
    let journal = first("JT").or_else(|| first("TA"));

    let mut id_values = fields.get("LID").cloned().unwrap_or_default();
    id_values.extend(fields.get("AID").cloned().unwrap_or_default());
    let doi = extract_doi(&id_values);

    let issn = fields
        .get("IS")
        .into_iter()
        .flatten()
        .find_map(|entry| clean_text(&ISSN_LABEL_RE.replace(entry, "")));

    let mut keywords = list("MH");
    keywords.extend(list("OT"));

    Some(
        ParsedRecord {
            title: first("TI"),
            abstract_text: first("AB"),
            authors,
            year,
            journal,
            volume: first("VI"),
            issue: first("IP"),
            pages: first("PG"),
            doi,
            issn,
            keywords,
            source_format: SourceFormat::Medline,
            raw_data: serde_json::Value::Null,
        }
        .finish(fields, pmid.clone(), pmid),
    )
}

/// From LID/AID values, returns the one tagged `[doi]`, normalized.
fn extract_doi(entries: &[String]) -> Option<String> {
    entries
        .iter()
        .find(|entry| entry.to_lowercase().contains("[doi]"))
        .and_then(|entry| {
            let stripped = DOI_SUFFIX_RE.replace(entry, "");
            normalize_doi(stripped.trim())
        })
}
