//! File decoding and format detection.
//!
//! Detection works on content, never on the filename: some exports arrive
//! as `.txt` regardless of format. The probe is the first 4 KiB of decoded
//! text; only the last-resort step parses the whole file.

use std::sync::LazyLock;

use regex::Regex;

use crate::parser::types::SourceFormat;
use crate::parser::{medline, ris};

/// Maximum bytes examined for pattern-based detection.
const PROBE_BYTES: usize = 4096;

const UTF8_BOM: &[u8] = b"\xef\xbb\xbf";

/// RIS record-type tag; 0, 1, or 2+ spaces before the dash are all valid
/// (Scopus exports use zero).
static RIS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^TY[ \t]*-").expect("ris regex"));

/// RIS record terminator, used to keep the last-resort RIS attempt honest:
/// tag-shaped lines alone (which MEDLINE also has) do not make a RIS file.
static RIS_END_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^ER[ \t]*-").expect("ris end regex"));

/// PubMed MEDLINE files open with a PMID line.
static MEDLINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^PMID-[ \t]*\d").expect("medline regex"));

/// Secondary MEDLINE heuristic: several standard tags, for files that carry
/// a preamble before the first PMID.
static MEDLINE_TAGS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^(?:AU|TI|AB|DP|MH|FAU|PT)[ \t]+-").expect("medline tags regex")
});

/// Decodes file bytes: strip a UTF-8 BOM, try strict UTF-8, fall back to
/// Latin-1 (total — every byte maps), then normalize CRLF and bare CR to LF.
#[must_use]
pub fn read_text(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    let decoded = match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => bytes.iter().map(|&b| char::from(b)).collect(),
    };
    normalize_newlines(&decoded)
}

fn normalize_newlines(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

/// Lossy decode of the probe window. A 4 KiB cut can split a UTF-8
/// sequence, so the probe tolerates replacement characters.
fn decode_probe(bytes: &[u8]) -> String {
    let probe = &bytes[..bytes.len().min(PROBE_BYTES)];
    let probe = probe.strip_prefix(UTF8_BOM).unwrap_or(probe);
    normalize_newlines(&String::from_utf8_lossy(probe))
}

/// Inspects file content and returns the detected format.
///
/// Order matters, first match wins:
/// 1. a `TY -` line → RIS
/// 2. a `PMID-` line → MEDLINE
/// 3. three or more standard MEDLINE tag lines → MEDLINE
/// 4. first non-blank line with ≥ 3 commas → CSV (rejected downstream)
/// 5. last resort: a full tolerant RIS parse, then a full MEDLINE parse
#[must_use]
pub fn detect_format(bytes: &[u8]) -> SourceFormat {
    if bytes.is_empty() {
        return SourceFormat::Unknown;
    }

    let probe = decode_probe(bytes);

    if RIS_RE.is_match(&probe) {
        return SourceFormat::Ris;
    }
    if MEDLINE_RE.is_match(&probe) {
        return SourceFormat::Medline;
    }
    if MEDLINE_TAGS_RE.find_iter(&probe).count() >= 3 {
        return SourceFormat::Medline;
    }

    if let Some(first_line) = probe.lines().map(str::trim).find(|l| !l.is_empty()) {
        if first_line.matches(',').count() >= 3 {
            return SourceFormat::Csv;
        }
    }

    // Last resort: attempt full parses over the entire content.
    let full = read_text(bytes);
    if (RIS_RE.is_match(&full) || RIS_END_RE.is_match(&full))
        && ris::parse_text(&full).valid_count > 0
    {
        return SourceFormat::Ris;
    }
    if medline::parse_text(&full).valid_count >= 1 {
        return SourceFormat::Medline;
    }
    SourceFormat::Unknown
}
