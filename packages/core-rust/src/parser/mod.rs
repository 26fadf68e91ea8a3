//! Format-tolerant bibliographic parsing.
//!
//! [`parse_bytes`] is the single entry point for the import pipeline: it
//! detects the file format from content and dispatches to the matching
//! tolerant parser. It never fails — per-record problems are collected in
//! [`ParseResult::errors`] and file-level problems in
//! [`ParseResult::warnings`]; the caller decides whether a result with
//! `valid_count == 0` fails the job.

pub mod detect;
pub mod medline;
pub mod ris;
pub mod types;

pub use detect::{detect_format, read_text};
pub use types::{ParseResult, ParsedRecord, RecordError, SourceFormat};

/// User-facing guidance when a CSV upload is rejected.
const CSV_REJECTED: &str = "CSV format is not supported. Please export your search results as \
                            RIS (.ris) or MEDLINE (.txt) format.";

/// User-facing guidance when no format could be determined.
const FORMAT_UNRECOGNIZED: &str =
    "Unsupported format. Expected RIS (TY -) or PubMed tagged (PMID-/TI-/AU-).";

/// Detects the format of `bytes` and parses them into a [`ParseResult`].
#[must_use]
pub fn parse_bytes(bytes: &[u8]) -> ParseResult {
    match detect_format(bytes) {
        SourceFormat::Ris => ris::parse(bytes),
        SourceFormat::Medline => medline::parse(bytes),
        SourceFormat::Csv => ParseResult {
            records: Vec::new(),
            errors: Vec::new(),
            format_detected: SourceFormat::Csv,
            total_attempted: 0,
            valid_count: 0,
            failed_count: 1,
            warnings: vec![CSV_REJECTED.to_string()],
        },
        SourceFormat::Unknown => ParseResult {
            records: Vec::new(),
            errors: Vec::new(),
            format_detected: SourceFormat::Unknown,
            total_attempted: 0,
            valid_count: 0,
            failed_count: 1,
            warnings: vec![FORMAT_UNRECOGNIZED.to_string()],
        },
    }
}
