//! Shared parser types.
//!
//! [`ParseResult`] is the single return type of every parser and of the
//! dispatcher. It carries both successfully parsed records and per-record
//! errors, so a single corrupt entry never aborts an import job.

use std::collections::BTreeMap;

use serde_json::{json, Value};
use unicode_normalization::UnicodeNormalization;

/// Detected format of an uploaded file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceFormat {
    Ris,
    Medline,
    Csv,
    Unknown,
}

impl SourceFormat {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ris => "ris",
            Self::Medline => "medline",
            Self::Csv => "csv",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A per-record parse failure. Not fatal: other records are still processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordError {
    /// 0-based position of the record block in the file.
    pub index: usize,
    /// Human-readable description of why the record failed.
    pub reason: String,
    /// First 200 characters of the raw block, for debugging.
    pub raw_snippet: String,
}

impl RecordError {
    pub(crate) fn new(index: usize, reason: impl Into<String>, block: &str) -> Self {
        Self {
            index,
            reason: reason.into(),
            raw_snippet: block.chars().take(200).collect(),
        }
    }
}

/// A bibliographic record in the uniform shape every parser emits.
///
/// `raw_data` preserves the original tag bundle verbatim (under `"tags"`)
/// along with the mapped field values and the `"source_record_id"` key,
/// which is always present (possibly null).
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRecord {
    pub title: Option<String>,
    pub abstract_text: Option<String>,
    pub authors: Vec<String>,
    pub year: Option<i32>,
    pub journal: Option<String>,
    pub volume: Option<String>,
    pub issue: Option<String>,
    pub pages: Option<String>,
    pub doi: Option<String>,
    pub issn: Option<String>,
    pub keywords: Vec<String>,
    pub source_format: SourceFormat,
    pub raw_data: Value,
}

impl ParsedRecord {
    /// Assembles the `raw_data` bundle from the mapped fields, the verbatim
    /// tag map, and the source-specific identifier.
    pub(crate) fn finish(
        mut self,
        tags: BTreeMap<String, Vec<String>>,
        source_record_id: Option<String>,
        pmid: Option<String>,
    ) -> Self {
        let mut raw = json!({
            "title": self.title,
            "abstract": self.abstract_text,
            "authors": self.authors,
            "year": self.year,
            "journal": self.journal,
            "volume": self.volume,
            "issue": self.issue,
            "pages": self.pages,
            "doi": self.doi,
            "issn": self.issn,
            "keywords": self.keywords,
            "source_format": self.source_format,
            "source_record_id": source_record_id,
            "tags": tags,
        });
        if let Some(pmid) = pmid {
            raw["pmid"] = Value::String(pmid);
        }
        self.raw_data = raw;
        self
    }

    /// The stable source-specific identifier (PMID, EID, accession number).
    #[must_use]
    pub fn source_record_id(&self) -> Option<&str> {
        self.raw_data
            .get("source_record_id")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    /// A record is worth keeping only if it has a title, a DOI, or a
    /// source-specific identifier.
    #[must_use]
    pub fn is_useful(&self) -> bool {
        self.title.is_some() || self.doi.is_some() || self.source_record_id().is_some()
    }
}

impl Default for ParsedRecord {
    fn default() -> Self {
        Self {
            title: None,
            abstract_text: None,
            authors: Vec::new(),
            year: None,
            journal: None,
            volume: None,
            issue: None,
            pages: None,
            doi: None,
            issn: None,
            keywords: Vec::new(),
            source_format: SourceFormat::Unknown,
            raw_data: Value::Null,
        }
    }
}

/// Unified result from any parser.
#[derive(Debug, Clone)]
pub struct ParseResult {
    pub records: Vec<ParsedRecord>,
    pub errors: Vec<RecordError>,
    pub format_detected: SourceFormat,
    /// Number of record blocks the parser attempted.
    pub total_attempted: usize,
    pub valid_count: usize,
    pub failed_count: usize,
    /// File-level issues (unsupported format, rejected CSV, …).
    pub warnings: Vec<String>,
}

impl ParseResult {
    #[must_use]
    pub fn has_warnings(&self) -> bool {
        !self.errors.is_empty() || !self.warnings.is_empty()
    }

    /// Short human-readable summary of failures, written to the import
    /// job on completed-with-warnings or failure.
    #[must_use]
    pub fn error_summary(&self) -> String {
        let mut parts: Vec<String> = Vec::new();

        if self.valid_count == 0 {
            parts.push(format!(
                "No valid records found in '{}' file.",
                self.format_detected
            ));
        } else if self.format_detected == SourceFormat::Unknown {
            parts.push(format!("{} record(s) imported.", self.valid_count));
        } else {
            parts.push(format!(
                "{} record(s) imported from {} format.",
                self.valid_count,
                self.format_detected.as_str().to_uppercase()
            ));
        }

        if self.failed_count > 0 {
            let mut lines = vec![format!("{} record(s) skipped:", self.failed_count)];
            for e in self.errors.iter().take(10) {
                lines.push(format!("  [{}] {}", e.index, e.reason));
            }
            if self.errors.len() > 10 {
                lines.push(format!("  … and {} more", self.errors.len() - 10));
            }
            parts.push(lines.join("\n"));
        }

        if !self.warnings.is_empty() {
            parts.push(format!("Warnings: {}", self.warnings.join("; ")));
        }

        parts.join("\n")
    }
}

/// NFC-normalizes, collapses whitespace, strips. `None` for blank input.
pub(crate) fn clean_text(value: &str) -> Option<String> {
    if value.is_empty() {
        return None;
    }
    let normalized: String = value.nfc().collect();
    let collapsed = normalized.split_whitespace().collect::<Vec<_>>().join(" ");
    (!collapsed.is_empty()).then_some(collapsed)
}
