//! Canonical records and per-source record claims.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use refdedup_core::SourceFormat;

/// One row per unique paper per project, after deduplication.
///
/// `match_key` is the cluster's identity: re-clustering finds pre-existing
/// canonical rows through it instead of minting new ones. Within a project
/// it is unique when non-null; null-keyed records are permanently isolated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub id: Uuid,
    pub project_id: Uuid,
    pub match_key: Option<String>,
    /// Which fields generated the key ("doi", "title_year", …).
    pub match_basis: String,
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
}

/// An immutable per-source assertion that "source S claims this paper
/// exists".
///
/// `raw_data` is never mutated after insert — it preserves the originally
/// parsed field bundle forever. The `record_id` foreign key is the only
/// mutable attribute: dedup may re-point it at a different canonical
/// record. `(record_id, source_id)` is unique, which is what makes
/// re-importing the same paper from the same source idempotent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordSource {
    pub id: Uuid,
    /// Current canonical record. The only mutable field.
    pub record_id: Uuid,
    pub source_id: Uuid,
    pub project_id: Uuid,
    pub import_job_id: Option<Uuid>,
    /// Originally parsed field bundle; immutable.
    pub raw_data: Value,
    // Precomputed normalized match fields.
    pub norm_title: Option<String>,
    pub norm_first_author: Option<String>,
    pub match_year: Option<i32>,
    pub match_doi: Option<String>,
}

impl RecordSource {
    /// PMID or general source-specific identifier from the raw bundle.
    #[must_use]
    pub fn pmid(&self) -> Option<String> {
        let get = |key: &str| {
            self.raw_data
                .get(key)
                .and_then(Value::as_str)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        };
        get("pmid").or_else(|| get("source_record_id"))
    }

    /// Raw author strings from the raw bundle, if stored as a list.
    #[must_use]
    pub fn raw_authors(&self) -> Option<Vec<String>> {
        self.raw_data.get("authors").and_then(Value::as_array).map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
    }
}
