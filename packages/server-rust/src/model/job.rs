//! Import and dedup job rows with their lifecycle enums.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of a one-shot file import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportJobStatus {
    Pending,
    Processing,
    Completed,
    CompletedWithWarnings,
    Failed,
}

/// One-shot lifecycle of parsing a single uploaded file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportJob {
    pub id: Uuid,
    pub project_id: Uuid,
    pub source_id: Uuid,
    pub filename: String,
    /// Format declared by the uploader; detection may disagree.
    pub declared_format: String,
    pub status: ImportJobStatus,
    pub record_count: usize,
    /// Human-readable error/warning summary.
    pub error_msg: Option<String>,
    pub created_at_ms: u64,
    pub completed_at_ms: Option<u64>,
}

impl ImportJob {
    #[must_use]
    pub fn new(project_id: Uuid, source_id: Uuid, filename: String, declared_format: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            project_id,
            source_id,
            filename,
            declared_format,
            status: ImportJobStatus::Pending,
            record_count: 0,
            error_msg: None,
            created_at_ms: super::now_millis(),
            completed_at_ms: None,
        }
    }
}

/// Lifecycle of one clustering run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupJobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// Final metrics of a completed dedup (or overlap) run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DedupStats {
    pub records_before: usize,
    pub records_after: usize,
    pub merges: usize,
    pub clusters_created: usize,
    pub clusters_deleted: usize,
}

/// One run of the clustering engine under a chosen strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupJob {
    pub id: Uuid,
    pub project_id: Uuid,
    pub strategy_id: Uuid,
    pub status: DedupJobStatus,
    pub stats: DedupStats,
    pub error_msg: Option<String>,
    pub created_at_ms: u64,
    pub completed_at_ms: Option<u64>,
}

impl DedupJob {
    #[must_use]
    pub fn new(project_id: Uuid, strategy_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            project_id,
            strategy_id,
            status: DedupJobStatus::Pending,
            stats: DedupStats::default(),
            error_msg: None,
            created_at_ms: super::now_millis(),
            completed_at_ms: None,
        }
    }
}
