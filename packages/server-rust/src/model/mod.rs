//! Domain entities and their lifecycle enums.
//!
//! These are the shapes the persistence gateway stores and the
//! orchestrators manipulate. Ids are UUIDv4; the lexicographic order of
//! their hyphenated string form (equivalently, byte order) is the
//! deterministic tie-break order used throughout the clustering code.

pub mod cluster;
pub mod job;
pub mod record;
pub mod strategy;

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use cluster::{
    AddedBy, ClusterOrigin, ClusterScope, MemberRole, MembershipInfo, OverlapCluster,
    OverlapClusterMember, SourceTotals,
};
pub use job::{DedupJob, DedupJobStatus, DedupStats, ImportJob, ImportJobStatus};
pub use record::{Record, RecordSource};
pub use strategy::{MatchAction, MatchLogEntry, MatchStrategy};

/// Milliseconds since the Unix epoch, used for created/completed stamps.
#[must_use]
pub fn now_millis() -> u64 {
    #[allow(clippy::cast_possible_truncation)]
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before Unix epoch")
        .as_millis() as u64;
    millis
}

/// Account that owns projects. Immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub created_at_ms: u64,
}

/// Top-level container; every other entity is project-scoped. Deleting a
/// project cascades to its sources, jobs, records, and clusters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub created_at_ms: u64,
}

/// A named bibliographic database within a project (e.g. "PubMed").
/// `(project_id, name)` is unique; every record source is attributed to
/// exactly one source at ingest time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub id: Uuid,
    pub project_id: Uuid,
    pub name: String,
}
