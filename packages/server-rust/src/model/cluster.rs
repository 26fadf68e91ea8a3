//! Persisted overlap clusters and their membership rows.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Whether all of a cluster's members come from one source or several.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterScope {
    WithinSource,
    CrossSource,
}

/// Provenance of a cluster: algorithmic, user-created, or algorithmic
/// then user-modified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterOrigin {
    Auto,
    Manual,
    Mixed,
}

/// Role of a member inside its cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberRole {
    Canonical,
    Duplicate,
}

/// Who attached a member to its cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddedBy {
    Auto,
    User,
}

/// A detected (or manually assembled) group of record sources judged to be
/// the same paper.
///
/// Locked clusters survive algorithmic reruns unchanged: the detector
/// neither deletes them nor re-claims their members.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverlapCluster {
    pub id: Uuid,
    pub project_id: Uuid,
    /// Dedup job that produced the cluster; `None` for auto within-source
    /// passes and manual links.
    pub job_id: Option<Uuid>,
    pub scope: ClusterScope,
    /// 1–5 for detected clusters; 0 for manual ones.
    pub match_tier: u8,
    pub match_basis: String,
    pub match_reason: String,
    /// Tier 5 only.
    pub similarity_score: Option<f64>,
    pub origin: ClusterOrigin,
    pub locked: bool,
}

/// Membership row linking a record source to a cluster.
/// `(cluster_id, record_source_id)` is unique.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverlapClusterMember {
    pub id: Uuid,
    pub cluster_id: Uuid,
    pub record_source_id: Uuid,
    pub source_id: Uuid,
    pub role: MemberRole,
    pub added_by: AddedBy,
    /// Free-form user note; only user-added members carry one.
    pub note: Option<String>,
}

/// Snapshot of one record source's current cross-source cluster
/// membership, consumed by the manual-link planner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipInfo {
    pub record_source_id: Uuid,
    /// `None` = unclustered.
    pub cluster_id: Option<Uuid>,
    pub cluster_origin: Option<ClusterOrigin>,
    pub cluster_locked: Option<bool>,
}

impl MembershipInfo {
    /// An unclustered record source.
    #[must_use]
    pub fn unclustered(record_source_id: Uuid) -> Self {
        Self {
            record_source_id,
            cluster_id: None,
            cluster_origin: None,
            cluster_locked: None,
        }
    }
}

/// Per-source totals for the visual summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceTotals {
    pub source_id: Uuid,
    pub name: String,
    /// Record sources claimed by the source.
    pub total: usize,
    /// Members of within-source clusters with role `duplicate`.
    pub internal_overlaps: usize,
}
