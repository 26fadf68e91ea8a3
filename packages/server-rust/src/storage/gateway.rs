//! Abstract persistence gateway.
//!
//! The only seam between the orchestrators and storage. Implementations
//! guarantee atomicity per operation; the dedup orchestrator's
//! multi-operation atomicity is provided by a single enclosing transaction
//! owned by the SQL implementation (out of scope here — the in-memory
//! gateway used by tests is atomic per call).
//!
//! Batched writes must respect driver parameter budgets: chunk with
//! [`batch_chunk_size`] so `rows × columns` never exceeds
//! [`MAX_BIND_PARAMS`].

use std::collections::HashSet;

use async_trait::async_trait;
use uuid::Uuid;

use crate::model::{
    ClusterScope, DedupJob, DedupStats, ImportJob, ImportJobStatus, MatchLogEntry, MatchStrategy,
    MembershipInfo, OverlapCluster, OverlapClusterMember, Project, Record, RecordSource, Source,
    SourceTotals,
};

/// Conservative bind-parameter budget for one SQL statement.
pub const MAX_BIND_PARAMS: usize = 32_000;

/// Columns written per canonical-record row.
pub const RECORD_COLUMNS: usize = 16;

/// Columns written per record-source row.
pub const RECORD_SOURCE_COLUMNS: usize = 10;

/// Rows per batch such that `rows × columns_per_row ≤ MAX_BIND_PARAMS`.
#[must_use]
pub fn batch_chunk_size(columns_per_row: usize) -> usize {
    (MAX_BIND_PARAMS / columns_per_row.max(1)).max(1)
}

/// Abstract CRUD the core requires of the storage layer.
///
/// Shared behind `Arc<dyn PersistenceGateway>`; every method is atomic.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    // --- Projects & sources ---

    async fn insert_project(&self, project: Project) -> anyhow::Result<()>;

    /// Cascades to sources, jobs, records, record sources, and clusters.
    async fn delete_project(&self, project_id: Uuid) -> anyhow::Result<()>;

    /// Idempotent on `(project_id, name)`: returns the existing source when
    /// the name is already taken.
    async fn get_or_create_source(&self, project_id: Uuid, name: &str)
        -> anyhow::Result<Source>;

    async fn get_source(&self, source_id: Uuid) -> anyhow::Result<Option<Source>>;

    async fn list_sources(&self, project_id: Uuid) -> anyhow::Result<Vec<Source>>;

    // --- Canonical records ---

    /// Batched upsert with `(project_id, match_key)` conflict-ignore.
    /// Returns the canonical id per input row — the existing row's id on
    /// conflict, the inserted row's id otherwise. Null-keyed rows always
    /// insert.
    async fn upsert_records_by_match_key(
        &self,
        records: Vec<Record>,
    ) -> anyhow::Result<Vec<Uuid>>;

    async fn insert_record(&self, record: Record) -> anyhow::Result<Uuid>;

    async fn find_record_by_match_key(
        &self,
        project_id: Uuid,
        match_key: &str,
    ) -> anyhow::Result<Option<Uuid>>;

    async fn get_record(&self, record_id: Uuid) -> anyhow::Result<Option<Record>>;

    async fn count_records(&self, project_id: Uuid) -> anyhow::Result<usize>;

    async fn list_records(&self, project_id: Uuid) -> anyhow::Result<Vec<Record>>;

    /// Deletes canonical records no longer referenced by any record
    /// source. Returns how many were removed.
    async fn delete_orphan_records(&self, project_id: Uuid) -> anyhow::Result<usize>;

    // --- Record sources ---

    /// Batched insert with `(record_id, source_id)` conflict-ignore.
    /// Returns how many rows were actually inserted.
    async fn insert_record_sources(&self, rows: Vec<RecordSource>) -> anyhow::Result<usize>;

    async fn list_record_sources_by_project(
        &self,
        project_id: Uuid,
    ) -> anyhow::Result<Vec<RecordSource>>;

    async fn list_record_sources_by_source(
        &self,
        source_id: Uuid,
    ) -> anyhow::Result<Vec<RecordSource>>;

    async fn get_record_source(&self, id: Uuid) -> anyhow::Result<Option<RecordSource>>;

    /// Bulk re-point of the mutable FK column.
    async fn repoint_record_sources(
        &self,
        ids: &[Uuid],
        new_record_id: Uuid,
    ) -> anyhow::Result<()>;

    // --- Import jobs ---

    async fn insert_import_job(&self, job: ImportJob) -> anyhow::Result<()>;

    async fn get_import_job(&self, job_id: Uuid) -> anyhow::Result<Option<ImportJob>>;

    async fn set_import_job_processing(&self, job_id: Uuid) -> anyhow::Result<()>;

    async fn set_import_job_finished(
        &self,
        job_id: Uuid,
        status: ImportJobStatus,
        record_count: usize,
        error_msg: Option<String>,
    ) -> anyhow::Result<()>;

    // --- Dedup jobs ---

    async fn insert_dedup_job(&self, job: DedupJob) -> anyhow::Result<()>;

    async fn get_dedup_job(&self, job_id: Uuid) -> anyhow::Result<Option<DedupJob>>;

    async fn set_dedup_job_running(&self, job_id: Uuid) -> anyhow::Result<()>;

    async fn set_dedup_job_completed(
        &self,
        job_id: Uuid,
        stats: DedupStats,
    ) -> anyhow::Result<()>;

    async fn set_dedup_job_failed(&self, job_id: Uuid, error_msg: &str) -> anyhow::Result<()>;

    // --- Strategies ---

    async fn insert_strategy(&self, strategy: MatchStrategy) -> anyhow::Result<()>;

    async fn get_strategy(
        &self,
        project_id: Uuid,
        strategy_id: Uuid,
    ) -> anyhow::Result<Option<MatchStrategy>>;

    async fn list_strategies(&self, project_id: Uuid) -> anyhow::Result<Vec<MatchStrategy>>;

    async fn get_active_strategy(
        &self,
        project_id: Uuid,
    ) -> anyhow::Result<Option<MatchStrategy>>;

    /// Atomically marks one strategy active and deactivates all others in
    /// the project.
    async fn set_active_strategy(
        &self,
        project_id: Uuid,
        strategy_id: Uuid,
    ) -> anyhow::Result<()>;

    // --- Match log ---

    /// Append-only; entries reference record ids that exist at write time,
    /// so this must run before orphan deletion.
    async fn append_match_log(&self, entries: Vec<MatchLogEntry>) -> anyhow::Result<()>;

    async fn list_match_log(&self, dedup_job_id: Uuid) -> anyhow::Result<Vec<MatchLogEntry>>;

    // --- Overlap clusters ---

    /// Inserts a cluster with all its members.
    async fn insert_cluster(
        &self,
        cluster: OverlapCluster,
        members: Vec<OverlapClusterMember>,
    ) -> anyhow::Result<()>;

    async fn get_cluster(
        &self,
        project_id: Uuid,
        cluster_id: Uuid,
    ) -> anyhow::Result<Option<OverlapCluster>>;

    async fn list_clusters(
        &self,
        project_id: Uuid,
        scope: Option<ClusterScope>,
    ) -> anyhow::Result<Vec<OverlapCluster>>;

    async fn list_cluster_members(
        &self,
        cluster_id: Uuid,
    ) -> anyhow::Result<Vec<OverlapClusterMember>>;

    /// Cascades to the cluster's members.
    async fn delete_cluster(&self, cluster_id: Uuid) -> anyhow::Result<()>;

    /// Deletes within-source clusters that have a member from the given
    /// source. The scope filter matters: a cross-source cluster that
    /// merely touches the source must survive.
    async fn delete_within_source_clusters(
        &self,
        project_id: Uuid,
        source_id: Uuid,
    ) -> anyhow::Result<usize>;

    /// Deletes cross-source clusters that are not locked.
    async fn delete_unlocked_cross_source_clusters(
        &self,
        project_id: Uuid,
    ) -> anyhow::Result<usize>;

    /// Record-source ids covered by locked cross-source clusters.
    async fn locked_cross_source_member_ids(
        &self,
        project_id: Uuid,
    ) -> anyhow::Result<HashSet<Uuid>>;

    /// Current cross-source membership per requested record source;
    /// unclustered ids are simply absent from the result.
    async fn cross_source_memberships(
        &self,
        record_source_ids: &[Uuid],
    ) -> anyhow::Result<Vec<MembershipInfo>>;

    async fn add_cluster_member(&self, member: OverlapClusterMember) -> anyhow::Result<()>;

    async fn remove_cluster_member(
        &self,
        cluster_id: Uuid,
        record_source_id: Uuid,
    ) -> anyhow::Result<()>;

    /// Moves members of `from_cluster` into `to_cluster`, skipping record
    /// sources already present there. Moved members are re-attributed to
    /// the algorithm and lose any user note.
    async fn move_cluster_members(
        &self,
        from_cluster: Uuid,
        to_cluster: Uuid,
    ) -> anyhow::Result<()>;

    async fn update_cluster_flags(
        &self,
        cluster_id: Uuid,
        origin: crate::model::ClusterOrigin,
        locked: bool,
    ) -> anyhow::Result<()>;

    async fn set_cluster_locked(&self, cluster_id: Uuid, locked: bool) -> anyhow::Result<()>;

    // --- Summary support ---

    /// Per-source totals with internal-overlap counts, ordered by name.
    async fn source_totals(&self, project_id: Uuid) -> anyhow::Result<Vec<SourceTotals>>;

    /// Distinct source-id sets of each cross-source cluster.
    async fn cross_source_cluster_source_sets(
        &self,
        project_id: Uuid,
    ) -> anyhow::Result<Vec<Vec<Uuid>>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_size_respects_parameter_budget() {
        let chunk = batch_chunk_size(RECORD_SOURCE_COLUMNS);
        assert!(chunk * RECORD_SOURCE_COLUMNS <= MAX_BIND_PARAMS);
        assert!(chunk >= 1);
    }

    #[test]
    fn a_55_record_file_fits_one_batch() {
        assert!(batch_chunk_size(RECORD_COLUMNS) >= 55);
        assert!(batch_chunk_size(RECORD_SOURCE_COLUMNS) >= 55);
    }

    #[test]
    fn degenerate_column_counts_still_chunk() {
        assert_eq!(batch_chunk_size(0), MAX_BIND_PARAMS);
        assert_eq!(batch_chunk_size(MAX_BIND_PARAMS * 2), 1);
    }
}
