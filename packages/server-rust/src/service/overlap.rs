//! Overlap orchestration.
//!
//! Three modes share the core detector:
//!
//! - `run_within_source_detection` — auto-triggered after each successful
//!   import, while the import still holds the project lock. Clears old
//!   within-source clusters for the source (scope-gated: cross-source
//!   clusters that merely touch the source survive) and writes fresh ones.
//! - `run_overlap_detection` — manual full-project pass as a background
//!   task under the advisory lock. Deletes unlocked cross-source clusters,
//!   skips record sources covered by locked clusters, and persists
//!   cross-source clusters only.
//! - `preview` — read-only snapshot, no writes.
//!
//! Manual curation lives here too: linking (planned by the pure
//! [`plan_manual_link`] function), lock/unlock, member removal, and the
//! visual summary.

use std::collections::BTreeMap;
use std::sync::Arc;

use uuid::Uuid;

use refdedup_core::overlap::{
    compute_overlap_matrix, compute_top_intersections, select_representative, DetectedCluster,
    OverlapConfig, OverlapDetector, OverlapRecord,
};

use crate::error::{ServiceError, ServiceResult};
use crate::locks::ProjectLocks;
use crate::model::{
    AddedBy, ClusterOrigin, ClusterScope, DedupStats, MemberRole, MembershipInfo, OverlapCluster,
    OverlapClusterMember, RecordSource,
};
use crate::service::manual_link::{plan_manual_link, ManualLinkPlan};
use crate::storage::PersistenceGateway;

/// Serializable view of one overlap cluster (persisted or previewed).
#[derive(Debug, Clone)]
pub struct OverlapClusterSummary {
    /// `None` for preview clusters that were never persisted.
    pub cluster_id: Option<Uuid>,
    pub scope: ClusterScope,
    pub match_tier: u8,
    pub match_basis: String,
    pub match_reason: String,
    pub similarity_score: Option<f64>,
    pub member_count: usize,
    pub source_ids: Vec<Uuid>,
    pub record_source_ids: Vec<Uuid>,
    pub titles: Vec<Option<String>>,
    pub dois: Vec<Option<String>>,
    pub origin: ClusterOrigin,
    pub locked: bool,
}

/// Full result of an overlap detection preview.
#[derive(Debug, Clone)]
pub struct OverlapSnapshot {
    pub within_source_clusters: Vec<OverlapClusterSummary>,
    pub cross_source_clusters: Vec<OverlapClusterSummary>,
    /// Duplicate records found within sources (members minus canonicals).
    pub within_source_duplicate_count: usize,
    /// Record sources that overlap across sources.
    pub cross_source_overlap_count: usize,
    /// Cross-source clusters, i.e. unique overlapping papers.
    pub unique_overlapping_papers: usize,
}

/// A source as shown in the visual summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRef {
    pub id: Uuid,
    pub name: String,
}

/// One source combination in the top-intersections list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopIntersection {
    pub source_ids: Vec<Uuid>,
    pub source_names: Vec<String>,
    pub count: usize,
}

/// Data behind the overlap summary view.
#[derive(Debug, Clone)]
pub struct VisualSummary {
    pub sources: Vec<SourceRef>,
    /// Symmetric matrix over `sources` order; diagonal always 0.
    pub matrix: Vec<Vec<usize>>,
    /// Per source: records not covered by a within-source duplicate.
    pub unique_counts: BTreeMap<Uuid, usize>,
    pub top_intersections: Vec<TopIntersection>,
}

/// Runs overlap detection and manual curation against the gateway.
#[derive(Clone)]
pub struct OverlapService {
    gateway: Arc<dyn PersistenceGateway>,
    locks: ProjectLocks,
}

impl OverlapService {
    #[must_use]
    pub fn new(gateway: Arc<dyn PersistenceGateway>, locks: ProjectLocks) -> Self {
        Self { gateway, locks }
    }

    // --- Auto within-source pass -----------------------------------------

    /// Re-detects duplicates inside one source. The caller (an import job)
    /// already holds the project lock, so no lock is taken here.
    pub async fn run_within_source_detection(
        &self,
        project_id: Uuid,
        source_id: Uuid,
    ) -> ServiceResult<()> {
        let rows = self.gateway.list_record_sources_by_source(source_id).await?;
        if rows.len() < 2 {
            return Ok(());
        }

        let records = build_overlap_records(&rows);
        let clusters = OverlapDetector::new(OverlapConfig::default()).detect(records);

        self.gateway
            .delete_within_source_clusters(project_id, source_id)
            .await?;

        let mut persisted = 0;
        for cluster in &clusters {
            if distinct_sources(&cluster.records) != 1 {
                // A one-source load cannot produce cross-source clusters.
                continue;
            }
            self.persist_cluster(project_id, None, ClusterScope::WithinSource, cluster, &cluster.records)
                .await?;
            persisted += 1;
        }

        tracing::info!(
            %source_id,
            clusters = persisted,
            "within-source overlap detection complete"
        );
        Ok(())
    }

    // --- Manual full-project pass ----------------------------------------

    /// Background-task entry point for the full-project cross-source pass.
    /// Never returns an error: every failure lands on the job row.
    pub async fn run_overlap_detection(&self, job_id: Uuid, project_id: Uuid, strategy_id: Uuid) {
        let Some(_guard) = self.locks.try_acquire(project_id) else {
            let message = ServiceError::ProjectLocked.user_message();
            if let Err(err) = self.gateway.set_dedup_job_failed(job_id, &message).await {
                tracing::error!(%job_id, error = %err, "failed to mark overlap job as locked-out");
            }
            return;
        };

        if let Err(err) = self.gateway.set_dedup_job_running(job_id).await {
            tracing::error!(%job_id, error = %err, "failed to mark overlap job running");
            return;
        }

        if let Err(err) = self.execute_cross_source(job_id, project_id, strategy_id).await {
            tracing::error!(%job_id, %project_id, error = %err, "overlap job failed");
            let message = err.user_message();
            if let Err(err) = self.gateway.set_dedup_job_failed(job_id, &message).await {
                tracing::error!(%job_id, error = %err, "failed to mark overlap job failed");
            }
        }
    }

    async fn execute_cross_source(
        &self,
        job_id: Uuid,
        project_id: Uuid,
        strategy_id: Uuid,
    ) -> ServiceResult<()> {
        let strategy = self
            .gateway
            .get_strategy(project_id, strategy_id)
            .await?
            .ok_or(ServiceError::StrategyNotFound(strategy_id))?;
        let config = strategy.resolve_overlap_config();

        let records_before = self.gateway.count_records(project_id).await?;
        let rows = self.gateway.list_record_sources_by_project(project_id).await?;
        if rows.is_empty() {
            self.gateway
                .set_dedup_job_completed(
                    job_id,
                    DedupStats {
                        records_before,
                        records_after: records_before,
                        ..DedupStats::default()
                    },
                )
                .await?;
            return Ok(());
        }

        let records = build_overlap_records(&rows);
        let clusters = OverlapDetector::new(config).detect(records);

        // Locked clusters survive; everything else cross-source is rebuilt.
        let clusters_deleted = self
            .gateway
            .delete_unlocked_cross_source_clusters(project_id)
            .await?;
        let locked_member_ids = self
            .gateway
            .locked_cross_source_member_ids(project_id)
            .await?;

        let mut cross_overlaps = 0;
        let mut clusters_created = 0;
        for cluster in &clusters {
            if distinct_sources(&cluster.records) <= 1 {
                // Within-source clusters are managed by the auto pass.
                continue;
            }

            let free_records: Vec<OverlapRecord> = if locked_member_ids.is_empty() {
                cluster.records.clone()
            } else {
                cluster
                    .records
                    .iter()
                    .filter(|r| !locked_member_ids.contains(&r.record_source_id))
                    .cloned()
                    .collect()
            };
            if !locked_member_ids.is_empty()
                && (free_records.len() < 2 || distinct_sources(&free_records) < 2)
            {
                // Not enough uncovered records for a meaningful cluster.
                continue;
            }

            self.persist_cluster(
                project_id,
                Some(job_id),
                ClusterScope::CrossSource,
                cluster,
                &free_records,
            )
            .await?;
            clusters_created += 1;
            cross_overlaps += free_records.len();
        }

        let records_after = self.gateway.count_records(project_id).await?;
        self.gateway
            .set_dedup_job_completed(
                job_id,
                DedupStats {
                    records_before,
                    records_after,
                    merges: cross_overlaps,
                    clusters_created,
                    clusters_deleted,
                },
            )
            .await?;
        self.gateway.set_active_strategy(project_id, strategy_id).await?;

        tracing::info!(
            %job_id,
            %project_id,
            clusters_created,
            clusters_deleted,
            cross_overlaps,
            "cross-source overlap detection complete"
        );
        Ok(())
    }

    // --- Preview ----------------------------------------------------------

    /// Computes an overlap snapshot with no writes. Uses the supplied
    /// config, the active strategy's overlap config, or the default.
    pub async fn preview(
        &self,
        project_id: Uuid,
        config: Option<OverlapConfig>,
    ) -> ServiceResult<OverlapSnapshot> {
        let config = match config {
            Some(config) => config,
            None => self
                .gateway
                .get_active_strategy(project_id)
                .await?
                .map_or_else(OverlapConfig::default, |s| s.resolve_overlap_config()),
        };
        let rows = self.gateway.list_record_sources_by_project(project_id).await?;
        let records = build_overlap_records(&rows);
        let clusters = OverlapDetector::new(config).detect(records);

        let mut within = Vec::new();
        let mut cross = Vec::new();
        for cluster in &clusters {
            let scope = if distinct_sources(&cluster.records) == 1 {
                ClusterScope::WithinSource
            } else {
                ClusterScope::CrossSource
            };
            let summary = preview_summary(scope, cluster);
            match scope {
                ClusterScope::WithinSource => within.push(summary),
                ClusterScope::CrossSource => cross.push(summary),
            }
        }

        let within_source_duplicate_count =
            within.iter().map(|c| c.member_count - 1).sum();
        let cross_source_overlap_count = cross.iter().map(|c| c.member_count).sum();
        let unique_overlapping_papers = cross.len();

        Ok(OverlapSnapshot {
            within_source_clusters: within,
            cross_source_clusters: cross,
            within_source_duplicate_count,
            cross_source_overlap_count,
            unique_overlapping_papers,
        })
    }

    // --- Manual curation ---------------------------------------------------

    /// Links a set of record sources into one cross-source cluster.
    pub async fn manual_link(
        &self,
        project_id: Uuid,
        record_source_ids: &[Uuid],
        locked: bool,
        note: Option<String>,
    ) -> ServiceResult<OverlapClusterSummary> {
        if record_source_ids.len() < 2 {
            return Err(ServiceError::InvalidManualLink(
                "at least two records are required to create a link".to_string(),
            ));
        }

        let known = self.gateway.cross_source_memberships(record_source_ids).await?;
        let memberships: Vec<MembershipInfo> = record_source_ids
            .iter()
            .map(|&rs_id| {
                known
                    .iter()
                    .find(|m| m.record_source_id == rs_id)
                    .cloned()
                    .unwrap_or_else(|| MembershipInfo::unclustered(rs_id))
            })
            .collect();

        match plan_manual_link(&memberships, locked) {
            ManualLinkPlan::Noop { cluster_id } => {
                let cluster = self
                    .gateway
                    .get_cluster(project_id, cluster_id)
                    .await?
                    .ok_or(ServiceError::ClusterNotFound(cluster_id))?;
                self.cluster_summary(&cluster).await
            }
            ManualLinkPlan::Merge {
                keep_cluster_id,
                delete_cluster_id,
                origin,
                locked,
            } => {
                self.gateway
                    .move_cluster_members(delete_cluster_id, keep_cluster_id)
                    .await?;
                self.gateway.delete_cluster(delete_cluster_id).await?;
                self.gateway
                    .update_cluster_flags(keep_cluster_id, origin, locked)
                    .await?;
                let cluster = self
                    .gateway
                    .get_cluster(project_id, keep_cluster_id)
                    .await?
                    .ok_or(ServiceError::ClusterNotFound(keep_cluster_id))?;
                self.cluster_summary(&cluster).await
            }
            ManualLinkPlan::AddToExisting {
                cluster_id,
                new_member_ids,
                origin,
                locked,
            } => {
                for rs_id in new_member_ids {
                    let Some(rs) = self.gateway.get_record_source(rs_id).await? else {
                        continue;
                    };
                    self.gateway
                        .add_cluster_member(OverlapClusterMember {
                            id: Uuid::new_v4(),
                            cluster_id,
                            record_source_id: rs_id,
                            source_id: rs.source_id,
                            role: MemberRole::Duplicate,
                            added_by: AddedBy::User,
                            note: note.clone(),
                        })
                        .await?;
                }
                self.gateway
                    .update_cluster_flags(cluster_id, origin, locked)
                    .await?;
                let cluster = self
                    .gateway
                    .get_cluster(project_id, cluster_id)
                    .await?
                    .ok_or(ServiceError::ClusterNotFound(cluster_id))?;
                self.cluster_summary(&cluster).await
            }
            ManualLinkPlan::CreateNew {
                member_ids,
                origin,
                locked,
            } => {
                let cluster = OverlapCluster {
                    id: Uuid::new_v4(),
                    project_id,
                    job_id: None,
                    scope: ClusterScope::CrossSource,
                    match_tier: 0,
                    match_basis: "manual".to_string(),
                    match_reason: "Manually linked by user".to_string(),
                    similarity_score: None,
                    origin,
                    locked,
                };
                let mut members = Vec::new();
                for rs_id in member_ids {
                    let Some(rs) = self.gateway.get_record_source(rs_id).await? else {
                        continue;
                    };
                    members.push(OverlapClusterMember {
                        id: Uuid::new_v4(),
                        cluster_id: cluster.id,
                        record_source_id: rs_id,
                        source_id: rs.source_id,
                        role: MemberRole::Duplicate,
                        added_by: AddedBy::User,
                        note: note.clone(),
                    });
                }
                self.gateway.insert_cluster(cluster.clone(), members).await?;
                self.cluster_summary(&cluster).await
            }
        }
    }

    /// Sets or clears the locked flag; no other effect.
    pub async fn lock_cluster(
        &self,
        project_id: Uuid,
        cluster_id: Uuid,
        locked: bool,
    ) -> ServiceResult<OverlapClusterSummary> {
        let mut cluster = self
            .gateway
            .get_cluster(project_id, cluster_id)
            .await?
            .ok_or(ServiceError::ClusterNotFound(cluster_id))?;
        self.gateway.set_cluster_locked(cluster_id, locked).await?;
        cluster.locked = locked;
        self.cluster_summary(&cluster).await
    }

    /// Removes a user-added member from a cluster. Algorithmic members
    /// cannot be removed this way.
    pub async fn remove_member(
        &self,
        project_id: Uuid,
        cluster_id: Uuid,
        record_source_id: Uuid,
    ) -> ServiceResult<()> {
        let _cluster = self
            .gateway
            .get_cluster(project_id, cluster_id)
            .await?
            .ok_or(ServiceError::ClusterNotFound(cluster_id))?;

        let member = self
            .gateway
            .list_cluster_members(cluster_id)
            .await?
            .into_iter()
            .find(|m| m.record_source_id == record_source_id)
            .ok_or(ServiceError::MemberNotFound {
                cluster_id,
                record_source_id,
            })?;
        if member.added_by != AddedBy::User {
            return Err(ServiceError::MemberNotRemovable);
        }
        self.gateway
            .remove_cluster_member(cluster_id, record_source_id)
            .await?;
        Ok(())
    }

    // --- Visual summary ----------------------------------------------------

    /// Per-source totals, the symmetric cross-source matrix, and the top
    /// source combinations, derived from persisted clusters.
    pub async fn visual_summary(&self, project_id: Uuid) -> ServiceResult<VisualSummary> {
        let totals = self.gateway.source_totals(project_id).await?;
        let sources: Vec<SourceRef> = totals
            .iter()
            .map(|t| SourceRef {
                id: t.source_id,
                name: t.name.clone(),
            })
            .collect();
        let source_ids: Vec<Uuid> = sources.iter().map(|s| s.id).collect();
        let unique_counts: BTreeMap<Uuid, usize> = totals
            .iter()
            .map(|t| (t.source_id, t.total.saturating_sub(t.internal_overlaps)))
            .collect();
        let name_of: BTreeMap<Uuid, String> = sources
            .iter()
            .map(|s| (s.id, s.name.clone()))
            .collect();

        let sets = self
            .gateway
            .cross_source_cluster_source_sets(project_id)
            .await?;
        let matrix = compute_overlap_matrix(&source_ids, &sets);
        let top_intersections = compute_top_intersections(&sets, 10)
            .into_iter()
            .map(|combo| TopIntersection {
                source_names: combo
                    .source_ids
                    .iter()
                    .map(|id| name_of.get(id).cloned().unwrap_or_else(|| id.to_string()))
                    .collect(),
                source_ids: combo.source_ids,
                count: combo.count,
            })
            .collect();

        Ok(VisualSummary {
            sources,
            matrix,
            unique_counts,
            top_intersections,
        })
    }

    // --- Helpers -----------------------------------------------------------

    async fn persist_cluster(
        &self,
        project_id: Uuid,
        job_id: Option<Uuid>,
        scope: ClusterScope,
        cluster: &DetectedCluster,
        records: &[OverlapRecord],
    ) -> ServiceResult<OverlapCluster> {
        let representative = select_representative(records);
        let row = OverlapCluster {
            id: Uuid::new_v4(),
            project_id,
            job_id,
            scope,
            match_tier: cluster.tier,
            match_basis: cluster.match_basis.as_str().to_string(),
            match_reason: cluster.match_reason.clone(),
            similarity_score: cluster.similarity_score,
            origin: ClusterOrigin::Auto,
            locked: false,
        };
        let members: Vec<OverlapClusterMember> = records
            .iter()
            .map(|r| OverlapClusterMember {
                id: Uuid::new_v4(),
                cluster_id: row.id,
                record_source_id: r.record_source_id,
                source_id: r.source_id,
                role: if r.record_source_id == representative.record_source_id {
                    MemberRole::Canonical
                } else {
                    MemberRole::Duplicate
                },
                added_by: AddedBy::Auto,
                note: None,
            })
            .collect();
        self.gateway.insert_cluster(row.clone(), members).await?;
        Ok(row)
    }

    async fn cluster_summary(
        &self,
        cluster: &OverlapCluster,
    ) -> ServiceResult<OverlapClusterSummary> {
        let members = self.gateway.list_cluster_members(cluster.id).await?;
        let mut source_ids: Vec<Uuid> = members.iter().map(|m| m.source_id).collect();
        source_ids.sort();
        source_ids.dedup();
        Ok(OverlapClusterSummary {
            cluster_id: Some(cluster.id),
            scope: cluster.scope,
            match_tier: cluster.match_tier,
            match_basis: cluster.match_basis.clone(),
            match_reason: cluster.match_reason.clone(),
            similarity_score: cluster.similarity_score,
            member_count: members.len(),
            source_ids,
            record_source_ids: members.iter().map(|m| m.record_source_id).collect(),
            titles: Vec::new(),
            dois: Vec::new(),
            origin: cluster.origin,
            locked: cluster.locked,
        })
    }
}

/// Normalized overlap views of record-source rows.
fn build_overlap_records(rows: &[RecordSource]) -> Vec<OverlapRecord> {
    rows.iter()
        .map(|rs| {
            OverlapRecord::build(
                rs.id,
                rs.source_id,
                rs.norm_title.as_deref(),
                rs.match_doi.as_deref(),
                rs.match_year,
                &rs.raw_data,
            )
        })
        .collect()
}

fn distinct_sources(records: &[OverlapRecord]) -> usize {
    let mut ids: Vec<Uuid> = records.iter().map(|r| r.source_id).collect();
    ids.sort();
    ids.dedup();
    ids.len()
}

fn preview_summary(scope: ClusterScope, cluster: &DetectedCluster) -> OverlapClusterSummary {
    let mut source_ids: Vec<Uuid> = cluster.records.iter().map(|r| r.source_id).collect();
    source_ids.sort();
    source_ids.dedup();
    OverlapClusterSummary {
        cluster_id: None,
        scope,
        match_tier: cluster.tier,
        match_basis: cluster.match_basis.as_str().to_string(),
        match_reason: cluster.match_reason.clone(),
        similarity_score: cluster.similarity_score,
        member_count: cluster.records.len(),
        source_ids,
        record_source_ids: cluster.records.iter().map(|r| r.record_source_id).collect(),
        titles: cluster
            .records
            .iter()
            .map(|r| (!r.norm_title.is_empty()).then(|| r.norm_title.clone()))
            .collect(),
        dois: cluster.records.iter().map(|r| r.doi.clone()).collect(),
        origin: ClusterOrigin::Auto,
        locked: false,
    }
}
