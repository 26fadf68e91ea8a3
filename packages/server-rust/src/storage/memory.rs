//! In-memory [`PersistenceGateway`] backed by [`DashMap`] tables.
//!
//! Used by every orchestrator test and for development. Each operation is
//! atomic with respect to the table it touches; secondary indexes (match
//! key → record, `(record, source)` pairs) are maintained alongside the
//! primary tables so the conflict-ignore semantics match what a SQL
//! implementation gets from its unique constraints.

use std::collections::HashSet;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::model::{
    AddedBy, ClusterScope, DedupJob, DedupJobStatus, DedupStats, ImportJob, ImportJobStatus,
    MatchLogEntry, MatchStrategy, MembershipInfo, OverlapCluster, OverlapClusterMember, Project,
    Record, RecordSource, Source, SourceTotals,
};
use crate::model::now_millis;
use crate::storage::gateway::PersistenceGateway;

/// All tables of the in-memory store.
#[derive(Debug, Default)]
pub struct MemoryGateway {
    projects: DashMap<Uuid, Project>,
    sources: DashMap<Uuid, Source>,
    records: DashMap<Uuid, Record>,
    /// `(project_id, match_key)` → record id; mirrors the partial unique
    /// index on non-null match keys.
    records_by_key: DashMap<(Uuid, String), Uuid>,
    record_sources: DashMap<Uuid, RecordSource>,
    /// `(record_id, source_id)` → record-source id; mirrors the unique
    /// pair constraint used for idempotent re-imports.
    record_source_pairs: DashMap<(Uuid, Uuid), Uuid>,
    import_jobs: DashMap<Uuid, ImportJob>,
    dedup_jobs: DashMap<Uuid, DedupJob>,
    strategies: DashMap<Uuid, MatchStrategy>,
    clusters: DashMap<Uuid, OverlapCluster>,
    cluster_members: DashMap<Uuid, OverlapClusterMember>,
    match_log: Mutex<Vec<MatchLogEntry>>,
}

impl MemoryGateway {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn members_of(&self, cluster_id: Uuid) -> Vec<OverlapClusterMember> {
        let mut members: Vec<OverlapClusterMember> = self
            .cluster_members
            .iter()
            .filter(|m| m.cluster_id == cluster_id)
            .map(|m| m.clone())
            .collect();
        members.sort_by(|a, b| a.record_source_id.cmp(&b.record_source_id));
        members
    }

    fn remove_cluster_cascade(&self, cluster_id: Uuid) {
        self.clusters.remove(&cluster_id);
        let member_ids: Vec<Uuid> = self
            .cluster_members
            .iter()
            .filter(|m| m.cluster_id == cluster_id)
            .map(|m| m.id)
            .collect();
        for id in member_ids {
            self.cluster_members.remove(&id);
        }
    }

    fn insert_record_row(&self, record: Record) -> Uuid {
        let id = record.id;
        if let Some(key) = record.match_key.clone() {
            let slot = (record.project_id, key);
            if let Some(existing) = self.records_by_key.get(&slot) {
                return *existing;
            }
            self.records_by_key.insert(slot, id);
        }
        self.records.insert(id, record);
        id
    }
}

#[async_trait]
impl PersistenceGateway for MemoryGateway {
    async fn insert_project(&self, project: Project) -> anyhow::Result<()> {
        self.projects.insert(project.id, project);
        Ok(())
    }

    async fn delete_project(&self, project_id: Uuid) -> anyhow::Result<()> {
        self.projects.remove(&project_id);

        let source_ids: Vec<Uuid> = self
            .sources
            .iter()
            .filter(|s| s.project_id == project_id)
            .map(|s| s.id)
            .collect();
        for id in source_ids {
            self.sources.remove(&id);
        }

        let rs_ids: Vec<Uuid> = self
            .record_sources
            .iter()
            .filter(|rs| rs.project_id == project_id)
            .map(|rs| rs.id)
            .collect();
        for id in rs_ids {
            if let Some((_, rs)) = self.record_sources.remove(&id) {
                self.record_source_pairs.remove(&(rs.record_id, rs.source_id));
            }
        }

        let record_ids: Vec<Uuid> = self
            .records
            .iter()
            .filter(|r| r.project_id == project_id)
            .map(|r| r.id)
            .collect();
        for id in record_ids {
            if let Some((_, record)) = self.records.remove(&id) {
                if let Some(key) = record.match_key {
                    self.records_by_key.remove(&(project_id, key));
                }
            }
        }

        let job_ids: Vec<Uuid> = self
            .import_jobs
            .iter()
            .filter(|j| j.project_id == project_id)
            .map(|j| j.id)
            .collect();
        for id in job_ids {
            self.import_jobs.remove(&id);
        }

        let dedup_ids: Vec<Uuid> = self
            .dedup_jobs
            .iter()
            .filter(|j| j.project_id == project_id)
            .map(|j| j.id)
            .collect();
        self.match_log
            .lock()
            .retain(|entry| !dedup_ids.contains(&entry.dedup_job_id));
        for id in dedup_ids {
            self.dedup_jobs.remove(&id);
        }

        let strategy_ids: Vec<Uuid> = self
            .strategies
            .iter()
            .filter(|s| s.project_id == project_id)
            .map(|s| s.id)
            .collect();
        for id in strategy_ids {
            self.strategies.remove(&id);
        }

        let cluster_ids: Vec<Uuid> = self
            .clusters
            .iter()
            .filter(|c| c.project_id == project_id)
            .map(|c| c.id)
            .collect();
        for id in cluster_ids {
            self.remove_cluster_cascade(id);
        }
        Ok(())
    }

    async fn get_or_create_source(
        &self,
        project_id: Uuid,
        name: &str,
    ) -> anyhow::Result<Source> {
        if let Some(existing) = self
            .sources
            .iter()
            .find(|s| s.project_id == project_id && s.name == name)
        {
            return Ok(existing.clone());
        }
        let source = Source {
            id: Uuid::new_v4(),
            project_id,
            name: name.to_string(),
        };
        self.sources.insert(source.id, source.clone());
        Ok(source)
    }

    async fn get_source(&self, source_id: Uuid) -> anyhow::Result<Option<Source>> {
        Ok(self.sources.get(&source_id).map(|s| s.clone()))
    }

    async fn list_sources(&self, project_id: Uuid) -> anyhow::Result<Vec<Source>> {
        let mut sources: Vec<Source> = self
            .sources
            .iter()
            .filter(|s| s.project_id == project_id)
            .map(|s| s.clone())
            .collect();
        sources.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(sources)
    }

    async fn upsert_records_by_match_key(
        &self,
        records: Vec<Record>,
    ) -> anyhow::Result<Vec<Uuid>> {
        Ok(records
            .into_iter()
            .map(|record| self.insert_record_row(record))
            .collect())
    }

    async fn insert_record(&self, record: Record) -> anyhow::Result<Uuid> {
        Ok(self.insert_record_row(record))
    }

    async fn find_record_by_match_key(
        &self,
        project_id: Uuid,
        match_key: &str,
    ) -> anyhow::Result<Option<Uuid>> {
        Ok(self
            .records_by_key
            .get(&(project_id, match_key.to_string()))
            .map(|id| *id))
    }

    async fn get_record(&self, record_id: Uuid) -> anyhow::Result<Option<Record>> {
        Ok(self.records.get(&record_id).map(|r| r.clone()))
    }

    async fn count_records(&self, project_id: Uuid) -> anyhow::Result<usize> {
        Ok(self
            .records
            .iter()
            .filter(|r| r.project_id == project_id)
            .count())
    }

    async fn list_records(&self, project_id: Uuid) -> anyhow::Result<Vec<Record>> {
        let mut records: Vec<Record> = self
            .records
            .iter()
            .filter(|r| r.project_id == project_id)
            .map(|r| r.clone())
            .collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(records)
    }

    async fn delete_orphan_records(&self, project_id: Uuid) -> anyhow::Result<usize> {
        let referenced: HashSet<Uuid> = self
            .record_sources
            .iter()
            .map(|rs| rs.record_id)
            .collect();
        let orphan_ids: Vec<Uuid> = self
            .records
            .iter()
            .filter(|r| r.project_id == project_id && !referenced.contains(&r.id))
            .map(|r| r.id)
            .collect();
        for id in &orphan_ids {
            if let Some((_, record)) = self.records.remove(id) {
                if let Some(key) = record.match_key {
                    self.records_by_key.remove(&(project_id, key));
                }
            }
        }
        Ok(orphan_ids.len())
    }

    async fn insert_record_sources(&self, rows: Vec<RecordSource>) -> anyhow::Result<usize> {
        let mut inserted = 0;
        for rs in rows {
            let pair = (rs.record_id, rs.source_id);
            match self.record_source_pairs.entry(pair) {
                dashmap::mapref::entry::Entry::Occupied(_) => {}
                dashmap::mapref::entry::Entry::Vacant(slot) => {
                    slot.insert(rs.id);
                    self.record_sources.insert(rs.id, rs);
                    inserted += 1;
                }
            }
        }
        Ok(inserted)
    }

    async fn list_record_sources_by_project(
        &self,
        project_id: Uuid,
    ) -> anyhow::Result<Vec<RecordSource>> {
        let mut rows: Vec<RecordSource> = self
            .record_sources
            .iter()
            .filter(|rs| rs.project_id == project_id)
            .map(|rs| rs.clone())
            .collect();
        rows.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(rows)
    }

    async fn list_record_sources_by_source(
        &self,
        source_id: Uuid,
    ) -> anyhow::Result<Vec<RecordSource>> {
        let mut rows: Vec<RecordSource> = self
            .record_sources
            .iter()
            .filter(|rs| rs.source_id == source_id)
            .map(|rs| rs.clone())
            .collect();
        rows.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(rows)
    }

    async fn get_record_source(&self, id: Uuid) -> anyhow::Result<Option<RecordSource>> {
        Ok(self.record_sources.get(&id).map(|rs| rs.clone()))
    }

    async fn repoint_record_sources(
        &self,
        ids: &[Uuid],
        new_record_id: Uuid,
    ) -> anyhow::Result<()> {
        for id in ids {
            if let Some(mut rs) = self.record_sources.get_mut(id) {
                let old_pair = (rs.record_id, rs.source_id);
                if self
                    .record_source_pairs
                    .get(&old_pair)
                    .is_some_and(|owner| *owner == rs.id)
                {
                    self.record_source_pairs.remove(&old_pair);
                }
                rs.record_id = new_record_id;
                let new_pair = (new_record_id, rs.source_id);
                self.record_source_pairs.entry(new_pair).or_insert(rs.id);
            }
        }
        Ok(())
    }

    async fn insert_import_job(&self, job: ImportJob) -> anyhow::Result<()> {
        self.import_jobs.insert(job.id, job);
        Ok(())
    }

    async fn get_import_job(&self, job_id: Uuid) -> anyhow::Result<Option<ImportJob>> {
        Ok(self.import_jobs.get(&job_id).map(|j| j.clone()))
    }

    async fn set_import_job_processing(&self, job_id: Uuid) -> anyhow::Result<()> {
        if let Some(mut job) = self.import_jobs.get_mut(&job_id) {
            job.status = ImportJobStatus::Processing;
        }
        Ok(())
    }

    async fn set_import_job_finished(
        &self,
        job_id: Uuid,
        status: ImportJobStatus,
        record_count: usize,
        error_msg: Option<String>,
    ) -> anyhow::Result<()> {
        if let Some(mut job) = self.import_jobs.get_mut(&job_id) {
            job.status = status;
            job.record_count = record_count;
            job.error_msg = error_msg;
            job.completed_at_ms = Some(now_millis());
        }
        Ok(())
    }

    async fn insert_dedup_job(&self, job: DedupJob) -> anyhow::Result<()> {
        self.dedup_jobs.insert(job.id, job);
        Ok(())
    }

    async fn get_dedup_job(&self, job_id: Uuid) -> anyhow::Result<Option<DedupJob>> {
        Ok(self.dedup_jobs.get(&job_id).map(|j| j.clone()))
    }

    async fn set_dedup_job_running(&self, job_id: Uuid) -> anyhow::Result<()> {
        if let Some(mut job) = self.dedup_jobs.get_mut(&job_id) {
            job.status = DedupJobStatus::Running;
        }
        Ok(())
    }

    async fn set_dedup_job_completed(
        &self,
        job_id: Uuid,
        stats: DedupStats,
    ) -> anyhow::Result<()> {
        if let Some(mut job) = self.dedup_jobs.get_mut(&job_id) {
            job.status = DedupJobStatus::Completed;
            job.stats = stats;
            job.completed_at_ms = Some(now_millis());
        }
        Ok(())
    }

    async fn set_dedup_job_failed(&self, job_id: Uuid, error_msg: &str) -> anyhow::Result<()> {
        if let Some(mut job) = self.dedup_jobs.get_mut(&job_id) {
            job.status = DedupJobStatus::Failed;
            job.error_msg = Some(error_msg.to_string());
            job.completed_at_ms = Some(now_millis());
        }
        Ok(())
    }

    async fn insert_strategy(&self, strategy: MatchStrategy) -> anyhow::Result<()> {
        self.strategies.insert(strategy.id, strategy);
        Ok(())
    }

    async fn get_strategy(
        &self,
        project_id: Uuid,
        strategy_id: Uuid,
    ) -> anyhow::Result<Option<MatchStrategy>> {
        Ok(self
            .strategies
            .get(&strategy_id)
            .filter(|s| s.project_id == project_id)
            .map(|s| s.clone()))
    }

    async fn list_strategies(&self, project_id: Uuid) -> anyhow::Result<Vec<MatchStrategy>> {
        let mut strategies: Vec<MatchStrategy> = self
            .strategies
            .iter()
            .filter(|s| s.project_id == project_id)
            .map(|s| s.clone())
            .collect();
        strategies.sort_by_key(|s| s.created_at_ms);
        Ok(strategies)
    }

    async fn get_active_strategy(
        &self,
        project_id: Uuid,
    ) -> anyhow::Result<Option<MatchStrategy>> {
        Ok(self
            .strategies
            .iter()
            .find(|s| s.project_id == project_id && s.is_active)
            .map(|s| s.clone()))
    }

    async fn set_active_strategy(
        &self,
        project_id: Uuid,
        strategy_id: Uuid,
    ) -> anyhow::Result<()> {
        for mut s in self.strategies.iter_mut() {
            if s.project_id == project_id {
                s.is_active = s.id == strategy_id;
            }
        }
        Ok(())
    }

    async fn append_match_log(&self, entries: Vec<MatchLogEntry>) -> anyhow::Result<()> {
        self.match_log.lock().extend(entries);
        Ok(())
    }

    async fn list_match_log(&self, dedup_job_id: Uuid) -> anyhow::Result<Vec<MatchLogEntry>> {
        Ok(self
            .match_log
            .lock()
            .iter()
            .filter(|e| e.dedup_job_id == dedup_job_id)
            .cloned()
            .collect())
    }

    async fn insert_cluster(
        &self,
        cluster: OverlapCluster,
        members: Vec<OverlapClusterMember>,
    ) -> anyhow::Result<()> {
        self.clusters.insert(cluster.id, cluster);
        for member in members {
            self.cluster_members.insert(member.id, member);
        }
        Ok(())
    }

    async fn get_cluster(
        &self,
        project_id: Uuid,
        cluster_id: Uuid,
    ) -> anyhow::Result<Option<OverlapCluster>> {
        Ok(self
            .clusters
            .get(&cluster_id)
            .filter(|c| c.project_id == project_id)
            .map(|c| c.clone()))
    }

    async fn list_clusters(
        &self,
        project_id: Uuid,
        scope: Option<ClusterScope>,
    ) -> anyhow::Result<Vec<OverlapCluster>> {
        let mut clusters: Vec<OverlapCluster> = self
            .clusters
            .iter()
            .filter(|c| c.project_id == project_id && scope.map_or(true, |s| c.scope == s))
            .map(|c| c.clone())
            .collect();
        clusters.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(clusters)
    }

    async fn list_cluster_members(
        &self,
        cluster_id: Uuid,
    ) -> anyhow::Result<Vec<OverlapClusterMember>> {
        Ok(self.members_of(cluster_id))
    }

    async fn delete_cluster(&self, cluster_id: Uuid) -> anyhow::Result<()> {
        self.remove_cluster_cascade(cluster_id);
        Ok(())
    }

    async fn delete_within_source_clusters(
        &self,
        project_id: Uuid,
        source_id: Uuid,
    ) -> anyhow::Result<usize> {
        let targets: Vec<Uuid> = self
            .clusters
            .iter()
            .filter(|c| c.project_id == project_id && c.scope == ClusterScope::WithinSource)
            .filter(|c| {
                self.cluster_members
                    .iter()
                    .any(|m| m.cluster_id == c.id && m.source_id == source_id)
            })
            .map(|c| c.id)
            .collect();
        for id in &targets {
            self.remove_cluster_cascade(*id);
        }
        Ok(targets.len())
    }

    async fn delete_unlocked_cross_source_clusters(
        &self,
        project_id: Uuid,
    ) -> anyhow::Result<usize> {
        let targets: Vec<Uuid> = self
            .clusters
            .iter()
            .filter(|c| {
                c.project_id == project_id
                    && c.scope == ClusterScope::CrossSource
                    && !c.locked
            })
            .map(|c| c.id)
            .collect();
        for id in &targets {
            self.remove_cluster_cascade(*id);
        }
        Ok(targets.len())
    }

    async fn locked_cross_source_member_ids(
        &self,
        project_id: Uuid,
    ) -> anyhow::Result<HashSet<Uuid>> {
        let locked_clusters: HashSet<Uuid> = self
            .clusters
            .iter()
            .filter(|c| {
                c.project_id == project_id
                    && c.scope == ClusterScope::CrossSource
                    && c.locked
            })
            .map(|c| c.id)
            .collect();
        Ok(self
            .cluster_members
            .iter()
            .filter(|m| locked_clusters.contains(&m.cluster_id))
            .map(|m| m.record_source_id)
            .collect())
    }

    async fn cross_source_memberships(
        &self,
        record_source_ids: &[Uuid],
    ) -> anyhow::Result<Vec<MembershipInfo>> {
        let requested: HashSet<Uuid> = record_source_ids.iter().copied().collect();
        let mut memberships = Vec::new();
        for member in self.cluster_members.iter() {
            if !requested.contains(&member.record_source_id) {
                continue;
            }
            let Some(cluster) = self.clusters.get(&member.cluster_id) else {
                continue;
            };
            if cluster.scope != ClusterScope::CrossSource {
                continue;
            }
            memberships.push(MembershipInfo {
                record_source_id: member.record_source_id,
                cluster_id: Some(cluster.id),
                cluster_origin: Some(cluster.origin),
                cluster_locked: Some(cluster.locked),
            });
        }
        Ok(memberships)
    }

    async fn add_cluster_member(&self, member: OverlapClusterMember) -> anyhow::Result<()> {
        let exists = self
            .cluster_members
            .iter()
            .any(|m| m.cluster_id == member.cluster_id && m.record_source_id == member.record_source_id);
        if !exists {
            self.cluster_members.insert(member.id, member);
        }
        Ok(())
    }

    async fn remove_cluster_member(
        &self,
        cluster_id: Uuid,
        record_source_id: Uuid,
    ) -> anyhow::Result<()> {
        let target: Option<Uuid> = self
            .cluster_members
            .iter()
            .find(|m| m.cluster_id == cluster_id && m.record_source_id == record_source_id)
            .map(|m| m.id);
        if let Some(id) = target {
            self.cluster_members.remove(&id);
        }
        Ok(())
    }

    async fn move_cluster_members(
        &self,
        from_cluster: Uuid,
        to_cluster: Uuid,
    ) -> anyhow::Result<()> {
        let existing: HashSet<Uuid> = self
            .members_of(to_cluster)
            .into_iter()
            .map(|m| m.record_source_id)
            .collect();
        for member in self.members_of(from_cluster) {
            if existing.contains(&member.record_source_id) {
                continue;
            }
            if let Some(mut row) = self.cluster_members.get_mut(&member.id) {
                row.cluster_id = to_cluster;
                row.added_by = AddedBy::Auto;
                row.note = None;
            }
        }
        Ok(())
    }

    async fn update_cluster_flags(
        &self,
        cluster_id: Uuid,
        origin: crate::model::ClusterOrigin,
        locked: bool,
    ) -> anyhow::Result<()> {
        if let Some(mut cluster) = self.clusters.get_mut(&cluster_id) {
            cluster.origin = origin;
            cluster.locked = locked;
        }
        Ok(())
    }

    async fn set_cluster_locked(&self, cluster_id: Uuid, locked: bool) -> anyhow::Result<()> {
        if let Some(mut cluster) = self.clusters.get_mut(&cluster_id) {
            cluster.locked = locked;
        }
        Ok(())
    }

    async fn source_totals(&self, project_id: Uuid) -> anyhow::Result<Vec<SourceTotals>> {
        let within_clusters: HashSet<Uuid> = self
            .clusters
            .iter()
            .filter(|c| c.project_id == project_id && c.scope == ClusterScope::WithinSource)
            .map(|c| c.id)
            .collect();

        let mut totals = Vec::new();
        for source in self.list_sources(project_id).await? {
            let total = self
                .record_sources
                .iter()
                .filter(|rs| rs.source_id == source.id)
                .count();
            let internal_overlaps = self
                .cluster_members
                .iter()
                .filter(|m| {
                    within_clusters.contains(&m.cluster_id)
                        && m.source_id == source.id
                        && m.role == crate::model::MemberRole::Duplicate
                })
                .count();
            totals.push(SourceTotals {
                source_id: source.id,
                name: source.name,
                total,
                internal_overlaps,
            });
        }
        Ok(totals)
    }

    async fn cross_source_cluster_source_sets(
        &self,
        project_id: Uuid,
    ) -> anyhow::Result<Vec<Vec<Uuid>>> {
        let mut sets = Vec::new();
        for cluster in self.list_clusters(project_id, Some(ClusterScope::CrossSource)).await? {
            let sources: std::collections::BTreeSet<Uuid> = self
                .members_of(cluster.id)
                .into_iter()
                .map(|m| m.source_id)
                .collect();
            sets.push(sources.into_iter().collect());
        }
        Ok(sets)
    }
}

#[cfg(test)]
mod tests {
    use refdedup_core::SourceFormat;
    use serde_json::json;

    use super::*;
    use crate::model::{ClusterOrigin, MemberRole};

    fn record(project: Uuid, key: Option<&str>) -> Record {
        Record {
            id: Uuid::new_v4(),
            project_id: project,
            match_key: key.map(str::to_string),
            match_basis: "doi".to_string(),
            title: Some("t".to_string()),
            abstract_text: None,
            authors: Vec::new(),
            year: Some(2020),
            journal: None,
            volume: None,
            issue: None,
            pages: None,
            doi: None,
            issn: None,
            keywords: Vec::new(),
            source_format: SourceFormat::Ris,
        }
    }

    fn record_source(project: Uuid, record_id: Uuid, source_id: Uuid) -> RecordSource {
        RecordSource {
            id: Uuid::new_v4(),
            record_id,
            source_id,
            project_id: project,
            import_job_id: None,
            raw_data: json!({}),
            norm_title: None,
            norm_first_author: None,
            match_year: None,
            match_doi: None,
        }
    }

    fn cluster(project: Uuid, scope: ClusterScope, locked: bool) -> OverlapCluster {
        OverlapCluster {
            id: Uuid::new_v4(),
            project_id: project,
            job_id: None,
            scope,
            match_tier: 1,
            match_basis: "doi".to_string(),
            match_reason: "test".to_string(),
            similarity_score: None,
            origin: ClusterOrigin::Auto,
            locked,
        }
    }

    fn member(cluster_id: Uuid, rs: Uuid, source: Uuid) -> OverlapClusterMember {
        OverlapClusterMember {
            id: Uuid::new_v4(),
            cluster_id,
            record_source_id: rs,
            source_id: source,
            role: MemberRole::Duplicate,
            added_by: AddedBy::Auto,
            note: None,
        }
    }

    #[tokio::test]
    async fn upsert_reuses_existing_row_for_same_key() {
        let gw = MemoryGateway::new();
        let project = Uuid::new_v4();
        let ids = gw
            .upsert_records_by_match_key(vec![
                record(project, Some("doi:10.1/x")),
                record(project, Some("doi:10.1/x")),
                record(project, Some("doi:10.2/y")),
            ])
            .await
            .unwrap();
        assert_eq!(ids[0], ids[1]);
        assert_ne!(ids[0], ids[2]);
        assert_eq!(gw.count_records(project).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn null_keys_always_insert() {
        let gw = MemoryGateway::new();
        let project = Uuid::new_v4();
        let ids = gw
            .upsert_records_by_match_key(vec![record(project, None), record(project, None)])
            .await
            .unwrap();
        assert_ne!(ids[0], ids[1]);
        assert_eq!(gw.count_records(project).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn record_source_pair_is_idempotent() {
        let gw = MemoryGateway::new();
        let project = Uuid::new_v4();
        let rec_id = gw.insert_record(record(project, Some("k"))).await.unwrap();
        let source = Uuid::new_v4();

        let first = gw
            .insert_record_sources(vec![record_source(project, rec_id, source)])
            .await
            .unwrap();
        let second = gw
            .insert_record_sources(vec![record_source(project, rec_id, source)])
            .await
            .unwrap();
        assert_eq!(first, 1);
        assert_eq!(second, 0);
    }

    #[tokio::test]
    async fn orphan_delete_removes_unreferenced_records() {
        let gw = MemoryGateway::new();
        let project = Uuid::new_v4();
        let keep = gw.insert_record(record(project, Some("keep"))).await.unwrap();
        let _orphan = gw.insert_record(record(project, Some("orphan"))).await.unwrap();
        gw.insert_record_sources(vec![record_source(project, keep, Uuid::new_v4())])
            .await
            .unwrap();

        let deleted = gw.delete_orphan_records(project).await.unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(gw.count_records(project).await.unwrap(), 1);
        // The freed key can be reused.
        assert!(gw
            .find_record_by_match_key(project, "orphan")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn set_active_strategy_is_exclusive() {
        let gw = MemoryGateway::new();
        let project = Uuid::new_v4();
        let a = MatchStrategy::from_preset(project, "a", refdedup_core::Preset::Medium);
        let b = MatchStrategy::from_preset(project, "b", refdedup_core::Preset::Strict);
        let (a_id, b_id) = (a.id, b.id);
        gw.insert_strategy(a).await.unwrap();
        gw.insert_strategy(b).await.unwrap();

        gw.set_active_strategy(project, a_id).await.unwrap();
        gw.set_active_strategy(project, b_id).await.unwrap();

        let active = gw.get_active_strategy(project).await.unwrap().unwrap();
        assert_eq!(active.id, b_id);
        let actives = gw
            .list_strategies(project)
            .await
            .unwrap()
            .into_iter()
            .filter(|s| s.is_active)
            .count();
        assert_eq!(actives, 1);
    }

    #[tokio::test]
    async fn within_source_delete_is_scope_gated() {
        let gw = MemoryGateway::new();
        let project = Uuid::new_v4();
        let source = Uuid::new_v4();
        let other_source = Uuid::new_v4();

        let within = cluster(project, ClusterScope::WithinSource, false);
        let cross = cluster(project, ClusterScope::CrossSource, false);
        let (within_id, cross_id) = (within.id, cross.id);
        gw.insert_cluster(within, vec![member(within_id, Uuid::new_v4(), source)])
            .await
            .unwrap();
        // Cross-source cluster that merely touches the source.
        gw.insert_cluster(
            cross,
            vec![
                member(cross_id, Uuid::new_v4(), source),
                member(cross_id, Uuid::new_v4(), other_source),
            ],
        )
        .await
        .unwrap();

        let deleted = gw.delete_within_source_clusters(project, source).await.unwrap();
        assert_eq!(deleted, 1);
        assert!(gw.get_cluster(project, cross_id).await.unwrap().is_some());
        assert!(gw.get_cluster(project, within_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn locked_cross_clusters_survive_bulk_delete() {
        let gw = MemoryGateway::new();
        let project = Uuid::new_v4();
        let locked = cluster(project, ClusterScope::CrossSource, true);
        let unlocked = cluster(project, ClusterScope::CrossSource, false);
        let (locked_id, unlocked_id) = (locked.id, unlocked.id);
        let locked_member = Uuid::new_v4();
        gw.insert_cluster(locked, vec![member(locked_id, locked_member, Uuid::new_v4())])
            .await
            .unwrap();
        gw.insert_cluster(unlocked, vec![member(unlocked_id, Uuid::new_v4(), Uuid::new_v4())])
            .await
            .unwrap();

        let deleted = gw.delete_unlocked_cross_source_clusters(project).await.unwrap();
        assert_eq!(deleted, 1);
        assert!(gw.get_cluster(project, locked_id).await.unwrap().is_some());

        let ids = gw.locked_cross_source_member_ids(project).await.unwrap();
        assert!(ids.contains(&locked_member));
    }

    #[tokio::test]
    async fn move_members_skips_duplicates_and_strips_notes() {
        let gw = MemoryGateway::new();
        let project = Uuid::new_v4();
        let shared_rs = Uuid::new_v4();
        let moved_rs = Uuid::new_v4();
        let source = Uuid::new_v4();

        let keep = cluster(project, ClusterScope::CrossSource, false);
        let gone = cluster(project, ClusterScope::CrossSource, false);
        let (keep_id, gone_id) = (keep.id, gone.id);
        gw.insert_cluster(keep, vec![member(keep_id, shared_rs, source)])
            .await
            .unwrap();
        let mut noted = member(gone_id, moved_rs, source);
        noted.added_by = AddedBy::User;
        noted.note = Some("user note".to_string());
        gw.insert_cluster(gone, vec![member(gone_id, shared_rs, source), noted])
            .await
            .unwrap();

        gw.move_cluster_members(gone_id, keep_id).await.unwrap();
        gw.delete_cluster(gone_id).await.unwrap();

        let members = gw.list_cluster_members(keep_id).await.unwrap();
        assert_eq!(members.len(), 2);
        let moved = members
            .iter()
            .find(|m| m.record_source_id == moved_rs)
            .unwrap();
        assert_eq!(moved.added_by, AddedBy::Auto);
        assert_eq!(moved.note, None);
    }

    #[tokio::test]
    async fn source_totals_count_internal_duplicates() {
        let gw = MemoryGateway::new();
        let project = Uuid::new_v4();
        let source = gw.get_or_create_source(project, "PubMed").await.unwrap();
        let rec_id = gw.insert_record(record(project, Some("k1"))).await.unwrap();
        let rs_a = record_source(project, rec_id, source.id);
        let rs_b = {
            let rec2 = gw.insert_record(record(project, Some("k2"))).await.unwrap();
            record_source(project, rec2, source.id)
        };
        let (rs_a_id, rs_b_id) = (rs_a.id, rs_b.id);
        gw.insert_record_sources(vec![rs_a, rs_b]).await.unwrap();

        let within = cluster(project, ClusterScope::WithinSource, false);
        let cluster_id = within.id;
        let mut canonical = member(cluster_id, rs_a_id, source.id);
        canonical.role = MemberRole::Canonical;
        gw.insert_cluster(within, vec![canonical, member(cluster_id, rs_b_id, source.id)])
            .await
            .unwrap();

        let totals = gw.source_totals(project).await.unwrap();
        assert_eq!(totals.len(), 1);
        assert_eq!(totals[0].total, 2);
        assert_eq!(totals[0].internal_overlaps, 1);
    }

    #[tokio::test]
    async fn project_delete_cascades() {
        let gw = MemoryGateway::new();
        let project = Uuid::new_v4();
        gw.insert_project(Project {
            id: project,
            owner_id: Uuid::new_v4(),
            name: "p".to_string(),
            created_at_ms: 0,
        })
        .await
        .unwrap();
        let source = gw.get_or_create_source(project, "Scopus").await.unwrap();
        let rec_id = gw.insert_record(record(project, Some("k"))).await.unwrap();
        gw.insert_record_sources(vec![record_source(project, rec_id, source.id)])
            .await
            .unwrap();
        let c = cluster(project, ClusterScope::CrossSource, false);
        let c_id = c.id;
        gw.insert_cluster(c, vec![member(c_id, Uuid::new_v4(), source.id)])
            .await
            .unwrap();

        gw.delete_project(project).await.unwrap();
        assert_eq!(gw.count_records(project).await.unwrap(), 0);
        assert!(gw.list_sources(project).await.unwrap().is_empty());
        assert!(gw.list_clusters(project, None).await.unwrap().is_empty());
        assert!(gw
            .list_record_sources_by_project(project)
            .await
            .unwrap()
            .is_empty());
    }
}
