//! Dedup orchestration: re-cluster a project's record sources under a
//! strategy, rewrite the canonical records table, and write the match log.
//!
//! The match-key grammar below is the mechanism by which re-runs find
//! pre-existing canonical rows instead of creating fresh ones — the key is
//! the cluster's identity, not its content. The match log is flushed
//! before orphaned records are deleted so every log row references record
//! ids that still exist.

use std::sync::Arc;

use serde_json::Value;
use uuid::Uuid;

use refdedup_core::cluster::{Cluster, ClusterBasis, SourceRecord};
use refdedup_core::{PreviewResult, SourceFormat, TieredClusterBuilder};

use crate::error::{ServiceError, ServiceResult};
use crate::locks::ProjectLocks;
use crate::model::{DedupStats, MatchAction, MatchLogEntry, Record, RecordSource};
use crate::storage::PersistenceGateway;

/// Runs dedup jobs against the persistence gateway.
#[derive(Clone)]
pub struct DedupService {
    gateway: Arc<dyn PersistenceGateway>,
    locks: ProjectLocks,
}

impl DedupService {
    #[must_use]
    pub fn new(gateway: Arc<dyn PersistenceGateway>, locks: ProjectLocks) -> Self {
        Self { gateway, locks }
    }

    /// Background-task entry point. Never returns an error: every failure
    /// lands on the job row so no job stays `running` forever.
    pub async fn run_dedup(&self, job_id: Uuid, project_id: Uuid, strategy_id: Uuid) {
        let Some(_guard) = self.locks.try_acquire(project_id) else {
            let message = ServiceError::ProjectLocked.user_message();
            if let Err(err) = self.gateway.set_dedup_job_failed(job_id, &message).await {
                tracing::error!(%job_id, error = %err, "failed to mark dedup job as locked-out");
            }
            return;
        };

        if let Err(err) = self.gateway.set_dedup_job_running(job_id).await {
            tracing::error!(%job_id, error = %err, "failed to mark dedup job running");
            return;
        }

        if let Err(err) = self.execute(job_id, project_id, strategy_id).await {
            tracing::error!(%job_id, %project_id, error = %err, "dedup job failed");
            let message = err.user_message();
            if let Err(err) = self.gateway.set_dedup_job_failed(job_id, &message).await {
                tracing::error!(%job_id, error = %err, "failed to mark dedup job failed");
            }
        }
    }

    /// Read-only preview: what clustering under the strategy would do.
    pub async fn preview(
        &self,
        project_id: Uuid,
        strategy_id: Uuid,
    ) -> ServiceResult<PreviewResult> {
        let strategy = self
            .gateway
            .get_strategy(project_id, strategy_id)
            .await?
            .ok_or(ServiceError::StrategyNotFound(strategy_id))?;
        let rows = self.gateway.list_record_sources_by_project(project_id).await?;
        let builder = TieredClusterBuilder::new(strategy.resolve_config());
        Ok(builder.preview(rows.iter().map(to_source_record).collect()))
    }

    async fn execute(
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
        let config = strategy.resolve_config();

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
            self.gateway.set_active_strategy(project_id, strategy_id).await?;
            return Ok(());
        }

        let sources: Vec<SourceRecord> = rows.iter().map(to_source_record).collect();
        let clusters = TieredClusterBuilder::new(config).compute_clusters(sources);

        let mut log_entries: Vec<MatchLogEntry> = Vec::new();
        let mut merges = 0;
        let mut clusters_created = 0;

        for cluster in &clusters {
            if cluster.match_tier == 0 {
                // Isolated: each source keeps its existing record unchanged.
                for member in &cluster.members {
                    log_entries.push(MatchLogEntry {
                        id: Uuid::new_v4(),
                        dedup_job_id: job_id,
                        record_source_id: member.id,
                        old_record_id: member.old_record_id,
                        new_record_id: member.old_record_id,
                        match_key: None,
                        match_basis: ClusterBasis::None.as_str().to_string(),
                        action: MatchAction::Unchanged,
                    });
                }
                continue;
            }

            let match_key = derive_match_key(cluster);
            let canonical_id = match self
                .gateway
                .find_record_by_match_key(project_id, &match_key)
                .await?
            {
                Some(existing) => existing,
                None => {
                    clusters_created += 1;
                    self.gateway
                        .insert_record(record_from_representative(project_id, cluster, &match_key))
                        .await?
                }
            };

            let member_ids: Vec<Uuid> = cluster.members.iter().map(|m| m.id).collect();
            self.gateway
                .repoint_record_sources(&member_ids, canonical_id)
                .await?;

            for member in &cluster.members {
                let action = if member.old_record_id == canonical_id {
                    MatchAction::Unchanged
                } else {
                    merges += 1;
                    MatchAction::Merged
                };
                log_entries.push(MatchLogEntry {
                    id: Uuid::new_v4(),
                    dedup_job_id: job_id,
                    record_source_id: member.id,
                    old_record_id: member.old_record_id,
                    new_record_id: canonical_id,
                    match_key: Some(match_key.clone()),
                    match_basis: cluster.match_basis.as_str().to_string(),
                    action,
                });
            }
        }

        // The log references old record ids, so it must land before the
        // orphans those ids may belong to are deleted.
        self.gateway.append_match_log(log_entries).await?;
        let clusters_deleted = self.gateway.delete_orphan_records(project_id).await?;
        let records_after = self.gateway.count_records(project_id).await?;

        self.gateway
            .set_dedup_job_completed(
                job_id,
                DedupStats {
                    records_before,
                    records_after,
                    merges,
                    clusters_created,
                    clusters_deleted,
                },
            )
            .await?;
        self.gateway.set_active_strategy(project_id, strategy_id).await?;

        tracing::info!(
            %job_id,
            %project_id,
            records_before,
            records_after,
            merges,
            clusters_created,
            clusters_deleted,
            "dedup run complete"
        );
        Ok(())
    }
}

fn to_source_record(rs: &RecordSource) -> SourceRecord {
    SourceRecord {
        id: rs.id,
        old_record_id: rs.record_id,
        norm_title: rs.norm_title.clone(),
        norm_first_author: rs.norm_first_author.clone(),
        match_year: rs.match_year,
        match_doi: rs.match_doi.clone(),
        pmid: rs.pmid(),
        authors: rs.raw_authors(),
        raw_data: rs.raw_data.clone(),
    }
}

/// Canonical match key for a non-isolated cluster, derived from its tier
/// and representative. Compatible with import-time keys so existing
/// canonical rows are found by lookup.
fn derive_match_key(cluster: &Cluster) -> String {
    let rep = &cluster.representative;
    match cluster.match_basis {
        ClusterBasis::Tier1Doi => {
            if let Some(doi) = &rep.match_doi {
                return format!("doi:{doi}");
            }
        }
        ClusterBasis::Tier1Pmid => {
            if let Some(pmid) = &rep.pmid {
                return format!("pmid:{pmid}");
            }
        }
        ClusterBasis::Tier2TitleYear => {
            if let (Some(title), Some(year)) = (&rep.norm_title, rep.match_year) {
                return format!("ty:{title}|{year}");
            }
        }
        ClusterBasis::Tier2TitleAuthorYear => {
            if let (Some(title), Some(author), Some(year)) =
                (&rep.norm_title, &rep.norm_first_author, rep.match_year)
            {
                return format!("tay:{title}|{author}|{year}");
            }
        }
        ClusterBasis::Tier3Fuzzy => {
            if let Some(title) = &rep.norm_title {
                let score = cluster.similarity_score.unwrap_or(0.0);
                let year = rep
                    .match_year
                    .map_or_else(|| "unknown".to_string(), |y| y.to_string());
                return format!("fuz:{score:.2}:{title}|{year}");
            }
        }
        ClusterBasis::None => {}
    }
    // Stable, unique fallback.
    format!("auto:{}", rep.id)
}

/// New canonical record populated from the representative's raw bundle.
fn record_from_representative(project_id: Uuid, cluster: &Cluster, match_key: &str) -> Record {
    let raw = &cluster.representative.raw_data;
    let get_str = |key: &str| {
        raw.get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    let get_list = |key: &str| -> Vec<String> {
        raw.get(key)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    };
    let source_format = raw
        .get("source_format")
        .and_then(|v| serde_json::from_value::<SourceFormat>(v.clone()).ok())
        .unwrap_or(SourceFormat::Ris);
    #[allow(clippy::cast_possible_truncation)]
    let year = raw
        .get("year")
        .and_then(Value::as_i64)
        .map(|y| y as i32);

    Record {
        id: Uuid::new_v4(),
        project_id,
        match_key: Some(match_key.to_string()),
        match_basis: cluster.match_basis.as_str().to_string(),
        title: get_str("title"),
        abstract_text: get_str("abstract"),
        authors: get_list("authors"),
        year,
        journal: get_str("journal"),
        volume: get_str("volume"),
        issue: get_str("issue"),
        pages: get_str("pages"),
        doi: get_str("doi"),
        issn: get_str("issn"),
        keywords: get_list("keywords"),
        source_format,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn source(n: u128, doi: Option<&str>) -> SourceRecord {
        SourceRecord {
            id: Uuid::from_u128(n),
            old_record_id: Uuid::from_u128(n + 100),
            norm_title: Some("caffeine alertness".to_string()),
            norm_first_author: Some("smith".to_string()),
            match_year: Some(2023),
            match_doi: doi.map(str::to_string),
            pmid: Some("123".to_string()),
            authors: None,
            raw_data: json!({}),
        }
    }

    fn cluster_with(basis: ClusterBasis, score: Option<f64>) -> Cluster {
        let rep = source(1, Some("10.1/x"));
        Cluster {
            members: vec![rep.clone()],
            representative: rep,
            match_tier: 1,
            match_basis: basis,
            match_reason: String::new(),
            similarity_score: score,
        }
    }

    #[test]
    fn match_key_grammar_per_basis() {
        assert_eq!(
            derive_match_key(&cluster_with(ClusterBasis::Tier1Doi, None)),
            "doi:10.1/x"
        );
        assert_eq!(
            derive_match_key(&cluster_with(ClusterBasis::Tier1Pmid, None)),
            "pmid:123"
        );
        assert_eq!(
            derive_match_key(&cluster_with(ClusterBasis::Tier2TitleYear, None)),
            "ty:caffeine alertness|2023"
        );
        assert_eq!(
            derive_match_key(&cluster_with(ClusterBasis::Tier2TitleAuthorYear, None)),
            "tay:caffeine alertness|smith|2023"
        );
        assert_eq!(
            derive_match_key(&cluster_with(ClusterBasis::Tier3Fuzzy, Some(0.874))),
            "fuz:0.87:caffeine alertness|2023"
        );
    }

    #[test]
    fn missing_fields_fall_back_to_auto_key() {
        let mut cluster = cluster_with(ClusterBasis::Tier1Doi, None);
        cluster.representative.match_doi = None;
        assert_eq!(
            derive_match_key(&cluster),
            format!("auto:{}", Uuid::from_u128(1))
        );
    }

    #[test]
    fn fuzzy_key_uses_unknown_for_missing_year() {
        let mut cluster = cluster_with(ClusterBasis::Tier3Fuzzy, Some(0.9));
        cluster.representative.match_year = None;
        assert_eq!(
            derive_match_key(&cluster),
            "fuz:0.90:caffeine alertness|unknown"
        );
    }

    #[test]
    fn record_from_representative_copies_bibliographic_fields() {
        let mut cluster = cluster_with(ClusterBasis::Tier1Doi, None);
        cluster.representative.raw_data = json!({
            "title": "Caffeine and Alertness",
            "abstract": "Background.",
            "authors": ["Smith, A"],
            "year": 2023,
            "journal": "J Sleep",
            "volume": "12",
            "doi": "10.1/x",
            "keywords": ["caffeine"],
            "source_format": "medline",
        });
        let record =
            record_from_representative(Uuid::from_u128(9), &cluster, "doi:10.1/x");
        assert_eq!(record.title.as_deref(), Some("Caffeine and Alertness"));
        assert_eq!(record.authors, vec!["Smith, A"]);
        assert_eq!(record.year, Some(2023));
        assert_eq!(record.source_format, SourceFormat::Medline);
        assert_eq!(record.match_key.as_deref(), Some("doi:10.1/x"));
        assert_eq!(record.match_basis, "tier1_doi");
    }
}
