//! Tiered cluster engine, dedup mode.
//!
//! Groups flattened record-source rows into clusters of records that should
//! map to one canonical record, using up to three evidence tiers over a
//! shared Union-Find:
//!
//! - Tier 1 — exact identifiers: DOI, PMID
//! - Tier 2 — strong bibliographic: exact normalized title+year, or
//!   title+author+year
//! - Tier 3 — probable: fuzzy title similarity with an optional shared
//!   author surname gate
//!
//! All passes process records in ascending id order, and the representative
//! tie-break is the lowest id, so the output is invariant under input
//! permutation.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use serde_json::Value;
use uuid::Uuid;

use crate::match_key::StrategyConfig;
use crate::similarity::token_set_ratio;
use crate::union_find::UnionFind;

/// Evidence class that formed a dedup cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterBasis {
    Tier1Doi,
    Tier1Pmid,
    Tier2TitleYear,
    Tier2TitleAuthorYear,
    Tier3Fuzzy,
    None,
}

impl ClusterBasis {
    /// Stable string form, as stored in records and the match log.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tier1Doi => "tier1_doi",
            Self::Tier1Pmid => "tier1_pmid",
            Self::Tier2TitleYear => "tier2_title_year",
            Self::Tier2TitleAuthorYear => "tier2_title_author_year",
            Self::Tier3Fuzzy => "tier3_fuzzy",
            Self::None => "none",
        }
    }
}

/// Flattened representation of one record-source row, as the engine sees it.
///
/// All fields come precomputed from persistence; the engine itself never
/// normalizes anything.
#[derive(Debug, Clone)]
pub struct SourceRecord {
    pub id: Uuid,
    pub old_record_id: Uuid,
    pub norm_title: Option<String>,
    pub norm_first_author: Option<String>,
    pub match_year: Option<i32>,
    pub match_doi: Option<String>,
    pub pmid: Option<String>,
    pub authors: Option<Vec<String>>,
    pub raw_data: Value,
}

impl SourceRecord {
    fn has_abstract(&self) -> bool {
        self.raw_data
            .get("abstract")
            .and_then(Value::as_str)
            .is_some_and(|s| !s.is_empty())
    }
}

/// A group of source records that should map to one canonical record.
#[derive(Debug, Clone)]
pub struct Cluster {
    /// Best-quality member, used to populate the canonical record.
    pub representative: SourceRecord,
    /// All members, ascending by id.
    pub members: Vec<SourceRecord>,
    /// Most precise tier that formed the cluster; 0 = isolated.
    pub match_tier: u8,
    pub match_basis: ClusterBasis,
    pub match_reason: String,
    /// Tier 3 only.
    pub similarity_score: Option<f64>,
}

impl Cluster {
    #[must_use]
    pub fn size(&self) -> usize {
        self.members.len()
    }
}

/// Result of a preview run — what a dedup under this config would do,
/// computed without any writes.
#[derive(Debug)]
pub struct PreviewResult {
    /// Clusters with more than one member (true duplicates).
    pub clusters: Vec<Cluster>,
    /// Sources with no match.
    pub isolated: Vec<SourceRecord>,
    /// Sources that would change canonical record.
    pub would_merge: usize,
    /// Canonical records remaining after the run.
    pub would_remain: usize,
    pub tier1_count: usize,
    pub tier2_count: usize,
    pub tier3_count: usize,
}

/// Builds dedup clusters from source records under a [`StrategyConfig`].
#[derive(Debug)]
pub struct TieredClusterBuilder {
    config: StrategyConfig,
}

impl TieredClusterBuilder {
    #[must_use]
    pub fn new(config: StrategyConfig) -> Self {
        Self { config }
    }

    /// Clusters sources into groups of duplicates. Isolated sources appear
    /// as single-member clusters with tier 0.
    #[must_use]
    pub fn compute_clusters(&self, sources: Vec<SourceRecord>) -> Vec<Cluster> {
        if sources.is_empty() {
            return Vec::new();
        }

        let mut sorted = sources;
        sorted.sort_by(|a, b| a.id.cmp(&b.id));
        let n = sorted.len();
        let mut uf: UnionFind<ClusterBasis> = UnionFind::new(n);

        if self.config.use_doi {
            union_by_key(
                &mut uf,
                &sorted,
                |s| s.match_doi.clone(),
                1,
                ClusterBasis::Tier1Doi,
                |key| format!("Exact DOI: {key}"),
            );
        }
        if self.config.use_pmid {
            union_by_key(
                &mut uf,
                &sorted,
                |s| s.pmid.clone(),
                1,
                ClusterBasis::Tier1Pmid,
                |key| format!("Exact PMID: {key}"),
            );
        }
        if self.config.use_title_year {
            union_by_key(
                &mut uf,
                &sorted,
                |s| match (&s.norm_title, s.match_year) {
                    (Some(t), Some(y)) => Some(format!("{t}|{y}")),
                    _ => None,
                },
                2,
                ClusterBasis::Tier2TitleYear,
                |key| {
                    let (title, year) = key.split_once('|').unwrap_or((key, ""));
                    format!("Exact title + year: '{title}' ({year})")
                },
            );
        }
        if self.config.use_title_author_year {
            union_by_key(
                &mut uf,
                &sorted,
                |s| match (&s.norm_title, &s.norm_first_author, s.match_year) {
                    (Some(t), Some(a), Some(y)) => Some(format!("{t}|{a}|{y}")),
                    _ => None,
                },
                2,
                ClusterBasis::Tier2TitleAuthorYear,
                |key| {
                    let title = key.split('|').next().unwrap_or(key);
                    format!("Exact title + author + year: '{title}'")
                },
            );
        }
        if self.config.use_fuzzy {
            self.fuzzy_union(&mut uf, &sorted);
        }

        let groups = uf.groups();
        let mut result = Vec::with_capacity(groups.len());
        for (root, member_indices) in groups {
            let members: Vec<SourceRecord> =
                member_indices.iter().map(|&i| sorted[i].clone()).collect();

            let (tier, basis, mut reason, score) = match uf.tier_info(root) {
                Some(info) => (info.tier, info.basis, info.reason.clone(), info.score),
                None => (0, ClusterBasis::None, String::new(), None),
            };
            if members.len() == 1 && tier == 0 {
                reason = "No match found".to_string();
            }

            let representative = pick_best(&members).clone();
            result.push(Cluster {
                representative,
                members,
                match_tier: tier,
                match_basis: basis,
                match_reason: reason,
                similarity_score: score,
            });
        }

        tracing::debug!(
            sources = n,
            clusters = result.len(),
            duplicates = result.iter().filter(|c| c.size() > 1).count(),
            "dedup clustering complete"
        );
        result
    }

    /// Computes clusters and summarizes what a real dedup run would change.
    #[must_use]
    pub fn preview(&self, sources: Vec<SourceRecord>) -> PreviewResult {
        let clusters = self.compute_clusters(sources);

        let (duplicates, singles): (Vec<Cluster>, Vec<Cluster>) =
            clusters.into_iter().partition(|c| c.size() > 1);
        let would_merge = duplicates.iter().map(|c| c.size() - 1).sum();
        let would_remain = duplicates.len() + singles.len();

        let tier_count =
            |t: u8| duplicates.iter().filter(|c| c.match_tier == t).count();
        PreviewResult {
            tier1_count: tier_count(1),
            tier2_count: tier_count(2),
            tier3_count: tier_count(3),
            isolated: singles.into_iter().map(|c| c.representative).collect(),
            clusters: duplicates,
            would_merge,
            would_remain,
        }
    }

    /// Tier 3: pairwise fuzzy title similarity over records still in
    /// different components. Pairs are visited in sorted-id order.
    fn fuzzy_union(&self, uf: &mut UnionFind<ClusterBasis>, sorted: &[SourceRecord]) {
        let candidates: Vec<usize> = (0..sorted.len())
            .filter(|&i| sorted[i].norm_title.is_some())
            .collect();
        if candidates.len() < 2 {
            return;
        }

        for (pos, &i) in candidates.iter().enumerate() {
            for &j in &candidates[pos + 1..] {
                if uf.find(i) == uf.find(j) {
                    continue;
                }
                let (a, b) = (&sorted[i], &sorted[j]);
                let title_a = a.norm_title.as_deref().unwrap_or_default();
                let title_b = b.norm_title.as_deref().unwrap_or_default();
                let score = token_set_ratio(title_a, title_b);
                if score < self.config.fuzzy_threshold {
                    continue;
                }
                if self.config.fuzzy_author_check
                    && !authors_overlap(a.authors.as_deref(), b.authors.as_deref())
                {
                    continue;
                }
                let reason = format!(
                    "Fuzzy title match ({:.0}%): '{title_a}' vs '{title_b}'",
                    score * 100.0
                );
                let rounded = (score * 10_000.0).round() / 10_000.0;
                uf.union(i, j, 3, ClusterBasis::Tier3Fuzzy, reason, Some(rounded));
            }
        }
    }
}

/// Groups sources by a key function and unions each group at the given tier.
fn union_by_key(
    uf: &mut UnionFind<ClusterBasis>,
    sorted: &[SourceRecord],
    key_fn: impl Fn(&SourceRecord) -> Option<String>,
    tier: u8,
    basis: ClusterBasis,
    reason_fn: impl Fn(&str) -> String,
) {
    let mut groups: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for (i, s) in sorted.iter().enumerate() {
        if let Some(key) = key_fn(s) {
            groups.entry(key).or_default().push(i);
        }
    }
    for (key, indices) in groups {
        if indices.len() < 2 {
            continue;
        }
        let reason = reason_fn(&key);
        let first = indices[0];
        for &other in &indices[1..] {
            uf.union(first, other, tier, basis, reason.clone(), None);
        }
    }
}

/// True when the two author lists share at least one normalized surname.
fn authors_overlap(a: Option<&[String]>, b: Option<&[String]>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) if !a.is_empty() && !b.is_empty() => {
            !surnames(a).is_disjoint(&surnames(b))
        }
        _ => false,
    }
}

fn surnames(authors: &[String]) -> BTreeSet<String> {
    authors
        .iter()
        .filter_map(|entry| {
            let last = match entry.split_once(',') {
                Some((before, _)) => before,
                None => entry.split_whitespace().last().unwrap_or(entry),
            };
            let cleaned: String = last
                .to_lowercase()
                .chars()
                .filter(|c| c.is_ascii_lowercase() || c.is_whitespace())
                .collect();
            let cleaned = cleaned.trim().to_string();
            (!cleaned.is_empty()).then_some(cleaned)
        })
        .collect()
}

/// Chooses the canonical representative: has DOI, then has title, then has
/// abstract, then first in sorted-id order.
fn pick_best(members: &[SourceRecord]) -> &SourceRecord {
    let score = |s: &SourceRecord| {
        (
            s.match_doi.is_some(),
            s.norm_title.is_some(),
            s.has_abstract(),
        )
    };
    let mut best = &members[0];
    for candidate in &members[1..] {
        if score(candidate) > score(best) {
            best = candidate;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::match_key::{Preset, StrategyConfig};

    fn uuid_n(n: u128) -> Uuid {
        Uuid::from_u128(n)
    }

    fn source(n: u128, doi: Option<&str>, title: Option<&str>, year: Option<i32>) -> SourceRecord {
        SourceRecord {
            id: uuid_n(n),
            old_record_id: uuid_n(n + 1000),
            norm_title: title.map(str::to_string),
            norm_first_author: Some("smith".to_string()),
            match_year: year,
            match_doi: doi.map(str::to_string),
            pmid: None,
            authors: Some(vec!["Smith, A".to_string()]),
            raw_data: json!({}),
        }
    }

    #[test]
    fn empty_input_yields_no_clusters() {
        let builder = TieredClusterBuilder::new(StrategyConfig::default());
        assert!(builder.compute_clusters(Vec::new()).is_empty());
    }

    #[test]
    fn doi_match_forms_tier1_cluster() {
        let builder = TieredClusterBuilder::new(StrategyConfig::default());
        let clusters = builder.compute_clusters(vec![
            source(1, Some("10.1/x"), Some("t one"), Some(2020)),
            source(2, Some("10.1/x"), Some("t two"), Some(2021)),
            source(3, Some("10.2/y"), Some("t three"), Some(2022)),
        ]);
        assert_eq!(clusters.len(), 2);
        let dup = clusters.iter().find(|c| c.size() == 2).unwrap();
        assert_eq!(dup.match_tier, 1);
        assert_eq!(dup.match_basis, ClusterBasis::Tier1Doi);
        assert!(dup.match_reason.contains("10.1/x"));
    }

    #[test]
    fn pmid_match_forms_tier1_cluster() {
        let builder = TieredClusterBuilder::new(StrategyConfig::default());
        let mut a = source(1, None, Some("alpha"), Some(2020));
        let mut b = source(2, None, Some("beta"), Some(2021));
        a.pmid = Some("12345".to_string());
        b.pmid = Some("12345".to_string());
        let clusters = builder.compute_clusters(vec![a, b]);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].match_basis, ClusterBasis::Tier1Pmid);
    }

    #[test]
    fn title_year_match_forms_tier2_cluster() {
        let config = StrategyConfig::from_preset(Preset::Medium);
        let builder = TieredClusterBuilder::new(config);
        let clusters = builder.compute_clusters(vec![
            source(1, None, Some("caffeine alertness"), Some(2023)),
            source(2, None, Some("caffeine alertness"), Some(2023)),
        ]);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].match_tier, 2);
        assert_eq!(clusters[0].match_basis, ClusterBasis::Tier2TitleYear);
    }

    #[test]
    fn doi_beats_title_when_both_match() {
        let builder = TieredClusterBuilder::new(StrategyConfig::default());
        let clusters = builder.compute_clusters(vec![
            source(1, Some("10.1/x"), Some("same title"), Some(2020)),
            source(2, Some("10.1/x"), Some("same title"), Some(2020)),
        ]);
        assert_eq!(clusters[0].match_tier, 1);
        assert_eq!(clusters[0].match_basis, ClusterBasis::Tier1Doi);
    }

    #[test]
    fn isolated_records_report_tier_zero() {
        let builder = TieredClusterBuilder::new(StrategyConfig::default());
        let clusters =
            builder.compute_clusters(vec![source(1, None, Some("solo title"), None)]);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].match_tier, 0);
        assert_eq!(clusters[0].match_basis, ClusterBasis::None);
        assert_eq!(clusters[0].match_reason, "No match found");
    }

    #[test]
    fn fuzzy_pass_respects_threshold_and_author_gate() {
        let mut config = StrategyConfig::from_preset(Preset::Strict);
        config.use_fuzzy = true;
        config.fuzzy_threshold = 0.80;
        config.fuzzy_author_check = true;
        let builder = TieredClusterBuilder::new(config);

        let mut a = source(1, None, Some("yoga interventions stress reduction"), Some(2020));
        let mut b = source(2, None, Some("yoga interventions stress outcomes"), Some(2020));
        a.norm_first_author = Some("lee".to_string());
        b.norm_first_author = Some("kim".to_string());
        a.authors = Some(vec!["Lee, C".to_string()]);
        b.authors = Some(vec!["Kim, D".to_string()]);

        // No shared surname: the author gate blocks the fuzzy union.
        let clusters = builder.compute_clusters(vec![a.clone(), b.clone()]);
        assert_eq!(clusters.len(), 2);

        // Shared surname: tier 3 cluster with a recorded score.
        b.authors = Some(vec!["Kim, D".to_string(), "Lee, F".to_string()]);
        let clusters = builder.compute_clusters(vec![a, b]);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].match_tier, 3);
        assert_eq!(clusters[0].match_basis, ClusterBasis::Tier3Fuzzy);
        assert!(clusters[0].similarity_score.unwrap() >= 0.80);
    }

    #[test]
    fn fuzzy_disabled_keeps_near_duplicates_apart() {
        let config = StrategyConfig::from_preset(Preset::Strict);
        let builder = TieredClusterBuilder::new(config);
        let a = source(1, None, Some("yoga interventions stress reduction"), Some(2020));
        let b = source(2, None, Some("yoga interventions stress outcomes"), Some(2020));
        assert_eq!(builder.compute_clusters(vec![a, b]).len(), 2);
    }

    #[test]
    fn representative_prefers_doi_then_title_then_abstract() {
        let builder = TieredClusterBuilder::new(StrategyConfig::default());
        let mut no_doi = source(1, None, Some("same title"), Some(2020));
        no_doi.pmid = Some("99".to_string());
        no_doi.raw_data = json!({"abstract": "long text"});
        let mut with_doi = source(2, Some("10.1/x"), Some("same title"), Some(2020));
        with_doi.pmid = Some("99".to_string());

        let clusters = builder.compute_clusters(vec![no_doi, with_doi]);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].representative.id, uuid_n(2));
    }

    #[test]
    fn representative_tie_breaks_on_lowest_id() {
        let builder = TieredClusterBuilder::new(StrategyConfig::default());
        let clusters = builder.compute_clusters(vec![
            source(7, Some("10.1/x"), Some("t"), Some(2020)),
            source(3, Some("10.1/x"), Some("t"), Some(2020)),
        ]);
        assert_eq!(clusters[0].representative.id, uuid_n(3));
    }

    #[test]
    fn determinism_under_permutation() {
        let builder = TieredClusterBuilder::new(StrategyConfig::default());
        let records = vec![
            source(1, Some("10.1/x"), Some("one"), Some(2020)),
            source(2, Some("10.1/x"), Some("two"), Some(2020)),
            source(3, None, Some("three"), Some(2021)),
        ];
        let mut reversed = records.clone();
        reversed.reverse();

        let a = builder.compute_clusters(records);
        let b = builder.compute_clusters(reversed);
        let ids =
            |cs: &[Cluster]| cs.iter().map(|c| c.representative.id).collect::<Vec<_>>();
        assert_eq!(ids(&a), ids(&b));
    }

    #[test]
    fn preview_counts_merges_and_tiers() {
        let builder = TieredClusterBuilder::new(StrategyConfig::default());
        let preview = builder.preview(vec![
            source(1, Some("10.1/x"), Some("one"), Some(2020)),
            source(2, Some("10.1/x"), Some("one"), Some(2020)),
            source(3, Some("10.1/x"), Some("one"), Some(2020)),
            source(4, None, Some("loner"), None),
        ]);
        assert_eq!(preview.clusters.len(), 1);
        assert_eq!(preview.isolated.len(), 1);
        assert_eq!(preview.would_merge, 2);
        assert_eq!(preview.would_remain, 2);
        assert_eq!(preview.tier1_count, 1);
        assert_eq!(preview.tier2_count, 0);
    }
}
