//! Tiered cluster engine, overlap mode.
//!
//! A 5-tier deterministic detector over record-source rows, built for
//! scalability with blocking keys: exact-identifier buckets first, then
//! `(title_prefix, year)` buckets for the bibliographic tiers, then
//! `title_prefix` buckets for the fuzzy tier. Three passes share one
//! Union-Find, so once a pair is merged a weaker tier never re-classifies
//! it.
//!
//! Tiers:
//! 1. exact DOI or PMID
//! 2. title + year + first author + volume agreement
//! 3. title + year + first author (volumes differ, both present)
//! 4. title + year
//! 5. fuzzy title + year tolerance + shared author surname

use std::collections::BTreeMap;

use serde_json::Value;
use uuid::Uuid;

use crate::overlap::fields::{
    extract_year, first_author_last, normalize_title_for_overlap, normalize_volume,
    parse_authors_value,
};
use crate::similarity::token_set_ratio;
use crate::union_find::UnionFind;

/// Characters of normalized title used as the blocking prefix.
const TITLE_PREFIX_LEN: usize = 15;

/// Fields that may participate in overlap detection.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum OverlapField {
    Doi,
    Pmid,
    Title,
    Year,
    FirstAuthor,
    AllAuthors,
    Volume,
    Pages,
    Journal,
}

/// Controls which fields and tiers are active during overlap detection.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct OverlapConfig {
    pub selected_fields: Vec<OverlapField>,
    pub fuzzy_enabled: bool,
    pub fuzzy_threshold: f64,
    /// 0 = exact year match; 1 = ±1 year.
    pub year_tolerance: i32,
}

impl Default for OverlapConfig {
    fn default() -> Self {
        Self {
            selected_fields: vec![
                OverlapField::Doi,
                OverlapField::Pmid,
                OverlapField::Title,
                OverlapField::Year,
                OverlapField::FirstAuthor,
                OverlapField::Volume,
            ],
            fuzzy_enabled: false,
            fuzzy_threshold: 0.93,
            year_tolerance: 0,
        }
    }
}

impl OverlapConfig {
    fn uses(&self, field: OverlapField) -> bool {
        self.selected_fields.contains(&field)
    }
}

/// Evidence class that formed an overlap cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlapBasis {
    Doi,
    Pmid,
    TitleYearAuthorVolume,
    TitleYearAuthor,
    TitleYear,
    FuzzyTitleAuthor,
    Manual,
    Unknown,
}

impl OverlapBasis {
    /// Stable string form, as stored on persisted clusters.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Doi => "doi",
            Self::Pmid => "pmid",
            Self::TitleYearAuthorVolume => "title_year_author_volume",
            Self::TitleYearAuthor => "title_year_author",
            Self::TitleYear => "title_year",
            Self::FuzzyTitleAuthor => "fuzzy_title_author",
            Self::Manual => "manual",
            Self::Unknown => "unknown",
        }
    }
}

/// Normalized view of one record-source row for overlap detection.
#[derive(Debug, Clone)]
pub struct OverlapRecord {
    pub record_source_id: Uuid,
    pub source_id: Uuid,
    pub doi: Option<String>,
    pub pmid: Option<String>,
    pub norm_title: String,
    pub title_prefix: String,
    pub year: Option<i32>,
    pub first_author: Option<String>,
    pub all_author_lasts: Vec<String>,
    pub norm_volume: Option<String>,
    pub raw_pages: Option<String>,
    pub raw_journal: Option<String>,
    /// Used for representative scoring only.
    pub abstract_len: usize,
}

impl OverlapRecord {
    /// Builds an [`OverlapRecord`] from a record-source row's precomputed
    /// fields and its `raw_data` bundle.
    #[must_use]
    pub fn build(
        record_source_id: Uuid,
        source_id: Uuid,
        norm_title: Option<&str>,
        match_doi: Option<&str>,
        match_year: Option<i32>,
        raw_data: &Value,
    ) -> Self {
        let raw_str = |key: &str| {
            raw_data
                .get(key)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
        };

        let pmid = raw_str("pmid")
            .or_else(|| raw_str("source_record_id"))
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let title_input = norm_title.or_else(|| raw_str("title")).unwrap_or_default();
        let norm_title = normalize_title_for_overlap(title_input);
        let title_prefix: String = norm_title.chars().take(TITLE_PREFIX_LEN).collect();

        let year = match_year.or_else(|| raw_str("year").and_then(extract_year)).or_else(|| {
            raw_data
                .get("year")
                .and_then(Value::as_i64)
                .and_then(|y| i32::try_from(y).ok())
                .and_then(|y| extract_year(&y.to_string()))
        });

        let authors = raw_data.get("authors").cloned().unwrap_or(Value::Null);
        let abstract_len = raw_str("abstract").map_or(0, str::len);

        Self {
            record_source_id,
            source_id,
            doi: match_doi.map(str::to_string),
            pmid,
            norm_title,
            title_prefix,
            year,
            first_author: first_author_last(&authors),
            all_author_lasts: parse_authors_value(&authors),
            norm_volume: raw_str("volume").and_then(normalize_volume),
            raw_pages: raw_str("pages").map(str::to_string),
            raw_journal: raw_str("journal").map(str::to_string),
            abstract_len,
        }
    }

    fn shares_author_with(&self, other: &Self) -> bool {
        self.all_author_lasts
            .iter()
            .any(|surname| other.all_author_lasts.contains(surname))
    }
}

/// One detected duplicate/overlap group of at least two records.
#[derive(Debug, Clone)]
pub struct DetectedCluster {
    /// Members, ascending by record-source id.
    pub records: Vec<OverlapRecord>,
    pub tier: u8,
    pub match_basis: OverlapBasis,
    pub match_reason: String,
    /// Tier 5 only.
    pub similarity_score: Option<f64>,
}

/// Deterministic 5-tier overlap detector with blocking keys.
#[derive(Debug)]
pub struct OverlapDetector {
    config: OverlapConfig,
}

impl OverlapDetector {
    #[must_use]
    pub fn new(config: OverlapConfig) -> Self {
        Self { config }
    }

    /// Runs detection and returns the groups of size ≥ 2, sorted by their
    /// smallest member id.
    #[must_use]
    pub fn detect(&self, records: Vec<OverlapRecord>) -> Vec<DetectedCluster> {
        if records.len() < 2 {
            return Vec::new();
        }

        let mut sorted = records;
        sorted.sort_by(|a, b| a.record_source_id.cmp(&b.record_source_id));
        let mut uf: UnionFind<OverlapBasis> = UnionFind::new(sorted.len());

        self.exact_id_pass(&sorted, &mut uf);
        if self.config.uses(OverlapField::Title) {
            self.title_year_pass(&sorted, &mut uf);
            if self.config.fuzzy_enabled {
                self.fuzzy_pass(&sorted, &mut uf);
            }
        }

        let groups = uf.groups();
        let group_count = groups.len();
        let mut clusters = Vec::new();
        for (root, member_indices) in groups {
            if member_indices.len() < 2 {
                continue;
            }
            let (tier, basis, reason, score) = match uf.tier_info(root) {
                Some(info) => (info.tier, info.basis, info.reason.clone(), info.score),
                None => (5, OverlapBasis::Unknown, "unknown".to_string(), None),
            };
            clusters.push(DetectedCluster {
                records: member_indices.iter().map(|&i| sorted[i].clone()).collect(),
                tier,
                match_basis: basis,
                match_reason: reason,
                similarity_score: score,
            });
        }

        // Members ascend by id, so the first member is the smallest.
        clusters.sort_by(|a, b| {
            a.records[0]
                .record_source_id
                .cmp(&b.records[0].record_source_id)
        });
        tracing::debug!(
            groups = group_count,
            clusters = clusters.len(),
            "overlap detection complete"
        );
        clusters
    }

    /// Pass 1: exact DOI and PMID buckets at tier 1.
    fn exact_id_pass(&self, sorted: &[OverlapRecord], uf: &mut UnionFind<OverlapBasis>) {
        if self.config.uses(OverlapField::Doi) {
            let mut buckets: BTreeMap<String, Vec<usize>> = BTreeMap::new();
            for (i, r) in sorted.iter().enumerate() {
                if let Some(doi) = &r.doi {
                    buckets.entry(doi.to_lowercase()).or_default().push(i);
                }
            }
            for (doi, members) in buckets {
                union_bucket(uf, &members, 1, OverlapBasis::Doi, || {
                    format!("Exact DOI match: {doi}")
                });
            }
        }

        if self.config.uses(OverlapField::Pmid) {
            let mut buckets: BTreeMap<String, Vec<usize>> = BTreeMap::new();
            for (i, r) in sorted.iter().enumerate() {
                if let Some(pmid) = &r.pmid {
                    buckets.entry(pmid.clone()).or_default().push(i);
                }
            }
            for (pmid, members) in buckets {
                union_bucket(uf, &members, 1, OverlapBasis::Pmid, || {
                    format!("Exact PMID match: {pmid}")
                });
            }
        }
    }

    /// Pass 2: `(title_prefix, year)` buckets; tiers 2–4 per pair.
    fn title_year_pass(&self, sorted: &[OverlapRecord], uf: &mut UnionFind<OverlapBasis>) {
        let require_year = self.config.uses(OverlapField::Year);
        let mut buckets: BTreeMap<(String, Option<i32>), Vec<usize>> = BTreeMap::new();
        for (i, r) in sorted.iter().enumerate() {
            if r.title_prefix.is_empty() {
                continue;
            }
            if let Some(year) = r.year {
                buckets
                    .entry((r.title_prefix.clone(), Some(year)))
                    .or_default()
                    .push(i);
            } else if !require_year {
                // Year-less records may still block on the prefix when the
                // year field is not selected.
                buckets
                    .entry((r.title_prefix.clone(), None))
                    .or_default()
                    .push(i);
            }
        }

        for bucket in buckets.values() {
            if bucket.len() < 2 {
                continue;
            }
            self.match_title_year_block(sorted, bucket, uf);
        }
    }

    fn match_title_year_block(
        &self,
        sorted: &[OverlapRecord],
        bucket: &[usize],
        uf: &mut UnionFind<OverlapBasis>,
    ) {
        let use_year = self.config.uses(OverlapField::Year);
        let use_author = self.config.uses(OverlapField::FirstAuthor);
        let use_volume = self.config.uses(OverlapField::Volume);

        for (pos, &i) in bucket.iter().enumerate() {
            for &j in &bucket[pos + 1..] {
                if uf.find(i) == uf.find(j) {
                    continue;
                }
                let (a, b) = (&sorted[i], &sorted[j]);

                // The prefix matched; now the full titles must agree.
                if a.norm_title.is_empty() || a.norm_title != b.norm_title {
                    continue;
                }
                if use_year && !self.year_match(a.year, b.year) {
                    continue;
                }

                let author_ok = !use_author
                    || (a.first_author.is_some() && a.first_author == b.first_author);
                let volume_ok = !use_volume
                    || a.norm_volume.is_none()
                    || b.norm_volume.is_none()
                    || a.norm_volume == b.norm_volume;

                if author_ok && volume_ok {
                    uf.union(
                        i,
                        j,
                        2,
                        OverlapBasis::TitleYearAuthorVolume,
                        format!(
                            "Same title, year, first author, volume: '{}'",
                            a.norm_title
                        ),
                        None,
                    );
                } else if author_ok {
                    uf.union(
                        i,
                        j,
                        3,
                        OverlapBasis::TitleYearAuthor,
                        format!("Same title, year, first author: '{}'", a.norm_title),
                        None,
                    );
                } else {
                    uf.union(
                        i,
                        j,
                        4,
                        OverlapBasis::TitleYear,
                        format!("Same title and year: '{}'", a.norm_title),
                        None,
                    );
                }
            }
        }
    }

    /// Pass 3: `title_prefix` buckets; tier 5 fuzzy pairs.
    fn fuzzy_pass(&self, sorted: &[OverlapRecord], uf: &mut UnionFind<OverlapBasis>) {
        let mut buckets: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (i, r) in sorted.iter().enumerate() {
            if !r.title_prefix.is_empty() {
                buckets.entry(r.title_prefix.clone()).or_default().push(i);
            }
        }

        for bucket in buckets.values() {
            if bucket.len() < 2 {
                continue;
            }
            for (pos, &i) in bucket.iter().enumerate() {
                for &j in &bucket[pos + 1..] {
                    if uf.find(i) == uf.find(j) {
                        continue;
                    }
                    let (a, b) = (&sorted[i], &sorted[j]);
                    if a.norm_title.is_empty() || b.norm_title.is_empty() {
                        continue;
                    }
                    // The year gate applies only when both sides carry one.
                    if let (Some(ya), Some(yb)) = (a.year, b.year) {
                        if (ya - yb).abs() > self.config.year_tolerance {
                            continue;
                        }
                    }
                    let score = token_set_ratio(&a.norm_title, &b.norm_title);
                    if score < self.config.fuzzy_threshold {
                        continue;
                    }
                    if !a.shares_author_with(b) {
                        continue;
                    }
                    uf.union(
                        i,
                        j,
                        5,
                        OverlapBasis::FuzzyTitleAuthor,
                        format!("Fuzzy title similarity {score:.2}: '{}'", a.norm_title),
                        Some(score),
                    );
                }
            }
        }
    }

    fn year_match(&self, a: Option<i32>, b: Option<i32>) -> bool {
        match (a, b) {
            (Some(a), Some(b)) => (a - b).abs() <= self.config.year_tolerance,
            _ => false,
        }
    }
}

/// Unions all members of a bucket at the given tier.
fn union_bucket(
    uf: &mut UnionFind<OverlapBasis>,
    members: &[usize],
    tier: u8,
    basis: OverlapBasis,
    reason_fn: impl Fn() -> String,
) {
    if members.len() < 2 {
        return;
    }
    let reason = reason_fn();
    let first = members[0];
    for &other in &members[1..] {
        uf.union(first, other, tier, basis, reason.clone(), None);
    }
}

/// Returns the most information-rich record as the canonical representative:
/// has DOI, then has PMID, then has a title, then longest abstract, then the
/// smallest record-source id.
#[must_use]
pub fn select_representative(records: &[OverlapRecord]) -> &OverlapRecord {
    let score = |r: &OverlapRecord| {
        (
            r.doi.is_some(),
            r.pmid.is_some(),
            !r.norm_title.is_empty(),
            r.abstract_len,
        )
    };
    let mut best = &records[0];
    for candidate in &records[1..] {
        // Strictly-greater keeps the smallest id on ties (input is sorted).
        if score(candidate) > score(best)
            || (score(candidate) == score(best)
                && candidate.record_source_id < best.record_source_id)
        {
            best = candidate;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn rec(
        n: u128,
        source: u128,
        doi: Option<&str>,
        title: &str,
        year: Option<i32>,
        authors: Value,
    ) -> OverlapRecord {
        OverlapRecord::build(
            Uuid::from_u128(n),
            Uuid::from_u128(source),
            Some(title),
            doi,
            year,
            &json!({"authors": authors}),
        )
    }

    #[test]
    fn build_extracts_pmid_and_prefix() {
        let r = OverlapRecord::build(
            Uuid::from_u128(1),
            Uuid::from_u128(9),
            Some("A Longish Title For Prefixing"),
            None,
            Some(2020),
            &json!({"pmid": " 123 ", "abstract": "abc", "volume": "Vol. 7"}),
        );
        assert_eq!(r.pmid.as_deref(), Some("123"));
        assert_eq!(r.title_prefix.chars().count(), 15);
        assert_eq!(r.norm_volume.as_deref(), Some("7"));
        assert_eq!(r.abstract_len, 3);
    }

    #[test]
    fn build_falls_back_to_source_record_id_for_pmid() {
        let r = OverlapRecord::build(
            Uuid::from_u128(1),
            Uuid::from_u128(9),
            None,
            None,
            None,
            &json!({"source_record_id": "S2-999", "title": "Some Title"}),
        );
        assert_eq!(r.pmid.as_deref(), Some("S2-999"));
        assert_eq!(r.norm_title, "some title");
    }

    #[test]
    fn fewer_than_two_records_yield_nothing() {
        let detector = OverlapDetector::new(OverlapConfig::default());
        let only = rec(1, 1, None, "alone", Some(2020), json!(["A, B"]));
        assert!(detector.detect(vec![only]).is_empty());
        assert!(detector.detect(Vec::new()).is_empty());
    }

    #[test]
    fn tier1_doi_match() {
        let detector = OverlapDetector::new(OverlapConfig::default());
        let clusters = detector.detect(vec![
            rec(1, 1, Some("10.1/x"), "title one", Some(2020), json!(["A, B"])),
            rec(2, 2, Some("10.1/x"), "different title", Some(2021), json!(["C, D"])),
        ]);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].tier, 1);
        assert_eq!(clusters[0].match_basis, OverlapBasis::Doi);
    }

    #[test]
    fn tier1_pmid_match() {
        let detector = OverlapDetector::new(OverlapConfig::default());
        let a = OverlapRecord::build(
            Uuid::from_u128(1),
            Uuid::from_u128(1),
            Some("one thing"),
            None,
            Some(2020),
            &json!({"pmid": "777"}),
        );
        let b = OverlapRecord::build(
            Uuid::from_u128(2),
            Uuid::from_u128(2),
            Some("another thing"),
            None,
            Some(2021),
            &json!({"pmid": "777"}),
        );
        let clusters = detector.detect(vec![a, b]);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].match_basis, OverlapBasis::Pmid);
    }

    #[test]
    fn tier2_title_year_author_volume() {
        let detector = OverlapDetector::new(OverlapConfig::default());
        let clusters = detector.detect(vec![
            rec(1, 1, None, "caffeine and alertness", Some(2023), json!(["Smith, A"])),
            rec(2, 2, None, "caffeine and alertness", Some(2023), json!(["Smith, A"])),
        ]);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].tier, 2);
        assert_eq!(clusters[0].match_basis, OverlapBasis::TitleYearAuthorVolume);
    }

    #[test]
    fn tier3_when_volumes_differ() {
        let detector = OverlapDetector::new(OverlapConfig::default());
        let a = OverlapRecord::build(
            Uuid::from_u128(1),
            Uuid::from_u128(1),
            Some("caffeine and alertness"),
            None,
            Some(2023),
            &json!({"authors": ["Smith, A"], "volume": "7"}),
        );
        let b = OverlapRecord::build(
            Uuid::from_u128(2),
            Uuid::from_u128(2),
            Some("caffeine and alertness"),
            None,
            Some(2023),
            &json!({"authors": ["Smith, A"], "volume": "8"}),
        );
        let clusters = detector.detect(vec![a, b]);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].tier, 3);
        assert_eq!(clusters[0].match_basis, OverlapBasis::TitleYearAuthor);
    }

    #[test]
    fn tier4_when_authors_differ() {
        let detector = OverlapDetector::new(OverlapConfig::default());
        let clusters = detector.detect(vec![
            rec(1, 1, None, "caffeine and alertness", Some(2023), json!(["Smith, A"])),
            rec(2, 2, None, "caffeine and alertness", Some(2023), json!(["Jones, B"])),
        ]);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].tier, 4);
        assert_eq!(clusters[0].match_basis, OverlapBasis::TitleYear);
    }

    #[test]
    fn different_years_do_not_match_with_zero_tolerance() {
        let detector = OverlapDetector::new(OverlapConfig::default());
        let clusters = detector.detect(vec![
            rec(1, 1, None, "caffeine and alertness", Some(2022), json!(["Smith, A"])),
            rec(2, 2, None, "caffeine and alertness", Some(2023), json!(["Smith, A"])),
        ]);
        assert!(clusters.is_empty());
    }

    #[test]
    fn fuzzy_year_tolerance_boundaries() {
        let mut config = OverlapConfig {
            fuzzy_enabled: true,
            fuzzy_threshold: 0.80,
            ..OverlapConfig::default()
        };
        let near_a = || rec(1, 1, None, "yoga interventions for stress reduction", Some(2020), json!(["Lee, C"]));
        let near_b = || rec(2, 2, None, "yoga interventions for stress outcomes", Some(2021), json!(["Lee, C"]));

        // tolerance 0 rejects a one-year delta
        let detector = OverlapDetector::new(config.clone());
        assert!(detector.detect(vec![near_a(), near_b()]).is_empty());

        // tolerance 1 accepts it at tier 5
        config.year_tolerance = 1;
        let detector = OverlapDetector::new(config);
        let clusters = detector.detect(vec![near_a(), near_b()]);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].tier, 5);
        assert_eq!(clusters[0].match_basis, OverlapBasis::FuzzyTitleAuthor);
        assert!(clusters[0].similarity_score.unwrap() >= 0.80);
    }

    #[test]
    fn fuzzy_requires_shared_surname() {
        let config = OverlapConfig {
            fuzzy_enabled: true,
            fuzzy_threshold: 0.80,
            ..OverlapConfig::default()
        };
        let detector = OverlapDetector::new(config);
        let clusters = detector.detect(vec![
            rec(1, 1, None, "yoga interventions for stress reduction", Some(2020), json!(["Lee, C"])),
            rec(2, 2, None, "yoga interventions for stress outcomes", Some(2020), json!(["Kim, D"])),
        ]);
        assert!(clusters.is_empty());
    }

    #[test]
    fn fuzzy_disabled_by_default() {
        let detector = OverlapDetector::new(OverlapConfig::default());
        let clusters = detector.detect(vec![
            rec(1, 1, None, "yoga interventions for stress reduction", Some(2020), json!(["Lee, C"])),
            rec(2, 2, None, "yoga interventions for stress outcomes", Some(2020), json!(["Lee, C"])),
        ]);
        assert!(clusters.is_empty());
    }

    #[test]
    fn deselected_fields_are_ignored() {
        let config = OverlapConfig {
            selected_fields: vec![OverlapField::Title, OverlapField::Year],
            ..OverlapConfig::default()
        };
        let detector = OverlapDetector::new(config);
        // Same DOI but DOI not selected; titles differ → no cluster.
        let clusters = detector.detect(vec![
            rec(1, 1, Some("10.1/x"), "first title entirely", Some(2020), json!([])),
            rec(2, 2, Some("10.1/x"), "second title entirely", Some(2020), json!([])),
        ]);
        assert!(clusters.is_empty());
    }

    #[test]
    fn exact_id_beats_title_tier() {
        let detector = OverlapDetector::new(OverlapConfig::default());
        let clusters = detector.detect(vec![
            rec(1, 1, Some("10.1/x"), "caffeine and alertness", Some(2023), json!(["Smith, A"])),
            rec(2, 2, Some("10.1/x"), "caffeine and alertness", Some(2023), json!(["Smith, A"])),
        ]);
        assert_eq!(clusters[0].tier, 1);
    }

    #[test]
    fn clusters_sorted_by_smallest_member_id() {
        let detector = OverlapDetector::new(OverlapConfig::default());
        let clusters = detector.detect(vec![
            rec(9, 1, Some("10.2/b"), "bbb title", Some(2020), json!([])),
            rec(10, 2, Some("10.2/b"), "bbb title", Some(2020), json!([])),
            rec(1, 1, Some("10.1/a"), "aaa title", Some(2020), json!([])),
            rec(2, 2, Some("10.1/a"), "aaa title", Some(2020), json!([])),
        ]);
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].records[0].record_source_id, Uuid::from_u128(1));
        assert_eq!(clusters[1].records[0].record_source_id, Uuid::from_u128(9));
    }

    #[test]
    fn representative_ranks_doi_pmid_title_abstract() {
        let plain = rec(1, 1, None, "title", Some(2020), json!([]));
        let with_doi = rec(2, 2, Some("10.1/x"), "title", Some(2020), json!([]));
        let with_abstract = OverlapRecord::build(
            Uuid::from_u128(3),
            Uuid::from_u128(3),
            Some("title"),
            None,
            Some(2020),
            &json!({"abstract": "some text"}),
        );
        let records = vec![plain.clone(), with_doi, with_abstract.clone()];
        assert_eq!(select_representative(&records).record_source_id, Uuid::from_u128(2));

        let records = vec![plain, with_abstract];
        assert_eq!(select_representative(&records).record_source_id, Uuid::from_u128(3));
    }
}
