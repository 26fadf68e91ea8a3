//! Pure visual-summary math over persisted cluster membership sets.
//!
//! Everything here is derived data: the inputs are the distinct source-id
//! sets of each cross-source cluster, and the outputs feed the overlap
//! summary view. No persistence access.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use uuid::Uuid;

/// A group of sources that co-occur in cross-source clusters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceIntersection {
    /// Distinct sources in the combination, ascending.
    pub source_ids: Vec<Uuid>,
    /// Number of cross-source clusters containing exactly this combination.
    pub count: usize,
}

/// Builds the symmetric N×N overlap matrix.
///
/// Cell `[i][j]` counts the cross-source clusters whose member sources
/// include both `source_ids[i]` and `source_ids[j]`. The diagonal is always
/// zero; unique counts are tracked separately by the caller.
#[must_use]
pub fn compute_overlap_matrix(
    source_ids: &[Uuid],
    cluster_source_sets: &[Vec<Uuid>],
) -> Vec<Vec<usize>> {
    let n = source_ids.len();
    let index: BTreeMap<Uuid, usize> = source_ids
        .iter()
        .enumerate()
        .map(|(i, id)| (*id, i))
        .collect();

    let mut matrix = vec![vec![0usize; n]; n];
    for sources in cluster_source_sets {
        let present: BTreeSet<usize> = sources
            .iter()
            .filter_map(|sid| index.get(sid).copied())
            .collect();
        let present: Vec<usize> = present.into_iter().collect();
        for (pos, &a) in present.iter().enumerate() {
            for &b in &present[pos + 1..] {
                matrix[a][b] += 1;
                matrix[b][a] += 1;
            }
        }
    }
    matrix
}

/// Returns up to `top_n` source combinations sorted by descending cluster
/// count. Only combinations of two or more distinct sources count; ties
/// break on the combination itself for determinism.
#[must_use]
pub fn compute_top_intersections(
    cluster_source_sets: &[Vec<Uuid>],
    top_n: usize,
) -> Vec<SourceIntersection> {
    let mut counts: BTreeMap<BTreeSet<Uuid>, usize> = BTreeMap::new();
    for sources in cluster_source_sets {
        let key: BTreeSet<Uuid> = sources.iter().copied().collect();
        if key.len() >= 2 {
            *counts.entry(key).or_insert(0) += 1;
        }
    }

    let mut combos: Vec<(BTreeSet<Uuid>, usize)> = counts.into_iter().collect();
    combos.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    combos
        .into_iter()
        .take(top_n)
        .map(|(key, count)| SourceIntersection {
            source_ids: key.into_iter().collect(),
            count,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn sid(n: u128) -> Uuid {
        Uuid::from_u128(n)
    }

    #[test]
    fn matrix_counts_shared_clusters() {
        let sources = vec![sid(1), sid(2), sid(3)];
        let sets = vec![
            vec![sid(1), sid(2)],
            vec![sid(1), sid(2)],
            vec![sid(2), sid(3)],
            vec![sid(1), sid(2), sid(3)],
        ];
        let m = compute_overlap_matrix(&sources, &sets);
        assert_eq!(m[0][1], 3);
        assert_eq!(m[1][2], 2);
        assert_eq!(m[0][2], 1);
    }

    #[test]
    fn matrix_ignores_unknown_sources_and_duplicate_entries() {
        let sources = vec![sid(1), sid(2)];
        let sets = vec![vec![sid(1), sid(1), sid(2), sid(99)]];
        let m = compute_overlap_matrix(&sources, &sets);
        assert_eq!(m[0][1], 1);
        assert_eq!(m[1][0], 1);
    }

    #[test]
    fn empty_inputs_produce_zero_matrix() {
        let sources = vec![sid(1), sid(2)];
        let m = compute_overlap_matrix(&sources, &[]);
        assert_eq!(m, vec![vec![0, 0], vec![0, 0]]);
        assert!(compute_overlap_matrix(&[], &[]).is_empty());
    }

    #[test]
    fn top_intersections_sorted_by_count() {
        let sets = vec![
            vec![sid(1), sid(2)],
            vec![sid(1), sid(2)],
            vec![sid(2), sid(3)],
            vec![sid(4)], // singleton combination is ignored
        ];
        let top = compute_top_intersections(&sets, 10);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].source_ids, vec![sid(1), sid(2)]);
        assert_eq!(top[0].count, 2);
        assert_eq!(top[1].count, 1);
    }

    #[test]
    fn top_intersections_respects_top_n() {
        let sets = vec![
            vec![sid(1), sid(2)],
            vec![sid(2), sid(3)],
            vec![sid(3), sid(4)],
        ];
        assert_eq!(compute_top_intersections(&sets, 2).len(), 2);
    }

    proptest! {
        /// The matrix is symmetric with a zero diagonal, whatever the input.
        #[test]
        fn matrix_symmetric_zero_diagonal(
            n in 1usize..6,
            sets in proptest::collection::vec(
                proptest::collection::vec(0u128..6, 0..4),
                0..8,
            ),
        ) {
            let sources: Vec<Uuid> = (0..n as u128).map(sid).collect();
            let sets: Vec<Vec<Uuid>> = sets
                .into_iter()
                .map(|s| s.into_iter().map(sid).collect())
                .collect();
            let m = compute_overlap_matrix(&sources, &sets);
            for i in 0..n {
                prop_assert_eq!(m[i][i], 0);
                for j in 0..n {
                    prop_assert_eq!(m[i][j], m[j][i]);
                }
            }
        }
    }
}
