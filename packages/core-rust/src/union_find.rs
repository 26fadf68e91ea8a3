//! Disjoint-set over a compact index arena, with per-root match evidence.
//!
//! Both cluster engines assign each input record a dense index (sorted id
//! order → `0..n`) and run all passes against parallel `parent`/`rank`
//! buffers. Each root additionally carries the evidence that formed its
//! cluster; on union the root keeps the *most specific* (numerically
//! lowest) tier seen so far, so a cluster always reports its strongest
//! match, not the last one discovered.

/// Evidence recorded on a cluster root: which tier united it, on what
/// basis, and a human-readable reason. `score` is set by fuzzy passes only.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchEvidence<B> {
    pub tier: u8,
    pub basis: B,
    pub reason: String,
    pub score: Option<f64>,
}

/// Path-compressed, rank-based Union-Find over indices `0..n`.
#[derive(Debug)]
pub struct UnionFind<B> {
    parent: Vec<usize>,
    rank: Vec<u32>,
    evidence: Vec<Option<MatchEvidence<B>>>,
}

impl<B: Clone> UnionFind<B> {
    /// Creates `n` singleton sets with no evidence.
    #[must_use]
    pub fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n],
            evidence: vec![None; n],
        }
    }

    /// Returns the root of `x`, halving paths along the way.
    pub fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    /// Unites the sets containing `a` and `b`, recording the evidence on the
    /// surviving root. Returns `true` if a merge occurred (`false` when the
    /// two were already in the same set).
    pub fn union(
        &mut self,
        a: usize,
        b: usize,
        tier: u8,
        basis: B,
        reason: impl Into<String>,
        score: Option<f64>,
    ) -> bool {
        let mut ra = self.find(a);
        let mut rb = self.find(b);
        if ra == rb {
            return false;
        }

        if self.rank[ra] < self.rank[rb] {
            std::mem::swap(&mut ra, &mut rb);
        }
        self.parent[rb] = ra;
        if self.rank[ra] == self.rank[rb] {
            self.rank[ra] += 1;
        }

        // Merge evidence from the absorbed root, then keep the lowest tier.
        let incoming = MatchEvidence {
            tier,
            basis,
            reason: reason.into(),
            score,
        };
        let absorbed = self.evidence[rb].take();
        for candidate in [absorbed, Some(incoming)].into_iter().flatten() {
            match &self.evidence[ra] {
                Some(existing) if existing.tier <= candidate.tier => {}
                _ => self.evidence[ra] = Some(candidate),
            }
        }
        true
    }

    /// Returns the evidence recorded for a root, if any union touched it.
    #[must_use]
    pub fn tier_info(&self, root: usize) -> Option<&MatchEvidence<B>> {
        self.evidence[root].as_ref()
    }

    /// Returns `(root, members)` pairs, roots ascending, members ascending.
    pub fn groups(&mut self) -> Vec<(usize, Vec<usize>)> {
        let n = self.parent.len();
        let mut by_root: Vec<Vec<usize>> = vec![Vec::new(); n];
        for x in 0..n {
            let root = self.find(x);
            by_root[root].push(x);
        }
        by_root
            .into_iter()
            .enumerate()
            .filter(|(_, members)| !members.is_empty())
            .collect()
    }
}
