//! Manual-link planning.
//!
//! [`plan_manual_link`] is a pure decision function: given the current
//! cross-source cluster membership of the requested record sources, it
//! returns what the orchestrator must do. Keeping it free of persistence
//! makes every linking rule unit-testable in isolation.

use uuid::Uuid;

use crate::model::{ClusterOrigin, MembershipInfo};

/// What to do with a manual-link request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManualLinkPlan {
    /// All records already sit in one cluster; nothing to change.
    Noop { cluster_id: Uuid },
    /// Exactly two unlocked clusters: fold the lexicographically larger id
    /// into the smaller one.
    Merge {
        keep_cluster_id: Uuid,
        delete_cluster_id: Uuid,
        origin: ClusterOrigin,
        locked: bool,
    },
    /// Spawn a fresh manual cluster holding every requested record.
    CreateNew {
        member_ids: Vec<Uuid>,
        origin: ClusterOrigin,
        locked: bool,
    },
    /// Attach the unclustered records to the one existing unlocked cluster.
    AddToExisting {
        cluster_id: Uuid,
        new_member_ids: Vec<Uuid>,
        origin: ClusterOrigin,
        locked: bool,
    },
}

/// Decides the action for a manual-link request. `locked` is the flag the
/// user asked for on the resulting cluster.
#[must_use]
pub fn plan_manual_link(memberships: &[MembershipInfo], locked: bool) -> ManualLinkPlan {
    let all_ids: Vec<Uuid> = memberships.iter().map(|m| m.record_source_id).collect();
    let clustered: Vec<&MembershipInfo> =
        memberships.iter().filter(|m| m.cluster_id.is_some()).collect();
    let unclustered: Vec<&MembershipInfo> =
        memberships.iter().filter(|m| m.cluster_id.is_none()).collect();

    let mut cluster_ids: Vec<Uuid> = clustered.iter().filter_map(|m| m.cluster_id).collect();
    cluster_ids.sort();
    cluster_ids.dedup();

    let create_new = |origin: ClusterOrigin| ManualLinkPlan::CreateNew {
        member_ids: all_ids.clone(),
        origin,
        locked,
    };

    // All in the same cluster already.
    if cluster_ids.len() == 1 && unclustered.is_empty() {
        return ManualLinkPlan::Noop {
            cluster_id: cluster_ids[0],
        };
    }

    // Exactly two clusters, nothing unclustered.
    if cluster_ids.len() == 2 && unclustered.is_empty() {
        let any_locked = clustered.iter().any(|m| m.cluster_locked == Some(true));
        if any_locked {
            return create_new(ClusterOrigin::Manual);
        }
        // Neither locked: keep the lexicographically smaller id.
        return ManualLinkPlan::Merge {
            keep_cluster_id: cluster_ids[0],
            delete_cluster_id: cluster_ids[1],
            origin: ClusterOrigin::Mixed,
            locked,
        };
    }

    // Three or more clusters involved.
    if cluster_ids.len() >= 3 {
        return create_new(ClusterOrigin::Manual);
    }

    // One cluster plus unclustered records.
    if cluster_ids.len() == 1 && !unclustered.is_empty() {
        let existing = clustered[0];
        if existing.cluster_locked == Some(true) {
            return create_new(ClusterOrigin::Manual);
        }
        let origin = match existing.cluster_origin {
            Some(ClusterOrigin::Auto) | None => ClusterOrigin::Mixed,
            Some(other) => other,
        };
        return ManualLinkPlan::AddToExisting {
            cluster_id: existing.cluster_id.expect("clustered member has a cluster id"),
            new_member_ids: unclustered.iter().map(|m| m.record_source_id).collect(),
            origin,
            locked,
        };
    }

    // Everything unclustered (or two clusters plus strays): fresh cluster.
    create_new(ClusterOrigin::Manual)
}
