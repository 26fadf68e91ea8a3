//! Per-project advisory locks.
//!
//! Single-writer-per-project is enforced with a non-blocking try-acquire
//! over a process-wide registry keyed by the low 63 bits of the project
//! UUID (masked positive so the key fits a signed 64-bit integer, the
//! shape a SQL advisory-lock backend expects). The registry is independent
//! of any gateway transaction: commits and rollbacks inside the critical
//! section never touch the lock, and the guard releases it on drop even
//! when the job errors out.

use std::sync::Arc;

use dashmap::DashMap;
use uuid::Uuid;

/// Stable signed-64-bit lock key for a project.
#[must_use]
pub fn derive_lock_key(project_id: Uuid) -> i64 {
    #[allow(clippy::cast_possible_truncation)]
    let key = (project_id.as_u128() & 0x7FFF_FFFF_FFFF_FFFF) as i64;
    key
}

/// Process-wide advisory lock registry. Cheap to clone; clones share state.
#[derive(Debug, Clone, Default)]
pub struct ProjectLocks {
    held: Arc<DashMap<i64, Uuid>>,
}

impl ProjectLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Non-blocking acquire. Returns `None` immediately when any other
    /// holder exists; otherwise a guard that releases on drop.
    #[must_use]
    pub fn try_acquire(&self, project_id: Uuid) -> Option<ProjectLockGuard> {
        let key = derive_lock_key(project_id);
        match self.held.entry(key) {
            dashmap::mapref::entry::Entry::Occupied(_) => None,
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(project_id);
                Some(ProjectLockGuard {
                    held: Arc::clone(&self.held),
                    key,
                })
            }
        }
    }

    /// Whether any holder currently owns the project's lock.
    #[must_use]
    pub fn is_locked(&self, project_id: Uuid) -> bool {
        self.held.contains_key(&derive_lock_key(project_id))
    }
}

/// Scope guard for a held project lock. Dropping it releases the lock.
#[derive(Debug)]
pub struct ProjectLockGuard {
    held: Arc<DashMap<i64, Uuid>>,
    key: i64,
}

impl Drop for ProjectLockGuard {
    fn drop(&mut self) {
        self.held.remove(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn lock_key_is_positive_and_stable() {
        let id = Uuid::new_v4();
        let key = derive_lock_key(id);
        assert!(key >= 0);
        assert_eq!(key, derive_lock_key(id));
    }

    proptest! {
        /// The masked key fits a signed 64-bit integer for any UUID.
        #[test]
        fn lock_key_always_non_negative(raw in any::<u128>()) {
            prop_assert!(derive_lock_key(Uuid::from_u128(raw)) >= 0);
        }
    }

    #[test]
    fn second_acquire_fails_until_release() {
        let locks = ProjectLocks::new();
        let project = Uuid::new_v4();

        let guard = locks.try_acquire(project).expect("first acquire");
        assert!(locks.try_acquire(project).is_none());
        assert!(locks.is_locked(project));

        drop(guard);
        assert!(!locks.is_locked(project));
        assert!(locks.try_acquire(project).is_some());
    }

    #[test]
    fn distinct_projects_lock_independently() {
        let locks = ProjectLocks::new();
        let a = Uuid::from_u128(1);
        let b = Uuid::from_u128(2);
        let _ga = locks.try_acquire(a).expect("a");
        let _gb = locks.try_acquire(b).expect("b");
        assert!(locks.is_locked(a));
        assert!(locks.is_locked(b));
    }

    #[test]
    fn clones_share_the_registry() {
        let locks = ProjectLocks::new();
        let clone = locks.clone();
        let project = Uuid::new_v4();
        let _guard = locks.try_acquire(project).expect("acquire");
        assert!(clone.try_acquire(project).is_none());
    }
}
