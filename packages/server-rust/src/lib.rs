//! `refdedup` server — orchestration, advisory locks, and persistence for
//! bibliographic deduplication and overlap analysis.
//!
//! The clustering itself lives in `refdedup-core`; this crate mediates
//! persistence (through [`storage::PersistenceGateway`]), concurrency (at
//! most one mutation job per project, via [`locks::ProjectLocks`]), and the
//! three background orchestrators in [`service`].

pub mod error;
pub mod locks;
pub mod model;
pub mod service;
pub mod storage;

pub use error::{ServiceError, ServiceResult};
pub use locks::{derive_lock_key, ProjectLockGuard, ProjectLocks};
pub use service::{
    DedupService, ImportService, ManualLinkPlan, OverlapService, OverlapSnapshot, VisualSummary,
};
pub use storage::{MemoryGateway, PersistenceGateway};

#[cfg(test)]
mod tests {
    #[test]
    fn crate_loads() {
        // Empty body: if this test runs, the crate compiles and loads.
    }
}
