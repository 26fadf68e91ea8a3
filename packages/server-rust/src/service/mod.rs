//! Orchestration services: import, dedup, and overlap jobs plus manual
//! overlap curation. Each service owns an `Arc` to the persistence gateway
//! and a handle to the shared advisory-lock registry.

pub mod dedup;
pub mod import;
pub mod manual_link;
pub mod overlap;

use std::future::Future;

pub use dedup::DedupService;
pub use import::ImportService;
pub use manual_link::{plan_manual_link, ManualLinkPlan};
pub use overlap::{
    OverlapClusterSummary, OverlapService, OverlapSnapshot, SourceRef, TopIntersection,
    VisualSummary,
};

/// Schedules a job entry point off the caller's request path.
///
/// Entry points passed here never return errors: every failure lands on
/// the job row, so a detached task cannot strand a job in a running state.
pub fn spawn_job<F>(job: F) -> tokio::task::JoinHandle<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(job)
}
