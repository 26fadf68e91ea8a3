//! Overlap detection subsystem: its own normalization layer, the 5-tier
//! blocking detector, and the pure visual-summary math.

pub mod detector;
pub mod fields;
pub mod summary;

pub use detector::{
    select_representative, DetectedCluster, OverlapBasis, OverlapConfig, OverlapDetector,
    OverlapField, OverlapRecord,
};
pub use summary::{compute_overlap_matrix, compute_top_intersections, SourceIntersection};
