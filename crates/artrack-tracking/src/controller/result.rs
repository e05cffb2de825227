use serde::{Deserialize, Serialize};

/// Counters describing one processed frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameSummary {
    /// One-based number of this frame among successfully processed frames.
    pub frame: u64,
    /// Raw squares reported by the analyzer.
    pub marker_count: usize,
    /// Detections classified and solved into the marker table.
    pub tracked: usize,
    /// Detections matched by neither pattern nor matrix decoding.
    pub unclassified: usize,
    /// Classified detections whose pose solve failed.
    pub pose_failures: usize,
    /// Of `tracked`, how many were refined from the previous pose.
    pub continuity_solves: usize,
    pub groups_visible: usize,
}
