//! Per-marker visibility and pose continuity.
//!
//! Each logical marker remembers whether it was seen in the previous frame
//! and the last pose accepted for it. A marker seen in the previous frame is
//! refined from that pose (continuous solve); any other marker gets a fresh
//! solve.

use std::collections::BTreeMap;

use artrack_core::{ImageAnalyzer, PoseMatrix, PoseSolveError};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::classify::MarkerKey;

/// How a pose was obtained from the analyzer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolveMode {
    Fresh,
    Continuous,
}

/// State kept for one `(kind, id)` marker identity.
#[derive(Clone, Debug, PartialEq)]
pub struct TrackedMarker {
    key: MarkerKey,
    marker_width: f64,
    visible_last_frame: bool,
    visible_this_frame: bool,
    pose: PoseMatrix,
}

impl TrackedMarker {
    fn new(key: MarkerKey, marker_width: f64) -> Self {
        Self {
            key,
            marker_width,
            visible_last_frame: false,
            visible_this_frame: false,
            pose: PoseMatrix::zeros(),
        }
    }

    #[inline]
    pub fn key(&self) -> MarkerKey {
        self.key
    }

    #[inline]
    pub fn marker_width(&self) -> f64 {
        self.marker_width
    }

    #[inline]
    pub fn visible_last_frame(&self) -> bool {
        self.visible_last_frame
    }

    #[inline]
    pub fn visible_this_frame(&self) -> bool {
        self.visible_this_frame
    }

    /// Last accepted pose. All zeros until the first successful solve.
    #[inline]
    pub fn pose(&self) -> &PoseMatrix {
        &self.pose
    }
}

/// Result of a successful tracking update.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ContinuityUpdate {
    pub pose: PoseMatrix,
    pub mode: SolveMode,
}

impl ContinuityUpdate {
    #[inline]
    pub fn used_continuity(&self) -> bool {
        self.mode == SolveMode::Continuous
    }
}

/// Table of tracked markers, at most one entry per [`MarkerKey`].
#[derive(Clone, Debug)]
pub struct MarkerTable {
    markers: BTreeMap<MarkerKey, TrackedMarker>,
    default_width: f64,
    scratch: PoseMatrix,
}

impl MarkerTable {
    pub fn new(default_width: f64) -> Self {
        Self {
            markers: BTreeMap::new(),
            default_width,
            scratch: PoseMatrix::zeros(),
        }
    }

    #[inline]
    pub fn default_width(&self) -> f64 {
        self.default_width
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.markers.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    pub fn get(&self, key: &MarkerKey) -> Option<&TrackedMarker> {
        self.markers.get(key)
    }

    /// Tracked markers in key order (patterns first, then barcodes, by id).
    pub fn iter(&self) -> impl Iterator<Item = &TrackedMarker> {
        self.markers.values()
    }

    /// Look up or create the marker for `key`.
    ///
    /// A positive finite `width` permanently replaces the stored width;
    /// `None` or zero keeps it.
    pub fn track(&mut self, key: MarkerKey, width: Option<f64>) -> &TrackedMarker {
        entry(&mut self.markers, self.default_width, key, width)
    }

    /// Start a new frame: every marker's "this frame" flag becomes its "last
    /// frame" flag and is cleared.
    pub fn roll_visibility(&mut self) {
        for marker in self.markers.values_mut() {
            marker.visible_last_frame = marker.visible_this_frame;
            marker.visible_this_frame = false;
        }
    }

    /// Solve and store the pose of detection `index` for marker `key`.
    ///
    /// On a failed solve the marker keeps its previous pose and stays
    /// not-visible for this frame.
    pub fn update<A: ImageAnalyzer + ?Sized>(
        &mut self,
        analyzer: &mut A,
        index: usize,
        key: MarkerKey,
        width_override: Option<f64>,
    ) -> Result<ContinuityUpdate, PoseSolveError> {
        let marker = entry(&mut self.markers, self.default_width, key, width_override);

        let mode = if marker.visible_last_frame {
            analyzer.solve_pose_continuous(
                index,
                marker.marker_width,
                &marker.pose,
                &mut self.scratch,
            )?;
            SolveMode::Continuous
        } else {
            analyzer.solve_pose(index, marker.marker_width, &mut self.scratch)?;
            SolveMode::Fresh
        };

        marker.pose = self.scratch;
        marker.visible_this_frame = true;
        debug!("{key}: {mode:?} solve for detection {index}");

        Ok(ContinuityUpdate {
            pose: marker.pose,
            mode,
        })
    }
}

fn entry(
    markers: &mut BTreeMap<MarkerKey, TrackedMarker>,
    default_width: f64,
    key: MarkerKey,
    width: Option<f64>,
) -> &mut TrackedMarker {
    let width = match width {
        Some(w) if w.is_finite() && w > 0.0 => Some(w),
        Some(w) if w != 0.0 => {
            warn!("{key}: ignoring invalid marker width {w}");
            None
        }
        _ => None,
    };

    let marker = markers
        .entry(key)
        .or_insert_with(|| TrackedMarker::new(key, width.unwrap_or(default_width)));
    if let Some(w) = width {
        marker.marker_width = w;
    }
    marker
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replay::{ReplayScript, ScriptedAnalyzer, ScriptedDetection, ScriptedFrame, SolveRequest};
    use artrack_core::FrameView;

    fn analyzer(frames: Vec<ScriptedFrame>) -> ScriptedAnalyzer {
        ScriptedAnalyzer::new(ReplayScript {
            frames,
            ..ReplayScript::default()
        })
    }

    fn frame_with(dets: Vec<ScriptedDetection>) -> ScriptedFrame {
        ScriptedFrame {
            detections: dets,
            ..ScriptedFrame::default()
        }
    }

    #[test]
    fn track_creates_once_and_applies_width() {
        let mut table = MarkerTable::new(1.0);
        let key = MarkerKey::pattern(4);
        assert_eq!(table.track(key, None).marker_width(), 1.0);
        assert_eq!(table.track(key, Some(80.0)).marker_width(), 80.0);
        assert_eq!(table.track(key, None).marker_width(), 80.0);
        assert_eq!(table.track(key, Some(0.0)).marker_width(), 80.0);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn invalid_widths_are_ignored() {
        let mut table = MarkerTable::new(2.0);
        let key = MarkerKey::barcode(1);
        assert_eq!(table.track(key, Some(-3.0)).marker_width(), 2.0);
        assert_eq!(table.track(key, Some(f64::NAN)).marker_width(), 2.0);
    }

    #[test]
    fn roll_shifts_every_marker() {
        let mut table = MarkerTable::new(1.0);
        let mut a = analyzer(vec![frame_with(vec![ScriptedDetection::pattern(1)])]);
        a.detect(&FrameView::empty()).unwrap();
        table.track(MarkerKey::pattern(2), None);
        table.update(&mut a, 0, MarkerKey::pattern(1), None).unwrap();

        table.roll_visibility();
        let seen = table.get(&MarkerKey::pattern(1)).unwrap();
        assert!(seen.visible_last_frame());
        assert!(!seen.visible_this_frame());
        let unseen = table.get(&MarkerKey::pattern(2)).unwrap();
        assert!(!unseen.visible_last_frame());

        table.roll_visibility();
        assert!(!table
            .get(&MarkerKey::pattern(1))
            .unwrap()
            .visible_last_frame());
    }

    #[test]
    fn continuity_follows_previous_visibility() {
        let key = MarkerKey::pattern(1);
        let mut a = analyzer(vec![
            frame_with(vec![ScriptedDetection::pattern(1).with_translation(0.0, 0.0, 5.0)]),
            frame_with(vec![ScriptedDetection::pattern(1).with_translation(0.0, 0.0, 6.0)]),
        ]);
        let mut table = MarkerTable::new(1.0);

        a.detect(&FrameView::empty()).unwrap();
        table.roll_visibility();
        let first = table.update(&mut a, 0, key, None).unwrap();
        assert_eq!(first.mode, SolveMode::Fresh);

        a.detect(&FrameView::empty()).unwrap();
        table.roll_visibility();
        let second = table.update(&mut a, 0, key, None).unwrap();
        assert!(second.used_continuity());
        assert_eq!(second.pose[(2, 3)], 6.0);

        match &a.calls()[1].request {
            SolveRequest::Continuous { seed } => assert_eq!(seed[(2, 3)], 5.0),
            other => panic!("expected continuous solve, got {other:?}"),
        }
    }

    #[test]
    fn failed_solve_leaves_marker_untouched() {
        let key = MarkerKey::barcode(3);
        let mut a = analyzer(vec![
            frame_with(vec![ScriptedDetection::barcode(3).with_translation(1.0, 0.0, 0.0)]),
            frame_with(vec![ScriptedDetection::barcode(3).failing(-1)]),
        ]);
        let mut table = MarkerTable::new(1.0);

        a.detect(&FrameView::empty()).unwrap();
        table.roll_visibility();
        table.update(&mut a, 0, key, None).unwrap();

        a.detect(&FrameView::empty()).unwrap();
        table.roll_visibility();
        let err = table.update(&mut a, 0, key, None).unwrap_err();
        assert_eq!(err.status, -1);

        let marker = table.get(&key).unwrap();
        assert!(!marker.visible_this_frame());
        assert_eq!(marker.pose()[(0, 3)], 1.0);
    }

    #[test]
    fn width_override_reaches_the_solver() {
        let mut a = analyzer(vec![frame_with(vec![ScriptedDetection::pattern(0)])]);
        a.detect(&FrameView::empty()).unwrap();
        let mut table = MarkerTable::new(1.0);
        table
            .update(&mut a, 0, MarkerKey::pattern(0), Some(40.0))
            .unwrap();
        assert_eq!(a.calls()[0].marker_width, 40.0);
        assert_eq!(
            table.get(&MarkerKey::pattern(0)).unwrap().marker_width(),
            40.0
        );
    }
}
