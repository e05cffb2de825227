//! Interface to the external image analyzer.
//!
//! The analyzer owns binarization, labelling, pattern/matrix matching and
//! raw pose solving. Tracking code only sees its results: a per-frame list of
//! [`RawDetection`]s, 3x4 poses written into caller-owned buffers, and the
//! state of registered multi-marker groups.

use serde::{Deserialize, Serialize};

use crate::{FrameError, FrameView, PoseMatrix, RawDetection};

/// Errors reported by an analyzer outside of pose solving.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum AnalyzerError {
    #[error("image not available: {reason}")]
    Acquisition { reason: String },

    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error("detection index {index} out of range ({count} detections)")]
    DetectionOutOfRange { index: usize, count: usize },

    #[error("unknown multi-marker group {group_id}")]
    UnknownGroup { group_id: usize },

    #[error("multi-marker group {group_id} has no slot {slot}")]
    UnknownSlot { group_id: usize, slot: usize },
}

impl AnalyzerError {
    /// True when the frame could not be ingested at all.
    pub fn is_acquisition(&self) -> bool {
        matches!(
            self,
            AnalyzerError::Acquisition { .. } | AnalyzerError::Frame(_)
        )
    }
}

/// Negative status returned by a pose solve.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("pose solve failed for detection {index} (status {status})")]
pub struct PoseSolveError {
    pub index: usize,
    pub status: i32,
}

/// Template matching mode of the analyzer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMode {
    Color,
    #[default]
    ColorAndMatrix,
    Mono,
    MonoAndMatrix,
}

impl DetectionMode {
    /// Whether matrix codes are decoded in this mode.
    pub fn decodes_matrix(self) -> bool {
        matches!(
            self,
            DetectionMode::ColorAndMatrix | DetectionMode::MonoAndMatrix
        )
    }
}

/// Matrix code family decoded in matrix modes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatrixCodeType {
    #[default]
    #[serde(rename = "3x3")]
    Code3x3,
    #[serde(rename = "3x3_HAMMING63")]
    Code3x3Hamming63,
    #[serde(rename = "3x3_PARITY65")]
    Code3x3Parity65,
    #[serde(rename = "4x4")]
    Code4x4,
    #[serde(rename = "4x4_BCH_13_9_3")]
    Code4x4Bch1393,
    #[serde(rename = "4x4_BCH_13_5_5")]
    Code4x4Bch1355,
}

/// Settings handed to the analyzer once, when the controller initializes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerSettings {
    pub detection_mode: DetectionMode,
    pub matrix_code_type: MatrixCodeType,
}

/// How a multi-marker slot is identified.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotPattern {
    #[default]
    Template,
    Matrix,
}

/// Static description of one slot of a multi-marker group.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlotDescriptor {
    pub pattern_id: i32,
    pub pattern: SlotPattern,
    /// Physical width of the slot's marker.
    pub width: f64,
}

impl Default for SlotDescriptor {
    fn default() -> Self {
        Self {
            pattern_id: crate::NO_ID,
            pattern: SlotPattern::Template,
            width: 1.0,
        }
    }
}

/// Per-frame state of one multi-marker slot.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GroupSlot {
    pub descriptor: SlotDescriptor,
    /// Non-negative when the slot's marker was seen in the current frame.
    pub visible: i32,
    /// Pose of the slot relative to the group origin.
    pub local_pose: PoseMatrix,
}

impl GroupSlot {
    #[inline]
    pub fn is_visible(&self) -> bool {
        self.visible >= 0
    }
}

/// Per-frame access to an image analyzer.
///
/// Detections are valid from one successful [`detect`](Self::detect) call to
/// the next. Poses are written into caller-supplied buffers, so the analyzer
/// never aliases memory handed to observers.
pub trait ImageAnalyzer {
    /// Apply detection settings. Analyzers without tunables can ignore this.
    fn configure(&mut self, _settings: &AnalyzerSettings) {}

    /// Ingest a frame and return the number of detected squares.
    fn detect(&mut self, frame: &FrameView<'_>) -> Result<usize, AnalyzerError>;

    /// Detection `index` of the last ingested frame.
    fn detection(&self, index: usize) -> Result<RawDetection, AnalyzerError>;

    /// Overwrite the direction of a detection before pose solving.
    fn set_detection_dir(&mut self, index: usize, dir: i32) -> Result<(), AnalyzerError>;

    /// Solve the pose of detection `index` without prior.
    fn solve_pose(
        &mut self,
        index: usize,
        marker_width: f64,
        out: &mut PoseMatrix,
    ) -> Result<(), PoseSolveError>;

    /// Refine the pose of detection `index` starting from `seed`.
    fn solve_pose_continuous(
        &mut self,
        index: usize,
        marker_width: f64,
        seed: &PoseMatrix,
        out: &mut PoseMatrix,
    ) -> Result<(), PoseSolveError>;

    /// Number of loaded multi-marker groups. Group ids are `0..group_count()`.
    fn group_count(&self) -> usize;

    fn group_slot_count(&self, group_id: usize) -> Result<usize, AnalyzerError>;

    /// Aggregate pose of a group for the last ingested frame.
    fn group_pose(&mut self, group_id: usize, out: &mut PoseMatrix) -> Result<(), AnalyzerError>;

    fn group_slot(&self, group_id: usize, slot: usize) -> Result<GroupSlot, AnalyzerError>;
}

impl<A: ImageAnalyzer + ?Sized> ImageAnalyzer for &mut A {
    fn configure(&mut self, settings: &AnalyzerSettings) {
        (**self).configure(settings)
    }

    fn detect(&mut self, frame: &FrameView<'_>) -> Result<usize, AnalyzerError> {
        (**self).detect(frame)
    }

    fn detection(&self, index: usize) -> Result<RawDetection, AnalyzerError> {
        (**self).detection(index)
    }

    fn set_detection_dir(&mut self, index: usize, dir: i32) -> Result<(), AnalyzerError> {
        (**self).set_detection_dir(index, dir)
    }

    fn solve_pose(
        &mut self,
        index: usize,
        marker_width: f64,
        out: &mut PoseMatrix,
    ) -> Result<(), PoseSolveError> {
        (**self).solve_pose(index, marker_width, out)
    }

    fn solve_pose_continuous(
        &mut self,
        index: usize,
        marker_width: f64,
        seed: &PoseMatrix,
        out: &mut PoseMatrix,
    ) -> Result<(), PoseSolveError> {
        (**self).solve_pose_continuous(index, marker_width, seed, out)
    }

    fn group_count(&self) -> usize {
        (**self).group_count()
    }

    fn group_slot_count(&self, group_id: usize) -> Result<usize, AnalyzerError> {
        (**self).group_slot_count(group_id)
    }

    fn group_pose(&mut self, group_id: usize, out: &mut PoseMatrix) -> Result<(), AnalyzerError> {
        (**self).group_pose(group_id, out)
    }

    fn group_slot(&self, group_id: usize, slot: usize) -> Result<GroupSlot, AnalyzerError> {
        (**self).group_slot(group_id, slot)
    }
}
