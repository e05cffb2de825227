//! Scripted analyzer for replaying recorded detector output.
//!
//! A [`ReplayScript`] lists, frame by frame, what an image analyzer reported:
//! raw detections, their solved poses and the state of multi-marker groups.
//! [`ScriptedAnalyzer`] plays it back through the [`ImageAnalyzer`] trait and
//! records every pose solve it is asked for.

use std::{fs, path::Path};

use artrack_core::{
    pose_from_row_major, AnalyzerError, AnalyzerSettings, FrameView, GroupSlot, ImageAnalyzer,
    PoseMatrix, PoseSolveError, RawDetection, SlotDescriptor, SlotPattern, NO_ID,
};
use log::trace;
use serde::{Deserialize, Serialize};

use crate::controller::ControllerParams;
use crate::io::ReplayIoError;

const IDENTITY_ROW_MAJOR: [f64; 12] = [1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0];

fn identity_pose() -> [f64; 12] {
    IDENTITY_ROW_MAJOR
}

/// A recorded session: controller configuration, group layouts and frames.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayScript {
    pub params: ControllerParams,
    pub settings: AnalyzerSettings,
    pub groups: Vec<ScriptedGroup>,
    pub frames: Vec<ScriptedFrame>,
}

impl ReplayScript {
    pub fn from_json_str(raw: &str) -> Result<Self, ReplayIoError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Load a JSON script from disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ReplayIoError> {
        let raw = fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Write this script to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ReplayIoError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

/// What the analyzer reported for one frame.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptedFrame {
    pub detections: Vec<ScriptedDetection>,
    /// When set, `detect` fails with this reason and nothing else is reported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acquisition_failure: Option<String>,
    pub groups: Vec<ScriptedGroupFrame>,
}

impl ScriptedFrame {
    pub fn with_detections(detections: Vec<ScriptedDetection>) -> Self {
        Self {
            detections,
            ..Self::default()
        }
    }

    pub fn acquisition_failure(reason: impl Into<String>) -> Self {
        Self {
            acquisition_failure: Some(reason.into()),
            ..Self::default()
        }
    }
}

/// One detection together with the pose the analyzer solves for it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptedDetection {
    pub detection: RawDetection,
    /// Row-major 3x4 pose returned by both solve variants.
    pub pose: [f64; 12],
    /// Negative values make every solve of this detection fail.
    pub status: i32,
}

impl Default for ScriptedDetection {
    fn default() -> Self {
        Self {
            detection: RawDetection::default(),
            pose: identity_pose(),
            status: 0,
        }
    }
}

impl ScriptedDetection {
    /// A detection matched only by the pattern matcher.
    pub fn pattern(id: i32) -> Self {
        Self {
            detection: RawDetection {
                id,
                id_patt: id,
                cf: 1.0,
                cf_patt: 1.0,
                ..RawDetection::default()
            },
            ..Self::default()
        }
    }

    /// A detection matched only by the matrix decoder.
    pub fn barcode(id: i32) -> Self {
        Self {
            detection: RawDetection {
                id,
                id_matrix: id,
                cf: 1.0,
                cf_matrix: 1.0,
                ..RawDetection::default()
            },
            ..Self::default()
        }
    }

    /// A square with no identity.
    pub fn unknown() -> Self {
        Self::default()
    }

    pub fn with_detection(mut self, detection: RawDetection) -> Self {
        self.detection = detection;
        self
    }

    pub fn with_translation(mut self, x: f64, y: f64, z: f64) -> Self {
        self.pose[3] = x;
        self.pose[7] = y;
        self.pose[11] = z;
        self
    }

    pub fn with_pose(mut self, pose: [f64; 12]) -> Self {
        self.pose = pose;
        self
    }

    pub fn failing(mut self, status: i32) -> Self {
        self.status = status;
        self
    }
}

/// Layout of one multi-marker group.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptedGroup {
    pub slots: Vec<ScriptedSlot>,
}

impl ScriptedGroup {
    /// Template slots with the given pattern ids and identity local poses.
    pub fn with_patterns(pattern_ids: &[i32]) -> Self {
        let slots = pattern_ids
            .iter()
            .map(|&pattern_id| ScriptedSlot {
                descriptor: SlotDescriptor {
                    pattern_id,
                    pattern: SlotPattern::Template,
                    width: 1.0,
                },
                ..ScriptedSlot::default()
            })
            .collect();
        Self { slots }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptedSlot {
    pub descriptor: SlotDescriptor,
    /// Row-major pose of the slot relative to the group origin.
    pub local_pose: [f64; 12],
}

impl Default for ScriptedSlot {
    fn default() -> Self {
        Self {
            descriptor: SlotDescriptor::default(),
            local_pose: identity_pose(),
        }
    }
}

/// State of one group in one frame. Slots without an entry in `visible`
/// are not visible.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptedGroupFrame {
    pub group_id: usize,
    pub pose: [f64; 12],
    pub visible: Vec<i32>,
}

impl Default for ScriptedGroupFrame {
    fn default() -> Self {
        Self {
            group_id: 0,
            pose: identity_pose(),
            visible: Vec::new(),
        }
    }
}

/// Kind of pose solve requested from the analyzer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SolveRequest {
    Fresh,
    Continuous { seed: PoseMatrix },
}

/// One recorded pose solve.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SolveCall {
    /// Zero-based position of the frame in the script.
    pub frame: usize,
    pub index: usize,
    pub marker_width: f64,
    pub request: SolveRequest,
}

/// [`ImageAnalyzer`] that plays back a [`ReplayScript`].
///
/// Frame contents are ignored: each `detect` call consumes the next scripted
/// frame. Once the script is exhausted `detect` reports an acquisition
/// failure.
#[derive(Clone, Debug)]
pub struct ScriptedAnalyzer {
    groups: Vec<ScriptedGroup>,
    frames: Vec<ScriptedFrame>,
    cursor: usize,
    current: Option<usize>,
    detections: Vec<ScriptedDetection>,
    calls: Vec<SolveCall>,
    settings: Option<AnalyzerSettings>,
}

impl ScriptedAnalyzer {
    pub fn new(script: ReplayScript) -> Self {
        Self {
            groups: script.groups,
            frames: script.frames,
            cursor: 0,
            current: None,
            detections: Vec::new(),
            calls: Vec::new(),
            settings: None,
        }
    }

    /// Pose solves requested so far, in call order.
    pub fn calls(&self) -> &[SolveCall] {
        &self.calls
    }

    pub fn take_calls(&mut self) -> Vec<SolveCall> {
        std::mem::take(&mut self.calls)
    }

    pub fn frames_remaining(&self) -> usize {
        self.frames.len() - self.cursor
    }

    /// Settings passed to the last `configure` call, if any.
    pub fn configured_settings(&self) -> Option<&AnalyzerSettings> {
        self.settings.as_ref()
    }

    fn scripted(&self, index: usize) -> Result<&ScriptedDetection, AnalyzerError> {
        self.detections
            .get(index)
            .ok_or(AnalyzerError::DetectionOutOfRange {
                index,
                count: self.detections.len(),
            })
    }

    fn group(&self, group_id: usize) -> Result<&ScriptedGroup, AnalyzerError> {
        self.groups
            .get(group_id)
            .ok_or(AnalyzerError::UnknownGroup { group_id })
    }

    fn group_frame(&self, group_id: usize) -> Option<&ScriptedGroupFrame> {
        let frame = &self.frames[self.current?];
        frame.groups.iter().find(|g| g.group_id == group_id)
    }

    fn solve(
        &mut self,
        index: usize,
        marker_width: f64,
        request: SolveRequest,
        out: &mut PoseMatrix,
    ) -> Result<(), PoseSolveError> {
        self.calls.push(SolveCall {
            frame: self.current.unwrap_or(0),
            index,
            marker_width,
            request,
        });
        let det = self
            .detections
            .get(index)
            .ok_or(PoseSolveError { index, status: -1 })?;
        if det.status < 0 {
            return Err(PoseSolveError {
                index,
                status: det.status,
            });
        }
        *out = pose_from_row_major(&det.pose);
        Ok(())
    }
}

impl ImageAnalyzer for ScriptedAnalyzer {
    fn configure(&mut self, settings: &AnalyzerSettings) {
        self.settings = Some(*settings);
    }

    fn detect(&mut self, _frame: &FrameView<'_>) -> Result<usize, AnalyzerError> {
        self.current = None;
        self.detections.clear();

        let Some(frame) = self.frames.get(self.cursor) else {
            return Err(AnalyzerError::Acquisition {
                reason: "script exhausted".to_string(),
            });
        };
        let position = self.cursor;
        self.cursor += 1;

        if let Some(reason) = &frame.acquisition_failure {
            return Err(AnalyzerError::Acquisition {
                reason: reason.clone(),
            });
        }

        // A pattern-only mode never reports matrix codes.
        let decodes_matrix = self
            .settings
            .is_none_or(|settings| settings.detection_mode.decodes_matrix());
        self.detections
            .extend(frame.detections.iter().cloned().map(|mut scripted| {
                if !decodes_matrix {
                    scripted.detection.id_matrix = NO_ID;
                }
                scripted
            }));
        self.current = Some(position);
        trace!(
            "replay frame {position}: {} detections",
            self.detections.len()
        );
        Ok(self.detections.len())
    }

    fn detection(&self, index: usize) -> Result<RawDetection, AnalyzerError> {
        self.scripted(index).map(|d| d.detection)
    }

    fn set_detection_dir(&mut self, index: usize, dir: i32) -> Result<(), AnalyzerError> {
        let count = self.detections.len();
        let det = self
            .detections
            .get_mut(index)
            .ok_or(AnalyzerError::DetectionOutOfRange { index, count })?;
        det.detection.dir = dir;
        Ok(())
    }

    fn solve_pose(
        &mut self,
        index: usize,
        marker_width: f64,
        out: &mut PoseMatrix,
    ) -> Result<(), PoseSolveError> {
        self.solve(index, marker_width, SolveRequest::Fresh, out)
    }

    fn solve_pose_continuous(
        &mut self,
        index: usize,
        marker_width: f64,
        seed: &PoseMatrix,
        out: &mut PoseMatrix,
    ) -> Result<(), PoseSolveError> {
        self.solve(
            index,
            marker_width,
            SolveRequest::Continuous { seed: *seed },
            out,
        )
    }

    fn group_count(&self) -> usize {
        self.groups.len()
    }

    fn group_slot_count(&self, group_id: usize) -> Result<usize, AnalyzerError> {
        self.group(group_id).map(|g| g.slots.len())
    }

    fn group_pose(&mut self, group_id: usize, out: &mut PoseMatrix) -> Result<(), AnalyzerError> {
        self.group(group_id)?;
        if let Some(state) = self.group_frame(group_id) {
            *out = pose_from_row_major(&state.pose);
        }
        Ok(())
    }

    fn group_slot(&self, group_id: usize, slot: usize) -> Result<GroupSlot, AnalyzerError> {
        let scripted = self
            .group(group_id)?
            .slots
            .get(slot)
            .ok_or(AnalyzerError::UnknownSlot { group_id, slot })?;
        let visible = self
            .group_frame(group_id)
            .and_then(|state| state.visible.get(slot).copied())
            .unwrap_or(-1);
        Ok(GroupSlot {
            descriptor: scripted.descriptor,
            visible,
            local_pose: pose_from_row_major(&scripted.local_pose),
        })
    }
}
