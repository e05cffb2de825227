//! JSON replay reports.

use std::cell::RefCell;
use std::error::Error;
use std::rc::Rc;
use std::{fs, path::Path};

use artrack_core::{gl_array, pose_to_row_major, DetectionKind, FrameView, NO_ID};
use log::info;
use serde::{Deserialize, Serialize};

use crate::classify::MarkerKey;
use crate::controller::{Controller, FrameSummary, ParamsError};
use crate::events::{EventKind, FrameEvent};
use crate::replay::{ReplayScript, ScriptedAnalyzer};

#[derive(thiserror::Error, Debug)]
pub enum ReplayIoError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Owned, serializable copy of a [`FrameEvent`]. Matrices are in OpenGL
/// (column-major) element order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EventRecord {
    ControllerReady,
    MarkerCountReported {
        count: usize,
    },
    MarkerPoseReported {
        index: usize,
        kind: DetectionKind,
        /// Identity for `kind`, or `-1` for unknown squares.
        id: i32,
        confidence: f64,
        matrix: [f64; 16],
    },
    GroupPoseReported {
        group_id: usize,
        matrix: [f64; 16],
    },
    GroupSubPoseReported {
        group_id: usize,
        sub_index: usize,
        pattern_id: i32,
        visible: bool,
        matrix: [f64; 16],
    },
    FrameProcessed {
        frame: u64,
        marker_count: usize,
    },
}

impl From<&FrameEvent<'_>> for EventRecord {
    fn from(event: &FrameEvent<'_>) -> Self {
        match *event {
            FrameEvent::ControllerReady => EventRecord::ControllerReady,
            FrameEvent::MarkerCountReported { count } => EventRecord::MarkerCountReported { count },
            FrameEvent::MarkerPoseReported {
                index,
                kind,
                detection,
                matrix,
            } => {
                let (id, confidence) = match kind {
                    DetectionKind::Pattern => (detection.id_patt, detection.cf_patt),
                    DetectionKind::Barcode => (detection.id_matrix, detection.cf_matrix),
                    DetectionKind::Unknown => (NO_ID, detection.cf),
                };
                EventRecord::MarkerPoseReported {
                    index,
                    kind,
                    id,
                    confidence,
                    matrix: gl_array(matrix),
                }
            }
            FrameEvent::GroupPoseReported { group_id, matrix } => EventRecord::GroupPoseReported {
                group_id,
                matrix: gl_array(matrix),
            },
            FrameEvent::GroupSubPoseReported {
                group_id,
                sub_index,
                slot,
                matrix,
            } => EventRecord::GroupSubPoseReported {
                group_id,
                sub_index,
                pattern_id: slot.descriptor.pattern_id,
                visible: slot.is_visible(),
                matrix: gl_array(matrix),
            },
            FrameEvent::FrameProcessed {
                frame,
                marker_count,
            } => EventRecord::FrameProcessed {
                frame,
                marker_count,
            },
        }
    }
}

/// Outcome of one scripted frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrameRecord {
    /// Zero-based position of the frame in the script.
    pub input_frame: usize,
    #[serde(default)]
    pub summary: Option<FrameSummary>,
    #[serde(default)]
    pub error: Option<String>,
    pub events: Vec<EventRecord>,
}

/// Tracking state of one marker at the end of the replay.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MarkerRecord {
    pub key: MarkerKey,
    pub marker_width: f64,
    pub visible: bool,
    /// Row-major 3x4 pose last accepted for the marker.
    pub pose: [f64; 12],
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplayReport {
    #[serde(default)]
    pub script_path: Option<String>,
    pub frames_processed: u64,
    pub frames: Vec<FrameRecord>,
    pub markers: Vec<MarkerRecord>,
}

impl ReplayReport {
    /// Load a report from JSON on disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ReplayIoError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write this report to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ReplayIoError> {
        fs::write(path, self.to_json_string()?)?;
        Ok(())
    }

    pub fn to_json_string(&self) -> Result<String, ReplayIoError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Every recorded event, across frames.
    pub fn events(&self) -> impl Iterator<Item = &EventRecord> {
        self.frames.iter().flat_map(|f| f.events.iter())
    }
}

fn error_chain(err: &dyn Error) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}

/// Run every frame of `script` through a controller and record what was
/// dispatched.
pub fn replay_script(script: ReplayScript) -> Result<ReplayReport, ParamsError> {
    let params = script.params.clone();
    let settings = script.settings;
    let frame_count = script.frames.len();
    let mut controller =
        Controller::new(ScriptedAnalyzer::new(script), params)?.with_settings(settings);

    let recorded = Rc::new(RefCell::new(Vec::new()));
    for kind in EventKind::ALL {
        let sink = recorded.clone();
        controller.bus().on(kind, move |event| {
            sink.borrow_mut().push(EventRecord::from(event));
            Ok(())
        });
    }

    let mut frames = Vec::with_capacity(frame_count);
    for input_frame in 0..frame_count {
        let result = controller.process(&FrameView::empty());
        let events = recorded.take();
        let (summary, error) = match result {
            Ok(summary) => (Some(summary), None),
            Err(err) => (err.summary().copied(), Some(error_chain(&err))),
        };
        frames.push(FrameRecord {
            input_frame,
            summary,
            error,
            events,
        });
    }

    let markers = controller
        .markers()
        .iter()
        .map(|m| MarkerRecord {
            key: m.key(),
            marker_width: m.marker_width(),
            visible: m.visible_this_frame(),
            pose: pose_to_row_major(m.pose()),
        })
        .collect();

    info!(
        "replayed {frame_count} frames, {} processed",
        controller.frames_processed()
    );
    Ok(ReplayReport {
        script_path: None,
        frames_processed: controller.frames_processed(),
        frames,
        markers,
    })
}
