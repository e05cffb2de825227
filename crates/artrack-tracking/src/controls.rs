//! Renderer-facing marker bindings.
//!
//! A [`MarkerControls`] follows one logical target on a controller's event
//! bus and keeps a `{ visible, matrix }` state a scene graph can read each
//! frame.

use std::cell::{Ref, RefCell};
use std::rc::Rc;

use artrack_core::{AxisConvention, DetectionKind, GlMatrix, ImageAnalyzer, RawDetection};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::classify::MarkerKey;
use crate::controller::{Controller, ParamsError};
use crate::events::{EventBus, EventKind, FrameEvent, ListenerId, ListenerResult};

/// What a control follows.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum ControlTarget {
    Pattern(u32),
    Barcode(u32),
    MultiMarker(usize),
    /// Any square without an identity.
    Unknown,
}

impl ControlTarget {
    fn event_kind(self) -> EventKind {
        match self {
            ControlTarget::MultiMarker(_) => EventKind::GroupPoseReported,
            _ => EventKind::MarkerPoseReported,
        }
    }

    fn marker_key(self) -> Option<MarkerKey> {
        match self {
            ControlTarget::Pattern(id) => Some(MarkerKey::pattern(id)),
            ControlTarget::Barcode(id) => Some(MarkerKey::barcode(id)),
            _ => None,
        }
    }

    fn matches_marker(self, kind: DetectionKind, det: &RawDetection) -> bool {
        match (self, kind) {
            (ControlTarget::Pattern(id), DetectionKind::Pattern) => det.id_patt == id as i32,
            (ControlTarget::Barcode(id), DetectionKind::Barcode) => det.id_matrix == id as i32,
            (ControlTarget::Unknown, DetectionKind::Unknown) => true,
            _ => false,
        }
    }
}

/// Which matrix a control exposes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatrixMode {
    /// Marker pose in camera space, for moving the marker's scene object.
    #[default]
    ModelView,
    /// Inverse of the model view, for moving the camera around a fixed marker.
    CameraTransform,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkerControlsParams {
    pub target: ControlTarget,
    /// Physical marker width registered with the controller.
    pub size: f64,
    pub matrix_mode: MatrixMode,
    pub axis: AxisConvention,
}

impl Default for MarkerControlsParams {
    fn default() -> Self {
        Self {
            target: ControlTarget::Unknown,
            size: 1.0,
            matrix_mode: MatrixMode::ModelView,
            axis: AxisConvention::WebGl,
        }
    }
}

impl MarkerControlsParams {
    pub fn for_target(target: ControlTarget) -> Self {
        Self {
            target,
            ..Self::default()
        }
    }
}

/// State read by the renderer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ControlState {
    pub visible: bool,
    pub matrix: GlMatrix,
    /// Number of frames in which the target was found.
    pub found_count: u64,
}

impl Default for ControlState {
    fn default() -> Self {
        Self {
            visible: false,
            matrix: GlMatrix::identity(),
            found_count: 0,
        }
    }
}

/// A subscription binding one target to a [`ControlState`].
///
/// Dropping the control removes its listener from the bus.
pub struct MarkerControls {
    params: MarkerControlsParams,
    state: Rc<RefCell<ControlState>>,
    bus: EventBus,
    listener: ListenerId,
}

impl MarkerControls {
    /// Subscribe to `controller`'s bus. Pattern and barcode targets also
    /// register `params.size` as their marker width.
    pub fn attach<A: ImageAnalyzer>(
        controller: &mut Controller<A>,
        params: MarkerControlsParams,
    ) -> Result<Self, ParamsError> {
        if let Some(key) = params.target.marker_key() {
            controller.set_marker_width(key, params.size)?;
        }

        let state = Rc::new(RefCell::new(ControlState::default()));
        let bus = controller.bus().clone();
        let sink = state.clone();
        let listener = bus.on(params.target.event_kind(), move |event| {
            on_event(&params, &sink, event)
        });
        debug!("attached controls for {:?}", params.target);

        Ok(Self {
            params,
            state,
            bus,
            listener,
        })
    }

    #[inline]
    pub fn params(&self) -> &MarkerControlsParams {
        &self.params
    }

    pub fn state(&self) -> Ref<'_, ControlState> {
        self.state.borrow()
    }

    pub fn is_visible(&self) -> bool {
        self.state.borrow().visible
    }

    /// Clear visibility ahead of a new frame.
    pub fn mark_invisible(&self) {
        self.state.borrow_mut().visible = false;
    }

    pub(crate) fn restore_visible(&self, visible: bool) {
        self.state.borrow_mut().visible = visible;
    }
}

impl Drop for MarkerControls {
    fn drop(&mut self) {
        self.bus.off(self.params.target.event_kind(), self.listener);
    }
}

fn on_event(
    params: &MarkerControlsParams,
    state: &RefCell<ControlState>,
    event: &FrameEvent<'_>,
) -> ListenerResult {
    let matrix = match (*event, params.target) {
        (
            FrameEvent::MarkerPoseReported {
                kind,
                detection,
                matrix,
                ..
            },
            target,
        ) if target.matches_marker(kind, detection) => matrix,
        (FrameEvent::GroupPoseReported { group_id, matrix }, ControlTarget::MultiMarker(id))
            if group_id == id =>
        {
            matrix
        }
        _ => return Ok(()),
    };

    let model_view = params.axis.remap(matrix);
    let out = match params.matrix_mode {
        MatrixMode::ModelView => model_view,
        MatrixMode::CameraTransform => model_view
            .try_inverse()
            .ok_or_else(|| format!("{:?}: pose is not invertible", params.target))?,
    };

    let mut state = state.borrow_mut();
    state.matrix = out;
    if !state.visible {
        state.found_count += 1;
    }
    state.visible = true;
    Ok(())
}
