//! High-level facade crate for the `artrack-*` workspace.
//!
//! This crate provides:
//! - stable, convenient re-exports of the underlying crates,
//! - (feature `cli`) the `artrack` binary, which replays a JSON detection
//!   script through a controller and writes every dispatched event to a
//!   report.
//!
//! ## Quickstart
//!
//! ```no_run
//! use artrack::core::FrameView;
//! use artrack::tracking::replay::{ReplayScript, ScriptedAnalyzer};
//! use artrack::tracking::{Controller, EventKind, FrameEvent};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let script = ReplayScript::load_json("session.json")?;
//! let params = script.params.clone();
//! let mut controller = Controller::new(ScriptedAnalyzer::new(script), params)?;
//!
//! controller.bus().on(EventKind::MarkerPoseReported, |event| {
//!     if let FrameEvent::MarkerPoseReported { kind, matrix, .. } = event {
//!         println!("{kind:?}: translation {:?}", &matrix.as_slice()[12..15]);
//!     }
//!     Ok(())
//! });
//!
//! while controller.analyzer().frames_remaining() > 0 {
//!     controller.process(&FrameView::empty())?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `artrack::core`: pose matrices, the homogeneous transform pipeline,
//!   axis conventions, raw detections and the `ImageAnalyzer` trait.
//! - `artrack::tracking`: classification, pose continuity, multi-marker
//!   groups, the event bus, the frame controller, marker controls, the
//!   tracking context and JSON replay.

pub use artrack_core as core;
pub use artrack_tracking as tracking;

pub use artrack_core::{
    AxisConvention, DetectionKind, FrameView, GlMatrix, ImageAnalyzer, MarkerKind, PoseMatrix,
    RawDetection,
};
pub use artrack_tracking::{
    Controller, ControllerError, ControllerParams, EventBus, EventKind, FrameEvent, FrameSummary,
    MarkerControls, MarkerControlsParams, MarkerKey, TrackingContext,
};
