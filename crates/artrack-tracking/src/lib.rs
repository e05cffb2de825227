//! Per-frame fiducial marker tracking.
//!
//! Given an [`ImageAnalyzer`](artrack_core::ImageAnalyzer) that finds squares
//! and solves their poses, this crate:
//! - classifies every detection as a pattern marker, a barcode marker or an
//!   unclassified square,
//! - keeps per-marker visibility and seeds pose solves from the previous
//!   frame when the marker was seen in it,
//! - aggregates multi-marker groups,
//! - dispatches the results as [`FrameEvent`]s on an [`EventBus`].
//!
//! [`Controller`] drives all of the above one frame at a time;
//! [`TrackingContext`] adds frame-rate limiting and renderer-facing
//! [`MarkerControls`].

mod classify;
mod context;
mod continuity;
mod controller;
mod controls;
mod events;
mod io;
mod multi;
pub mod replay;

pub use classify::{classify, Classification, MarkerKey};
pub use context::{ContextParams, PerformanceProfile, TrackingContext};
pub use continuity::{ContinuityUpdate, MarkerTable, SolveMode, TrackedMarker};
pub use controller::{
    Controller, ControllerError, ControllerParams, FrameStage, FrameSummary, MarkerWidth,
    ParamsError,
};
pub use controls::{
    ControlState, ControlTarget, MarkerControls, MarkerControlsParams, MatrixMode,
};
pub use events::{
    DispatchFailures, EventBus, EventKind, FrameEvent, ListenerError, ListenerFailure,
    ListenerId, ListenerResult,
};
pub use io::{replay_script, EventRecord, FrameRecord, MarkerRecord, ReplayIoError, ReplayReport};
pub use multi::{GroupRegistry, GroupResult, MultiMarkerGroup, SubResult};
