//! Frame orchestration.
//!
//! The [`Controller`] runs one frame at a time through detection,
//! classification and continuity tracking, multi-marker aggregation and
//! event dispatch. It owns the marker table, the group registry, the event
//! bus and every pose buffer handed to listeners.

mod error;
mod params;
mod pipeline;
mod result;

pub use error::{ControllerError, ParamsError};
pub use params::{ControllerParams, MarkerWidth};
pub use pipeline::{Controller, FrameStage};
pub use result::FrameSummary;
