use artrack_core::{AnalyzerError, MarkerKind};

use super::FrameSummary;
use crate::events::DispatchFailures;

/// Invalid controller or context configuration.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ParamsError {
    #[error("invalid marker width {width} for {kind:?} {id}")]
    InvalidMarkerWidth { kind: MarkerKind, id: u32, width: f64 },
    #[error("invalid default marker width {0}")]
    InvalidDefaultWidth(f64),
    #[error("transform scale must be finite, got {0}")]
    InvalidScale(f64),
    #[error("max detection rate must be positive, got {0}")]
    InvalidDetectionRate(f64),
}

/// Errors returned by [`Controller::process`](super::Controller::process).
#[derive(thiserror::Error, Debug)]
pub enum ControllerError {
    /// The analyzer could not ingest the frame. Nothing was dispatched and
    /// no tracking state changed.
    #[error("frame not processed")]
    Acquisition(#[source] AnalyzerError),

    /// The frame was fully processed but some listeners failed.
    #[error("{} listener(s) failed during frame {}", .failures.len(), .summary.frame)]
    Listener {
        summary: FrameSummary,
        #[source]
        failures: DispatchFailures,
    },
}

impl ControllerError {
    /// Summary of the frame, when it was processed despite the error.
    pub fn summary(&self) -> Option<&FrameSummary> {
        match self {
            ControllerError::Listener { summary, .. } => Some(summary),
            _ => None,
        }
    }
}
