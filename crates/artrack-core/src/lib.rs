//! Core types and utilities for fiducial marker tracking.
//!
//! This crate is intentionally small and purely geometric. It does *not*
//! perform any image analysis: detections and raw poses come from an
//! [`ImageAnalyzer`] implementation supplied by the caller.

mod analyzer;
mod detection;
mod image;
mod logger;
mod pose;
mod transform;

pub use analyzer::{
    AnalyzerError, AnalyzerSettings, DetectionMode, GroupSlot, ImageAnalyzer, MatrixCodeType,
    PoseSolveError, SlotDescriptor, SlotPattern,
};
pub use detection::{DetectionKind, MarkerKind, RawDetection, NO_ID};
pub use image::{FrameError, FrameView, PixelFormat};
pub use pose::{compose_poses, pose_from_row_major, pose_to_row_major, GlMatrix, PoseMatrix};
pub use transform::{gl_array, to_homogeneous, to_homogeneous_into, AxisConvention};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::init_with_level;
