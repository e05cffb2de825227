use artrack_core::MarkerKind;
use serde::{Deserialize, Serialize};

use super::ParamsError;
use crate::classify::MarkerKey;

/// Physical width override for one marker.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MarkerWidth {
    pub kind: MarkerKind,
    pub id: u32,
    pub width: f64,
}

impl MarkerWidth {
    #[inline]
    pub fn key(&self) -> MarkerKey {
        MarkerKey {
            kind: self.kind,
            id: self.id,
        }
    }
}

/// Configuration for the frame controller.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerParams {
    /// Width used for markers without an override, in scene units.
    pub default_marker_width: f64,
    /// Per-marker widths applied when the controller is created.
    pub marker_widths: Vec<MarkerWidth>,
    /// Scale applied to the translation of every reported matrix.
    /// `None` or `0.0` leaves translations as solved.
    pub transform_scale: Option<f64>,
    /// Report squares with no identity as `Unknown` poses.
    pub report_unclassified: bool,
}

impl Default for ControllerParams {
    fn default() -> Self {
        Self {
            default_marker_width: 1.0,
            marker_widths: Vec::new(),
            transform_scale: None,
            report_unclassified: true,
        }
    }
}

impl ControllerParams {
    pub fn validate(&self) -> Result<(), ParamsError> {
        if !(self.default_marker_width.is_finite() && self.default_marker_width > 0.0) {
            return Err(ParamsError::InvalidDefaultWidth(self.default_marker_width));
        }
        if let Some(w) = self
            .marker_widths
            .iter()
            .find(|w| !(w.width.is_finite() && w.width > 0.0))
        {
            return Err(ParamsError::InvalidMarkerWidth {
                kind: w.kind,
                id: w.id,
                width: w.width,
            });
        }
        if let Some(scale) = self.transform_scale {
            if !scale.is_finite() {
                return Err(ParamsError::InvalidScale(scale));
            }
        }
        Ok(())
    }

    pub fn with_marker_width(mut self, key: MarkerKey, width: f64) -> Self {
        self.marker_widths.push(MarkerWidth {
            kind: key.kind,
            id: key.id,
            width,
        });
        self
    }
}
