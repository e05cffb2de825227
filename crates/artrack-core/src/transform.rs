//! Coordinate transform pipeline.
//!
//! Every pose handed to observers goes through [`to_homogeneous_into`]: the
//! 3x4 analyzer pose becomes a 4x4 homogeneous matrix, optionally with its
//! translation scaled for unit conversion. [`AxisConvention`] then remaps the
//! axes for a target renderer.

use std::f64::consts::{FRAC_PI_2, PI};

use nalgebra::{Rotation3, Vector3};
use serde::{Deserialize, Serialize};

use crate::{GlMatrix, PoseMatrix};

/// Convert a 3x4 pose into a freshly allocated 4x4 homogeneous transform.
pub fn to_homogeneous(pose: &PoseMatrix, scale: Option<f64>) -> GlMatrix {
    let mut out = GlMatrix::zeros();
    to_homogeneous_into(pose, scale, &mut out);
    out
}

/// Convert a 3x4 pose into `dst`, overwriting every element.
///
/// A non-zero `scale` multiplies the translation column only; the rotation
/// block is copied untouched. `None` and `Some(0.0)` both mean "no scaling".
pub fn to_homogeneous_into(pose: &PoseMatrix, scale: Option<f64>, dst: &mut GlMatrix) {
    dst.fixed_view_mut::<3, 4>(0, 0).copy_from(pose);
    dst[(3, 0)] = 0.0;
    dst[(3, 1)] = 0.0;
    dst[(3, 2)] = 0.0;
    dst[(3, 3)] = 1.0;

    if let Some(s) = scale.filter(|s| *s != 0.0) {
        for r in 0..3 {
            dst[(r, 3)] *= s;
        }
    }
}

/// Flatten a 4x4 transform in OpenGL (column-major) element order.
pub fn gl_array(m: &GlMatrix) -> [f64; 16] {
    let mut out = [0.0; 16];
    out.copy_from_slice(m.as_slice());
    out
}

/// Axis convention of the renderer consuming the transforms.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AxisConvention {
    /// Analyzer axes: camera looks down +Z, marker normal is +Z.
    #[default]
    Native,
    /// WebGL-style axes: camera looks down -Z with +Y up, marker normal is +Y.
    WebGl,
}

impl AxisConvention {
    /// Transform applied on the camera side (left) of a model-view matrix.
    pub fn camera_axes(self) -> GlMatrix {
        match self {
            AxisConvention::Native => GlMatrix::identity(),
            AxisConvention::WebGl => {
                let ry = Rotation3::from_axis_angle(&Vector3::y_axis(), PI);
                let rz = Rotation3::from_axis_angle(&Vector3::z_axis(), PI);
                (ry * rz).to_homogeneous()
            }
        }
    }

    /// Transform applied on the marker side (right) of a model-view matrix.
    pub fn marker_axes(self) -> GlMatrix {
        match self {
            AxisConvention::Native => GlMatrix::identity(),
            AxisConvention::WebGl => {
                Rotation3::from_axis_angle(&Vector3::x_axis(), FRAC_PI_2).to_homogeneous()
            }
        }
    }

    /// Remap a model-view matrix from analyzer axes into this convention.
    pub fn remap(self, model_view: &GlMatrix) -> GlMatrix {
        match self {
            AxisConvention::Native => *model_view,
            _ => self.camera_axes() * model_view * self.marker_axes(),
        }
    }
}
