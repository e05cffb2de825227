use nalgebra::{Matrix3x4, Matrix4};

/// Rigid marker-to-camera pose as produced by the analyzer.
///
/// Rotation block in columns `0..3`, translation in column `3`. The units of
/// the translation follow the marker width used for the solve.
pub type PoseMatrix = Matrix3x4<f64>;

/// Renderer-ready homogeneous transform.
///
/// nalgebra stores matrices column-major, so [`Matrix4::as_slice`] yields the
/// OpenGL element order directly (translation at indices `12..15`).
pub type GlMatrix = Matrix4<f64>;

/// Build a pose from the analyzer's row-major 12-element layout.
pub fn pose_from_row_major(t: &[f64; 12]) -> PoseMatrix {
    PoseMatrix::from_row_slice(t)
}

/// Flatten a pose back into the row-major 12-element layout.
pub fn pose_to_row_major(pose: &PoseMatrix) -> [f64; 12] {
    let mut out = [0.0; 12];
    for r in 0..3 {
        for c in 0..4 {
            out[r * 4 + c] = pose[(r, c)];
        }
    }
    out
}

/// Compose two rigid poses: `outer * inner`.
///
/// Used to express a multi-marker slot (local pose relative to the group) in
/// camera space.
pub fn compose_poses(outer: &PoseMatrix, inner: &PoseMatrix) -> PoseMatrix {
    let rotation = outer.fixed_view::<3, 3>(0, 0);
    let mut out = rotation * inner;
    for r in 0..3 {
        out[(r, 3)] += outer[(r, 3)];
    }
    out
}
