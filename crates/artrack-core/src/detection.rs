use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// Identity value the analyzer uses for "no valid id".
pub const NO_ID: i32 = -1;

/// Kind of a trackable marker identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerKind {
    /// Template-image marker.
    Pattern,
    /// 2D matrix code marker with an embedded numeric id.
    Barcode,
}

/// Kind attached to a reported detection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionKind {
    Pattern,
    Barcode,
    /// A square whose content matched neither a pattern nor a matrix code.
    Unknown,
}

impl From<MarkerKind> for DetectionKind {
    fn from(kind: MarkerKind) -> Self {
        match kind {
            MarkerKind::Pattern => DetectionKind::Pattern,
            MarkerKind::Barcode => DetectionKind::Barcode,
        }
    }
}

/// One candidate square found by the analyzer in the current frame.
///
/// Field semantics follow the analyzer: ids are `>= 0` when valid and
/// [`NO_ID`] otherwise, directions are in `0..=3`, confidences in
/// `0.0..=1.0` (or `-1.0` when invalid). Image coordinates have their origin
/// at the top-left.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawDetection {
    /// Pixel area of the connected region containing the border.
    pub area: i32,
    /// Identity when only one of pattern/matrix matching is enabled.
    pub id: i32,
    pub id_patt: i32,
    pub id_matrix: i32,
    pub dir: i32,
    pub dir_patt: i32,
    pub dir_matrix: i32,
    pub cf: f64,
    pub cf_patt: f64,
    pub cf_matrix: f64,
    /// Centre of the marker.
    pub pos: Point2<f64>,
    /// Line equations `a*x + b*y + c = 0` of the four sides.
    pub line: [[f64; 3]; 4],
    /// Corners; `vertex[(4 - dir) % 4]` is the top-left one, the rest follow clockwise.
    pub vertex: [Point2<f64>; 4],
}

impl Default for RawDetection {
    fn default() -> Self {
        Self {
            area: 0,
            id: NO_ID,
            id_patt: NO_ID,
            id_matrix: NO_ID,
            dir: 0,
            dir_patt: 0,
            dir_matrix: 0,
            cf: -1.0,
            cf_patt: -1.0,
            cf_matrix: -1.0,
            pos: Point2::origin(),
            line: [[0.0; 3]; 4],
            vertex: [Point2::origin(); 4],
        }
    }
}
