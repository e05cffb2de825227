//! Detection classification.
//!
//! A detection is attributed to pattern matching first, then to matrix
//! decoding. Anything else is an unclassified square.

use std::fmt;

use artrack_core::{MarkerKind, RawDetection, NO_ID};
use serde::{Deserialize, Serialize};

/// Typed identity of a tracked marker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MarkerKey {
    pub kind: MarkerKind,
    pub id: u32,
}

impl MarkerKey {
    #[inline]
    pub fn pattern(id: u32) -> Self {
        Self {
            kind: MarkerKind::Pattern,
            id,
        }
    }

    #[inline]
    pub fn barcode(id: u32) -> Self {
        Self {
            kind: MarkerKind::Barcode,
            id,
        }
    }
}

impl fmt::Display for MarkerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            MarkerKind::Pattern => "pattern",
            MarkerKind::Barcode => "barcode",
        };
        write!(f, "{kind}/{}", self.id)
    }
}

/// Outcome of classifying one detection.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Classification {
    pub key: MarkerKey,
    /// Direction reported by the matching mode that won.
    pub dir: i32,
    pub confidence: f64,
}

/// Classify a raw detection, or return `None` for an unclassified square.
pub fn classify(det: &RawDetection) -> Option<Classification> {
    if det.id_patt >= 0 && (det.id == det.id_patt || det.id_matrix == NO_ID) {
        return Some(Classification {
            key: MarkerKey::pattern(det.id_patt as u32),
            dir: det.dir_patt,
            confidence: det.cf_patt,
        });
    }
    if det.id_matrix >= 0 {
        return Some(Classification {
            key: MarkerKey::barcode(det.id_matrix as u32),
            dir: det.dir_matrix,
            confidence: det.cf_matrix,
        });
    }
    None
}
