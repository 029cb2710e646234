//! Image moments of masked regions.
//!
//! Used for the compass marker position: the marker is a small filled disc,
//! so the first-order moments of its mask give a sub-pixel centre. Positions
//! are relative to the view passed in; callers add the view origin.

use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};

/// Zeroth, first and central second-order moments of a weighted mask
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MaskMoments {
    pub x: f64,
    pub y: f64,
    /// Sum of weights under the mask
    pub weight: f64,
    pub mu20: f64,
    pub mu02: f64,
    pub mu11: f64,
}

impl MaskMoments {
    /// Ratio of the principal axes' variances; 1 for a disc, infinite for a line
    pub fn elongation(&self) -> f64 {
        let half_sum = (self.mu20 + self.mu02) / 2.0;
        let spread = (self.mu11.powi(2) + ((self.mu20 - self.mu02) / 2.0).powi(2)).sqrt();
        let (major, minor) = (half_sum + spread, half_sum - spread);
        if minor > f64::EPSILON {
            major / minor
        } else {
            f64::INFINITY
        }
    }
}

/// Moments of `weights` under `mask`, or `None` when the mask carries no weight.
///
/// Both views must share one shape, indexed `[row, col]`.
pub fn mask_moments(weights: &ArrayView2<f64>, mask: &ArrayView2<bool>) -> Option<MaskMoments> {
    if weights.shape() != mask.shape() {
        return None;
    }

    let (mut m00, mut m10, mut m01) = (0.0, 0.0, 0.0);
    let (mut m20, mut m02, mut m11) = (0.0, 0.0, 0.0);
    for (((row, col), &set), &w) in mask.indexed_iter().zip(weights.iter()) {
        if !set {
            continue;
        }
        let (x, y) = (col as f64, row as f64);
        m00 += w;
        m10 += w * x;
        m01 += w * y;
        m20 += w * x * x;
        m02 += w * y * y;
        m11 += w * x * y;
    }
    if m00 < f64::EPSILON {
        return None;
    }

    let (x, y) = (m10 / m00, m01 / m00);
    Some(MaskMoments {
        x,
        y,
        weight: m00,
        mu20: m20 / m00 - x * x,
        mu02: m02 / m00 - y * y,
        mu11: m11 / m00 - x * y,
    })
}
