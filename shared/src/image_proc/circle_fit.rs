//! Algebraic least-squares circle fitting.
//!
//! Implements the Kåsa fit: minimise Σ(x² + y² + Dx + Ey + F)² over the
//! point set, which reduces to a 3x3 linear system. Biased toward smaller
//! radii on short arcs.

use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

/// Minimum number of points for a determined fit
pub const MIN_POINTS: usize = 3;

/// A fitted circle in pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CircleFit {
    /// Centre x (column)
    pub cx: f64,
    /// Centre y (row)
    pub cy: f64,
    /// Radius in pixels
    pub radius: f64,
    /// RMS radial residual of the input points
    pub rms_residual: f64,
}

impl CircleFit {
    /// Distance between two fitted centres
    pub fn center_distance(&self, other: &CircleFit) -> f64 {
        ((self.cx - other.cx).powi(2) + (self.cy - other.cy).powi(2)).sqrt()
    }
}

/// Fit a circle to a set of `(x, y)` points.
///
/// Returns `None` for fewer than [`MIN_POINTS`] points, collinear input, or
/// a degenerate (non-positive) radius.
pub fn fit_circle(points: &[(f64, f64)]) -> Option<CircleFit> {
    if points.len() < MIN_POINTS {
        return None;
    }

    // Centre the data to keep the normal equations well conditioned
    let n = points.len() as f64;
    let mean_x = points.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = points.iter().map(|p| p.1).sum::<f64>() / n;

    let mut ata = Matrix3::<f64>::zeros();
    let mut atb = Vector3::<f64>::zeros();
    for &(px, py) in points {
        let x = px - mean_x;
        let y = py - mean_y;
        let row = Vector3::new(x, y, 1.0);
        ata += row * row.transpose();
        atb += row * -(x * x + y * y);
    }

    // Collinear points leave the system (numerically) singular
    let scale = ata.trace().powi(3);
    if ata.determinant().abs() <= 1e-12 * scale {
        return None;
    }
    let solution = ata.try_inverse()? * atb;
    let (d, e, f) = (solution[0], solution[1], solution[2]);

    let cx = -d / 2.0;
    let cy = -e / 2.0;
    let radius_sq = cx * cx + cy * cy - f;
    if !radius_sq.is_finite() || radius_sq <= 0.0 {
        return None;
    }
    let radius = radius_sq.sqrt();

    let sum_sq: f64 = points
        .iter()
        .map(|&(px, py)| {
            let r = ((px - mean_x - cx).powi(2) + (py - mean_y - cy).powi(2)).sqrt();
            (r - radius).powi(2)
        })
        .sum();

    Some(CircleFit {
        cx: cx + mean_x,
        cy: cy + mean_y,
        radius,
        rms_residual: (sum_sq / n).sqrt(),
    })
}
