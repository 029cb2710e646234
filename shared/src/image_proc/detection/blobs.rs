//! Blob extraction from binary masks.
//!
//! Wraps connected component labelling and gathers, per component, the pixel
//! list, area, extent and binary centroid. HUD markers are flat-shaded so an
//! unweighted centroid is what we want here.

use crate::image_proc::centroid::mask_moments;
use crate::image_proc::detection::thresholding::{connected_components, get_bounding_boxes};
use crate::image_proc::detection::AABB;
use ndarray::{s, Array2, ArrayView2};

/// A connected foreground region of a mask
#[derive(Debug, Clone)]
pub struct Blob {
    /// Component label in the labelled image (1-based)
    pub label: usize,
    /// Number of pixels
    pub area: usize,
    /// Extent of the component
    pub bbox: AABB,
    /// Centroid x (column) in mask coordinates
    pub x: f64,
    /// Centroid y (row) in mask coordinates
    pub y: f64,
    /// Member pixel coordinates as (x, y)
    pub pixels: Vec<(f64, f64)>,
}

impl Blob {
    /// Fraction of the bounding box covered by the blob
    pub fn fill_ratio(&self) -> f64 {
        let bbox_area = self.bbox.area();
        if bbox_area == 0 {
            0.0
        } else {
            self.area as f64 / bbox_area as f64
        }
    }
}

/// Find every connected blob in a mask, largest first
pub fn find_blobs(mask: &ArrayView2<bool>) -> Vec<Blob> {
    let labels = connected_components(mask);
    let bboxes = get_bounding_boxes(&labels.view());

    let mut pixels: Vec<Vec<(f64, f64)>> = vec![Vec::new(); bboxes.len()];
    for ((row, col), &label) in labels.indexed_iter() {
        if label > 0 {
            pixels[label - 1].push((col as f64, row as f64));
        }
    }

    let mut blobs: Vec<Blob> = bboxes
        .into_iter()
        .zip(pixels)
        .enumerate()
        .map(|(index, (bbox, pixels))| {
            let label = index + 1;
            let (x, y) = component_centroid(&labels, label, &bbox);
            Blob {
                label,
                area: pixels.len(),
                bbox,
                x,
                y,
                pixels,
            }
        })
        .collect();

    blobs.sort_by(|a, b| b.area.cmp(&a.area));
    blobs
}

/// Centroid of one labelled component from the mask moments of its extent
fn component_centroid(labels: &Array2<usize>, label: usize, bbox: &AABB) -> (f64, f64) {
    let window = labels.slice(s![bbox.min_row..=bbox.max_row, bbox.min_col..=bbox.max_col]);
    let mask = window.mapv(|l| l == label);
    let weights = mask.mapv(|m| if m { 1.0 } else { 0.0 });
    // A labelled component always has at least one pixel
    let (x, y) = mask_moments(&weights.view(), &mask.view()).map_or((0.0, 0.0), |m| (m.x, m.y));
    (bbox.min_col as f64 + x, bbox.min_row as f64 + y)
}
