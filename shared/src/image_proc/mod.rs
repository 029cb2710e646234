//! Image processing for rendered instrument imagery.
//!
//! # Module Organization
//!
//! - **color**: HSV conversion and colour band segmentation
//! - **detection**: Connected components, blobs and bounding boxes
//! - **centroid**: Mask moments and sub-pixel centres
//! - **circle_fit**: Least-squares circle fitting for rings and reticles

pub mod centroid;
pub mod circle_fit;
pub mod color;
pub mod detection;

// Re-export key functionality for easier access
pub use centroid::{mask_moments, MaskMoments};
pub use circle_fit::{fit_circle, CircleFit};
pub use color::{count_set, exclude, in_range, rgb_to_hsv, Hsv, HsvRange};
pub use detection::{connected_components, find_blobs, get_bounding_boxes, Blob, AABB};
