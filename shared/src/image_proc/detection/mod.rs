//! Object detection on binary masks.
//!
//! - **thresholding**: Connected component labelling
//! - **blobs**: Per-component area, extent, pixels and centroid
//! - **aabb**: Axis-aligned bounding boxes for region management

pub mod aabb;
pub mod blobs;
pub mod thresholding;

pub use aabb::AABB;
pub use blobs::{find_blobs, Blob};
pub use thresholding::{connected_components, get_bounding_boxes};
