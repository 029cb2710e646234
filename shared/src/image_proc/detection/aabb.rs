//! Axis-aligned bounding boxes in image space.
//!
//! Bounds are inclusive and expressed as (row, column), with rows increasing
//! downward and columns increasing rightward. Used both for connected
//! component extents and for the instrument region reported by a locator.

use serde::{Deserialize, Serialize};

/// Axis-Aligned Bounding Box for 2D image regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AABB {
    /// Minimum row (y) coordinate (inclusive)
    pub min_row: usize,
    /// Minimum column (x) coordinate (inclusive)
    pub min_col: usize,
    /// Maximum row (y) coordinate (inclusive)
    pub max_row: usize,
    /// Maximum column (x) coordinate (inclusive)
    pub max_col: usize,
}

impl Default for AABB {
    fn default() -> Self {
        Self::new()
    }
}

impl AABB {
    /// Create a new empty AABB with invalid bounds.
    ///
    /// The result is invalid until points are added via `expand_to_include()`.
    pub fn new() -> Self {
        Self {
            min_row: usize::MAX,
            min_col: usize::MAX,
            max_row: 0,
            max_col: 0,
        }
    }

    /// Create an AABB from explicit coordinate bounds.
    pub fn from_coords(min_row: usize, min_col: usize, max_row: usize, max_col: usize) -> Self {
        Self {
            min_row,
            min_col,
            max_row,
            max_col,
        }
    }

    /// Expand this AABB to include the specified point.
    pub fn expand_to_include(&mut self, row: usize, col: usize) {
        self.min_row = self.min_row.min(row);
        self.min_col = self.min_col.min(col);
        self.max_row = self.max_row.max(row);
        self.max_col = self.max_col.max(col);
    }

    /// True once at least one point has been included
    pub fn is_valid(&self) -> bool {
        self.min_row <= self.max_row && self.min_col <= self.max_col
    }

    /// Width in pixels (inclusive bounds)
    pub fn width(&self) -> usize {
        if self.is_valid() {
            self.max_col - self.min_col + 1
        } else {
            0
        }
    }

    /// Height in pixels (inclusive bounds)
    pub fn height(&self) -> usize {
        if self.is_valid() {
            self.max_row - self.min_row + 1
        } else {
            0
        }
    }

    /// Area in pixels
    pub fn area(&self) -> usize {
        self.width() * self.height()
    }

    /// Geometric center as (x, y) in pixel coordinates
    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_col + self.max_col) as f64 / 2.0,
            (self.min_row + self.max_row) as f64 / 2.0,
        )
    }

    /// Check if this AABB overlaps with another AABB (edge contact counts).
    pub fn overlaps(&self, other: &Self) -> bool {
        self.min_row <= other.max_row
            && self.max_row >= other.min_row
            && self.min_col <= other.max_col
            && self.max_col >= other.min_col
    }

    /// Smallest AABB containing both boxes
    pub fn merge(&self, other: &Self) -> Self {
        Self {
            min_row: self.min_row.min(other.min_row),
            min_col: self.min_col.min(other.min_col),
            max_row: self.max_row.max(other.max_row),
            max_col: self.max_col.max(other.max_col),
        }
    }

    /// Clip the box to an image of the given `(width, height)`.
    ///
    /// Returns `None` when the box lies entirely outside the image.
    pub fn clipped_to(&self, width: usize, height: usize) -> Option<Self> {
        if !self.is_valid() || width == 0 || height == 0 {
            return None;
        }
        if self.min_col >= width || self.min_row >= height {
            return None;
        }
        Some(Self {
            min_row: self.min_row,
            min_col: self.min_col,
            max_row: self.max_row.min(height - 1),
            max_col: self.max_col.min(width - 1),
        })
    }
}
