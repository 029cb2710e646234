//! Colour-space conversion and band segmentation for rendered HUD imagery.
//!
//! Instrument widgets are drawn in a small number of saturated colours and
//! are segmented by hue/saturation/value band. Conversions follow the 8-bit convention used by most vision
//! toolkits: hue in `[0, 180)`, saturation and value in `[0, 255]`.
//!
//! Masks are returned as `Array2<bool>` indexed `[row, col]`, matching the
//! layout of the rest of the image processing code.

use image::{Rgb, RgbImage};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// A single pixel in 8-bit HSV space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hsv {
    /// Hue, 0..180 (degrees / 2)
    pub h: u8,
    /// Saturation, 0..=255
    pub s: u8,
    /// Value, 0..=255
    pub v: u8,
}

impl Hsv {
    pub const fn new(h: u8, s: u8, v: u8) -> Self {
        Self { h, s, v }
    }
}

/// Inclusive HSV band used to segment one colour out of a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HsvRange {
    /// Lower bound (inclusive) on every channel
    pub lower: Hsv,
    /// Upper bound (inclusive) on every channel
    pub upper: Hsv,
}

impl HsvRange {
    /// Build a band from `(h, s, v)` tuples
    pub const fn new(lower: (u8, u8, u8), upper: (u8, u8, u8)) -> Self {
        Self {
            lower: Hsv::new(lower.0, lower.1, lower.2),
            upper: Hsv::new(upper.0, upper.1, upper.2),
        }
    }

    /// Check whether a pixel falls inside the band on all three channels
    pub fn contains(&self, hsv: Hsv) -> bool {
        (self.lower.h..=self.upper.h).contains(&hsv.h)
            && (self.lower.s..=self.upper.s).contains(&hsv.s)
            && (self.lower.v..=self.upper.v).contains(&hsv.v)
    }
}

/// Convert one RGB pixel to 8-bit HSV
pub fn rgb_to_hsv(pixel: &Rgb<u8>) -> Hsv {
    let [r, g, b] = pixel.0;
    let (rf, gf, bf) = (r as f64, g as f64, b as f64);

    let max = rf.max(gf).max(bf);
    let min = rf.min(gf).min(bf);
    let delta = max - min;

    let saturation = if max > 0.0 { 255.0 * delta / max } else { 0.0 };

    let mut hue = if delta <= f64::EPSILON {
        0.0
    } else if max == rf {
        60.0 * (gf - bf) / delta
    } else if max == gf {
        120.0 + 60.0 * (bf - rf) / delta
    } else {
        240.0 + 60.0 * (rf - gf) / delta
    };
    if hue < 0.0 {
        hue += 360.0;
    }

    // 360 degrees folds onto 180 steps; 179.5+ rounds back to red
    let h = ((hue / 2.0).round() as u32 % 180) as u8;

    Hsv {
        h,
        s: saturation.round().clamp(0.0, 255.0) as u8,
        v: max as u8,
    }
}

/// Segment every pixel of `image` that falls inside `range`
///
/// # Returns
/// Mask of shape `(height, width)` with `true` where the pixel is in band
pub fn in_range(image: &RgbImage, range: &HsvRange) -> Array2<bool> {
    let (width, height) = image.dimensions();
    Array2::from_shape_fn((height as usize, width as usize), |(row, col)| {
        range.contains(rgb_to_hsv(image.get_pixel(col as u32, row as u32)))
    })
}

/// Remove every pixel set in `excluded` from `mask`
///
/// Used to keep bezel-coloured pixels from bleeding into marker masks.
pub fn exclude(mask: &Array2<bool>, excluded: &Array2<bool>) -> Array2<bool> {
    assert_eq!(
        mask.dim(),
        excluded.dim(),
        "Mask and exclusion mask must have same dimensions"
    );
    let mut out = mask.clone();
    out.zip_mut_with(excluded, |m, &e| *m = *m && !e);
    out
}

/// Number of set pixels in a mask
pub fn count_set(mask: &Array2<bool>) -> usize {
    mask.iter().filter(|&&v| v).count()
}
